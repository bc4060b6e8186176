// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Password authentication routes.

use axum::{
    extract::State,
    http::{header, HeaderMap},
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::Profile;
use crate::AppState;

pub const SESSION_COOKIE: &str = "pairtrack_token";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", get(logout))
}

#[derive(Deserialize, Validate)]
pub struct SignupPayload {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 10, message = "password must be at least 10 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 64))]
    pub display_name: String,
}

#[derive(Deserialize, Validate)]
pub struct LoginPayload {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub profile: Profile,
}

fn session_cookie(token: &str) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(30))
        .build()
}

/// Create an account, a profile with default fields, and a session.
async fn signup(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(payload): Json<SignupPayload>,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    payload
        .validate()
        .map_err(|e| AppError::Precondition(e.to_string()))?;

    let (session, profile) = state
        .sessions
        .sign_up(&payload.email, &payload.password, &payload.display_name)
        .await?;

    let jar = jar.add(session_cookie(&session.token));
    Ok((
        jar,
        Json(SessionResponse {
            token: session.token,
            profile,
        }),
    ))
}

/// Verify credentials and start a session. The profile record is
/// materialized if it went missing.
async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(payload): Json<LoginPayload>,
) -> Result<(CookieJar, Json<SessionResponse>)> {
    payload
        .validate()
        .map_err(|e| AppError::Precondition(e.to_string()))?;

    let (session, profile) = state
        .sessions
        .log_in(&payload.email, &payload.password)
        .await?;

    let jar = jar.add(session_cookie(&session.token));
    Ok((
        jar,
        Json(SessionResponse {
            token: session.token,
            profile,
        }),
    ))
}

/// Clear the session cookie. When a valid token is presented, cookie or
/// bearer header, the sign-out event is published so live resources
/// (presence watches, publish loops) are released.
async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
) -> (CookieJar, Redirect) {
    // Same token precedence as the auth middleware: cookie, then header.
    let token = jar
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(|t| t.to_string())
        });

    if let Some(token) = token {
        let key = jsonwebtoken::DecodingKey::from_secret(&state.config.jwt_signing_key);
        let validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
        if let Ok(data) =
            jsonwebtoken::decode::<crate::middleware::auth::Claims>(&token, &key, &validation)
        {
            let session = crate::services::Session::new(data.claims.sub, token);
            state.sessions.log_out(&session);
        }
    }

    let jar = jar.remove(Cookie::from(SESSION_COOKIE));
    (jar, Redirect::temporary("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signup_payload_validation() {
        let bad_email = SignupPayload {
            email: "not-an-email".to_string(),
            password: "hunter2hunter2".to_string(),
            display_name: "Alice".to_string(),
        };
        assert!(bad_email.validate().is_err());

        let short_password = SignupPayload {
            email: "a@example.com".to_string(),
            password: "short".to_string(),
            display_name: "Alice".to_string(),
        };
        assert!(short_password.validate().is_err());

        let ok = SignupPayload {
            email: "a@example.com".to_string(),
            password: "hunter2hunter2".to_string(),
            display_name: "Alice".to_string(),
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("tok");
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
    }
}
