use axum::extract::Request;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use concierge_core::{CSRF_COOKIE, CSRF_HEADER};
use uuid::Uuid;

use crate::error::ApiError;

/// Double-submit check: the header token must equal the cookie token.
pub async fn require_csrf_token(request: Request, next: Next) -> Response {
    let authorized = {
        let headers = request.headers();
        let cookie = cookie_value(headers, CSRF_COOKIE);
        let header = headers
            .get(CSRF_HEADER)
            .and_then(|value| value.to_str().ok());
        matches!((cookie, header), (Some(cookie), Some(header)) if !cookie.is_empty() && cookie == header)
    };

    if !authorized {
        tracing::warn!(
            method = %request.method(),
            path = %request.uri().path(),
            "rejected request without a matching CSRF token"
        );
        return ApiError::Csrf.into_response();
    }

    next.run(request).await
}

/// Hands out a fresh token cookie to clients that do not carry one yet.
pub async fn issue_csrf_cookie(request: Request, next: Next) -> Response {
    let has_token = cookie_value(request.headers(), CSRF_COOKIE).is_some_and(|token| !token.is_empty());
    let mut response = next.run(request).await;

    if !has_token {
        let cookie = format!(
            "{CSRF_COOKIE}={}; Path=/; SameSite=Strict",
            Uuid::new_v4().simple()
        );
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(error) => {
                tracing::error!(error = %error, "failed to encode CSRF cookie");
            }
        }
    }

    response
}

pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
}
