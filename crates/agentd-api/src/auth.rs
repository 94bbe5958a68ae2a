//! Bearer token authentication for `/api/*`.
//!
//! A server without a configured secret rejects everything. A missing
//! header, a malformed header and a wrong token all produce the same
//! 401 body so callers cannot tell them apart.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::error::ApiError;
use crate::state::ApiState;

pub async fn require_bearer(
    State(state): State<Arc<ApiState>>,
    request: Request,
    next: Next,
) -> Response {
    state.increment_requests();

    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let rejection = match (state.api_token(), provided) {
        (Some(expected), Some(token)) if constant_time_eq(expected, token) => None,
        (None, _) => Some("no API token configured"),
        _ => Some("bad credentials"),
    };

    match rejection {
        None => next.run(request).await,
        Some(reason) => {
            debug!("Rejecting {}: {}", request.uri().path(), reason);
            ApiError::Unauthorized.into_response()
        }
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("secret", "secret"));
        assert!(!constant_time_eq("secret", "secreT"));
        assert!(!constant_time_eq("secret", "secret2"));
        assert!(!constant_time_eq("", "x"));
    }
}
