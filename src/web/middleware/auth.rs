use axum::{
    body::Body as AxumBody,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::web::{AppState, error::AppError};

/// Requires `Authorization: Bearer <cron_secret>` when a secret is configured.
pub async fn cron_auth(
    State(state): State<Arc<AppState>>,
    req: Request<AxumBody>,
    next: Next,
) -> Result<Response, AppError> {
    let Some(secret) = state.config.cron_secret.as_deref() else {
        return Ok(next.run(req).await);
    };

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(bearer_token)
        .ok_or_else(|| AppError::Unauthorized("missing bearer credential".to_string()))?;

    if !bool::from(token.as_bytes().ct_eq(secret.as_bytes())) {
        warn!(path = %req.uri().path(), "Rejected request with an invalid bearer credential.");
        return Err(AppError::Unauthorized("invalid bearer credential".to_string()));
    }
    Ok(next.run(req).await)
}

/// The credential of a `Bearer` authorization value. The scheme is matched
/// case-insensitively.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim_start())
}
