use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

use crate::db::models::RenewalEvent;
use crate::expiry::{RenewalRequest, RenewalTarget};
use crate::web::{AppError, AppState};

// --- Request/Response Structs ---

/// Exactly one of `months` and `new_expiry` must be given.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenewLeaseRequest {
    months: Option<u32>,
    new_expiry: Option<DateTime<Utc>>,
    actor: String,
}

impl RenewLeaseRequest {
    fn target(&self) -> Result<RenewalTarget, AppError> {
        match (self.months, self.new_expiry) {
            (Some(months), None) => Ok(RenewalTarget::Period(months)),
            (None, Some(date)) => Ok(RenewalTarget::Date(date)),
            _ => Err(AppError::InvalidInput(
                "provide exactly one of months or newExpiry".to_string(),
            )),
        }
    }
}

// --- Route Handlers ---

async fn renew_lease_handler(
    State(app_state): State<Arc<AppState>>,
    Path(lease_id): Path<i32>,
    Json(payload): Json<RenewLeaseRequest>,
) -> Result<Json<RenewalEvent>, AppError> {
    if payload.actor.trim().is_empty() {
        return Err(AppError::InvalidInput("actor is required".to_string()));
    }
    let request = RenewalRequest {
        lease_id,
        target: payload.target()?,
        actor: payload.actor,
    };
    let event = app_state.service.renew(request, Utc::now()).await?;
    Ok(Json(event))
}

pub fn create_lease_router() -> Router<Arc<AppState>> {
    Router::new().route("/{lease_id}/renew", post(renew_lease_handler))
}
