use axum::{Json, Router, extract::State, routing::post};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use crate::expiry::ExpiryCheckSummary;
use crate::web::{AppError, AppState};

async fn run_expiry_check_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<ExpiryCheckSummary>, AppError> {
    info!("Expiry check triggered over HTTP.");
    let summary = app_state.service.run(Utc::now()).await?;
    Ok(Json(summary))
}

pub fn create_cron_router() -> Router<Arc<AppState>> {
    Router::new().route("/expiry-check", post(run_expiry_check_handler))
}
