use axum::{
    Router,
    http::Method,
    middleware as axum_middleware,
    routing::get,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::expiry::ExpiryCheckService;
use crate::server::config::ServerConfig;

pub mod error;
pub mod middleware;
pub mod routes;

pub use error::AppError;
use middleware::auth;
use routes::{expiry_routes, lease_routes};

pub struct AppState {
    pub service: Arc<ExpiryCheckService>,
    pub config: Arc<ServerConfig>,
}

async fn health_check_handler() -> &'static str {
    "OK"
}

pub fn create_axum_router(service: Arc<ExpiryCheckService>, config: Arc<ServerConfig>) -> Router {
    let app_state = Arc::new(AppState { service, config });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_check_handler))
        .nest(
            "/api/cron",
            expiry_routes::create_cron_router()
                .route_layer(axum_middleware::from_fn_with_state(app_state.clone(), auth::cron_auth)),
        )
        .nest(
            "/api/leases",
            lease_routes::create_lease_router()
                .route_layer(axum_middleware::from_fn_with_state(app_state.clone(), auth::cron_auth)),
        )
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
