//! API route modules.
//!
//! Organizes routes by resource type.

pub mod analyze;
pub mod apps;
pub mod health;

use axum::Router;

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/analyze", analyze::router())
        .nest("/api", apps::router())
        .nest("/api/health", health::router())
        .with_state(state)
}
