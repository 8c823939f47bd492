pub mod health;
pub mod reports;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/audit-report", post(reports::handle_audit_report))
        .route(
            "/api/full-file-export",
            post(reports::handle_full_file_export),
        )
        .with_state(state)
}
