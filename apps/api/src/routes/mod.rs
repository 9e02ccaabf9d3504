pub mod documents;
pub mod health;
pub mod jobs;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/evaluate", post(jobs::handle_evaluate))
        .route("/result/:id", get(jobs::handle_result))
        .route("/documents", post(documents::handle_register_document))
        .route("/documents/:id", get(documents::handle_get_document))
        .with_state(state)
}
