//! HTTP service for triggering Runs and polling their progress

pub mod api;
pub mod registry;
pub mod server;

use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub use api::AppState;
pub use registry::{RunEntry, RunRegistry};
pub use server::{Server, ServerConfig};

pub fn router(state: Arc<AppState>) -> Router {
    api::api_router()
        .layer(CorsLayer::permissive())
        .with_state(state)
}
