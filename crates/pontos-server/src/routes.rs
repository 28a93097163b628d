//! API routes for the Pontos server.

pub mod balances;
pub mod orders;
pub mod webhooks;

use axum::Router;

use crate::state::AppState;

/// Creates the main API router with all routes mounted.
pub fn create_router(state: AppState) -> Router {
    Router::new().nest("/api/v1", api_v1_routes(state))
}

/// Creates the v1 API routes.
fn api_v1_routes(state: AppState) -> Router {
    Router::new()
        .nest("/orders", orders::router(state.clone()))
        .nest("/webhooks", webhooks::router(state.clone()))
        .nest("/balances", balances::router(state))
}
