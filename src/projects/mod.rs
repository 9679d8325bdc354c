mod dto;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{auth::require_auth, state::AppState};

/// Every route here sits behind `require_auth`.
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/save_project", post(handlers::save_project))
        .route("/get_projects", get(handlers::get_projects))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
}
