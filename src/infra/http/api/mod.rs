pub mod error;
pub mod handlers;
pub mod models;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};

use crate::infra::http::middleware::{log_responses, set_request_context};

pub fn build_api_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/nodes", post(handlers::get_nodes))
        .route("/api/render/{ext}", post(handlers::render))
        .route(
            "/api/{uri}",
            get(handlers::get_node)
                .post(handlers::set_node)
                .delete(handlers::delete_node),
        )
        .route("/api/{uri}/publish", put(handlers::publish_node))
        .route("/api/{uri}/revisions", get(handlers::list_revisions))
        .route("/api/{uri}/load", get(handlers::load_node))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
