use axum::{Router, routing::get};

use super::handlers::{
    AppState, generate_get_handler, generate_post_handler, get_health_handler, get_stats_handler,
    method_not_allowed_handler,
};

pub fn create_generate_routes() -> Router<AppState> {
    Router::new().route(
        "/generate",
        get(generate_get_handler)
            .post(generate_post_handler)
            .fallback(method_not_allowed_handler),
    )
}

pub fn create_health_routes() -> Router<AppState> {
    Router::new().route("/health", get(get_health_handler))
}

pub fn create_stats_routes() -> Router<AppState> {
    Router::new().route("/stats", get(get_stats_handler))
}
