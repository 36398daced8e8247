use std::path::Path;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::services::ServeDir;

use crate::envelope::not_found;
use crate::routes;
use crate::AppState;

/// Builds the routed surface for one instance: control verbs nested under
/// `/api/v1/{instance_name}`, static HTML/assets nested under
/// `/{instance_name}`.
pub fn build_router(instance_name: &str, state: AppState, assets_dir: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/help", get(routes::help))
        .route("/status", get(routes::status))
        .route(
            "/parameters",
            get(routes::get_parameters).post(routes::set_parameters),
        )
        .route("/statistics", get(routes::statistics))
        .route("/statistics_raw", get(routes::statistics_raw))
        .route("/start", get(routes::start).put(routes::start))
        .route("/stop", get(routes::stop).delete(routes::stop))
        .route("/", put(routes::start).delete(routes::stop))
        .route("/reset", post(routes::reset))
        .route(
            "/logging",
            get(routes::logging_get).post(routes::logging_post),
        )
        .route("/kill", delete(routes::kill))
        .fallback(not_found)
        .with_state(state);

    let html = match assets_dir {
        Some(dir) => Router::new().fallback_service(ServeDir::new(dir)),
        None => Router::new().fallback(not_found),
    };

    Router::new()
        .nest(&format!("/api/v1/{instance_name}"), api)
        .nest(&format!("/{instance_name}"), html)
        .fallback(not_found)
}
