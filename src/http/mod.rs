pub mod error;
pub mod file;
pub mod manifest;
pub mod state;
pub mod stream;

use axum::http::Method;
use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/manifest.json", get(manifest::serve_manifest))
        .route("/stream/{category}/{id}", get(stream::serve_stream))
        .route("/file/{*path}", get(file::serve_file_get).head(file::serve_file_head))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
