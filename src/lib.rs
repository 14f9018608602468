pub mod client;
pub mod config;
pub mod error;
pub mod estimate;
pub mod extractor;
pub mod handlers;
pub mod identity;
pub mod poller;
pub mod progress;
pub mod state;
pub mod tasks;
pub mod transfer;
pub mod ytdlp;

use axum::{Router, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::Level;

use crate::handlers::{api, download, web};
use crate::state::AppState;

pub fn create_app(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/api/video-info", get(api::video_info))
        .route("/api/download", get(download::download))
        .route("/api/download-progress", get(api::download_progress))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive());

    Router::new()
        .merge(api_routes)
        .with_state(state)
        .fallback(web::ui)
}
