use local_ip_address::local_ip;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use videodl::config::Settings;
use videodl::state::AppState;
use videodl::ytdlp::YtDlp;
use videodl::{create_app, tasks};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let settings = Settings::new().expect("Failed to load configuration");

    tracing_subscriber::fmt()
        .with_env_filter(&settings.log_level)
        .init();

    info!("Starting videodl...");

    let extractor = Arc::new(YtDlp::new(
        settings.ytdlp_path.clone(),
        settings.metadata_timeout(),
    ));
    let state = AppState::new(settings.clone(), extractor);

    // Start background tasks (progress sweeper)
    tasks::start_background_tasks(state.clone());

    let app = create_app(state.clone());

    let port = settings.server_port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let local_ip = local_ip().unwrap_or(std::net::IpAddr::from([127, 0, 0, 1]));
    info!("Listening on http://{}", addr);
    info!("Network address: http://{}:{}", local_ip, port);
    info!("API endpoints: /api/video-info, /api/download, /api/download-progress");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind server port");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(state.shutdown.clone()))
    .await
    .expect("Server error");

    state.registry.clear();
    info!("Shut down");
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested, cancelling downloads");
    shutdown.cancel();
}
