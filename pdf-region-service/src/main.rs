use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

mod api;
mod backend;
mod config;
mod error;
mod extraction;

#[cfg(test)]
mod test_support;

use crate::api::AppState;
use crate::backend::{HttpFetcher, ImageCanvas, PdfiumRenderer};
use crate::extraction::BatchOrchestrator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    info!(
        "Starting PDF region service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = config::load_config()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        max_images = config.limits.max_images_per_request,
        max_concurrent = config.limits.max_concurrent_requests,
        deadline_ms = config.timing.request_deadline_ms,
        "Configuration loaded"
    );

    let renderer = PdfiumRenderer::new();
    renderer.check_library()?;
    info!("PDFium library bound");

    let orchestrator = BatchOrchestrator::new(
        Arc::new(HttpFetcher::new()?),
        Arc::new(renderer),
        Arc::new(ImageCanvas::new()),
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, orchestrator));
    let app = api::router(state);

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining in-flight batches");
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pdf_region_service=info"));

    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|format| format == "json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        let format = fmt::format()
            .with_target(true)
            .with_thread_ids(true)
            .compact();
        registry.with(fmt::layer().event_format(format)).init();
    }
}
