use std::sync::Arc;

mod api;
mod config;
mod error;
mod extract;
mod fields;
mod models;
mod ocr;

use api::{AppState, Limits};
use config::{Config, OcrConfig};
use fields::HeuristicExtractor;
use ocr::{GoogleVisionOcr, OcrProvider, PlaceholderOcr};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::from_env().inspect_err(|e| {
        tracing::error!("invalid configuration: {}", e);
    })?;

    let ocr: Arc<dyn OcrProvider> = match &config.ocr {
        OcrConfig::Placeholder => {
            tracing::warn!("no OCR provider configured, responses will carry empty text");
            Arc::new(PlaceholderOcr)
        }
        OcrConfig::GoogleVision {
            api_key,
            endpoint,
            language_hints,
        } => Arc::new(GoogleVisionOcr::new(
            endpoint.as_str(),
            api_key.as_str(),
            language_hints.clone(),
            config.request_timeout,
        )?),
    };

    let state = AppState {
        ocr,
        extractor: Arc::new(HeuristicExtractor),
        request_timeout: config.request_timeout,
    };
    let app = api::router(
        state,
        Limits {
            max_instances: config.max_instances,
            max_body_bytes: config.max_body_bytes,
        },
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(
        max_instances = config.max_instances,
        timeout_secs = config.request_timeout.as_secs(),
        "listening on {}",
        listener.local_addr()?
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    // Hosted log collectors ingest one JSON object per line.
    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
