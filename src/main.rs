mod config;
mod error;
mod line;
mod parser;
mod sensor;
mod things;
mod webhook;

use std::sync::Arc;

use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use config::Config;
use line::{LineClient, Messenger};
use parser::WebhookParser;

/// Webhook bodies are small JSON documents; anything larger is refused.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared, read-only per-process state handed to every request.
#[derive(Clone)]
pub struct AppState<M: Messenger = LineClient> {
    pub parser: Arc<WebhookParser>,
    pub messenger: M,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (development); in production the service
    // manager provides environment variables.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .without_time()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "air_quality_bot=info,tower_http=info".into()),
        )
        .init();

    let config = Config::load()?;

    let state = AppState {
        parser: Arc::new(WebhookParser::new(&config.credentials.channel_secret)?),
        messenger: LineClient::new(
            config.credentials.access_token.clone(),
            config.api_base_url.as_str(),
        ),
    };

    let app = webhook::router::<LineClient>()
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let client_ip = request
                        .headers()
                        .get("x-forwarded-for")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.split(',').next())
                        .map(|s| s.trim().to_string())
                        .unwrap_or_else(|| "-".into());
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                        client_ip = %client_ip,
                    )
                })
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state);

    let addr = config.listen_addr.as_str();
    info!(api = %config.api_base_url, "Air quality bot listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(i), Ok(t)) => (i, t),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!("Failed to install signal handlers: {e}");
            return std::future::pending().await;
        }
    };
    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }
    info!("Shutdown signal received");
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {e}");
        return std::future::pending().await;
    }
    info!("Shutdown signal received");
}
