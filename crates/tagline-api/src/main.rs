mod completion;
mod compliance;
mod config;
mod error;
mod extract;
mod length;
mod model;
mod pipeline;
mod prompts;
mod rate_limit;
mod server;
mod style;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use rate_limit::RateLimiter;
use server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting tagline api");

    let config = Config::from_env()?;
    info!(
        base_url = %config.openai.base_url,
        model = %config.model,
        timeout_ms = config.openai.default_timeout.as_millis(),
        max_retries = config.openai.max_retries,
        fetch_timeout_ms = config.fetch_timeout.as_millis(),
        "completion client configured"
    );
    if !config.has_api_key() {
        warn!("OPENAI_API_KEY is not set, copy endpoints will fail until it is provided");
    }

    let limiter = RateLimiter::from_env();
    if let Some(limiter) = &limiter {
        info!(rps = limiter.rps(), "rate limiting enabled");
    }

    let bind_addr = config.bind_addr;
    let state = Arc::new(AppState::new(config, limiter)?);
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
