mod cache;
mod config;
mod date;
mod error;
mod gateway;
mod handlers;
mod limiter;
mod middleware;
mod mirror;
mod models;
mod page;
mod routes;
mod upstream;

use anyhow::Result;
use config::Config;
use gateway::ApodGateway;
use limiter::IpRateLimiter;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config);
    info!(?config, "Starting APOD gateway");

    let addr = config.bind_addr()?;
    let gateway = ApodGateway::from_config(&config).await?;
    let limiter = IpRateLimiter::new(
        config.rate_limit_requests,
        config.rate_limit_window_secs,
        config.trust_proxy_headers,
    );
    let sweeper = limiter.spawn_sweeper(config.rate_limit_window());
    let routes = routes::routes(gateway, limiter, config.cache_dir.clone());

    let (bound, server) =
        warp::serve(routes).try_bind_with_graceful_shutdown(addr, shutdown_signal())?;

    info!("Server started at http://{}", bound);
    server.await;
    sweeper.abort();
    info!("Server stopped");

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
