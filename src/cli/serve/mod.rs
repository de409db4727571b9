//! Serve command - runs the engine and its HTTP API

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::create_router;
use crate::config::AppConfig;
use crate::infrastructure::{logging, observability};

/// Run the engine until Ctrl-C
pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    logging::init_logging(&config.logging)?;
    let metrics = observability::init_metrics(&config.metrics);

    let provider = crate::create_llm_provider(&config)?;
    let engine = crate::build_engine(&config, provider).await?;
    let state = engine.state.clone();

    let shutdown = CancellationToken::new();
    let running = engine.start(&config, shutdown.clone()).await?;

    let app = create_router(
        state,
        metrics.map(|m| (m, config.metrics.path.as_str())),
    );

    let addr = build_socket_addr(&config)?;
    info!(%addr, workers = config.engine.worker_count, "Starting workflow engine");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    running.join().await;
    info!("Workflow engine stopped");

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
            info!("Shutdown requested");
        }
        _ = shutdown.cancelled() => {}
    }
}

fn build_socket_addr(config: &AppConfig) -> anyhow::Result<SocketAddr> {
    Ok(SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_socket_addr() {
        let addr = build_socket_addr(&AppConfig::default()).unwrap();
        assert_eq!(addr.to_string(), "0.0.0.0:8080");

        let mut config = AppConfig::default();
        config.server.host = "not-an-ip".to_string();
        assert!(build_socket_addr(&config).is_err());
    }
}
