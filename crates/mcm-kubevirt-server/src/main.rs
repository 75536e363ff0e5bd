mod auth;
mod config;
mod dto;
mod error;
mod routes;
mod state;

use std::sync::Arc;

use mcm_kubevirt::KubeVirtDriver;
use mcm_kubevirt::KubeconfigClientFactory;
use mcm_kubevirt::retry::RetryConfig;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::routes::api_router;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    install_crypto_provider();

    let config = AppConfig::from_env().expect("invalid configuration");

    let factory = Arc::new(KubeconfigClientFactory::new());
    let mut driver = KubeVirtDriver::new(factory.clone(), factory);
    if let Some(attempts) = config.shutdown_retry_attempts {
        driver = driver.with_retry(RetryConfig::with_max_attempts(attempts));
    }

    let state = AppState {
        driver: Arc::new(driver),
        config: config.clone(),
    };

    let app = api_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .expect("failed to bind listener");

    tracing::info!(
        addr = %config.listen_addr,
        auth = config.api_token.is_some(),
        "starting kubevirt machine driver"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

/// kube's rustls stack needs a process-wide crypto provider. Returns false
/// when one was already installed.
fn install_crypto_provider() -> bool {
    let installed = rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_ok();
    if !installed {
        tracing::debug!("rustls crypto provider already installed, keeping it");
    }
    installed
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
