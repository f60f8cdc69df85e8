use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use luma_core::{build_app_with_state, ServiceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = ServiceConfig::from_env();
    let addr = cfg.addr;
    let policy_name = cfg.policy.clone();
    let (app, state) = build_app_with_state(cfg);

    let listener = TcpListener::bind(addr).await?;
    state.set_ready();
    info!(%addr, policy = %policy_name, "luma decision service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}
