use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use warden_agent::{CfgFileValidator, HostConfig, Supervisor, TracingLogger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("warden.toml"));
    let host_config = HostConfig::load(&config_path)?;
    tracing::info!(config = %config_path.display(), server = host_config.server.server_name, "warden starting");

    // Standalone runs get the built-in cfg-file check; embedding hosts
    // provide their own validator and hooks.
    let supervisor = Supervisor::new(
        Arc::new(RwLock::new(host_config.server)),
        Arc::new(CfgFileValidator {
            connect_endpoint: "127.0.0.1:30120".to_string(),
        }),
        Arc::new(TracingLogger),
        Arc::new(warden_agent::NoopHooks),
    );

    supervisor.signal_start_ready().await;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, stopping the managed server");
    supervisor.handle_shutdown().await;

    Ok(())
}
