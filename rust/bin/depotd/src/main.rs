//! `depotd`: the service-center server.
//!
//! Usage:
//!   depotd -c <context-name-or-path> [--listen <addr>]
//!
//! A bare context name resolves to `/etc/depot/<name>.toml`.

mod config;
mod routes;

use std::sync::Arc;

use clap::Parser;
use depot_core::{AuditSink, Module, ServiceConfig, TracingAudit};
use depot_sql::{SQLStore, SqliteStore};
use tracing::info;

use config::ServerConfig;

/// Service-center server.
#[derive(Parser, Debug)]
#[command(name = "depotd", about = "Service-center server", version)]
struct Cli {
    /// Context name or path to config file.
    #[arg(short = 'c', long = "config", required = true)]
    config: String,

    /// Listen address (overrides `[server] listen`).
    #[arg(long = "listen")]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config_path = ServerConfig::resolve_path(&cli.config);
    info!("Loading configuration from {}", config_path.display());
    let server_config = ServerConfig::load(&config_path)?;

    let data_dir = std::path::PathBuf::from(&server_config.storage.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let core_config = ServiceConfig {
        data_dir: Some(data_dir),
        listen: cli.listen.unwrap_or(server_config.server.listen.clone()),
        ..Default::default()
    };

    let sql: Arc<dyn SQLStore> = Arc::new(
        SqliteStore::open(&core_config.resolve_sqlite_path())
            .map_err(|e| anyhow::anyhow!("failed to open SQL store: {}", e))?,
    );
    let audit: Arc<dyn AuditSink> = Arc::new(TracingAudit);

    let workflow_module = workflow::WorkflowModule::new(Arc::clone(&sql), Arc::clone(&audit))?;
    info!("Workflow module initialized");

    let rma_module = rma::RmaModule::new(
        Arc::clone(&sql),
        Arc::new(rma::LoggingInventory),
        audit,
        &server_config.rma,
    )?;
    info!(prefix = %server_config.rma.batch_prefix, "RMA module initialized");

    let app = routes::build_router(vec![
        (workflow_module.name(), workflow_module.routes()),
        (rma_module.name(), rma_module.routes()),
    ]);

    let listener = tokio::net::TcpListener::bind(&core_config.listen).await?;
    info!("depotd listening on {}", core_config.listen);
    axum::serve(listener, app).await?;

    Ok(())
}
