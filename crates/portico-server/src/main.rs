use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use portico_server::{app, logging, AppBuilder, Config, DatabaseConfig};

/// Portico web server.
///
/// Settings are read from PORTICO_* environment variables; flags override
/// them.
#[derive(Debug, Parser)]
#[command(name = "portico", version, about)]
struct Cli {
    /// Address to listen on.
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Application manifest (JSON).
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Directory holding page recipes.
    #[arg(long)]
    pages_dir: Option<PathBuf>,

    /// Directory holding shared templates and utilities.
    #[arg(long)]
    shared_dir: Option<PathBuf>,

    /// Directory for keys, generated utilities and cached files.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// SQLite database file, or "memory".
    #[arg(long)]
    database: Option<String>,

    /// Log one JSON object per line.
    #[arg(long, env = "PORTICO_LOG_JSON")]
    log_json: bool,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(bind) = self.bind {
            config.bind_address = bind;
        }
        if let Some(path) = self.manifest {
            config.manifest_path = path;
        }
        if let Some(path) = self.pages_dir {
            config.pages_dir = path;
        }
        if let Some(path) = self.shared_dir {
            config.shared_dir = path;
        }
        if let Some(path) = self.data_dir {
            config.data_dir = path;
        }
        if let Some(db) = self.database {
            config.database = DatabaseConfig::parse(&db);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_json);

    let mut config = Config::from_env().context("invalid environment configuration")?;
    cli.apply(&mut config);
    tracing::info!(bind = %config.bind_address, manifest = %config.manifest_path.display(), "starting portico");

    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("cannot bind {}", config.bind_address))?;

    let state = AppBuilder::new(config).build().await?;
    app::startup(&state).await?;
    app::serve(state, listener).await?;

    Ok(())
}
