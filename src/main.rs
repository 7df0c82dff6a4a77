//! # adserve: CLI Entry Point
//!
//! ## Subcommands
//!
//! - `serve`: run the HTTP API on PostgreSQL (or in memory with `--in-memory`)
//! - `migrate`: apply the database schema
//! - `config`: print the effective configuration as TOML
//!
//! Connection URLs come from `--database-url` / `DATABASE_URL` and
//! `--redis-url` / `REDIS_URL`; a `.env` file is loaded first when present.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use adserve::clock::DayClock;
use adserve::config::Config;
use adserve::db::Database;
use adserve::memory::MemoryStore;
use adserve::scoring::Scorer;
use adserve::server::{self, AppState, Readiness};
use adserve::{AdEngine, AdStore, Clock};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "adserve", about = "Real-time ad selection with fair rotation")]
struct Cli {
    /// PostgreSQL connection URL (or set DATABASE_URL env var)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Redis URL for persisting the simulated day (or set REDIS_URL env var)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// TOML configuration file
    #[arg(long, env = "ADSERVE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Listen port (overrides [server].port)
        #[arg(long)]
        port: Option<u16>,
        /// Keep all data in process memory instead of PostgreSQL
        #[arg(long)]
        in_memory: bool,
    },
    /// Apply the database schema
    Migrate,
    /// Print the effective configuration
    Config,
}

impl Cli {
    fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required (set via --database-url or env)"))
    }

    fn load_config(&self) -> Result<Config> {
        match &self.config {
            Some(path) => Config::load(path),
            None => Ok(Config::default()),
        }
    }
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // LOG_FORMAT=json for log shippers, human-readable otherwise
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();
    let mut config = cli.load_config()?;

    match &cli.command {
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Migrate => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(migrate(&cli, &config))
        }
        Commands::Serve { port, in_memory } => {
            if let Some(port) = port {
                config.server.port = *port;
            }
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_server(&cli, &config, *in_memory))
        }
    }
}

async fn migrate(cli: &Cli, config: &Config) -> Result<()> {
    let db = Database::connect(cli.database_url()?, config.database.max_connections).await?;
    db.migrate().await?;
    info!("schema applied");
    Ok(())
}

async fn run_server(cli: &Cli, config: &Config, in_memory: bool) -> Result<()> {
    let clock = match cli.redis_url.as_deref() {
        Some(url) => DayClock::connect(url).await?,
        None => {
            warn!("REDIS_URL not set, simulated day starts at 0 and is not persisted");
            DayClock::new(0)
        }
    };
    let clock = Arc::new(clock);
    if in_memory {
        serve(MemoryStore::new(), clock, config).await
    } else {
        let db = Database::connect(cli.database_url()?, config.database.max_connections).await?;
        serve(db, clock, config).await
    }
}

async fn serve<S: AdStore + Readiness>(store: S, clock: Arc<DayClock>, config: &Config) -> Result<()> {
    let scorer = Scorer::new(config.scoring).context("invalid [scoring] weights")?;
    let day_source: Arc<dyn Clock> = clock.clone();
    let engine = AdEngine::new(
        Arc::new(store),
        Arc::new(scorer),
        day_source,
        config.server.request_timeout(),
    );
    info!(
        day = clock.today(),
        request_timeout_ms = config.server.request_timeout_ms,
        "starting ad server"
    );
    let state = AppState::new(engine, clock);
    server::run(state, &config.server).await
}
