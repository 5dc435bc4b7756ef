//! astral: offline fetch gate CLI
//!
//! Fetch URLs through the cache-first gate and inspect the on-disk stores.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use astral_cache::config::Config;
use astral_cache::{CacheStorage, DiskStorage, Method, Request};

/// How long `fetch` waits for background refreshes before exiting.
const SETTLE_LIMIT: Duration = Duration::from_secs(10);

/// Astral offline fetch gate
#[derive(Parser)]
#[command(name = "astral")]
#[command(version = astral_cache::PKG_VERSION)]
#[command(about = "Cache-first offline fetch gate")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "ASTRAL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch URLs through the gate
    Fetch {
        /// URLs to fetch, in order
        #[arg(required = true)]
        urls: Vec<String>,
        /// HTTP method (non-GET bypasses the cache)
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// Print only status lines, not bodies
        #[arg(short, long)]
        quiet: bool,
    },

    /// List cache stores
    Stores,

    /// List the entries of a cache store
    Entries {
        /// Store name (default: the configured cache name)
        #[arg(short, long)]
        store: Option<String>,
    },

    /// Delete a cache store
    Purge {
        /// Store name (default: the configured cache name)
        #[arg(short, long)]
        store: Option<String>,
    },

    /// Print the full version string
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;

    match args.command {
        Command::Fetch {
            urls,
            method,
            quiet,
        } => {
            let method: Method = method.to_uppercase().parse().map_err(|e| {
                astral_cache::AstralError::InvalidInput(format!("invalid method {method}: {e}"))
            })?;

            let worker = config.worker_builder().build()?;
            worker.register().await?;
            info!(version = astral_cache::version_string(), "worker active");

            for url in urls {
                let response = worker.fetch(Request::new(method.clone(), url.clone())).await?;
                println!("{} {} {}", response.status, method, url);
                if !quiet {
                    println!("{}", response.text());
                }
            }

            // Let background refreshes reach the store before exiting.
            if !worker.settle_for(SETTLE_LIMIT).await {
                warn!("some background refreshes did not finish and were dropped");
            }
        }

        Command::Stores => {
            let storage = disk_storage(&config)?;
            for name in storage.keys().await? {
                let marker = if name == config.cache.name { "*" } else { " " };
                println!("{marker} {name}");
            }
        }

        Command::Entries { store } => {
            let storage = disk_storage(&config)?;
            let name = store.unwrap_or_else(|| config.cache.name.clone());
            if !storage.has(&name).await? {
                println!("no store named {name}");
                return Ok(());
            }
            let store = storage.open(&name).await?;
            for key in store.keys().await? {
                if let Some(response) = store.match_key(&key).await? {
                    println!("{key} → {} ({} bytes)", response.status, response.body.len());
                }
            }
        }

        Command::Purge { store } => {
            let storage = disk_storage(&config)?;
            let name = store.unwrap_or_else(|| config.cache.name.clone());
            if storage.delete(&name).await? {
                println!("deleted {name}");
            } else {
                println!("no store named {name}");
            }
        }

        Command::Version => {
            println!("astral {}", astral_cache::version_string());
        }
    }

    Ok(())
}

/// The configured on-disk storage. Store inspection needs persistent stores.
fn disk_storage(config: &Config) -> Result<Arc<dyn CacheStorage>, astral_cache::AstralError> {
    match config.cache.storage.dir() {
        Some(dir) => Ok(Arc::new(DiskStorage::new(dir))),
        None => Err(astral_cache::AstralError::Configuration(
            "store inspection requires disk storage ([cache.storage] kind = \"disk\")"
                .to_string(),
        )),
    }
}
