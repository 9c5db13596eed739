//! Binary entrypoint for the Kingsreach CLI.
//!
//! Commands:
//! - `start [--bind <addr>] [--port <n>]` - open the realm store and serve the HTTP API
//! - `init` - write a starter `config.toml` and seed the realm store
//! - `status` - print a short summary of the stored realm
//!
//! See the library crate docs for module-level details: `kingsreach::`.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;

use kingsreach::api::{serve, AppState};
use kingsreach::config::Config;
use kingsreach::realm::{QuestCatalog, RealmStore};

#[derive(Parser)]
#[command(name = "kingsreach")]
#[command(about = "Server for a persistent medieval strategy realm")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Start {
        /// Override the configured bind address
        #[arg(short, long)]
        bind: Option<String>,

        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Write a default configuration and seed the realm store
    Init,
    /// Show realm status and statistics
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Init runs before a config file exists.
    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Start { bind, port } => {
            let mut config = match pre_config {
                Some(config) => config,
                None => {
                    warn!(
                        "Could not load {}; starting with default configuration",
                        cli.config
                    );
                    Config::default()
                }
            };
            if let Some(bind) = bind {
                config.server.bind_address = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            info!("Starting Kingsreach v{}", env!("CARGO_PKG_VERSION"));

            let store = open_store(&config)?;
            let catalog = QuestCatalog::load(config.quests.catalog_path.as_deref().map(Path::new))?;
            info!("Loaded {} quest definitions", catalog.len());

            let state = Arc::new(AppState::new(store, catalog, config));
            serve(state, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for shutdown signal: {}", e);
                    std::future::pending::<()>().await;
                }
                info!("Shutdown requested");
            })
            .await?;
        }
        Commands::Init => {
            if Path::new(&cli.config).exists() {
                println!("Configuration already exists at {}; leaving it untouched.", cli.config);
            } else {
                Config::create_default(&cli.config).await?;
                println!("Wrote default configuration to {}", cli.config);
            }
            let config = Config::load(&cli.config).await?;
            let store = open_store(&config)?;
            println!(
                "Realm store ready at {} ({} factions seeded)",
                config.storage.realm_path().display(),
                store.list_factions()?.len()
            );
        }
        Commands::Status => {
            let config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            let store = open_store(&config)?;
            println!("Kingsreach v{}", env!("CARGO_PKG_VERSION"));
            println!("Realm store: {}", config.storage.realm_path().display());
            println!("Listen address: {}:{}", config.server.bind_address, config.server.port);
            println!("Players: {}", store.count_players());
            println!("Armies: {}", store.count_armies());
            println!("Map tiles: {}", store.count_tiles());
        }
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<RealmStore> {
    let path = config.storage.realm_path();
    RealmStore::open(&path).with_context(|| format!("opening realm store at {}", path.display()))
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity wins over the configured level
    let configured = config
        .as_ref()
        .and_then(|cfg| cfg.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    let base_level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    // sled is chatty at debug
    builder.filter_module("sled", log::LevelFilter::Warn);

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });
    let security_path = config.as_ref().and_then(|cfg| cfg.logging.security_file.clone());

    match log_file {
        Some(f) => {
            let file = std::sync::Mutex::new(f);
            // Only echo to the console when someone is watching it
            let is_tty = atty::is(atty::Stream::Stdout);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = file.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if record.target() == "security" {
                    if let Some(ref sec_path) = security_path {
                        if let Ok(mut sf) = std::fs::OpenOptions::new()
                            .create(true)
                            .append(true)
                            .open(sec_path)
                        {
                            let _ = writeln!(sf, "{}", line);
                        }
                    }
                }
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    }
    let _ = builder.try_init();
}
