use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use catalog_engine::{CatalogStore, Config, RefreshScheduler, RefreshService, SqliteCatalogStore, Title};

#[derive(Parser)]
#[command(name = "catalog-refresh")]
#[command(version, author = "TigreRoll")]
#[command(about = "Movie/TV catalog ingestion and merge engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to catalog-engine.toml or config/catalog-engine.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Catalog database, overriding the config file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run refresh cycles: once, or on an interval until Ctrl-C
    Refresh {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,

        /// Hours between cycles (overrides refresh.interval_hours)
        #[arg(long)]
        interval_hours: Option<f64>,
    },
    /// List every catalog title
    List,
    /// Search catalog titles by substring
    Search {
        query: String,

        #[arg(long, default_value_t = 8)]
        limit: usize,
    },
    /// Print the effective configuration
    ShowConfig,
    /// Serve the HTTP API, with the refresh scheduler running in the background
    #[cfg(feature = "api")]
    Serve {
        /// Port to listen on (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Only refresh on demand
        #[arg(long)]
        no_scheduler: bool,
    },
}

fn init_logging(config: &Config, verbose: bool) {
    let level = if verbose { "debug" } else { config.logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("catalog_engine={level},catalog_refresh={level},warn"))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn print_titles(titles: &[Title]) {
    for title in titles {
        let year = title.year.map(|y| y.to_string()).unwrap_or_else(|| "-".to_string());
        let rating = title.rating.map(|r| format!("{:.1}", r)).unwrap_or_else(|| "-".to_string());
        println!(
            "{:>6}  {:<7} {:>4}  {:>4}  {}",
            title.id, title.media_type, year, rating, title.title
        );
    }
}

fn open_store(config: &Config) -> Result<Arc<SqliteCatalogStore>> {
    let path = &config.catalog.database_path;
    let store = SqliteCatalogStore::open(path)
        .with_context(|| format!("Cannot open catalog database {}", path.display()))?;
    info!("🗄️ Catalog database: {}", path.display());
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.catalog.database_path = db;
    }
    init_logging(&config, cli.verbose);
    config.validate()?;

    match cli.command {
        Commands::Refresh { once, interval_hours } => {
            if let Some(hours) = interval_hours {
                config.refresh.interval_hours = hours;
                config.validate()?;
            }
            let config = Arc::new(config);
            let store = open_store(&config)?;
            let service = Arc::new(RefreshService::from_config(config.clone(), store));

            if once {
                let summary = service.run_refresh_cycle().await?;
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }

            let handle = RefreshScheduler::new(service.clone(), config.refresh_interval()).spawn();
            tokio::signal::ctrl_c().await?;
            warn!("🛑 Ctrl-C received, finishing current record and stopping");
            service.request_shutdown();
            handle.await?;
        }
        Commands::List => {
            let store = open_store(&config)?;
            let titles = store.list_all().await?;
            print_titles(&titles);
            info!("📚 {} titles", titles.len());
        }
        Commands::Search { query, limit } => {
            let store = open_store(&config)?;
            print_titles(&store.search(&query, limit).await?);
        }
        Commands::ShowConfig => {
            println!("{}", config.summary());
        }
        #[cfg(feature = "api")]
        Commands::Serve { port, no_scheduler } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            let config = Arc::new(config);
            let store = open_store(&config)?;
            let service = Arc::new(RefreshService::from_config(config.clone(), store));

            let scheduler = if no_scheduler {
                None
            } else {
                Some(RefreshScheduler::new(service.clone(), config.refresh_interval()).spawn())
            };

            let server = catalog_engine::api::ApiServer::new(service.clone(), config.clone()).start_background();
            tokio::select! {
                result = server => {
                    result??;
                }
                _ = tokio::signal::ctrl_c() => {
                    warn!("🛑 Ctrl-C received, shutting down");
                }
            }

            service.request_shutdown();
            if let Some(handle) = scheduler {
                if tokio::time::timeout(std::time::Duration::from_secs(30), handle).await.is_err() {
                    warn!("Refresh still running after 30s, exiting anyway");
                }
            }
        }
    }

    Ok(())
}
