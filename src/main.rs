use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use hunter_crawler_lib::application::IngestionRun;
use hunter_crawler_lib::domain::product::Source;
use hunter_crawler_lib::domain::repositories::CatalogStore;
use hunter_crawler_lib::infrastructure::{
    AppConfig, BrowserOptions, ChromiumLauncher, DatabaseConnection, HttpClient, HttpClientConfig,
    InMemoryCatalogStore, SqliteCatalogStore, init_logging, log_system_info,
};

/// Product discovery and ingestion for Kabum and Mercado Livre
#[derive(Parser, Debug)]
#[command(name = "hunter-crawler", version, about)]
struct Cli {
    /// Configuration file (defaults to ./hunter.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl the enabled sources and upsert what they list
    Run {
        /// Only crawl this source (kabum or mercadolivre)
        #[arg(long)]
        source: Option<Source>,

        /// Page limit per target, for every source
        #[arg(long)]
        max_pages: Option<u32>,

        /// Item cap for the whole run
        #[arg(long)]
        max_items: Option<usize>,

        /// Keep results in memory instead of writing to the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Look up stored listings by name, cheapest first
    Search {
        name: String,

        #[arg(long, default_value_t = 20)]
        limit: u32,

        /// Print the listings as JSON
        #[arg(long)]
        json: bool,
    },
}

const EXIT_SETUP_FAILURE: u8 = 1;
const EXIT_ALL_SOURCES_FAILED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("hunter-crawler: {e}");
            return ExitCode::from(EXIT_SETUP_FAILURE);
        }
    };

    let _log_guard = match init_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("hunter-crawler: failed to initialize logging: {e:#}");
            return ExitCode::from(EXIT_SETUP_FAILURE);
        }
    };
    log_system_info();

    match cli.command {
        Command::Run {
            source,
            max_pages,
            max_items,
            dry_run,
        } => {
            if let Some(pages) = max_pages {
                config.kabum.max_pages = pages;
                config.mercadolivre.max_pages = pages;
            }
            if let Some(items) = max_items {
                config.crawl.max_items_total = items;
            }
            if let Err(e) = config.validate() {
                error!("Invalid command line override: {}", e);
                return ExitCode::from(EXIT_SETUP_FAILURE);
            }
            run(config, source, dry_run).await
        }
        Command::Search { name, limit, json } => match search(&config, &name, limit, json).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Search failed: {:#}", e);
                ExitCode::from(EXIT_SETUP_FAILURE)
            }
        },
    }
}

async fn open_database(config: &AppConfig) -> Result<DatabaseConnection> {
    let connection = DatabaseConnection::from_config(&config.database)
        .await
        .with_context(|| format!("could not open database {}", config.database.url))?;
    connection.migrate().await.context("could not prepare catalog tables")?;
    Ok(connection)
}

async fn run(config: AppConfig, only: Option<Source>, dry_run: bool) -> ExitCode {
    let connection = if dry_run {
        info!("Dry run: results are kept in memory only");
        None
    } else {
        match open_database(&config).await {
            Ok(connection) => Some(connection),
            Err(e) => {
                error!("Database setup failed: {:#}", e);
                return ExitCode::from(EXIT_SETUP_FAILURE);
            }
        }
    };
    let store: Arc<dyn CatalogStore> = match &connection {
        Some(connection) => Arc::new(SqliteCatalogStore::new(connection.pool().clone())),
        None => Arc::new(InMemoryCatalogStore::new()),
    };

    let fetcher = match HttpClient::new(&HttpClientConfig::from(&config.mercadolivre)) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("HTTP client setup failed: {}", e);
            return ExitCode::from(EXIT_SETUP_FAILURE);
        }
    };
    let renderers = Arc::new(ChromiumLauncher::new(BrowserOptions::from(&config.kabum)));

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing the current page");
            ctrl_c.cancel();
        }
    });

    let summary = IngestionRun::new(config, store, renderers, fetcher)
        .with_cancellation(cancel)
        .only(only)
        .execute()
        .await;

    if let Some(connection) = connection {
        connection.close().await;
    }
    print!("{summary}");

    if summary.all_failed() {
        error!("Every enabled source failed");
        return ExitCode::from(EXIT_ALL_SOURCES_FAILED);
    }
    ExitCode::SUCCESS
}

async fn search(config: &AppConfig, name: &str, limit: u32, json: bool) -> Result<()> {
    let connection = open_database(config).await?;
    let store = SqliteCatalogStore::new(connection.pool().clone());
    let listings = store.search_by_name(name, limit).await?;
    connection.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&listings)?);
        return Ok(());
    }
    if listings.is_empty() {
        println!("No listings match '{name}'");
        return Ok(());
    }
    for listing in &listings {
        println!(
            "{:>10.2}  {:<13} {}\n            {}",
            listing.record.price.value(),
            listing.source.as_str(),
            listing.record.name,
            listing.record.link
        );
    }
    Ok(())
}
