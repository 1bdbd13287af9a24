// Database connection and pool management
// This module handles SQLite database connections using sqlx

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::info;

use crate::domain::product::Source;
use crate::infrastructure::config::DatabaseConfig;

/// How long a connection waits on another writer (other processes included)
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        if let Some(parent) = database_file(database_url).and_then(|path| path.parent()) {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL '{database_url}'"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database '{database_url}'"))?;

        info!("Connected to database: {}", database_url);
        Ok(Self { pool })
    }

    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::new(&config.url, config.max_connections).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the catalog tables and their natural-key indexes
    pub async fn migrate(&self) -> Result<()> {
        for source in Source::ALL {
            let table = source.table();
            let create_table_sql = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    price REAL NOT NULL,
                    link TEXT NOT NULL,
                    primary_image TEXT,
                    gallery_images TEXT,
                    updated_at TEXT NOT NULL
                )
                "#
            );
            let create_index_sql =
                format!("CREATE INDEX IF NOT EXISTS idx_{table}_name_link ON {table} (name, link)");

            sqlx::query(&create_table_sql).execute(&self.pool).await?;
            sqlx::query(&create_index_sql).execute(&self.pool).await?;
        }

        info!("Catalog tables ready");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Filesystem path behind a `sqlite:` URL, if it names a file
fn database_file(database_url: &str) -> Option<&Path> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);
    let path = path.split('?').next().unwrap_or(path);
    (!path.is_empty() && !path.starts_with(":memory:")).then(|| Path::new(path))
}
