//! SQLite catalog store
//!
//! One table per source. A [`CatalogBatch`] wraps a SQL transaction, so a
//! page's writes land together or not at all. Batches of one store are
//! serialized: a deferred WAL transaction that reads before another commits
//! cannot upgrade to a writer (`SQLITE_BUSY_SNAPSHOT`).

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, Transaction};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::product::{CatalogListing, CatalogRecord, NewCatalogRecord, Price, RecordChanges, Source};
use crate::domain::repositories::{CatalogBatch, CatalogStore, StorageError, StorageResult};

const RECORD_COLUMNS: &str = "id, name, price, link, primary_image, gallery_images, updated_at";

#[derive(Clone)]
pub struct SqliteCatalogStore {
    pool: SqlitePool,
    writer: Arc<Mutex<()>>,
}

impl SqliteCatalogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            writer: Arc::new(Mutex::new(())),
        }
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn begin(&self, source: Source) -> StorageResult<Box<dyn CatalogBatch>> {
        let writer = Arc::clone(&self.writer).lock_owned().await;
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteBatch {
            source,
            tx,
            _writer: writer,
        }))
    }

    async fn search_by_name(&self, fragment: &str, limit: u32) -> StorageResult<Vec<CatalogListing>> {
        let pattern = format!("%{}%", escape_like(fragment));
        let selects: Vec<String> = Source::ALL
            .iter()
            .map(|source| {
                format!(
                    "SELECT '{}' AS source, {RECORD_COLUMNS} FROM {} WHERE name LIKE ? ESCAPE '\\'",
                    source.as_str(),
                    source.table()
                )
            })
            .collect();
        let sql = format!("{} ORDER BY price ASC, id ASC LIMIT ?", selects.join(" UNION ALL "));

        let mut query = sqlx::query(&sql);
        for _ in Source::ALL {
            query = query.bind(pattern.clone());
        }
        let rows = query.bind(i64::from(limit)).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| -> StorageResult<CatalogListing> {
                let record = record_from_row(row)?;
                let source: String = row.try_get("source")?;
                let source = Source::from_str(&source).map_err(|reason| StorageError::InvalidRow {
                    id: record.id,
                    reason,
                })?;
                Ok(CatalogListing { source, record })
            })
            .collect()
    }

    async fn count(&self, source: Source) -> StorageResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", source.table());
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

struct SqliteBatch {
    source: Source,
    // Declared before the guard: rollback on drop happens while still holding it
    tx: Transaction<'static, Sqlite>,
    _writer: OwnedMutexGuard<()>,
}

#[async_trait]
impl CatalogBatch for SqliteBatch {
    fn source(&self) -> Source {
        self.source
    }

    async fn find_by_name_and_link(&mut self, name: &str, link: &str) -> StorageResult<Option<CatalogRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM {} WHERE name = ? AND link = ? ORDER BY id DESC LIMIT 1",
            self.source.table()
        );
        let row = sqlx::query(&sql)
            .bind(name)
            .bind(link)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn insert(&mut self, record: &NewCatalogRecord) -> StorageResult<i64> {
        let gallery = encode_gallery(&record.link, record.gallery_images.as_deref())?;
        let sql = format!(
            "INSERT INTO {} (name, price, link, primary_image, gallery_images, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
            self.source.table()
        );
        let result = sqlx::query(&sql)
            .bind(&record.name)
            .bind(record.price.value())
            .bind(&record.link)
            .bind(&record.primary_image)
            .bind(gallery)
            .bind(Utc::now())
            .execute(&mut *self.tx)
            .await?;
        Ok(result.last_insert_rowid())
    }

    async fn update(&mut self, id: i64, changes: &RecordChanges) -> StorageResult<()> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("UPDATE {} SET updated_at = ", self.source.table()));
        builder.push_bind(Utc::now());
        if let Some(price) = changes.price {
            builder.push(", price = ").push_bind(price.value());
        }
        if let Some(image) = &changes.primary_image {
            builder.push(", primary_image = ").push_bind(image.clone());
        }
        if let Some(gallery) = &changes.gallery_images {
            let encoded = encode_gallery(&format!("record {id}"), Some(gallery))?;
            builder.push(", gallery_images = ").push_bind(encoded);
        }
        builder.push(" WHERE id = ").push_bind(id);

        let result = builder.build().execute(&mut *self.tx).await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::RecordNotFound {
                id,
                collection: self.source,
            });
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        let Self { tx, _writer: writer, .. } = *self;
        tx.commit().await?;
        drop(writer);
        Ok(())
    }
}

fn record_from_row(row: &SqliteRow) -> StorageResult<CatalogRecord> {
    let id: i64 = row.try_get("id")?;
    let amount: f64 = row.try_get("price")?;
    let price = Price::new(amount).ok_or_else(|| StorageError::InvalidRow {
        id,
        reason: format!("non-positive price {amount}"),
    })?;
    let gallery: Option<String> = row.try_get("gallery_images")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(CatalogRecord {
        id,
        name: row.try_get("name")?,
        price,
        link: row.try_get("link")?,
        primary_image: row.try_get("primary_image")?,
        // An unreadable gallery is treated as absent
        gallery_images: gallery.and_then(|json| serde_json::from_str(&json).ok()),
        updated_at,
    })
}

fn encode_gallery(owner: &str, gallery: Option<&[String]>) -> StorageResult<Option<String>> {
    match gallery {
        Some(images) if !images.is_empty() => serde_json::to_string(images)
            .map(Some)
            .map_err(|source| StorageError::Serialization {
                link: owner.to_string(),
                source,
            }),
        _ => Ok(None),
    }
}

fn escape_like(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
