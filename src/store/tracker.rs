//! Tracker store (source side)
//!
//! Read-only access to the session tracker's SQLite database. The tracker
//! owns this file and writes to it concurrently, so the pool is opened
//! read-only and every query joins the `documents` table to carry the
//! identity signals along with each row.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::config::TrackerConfig;
use crate::error::Result;
use crate::matching::SourceDocument;

/// One activity event joined with its document's identity signals
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActivityRow {
    pub id: i64,
    pub document_id: String,
    pub start_time: Option<String>,
    pub duration: Option<i64>,
    /// 0-1 scale
    pub start_percentage: Option<f64>,
    /// 0-1 scale
    pub end_percentage: Option<f64>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub md5: Option<String>,
    pub filepath: Option<String>,
}

impl ActivityRow {
    pub fn document(&self) -> SourceDocument {
        SourceDocument {
            id: self.document_id.clone(),
            title: self.title.clone().unwrap_or_default(),
            author: self.author.clone().unwrap_or_default(),
            filepath: self.filepath.clone().unwrap_or_default(),
            content_hash: self.md5.clone().unwrap_or_default(),
        }
    }
}

/// One document's current reading position joined with its identity signals
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProgressRow {
    pub document_id: String,
    /// 0-1 scale
    pub percentage: Option<f64>,
    /// Opaque reader position token
    pub progress: Option<String>,
    pub device_id: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub md5: Option<String>,
    pub filepath: Option<String>,
}

impl ProgressRow {
    pub fn document(&self) -> SourceDocument {
        SourceDocument {
            id: self.document_id.clone(),
            title: self.title.clone().unwrap_or_default(),
            author: self.author.clone().unwrap_or_default(),
            filepath: self.filepath.clone().unwrap_or_default(),
            content_hash: self.md5.clone().unwrap_or_default(),
        }
    }
}

pub struct TrackerStore {
    pool: SqlitePool,
}

impl TrackerStore {
    pub async fn connect(config: &TrackerConfig) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.db_path)
            .read_only(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Activity events strictly after `watermark`, oldest first
    pub async fn activity_since(&self, watermark: i64) -> Result<Vec<ActivityRow>> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT a.id, a.document_id, a.start_time, a.duration,
                   a.start_percentage, a.end_percentage,
                   d.title, d.author, d.md5, d.filepath
            FROM activity a
            JOIN documents d ON a.document_id = d.id
            WHERE a.id > ?
            ORDER BY a.id ASC
            "#,
        )
        .bind(watermark)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Full snapshot of per-document reading positions
    pub async fn progress_snapshot(&self) -> Result<Vec<ProgressRow>> {
        let rows = sqlx::query_as::<_, ProgressRow>(
            r#"
            SELECT dp.document_id, dp.percentage, dp.progress, dp.device_id,
                   d.title, d.author, d.md5, d.filepath
            FROM document_progress dp
            JOIN documents d ON dp.document_id = d.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

// ============================================================================
// Tests
// ============================================================================
