//! Library store (target side)
//!
//! MySQL access to the library manager: the catalog query that feeds the
//! match index, plus transactional writers for reading sessions and
//! progress rows. Each sync pass gets one transaction, so a failed pass
//! rolls back as a unit and the dedup probe sees the pass's own
//! uncommitted inserts.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlConnection, MySqlPool, MySqlPoolOptions};
use sqlx::Transaction;

use super::{NewSession, ProgressStore, ProgressUpsert, SessionStore, DEDUP_WINDOW_SECS};
use crate::catalog::CatalogRow;
use crate::config::LibraryConfig;
use crate::error::Result;

pub struct LibraryStore {
    pool: MySqlPool,
}

impl LibraryStore {
    pub async fn connect(config: &LibraryConfig) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub async fn begin(&self) -> Result<Transaction<'static, MySql>> {
        Ok(self.pool.begin().await?)
    }

    /// Identity signals for every non-deleted book, one row per book with
    /// authors, filenames, and hashes aggregated across its files
    pub async fn load_catalog(&self) -> Result<Vec<CatalogRow>> {
        let rows = sqlx::query_as::<_, CatalogRow>(
            r#"
            SELECT b.id AS book_id,
                   bm.title,
                   GROUP_CONCAT(DISTINCT a.name SEPARATOR ', ') AS authors,
                   GROUP_CONCAT(DISTINCT bf.file_name SEPARATOR '|') AS filenames,
                   GROUP_CONCAT(DISTINCT COALESCE(bf.initial_hash, bf.current_hash)
                                SEPARATOR '|') AS hashes
            FROM book b
            JOIN book_metadata bm ON b.id = bm.book_id
            LEFT JOIN book_metadata_author_mapping bam ON bm.book_id = bam.book_id
            LEFT JOIN author a ON bam.author_id = a.id
            LEFT JOIN book_file bf ON b.id = bf.book_id
            WHERE b.deleted = 0
            GROUP BY b.id, bm.title
            ORDER BY b.id
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

/// Session inserts scoped to one transaction
pub struct SessionWriter<'t> {
    conn: &'t mut MySqlConnection,
}

impl<'t> SessionWriter<'t> {
    pub fn new(conn: &'t mut MySqlConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SessionStore for SessionWriter<'_> {
    async fn recent_session_exists(
        &mut self,
        user_id: i64,
        book_id: i64,
        start_time: NaiveDateTime,
    ) -> Result<bool> {
        let existing = sqlx::query(
            r#"
            SELECT id FROM reading_sessions
            WHERE user_id = ? AND book_id = ?
              AND ABS(TIMESTAMPDIFF(SECOND, start_time, ?)) < ?
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(start_time)
        .bind(DEDUP_WINDOW_SECS)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(existing.is_some())
    }

    async fn insert_session(&mut self, session: &NewSession) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reading_sessions
                (user_id, book_id, book_type, start_time, end_time,
                 duration_seconds, start_progress, end_progress,
                 progress_delta, source_ref, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NOW())
            "#,
        )
        .bind(session.user_id)
        .bind(session.book_id)
        .bind(session.book_type.as_str())
        .bind(session.start_time)
        .bind(session.end_time)
        .bind(session.duration_seconds)
        .bind(session.start_progress)
        .bind(session.end_progress)
        .bind(session.progress_delta)
        .bind(&session.source_ref)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }
}

/// Progress reads and writes scoped to one transaction
pub struct ProgressWriter<'t> {
    conn: &'t mut MySqlConnection,
}

impl<'t> ProgressWriter<'t> {
    pub fn new(conn: &'t mut MySqlConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ProgressStore for ProgressWriter<'_> {
    async fn progress_percent(&mut self, user_id: i64, book_id: i64) -> Result<Option<f64>> {
        let row = sqlx::query_as::<_, (Option<f64>,)>(
            r#"
            SELECT reader_progress_percent FROM user_book_progress
            WHERE user_id = ? AND book_id = ?
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_optional(&mut *self.conn)
        .await?;

        // A row with a NULL percent counts as zero progress, not absence
        Ok(row.map(|(percent,)| percent.unwrap_or(0.0)))
    }

    async fn update_progress(&mut self, row: &ProgressUpsert) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE user_book_progress
            SET reader_progress = ?,
                reader_progress_percent = ?,
                reader_device = ?,
                reader_device_id = ?,
                reader_last_sync_time = NOW(),
                last_read_time = NOW(),
                read_status = COALESCE(?, read_status)
            WHERE user_id = ? AND book_id = ?
            "#,
        )
        .bind(row.progress_token.as_deref())
        .bind(row.percent)
        .bind(row.device)
        .bind(row.device_id.as_deref())
        .bind(row.read_status)
        .bind(row.user_id)
        .bind(row.book_id)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    async fn insert_progress(&mut self, row: &ProgressUpsert) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_book_progress
                (user_id, book_id, reader_progress, reader_progress_percent,
                 reader_device, reader_device_id, reader_last_sync_time,
                 last_read_time, read_status)
            VALUES (?, ?, ?, ?, ?, ?, NOW(), NOW(), ?)
            "#,
        )
        .bind(row.user_id)
        .bind(row.book_id)
        .bind(row.progress_token.as_deref())
        .bind(row.percent)
        .bind(row.device)
        .bind(row.device_id.as_deref())
        .bind(row.read_status.unwrap_or("UNREAD"))
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }
}
