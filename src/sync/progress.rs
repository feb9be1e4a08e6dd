//! Progress merge
//!
//! Reconciles the tracker's per-document reading positions into the target's
//! per-book progress rows. Every cycle scans the full snapshot; a stored row
//! is only rewritten when the tracker is ahead or the two positions have
//! drifted by more than one percentage point, so minor target-side jitter
//! survives while real movement always lands.

use serde::Serialize;
use tracing::debug;

use crate::catalog::CatalogIndex;
use crate::error::Result;
use crate::matching::resolve;
use crate::store::tracker::ProgressRow;
use crate::store::{ProgressStore, ProgressUpsert};

/// Device name recorded on rows this service writes
const SYNC_DEVICE: &str = "tracker";
/// Fraction at or above which a book counts as finished
const READ_THRESHOLD: f64 = 0.95;

/// Counters for one progress pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProgressReport {
    pub scanned: usize,
    pub updated: usize,
    pub inserted: usize,
    pub unmatched: usize,
    pub unchanged: usize,
}

/// Merge the tracker's progress snapshot into the progress store for
/// `user_id`. The first store error aborts the pass so the surrounding
/// transaction rolls back as a unit.
pub async fn merge_progress<P>(
    records: &[ProgressRow],
    index: &CatalogIndex,
    progress: &mut P,
    user_id: i64,
) -> Result<ProgressReport>
where
    P: ProgressStore,
{
    let mut report = ProgressReport::default();

    for record in records {
        report.scanned += 1;

        let doc = record.document();
        let Some(book_id) = resolve(&doc, index) else {
            debug!(
                document_id = %record.document_id,
                title = %doc.title,
                "No catalog match for progress record"
            );
            report.unmatched += 1;
            continue;
        };

        let percent = record.percentage.unwrap_or(0.0);
        let row = ProgressUpsert {
            user_id,
            book_id,
            progress_token: record.progress.clone(),
            percent,
            device: SYNC_DEVICE,
            device_id: record.device_id.clone(),
            read_status: read_status_for(percent),
        };

        match progress.progress_percent(user_id, book_id).await? {
            Some(stored) => {
                if should_update(stored, percent) {
                    progress.update_progress(&row).await?;
                    report.updated += 1;
                    debug!(
                        book_id,
                        percent = format!("{percent:.4}"),
                        "Updated progress"
                    );
                } else {
                    report.unchanged += 1;
                }
            }
            None => {
                progress.insert_progress(&row).await?;
                report.inserted += 1;
                debug!(
                    book_id,
                    percent = format!("{percent:.4}"),
                    "Inserted progress"
                );
            }
        }
    }

    Ok(report)
}

/// Whether an incoming position should replace the stored one: any forward
/// movement, or a disagreement of more than one percentage point in either
/// direction
fn should_update(stored: f64, incoming: f64) -> bool {
    incoming > stored || (incoming - stored).abs() * 100.0 > 1.0
}

/// Status implied by a position. `None` at zero so an update never
/// downgrades a stored status.
fn read_status_for(percent: f64) -> Option<&'static str> {
    if percent >= READ_THRESHOLD {
        Some("READ")
    } else if percent > 0.0 {
        Some("READING")
    } else {
        None
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogRow;
    use crate::error::AppError;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct StoredProgress {
        percent: f64,
        status: String,
        token: Option<String>,
    }

    #[derive(Default)]
    struct MemoryProgressStore {
        rows: HashMap<(i64, i64), StoredProgress>,
        /// Fail the insert once this many rows are stored
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl ProgressStore for MemoryProgressStore {
        async fn progress_percent(&mut self, user_id: i64, book_id: i64) -> Result<Option<f64>> {
            Ok(self.rows.get(&(user_id, book_id)).map(|row| row.percent))
        }

        async fn update_progress(&mut self, row: &ProgressUpsert) -> Result<()> {
            let stored = self
                .rows
                .get_mut(&(row.user_id, row.book_id))
                .expect("update of missing row");
            stored.percent = row.percent;
            stored.token = row.progress_token.clone();
            if let Some(status) = row.read_status {
                stored.status = status.to_string();
            }
            Ok(())
        }

        async fn insert_progress(&mut self, row: &ProgressUpsert) -> Result<()> {
            if self.fail_after == Some(self.rows.len()) {
                return Err(AppError::Io(std::io::Error::other("connection reset")));
            }
            self.rows.insert(
                (row.user_id, row.book_id),
                StoredProgress {
                    percent: row.percent,
                    status: row.read_status.unwrap_or("UNREAD").to_string(),
                    token: row.progress_token.clone(),
                },
            );
            Ok(())
        }
    }

    fn make_record(document_id: &str, percentage: f64) -> ProgressRow {
        ProgressRow {
            document_id: document_id.to_string(),
            percentage: Some(percentage),
            progress: Some("epubcfi(/6/4!/2)".to_string()),
            device_id: Some("device-9".to_string()),
            title: Some("Dune".to_string()),
            author: Some("Frank Herbert".to_string()),
            md5: Some("aabb".to_string()),
            filepath: Some("/books/dune.epub".to_string()),
        }
    }

    fn make_index() -> CatalogIndex {
        CatalogIndex::from_rows(vec![CatalogRow {
            book_id: 5,
            title: Some("Dune".to_string()),
            authors: Some("Frank Herbert".to_string()),
            filenames: Some("dune.epub".to_string()),
            hashes: Some("aabb".to_string()),
        }])
    }

    #[test]
    fn test_should_update_forward_movement() {
        assert!(should_update(0.80, 0.82));
        // Any forward movement counts, however small
        assert!(should_update(0.80, 0.803));
    }

    #[test]
    fn test_should_update_large_regression() {
        assert!(should_update(0.80, 0.785));
    }

    #[test]
    fn test_should_update_rejects_small_regression() {
        assert!(!should_update(0.80, 0.795));
        assert!(!should_update(0.5, 0.5));
    }

    #[test]
    fn test_should_update_exactly_one_point_is_not_enough() {
        assert!(!should_update(0.01, 0.0));
    }

    #[test]
    fn test_read_status_thresholds() {
        assert_eq!(read_status_for(1.0), Some("READ"));
        assert_eq!(read_status_for(0.95), Some("READ"));
        assert_eq!(read_status_for(0.5), Some("READING"));
        assert_eq!(read_status_for(0.001), Some("READING"));
        assert_eq!(read_status_for(0.0), None);
    }

    #[tokio::test]
    async fn test_merge_inserts_new_row() {
        let index = make_index();
        let mut store = MemoryProgressStore::default();
        let records = vec![make_record("doc1", 0.5)];

        let report = merge_progress(&records, &index, &mut store, 1)
            .await
            .unwrap();

        assert_eq!(report.inserted, 1);
        let stored = &store.rows[&(1, 5)];
        assert!((stored.percent - 0.5).abs() < 1e-9);
        assert_eq!(stored.status, "READING");
        assert_eq!(stored.token.as_deref(), Some("epubcfi(/6/4!/2)"));
    }

    #[tokio::test]
    async fn test_merge_insert_at_zero_is_unread() {
        let index = make_index();
        let mut store = MemoryProgressStore::default();
        let records = vec![make_record("doc1", 0.0)];

        merge_progress(&records, &index, &mut store, 1)
            .await
            .unwrap();

        assert_eq!(store.rows[&(1, 5)].status, "UNREAD");
    }

    #[tokio::test]
    async fn test_merge_insert_finished_book_is_read() {
        let index = make_index();
        let mut store = MemoryProgressStore::default();
        let records = vec![make_record("doc1", 0.97)];

        merge_progress(&records, &index, &mut store, 1)
            .await
            .unwrap();

        assert_eq!(store.rows[&(1, 5)].status, "READ");
    }

    #[tokio::test]
    async fn test_merge_updates_forward() {
        let index = make_index();
        let mut store = MemoryProgressStore::default();

        merge_progress(&[make_record("doc1", 0.5)], &index, &mut store, 1)
            .await
            .unwrap();
        let report = merge_progress(&[make_record("doc1", 0.6)], &index, &mut store, 1)
            .await
            .unwrap();

        assert_eq!(report.updated, 1);
        assert!((store.rows[&(1, 5)].percent - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_merge_skips_small_regression() {
        let index = make_index();
        let mut store = MemoryProgressStore::default();

        merge_progress(&[make_record("doc1", 0.80)], &index, &mut store, 1)
            .await
            .unwrap();
        let report = merge_progress(&[make_record("doc1", 0.795)], &index, &mut store, 1)
            .await
            .unwrap();

        assert_eq!(report.updated, 0);
        assert_eq!(report.unchanged, 1);
        assert!((store.rows[&(1, 5)].percent - 0.80).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_merge_regression_to_zero_keeps_status() {
        let index = make_index();
        let mut store = MemoryProgressStore::default();

        merge_progress(&[make_record("doc1", 0.80)], &index, &mut store, 1)
            .await
            .unwrap();
        let report = merge_progress(&[make_record("doc1", 0.0)], &index, &mut store, 1)
            .await
            .unwrap();

        // The big regression rewrites the position but a zero percent
        // carries no status, so READING survives
        assert_eq!(report.updated, 1);
        let stored = &store.rows[&(1, 5)];
        assert!(stored.percent.abs() < 1e-9);
        assert_eq!(stored.status, "READING");
    }

    #[tokio::test]
    async fn test_merge_unmatched_counted() {
        let index = CatalogIndex::from_rows(vec![]);
        let mut store = MemoryProgressStore::default();
        let records = vec![make_record("ghost", 0.5)];

        let report = merge_progress(&records, &index, &mut store, 1)
            .await
            .unwrap();

        assert_eq!(report.scanned, 1);
        assert_eq!(report.unmatched, 1);
        assert!(store.rows.is_empty());
    }

    #[tokio::test]
    async fn test_store_error_aborts_merge() {
        let index = CatalogIndex::from_rows(vec![
            CatalogRow {
                book_id: 5,
                title: Some("Dune".to_string()),
                authors: None,
                filenames: None,
                hashes: Some("aabb".to_string()),
            },
            CatalogRow {
                book_id: 6,
                title: Some("Dune Messiah".to_string()),
                authors: None,
                filenames: None,
                hashes: Some("ccdd".to_string()),
            },
            CatalogRow {
                book_id: 7,
                title: Some("Children of Dune".to_string()),
                authors: None,
                filenames: None,
                hashes: Some("eeff".to_string()),
            },
        ]);
        let mut store = MemoryProgressStore {
            fail_after: Some(1),
            ..Default::default()
        };

        let mut second = make_record("doc2", 0.4);
        second.md5 = Some("ccdd".to_string());
        let mut third = make_record("doc3", 0.6);
        third.md5 = Some("eeff".to_string());
        let records = vec![make_record("doc1", 0.5), second, third];

        let result = merge_progress(&records, &index, &mut store, 1).await;

        // The failed write ends the pass; the third record is never attempted
        assert!(result.is_err());
        assert_eq!(store.rows.len(), 1);
        assert!(store.rows.contains_key(&(1, 5)));
    }

    #[tokio::test]
    async fn test_merge_token_passthrough() {
        let index = make_index();
        let mut store = MemoryProgressStore::default();
        let mut record = make_record("doc1", 0.5);
        record.progress = Some("/body/DocFragment[12]/div/p[3]/text().181".to_string());

        merge_progress(&[record.clone()], &index, &mut store, 1)
            .await
            .unwrap();

        assert_eq!(store.rows[&(1, 5)].token, record.progress);
    }
}
