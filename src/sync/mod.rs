//! Sync engine
//!
//! One cycle loads the catalog index, replays new activity events inside a
//! transaction, advances the watermark, then merges the progress snapshot
//! inside a second transaction. Any error aborts the whole cycle; the next
//! tick starts over from the last committed watermark.

pub mod activity;
pub mod progress;

use std::time::Duration;

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::catalog::CatalogIndex;
use crate::checkpoint::WatermarkStore;
use crate::config::Config;
use crate::error::Result;
use crate::state::BridgeState;
use crate::store::library::{LibraryStore, ProgressWriter, SessionWriter};
use crate::store::tracker::TrackerStore;

/// Outcome of one completed sync cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub activity: activity::ActivityReport,
    pub progress: progress::ProgressReport,
    pub watermark: i64,
}

/// Run one sync cycle, connecting to both databases for its duration
pub async fn run_cycle(config: &Config, checkpoint: &WatermarkStore) -> Result<CycleReport> {
    let tracker = TrackerStore::connect(&config.tracker).await?;
    let library = LibraryStore::connect(&config.library).await?;

    let result = run_cycle_inner(config, checkpoint, &tracker, &library).await;

    tracker.close().await;
    library.close().await;

    result
}

async fn run_cycle_inner(
    config: &Config,
    checkpoint: &WatermarkStore,
    tracker: &TrackerStore,
    library: &LibraryStore,
) -> Result<CycleReport> {
    let index = CatalogIndex::from_rows(library.load_catalog().await?);
    info!(books = index.len(), "Loaded catalog index");
    if index.is_empty() {
        warn!("Catalog is empty, nothing can match this cycle");
    }

    let watermark = checkpoint.load();
    let events = tracker.activity_since(watermark).await?;
    info!(watermark, events = events.len(), "Starting activity sync");

    let mut tx = library.begin().await?;
    let activity = {
        let mut sessions = SessionWriter::new(&mut tx);
        activity::replay_activity(
            &events,
            &index,
            &mut sessions,
            config.sync.user_id,
            watermark,
        )
        .await?
    };
    tx.commit().await?;

    // Persisted only after the commit: a crash in between replays the same
    // events next cycle and the dedup window absorbs them, whereas the
    // other order would lose them
    if activity.max_id > watermark {
        checkpoint.store(activity.max_id)?;
    }
    info!(
        synced = activity.synced,
        duplicates = activity.duplicates,
        unmatched = activity.unmatched,
        watermark = activity.max_id,
        "Activity sync complete"
    );

    let records = tracker.progress_snapshot().await?;
    info!(records = records.len(), "Starting progress sync");

    let mut tx = library.begin().await?;
    let progress = {
        let mut writer = ProgressWriter::new(&mut tx);
        progress::merge_progress(&records, &index, &mut writer, config.sync.user_id).await?
    };
    tx.commit().await?;

    info!(
        updated = progress.updated,
        inserted = progress.inserted,
        unchanged = progress.unchanged,
        unmatched = progress.unmatched,
        "Progress sync complete"
    );

    let watermark = activity.max_id.max(watermark);
    Ok(CycleReport {
        activity,
        progress,
        watermark,
    })
}

/// Run sync cycles on a fixed interval until cancelled. The first cycle
/// starts immediately; a cycle that fails is logged and the loop waits for
/// the next tick.
pub async fn run_sync_loop(config: Config, state: BridgeState, cancel: CancellationToken) {
    let checkpoint = WatermarkStore::new(&config.sync.state_file);

    let mut ticker =
        tokio::time::interval(Duration::from_secs(config.sync.interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match run_cycle(&config, &checkpoint).await {
                    Ok(report) => state.record_success(report).await,
                    Err(err) => {
                        error!(error = %err, "Sync cycle aborted");
                        state.record_abort(err.to_string()).await;
                    }
                }
            }
            _ = cancel.cancelled() => {
                info!("Sync loop shutting down");
                break;
            }
        }
    }
}
