//! Shared bridge state
//!
//! Cheap-to-clone handle over the config and the rolling sync status,
//! shared between the status server and the sync loop.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::sync::CycleReport;

#[derive(Clone)]
pub struct BridgeState {
    inner: Arc<BridgeStateInner>,
}

struct BridgeStateInner {
    config: Config,
    status: RwLock<BridgeStatus>,
}

/// Rolling view of sync health, served by the status endpoint
#[derive(Debug, Clone, Default, Serialize)]
pub struct BridgeStatus {
    pub cycles_completed: u64,
    pub cycles_aborted: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub watermark: i64,
    pub last_report: Option<CycleReport>,
}

impl BridgeState {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(BridgeStateInner {
                config,
                status: RwLock::new(BridgeStatus::default()),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub async fn record_success(&self, report: CycleReport) {
        let mut status = self.inner.status.write().await;
        status.cycles_completed += 1;
        status.last_cycle_at = Some(Utc::now());
        status.last_error = None;
        status.watermark = report.watermark;
        status.last_report = Some(report);
    }

    pub async fn record_abort(&self, error: String) {
        let mut status = self.inner.status.write().await;
        status.cycles_aborted += 1;
        status.last_cycle_at = Some(Utc::now());
        status.last_error = Some(error);
    }

    pub async fn status(&self) -> BridgeStatus {
        self.inner.status.read().await.clone()
    }
}
