//! In-memory report store.
//!
//! Reports are keyed by (location, risk type). The cache is built without a
//! capacity bound or expiry: a report only leaves the store through
//! [`ReportStore::clear`]. The store can be exported to and restored from a
//! serializable snapshot so a process can pick up where the last one
//! stopped.

use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};

use clima_core::{Location, ReportKey, ReportPatch, RiskReport};

use crate::config::StoreConfig;

/// Format version written into snapshots.
pub const SNAPSHOT_VERSION: u32 = 1;

/// A serializable copy of the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub reports: Vec<StoredReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReport {
    pub key: ReportKey,
    pub report: RiskReport,
}

/// Report store using moka.
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone)]
pub struct ReportStore {
    cache: Cache<ReportKey, RiskReport>,
}

impl ReportStore {
    /// An empty store with room for `initial_capacity` reports before it grows.
    pub fn new(initial_capacity: usize) -> Self {
        let cache = Cache::builder().initial_capacity(initial_capacity).build();

        Self { cache }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.initial_capacity)
    }

    pub async fn get(&self, key: &ReportKey) -> Option<RiskReport> {
        self.cache.get(key).await
    }

    /// The stored report, or an empty one.
    pub async fn snapshot(&self, key: &ReportKey) -> RiskReport {
        self.get(key).await.unwrap_or_default()
    }

    pub async fn insert(&self, key: ReportKey, report: RiskReport) {
        self.cache.insert(key, report).await;
    }

    /// Read-merge-write `patches` into the stored report and return the result.
    ///
    /// Not atomic on its own; callers serialize writers per key.
    pub async fn apply(
        &self,
        key: ReportKey,
        patches: impl IntoIterator<Item = ReportPatch>,
    ) -> RiskReport {
        let mut report = self.snapshot(&key).await;
        report.apply_all(patches);
        if !report.is_empty() {
            self.cache.insert(key, report.clone()).await;
        }
        report
    }

    /// Drop every report.
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    /// All stored reports, ordered by key.
    pub async fn entries(&self) -> Vec<StoredReport> {
        self.cache.run_pending_tasks().await;
        let mut entries: Vec<StoredReport> = self
            .cache
            .iter()
            .map(|(key, report)| StoredReport { key: *key, report })
            .collect();
        entries.sort_by_key(|e| e.key);
        entries
    }

    /// Stored reports for one location, ordered by risk type.
    pub async fn reports_at(&self, location: &Location) -> Vec<StoredReport> {
        self.entries()
            .await
            .into_iter()
            .filter(|e| e.key.is_at(location))
            .collect()
    }

    pub async fn complete_reports(&self) -> Vec<StoredReport> {
        self.entries()
            .await
            .into_iter()
            .filter(|e| e.report.is_complete())
            .collect()
    }

    pub async fn len(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }

    pub async fn export(&self) -> StoreSnapshot {
        StoreSnapshot {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            reports: self.entries().await,
        }
    }

    /// Load a snapshot, replacing entries with the same key.
    ///
    /// Returns the number of reports loaded. Empty reports are skipped.
    pub async fn import(&self, snapshot: StoreSnapshot) -> usize {
        if snapshot.version != SNAPSHOT_VERSION {
            tracing::warn!(
                found = snapshot.version,
                expected = SNAPSHOT_VERSION,
                "Snapshot version differs, loading anyway"
            );
        }

        let mut loaded = 0;
        for entry in snapshot.reports {
            if entry.report.is_empty() {
                continue;
            }
            self.cache.insert(entry.key, entry.report).await;
            loaded += 1;
        }
        tracing::debug!(loaded, "Snapshot imported");
        loaded
    }
}

impl Default for ReportStore {
    fn default() -> Self {
        Self::from_config(&StoreConfig::default())
    }
}

impl std::fmt::Debug for ReportStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportStore")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}
