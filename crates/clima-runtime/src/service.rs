//! Report service: the orchestrator bound to the report store.
//!
//! Generation for one (location, risk) key is serialized: the service holds
//! a per-key async lock for the whole snapshot, orchestrate and write-back
//! sequence, so a concurrent request for the same key waits and then finds
//! the stored result. Different keys proceed independently.

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use clima_core::{ActionItem, ItemStatus, Location, ReportKey, RiskReport, RiskType, UserProfile};

use crate::cache::{ReportStore, StoreSnapshot};
use crate::orchestrator::{ReportOrchestrator, ReportOutcome, ReportRequest};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("No action plan has been generated for {risk} risk at this location")]
    NoPlan { risk: RiskType },

    #[error("No action item matches '{item}'")]
    ItemNotFound { item: String },
}

/// Generates, stores and updates risk reports.
pub struct ReportService {
    orchestrator: ReportOrchestrator,
    store: ReportStore,
    in_flight: Mutex<HashMap<ReportKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl ReportService {
    pub fn new(orchestrator: ReportOrchestrator, store: ReportStore) -> Self {
        Self {
            orchestrator,
            store,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    /// Run `f` while holding the lock for `key`.
    async fn with_key<T, F, Fut>(&self, key: ReportKey, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let lock = self.in_flight.lock().entry(key).or_default().clone();

        let result = {
            let _guard = lock.lock().await;
            f().await
        };

        let mut in_flight = self.in_flight.lock();
        // the map and this call hold the only references: nobody is waiting
        if Arc::strong_count(&lock) == 2 {
            in_flight.remove(&key);
        }
        result
    }

    /// Generate whatever the stored report for `request` is missing.
    ///
    /// The returned report is the stored one after the write-back.
    pub async fn report(&self, request: &ReportRequest, cancel: &CancellationToken) -> ReportOutcome {
        let key = ReportKey::new(&request.location, request.risk);

        self.with_key(key, move || async move {
            let snapshot = self.store.snapshot(&key).await;
            let mut outcome = self
                .orchestrator
                .generate_risk_report(request, snapshot, cancel)
                .await;

            if !outcome.patches.is_empty() {
                outcome.report = self.store.apply(key, outcome.patches.clone()).await;
            }
            outcome
        })
        .await
    }

    /// Reports for several risks at one location, at most `concurrency` at a time.
    ///
    /// Results come back in the order of `risks`.
    pub async fn reports_for(
        &self,
        location: &Location,
        risks: &[RiskType],
        profile: &UserProfile,
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> Vec<(RiskType, ReportOutcome)> {
        stream::iter(risks.iter().copied())
            .map(|risk| async move {
                let request =
                    ReportRequest::new(location.clone(), risk).with_profile(profile.clone());
                (risk, self.report(&request, cancel).await)
            })
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    pub async fn stored(&self, location: &Location, risk: RiskType) -> Option<RiskReport> {
        self.store.get(&ReportKey::new(location, risk)).await
    }

    /// Set the status of one plan item, addressed by id or title.
    pub async fn update_item_status(
        &self,
        location: &Location,
        risk: RiskType,
        item: &str,
        status: ItemStatus,
    ) -> Result<ActionItem, ServiceError> {
        let key = ReportKey::new(location, risk);

        self.with_key(key, move || async move {
            let mut report = self.store.snapshot(&key).await;
            let plan = report
                .action_plan
                .as_mut()
                .ok_or(ServiceError::NoPlan { risk })?;
            let updated = plan
                .set_status(item, status)
                .cloned()
                .ok_or_else(|| ServiceError::ItemNotFound {
                    item: item.to_string(),
                })?;

            self.store.insert(key, report).await;
            tracing::info!(risk = %risk, item = %updated.title, status = %status, "Item status updated");
            Ok(updated)
        })
        .await
    }

    /// Put every item of the stored plan back to `To Do`.
    pub async fn reset_progress(&self, location: &Location, risk: RiskType) -> Result<(), ServiceError> {
        let key = ReportKey::new(location, risk);

        self.with_key(key, move || async move {
            let mut report = self.store.snapshot(&key).await;
            let plan = report
                .action_plan
                .as_mut()
                .ok_or(ServiceError::NoPlan { risk })?;
            plan.reset_progress();
            self.store.insert(key, report).await;
            Ok(())
        })
        .await
    }

    pub async fn clear(&self) {
        self.store.clear().await;
        tracing::info!("Report store cleared");
    }

    pub async fn export_snapshot(&self) -> StoreSnapshot {
        self.store.export().await
    }

    pub async fn import_snapshot(&self, snapshot: StoreSnapshot) -> usize {
        self.store.import(snapshot).await
    }
}
