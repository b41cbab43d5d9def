//! Dependent-call orchestration for one risk report.
//!
//! A report is built from three external calls in a fixed order:
//! 1. Historical series (prerequisite of the projection)
//! 2. Action plan
//! 3. Future projection, only when a historical series is available
//!
//! Present fields are never re-fetched. Plan and projection failures are
//! independent: either may fail while the other still lands in the report.
//! The orchestrator works on the snapshot it is given and returns the
//! patches it produced; it never touches storage.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use clima_core::{Location, ReportPatch, RiskReport, RiskType, UserProfile};

use crate::config::{RetryPolicies, RuntimeConfig};
use crate::generators::{PlanGenerator, ProjectionGenerator};
use crate::resilience::{CallKind, ResilientExecutor};
use crate::sources::HistoricalDataProvider;

/// Projection error recorded when the historical series could not be loaded.
pub const HISTORICAL_UNAVAILABLE: &str =
    "Could not load historical data, which is needed for projections.";

/// What to generate.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRequest {
    pub location: Location,
    pub risk: RiskType,
    pub profile: UserProfile,

    /// Regenerate the plan even when one exists. Progress on matching items
    /// is kept by the plan merge.
    pub refresh_plan: bool,
}

impl ReportRequest {
    pub fn new(location: Location, risk: RiskType) -> Self {
        Self {
            location,
            risk,
            profile: UserProfile::default(),
            refresh_plan: false,
        }
    }

    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn refreshing_plan(mut self) -> Self {
        self.refresh_plan = true;
        self
    }
}

/// Result of one report generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportOutcome {
    /// The snapshot with every produced patch applied
    pub report: RiskReport,

    /// Patches in the order they were produced
    #[serde(skip)]
    pub patches: Vec<ReportPatch>,

    pub plan_error: Option<String>,
    pub projection_error: Option<String>,

    /// Generation stopped early; `report` holds what was gathered until then
    pub cancelled: bool,
}

impl ReportOutcome {
    fn unchanged(report: RiskReport) -> Self {
        Self {
            report,
            ..Default::default()
        }
    }

    pub fn has_errors(&self) -> bool {
        self.plan_error.is_some() || self.projection_error.is_some()
    }

    fn record(&mut self, patch: ReportPatch) {
        self.report.apply(patch.clone());
        self.patches.push(patch);
    }
}

/// Runs the historical → plan → projection sequence for a report.
pub struct ReportOrchestrator {
    historical: Arc<dyn HistoricalDataProvider>,
    plans: Arc<dyn PlanGenerator>,
    projections: Arc<dyn ProjectionGenerator>,
    executor: ResilientExecutor,
    policies: RetryPolicies,
    step_delay: Duration,
}

impl ReportOrchestrator {
    pub fn new(
        historical: Arc<dyn HistoricalDataProvider>,
        plans: Arc<dyn PlanGenerator>,
        projections: Arc<dyn ProjectionGenerator>,
    ) -> Self {
        let config = RuntimeConfig::default();
        Self {
            historical,
            plans,
            projections,
            executor: ResilientExecutor::new(),
            policies: config.retry,
            step_delay: config.step_delay,
        }
    }

    pub fn with_executor(mut self, executor: ResilientExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_policies(mut self, policies: RetryPolicies) -> Self {
        self.policies = policies;
        self
    }

    /// Pause between two steps of one generation. Zero disables pacing.
    pub fn with_step_delay(mut self, step_delay: Duration) -> Self {
        self.step_delay = step_delay;
        self
    }

    /// Fill the missing fields of `report` for `request`.
    ///
    /// A complete report is returned unchanged without any external call,
    /// unless `refresh_plan` is set. Cancellation is honoured between
    /// steps, during pacing and during each call.
    pub async fn generate_risk_report(
        &self,
        request: &ReportRequest,
        report: RiskReport,
        cancel: &CancellationToken,
    ) -> ReportOutcome {
        if report.is_complete() && !request.refresh_plan {
            tracing::debug!(
                location = %request.location,
                risk = %request.risk,
                "Report complete, nothing to fetch"
            );
            return ReportOutcome::unchanged(report);
        }

        let location = &request.location;
        let risk = request.risk;
        let mut outcome = ReportOutcome::unchanged(report);
        let mut steps_run = 0u32;

        if outcome.report.historical_data.is_none() {
            tracing::info!(location = %location, risk = %risk, "Fetching historical data");
            let source = &self.historical;
            let call = self.executor.execute(
                CallKind::Historical,
                &self.policies.historical,
                move || source.fetch_historical(location, risk),
            );

            match self.step(&mut steps_run, cancel, call).await {
                None => return cancelled(outcome),
                Some(Ok(data)) => outcome.record(ReportPatch::Historical(data)),
                Some(Err(e)) => {
                    tracing::warn!(risk = %risk, error = %e, detail = e.detail(), "Historical data unavailable");
                    if outcome.report.future_projection.is_none() {
                        outcome.projection_error = Some(HISTORICAL_UNAVAILABLE.to_string());
                    }
                }
            }
        }

        if outcome.report.action_plan.is_none() || request.refresh_plan {
            tracing::info!(location = %location, risk = %risk, "Generating action plan");
            let existing = outcome.report.action_plan.clone();
            let existing = existing.as_ref();
            let plans = &self.plans;
            let profile = &request.profile;
            let call = self.executor.execute(CallKind::Plan, &self.policies.plan, move || {
                plans.generate_plan(location, risk, profile, existing)
            });

            match self.step(&mut steps_run, cancel, call).await {
                None => return cancelled(outcome),
                Some(Ok(plan)) => outcome.record(ReportPatch::Plan(plan)),
                Some(Err(e)) => {
                    tracing::warn!(risk = %risk, error = %e, detail = e.detail(), "Plan generation failed");
                    outcome.plan_error = Some(e.to_string());
                }
            }
        }

        if outcome.report.future_projection.is_none() {
            if let Some(historical) = outcome.report.historical_data.clone() {
                tracing::info!(location = %location, risk = %risk, "Generating projection");
                let projections = &self.projections;
                let historical = &historical;
                let call = self.executor.execute(
                    CallKind::Projection,
                    &self.policies.projection,
                    move || projections.generate_projection(location, risk, historical),
                );

                match self.step(&mut steps_run, cancel, call).await {
                    None => return cancelled(outcome),
                    Some(Ok(points)) => outcome.record(ReportPatch::Projection(points)),
                    Some(Err(e)) => {
                        tracing::warn!(risk = %risk, error = %e, detail = e.detail(), "Projection generation failed");
                        outcome.projection_error = Some(e.to_string());
                    }
                }
            }
        }

        tracing::info!(
            risk = %risk,
            patches = outcome.patches.len(),
            plan_error = outcome.plan_error.is_some(),
            projection_error = outcome.projection_error.is_some(),
            "Report generation finished"
        );
        outcome
    }

    /// Pace, then run `call`. `None` when cancelled first.
    async fn step<T>(
        &self,
        steps_run: &mut u32,
        cancel: &CancellationToken,
        call: impl Future<Output = T>,
    ) -> Option<T> {
        if cancel.is_cancelled() {
            return None;
        }

        if *steps_run > 0 && !self.step_delay.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.step_delay) => {}
            }
        }
        *steps_run += 1;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = call => Some(result),
        }
    }
}

fn cancelled(mut outcome: ReportOutcome) -> ReportOutcome {
    tracing::info!(patches = outcome.patches.len(), "Report generation cancelled");
    outcome.cancelled = true;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CallError;
    use crate::sources::SourceError;
    use crate::testing::{bad_request, new_york, overloaded, sample_plan, FakeBackend};
    use clima_core::{ItemStatus, RiskType};
    use tokio::time::Instant;

    fn orchestrator(backend: &Arc<FakeBackend>) -> ReportOrchestrator {
        ReportOrchestrator::new(backend.clone(), backend.clone(), backend.clone())
    }

    fn flood() -> ReportRequest {
        ReportRequest::new(new_york(), RiskType::Flood)
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_report_calls_each_step_once_in_order() {
        let backend = Arc::new(FakeBackend::new());
        let started = Instant::now();

        let outcome = orchestrator(&backend)
            .generate_risk_report(&flood(), RiskReport::default(), &CancellationToken::new())
            .await;

        assert_eq!(backend.log(), vec!["historical", "plan", "projection"]);
        assert!(outcome.report.historical_data.is_some());
        assert!(outcome.report.is_complete());
        assert_eq!(outcome.plan_error, None);
        assert_eq!(outcome.projection_error, None);
        assert!(!outcome.cancelled);
        assert_eq!(outcome.patches.len(), 3);
        // two pauses between three steps
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_report_makes_no_calls() {
        let backend = Arc::new(FakeBackend::new());
        let orchestrator = orchestrator(&backend);
        let cancel = CancellationToken::new();

        let first = orchestrator
            .generate_risk_report(&flood(), RiskReport::default(), &cancel)
            .await;
        let calls_after_first = backend.log().len();

        let second = orchestrator
            .generate_risk_report(&flood(), first.report.clone(), &cancel)
            .await;

        assert_eq!(backend.log().len(), calls_after_first);
        assert_eq!(second.report, first.report);
        assert!(second.patches.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_plan_failure_leaves_rest_of_report() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_plan(Err(bad_request()));

        let outcome = orchestrator(&backend)
            .generate_risk_report(&flood(), RiskReport::default(), &CancellationToken::new())
            .await;

        assert!(outcome.report.historical_data.is_some());
        assert!(outcome.report.future_projection.is_some());
        assert!(outcome.report.action_plan.is_none());
        assert_eq!(
            outcome.plan_error.as_deref(),
            Some(CallError::UnexpectedFailure { detail: String::new() }.to_string().as_str())
        );
        assert_eq!(outcome.projection_error, None);
        assert_eq!(backend.calls("plan"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_projection_failure_keeps_plan() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_projection(Err(bad_request()));

        let outcome = orchestrator(&backend)
            .generate_risk_report(&flood(), RiskReport::default(), &CancellationToken::new())
            .await;

        assert!(outcome.report.action_plan.is_some());
        assert!(outcome.report.future_projection.is_none());
        assert_eq!(outcome.plan_error, None);
        assert!(outcome.projection_error.is_some());
        assert_eq!(outcome.patches.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_historical_failure_blocks_projection_only() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_historical(Err(SourceError::HttpError("connection reset".to_string())));

        let outcome = orchestrator(&backend)
            .generate_risk_report(&flood(), RiskReport::default(), &CancellationToken::new())
            .await;

        assert_eq!(backend.log(), vec!["historical", "plan"]);
        assert!(outcome.report.action_plan.is_some());
        assert!(outcome.report.future_projection.is_none());
        assert_eq!(outcome.projection_error.as_deref(), Some(HISTORICAL_UNAVAILABLE));
        assert_eq!(outcome.plan_error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_missing_fields_are_fetched() {
        let backend = Arc::new(FakeBackend::new());
        let mut report = RiskReport::default();
        report.apply(ReportPatch::Historical(crate::testing::sample_historical()));
        report.apply(ReportPatch::Plan(sample_plan(&["Install storm shutters"])));
        let started = Instant::now();

        let outcome = orchestrator(&backend)
            .generate_risk_report(&flood(), report, &CancellationToken::new())
            .await;

        assert_eq!(backend.log(), vec!["projection"]);
        assert!(outcome.report.is_complete());
        assert_eq!(outcome.patches.len(), 1);
        // a single step is not paced
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_plan_failure_is_retried() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_plan(Err(overloaded()));

        let outcome = orchestrator(&backend)
            .with_step_delay(Duration::ZERO)
            .generate_risk_report(&flood(), RiskReport::default(), &CancellationToken::new())
            .await;

        assert_eq!(backend.calls("plan"), 2);
        assert_eq!(outcome.plan_error, None);
        assert!(outcome.report.is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_pacing_keeps_gathered_fields() {
        let backend = Arc::new(FakeBackend::new().with_latency(Duration::from_secs(1)));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let outcome = orchestrator(&backend)
            .generate_risk_report(&flood(), RiskReport::default(), &cancel)
            .await;

        assert!(outcome.cancelled);
        assert_eq!(backend.log(), vec!["historical"]);
        assert!(outcome.report.historical_data.is_some());
        assert!(outcome.report.action_plan.is_none());
        assert_eq!(outcome.patches.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start_makes_no_calls() {
        let backend = Arc::new(FakeBackend::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = orchestrator(&backend)
            .generate_risk_report(&flood(), RiskReport::default(), &cancel)
            .await;

        assert!(outcome.cancelled);
        assert!(backend.log().is_empty());
        assert!(outcome.report.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_plan_keeps_progress() {
        let backend = Arc::new(FakeBackend::new());
        let orchestrator = orchestrator(&backend).with_step_delay(Duration::ZERO);
        let cancel = CancellationToken::new();

        let first = orchestrator
            .generate_risk_report(&flood(), RiskReport::default(), &cancel)
            .await;
        let mut report = first.report;
        report
            .action_plan
            .as_mut()
            .unwrap()
            .set_status("Install storm shutters", ItemStatus::Completed);

        backend.push_plan(Ok(sample_plan(&["Install storm shutters", "Raise outlets"])));
        let refreshed = orchestrator
            .generate_risk_report(&flood().refreshing_plan(), report.clone(), &cancel)
            .await;

        let plan = refreshed.report.action_plan.unwrap();
        assert_eq!(plan.items[0].status, ItemStatus::Completed);
        assert_eq!(plan.items[0].id, report.action_plan.as_ref().unwrap().items[0].id);
        assert_eq!(plan.items[1].status, ItemStatus::ToDo);
        assert_eq!(backend.calls("plan"), 2);
        assert_eq!(backend.calls("projection"), 1);

        let existing = backend.plan_existing();
        assert!(existing[0].is_none());
        assert_eq!(existing[1].as_ref(), report.action_plan.as_ref());
    }
}
