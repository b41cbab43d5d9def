//! Secondary calls: comparison, challenges, daily tip, share summary,
//! forecast and proactive alerts. Each one goes through the executor with
//! its own retry policy.

use chrono::NaiveDate;
use parking_lot::Mutex;
use std::sync::Arc;

use clima_core::{
    check_for_alerts, default_challenges, without_dismissed, Alert, Challenge, ComparisonData,
    ForecastDay, Location, RiskReport, RiskType, TemperatureUnit,
};

use crate::config::RetryPolicies;
use crate::generators::ClimateAdvisor;
use crate::resilience::{CallError, CallKind, ResilientExecutor};
use crate::sources::ForecastProvider;

pub struct InsightService {
    advisor: ClimateAdvisor,
    forecasts: Arc<dyn ForecastProvider>,
    executor: ResilientExecutor,
    policies: RetryPolicies,
    daily_tip: Mutex<Option<(NaiveDate, String)>>,
}

impl InsightService {
    pub fn new(
        advisor: ClimateAdvisor,
        forecasts: Arc<dyn ForecastProvider>,
        executor: ResilientExecutor,
        policies: RetryPolicies,
    ) -> Self {
        Self {
            advisor,
            forecasts,
            executor,
            policies,
            daily_tip: Mutex::new(None),
        }
    }

    pub async fn compare(&self, location: &Location, other: &str) -> Result<ComparisonData, CallError> {
        let advisor = &self.advisor;
        self.executor
            .execute(CallKind::Comparison, &self.policies.comparison, move || {
                advisor.compare(location, other)
            })
            .await
    }

    pub async fn challenges(&self, location: &Location) -> Result<Vec<Challenge>, CallError> {
        let advisor = &self.advisor;
        self.executor
            .execute(CallKind::Challenges, &self.policies.challenges, move || {
                advisor.challenges(location)
            })
            .await
    }

    /// Personalized challenges, or the default set when generation fails.
    pub async fn challenges_or_default(&self, location: &Location) -> Vec<Challenge> {
        match self.challenges(location).await {
            Ok(challenges) if !challenges.is_empty() => challenges,
            Ok(_) => default_challenges(),
            Err(e) => {
                tracing::warn!(error = %e, detail = e.detail(), "Using default challenges");
                default_challenges()
            }
        }
    }

    /// One tip per calendar day; later calls on the same day reuse it.
    pub async fn daily_tip(&self, today: NaiveDate) -> Result<String, CallError> {
        if let Some((day, tip)) = self.daily_tip.lock().as_ref() {
            if *day == today {
                tracing::debug!(%today, "Daily tip cache hit");
                return Ok(tip.clone());
            }
        }

        let advisor = &self.advisor;
        let tip = self
            .executor
            .execute(CallKind::DailyTip, &self.policies.daily_tip, move || {
                advisor.daily_tip()
            })
            .await?;

        *self.daily_tip.lock() = Some((today, tip.clone()));
        Ok(tip)
    }

    pub async fn share_summary(
        &self,
        location: &Location,
        risk: RiskType,
        report: &RiskReport,
    ) -> Result<String, CallError> {
        let advisor = &self.advisor;
        self.executor
            .execute(CallKind::ShareSummary, &self.policies.share_summary, move || {
                advisor.share_summary(location, risk, report)
            })
            .await
    }

    pub async fn forecast(
        &self,
        location: &Location,
        unit: TemperatureUnit,
    ) -> Result<Vec<ForecastDay>, CallError> {
        let source = &self.forecasts;
        self.executor
            .execute(CallKind::Forecast, &self.policies.forecast, move || {
                source.fetch_forecast(location, unit)
            })
            .await
    }

    /// Alerts for the coming days, minus the dismissed ones.
    ///
    /// Thresholds are in celsius, so the forecast is always fetched in celsius.
    pub async fn alerts<S: AsRef<str>>(
        &self,
        location: &Location,
        today: NaiveDate,
        dismissed: &[S],
    ) -> Result<Vec<Alert>, CallError> {
        let forecast = self.forecast(location, TemperatureUnit::Celsius).await?;
        let alerts = without_dismissed(check_for_alerts(&forecast, today), dismissed);
        if !alerts.is_empty() {
            tracing::info!(count = alerts.len(), location = %location, "Alerts raised");
        }
        Ok(alerts)
    }
}
