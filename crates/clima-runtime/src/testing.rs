//! Scripted collaborators for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use clima_core::{
    ActionItem, ActionPlan, Category, Condition, DataPoint, ForecastDay, HistoricalData, ItemStatus,
    Location, Priority, RiskType, TemperatureUnit, UserProfile,
};

use crate::generators::{PlanGenerator, ProjectionGenerator};
use crate::providers::{
    ChatMessage, CompletionConfig, CompletionResponse, FunctionCall, LlmProvider, Part,
    ProviderError, Role,
};
use crate::sources::{ForecastProvider, HistoricalDataProvider, SourceError};

/// What a [`ScriptedProvider`] was asked.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub model: String,
    pub has_schema: bool,
    pub tool_names: Vec<String>,
    /// Text of the last user message
    pub prompt: String,
    pub messages: Vec<ChatMessage>,
}

/// Replays queued responses, then falls back to a fixed text (or
/// `EmptyResponse` without one).
pub(crate) struct ScriptedProvider {
    queue: Mutex<VecDeque<Result<CompletionResponse, ProviderError>>>,
    fallback: Option<String>,
    requests: Mutex<Vec<RecordedRequest>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn always_text(text: impl Into<String>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Some(text.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn scripted(responses: Vec<Result<CompletionResponse, ProviderError>>) -> Self {
        Self {
            queue: Mutex::new(responses.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.text_content())
            .unwrap_or_default();
        self.requests.lock().push(RecordedRequest {
            model: config.model.clone(),
            has_schema: config.response_schema.is_some(),
            tool_names: config.tools.iter().map(|t| t.name.clone()).collect(),
            prompt,
            messages,
        });

        if let Some(next) = self.queue.lock().pop_front() {
            return next;
        }
        match &self.fallback {
            Some(text) => Ok(text_response(text)),
            None => Err(ProviderError::EmptyResponse),
        }
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub(crate) fn text_response(text: &str) -> CompletionResponse {
    CompletionResponse {
        content: text.to_string(),
        model: "scripted".to_string(),
        ..Default::default()
    }
}

pub(crate) fn call_response(name: &str, args: serde_json::Value) -> CompletionResponse {
    CompletionResponse {
        function_calls: vec![FunctionCall {
            name: name.to_string(),
            args,
        }],
        model: "scripted".to_string(),
        ..Default::default()
    }
}

pub(crate) fn overloaded() -> ProviderError {
    ProviderError::ApiError {
        status: 503,
        message: "The model is overloaded.".to_string(),
    }
}

pub(crate) fn rate_limited() -> ProviderError {
    ProviderError::RateLimited { retry_after: None }
}

pub(crate) fn bad_request() -> ProviderError {
    ProviderError::ApiError {
        status: 400,
        message: "Invalid argument.".to_string(),
    }
}

/// Function responses sent back to the model, in order.
pub(crate) fn function_responses(messages: &[ChatMessage]) -> Vec<(String, String)> {
    messages
        .iter()
        .flat_map(|m| &m.parts)
        .filter_map(|p| match p {
            Part::FunctionResponse { name, content } => Some((name.clone(), content.clone())),
            _ => None,
        })
        .collect()
}

pub(crate) fn new_york() -> Location {
    Location::new(40.7, -74.0, "New York")
}

pub(crate) fn sample_historical() -> HistoricalData {
    HistoricalData {
        data: vec![
            DataPoint::new("2022", -0.8),
            DataPoint::new("2023", 0.2),
            DataPoint::new("2024", 0.6),
        ],
        label: "Heavy Rain Days Anomaly".to_string(),
        unit: " days".to_string(),
    }
}

pub(crate) fn sample_item(title: &str, priority: Priority) -> ActionItem {
    ActionItem {
        id: None,
        title: title.to_string(),
        description: format!("{} as soon as possible.", title),
        category: Category::Home,
        priority,
        status: ItemStatus::ToDo,
        resources: vec![],
    }
}

pub(crate) fn sample_plan(titles: &[&str]) -> ActionPlan {
    ActionPlan {
        summary: "Flooding is the main concern.".to_string(),
        items: titles
            .iter()
            .map(|t| sample_item(t, Priority::High))
            .collect(),
    }
}

pub(crate) fn sample_projection() -> Vec<DataPoint> {
    vec![DataPoint::new("2030", 1.4), DataPoint::new("2035", 2.1)]
}

pub(crate) fn sample_forecast() -> Vec<ForecastDay> {
    ["Mon", "Tue", "Wed", "Thu", "Fri"]
        .iter()
        .enumerate()
        .map(|(i, day)| ForecastDay {
            day: day.to_string(),
            high_temp: 24 + i as i32,
            low_temp: 15 + i as i32,
            condition: Condition::Sunny,
        })
        .collect()
}

/// Data sources and generators in one, with a shared call log.
///
/// Each call pops its queue; an empty queue answers with the sample value.
#[derive(Default)]
pub(crate) struct FakeBackend {
    log: Mutex<Vec<&'static str>>,
    latency: Duration,
    historical: Mutex<VecDeque<Result<HistoricalData, SourceError>>>,
    forecasts: Mutex<VecDeque<Result<Vec<ForecastDay>, SourceError>>>,
    plans: Mutex<VecDeque<Result<ActionPlan, ProviderError>>>,
    projections: Mutex<VecDeque<Result<Vec<DataPoint>, ProviderError>>>,
    plan_existing: Mutex<Vec<Option<ActionPlan>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long first.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push_historical(&self, result: Result<HistoricalData, SourceError>) {
        self.historical.lock().push_back(result);
    }

    pub fn push_forecast(&self, result: Result<Vec<ForecastDay>, SourceError>) {
        self.forecasts.lock().push_back(result);
    }

    pub fn push_plan(&self, result: Result<ActionPlan, ProviderError>) {
        self.plans.lock().push_back(result);
    }

    pub fn push_projection(&self, result: Result<Vec<DataPoint>, ProviderError>) {
        self.projections.lock().push_back(result);
    }

    pub fn log(&self) -> Vec<&'static str> {
        self.log.lock().clone()
    }

    pub fn calls(&self, name: &str) -> usize {
        self.log.lock().iter().filter(|n| **n == name).count()
    }

    /// The `existing` plan handed to each plan call.
    pub fn plan_existing(&self) -> Vec<Option<ActionPlan>> {
        self.plan_existing.lock().clone()
    }

    async fn enter(&self, name: &'static str) {
        self.log.lock().push(name);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl HistoricalDataProvider for FakeBackend {
    async fn fetch_historical(
        &self,
        _location: &Location,
        _risk: RiskType,
    ) -> Result<HistoricalData, SourceError> {
        self.enter("historical").await;
        let next = self.historical.lock().pop_front();
        next.unwrap_or_else(|| Ok(sample_historical()))
    }
}

#[async_trait]
impl ForecastProvider for FakeBackend {
    async fn fetch_forecast(
        &self,
        _location: &Location,
        _unit: TemperatureUnit,
    ) -> Result<Vec<ForecastDay>, SourceError> {
        self.enter("forecast").await;
        let next = self.forecasts.lock().pop_front();
        next.unwrap_or_else(|| Ok(sample_forecast()))
    }
}

#[async_trait]
impl PlanGenerator for FakeBackend {
    async fn generate_plan(
        &self,
        _location: &Location,
        _risk: RiskType,
        _profile: &UserProfile,
        existing: Option<&ActionPlan>,
    ) -> Result<ActionPlan, ProviderError> {
        self.plan_existing.lock().push(existing.cloned());
        self.enter("plan").await;
        let next = self.plans.lock().pop_front();
        next.unwrap_or_else(|| Ok(sample_plan(&["Install storm shutters", "Build a go-bag"])))
    }
}

#[async_trait]
impl ProjectionGenerator for FakeBackend {
    async fn generate_projection(
        &self,
        _location: &Location,
        _risk: RiskType,
        _historical: &HistoricalData,
    ) -> Result<Vec<DataPoint>, ProviderError> {
        self.enter("projection").await;
        let next = self.projections.lock().pop_front();
        next.unwrap_or_else(|| Ok(sample_projection()))
    }
}
