//! # clima-runtime
//!
//! External calls for clima: the generative backend, weather data and
//! everything that makes them dependable.
//!
//! `clima-core` holds the deterministic parts (types, merging, schema
//! validation, aggregation, alert rules). This crate adds:
//! - Resilient execution of every outbound call (retry, classification,
//!   circuit breaker)
//! - Report orchestration over the historical → plan → projection sequence
//! - An in-memory report store with snapshots
//! - Insight calls (comparison, challenges, daily tip, share summary,
//!   forecast alerts)
//! - A chat assistant with weather and report tools
//!
//! ## Example
//!
//! ```rust,ignore
//! use clima_runtime::{ClimaRuntime, ReportRequest, RuntimeConfig};
//! use clima_core::{Location, RiskType};
//! use tokio_util::sync::CancellationToken;
//!
//! let runtime = ClimaRuntime::builder()
//!     .config(RuntimeConfig::default())
//!     .build()?;
//!
//! let request = ReportRequest::new(Location::new(40.71, -74.01, "New York"), RiskType::Flood);
//! let outcome = runtime.reports().report(&request, &CancellationToken::new()).await;
//! ```

use std::sync::Arc;

use thiserror::Error;

pub mod cache;
pub mod chat;
pub mod config;
pub mod generators;
pub mod insights;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod service;
pub mod sources;

#[cfg(test)]
mod testing;

pub use cache::{ReportStore, StoreSnapshot, StoredReport};
pub use chat::{AssistantStatus, ChatAssistant, ChatSession, ToolContext};
pub use config::{ConfigError, ModelConfig, RetryPolicies, RuntimeConfig};
pub use generators::{ClimateAdvisor, PlanGenerator, ProjectionGenerator};
pub use insights::InsightService;
pub use orchestrator::{ReportOrchestrator, ReportOutcome, ReportRequest};
pub use providers::{LlmProvider, ProviderError, ProviderRegistry};
pub use resilience::{CallError, CallKind, CircuitBreaker, ResilientExecutor, RetryOptions};
pub use service::{ReportService, ServiceError};
pub use sources::{ForecastProvider, HistoricalDataProvider, SourceError};

/// Errors while assembling the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("No {0} data source configured and the open-meteo feature is disabled")]
    MissingSource(&'static str),
}

/// Reports, insights and chat over one provider, one executor and one store.
pub struct ClimaRuntime {
    config: RuntimeConfig,
    provider: Arc<dyn LlmProvider>,
    executor: ResilientExecutor,
    reports: ReportService,
    insights: InsightService,
    chat: Arc<ChatAssistant>,
}

impl ClimaRuntime {
    pub fn builder() -> ClimaRuntimeBuilder {
        ClimaRuntimeBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn reports(&self) -> &ReportService {
        &self.reports
    }

    pub fn insights(&self) -> &InsightService {
        &self.insights
    }

    pub fn chat(&self) -> &Arc<ChatAssistant> {
        &self.chat
    }

    pub fn executor(&self) -> &ResilientExecutor {
        &self.executor
    }

    /// Whether the generative backend looks usable (credential present).
    pub async fn health_check(&self) -> bool {
        self.provider.health_check().await
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }
}

/// Builder for [`ClimaRuntime`].
///
/// Anything not set explicitly comes from the configuration: the provider
/// from the registry, the data sources from Open-Meteo.
pub struct ClimaRuntimeBuilder {
    config: RuntimeConfig,
    registry: ProviderRegistry,
    provider: Option<Arc<dyn LlmProvider>>,
    historical: Option<Arc<dyn HistoricalDataProvider>>,
    forecasts: Option<Arc<dyn ForecastProvider>>,
    store: Option<ReportStore>,
}

impl ClimaRuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            registry: ProviderRegistry::with_defaults(),
            provider: None,
            historical: None,
            forecasts: None,
            store: None,
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the registry used to build the provider from configuration.
    pub fn registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn historical(mut self, source: Arc<dyn HistoricalDataProvider>) -> Self {
        self.historical = Some(source);
        self
    }

    pub fn forecasts(mut self, source: Arc<dyn ForecastProvider>) -> Self {
        self.forecasts = Some(source);
        self
    }

    pub fn store(mut self, store: ReportStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<ClimaRuntime, RuntimeError> {
        let config = self.config;
        config.validate()?;

        let provider = match self.provider {
            Some(provider) => provider,
            None => self.registry.create(
                &config.provider.provider_type,
                &config.provider.options_json(),
            )?,
        };

        #[cfg(feature = "open-meteo")]
        let weather = Arc::new(sources::OpenMeteoClient::new(&config.weather));
        let historical: Arc<dyn HistoricalDataProvider> = match self.historical {
            Some(source) => source,
            #[cfg(feature = "open-meteo")]
            None => weather.clone(),
            #[cfg(not(feature = "open-meteo"))]
            None => return Err(RuntimeError::MissingSource("historical")),
        };
        let forecasts: Arc<dyn ForecastProvider> = match self.forecasts {
            Some(source) => source,
            #[cfg(feature = "open-meteo")]
            None => weather,
            #[cfg(not(feature = "open-meteo"))]
            None => return Err(RuntimeError::MissingSource("forecast")),
        };

        let executor = ResilientExecutor::with_circuit_breaker(Arc::new(CircuitBreaker::new(
            config.circuit_breaker.clone(),
        )));
        let advisor = ClimateAdvisor::new(provider.clone(), config.models.clone());
        let generator = Arc::new(advisor.clone());

        let orchestrator = ReportOrchestrator::new(historical, generator.clone(), generator)
            .with_executor(executor.clone())
            .with_policies(config.retry.clone())
            .with_step_delay(config.step_delay);
        let store = self
            .store
            .unwrap_or_else(|| ReportStore::from_config(&config.store));

        let chat = Arc::new(ChatAssistant::new(
            provider.clone(),
            forecasts.clone(),
            executor.clone(),
            config.retry.chat.clone(),
            config.models.text.clone(),
        ));
        let insights =
            InsightService::new(advisor, forecasts, executor.clone(), config.retry.clone());

        tracing::info!(
            provider = provider.name(),
            structured_model = %config.models.structured,
            text_model = %config.models.text,
            "Clima runtime ready"
        );

        Ok(ClimaRuntime {
            reports: ReportService::new(orchestrator, store),
            insights,
            chat,
            provider,
            executor,
            config,
        })
    }
}

impl Default for ClimaRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{new_york, text_response, FakeBackend, ScriptedProvider};
    use clima_core::RiskType;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn runtime(provider: Arc<ScriptedProvider>, backend: Arc<FakeBackend>) -> ClimaRuntime {
        let config = RuntimeConfig {
            step_delay: Duration::ZERO,
            ..Default::default()
        };
        ClimaRuntime::builder()
            .config(config)
            .provider(provider)
            .historical(backend.clone())
            .forecasts(backend)
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_runtime_generates_report_through_provider() {
        let plan = r#"{"summary":"Flooding is the main concern.","items":[
            {"title":"Clear gutters","description":"Before the rainy season.","category":"Home","priority":"High"}
        ]}"#;
        let projection = r#"{"projection":[{"year":"2030","value":1.2},{"year":"2040","value":1.9}]}"#;
        let provider = Arc::new(ScriptedProvider::scripted(vec![
            Ok(text_response(plan)),
            Ok(text_response(projection)),
        ]));
        let backend = Arc::new(FakeBackend::new());
        let runtime = runtime(provider.clone(), backend.clone());

        let request = ReportRequest::new(new_york(), RiskType::Flood);
        let outcome = runtime.reports().report(&request, &CancellationToken::new()).await;

        assert!(!outcome.has_errors(), "{:?}", outcome);
        assert!(outcome.report.is_complete());
        assert_eq!(provider.calls(), 2);
        assert_eq!(backend.log(), vec!["historical"]);
        assert!(runtime.executor().circuit_breaker().is_some());
        assert_eq!(runtime.provider_name(), "scripted");
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = RuntimeConfig::default();
        config.retry.plan.max_retries = 0;
        let result = ClimaRuntime::builder()
            .config(config)
            .provider(Arc::new(ScriptedProvider::always_text("")))
            .historical(Arc::new(FakeBackend::new()))
            .forecasts(Arc::new(FakeBackend::new()))
            .build();
        assert!(matches!(result, Err(RuntimeError::Config(_))));
    }

    #[test]
    fn test_build_with_unknown_provider_type() {
        let mut config = RuntimeConfig::default();
        config.provider.provider_type = "carrier-pigeon".to_string();
        let result = ClimaRuntime::builder()
            .config(config)
            .historical(Arc::new(FakeBackend::new()))
            .forecasts(Arc::new(FakeBackend::new()))
            .build();
        assert!(matches!(result, Err(RuntimeError::Provider(_))));
    }
}
