//! Runtime configuration.
//!
//! Every field has a default, so an empty document is a valid configuration.
//! Durations are written human-readable (`"8s"`, `"1m 30s"`, `"7days"`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::resilience::{CallKind, CircuitBreakerConfig, RetryOptions, RetryOptionsError};

/// Errors in a loaded configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid retry policy for {kind} calls: {source}")]
    InvalidRetry {
        kind: CallKind,
        #[source]
        source: RetryOptionsError,
    },
}

/// Configuration for the clima runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Retry policy per kind of external call
    pub retry: RetryPolicies,

    /// Pause between the steps of one report generation (zero disables pacing)
    #[serde(with = "duration_str")]
    pub step_delay: Duration,

    /// Circuit breaker for persistently rate-limited calls
    pub circuit_breaker: CircuitBreakerConfig,

    /// In-memory report store
    pub store: StoreConfig,

    /// Model names
    pub models: ModelConfig,

    /// Generative backend selection and credentials
    pub provider: ProviderSettings,

    /// Weather data endpoints
    pub weather: WeatherSettings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicies::default(),
            step_delay: Duration::from_secs(5),
            circuit_breaker: CircuitBreakerConfig::default(),
            store: StoreConfig::default(),
            models: ModelConfig::default(),
            provider: ProviderSettings::default(),
            weather: WeatherSettings::default(),
        }
    }
}

impl RuntimeConfig {
    /// Check every policy before the runtime is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for kind in RetryPolicies::KINDS {
            self.retry
                .for_kind(kind)
                .validate()
                .map_err(|source| ConfigError::InvalidRetry { kind, source })?;
        }
        Ok(())
    }
}

/// Retry policy per kind of external call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicies {
    pub historical: RetryOptions,
    pub forecast: RetryOptions,
    pub plan: RetryOptions,
    pub projection: RetryOptions,
    pub comparison: RetryOptions,
    pub challenges: RetryOptions,
    pub daily_tip: RetryOptions,
    pub share_summary: RetryOptions,
    pub chat: RetryOptions,
}

impl RetryPolicies {
    pub const KINDS: [CallKind; 9] = [
        CallKind::Historical,
        CallKind::Forecast,
        CallKind::Plan,
        CallKind::Projection,
        CallKind::Comparison,
        CallKind::Challenges,
        CallKind::DailyTip,
        CallKind::ShareSummary,
        CallKind::Chat,
    ];

    pub fn for_kind(&self, kind: CallKind) -> &RetryOptions {
        match kind {
            CallKind::Historical => &self.historical,
            CallKind::Forecast => &self.forecast,
            CallKind::Plan => &self.plan,
            CallKind::Projection => &self.projection,
            CallKind::Comparison => &self.comparison,
            CallKind::Challenges => &self.challenges,
            CallKind::DailyTip => &self.daily_tip,
            CallKind::ShareSummary => &self.share_summary,
            CallKind::Chat => &self.chat,
        }
    }

    /// The same policy for every kind. Mostly useful in tests.
    pub fn uniform(options: RetryOptions) -> Self {
        Self {
            historical: options.clone(),
            forecast: options.clone(),
            plan: options.clone(),
            projection: options.clone(),
            comparison: options.clone(),
            challenges: options.clone(),
            daily_tip: options.clone(),
            share_summary: options.clone(),
            chat: options,
        }
    }
}

impl Default for RetryPolicies {
    fn default() -> Self {
        let structured = RetryOptions::default();
        let weather = RetryOptions::new(3, Duration::from_secs(2));
        Self {
            historical: weather.clone(),
            forecast: weather,
            plan: structured.clone(),
            projection: structured.clone(),
            comparison: structured.clone(),
            challenges: structured.clone(),
            daily_tip: structured,
            share_summary: RetryOptions::new(3, Duration::from_secs(4)),
            chat: RetryOptions::new(4, Duration::from_secs(3)),
        }
    }
}

/// Report store sizing.
///
/// The store has no entry limit or expiry; only an explicit clear removes
/// reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Reports the store has room for before it first grows
    pub initial_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 64,
        }
    }
}

/// Model names used for each kind of generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Structured (JSON schema) responses: plans, projections, comparisons, challenges
    pub structured: String,

    /// Free text and chat
    pub text: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            structured: "gemini-2.5-flash".to_string(),
            text: "gemini-flash-lite-latest".to_string(),
        }
    }
}

/// Which generative backend to use, plus its provider-specific options.
///
/// Options are handed to the provider factory as JSON (`api_key`, `base_url`).
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    #[serde(rename = "type")]
    pub provider_type: String,

    #[serde(flatten)]
    pub options: Map<String, JsonValue>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            provider_type: "gemini".to_string(),
            options: Map::new(),
        }
    }
}

impl ProviderSettings {
    pub fn options_json(&self) -> JsonValue {
        JsonValue::Object(self.options.clone())
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&String> = self.options.keys().collect();
        f.debug_struct("ProviderSettings")
            .field("provider_type", &self.provider_type)
            .field("option_keys", &keys)
            .finish()
    }
}

/// Weather data endpoints (Open-Meteo).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherSettings {
    pub archive_url: String,
    pub forecast_url: String,

    #[serde(with = "duration_str")]
    pub timeout: Duration,
}

impl Default for WeatherSettings {
    fn default() -> Self {
        Self {
            archive_url: "https://archive-api.open-meteo.com/v1/archive".to_string(),
            forecast_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Serde adapter for human-readable durations.
pub(crate) mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Like [`duration_str`], with `null` for "no value".
pub(crate) mod option_duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_str(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|text| humantime::parse_duration(&text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_call_kinds() {
        let config = RuntimeConfig::default();
        assert_eq!(config.retry.plan.max_retries, 6);
        assert_eq!(config.retry.plan.initial_delay, Duration::from_secs(8));
        assert_eq!(config.retry.share_summary.max_retries, 3);
        assert_eq!(config.retry.share_summary.initial_delay, Duration::from_secs(4));
        assert_eq!(config.retry.chat.max_retries, 4);
        assert_eq!(config.retry.chat.initial_delay, Duration::from_secs(3));
        assert_eq!(config.step_delay, Duration::from_secs(5));
        assert_eq!(config.models.structured, "gemini-2.5-flash");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config: RuntimeConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let yaml = r#"
step_delay: 0s
retry:
  plan:
    max_retries: 2
    initial_delay: 500ms
    fail_fast_on_rate_limit: true
store:
  initial_capacity: 16
provider:
  type: gemini
  api_key: from-config
"#;
        let config: RuntimeConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.step_delay, Duration::ZERO);
        assert_eq!(config.retry.plan.max_retries, 2);
        assert_eq!(config.retry.plan.initial_delay, Duration::from_millis(500));
        assert!(config.retry.plan.fail_fast_on_rate_limit);
        assert_eq!(config.retry.projection, RetryOptions::default());
        assert_eq!(config.store.initial_capacity, 16);
        assert_eq!(config.provider.options_json()["api_key"], "from-config");
    }

    #[test]
    fn test_provider_settings_debug_hides_values() {
        let mut settings = ProviderSettings::default();
        settings
            .options
            .insert("api_key".to_string(), JsonValue::from("very-secret"));
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("api_key"));
    }

    #[test]
    fn test_validate_rejects_zero_delay() {
        let mut config = RuntimeConfig::default();
        config.retry.chat.initial_delay = Duration::ZERO;
        let err = config.validate().unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidRetry {
                kind: CallKind::Chat,
                source: RetryOptionsError::ZeroDelay
            }
        );
    }

    #[test]
    fn test_round_trip_through_yaml() {
        let config = RuntimeConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("step_delay: 5s"));
        let back: RuntimeConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, config);
    }
}
