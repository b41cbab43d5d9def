//! # clima-core
//!
//! Deterministic domain model for the clima climate-risk advisor.
//!
//! This crate holds everything that does not talk to the network:
//! - Risk reports and the patches that fill them
//! - Action plans and the status-preserving plan merge
//! - Historical anomaly series aggregated from daily observations
//! - Forecast mapping and proactive alert detection
//! - JSON Schemas for structured generative responses
//!
//! ## Key Guarantees
//!
//! 1. **No I/O**: every function is pure over its inputs
//! 2. **Progress survives regeneration**: merging a new plan keeps the id and
//!    status of every matching item
//! 3. **Validated input**: generative responses are schema-checked before use
//!
//! ## Example
//!
//! ```rust
//! use clima_core::{merge_plan, ActionPlan, ItemStatus};
//!
//! let json = r#"{"summary":"Stay dry.","items":[{"title":"Install storm shutters",
//!     "description":"Protect windows.","category":"Home","priority":"High"}]}"#;
//! let generated: ActionPlan = serde_json::from_str(json).unwrap();
//!
//! let mut current = merge_plan(None, generated.clone());
//! current.set_status("Install storm shutters", ItemStatus::Completed);
//!
//! let refreshed = merge_plan(Some(&current), generated);
//! assert_eq!(refreshed.items[0].status, ItemStatus::Completed);
//! ```

pub mod alerts;
pub mod forecast;
pub mod historical;
pub mod plan;
pub mod report;
pub mod schema;
pub mod types;

// Re-export main types at crate root
pub use alerts::{check_for_alerts, without_dismissed, Alert};
pub use forecast::{Condition, DailyForecast, ForecastDay, ForecastError, TemperatureUnit};
pub use historical::{
    aggregate, archive_window, DailyArchive, DataPoint, HistoricalData, HistoricalError,
};
pub use plan::{merge_plan, ActionItem, ActionPlan, Category, ItemId, ItemStatus, Priority, Resource};
pub use report::{ReportPatch, RiskReport};
pub use schema::{parse_response, schema_json, ResponseError, ResponseKind, SchemaError};
pub use types::{
    default_challenges, Challenge, ChallengeCategory, ComparisonData, HomeType,
    HouseholdMember, LocalEnvironment, Location, ReportKey, RiskComparisonItem, RiskType,
    UnknownRiskType, UserProfile,
};
