//! JSON Schemas for structured generative responses.
//!
//! The same schema documents are sent to the backend as the requested
//! response shape and used here to validate what comes back before it is
//! deserialized. A response that does not validate is rejected whole.

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

const ACTION_PLAN_SCHEMA_JSON: &str = include_str!("../schemas/action_plan.schema.json");
const PROJECTION_SCHEMA_JSON: &str = include_str!("../schemas/projection.schema.json");
const COMPARISON_SCHEMA_JSON: &str = include_str!("../schemas/comparison.schema.json");
const CHALLENGES_SCHEMA_JSON: &str = include_str!("../schemas/challenges.schema.json");

lazy_static! {
    // Models sometimes wrap JSON in a markdown fence despite being asked not to.
    static ref FENCED_JSON: Regex = Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").unwrap();
}

/// The structured response shapes the runtime asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    ActionPlan,
    Projection,
    Comparison,
    Challenges,
}

impl ResponseKind {
    fn source(&self) -> &'static str {
        match self {
            ResponseKind::ActionPlan => ACTION_PLAN_SCHEMA_JSON,
            ResponseKind::Projection => PROJECTION_SCHEMA_JSON,
            ResponseKind::Comparison => COMPARISON_SCHEMA_JSON,
            ResponseKind::Challenges => CHALLENGES_SCHEMA_JSON,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResponseKind::ActionPlan => "action plan",
            ResponseKind::Projection => "projection",
            ResponseKind::Comparison => "comparison",
            ResponseKind::Challenges => "challenges",
        }
    }
}

/// Errors loading the embedded schemas.
#[derive(Error, Debug, Clone)]
pub enum SchemaError {
    #[error("Failed to load schema: {0}")]
    LoadError(String),
}

/// Errors turning response text into a typed value.
#[derive(Error, Debug)]
pub enum ResponseError {
    #[error("Response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Response does not match the {kind} schema: {}", .errors.join("; "))]
    SchemaViolation {
        kind: &'static str,
        errors: Vec<String>,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

struct Validators {
    action_plan: jsonschema::Validator,
    projection: jsonschema::Validator,
    comparison: jsonschema::Validator,
    challenges: jsonschema::Validator,
}

impl Validators {
    fn get(&self, kind: ResponseKind) -> &jsonschema::Validator {
        match kind {
            ResponseKind::ActionPlan => &self.action_plan,
            ResponseKind::Projection => &self.projection,
            ResponseKind::Comparison => &self.comparison,
            ResponseKind::Challenges => &self.challenges,
        }
    }
}

static COMPILED: OnceLock<Result<Validators, String>> = OnceLock::new();

fn compile(kind: ResponseKind) -> Result<jsonschema::Validator, String> {
    let value: Value = serde_json::from_str(kind.source())
        .map_err(|e| format!("Invalid {} schema JSON: {}", kind.name(), e))?;
    jsonschema::options()
        .build(&value)
        .map_err(|e| format!("Failed to compile {} schema: {}", kind.name(), e))
}

fn validators() -> Result<&'static Validators, SchemaError> {
    let result = COMPILED.get_or_init(|| {
        Ok(Validators {
            action_plan: compile(ResponseKind::ActionPlan)?,
            projection: compile(ResponseKind::Projection)?,
            comparison: compile(ResponseKind::Comparison)?,
            challenges: compile(ResponseKind::Challenges)?,
        })
    });

    match result {
        Ok(v) => Ok(v),
        Err(e) => Err(SchemaError::LoadError(e.clone())),
    }
}

/// The schema document for a response kind.
pub fn schema_json(kind: ResponseKind) -> Result<Value, SchemaError> {
    serde_json::from_str(kind.source()).map_err(|e| SchemaError::LoadError(e.to_string()))
}

/// Validate a JSON value against the schema for `kind`.
///
/// Returns the list of validation messages on failure.
pub fn validate_response(kind: ResponseKind, value: &Value) -> Result<(), ResponseError> {
    let validator = validators()?.get(kind);

    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ResponseError::SchemaViolation {
            kind: kind.name(),
            errors,
        })
    }
}

/// Strip surrounding whitespace and an optional markdown code fence.
pub fn extract_json_payload(text: &str) -> &str {
    match FENCED_JSON.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => text.trim(),
    }
}

/// Extract, validate and deserialize a structured response.
pub fn parse_response<T: DeserializeOwned>(kind: ResponseKind, text: &str) -> Result<T, ResponseError> {
    let value: Value = serde_json::from_str(extract_json_payload(text))?;
    validate_response(kind, &value)?;
    Ok(serde_json::from_value(value)?)
}
