//! Generative calls: plans, projections and the secondary insights.
//!
//! Every method makes exactly one backend request. Retrying, pacing and
//! circuit breaking belong to the caller (see [`ResilientExecutor`]).
//!
//! [`ResilientExecutor`]: crate::resilience::ResilientExecutor

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use clima_core::{
    parse_response, schema_json, ActionPlan, Challenge, ChallengeCategory, ComparisonData,
    DataPoint, HistoricalData, Location, ResponseKind, RiskReport, RiskType, UserProfile,
};

use crate::config::ModelConfig;
use crate::prompts;
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderError};

/// Produces the action plan of a report.
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    /// `existing` is the plan being replaced, if any.
    async fn generate_plan(
        &self,
        location: &Location,
        risk: RiskType,
        profile: &UserProfile,
        existing: Option<&ActionPlan>,
    ) -> Result<ActionPlan, ProviderError>;
}

/// Produces the future projection of a report.
#[async_trait]
pub trait ProjectionGenerator: Send + Sync {
    async fn generate_projection(
        &self,
        location: &Location,
        risk: RiskType,
        historical: &HistoricalData,
    ) -> Result<Vec<DataPoint>, ProviderError>;
}

#[derive(Deserialize)]
struct ProjectionResponse {
    projection: Vec<DataPoint>,
}

#[derive(Deserialize)]
struct GeneratedChallenge {
    title: String,
    description: String,
    category: ChallengeCategory,
}

#[derive(Deserialize)]
struct ChallengesResponse {
    challenges: Vec<GeneratedChallenge>,
}

/// Generative backend wrapped with the prompts and schemas of each call.
#[derive(Clone)]
pub struct ClimateAdvisor {
    provider: Arc<dyn LlmProvider>,
    models: ModelConfig,
}

impl std::fmt::Debug for ClimateAdvisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClimateAdvisor")
            .field("provider", &self.provider.name())
            .field("models", &self.models)
            .finish()
    }
}

impl ClimateAdvisor {
    pub fn new(provider: Arc<dyn LlmProvider>, models: ModelConfig) -> Self {
        Self { provider, models }
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn models(&self) -> &ModelConfig {
        &self.models
    }

    async fn structured(&self, kind: ResponseKind, prompt: String) -> Result<String, ProviderError> {
        let schema = schema_json(kind).map_err(|e| ProviderError::InvalidResponse(e.into()))?;
        let config = CompletionConfig::new(&self.models.structured).with_schema(schema);
        let response = self
            .provider
            .complete(vec![ChatMessage::user(prompt)], &config)
            .await?;

        tracing::debug!(
            kind = kind.name(),
            tokens = response.usage.total(),
            "Structured response received"
        );
        Ok(response.content)
    }

    async fn text(&self, prompt: String) -> Result<String, ProviderError> {
        let config = CompletionConfig::new(&self.models.text);
        let response = self
            .provider
            .complete(vec![ChatMessage::user(prompt)], &config)
            .await?;

        let text = response.content.trim();
        if text.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(text.to_string())
    }

    /// Compare the four risks at `location` against another place.
    ///
    /// Scores outside 1..=10 are clamped.
    pub async fn compare(
        &self,
        location: &Location,
        other: &str,
    ) -> Result<ComparisonData, ProviderError> {
        let text = self
            .structured(ResponseKind::Comparison, prompts::comparison(location, other))
            .await?;
        let data: ComparisonData = parse_response(ResponseKind::Comparison, &text)?;
        Ok(data.clamp_scores())
    }

    /// Five carbon-footprint challenges for someone at `location`.
    pub async fn challenges(&self, location: &Location) -> Result<Vec<Challenge>, ProviderError> {
        let text = self
            .structured(ResponseKind::Challenges, prompts::challenges(location))
            .await?;
        let parsed: ChallengesResponse = parse_response(ResponseKind::Challenges, &text)?;

        Ok(parsed
            .challenges
            .into_iter()
            .enumerate()
            .map(|(index, c)| Challenge {
                id: Some(format!("c{}", index + 1)),
                title: c.title,
                description: c.description,
                category: c.category,
                completed: false,
            })
            .collect())
    }

    pub async fn daily_tip(&self) -> Result<String, ProviderError> {
        self.text(prompts::DAILY_TIP_PROMPT.to_string()).await
    }

    /// A short shareable text about a report.
    pub async fn share_summary(
        &self,
        location: &Location,
        risk: RiskType,
        report: &RiskReport,
    ) -> Result<String, ProviderError> {
        self.text(prompts::share_summary(location, risk, report)).await
    }
}

#[async_trait]
impl PlanGenerator for ClimateAdvisor {
    async fn generate_plan(
        &self,
        location: &Location,
        risk: RiskType,
        profile: &UserProfile,
        existing: Option<&ActionPlan>,
    ) -> Result<ActionPlan, ProviderError> {
        let prompt = prompts::action_plan(location, risk, profile, existing);
        let text = self.structured(ResponseKind::ActionPlan, prompt).await?;
        Ok(parse_response(ResponseKind::ActionPlan, &text)?)
    }
}

#[async_trait]
impl ProjectionGenerator for ClimateAdvisor {
    async fn generate_projection(
        &self,
        location: &Location,
        risk: RiskType,
        historical: &HistoricalData,
    ) -> Result<Vec<DataPoint>, ProviderError> {
        let prompt = prompts::projection(location, risk, historical);
        let text = self.structured(ResponseKind::Projection, prompt).await?;
        let parsed: ProjectionResponse = parse_response(ResponseKind::Projection, &text)?;
        Ok(parsed.projection)
    }
}
