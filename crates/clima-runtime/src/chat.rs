//! Chat assistant with tools.
//!
//! The model may call one of two tools per turn:
//! - `get_current_weather`: five-day forecast at the user's location
//! - `summarize_risk_report { riskType }`: high-priority actions and summary
//!   of a stored report
//!
//! The tool result is sent back and the model's second answer is the reply.
//! Progress is published on a watch channel and always returns to
//! [`AssistantStatus::Idle`], including when the turn fails or is dropped.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use clima_core::{Location, RiskReport, RiskType, TemperatureUnit};

use crate::prompts::CHAT_SYSTEM_INSTRUCTION;
use crate::providers::{
    ChatMessage, CompletionConfig, FunctionCall, LlmProvider, ProviderError, ToolDeclaration,
};
use crate::resilience::{CallError, CallKind, ResilientExecutor, RetryOptions};
use crate::sources::ForecastProvider;

pub const WEATHER_TOOL: &str = "get_current_weather";
pub const REPORT_TOOL: &str = "summarize_risk_report";

/// What the assistant is doing right now.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AssistantStatus {
    #[default]
    Idle,
    Thinking,
    UsingTool(String),
}

impl fmt::Display for AssistantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssistantStatus::Idle => f.write_str("idle"),
            AssistantStatus::Thinking => f.write_str("thinking"),
            AssistantStatus::UsingTool(name) => write!(f, "Using tool: {}...", name),
        }
    }
}

/// What the tools can see.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub location: Option<Location>,
    pub reports: BTreeMap<RiskType, RiskReport>,
}

impl ToolContext {
    pub fn at(location: Location) -> Self {
        Self {
            location: Some(location),
            reports: BTreeMap::new(),
        }
    }

    pub fn with_report(mut self, risk: RiskType, report: RiskReport) -> Self {
        self.reports.insert(risk, report);
        self
    }
}

/// The tool declarations sent with every first request of a turn.
pub fn tool_declarations() -> Vec<ToolDeclaration> {
    vec![
        ToolDeclaration {
            name: WEATHER_TOOL.to_string(),
            description: "Get the 5-day weather forecast for the user's current location."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        },
        ToolDeclaration {
            name: REPORT_TOOL.to_string(),
            description: "Summarize a previously generated climate risk report for the user. \
                          Use this if the user asks for their action items, risks, or \
                          preparedness plan."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "riskType": {
                        "type": "string",
                        "description": "The type of climate risk to summarize.",
                        "enum": ["flood", "heatwave", "drought", "wildfire"]
                    }
                },
                "required": ["riskType"]
            }),
        },
    ]
}

struct IdleOnDrop<'a>(&'a watch::Sender<AssistantStatus>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.send_replace(AssistantStatus::Idle);
    }
}

pub struct ChatAssistant {
    provider: Arc<dyn LlmProvider>,
    forecasts: Arc<dyn ForecastProvider>,
    executor: ResilientExecutor,
    options: RetryOptions,
    model: String,
    status: watch::Sender<AssistantStatus>,
}

impl ChatAssistant {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        forecasts: Arc<dyn ForecastProvider>,
        executor: ResilientExecutor,
        options: RetryOptions,
        model: impl Into<String>,
    ) -> Self {
        let (status, _) = watch::channel(AssistantStatus::Idle);
        Self {
            provider,
            forecasts,
            executor,
            options,
            model: model.into(),
            status,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AssistantStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> AssistantStatus {
        self.status.borrow().clone()
    }

    /// Answer the last user message of `history`.
    pub async fn respond(
        &self,
        history: &[ChatMessage],
        context: &ToolContext,
    ) -> Result<String, CallError> {
        let _idle = IdleOnDrop(&self.status);
        let this = self;
        self.executor
            .execute(CallKind::Chat, &self.options, move || this.turn(history, context))
            .await
    }

    /// One attempt: a request, and at most one tool round-trip.
    async fn turn(
        &self,
        history: &[ChatMessage],
        context: &ToolContext,
    ) -> Result<String, ProviderError> {
        self.status.send_replace(AssistantStatus::Thinking);

        let mut messages = Vec::with_capacity(history.len() + 3);
        messages.push(ChatMessage::system(CHAT_SYSTEM_INSTRUCTION));
        messages.extend(history.iter().cloned());

        let with_tools = CompletionConfig::new(&self.model).with_tools(tool_declarations());
        let response = self.provider.complete(messages.clone(), &with_tools).await?;

        let Some(call) = response.function_calls.into_iter().next() else {
            return non_empty(response.content);
        };

        self.status
            .send_replace(AssistantStatus::UsingTool(call.name.clone()));
        tracing::info!(tool = %call.name, "Assistant is using a tool");
        let result = self.run_tool(&call, context).await;

        let name = call.name.clone();
        messages.push(ChatMessage::function_call(call));
        messages.push(ChatMessage::function_response(name, result));

        self.status.send_replace(AssistantStatus::Thinking);
        let follow_up = self
            .provider
            .complete(messages, &CompletionConfig::new(&self.model))
            .await?;
        non_empty(follow_up.content)
    }

    async fn run_tool(&self, call: &FunctionCall, context: &ToolContext) -> String {
        match call.name.as_str() {
            WEATHER_TOOL => {
                let Some(location) = &context.location else {
                    return "I can't get the weather because I don't know the user's location."
                        .to_string();
                };
                match self
                    .forecasts
                    .fetch_forecast(location, TemperatureUnit::Celsius)
                    .await
                {
                    Ok(days) => {
                        let days: Vec<String> = days
                            .iter()
                            .map(|d| format!("{}: {}°/{}°C", d.day, d.high_temp, d.low_temp))
                            .collect();
                        format!("The 5-day forecast is: {}", days.join(", "))
                    }
                    Err(e) => format!("An error occurred while fetching the weather: {}", e),
                }
            }
            REPORT_TOOL => {
                let raw = call.args["riskType"].as_str().unwrap_or_default();
                let plan = raw
                    .parse::<RiskType>()
                    .ok()
                    .and_then(|risk| context.reports.get(&risk))
                    .and_then(|report| report.action_plan.as_ref());

                match plan {
                    None => format!(
                        "The user has not generated a report for {} risk yet. Ask them to go to \
                         the dashboard and generate one first.",
                        raw
                    ),
                    Some(plan) => {
                        let titles: Vec<&str> =
                            plan.high_priority().map(|i| i.title.as_str()).collect();
                        let titles = if titles.is_empty() {
                            "None".to_string()
                        } else {
                            titles.join(", ")
                        };
                        format!(
                            "For {} risk, the user's high-priority actions are: {}. The overall \
                             summary is: {}",
                            raw, titles, plan.summary
                        )
                    }
                }
            }
            other => {
                tracing::warn!(tool = other, "Model called an unknown tool");
                "Unknown tool called.".to_string()
            }
        }
    }
}

fn non_empty(text: String) -> Result<String, ProviderError> {
    if text.trim().is_empty() {
        Err(ProviderError::EmptyResponse)
    } else {
        Ok(text)
    }
}

/// A conversation: history plus the assistant answering it.
pub struct ChatSession {
    assistant: Arc<ChatAssistant>,
    history: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(assistant: Arc<ChatAssistant>) -> Self {
        Self {
            assistant,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn assistant(&self) -> &Arc<ChatAssistant> {
        &self.assistant
    }

    /// Send a user message and return the reply added to the history.
    ///
    /// A failed turn adds an apology carrying the error message instead.
    pub async fn send(&mut self, text: impl Into<String>, context: &ToolContext) -> String {
        self.history.push(ChatMessage::user(text));

        let reply = match self.assistant.respond(&self.history, context).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, detail = e.detail(), "Chat turn failed");
                format!("Sorry, I encountered an error: {}", e)
            }
        };

        self.history.push(ChatMessage::model(reply.clone()));
        reply
    }
}
