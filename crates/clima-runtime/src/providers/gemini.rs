//! Google Gemini provider (`generateContent` REST endpoint).
//!
//! Supports structured output (`responseJsonSchema`), system instructions
//! and function calling.

use super::{
    factory::ProviderFactory,
    secrets::{ApiCredential, CredentialSource},
    ChatMessage, CompletionConfig, CompletionResponse, FunctionCall, LlmProvider, Part,
    ProviderError, Role, TokenUsage, ToolDeclaration,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

/// Environment variable holding the Gemini API key.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Checked when [`GEMINI_API_KEY_ENV`] is not set.
pub const GEMINI_API_KEY_FALLBACK_ENV: &str = "API_KEY";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const CREDENTIAL_NAME: &str = "Gemini API key";

/// Gemini generative provider.
pub struct GeminiProvider {
    credential: ApiCredential,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_credential(ApiCredential::new(
            api_key,
            CredentialSource::Programmatic,
            CREDENTIAL_NAME,
        ))
    }

    /// Read the key from `GEMINI_API_KEY`, then `API_KEY`.
    pub fn from_env() -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_env(
            &[GEMINI_API_KEY_ENV, GEMINI_API_KEY_FALLBACK_ENV],
            CREDENTIAL_NAME,
        )?;
        Ok(Self::with_credential(credential))
    }

    /// Build from provider options: `api_key` (else the environment) and
    /// an optional `base_url`.
    pub fn from_config(config: &JsonValue) -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_config_or_env(
            config,
            "api_key",
            &[GEMINI_API_KEY_ENV, GEMINI_API_KEY_FALLBACK_ENV],
            CREDENTIAL_NAME,
        )?;

        let mut provider = Self::with_credential(credential);
        if let Some(url) = config["base_url"].as_str() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ProviderError::NotConfigured(
                    "base_url must start with http:// or https://".to_string(),
                ));
            }
            provider = provider.with_base_url(url);
        }
        Ok(provider)
    }

    fn with_credential(credential: ApiCredential) -> Self {
        Self {
            credential,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,

    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSet>,

    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,

    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<WireFunctionResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionResponse {
    name: String,
    response: JsonValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolSet {
    function_declarations: Vec<ToolDeclaration>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    response_json_schema: Option<JsonValue>,

    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,

    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,

    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,

    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,

    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    #[serde(default)]
    message: String,
}

fn to_wire_part(part: Part) -> WirePart {
    match part {
        Part::Text(text) => WirePart {
            text: Some(text),
            ..Default::default()
        },
        Part::FunctionCall(call) => WirePart {
            function_call: Some(call),
            ..Default::default()
        },
        Part::FunctionResponse { name, content } => WirePart {
            function_response: Some(WireFunctionResponse {
                name,
                response: serde_json::json!({ "content": content }),
            }),
            ..Default::default()
        },
    }
}

fn build_request(messages: Vec<ChatMessage>, config: &CompletionConfig) -> GenerateContentRequest {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();

    for message in messages {
        let parts = message.parts.into_iter().map(to_wire_part);
        match message.role {
            Role::System => system_parts.extend(parts),
            role => contents.push(Content {
                role: Some(
                    match role {
                        Role::Model => "model",
                        // function responses travel as user turns
                        _ => "user",
                    }
                    .to_string(),
                ),
                parts: parts.collect(),
            }),
        }
    }

    let generation_config = if config.response_schema.is_some()
        || config.temperature.is_some()
        || config.max_tokens.is_some()
    {
        Some(GenerationConfig {
            response_mime_type: config.response_schema.as_ref().map(|_| "application/json"),
            response_json_schema: config.response_schema.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_tokens,
        })
    } else {
        None
    };

    GenerateContentRequest {
        contents,
        system_instruction: (!system_parts.is_empty()).then(|| Content {
            role: None,
            parts: system_parts,
        }),
        tools: if config.tools.is_empty() {
            Vec::new()
        } else {
            vec![ToolSet {
                function_declarations: config.tools.clone(),
            }]
        },
        generation_config,
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = build_request(messages, config);

        let response = self
            .client
            .post(self.endpoint(&config.model))
            .header("x-goog-api-key", self.credential.expose())
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(config.timeout)
                } else {
                    ProviderError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::RateLimited { retry_after });
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ProviderError::AuthError);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<GeminiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let candidate = body.candidates.into_iter().next();
        let stop_reason = candidate.as_ref().and_then(|c| c.finish_reason.clone());

        let mut content = String::new();
        let mut function_calls = Vec::new();
        for part in candidate
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .unwrap_or_default()
        {
            if let Some(text) = part.text {
                content.push_str(&text);
            }
            if let Some(call) = part.function_call {
                function_calls.push(call);
            }
        }

        if content.is_empty() && function_calls.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }

        let usage = body
            .usage_metadata
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
            })
            .unwrap_or_default();

        tracing::debug!(
            model = %config.model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "Gemini completion"
        );

        Ok(CompletionResponse {
            content,
            function_calls,
            usage,
            model: body.model_version.unwrap_or_else(|| config.model.clone()),
            stop_reason,
        })
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Factory for Gemini providers.
///
/// ## Options
/// ```json
/// {
///   "api_key": "AIza...",           // optional, falls back to GEMINI_API_KEY / API_KEY
///   "base_url": "https://..."        // optional
/// }
/// ```
pub struct GeminiProviderFactory;

impl ProviderFactory for GeminiProviderFactory {
    fn provider_type(&self) -> &'static str {
        "gemini"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(GeminiProvider::from_config(config)?))
    }

    fn description(&self) -> &'static str {
        "Google Gemini with structured output and function calling"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{Classify, ErrorClass};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "AIza-test-key-12345";

    async fn provider_for(server: &MockServer) -> GeminiProvider {
        GeminiProvider::new(KEY).with_base_url(server.uri())
    }

    #[test]
    fn test_request_shape() {
        let config = CompletionConfig::new("gemini-2.5-flash")
            .with_schema(serde_json::json!({ "type": "object" }));
        let request = build_request(
            vec![
                ChatMessage::system("Be brief."),
                ChatMessage::user("Hello"),
                ChatMessage::function_call(FunctionCall {
                    name: "get_current_weather".to_string(),
                    args: serde_json::json!({}),
                }),
                ChatMessage::function_response("get_current_weather", "Sunny"),
            ],
            &config,
        );
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "Be brief.");
        assert_eq!(json["contents"].as_array().unwrap().len(), 3);
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(
            json["contents"][1]["parts"][0]["functionCall"]["name"],
            "get_current_weather"
        );
        assert_eq!(
            json["contents"][2]["parts"][0]["functionResponse"]["response"]["content"],
            "Sunny"
        );
        assert_eq!(
            json["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(json["generationConfig"]["responseJsonSchema"]["type"], "object");
        assert!(json.get("tools").is_none());
    }

    #[tokio::test]
    async fn test_complete_returns_text_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", KEY))
            .and(body_partial_json(serde_json::json!({
                "contents": [{ "role": "user", "parts": [{ "text": "Hi" }] }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": { "role": "model", "parts": [{ "text": "Hello" }, { "text": " there" }] },
                    "finishReason": "STOP"
                }],
                "usageMetadata": { "promptTokenCount": 3, "candidatesTokenCount": 2 },
                "modelVersion": "gemini-2.5-flash-001"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let response = provider
            .complete(vec![ChatMessage::user("Hi")], &CompletionConfig::default())
            .await
            .unwrap();

        assert_eq!(response.content, "Hello there");
        assert_eq!(response.usage.total(), 5);
        assert_eq!(response.model, "gemini-2.5-flash-001");
        assert_eq!(response.stop_reason.as_deref(), Some("STOP"));
    }

    #[tokio::test]
    async fn test_function_calls_are_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": { "role": "model", "parts": [{
                        "functionCall": { "name": "summarize_risk_report", "args": { "riskType": "flood" } }
                    }] }
                }]
            })))
            .mount(&server)
            .await;

        let response = provider_for(&server)
            .await
            .complete(
                vec![ChatMessage::user("What should I do about floods?")],
                &CompletionConfig::new("gemini-flash-lite-latest"),
            )
            .await
            .unwrap();

        assert!(response.content.is_empty());
        assert_eq!(response.function_calls.len(), 1);
        assert_eq!(response.function_calls[0].args["riskType"], "flood");
    }

    #[tokio::test]
    async fn test_status_codes_map_to_classified_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/busy:generateContent"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/models/overloaded:generateContent"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "error": { "code": 503, "message": "The model is overloaded.", "status": "UNAVAILABLE" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/models/bad:generateContent"))
            .respond_with(ResponseTemplate::new(400).set_body_string("nope"))
            .mount(&server)
            .await;

        let provider = provider_for(&server).await;
        let call = |model: &'static str| {
            let provider = &provider;
            async move {
                provider
                    .complete(vec![ChatMessage::user("x")], &CompletionConfig::new(model))
                    .await
                    .unwrap_err()
            }
        };

        let err = call("busy").await;
        assert!(matches!(
            err,
            ProviderError::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(7)
        ));
        assert_eq!(err.classify(), ErrorClass::RateLimited);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));

        let err = call("overloaded").await;
        assert_eq!(err.classify(), ErrorClass::ServiceUnavailable);
        assert!(err.to_string().contains("The model is overloaded."));

        let err = call("bad").await;
        assert_eq!(err.classify(), ErrorClass::NonRetryable);
        assert!(err.to_string().contains("nope"));
    }

    #[tokio::test]
    async fn test_empty_candidates_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .await
            .complete(vec![ChatMessage::user("x")], &CompletionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse));
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let provider = GeminiProvider::new(KEY);
        let debug = format!("{:?}", provider);
        assert!(!debug.contains(KEY));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_from_config() {
        let provider = GeminiProvider::from_config(&serde_json::json!({
            "api_key": "config-key",
            "base_url": "https://proxy.example.com/v1beta/"
        }))
        .unwrap();
        assert_eq!(provider.base_url, "https://proxy.example.com/v1beta");
        assert_eq!(provider.credential.source(), CredentialSource::Config);
        assert_eq!(
            provider.endpoint("gemini-2.5-flash"),
            "https://proxy.example.com/v1beta/models/gemini-2.5-flash:generateContent"
        );

        let err = GeminiProvider::from_config(&serde_json::json!({
            "api_key": "k",
            "base_url": "ftp://nope"
        }))
        .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn test_factory_creates_gemini() {
        let provider = GeminiProviderFactory
            .create(&serde_json::json!({ "api_key": "k" }))
            .unwrap();
        assert_eq!(provider.name(), "gemini");
    }
}
