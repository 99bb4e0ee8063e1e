// src/provider/openai.rs — OpenAI chat completions generator

use async_trait::async_trait;
use std::time::Duration;

use super::pricing::{calculate_cost, estimate_tokens, TokenUsage};
use super::prompt::{extract_dockerfile, system_prompt, user_prompt};
use super::{Generation, GenerationError, GenerationProvider, GenerationRequest};
use crate::core::cancel::CancelSignal;
use crate::infra::config::GenerationConfig;

/// Wait used when a 429 carries no usable Retry-After header.
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(5);

pub struct OpenAiGenerator {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiGenerator {
    pub fn new(api_key: String, model: impl Into<String>) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: "https://api.openai.com/v1".into(),
            model: model.into(),
            max_tokens: 2000,
            temperature: 0.1,
        }
    }

    pub fn from_config(api_key: String, config: &GenerationConfig) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, request: &GenerationRequest) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt() },
                { "role": "user", "content": user_prompt(request) },
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        })
    }

    async fn call(&self, request: &GenerationRequest) -> Result<Generation, GenerationError> {
        let body = self.request_body(request);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    GenerationError::Transient {
                        message: e.to_string(),
                        cost: 0.0,
                        retry_after: None,
                    }
                } else {
                    GenerationError::Unavailable {
                        message: e.to_string(),
                        cost: 0.0,
                    }
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RATE_LIMIT_WAIT);
            return Err(GenerationError::Transient {
                message: "rate limited (HTTP 429)".into(),
                cost: 0.0,
                retry_after: Some(retry_after),
            });
        }

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = format!(
                "HTTP {}: {}",
                status,
                crate::util::truncate_str(&error_body, 500)
            );
            return Err(if status.is_server_error() {
                GenerationError::Transient {
                    message,
                    cost: 0.0,
                    retry_after: None,
                }
            } else {
                GenerationError::Unavailable { message, cost: 0.0 }
            });
        }

        let resp: serde_json::Value = response
            .json()
            .await
            .map_err(|e| self.unreadable_body(request, &e))?;

        parse_completion(&self.model, &resp)
    }

    /// A 2xx body that cannot be read was still billed; its usage is lost, so
    /// the estimate stands in for the cost. Not retried.
    fn unreadable_body(
        &self,
        request: &GenerationRequest,
        err: &dyn std::fmt::Display,
    ) -> GenerationError {
        GenerationError::Content {
            message: format!("Failed to parse response: {}", err),
            cost: self.estimate_cost(request).unwrap_or(0.0),
        }
    }
}

/// Turn a chat completion body into a generation, charging for its usage
/// whether or not the content is usable.
fn parse_completion(
    requested_model: &str,
    resp: &serde_json::Value,
) -> Result<Generation, GenerationError> {
    let usage = TokenUsage {
        input_tokens: resp["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        output_tokens: resp["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    };
    let model = resp["model"]
        .as_str()
        .unwrap_or(requested_model)
        .to_string();
    // Price by the requested model; dated snapshot names map to the same row.
    let cost = calculate_cost(requested_model, &usage);

    let choice = &resp["choices"][0];
    if choice["finish_reason"].as_str() == Some("content_filter") {
        return Err(GenerationError::Content {
            message: "response blocked by content filter".into(),
            cost,
        });
    }

    let content = choice["message"]["content"].as_str().unwrap_or("");
    tracing::debug!(
        "completion: {} in / {} out tokens, ${:.5}",
        usage.input_tokens,
        usage.output_tokens,
        cost
    );

    match extract_dockerfile(content) {
        Ok(dockerfile) => Ok(Generation {
            dockerfile,
            cost,
            model,
        }),
        Err(message) => Err(GenerationError::Content { message, cost }),
    }
}

#[async_trait]
impl GenerationProvider for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancelSignal,
    ) -> Result<Generation, GenerationError> {
        tokio::select! {
            result = self.call(&request) => result,
            // An aborted HTTP request is not billed by the API.
            _ = cancel.cancelled() => Err(GenerationError::Cancelled { cost: 0.0 }),
        }
    }

    fn estimate_cost(&self, request: &GenerationRequest) -> Option<f64> {
        let prompt_tokens = estimate_tokens(system_prompt()) + estimate_tokens(&user_prompt(request));
        let usage = TokenUsage {
            input_tokens: prompt_tokens,
            output_tokens: self.max_tokens,
        };
        Some(calculate_cost(&self.model, &usage))
    }
}
