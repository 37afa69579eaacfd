//! Anthropic messages API client.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{prompt, Extractor, ResponseParser};
use crate::config::ExtractorConfig;
use crate::error::{ConfigError, ExtractionError, ExtractionResult};
use crate::models::{Company, SchemaVersion, WorkUnit};

pub const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com";

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Anthropic API client
pub struct AnthropicExtractor {
    api_key: String,
    endpoint: String,
    model: String,
    max_tokens: u32,
    schema: SchemaVersion,
    client: reqwest::Client,
    parser: ResponseParser,
}

/// Anthropic API response structure
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

/// Anthropic API error response
#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl AnthropicExtractor {
    pub fn from_config(config: &ExtractorConfig, schema: SchemaVersion) -> Result<Self, ConfigError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ConfigError::MissingEnv("ANTHROPIC_API_KEY".into()))?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Ok(Self {
            api_key,
            endpoint: config
                .endpoint
                .as_deref()
                .unwrap_or(DEFAULT_ENDPOINT)
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: 4096,
            schema,
            client,
            parser: ResponseParser::new(schema)?,
        })
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn request_body(&self, unit: &WorkUnit) -> serde_json::Value {
        let schema = prompt::response_schema(self.schema);
        let user = format!(
            "{}\nRespond with a JSON object matching this schema:\n{}",
            prompt::user_prompt(unit, self.schema),
            schema
        );
        serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": 0,
            "system": prompt::system_prompt(),
            "messages": [{ "role": "user", "content": user }]
        })
    }
}

#[async_trait]
impl Extractor for AnthropicExtractor {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn extract(&self, unit: &WorkUnit) -> ExtractionResult<Vec<Company>> {
        debug!(unit = unit.id, records = unit.len(), model = %self.model, "Calling Anthropic API");

        let response = self
            .client
            .post(format!("{}/v1/messages", self.endpoint))
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&self.request_body(unit))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<AnthropicError>(&body) {
                return Err(ExtractionError::Service(error.error.message));
            }
            return Err(ExtractionError::Service(format!("HTTP {}: {}", status, body)));
        }

        let response: AnthropicResponse =
            serde_json::from_str(&body).map_err(|e| ExtractionError::Malformed(e.to_string()))?;

        let text = response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        if text.is_empty() {
            return Err(ExtractionError::Malformed("Empty response".to_string()));
        }

        self.parser.parse(&text)
    }
}
