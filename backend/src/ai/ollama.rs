//! Ollama chat client with structured output.
//!
//! Sends one `/api/chat` request per work unit with `format` set to the
//! response JSON schema, so the model is constrained to the company list.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{prompt, Extractor, ResponseParser};
use crate::config::ExtractorConfig;
use crate::error::{ConfigError, ExtractionError, ExtractionResult};
use crate::models::{Company, SchemaVersion, WorkUnit};

/// Default Ollama API endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Default model
pub const DEFAULT_MODEL: &str = "llama3.2";

pub struct OllamaExtractor {
    endpoint: String,
    model: String,
    schema: SchemaVersion,
    client: reqwest::Client,
    parser: ResponseParser,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    format: Value,
    stream: bool,
    options: ChatOptions,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct OllamaError {
    error: String,
}

impl OllamaExtractor {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        schema: SchemaVersion,
        client: reqwest::Client,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            schema,
            client,
            parser: ResponseParser::new(schema)?,
        })
    }

    pub fn from_config(config: &ExtractorConfig, schema: SchemaVersion) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        Self::new(
            config.endpoint.as_deref().unwrap_or(DEFAULT_ENDPOINT),
            config.model.as_deref().unwrap_or(DEFAULT_MODEL),
            schema,
            client,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, unit: &WorkUnit) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompt::system_prompt().to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt::user_prompt(unit, self.schema),
                },
            ],
            format: prompt::response_schema(self.schema),
            stream: false,
            options: ChatOptions { temperature: 0.0 },
        }
    }
}

#[async_trait]
impl Extractor for OllamaExtractor {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn extract(&self, unit: &WorkUnit) -> ExtractionResult<Vec<Company>> {
        let url = format!("{}/api/chat", self.endpoint);
        debug!(unit = unit.id, records = unit.len(), model = %self.model, "Calling Ollama");

        let response = self.client.post(&url).json(&self.request(unit)).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<OllamaError>(&body)
                .map(|e| e.error)
                .unwrap_or_else(|_| body.clone());
            return Err(ExtractionError::Service(format!("HTTP {}: {}", status, message)));
        }

        let chat: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| ExtractionError::Malformed(format!("bad chat envelope: {}", e)))?;
        debug!(unit = unit.id, bytes = chat.message.content.len(), "Ollama raw response received");

        self.parser.parse(&chat.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawRecord;
    use std::sync::Arc;

    fn extractor() -> OllamaExtractor {
        OllamaExtractor::from_config(&ExtractorConfig::default(), SchemaVersion::V2).unwrap()
    }

    #[test]
    fn test_defaults() {
        let ex = extractor();
        assert_eq!(ex.model(), DEFAULT_MODEL);
        assert_eq!(ex.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_request_body() {
        let unit = WorkUnit {
            id: 0,
            header: Arc::from(vec!["Name".to_string()]),
            records: vec![RawRecord::new(2, vec!["Acme".into()])],
        };
        let body = serde_json::to_value(extractor().request(&unit)).unwrap();
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][1]["role"], "user");
        assert!(body["format"]["properties"]["companies"].is_object());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unit_error() {
        let ex = OllamaExtractor::new(
            "http://127.0.0.1:9",
            DEFAULT_MODEL,
            SchemaVersion::V2,
            reqwest::Client::new(),
        )
        .unwrap();
        let unit = WorkUnit {
            id: 4,
            header: Arc::from(vec!["Name".to_string()]),
            records: vec![RawRecord::new(2, vec!["Acme".into()])],
        };
        let err = ex.extract(&unit).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Request(_)));
    }
}
