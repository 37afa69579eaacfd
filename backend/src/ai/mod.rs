//! Extraction service clients.
//!
//! The pipeline only sees the [`Extractor`] trait. Three implementations ship:
//!
//! - [`OllamaExtractor`] - local Ollama `/api/chat` with a JSON-schema `format`
//! - [`AnthropicExtractor`] - Anthropic messages API
//! - [`StubExtractor`] - deterministic, for tests and offline dry runs
//!
//! Clients make exactly one call per work unit. Retrying is left to callers.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tabsift::ai::build_extractor;
//! use tabsift::{ExtractorConfig, SchemaVersion};
//!
//! let extractor = build_extractor(&ExtractorConfig::from_env()?, SchemaVersion::V2)?;
//! let companies = extractor.extract(&unit).await?;
//! ```

pub mod anthropic;
pub mod ollama;
pub mod prompt;
pub mod stub;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::config::{ExtractorConfig, Provider};
use crate::error::{ConfigError, ExtractionError, ExtractionResult};
use crate::models::{Company, SchemaVersion, WorkUnit};

pub use anthropic::AnthropicExtractor;
pub use ollama::OllamaExtractor;
pub use prompt::{response_schema, system_prompt, user_prompt};
pub use stub::StubExtractor;

/// Converts one work unit into zero or more candidate companies.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Run one extraction call.
    ///
    /// Returning fewer companies than records is fine; failing means the
    /// whole unit yields nothing.
    async fn extract(&self, unit: &WorkUnit) -> ExtractionResult<Vec<Company>>;
}

/// Build the extractor selected by the configuration.
pub fn build_extractor(
    config: &ExtractorConfig,
    schema: SchemaVersion,
) -> Result<Arc<dyn Extractor>, ConfigError> {
    let extractor: Arc<dyn Extractor> = match config.provider {
        Provider::Ollama => Arc::new(OllamaExtractor::from_config(config, schema)?),
        Provider::Anthropic => Arc::new(AnthropicExtractor::from_config(config, schema)?),
        Provider::Stub => Arc::new(StubExtractor::echo()),
    };
    Ok(extractor)
}

#[derive(Debug, Deserialize)]
struct CompanyList {
    companies: Vec<Company>,
}

/// Checks and decodes structured responses for one schema revision.
pub struct ResponseParser {
    schema: SchemaVersion,
    validator: jsonschema::Validator,
}

impl ResponseParser {
    pub fn new(schema: SchemaVersion) -> Result<Self, ConfigError> {
        let validator = jsonschema::draft7::new(&response_schema(schema))
            .map_err(|e| ConfigError::InvalidValue {
                field: "response_schema".into(),
                message: e.to_string(),
            })?;
        Ok(Self { schema, validator })
    }

    /// Parse a model reply into companies.
    pub fn parse(&self, text: &str) -> ExtractionResult<Vec<Company>> {
        let json_str = extract_json(text);
        let value: Value = serde_json::from_str(&json_str).map_err(|e| {
            ExtractionError::Malformed(format!("{}. Response was: {}", e, preview(text)))
        })?;

        let errors: Vec<String> = self
            .validator
            .iter_errors(&value)
            .take(3)
            .map(|e| e.to_string())
            .collect();
        if !errors.is_empty() {
            return Err(ExtractionError::Malformed(errors.join("; ")));
        }

        let list: CompanyList =
            serde_json::from_value(value).map_err(|e| ExtractionError::Malformed(e.to_string()))?;

        let mut companies = list.companies;
        for company in &mut companies {
            company.restrict_to(self.schema);
        }
        Ok(companies)
    }
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(300) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Extract JSON from a response that may contain markdown code blocks
fn extract_json(text: &str) -> String {
    if let Some(start) = text.find("```json") {
        let json_start = start + 7;
        if let Some(end) = text[json_start..].find("```") {
            return text[json_start..json_start + end].trim().to_string();
        }
    }

    if let Some(start) = text.find("```") {
        let after_start = start + 3;
        let content_start = text[after_start..]
            .find('\n')
            .map(|i| after_start + i + 1)
            .unwrap_or(after_start);

        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim().to_string();
        }
    }

    if let Some(start) = text.find('{') {
        if let Some(end) = text.rfind('}') {
            if start < end {
                return text[start..=end].to_string();
            }
        }
    }

    text.to_string()
}
