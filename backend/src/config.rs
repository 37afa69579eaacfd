//! Run configuration.
//!
//! [`PipelineConfig`] carries the knobs of a single run; [`ExtractorConfig`]
//! selects and parameterises the extraction service, usually from the
//! environment (a `.env` file is honoured).

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::SchemaVersion;
use crate::staging::InsertPolicy;
use crate::validation::{PhonePolicy, ValidationRules};

/// Default number of records per extraction call.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Default number of concurrent extraction calls.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default HTTP timeout for live extractors.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Options for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Records per work unit (>= 1). `1` gives the unbatched mode.
    pub batch_size: usize,

    /// Worker pool size (>= 1).
    pub concurrency: usize,

    /// Field validation rules.
    pub rules: ValidationRules,

    /// Insert filter for the staging store.
    pub insert_policy: InsertPolicy,

    /// Output schema revision.
    pub schema: SchemaVersion,

    /// Optional cap on staged rows.
    pub max_staged_rows: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            rules: ValidationRules::default(),
            insert_policy: InsertPolicy::default(),
            schema: SchemaVersion::default(),
            max_staged_rows: None,
        }
    }
}

impl PipelineConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_phone_policy(mut self, policy: PhonePolicy) -> Self {
        self.rules.phone = policy;
        self
    }

    pub fn with_insert_policy(mut self, policy: InsertPolicy) -> Self {
        self.insert_policy = policy;
        self
    }

    pub fn with_schema(mut self, schema: SchemaVersion) -> Self {
        self.schema = schema;
        self
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batch_size".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "concurrency".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.max_staged_rows == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "max_staged_rows".into(),
                message: "must be at least 1 when set".into(),
            });
        }
        Ok(())
    }
}

/// Extraction backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Local Ollama server with structured output.
    #[default]
    Ollama,
    /// Anthropic messages API.
    Anthropic,
    /// Deterministic offline stub.
    Stub,
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "stub" => Ok(Provider::Stub),
            other => Err(ConfigError::Unknown {
                kind: "provider".into(),
                value: other.into(),
            }),
        }
    }
}

/// Extraction service settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractorConfig {
    pub provider: Provider,
    /// Model name; each provider has its own default.
    pub model: Option<String>,
    /// Base URL override.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl ExtractorConfig {
    /// Read `TABSIFT_PROVIDER`, `TABSIFT_MODEL`, `OLLAMA_HOST`,
    /// `ANTHROPIC_API_KEY` and `TABSIFT_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let provider = match env::var("TABSIFT_PROVIDER") {
            Ok(p) => p.parse()?,
            Err(_) => Provider::default(),
        };
        let timeout_secs = match env::var("TABSIFT_TIMEOUT_SECS") {
            Ok(raw) => Some(raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                field: "TABSIFT_TIMEOUT_SECS".into(),
                message: e.to_string(),
            })?),
            Err(_) => None,
        };

        Ok(Self {
            provider,
            model: env::var("TABSIFT_MODEL").ok(),
            endpoint: match provider {
                Provider::Ollama => env::var("OLLAMA_HOST").ok(),
                _ => None,
            },
            api_key: env::var("ANTHROPIC_API_KEY").ok(),
            timeout_secs,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.insert_policy, InsertPolicy::NameExcluded);
        assert_eq!(config.rules.phone, PhonePolicy::Permissive);
        assert_eq!(config.schema, SchemaVersion::V2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        assert!(PipelineConfig::default().with_batch_size(0).validate().is_err());
        assert!(PipelineConfig::default().with_concurrency(0).validate().is_err());
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!("Ollama".parse::<Provider>().unwrap(), Provider::Ollama);
        assert_eq!("claude".parse::<Provider>().unwrap(), Provider::Anthropic);
        assert!("openai".parse::<Provider>().is_err());
    }

    #[test]
    fn test_config_serializes() {
        let json = serde_json::to_value(PipelineConfig::default()).unwrap();
        assert_eq!(json["insert_policy"], "name-excluded");
        assert_eq!(json["schema"], "v2");
    }
}
