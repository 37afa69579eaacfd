//! Error types for the tabsift extraction pipeline.
//!
//! Errors are split by the boundary they cross:
//!
//! - [`SourceError`] - the input table cannot be opened or read (fatal)
//! - [`ExtractionError`] - one work unit failed at the extraction service (unit-scoped)
//! - [`StagingError`] - one record could not be staged (record-scoped)
//! - [`ExportError`] - the output table cannot be written
//! - [`ConfigError`] - invalid run or extractor configuration
//! - [`PipelineError`] - top-level errors returned by the controller
//!
//! Field-level validation never produces an error: a bad value is cleared.

use thiserror::Error;

// =============================================================================
// Source Errors
// =============================================================================

/// Errors while opening or reading the input table.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Failed to read the file.
    #[error("Cannot read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file has no content at all.
    #[error("Input table is empty")]
    EmptyFile,

    /// The header row is missing or blank.
    #[error("No header row found")]
    NoHeaders,

    /// The delimiter is not a single-byte ASCII character.
    #[error("Unsupported delimiter '{0}': must be an ASCII character")]
    InvalidDelimiter(char),

    /// A data row could not be parsed.
    #[error("Line {line}: {message}")]
    Malformed { line: usize, message: String },
}

// =============================================================================
// Extraction Errors
// =============================================================================

/// Errors from an extraction call. Scoped to a single work unit.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Transport-level failure (connection refused, DNS, timeout...).
    #[error("Request failed: {0}")]
    Request(String),

    /// The service answered with a non-success status.
    #[error("Service error: {0}")]
    Service(String),

    /// The structured payload does not match the expected schema.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// More candidates came back than records were submitted.
    #[error("Extractor returned {returned} candidates for {submitted} records")]
    TooManyCandidates { returned: usize, submitted: usize },

    /// The extraction task panicked.
    #[error("Extractor panicked: {0}")]
    Panicked(String),

    /// Deterministic failure injected by the stub extractor.
    #[error("Injected failure for unit {0}")]
    Injected(usize),
}

impl From<reqwest::Error> for ExtractionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExtractionError::Request(format!("timed out: {}", err))
        } else {
            ExtractionError::Request(err.to_string())
        }
    }
}

// =============================================================================
// Staging Errors
// =============================================================================

/// Errors while appending to the staging store. Scoped to a single record.
#[derive(Debug, Error)]
pub enum StagingError {
    /// The store reached its configured row limit.
    #[error("Staging store is full ({limit} rows)")]
    CapacityExceeded { limit: usize },
}

// =============================================================================
// Export Errors
// =============================================================================

/// Errors while writing the output table.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Underlying IO failure.
    #[error("Export IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writer failure.
    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Invalid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric setting is out of range.
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// A required environment variable is not set.
    #[error("Missing environment variable {0}")]
    MissingEnv(String),

    /// An enumerated setting has an unknown value.
    #[error("Unknown {kind} '{value}'")]
    Unknown { kind: String, value: String },

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(String),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level run errors.
///
/// Only setup and export problems surface here. Unit and record failures are
/// logged and counted in [`crate::RunResult`] instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input cannot be read.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Configuration rejected.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Output cannot be written.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Error log cannot be created.
    #[error("Cannot open error log '{path}': {source}")]
    ErrorLog {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Output file cannot be created.
    #[error("Cannot create output '{path}': {source}")]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type for extraction calls.
pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// Result type for pipeline runs.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let source_err = SourceError::EmptyFile;
        let pipeline_err: PipelineError = source_err.into();
        assert!(pipeline_err.to_string().contains("empty"));

        let config_err = ConfigError::MissingEnv("ANTHROPIC_API_KEY".into());
        let pipeline_err: PipelineError = config_err.into();
        assert!(pipeline_err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_too_many_candidates_format() {
        let err = ExtractionError::TooManyCandidates {
            returned: 7,
            submitted: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains('7'));
        assert!(msg.contains('5'));
    }

    #[test]
    fn test_malformed_line_format() {
        let err = SourceError::Malformed {
            line: 12,
            message: "unterminated quote".into(),
        };
        assert_eq!(err.to_string(), "Line 12: unterminated quote");
    }
}
