//! # Tabsift - company record extraction from messy CSV
//!
//! Tabsift reads loosely structured CSV files (exports, scraped lists, CRM dumps),
//! asks a language model to map each row onto a fixed company schema, repairs or
//! clears fields that fail deterministic checks, and writes a clean CSV.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Batcher   │────▶│  Extractor  │────▶│  Validator  │
//! │  (any enc)  │     │ (work units)│     │ (N workers) │     │  (per field)│
//! └─────────────┘     └─────────────┘     └─────────────┘     └──────┬──────┘
//!                                                                    │
//!                     ┌─────────────┐     ┌─────────────┐            │
//!                     │  Clean CSV  │◀────│   Staging   │◀───────────┘
//!                     │  (v1 / v2)  │     │ (controller)│
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use tabsift::{build_extractor, ErrorLog, ExtractorConfig, Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = PipelineConfig::default();
//!     let extractor = build_extractor(&ExtractorConfig::from_env().unwrap(), config.schema).unwrap();
//!     let log = ErrorLog::create("error_log.txt").unwrap();
//!     let result = Pipeline::new(config, extractor, log)
//!         .run(Path::new("input.csv"), Path::new("output.csv"))
//!         .await
//!         .unwrap();
//!     println!("Exported {} companies", result.rows_exported);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per concern
//! - [`models`] - Records, work units, the company schema
//! - [`config`] - Run and extractor configuration
//! - [`parser`] - CSV reading with encoding and delimiter detection
//! - [`validation`] - Field-level check and repair
//! - [`ai`] - Extractor trait and clients
//! - [`staging`] - In-memory store and CSV export
//! - [`report`] - Error log and progress callbacks
//! - [`pipeline`] - Batching, dispatch and run control

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Input
pub mod parser;

// Validation
pub mod validation;

// AI
pub mod ai;

// Output
pub mod report;
pub mod staging;

// Orchestration
pub mod pipeline;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError,
    ExportError,
    ExtractionError,
    PipelineError,
    PipelineResult,
    SourceError,
    StagingError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    CandidateRecord,
    Company,
    Field,
    RawRecord,
    SchemaVersion,
    ValidatedRecord,
    WorkUnit,
};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{ExtractorConfig, PipelineConfig, Provider};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{decode_content, detect_delimiter, detect_encoding, CsvSource, RecordCount};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{
    validate_email,
    validate_field,
    validate_linkedin,
    validate_phone,
    validate_record,
    validate_social,
    validate_ticket_size,
    PhonePolicy,
    Validation,
    ValidationRules,
};

// =============================================================================
// Re-exports - AI Client
// =============================================================================

pub use ai::{build_extractor, Extractor, StubExtractor};

// =============================================================================
// Re-exports - Staging & Reporting
// =============================================================================

pub use report::{ErrorLog, NoProgress, ProgressSink};
pub use staging::{InsertOutcome, InsertPolicy, StagingStore};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use pipeline::{Pipeline, RunPhase, RunResult};
