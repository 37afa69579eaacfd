//! Run orchestration.
//!
//! The [`Pipeline`] drives one run end to end: count the source, open the
//! output, dispatch units, absorb every outcome into the staging store and the
//! [`RunResult`], then export once. It is the only owner of the store, the
//! counters and the injected error log and progress sink.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::dispatcher::{DispatchEvent, Dispatcher, UnitOutcome};
use crate::ai::Extractor;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult, SourceError};
use crate::models::Field;
use crate::parser::CsvSource;
use crate::report::{ErrorLog, NoProgress, ProgressSink};
use crate::staging::{InsertOutcome, StagingStore};

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Idle,
    Counting,
    Running,
    Draining,
    Exporting,
    Done,
    Failed,
}

impl RunPhase {
    /// Allowed transitions. `Failed` is reachable from every non-terminal phase.
    pub fn can_transition_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (self, next),
            (Idle, Counting)
                | (Counting, Running)
                | (Running, Draining)
                | (Draining, Exporting)
                | (Exporting, Done)
                | (Idle | Counting | Running | Draining | Exporting, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Failed)
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub phase: RunPhase,

    /// Data rows in the source, blank and malformed ones included.
    pub total_rows: usize,
    pub blank_rows: usize,
    pub malformed_rows: usize,

    pub records_dispatched: usize,
    pub units_dispatched: usize,
    pub units_failed: usize,
    pub records_in_failed_units: usize,

    pub candidates: usize,
    pub fields_cleared: usize,
    pub rows_inserted: usize,
    pub rows_suppressed: usize,
    pub staging_failures: usize,
    pub rows_exported: usize,

    pub output_path: Option<String>,
    pub error_log_path: Option<String>,
    pub error_log_entries: usize,
}

impl RunResult {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            phase: RunPhase::Idle,
            total_rows: 0,
            blank_rows: 0,
            malformed_rows: 0,
            records_dispatched: 0,
            units_dispatched: 0,
            units_failed: 0,
            records_in_failed_units: 0,
            candidates: 0,
            fields_cleared: 0,
            rows_inserted: 0,
            rows_suppressed: 0,
            staging_failures: 0,
            rows_exported: 0,
            output_path: None,
            error_log_path: None,
            error_log_entries: 0,
        }
    }

    /// Records that reached the extractor in a unit that succeeded.
    pub fn records_extracted(&self) -> usize {
        self.records_dispatched - self.records_in_failed_units
    }
}

/// Pipeline controller for a single run.
pub struct Pipeline {
    config: PipelineConfig,
    extractor: Arc<dyn Extractor>,
    error_log: ErrorLog,
    progress: Box<dyn ProgressSink>,
    result: RunResult,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, extractor: Arc<dyn Extractor>, error_log: ErrorLog) -> Self {
        Self {
            config,
            extractor,
            error_log,
            progress: Box::new(NoProgress),
            result: RunResult::new(),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.result.phase
    }

    /// Process `input` into the CSV file at `output`.
    ///
    /// The output is created (or truncated) before any unit is dispatched.
    pub async fn run(mut self, input: &Path, output: &Path) -> PipelineResult<RunResult> {
        info!(
            run_id = %self.result.run_id,
            input = %input.display(),
            output = %output.display(),
            extractor = self.extractor.name(),
            "Starting run"
        );
        self.enter(RunPhase::Counting);

        if let Err(e) = self.config.validate() {
            return Err(self.fail(e.into()));
        }
        let (source, file) = match open(input, output) {
            Ok(opened) => opened,
            Err(e) => return Err(self.fail(e)),
        };

        self.result.output_path = Some(output.display().to_string());
        self.execute(source, BufWriter::new(file)).await
    }

    /// Process an already opened source into any writer.
    pub async fn run_source<W: Write>(mut self, source: CsvSource, writer: W) -> PipelineResult<RunResult> {
        self.enter(RunPhase::Counting);
        if let Err(e) = self.config.validate() {
            return Err(self.fail(e.into()));
        }
        self.execute(source, writer).await
    }

    async fn execute<W: Write>(mut self, source: CsvSource, writer: W) -> PipelineResult<RunResult> {
        let count = source.count();
        self.result.total_rows = count.rows;
        self.result.blank_rows = count.blank;
        self.result.malformed_rows = count.malformed;
        self.result.error_log_path = self.error_log.path().map(|p| p.display().to_string());

        let total = count.usable();
        info!(
            rows = count.rows,
            blank = count.blank,
            malformed = count.malformed,
            encoding = source.encoding(),
            delimiter = %source.delimiter(),
            "Source counted"
        );

        self.enter(RunPhase::Running);
        self.progress.start(total);

        let mut store =
            StagingStore::new(self.config.insert_policy).with_limit(self.config.max_staged_rows);
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.extractor),
            self.config.rules,
            self.config.concurrency,
        )
        .with_schema(self.config.schema);
        let mut handle = dispatcher.spawn(source, self.config.batch_size);

        let mut done = 0;
        while let Some(event) = handle.events.recv().await {
            match event {
                DispatchEvent::Unit(outcome) => {
                    done += outcome.records;
                    self.absorb(outcome, &mut store);
                    self.progress.advance(done, total);
                }
                DispatchEvent::SourceRejected(e) => self.reject(e),
                DispatchEvent::SourceExhausted { units } => {
                    debug!(units, "Source exhausted");
                    self.enter(RunPhase::Draining);
                }
            }
        }
        handle.join().await;
        if self.result.phase == RunPhase::Running {
            self.enter(RunPhase::Draining);
        }

        self.result.rows_suppressed = store.suppressed();
        self.enter(RunPhase::Exporting);
        match store.export(writer, self.config.schema) {
            Ok(rows) => self.result.rows_exported = rows,
            Err(e) => return Err(self.fail(e.into())),
        }

        self.progress.finish();
        self.result.error_log_entries = self.error_log.entries();
        if let Err(e) = self.error_log.finish() {
            warn!(error = %e, "Failed to flush error log");
        }

        self.enter(RunPhase::Done);
        self.result.finished_at = Some(Utc::now());
        info!(
            run_id = %self.result.run_id,
            units = self.result.units_dispatched,
            failed = self.result.units_failed,
            exported = self.result.rows_exported,
            "Run completed"
        );
        Ok(self.result)
    }

    fn absorb(&mut self, outcome: UnitOutcome, store: &mut StagingStore) {
        let result = &mut self.result;
        result.units_dispatched += 1;
        result.records_dispatched += outcome.records;

        let validations = match outcome.result {
            Ok(v) => v,
            Err(e) => {
                warn!(unit = outcome.id, error = %e, "Unit failed");
                result.units_failed += 1;
                result.records_in_failed_units += outcome.records;
                self.error_log.record(&outcome.scope, &e);
                return;
            }
        };

        debug!(unit = outcome.id, candidates = validations.len(), "Unit extracted");
        result.candidates += validations.len();
        for validation in validations {
            result.fields_cleared += validation.cleared.len();
            let name = validation.record.get(Field::CompanyName).map(str::to_string);
            match store.insert(validation.record) {
                Ok(InsertOutcome::Inserted) => result.rows_inserted += 1,
                Ok(InsertOutcome::Suppressed) => {}
                Err(e) => {
                    result.staging_failures += 1;
                    let scope = format!("{} record '{}'", outcome.scope, name.unwrap_or_default());
                    self.error_log.record(&scope, &e);
                }
            }
        }
    }

    fn reject(&mut self, e: SourceError) {
        let scope = match &e {
            SourceError::Malformed { line, .. } => format!("line {}", line),
            _ => "source".to_string(),
        };
        warn!(%scope, error = %e, "Row rejected by reader");
        self.error_log.record(&scope, &e);
    }

    fn enter(&mut self, next: RunPhase) {
        let current = self.result.phase;
        if !current.can_transition_to(next) {
            warn!(from = ?current, to = ?next, "Unexpected phase transition");
        }
        debug!(from = ?current, to = ?next, "Phase");
        self.result.phase = next;
    }

    fn fail(mut self, e: PipelineError) -> PipelineError {
        self.enter(RunPhase::Failed);
        error!(run_id = %self.result.run_id, error = %e, "Run failed");
        self.progress.finish();
        if let Err(log_err) = self.error_log.finish() {
            warn!(error = %log_err, "Failed to flush error log");
        }
        e
    }
}

fn open(input: &Path, output: &Path) -> PipelineResult<(CsvSource, File)> {
    let source = CsvSource::open(input)?;
    let file = File::create(output).map_err(|source| PipelineError::Output {
        path: output.display().to_string(),
        source,
    })?;
    Ok((source, file))
}
