//! Bounded-concurrency dispatch of work units to the extractor.
//!
//! One producer task walks the source through the [`Batcher`] and feeds a
//! bounded job queue. `concurrency` worker tasks pull units from that queue,
//! call the extractor once per unit and validate what comes back. Every
//! outcome is sent to the controller over a single event channel, so nothing
//! downstream of the workers is shared.
//!
//! Each extraction runs in its own task. A panicking extractor costs only its
//! unit, which is reported as [`ExtractionError::Panicked`].

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::batcher::{BatchEvent, Batcher};
use crate::ai::Extractor;
use crate::error::{ExtractionError, SourceError};
use crate::models::{SchemaVersion, WorkUnit};
use crate::parser::CsvSource;
use crate::validation::{validate_record, Validation, ValidationRules};

/// Result of one work unit.
#[derive(Debug)]
pub struct UnitOutcome {
    pub id: usize,
    /// Human-readable location, e.g. `unit 3 (lines 12-16)`.
    pub scope: String,
    /// Records submitted in the unit.
    pub records: usize,
    pub result: Result<Vec<Validation>, ExtractionError>,
}

/// Message from the dispatcher to the controller.
#[derive(Debug)]
pub enum DispatchEvent {
    Unit(UnitOutcome),
    /// A row the reader rejected; it was never dispatched.
    SourceRejected(SourceError),
    /// The producer has queued its last unit.
    SourceExhausted { units: usize },
}

/// Running dispatch: the event stream plus the tasks feeding it.
pub struct DispatchHandle {
    pub events: mpsc::UnboundedReceiver<DispatchEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl DispatchHandle {
    /// Wait for the producer and every worker. Panics are logged, not raised.
    pub async fn join(self) {
        for (i, result) in join_all(self.tasks).await.into_iter().enumerate() {
            if let Err(e) = result {
                error!(task = i, error = %e, "Dispatch task panicked");
            }
        }
    }
}

pub struct Dispatcher {
    extractor: Arc<dyn Extractor>,
    rules: ValidationRules,
    schema: SchemaVersion,
    concurrency: usize,
}

impl Dispatcher {
    pub fn new(extractor: Arc<dyn Extractor>, rules: ValidationRules, concurrency: usize) -> Self {
        Self {
            extractor,
            rules,
            schema: SchemaVersion::default(),
            concurrency: concurrency.max(1),
        }
    }

    /// Schema revision candidates are restricted to before validation.
    pub fn with_schema(mut self, schema: SchemaVersion) -> Self {
        self.schema = schema;
        self
    }

    /// Start the producer and the worker pool over `source`.
    ///
    /// Must be called inside a tokio runtime. The event channel closes once
    /// every unit has been reported.
    pub fn spawn(&self, source: CsvSource, batch_size: usize) -> DispatchHandle {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (job_tx, job_rx) = mpsc::channel::<WorkUnit>(self.concurrency);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let mut tasks = Vec::with_capacity(self.concurrency + 1);
        tasks.push(tokio::spawn(produce(source, batch_size, job_tx, event_tx.clone())));

        for worker_id in 0..self.concurrency {
            let jobs = Arc::clone(&job_rx);
            let events = event_tx.clone();
            let extractor = Arc::clone(&self.extractor);
            let rules = self.rules;
            let schema = self.schema;
            tasks.push(tokio::spawn(async move {
                worker(worker_id, jobs, events, extractor, rules, schema).await;
            }));
        }

        DispatchHandle { events, tasks }
    }
}

async fn produce(
    source: CsvSource,
    batch_size: usize,
    jobs: mpsc::Sender<WorkUnit>,
    events: mpsc::UnboundedSender<DispatchEvent>,
) {
    let mut units = 0;
    for event in Batcher::new(source.records(), source.shared_header(), batch_size) {
        match event {
            BatchEvent::Unit(unit) => {
                debug!(unit = unit.id, records = unit.len(), "Queueing unit");
                if jobs.send(unit).await.is_err() {
                    warn!("All workers stopped, abandoning remaining units");
                    break;
                }
                units += 1;
            }
            BatchEvent::Rejected(e) => {
                let _ = events.send(DispatchEvent::SourceRejected(e));
            }
        }
    }
    let _ = events.send(DispatchEvent::SourceExhausted { units });
}

async fn worker(
    worker_id: usize,
    jobs: Arc<Mutex<mpsc::Receiver<WorkUnit>>>,
    events: mpsc::UnboundedSender<DispatchEvent>,
    extractor: Arc<dyn Extractor>,
    rules: ValidationRules,
    schema: SchemaVersion,
) {
    loop {
        let unit = {
            let mut rx = jobs.lock().await;
            rx.recv().await
        };
        let Some(unit) = unit else { break };

        debug!(worker = worker_id, unit = unit.id, "Extracting");
        let (id, scope, records) = (unit.id, unit.describe(), unit.len());
        let unit_extractor = Arc::clone(&extractor);
        let task = tokio::spawn(async move {
            process_unit(unit_extractor.as_ref(), &unit, &rules, schema).await
        });
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(worker = worker_id, unit = id, error = %e, "Extraction task panicked");
                UnitOutcome {
                    id,
                    scope,
                    records,
                    result: Err(ExtractionError::Panicked(e.to_string())),
                }
            }
        };
        if events.send(DispatchEvent::Unit(outcome)).is_err() {
            break;
        }
    }
    debug!(worker = worker_id, "Worker finished");
}

/// One extraction attempt for `unit`, followed by validation of each candidate.
///
/// Fields outside `schema` are cleared first, so they never count towards
/// the insert filter.
pub async fn process_unit(
    extractor: &dyn Extractor,
    unit: &WorkUnit,
    rules: &ValidationRules,
    schema: SchemaVersion,
) -> UnitOutcome {
    let result = extractor.extract(unit).await.and_then(|candidates| {
        if candidates.len() > unit.len() {
            return Err(ExtractionError::TooManyCandidates {
                returned: candidates.len(),
                submitted: unit.len(),
            });
        }
        Ok(candidates
            .into_iter()
            .map(|mut c| {
                c.restrict_to(schema);
                validate_record(c, rules)
            })
            .collect())
    });

    UnitOutcome {
        id: unit.id,
        scope: unit.describe(),
        records: unit.len(),
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::StubExtractor;
    use crate::models::{Company, Field, RawRecord};
    use std::time::Duration;

    fn source(rows: usize) -> CsvSource {
        let mut csv = String::from("Name,Phone\n");
        for i in 0..rows {
            csv.push_str(&format!("Company {},555-000{}\n", i, i));
        }
        CsvSource::from_bytes(csv.as_bytes(), None).unwrap()
    }

    async fn drain(mut handle: DispatchHandle) -> Vec<DispatchEvent> {
        let mut out = Vec::new();
        while let Some(event) = handle.events.recv().await {
            out.push(event);
        }
        handle.join().await;
        out
    }

    fn outcomes(events: &[DispatchEvent]) -> Vec<&UnitOutcome> {
        events
            .iter()
            .filter_map(|e| match e {
                DispatchEvent::Unit(o) => Some(o),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_every_unit_called_once() {
        let stub = Arc::new(StubExtractor::echo());
        let dispatcher = Dispatcher::new(stub.clone(), ValidationRules::default(), 3);

        let events = drain(dispatcher.spawn(source(11), 2)).await;
        let done = outcomes(&events);
        assert_eq!(done.len(), 6);

        let mut calls = stub.calls();
        calls.sort_unstable();
        assert_eq!(calls, vec![0, 1, 2, 3, 4, 5]);

        let exhausted = events
            .iter()
            .find_map(|e| match e {
                DispatchEvent::SourceExhausted { units } => Some(*units),
                _ => None,
            })
            .unwrap();
        assert_eq!(exhausted, 6);

        let records: usize = done.iter().map(|o| o.records).sum();
        assert_eq!(records, 11);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let stub = Arc::new(StubExtractor::echo().with_delay(Duration::from_millis(20)));
        let dispatcher = Dispatcher::new(stub.clone(), ValidationRules::default(), 2);

        drain(dispatcher.spawn(source(10), 1)).await;
        assert_eq!(stub.calls().len(), 10);
        assert!(stub.peak_concurrency() <= 2);
        assert!(stub.peak_concurrency() >= 1);
    }

    #[tokio::test]
    async fn test_failed_unit_does_not_stop_others() {
        let stub = Arc::new(StubExtractor::echo().failing_on([1]));
        let dispatcher = Dispatcher::new(stub, ValidationRules::default(), 2);

        let events = drain(dispatcher.spawn(source(6), 2)).await;
        let done = outcomes(&events);
        assert_eq!(done.len(), 3);

        let failed: Vec<&&UnitOutcome> = done.iter().filter(|o| o.result.is_err()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, 1);
        assert_eq!(failed[0].scope, "unit 1 (lines 4-5)");

        let ok: usize = done
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(Vec::len)
            .sum();
        assert_eq!(ok, 4);
    }

    #[tokio::test]
    async fn test_too_many_candidates_fails_unit() {
        let stub = StubExtractor::with_responder(|unit| {
            Ok((0..=unit.len())
                .map(|i| Company::named(format!("c{}", i)))
                .collect())
        });
        let unit = WorkUnit {
            id: 0,
            header: Arc::from(vec!["Name".to_string()]),
            records: vec![RawRecord::new(2, vec!["a".into()])],
        };

        let outcome = process_unit(&stub, &unit, &ValidationRules::default(), SchemaVersion::V2).await;
        assert!(matches!(
            outcome.result,
            Err(ExtractionError::TooManyCandidates {
                returned: 2,
                submitted: 1
            })
        ));
    }

    #[tokio::test]
    async fn test_candidates_are_validated() {
        let stub = StubExtractor::with_responder(|_| {
            Ok(vec![Company::named("Acme").with(Field::LinkedIn, "not a profile")])
        });
        let unit = WorkUnit {
            id: 0,
            header: Arc::from(vec!["Name".to_string()]),
            records: vec![RawRecord::new(2, vec!["Acme".into()])],
        };

        let outcome = process_unit(&stub, &unit, &ValidationRules::default(), SchemaVersion::V2).await;
        let validations = outcome.result.unwrap();
        assert_eq!(validations[0].record.get(Field::LinkedIn), None);
        assert_eq!(validations[0].cleared, vec![Field::LinkedIn]);
    }

    #[tokio::test]
    async fn test_panicking_extractor_fails_only_its_unit() {
        let stub = StubExtractor::with_responder(|unit| {
            if unit.id == 1 {
                panic!("extractor blew up on unit {}", unit.id);
            }
            Ok(vec![Company::named(unit.records[0].fields[0].clone())])
        });
        let dispatcher = Dispatcher::new(Arc::new(stub), ValidationRules::default(), 1);

        let events = drain(dispatcher.spawn(source(3), 1)).await;
        let done = outcomes(&events);
        assert_eq!(done.len(), 3);

        let failed: Vec<&&UnitOutcome> = done.iter().filter(|o| o.result.is_err()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, 1);
        assert_eq!(failed[0].scope, "unit 1 (line 3)");
        assert!(matches!(failed[0].result, Err(ExtractionError::Panicked(_))));
    }

    #[tokio::test]
    async fn test_fields_outside_schema_are_cleared() {
        let stub = StubExtractor::with_responder(|_| {
            Ok(vec![Company::named("Acme").with(Field::EntityKind, "Corporation")])
        });
        let unit = WorkUnit {
            id: 0,
            header: Arc::from(vec!["Name".to_string()]),
            records: vec![RawRecord::new(2, vec!["Acme".into()])],
        };

        let v1 = process_unit(&stub, &unit, &ValidationRules::default(), SchemaVersion::V1).await;
        let validations = v1.result.unwrap();
        assert_eq!(validations[0].record.get(Field::EntityKind), None);
        assert!(validations[0].cleared.is_empty());

        let v2 = process_unit(&stub, &unit, &ValidationRules::default(), SchemaVersion::V2).await;
        assert_eq!(v2.result.unwrap()[0].record.get(Field::EntityKind), Some("Corporation"));
    }
}
