//! Deterministic extractor for tests and offline dry runs.
//!
//! By default it "extracts" by matching input header names against schema
//! fields (`Name`, `Phone`, `Company_Website`, ...). Failures and custom
//! responses can be scripted per unit.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::Extractor;
use crate::error::{ExtractionError, ExtractionResult};
use crate::models::{Company, Field, RawRecord, WorkUnit};

type Responder = dyn Fn(&WorkUnit) -> ExtractionResult<Vec<Company>> + Send + Sync;

pub struct StubExtractor {
    responder: Box<Responder>,
    fail_units: HashSet<usize>,
    delay: Option<Duration>,
    calls: Mutex<Vec<usize>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl StubExtractor {
    /// Map each record to a company by header name.
    pub fn echo() -> Self {
        Self::with_responder(|unit| {
            Ok(unit
                .records
                .iter()
                .filter_map(|r| echo_record(&unit.header, r))
                .collect())
        })
    }

    /// Use a custom response function.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&WorkUnit) -> ExtractionResult<Vec<Company>> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            fail_units: HashSet::new(),
            delay: None,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Fail deterministically on the given unit ids.
    pub fn failing_on(mut self, units: impl IntoIterator<Item = usize>) -> Self {
        self.fail_units.extend(units);
        self
    }

    /// Sleep before answering, to simulate a slow service.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Unit ids seen so far, in call order.
    pub fn calls(&self) -> Vec<usize> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Highest number of calls observed running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

fn echo_record(header: &[String], record: &RawRecord) -> Option<Company> {
    let mut company = Company::default();
    for (column, value) in header.iter().zip(&record.fields) {
        if let Some(field) = Field::from_name(column) {
            if !value.is_empty() {
                company.set(field, Some(value.clone()));
            }
        }
    }
    if company.name.is_empty() {
        company.name = record.fields.first()?.clone();
    }
    Some(company)
}

#[async_trait]
impl Extractor for StubExtractor {
    fn name(&self) -> &str {
        "stub"
    }

    async fn extract(&self, unit: &WorkUnit) -> ExtractionResult<Vec<Company>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(unit.id);
        }
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_units.contains(&unit.id) {
            return Err(ExtractionError::Injected(unit.id));
        }
        (self.responder)(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn unit(id: usize) -> WorkUnit {
        WorkUnit {
            id,
            header: Arc::from(vec!["Name".to_string(), "Phone".to_string(), "Notes".to_string()]),
            records: vec![RawRecord::new(2, vec![
                "Acme Corp".into(),
                "555-1234567".into(),
                "ignored".into(),
            ])],
        }
    }

    #[tokio::test]
    async fn test_echo_maps_headers() {
        let stub = StubExtractor::echo();
        let companies = stub.extract(&unit(0)).await.unwrap();
        assert_eq!(companies.len(), 1);
        assert_eq!(companies[0].name, "Acme Corp");
        assert_eq!(companies[0].get(Field::Phone), Some("555-1234567"));
        assert_eq!(companies[0].get(Field::Sector), None);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let stub = StubExtractor::echo().failing_on([1]);
        assert!(stub.extract(&unit(0)).await.is_ok());
        let err = stub.extract(&unit(1)).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Injected(1)));
        assert_eq!(stub.calls(), vec![0, 1]);
    }
}
