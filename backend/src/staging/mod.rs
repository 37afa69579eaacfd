//! Staging store - append-only table of validated records.
//!
//! Rows are appended as units complete, in whatever order they arrive, and
//! written out once at the end of the run. There is no key and no
//! de-duplication; the store is owned by a single task so inserts are
//! naturally linearized.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use crate::error::{ConfigError, ExportError, StagingError};
use crate::models::{Field, SchemaVersion, ValidatedRecord};

/// Rule deciding whether a validated record is worth keeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsertPolicy {
    /// Some field other than the company name must carry a value.
    #[default]
    NameExcluded,
    /// Any non-empty field, the name included, is enough.
    AnyField,
}

impl InsertPolicy {
    pub fn accepts(self, record: &ValidatedRecord) -> bool {
        let mut fields = Field::ALL.iter().copied();
        match self {
            InsertPolicy::NameExcluded => {
                fields.any(|f| f != Field::CompanyName && record.get(f).is_some())
            }
            InsertPolicy::AnyField => fields.any(|f| record.get(f).is_some()),
        }
    }
}

impl FromStr for InsertPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "name-excluded" | "conservative" => Ok(InsertPolicy::NameExcluded),
            "any-field" | "permissive" => Ok(InsertPolicy::AnyField),
            other => Err(ConfigError::Unknown {
                kind: "insert policy".into(),
                value: other.into(),
            }),
        }
    }
}

/// What happened to a record handed to [`StagingStore::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Filtered out: blank name or nothing worth keeping.
    Suppressed,
}

/// In-memory accumulator of staged rows.
#[derive(Debug, Default)]
pub struct StagingStore {
    rows: Vec<ValidatedRecord>,
    policy: InsertPolicy,
    limit: Option<usize>,
    suppressed: usize,
}

impl StagingStore {
    pub fn new(policy: InsertPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Cap the number of staged rows.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn policy(&self) -> InsertPolicy {
        self.policy
    }

    /// Append a record if the insert policy accepts it.
    pub fn insert(&mut self, record: ValidatedRecord) -> Result<InsertOutcome, StagingError> {
        if record.get(Field::CompanyName).is_none() || !self.policy.accepts(&record) {
            self.suppressed += 1;
            return Ok(InsertOutcome::Suppressed);
        }
        if let Some(limit) = self.limit {
            if self.rows.len() >= limit {
                return Err(StagingError::CapacityExceeded { limit });
            }
        }
        self.rows.push(record);
        Ok(InsertOutcome::Inserted)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Records rejected by the insert filter so far.
    pub fn suppressed(&self) -> usize {
        self.suppressed
    }

    /// Staged rows in insertion order.
    pub fn rows(&self) -> &[ValidatedRecord] {
        &self.rows
    }

    /// Number of rows where `field` carries a value.
    pub fn count_present(&self, field: Field) -> usize {
        self.rows.iter().filter(|r| r.get(field).is_some()).count()
    }

    /// Rows matching a predicate.
    pub fn filter<P>(&self, predicate: P) -> Vec<&ValidatedRecord>
    where
        P: Fn(&ValidatedRecord) -> bool,
    {
        self.rows.iter().filter(|r| predicate(r)).collect()
    }

    /// Write header and rows, consuming the store.
    ///
    /// Returns the number of data rows written.
    pub fn export<W: Write>(self, writer: W, schema: SchemaVersion) -> Result<usize, ExportError> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(schema.columns())?;
        for row in &self.rows {
            wtr.write_record(row.to_row(schema))?;
        }
        wtr.flush()?;
        Ok(self.rows.len())
    }

    /// Export to a file path.
    pub fn export_to_path(self, path: &Path, schema: SchemaVersion) -> Result<usize, ExportError> {
        let file = std::fs::File::create(path)?;
        self.export(std::io::BufWriter::new(file), schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Company;
    use crate::validation::{validate_record, ValidationRules};

    fn validated(company: Company) -> ValidatedRecord {
        validate_record(company, &ValidationRules::default()).record
    }

    #[test]
    fn test_name_only_suppressed_by_default() {
        let mut store = StagingStore::new(InsertPolicy::NameExcluded);
        let outcome = store.insert(validated(Company::named("Acme"))).unwrap();
        assert_eq!(outcome, InsertOutcome::Suppressed);
        assert!(store.is_empty());
        assert_eq!(store.suppressed(), 1);
    }

    #[test]
    fn test_name_only_kept_with_any_field() {
        let mut store = StagingStore::new(InsertPolicy::AnyField);
        let outcome = store.insert(validated(Company::named("Acme"))).unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_blank_name_never_staged() {
        for policy in [InsertPolicy::NameExcluded, InsertPolicy::AnyField] {
            let mut store = StagingStore::new(policy);
            let record = validated(Company::named("").with(Field::Sector, "Fintech"));
            assert_eq!(store.insert(record).unwrap(), InsertOutcome::Suppressed);
        }
    }

    #[test]
    fn test_cleared_fields_do_not_count() {
        let mut store = StagingStore::new(InsertPolicy::NameExcluded);
        let record = validated(Company::named("Acme").with(Field::LinkedIn, "https://example.com"));
        assert_eq!(store.insert(record).unwrap(), InsertOutcome::Suppressed);
    }

    #[test]
    fn test_capacity_limit() {
        let mut store = StagingStore::new(InsertPolicy::AnyField).with_limit(Some(1));
        store.insert(validated(Company::named("A"))).unwrap();
        let err = store.insert(validated(Company::named("B"))).unwrap_err();
        assert!(matches!(err, StagingError::CapacityExceeded { limit: 1 }));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_queries() {
        let mut store = StagingStore::new(InsertPolicy::NameExcluded);
        store
            .insert(validated(Company::named("A").with(Field::Sector, "Fintech")))
            .unwrap();
        store
            .insert(validated(Company::named("B").with(Field::Email, "b@b.io")))
            .unwrap();

        assert_eq!(store.count_present(Field::Sector), 1);
        assert_eq!(store.count_present(Field::CompanyName), 2);
        let fintech = store.filter(|r| r.get(Field::Sector) == Some("Fintech"));
        assert_eq!(fintech.len(), 1);
        assert_eq!(fintech[0].get(Field::CompanyName), Some("A"));
    }

    #[test]
    fn test_export_scenario_row() {
        let mut store = StagingStore::new(InsertPolicy::NameExcluded);
        let record = validated(
            Company::named("Acme Corp")
                .with(Field::Phone, "555-1234567")
                .with(Field::Email, "bad-email"),
        );
        store.insert(record).unwrap();

        let mut out = Vec::new();
        let written = store.export(&mut out, SchemaVersion::V2).unwrap();
        assert_eq!(written, 1);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], SchemaVersion::V2.columns().join(","));
        assert_eq!(lines[1], "Acme Corp,,,555-1234567,,,,,,,");
    }

    #[test]
    fn test_export_empty_store_writes_header() {
        let store = StagingStore::new(InsertPolicy::NameExcluded);
        let mut out = Vec::new();
        assert_eq!(store.export(&mut out, SchemaVersion::V1).unwrap(), 0);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.trim_end(), SchemaVersion::V1.columns().join(","));
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("any-field".parse::<InsertPolicy>().unwrap(), InsertPolicy::AnyField);
        assert!("whatever".parse::<InsertPolicy>().is_err());
    }
}
