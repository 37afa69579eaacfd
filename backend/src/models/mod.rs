//! Domain models for the tabsift pipeline.
//!
//! - [`RawRecord`] - one input row, positionally aligned with the input header
//! - [`WorkUnit`] - records grouped for a single extraction call
//! - [`Field`] / [`SchemaVersion`] - the fixed output schema and its revisions
//! - [`Company`] - a candidate record as returned by the extractor
//! - [`ValidatedRecord`] - a candidate whose fields all passed validation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::ConfigError;

// =============================================================================
// Raw input
// =============================================================================

/// One data row from the input table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// 1-based line of the row in the input file (the header is line 1).
    pub line: usize,
    /// Field values in header order.
    pub fields: Vec<String>,
}

impl RawRecord {
    pub fn new(line: usize, fields: Vec<String>) -> Self {
        Self { line, fields }
    }

    /// True when every field is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(|f| f.trim().is_empty())
    }
}

/// Records sealed together for one extraction call.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    /// Sealing order, starting at 0.
    pub id: usize,
    /// Input header shared by every unit of the run.
    pub header: Arc<[String]>,
    pub records: Vec<RawRecord>,
}

impl WorkUnit {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Human-readable identification used in the error log.
    pub fn describe(&self) -> String {
        match (self.records.first(), self.records.last()) {
            (Some(first), Some(last)) if first.line == last.line => {
                format!("unit {} (line {})", self.id, first.line)
            }
            (Some(first), Some(last)) => {
                format!("unit {} (lines {}-{})", self.id, first.line, last.line)
            }
            _ => format!("unit {} (empty)", self.id),
        }
    }
}

// =============================================================================
// Output schema
// =============================================================================

/// A column of the output schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    CompanyName,
    Website,
    Location,
    Phone,
    Email,
    LinkedIn,
    Sector,
    TicketSize,
    XTwitter,
    FundingRound,
    EntityKind,
}

impl Field {
    /// Every field, in output column order.
    pub const ALL: [Field; 11] = [
        Field::CompanyName,
        Field::Website,
        Field::Location,
        Field::Phone,
        Field::Email,
        Field::LinkedIn,
        Field::Sector,
        Field::TicketSize,
        Field::XTwitter,
        Field::FundingRound,
        Field::EntityKind,
    ];

    /// Column name in the output table and in the extractor payload.
    pub fn column(self) -> &'static str {
        match self {
            Field::CompanyName => "Company_Name",
            Field::Website => "Company_Website",
            Field::Location => "Company_Location",
            Field::Phone => "Company_Phone_Number",
            Field::Email => "Email",
            Field::LinkedIn => "LinkedIn_Link",
            Field::Sector => "Sector",
            Field::TicketSize => "Ticket_Size",
            Field::XTwitter => "X_Twitter_Account_Link",
            Field::FundingRound => "Funding_Round",
            Field::EntityKind => "Individual_or_Corporation",
        }
    }

    /// Spaced label used when describing the schema to the model.
    pub fn label(self) -> &'static str {
        match self {
            Field::CompanyName => "Company Name",
            Field::Website => "Company Website",
            Field::Location => "Company Location",
            Field::Phone => "Company Phone Number",
            Field::Email => "Email",
            Field::LinkedIn => "LinkedIn Link",
            Field::Sector => "Sector",
            Field::TicketSize => "Ticket Size",
            Field::XTwitter => "X Twitter Account Link",
            Field::FundingRound => "Funding Round",
            Field::EntityKind => "Individual or Corporation",
        }
    }

    /// Lookup by column name (case-insensitive) or by CLI short name.
    pub fn from_name(name: &str) -> Option<Field> {
        let lower = name.trim().to_lowercase();
        let short = match lower.as_str() {
            "name" => Some(Field::CompanyName),
            "website" => Some(Field::Website),
            "location" => Some(Field::Location),
            "phone" => Some(Field::Phone),
            "email" => Some(Field::Email),
            "linkedin" => Some(Field::LinkedIn),
            "sector" => Some(Field::Sector),
            "ticket" | "ticket-size" => Some(Field::TicketSize),
            "social" | "twitter" | "x" => Some(Field::XTwitter),
            "funding" | "funding-round" => Some(Field::FundingRound),
            "kind" | "entity-kind" => Some(Field::EntityKind),
            _ => None,
        };
        short.or_else(|| {
            Field::ALL
                .into_iter()
                .find(|f| f.column().eq_ignore_ascii_case(&lower))
        })
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Revision of the output schema.
///
/// `V1` ends at `Funding_Round`; `V2` adds `Individual_or_Corporation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVersion {
    V1,
    #[default]
    V2,
}

impl SchemaVersion {
    /// Fields of this revision, in column order.
    pub fn fields(self) -> &'static [Field] {
        match self {
            SchemaVersion::V1 => &Field::ALL[..10],
            SchemaVersion::V2 => &Field::ALL[..],
        }
    }

    /// Header row for the output table.
    pub fn columns(self) -> Vec<&'static str> {
        self.fields().iter().map(|f| f.column()).collect()
    }
}

impl FromStr for SchemaVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "v1" | "1" => Ok(SchemaVersion::V1),
            "v2" | "2" => Ok(SchemaVersion::V2),
            other => Err(ConfigError::Unknown {
                kind: "schema version".into(),
                value: other.into(),
            }),
        }
    }
}

// =============================================================================
// Candidate and validated records
// =============================================================================

/// A company as produced by one extraction attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    #[serde(rename = "Company_Name")]
    pub name: String,
    #[serde(rename = "Company_Website", default)]
    pub website: Option<String>,
    #[serde(rename = "Company_Location", default)]
    pub location: Option<String>,
    #[serde(rename = "Company_Phone_Number", default)]
    pub phone: Option<String>,
    #[serde(rename = "Email", default)]
    pub email: Option<String>,
    #[serde(rename = "LinkedIn_Link", default)]
    pub linkedin: Option<String>,
    #[serde(rename = "Sector", default)]
    pub sector: Option<String>,
    #[serde(rename = "Ticket_Size", default)]
    pub ticket_size: Option<String>,
    #[serde(rename = "X_Twitter_Account_Link", default)]
    pub x_twitter: Option<String>,
    #[serde(rename = "Funding_Round", default)]
    pub funding_round: Option<String>,
    #[serde(rename = "Individual_or_Corporation", default)]
    pub entity_kind: Option<String>,
}

/// Alias matching the pipeline vocabulary.
pub type CandidateRecord = Company;

impl Company {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder-style setter, mostly for tests and the stub extractor.
    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.set(field, Some(value.into()));
        self
    }

    /// Value of a field; the name is `None` when blank.
    pub fn get(&self, field: Field) -> Option<&str> {
        let value = match field {
            Field::CompanyName => return Some(self.name.as_str()).filter(|n| !n.is_empty()),
            Field::Website => &self.website,
            Field::Location => &self.location,
            Field::Phone => &self.phone,
            Field::Email => &self.email,
            Field::LinkedIn => &self.linkedin,
            Field::Sector => &self.sector,
            Field::TicketSize => &self.ticket_size,
            Field::XTwitter => &self.x_twitter,
            Field::FundingRound => &self.funding_round,
            Field::EntityKind => &self.entity_kind,
        };
        value.as_deref()
    }

    /// Clear every field the schema revision does not export.
    pub fn restrict_to(&mut self, schema: SchemaVersion) {
        for field in Field::ALL {
            if !schema.fields().contains(&field) {
                self.set(field, None);
            }
        }
    }

    /// Replace a field value. Setting the name to `None` blanks it.
    pub fn set(&mut self, field: Field, value: Option<String>) {
        let slot = match field {
            Field::CompanyName => {
                self.name = value.unwrap_or_default();
                return;
            }
            Field::Website => &mut self.website,
            Field::Location => &mut self.location,
            Field::Phone => &mut self.phone,
            Field::Email => &mut self.email,
            Field::LinkedIn => &mut self.linkedin,
            Field::Sector => &mut self.sector,
            Field::TicketSize => &mut self.ticket_size,
            Field::XTwitter => &mut self.x_twitter,
            Field::FundingRound => &mut self.funding_round,
            Field::EntityKind => &mut self.entity_kind,
        };
        *slot = value;
    }
}

/// A candidate whose present fields all satisfy their format rule.
///
/// Only [`crate::validation::validate_record`] builds one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedRecord(Company);

impl ValidatedRecord {
    pub(crate) fn new(company: Company) -> Self {
        Self(company)
    }

    pub fn company(&self) -> &Company {
        &self.0
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(field)
    }

    pub fn into_inner(self) -> Company {
        self.0
    }

    /// Output row for the given schema revision; absent fields are empty.
    pub fn to_row(&self, schema: SchemaVersion) -> Vec<&str> {
        schema
            .fields()
            .iter()
            .map(|f| self.get(*f).unwrap_or(""))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_record() {
        assert!(RawRecord::new(2, vec!["".into(), "  ".into()]).is_blank());
        assert!(!RawRecord::new(2, vec!["".into(), "x".into()]).is_blank());
    }

    #[test]
    fn test_unit_describe() {
        let header: Arc<[String]> = vec!["Name".to_string()].into();
        let unit = WorkUnit {
            id: 3,
            header,
            records: vec![
                RawRecord::new(12, vec!["a".into()]),
                RawRecord::new(14, vec!["b".into()]),
            ],
        };
        assert_eq!(unit.describe(), "unit 3 (lines 12-14)");
    }

    #[test]
    fn test_schema_columns() {
        assert_eq!(SchemaVersion::V1.columns().len(), 10);
        assert_eq!(SchemaVersion::V2.columns().len(), 11);
        assert_eq!(
            SchemaVersion::V2.columns().last(),
            Some(&"Individual_or_Corporation")
        );
        assert_eq!("v1".parse::<SchemaVersion>().unwrap(), SchemaVersion::V1);
        assert!("v3".parse::<SchemaVersion>().is_err());
    }

    #[test]
    fn test_company_deserialize_partial() {
        let json = r#"{"Company_Name": "Acme Corp", "Email": "bad-email", "Sector": null}"#;
        let company: Company = serde_json::from_str(json).unwrap();
        assert_eq!(company.name, "Acme Corp");
        assert_eq!(company.get(Field::Email), Some("bad-email"));
        assert_eq!(company.get(Field::Sector), None);
        assert_eq!(company.get(Field::Phone), None);
    }

    #[test]
    fn test_field_lookup() {
        assert_eq!(Field::from_name("phone"), Some(Field::Phone));
        assert_eq!(Field::from_name("linkedin_link"), Some(Field::LinkedIn));
        assert_eq!(Field::from_name("nope"), None);
    }

    #[test]
    fn test_get_set_roundtrip_all_fields() {
        let mut company = Company::named("Acme");
        for field in Field::ALL.into_iter().skip(1) {
            company.set(field, Some(field.column().to_string()));
            assert_eq!(company.get(field), Some(field.column()));
        }
        company.set(Field::CompanyName, None);
        assert_eq!(company.get(Field::CompanyName), None);
    }

    #[test]
    fn test_restrict_to_v1_clears_entity_kind() {
        let mut company = Company::named("Acme")
            .with(Field::EntityKind, "Corporation")
            .with(Field::FundingRound, "Seed");
        company.restrict_to(SchemaVersion::V1);
        assert_eq!(company.get(Field::EntityKind), None);
        assert_eq!(company.get(Field::FundingRound), Some("Seed"));

        let mut company = Company::named("Acme").with(Field::EntityKind, "Corporation");
        company.restrict_to(SchemaVersion::V2);
        assert_eq!(company.get(Field::EntityKind), Some("Corporation"));
    }
}
