//! Field-level validation and repair.
//!
//! Every validator is total: it returns either its input unchanged or `None`.
//! A value that fails its rule is cleared, never reported as an error, so one
//! bad field does not cost the whole record.
//!
//! # Phone policies
//!
//! | Policy       | Rule                                                          |
//! |--------------|---------------------------------------------------------------|
//! | `permissive` | keep if digits (plus a leading `+`) match `^\+?[0-9]{7,15}$`  |
//! | `strict`     | keep if the raw value matches `^\+?[0-9\s\-()]{7,20}$`        |
//!
//! # Example
//!
//! ```rust
//! use tabsift::validation::{validate_linkedin, validate_phone, PhonePolicy};
//!
//! assert_eq!(
//!     validate_phone(Some("555-1234567"), PhonePolicy::Permissive).as_deref(),
//!     Some("555-1234567")
//! );
//! assert_eq!(validate_linkedin(Some("https://example.com/acme")), None);
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ConfigError;
use crate::models::{Company, Field, ValidatedRecord};

static PHONE_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9]{7,15}$").expect("valid phone regex"));

static PHONE_LEGACY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9\s\-()]{7,20}$").expect("valid legacy phone regex"));

static TICKET_SIZE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[$€₹]?[0-9]+(\.[0-9]+)?\s?(M|K|Cr|L|million|thousand)?$")
        .expect("valid ticket size regex")
});

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

/// Which phone rule to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhonePolicy {
    /// Normalise to digits before matching; the stored value is left as-is.
    #[default]
    Permissive,
    /// Match the raw value against the legacy character class.
    Strict,
}

impl FromStr for PhonePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "permissive" => Ok(PhonePolicy::Permissive),
            "strict" | "legacy" => Ok(PhonePolicy::Strict),
            other => Err(ConfigError::Unknown {
                kind: "phone policy".into(),
                value: other.into(),
            }),
        }
    }
}

/// Rules applied to every candidate of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRules {
    pub phone: PhonePolicy,
}

/// Outcome of validating one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub record: ValidatedRecord,
    /// Fields that held a value and were cleared by a rule.
    pub cleared: Vec<Field>,
}

/// Treat blanks and literal placeholders as absent.
fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| {
        let v = v.trim();
        !(v.is_empty() || v == "None" || v.eq_ignore_ascii_case("null"))
    })
}

fn keep_if(value: Option<&str>, rule: impl Fn(&str) -> bool) -> Option<String> {
    present(value).filter(|v| rule(v)).map(str::to_string)
}

/// Phone number check under the given policy.
pub fn validate_phone(value: Option<&str>, policy: PhonePolicy) -> Option<String> {
    keep_if(value, |v| match policy {
        PhonePolicy::Permissive => PHONE_DIGITS.is_match(&phone_digits(v)),
        PhonePolicy::Strict => PHONE_LEGACY.is_match(v),
    })
}

/// Digits of a phone number, keeping a leading `+`.
fn phone_digits(value: &str) -> String {
    let value = value.trim();
    let mut out = String::with_capacity(value.len());
    if value.starts_with('+') {
        out.push('+');
    }
    out.extend(value.chars().filter(|c| c.is_ascii_digit()));
    out
}

/// Keep only LinkedIn links.
pub fn validate_linkedin(value: Option<&str>) -> Option<String> {
    keep_if(value, |v| v.contains("linkedin.com"))
}

/// Keep only Twitter / X links.
pub fn validate_social(value: Option<&str>) -> Option<String> {
    keep_if(value, |v| v.contains("twitter.com") || v.contains("x.com"))
}

/// Keep amounts such as `$5M`, `2.5 million`, `₹10Cr`.
pub fn validate_ticket_size(value: Option<&str>) -> Option<String> {
    keep_if(value, |v| TICKET_SIZE.is_match(v))
}

/// Keep values shaped like `local@domain.tld`.
pub fn validate_email(value: Option<&str>) -> Option<String> {
    keep_if(value, |v| EMAIL.is_match(v))
}

/// Fields without a format rule only get blank normalisation.
pub fn normalize(value: Option<&str>) -> Option<String> {
    present(value).map(str::to_string)
}

/// Apply the rule for one field.
pub fn validate_field(field: Field, value: Option<&str>, rules: &ValidationRules) -> Option<String> {
    match field {
        Field::Phone => validate_phone(value, rules.phone),
        Field::Email => validate_email(value),
        Field::LinkedIn => validate_linkedin(value),
        Field::XTwitter => validate_social(value),
        Field::TicketSize => validate_ticket_size(value),
        _ => normalize(value),
    }
}

/// Validate every field of a candidate independently.
pub fn validate_record(candidate: Company, rules: &ValidationRules) -> Validation {
    let mut company = candidate;
    let mut cleared = Vec::new();

    for field in Field::ALL {
        let before = company.get(field);
        let after = validate_field(field, before, rules);
        if after.is_none() && present(before).is_some() {
            cleared.push(field);
        }
        company.set(field, after);
    }

    Validation {
        record: ValidatedRecord::new(company),
        cleared,
    }
}
