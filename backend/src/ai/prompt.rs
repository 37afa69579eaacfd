//! Prompt and response-schema generation for company extraction.

use serde_json::{json, Map, Value};

use crate::models::{Field, SchemaVersion, WorkUnit};

/// System prompt shared by every provider.
pub fn system_prompt() -> &'static str {
    r#"You are a data extraction assistant. You receive rows from a spreadsheet of companies and investors whose columns may be mislabeled, merged or out of order. For each row that describes a company or person, return one entry in the "companies" array.

Rules:
1. Copy values verbatim from the data. Do not invent, translate or reformat values.
2. If a value is missing or you are unsure, leave the field null.
3. Never return more entries than there are data rows.
4. Return ONLY the JSON object, no explanations or markdown."#
}

/// User prompt for one work unit.
pub fn user_prompt(unit: &WorkUnit, schema: SchemaVersion) -> String {
    let targets = schema
        .fields()
        .iter()
        .map(|f| format!("\"{}\"", f.label()))
        .collect::<Vec<_>>()
        .join(", ");

    let data = unit
        .records
        .iter()
        .map(|r| r.fields.join(", "))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Extract the following structured information from the given data.
If a column is invalid or missing, leave it blank.

Headers: {targets}

Source columns: {source}

Data ({count} rows):
{data}
"#,
        targets = targets,
        source = unit.header.join(", "),
        count = unit.len(),
        data = data,
    )
}

/// JSON schema of the structured response: `{"companies": [Company, ...]}`.
pub fn response_schema(schema: SchemaVersion) -> Value {
    let mut properties = Map::new();
    for field in schema.fields() {
        let property = match field {
            Field::CompanyName => json!({ "type": "string" }),
            _ => json!({ "anyOf": [{ "type": "string" }, { "type": "null" }] }),
        };
        properties.insert(field.column().to_string(), property);
    }

    json!({
        "type": "object",
        "properties": {
            "companies": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": properties,
                    "required": ["Company_Name"]
                }
            }
        },
        "required": ["companies"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawRecord;
    use std::sync::Arc;

    fn unit() -> WorkUnit {
        WorkUnit {
            id: 0,
            header: Arc::from(vec!["Name".to_string(), "Phone".to_string()]),
            records: vec![
                RawRecord::new(2, vec!["Acme Corp".into(), "555-1234567".into()]),
                RawRecord::new(3, vec!["Globex".into(), "".into()]),
            ],
        }
    }

    #[test]
    fn test_user_prompt_includes_data() {
        let prompt = user_prompt(&unit(), SchemaVersion::V2);
        assert!(prompt.contains("Acme Corp, 555-1234567"));
        assert!(prompt.contains("Source columns: Name, Phone"));
        assert!(prompt.contains("\"Individual or Corporation\""));
        assert!(prompt.contains("Data (2 rows)"));
    }

    #[test]
    fn test_v1_prompt_omits_entity_kind() {
        let prompt = user_prompt(&unit(), SchemaVersion::V1);
        assert!(!prompt.contains("Individual or Corporation"));
    }

    #[test]
    fn test_response_schema_shape() {
        let schema = response_schema(SchemaVersion::V1);
        let props = &schema["properties"]["companies"]["items"]["properties"];
        assert_eq!(props.as_object().unwrap().len(), 10);
        assert_eq!(props["Company_Name"]["type"], "string");
        assert!(props.get("Individual_or_Corporation").is_none());
    }
}
