use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One JSON object from model output.
pub type Record = serde_json::Map<String, Value>;

/// Fields every generated test case must carry.
pub const TEST_CASE_FIELDS: [&str; 6] = [
    "Test_ID",
    "Feature",
    "Scenario",
    "Steps",
    "Expected_Result",
    "Grounded_In",
];

/// Tagged outcome of turning model text into structured data. An unparsed
/// result is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredResult<T> {
    Parsed(T),
    Unparsed { raw: String, error: String },
}

/// Strictly parse `text` as a JSON array of objects.
pub fn extract(text: &str) -> StructuredResult<Vec<Record>> {
    match serde_json::from_str::<Vec<Record>>(text) {
        Ok(records) => StructuredResult::Parsed(records),
        Err(e) => StructuredResult::Unparsed {
            raw: text.to_string(),
            error: e.to_string(),
        },
    }
}

/// Free text or a list of lines; models emit both for steps and sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldText {
    Text(String),
    Lines(Vec<String>),
}

impl fmt::Display for FieldText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldText::Text(s) => f.write_str(s),
            FieldText::Lines(lines) => f.write_str(&lines.join("\n")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(rename = "Test_ID")]
    pub test_id: String,
    #[serde(rename = "Feature")]
    pub feature: String,
    #[serde(rename = "Scenario")]
    pub scenario: String,
    #[serde(rename = "Steps")]
    pub steps: FieldText,
    #[serde(rename = "Expected_Result")]
    pub expected_result: FieldText,
    #[serde(rename = "Grounded_In")]
    pub grounded_in: FieldText,
}

/// Check parsed records against the test case schema. Extra fields are
/// ignored; missing or mistyped ones fail with the offending position.
pub fn validate_test_cases(records: Vec<Record>) -> Result<Vec<TestCase>, String> {
    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let position = i + 1;
            let missing: Vec<&str> = TEST_CASE_FIELDS
                .iter()
                .copied()
                .filter(|f| !record.contains_key(*f))
                .collect();
            if !missing.is_empty() {
                return Err(format!(
                    "test case {} is missing field(s): {}",
                    position,
                    missing.join(", ")
                ));
            }
            let case: TestCase = serde_json::from_value(Value::Object(record))
                .map_err(|e| format!("test case {}: {}", position, e))?;
            if case.test_id.trim().is_empty() {
                return Err(format!("test case {}: Test_ID is empty", position));
            }
            Ok(case)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qa::sanitize::sanitize;

    fn full_case(id: &str) -> String {
        format!(
            r#"{{"Test_ID":"{}","Feature":"Discount","Scenario":"Apply code","Steps":["Enter SAVE15","Click Apply"],"Expected_Result":"Total reduced by 15%","Grounded_In":"faq.md"}}"#,
            id
        )
    }

    #[test]
    fn test_extract_fenced_list() {
        let result = extract(&sanitize("```json\n[{\"a\":1}]\n```"));
        match result {
            StructuredResult::Parsed(records) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0]["a"], 1);
            }
            other => panic!("expected parsed, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_failure_keeps_raw() {
        match extract("not json") {
            StructuredResult::Unparsed { raw, error } => {
                assert_eq!(raw, "not json");
                assert!(!error.is_empty());
            }
            other => panic!("expected unparsed, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_rejects_non_list() {
        assert!(matches!(extract(r#"{"a":1}"#), StructuredResult::Unparsed { .. }));
        assert!(matches!(extract("[1, 2]"), StructuredResult::Unparsed { .. }));
        assert_eq!(extract("[]"), StructuredResult::Parsed(vec![]));
    }

    #[test]
    fn test_validate_accepts_full_cases() {
        let text = format!("[{},{}]", full_case("TC1"), full_case("TC2"));
        let StructuredResult::Parsed(records) = extract(&text) else {
            panic!("fixture should parse");
        };
        let cases = validate_test_cases(records).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].test_id, "TC1");
        assert_eq!(cases[0].steps.to_string(), "Enter SAVE15\nClick Apply");
        assert_eq!(cases[1].grounded_in, FieldText::Text("faq.md".to_string()));
    }

    #[test]
    fn test_validate_reports_missing_fields() {
        let StructuredResult::Parsed(records) = extract(r#"[{"a":1}]"#) else {
            panic!("fixture should parse");
        };
        let err = validate_test_cases(records).unwrap_err();
        assert!(err.contains("test case 1"));
        assert!(err.contains("Test_ID"));
        assert!(err.contains("Grounded_In"));
    }

    #[test]
    fn test_validate_rejects_wrong_types_and_empty_id() {
        let text = full_case("TC1").replace(r#""Feature":"Discount""#, r#""Feature":7"#);
        let StructuredResult::Parsed(records) = extract(&format!("[{}]", text)) else {
            panic!("fixture should parse");
        };
        assert!(validate_test_cases(records).is_err());

        let StructuredResult::Parsed(records) = extract(&format!("[{}]", full_case(" "))) else {
            panic!("fixture should parse");
        };
        assert!(validate_test_cases(records).unwrap_err().contains("Test_ID is empty"));
    }

    #[test]
    fn test_test_case_serializes_with_contract_names() {
        let StructuredResult::Parsed(records) = extract(&format!("[{}]", full_case("TC9"))) else {
            panic!("fixture should parse");
        };
        let case = &validate_test_cases(records).unwrap()[0];
        let json = serde_json::to_value(case).unwrap();
        for field in TEST_CASE_FIELDS {
            assert!(json.get(field).is_some(), "missing {}", field);
        }
    }
}
