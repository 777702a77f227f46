//! Dataset loading: named test cases fed to the execution engine.
//!
//! Two formats are accepted:
//! - JSON: `{"testCases": [{"name", "inputs": {...}, "expectedOutput"?}]}`
//! - CSV: columns `name`, `inputs` (a JSON-encoded object string), and an
//!   optional `expected_output`
//!
//! Malformed files fail fast with a parse error before any execution.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PromptabError, Result};

/// One named input scenario evaluated against a prompt template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub name: String,
    pub inputs: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetFile {
    test_cases: Vec<TestCase>,
}

/// Load test cases from `path`, dispatching on the file extension
/// (`.csv` means CSV; anything else is parsed as JSON).
pub fn load_dataset(path: impl AsRef<Path>) -> Result<Vec<TestCase>> {
    let path = path.as_ref();
    let is_csv = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PromptabError::NotFound(format!("dataset file: {}", path.display()))
        } else {
            PromptabError::Io(e)
        }
    })?;

    let cases = if is_csv {
        parse_csv(&content)?
    } else {
        parse_json(&content)?
    };

    if cases.is_empty() {
        return Err(PromptabError::Validation(
            "dataset contains no test cases".to_string(),
        ));
    }
    for case in &cases {
        if case.name.is_empty() {
            return Err(PromptabError::Validation(
                "dataset test case is missing a name".to_string(),
            ));
        }
    }
    Ok(cases)
}

fn parse_json(content: &str) -> Result<Vec<TestCase>> {
    let file: DatasetFile = serde_json::from_str(content)
        .map_err(|e| PromptabError::Parse(format!("dataset JSON: {e}")))?;
    Ok(file.test_cases)
}

fn parse_csv(content: &str) -> Result<Vec<TestCase>> {
    let mut reader = csv::Reader::from_reader(content.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| PromptabError::Parse(format!("dataset CSV: {e}")))?
        .clone();

    let col = |name: &str| headers.iter().position(|h| h == name);
    let name_col = col("name")
        .ok_or_else(|| PromptabError::Parse("dataset CSV: missing 'name' column".to_string()))?;
    let inputs_col = col("inputs")
        .ok_or_else(|| PromptabError::Parse("dataset CSV: missing 'inputs' column".to_string()))?;
    let expected_col = col("expected_output");

    let mut cases = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| PromptabError::Parse(format!("dataset CSV row {row}: {e}")))?;
        let name = record.get(name_col).unwrap_or_default().to_string();
        let inputs_raw = record.get(inputs_col).unwrap_or_default();
        let inputs: HashMap<String, String> = serde_json::from_str(inputs_raw).map_err(|e| {
            PromptabError::Parse(format!("dataset CSV row {row}: inputs is not a JSON object: {e}"))
        })?;
        let expected_output = expected_col
            .and_then(|c| record.get(c))
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        cases.push(TestCase {
            name,
            inputs,
            expected_output,
        });
    }
    Ok(cases)
}
