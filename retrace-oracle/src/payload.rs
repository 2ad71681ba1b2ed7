// Wire format exchanged with the judgment service

use retrace_core::catalog::RequestDescription;
use retrace_core::oracle::OracleError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleRequest<'a> {
    pub request: &'a RequestDescription,
    pub known_inputs: &'a BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OracleAnswer {
    Wrapped {
        #[serde(alias = "dynamic_parts", rename = "dynamicParts")]
        dynamic_parts: Vec<Value>,
    },
    Bare(Vec<Value>),
}

/// Parse the service's answer into candidate values.
///
/// Accepts `{"dynamicParts": [...]}`, `{"dynamic_parts": [...]}` or a bare
/// array. Numbers are kept as their decimal text; anything else is malformed.
pub fn parse_answer(body: &str) -> Result<Vec<String>, OracleError> {
    let answer: OracleAnswer = serde_json::from_str(body)
        .map_err(|e| OracleError::Malformed(format!("unexpected answer shape: {}", e)))?;

    let items = match answer {
        OracleAnswer::Wrapped { dynamic_parts } => dynamic_parts,
        OracleAnswer::Bare(items) => items,
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(OracleError::Malformed(format!(
                "expected a string value, got {}",
                other
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wrapped_answer() {
        assert_eq!(
            parse_answer(r#"{"dynamicParts": ["token123", "sess456"]}"#).unwrap(),
            vec!["token123", "sess456"]
        );
        assert_eq!(
            parse_answer(r#"{"dynamic_parts": ["a"]}"#).unwrap(),
            vec!["a"]
        );
    }

    #[test]
    fn test_parse_bare_array_with_numbers() {
        assert_eq!(parse_answer(r#"["x", 42]"#).unwrap(), vec!["x", "42"]);
    }

    #[test]
    fn test_parse_rejects_other_shapes() {
        assert!(matches!(
            parse_answer(r#"{"answer": "token123"}"#),
            Err(OracleError::Malformed(_))
        ));
        assert!(matches!(
            parse_answer(r#"[{"value": "x"}]"#),
            Err(OracleError::Malformed(_))
        ));
        assert!(matches!(parse_answer("not json"), Err(OracleError::Malformed(_))));
    }

    #[test]
    fn test_request_serializes_camel_case() {
        let request = retrace_core::catalog::CapturedRequest::new("GET", "https://x.test/a").describe(2);
        let inputs = BTreeMap::from([("user".to_string(), "alice".to_string())]);
        let value = serde_json::to_value(OracleRequest {
            request: &request,
            known_inputs: &inputs,
        })
        .unwrap();

        assert_eq!(value["request"]["catalogIndex"], 2);
        assert_eq!(value["knownInputs"]["user"], "alice");
    }
}
