//! Recover one JSON object from model output.
//!
//! Models are told to answer with bare JSON and regularly don't: code fences,
//! "Sure! Here is..." preambles, trailing remarks. Two attempts only:
//!
//! 1. the whole trimmed text
//! 2. the span from the first `{` to the last `}`
//!
//! No candidate guessing beyond that.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Empty LLM response content")]
    Empty,

    #[error("No JSON object boundaries found in LLM output")]
    NoBoundaries,

    #[error("Extracted JSON is not an object")]
    NotAnObject,

    #[error("Extracted JSON is invalid: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Parse `text` into a JSON object, tolerating surrounding prose.
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>, ExtractError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ExtractError::Empty);
    }

    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(text) {
        return Ok(object);
    }

    let start = text.find('{').ok_or(ExtractError::NoBoundaries)?;
    let end = text.rfind('}').ok_or(ExtractError::NoBoundaries)?;
    if end <= start {
        return Err(ExtractError::NoBoundaries);
    }

    match serde_json::from_str::<Value>(text[start..=end].trim())? {
        Value::Object(object) => Ok(object),
        _ => Err(ExtractError::NotAnObject),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_object() {
        let obj = extract_json_object(r#"  {"a": 1, "b": [true]}  "#).unwrap();
        assert_eq!(Value::Object(obj), json!({"a": 1, "b": [true]}));
    }

    #[test]
    fn test_object_wrapped_in_prose() {
        let obj = extract_json_object(r#"Sure! Here is the result: {"a": 1} Thanks."#).unwrap();
        assert_eq!(Value::Object(obj), json!({"a": 1}));
    }

    #[test]
    fn test_object_in_code_fence() {
        let text = "```json\n{\"rubric\": {\"correctness\": 7}}\n```";
        let obj = extract_json_object(text).unwrap();
        assert_eq!(obj["rubric"]["correctness"], 7);
    }

    #[test]
    fn test_array_falls_back_to_brace_span() {
        let obj = extract_json_object(r#"[{"a": 1}]"#).unwrap();
        assert_eq!(Value::Object(obj), json!({"a": 1}));
    }

    #[test]
    fn test_no_braces_fails() {
        let err = extract_json_object("no braces here").unwrap_err();
        assert!(matches!(err, ExtractError::NoBoundaries));
    }

    #[test]
    fn test_empty_fails() {
        assert!(matches!(
            extract_json_object("   \n\t").unwrap_err(),
            ExtractError::Empty
        ));
    }

    #[test]
    fn test_reversed_braces_fail() {
        assert!(matches!(
            extract_json_object("} then {").unwrap_err(),
            ExtractError::NoBoundaries
        ));
    }

    #[test]
    fn test_two_objects_take_outermost_span_and_fail() {
        // The span `{"a": 1} and {"b": 2}` is not valid JSON; no guessing.
        let err = extract_json_object(r#"first {"a": 1} and {"b": 2}"#).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidJson(_)));
    }

    #[test]
    fn test_scalar_json_is_rejected() {
        assert!(matches!(
            extract_json_object("42").unwrap_err(),
            ExtractError::NoBoundaries
        ));
    }
}
