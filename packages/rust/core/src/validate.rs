//! Structural presence check for context payloads.

use serde::Serialize;
use serde_json::Value;

/// Outcome of [`validate_context`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Check that `payload` is a JSON object and that every name in
/// `required_fields` is present with a truthy value. Types are not checked.
///
/// `null`, `false`, `0` and `""` count as missing.
pub fn validate_context<S: AsRef<str>>(payload: &Value, required_fields: &[S]) -> ValidationReport {
    let Some(object) = payload.as_object() else {
        return ValidationReport {
            valid: false,
            errors: vec!["Context must be a JSON object".to_string()],
        };
    };

    let errors: Vec<String> = required_fields
        .iter()
        .map(AsRef::as_ref)
        .filter(|field| !object.get(*field).is_some_and(is_truthy))
        .map(|field| format!("Missing required field: {field}"))
        .collect();

    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
