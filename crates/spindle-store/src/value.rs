use serde::{Deserialize, Serialize};

use spindle_core::error::{Result, SpindleError};

/// A decoded parameter value.
///
/// Values are persisted as a JSON-encoded string plus an optional type tag;
/// `from_database` is the only decoding entry point so every consumer agrees
/// on the mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Float(f64),
    Str(String),
    Bool(bool),
    Json(serde_json::Value),
    Null,
}

impl ParameterValue {
    /// Encode for storage: the JSON text and the type tag column.
    pub fn to_database(&self) -> (String, Option<&'static str>) {
        match self {
            ParameterValue::Float(v) => (v.to_string(), Some("float")),
            ParameterValue::Str(s) => (
                serde_json::Value::String(s.clone()).to_string(),
                Some("str"),
            ),
            ParameterValue::Bool(b) => (b.to_string(), Some("bool")),
            ParameterValue::Json(v) => (v.to_string(), None),
            ParameterValue::Null => ("null".to_string(), None),
        }
    }

    /// Display form used in exported tables. Whole floats keep one decimal
    /// (`2.0`, not `2`) so exports match the stored precision.
    pub fn export_string(&self) -> String {
        match self {
            ParameterValue::Float(v) if v.fract() == 0.0 && v.is_finite() => {
                format!("{:.1}", v)
            }
            ParameterValue::Float(v) => v.to_string(),
            ParameterValue::Str(s) => s.clone(),
            ParameterValue::Bool(b) => b.to_string(),
            ParameterValue::Json(v) => v.to_string(),
            ParameterValue::Null => String::new(),
        }
    }
}

/// Decode a stored value given its type tag.
pub fn from_database(encoded: &str, type_tag: Option<&str>) -> Result<ParameterValue> {
    let parsed: serde_json::Value = serde_json::from_str(encoded)
        .map_err(|e| SpindleError::Database(format!("undecodable value '{}': {}", encoded, e)))?;
    let value = match (type_tag, parsed) {
        (Some("float"), serde_json::Value::Number(n)) => {
            let v = n
                .as_f64()
                .ok_or_else(|| SpindleError::Database(format!("non-finite float: {}", n)))?;
            ParameterValue::Float(v)
        }
        (Some("str"), serde_json::Value::String(s)) => ParameterValue::Str(s),
        (Some("bool"), serde_json::Value::Bool(b)) => ParameterValue::Bool(b),
        (None, serde_json::Value::Null) => ParameterValue::Null,
        (None, other) => ParameterValue::Json(other),
        (Some(tag), other) => {
            return Err(SpindleError::Database(format!(
                "type tag '{}' does not match value {}",
                tag, other
            )))
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_roundtrip() {
        let value = ParameterValue::Float(99.0);
        let (encoded, tag) = value.to_database();
        assert_eq!(from_database(&encoded, tag).unwrap(), value);
    }

    #[test]
    fn test_str_roundtrip() {
        let value = ParameterValue::Str("spoon".into());
        let (encoded, tag) = value.to_database();
        assert_eq!(encoded, "\"spoon\"");
        assert_eq!(from_database(&encoded, tag).unwrap(), value);
    }

    #[test]
    fn test_untagged_json() {
        let decoded = from_database("[1, 2, 3]", None).unwrap();
        assert_eq!(decoded, ParameterValue::Json(serde_json::json!([1, 2, 3])));
        assert_eq!(from_database("null", None).unwrap(), ParameterValue::Null);
    }

    #[test]
    fn test_mismatched_tag_rejected() {
        assert!(from_database("\"text\"", Some("float")).is_err());
        assert!(from_database("not json", Some("str")).is_err());
    }

    #[test]
    fn test_export_string() {
        assert_eq!(ParameterValue::Float(2.0).export_string(), "2.0");
        assert_eq!(ParameterValue::Float(2.5).export_string(), "2.5");
        assert_eq!(ParameterValue::Str("a".into()).export_string(), "a");
    }
}
