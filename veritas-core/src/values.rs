//! Cell value helpers shared by the constraint store, metadata and tables.
//!
//! Cells are held as `serde_json::Value` so that CSV-loaded data, metadata
//! statistics and categorical frequency names compare uniformly.

use serde_json::Value;

/// Extracts a numeric value from a JSON value.
///
/// Numeric strings are parsed, so `"12.5"` and `12.5` compare equal. Only
/// finite values are accepted.
pub fn as_number(value: &Value) -> Option<f64> {
    let numeric = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    match numeric {
        Some(v) if v.is_finite() => Some(v),
        _ => None,
    }
}

/// Returns true for null cells and empty strings.
pub fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Converts a JSON value to a comparable key.
///
/// Missing cells have no key. Integral floats collapse onto their integer
/// spelling so that `5`, `5.0` and `"5"` share a key.
pub fn value_key(value: &Value) -> Option<String> {
    if is_missing(value) {
        return None;
    }
    match value {
        Value::Number(n) => Some(number_key(n)),
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 => {
                Some(format!("{}", v as i64))
            }
            Ok(v) if v.is_finite() => Some(v.to_string()),
            _ => Some(s.clone()),
        },
        other => Some(display_value(other)),
    }
}

fn number_key(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    match n.as_f64() {
        Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", v as i64),
        Some(v) => v.to_string(),
        None => n.to_string(),
    }
}

/// Renders a cell for logs and CSV output. Null renders as an empty string.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_as_number() {
        assert_eq!(as_number(&json!(3)), Some(3.0));
        assert_eq!(as_number(&json!("-9.5")), Some(-9.5));
        assert_eq!(as_number(&json!("abc")), None);
        assert_eq!(as_number(&json!("NaN")), None);
        assert_eq!(as_number(&Value::Null), None);
    }

    #[test]
    fn test_value_key_normalizes_numbers() {
        assert_eq!(value_key(&json!(5)), Some("5".to_string()));
        assert_eq!(value_key(&json!(5.0)), Some("5".to_string()));
        assert_eq!(value_key(&json!("5")), Some("5".to_string()));
        assert_eq!(value_key(&json!(2.5)), Some("2.5".to_string()));
        assert_eq!(value_key(&json!("abc")), Some("abc".to_string()));
    }

    #[test]
    fn test_value_key_missing() {
        assert_eq!(value_key(&Value::Null), None);
        assert_eq!(value_key(&json!("")), None);
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&Value::Null), "");
        assert_eq!(display_value(&json!("x")), "x");
        assert_eq!(display_value(&json!(7)), "7");
    }
}
