// src/money.rs

use serde_json::Value;

/// Convert a locale-formatted price or quantity string into a canonical
/// integer. The source reports use `.` as thousands separator and `,` as
/// decimal separator ("$1.234,50" is 1234.50 pesos). Fractional values are
/// truncated — listed prices carry no sub-unit precision.
///
/// Unparseable input resolves to `0`, never an error: upstream sources are
/// not schema-validated, so normalization stays best-effort.
pub fn normalize_str(raw: &str) -> i64 {
    let mut cleaned = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        match c {
            '0'..='9' => cleaned.push(c),
            '-' if cleaned.is_empty() => cleaned.push(c),
            // decimal separator
            ',' => cleaned.push('.'),
            // currency symbol, thousands separator, padding
            '$' | '.' | ' ' => {}
            _ => {}
        }
    }
    cleaned.parse::<f64>().map(|v| v.trunc() as i64).unwrap_or(0)
}

/// Normalize a loosely-typed JSON value. Numbers pass through (truncated if
/// fractional); strings go through [`normalize_str`]; anything else is `0`.
pub fn normalize_value(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_f64().map(|v| v.trunc() as i64).unwrap_or(0),
        Value::String(s) => normalize_str(s),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_thousands_and_decimal() {
        assert_eq!(normalize_str("$1.234,50"), 1234);
        assert_eq!(normalize_str("$999"), 999);
        assert_eq!(normalize_str("1.000"), 1000);
    }

    #[test]
    fn test_garbage_is_zero() {
        assert_eq!(normalize_str("abc"), 0);
        assert_eq!(normalize_str(""), 0);
        assert_eq!(normalize_str("1,2,3"), 0);
    }

    #[test]
    fn test_negative_delta() {
        assert_eq!(normalize_str("-12"), -12);
    }

    #[test]
    fn test_numeric_passthrough() {
        assert_eq!(normalize_value(&json!(1500.7)), 1500);
        assert_eq!(normalize_value(&json!(42)), 42);
        assert_eq!(normalize_value(&json!(-3)), -3);
        assert_eq!(normalize_value(&json!("$2.500")), 2500);
        assert_eq!(normalize_value(&Value::Null), 0);
    }
}
