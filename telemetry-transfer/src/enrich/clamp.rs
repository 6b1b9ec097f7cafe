use serde_json::{Number, Value};

use super::DataProcessor;
use crate::event::Data;

/// Clamp an integer outside the i64 range to the nearest bound. Floats and in-range integers are
/// returned unchanged.
pub fn clamp_number(number: &Number) -> Option<Number> {
    if number.as_i64().is_some() {
        return None;
    }

    let text = number.to_string();
    if text.contains(['.', 'e', 'E']) {
        return None;
    }

    let bound = if text.starts_with('-') {
        i64::MIN
    } else {
        i64::MAX
    };
    Some(Number::from(bound))
}

fn clamp_value(value: &mut Value) {
    match value {
        Value::Number(number) => {
            if let Some(clamped) = clamp_number(number) {
                *number = clamped;
            }
        }
        Value::Array(items) => items.iter_mut().for_each(clamp_value),
        Value::Object(object) => object.values_mut().for_each(clamp_value),
        _ => {}
    }
}

/// Keeps every integer in the payload storable as a 64-bit signed value.
pub struct ClampProcessor;

impl DataProcessor for ClampProcessor {
    fn name(&self) -> &'static str {
        "clamp"
    }

    fn process(&self, data: &mut Data) {
        data.values_mut().for_each(clamp_value);
    }
}

#[cfg(test)]
mod tests {
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    use super::*;

    fn parse(raw: &str) -> Data {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_clamps_nested_overflowing_integers() {
        let mut data = parse(
            r#"{
                "big": 92233720368547758070,
                "small": -92233720368547758080,
                "nested": {"list": [1, 18446744073709551615, {"deep": 99999999999999999999999}]},
                "float": 1.5e300,
                "decimal": 123456789012345678901234.5,
                "text": "92233720368547758070"
            }"#,
        );

        ClampProcessor.process(&mut data);

        assert_json_eq!(
            json!(data),
            json!(parse(
                r#"{
                    "big": 9223372036854775807,
                    "small": -9223372036854775808,
                    "nested": {"list": [1, 9223372036854775807, {"deep": 9223372036854775807}]},
                    "float": 1.5e300,
                    "decimal": 123456789012345678901234.5,
                    "text": "92233720368547758070"
                }"#
            ))
        );
    }

    #[test]
    fn test_in_range_values_are_untouched() {
        let raw = r#"{"max": 9223372036854775807, "min": -9223372036854775808, "zero": 0}"#;
        let mut data = parse(raw);

        ClampProcessor.process(&mut data);

        assert_eq!(data, parse(raw));
    }

    #[test]
    fn test_clamping_is_idempotent() {
        let mut data = parse(r#"{"a": 123456789012345678901234567890, "b": -5}"#);

        ClampProcessor.process(&mut data);
        let once = data.clone();
        ClampProcessor.process(&mut data);

        assert_eq!(data, once);
        assert_eq!(data["a"].as_i64(), Some(i64::MAX));
        assert_eq!(data["b"].as_i64(), Some(-5));
    }
}
