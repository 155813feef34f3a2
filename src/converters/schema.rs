//! Tool parameter schemas arrive as arbitrary JSON Schema; Gemini accepts a
//! subset. Everything it rejects is stripped in place.

use serde_json::Value;

/// String formats Gemini understands; all others are dropped.
const SUPPORTED_STRING_FORMATS: &[&str] = &["enum", "date-time"];

pub fn sanitize_schema(schema: &mut Value) {
    match schema {
        Value::Object(map) => {
            map.remove("$schema");
            map.remove("additionalProperties");
            map.remove("strict");

            let is_string_type = map.get("type").and_then(Value::as_str) == Some("string");
            let unsupported_format = map
                .get("format")
                .and_then(Value::as_str)
                .map(|f| !SUPPORTED_STRING_FORMATS.contains(&f))
                .unwrap_or(false);
            if is_string_type && unsupported_format {
                map.remove("format");
            }

            for value in map.values_mut() {
                sanitize_schema(value);
            }
        }
        Value::Array(arr) => {
            for item in arr.iter_mut() {
                sanitize_schema(item);
            }
        }
        _ => {}
    }
}
