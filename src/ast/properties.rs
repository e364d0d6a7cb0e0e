//! Property maps
//!
//! Batches are written by hand (or by an LLM), so `Listening Port: 8080` and
//! `Log Payload: false` must be accepted even though the platform only knows
//! string values.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;

/// Ordered property name → value map
pub type PropertyMap = BTreeMap<String, String>;

/// Deserialize a map whose values may be any YAML scalar
///
/// `null` values are dropped; sequences and mappings are rejected.
pub(crate) fn scalar_map<'de, D>(deserializer: D) -> Result<PropertyMap, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Value>> = Option::deserialize(deserializer)?;
    let mut map = PropertyMap::new();

    for (key, value) in raw.unwrap_or_default() {
        match value {
            Value::Null => {}
            Value::String(s) => {
                map.insert(key, s);
            }
            Value::Bool(b) => {
                map.insert(key, b.to_string());
            }
            Value::Number(n) => {
                map.insert(key, n.to_string());
            }
            other => {
                return Err(D::Error::custom(format!(
                    "property '{}' must be a scalar, got {}",
                    key,
                    value_kind(&other)
                )));
            }
        }
    }

    Ok(map)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
        _ => "a scalar",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "scalar_map")]
        properties: PropertyMap,
    }

    #[test]
    fn scalars_are_stringified() {
        let holder: Holder = serde_yaml::from_str(
            r#"
properties:
  Listening Port: 8080
  Log Payload: false
  Log Level: info
  Unset: ~
"#,
        )
        .unwrap();

        assert_eq!(holder.properties["Listening Port"], "8080");
        assert_eq!(holder.properties["Log Payload"], "false");
        assert_eq!(holder.properties["Log Level"], "info");
        assert!(!holder.properties.contains_key("Unset"));
    }

    #[test]
    fn nested_values_are_rejected() {
        let err = serde_yaml::from_str::<Holder>("properties:\n  Bad: [1, 2]\n").unwrap_err();
        assert!(err.to_string().contains("must be a scalar"));
    }

    #[test]
    fn missing_or_null_map_is_empty() {
        let holder: Holder = serde_yaml::from_str("properties: ~\n").unwrap();
        assert!(holder.properties.is_empty());
    }
}
