//! Deserializers for RepairDesk-style JSON, where a field can show up as a
//! string, a number, null, or not at all.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_string(&value))
}

pub fn timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_timestamp(&value))
}

/// Treats `null` like a missing field.
pub fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("fullname")
            .or_else(|| map.get("fullName"))
            .or_else(|| map.get("name"))
            .map(value_to_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

pub fn value_to_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    }
    .filter(|ts| *ts > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_to_string_variants() {
        assert_eq!(value_to_string(&json!(null)), "");
        assert_eq!(value_to_string(&json!("T-1")), "T-1");
        assert_eq!(value_to_string(&json!(42)), "42");
        assert_eq!(value_to_string(&json!({"fullname": "Ana Ruiz"})), "Ana Ruiz");
    }

    #[test]
    fn test_value_to_timestamp_variants() {
        assert_eq!(value_to_timestamp(&json!(1700000000)), Some(1700000000));
        assert_eq!(value_to_timestamp(&json!("1700000000")), Some(1700000000));
        assert_eq!(value_to_timestamp(&json!(0)), None);
        assert_eq!(value_to_timestamp(&json!("soon")), None);
    }
}
