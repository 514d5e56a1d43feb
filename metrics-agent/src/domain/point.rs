//! Data point value object.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Value of a tag.
///
/// Tags identify a series; they are strings or numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Integer(i64),
    Float(f64),
    String(String),
}

impl std::fmt::Display for TagValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TagValue::Integer(v) => write!(f, "{}", v),
            TagValue::Float(v) => write!(f, "{}", v),
            TagValue::String(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u32> for TagValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Value of a field.
///
/// `Boolean` is listed first so untagged deserialization never reads `true`
/// as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl FieldValue {
    /// Convert a JSON scalar into a field value. Objects, arrays and null yield `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Boolean(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        i64::try_from(value)
            .map(Self::Integer)
            .unwrap_or(Self::Float(value as f64))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// A single time-series sample.
///
/// Produced by sources and consumed by sinks; there are no mutating accessors.
/// Tags and fields are kept in `BTreeMap`s so serialization order is stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    measurement: String,
    tags: BTreeMap<String, TagValue>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: DateTime<Utc>,
}

impl DataPoint {
    /// Start building a point for `measurement`, timestamped now unless overridden.
    pub fn builder(measurement: impl Into<String>) -> DataPointBuilder {
        DataPointBuilder {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: None,
        }
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &BTreeMap<String, TagValue> {
        &self.tags
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.get(key)
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }
}

/// Builder for [`DataPoint`].
#[derive(Debug, Clone)]
pub struct DataPointBuilder {
    measurement: String,
    tags: BTreeMap<String, TagValue>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: Option<DateTime<Utc>>,
}

impl DataPointBuilder {
    /// Add a tag. A repeated key replaces the earlier value.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add a field. A repeated key replaces the earlier value.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn has_fields(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn build(self) -> DataPoint {
        DataPoint {
            measurement: self.measurement,
            tags: self.tags,
            fields: self.fields,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_builder_sets_all_parts() {
        let point = DataPoint::builder("weather")
            .tag("station", "north")
            .tag("instance", 2i64)
            .field("temperature", 21.5)
            .field("online", true)
            .timestamp(fixed_ts())
            .build();

        assert_eq!(point.measurement(), "weather");
        assert_eq!(point.tag("station"), Some(&TagValue::from("north")));
        assert_eq!(point.tag("instance"), Some(&TagValue::Integer(2)));
        assert_eq!(point.field("temperature"), Some(&FieldValue::Float(21.5)));
        assert_eq!(point.field("online"), Some(&FieldValue::Boolean(true)));
        assert_eq!(point.timestamp(), fixed_ts());
    }

    #[test]
    fn test_duplicate_tag_keys_keep_last_value() {
        let point = DataPoint::builder("m")
            .tag("host", "a")
            .tag("host", "b")
            .field("v", 1i64)
            .build();
        assert_eq!(point.tags().len(), 1);
        assert_eq!(point.tag("host"), Some(&TagValue::from("b")));
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let a = DataPoint::builder("m")
            .tag("zone", "z")
            .tag("app", "a")
            .field("b", 2i64)
            .field("a", 1i64)
            .timestamp(fixed_ts())
            .build();
        let b = DataPoint::builder("m")
            .tag("app", "a")
            .tag("zone", "z")
            .field("a", 1i64)
            .field("b", 2i64)
            .timestamp(fixed_ts())
            .build();

        let json_a = serde_json::to_string(&a).unwrap();
        let json_b = serde_json::to_string(&b).unwrap();
        assert_eq!(json_a, json_b);
        assert!(json_a.find("\"app\"").unwrap() < json_a.find("\"zone\"").unwrap());
    }

    #[test]
    fn test_field_value_from_json() {
        assert_eq!(
            FieldValue::from_json(&serde_json::json!(3)),
            Some(FieldValue::Integer(3))
        );
        assert_eq!(
            FieldValue::from_json(&serde_json::json!(0.25)),
            Some(FieldValue::Float(0.25))
        );
        assert_eq!(
            FieldValue::from_json(&serde_json::json!("up")),
            Some(FieldValue::String("up".into()))
        );
        assert_eq!(
            FieldValue::from_json(&serde_json::json!(false)),
            Some(FieldValue::Boolean(false))
        );
        assert_eq!(FieldValue::from_json(&serde_json::json!(null)), None);
        assert_eq!(FieldValue::from_json(&serde_json::json!([1, 2])), None);
    }

    #[test]
    fn test_untagged_field_deserialization_prefers_bool() {
        let value: FieldValue = serde_json::from_str("true").unwrap();
        assert_eq!(value, FieldValue::Boolean(true));
        let value: FieldValue = serde_json::from_str("7").unwrap();
        assert_eq!(value, FieldValue::Integer(7));
    }
}
