/// Primary-store document model
///
/// A document is the unit the primary store hands to the replication
/// pipeline: an opaque string identity plus a free-form field map. Typed
/// accessors convert field lookups into `Error::InvalidDocument` so that a
/// malformed record fails one task instead of poisoning a batch.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Primary-store identity (opaque string)
    pub id: String,
    /// Arbitrary-shape record body
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Required string field.
    pub fn str_field(&self, name: &str) -> Result<&str> {
        self.get(name).and_then(Value::as_str).ok_or_else(|| {
            Error::InvalidDocument(format!(
                "missing or non-string field `{}` in document {}",
                name, self.id
            ))
        })
    }

    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Required integer field.
    pub fn i64_field(&self, name: &str) -> Result<i64> {
        self.get(name).and_then(Value::as_i64).ok_or_else(|| {
            Error::InvalidDocument(format!(
                "missing or non-integer field `{}` in document {}",
                name, self.id
            ))
        })
    }

    pub fn i64_or(&self, name: &str, default: i64) -> i64 {
        self.get(name).and_then(Value::as_i64).unwrap_or(default)
    }

    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        self.get(name).and_then(Value::as_bool).unwrap_or(default)
    }

    /// Creation time in epoch milliseconds (0 when the field is absent).
    pub fn created_at(&self) -> i64 {
        self.i64_or("created_at", 0)
    }

    /// Last modification time in epoch milliseconds. Falls back to the
    /// creation time so freshly inserted records still match time-ranged
    /// reconciliation queries.
    pub fn updated_at(&self) -> i64 {
        let created = self.created_at();
        self.i64_or("updated_at", created)
    }
}

/// Pack a structured value into the flat text representation stored in the
/// secondary store.
pub fn pack_json(value: &Value) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Inverse of [`pack_json`]. `unpack_json(&pack_json(v)?)` is deep-equal
/// to `v` for every JSON value.
pub fn unpack_json(text: &str) -> Result<Value> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn typed_accessors() {
        let doc = Document::new("u1")
            .with("email", "k@x.com")
            .with("name", "Karim")
            .with("scan_count", 7)
            .with("is_admin", true);

        assert_eq!(doc.str_field("email").unwrap(), "k@x.com");
        assert_eq!(doc.i64_field("scan_count").unwrap(), 7);
        assert!(doc.bool_or("is_admin", false));
        assert_eq!(doc.i64_or("missing", 42), 42);
        assert!(doc.opt_str("missing").is_none());
    }

    #[test]
    fn missing_required_field_is_invalid_document() {
        let doc = Document::new("u1").with("name", "Karim");
        let err = doc.str_field("email").unwrap_err();
        assert_eq!(err.code(), "INVALID_DOCUMENT");

        let err = doc.i64_field("name").unwrap_err();
        assert_eq!(err.code(), "INVALID_DOCUMENT");
    }

    #[test]
    fn updated_at_falls_back_to_created_at() {
        let doc = Document::new("a1").with("created_at", 1_000);
        assert_eq!(doc.updated_at(), 1_000);

        let doc = doc.with("updated_at", 2_000);
        assert_eq!(doc.updated_at(), 2_000);
    }

    #[test]
    fn pack_unpack_preserves_float_precision() {
        // Requires serde_json's `float_roundtrip` feature; the default
        // float parser can be off by one ULP.
        let payload = json!([{"a": -923277908.7846696_f64}]);
        let text = pack_json(&payload).unwrap();
        assert_eq!(unpack_json(&text).unwrap(), payload);
    }

    #[test]
    fn pack_unpack_nested_payload() {
        let payload = json!({
            "url": "https://example.com/q/1",
            "geo": {"lat": 52.37, "lon": 4.89},
            "tags": ["a", "b", null],
            "count": 3
        });
        let text = pack_json(&payload).unwrap();
        assert_eq!(unpack_json(&text).unwrap(), payload);
    }

    fn json_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| Value::Number(n.into())),
            (-1.0e9f64..1.0e9).prop_map(|f| {
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            }),
            "[a-zA-Z0-9 _-]{0,16}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::hash_map("[a-z]{1,8}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn packed_payload_round_trips(value in json_value()) {
            let text = pack_json(&value).unwrap();
            let back = unpack_json(&text).unwrap();
            prop_assert_eq!(back, value);
        }
    }
}
