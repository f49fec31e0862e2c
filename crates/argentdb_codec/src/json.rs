//! JSON serializer.

use crate::error::{CodecError, CodecResult};
use crate::serializer::Serializer;
use crate::type_name::TypeName;
use crate::Value;
use std::collections::BTreeSet;

/// A serializer writing values as UTF-8 JSON.
///
/// Useful for tables whose payloads should stay human-readable. Values JSON
/// cannot give back unchanged fail to serialize: byte strings, tags, maps
/// with non-text keys, integers outside the 64-bit range and floats that do
/// not survive the text form. Claim only types whose values avoid those.
///
/// # Example
///
/// ```rust
/// use argentdb_codec::{JsonSerializer, Serializer, TypeName};
///
/// let json = JsonSerializer::for_types(["AuditEntry"]);
/// assert!(json.can_serialize(&TypeName::from("AuditEntry")));
/// assert!(!json.can_serialize(&TypeName::from("Order")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonSerializer {
    /// Claimed types; `None` claims every type.
    types: Option<BTreeSet<TypeName>>,
}

impl JsonSerializer {
    /// Identifier recorded in streams for JSON payloads.
    pub const ID: &'static str = "json";

    /// Creates a serializer claiming every type.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a serializer claiming only the given types.
    #[must_use]
    pub fn for_types<I, T>(types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TypeName>,
    {
        Self {
            types: Some(types.into_iter().map(Into::into).collect()),
        }
    }
}

impl Serializer for JsonSerializer {
    fn id(&self) -> &str {
        Self::ID
    }

    fn can_serialize(&self, type_name: &TypeName) -> bool {
        self.types
            .as_ref()
            .map_or(true, |types| types.contains(type_name))
    }

    fn serialize(&self, type_name: &TypeName, value: &Value) -> CodecResult<Vec<u8>> {
        if !self.can_serialize(type_name) {
            return Err(CodecError::unsupported_type(Self::ID, type_name.as_str()));
        }
        check_exact(value)
            .map_err(|reason| CodecError::encoding_failed(Self::ID, type_name.as_str(), reason))?;
        serde_json::to_vec(value)
            .map_err(|e| CodecError::encoding_failed(Self::ID, type_name.as_str(), e.to_string()))
    }

    fn deserialize(&self, type_name: &TypeName, bytes: &[u8]) -> CodecResult<Value> {
        serde_json::from_slice(bytes)
            .map_err(|e| CodecError::decoding_failed(Self::ID, type_name.as_str(), e.to_string()))
    }
}

/// Fails on the first part of `value` that would not decode back unchanged.
fn check_exact(value: &Value) -> Result<(), String> {
    match value {
        Value::Null | Value::Bool(_) | Value::Text(_) => Ok(()),
        Value::Integer(int) => {
            let int = i128::from(*int);
            if i64::try_from(int).is_ok() || u64::try_from(int).is_ok() {
                Ok(())
            } else {
                Err(format!("integer {int} is outside the 64-bit range"))
            }
        }
        Value::Float(float) => {
            let back = serde_json::to_string(value)
                .ok()
                .and_then(|text| text.parse::<f64>().ok());
            if back.is_some_and(|back| back.to_bits() == float.to_bits()) {
                Ok(())
            } else {
                Err(format!("float {float} has no exact JSON form"))
            }
        }
        Value::Bytes(_) => Err("byte strings have no JSON form".into()),
        Value::Tag(tag, _) => Err(format!("tag {tag} has no JSON form")),
        Value::Array(items) => items.iter().try_for_each(check_exact),
        Value::Map(entries) => entries.iter().try_for_each(|(key, value)| match key {
            Value::Text(_) => check_exact(value),
            _ => Err("map keys must be text".into()),
        }),
        _ => Err("value has no JSON form".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciborium::value::Integer;

    fn entry() -> Value {
        Value::Map(vec![
            (Value::Text("actor".into()), Value::Text("ops".into())),
            (Value::Text("seq".into()), Value::Integer(12.into())),
            (Value::Text("ok".into()), Value::Bool(true)),
        ])
    }

    #[test]
    fn roundtrip_and_readable() {
        let ty = TypeName::from("AuditEntry");
        let json = JsonSerializer::new();
        let bytes = json.serialize(&ty, &entry()).unwrap();

        assert!(std::str::from_utf8(&bytes).unwrap().contains("\"actor\":\"ops\""));
        assert_eq!(json.deserialize(&ty, &bytes).unwrap(), entry());
    }

    #[test]
    fn restricted_serializer_rejects_other_types() {
        let json = JsonSerializer::for_types(["AuditEntry"]);
        let result = json.serialize(&TypeName::from("Order"), &entry());
        assert!(matches!(result, Err(CodecError::UnsupportedType { .. })));
    }

    #[test]
    fn values_without_exact_json_form_are_refused() {
        let ty = TypeName::from("Blob");
        let json = JsonSerializer::new();
        let lossy = [
            Value::Bytes(vec![1, 2, 3]),
            Value::Tag(1, Box::new(Value::Integer(0.into()))),
            Value::Map(vec![(Value::Integer(1.into()), Value::Null)]),
            Value::Array(vec![Value::Text("ok".into()), Value::Bytes(vec![0])]),
            Value::Integer(Integer::try_from(i128::from(i64::MIN) - 1).unwrap()),
            Value::Float(f64::NAN),
            Value::Float(f64::from(0.1f32)),
        ];
        for value in lossy {
            let result = json.serialize(&ty, &value);
            assert!(
                matches!(result, Err(CodecError::EncodingFailed { .. })),
                "{value:?} was accepted"
            );
        }
    }

    #[test]
    fn accepted_values_come_back_equal() {
        let ty = TypeName::from("Sample");
        let json = JsonSerializer::new();
        let exact = [
            entry(),
            Value::Integer(u64::MAX.into()),
            Value::Integer(i64::MIN.into()),
            Value::Float(0.1),
            Value::Float(2.5),
            Value::Float(-0.0),
            Value::Array(vec![Value::Null, Value::Text("x".into())]),
        ];
        for value in exact {
            let bytes = json.serialize(&ty, &value).unwrap();
            assert_eq!(json.deserialize(&ty, &bytes).unwrap(), value);
        }
    }

    #[test]
    fn malformed_json_fails() {
        let result = JsonSerializer::new().deserialize(&TypeName::from("X"), b"{not json");
        assert!(matches!(result, Err(CodecError::DecodingFailed { .. })));
    }
}
