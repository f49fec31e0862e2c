//! # ArgentDB Codec
//!
//! Serializer contract and built-in codecs for ArgentDB.
//!
//! Objects are held in memory as dynamic [`Value`]s tagged with a
//! [`TypeName`]. A [`Serializer`] turns the value of an object into a byte
//! payload and back. Two serializers ship with the crate:
//!
//! - [`CborSerializer`] - compact binary, accepts every type, always available
//! - [`JsonSerializer`] - readable payloads for the types it is configured with
//!
//! ## Usage
//!
//! ```
//! use argentdb_codec::{to_value, from_value, CborSerializer, Serializer, TypeName};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Order { id: u32, sku: String }
//!
//! let ty = TypeName::from("Order");
//! let value = to_value(&Order { id: 1, sku: "A-1".into() }).unwrap();
//! let bytes = CborSerializer.serialize(&ty, &value).unwrap();
//! let back: Order = from_value(&CborSerializer.deserialize(&ty, &bytes).unwrap()).unwrap();
//! assert_eq!(back, Order { id: 1, sku: "A-1".into() });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod json;
mod serializer;
mod type_name;

pub use cbor::CborSerializer;
pub use error::{CodecError, CodecResult};
pub use json::JsonSerializer;
pub use serializer::Serializer;
pub use type_name::TypeName;

/// Dynamic object value.
pub use ciborium::Value;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Converts a serializable Rust value into a dynamic [`Value`].
///
/// # Errors
///
/// Returns an error if the value's `Serialize` implementation fails.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> CodecResult<Value> {
    Value::serialized(value).map_err(|e| CodecError::conversion(e.to_string()))
}

/// Converts a dynamic [`Value`] into a Rust value.
///
/// # Errors
///
/// Returns an error if the value does not have the shape `T` expects.
pub fn from_value<T: DeserializeOwned>(value: &Value) -> CodecResult<T> {
    value
        .deserialized()
        .map_err(|e| CodecError::conversion(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Line {
        sku: String,
        qty: u32,
        notes: Option<String>,
    }

    #[test]
    fn struct_value_conversion() {
        let line = Line {
            sku: "B-2".into(),
            qty: 3,
            notes: None,
        };
        let value = to_value(&line).unwrap();
        assert!(value.is_map());
        assert_eq!(from_value::<Line>(&value).unwrap(), line);
    }

    #[test]
    fn shape_mismatch_is_conversion_error() {
        let value = Value::Text("not a line".into());
        assert!(matches!(
            from_value::<Line>(&value),
            Err(CodecError::Conversion { .. })
        ));
    }

    proptest! {
        #[test]
        fn cbor_preserves_struct_values(sku in "[A-Z]-[0-9]{1,4}", qty in any::<u32>(), notes in proptest::option::of("[a-z ]{0,20}")) {
            let ty = TypeName::from("Line");
            let line = Line { sku, qty, notes };
            let bytes = CborSerializer.serialize(&ty, &to_value(&line).unwrap()).unwrap();
            let back: Line = from_value(&CborSerializer.deserialize(&ty, &bytes).unwrap()).unwrap();
            prop_assert_eq!(back, line);
        }
    }
}
