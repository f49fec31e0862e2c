//! Built-in CBOR serializer.

use crate::error::{CodecError, CodecResult};
use crate::serializer::Serializer;
use crate::type_name::TypeName;
use crate::Value;

/// The built-in serializer, encoding values as CBOR (RFC 8949).
///
/// It accepts every type and is the fallback when no registered
/// serializer claims a type, so it is never absent from an engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborSerializer;

impl CborSerializer {
    /// Identifier recorded in streams for CBOR payloads.
    pub const ID: &'static str = "cbor";
}

impl Serializer for CborSerializer {
    fn id(&self) -> &str {
        Self::ID
    }

    fn can_serialize(&self, _type_name: &TypeName) -> bool {
        true
    }

    fn serialize(&self, type_name: &TypeName, value: &Value) -> CodecResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| CodecError::encoding_failed(Self::ID, type_name.as_str(), e.to_string()))?;
        Ok(buf)
    }

    fn deserialize(&self, type_name: &TypeName, bytes: &[u8]) -> CodecResult<Value> {
        ciborium::from_reader(bytes)
            .map_err(|e| CodecError::decoding_failed(Self::ID, type_name.as_str(), e.to_string()))
    }
}
