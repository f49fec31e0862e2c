//! Serializer trait.

use crate::error::CodecResult;
use crate::type_name::TypeName;
use crate::Value;

/// A codec converting object values of some types to and from bytes.
///
/// Serializers are registered with an engine in order. When an object is
/// written, the most recently registered serializer whose
/// [`can_serialize`](Serializer::can_serialize) accepts the object's type
/// encodes it, and its [`id`](Serializer::id) is recorded next to the
/// payload. Reading looks the serializer up again by that id.
///
/// # Invariants
///
/// - `id` is stable across process restarts and unique per codec format
/// - `deserialize(t, serialize(t, v)?)` yields a value equal to `v` for every
///   value the serializer accepts for type `t`
pub trait Serializer: Send + Sync {
    /// Stable identifier written into streams next to each payload.
    fn id(&self) -> &str;

    /// Returns whether this serializer handles objects of `type_name`.
    fn can_serialize(&self, type_name: &TypeName) -> bool;

    /// Encodes `value`, an object of type `type_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented by this codec.
    fn serialize(&self, type_name: &TypeName, value: &Value) -> CodecResult<Vec<u8>>;

    /// Decodes a payload previously produced by [`serialize`](Serializer::serialize).
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is malformed.
    fn deserialize(&self, type_name: &TypeName, bytes: &[u8]) -> CodecResult<Value>;
}
