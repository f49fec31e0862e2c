//! Serializer registry.

use crate::error::{CoreError, CoreResult};
use argentdb_codec::{CborSerializer, Serializer, TypeName};
use std::fmt;
use std::sync::Arc;

/// One registered serializer.
#[derive(Clone)]
pub struct SerializerEntry {
    /// Rust type name of the serializer, for diagnostics.
    pub serializer_type: &'static str,
    /// The serializer itself.
    pub serializer: Arc<dyn Serializer>,
}

impl fmt::Debug for SerializerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerEntry")
            .field("serializer_type", &self.serializer_type)
            .field("id", &self.serializer.id())
            .finish()
    }
}

/// Ordered list of registered serializers plus the built-in fallback.
///
/// # Selection
///
/// - Encoding scans most-recently-registered first and picks the first
///   serializer whose `can_serialize` accepts the type. If none does, the
///   built-in [`CborSerializer`] is used.
/// - Decoding scans most-recently-registered first for a matching id. The
///   built-in id `cbor` always resolves.
///
/// Registering never replaces an entry, so a later registration can shadow
/// a built-in or earlier codec without modifying it.
#[derive(Clone)]
pub struct SerializerRegistry {
    entries: Vec<SerializerEntry>,
    fallback: Arc<dyn Serializer>,
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            fallback: Arc::new(CborSerializer),
        }
    }
}

impl SerializerRegistry {
    /// Creates a registry containing only the built-in fallback.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiates `S` with its default configuration and appends it.
    pub fn register<S: Serializer + Default + 'static>(&mut self) {
        self.register_instance(S::default());
    }

    /// Appends an already-configured serializer.
    pub fn register_instance<S: Serializer + 'static>(&mut self, serializer: S) {
        self.entries.push(SerializerEntry {
            serializer_type: std::any::type_name::<S>(),
            serializer: Arc::new(serializer),
        });
    }

    /// Appends a shared serializer.
    pub fn register_shared(&mut self, serializer: Arc<dyn Serializer>) {
        self.entries.push(SerializerEntry {
            serializer_type: "dyn Serializer",
            serializer,
        });
    }

    /// Returns the registered entries in registration order.
    #[must_use]
    pub fn entries(&self) -> &[SerializerEntry] {
        &self.entries
    }

    /// Picks the serializer that encodes objects of `type_name`.
    #[must_use]
    pub fn select(&self, type_name: &TypeName) -> &Arc<dyn Serializer> {
        self.entries
            .iter()
            .rev()
            .map(|e| &e.serializer)
            .find(|s| s.can_serialize(type_name))
            .unwrap_or(&self.fallback)
    }

    /// Finds the serializer that wrote payloads tagged with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownSerializer`] if no serializer has that id.
    pub fn by_id(&self, id: &str) -> CoreResult<&Arc<dyn Serializer>> {
        self.entries
            .iter()
            .rev()
            .map(|e| &e.serializer)
            .find(|s| s.id() == id)
            .or_else(|| (self.fallback.id() == id).then_some(&self.fallback))
            .ok_or_else(|| CoreError::UnknownSerializer { id: id.to_string() })
    }
}

impl fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerRegistry")
            .field("entries", &self.entries)
            .field("fallback", &self.fallback.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argentdb_codec::{CodecResult, JsonSerializer, Value};

    /// Claims one type and tags its payloads with a fixed id.
    struct Claiming {
        id: &'static str,
        claims: &'static str,
    }

    impl Serializer for Claiming {
        fn id(&self) -> &str {
            self.id
        }

        fn can_serialize(&self, type_name: &TypeName) -> bool {
            type_name == self.claims
        }

        fn serialize(&self, _: &TypeName, _: &Value) -> CodecResult<Vec<u8>> {
            Ok(self.id.as_bytes().to_vec())
        }

        fn deserialize(&self, _: &TypeName, _: &[u8]) -> CodecResult<Value> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn empty_registry_falls_back_to_cbor() {
        let registry = SerializerRegistry::new();
        assert_eq!(registry.select(&"Order".into()).id(), CborSerializer::ID);
        assert_eq!(registry.by_id("cbor").unwrap().id(), "cbor");
    }

    #[test]
    fn later_registration_wins_for_shared_type() {
        let mut registry = SerializerRegistry::new();
        registry.register_instance(Claiming { id: "a", claims: "Order" });
        registry.register_instance(Claiming { id: "b", claims: "Order" });

        assert_eq!(registry.select(&"Order".into()).id(), "b");
        assert_eq!(registry.entries().len(), 2);
    }

    #[test]
    fn unclaimed_type_skips_to_earlier_or_fallback() {
        let mut registry = SerializerRegistry::new();
        registry.register_instance(Claiming { id: "a", claims: "Order" });
        registry.register_instance(Claiming { id: "b", claims: "Invoice" });

        assert_eq!(registry.select(&"Order".into()).id(), "a");
        assert_eq!(registry.select(&"Customer".into()).id(), "cbor");
    }

    #[test]
    fn registering_by_type_instantiates_default() {
        let mut registry = SerializerRegistry::new();
        registry.register::<JsonSerializer>();

        assert_eq!(registry.select(&"Anything".into()).id(), "json");
        assert!(registry.entries()[0].serializer_type.ends_with("JsonSerializer"));
    }

    #[test]
    fn shadowing_builtin_id_prefers_registered() {
        let mut registry = SerializerRegistry::new();
        registry.register_instance(Claiming { id: "cbor", claims: "Order" });

        let chosen = registry.by_id("cbor").unwrap();
        assert!(!chosen.can_serialize(&"Other".into()));
    }

    #[test]
    fn unknown_id_is_error() {
        let registry = SerializerRegistry::new();
        assert!(matches!(
            registry.by_id("msgpack"),
            Err(CoreError::UnknownSerializer { id }) if id == "msgpack"
        ));
    }
}
