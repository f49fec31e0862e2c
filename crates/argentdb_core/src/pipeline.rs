//! The shared serialization pipeline.
//!
//! One [`CodecPipeline`] per engine holds the serializer registry and the
//! type resolver chain behind a single lock. Operations that encode or
//! decode take a [`CodecView`] first: a copy of both lists taken under the
//! read lock, so a registration that lands mid-operation never changes
//! which serializer or resolver applies to the rest of it.

use crate::error::CoreResult;
use crate::resolver::{TypeResolver, TypeResolverChain};
use crate::serializer::SerializerRegistry;
use crate::types::{StoredObject, TableDefinition};
use argentdb_codec::{Serializer, TypeName, Value};
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Default)]
struct PipelineState {
    serializers: SerializerRegistry,
    resolvers: TypeResolverChain,
}

/// Lock-guarded serializer registry and resolver chain.
///
/// Cloning shares the pipeline.
#[derive(Debug, Clone, Default)]
pub struct CodecPipeline {
    state: Arc<RwLock<PipelineState>>,
}

impl CodecPipeline {
    /// Creates a pipeline with no registrations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Instantiates and appends a serializer.
    pub fn register_serializer<S: Serializer + Default + 'static>(&self) {
        self.state.write().serializers.register::<S>();
    }

    /// Appends a pre-configured serializer.
    pub fn register_serializer_instance<S: Serializer + 'static>(&self, serializer: S) {
        self.state.write().serializers.register_instance(serializer);
    }

    /// Appends a type resolver.
    pub fn register_type_resolver(&self, resolver: Arc<dyn TypeResolver>) {
        self.state.write().resolvers.push(resolver);
    }

    /// Takes a stable view of the current registrations.
    #[must_use]
    pub fn view(&self) -> CodecView {
        let state = self.state.read();
        CodecView {
            serializers: state.serializers.clone(),
            resolvers: state.resolvers.clone(),
        }
    }
}

/// A point-in-time copy of the pipeline registrations.
#[derive(Debug, Clone, Default)]
pub struct CodecView {
    serializers: SerializerRegistry,
    resolvers: TypeResolverChain,
}

/// An encoded object payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    /// Id of the serializer that produced `bytes`.
    pub serializer_id: String,
    /// The payload.
    pub bytes: Vec<u8>,
}

impl CodecView {
    /// Returns the serializer registry of this view.
    #[must_use]
    pub fn serializers(&self) -> &SerializerRegistry {
        &self.serializers
    }

    /// Returns the resolver chain of this view.
    #[must_use]
    pub fn resolvers(&self) -> &TypeResolverChain {
        &self.resolvers
    }

    /// Encodes one object with the serializer selected for its type.
    ///
    /// # Errors
    ///
    /// Returns an error if the selected serializer fails.
    pub fn encode(&self, object: &StoredObject) -> CoreResult<EncodedPayload> {
        let serializer = self.serializers.select(&object.type_name);
        let bytes = serializer.serialize(&object.type_name, &object.value)?;
        Ok(EncodedPayload {
            serializer_id: serializer.id().to_string(),
            bytes,
        })
    }

    /// Decodes one payload into `table`.
    ///
    /// The stored `token` is resolved first, then the payload is handed to
    /// the serializer registered under `serializer_id` together with the
    /// resolved type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeResolution`](crate::CoreError::TypeResolution)
    /// if the token cannot be resolved,
    /// [`CoreError::UnknownSerializer`](crate::CoreError::UnknownSerializer) if no serializer has the id, or a
    /// codec error if the payload is malformed.
    pub fn decode(
        &self,
        table: &TableDefinition,
        token: &str,
        serializer_id: &str,
        payload: &[u8],
    ) -> CoreResult<(TypeName, Value)> {
        let type_name = self.resolvers.resolve_for(token, table)?;
        let serializer = self.serializers.by_id(serializer_id)?;
        let value = serializer.deserialize(&type_name, payload)?;
        Ok((type_name, value))
    }
}
