//! # ArgentDB Core
//!
//! Engine, instance registry and backup/restore protocol for ArgentDB.
//!
//! This crate provides:
//! - [`Engine`], the coordinator a host constructs and registers instances with
//! - The [`DatabaseInstance`] contract and the built-in [`Store`] instance
//! - The serializer registry and type resolver chain shared by all instances
//! - Versioned, digest-checked backup streams with snapshot isolation
//! - Cancellable background backups and restores ([`OperationTask`])
//!
//! ## Concurrency
//!
//! The instance registry and the codec pipeline each sit behind a
//! `parking_lot::RwLock`. Backup and restore look the instance up under the
//! registry lock and release it before touching the stream. Object stores
//! hand out copy-on-write snapshots, so a backup never observes a write that
//! landed after it started.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backup;
mod config;
mod engine;
mod error;
mod frame;
mod instance;
mod log;
mod pipeline;
mod registry;
mod resolver;
mod serializer;
mod snapshot;
mod store;
mod task;
mod types;

pub use backup::{BackupInfo, BackupReport, RestorePhase, RestoreProgress, RestoreReport};
pub use config::{DefaultDriver, EngineConfig};
pub use engine::Engine;
pub use error::{CoreError, CoreResult};
pub use frame::{TableHeader, MAX_KEY_LEN, MAX_STR_LEN};
pub use instance::{
    DatabaseInstance, InstanceContext, InstanceFactory, InstanceType, RestoreGate, RestoreGuard,
};
pub use log::{LogLevel, LogManager, LogSink};
pub use pipeline::{CodecPipeline, CodecView, EncodedPayload};
pub use registry::DatabaseHandle;
pub use resolver::{PrefixResolver, RenameResolver, TypeResolver, TypeResolverChain};
pub use serializer::{SerializerEntry, SerializerRegistry};
pub use snapshot::{InstanceSnapshot, TableObjects, TableSnapshot};
pub use store::{ObjectStore, Schema, Store};
pub use task::{CancelToken, OperationTask};
pub use types::{Key, KeyKind, KeySchema, StoredObject, TableDefinition};

pub use argentdb_codec::{TypeName, Value};
