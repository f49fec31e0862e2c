//! The database instance contract.
//!
//! An instance is a named persistence unit owning one driver and a fixed set
//! of tables. The engine only sees it through [`DatabaseInstance`]: it can
//! list and snapshot tables, load them, and swap in a restored state.
//! Everything else (how objects are indexed, queried or mutated) belongs to
//! the implementation.

use crate::error::{CoreError, CoreResult};
use crate::log::LogManager;
use crate::pipeline::CodecPipeline;
use crate::snapshot::{InstanceSnapshot, TableObjects, TableSnapshot};
use crate::types::TableDefinition;
use argentdb_storage::Driver;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Structural descriptor of an instance type.
///
/// Two descriptors are equal only if they describe the same Rust type.
/// `name` is the owner-type id written into backup streams.
#[derive(Debug, Clone, Copy)]
pub struct InstanceType {
    name: &'static str,
    id: TypeId,
}

impl InstanceType {
    /// Describes `T`.
    #[must_use]
    pub fn of<T: InstanceFactory>() -> Self {
        Self {
            name: T::TYPE_NAME,
            id: TypeId::of::<T>(),
        }
    }

    /// Stable owner-type id.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Rust type identity.
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.id
    }

    /// Returns whether this descriptor describes `T`.
    #[must_use]
    pub fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for InstanceType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for InstanceType {}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// What the engine can do with a registered instance.
pub trait DatabaseInstance: Send + Sync + 'static {
    /// Definitions of every table, in a fixed order.
    fn list_tables(&self) -> Vec<TableDefinition>;

    /// Takes a consistent snapshot of every table at once.
    fn snapshot(&self) -> CoreResult<InstanceSnapshot>;

    /// Takes a snapshot of one table.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TableNotFound`] for an unknown table.
    fn snapshot_table(&self, table: &str) -> CoreResult<TableSnapshot>;

    /// Replaces the contents of one table.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TableNotFound`] for an unknown table.
    fn load_table(&self, table: &str, objects: TableObjects) -> CoreResult<()>;

    /// Empties every table.
    fn clear(&self) -> CoreResult<()>;

    /// Replaces the whole instance state with `snapshot`.
    ///
    /// Tables missing from `snapshot` end up empty. Implementations should
    /// make the swap atomic with respect to readers; the default clears and
    /// then loads table by table.
    ///
    /// An error may leave the instance holding part or all of `snapshot`.
    fn replace(&self, snapshot: InstanceSnapshot) -> CoreResult<()> {
        self.clear()?;
        for table in snapshot.tables {
            let objects = Arc::try_unwrap(table.objects).unwrap_or_else(|shared| (*shared).clone());
            self.load_table(&table.definition.name, objects)?;
        }
        Ok(())
    }

    /// Makes every table durable in the driver.
    fn flush(&self) -> CoreResult<()>;

    /// Flushes and releases the driver.
    fn close(&self) -> CoreResult<()>;
}

/// Constructs instances of a concrete type for the engine.
pub trait InstanceFactory: DatabaseInstance + Sized {
    /// Stable owner-type id, written into backup streams.
    const TYPE_NAME: &'static str;

    /// Builds the instance around `ctx`, opening its driver.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver cannot be opened or persisted tables
    /// cannot be loaded.
    fn create(ctx: InstanceContext) -> CoreResult<Self>;
}

/// Marks an instance as being restored.
///
/// Cloning shares the flag. While a [`RestoreGuard`] is alive, [`check`]
/// fails with [`CoreError::RestoreInProgress`].
///
/// [`check`]: RestoreGate::check
#[derive(Debug, Clone)]
pub struct RestoreGate {
    instance: Arc<str>,
    active: Arc<AtomicBool>,
}

impl RestoreGate {
    /// Creates an open gate for `instance`.
    #[must_use]
    pub fn new(instance: &str) -> Self {
        Self {
            instance: Arc::from(instance),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Fails if a restore is running.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RestoreInProgress`] while the gate is closed.
    pub fn check(&self) -> CoreResult<()> {
        if self.active.load(Ordering::Acquire) {
            return Err(self.in_progress());
        }
        Ok(())
    }

    /// Returns whether a restore is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Closes the gate until the returned guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RestoreInProgress`] if the gate is already closed.
    pub fn begin(&self) -> CoreResult<RestoreGuard> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| self.in_progress())?;
        Ok(RestoreGuard { gate: self.clone() })
    }

    fn in_progress(&self) -> CoreError {
        CoreError::RestoreInProgress {
            instance: self.instance.to_string(),
        }
    }
}

/// Keeps a [`RestoreGate`] closed.
#[derive(Debug)]
pub struct RestoreGuard {
    gate: RestoreGate,
}

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        self.gate.active.store(false, Ordering::Release);
    }
}

/// Everything an instance receives from the engine at construction.
pub struct InstanceContext {
    /// The instance name.
    pub name: String,
    /// The driver the instance owns exclusively. Not yet opened.
    pub driver: Box<dyn Driver>,
    /// Engine log.
    pub log: LogManager,
    /// Gate closed while the engine restores this instance.
    pub gate: RestoreGate,
    /// Engine codec pipeline, for encoding persisted tables.
    pub pipeline: CodecPipeline,
    /// Whether to write tables through to the driver on every mutation.
    pub persist_on_write: bool,
    /// Largest payload accepted when loading persisted tables.
    pub max_payload_size: u32,
}

impl fmt::Debug for InstanceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceContext")
            .field("name", &self.name)
            .field("driver", &self.driver.name())
            .field("persist_on_write", &self.persist_on_write)
            .finish_non_exhaustive()
    }
}

/// Type-erased instance kept by the registry alongside the trait object.
pub(crate) type AnyInstance = Arc<dyn Any + Send + Sync>;
