//! Built-in object store instance.
//!
//! [`ObjectStore`] keeps every table as a copy-on-write map shared through
//! an `Arc`. Writers go through `Arc::make_mut`, so a snapshot taken before a
//! write keeps seeing the old map and nothing is copied until a write
//! actually overlaps a live snapshot.
//!
//! Tables are persisted to the driver as whole blobs, either on every write
//! or on [`flush`](DatabaseInstance::flush), depending on
//! [`EngineConfig::persist_on_write`](crate::EngineConfig::persist_on_write).
//!
//! ## Usage
//!
//! ```
//! use argentdb_core::{Engine, EngineConfig, KeySchema, Schema, Store, TableDefinition};
//!
//! struct Orders;
//!
//! impl Schema for Orders {
//!     const TYPE_NAME: &'static str = "shop.Orders";
//!     fn tables() -> Vec<TableDefinition> {
//!         vec![TableDefinition::new("orders", KeySchema::integer("id"), "Order")]
//!     }
//! }
//!
//! let engine = Engine::new(EngineConfig::default());
//! engine.register_database::<Store<Orders>>("orders", None).unwrap();
//! let store = engine.get_typed::<Store<Orders>>("orders").unwrap();
//! store.put_serde("orders", 1, "Order", &"first order").unwrap();
//! assert_eq!(store.count("orders").unwrap(), 1);
//! ```

use crate::error::{CoreError, CoreResult};
use crate::frame::{check_len, decode_table, encode_table, MAX_KEY_LEN, MAX_STR_LEN};
use crate::instance::{DatabaseInstance, InstanceContext, InstanceFactory, RestoreGate};
use crate::log::LogManager;
use crate::pipeline::CodecPipeline;
use crate::snapshot::{InstanceSnapshot, TableObjects, TableSnapshot};
use crate::types::{Key, StoredObject, TableDefinition};
use argentdb_codec::{from_value, to_value, TypeName};
use argentdb_storage::{validate_table_name, Driver};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// The table layout of a [`Store`].
pub trait Schema: Send + Sync + 'static {
    /// Stable owner-type id of stores with this schema.
    const TYPE_NAME: &'static str;

    /// The tables of the store.
    fn tables() -> Vec<TableDefinition>;
}

struct Table {
    definition: TableDefinition,
    objects: Arc<TableObjects>,
    dirty: AtomicBool,
}

impl Table {
    fn new(definition: TableDefinition, objects: TableObjects) -> Self {
        Self {
            definition,
            objects: Arc::new(objects),
            dirty: AtomicBool::new(false),
        }
    }

    fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            definition: self.definition.clone(),
            objects: Arc::clone(&self.objects),
        }
    }
}

/// A keyed object store over a fixed set of tables.
pub struct ObjectStore {
    name: String,
    index: HashMap<String, usize>,
    tables: RwLock<Vec<Table>>,
    driver: Mutex<Box<dyn Driver>>,
    pipeline: CodecPipeline,
    gate: RestoreGate,
    log: LogManager,
    persist_on_write: bool,
    max_payload_size: u32,
}

impl ObjectStore {
    /// Opens the driver and loads every persisted table of `definitions`.
    ///
    /// # Errors
    ///
    /// Returns an error if a table name is invalid or duplicated, the driver
    /// cannot be opened, or a persisted table cannot be decoded.
    pub fn open(ctx: InstanceContext, definitions: Vec<TableDefinition>) -> CoreResult<Self> {
        let InstanceContext {
            name,
            mut driver,
            log,
            gate,
            pipeline,
            persist_on_write,
            max_payload_size,
        } = ctx;

        let mut index = HashMap::with_capacity(definitions.len());
        for (i, def) in definitions.iter().enumerate() {
            validate_table_name(&def.name)?;
            if index.insert(def.name.clone(), i).is_some() {
                return Err(CoreError::invalid_operation(format!(
                    "table '{}' is defined twice",
                    def.name
                )));
            }
        }

        driver.open(&name)?;
        let view = pipeline.view();
        let mut tables = Vec::with_capacity(definitions.len());
        for def in definitions {
            let objects = match driver.read_table(&def.name)? {
                Some(blob) => decode_table(&def, &blob, &view, max_payload_size)?,
                None => TableObjects::new(),
            };
            debug!(instance = %name, table = %def.name, objects = objects.len(), "loaded table");
            tables.push(Table::new(def, objects));
        }
        log.verbose(format!(
            "Opened '{name}' on {} driver with {} tables",
            driver.name(),
            tables.len()
        ));

        Ok(Self {
            name,
            index,
            tables: RwLock::new(tables),
            driver: Mutex::new(driver),
            pipeline,
            gate,
            log,
            persist_on_write,
            max_payload_size,
        })
    }

    /// The instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn position(&self, table: &str) -> CoreResult<usize> {
        self.index
            .get(table)
            .copied()
            .ok_or_else(|| CoreError::table_not_found(table))
    }

    fn read<T>(&self, table: &str, f: impl FnOnce(&TableObjects) -> T) -> CoreResult<T> {
        self.gate.check()?;
        let pos = self.position(table)?;
        let tables = self.tables.read();
        Ok(f(&tables[pos].objects))
    }

    fn write<T>(&self, table: &str, f: impl FnOnce(&mut TableObjects) -> T) -> CoreResult<T> {
        self.gate.check()?;
        let pos = self.position(table)?;
        let out = {
            let mut tables = self.tables.write();
            let entry = &mut tables[pos];
            let out = f(Arc::make_mut(&mut entry.objects));
            entry.dirty.store(true, Ordering::Release);
            out
        };
        if self.persist_on_write {
            self.persist(&[pos])?;
        }
        Ok(out)
    }

    /// Writes the given tables through to the driver if they are dirty.
    fn persist(&self, positions: &[usize]) -> CoreResult<()> {
        let mut driver = self.driver.lock();
        let view = self.pipeline.view();
        for &pos in positions {
            let snapshot = {
                let tables = self.tables.read();
                let table = &tables[pos];
                if !table.dirty.swap(false, Ordering::AcqRel) {
                    continue;
                }
                table.snapshot()
            };
            let blob = match encode_table(&snapshot, &view, self.max_payload_size) {
                Ok(blob) => blob,
                Err(e) => {
                    self.mark_dirty(pos);
                    return Err(e);
                }
            };
            if let Err(e) = driver.write_table(snapshot.name(), &blob) {
                self.mark_dirty(pos);
                return Err(e.into());
            }
        }
        Ok(())
    }

    fn mark_dirty(&self, pos: usize) {
        self.tables.read()[pos].dirty.store(true, Ordering::Release);
    }

    fn persist_all(&self) -> CoreResult<()> {
        let all: Vec<usize> = (0..self.index.len()).collect();
        self.persist(&all)
    }

    /// Inserts or replaces an object, returning the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::KeyMismatch`] if the key kind does not match the
    /// table, [`CoreError::TypeMismatch`] if the table does not accept the
    /// object type, [`CoreError::InvalidOperation`] if the key, the type token
    /// or the encoded payload is too large to be framed, or
    /// [`CoreError::RestoreInProgress`] during a restore.
    pub fn put(&self, table: &str, object: StoredObject) -> CoreResult<Option<StoredObject>> {
        let def = self.definition(table)?;
        if object.key.kind() != def.key.kind {
            return Err(CoreError::KeyMismatch {
                table: def.name,
                expected: def.key.kind.to_string(),
                actual: object.key.kind().to_string(),
            });
        }
        if !def.accepts(object.type_name.as_str()) {
            return Err(CoreError::type_mismatch(
                def.declared_type.as_str(),
                object.type_name.as_str(),
            ));
        }
        self.check_framed_size(&object)?;
        self.write(table, |objects| objects.insert(object.key.clone(), object))
    }

    /// Rejects objects that could be stored but never read back from a
    /// driver blob or backup stream.
    fn check_framed_size(&self, object: &StoredObject) -> CoreResult<()> {
        check_len(object.key.to_bytes().len(), MAX_KEY_LEN, "key")?;
        check_len(object.type_name.as_str().len(), MAX_STR_LEN, "type token")?;
        let encoded = self.pipeline.view().encode(object)?;
        check_len(encoded.bytes.len(), self.max_payload_size, "payload")?;
        Ok(())
    }

    /// Serializes `value` with serde and stores it under `key`.
    ///
    /// # Errors
    ///
    /// Same as [`put`](Self::put), plus a codec error if `value` cannot be
    /// converted.
    pub fn put_serde<T: Serialize + ?Sized>(
        &self,
        table: &str,
        key: impl Into<Key>,
        type_name: impl Into<TypeName>,
        value: &T,
    ) -> CoreResult<Option<StoredObject>> {
        let value = to_value(value)?;
        self.put(table, StoredObject::new(key, type_name, value))
    }

    /// Looks up one object.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TableNotFound`] or [`CoreError::RestoreInProgress`].
    pub fn get(&self, table: &str, key: &Key) -> CoreResult<Option<StoredObject>> {
        self.read(table, |objects| objects.get(key).cloned())
    }

    /// Looks up one object and converts it with serde.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get), plus a codec error if the stored value
    /// does not have the shape of `T`.
    pub fn get_as<T: DeserializeOwned>(&self, table: &str, key: &Key) -> CoreResult<Option<T>> {
        self.get(table, key)?
            .map(|object| from_value(&object.value).map_err(CoreError::from))
            .transpose()
    }

    /// Removes one object, returning it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TableNotFound`] or [`CoreError::RestoreInProgress`].
    pub fn delete(&self, table: &str, key: &Key) -> CoreResult<Option<StoredObject>> {
        if self.read(table, |objects| !objects.contains_key(key))? {
            return Ok(None);
        }
        self.write(table, |objects| objects.remove(key))
    }

    /// Number of objects in `table`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TableNotFound`] or [`CoreError::RestoreInProgress`].
    pub fn count(&self, table: &str) -> CoreResult<usize> {
        self.read(table, TableObjects::len)
    }

    /// Keys of `table`, in order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TableNotFound`] or [`CoreError::RestoreInProgress`].
    pub fn keys(&self, table: &str) -> CoreResult<Vec<Key>> {
        self.read(table, |objects| objects.keys().cloned().collect())
    }

    /// Objects of `table`, in key order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TableNotFound`] or [`CoreError::RestoreInProgress`].
    pub fn scan(&self, table: &str) -> CoreResult<Vec<StoredObject>> {
        self.read(table, |objects| objects.values().cloned().collect())
    }

    /// Definition of `table`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TableNotFound`] for an unknown table.
    pub fn definition(&self, table: &str) -> CoreResult<TableDefinition> {
        let pos = self.position(table)?;
        Ok(self.tables.read()[pos].definition.clone())
    }
}

impl DatabaseInstance for ObjectStore {
    fn list_tables(&self) -> Vec<TableDefinition> {
        self.tables
            .read()
            .iter()
            .map(|t| t.definition.clone())
            .collect()
    }

    fn snapshot(&self) -> CoreResult<InstanceSnapshot> {
        let tables = self.tables.read();
        Ok(InstanceSnapshot::new(
            tables.iter().map(Table::snapshot).collect(),
        ))
    }

    fn snapshot_table(&self, table: &str) -> CoreResult<TableSnapshot> {
        let pos = self.position(table)?;
        Ok(self.tables.read()[pos].snapshot())
    }

    fn load_table(&self, table: &str, objects: TableObjects) -> CoreResult<()> {
        let pos = self.position(table)?;
        {
            let mut tables = self.tables.write();
            tables[pos].objects = Arc::new(objects);
            tables[pos].dirty.store(true, Ordering::Release);
        }
        if self.persist_on_write {
            self.persist(&[pos])?;
        }
        Ok(())
    }

    fn clear(&self) -> CoreResult<()> {
        {
            let mut tables = self.tables.write();
            for table in tables.iter_mut() {
                table.objects = Arc::new(TableObjects::new());
                table.dirty.store(true, Ordering::Release);
            }
        }
        if self.persist_on_write {
            self.persist_all()?;
        }
        Ok(())
    }

    /// Swaps every table in memory, then writes through if configured. A
    /// failed write-through keeps the new state and leaves its tables dirty
    /// for the next flush.
    fn replace(&self, snapshot: InstanceSnapshot) -> CoreResult<()> {
        let mut incoming: HashMap<String, Arc<TableObjects>> = snapshot
            .tables
            .into_iter()
            .map(|t| (t.definition.name, t.objects))
            .collect();
        {
            let mut tables = self.tables.write();
            for table in tables.iter_mut() {
                table.objects = incoming
                    .remove(&table.definition.name)
                    .unwrap_or_default();
                table.dirty.store(true, Ordering::Release);
            }
        }
        for name in incoming.keys() {
            self.log
                .warn(format!("Ignoring unknown table '{name}' while replacing '{}'", self.name));
        }
        if self.persist_on_write {
            self.persist_all()?;
        }
        Ok(())
    }

    fn flush(&self) -> CoreResult<()> {
        self.persist_all()?;
        self.driver.lock().flush()?;
        Ok(())
    }

    fn close(&self) -> CoreResult<()> {
        self.persist_all()?;
        self.driver.lock().close()?;
        debug!(instance = %self.name, "closed");
        Ok(())
    }
}

/// An [`ObjectStore`] whose tables are fixed by a [`Schema`].
///
/// This is the usual instance type registered with an engine. It
/// dereferences to the underlying [`ObjectStore`].
pub struct Store<S: Schema> {
    inner: ObjectStore,
    _schema: PhantomData<fn() -> S>,
}

impl<S: Schema> Store<S> {
    /// The underlying store.
    #[must_use]
    pub fn inner(&self) -> &ObjectStore {
        &self.inner
    }
}

impl<S: Schema> Deref for Store<S> {
    type Target = ObjectStore;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<S: Schema> DatabaseInstance for Store<S> {
    fn list_tables(&self) -> Vec<TableDefinition> {
        self.inner.list_tables()
    }

    fn snapshot(&self) -> CoreResult<InstanceSnapshot> {
        self.inner.snapshot()
    }

    fn snapshot_table(&self, table: &str) -> CoreResult<TableSnapshot> {
        self.inner.snapshot_table(table)
    }

    fn load_table(&self, table: &str, objects: TableObjects) -> CoreResult<()> {
        self.inner.load_table(table, objects)
    }

    fn clear(&self) -> CoreResult<()> {
        self.inner.clear()
    }

    fn replace(&self, snapshot: InstanceSnapshot) -> CoreResult<()> {
        self.inner.replace(snapshot)
    }

    fn flush(&self) -> CoreResult<()> {
        self.inner.flush()
    }

    fn close(&self) -> CoreResult<()> {
        self.inner.close()
    }
}

impl<S: Schema> InstanceFactory for Store<S> {
    const TYPE_NAME: &'static str = S::TYPE_NAME;

    fn create(ctx: InstanceContext) -> CoreResult<Self> {
        Ok(Self {
            inner: ObjectStore::open(ctx, S::tables())?,
            _schema: PhantomData,
        })
    }
}
