//! The engine: registration, lookup, backup and restore.

use crate::backup::{
    inspect, read_restore, write_backup, BackupInfo, BackupReport, RestoreOptions,
    RestoreProgress, RestoreReport, RestoreTarget,
};
use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::instance::{InstanceContext, InstanceFactory, InstanceType, RestoreGuard};
use crate::log::LogManager;
use crate::pipeline::CodecPipeline;
use crate::registry::{validate_instance_name, DatabaseHandle, Registry};
use crate::resolver::TypeResolver;
use crate::snapshot::InstanceSnapshot;
use crate::task::{CancelToken, OperationTask};
use argentdb_codec::Serializer;
use argentdb_storage::Driver;
use std::fmt;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct EngineInner {
    config: EngineConfig,
    registry: Registry,
    pipeline: CodecPipeline,
    log: LogManager,
    closed: AtomicBool,
}

/// Coordinates the database instances of one host.
///
/// An engine owns its instance registry, serializer registry and type
/// resolver chain. Nothing is global: several engines can live in one
/// process without sharing anything. Cloning an engine is cheap and the
/// clones share state.
///
/// # Example
///
/// ```
/// use argentdb_core::{Engine, EngineConfig, KeySchema, Schema, Store, TableDefinition};
///
/// struct Orders;
///
/// impl Schema for Orders {
///     const TYPE_NAME: &'static str = "shop.Orders";
///     fn tables() -> Vec<TableDefinition> {
///         vec![TableDefinition::new("orders", KeySchema::integer("id"), "Order")]
///     }
/// }
///
/// let engine = Engine::new(EngineConfig::default());
/// engine.register_database::<Store<Orders>>("orders", None).unwrap();
///
/// let mut backup = Vec::new();
/// engine.backup::<Store<Orders>, _>(&mut backup).unwrap();
///
/// let fresh = Engine::new(EngineConfig::default());
/// fresh.register_database::<Store<Orders>>("orders", None).unwrap();
/// fresh.restore::<Store<Orders>, _>(backup.as_slice()).unwrap();
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Creates an engine with its own log manager.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self::with_log_manager(config, LogManager::new())
    }

    /// Creates an engine reporting to an existing log manager.
    #[must_use]
    pub fn with_log_manager(config: EngineConfig, log: LogManager) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                registry: Registry::new(),
                pipeline: CodecPipeline::new(),
                log,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// The engine log.
    #[must_use]
    pub fn log_manager(&self) -> &LogManager {
        &self.inner.log
    }

    /// Returns whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.is_closed() {
            return Err(CoreError::EngineClosed);
        }
        Ok(())
    }

    // === Registration and lookup ===

    /// Registers an instance of type `T` under `name`.
    ///
    /// Without a driver the instance gets a fresh driver of the configured
    /// default kind. The driver is handed to the instance and owned by it.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidName`] if `name` is empty, too long or contains
    ///   control characters
    /// - [`CoreError::DuplicateName`] if `name` is taken; the existing
    ///   instance is untouched and no new one is built
    /// - [`CoreError::TypeMismatch`] if a different type with the same
    ///   [`TYPE_NAME`](InstanceFactory::TYPE_NAME) is registered
    /// - any error from constructing the instance
    pub fn register_database<T: InstanceFactory>(
        &self,
        name: &str,
        driver: Option<Box<dyn Driver>>,
    ) -> CoreResult<DatabaseHandle> {
        self.ensure_open()?;
        validate_instance_name(name, self.inner.config.max_name_len)?;
        let driver = driver.unwrap_or_else(|| self.inner.config.default_driver.build());

        let result = self.inner.registry.register::<T, _>(name, driver, |name, driver, gate| {
            InstanceContext {
                name: name.to_string(),
                driver,
                log: self.inner.log.clone(),
                gate,
                pipeline: self.inner.pipeline.clone(),
                persist_on_write: self.inner.config.persist_on_write,
                max_payload_size: self.inner.config.max_payload_size,
            }
        });

        match &result {
            Ok(handle) => self.inner.log.info(format!(
                "Registered database '{name}' as {} on {} driver",
                T::TYPE_NAME,
                handle.driver_name()
            )),
            Err(e) => self
                .inner
                .log
                .warn(format!("Registration of '{name}' failed: {e}")),
        }
        result
    }

    /// Registers an instance of type `T` with a default-constructed `D`.
    ///
    /// # Errors
    ///
    /// Same as [`register_database`](Self::register_database).
    pub fn register_database_with<T, D>(&self, name: &str) -> CoreResult<DatabaseHandle>
    where
        T: InstanceFactory,
        D: Driver + Default + 'static,
    {
        self.register_database::<T>(name, Some(Box::new(D::default())))
    }

    /// Looks up an instance by name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InstanceNotFound`] if no instance has this name.
    pub fn get_database(&self, name: &str) -> CoreResult<DatabaseHandle> {
        self.inner.registry.get(name)
    }

    /// Looks up an instance by name and returns it as a `T`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InstanceNotFound`] or, if the instance is not a
    /// `T`, [`CoreError::TypeMismatch`].
    pub fn get_typed<T: InstanceFactory>(&self, name: &str) -> CoreResult<Arc<T>> {
        self.get_database(name)?.downcast::<T>()
    }

    /// Names of every registered instance, sorted.
    #[must_use]
    pub fn database_names(&self) -> Vec<String> {
        self.inner
            .registry
            .all()
            .iter()
            .map(|h| h.name().to_string())
            .collect()
    }

    /// Every instance registered as `T`, sorted by name.
    #[must_use]
    pub fn instances_of<T: InstanceFactory>(&self) -> Vec<DatabaseHandle> {
        self.inner.registry.of_type(InstanceType::of::<T>())
    }

    // === Serialization pipeline ===

    /// Instantiates `S` and appends it to the serializer registry.
    ///
    /// Later registrations take precedence for the types they claim.
    pub fn register_serializer<S: Serializer + Default + 'static>(&self) {
        self.inner.pipeline.register_serializer::<S>();
        self.inner
            .log
            .verbose(format!("Registered serializer {}", std::any::type_name::<S>()));
    }

    /// Appends a pre-configured serializer.
    pub fn register_serializer_instance<S: Serializer + 'static>(&self, serializer: S) {
        let id = serializer.id().to_string();
        self.inner.pipeline.register_serializer_instance(serializer);
        self.inner
            .log
            .verbose(format!("Registered serializer instance '{id}'"));
    }

    /// Appends a type resolver to the chain.
    pub fn register_type_resolver<R: TypeResolver + 'static>(&self, resolver: R) {
        self.inner.pipeline.register_type_resolver(Arc::new(resolver));
        self.inner.log.verbose("Registered type resolver");
    }

    // === Backup ===

    /// Backs up the only instance registered as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NoInstanceForType`] or [`CoreError::AmbiguousType`]
    /// if there is not exactly one such instance, plus everything
    /// [`backup_instance`](Self::backup_instance) returns.
    pub fn backup<T: InstanceFactory, W: Write>(&self, writer: W) -> CoreResult<BackupReport> {
        self.ensure_open()?;
        let handle = self.inner.registry.unique_of_type(InstanceType::of::<T>())?;
        let snapshot = self.snapshot_for_backup(&handle)?;
        self.run_backup(&handle, &snapshot, writer, None)
    }

    /// Backs up the instance named `name` into `writer`.
    ///
    /// The instance is snapshotted once; writes landing while the stream is
    /// produced do not appear in it. The registry lock is not held while
    /// writing.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InstanceNotFound`] for an unknown name
    /// - [`CoreError::RestoreInProgress`] while the instance is being restored
    /// - stream or serializer errors; bytes already written stay written
    pub fn backup_instance<W: Write>(&self, name: &str, writer: W) -> CoreResult<BackupReport> {
        self.ensure_open()?;
        let handle = self.get_database(name)?;
        let snapshot = self.snapshot_for_backup(&handle)?;
        self.run_backup(&handle, &snapshot, writer, None)
    }

    /// Starts a backup of `name` on its own thread.
    ///
    /// The snapshot is taken before this returns; lookup errors are reported
    /// here rather than by the task.
    ///
    /// # Errors
    ///
    /// Same lookup errors as [`backup_instance`](Self::backup_instance), or
    /// an I/O error if the thread cannot be spawned.
    pub fn spawn_backup<W>(&self, name: &str, writer: W) -> CoreResult<OperationTask<BackupReport>>
    where
        W: Write + Send + 'static,
    {
        self.ensure_open()?;
        let handle = self.get_database(name)?;
        let snapshot = self.snapshot_for_backup(&handle)?;
        let cancel = CancelToken::new();
        let engine = self.clone();
        let token = cancel.clone();
        OperationTask::spawn(format!("argentdb-backup-{name}"), cancel, None, move || {
            engine.run_backup(&handle, &snapshot, writer, Some(token))
        })
    }

    fn snapshot_for_backup(&self, handle: &DatabaseHandle) -> CoreResult<InstanceSnapshot> {
        handle.gate().check()?;
        handle.instance().snapshot()
    }

    fn run_backup<W: Write>(
        &self,
        handle: &DatabaseHandle,
        snapshot: &InstanceSnapshot,
        writer: W,
        cancel: Option<CancelToken>,
    ) -> CoreResult<BackupReport> {
        let log = &self.inner.log;
        log.info(format!(
            "Backing up '{}' ({} tables, {} objects)",
            handle.name(),
            snapshot.tables.len(),
            snapshot.object_count()
        ));
        let view = self.inner.pipeline.view();
        match write_backup(
            writer,
            handle.owner_type(),
            handle.name(),
            snapshot,
            &view,
            self.inner.config.max_payload_size,
            cancel,
        ) {
            Ok(report) => {
                log.info(format!(
                    "Backup of '{}' complete: {} objects, {} bytes",
                    report.instance, report.objects, report.bytes
                ));
                Ok(report)
            }
            Err(e) => {
                log.error(format!("Backup of '{}' failed: {e}", handle.name()));
                Err(e)
            }
        }
    }

    // === Restore ===

    /// Restores the only instance registered as `T` from `reader`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NoInstanceForType`] or [`CoreError::AmbiguousType`]
    /// if there is not exactly one such instance, plus everything
    /// [`restore_instance`](Self::restore_instance) returns.
    pub fn restore<T: InstanceFactory, R: Read>(&self, reader: R) -> CoreResult<RestoreReport> {
        self.ensure_open()?;
        let handle = self.inner.registry.unique_of_type(InstanceType::of::<T>())?;
        let guard = handle.gate().begin()?;
        self.run_restore(&handle, guard, reader, None, &RestoreProgress::new())
    }

    /// Replaces the state of the instance named `name` with the backup read
    /// from `reader`.
    ///
    /// The restore never merges: tables missing from the stream end up
    /// empty. On any error the live instance is left as it was. While the
    /// restore runs, reads and writes on the instance fail with
    /// [`CoreError::RestoreInProgress`].
    ///
    /// # Errors
    ///
    /// - [`CoreError::InstanceNotFound`] for an unknown name
    /// - [`CoreError::RestoreInProgress`] if a restore is already running
    /// - [`CoreError::InvalidFormat`] for a stream that is not a backup or is
    ///   truncated
    /// - [`CoreError::Version`] for an unsupported format version
    /// - [`CoreError::TypeMismatch`] if the stream belongs to another type
    /// - [`CoreError::TypeResolution`] if a type token cannot be resolved
    /// - [`CoreError::ChecksumMismatch`] if the digest does not match
    pub fn restore_instance<R: Read>(&self, name: &str, reader: R) -> CoreResult<RestoreReport> {
        self.ensure_open()?;
        let handle = self.get_database(name)?;
        let guard = handle.gate().begin()?;
        self.run_restore(&handle, guard, reader, None, &RestoreProgress::new())
    }

    /// Starts a restore of `name` on its own thread.
    ///
    /// The instance is marked as restoring before this returns.
    ///
    /// # Errors
    ///
    /// Same lookup errors as [`restore_instance`](Self::restore_instance), or
    /// an I/O error if the thread cannot be spawned.
    pub fn spawn_restore<R>(&self, name: &str, reader: R) -> CoreResult<OperationTask<RestoreReport>>
    where
        R: Read + Send + 'static,
    {
        self.ensure_open()?;
        let handle = self.get_database(name)?;
        let guard = handle.gate().begin()?;
        let cancel = CancelToken::new();
        let progress = RestoreProgress::new();
        let engine = self.clone();
        let token = cancel.clone();
        let task_progress = progress.clone();
        OperationTask::spawn(
            format!("argentdb-restore-{name}"),
            cancel,
            Some(progress),
            move || engine.run_restore(&handle, guard, reader, Some(token), &task_progress),
        )
    }

    fn run_restore<R: Read>(
        &self,
        handle: &DatabaseHandle,
        _guard: RestoreGuard,
        reader: R,
        cancel: Option<CancelToken>,
        progress: &RestoreProgress,
    ) -> CoreResult<RestoreReport> {
        let log = &self.inner.log;
        log.info(format!("Restoring '{}'", handle.name()));
        let target = RestoreTarget {
            owner: handle.owner_type(),
            name: handle.name(),
            instance: handle.instance().as_ref(),
        };
        let options = RestoreOptions {
            max_payload_size: self.inner.config.max_payload_size,
            verify_digest: self.inner.config.verify_digest,
        };
        let view = self.inner.pipeline.view();
        let report = read_restore(reader, &target, &view, options, cancel, progress, log)?;
        log.info(format!(
            "Restore of '{}' complete: {} tables, {} objects",
            report.instance, report.tables, report.objects
        ));
        Ok(report)
    }

    /// Reads a backup stream's headers and checks its digest without
    /// restoring anything.
    ///
    /// # Errors
    ///
    /// Returns format, version or I/O errors; a digest mismatch is reported
    /// in [`BackupInfo::digest_valid`] instead.
    pub fn inspect_backup<R: Read>(&self, reader: R) -> CoreResult<BackupInfo> {
        inspect(reader, self.inner.config.max_payload_size)
    }

    // === Lifecycle ===

    /// Flushes every instance to its driver.
    ///
    /// # Errors
    ///
    /// Returns the first flush error; remaining instances are still flushed.
    pub fn flush_all(&self) -> CoreResult<()> {
        let mut first_error = None;
        for handle in self.inner.registry.all() {
            if let Err(e) = handle.instance().flush() {
                self.inner
                    .log
                    .error(format!("Flush of '{}' failed: {e}", handle.name()));
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Closes every instance and rejects further registrations, backups and
    /// restores. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the first close error; remaining instances are still closed.
    pub fn close(&self) -> CoreResult<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut first_error = None;
        for handle in self.inner.registry.all() {
            if let Err(e) = handle.instance().close() {
                self.inner
                    .log
                    .error(format!("Close of '{}' failed: {e}", handle.name()));
                first_error.get_or_insert(e);
            }
        }
        self.inner.log.info("Engine closed");
        first_error.map_or(Ok(()), Err)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("databases", &self.inner.registry.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Schema, Store};
    use crate::types::{Key, KeySchema, TableDefinition};
    use argentdb_storage::InMemoryDriver;

    struct Orders;

    impl Schema for Orders {
        const TYPE_NAME: &'static str = "test.Orders";

        fn tables() -> Vec<TableDefinition> {
            vec![TableDefinition::new("orders", KeySchema::integer("id"), "Order")]
        }
    }

    #[test]
    fn register_and_get_share_binding() {
        let engine = Engine::default();
        let handle = engine.register_database::<Store<Orders>>("orders", None).unwrap();
        let found = engine.get_database("orders").unwrap();
        assert!(DatabaseHandle::ptr_eq(&handle, &found));
        assert_eq!(engine.database_names(), vec!["orders".to_string()]);
    }

    #[test]
    fn register_with_driver_type() {
        let engine = Engine::default();
        let handle = engine
            .register_database_with::<Store<Orders>, InMemoryDriver>("orders")
            .unwrap();
        assert_eq!(handle.driver_name(), "memory");
    }

    #[test]
    fn invalid_names_are_rejected_before_construction() {
        let engine = Engine::default();
        assert!(matches!(
            engine.register_database::<Store<Orders>>("", None),
            Err(CoreError::InvalidName { .. })
        ));
        assert!(engine.database_names().is_empty());
    }

    #[test]
    fn restore_gate_blocks_backup_and_second_restore() {
        let engine = Engine::default();
        let handle = engine.register_database::<Store<Orders>>("orders", None).unwrap();
        let _guard = handle.gate().begin().unwrap();

        assert!(matches!(
            engine.backup_instance("orders", Vec::new()),
            Err(CoreError::RestoreInProgress { .. })
        ));
        assert!(matches!(
            engine.restore_instance("orders", &b""[..]),
            Err(CoreError::RestoreInProgress { .. })
        ));
        assert!(handle.is_restoring());
    }

    #[test]
    fn closed_engine_rejects_operations() {
        let engine = Engine::default();
        let store = {
            engine.register_database::<Store<Orders>>("orders", None).unwrap();
            engine.get_typed::<Store<Orders>>("orders").unwrap()
        };
        store.put_serde("orders", 1, "Order", &"x").unwrap();

        engine.close().unwrap();
        engine.close().unwrap();
        assert!(engine.is_closed());
        assert!(matches!(
            engine.register_database::<Store<Orders>>("other", None),
            Err(CoreError::EngineClosed)
        ));
        assert!(matches!(
            engine.backup_instance("orders", Vec::new()),
            Err(CoreError::EngineClosed)
        ));
        assert!(engine.get_database("orders").is_ok());
        let order = store.get("orders", &Key::from(1)).unwrap();
        assert_eq!(order.map(|o| o.key), Some(Key::from(1)));
    }

    #[test]
    fn failed_restore_reports_phase() {
        let engine = Engine::default();
        engine.register_database::<Store<Orders>>("orders", None).unwrap();
        let task = engine
            .spawn_restore("orders", std::io::Cursor::new(b"ARGB\x09\x00".to_vec()))
            .unwrap();
        let phase_seen = loop {
            if task.is_finished() {
                break task.restore_phase();
            }
            std::thread::yield_now();
        };
        assert!(matches!(task.join(), Err(CoreError::Version { found: 9, .. })));
        assert!(matches!(phase_seen, Some(crate::backup::RestorePhase::Failed(_))));
    }
}
