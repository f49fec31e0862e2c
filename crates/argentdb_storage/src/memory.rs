//! In-memory storage driver.

use crate::driver::{validate_table_name, Driver};
use crate::error::{DriverError, DriverResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory storage driver.
///
/// This driver keeps every table blob in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral instances that don't need persistence
///
/// It is the driver the engine binds when registration omits one.
///
/// # Example
///
/// ```rust
/// use argentdb_storage::{Driver, InMemoryDriver};
///
/// let mut driver = InMemoryDriver::new();
/// driver.open("scratch").unwrap();
/// driver.write_table("t", b"data").unwrap();
/// assert_eq!(driver.list_tables().unwrap(), vec!["t".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryDriver {
    instance: Option<String>,
    tables: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryDriver {
    /// Creates a new empty in-memory driver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a driver with pre-existing table blobs.
    ///
    /// Useful for simulating a reopen of previously persisted data.
    #[must_use]
    pub fn with_tables(tables: BTreeMap<String, Vec<u8>>) -> Self {
        Self {
            instance: None,
            tables: RwLock::new(tables),
        }
    }

    /// Returns a copy of all stored table blobs.
    #[must_use]
    pub fn tables(&self) -> BTreeMap<String, Vec<u8>> {
        self.tables.read().clone()
    }

    /// Returns the instance this driver is open for.
    #[must_use]
    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.instance.is_some() {
            Ok(())
        } else {
            Err(DriverError::NotOpen)
        }
    }
}

impl Driver for InMemoryDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn open(&mut self, instance: &str) -> DriverResult<()> {
        if let Some(current) = &self.instance {
            return Err(DriverError::AlreadyOpen {
                instance: current.clone(),
            });
        }
        self.instance = Some(instance.to_string());
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.instance.is_some()
    }

    fn read_table(&self, table: &str) -> DriverResult<Option<Vec<u8>>> {
        self.ensure_open()?;
        Ok(self.tables.read().get(table).cloned())
    }

    fn write_table(&mut self, table: &str, data: &[u8]) -> DriverResult<()> {
        self.ensure_open()?;
        validate_table_name(table)?;
        self.tables.write().insert(table.to_string(), data.to_vec());
        Ok(())
    }

    fn remove_table(&mut self, table: &str) -> DriverResult<()> {
        self.ensure_open()?;
        self.tables.write().remove(table);
        Ok(())
    }

    fn list_tables(&self) -> DriverResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self.tables.read().keys().cloned().collect())
    }

    fn flush(&mut self) -> DriverResult<()> {
        // Nothing is buffered
        Ok(())
    }

    fn close(&mut self) -> DriverResult<()> {
        self.instance = None;
        Ok(())
    }
}
