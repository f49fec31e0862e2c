//! Storage driver trait definition.

use crate::error::{DriverError, DriverResult};

/// Maximum length of a table or instance name accepted by drivers.
pub(crate) const MAX_NAME_LEN: usize = 128;

/// A pluggable storage backend for one database instance.
///
/// Drivers are **table-granular blob stores**. The owning instance hands
/// each table over as an encoded blob and gets the same bytes back on the
/// next open. Drivers do not interpret the blobs.
///
/// # Lifecycle
///
/// `open` binds the driver to an instance name and must be called before
/// any table operation. `close` releases whatever the driver holds for the
/// instance (file locks, handles). A closed driver rejects table operations
/// with [`DriverError::NotOpen`].
///
/// # Invariants
///
/// - `read_table` returns exactly the bytes of the last successful `write_table`
/// - `write_table` replaces the whole table atomically
/// - after `flush` returns, every written table survives process termination
///   (for drivers that are durable at all)
pub trait Driver: Send + Sync {
    /// Short, stable name of the driver kind (used in logs).
    fn name(&self) -> &'static str;

    /// Binds the driver to `instance` and prepares its storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver is already open, the name is invalid,
    /// or the storage cannot be prepared.
    fn open(&mut self, instance: &str) -> DriverResult<()>;

    /// Returns whether the driver is currently open.
    fn is_open(&self) -> bool;

    /// Reads the stored blob of `table`, or `None` if it was never written.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver is not open or an I/O error occurs.
    fn read_table(&self, table: &str) -> DriverResult<Option<Vec<u8>>>;

    /// Replaces the stored blob of `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver is not open or an I/O error occurs.
    fn write_table(&mut self, table: &str, data: &[u8]) -> DriverResult<()>;

    /// Removes `table`. Removing a missing table is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver is not open or an I/O error occurs.
    fn remove_table(&mut self, table: &str) -> DriverResult<()>;

    /// Lists the names of all stored tables, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver is not open or an I/O error occurs.
    fn list_tables(&self) -> DriverResult<Vec<String>>;

    /// Makes every written table durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> DriverResult<()>;

    /// Flushes and releases the instance storage.
    ///
    /// Closing an unopened driver is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    fn close(&mut self) -> DriverResult<()>;
}

/// Checks that `name` is usable as a table or instance storage key.
///
/// Accepted names are 1..=128 bytes of ASCII alphanumerics, `_`, `-` and `.`,
/// and never start with `.`. Every driver applies the same rule so a table
/// that can be stored in memory can also be stored on disk.
///
/// # Errors
///
/// Returns [`DriverError::InvalidName`] describing the first violation.
pub fn validate_table_name(name: &str) -> DriverResult<()> {
    let reason = if name.is_empty() {
        Some("name is empty")
    } else if name.len() > MAX_NAME_LEN {
        Some("name is longer than 128 bytes")
    } else if name.starts_with('.') {
        Some("name starts with '.'")
    } else if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
    {
        Some("name contains characters other than [A-Za-z0-9_.-]")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(DriverError::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
