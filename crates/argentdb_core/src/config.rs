//! Engine configuration.

use argentdb_storage::{Driver, FileDriver, InMemoryDriver};
use std::path::PathBuf;

/// Driver bound to instances registered without an explicit one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DefaultDriver {
    /// Ephemeral in-memory storage.
    #[default]
    InMemory,
    /// One directory per instance under `root`.
    File {
        /// Root directory shared by all instances.
        root: PathBuf,
    },
}

impl DefaultDriver {
    /// Builds a fresh, unopened driver of this kind.
    #[must_use]
    pub fn build(&self) -> Box<dyn Driver> {
        match self {
            Self::InMemory => Box::new(InMemoryDriver::new()),
            Self::File { root } => Box::new(FileDriver::new(root)),
        }
    }
}

/// Configuration for an [`Engine`](crate::Engine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Driver used when registration does not supply one.
    pub default_driver: DefaultDriver,

    /// Whether object stores write a table through to their driver on every
    /// mutation. When false, tables reach the driver on `flush`.
    pub persist_on_write: bool,

    /// Maximum instance name length in bytes.
    pub max_name_len: usize,

    /// Largest single object payload accepted while reading a stream.
    pub max_payload_size: u32,

    /// Whether restore verifies the stream digest before swapping state in.
    pub verify_digest: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_driver: DefaultDriver::InMemory,
            persist_on_write: true,
            max_name_len: 128,
            max_payload_size: 64 * 1024 * 1024, // 64 MB
            verify_digest: true,
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default driver.
    #[must_use]
    pub fn default_driver(mut self, driver: DefaultDriver) -> Self {
        self.default_driver = driver;
        self
    }

    /// Uses file drivers rooted at `root` by default.
    #[must_use]
    pub fn file_root(self, root: impl Into<PathBuf>) -> Self {
        self.default_driver(DefaultDriver::File { root: root.into() })
    }

    /// Sets whether object stores persist on every write.
    #[must_use]
    pub const fn persist_on_write(mut self, value: bool) -> Self {
        self.persist_on_write = value;
        self
    }

    /// Sets the maximum instance name length.
    #[must_use]
    pub const fn max_name_len(mut self, len: usize) -> Self {
        self.max_name_len = len;
        self
    }

    /// Sets the maximum payload size accepted from streams.
    #[must_use]
    pub const fn max_payload_size(mut self, size: u32) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Sets whether restore verifies the stream digest.
    #[must_use]
    pub const fn verify_digest(mut self, value: bool) -> Self {
        self.verify_digest = value;
        self
    }
}
