//! # ArgentDB Storage
//!
//! Storage driver trait and implementations for ArgentDB.
//!
//! A driver is the durable home of one database instance. It stores opaque
//! table blobs keyed by table name and knows nothing about objects, keys or
//! serializers: the instance that owns the driver encodes its tables before
//! handing them over.
//!
//! ## Design Principles
//!
//! - Drivers are table-granular blob stores (read, write, remove, list)
//! - A driver is opened for exactly one instance and owned by it
//! - Must be `Send + Sync` so instances can be shared across threads
//!
//! ## Available Drivers
//!
//! - [`InMemoryDriver`] - For tests and ephemeral instances (the engine default)
//! - [`FileDriver`] - One directory per instance, one file per table
//! - [`EncryptedDriver`] - Wrapper that adds AES-256-GCM encryption
//!
//! ## Example
//!
//! ```rust
//! use argentdb_storage::{Driver, InMemoryDriver};
//!
//! let mut driver = InMemoryDriver::new();
//! driver.open("orders").unwrap();
//! driver.write_table("orders", b"blob").unwrap();
//! assert_eq!(driver.read_table("orders").unwrap().as_deref(), Some(&b"blob"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod encrypted;
mod error;
mod file;
mod memory;

pub use driver::{validate_table_name, Driver};
pub use encrypted::{EncryptedDriver, EncryptionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use error::{DriverError, DriverResult};
pub use file::FileDriver;
pub use memory::InMemoryDriver;
