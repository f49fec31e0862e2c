//! # ArgentDB Testkit
//!
//! Test utilities for ArgentDB.
//!
//! This crate provides:
//! - Example schemas (`Orders`, `Catalog`) and engine helpers
//! - A log sink that captures engine messages for assertions
//! - Property-based test generators using proptest
//!
//! Cross-crate tests for the engine live in this crate's `tests/` directory.
//!
//! ## Usage
//!
//! ```rust
//! use argentdb_testkit::prelude::*;
//!
//! let env = TestEngine::memory();
//! let orders = env.register_orders("orders");
//! scenarios::populate_orders(&orders, 3);
//! assert_eq!(orders.count(ORDERS_TABLE).unwrap(), 3);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
