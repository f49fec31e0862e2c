//! Error types for driver operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors that can occur during driver operations.
#[derive(Debug, Error)]
pub enum DriverError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The driver has not been opened for an instance, or was closed.
    #[error("driver is not open")]
    NotOpen,

    /// The driver is already bound to an instance.
    #[error("driver already open for instance '{instance}'")]
    AlreadyOpen {
        /// The instance the driver is bound to.
        instance: String,
    },

    /// Another process or driver holds the instance directory.
    #[error("instance storage locked: {}", path.display())]
    Locked {
        /// The locked directory.
        path: PathBuf,
    },

    /// A table or instance name cannot be used as a storage key.
    #[error("invalid storage name '{name}': {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Stored data is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// Encryption or decryption failed.
    #[error("encryption error: {0}")]
    Encryption(String),
}
