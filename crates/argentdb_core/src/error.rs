//! Error types for ArgentDB core.

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in ArgentDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage driver error.
    #[error("storage error: {0}")]
    Storage(#[from] argentdb_storage::DriverError),

    /// Serializer error.
    #[error("codec error: {0}")]
    Codec(#[from] argentdb_codec::CodecError),

    /// I/O error on a backup or restore stream.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An instance name was rejected.
    #[error("invalid instance name {name:?}: {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An instance with this name is already registered.
    #[error("database instance '{name}' is already registered")]
    DuplicateName {
        /// The duplicated name.
        name: String,
    },

    /// No instance is registered under this name.
    #[error("database instance '{name}' not found")]
    InstanceNotFound {
        /// The requested name.
        name: String,
    },

    /// No instance of this type is registered.
    #[error("no database instance of type {type_name} is registered")]
    NoInstanceForType {
        /// The requested instance type.
        type_name: String,
    },

    /// Several instances share the requested type.
    #[error("type {type_name} is bound to several instances ({}); name one", instances.join(", "))]
    AmbiguousType {
        /// The requested instance type.
        type_name: String,
        /// Names of all matching instances, sorted.
        instances: Vec<String>,
    },

    /// An instance type did not match the expected one.
    #[error("instance type mismatch: expected {expected}, found {actual}")]
    TypeMismatch {
        /// The expected type.
        expected: String,
        /// The type actually found.
        actual: String,
    },

    /// A stored type token could not be resolved to a loadable type.
    #[error("cannot resolve type token '{token}' for table '{table}'")]
    TypeResolution {
        /// The stored token.
        token: String,
        /// The table the object belongs to.
        table: String,
    },

    /// A backup stream uses a format version this build cannot read.
    #[error("unsupported backup format version {found} (supported: {supported:?})")]
    Version {
        /// Version found in the stream.
        found: u16,
        /// Versions this build reads.
        supported: Vec<u16>,
    },

    /// A restore is running against the instance.
    #[error("restore in progress on database instance '{instance}'")]
    RestoreInProgress {
        /// The instance being restored.
        instance: String,
    },

    /// Stream or table data is malformed.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Backup digest does not match its content.
    #[error("backup digest mismatch")]
    ChecksumMismatch,

    /// A payload names a serializer that is not registered.
    #[error("no serializer registered with id '{id}'")]
    UnknownSerializer {
        /// The serializer id from the stream.
        id: String,
    },

    /// The instance does not define this table.
    #[error("table '{table}' not found")]
    TableNotFound {
        /// The requested table.
        table: String,
    },

    /// A key does not match the table's key schema.
    #[error("key kind mismatch in table '{table}': expected {expected}, found {actual}")]
    KeyMismatch {
        /// The table.
        table: String,
        /// Kind declared by the key schema.
        expected: String,
        /// Kind of the offending key.
        actual: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// A background operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// A background operation panicked.
    #[error("background operation panicked")]
    TaskPanicked,

    /// The engine has been closed.
    #[error("engine is closed")]
    EngineClosed,
}

impl CoreError {
    /// Creates an invalid name error.
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a table not found error.
    pub fn table_not_found(table: impl Into<String>) -> Self {
        Self::TableNotFound {
            table: table.into(),
        }
    }

    /// Converts a stream error, recognizing cancellation and truncation.
    pub(crate) fn from_io(err: io::Error) -> Self {
        if err
            .get_ref()
            .is_some_and(|inner| inner.is::<StreamCancelled>())
        {
            Self::Cancelled
        } else if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::invalid_format("unexpected end of stream")
        } else {
            Self::Io(err)
        }
    }

    /// Returns whether this error came from the caller's stream or a driver,
    /// as opposed to a registry or format problem.
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Storage(_))
    }
}

/// Marker carried inside the `io::Error` a cancelled stream returns.
#[derive(Debug)]
pub(crate) struct StreamCancelled;

impl fmt::Display for StreamCancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("stream operation cancelled")
    }
}

impl std::error::Error for StreamCancelled {}

impl StreamCancelled {
    pub(crate) fn into_io() -> io::Error {
        io::Error::new(io::ErrorKind::Other, StreamCancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_errors_are_classified() {
        assert!(matches!(
            CoreError::from_io(StreamCancelled::into_io()),
            CoreError::Cancelled
        ));
        assert!(matches!(
            CoreError::from_io(io::Error::from(io::ErrorKind::UnexpectedEof)),
            CoreError::InvalidFormat { .. }
        ));
        let err = CoreError::from_io(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(err.is_io());
    }

    #[test]
    fn ambiguous_type_lists_instances() {
        let err = CoreError::AmbiguousType {
            type_name: "Orders".into(),
            instances: vec!["east".into(), "west".into()],
        };
        assert!(err.to_string().contains("east, west"));
    }
}
