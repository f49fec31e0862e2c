//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a value.
    #[error("encoding {type_name} with '{serializer}' failed: {message}")]
    EncodingFailed {
        /// Id of the serializer that failed.
        serializer: String,
        /// Type being encoded.
        type_name: String,
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a payload.
    #[error("decoding {type_name} with '{serializer}' failed: {message}")]
    DecodingFailed {
        /// Id of the serializer that failed.
        serializer: String,
        /// Type being decoded.
        type_name: String,
        /// Description of the decoding error.
        message: String,
    },

    /// The serializer was asked to handle a type it does not claim.
    #[error("serializer '{serializer}' does not handle type {type_name}")]
    UnsupportedType {
        /// Id of the serializer.
        serializer: String,
        /// The rejected type.
        type_name: String,
    },

    /// Converting between a Rust value and a dynamic value failed.
    #[error("value conversion failed: {message}")]
    Conversion {
        /// Description of the conversion error.
        message: String,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(
        serializer: impl Into<String>,
        type_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::EncodingFailed {
            serializer: serializer.into(),
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(
        serializer: impl Into<String>,
        type_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::DecodingFailed {
            serializer: serializer.into(),
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported type error.
    pub fn unsupported_type(serializer: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            serializer: serializer.into(),
            type_name: type_name.into(),
        }
    }

    /// Create a conversion error.
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion {
            message: message.into(),
        }
    }
}
