//! Error types for schema compilation.

use thiserror::Error;

/// Coarse classification of a [`CompileError`].
///
/// Several variants can share one kind (e.g. both malformed JSON and a
/// non-object document are parse failures).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MissingSpec,
    ParseError,
    UnrecognizedType,
    BadRefPath,
    UnresolvedRef,
    ValidatorNotFound,
    InvalidSchema,
}

/// Errors during schema compilation.
///
/// Every error aborts the whole compilation; there is no partial output.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("schema document not supplied")]
    MissingSpec,

    // Parse errors
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    #[error("schema document must be a JSON object, got {actual}")]
    NotADocument { actual: String },

    // Type errors
    #[error("unrecognized schema type \"{declared}\" at {path}")]
    UnrecognizedType { path: String, declared: String },

    #[error("unrecognized number format \"{format}\" at {path}")]
    UnrecognizedFormat { path: String, format: String },

    // Reference errors
    #[error("overlay path \"{path}\" does not exist in definitions")]
    BadRefPath { path: String },

    #[error("unresolved reference \"{reference}\" at {path}")]
    UnresolvedRef { path: String, reference: String },

    #[error("validator \"{name}\" bound at {path} is not registered")]
    ValidatorNotFound { path: String, name: String },

    // Structural errors
    #[error("invalid schema at {path}: {message}")]
    InvalidSchema { path: String, message: String },

    #[error("invalid directive at {path}: {message}")]
    InvalidDirective { path: String, message: String },
}

impl CompileError {
    /// Returns the taxonomy kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingSpec => ErrorKind::MissingSpec,
            Self::InvalidJson { .. } | Self::NotADocument { .. } => ErrorKind::ParseError,
            Self::UnrecognizedType { .. } | Self::UnrecognizedFormat { .. } => {
                ErrorKind::UnrecognizedType
            }
            Self::BadRefPath { .. } => ErrorKind::BadRefPath,
            Self::UnresolvedRef { .. } => ErrorKind::UnresolvedRef,
            Self::ValidatorNotFound { .. } => ErrorKind::ValidatorNotFound,
            Self::InvalidSchema { .. } | Self::InvalidDirective { .. } => ErrorKind::InvalidSchema,
        }
    }

    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingSpec => 3, // nothing was read
            _ => 2,
        }
    }

    pub(crate) fn invalid_schema(path: &str, message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            path: path.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_directive(path: &str, message: impl Into<String>) -> Self {
        Self::InvalidDirective {
            path: path.to_string(),
            message: message.into(),
        }
    }
}
