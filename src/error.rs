//! Error taxonomy for package compilation.
//!
//! Every variant of [`CompileError`] is fatal: it aborts the compile and
//! nothing is written to the destination. AI generation failures are not
//! part of this enum; handlers recover from them locally.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::LibraryIdentifier;

/// Result alias for the compilation core
pub type Result<T, E = CompileError> = std::result::Result<T, E>;

/// Fatal compilation errors
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Unknown content type '{tag}' at {path}")]
    UnknownContentType { tag: String, path: String },

    #[error("Invalid {path}: field '{field}' {reason}")]
    Validation {
        path: String,
        field: String,
        reason: String,
    },

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("A handler for content type '{0}' is already registered")]
    DuplicateHandler(String),

    #[error("Failed to fetch library {library} from {url}: {reason}. {remediation}")]
    Fetch {
        library: LibraryIdentifier,
        url: String,
        reason: String,
        remediation: String,
    },

    #[error("Library archive for {requested} failed integrity check: {found}")]
    Integrity {
        requested: LibraryIdentifier,
        found: String,
    },

    #[error("Dependency cycle detected: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    #[error("Library {library} is missing asset '{asset}'")]
    MissingAsset {
        library: LibraryIdentifier,
        asset: String,
    },

    #[error("Failed to load media '{source_ref}' for {path}: {reason}")]
    Media {
        path: String,
        source_ref: String,
        reason: String,
    },

    #[error("Library cache error at {}: {message}", path.display())]
    Cache { path: PathBuf, message: String },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Failed to write package to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    /// Build a cache error from an I/O failure at `path`
    pub fn cache(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Cache {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

impl From<zip::result::ZipError> for CompileError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}

/// A handler-level validation failure naming the offending field
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field '{field}' {expected}")]
pub struct FieldError {
    /// Name of the offending field
    pub field: String,

    /// Description of the expected shape or range
    pub expected: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            expected: expected.into(),
        }
    }

    /// Attach a node path, producing the fatal compile error
    pub fn at(self, path: &str) -> CompileError {
        CompileError::Validation {
            path: path.to_string(),
            field: self.field,
            reason: self.expected,
        }
    }
}
