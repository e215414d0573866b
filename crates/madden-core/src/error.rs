//! Unified error type for the madden catalog.
//!
//! Every data-access operation returns one of exactly four kinds. Callers
//! branch on [`Error::kind`] to pick a transport status; the low-level cause
//! of a [`Error::Storage`] failure is kept behind [`std::error::Error::source`]
//! so it reaches logs without leaking into user-facing messages.

use std::fmt;

/// Unified error type covering all catalog failure modes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "content item", "image file").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// A uniqueness rule was violated (duplicate item tuple or filename).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An association points at an image file that does not exist.
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// The backing store failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Human-readable description of the failed operation.
        message: String,
        /// The underlying driver error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Machine-readable discriminant of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidReference,
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::InvalidReference => write!(f, "invalid_reference"),
            Self::Storage => write!(f, "storage"),
        }
    }
}

impl Error {
    /// The machine-readable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::InvalidReference(_) => ErrorKind::InvalidReference,
            Error::Storage { .. } => ErrorKind::Storage,
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Conflict`].
    pub fn conflict(message: impl Into<String>) -> Self {
        Error::Conflict(message.into())
    }

    /// Convenience constructor for [`Error::InvalidReference`].
    pub fn invalid_reference(message: impl Into<String>) -> Self {
        Error::InvalidReference(message.into())
    }

    /// Convenience constructor for [`Error::Storage`].
    pub fn storage(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Error::Storage {
            message: message.into(),
            source: source.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
