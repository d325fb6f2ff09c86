use core::fmt;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors surfaced by the storage layer.
///
/// Missing identifiers are not errors (acknowledge/purge report zero rows
/// affected) and aggregates over empty windows yield `None` rather than failing.
#[derive(Debug)]
pub enum StoreError {
    /// A write was rejected before anything was committed.
    ConstraintViolation {
        field: &'static str,
        bound: String,
        value: String,
    },
    /// A query or maintenance call was given parameters it cannot honour.
    InvalidParameter(String),
    Connection(diesel::ConnectionError),
    Migration(String),
    Database(diesel::result::Error),
    Io(std::io::Error),
    Serialization(serde_json::Error),
}

impl StoreError {
    pub fn violation(field: &'static str, bound: impl Into<String>, value: impl Display) -> Self {
        StoreError::ConstraintViolation {
            field,
            bound: bound.into(),
            value: value.to_string(),
        }
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StoreError::ConstraintViolation { .. })
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::ConstraintViolation { field, bound, value } => {
                write!(f, "constraint violation: {} must satisfy {} (got {})", field, bound, value)
            }
            StoreError::InvalidParameter(msg) => write!(f, "invalid parameter: {}", msg),
            StoreError::Connection(e) => write!(f, "connection error: {}", e),
            StoreError::Migration(msg) => write!(f, "migration error: {}", msg),
            StoreError::Database(e) => write!(f, "database error: {}", e),
            StoreError::Io(e) => write!(f, "io error: {}", e),
            StoreError::Serialization(e) => write!(f, "serialization error: {}", e),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Connection(e) => Some(e),
            StoreError::Database(e) => Some(e),
            StoreError::Io(e) => Some(e),
            StoreError::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<diesel::result::Error> for StoreError {
    fn from(value: diesel::result::Error) -> Self {
        StoreError::Database(value)
    }
}

impl From<diesel::ConnectionError> for StoreError {
    fn from(value: diesel::ConnectionError) -> Self {
        StoreError::Connection(value)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        StoreError::Io(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        StoreError::Serialization(value)
    }
}
