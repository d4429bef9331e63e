//! Error types for the document store.
//!
//! Every error is raised synchronously at the point of detection and is
//! never downgraded or retried internally. SQLite failures surface
//! unchanged through [`Error::Storage`]; the caller is expected to
//! `rollback` on such failure to keep schema and data consistent.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Malformed query text; `position` is the offset of the offending
    /// token.
    Parse { message: String, position: usize },
    /// A field without a qualifying collection could not be resolved
    /// against an implicit current collection.
    AmbiguousField(String),
    /// A query referenced a collection that does not exist.
    UnknownCollection(String),
    /// A query referenced a field that is not declared in its collection.
    UnknownField { collection: String, field: String },
    /// A stored value is incompatible with the field's declared type.
    TypeMismatch {
        collection: String,
        field: String,
        expected: &'static str,
        found: &'static str,
    },
    /// The element type of an empty list cannot be inferred.
    EmptyList(String),
    /// Lists may only hold scalar elements.
    NestedList(String),
    /// `in` was applied to a field that is not list-typed.
    InOperandNotList { collection: String, field: String },
    /// An operand that cannot be used where it appears, e.g. a literal
    /// on the right of `in`, or an empty list bound to `?`.
    InvalidOperand(String),
    /// A collection with that name already exists.
    CollectionExists(String),
    /// A field with that name already exists in the collection.
    DuplicateField { collection: String, field: String },
    /// A malformed document reference, e.g. missing the id segment.
    InvalidReference(String),
    /// Stored or interchange data could not be decoded.
    Decode(String),
    /// An underlying SQLite failure, fatal to the current operation.
    Storage(rusqlite::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse { message, position } => {
                write!(f, "Parse error at offset {}: {}", position, message)
            }
            Error::AmbiguousField(field) => write!(
                f,
                "Cannot resolve field '.{}': no current collection established",
                field
            ),
            Error::UnknownCollection(name) => {
                write!(f, "Collection '{}' does not exist", name)
            }
            Error::UnknownField { collection, field } => {
                write!(f, "Collection '{}' has no field '{}'", collection, field)
            }
            Error::TypeMismatch {
                collection,
                field,
                expected,
                found,
            } => write!(
                f,
                "Type mismatch for '{}.{}': expected {}, got {}",
                collection, field, expected, found
            ),
            Error::EmptyList(field) => write!(
                f,
                "Cannot infer element type of empty list for field '{}'",
                field
            ),
            Error::NestedList(field) => {
                write!(f, "Field '{}' holds a nested list, which is not supported", field)
            }
            Error::InOperandNotList { collection, field } => write!(
                f,
                "'in' requires a list field, but '{}.{}' is not a list",
                collection, field
            ),
            Error::InvalidOperand(text) => {
                write!(f, "Invalid operand: {}", text)
            }
            Error::CollectionExists(name) => {
                write!(f, "Collection '{}' already exists", name)
            }
            Error::DuplicateField { collection, field } => {
                write!(f, "Field '{}' already exists in collection '{}'", field, collection)
            }
            Error::InvalidReference(r) => write!(f, "Invalid document reference '{}'", r),
            Error::Decode(message) => write!(f, "Decode error: {}", message),
            Error::Storage(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}
