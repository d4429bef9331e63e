//! Doculite - schema-on-write document store over SQLite
//!
//! Documents are flat maps of named, typed values. Each collection is
//! backed by one relational table whose schema grows append-only as
//! documents introduce new fields; list fields additionally get a side
//! table for relational membership tests. Queries are written in DocQL,
//! a compact select/where language compiled to SQL against the backing
//! tables.
//!
//! # Architecture
//!
//! - Value Layer: typed in-memory values and documents
//! - Schema Layer: per-collection ordered field schemas, evolved on write
//! - Codec Layer: value encoding to and from the stored representation
//! - Storage Layer: SQLite tables, side tables, and the collection catalog
//! - DocQL Layer: lexer, parser, and schema-resolving compiler to SQL
//! - Interchange Layer: JSON dump and restore of a whole store

pub mod codec;
pub mod collection;
pub mod database;
pub mod error;
pub mod field_type;
pub mod interchange;
pub mod value;

// DocQL modules
pub mod docql_ast;
pub mod docql_compiler;
pub mod docql_lexer;
pub mod docql_parser;

pub use collection::{Collection, FieldDef};
pub use database::Database;
pub use error::{Error, Result};
pub use field_type::{FieldKind, FieldType};
pub use value::{Document, Value};

// DocQL exports
pub use docql_ast::Query;
pub use docql_compiler::{compile, OutputColumn, Plan};
pub use docql_parser::Parser;
