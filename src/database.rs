//! Database connection, schema store, and document mapper.
//!
//! A `Database` wraps a single SQLite connection tuned for a safe single
//! client. The connection always has an open transaction: every mutation
//! is visible to later operations in the same scope immediately, and
//! durable only after `commit()`; `rollback()` discards everything since
//! the last commit, schema changes included.

use crate::codec;
use crate::collection::Collection;
use crate::docql_compiler::{compile, Plan};
use crate::docql_parser::Parser;
use crate::error::{Error, Result};
use crate::field_type::{FieldKind, FieldType};
use crate::value::{Document, Value};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, trace};
use uuid::Uuid;

const CATALOG_SQL: &str = "CREATE TABLE IF NOT EXISTS _collections (name VARCHAR(256), tbl_name VARCHAR(256));
     CREATE INDEX IF NOT EXISTS _collections_index ON _collections (name);
     BEGIN;";

pub struct Database {
    conn: Rc<Connection>,
}

impl Database {
    /// Open (or create) a database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Open a transient in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        // Optimize for a safe single client.
        conn.execute_batch(
            "PRAGMA journal_mode = MEMORY;
             PRAGMA synchronous = OFF;
             PRAGMA cache_size = 8192;",
        )?;
        conn.execute_batch(CATALOG_SQL)?;
        Ok(Database {
            conn: Rc::new(conn),
        })
    }

    /// Make all changes since the last commit durable and open the next
    /// transactional scope.
    pub fn commit(&self) -> Result<()> {
        self.conn.execute_batch("COMMIT; BEGIN;")?;
        Ok(())
    }

    /// Discard all changes since the last commit, schema changes
    /// included, and open the next transactional scope.
    pub fn rollback(&self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK; BEGIN;")?;
        Ok(())
    }

    /// Drop every table and reset the store to empty. Outstanding
    /// collection handles are invalidated.
    pub fn drop_database(&self) -> Result<()> {
        let mut tables = Vec::new();
        {
            let mut stmt = self
                .conn
                .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                tables.push(row.get::<_, String>(0)?);
            }
        }
        for table in &tables {
            self.conn.execute_batch(&format!("DROP TABLE {}", table))?;
        }
        // VACUUM cannot run inside a transaction.
        self.conn.execute_batch("COMMIT; VACUUM;")?;
        self.conn.execute_batch(CATALOG_SQL)?;
        trace!("dropped database");
        Ok(())
    }

    fn collection_to_table_name(collection: &str) -> String {
        collection.to_lowercase().replace('/', "__")
    }

    /// Create an empty collection with the reserved `_id` and `_ref`
    /// fields, both indexed.
    pub fn create_collection(&self, collection: &str) -> Result<Collection> {
        if self.get_collection(collection)?.is_some() {
            return Err(Error::CollectionExists(collection.to_string()));
        }
        let table = Self::collection_to_table_name(collection);
        self.conn.execute(
            &format!("CREATE TABLE {} (_id CHAR(36), _ref VARCHAR(256))", table),
            [],
        )?;
        let fields_table = Collection::fields_table(&table);
        self.conn.execute(
            &format!(
                "CREATE TABLE {} (name VARCHAR(128), type VARCHAR(64))",
                fields_table
            ),
            [],
        )?;
        let unicode = FieldType::Scalar(FieldKind::Text).as_str();
        self.conn.execute(
            &format!("INSERT INTO {} VALUES ('_id', ?1), ('_ref', ?1)", fields_table),
            params![unicode],
        )?;
        self.conn.execute(
            "INSERT INTO _collections VALUES (?1, ?2)",
            params![collection, table],
        )?;
        let handle = Collection::open(self.conn.clone(), collection.to_string(), table)?;
        handle.create_index("_id")?;
        handle.create_index("_ref")?;
        trace!(collection, "created collection");
        Ok(handle)
    }

    /// Look a collection up by name. Absence is a sentinel; callers that
    /// require the collection escalate to `UnknownCollection`.
    pub fn get_collection(&self, collection: &str) -> Result<Option<Collection>> {
        let table: Option<String> = self
            .conn
            .query_row(
                "SELECT tbl_name FROM _collections WHERE name = ?1",
                params![collection],
                |row| row.get(0),
            )
            .optional()?;
        match table {
            Some(table) => Ok(Some(Collection::open(
                self.conn.clone(),
                collection.to_string(),
                table,
            )?)),
            None => Ok(None),
        }
    }

    pub(crate) fn require_collection(&self, collection: &str) -> Result<Collection> {
        self.get_collection(collection)?
            .ok_or_else(|| Error::UnknownCollection(collection.to_string()))
    }

    /// Names of all collections.
    pub fn collections(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM _collections")?;
        let mut names = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            names.push(row.get(0)?);
        }
        Ok(names)
    }

    /// Store a document and return its reference `"<collection>/<id>"`.
    ///
    /// The target collection and id come from the explicit arguments
    /// first, then from the document's `_ref`, then from its `_id`; a
    /// missing id is generated. The collection is created if absent, and
    /// every unseen field is appended to its schema with the type
    /// inferred from the value. Either the row and all its side-table
    /// rows are persisted, or none of it is.
    pub fn store(
        &self,
        document: &Document,
        collection: Option<&str>,
        id: Option<&str>,
    ) -> Result<String> {
        let (ref_collection, ref_id) = match document.get("_ref") {
            Some(value) => {
                let text = value
                    .as_str()
                    .ok_or_else(|| Error::InvalidReference(format!("{:?}", value)))?;
                let (c, i) = split_ref(text)?;
                (Some(c), i)
            }
            None => (None, None),
        };
        let collection = match collection {
            Some(c) => c.to_string(),
            None => ref_collection
                .ok_or_else(|| Error::InvalidReference("missing collection".to_string()))?,
        };
        let id = match id {
            Some(i) => i.to_string(),
            None => ref_id
                .or_else(|| {
                    document
                        .get("_id")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string())
                })
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        };

        // Infer and check every field before touching the schema, so a
        // failing document leaves no partial schema (and no empty
        // collection) behind.
        let existing = self.get_collection(&collection)?;
        let mut new_fields = Vec::new();
        for (name, value) in document {
            if name == "_id" || name == "_ref" {
                continue;
            }
            let inferred = FieldType::infer(value).map_err(|e| match e {
                Error::EmptyList(_) => Error::EmptyList(name.clone()),
                Error::NestedList(_) => Error::NestedList(name.clone()),
                Error::TypeMismatch {
                    expected, found, ..
                } => Error::TypeMismatch {
                    collection: collection.clone(),
                    field: name.clone(),
                    expected,
                    found,
                },
                other => other,
            })?;
            match existing.as_ref().and_then(|h| h.field_type(name)) {
                Some(declared) => {
                    if !declared.accepts(&inferred) {
                        return Err(Error::TypeMismatch {
                            collection: collection.clone(),
                            field: name.clone(),
                            expected: declared.as_str(),
                            found: inferred.as_str(),
                        });
                    }
                }
                None => new_fields.push((name.clone(), inferred)),
            }
        }
        let mut handle = match existing {
            Some(handle) => handle,
            None => self.create_collection(&collection)?,
        };
        // Document iteration order is unspecified; append new fields in
        // name order so schema evolution is deterministic.
        new_fields.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, field_type) in new_fields {
            handle.create_field(&name, field_type)?;
        }

        let r = format!("{}/{}", collection, id);
        handle.store_row(&id, &r, document)?;
        Ok(r)
    }

    /// Parse and compile a query without executing it.
    pub fn compile(&self, query: &str) -> Result<Plan> {
        let ast = Parser::parse(query)?;
        let plan = compile(self, &ast)?;
        debug!(sql = %plan.sql(), "compiled query");
        Ok(plan)
    }

    /// Execute a query, returning one document per result row keyed by
    /// the plan's output names. NULL columns are dropped.
    pub fn execute(&self, query: &str) -> Result<Vec<Document>> {
        self.execute_with(query, &[])
    }

    /// Like [`execute`](Self::execute), binding values to the query's
    /// `?` placeholders.
    pub fn execute_with(&self, query: &str, params: &[Value]) -> Result<Vec<Document>> {
        let plan = self.compile(query)?;
        let mut documents = Vec::new();
        self.run_plan(&plan, params, |columns, values| {
            let mut document = Document::new();
            for (column, value) in columns.iter().zip(values) {
                if let Some(value) = value {
                    document.insert(column.clone(), value);
                }
            }
            documents.push(document);
        })?;
        Ok(documents)
    }

    /// Execute a query, returning one value tuple per result row in the
    /// plan's output order. NULL columns decode to `None`.
    pub fn execute_values(&self, query: &str) -> Result<Vec<Vec<Option<Value>>>> {
        let plan = self.compile(query)?;
        let mut rows_out = Vec::new();
        self.run_plan(&plan, &[], |_, values| rows_out.push(values))?;
        Ok(rows_out)
    }

    fn run_plan<F>(&self, plan: &Plan, params: &[Value], mut sink: F) -> Result<()>
    where
        F: FnMut(&[String], Vec<Option<Value>>),
    {
        let sql = plan.sql();
        let names = plan
            .columns
            .iter()
            .map(|c| c.name.clone())
            .collect::<Vec<_>>();
        let bound = params
            .iter()
            .map(encode_param)
            .collect::<Result<Vec<_>>>()?;
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bound))?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(plan.columns.len());
            for (i, column) in plan.columns.iter().enumerate() {
                values.push(codec::decode(row.get_ref(i)?, &column.field_type)?);
            }
            sink(&names, values);
        }
        Ok(())
    }
}

/// Encode an external `?` parameter by its own value kind.
fn encode_param(value: &Value) -> Result<SqlValue> {
    let field_type = FieldType::infer(value)
        .map_err(|e| match e {
            Error::EmptyList(_) => Error::InvalidOperand("empty list parameter".to_string()),
            other => other,
        })?;
    codec::encode(value, &field_type)
}

/// Split `"<collection>/<id>"`; an empty id segment (trailing slash)
/// means the id is to be generated.
pub(crate) fn split_ref(r: &str) -> Result<(String, Option<String>)> {
    match r.rsplit_once('/') {
        Some((collection, "")) if !collection.is_empty() => Ok((collection.to_string(), None)),
        Some((collection, id)) if !collection.is_empty() => {
            Ok((collection.to_string(), Some(id.to_string())))
        }
        _ => Err(Error::InvalidReference(r.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_ref() {
        assert_eq!(
            split_ref("study/0").unwrap(),
            ("study".to_string(), Some("0".to_string()))
        );
        assert_eq!(split_ref("study/").unwrap(), ("study".to_string(), None));
        assert_eq!(
            split_ref("study/subjects/s1").unwrap(),
            ("study/subjects".to_string(), Some("s1".to_string()))
        );
        assert!(matches!(
            split_ref("study").unwrap_err(),
            Error::InvalidReference(_)
        ));
    }

    #[test]
    fn test_collection_to_table_name() {
        assert_eq!(
            Database::collection_to_table_name("Study000/Subjects"),
            "study000__subjects"
        );
    }
}
