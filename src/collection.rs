//! Collection handles: per-collection schema and row storage.
//!
//! A collection is backed by one document table, one fields table
//! persisting the ordered schema, and one side table per list field. A
//! handle reads the schema back from storage when opened, so in-memory
//! and persisted schema cannot diverge: every schema mutation writes
//! both within the caller's current transaction.

use crate::codec;
use crate::error::{Error, Result};
use crate::field_type::FieldType;
use crate::value::{Document, Value};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::rc::Rc;
use tracing::trace;

/// One entry of a collection's ordered schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
}

/// Handle over one collection.
#[derive(Debug, Clone)]
pub struct Collection {
    conn: Rc<Connection>,
    name: String,
    table: String,
    fields: Vec<FieldDef>,
}

impl Collection {
    /// Open a handle, reading the schema back from the fields table.
    pub(crate) fn open(conn: Rc<Connection>, name: String, table: String) -> Result<Self> {
        let mut fields = Vec::new();
        {
            let mut stmt = conn.prepare(&format!(
                "SELECT name, type FROM {} ORDER BY rowid",
                Self::fields_table(&table)
            ))?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let name: String = row.get(0)?;
                let type_name: String = row.get(1)?;
                fields.push(FieldDef {
                    name,
                    field_type: type_name.parse()?,
                });
            }
        }
        Ok(Collection {
            conn,
            name,
            table,
            fields,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the backing document table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The ordered schema, insertion order preserved.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field_type(&self, field: &str) -> Option<FieldType> {
        self.fields
            .iter()
            .find(|f| f.name == field)
            .map(|f| f.field_type)
    }

    pub(crate) fn fields_table(table: &str) -> String {
        format!("_{}_fields", table)
    }

    pub(crate) fn list_table(table: &str, field: &str) -> String {
        format!("_{}_list_{}", table, field)
    }

    fn index_name(&self, field: &str) -> String {
        format!("_{}_{}", self.table, field)
    }

    /// Append a new field to the schema. For list types this also
    /// provisions the field's side table.
    pub fn create_field(&mut self, field: &str, field_type: FieldType) -> Result<()> {
        if self.field_type(field).is_some() {
            return Err(Error::DuplicateField {
                collection: self.name.clone(),
                field: field.to_string(),
            });
        }
        self.conn.execute(
            &format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                self.table,
                field,
                field_type.sql_type()
            ),
            [],
        )?;
        if field_type.is_list() {
            let list_table = Self::list_table(&self.table, field);
            self.conn.execute(
                &format!("CREATE TABLE {} (list, i, value)", list_table),
                [],
            )?;
            self.conn.execute(
                &format!(
                    "CREATE INDEX {}_index ON {} (list)",
                    list_table, list_table
                ),
                [],
            )?;
        }
        self.conn.execute(
            &format!(
                "INSERT INTO {} VALUES (?1, ?2)",
                Self::fields_table(&self.table)
            ),
            params![field, field_type.as_str()],
        )?;
        trace!(collection = %self.name, field, r#type = field_type.as_str(), "created field");
        self.fields.push(FieldDef {
            name: field.to_string(),
            field_type,
        });
        Ok(())
    }

    /// Build a secondary index on a field. Not idempotent: indexing the
    /// same field twice is a caller error and surfaces the engine
    /// failure.
    pub fn create_index(&self, field: &str) -> Result<()> {
        self.conn.execute(
            &format!(
                "CREATE INDEX {} ON {} ( {} )",
                self.index_name(field),
                self.table,
                field
            ),
            [],
        )?;
        Ok(())
    }

    /// Names of the indexed fields, read from the engine catalog.
    pub fn indices(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1",
        )?;
        let prefix = format!("_{}_", self.table);
        let mut names = Vec::new();
        let mut rows = stmt.query(params![self.table])?;
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            if let Some(field) = name.strip_prefix(&prefix) {
                names.push(field.to_string());
            }
        }
        Ok(names)
    }

    /// Store one row plus the side-table rows of its list fields. All
    /// fields the document uses must already exist in the schema; the
    /// document mapper guarantees that. An existing row with the same
    /// `_id` is replaced together with its side-table rows.
    pub(crate) fn store_row(&self, id: &str, r: &str, document: &Document) -> Result<()> {
        self.remove_row(id)?;

        let mut columns = vec!["_id".to_string(), "_ref".to_string()];
        let mut values = vec![
            SqlValue::Text(id.to_string()),
            SqlValue::Text(r.to_string()),
        ];
        let mut list_fields: Vec<(&str, &[Value])> = Vec::new();
        for def in &self.fields {
            if def.name == "_id" || def.name == "_ref" {
                continue;
            }
            let Some(value) = document.get(&def.name) else {
                continue;
            };
            columns.push(def.name.clone());
            values.push(codec::encode(value, &def.field_type)?);
            if let (FieldType::List(_), Value::List(items)) = (&def.field_type, value) {
                list_fields.push((&def.name, items));
            }
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            columns
                .iter()
                .enumerate()
                .map(|(i, _)| format!("?{}", i + 1))
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.conn.execute(&sql, params_from_iter(values))?;

        if !list_fields.is_empty() {
            let rowid = self.conn.last_insert_rowid();
            for (field, items) in list_fields {
                let kind = match self.field_type(field) {
                    Some(FieldType::List(kind)) => kind,
                    _ => continue,
                };
                let sql = format!(
                    "INSERT INTO {} (list, i, value) VALUES (?1, ?2, ?3)",
                    Self::list_table(&self.table, field)
                );
                let mut stmt = self.conn.prepare(&sql)?;
                for (i, item) in items.iter().enumerate() {
                    stmt.execute(params![rowid, i as i64, codec::encode_element(item, kind)?])?;
                }
            }
        }
        Ok(())
    }

    /// Delete the row with the given `_id`, including its side-table
    /// rows. Missing rows are ignored (store is an upsert).
    fn remove_row(&self, id: &str) -> Result<()> {
        let rowid: Option<i64> = self
            .conn
            .query_row(
                &format!("SELECT rowid FROM {} WHERE _id = ?1", self.table),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(rowid) = rowid else {
            return Ok(());
        };
        for def in &self.fields {
            if def.field_type.is_list() {
                self.conn.execute(
                    &format!(
                        "DELETE FROM {} WHERE list = ?1",
                        Self::list_table(&self.table, &def.name)
                    ),
                    params![rowid],
                )?;
            }
        }
        self.conn.execute(
            &format!("DELETE FROM {} WHERE rowid = ?1", self.table),
            params![rowid],
        )?;
        Ok(())
    }

    /// Decode every stored row back into a document, dropping fields
    /// whose stored value is NULL. Each call runs a fresh scan.
    pub fn documents(&self) -> Result<Vec<Document>> {
        let columns = self
            .fields
            .iter()
            .map(|f| f.name.clone())
            .collect::<Vec<_>>();
        let sql = format!("SELECT {} FROM {}", columns.join(", "), self.table);
        let mut stmt = self.conn.prepare(&sql)?;
        let mut documents = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut document = Document::new();
            for (i, def) in self.fields.iter().enumerate() {
                if let Some(value) = codec::decode(row.get_ref(i)?, &def.field_type)? {
                    document.insert(def.name.clone(), value);
                }
            }
            documents.push(document);
        }
        Ok(documents)
    }
}
