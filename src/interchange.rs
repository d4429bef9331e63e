//! JSON interchange: dump a whole store to one JSON document and
//! restore it into an empty database.
//!
//! The dump has two sections. `schema` maps every collection to its
//! ordered fields (field name to type string) and its indexed fields.
//! `documents` holds every stored document keyed by `_ref`, with values
//! in their JSON form: dates and times as their ISO text, lists as
//! arrays. `_id` is omitted; it is derived from `_ref` again on restore.
//!
//! Restoring replays the schema first, then stores each document with
//! values converted back using the declared field types, so a restored
//! store is indistinguishable from the original, field order and list
//! order included.

use crate::codec;
use crate::database::{split_ref, Database};
use crate::error::{Error, Result};
use crate::field_type::{FieldKind, FieldType};
use crate::value::{Document, Value};
use serde_json::{Map, Number, Value as Json};

/// Dump the whole store as one JSON value.
pub fn dump(db: &Database) -> Result<Json> {
    let mut schema = Map::new();
    let mut documents = Vec::new();
    for name in db.collections()? {
        let handle = db.require_collection(&name)?;

        let mut fields = Map::new();
        for def in handle.fields() {
            fields.insert(
                def.name.clone(),
                Json::String(def.field_type.as_str().to_string()),
            );
        }
        let indices = handle
            .indices()?
            .into_iter()
            .map(Json::String)
            .collect::<Vec<_>>();
        let mut entry = Map::new();
        entry.insert("fields".to_string(), Json::Object(fields));
        entry.insert("indices".to_string(), Json::Array(indices));
        schema.insert(name.clone(), Json::Object(entry));

        // Emit fields in schema order so dumps are reproducible.
        for document in handle.documents()? {
            let mut out = Map::new();
            for def in handle.fields() {
                if def.name == "_id" {
                    continue;
                }
                if let Some(value) = document.get(&def.name) {
                    out.insert(def.name.clone(), value_to_json(value)?);
                }
            }
            documents.push(Json::Object(out));
        }
    }
    let mut root = Map::new();
    root.insert("schema".to_string(), Json::Object(schema));
    root.insert("documents".to_string(), Json::Array(documents));
    Ok(Json::Object(root))
}

/// Dump the whole store as pretty-printed JSON text.
pub fn dump_to_string(db: &Database) -> Result<String> {
    Ok(serde_json::to_string_pretty(&dump(db)?)?)
}

/// Restore a dump into a database that does not yet contain any of the
/// dumped collections.
pub fn restore(db: &Database, data: &Json) -> Result<()> {
    let root = object(data, "dump")?;
    let schema = object(required(root, "schema")?, "schema")?;
    for (name, entry) in schema {
        let entry = object(entry, "collection entry")?;
        let mut handle = db.create_collection(name)?;
        let fields = object(required(entry, "fields")?, "fields")?;
        for (field, type_name) in fields {
            if field == "_id" || field == "_ref" {
                continue;
            }
            let type_name = string(type_name, "field type")?;
            handle.create_field(field, type_name.parse()?)?;
        }
        let indices = required(entry, "indices")?
            .as_array()
            .ok_or_else(|| Error::Decode("'indices' is not an array".to_string()))?;
        for index in indices {
            let field = string(index, "index")?;
            // `_id` and `_ref` were indexed when the collection was created.
            if field != "_id" && field != "_ref" {
                handle.create_index(field)?;
            }
        }
    }

    let documents = required(root, "documents")?
        .as_array()
        .ok_or_else(|| Error::Decode("'documents' is not an array".to_string()))?;
    for document in documents {
        let fields = object(document, "document")?;
        let r = string(required(fields, "_ref")?, "_ref")?;
        let (collection, _) = split_ref(r)?;
        let handle = db.require_collection(&collection)?;
        let mut converted = Document::new();
        converted.insert("_ref".to_string(), Value::Ref(r.to_string()));
        for (field, json) in fields {
            if field == "_ref" || field == "_id" {
                continue;
            }
            let field_type = handle.field_type(field).ok_or_else(|| Error::UnknownField {
                collection: collection.clone(),
                field: field.clone(),
            })?;
            converted.insert(field.clone(), value_from_json(json, &field_type)?);
        }
        db.store(&converted, None, None)?;
    }
    Ok(())
}

/// Restore a dump from JSON text.
pub fn restore_from_str(db: &Database, text: &str) -> Result<()> {
    restore(db, &serde_json::from_str(text)?)
}

fn value_to_json(value: &Value) -> Result<Json> {
    match value {
        Value::Text(s) | Value::Ref(s) => Ok(Json::String(s.clone())),
        Value::Int(v) => Ok(Json::Number(Number::from(*v))),
        Value::Float(v) => Number::from_f64(*v)
            .map(Json::Number)
            .ok_or_else(|| Error::Decode(format!("non-finite float {}", v))),
        Value::Bool(v) => Ok(Json::Bool(*v)),
        Value::DateTime(_) => Ok(Json::String(codec::element_text(value, FieldKind::DateTime)?)),
        Value::Date(_) => Ok(Json::String(codec::element_text(value, FieldKind::Date)?)),
        Value::Time(_) => Ok(Json::String(codec::element_text(value, FieldKind::Time)?)),
        Value::List(items) => {
            let items = items.iter().map(value_to_json).collect::<Result<Vec<_>>>()?;
            Ok(Json::Array(items))
        }
    }
}

fn value_from_json(json: &Json, field_type: &FieldType) -> Result<Value> {
    match field_type {
        FieldType::Scalar(kind) => scalar_from_json(json, *kind),
        FieldType::List(kind) => match json {
            Json::Array(items) => {
                let items = items
                    .iter()
                    .map(|item| scalar_from_json(item, *kind))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::List(items))
            }
            other => Err(Error::Decode(format!("expected array, got {}", other))),
        },
    }
}

fn scalar_from_json(json: &Json, kind: FieldKind) -> Result<Value> {
    match (kind, json) {
        (FieldKind::Text, Json::String(s)) => Ok(Value::Text(s.clone())),
        (FieldKind::Ref, Json::String(s)) => Ok(Value::Ref(s.clone())),
        (FieldKind::Int, json) => json
            .as_i64()
            .map(Value::Int)
            .ok_or_else(|| Error::Decode(format!("expected integer, got {}", json))),
        (FieldKind::Float, json) => json
            .as_f64()
            .map(Value::Float)
            .ok_or_else(|| Error::Decode(format!("expected number, got {}", json))),
        (FieldKind::Bool, Json::Bool(v)) => Ok(Value::Bool(*v)),
        (FieldKind::DateTime | FieldKind::Date | FieldKind::Time, Json::String(s)) => {
            codec::parse_element(s, kind)
        }
        (kind, json) => Err(Error::Decode(format!(
            "expected {} value, got {}",
            FieldType::Scalar(kind).as_str(),
            json
        ))),
    }
}

fn required<'a>(fields: &'a Map<String, Json>, key: &str) -> Result<&'a Json> {
    fields
        .get(key)
        .ok_or_else(|| Error::Decode(format!("missing '{}'", key)))
}

fn object<'a>(json: &'a Json, what: &str) -> Result<&'a Map<String, Json>> {
    json.as_object()
        .ok_or_else(|| Error::Decode(format!("{} is not an object", what)))
}

fn string<'a>(json: &'a Json, what: &str) -> Result<&'a str> {
    json.as_str()
        .ok_or_else(|| Error::Decode(format!("{} is not a string", what)))
}
