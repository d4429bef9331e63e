//! Value codec: typed in-memory values to and from their stored SQLite
//! representation.
//!
//! Scalars map to native SQLite types (dates and times as ISO-8601
//! text). A list field stores two representations: the main-table column
//! holds the tab-joined escaped element encodings, and the field's side
//! table holds one row per element with the plain scalar encoding, so
//! membership tests compare raw values. Each kind has an explicit
//! parser/serializer pair; stored text is never evaluated generically.

use crate::error::{Error, Result};
use crate::field_type::{FieldKind, FieldType};
use crate::value::Value;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::{Value as SqlValue, ValueRef};

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// Encode a value for the main-table column of a field.
pub fn encode(value: &Value, field_type: &FieldType) -> Result<SqlValue> {
    match field_type {
        FieldType::Scalar(kind) => encode_scalar(value, *kind),
        FieldType::List(kind) => match value {
            Value::List(items) => {
                let parts = items
                    .iter()
                    .map(|item| element_text(item, *kind).map(|t| escape(&t)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(SqlValue::Text(parts.join("\t")))
            }
            other => Err(mismatch(field_type, other)),
        },
    }
}

/// Encode one list element for its side-table row.
pub fn encode_element(value: &Value, kind: FieldKind) -> Result<SqlValue> {
    encode_scalar(value, kind)
}

fn encode_scalar(value: &Value, kind: FieldKind) -> Result<SqlValue> {
    match (kind, value) {
        (FieldKind::Text | FieldKind::Ref, Value::Text(s) | Value::Ref(s)) => {
            Ok(SqlValue::Text(s.clone()))
        }
        (FieldKind::Int, Value::Int(v)) => Ok(SqlValue::Integer(*v)),
        (FieldKind::Float, Value::Float(v)) => Ok(SqlValue::Real(*v)),
        (FieldKind::Float, Value::Int(v)) => Ok(SqlValue::Real(*v as f64)),
        (FieldKind::Bool, Value::Bool(v)) => Ok(SqlValue::Integer(i64::from(*v))),
        (FieldKind::DateTime, Value::DateTime(v)) => {
            Ok(SqlValue::Text(v.format(DATETIME_FORMAT).to_string()))
        }
        (FieldKind::Date, Value::Date(v)) => {
            Ok(SqlValue::Text(v.format(DATE_FORMAT).to_string()))
        }
        (FieldKind::Time, Value::Time(v)) => {
            Ok(SqlValue::Text(v.format(TIME_FORMAT).to_string()))
        }
        (kind, other) => Err(mismatch(&FieldType::Scalar(kind), other)),
    }
}

/// Decode a stored column back into a value. NULL decodes to `None`;
/// the field is then dropped from the reconstructed document.
pub fn decode(raw: ValueRef<'_>, field_type: &FieldType) -> Result<Option<Value>> {
    if raw == ValueRef::Null {
        return Ok(None);
    }
    match field_type {
        FieldType::Scalar(kind) => decode_scalar(raw, *kind).map(Some),
        FieldType::List(kind) => {
            let text = as_text(raw)?;
            let items = text
                .split('\t')
                .map(|part| parse_element(&unescape(part), *kind))
                .collect::<Result<Vec<_>>>()?;
            Ok(Some(Value::List(items)))
        }
    }
}

fn decode_scalar(raw: ValueRef<'_>, kind: FieldKind) -> Result<Value> {
    match kind {
        FieldKind::Text => Ok(Value::Text(as_text(raw)?.to_string())),
        FieldKind::Ref => Ok(Value::Ref(as_text(raw)?.to_string())),
        FieldKind::Int => raw
            .as_i64()
            .map(Value::Int)
            .map_err(|e| Error::Decode(e.to_string())),
        FieldKind::Float => raw
            .as_f64()
            .map(Value::Float)
            .map_err(|e| Error::Decode(e.to_string())),
        FieldKind::Bool => raw
            .as_i64()
            .map(|v| Value::Bool(v != 0))
            .map_err(|e| Error::Decode(e.to_string())),
        FieldKind::DateTime | FieldKind::Date | FieldKind::Time => {
            parse_element(as_text(raw)?, kind)
        }
    }
}

/// Textual element encoding used inside the tab-joined list column.
/// Also the interchange text form of dates and times.
pub(crate) fn element_text(value: &Value, kind: FieldKind) -> Result<String> {
    match (kind, value) {
        (FieldKind::Text | FieldKind::Ref, Value::Text(s) | Value::Ref(s)) => Ok(s.clone()),
        (FieldKind::Int, Value::Int(v)) => Ok(v.to_string()),
        (FieldKind::Float, Value::Float(v)) => Ok(v.to_string()),
        (FieldKind::Float, Value::Int(v)) => Ok((*v as f64).to_string()),
        (FieldKind::Bool, Value::Bool(v)) => Ok(if *v { "1" } else { "0" }.to_string()),
        (FieldKind::DateTime, Value::DateTime(v)) => {
            Ok(v.format(DATETIME_FORMAT).to_string())
        }
        (FieldKind::Date, Value::Date(v)) => Ok(v.format(DATE_FORMAT).to_string()),
        (FieldKind::Time, Value::Time(v)) => Ok(v.format(TIME_FORMAT).to_string()),
        (kind, other) => Err(mismatch(&FieldType::Scalar(kind), other)),
    }
}

/// Parse one element of a list column, or a textual scalar.
pub(crate) fn parse_element(text: &str, kind: FieldKind) -> Result<Value> {
    match kind {
        FieldKind::Text => Ok(Value::Text(text.to_string())),
        FieldKind::Ref => Ok(Value::Ref(text.to_string())),
        FieldKind::Int => text
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| Error::Decode(format!("invalid int '{}'", text))),
        FieldKind::Float => text
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| Error::Decode(format!("invalid float '{}'", text))),
        FieldKind::Bool => match text {
            "1" => Ok(Value::Bool(true)),
            "0" => Ok(Value::Bool(false)),
            _ => Err(Error::Decode(format!("invalid bool '{}'", text))),
        },
        FieldKind::DateTime => NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
            .map(Value::DateTime)
            .map_err(|_| Error::Decode(format!("invalid datetime '{}'", text))),
        FieldKind::Date => NaiveDate::parse_from_str(text, DATE_FORMAT)
            .map(Value::Date)
            .map_err(|_| Error::Decode(format!("invalid date '{}'", text))),
        FieldKind::Time => NaiveTime::parse_from_str(text, TIME_FORMAT)
            .map(Value::Time)
            .map_err(|_| Error::Decode(format!("invalid time '{}'", text))),
    }
}

fn as_text(raw: ValueRef<'_>) -> Result<&str> {
    raw.as_str().map_err(|e| Error::Decode(e.to_string()))
}

fn mismatch(expected: &FieldType, found: &Value) -> Error {
    let found = FieldType::infer(found)
        .map(|t| t.as_str())
        .unwrap_or("list");
    Error::TypeMismatch {
        collection: String::new(),
        field: String::new(),
        expected: expected.as_str(),
        found,
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
