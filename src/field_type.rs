//! Field type registry.
//!
//! A field is typed once, on first sight of a value, and the type never
//! changes afterwards. The string names are the on-disk contract used in
//! the per-collection fields table and the interchange format; they must
//! not be renamed.

use crate::error::{Error, Result};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scalar kind of a field or list element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Text,
    Int,
    Float,
    Bool,
    DateTime,
    Date,
    Time,
    Ref,
}

impl FieldKind {
    /// Kind of a scalar value; `None` for lists.
    pub fn of(value: &Value) -> Option<FieldKind> {
        match value {
            Value::Text(_) => Some(FieldKind::Text),
            Value::Int(_) => Some(FieldKind::Int),
            Value::Float(_) => Some(FieldKind::Float),
            Value::Bool(_) => Some(FieldKind::Bool),
            Value::DateTime(_) => Some(FieldKind::DateTime),
            Value::Date(_) => Some(FieldKind::Date),
            Value::Time(_) => Some(FieldKind::Time),
            Value::Ref(_) => Some(FieldKind::Ref),
            Value::List(_) => None,
        }
    }
}

/// Declared type of a field: a scalar kind or a homogeneous list of a
/// scalar kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Scalar(FieldKind),
    List(FieldKind),
}

impl FieldType {
    /// Infer the field type of a runtime value. The element kind of a
    /// list comes from its first element; every later element must be
    /// storable under that kind. Empty lists cannot be typed. The caller
    /// attaches the offending collection and field names to the error.
    pub fn infer(value: &Value) -> Result<FieldType> {
        match value {
            Value::List(items) => {
                let Some(first) = items.first() else {
                    return Err(Error::EmptyList(String::new()));
                };
                let Some(kind) = FieldKind::of(first) else {
                    return Err(Error::NestedList(String::new()));
                };
                for item in &items[1..] {
                    let found = FieldKind::of(item)
                        .ok_or_else(|| Error::NestedList(String::new()))?;
                    if !kind_accepts(kind, found) {
                        return Err(Error::TypeMismatch {
                            collection: String::new(),
                            field: String::new(),
                            expected: FieldType::List(kind).as_str(),
                            found: FieldType::Scalar(found).as_str(),
                        });
                    }
                }
                Ok(FieldType::List(kind))
            }
            scalar => match FieldKind::of(scalar) {
                Some(kind) => Ok(FieldType::Scalar(kind)),
                None => unreachable!("non-list value always has a kind"),
            },
        }
    }

    /// Whether a value of inferred type `found` may be stored under this
    /// declared type. Ref fields accept plain text (a ref is a string),
    /// text fields accept refs, and float fields accept integers.
    pub fn accepts(&self, found: &FieldType) -> bool {
        match (self, found) {
            (FieldType::Scalar(d), FieldType::Scalar(f)) => kind_accepts(*d, *f),
            (FieldType::List(d), FieldType::List(f)) => kind_accepts(*d, *f),
            _ => false,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, FieldType::List(_))
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            FieldType::Scalar(k) | FieldType::List(k) => *k,
        }
    }

    /// Stable string name, e.g. `"unicode"` or `"list_int"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Scalar(FieldKind::Text) => "unicode",
            FieldType::Scalar(FieldKind::Int) => "int",
            FieldType::Scalar(FieldKind::Float) => "float",
            FieldType::Scalar(FieldKind::Bool) => "bool",
            FieldType::Scalar(FieldKind::DateTime) => "datetime",
            FieldType::Scalar(FieldKind::Date) => "date",
            FieldType::Scalar(FieldKind::Time) => "time",
            FieldType::Scalar(FieldKind::Ref) => "ref",
            FieldType::List(FieldKind::Text) => "list_unicode",
            FieldType::List(FieldKind::Int) => "list_int",
            FieldType::List(FieldKind::Float) => "list_float",
            FieldType::List(FieldKind::Bool) => "list_bool",
            FieldType::List(FieldKind::DateTime) => "list_datetime",
            FieldType::List(FieldKind::Date) => "list_date",
            FieldType::List(FieldKind::Time) => "list_time",
            FieldType::List(FieldKind::Ref) => "list_ref",
        }
    }

    /// SQLite column type used to store values of this field type. List
    /// fields store their joined encoding as text.
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldType::List(_) => "TEXT",
            FieldType::Scalar(kind) => match kind {
                FieldKind::Text | FieldKind::Ref => "TEXT",
                FieldKind::Int => "INTEGER",
                FieldKind::Float => "REAL",
                FieldKind::Bool => "BOOLEAN",
                FieldKind::DateTime => "TIMESTAMP",
                FieldKind::Date => "DATE",
                FieldKind::Time => "TIME",
            },
        }
    }
}

fn kind_accepts(declared: FieldKind, found: FieldKind) -> bool {
    declared == found
        || (declared == FieldKind::Ref && found == FieldKind::Text)
        || (declared == FieldKind::Text && found == FieldKind::Ref)
        || (declared == FieldKind::Float && found == FieldKind::Int)
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = Error;

    fn from_str(s: &str) -> Result<FieldType> {
        let (list, kind) = match s.strip_prefix("list_") {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let kind = match kind {
            "unicode" => FieldKind::Text,
            "int" => FieldKind::Int,
            "float" => FieldKind::Float,
            "bool" => FieldKind::Bool,
            "datetime" => FieldKind::DateTime,
            "date" => FieldKind::Date,
            "time" => FieldKind::Time,
            "ref" => FieldKind::Ref,
            _ => return Err(Error::Decode(format!("unknown field type '{}'", s))),
        };
        Ok(if list {
            FieldType::List(kind)
        } else {
            FieldType::Scalar(kind)
        })
    }
}

/// All sixteen field types, in the order of the stable name vocabulary.
pub const ALL_FIELD_TYPES: [FieldType; 16] = [
    FieldType::Scalar(FieldKind::Text),
    FieldType::Scalar(FieldKind::Int),
    FieldType::Scalar(FieldKind::Float),
    FieldType::Scalar(FieldKind::Bool),
    FieldType::Scalar(FieldKind::DateTime),
    FieldType::Scalar(FieldKind::Date),
    FieldType::Scalar(FieldKind::Time),
    FieldType::Scalar(FieldKind::Ref),
    FieldType::List(FieldKind::Text),
    FieldType::List(FieldKind::Int),
    FieldType::List(FieldKind::Float),
    FieldType::List(FieldKind::Bool),
    FieldType::List(FieldKind::DateTime),
    FieldType::List(FieldKind::Date),
    FieldType::List(FieldKind::Time),
    FieldType::List(FieldKind::Ref),
];

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_infer_scalars() {
        assert_eq!(
            FieldType::infer(&Value::Text("x".to_string())).unwrap(),
            FieldType::Scalar(FieldKind::Text)
        );
        assert_eq!(
            FieldType::infer(&Value::Int(3)).unwrap(),
            FieldType::Scalar(FieldKind::Int)
        );
        assert_eq!(
            FieldType::infer(&Value::Ref("study/0".to_string())).unwrap(),
            FieldType::Scalar(FieldKind::Ref)
        );
    }

    #[test]
    fn test_infer_list_from_first_element() {
        let list = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(
            FieldType::infer(&list).unwrap(),
            FieldType::List(FieldKind::Int)
        );
    }

    #[test]
    fn test_infer_checks_every_list_element() {
        let list = Value::List(vec![Value::Int(1), Value::Text("two".to_string())]);
        let err = FieldType::infer(&list).unwrap_err();
        assert!(matches!(
            err,
            Error::TypeMismatch { expected, found, .. }
                if expected == "list_int" && found == "unicode"
        ));
        // Float lists still take integer elements.
        let list = Value::List(vec![Value::Float(1.5), Value::Int(2)]);
        assert_eq!(
            FieldType::infer(&list).unwrap(),
            FieldType::List(FieldKind::Float)
        );
    }

    #[test]
    fn test_infer_empty_list_fails() {
        let err = FieldType::infer(&Value::List(vec![])).unwrap_err();
        assert!(matches!(err, crate::error::Error::EmptyList(_)));
    }

    #[test]
    fn test_accepts_coercions() {
        let float = FieldType::Scalar(FieldKind::Float);
        assert!(float.accepts(&FieldType::Scalar(FieldKind::Int)));
        let r = FieldType::Scalar(FieldKind::Ref);
        assert!(r.accepts(&FieldType::Scalar(FieldKind::Text)));
        assert!(!r.accepts(&FieldType::Scalar(FieldKind::Int)));
        assert!(!r.accepts(&FieldType::List(FieldKind::Ref)));
    }

    #[test]
    fn test_stable_names() {
        assert_eq!(FieldType::Scalar(FieldKind::Text).as_str(), "unicode");
        assert_eq!(FieldType::List(FieldKind::Ref).as_str(), "list_ref");
        assert_eq!(
            "list_datetime".parse::<FieldType>().unwrap(),
            FieldType::List(FieldKind::DateTime)
        );
        assert!("list".parse::<FieldType>().is_err());
        assert!("text".parse::<FieldType>().is_err());
    }

    proptest! {
        #[test]
        fn prop_type_string_round_trip(index in 0usize..16) {
            let t = ALL_FIELD_TYPES[index];
            prop_assert_eq!(t.as_str().parse::<FieldType>().unwrap(), t);
        }
    }
}
