//! JSON dump/restore round-trip tests.

use chrono::NaiveDate;
use doculite::{interchange, Database, Document, Value};
use std::collections::HashSet;

fn sample() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.store(
        &[
            ("name".to_string(), Value::from("study000")),
            (
                "started".to_string(),
                Value::Date(NaiveDate::from_ymd_opt(2014, 6, 1).unwrap()),
            ),
            ("active".to_string(), Value::from(true)),
            ("weight".to_string(), Value::from(2.5)),
        ]
        .into_iter()
        .collect::<Document>(),
        Some("study"),
        Some("0"),
    )
    .unwrap();
    db.store(
        &[
            ("code".to_string(), Value::from("s0")),
            ("in_study".to_string(), Value::Ref("study/0".to_string())),
            (
                "scores".to_string(),
                Value::List(vec![Value::from(3), Value::from(1), Value::from(2)]),
            ),
        ]
        .into_iter()
        .collect::<Document>(),
        Some("subject"),
        Some("1"),
    )
    .unwrap();
    let study = db.get_collection("study").unwrap().unwrap();
    study.create_index("name").unwrap();
    db
}

fn schema_of(db: &Database, collection: &str) -> Vec<(String, String)> {
    db.get_collection(collection)
        .unwrap()
        .unwrap()
        .fields()
        .iter()
        .map(|f| (f.name.clone(), f.field_type.as_str().to_string()))
        .collect()
}

fn documents_of(db: &Database, collection: &str) -> Vec<Document> {
    db.get_collection(collection)
        .unwrap()
        .unwrap()
        .documents()
        .unwrap()
}

#[test]
fn test_round_trip_reproduces_schema_and_documents() {
    let source = sample();
    let dump = interchange::dump(&source).unwrap();

    let target = Database::open_in_memory().unwrap();
    interchange::restore(&target, &dump).unwrap();

    for collection in ["study", "subject"] {
        assert_eq!(schema_of(&source, collection), schema_of(&target, collection));
        assert_eq!(
            documents_of(&source, collection),
            documents_of(&target, collection)
        );
    }
    assert_eq!(source.collections().unwrap(), target.collections().unwrap());
}

#[test]
fn test_round_trip_through_text() {
    let source = sample();
    let text = interchange::dump_to_string(&source).unwrap();

    let target = Database::open_in_memory().unwrap();
    interchange::restore_from_str(&target, &text).unwrap();
    assert_eq!(
        documents_of(&source, "subject"),
        documents_of(&target, "subject")
    );
}

#[test]
fn test_indices_survive_restore() {
    let source = sample();
    let dump = interchange::dump(&source).unwrap();

    let target = Database::open_in_memory().unwrap();
    interchange::restore(&target, &dump).unwrap();
    let indices: HashSet<String> = target
        .get_collection("study")
        .unwrap()
        .unwrap()
        .indices()
        .unwrap()
        .into_iter()
        .collect();
    assert!(indices.contains("name"));
    assert!(indices.contains("_id"));
    assert!(indices.contains("_ref"));
}

#[test]
fn test_restored_queries_match() {
    let source = sample();
    let text = interchange::dump_to_string(&source).unwrap();
    let target = Database::open_in_memory().unwrap();
    interchange::restore_from_str(&target, &text).unwrap();

    let docs = target
        .execute(r#"select subject where subject.in_study = study and study.name = "study000""#)
        .unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["subject.code"], Value::from("s0"));
}

#[test]
fn test_malformed_dump_rejected() {
    let db = Database::open_in_memory().unwrap();
    let err = interchange::restore_from_str(&db, r#"{"documents": []}"#).unwrap_err();
    assert!(matches!(err, doculite::Error::Decode(_)));
}
