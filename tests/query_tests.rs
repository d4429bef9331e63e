//! DocQL end-to-end tests: parse, compile, execute, decode.

use doculite::{Database, Document, Value};
use std::collections::HashSet;

/// Two studies, two subjects each, one acquisition per subject.
fn seed() -> Database {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let db = Database::open_in_memory().unwrap();
    for s in 0..2 {
        let study_name = format!("study{:03}", s);
        let study_ref = db
            .store(
                &[("name".to_string(), Value::from(study_name.clone()))]
                    .into_iter()
                    .collect::<Document>(),
                Some("study"),
                Some(&s.to_string()),
            )
            .unwrap();
        for j in 0..2 {
            let subject_id = format!("s{}{}", s, j);
            let code = format!("{}_subject{:03}", study_name, j);
            let subject_ref = db
                .store(
                    &[
                        ("code".to_string(), Value::from(code)),
                        ("in_study".to_string(), Value::Ref(study_ref.clone())),
                    ]
                    .into_iter()
                    .collect::<Document>(),
                    Some("subject"),
                    Some(&subject_id),
                )
                .unwrap();
            db.store(
                &[
                    ("kind".to_string(), Value::from(format!("t1_{}", subject_id))),
                    ("of_subject".to_string(), Value::Ref(subject_ref.clone())),
                    (
                        "concerns".to_string(),
                        Value::List(vec![
                            Value::Ref(subject_ref.clone()),
                            Value::Ref(study_ref.clone()),
                        ]),
                    ),
                ]
                .into_iter()
                .collect::<Document>(),
                Some("acquisition"),
                Some(&format!("a{}{}", s, j)),
            )
            .unwrap();
        }
    }
    db
}

fn strings(docs: &[Document], key: &str) -> HashSet<String> {
    docs.iter()
        .filter_map(|d| d.get(key))
        .filter_map(|v| v.as_str())
        .map(|s| s.to_string())
        .collect()
}

#[test]
fn test_join_subjects_of_one_study() {
    let db = seed();
    let docs = db
        .execute(r#"select subject where subject.in_study = study and study.name = "study000""#)
        .unwrap();
    assert_eq!(
        strings(&docs, "subject.code"),
        HashSet::from([
            "study000_subject000".to_string(),
            "study000_subject001".to_string(),
        ])
    );
}

#[test]
fn test_in_over_list_field() {
    let db = seed();
    let docs = db
        .execute(r#"select acquisition.kind where "subject/s00" in acquisition.concerns"#)
        .unwrap();
    assert_eq!(
        strings(&docs, "acquisition.kind"),
        HashSet::from(["t1_s00".to_string()])
    );
}

#[test]
fn test_in_over_bare_collection() {
    let db = seed();
    let docs = db
        .execute("select acquisition.kind where acquisition.of_subject in subject")
        .unwrap();
    assert_eq!(docs.len(), 4);
}

#[test]
fn test_and_or_chains_to_the_right() {
    let db = Database::open_in_memory().unwrap();
    let flags = [(0, 0, 1), (1, 0, 1), (1, 1, 0)];
    for (i, (a, b, c)) in flags.iter().enumerate() {
        db.store(
            &[
                ("a".to_string(), Value::from(*a as i64)),
                ("b".to_string(), Value::from(*b as i64)),
                ("c".to_string(), Value::from(*c as i64)),
            ]
            .into_iter()
            .collect::<Document>(),
            Some("flags"),
            Some(&i.to_string()),
        )
        .unwrap();
    }
    // a = 1 and (b = 1 or c = 1): document 0 fails on `a`, even though
    // a left-to-right reading (a and b) or c would admit it.
    let docs = db
        .execute("select flags where flags.a = 1 and flags.b = 1 or flags.c = 1")
        .unwrap();
    assert_eq!(
        strings(&docs, "flags._id"),
        HashSet::from(["1".to_string(), "2".to_string()])
    );
}

#[test]
fn test_alias_renames_result_key() {
    let db = seed();
    let docs = db
        .execute(r#"select study.name as label where study.name = "study001""#)
        .unwrap();
    assert_eq!(strings(&docs, "label"), HashSet::from(["study001".to_string()]));
}

#[test]
fn test_placeholder_binds_external_value() {
    let db = seed();
    let docs = db
        .execute_with(
            "select subject.code where subject.in_study = ?",
            &[Value::Ref("study/1".to_string())],
        )
        .unwrap();
    assert_eq!(
        strings(&docs, "subject.code"),
        HashSet::from([
            "study001_subject000".to_string(),
            "study001_subject001".to_string(),
        ])
    );
}

#[test]
fn test_unqualified_field_resolves_against_selected_collection() {
    let db = seed();
    let docs = db
        .execute(r#"select subject where .code = "study000_subject000""#)
        .unwrap();
    assert_eq!(docs.len(), 1);
}

#[test]
fn test_where_only_projects_all_referenced_fields() {
    let db = seed();
    let docs = db.execute(r#"where study.name = "study000""#).unwrap();
    assert_eq!(docs.len(), 1);
    assert!(docs[0].contains_key("study._id"));
    assert!(docs[0].contains_key("study._ref"));
    assert_eq!(docs[0]["study.name"], Value::from("study000"));
}

#[test]
fn test_refs_decode_as_refs() {
    let db = seed();
    let docs = db
        .execute(r#"select subject.in_study where subject.code = "study000_subject000""#)
        .unwrap();
    assert_eq!(
        docs[0]["subject.in_study"],
        Value::Ref("study/0".to_string())
    );
}

#[test]
fn test_execute_values_keeps_null_columns() {
    let db = Database::open_in_memory().unwrap();
    db.store(
        &[("a".to_string(), Value::from(1))]
            .into_iter()
            .collect::<Document>(),
        Some("t"),
        Some("0"),
    )
    .unwrap();
    db.store(
        &[("b".to_string(), Value::from(2))]
            .into_iter()
            .collect::<Document>(),
        Some("t"),
        Some("1"),
    )
    .unwrap();
    let rows = db.execute_values("select t.a").unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.contains(&vec![Some(Value::Int(1))]));
    assert!(rows.contains(&vec![None]));
}

#[test]
fn test_lists_decode_in_order_from_queries() {
    let db = seed();
    let docs = db
        .execute(r#"select acquisition.concerns where acquisition.kind = "t1_s01""#)
        .unwrap();
    assert_eq!(
        docs[0]["acquisition.concerns"],
        Value::List(vec![
            Value::Ref("subject/s01".to_string()),
            Value::Ref("study/0".to_string()),
        ])
    );
}
