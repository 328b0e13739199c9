use std::fs;

use flowfilter::{
    ColumnKind, Configuration, Filter, Schema, SchemaError, Semantics, TimeWindow,
};
use tempdir::TempDir;

const SCHEMA: &str = r#"{
    "columns": [
        { "aliases": ["%src", "%source"], "parts": ["e0id8"], "kind": "ipv4" },
        { "aliases": ["%dport"], "parts": ["e0id11"] },
        { "aliases": ["%proto"], "parts": ["e0id4"], "semantics": "protocol" },
        { "aliases": ["%octets"], "parts": ["e0id1"], "aggregation": "max" },
        { "aliases": ["%v6"], "parts": ["e0id27p0", "e0id27p1"], "kind": "ipv6" },
        { "aliases": ["%qname"], "parts": ["e8057id4"], "kind": "string", "semantics": "dns" }
    ],
    "groups": [
        { "alias": "%addr", "members": ["%src", "%v6"] },
        { "alias": "%traffic", "members": ["%octets"], "aggregate": true }
    ],
    "timestamp_column": "e0id152"
}"#;

#[test]
fn test_schema_from_json() {
    let schema = Schema::from_json(SCHEMA).unwrap();

    let src = schema.column("%source").unwrap();
    assert_eq!(src.kind, ColumnKind::Ipv4);
    assert_eq!(src.parts, vec!["e0id8"]);

    let dport = schema.column("%dport").unwrap();
    assert_eq!(dport.kind, ColumnKind::Number);
    assert_eq!(dport.semantics, None);

    assert_eq!(
        schema.column("%qname").unwrap().semantics,
        Some(Semantics::Dns)
    );
    assert!(schema.group("%traffic").unwrap().aggregate);
    assert!(!schema.group("%addr").unwrap().aggregate);
    assert_eq!(schema.timestamp_column, "e0id152");
}

#[test]
fn test_schema_from_path() {
    let dir = TempDir::new("flowfilter").unwrap();
    let path = dir.path().join("schema.json");
    fs::write(&path, SCHEMA).unwrap();

    let schema = Schema::from_path(&path).unwrap();
    let conf = Configuration::new("%traffic > 10 and %proto icmp", schema)
        .with_time_window(TimeWindow::new(5, 6));
    let filter = Filter::new(&conf).unwrap();

    assert_eq!(
        filter.get_filter(),
        "(max(e0id1) > 10 AND e0id4 == 1) AND e0id152 >= 5 AND e0id152 <= 6"
    );
}

#[test]
fn test_missing_schema_file() {
    let dir = TempDir::new("flowfilter").unwrap();
    let result = Schema::from_path(dir.path().join("missing.json"));
    assert!(matches!(result, Err(SchemaError::Io(_))));
}

#[test]
fn test_malformed_schema_json() {
    assert!(matches!(
        Schema::from_json(r#"{ "columns": [ { "aliases": ["%a"] } ] }"#),
        Err(SchemaError::Json(_))
    ));
    assert!(matches!(
        Schema::from_json(r#"{ "columns": [ { "aliases": ["%a"], "parts": ["x"], "kind": "float" } ] }"#),
        Err(SchemaError::Json(_))
    ));
}

#[test]
fn test_invalid_schema_rules() {
    let no_parts = r#"{ "columns": [ { "aliases": ["%a"], "parts": [] } ] }"#;
    assert!(matches!(
        Schema::from_json(no_parts),
        Err(SchemaError::Invalid(_))
    ));

    let bad_group = r#"{
        "columns": [ { "aliases": ["%a"], "parts": ["e0id1"] } ],
        "groups": [ { "alias": "%g", "members": ["%a", "%b"] } ]
    }"#;
    assert!(matches!(
        Schema::from_json(bad_group),
        Err(SchemaError::Invalid(msg)) if msg.contains("%b")
    ));
}

#[test]
fn test_schema_roundtrips_through_configuration_json() {
    let conf = Configuration::new("%dport 22", Schema::from_json(SCHEMA).unwrap());
    let json = serde_json::to_string(&conf).unwrap();
    let back: Configuration = serde_json::from_str(&json).unwrap();
    assert_eq!(back, conf);
    assert_eq!(
        Filter::new(&back).unwrap().get_filter(),
        "e0id11 == 22"
    );
}

#[test]
fn test_group_of_mixed_families_from_file_schema() {
    let schema = Schema::from_json(SCHEMA).unwrap();
    let conf = Configuration::new("%addr 192.0.2.0/24", schema);
    assert_eq!(
        Filter::new(&conf).unwrap().get_filter(),
        "e0id8 >= 3221225984 AND e0id8 <= 3221226239"
    );
}
