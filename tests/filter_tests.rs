use std::collections::HashMap;

use flowfilter::{
    ColumnDef, ColumnKind, Comparison, Configuration, Filter, GroupDef, Schema, TimeWindow, Value,
};

fn row(values: &[(&str, Value)]) -> HashMap<String, Value> {
    values
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn compile(filter: &str) -> String {
    let conf = Configuration::new(filter, Schema::builtin());
    Filter::new(&conf).unwrap().get_filter()
}

#[test]
fn test_group_broadcast_matches_any_member() {
    let schema = Schema::new(
        vec![
            ColumnDef::new(["%a"], ["e0id100"], ColumnKind::Number),
            ColumnDef::new(["%b"], ["e0id101"], ColumnKind::Number),
        ],
        vec![GroupDef::new("%ab", ["%a", "%b"], false)],
    )
    .unwrap();
    let conf = Configuration::new("%ab == 5", schema);
    let filter = Filter::new(&conf).unwrap();

    assert_eq!(filter.get_filter(), "e0id100 == 5 OR e0id101 == 5");
    assert!(filter.is_valid(&row(&[
        ("e0id100", Value::Int(1)),
        ("e0id101", Value::Int(5)),
    ])));
    assert!(filter.is_valid(&row(&[("e0id100", Value::Int(5))])));
    assert!(!filter.is_valid(&row(&[
        ("e0id100", Value::Int(1)),
        ("e0id101", Value::Int(2)),
    ])));
}

#[test]
fn test_compilation_is_deterministic() {
    let text = "%sa 10.0.0.0/8 and (%dp > 1024 or not %pr tcp)";
    let first = Configuration::new(text, Schema::builtin());
    let second = Configuration::new(text, Schema::builtin());
    assert_eq!(
        Filter::new(&first).unwrap().get_filter(),
        Filter::new(&second).unwrap().get_filter()
    );
}

#[test]
fn test_empty_filter_is_identity() {
    let conf = Configuration::new("", Schema::builtin());
    let filter = Filter::new(&conf).unwrap();
    assert_eq!(filter.get_filter(), "");
    assert!(filter.is_valid(&row(&[])));
    assert!(filter.is_valid(&row(&[("e0id4", Value::Int(6))])));

    let conf = conf.clone().with_time_window(TimeWindow::new(10, 20));
    let filter = Filter::new(&conf).unwrap();
    assert_eq!(filter.get_filter(), "e0id150 >= 10 AND e0id150 <= 20");
    assert!(filter.is_valid(&row(&[])));
}

#[test]
fn test_default_filter_has_no_schema() {
    let filter = Filter::default();
    assert_eq!(filter.get_filter(), "");
    assert!(filter.is_valid(&row(&[("anything", Value::from("x"))])));
    assert!(!filter.requires_row_check());
}

#[test]
fn test_time_window_wraps_predicate() {
    let conf = Configuration::new("%dp 80 or %dp 443", Schema::builtin())
        .with_time_window(TimeWindow::new(1308141045, 1308144645));
    let filter = Filter::new(&conf).unwrap();

    assert_eq!(
        filter.get_filter(),
        "(e0id11 == 80 OR e0id11 == 443) AND e0id150 >= 1308141045 AND e0id150 <= 1308144645"
    );
    assert_eq!(filter.predicate_text(), "e0id11 == 80 OR e0id11 == 443");
}

#[test]
fn test_custom_timestamp_column() {
    let schema = Schema::builtin().with_timestamp_column("e0id152");
    let conf = Configuration::new("", schema).with_time_window(TimeWindow::new(0, 1));
    assert_eq!(
        Filter::new(&conf).unwrap().get_filter(),
        "e0id152 >= 0 AND e0id152 <= 1"
    );
}

#[test]
fn test_flag_order_does_not_matter() {
    assert_eq!(compile("%flg SA"), compile("%flg AS"));
    assert_eq!(compile("%flg sa"), "(e0id6 & 18) == 18");

    let conf = Configuration::new("%flg SA", Schema::builtin());
    let filter = Filter::new(&conf).unwrap();
    assert!(filter.is_valid(&row(&[("e0id6", Value::Int(0x12))])));
    assert!(filter.is_valid(&row(&[("e0id6", Value::Int(0x1b))])));
    assert!(!filter.is_valid(&row(&[("e0id6", Value::Int(0x02))])));
}

#[test]
fn test_subnet_never_compiles_to_equality() {
    for text in [
        "%sa4 192.168.0.0/16",
        "%sa4 == 192.168.0.0/16",
        "%sa6 2001:db8::/32",
        "%ip 10.0.0.0/8",
    ] {
        let compiled = compile(text);
        assert!(!compiled.contains("=="), "{} compiled to {}", text, compiled);
        assert!(compiled.contains(">="), "{} compiled to {}", text, compiled);
    }
}

#[test]
fn test_subnet_membership_on_rows() {
    let conf = Configuration::new("%sa4 192.168.0.0/16", Schema::builtin());
    let filter = Filter::new(&conf).unwrap();

    // 192.168.1.1 and 192.169.0.0
    assert!(filter.is_valid(&row(&[("e0id8", Value::Int(3232235777))])));
    assert!(!filter.is_valid(&row(&[("e0id8", Value::Int(3232301056))])));
}

#[test]
fn test_ipv6_rows_use_both_halves() {
    let conf = Configuration::new("%sa6 2001:db8::1", Schema::builtin());
    let filter = Filter::new(&conf).unwrap();

    let high = 0x2001_0db8_0000_0000u64;
    assert!(filter.is_valid(&row(&[
        ("e0id27p0", Value::Uint(high)),
        ("e0id27p1", Value::Uint(1)),
    ])));
    assert!(!filter.is_valid(&row(&[
        ("e0id27p0", Value::Uint(high)),
        ("e0id27p1", Value::Uint(2)),
    ])));
}

#[test]
fn test_ip_group_mixes_address_families() {
    assert_eq!(
        compile("%sa 10.0.0.1"),
        "e0id8 == 167772161"
    );
    assert_eq!(
        compile("%sa ::1"),
        "e0id27p0 == 0 AND e0id27p1 == 1"
    );
}

#[test]
fn test_negation_is_pushed_into_comparisons() {
    let text = compile("not (%pr tcp or %dp 80)");
    assert_eq!(text, "e0id4 != 6 AND e0id11 != 80");
    assert!(!text.to_lowercase().contains("not"));
}

#[test]
fn test_aggregate_group() {
    let conf = Configuration::new("%volume > 1m", Schema::builtin());
    let filter = Filter::new(&conf).unwrap();
    assert_eq!(
        filter.get_filter(),
        "sum(e0id2) > 1000000 OR sum(e0id1) > 1000000"
    );

    assert!(filter.is_valid(&row(&[("sum(e0id1)", Value::Int(2_000_000))])));
    assert!(filter.is_valid(&row(&[("e0id2", Value::Int(2_000_000))])));
    assert!(!filter.is_valid(&row(&[("e0id1", Value::Int(10))])));
}

#[test]
fn test_dns_names_are_decoded_on_rows() {
    let conf = Configuration::new("%dns Example.COM", Schema::builtin());
    let filter = Filter::new(&conf).unwrap();

    assert!(filter.requires_row_check());
    assert_eq!(filter.get_filter(), "");
    assert_eq!(
        filter.predicate_tree().unwrap().to_string(),
        r#"e8057id4 == "example.com""#
    );
    assert!(filter.is_valid(&row(&[("e8057id4", Value::from("EXAMPLE.com."))])));
    assert!(filter.is_valid(&row(&[(
        "e8057id4",
        Value::from("\u{7}example\u{3}com\u{0}")
    )])));
    assert!(!filter.is_valid(&row(&[("e8057id4", Value::from("example.org"))])));
}

#[test]
fn test_urls_are_percent_decoded_on_rows() {
    let conf = Configuration::new(r#"%url "/a b""#, Schema::builtin());
    let filter = Filter::new(&conf).unwrap();

    assert!(filter.is_valid(&row(&[("e39499id20", Value::from("/a%20b"))])));
    assert!(!filter.is_valid(&row(&[("e39499id20", Value::from("/a%2"))])));
}

#[test]
fn test_encoded_url_literal_matches_identical_row() {
    let conf = Configuration::new(r#"%url "/a%20b""#, Schema::builtin());
    let filter = Filter::new(&conf).unwrap();

    assert!(filter.is_valid(&row(&[("e39499id20", Value::from("/a%20b"))])));
    assert!(filter.is_valid(&row(&[("e39499id20", Value::from("/a b"))])));
    assert!(!filter.is_valid(&row(&[("e39499id20", Value::from("/a%2520b"))])));
}

/// Evaluate the engine's view of `filter`: the tree without decoded comparisons
fn engine_accepts(filter: &Filter<'_>, values: &HashMap<String, Value>) -> bool {
    match filter.predicate_tree() {
        Some(tree) => match tree.relax(&|c: &Comparison| !c.needs_row_check()) {
            Some(engine) => {
                assert_eq!(engine.to_string(), filter.predicate_text());
                engine.eval(&|c: &Comparison| c.matches(values))
            }
            None => {
                assert_eq!(filter.predicate_text(), "");
                true
            }
        },
        None => true,
    }
}

#[test]
fn test_engine_text_never_drops_decoded_matches() {
    let wire = Value::from("\u{7}example\u{3}com\u{0}");
    let rows = [
        row(&[("e8057id4", wire.clone()), ("e0id11", Value::Int(53))]),
        row(&[("e8057id4", wire.clone()), ("e0id11", Value::Int(54))]),
        row(&[("e8057id4", Value::from("example.com")), ("e0id11", Value::Int(53))]),
        row(&[("e8057id4", Value::from("example.org")), ("e0id11", Value::Int(53))]),
        row(&[("e39499id20", Value::from("/a%20b")), ("e0id11", Value::Int(80))]),
    ];

    for text in [
        "%dns example.com",
        "%dns example.com and %dp 53",
        "%dns example.com or %dp 54",
        "not %dns example.com and %dp 53",
        r#"%url "/a b" and %dp 80"#,
    ] {
        let conf = Configuration::new(text, Schema::builtin());
        let filter = Filter::new(&conf).unwrap();
        assert!(filter.requires_row_check(), "{}", text);
        assert!(!filter.get_filter().contains("e8057id4"), "{}", text);
        assert!(!filter.get_filter().contains("e39499id20"), "{}", text);

        for values in &rows {
            if filter.is_valid(values) {
                assert!(engine_accepts(&filter, values), "{} on {:?}", text, values);
            }
        }
    }

    let conf = Configuration::new("%dns example.com and %dp 53", Schema::builtin());
    let filter = Filter::new(&conf).unwrap();
    assert_eq!(filter.get_filter(), "e0id11 == 53");
    assert!(filter.is_valid(&rows[0]));
    assert!(!filter.is_valid(&rows[1]));
}

#[test]
fn test_malformed_row_values_do_not_match() {
    let conf = Configuration::new("%dp > 10", Schema::builtin());
    let filter = Filter::new(&conf).unwrap();
    assert!(!filter.is_valid(&row(&[("e0id11", Value::from("eleven"))])));
    assert!(!filter.is_valid(&row(&[])));
}

#[test]
fn test_timestamps_compile_to_epoch_seconds() {
    assert_eq!(
        compile("%ts > 2011/06/15.12:30:45"),
        "e0id150 > 1308141045"
    );
}
