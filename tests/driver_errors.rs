use flowfilter::{CompileError, Configuration, Filter, InvalidFilter, LiteralKind, Schema};

fn compile_err(filter: &str) -> InvalidFilter {
    let conf = Configuration::new(filter, Schema::builtin());
    match Filter::new(&conf) {
        Ok(f) => panic!("expected '{}' to fail, compiled to '{}'", filter, f.get_filter()),
        Err(e) => e,
    }
}

#[test]
fn test_syntax_error_has_location() {
    let err = compile_err("%dp 80 and (%sp 22");
    match err.cause() {
        CompileError::Syntax { line, col, .. } => {
            assert_eq!(*line, 1);
            assert_eq!(*col, 19);
        }
        other => panic!("expected syntax error, got {:?}", other),
    }
    assert!(err.to_string().contains("line 1"));
}

#[test]
fn test_syntax_error_on_later_line() {
    let err = compile_err("%dp 80\nand\n%sp");
    assert_eq!(err.cause().location().map(|(line, _)| line), Some(3));
}

#[test]
fn test_dangling_operator_gets_help() {
    let err = compile_err("%dp 80 and");
    match err.cause() {
        CompileError::Syntax { help, .. } => assert!(help.is_some()),
        other => panic!("expected syntax error, got {:?}", other),
    }
}

#[test]
fn test_format_errors() {
    let cases = [
        ("%sa4 300.1.1.1", LiteralKind::Ipv4),
        ("%sa4 10.0.0.0/33", LiteralKind::Ipv4Subnet),
        ("%sa6 2001:db8:::1", LiteralKind::Ipv6),
        ("%sa6 2001:db8::/129", LiteralKind::Ipv6Subnet),
        ("%ts > 2011/13/01.00:00:00", LiteralKind::Timestamp),
        ("%ts > 2011/1/01.00:00:00", LiteralKind::Timestamp),
        ("%byt > 5x", LiteralKind::Number),
        ("%flg SZ", LiteralKind::Flags),
    ];

    for (text, expected) in cases {
        match compile_err(text).cause() {
            CompileError::Format { kind, .. } => assert_eq!(*kind, expected, "{}", text),
            other => panic!("{}: expected format error, got {:?}", text, other),
        }
    }
}

#[test]
fn test_unknown_column_suggests_aliases() {
    let err = compile_err("%dpp 80");
    match err.cause() {
        CompileError::UnknownColumn { alias, suggestions } => {
            assert_eq!(alias, "%dpp");
            assert!(suggestions.as_deref().unwrap_or("").contains("%dp"));
        }
        other => panic!("expected unknown column, got {:?}", other),
    }
    assert_eq!(err.span.map(|s| s.offset()), Some(0));
}

#[test]
fn test_unknown_protocol() {
    assert!(matches!(
        compile_err("%pr bogus").cause(),
        CompileError::UnknownProtocol { name } if name == "bogus"
    ));
}

#[test]
fn test_type_mismatches() {
    for text in [
        r#"%dp "http""#,
        r#"%host < "a""#,
        "%sa4 ::1",
        "%dp 10.0.0.0/8",
        "%sa4 > 10.0.0.0/8",
        "%port 2001:db8::1",
        "%url & 1 == 1",
    ] {
        assert!(
            matches!(compile_err(text).cause(), CompileError::TypeMismatch { .. }),
            "{}",
            text
        );
    }
}

#[test]
fn test_errors_render_as_diagnostics() {
    let err = compile_err("%dp 80 or %nope 1");
    let rendered = format!("{:?}", miette::Report::new(err));
    assert!(rendered.contains("%nope"));
}
