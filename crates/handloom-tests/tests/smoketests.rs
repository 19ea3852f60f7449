//! End-to-end scenarios: tables built from grammar definitions, driven by
//! the scanner and deterministic parser.

use handloom::{build, Method};
use handloom_runtime::definition::Span;
use handloom_runtime::{parse, ParseError, Parser, Scanner};
use handloom_tests::grammars;
use handloom_tests::{
    calc_scanner, json_scanner, CalcDriver, CalcScanDriver, JsonDriver, JsonScanDriver,
    RecordingDriver, TextDriver, Value,
};

#[test]
fn json_end_to_end() {
    let grammar = grammars::json();
    let (table, warnings) = build(&grammar, Method::Minimal).unwrap();
    assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");

    let scan_tables = json_scanner();
    let text = r#"[1, "a", null, {"k": true}]"#;
    let scanner = Scanner::new(
        &scan_tables,
        text,
        JsonScanDriver::new(&table),
        handloom::INITIAL,
    )
    .unwrap();
    let value = parse(&table, JsonDriver, None, scanner).unwrap();
    assert_eq!(
        value,
        Value::List(vec![
            Value::Num(1.0),
            Value::str("a"),
            Value::Null,
            Value::Object(vec![("k".to_owned(), Value::Bool(true))]),
        ])
    );
}

fn eval(text: &str) -> f64 {
    let grammar = grammars::calculator();
    let (table, warnings) = build(&grammar, Method::Minimal).unwrap();
    assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    let scan_tables = calc_scanner();
    let scanner = Scanner::new(
        &scan_tables,
        text,
        CalcScanDriver::new(&table),
        handloom::INITIAL,
    )
    .unwrap();
    match parse(&table, CalcDriver, None, scanner).unwrap() {
        Value::Num(n) => n,
        other => panic!("calculator produced {other:?}"),
    }
}

#[test]
fn calculator_precedence() {
    assert_eq!(eval("2+3*4"), 14.0);
    assert_eq!(eval("(2+3)*4"), 20.0);
    // Exponentiation is right-associative and binds above unary minus.
    assert_eq!(eval("2^3^2"), 512.0);
    assert_eq!(eval("-1^2"), -1.0);
    assert_eq!(eval("-2*3"), -6.0);
    assert_eq!(eval("10-4-3"), 3.0);
}

#[test]
fn expected_tokens_at_premature_end() {
    let grammar = grammars::calculator();
    let (table, _) = build(&grammar, Method::Minimal).unwrap();
    let id = |name: &str| table.terminal(name).unwrap();

    let mut parser = Parser::new(&table, CalcDriver, None).unwrap();
    parser.feed(id("("), Value::Null, Span::new(0, 1)).unwrap();
    parser.feed(id("number"), Value::Num(5.0), Span::new(1, 2)).unwrap();
    parser.feed(id("+"), Value::Null, Span::new(2, 3)).unwrap();
    match parser.finish() {
        Err(ParseError::UnexpectedEof { expected }) => {
            for want in ["number", "(", "-"] {
                assert!(expected.iter().any(|t| t == want), "missing {want:?} in {expected:?}");
            }
            assert!(!expected.iter().any(|t| t == "+"));
        }
        other => panic!("expected an end-of-input error, got {other:?}"),
    }
}

#[test]
fn minimal_matches_canonical_where_lalr_fails() {
    let grammar = grammars::non_lalr().unwrap();
    let (minimal, min_warnings) = build(&grammar, Method::Minimal).unwrap();
    let (canonical, can_warnings) = build(&grammar, Method::Canonical).unwrap();
    assert!(min_warnings.is_empty(), "{min_warnings:?}");
    assert!(can_warnings.is_empty(), "{can_warnings:?}");
    // The merged construction cannot tell the two `e` reductions apart.
    let (lalr, lalr_warnings) = build(&grammar, Method::Lalr).unwrap();
    assert!(
        lalr_warnings.iter().any(|w| w.message.contains("reduce/reduce")),
        "LALR should report its conflict: {lalr_warnings:?}"
    );

    let accepted = |table: &handloom::ParseTable, input: &str| -> bool {
        let tokens = handloom_tests::char_tokens(table, input);
        parse(table, TextDriver, None, tokens).is_ok()
    };
    for sentence in ["aec", "afd", "bfc", "bed"] {
        // The grammar spells its middle terminal 'e'.
        let sentence = sentence.replace('f', "e");
        assert!(accepted(&minimal, &sentence), "minimal rejects {sentence:?}");
        assert!(accepted(&canonical, &sentence), "canonical rejects {sentence:?}");
    }
    assert!(!accepted(&minimal, "aee"));
    assert!(!accepted(&canonical, "ed"));
    // Forced to pick the earliest rule, the merged table misparses one
    // corner of the language.
    assert!(accepted(&lalr, "aec"));
    assert!(!accepted(&lalr, "bec"));

    // The point of the exercise: LR(1) strength only where needed.
    use handloom_runtime::definition::ParserTables;
    assert!(minimal.state_count() <= canonical.state_count());
}

#[test]
fn message_stream_is_method_independent() {
    // Renaming elimination and method choice must not be observable in the
    // sequence of semantic messages.
    let grammar = grammars::json();
    let text = r#"{"k": [1, null]}"#;
    let mut streams = Vec::new();
    for method in [Method::Lalr, Method::Canonical, Method::Minimal] {
        let (table, _) = build(&grammar, method).unwrap();
        let scan_tables = json_scanner();
        let scanner = Scanner::new(
            &scan_tables,
            text,
            JsonScanDriver::new(&table),
            handloom::INITIAL,
        )
        .unwrap();
        let mut driver = RecordingDriver::default();
        parse(&table, &mut driver, None, scanner).unwrap();
        streams.push(driver.messages);
    }
    assert_eq!(streams[0], streams[1]);
    assert_eq!(streams[1], streams[2]);
    assert_eq!(
        streams[0],
        vec!["first", "null", "append", "array", "pair", "first", "object"]
    );
}

#[test]
fn macro_expansion_builds_lists() {
    let grammar = grammars::macro_list();
    let (table, warnings) = build(&grammar, Method::Minimal).unwrap();
    assert!(warnings.is_empty(), "{warnings:?}");
    let number = table.terminal("number").unwrap();
    let comma = table.terminal(",").unwrap();
    let tokens = vec![
        (number, Value::Num(1.0), Span::new(0, 1)),
        (comma, Value::Null, Span::new(1, 2)),
        (number, Value::Num(2.0), Span::new(2, 3)),
        (comma, Value::Null, Span::new(3, 4)),
        (number, Value::Num(3.0), Span::new(4, 5)),
    ];
    let mut driver = RecordingDriver::default();
    parse(&table, &mut driver, None, tokens).unwrap();
    assert_eq!(driver.messages, vec!["first", "append", "append", "doc"]);
}

#[test]
fn multiple_start_symbols_share_tables() {
    let mut g = handloom::GrammarDef::new();
    g.rule("sum", handloom::Alt::new([".sum", "+", ".item"]).msg("add"));
    g.rule("sum", handloom::Alt::new([".item"]));
    g.rule("item", handloom::Alt::new(["number"]));
    g.start("sum");
    g.start("item");
    let (grammar, _) = g.end().unwrap();
    let (table, _) = build(&grammar, Method::Minimal).unwrap();
    let number = grammar.find_terminal("number").unwrap();
    let plus = grammar.find_terminal("+").unwrap();

    let tokens = |n: usize| {
        let mut out = Vec::new();
        for i in 0..n {
            if i > 0 {
                out.push((plus, Value::Null, Span::default()));
            }
            out.push((number, Value::Num(1.0), Span::default()));
        }
        out
    };
    assert!(parse(&table, TextDriver, Some("sum"), tokens(3)).is_ok());
    assert!(parse(&table, TextDriver, Some("item"), tokens(1)).is_ok());
    // The "item" entry point does not admit sums.
    assert!(parse(&table, TextDriver, Some("item"), tokens(2)).is_err());
}
