//! Structured error recovery through `$error$` productions, trial-parse
//! commitment, and cascade dampening.

use handloom::{build, Method};
use handloom_runtime::definition::{Span, TerminalID};
use handloom_runtime::{ParseError, Parser};
use handloom_tests::grammars;
use handloom_tests::{RecordingDriver, Value};

struct Feeder {
    table: handloom::ParseTable,
}

impl Feeder {
    fn new() -> Self {
        let grammar = grammars::statements();
        let (table, warnings) = build(&grammar, Method::Minimal).unwrap();
        assert!(warnings.is_empty(), "{warnings:?}");
        Self { table }
    }

    fn id(&self, name: &str) -> TerminalID {
        self.table.terminal(name).unwrap()
    }

    fn token(&self, name: &str) -> (TerminalID, Value, Span) {
        let value = match name {
            "name" => Value::str("x"),
            "number" => Value::Num(1.0),
            _ => Value::Null,
        };
        (self.id(name), value, Span::default())
    }

    /// Feed whitespace-separated token names; return the driver however the
    /// parse ends.
    fn run(&self, names: &str) -> (Result<Value, ParseError>, RecordingDriver) {
        let mut driver = RecordingDriver::default();
        let mut parser = Parser::new(&self.table, &mut driver, None).unwrap();
        let mut outcome = None;
        for name in names.split_whitespace() {
            let (t, v, s) = self.token(name);
            if let Err(e) = parser.feed(t, v, s) {
                outcome = Some(Err(e));
                break;
            }
        }
        let result = match outcome {
            Some(r) => r,
            None => parser.finish(),
        };
        (result, driver)
    }
}

#[test]
fn recovers_at_the_semicolon_and_parses_the_tail_cleanly() {
    let feeder = Feeder::new();
    // "x := ;" is missing its expression; the error production swallows up
    // to the semicolon and the second statement parses untouched.
    let (result, driver) = feeder.run("name := ; name := number ;");
    assert!(result.is_ok(), "{result:?}");
    assert_eq!(driver.errors, 1, "exactly one error report");
    assert_eq!(driver.recoveries, 1);
    assert_eq!(driver.dead_ends, 0);
    assert_eq!(driver.messages, vec!["oops", "first", "assign", "append"]);
}

#[test]
fn discards_terminals_until_resynchronized() {
    let feeder = Feeder::new();
    // Garbage after the broken statement; the machine must slide forward to
    // the semicolon without looping and without a second report.
    let (result, driver) = feeder.run("name := ; name name name ; name := number ;");
    assert!(result.is_ok(), "{result:?}");
    assert_eq!(driver.errors, 1, "cascade was dampened");
    assert_eq!(driver.recoveries, 1);
    let assigns = driver.messages.iter().filter(|m| *m == "assign").count();
    assert_eq!(assigns, 1, "the clean tail statement parsed");
    assert!(driver.messages.contains(&"oops".to_owned()));
}

#[test]
fn recovery_at_end_of_input() {
    let feeder = Feeder::new();
    // The error production can still close out the parse when the input
    // ends during resynchronization.
    let (result, driver) = feeder.run("name := ;");
    assert!(result.is_ok(), "{result:?}");
    assert_eq!(driver.recoveries, 1);
    assert_eq!(driver.messages, vec!["oops", "first"]);
}

#[test]
fn no_recovery_without_error_productions() {
    let grammar = grammars::calculator();
    let (table, _) = build(&grammar, Method::Minimal).unwrap();
    let id = |name: &str| table.terminal(name).unwrap();
    let mut driver = RecordingDriver::default();
    let mut parser = Parser::new(&table, &mut driver, None).unwrap();
    parser.feed(id("number"), Value::Num(1.0), Span::default()).unwrap();
    let err = parser
        .feed(id(")"), Value::Null, Span::default())
        .unwrap_err();
    assert!(matches!(err, ParseError::Syntax { .. }), "{err:?}");
    assert_eq!(driver.errors, 1);
    assert_eq!(driver.dead_ends, 1);
}

#[test]
fn terminal_error_still_reports_expected_tokens() {
    let grammar = grammars::calculator();
    let (table, _) = build(&grammar, Method::Minimal).unwrap();
    let id = |name: &str| table.terminal(name).unwrap();
    let mut parser = Parser::new(&table, RecordingDriver::default(), None).unwrap();
    parser.feed(id("number"), Value::Num(1.0), Span::default()).unwrap();
    match parser.feed(id("("), Value::Null, Span::new(4, 5)) {
        Err(ParseError::Syntax { expected, span, .. }) => {
            assert_eq!(span, Span::new(4, 5));
            // After a complete expression, only operators or the end fit.
            for want in ["+", "-", "*", "/", "^"] {
                assert!(expected.iter().any(|t| t == want), "missing {want:?}");
            }
            assert!(expected.iter().any(|t| t == "end of input"));
            assert!(!expected.iter().any(|t| t == "number"));
        }
        other => panic!("expected a syntax error, got {other:?}"),
    }
}
