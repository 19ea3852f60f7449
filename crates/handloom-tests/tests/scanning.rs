//! Scanner behavior: longest match, ranks, conditions, trailing context,
//! anchors, and the stuck-scanner escape hatch.

use std::collections::HashMap;

use handloom::{ScannerDef, ScannerTables, INITIAL};
use handloom_runtime::definition::{Span, TerminalID};
use handloom_runtime::{Lexeme, ScanActions, Scanner};
use handloom_tests::Value;

/// Emits one token per action, kind chosen by action name; a few action
/// names get special behavior for the condition tests.
struct Collector {
    kinds: HashMap<&'static str, TerminalID>,
}

impl Collector {
    fn new(names: &[&'static str]) -> Self {
        let kinds = names
            .iter()
            .enumerate()
            .map(|(i, &n)| (n, TerminalID::from_raw(i as u16 + TerminalID::OFFSET)))
            .collect();
        Self { kinds }
    }
}

impl ScanActions for Collector {
    type Value = Value;

    fn recognizes(&self, action: &str) -> bool {
        action == "ignore"
            || action == "begin_string"
            || action == "end_string"
            || self.kinds.contains_key(action)
    }

    fn invoke(&mut self, yy: &mut Lexeme<'_, '_, Value>, action: &str) {
        match action {
            "ignore" => {}
            "begin_string" => yy.push("STR"),
            "end_string" => {
                yy.pop();
                yy.token(self.kinds["stringish"], Value::str(yy.matched_text()));
            }
            other => {
                let kind = self.kinds[other];
                yy.token(kind, Value::str(yy.matched_text()));
            }
        }
    }
}

/// Run a scanner and render the stream as (kind-name, lexeme) pairs, also
/// checking that emission is strictly in source order.
fn tokens_of(tables: &ScannerTables, names: &[&'static str], text: &str) -> Vec<(String, String)> {
    let driver = Collector::new(names);
    let lookup: HashMap<TerminalID, &'static str> =
        driver.kinds.iter().map(|(&k, &v)| (v, k)).collect();
    let scanner = Scanner::new(tables, text, driver, INITIAL).unwrap();
    let mut last: Option<Span> = None;
    scanner
        .map(|(kind, value, span)| {
            if let Some(prev) = last {
                assert!(span.start >= prev.start, "tokens out of order");
            }
            last = Some(span);
            let text = match value {
                Value::Str(s) => s,
                other => format!("{other:?}"),
            };
            ((*lookup.get(&kind).unwrap_or(&"?")).to_owned(), text)
        })
        .collect()
}

#[test]
fn leftmost_longest() {
    let mut s = ScannerDef::new();
    s.rule("=", "assign");
    s.rule("==", "equals");
    s.rule(r"\s+", "ignore");
    let (tables, _) = s.build().unwrap();
    let toks = tokens_of(&tables, &["assign", "equals"], "== = ===");
    assert_eq!(
        toks,
        vec![
            ("equals".to_owned(), "==".to_owned()),
            ("assign".to_owned(), "=".to_owned()),
            ("equals".to_owned(), "==".to_owned()),
            ("assign".to_owned(), "=".to_owned()),
        ]
    );
}

#[test]
fn determinism() {
    let mut s = ScannerDef::new();
    s.rule("[a-z]+", "word");
    s.rule(r"\d+", "num");
    s.rule(r"\s+", "ignore");
    let (tables, _) = s.build().unwrap();
    let a = tokens_of(&tables, &["word", "num"], "ab 12 cd");
    let b = tokens_of(&tables, &["word", "num"], "ab 12 cd");
    assert_eq!(a, b);
    assert_eq!(a.len(), 3);
}

#[test]
fn rank_beats_length() {
    let mut s = ScannerDef::new();
    s.ranked_rule("foo", "keyword", 1);
    s.rule("[a-z]+", "word");
    let (tables, _) = s.build().unwrap();
    let toks = tokens_of(&tables, &["keyword", "word"], "foobar");
    assert_eq!(
        toks,
        vec![
            ("keyword".to_owned(), "foo".to_owned()),
            ("word".to_owned(), "bar".to_owned()),
        ]
    );
    // Away from the keyword, longest-match rules as usual.
    let toks = tokens_of(&tables, &["keyword", "word"], "food");
    assert_eq!(toks, vec![("word".to_owned(), "food".to_owned())]);
}

#[test]
fn scan_conditions_with_push_and_pop() {
    let mut s = ScannerDef::new();
    s.rule("[a-z]+", "word");
    s.rule(r"\s+", "ignore");
    s.rule("\"", "begin_string");
    s.rule_in(&["STR"], "[^\"]+", "chunk");
    s.rule_in(&["STR"], "\"", "end_string");
    let (tables, _) = s.build().unwrap();
    let toks = tokens_of(&tables, &["word", "chunk", "stringish"], "ab \"cd ef\" gh");
    assert_eq!(
        toks,
        vec![
            ("word".to_owned(), "ab".to_owned()),
            ("chunk".to_owned(), "cd ef".to_owned()),
            ("stringish".to_owned(), "\"".to_owned()),
            ("word".to_owned(), "gh".to_owned()),
        ]
    );
}

#[test]
fn trailing_context_rewinds() {
    let mut s = ScannerDef::new();
    s.rule("ab/c", "stem");
    s.rule("[a-z]", "letter");
    let (tables, _) = s.build().unwrap();
    let toks = tokens_of(&tables, &["stem", "letter"], "abcabd");
    assert_eq!(
        toks,
        vec![
            ("stem".to_owned(), "ab".to_owned()),
            ("letter".to_owned(), "c".to_owned()),
            ("letter".to_owned(), "a".to_owned()),
            ("letter".to_owned(), "b".to_owned()),
            ("letter".to_owned(), "d".to_owned()),
        ]
    );
}

#[test]
fn end_anchor_is_trailing_eol() {
    let mut s = ScannerDef::new();
    s.rule("ab$", "at_end");
    s.rule("[a-z]+", "word");
    s.rule(r"\n", "ignore");
    let (tables, _) = s.build().unwrap();
    let toks = tokens_of(&tables, &["at_end", "word"], "ab\nab");
    assert_eq!(
        toks,
        vec![
            ("at_end".to_owned(), "ab".to_owned()),
            ("at_end".to_owned(), "ab".to_owned()),
        ]
    );
    let toks = tokens_of(&tables, &["at_end", "word"], "abc");
    assert_eq!(toks, vec![("word".to_owned(), "abc".to_owned())]);
}

#[test]
fn begin_line_anchor() {
    let mut s = ScannerDef::new();
    s.rule("^#[a-z]*", "comment");
    s.rule("[#a-z]+", "word");
    s.rule(r"\s+", "ignore");
    let (tables, _) = s.build().unwrap();
    let toks = tokens_of(&tables, &["comment", "word"], "#one\nx #two\n#three");
    assert_eq!(
        toks,
        vec![
            ("comment".to_owned(), "#one".to_owned()),
            ("word".to_owned(), "x".to_owned()),
            ("word".to_owned(), "#two".to_owned()),
            ("comment".to_owned(), "#three".to_owned()),
        ]
    );
}

#[test]
fn stuck_scanner_skips_and_reports() {
    let mut s = ScannerDef::new();
    s.rule("[a-z]+", "word");
    let (tables, _) = s.build().unwrap();
    let driver = Collector::new(&["word"]);
    let scanner = Scanner::new(&tables, "ab!cd", driver, INITIAL).unwrap();
    let texts: Vec<String> = scanner
        .map(|(_, value, _)| match value {
            Value::Str(s) => s,
            other => format!("{other:?}"),
        })
        .collect();
    assert_eq!(texts, vec!["ab".to_owned(), "cd".to_owned()]);
}

#[test]
fn unreachable_rule_warns_and_rank_conflict_fails() {
    let mut s = ScannerDef::new();
    s.rule("abc", "first");
    s.rule("abc", "shadowed");
    let (_, warnings) = s.build().unwrap();
    assert!(warnings
        .iter()
        .any(|w| w.message.contains("duplicate") || w.message.contains("never match")));

    let mut s = ScannerDef::new();
    s.rule("abc", "first");
    s.ranked_rule("abc", "other", 2);
    assert!(s.build().is_err());
}
