//! Shared machinery for the integration tests: a semantic value type, the
//! drivers that interpret reduction messages, and scanner definitions for
//! the end-to-end scenarios.

pub mod grammars;

use std::collections::HashMap;

use handloom::{ParseTable, ScannerDef, ScannerTables};
use handloom_runtime::definition::{Span, StateID, TerminalID};
use handloom_runtime::{Combine, Lexeme, ScanActions};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Num(f64),
    Str(String),
    List(Vec<Value>),
    Object(Vec<(String, Value)>),
    /// Stands in for the `$error$` token after a recovery.
    Oops,
}

impl Value {
    pub fn num(n: f64) -> Value {
        Value::Num(n)
    }

    pub fn str(s: &str) -> Value {
        Value::Str(s.to_owned())
    }
}

// ---- JSON ----

pub struct JsonDriver;

impl Combine for JsonDriver {
    type Value = Value;

    fn recognizes(&self, name: &str) -> bool {
        matches!(
            name,
            "true"
                | "false"
                | "null"
                | "first"
                | "append"
                | "pair"
                | "object"
                | "empty_object"
                | "array"
                | "empty_array"
        )
    }

    fn message(&mut self, name: &str, mut args: Vec<Value>) -> Value {
        match name {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            "null" => Value::Null,
            "first" => Value::List(args),
            "append" => {
                let item = args.pop().expect("append takes two arguments");
                match args.pop() {
                    Some(Value::List(mut list)) => {
                        list.push(item);
                        Value::List(list)
                    }
                    other => panic!("append onto {other:?}"),
                }
            }
            "pair" => {
                let value = args.pop().expect("pair takes two arguments");
                match args.pop() {
                    Some(Value::Str(key)) => Value::Object(vec![(key, value)]),
                    other => panic!("pair key {other:?}"),
                }
            }
            "object" => match args.pop() {
                Some(Value::List(members)) => {
                    let mut entries = Vec::new();
                    for member in members {
                        match member {
                            Value::Object(mut kv) => entries.append(&mut kv),
                            other => panic!("object member {other:?}"),
                        }
                    }
                    Value::Object(entries)
                }
                other => panic!("object of {other:?}"),
            },
            "empty_object" => Value::Object(Vec::new()),
            "array" => args.pop().expect("array takes its elements"),
            "empty_array" => Value::List(Vec::new()),
            other => panic!("unknown message {other:?}"),
        }
    }

    fn bundle(&mut self, args: Vec<Value>) -> Value {
        Value::List(args)
    }

    fn recovery_value(&mut self) -> Value {
        Value::Oops
    }
}

/// Map the terminal names a scanner emits to their table identities.
pub fn terminal_ids(table: &ParseTable, names: &[&str]) -> HashMap<String, TerminalID> {
    names
        .iter()
        .map(|&name| {
            let id = table
                .terminal(name)
                .unwrap_or_else(|| panic!("grammar has no terminal {name:?}"));
            (name.to_owned(), id)
        })
        .collect()
}

pub struct JsonScanDriver {
    pub ids: HashMap<String, TerminalID>,
}

impl JsonScanDriver {
    pub fn new(table: &ParseTable) -> Self {
        Self {
            ids: terminal_ids(
                table,
                &[
                    "number", "string", "true", "false", "null", "{", "}", "[", "]", ":", ",",
                ],
            ),
        }
    }
}

impl ScanActions for JsonScanDriver {
    type Value = Value;

    fn recognizes(&self, action: &str) -> bool {
        matches!(action, "ignore" | "number" | "string" | "punct" | "word")
    }

    fn invoke(&mut self, yy: &mut Lexeme<'_, '_, Value>, action: &str) {
        match action {
            "ignore" => {}
            "number" => {
                let value: f64 = yy.matched_text().parse().expect("number lexeme");
                yy.token(self.ids["number"], Value::Num(value));
            }
            "string" => {
                let text = yy.matched_text();
                let inner = &text[1..text.len() - 1];
                yy.token(self.ids["string"], Value::Str(inner.to_owned()));
            }
            "punct" | "word" => {
                let kind = self.ids[yy.matched_text()];
                yy.token(kind, Value::Null);
            }
            other => panic!("unknown scan action {other:?}"),
        }
    }
}

pub fn json_scanner() -> ScannerTables {
    let mut s = ScannerDef::new();
    s.define("wholeNumber", r"[1-9]\d*");
    s.define("signedInteger", r"-?(0|{wholeNumber})");
    s.define("fractionalPart", r"\.\d+");
    s.define("exponent", r"[Ee][-+]?\d+");
    s.rule(r"{signedInteger}{fractionalPart}?{exponent}?", "number");
    s.rule(r#""[^"]*""#, "string");
    s.rule(r"[][{}:,]", "punct");
    s.rule("true|false|null", "word");
    s.rule(r"\s+", "ignore");
    let (tables, _warnings) = s.build().expect("JSON scanner is clean");
    tables
}

// ---- calculator ----

#[derive(Default)]
pub struct CalcDriver;

impl Combine for CalcDriver {
    type Value = Value;

    fn message(&mut self, name: &str, mut args: Vec<Value>) -> Value {
        let mut pop = || match args.pop() {
            Some(Value::Num(n)) => n,
            other => panic!("calculator on {other:?}"),
        };
        let value = match name {
            "add" => {
                let (r, l) = (pop(), pop());
                l + r
            }
            "subtract" => {
                let (r, l) = (pop(), pop());
                l - r
            }
            "multiply" => {
                let (r, l) = (pop(), pop());
                l * r
            }
            "divide" => {
                let (r, l) = (pop(), pop());
                l / r
            }
            "power" => {
                let (r, l) = (pop(), pop());
                l.powf(r)
            }
            "negate" => -pop(),
            other => panic!("unknown message {other:?}"),
        };
        Value::Num(value)
    }

    fn bundle(&mut self, args: Vec<Value>) -> Value {
        Value::List(args)
    }

    fn recovery_value(&mut self) -> Value {
        Value::Oops
    }
}

pub struct CalcScanDriver {
    pub ids: HashMap<String, TerminalID>,
}

impl CalcScanDriver {
    pub fn new(table: &ParseTable) -> Self {
        Self {
            ids: terminal_ids(table, &["number", "+", "-", "*", "/", "^", "(", ")"]),
        }
    }
}

impl ScanActions for CalcScanDriver {
    type Value = Value;

    fn recognizes(&self, action: &str) -> bool {
        matches!(action, "ignore" | "number" | "punct")
    }

    fn invoke(&mut self, yy: &mut Lexeme<'_, '_, Value>, action: &str) {
        match action {
            "ignore" => {}
            "number" => {
                let value: f64 = yy.matched_text().parse().expect("number lexeme");
                yy.token(self.ids["number"], Value::Num(value));
            }
            "punct" => {
                let kind = self.ids[yy.matched_text()];
                yy.token(kind, Value::Null);
            }
            other => panic!("unknown scan action {other:?}"),
        }
    }
}

pub fn calc_scanner() -> ScannerTables {
    let mut s = ScannerDef::new();
    s.rule(r"\d+(\.\d+)?", "number");
    s.rule(r"[-+*/\^()]", "punct");
    s.rule(r"\s+", "ignore");
    let (tables, _warnings) = s.build().expect("calculator scanner is clean");
    tables
}

// ---- recording drivers for recovery and generalized scenarios ----

/// Records every message and error event; values are message trees.
#[derive(Default)]
pub struct RecordingDriver {
    pub messages: Vec<String>,
    pub errors: usize,
    pub eof_errors: usize,
    pub recoveries: usize,
    pub dead_ends: usize,
}

impl Combine for RecordingDriver {
    type Value = Value;

    fn message(&mut self, name: &str, args: Vec<Value>) -> Value {
        self.messages.push(name.to_owned());
        let mut list = vec![Value::Str(name.to_owned())];
        list.extend(args);
        Value::List(list)
    }

    fn bundle(&mut self, args: Vec<Value>) -> Value {
        Value::List(args)
    }

    fn recovery_value(&mut self) -> Value {
        Value::Oops
    }

    fn unexpected_token(&mut self, _terminal: TerminalID, _span: Span, _state: StateID) {
        self.errors += 1;
    }

    fn unexpected_eof(&mut self) {
        self.eof_errors += 1;
    }

    fn did_recover(&mut self) {
        self.recoveries += 1;
    }

    fn cannot_recover(&mut self) {
        self.dead_ends += 1;
    }
}

/// String concatenation, for recognizing-style grammars.
#[derive(Default)]
pub struct TextDriver;

impl Combine for TextDriver {
    type Value = Value;

    fn message(&mut self, _name: &str, args: Vec<Value>) -> Value {
        self.bundle(args)
    }

    fn bundle(&mut self, args: Vec<Value>) -> Value {
        let mut text = String::new();
        for arg in args {
            if let Value::Str(s) = arg {
                text.push_str(&s);
            }
        }
        Value::Str(text)
    }

    fn recovery_value(&mut self) -> Value {
        Value::Oops
    }
}

/// Feed single-character tokens to any consumer keyed by terminal name.
pub fn char_tokens(table: &ParseTable, input: &str) -> Vec<(TerminalID, Value, Span)> {
    input
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let id = table
                .terminal(&c.to_string())
                .unwrap_or_else(|| panic!("grammar has no terminal {c:?}"));
            (id, Value::Str(c.to_string()), Span::new(i, i + 1))
        })
        .collect()
}
