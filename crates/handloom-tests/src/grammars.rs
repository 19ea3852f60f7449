//! Grammar definitions shared by the integration tests.

use handloom::grammar::{Assoc, Discipline, Grammar};
use handloom::{call, cap, Alt, GrammarDef};

/// Standard JSON, with list-of constructions and renamings aplenty.
pub fn json() -> Grammar {
    let mut g = GrammarDef::new();
    g.rule("value", Alt::new(["string"]));
    g.rule("value", Alt::new(["number"]));
    g.rule("value", Alt::new(["object"]));
    g.rule("value", Alt::new(["array"]));
    g.rule("value", Alt::new(["true"]).msg("true"));
    g.rule("value", Alt::new(["false"]).msg("false"));
    g.rule("value", Alt::new(["null"]).msg("null"));
    g.rule("object", Alt::new(["{", "}"]).msg("empty_object"));
    g.rule("object", Alt::new(["{", ".members", "}"]).msg("object"));
    g.rule("members", Alt::new([".pair"]).msg("first"));
    g.rule("members", Alt::new([".members", ",", ".pair"]).msg("append"));
    g.rule("pair", Alt::new([".string", ":", ".value"]).msg("pair"));
    g.rule("array", Alt::new(["[", "]"]).msg("empty_array"));
    g.rule("array", Alt::new(["[", ".elements", "]"]).msg("array"));
    g.rule("elements", Alt::new([".value"]).msg("first"));
    g.rule("elements", Alt::new([".elements", ",", ".value"]).msg("append"));
    g.start("value");
    let (grammar, _warnings) = g.end().expect("JSON grammar is clean");
    grammar
}

/// A desk calculator: one flat expression nonterminal, every conflict
/// settled by precedence and associativity.
pub fn calculator() -> Grammar {
    let mut g = GrammarDef::new();
    g.precedence(Assoc::Left, &["+", "-"]);
    g.precedence(Assoc::Left, &["*", "/"]);
    g.precedence(Assoc::Bogus, &["UMINUS"]);
    g.precedence(Assoc::Right, &["^"]);
    g.rule("expr", Alt::new([".expr", "+", ".expr"]).msg("add"));
    g.rule("expr", Alt::new([".expr", "-", ".expr"]).msg("subtract"));
    g.rule("expr", Alt::new([".expr", "*", ".expr"]).msg("multiply"));
    g.rule("expr", Alt::new([".expr", "/", ".expr"]).msg("divide"));
    g.rule("expr", Alt::new([".expr", "^", ".expr"]).msg("power"));
    g.rule("expr", Alt::new(["-", ".expr"]).msg("negate").prec("UMINUS"));
    g.rule("expr", Alt::new(["(", ".expr", ")"]));
    g.rule("expr", Alt::new(["number"]));
    g.start("expr");
    let (grammar, _warnings) = g.end().expect("calculator grammar is clean");
    grammar
}

/// Not LALR(1): the reduce-reduce pair on `e` needs left context that LALR
/// merges away, so only the LR(1)-strength constructions get it right.
pub fn non_lalr() -> Result<Grammar, handloom::DefinitionErrors> {
    let mut g = GrammarDef::new();
    g.rule("S", Alt::new(["a", "E", "c"]));
    g.rule("S", Alt::new(["a", "F", "d"]));
    g.rule("S", Alt::new(["b", "F", "c"]));
    g.rule("S", Alt::new(["b", "E", "d"]));
    g.rule("E", Alt::new(["e"]).msg("via_e"));
    g.rule("F", Alt::new(["e"]).msg("via_f"));
    g.start("S");
    g.end().map(|(grammar, _)| grammar)
}

/// Palindromes over {a, b}: inherently nondeterministic.
pub fn palindrome(discipline: Discipline) -> Grammar {
    let mut g = GrammarDef::new();
    g.rule("P", Alt::new::<[&str; 0], &str>([]));
    g.rule("P", Alt::new(["a"]));
    g.rule("P", Alt::new(["b"]));
    g.rule("P", Alt::new(["a", ".P", "a"]).msg("wrap_a"));
    g.rule("P", Alt::new(["b", ".P", "b"]).msg("wrap_b"));
    g.start("P");
    g.nondeterministic(&[], discipline);
    let (grammar, _warnings) = g.end().expect("palindrome grammar is clean");
    grammar
}

/// Hidden left recursion: `S -> E S a | b` with `E -> epsilon`. The
/// brute-force engine cannot terminate on it; the graph-structured stack
/// takes it in stride.
pub fn hidden_left() -> Grammar {
    let mut g = GrammarDef::new();
    g.rule("S", Alt::new(["E", "S", "a"]).msg("snoc"));
    g.rule("S", Alt::new(["b"]));
    g.rule("E", Alt::new::<[&str; 0], &str>([]).msg("eps"));
    g.start("S");
    g.nondeterministic(&[], Discipline::Deferred);
    let (grammar, _warnings) = g.end().expect("hidden-left grammar is clean");
    grammar
}

/// Statements with an error production for resynchronization at ';'.
pub fn statements() -> Grammar {
    let mut g = GrammarDef::new();
    g.rule("stmts", Alt::new([".stmt"]).msg("first"));
    g.rule("stmts", Alt::new([".stmts", ".stmt"]).msg("append"));
    g.rule("stmt", Alt::new([".name", ":=", ".expr", ";"]).msg("assign"));
    g.rule("stmt", Alt::new(["$error$", ";"]).msg("oops"));
    g.rule("expr", Alt::new(["name"]));
    g.rule("expr", Alt::new(["number"]));
    g.start("stmts");
    let (grammar, _warnings) = g.end().expect("statement grammar is clean");
    grammar
}

/// A comma-separated list-of, by way of the macro facility.
pub fn macro_list() -> Grammar {
    let mut g = GrammarDef::new();
    g.macro_rule(
        "list_of",
        &["what", "sep"],
        vec![
            Alt::new([".what"]).msg("first"),
            Alt::new([
                cap(call("list_of", ["what", "sep"])),
                "sep".into(),
                ".what".into(),
            ])
            .msg("append"),
        ],
    );
    g.rule("doc", Alt::new([cap(call("list_of", ["number", ","]))]).msg("doc"));
    g.start("doc");
    let (grammar, _warnings) = g.end().expect("macro grammar is clean");
    grammar
}
