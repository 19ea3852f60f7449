//! A parser/scanner generator.
//!
//! Feed a [`grammar::GrammarDef`] and a [`scanner::ScannerDef`] with a
//! language definition; get back scan tables and LR-family parse tables
//! (LR(0), LALR(1), canonical LR(1), or the default minimal-LR(1)) ready to
//! drive the engines in `handloom-runtime`. Tables are plain values; no
//! code is generated.

pub mod charset;
pub mod closure;
pub mod dfa;
pub mod diagnostics;
pub mod ebnf;
pub mod grammar;
pub mod lr;
pub mod nfa;
pub mod pattern;
pub mod scanner;
pub mod tables;
pub mod types;

pub use diagnostics::{Diagnostic, DefinitionErrors, Severity};
pub use ebnf::{act, call, cap, choice, Alt, Elem};
pub use grammar::{Assoc, Discipline, Grammar, GrammarDef, PrecedenceOrder};
pub use lr::Method;
pub use scanner::{ScannerDef, ScannerTables, INITIAL};
pub use tables::{build, ParseTable};
