//! LR-family handle-finding automata.
//!
//! Four construction modes share one LR(0) scaffolding. Every mode produces
//! the same [`LookAutomaton`] shape, which tabulation turns into the final
//! parse table. Precedence and associativity declarations participate
//! *during* construction: a shift or reduce rendered impossible by the
//! declarations is deleted before successor states are explored, which both
//! shrinks the result and keeps the minimal-LR(1) splitter from splitting
//! over conflicts that no longer exist.

pub mod canonical;
pub mod item;
pub mod lalr;
pub mod lr0;
pub mod minimal;

use handloom_runtime::definition::{RuleID, SymbolID, TerminalID, TerminalIDSet};

use crate::grammar::{Decision, Grammar};
use crate::types::Map;

/// The lookahead discrimination attached to one reduction in one state.
#[derive(Debug, Clone)]
pub enum Lookahead {
    /// Reduce regardless of lookahead (the eager-reduce encoding).
    Everything,
    Tokens(TerminalIDSet),
}

/// One state of a lookahead-bearing automaton.
#[derive(Debug, Clone, Default)]
pub struct LookState {
    pub shift: Map<SymbolID, usize>,
    pub reduce: Vec<(RuleID, Lookahead)>,
    /// Cells forced to error by nonassociativity.
    pub nonassoc: Vec<TerminalID>,
}

/// The finished handle-finding automaton, whatever construction built it.
#[derive(Debug)]
pub struct LookAutomaton {
    pub states: Vec<LookState>,
    /// Initial state per start symbol.
    pub initial: Vec<usize>,
    /// The state recognizing each start symbol in full.
    pub accept: Vec<usize>,
    /// The symbol whose shift first discovered each state.
    pub breadcrumbs: Vec<Option<SymbolID>>,
    /// Discovery predecessor of each state, for shortest-path diagnostics.
    pub predecessor: Vec<Option<usize>>,
}

impl LookAutomaton {
    /// States along a shortest discovery path to `q`, excluding the root.
    pub fn path_to(&self, q: usize) -> Vec<usize> {
        let mut path = Vec::new();
        let mut cursor = Some(q);
        while let Some(ix) = cursor {
            path.push(ix);
            cursor = self.predecessor[ix];
        }
        path.reverse();
        path
    }
}

/// Which table-construction algorithm to run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Method {
    Lr0,
    Lalr,
    Canonical,
    #[default]
    Minimal,
}

/// Build the automaton for a validated grammar.
pub fn construct(grammar: &Grammar, method: Method) -> LookAutomaton {
    let span = tracing::trace_span!("construct", ?method);
    let _entered = span.enter();
    match method {
        Method::Lr0 => lr0::as_look_automaton(grammar),
        Method::Lalr => lalr::lalr_construction(grammar),
        Method::Canonical => canonical::canonical_lr1(grammar),
        Method::Minimal => minimal::minimal_lr1(grammar),
    }
}

/// Delete shifts and reductions that the precedence declarations rule out,
/// and note nonassociativity errors. Applied to each state as it is built,
/// before its successors are looked up, so useless states are never
/// explored.
pub(crate) fn apply_precedence<K>(
    grammar: &Grammar,
    shifted: &mut Map<SymbolID, K>,
    reduce: &mut Vec<(RuleID, Lookahead)>,
    nonassoc: &mut Vec<TerminalID>,
) {
    let tokens: Vec<TerminalID> = shifted
        .keys()
        .filter_map(|sym| match sym {
            SymbolID::T(t) => Some(*t),
            SymbolID::N(_) => None,
        })
        .collect();
    for token in tokens {
        let mut decisions: Vec<(usize, Option<Decision>)> = Vec::new();
        for (ix, (rule, lookahead)) in reduce.iter().enumerate() {
            let applies = match lookahead {
                Lookahead::Everything => false,
                Lookahead::Tokens(set) => set.contains(token),
            };
            if applies {
                decisions.push((ix, grammar.decide_shift_reduce(token, *rule)));
            }
        }
        if decisions.is_empty() {
            continue;
        }
        let ways: Vec<Option<Decision>> = {
            let mut seen: Vec<Option<Decision>> = Vec::new();
            for (_, d) in &decisions {
                if !seen.contains(d) {
                    seen.push(*d);
                }
            }
            seen
        };
        let drop_token = |reduce: &mut Vec<(RuleID, Lookahead)>, ix: usize| {
            if let Lookahead::Tokens(set) = &mut reduce[ix].1 {
                set.remove(token);
            }
        };
        match ways[..] {
            [Some(Decision::Reduce)] => {
                shifted.shift_remove(&SymbolID::T(token));
            }
            [Some(Decision::Shift)] => {
                for (ix, _) in &decisions {
                    drop_token(reduce, *ix);
                }
            }
            [Some(Decision::Error)] => {
                shifted.shift_remove(&SymbolID::T(token));
                for (ix, _) in &decisions {
                    drop_token(reduce, *ix);
                }
                nonassoc.push(token);
            }
            [None] => {}
            _ => {
                // Mixed outcomes across competing rules.
                if ways.iter().all(|d| {
                    matches!(d, Some(Decision::Reduce) | Some(Decision::Error))
                }) {
                    shifted.shift_remove(&SymbolID::T(token));
                    for (ix, d) in &decisions {
                        if *d == Some(Decision::Error) {
                            drop_token(reduce, *ix);
                        }
                    }
                } else if ways
                    .iter()
                    .all(|d| matches!(d, Some(Decision::Shift) | None))
                {
                    for (ix, d) in &decisions {
                        if *d == Some(Decision::Shift) {
                            drop_token(reduce, *ix);
                        }
                    }
                } else {
                    tracing::warn!(
                        token = grammar.terminal_name(token),
                        "bizarre operator-precedence corner case; declarations ignored here"
                    );
                }
            }
        }
    }
    reduce.retain(|(_, lookahead)| match lookahead {
        Lookahead::Everything => true,
        Lookahead::Tokens(set) => !set.is_empty(),
    });
}
