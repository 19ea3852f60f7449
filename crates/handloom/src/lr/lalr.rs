//! LALR(1) look-ahead computation over the LR(0) automaton.
//!
//! The classic reads/includes/lookback relations seed and route follow-set
//! propagation; the propagation itself is the set-lifted bipartite closure.
//! The end-of-input sentinel enters through the augmented start transitions
//! and flows wherever the relations carry it.

use handloom_runtime::definition::{NonterminalID, RuleID, SymbolID, TerminalID, TerminalIDSet};

use super::item::ItemMap;
use super::lr0::{lr0_construction, Lr0Automaton};
use super::{apply_precedence, LookAutomaton, LookState, Lookahead};
use crate::closure::propagate_sets;
use crate::grammar::Grammar;
use crate::types::Map;

pub fn lalr_construction(grammar: &Grammar) -> LookAutomaton {
    let pim = ItemMap::from_grammar(grammar);
    let lr0 = lr0_construction(grammar, &pim);
    let lookaheads = lookahead_sets(grammar, &lr0);

    let mut states = Vec::with_capacity(lr0.states.len());
    for (q, state) in lr0.states.iter().enumerate() {
        let mut shift = state.shift.clone();
        let mut reduce: Vec<(RuleID, Lookahead)> = state
            .reduce
            .iter()
            .map(|&rule| {
                let set = lookaheads
                    .get(&(q, rule))
                    .cloned()
                    .unwrap_or_default();
                (rule, Lookahead::Tokens(set))
            })
            .collect();
        let mut nonassoc = Vec::new();
        apply_precedence(grammar, &mut shift, &mut reduce, &mut nonassoc);
        states.push(LookState {
            shift,
            reduce,
            nonassoc,
        });
    }

    let breadcrumbs = (0..lr0.states.len())
        .map(|q| lr0.bft.breadcrumb(q).copied())
        .collect();
    let predecessor = (0..lr0.states.len()).map(|q| lr0.bft.predecessor(q)).collect();
    LookAutomaton {
        states,
        initial: lr0.initial,
        accept: lr0.accept,
        breadcrumbs,
        predecessor,
    }
}

/// Follow sets for every reduction: `(state, rule) -> lookahead tokens`.
pub(crate) fn lookahead_sets(
    grammar: &Grammar,
    lr0: &Lr0Automaton,
) -> Map<(usize, RuleID), TerminalIDSet> {
    // Catalog the goto transitions.
    let mut goto_index: Map<(usize, NonterminalID), usize> = Map::default();
    let mut goto_target: Vec<usize> = Vec::new();
    for (p, state) in lr0.states.iter().enumerate() {
        for (sym, &target) in &state.shift {
            if let SymbolID::N(n) = sym {
                goto_index.insert((p, *n), goto_target.len());
                goto_target.push(target);
            }
        }
    }

    // Direct-read seeds: the terminals shiftable just after each goto.
    let mut follow: Vec<TerminalIDSet> = goto_index
        .keys()
        .zip(&goto_target)
        .map(|(_, &r)| {
            lr0.states[r]
                .shift
                .keys()
                .filter_map(|sym| match sym {
                    SymbolID::T(t) => Some(*t),
                    SymbolID::N(_) => None,
                })
                .collect()
        })
        .collect();
    // The augmented transitions read the notional end-of-input shift.
    for (&init, &start) in lr0.initial.iter().zip(grammar.start()) {
        if let Some(&g) = goto_index.get(&(init, start)) {
            follow[g].insert(TerminalID::EOI);
        }
    }

    // reads: a goto sees through nullable gotos immediately after it, so
    // their follow sets flow back into its own.
    let mut flows_into: Vec<Vec<usize>> = vec![Vec::new(); follow.len()];
    for g in 0..goto_target.len() {
        let r = goto_target[g];
        for sym in lr0.states[r].shift.keys() {
            if let SymbolID::N(c) = sym {
                if grammar.is_nullable(*c) {
                    if let Some(&g2) = goto_index.get(&(r, *c)) {
                        flows_into[g2].push(g);
                    }
                }
            }
        }
    }

    // includes and lookback, in one walk per (goto, rule) pair.
    let mut lookbacks: Vec<((usize, RuleID), usize)> = Vec::new();
    for (&(p, b), &g) in goto_index.iter() {
        for &rule_id in grammar.rules_of(b) {
            let rule = grammar.rule(rule_id);
            let mut current = p;
            let mut ok = true;
            for (i, sym) in rule.rhs.iter().enumerate() {
                if let SymbolID::N(a) = sym {
                    let tail_nullable = rule.rhs[i + 1..].iter().all(|s| {
                        matches!(s, SymbolID::N(n) if grammar.is_nullable(*n))
                    });
                    if tail_nullable {
                        if let Some(&g2) = goto_index.get(&(current, *a)) {
                            flows_into[g].push(g2);
                        }
                    }
                }
                match lr0.states[current].shift.get(sym) {
                    Some(&next) => current = next,
                    None => {
                        ok = false;
                        break;
                    }
                }
            }
            if ok {
                lookbacks.push(((current, rule_id), g));
            }
        }
    }

    propagate_sets(&mut follow, &flows_into);

    let mut lookaheads: Map<(usize, RuleID), TerminalIDSet> = Map::default();
    for (key, g) in lookbacks {
        lookaheads.entry(key).or_default().union_with(&follow[g]);
    }
    lookaheads
}
