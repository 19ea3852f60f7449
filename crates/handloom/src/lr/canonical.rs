//! Canonical LR(1), by Knuth's original method.
//!
//! A parse-item is augmented with the one token expected after its rule is
//! recognized; state identity is the whole set of such pairs. Maximal
//! discriminating power, maximal state count. Worth having both as the
//! benchmark the minimal construction must match and for the rare grammar
//! whose author asks for it.

use handloom_runtime::definition::{RuleID, SymbolID, TerminalID, TerminalIDSet};

use super::item::{ItemIx, ItemMap};
use super::{apply_precedence, LookAutomaton, LookState, Lookahead};
use crate::grammar::Grammar;
use crate::types::{Bft, Map, Set};

type Lr1Item = (ItemIx, TerminalID);

pub fn canonical_lr1(grammar: &Grammar) -> LookAutomaton {
    let pim = ItemMap::from_grammar(grammar);
    let mut bft: Bft<Vec<Lr1Item>, SymbolID> = Bft::default();
    let initial: Vec<usize> = pim
        .language_front()
        .iter()
        .map(|&item| bft.lookup(vec![(item, TerminalID::EOI)], None))
        .collect();

    let mut states: Vec<LookState> = Vec::new();
    bft.execute(|bft, core| {
        let mut closure: Set<Lr1Item> = Set::default();
        let mut stack: Vec<Lr1Item> = core;
        let mut shifted: Map<SymbolID, Set<Lr1Item>> = Map::default();
        let mut reduce_sets: Map<RuleID, TerminalIDSet> = Map::default();
        while let Some(lr1_item) = stack.pop() {
            if !closure.insert(lr1_item) {
                continue;
            }
            let (item, follower) = lr1_item;
            match pim.symbol_at(item) {
                None => {
                    if let Some(rule) = pim.rule_of(item) {
                        reduce_sets.entry(rule).or_default().insert(follower);
                    }
                }
                Some(sym) => {
                    let shifted_item = item + 1;
                    shifted.entry(sym).or_default().insert((shifted_item, follower));
                    if let SymbolID::N(n) = sym {
                        for &head in pim.front(n) {
                            for after in pim.read_set(shifted_item).iter() {
                                stack.push((head, after));
                            }
                            if pim.is_transparent(shifted_item) {
                                stack.push((head, follower));
                            }
                        }
                    }
                }
            }
        }

        let mut reduce: Vec<(RuleID, Lookahead)> = reduce_sets
            .into_iter()
            .map(|(rule, set)| (rule, Lookahead::Tokens(set)))
            .collect();
        let mut nonassoc = Vec::new();
        apply_precedence(grammar, &mut shifted, &mut reduce, &mut nonassoc);

        let mut shift = Map::default();
        for (sym, items) in shifted {
            let mut key: Vec<Lr1Item> = items.into_iter().collect();
            key.sort_unstable();
            shift.insert(sym, bft.lookup(key, Some(sym)));
        }
        states.push(LookState {
            shift,
            reduce,
            nonassoc,
        });
    });

    let accept = initial
        .iter()
        .zip(grammar.start())
        .map(|(&qi, &start)| states[qi].shift[&SymbolID::N(start)])
        .collect();
    let breadcrumbs = (0..states.len()).map(|q| bft.breadcrumb(q).copied()).collect();
    let predecessor = (0..states.len()).map(|q| bft.predecessor(q)).collect();
    tracing::trace!(states = states.len(), "canonical LR(1) automaton");
    LookAutomaton {
        states,
        initial,
        accept,
        breadcrumbs,
        predecessor,
    }
}
