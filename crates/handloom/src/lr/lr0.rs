//! The LR(0) construction: the functional foundation for all the rest.
//!
//! A subset construction whose keys are core sets of parse items. Visiting
//! a core elaborates its closure; items with the dot at the end become the
//! state's reductions, and the rest group by their next symbol into
//! successor cores. No lookahead is involved, hence the zero.

use handloom_runtime::definition::{RuleID, SymbolID};

use super::item::{ItemIx, ItemMap};
use super::{LookAutomaton, LookState, Lookahead};
use crate::grammar::Grammar;
use crate::types::{Bft, Map, Set};

#[derive(Debug)]
pub struct Lr0State {
    /// Terminal shifts and nonterminal gotos alike.
    pub shift: Map<SymbolID, usize>,
    pub reduce: Vec<RuleID>,
    /// The full closure, kept for the taint analysis.
    pub closure: Vec<ItemIx>,
}

impl Lr0State {
    /// More than one viable action under some LR(0) lookahead view.
    pub fn has_conflict(&self) -> bool {
        self.reduce.len() > 1
            || (!self.reduce.is_empty()
                && self.shift.keys().any(|sym| matches!(sym, SymbolID::T(_))))
    }

    /// Exactly one thing to do, and it is a reduction.
    pub fn is_adequate_reduce(&self) -> bool {
        self.shift.is_empty() && self.reduce.len() == 1
    }
}

#[derive(Debug)]
pub struct Lr0Automaton {
    pub states: Vec<Lr0State>,
    pub initial: Vec<usize>,
    pub accept: Vec<usize>,
    pub bft: Bft<Vec<ItemIx>, SymbolID>,
}

pub fn lr0_construction(grammar: &Grammar, pim: &ItemMap) -> Lr0Automaton {
    let mut bft: Bft<Vec<ItemIx>, SymbolID> = Bft::default();
    let initial: Vec<usize> = pim
        .language_front()
        .iter()
        .map(|&item| bft.lookup(vec![item], None))
        .collect();

    let mut states: Vec<Lr0State> = Vec::new();
    bft.execute(|bft, core| {
        let mut closure: Set<ItemIx> = Set::default();
        let mut stack: Vec<ItemIx> = core;
        while let Some(item) = stack.pop() {
            if !closure.insert(item) {
                continue;
            }
            if let Some(SymbolID::N(n)) = pim.symbol_at(item) {
                for &head in pim.front(n) {
                    if !closure.contains(&head) {
                        stack.push(head);
                    }
                }
            }
        }

        let mut shifted: Map<SymbolID, Vec<ItemIx>> = Map::default();
        let mut reduce: Vec<RuleID> = Vec::new();
        for &item in &closure {
            match pim.symbol_at(item) {
                Some(sym) => shifted.entry(sym).or_default().push(item + 1),
                None => {
                    if let Some(rule) = pim.rule_of(item) {
                        reduce.push(rule);
                    }
                }
            }
        }
        reduce.sort_unstable();

        let mut shift = Map::default();
        for (sym, mut core) in shifted {
            core.sort_unstable();
            core.dedup();
            shift.insert(sym, bft.lookup(core, Some(sym)));
        }

        let mut closure: Vec<ItemIx> = closure.into_iter().collect();
        closure.sort_unstable();
        states.push(Lr0State {
            shift,
            reduce,
            closure,
        });
    });

    let accept = initial
        .iter()
        .zip(grammar.start())
        .map(|(&qi, &start)| states[qi].shift[&SymbolID::N(start)])
        .collect();
    tracing::trace!(states = states.len(), "LR(0) automaton");
    Lr0Automaton {
        states,
        initial,
        accept,
        bft,
    }
}

/// Package the bare LR(0) automaton in the common shape: every reduction
/// fires on any lookahead.
pub fn as_look_automaton(grammar: &Grammar) -> LookAutomaton {
    let pim = ItemMap::from_grammar(grammar);
    let lr0 = lr0_construction(grammar, &pim);
    let states = lr0
        .states
        .iter()
        .map(|state| LookState {
            shift: state.shift.clone(),
            reduce: state
                .reduce
                .iter()
                .map(|&rule| (rule, Lookahead::Everything))
                .collect(),
            nonassoc: Vec::new(),
        })
        .collect();
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
