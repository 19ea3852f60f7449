//! The minimal-LR(1) construction.
//!
//! Two phases. First, build LR(0) and find out exactly which head items
//! feed its conflicts: trace each conflicted reduction back through the
//! predecessor graph to the head items that introduced its rule, mark those
//! *tainted*, and let taint spread backwards wherever a transparent suffix
//! would have let the follower leak through. Second, rerun the subset
//! construction where only tainted head items carry follow sets; everything
//! else keeps the "any lookahead" reading, and an LR(0)-adequate reducing
//! state is never split at all. The result discriminates exactly where
//! LALR(1) would have been inadequate and stays LR(0)-sized elsewhere.

use handloom_runtime::definition::{RuleID, SymbolID, TerminalID, TerminalIDSet};

use super::item::{ItemIx, ItemMap};
use super::lr0::{lr0_construction, Lr0Automaton};
use super::{apply_precedence, LookAutomaton, LookState, Lookahead};
use crate::grammar::Grammar;
use crate::types::{Bft, Map, Set};

/// `None` stands for "everything", the eager-reduce reading.
type Follow = Option<Vec<TerminalID>>;
type MinItem = (ItemIx, Follow);

pub fn minimal_lr1(grammar: &Grammar) -> LookAutomaton {
    let pim = ItemMap::from_grammar(grammar);
    let lr0 = lr0_construction(grammar, &pim);
    let tainted = tainted_items(grammar, &pim, &lr0);
    tracing::trace!(taints = tainted.len(), "taint analysis");

    let mut bft: Bft<Vec<MinItem>, SymbolID> = Bft::default();
    let initial: Vec<usize> = lr0
        .initial
        .iter()
        .zip(pim.language_front())
        .map(|(&qi, &item)| {
            let follow = if tainted.contains(&(qi, item)) {
                Some(vec![TerminalID::EOI])
            } else {
                None
            };
            bft.lookup(vec![(item, follow)], None)
        })
        .collect();

    let mut states: Vec<LookState> = Vec::new();
    bft.execute(|bft, core| {
        // Identify the iso-state: the LR(0) state sharing this core's bare
        // items. It tells which head items here need their lookahead kept.
        let iso_q = iso_state(&lr0, core.iter().map(|(i, _)| *i));

        let mut closure: Set<MinItem> = Set::default();
        let mut stack: Vec<MinItem> = core;
        let mut shifted: Map<SymbolID, Vec<MinItem>> = Map::default();
        let mut reduce_map: Map<RuleID, Lookahead> = Map::default();
        while let Some(min_item) = stack.pop() {
            if !closure.insert(min_item.clone()) {
                continue;
            }
            let (item, follow) = min_item;
            match pim.symbol_at(item) {
                None => {
                    if let Some(rule) = pim.rule_of(item) {
                        note_reduce(&mut reduce_map, rule, &follow);
                    }
                }
                Some(sym) => {
                    let shifted_item = item + 1;
                    shifted
                        .entry(sym)
                        .or_default()
                        .push((shifted_item, follow.clone()));
                    if let SymbolID::N(n) = sym {
                        let mut after: Vec<TerminalID> =
                            pim.read_set(shifted_item).iter().collect();
                        if pim.is_transparent(shifted_item) {
                            if let Some(follow) = &follow {
                                after.extend(follow.iter().copied());
                            }
                        }
                        after.sort_unstable();
                        after.dedup();
                        for &head in pim.front(n) {
                            if tainted.contains(&(iso_q, head)) {
                                stack.push((head, Some(after.clone())));
                            } else {
                                stack.push((head, None));
                            }
                        }
                    }
                }
            }
        }

        let mut reduce: Vec<(RuleID, Lookahead)> = reduce_map.into_iter().collect();
        let mut nonassoc = Vec::new();
        apply_precedence(grammar, &mut shifted, &mut reduce, &mut nonassoc);

        let mut shift = Map::default();
        for (sym, items) in shifted {
            let key = clean(&lr0, items);
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
    tracing::trace!(states = states.len(), "minimal LR(1) automaton");
    LookAutomaton {
        states,
        initial,
        accept,
        breadcrumbs,
        predecessor,
    }
}

fn note_reduce(reduce_map: &mut Map<RuleID, Lookahead>, rule: RuleID, follow: &Follow) {
    let entry = reduce_map
        .entry(rule)
        .or_insert_with(|| Lookahead::Tokens(TerminalIDSet::default()));
    match (entry, follow) {
        (Lookahead::Everything, _) => {}
        (entry, None) => *entry = Lookahead::Everything,
        (Lookahead::Tokens(set), Some(tokens)) => {
            for &t in tokens {
                set.insert(t);
            }
        }
    }
}

fn iso_state(lr0: &Lr0Automaton, items: impl Iterator<Item = ItemIx>) -> usize {
    let mut iso: Vec<ItemIx> = items.collect();
    iso.sort_unstable();
    iso.dedup();
    lr0.bft
        .index_of(&iso)
        .unwrap_or_else(|| unreachable!("every follow-annotated core shadows an LR(0) core"))
}

/// Drop needless follow sets; combine the rest. An LR(0)-adequate reducing
/// iso-state never splits: its items all take the eager reading.
fn clean(lr0: &Lr0Automaton, items: Vec<MinItem>) -> Vec<MinItem> {
    let iso_q = iso_state(lr0, items.iter().map(|(i, _)| *i));
    if lr0.states[iso_q].is_adequate_reduce() {
        let mut key: Vec<MinItem> = items.into_iter().map(|(i, _)| (i, None)).collect();
        key.sort_unstable();
        key.dedup();
        return key;
    }
    let mut merged: Map<ItemIx, Vec<TerminalID>> = Map::default();
    for (item, follow) in items {
        let slot = merged.entry(item).or_default();
        if let Some(tokens) = follow {
            slot.extend(tokens);
        }
    }
    let mut key: Vec<MinItem> = merged
        .into_iter()
        .map(|(item, mut tokens)| {
            tokens.sort_unstable();
            tokens.dedup();
            if tokens.is_empty() {
                (item, None)
            } else {
                (item, Some(tokens))
            }
        })
        .collect();
    key.sort_unstable();
    key
}

/// Which head items, in which LR(0) states, actually need their follow
/// sets. Work backwards from every conflicted reduction; taint spreads to
/// an introducing item whenever the part after its dot is transparent, so
/// the follower would have leaked through.
fn tainted_items(
    grammar: &Grammar,
    pim: &ItemMap,
    lr0: &Lr0Automaton,
) -> Set<(usize, ItemIx)> {
    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); lr0.states.len()];
    for (q, state) in lr0.states.iter().enumerate() {
        for &target in state.shift.values() {
            predecessors[target].push(q);
        }
    }

    let mut work_list: Vec<(usize, ItemIx)> = Vec::new();
    for (q, state) in lr0.states.iter().enumerate() {
        if state.has_conflict() {
            for &item in &state.closure {
                if pim.symbol_at(item).is_none() {
                    work_list.push((q, item));
                }
            }
        }
    }

    let mut tainted: Set<(usize, ItemIx)> = Set::default();
    while let Some((q, item)) = work_list.pop() {
        let offset = pim.offset(item) as usize;
        let head = item - offset;
        match pim.rule_of(item) {
            None => {
                // A language start item: no further contagion possible.
                for q_head in n_steps(&predecessors, q, offset) {
                    tainted.insert((q_head, head));
                }
            }
            Some(rule) => {
                let lhs = grammar.rule(rule).lhs;
                for q_head in n_steps(&predecessors, q, offset) {
                    if tainted.insert((q_head, head)) {
                        for &ci in &lr0.states[q_head].closure {
                            if pim.symbol_at(ci) == Some(SymbolID::N(lhs))
                                && pim.is_transparent(ci + 1)
                            {
                                work_list.push((q_head, ci));
                            }
                        }
                    }
                }
            }
        }
    }
    tainted
}

/// Every state reachable by walking exactly `n` predecessor arcs.
fn n_steps(arcs: &[Vec<usize>], start: usize, n: usize) -> Set<usize> {
    let mut current: Set<usize> = Set::default();
    current.insert(start);
    for _ in 0..n {
        let mut step = Set::default();
        for &q in &current {
            step.extend(arcs[q].iter().copied());
        }
        current = step;
    }
    current
}
