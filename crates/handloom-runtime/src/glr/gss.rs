//! The graph-structured-stack generalized parser.
//!
//! At every token step the frontier holds at most one node per LR state; a
//! node may have several predecessor arcs, which is how merged derivations
//! share structure. Reductions walk `rhs_len` arcs backward to find every
//! handle origin. Epsilon reductions add arcs *within* the current step;
//! when an arc lands on a node that already ran its reductions, those newly
//! enabled reductions are replayed through the forward links recorded during
//! path traversal. Unlike the brute-force engine, this one is untroubled by
//! hidden left recursion.
//!
//! Semantic actions are deferred: arcs carry shared-forest indices and the
//! driver runs only when the parse commits at end of input.

use indexmap::IndexMap;

use super::forest::Forest;
use super::GeneralizedError;
use crate::definition::{Op, ParserTables, RuleID, StateID, TerminalID};
use crate::parser::Combine;

type BuildHasher = std::hash::BuildHasherDefault<rustc_hash::FxHasher>;
type Map<K, V> = IndexMap<K, V, BuildHasher>;

struct GNode {
    state: StateID,
    /// Predecessor arcs; the payload is a forest index for the symbol
    /// consumed to enter this node.
    arcs: Vec<(u32, u32)>,
}

/// Per-step bookkeeping for one frontier node: which non-epsilon reductions
/// it already fired, and which nodes were observed downstream of it during
/// path traversal (with the payload of the connecting arc).
#[derive(Default, Clone)]
struct Books {
    ners: Vec<RuleID>,
    fwd: Vec<(u32, u32)>,
}

pub struct GssParser<T, D: Combine> {
    tables: T,
    driver: D,
    forest: Forest<D::Value>,
    nodes: Vec<GNode>,
    /// The current generation: state -> node.
    frontier: Map<StateID, u32>,
    max_rhs_len: usize,
}

impl<T, D> GssParser<T, D>
where
    T: ParserTables,
    D: Combine,
{
    pub fn new(tables: T, driver: D, start: Option<&str>) -> Result<Self, GeneralizedError> {
        for name in tables.constructors() {
            if !driver.recognizes(name) {
                return Err(GeneralizedError::UnknownConstructor(name.to_owned()));
            }
        }
        let initial = tables
            .initial(start)
            .ok_or_else(|| GeneralizedError::UnknownStart(start.unwrap_or("<default>").to_owned()))?;
        let max_rhs_len = (0..tables.rule_count())
            .map(|ix| tables.rule(RuleID::from_raw(ix as u16)).rhs_len as usize)
            .max()
            .unwrap_or(0);
        let nodes = vec![GNode {
            state: initial,
            arcs: Vec::new(),
        }];
        let mut frontier = Map::default();
        frontier.insert(initial, 0);
        Ok(Self {
            tables,
            driver,
            forest: Forest::new(),
            nodes,
            frontier,
            max_rhs_len,
        })
    }

    /// Offer the next token to the whole frontier.
    pub fn consume(&mut self, terminal: TerminalID, value: D::Value) -> Result<(), GeneralizedError> {
        let mut accepted = Vec::new();
        let shifts = self.drain(terminal, &mut accepted)?;
        if shifts.is_empty() {
            return Err(GeneralizedError::DiedMidway);
        }
        let leaf = self.forest.leaf(value);
        let mut next: Map<StateID, u32> = Map::default();
        for (node, target) in shifts {
            match next.get(&target) {
                Some(&gix) => self.nodes[gix as usize].arcs.push((node, leaf)),
                None => {
                    let gix = self.add_node(target, vec![(node, leaf)]);
                    next.insert(target, gix);
                }
            }
        }
        self.frontier = next;
        self.collect_garbage();
        Ok(())
    }

    /// Wrap up at end of input; evaluate the forest of whatever accepted.
    pub fn finish(mut self) -> Result<D::Value, GeneralizedError> {
        let mut accepted = Vec::new();
        self.drain(TerminalID::EOI, &mut accepted)?;
        let mut values = Vec::with_capacity(accepted.len());
        for root in accepted {
            values.push(self.forest.evaluate(root, &self.tables, &mut self.driver)?);
        }
        let mut it = values.into_iter();
        match it.next() {
            Some(first) => {
                let rest: Vec<_> = it.collect();
                if rest.is_empty() {
                    Ok(first)
                } else {
                    Ok(self.driver.ambiguity(first, rest))
                }
            }
            None => Err(GeneralizedError::IncompleteSentence),
        }
    }

    fn add_node(&mut self, state: StateID, arcs: Vec<(u32, u32)>) -> u32 {
        self.nodes.push(GNode { state, arcs });
        (self.nodes.len() - 1) as u32
    }

    /// Run every reduction the lookahead enables, expanding the current
    /// generation in place, and report which shifts are pending.
    fn drain(
        &mut self,
        terminal: TerminalID,
        accepted: &mut Vec<u32>,
    ) -> Result<Vec<(u32, StateID)>, GeneralizedError> {
        let mut books: Map<u32, Books> = Map::default();
        let mut shifts: Vec<(u32, StateID)> = Vec::new();
        let mut pending: Vec<u32> = self.frontier.values().copied().collect();
        let mut secondary: Vec<(u32, u32, u32)> = Vec::new();
        loop {
            if let Some(ix) = pending.pop() {
                books.entry(ix).or_default();
                let op = self.tables.action(self.nodes[ix as usize].state, terminal);
                self.act_on(
                    op,
                    ix,
                    &mut books,
                    &mut shifts,
                    &mut pending,
                    &mut secondary,
                    accepted,
                )?;
                continue;
            }
            if let Some((goto_node, via, edge)) = secondary.pop() {
                self.replay(goto_node, via, edge, &mut books, &mut pending, &mut secondary);
                continue;
            }
            break;
        }
        Ok(shifts)
    }

    #[allow(clippy::too_many_arguments)]
    fn act_on(
        &mut self,
        op: Op,
        node: u32,
        books: &mut Map<u32, Books>,
        shifts: &mut Vec<(u32, StateID)>,
        pending: &mut Vec<u32>,
        secondary: &mut Vec<(u32, u32, u32)>,
        accepted: &mut Vec<u32>,
    ) -> Result<(), GeneralizedError> {
        match op {
            Op::Error => Ok(()),
            Op::Shift(target) => {
                shifts.push((node, target));
                Ok(())
            }
            Op::Reduce(rule) => {
                self.primary_reduction(node, rule, books, pending, secondary);
                Ok(())
            }
            Op::Accept => {
                for &(_, payload) in &self.nodes[node as usize].arcs {
                    accepted.push(payload);
                }
                Ok(())
            }
            Op::Split(ix) => {
                for alt in self.tables.split(ix).to_vec() {
                    self.act_on(alt, node, books, shifts, pending, secondary, accepted)?;
                }
                Ok(())
            }
            // The generator does not emit combined instructions into
            // non-deterministic tables.
            Op::ShiftReduce(_) => Err(GeneralizedError::UnsupportedInstruction),
        }
    }

    fn primary_reduction(
        &mut self,
        reach: u32,
        rule: RuleID,
        books: &mut Map<u32, Books>,
        pending: &mut Vec<u32>,
        secondary: &mut Vec<(u32, u32, u32)>,
    ) {
        let info = self.tables.rule(rule).clone();
        let length = info.rhs_len as usize;
        if length > 0 {
            if let Some(b) = books.get_mut(&reach) {
                b.ners.push(rule);
            }
        }
        for (origin, children) in self.cook_paths(reach, length, books) {
            self.perform_goto(origin, rule, info.lhs, children, books, pending, secondary);
        }
    }

    /// All handle origins `length` arcs down from `origin`, with the forest
    /// payloads collected along each path (left-to-right). Forward links are
    /// recorded for any current-step node the traversal crosses, so later
    /// arc insertions can replay the reductions that pass this way.
    fn cook_paths(
        &mut self,
        origin: u32,
        length: usize,
        books: &mut Map<u32, Books>,
    ) -> Vec<(u32, Vec<u32>)> {
        if length == 0 {
            return vec![(origin, Vec::new())];
        }
        let arcs = self.nodes[origin as usize].arcs.clone();
        let mut out = Vec::new();
        for (prior, payload) in arcs {
            if let Some(b) = books.get_mut(&prior) {
                if !b.fwd.iter().any(|&(above, _)| above == origin) {
                    b.fwd.push((origin, payload));
                }
                for (end, mut kids) in self.cook_paths(prior, length - 1, books) {
                    kids.push(payload);
                    out.push((end, kids));
                }
            } else {
                for (end, mut kids) in self.all_paths(prior, length - 1) {
                    kids.push(payload);
                    out.push((end, kids));
                }
            }
        }
        out
    }

    /// Like `cook_paths` but through settled generations, where no new
    /// reductions can appear and no bookkeeping is needed.
    fn all_paths(&self, node: u32, length: usize) -> Vec<(u32, Vec<u32>)> {
        if length == 0 {
            return vec![(node, Vec::new())];
        }
        let mut out = Vec::new();
        for &(prior, payload) in &self.nodes[node as usize].arcs {
            for (end, mut kids) in self.all_paths(prior, length - 1) {
                kids.push(payload);
                out.push((end, kids));
            }
        }
        out
    }

    fn perform_goto(
        &mut self,
        origin: u32,
        rule: RuleID,
        lhs: crate::definition::NonterminalID,
        children: Vec<u32>,
        books: &mut Map<u32, Books>,
        pending: &mut Vec<u32>,
        secondary: &mut Vec<(u32, u32, u32)>,
    ) {
        let state = self.tables.goto(self.nodes[origin as usize].state, lhs);
        match self.frontier.get(&state) {
            Some(&gix) => {
                let existing = self.nodes[gix as usize]
                    .arcs
                    .iter()
                    .find(|&&(p, _)| p == origin)
                    .map(|&(_, f)| f);
                match existing {
                    // A merged derivation: same stack shape, another family.
                    Some(f) => self.forest.add_family(f, rule, children),
                    None => {
                        let f = self.forest.branch(lhs, rule, children);
                        self.nodes[gix as usize].arcs.push((origin, f));
                        if books.contains_key(&gix) {
                            secondary.push((gix, origin, f));
                        }
                    }
                }
            }
            None => {
                let f = self.forest.branch(lhs, rule, children);
                let gix = self.add_node(state, vec![(origin, f)]);
                self.frontier.insert(state, gix);
                pending.push(gix);
            }
        }
    }

    /// A new arc `goto_node -> via` appeared after `goto_node` (and possibly
    /// nodes above it) already reduced. Re-run every recorded reduction
    /// whose path crosses the new arc.
    fn replay(
        &mut self,
        goto_node: u32,
        via: u32,
        edge: u32,
        books: &mut Map<u32, Books>,
        pending: &mut Vec<u32>,
        secondary: &mut Vec<(u32, u32, u32)>,
    ) {
        // Walk upward through forward links; `chop` is how many arcs of a
        // replayed path lie at or above the new arc. The suffix holds their
        // payloads, topmost first.
        let mut level: Vec<(u32, Vec<u32>)> = vec![(goto_node, Vec::new())];
        let mut chop = 1usize;
        while !level.is_empty() && chop <= self.max_rhs_len {
            let mut ahead: Vec<(u32, Vec<u32>)> = Vec::new();
            for (n, suffix) in level {
                let Some(b) = books.get(&n).cloned() else { continue };
                for rule in b.ners {
                    let info = self.tables.rule(rule).clone();
                    let length = info.rhs_len as usize;
                    if length < chop {
                        continue;
                    }
                    for (origin, mut kids) in self.cook_paths(via, length - chop, books) {
                        kids.push(edge);
                        kids.extend(suffix.iter().rev().copied());
                        self.perform_goto(origin, rule, info.lhs, kids, books, pending, secondary);
                    }
                }
                for (above, payload) in b.fwd {
                    let mut s2 = vec![payload];
                    s2.extend(suffix.iter().copied());
                    ahead.push((above, s2));
                }
            }
            level = ahead;
            chop += 1;
        }
    }

    /// Drop nodes no longer reachable from the frontier, keeping the live
    /// set bounded by states times surviving generations.
    fn collect_garbage(&mut self) {
        let mut alive = vec![false; self.nodes.len()];
        let mut stack: Vec<u32> = self.frontier.values().copied().collect();
        while let Some(ix) = stack.pop() {
            if alive[ix as usize] {
                continue;
            }
            alive[ix as usize] = true;
            for &(prior, _) in &self.nodes[ix as usize].arcs {
                if !alive[prior as usize] {
                    stack.push(prior);
                }
            }
        }
        let mut remap = vec![u32::MAX; self.nodes.len()];
        let mut kept = 0u32;
        for (ix, live) in alive.iter().enumerate() {
            if *live {
                remap[ix] = kept;
                kept += 1;
            }
        }
        let old = std::mem::take(&mut self.nodes);
        self.nodes = old
            .into_iter()
            .enumerate()
            .filter(|(ix, _)| alive[*ix])
            .map(|(_, mut node)| {
                for arc in &mut node.arcs {
                    arc.0 = remap[arc.0 as usize];
                }
                node
            })
            .collect();
        for v in self.frontier.values_mut() {
            *v = remap[*v as usize];
        }
    }
}
