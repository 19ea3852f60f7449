//! The brute-force generalized parser.
//!
//! Each live parse is a cons cell of (state, predecessor, value); the
//! top-of-stack is just the list of currently viable tips. Non-deterministic
//! cells clone the tip per alternative; a tip with no legal action dies.
//! Simple, occasionally exponential, and entirely adequate for grammars that
//! are just barely out of reach of a deterministic table.
//!
//! Semantic actions run immediately (the purity discipline); parallel
//! derivations that both survive to acceptance are reconciled through the
//! driver's `ambiguity` hook.

use std::rc::Rc;

use super::GeneralizedError;
use crate::definition::{Constructor, Op, ParserTables, RuleID, StateID, TerminalID};
use crate::parser::Combine;

struct Node<V> {
    state: StateID,
    prior: Option<Rc<Node<V>>>,
    value: Option<V>,
}

type Link<V> = Rc<Node<V>>;

pub struct BruteParser<T, D: Combine> {
    tables: T,
    driver: D,
    tos: Vec<Link<D::Value>>,
}

impl<T, D> BruteParser<T, D>
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
        let root = Rc::new(Node {
            state: initial,
            prior: None,
            value: None,
        });
        Ok(Self {
            tables,
            driver,
            tos: vec![root],
        })
    }

    /// Offer the next token to every live parse.
    pub fn consume(&mut self, terminal: TerminalID, value: D::Value) -> Result<(), GeneralizedError> {
        let value = Some(value);
        let mut next = Vec::new();
        let mut work = std::mem::take(&mut self.tos);
        let mut budget = self.reduction_budget();
        while let Some(top) = work.pop() {
            let op = self.tables.action(top.state, terminal);
            self.act(op, top, &value, &mut work, &mut next, &mut budget)?;
        }
        self.tos = next;
        if self.tos.is_empty() {
            return Err(GeneralizedError::DiedMidway);
        }
        Ok(())
    }

    /// Wrap up at end of input and reconcile whatever survived.
    pub fn finish(mut self) -> Result<D::Value, GeneralizedError> {
        let mut accepted: Vec<Link<D::Value>> = Vec::new();
        let mut work = std::mem::take(&mut self.tos);
        let mut budget = self.reduction_budget();
        while let Some(top) = work.pop() {
            match self.tables.action(top.state, TerminalID::EOI) {
                Op::Accept => accepted.push(top),
                Op::Reduce(rule) => {
                    budget = budget
                        .checked_sub(1)
                        .ok_or(GeneralizedError::HiddenLeftRecursion)?;
                    work.push(self.reduction(rule, top));
                }
                Op::Split(ix) => {
                    for alt in self.tables.split(ix).to_vec() {
                        match alt {
                            Op::Accept => accepted.push(top.clone()),
                            Op::Reduce(rule) => {
                                budget = budget
                                    .checked_sub(1)
                                    .ok_or(GeneralizedError::HiddenLeftRecursion)?;
                                work.push(self.reduction(rule, top.clone()));
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        let mut values = accepted.into_iter().filter_map(|tip| tip.value.clone());
        match values.next() {
            Some(first) => {
                let rest: Vec<_> = values.collect();
                if rest.is_empty() {
                    Ok(first)
                } else {
                    Ok(self.driver.ambiguity(first, rest))
                }
            }
            None => Err(GeneralizedError::IncompleteSentence),
        }
    }

    /// A limit on reductions between consumed tokens. A healthy grammar
    /// stays far below it; exhausting it means some epsilon cycle is being
    /// pumped, which is the signature of hidden left recursion.
    fn reduction_budget(&self) -> usize {
        8 * self.tables.state_count() * self.tables.rule_count().max(1) + 256
    }

    fn act(
        &mut self,
        op: Op,
        top: Link<D::Value>,
        value: &Option<D::Value>,
        work: &mut Vec<Link<D::Value>>,
        next: &mut Vec<Link<D::Value>>,
        budget: &mut usize,
    ) -> Result<(), GeneralizedError> {
        match op {
            // This branch of the stack dies.
            Op::Error | Op::Accept => Ok(()),
            Op::Reduce(rule) => {
                *budget = budget
                    .checked_sub(1)
                    .ok_or(GeneralizedError::HiddenLeftRecursion)?;
                work.push(self.reduction(rule, top));
                Ok(())
            }
            Op::Shift(state) => {
                let tip = Rc::new(Node {
                    state,
                    prior: Some(top),
                    value: value.clone(),
                });
                let tip = self.settle(tip, budget)?;
                next.push(tip);
                Ok(())
            }
            Op::ShiftReduce(rule) => {
                let tip = Rc::new(Node {
                    state: StateID::from_raw(u32::MAX),
                    prior: Some(top),
                    value: value.clone(),
                });
                let tip = self.reduction(rule, tip);
                let tip = self.settle(tip, budget)?;
                next.push(tip);
                Ok(())
            }
            Op::Split(ix) => {
                for alt in self.tables.split(ix).to_vec() {
                    self.act(alt, top.clone(), value, work, next, budget)?;
                }
                Ok(())
            }
        }
    }

    /// After a shift, run reductions that need no further lookahead so the
    /// tip rests somewhere a decision is actually pending.
    fn settle(
        &mut self,
        mut tip: Link<D::Value>,
        budget: &mut usize,
    ) -> Result<Link<D::Value>, GeneralizedError> {
        while let Some(Op::Reduce(rule)) = self.tables.eager_step(tip.state) {
            *budget = budget
                .checked_sub(1)
                .ok_or(GeneralizedError::HiddenLeftRecursion)?;
            tip = self.reduction(rule, tip);
        }
        Ok(tip)
    }

    fn reduction(&mut self, rule: RuleID, top: Link<D::Value>) -> Link<D::Value> {
        let info = self.tables.rule(rule).clone();
        let value: Option<D::Value> = match info.constructor {
            Constructor::Pick(offset) => Self::view(&top, &[offset]).pop().flatten(),
            Constructor::Message(ix) => {
                let args = Self::view(&top, &info.captures).into_iter().flatten().collect();
                let name = self.tables.constructor_name(ix).to_owned();
                Some(self.driver.message(&name, args))
            }
            Constructor::Bundle => {
                let args = Self::view(&top, &info.captures).into_iter().flatten().collect();
                Some(self.driver.bundle(args))
            }
        };
        let mut below = top;
        for _ in 0..info.rhs_len {
            if let Some(prior) = below.prior.clone() {
                below = prior;
            }
        }
        let state = self.tables.goto(below.state, info.lhs);
        Rc::new(Node {
            state,
            prior: Some(below),
            value,
        })
    }

    /// Collect the values at the given negative offsets (top of stack is
    /// offset -1), left to right.
    fn view(top: &Link<D::Value>, offsets: &[i16]) -> Vec<Option<D::Value>> {
        let mut result = Vec::with_capacity(offsets.len());
        let mut depth: i16 = -1;
        let mut node = top.clone();
        for &seeking in offsets.iter().rev() {
            while depth > seeking {
                depth -= 1;
                if let Some(prior) = node.prior.clone() {
                    node = prior;
                }
            }
            result.push(node.value.clone());
        }
        result.reverse();
        result
    }
}
