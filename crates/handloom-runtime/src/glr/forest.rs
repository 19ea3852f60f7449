//! The shared parse forest used by the graph-structured stack.
//!
//! Under the deferred discipline, semantic actions do not run during the
//! parse; instead every GSS edge carries an index into this arena. A branch
//! node may accumulate several *families* (alternative children lists) when
//! derivations merge; evaluation resolves them through the driver's
//! `ambiguity` hook where the grammar permits, and reports an error where it
//! does not.

use super::GeneralizedError;
use crate::definition::{Constructor, NonterminalID, ParserTables, RuleID};
use crate::parser::Combine;

#[derive(Debug)]
pub(crate) enum Node<V> {
    Leaf {
        value: V,
    },
    Branch {
        lhs: NonterminalID,
        families: Vec<(RuleID, Vec<u32>)>,
    },
}

#[derive(Debug, Default)]
pub(crate) struct Forest<V> {
    nodes: Vec<Node<V>>,
}

enum Memo<V> {
    Untouched,
    InProgress,
    Done(V),
}

impl<V: Clone> Forest<V> {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn leaf(&mut self, value: V) -> u32 {
        self.nodes.push(Node::Leaf { value });
        (self.nodes.len() - 1) as u32
    }

    pub fn branch(&mut self, lhs: NonterminalID, rule: RuleID, children: Vec<u32>) -> u32 {
        self.nodes.push(Node::Branch {
            lhs,
            families: vec![(rule, children)],
        });
        (self.nodes.len() - 1) as u32
    }

    /// Merge another derivation into an existing branch.
    pub fn add_family(&mut self, node: u32, rule: RuleID, children: Vec<u32>) {
        if let Node::Branch { families, .. } = &mut self.nodes[node as usize] {
            if !families.iter().any(|(r, c)| *r == rule && *c == children) {
                families.push((rule, children));
            }
        }
    }

    /// Run the deferred semantic actions bottom-up.
    pub fn evaluate<T, D>(
        &self,
        root: u32,
        tables: &T,
        driver: &mut D,
    ) -> Result<V, GeneralizedError>
    where
        T: ParserTables,
        D: Combine<Value = V>,
    {
        let mut memo: Vec<Memo<V>> = (0..self.nodes.len()).map(|_| Memo::Untouched).collect();
        self.eval(root, tables, driver, &mut memo)
    }

    fn eval<T, D>(
        &self,
        ix: u32,
        tables: &T,
        driver: &mut D,
        memo: &mut Vec<Memo<V>>,
    ) -> Result<V, GeneralizedError>
    where
        T: ParserTables,
        D: Combine<Value = V>,
    {
        match &memo[ix as usize] {
            Memo::Done(v) => return Ok(v.clone()),
            Memo::InProgress => return Err(GeneralizedError::CyclicDerivation),
            Memo::Untouched => {}
        }
        memo[ix as usize] = Memo::InProgress;
        let value = match &self.nodes[ix as usize] {
            Node::Leaf { value } => value.clone(),
            Node::Branch { lhs, families } => {
                let mut alternatives = Vec::with_capacity(families.len());
                for (rule, children) in families {
                    let mut args = Vec::with_capacity(children.len());
                    for &child in children {
                        args.push(self.eval(child, tables, driver, memo)?);
                    }
                    alternatives.push(self.apply(*rule, args, tables, driver));
                }
                let mut it = alternatives.into_iter();
                let first = it.next().ok_or(GeneralizedError::IncompleteSentence)?;
                let rest: Vec<_> = it.collect();
                if rest.is_empty() {
                    first
                } else if tables.ambiguous_allowed(*lhs) {
                    driver.ambiguity(first, rest)
                } else {
                    let name = tables.nonterminal_name(*lhs).to_owned();
                    return Err(GeneralizedError::Ambiguous(name));
                }
            }
        };
        memo[ix as usize] = Memo::Done(value.clone());
        Ok(value)
    }

    /// One rule application: select captures from the full children list and
    /// dispatch the rule's constructor.
    fn apply<T, D>(&self, rule: RuleID, children: Vec<V>, tables: &T, driver: &mut D) -> V
    where
        T: ParserTables,
        D: Combine<Value = V>,
    {
        let info = tables.rule(rule);
        let len = children.len() as isize;
        let at = |offset: i16| children[(len + offset as isize) as usize].clone();
        match info.constructor {
            Constructor::Pick(offset) => at(offset),
            Constructor::Message(ix) => {
                let args = info.captures.iter().map(|&o| at(o)).collect();
                let name = tables.constructor_name(ix).to_owned();
                driver.message(&name, args)
            }
            Constructor::Bundle => {
                let args = info.captures.iter().map(|&o| at(o)).collect();
                driver.bundle(args)
            }
        }
    }
}
