//! Nondeterministic finite automata, built by Thompson construction.
//!
//! Every scan condition owns a pair of entry nodes: one for mid-line starts
//! and one for beginning-of-line starts, which is how the `^` anchor works.
//! A condition may include another condition's rules by epsilon-linking the
//! corresponding entries. Nodes carry the rank of the rule they belong to;
//! ranks decide accept contention during subset construction.

use handloom_runtime::definition::ScanRuleID;

use crate::charset::Charset;
use crate::pattern::{Pattern, Regex};
use crate::types::Map;

#[derive(Debug, Default)]
pub struct Node {
    pub edges: Vec<(Charset, usize)>,
    pub epsilons: Vec<usize>,
    pub rank: i32,
}

#[derive(Debug, Default)]
pub struct Nfa {
    pub nodes: Vec<Node>,
    /// Condition name -> (mid-line entry, begin-line entry).
    pub initial: Map<String, (usize, usize)>,
    pub accept: Map<usize, ScanRuleID>,
}

impl Nfa {
    pub fn new_node(&mut self, rank: i32) -> usize {
        self.nodes.push(Node {
            edges: Vec::new(),
            epsilons: Vec::new(),
            rank,
        });
        self.nodes.len() - 1
    }

    /// Entry nodes for a condition, created on first mention.
    pub fn condition(&mut self, name: &str) -> (usize, usize) {
        if let Some(&pair) = self.initial.get(name) {
            return pair;
        }
        let pair = (self.new_node(0), self.new_node(0));
        self.initial.insert(name.to_owned(), pair);
        pair
    }

    pub fn link(&mut self, src: usize, dst: usize, label: Charset) {
        self.nodes[src].edges.push((label, dst));
    }

    pub fn link_epsilon(&mut self, src: usize, dst: usize) {
        self.nodes[src].epsilons.push(dst);
    }

    /// Make every rule of `included` also active in `host`, at the same
    /// relative rank.
    pub fn link_condition(&mut self, host: &str, included: &str) {
        let (h_mid, h_bol) = self.condition(host);
        let (i_mid, i_bol) = self.condition(included);
        self.link_epsilon(h_mid, i_mid);
        self.link_epsilon(h_bol, i_bol);
    }

    /// Install one pattern as a rule active in the given conditions.
    pub fn add_rule(&mut self, conditions: &[String], pattern: &Pattern, rule: ScanRuleID, rank: i32) {
        let start = self.new_node(rank);
        for name in conditions {
            let (mid, bol) = self.condition(name);
            if !pattern.anchored {
                self.link_epsilon(mid, start);
            }
            self.link_epsilon(bol, start);
        }
        let fin = self.new_node(rank);
        match &pattern.trail {
            None => self.encode(&pattern.stem, start, fin, rank),
            Some(trail) => {
                let mid = self.new_node(rank);
                self.encode(&pattern.stem, start, mid, rank);
                self.encode(trail, mid, fin, rank);
            }
        }
        self.accept.insert(fin, rule);
    }

    fn encode(&mut self, regex: &Regex, src: usize, dst: usize, rank: i32) {
        match regex {
            Regex::Empty => self.link_epsilon(src, dst),
            Regex::Class(set) => self.link(src, dst, set.clone()),
            Regex::Cat(a, b) => {
                let mid = self.new_node(rank);
                self.encode(a, src, mid, rank);
                self.encode(b, mid, dst, rank);
            }
            Regex::Alt(a, b) => {
                self.encode(a, src, dst, rank);
                self.encode(b, src, dst, rank);
            }
            Regex::Star(sub) => {
                let enter = self.new_node(rank);
                let exit = self.new_node(rank);
                self.link_epsilon(src, dst);
                self.link_epsilon(src, enter);
                self.encode(sub, enter, exit, rank);
                self.link_epsilon(exit, enter);
                self.link_epsilon(exit, dst);
            }
            Regex::Plus(sub) => {
                let enter = self.new_node(rank);
                let exit = self.new_node(rank);
                self.link_epsilon(src, enter);
                self.encode(sub, enter, exit, rank);
                self.link_epsilon(exit, enter);
                self.link_epsilon(exit, dst);
            }
            Regex::Hook(sub) => {
                self.link_epsilon(src, dst);
                self.encode(sub, src, dst, rank);
            }
        }
    }
}
