//! The scanner definition builder and its finished tables.
//!
//! A definition is a set of named subexpressions, scan conditions (possibly
//! including one another), and pattern rules with actions and ranks. The
//! build walks pattern parsing, validity checks, Thompson construction,
//! subset construction, and both minimizations, accumulating diagnostics
//! throughout and failing collectively if anything fatal was seen.

use handloom_runtime::definition::{ScanRuleID, ScanTables, Trail};

use crate::dfa::{subset_construct, Dfa};
use crate::diagnostics::{Diagnostic, Diagnostics, DefinitionErrors};
use crate::nfa::Nfa;
use crate::pattern::{parse_pattern, Pattern, PatternEnv};
use crate::types::Map;

pub const INITIAL: &str = "INITIAL";

struct RuleDef {
    source: String,
    action: String,
    rank: i32,
    conditions: Vec<String>,
    line: u32,
}

/// Builder for a scanner.
pub struct ScannerDef {
    env: PatternEnv,
    inclusions: Vec<(String, String)>,
    rules: Vec<RuleDef>,
    diagnostics: Diagnostics,
    next_line: u32,
}

impl Default for ScannerDef {
    fn default() -> Self {
        Self {
            env: PatternEnv::default(),
            inclusions: Vec::new(),
            rules: Vec::new(),
            diagnostics: Diagnostics::default(),
            next_line: 0,
        }
    }
}

impl ScannerDef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a named subexpression for later `{name}` reference.
    pub fn define(&mut self, name: &str, regex: &str) {
        self.next_line += 1;
        if let Err(e) = self.env.define(name, regex) {
            self.diagnostics
                .error(Some(self.next_line), format!("in definition of {name:?}: {e}"));
        }
    }

    /// Rules of `included` become active whenever `host` is the current
    /// condition.
    pub fn include(&mut self, host: &str, included: &str) {
        self.inclusions.push((host.to_owned(), included.to_owned()));
    }

    /// A rule in the INITIAL condition at rank zero.
    pub fn rule(&mut self, pattern: &str, action: &str) {
        self.rule_full(&[INITIAL], pattern, action, 0);
    }

    /// A rule in the INITIAL condition at the given rank.
    pub fn ranked_rule(&mut self, pattern: &str, action: &str, rank: i32) {
        self.rule_full(&[INITIAL], pattern, action, rank);
    }

    /// A rule active in the given conditions at rank zero.
    pub fn rule_in(&mut self, conditions: &[&str], pattern: &str, action: &str) {
        self.rule_full(conditions, pattern, action, 0);
    }

    pub fn rule_full(&mut self, conditions: &[&str], pattern: &str, action: &str, rank: i32) {
        self.next_line += 1;
        self.rules.push(RuleDef {
            source: pattern.to_owned(),
            action: action.to_owned(),
            rank,
            conditions: conditions.iter().map(|&s| s.to_owned()).collect(),
            line: self.next_line,
        });
    }

    pub fn build(mut self) -> Result<(ScannerTables, Vec<Diagnostic>), DefinitionErrors> {
        let span = tracing::trace_span!("build_scanner");
        let _entered = span.enter();

        let mut parsed: Vec<Option<Pattern>> = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            match parse_pattern(&rule.source, &self.env) {
                Ok(p) => parsed.push(Some(p)),
                Err(e) => {
                    self.diagnostics
                        .error(Some(rule.line), format!("pattern {:?}: {e}", rule.source));
                    parsed.push(None);
                }
            }
        }

        // Identical pattern text active in the same condition must agree on
        // rank, or the tie-break would be meaningless.
        let mut claimed: Map<(String, String), (i32, u32)> = Map::default();
        for rule in &self.rules {
            for cond in &rule.conditions {
                let key = (rule.source.clone(), cond.clone());
                match claimed.get(&key) {
                    None => {
                        claimed.insert(key, (rule.rank, rule.line));
                    }
                    Some(&(rank, first_line)) if rank != rule.rank => {
                        self.diagnostics.error(
                            Some(rule.line),
                            format!(
                                "pattern {:?} in condition {cond} conflicts with the rank \
                                 given at line {first_line}",
                                rule.source
                            ),
                        );
                    }
                    Some(_) => self.diagnostics.warning(
                        Some(rule.line),
                        format!("pattern {:?} in condition {cond} is a duplicate", rule.source),
                    ),
                }
            }
        }

        let mut metas: Vec<(String, Trail, u32)> = Vec::with_capacity(self.rules.len());
        for (rule, pattern) in self.rules.iter().zip(&parsed) {
            let Some(pattern) = pattern else {
                metas.push((rule.action.clone(), Trail::None, rule.line));
                continue;
            };
            if rule.rank < 0 {
                self.diagnostics
                    .error(Some(rule.line), "rule rank must not be negative");
            }
            let trail = match &pattern.trail {
                None => {
                    if pattern.stem.nullable() {
                        self.diagnostics.error(
                            Some(rule.line),
                            format!("pattern {:?} can match the empty string", rule.source),
                        );
                    }
                    Trail::None
                }
                Some(trail) => match (trail.fixed_size(), pattern.stem.fixed_size()) {
                    (Some(t), _) => Trail::Rewind(t),
                    (None, Some(s)) => Trail::Keep(s),
                    (None, None) => {
                        self.diagnostics.error(
                            Some(rule.line),
                            format!(
                                "pattern {:?}: variable size for both stem and trailing context",
                                rule.source
                            ),
                        );
                        Trail::None
                    }
                },
            };
            metas.push((rule.action.clone(), trail, rule.line));
        }

        if self.diagnostics.has_errors() {
            return Err(self.diagnostics.into_errors());
        }

        let mut nfa = Nfa::default();
        nfa.condition(INITIAL);
        for (ix, (rule, pattern)) in self.rules.iter().zip(&parsed).enumerate() {
            if let Some(pattern) = pattern {
                nfa.add_rule(
                    &rule.conditions,
                    pattern,
                    ScanRuleID::from_raw(ix as u16),
                    rule.rank,
                );
            }
        }
        for (host, included) in &self.inclusions {
            nfa.link_condition(host, included);
        }

        let dfa = subset_construct(&nfa).minimize_states().minimize_alphabet();

        let mut reachable = vec![false; self.rules.len()];
        for label in dfa.accept.iter().flatten() {
            reachable[label.index()] = true;
        }
        for (rule, seen) in self.rules.iter().zip(&reachable) {
            if !seen {
                self.diagnostics.warning(
                    Some(rule.line),
                    format!("pattern {:?} can never match", rule.source),
                );
            }
        }

        tracing::debug!(
            states = dfa.state_count(),
            classes = dfa.n_classes,
            rules = self.rules.len(),
            "scanner tables ready"
        );
        let tables = ScannerTables { dfa, rules: metas };
        self.diagnostics.into_result(tables)
    }
}

/// Dense scan tables: the delta matrix over alphabet classes plus per-rule
/// action metadata.
#[derive(Debug, Clone)]
pub struct ScannerTables {
    dfa: Dfa,
    rules: Vec<(String, Trail, u32)>,
}

impl ScannerTables {
    pub fn state_count(&self) -> usize {
        self.dfa.state_count()
    }

    pub fn class_count(&self) -> usize {
        self.dfa.n_classes
    }
}

impl ScanTables for ScannerTables {
    fn classify(&self, cp: Option<char>) -> u16 {
        self.dfa.classify(cp.map_or(-1, |c| c as i32))
    }

    fn condition(&self, name: &str) -> Option<(u32, u32)> {
        self.dfa.initial.get(name).copied()
    }

    fn next(&self, state: u32, class: u16) -> Option<u32> {
        let target = *self.dfa.delta.get(state as usize)?.get(class as usize)?;
        (target >= 0).then_some(target as u32)
    }

    fn accept(&self, state: u32) -> Option<(ScanRuleID, Trail)> {
        let rule = (*self.dfa.accept.get(state as usize)?)?;
        Some((rule, self.rules[rule.index()].1))
    }

    fn action_name(&self, rule: ScanRuleID) -> &str {
        &self.rules[rule.index()].0
    }

    fn rule_line(&self, rule: ScanRuleID) -> u32 {
        self.rules[rule.index()].2
    }

    fn rule_count(&self) -> usize {
        self.rules.len()
    }
}
