//! The context-free grammar model.
//!
//! A `GrammarDef` accumulates rules in element form (captures, mid-rule
//! actions, macro calls), precedence declarations, start symbols, and the
//! nondeterminism declaration. `end()` elaborates the sugar down to plain
//! rules, decides which names are terminals (anything that never appears on
//! a left-hand side), runs the whole validation suite, and produces an
//! immutable `Grammar` ready for table construction.

use std::fmt;

use handloom_runtime::definition::{NonterminalID, RuleID, SymbolID, TerminalID, TerminalIDSet};

use crate::closure::{propagate_sets, Closure};
use crate::diagnostics::{Diagnostic, Diagnostics, DefinitionErrors};
use crate::ebnf::{self, Alt, MacroDef};
use crate::types::{display_fn, strongly_connected_components, Map, Set};

/// The spelling of the error metatoken in rule right-hand sides.
pub const ERROR_NAME: &str = "$error$";
/// How the end-of-input sentinel prints.
pub const EOI_NAME: &str = "$end$";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
    Nonassoc,
    /// Establishes a precedence level for `%prec` use only; a bogus token
    /// never appears in a right-hand side nor in input.
    Bogus,
}

/// Whether the first-declared precedence level binds loosest or tightest.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PrecedenceOrder {
    FirstLow,
    FirstHigh,
}

/// How semantic actions behave under nondeterminism.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Discipline {
    /// Actions are pure and run immediately; ambiguity is merged at accept.
    Pure,
    /// Actions are recorded and run once the parse commits.
    Deferred,
}

#[derive(Debug, Clone)]
pub struct NondetDecl {
    /// Nonterminals permitted to be ambiguous; empty means all of them.
    pub allowed: Set<NonterminalID>,
    pub discipline: Discipline,
}

/// What a rule does for attribute synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleAction {
    /// Dispatch this message with the captured arguments.
    Message(String),
    /// Pass through the value at this negative offset from the rule's end
    /// (renaming and bracketing rules).
    Pick(i16),
    /// Bundle the captures into the driver's default aggregate.
    Bundle,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub lhs: NonterminalID,
    pub rhs: Vec<SymbolID>,
    pub action: RuleAction,
    /// Semantically significant positions, as negative offsets from the end
    /// of the right-hand side. Mid-rule action rules reach further down.
    pub captures: Vec<i16>,
    pub prec_sym: Option<TerminalID>,
    pub line: u32,
}

impl Rule {
    /// A unit rule with no semantic content of its own.
    pub fn is_rename(&self) -> bool {
        self.rhs.len() == 1 && self.action == RuleAction::Pick(-1)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Decision {
    Shift,
    Reduce,
    /// Equal precedence under nonassociativity: the cell becomes a hard
    /// error so the mistake is reported at the operator.
    Error,
}

#[derive(Debug)]
pub struct Grammar {
    terminal_names: Vec<String>,
    terminal_level: Vec<Option<u16>>,
    nonterminal_names: Vec<String>,
    rules: Vec<Rule>,
    rules_of: Vec<Vec<RuleID>>,
    start: Vec<NonterminalID>,
    level_assoc: Vec<Assoc>,
    order: PrecedenceOrder,
    nondet: Option<NondetDecl>,
    nullable: Vec<bool>,
    first: Vec<TerminalIDSet>,
}

impl Grammar {
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, id: RuleID) -> &Rule {
        &self.rules[id.index()]
    }

    pub fn rules_of(&self, nt: NonterminalID) -> &[RuleID] {
        &self.rules_of[nt.into_raw() as usize]
    }

    pub fn start(&self) -> &[NonterminalID] {
        &self.start
    }

    pub fn terminal_count(&self) -> usize {
        self.terminal_names.len()
    }

    pub fn nonterminal_count(&self) -> usize {
        self.nonterminal_names.len()
    }

    pub fn terminals(&self) -> impl Iterator<Item = TerminalID> + '_ {
        (0..self.terminal_names.len()).map(|ix| TerminalID::from_raw(ix as u16))
    }

    pub fn nonterminals(&self) -> impl Iterator<Item = NonterminalID> + '_ {
        (0..self.nonterminal_names.len()).map(|ix| NonterminalID::from_raw(ix as u16))
    }

    pub fn terminal_name(&self, t: TerminalID) -> &str {
        if t == TerminalID::EOI {
            EOI_NAME
        } else {
            &self.terminal_names[t.into_raw() as usize]
        }
    }

    pub fn nonterminal_name(&self, n: NonterminalID) -> &str {
        &self.nonterminal_names[n.into_raw() as usize]
    }

    pub fn symbol_name(&self, sym: SymbolID) -> &str {
        match sym {
            SymbolID::T(t) => self.terminal_name(t),
            SymbolID::N(n) => self.nonterminal_name(n),
        }
    }

    pub fn find_terminal(&self, name: &str) -> Option<TerminalID> {
        self.terminal_names
            .iter()
            .position(|n| n == name)
            .map(|ix| TerminalID::from_raw(ix as u16))
    }

    pub fn find_nonterminal(&self, name: &str) -> Option<NonterminalID> {
        self.nonterminal_names
            .iter()
            .position(|n| n == name)
            .map(|ix| NonterminalID::from_raw(ix as u16))
    }

    pub fn is_nullable(&self, n: NonterminalID) -> bool {
        self.nullable[n.into_raw() as usize]
    }

    pub fn first_of(&self, n: NonterminalID) -> &TerminalIDSet {
        &self.first[n.into_raw() as usize]
    }

    pub fn nondet(&self) -> Option<&NondetDecl> {
        self.nondet.as_ref()
    }

    pub fn ambiguous_allowed(&self, n: NonterminalID) -> bool {
        match &self.nondet {
            None => false,
            Some(decl) => decl.allowed.is_empty() || decl.allowed.contains(&n),
        }
    }

    /// The precedence level governing a rule in a shift/reduce conflict:
    /// the explicit `%prec` symbol if given, else the rightmost terminal.
    pub fn rule_level(&self, rule: &Rule) -> Option<u16> {
        let sym = match rule.prec_sym {
            Some(t) => Some(t),
            None => rule.rhs.iter().rev().find_map(|s| match s {
                SymbolID::T(t) => Some(*t),
                SymbolID::N(_) => None,
            }),
        };
        self.terminal_level[sym?.into_raw() as usize]
    }

    fn priority(&self, level: u16) -> i32 {
        match self.order {
            PrecedenceOrder::FirstLow => level as i32,
            PrecedenceOrder::FirstHigh => -(level as i32),
        }
    }

    /// Resolve one shift/reduce pairing, or `None` if precedence does not
    /// settle it.
    pub fn decide_shift_reduce(&self, token: TerminalID, rule: RuleID) -> Option<Decision> {
        if token == TerminalID::EOI {
            return None;
        }
        let token_level = self.terminal_level[token.into_raw() as usize]?;
        let rule_level = self.rule_level(self.rule(rule))?;
        match self.priority(rule_level).cmp(&self.priority(token_level)) {
            std::cmp::Ordering::Greater => Some(Decision::Reduce),
            std::cmp::Ordering::Less => Some(Decision::Shift),
            std::cmp::Ordering::Equal => match self.level_assoc[rule_level as usize] {
                Assoc::Left => Some(Decision::Reduce),
                Assoc::Right => Some(Decision::Shift),
                Assoc::Nonassoc => Some(Decision::Error),
                Assoc::Bogus => None,
            },
        }
    }

    pub fn display_rule<'g>(&'g self, id: RuleID) -> impl fmt::Display + 'g {
        display_fn(move |f| {
            let rule = self.rule(id);
            write!(f, "{} ->", self.nonterminal_name(rule.lhs))?;
            for sym in &rule.rhs {
                write!(f, " {}", self.symbol_name(*sym))?;
            }
            Ok(())
        })
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "terminals: {}", self.terminal_names.join(", "))?;
        writeln!(f, "nonterminals: {}", self.nonterminal_names.join(", "))?;
        let names: Vec<_> = self
            .start
            .iter()
            .map(|&s| self.nonterminal_name(s))
            .collect();
        writeln!(f, "start: {}", names.join(", "))?;
        writeln!(f, "rules:")?;
        for ix in 0..self.rules.len() {
            writeln!(f, "  [{:02}] {}", ix, self.display_rule(RuleID::from_raw(ix as u16)))?;
        }
        Ok(())
    }
}

/// A plain rule as it comes out of elaboration: still on names.
#[derive(Debug, Clone)]
pub(crate) struct PlainRule {
    pub lhs: String,
    pub rhs: Vec<String>,
    pub action: RuleAction,
    pub captures: Vec<i16>,
    pub prec_sym: Option<String>,
    pub line: u32,
}

/// The contextual values for building a [`Grammar`].
pub struct GrammarDef {
    pub(crate) pending: Vec<(String, Alt, u32)>,
    pub(crate) macros: Map<String, MacroDef>,
    pub(crate) extra_plain: Vec<PlainRule>,
    pub(crate) void_names: Set<String>,
    start: Vec<String>,
    levels: Vec<(Assoc, Vec<String>)>,
    order: PrecedenceOrder,
    nondet: Option<(Vec<String>, Discipline)>,
    pub(crate) diagnostics: Diagnostics,
    next_line: u32,
}

impl Default for GrammarDef {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            macros: Map::default(),
            extra_plain: Vec::new(),
            void_names: Set::default(),
            start: Vec::new(),
            levels: Vec::new(),
            order: PrecedenceOrder::FirstLow,
            nondet: None,
            diagnostics: Diagnostics::default(),
            next_line: 0,
        }
    }
}

impl GrammarDef {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump_line(&mut self) -> u32 {
        self.next_line += 1;
        self.next_line
    }

    /// Whether the first precedence declaration is the loosest or the
    /// tightest level.
    pub fn precedence_order(&mut self, order: PrecedenceOrder) {
        self.order = order;
    }

    /// Declare the next precedence level.
    pub fn precedence(&mut self, assoc: Assoc, tokens: &[&str]) {
        let line = self.bump_line();
        for earlier in &self.levels {
            for t in tokens {
                if earlier.1.iter().any(|n| n == t) {
                    self.diagnostics
                        .error(Some(line), format!("precedence declared twice on {t:?}"));
                }
            }
        }
        self.levels
            .push((assoc, tokens.iter().map(|&s| s.to_owned()).collect()));
    }

    /// Mark symbols as carrying no semantic value; default capture lists
    /// skip them.
    pub fn void_symbols(&mut self, names: &[&str]) {
        for &n in names {
            self.void_names.insert(n.to_owned());
        }
    }

    /// Declare a start symbol. Each one gets its own initial state.
    pub fn start(&mut self, name: &str) {
        self.start.push(name.to_owned());
    }

    /// Declare the grammar non-deterministic. `allowed` names the
    /// nonterminals permitted to be ambiguous (empty = all of them).
    pub fn nondeterministic(&mut self, allowed: &[&str], discipline: Discipline) {
        self.nondet = Some((
            allowed.iter().map(|&s| s.to_owned()).collect(),
            discipline,
        ));
    }

    /// Add one alternative for `lhs`, in element form.
    pub fn rule(&mut self, lhs: &str, alt: Alt) {
        let line = self.bump_line();
        self.pending.push((lhs.to_owned(), alt, line));
    }

    /// The precomputed-mask form: positions in `captures` index the RHS.
    /// Produces exactly the same rule records as the element form.
    pub fn rule_with_captures(
        &mut self,
        lhs: &str,
        rhs: &[&str],
        captures: &[u16],
        message: Option<&str>,
    ) {
        let line = self.bump_line();
        let size = rhs.len() as i16;
        let offsets: Vec<i16> = captures.iter().map(|&p| p as i16 - size).collect();
        let action = ebnf::decide_action(message, &offsets, size, !captures.is_empty());
        self.extra_plain.push(PlainRule {
            lhs: lhs.to_owned(),
            rhs: rhs.iter().map(|&s| s.to_owned()).collect(),
            action,
            captures: offsets,
            prec_sym: None,
            line,
        });
    }

    /// Define a macro: a parametric group of alternatives, instantiated per
    /// distinct argument list at its call sites.
    pub fn macro_rule(&mut self, name: &str, params: &[&str], alts: Vec<Alt>) {
        let line = self.bump_line();
        if self.macros.contains_key(name) {
            self.diagnostics
                .error(Some(line), format!("macro {name:?} is declared twice"));
            return;
        }
        let mut seen = Set::default();
        for &p in params {
            if !seen.insert(p) || p == name {
                self.diagnostics.error(
                    Some(line),
                    "all the names in a macro head must be distinct".to_owned(),
                );
            }
        }
        self.macros.insert(
            name.to_owned(),
            MacroDef {
                params: params.iter().map(|&s| s.to_owned()).collect(),
                alts,
                line,
            },
        );
    }

    /// Elaborate, validate, and freeze.
    pub fn end(mut self) -> Result<(Grammar, Vec<Diagnostic>), DefinitionErrors> {
        let span = tracing::trace_span!("build_grammar");
        let _entered = span.enter();

        let plain = ebnf::elaborate(&mut self);

        // Decide symbol kinds: every left-hand side is a nonterminal, and
        // anything else mentioned is apparently a terminal.
        let mut nt_index: Map<String, NonterminalID> = Map::default();
        let mut nonterminal_names = Vec::new();
        for rule in &plain {
            if !nt_index.contains_key(&rule.lhs) {
                let id = NonterminalID::from_raw(nonterminal_names.len() as u16);
                nt_index.insert(rule.lhs.clone(), id);
                nonterminal_names.push(rule.lhs.clone());
            }
        }
        let mut t_index: Map<String, TerminalID> = Map::default();
        let mut terminal_names = vec![ERROR_NAME.to_owned()];
        t_index.insert(ERROR_NAME.to_owned(), TerminalID::ERROR);
        let mut intern_terminal = |name: &str, names: &mut Vec<String>| -> TerminalID {
            match t_index.get(name) {
                Some(&t) => t,
                None => {
                    let t = TerminalID::from_raw(names.len() as u16);
                    t_index.insert(name.to_owned(), t);
                    names.push(name.to_owned());
                    t
                }
            }
        };
        for rule in &plain {
            for sym in &rule.rhs {
                if !nt_index.contains_key(sym) {
                    intern_terminal(sym, &mut terminal_names);
                }
            }
        }
        // Precedence-only (possibly bogus) tokens still need identities.
        for (_, tokens) in &self.levels {
            for name in tokens {
                if nt_index.contains_key(name) {
                    self.diagnostics.error(
                        None,
                        format!("nonterminal {name:?} included in precedence declaration"),
                    );
                } else {
                    intern_terminal(name, &mut terminal_names);
                }
            }
        }

        if plain.iter().any(|r| r.lhs == ERROR_NAME) {
            self.diagnostics
                .error(None, format!("{ERROR_NAME:?} cannot be a rule head"));
        }

        // Terminal precedence levels.
        let mut terminal_level: Vec<Option<u16>> = vec![None; terminal_names.len()];
        let level_assoc: Vec<Assoc> = self.levels.iter().map(|(a, _)| *a).collect();
        for (level, (_, tokens)) in self.levels.iter().enumerate() {
            for name in tokens {
                if let Some(&t) = t_index.get(name) {
                    terminal_level[t.into_raw() as usize] = Some(level as u16);
                }
            }
        }

        // Convert rules onto IDs.
        let mut rules: Vec<Rule> = Vec::with_capacity(plain.len());
        let mut rules_of: Vec<Vec<RuleID>> = vec![Vec::new(); nonterminal_names.len()];
        for pr in &plain {
            let lhs = nt_index[&pr.lhs];
            let rhs: Vec<SymbolID> = pr
                .rhs
                .iter()
                .map(|name| match nt_index.get(name) {
                    Some(&n) => SymbolID::N(n),
                    None => SymbolID::T(t_index[name]),
                })
                .collect();
            let prec_sym = match &pr.prec_sym {
                None => None,
                Some(name) => match t_index.get(name) {
                    Some(&t) if terminal_level[t.into_raw() as usize].is_some() => Some(t),
                    _ => {
                        self.diagnostics.error(
                            Some(pr.line),
                            format!("%prec symbol {name:?} has no declared precedence level"),
                        );
                        None
                    }
                },
            };
            if rules.iter().any(|r| r.lhs == lhs && r.rhs == rhs) {
                self.diagnostics.error(
                    Some(pr.line),
                    format!("duplicate production rule for {:?}", pr.lhs),
                );
                continue;
            }
            let id = RuleID::from_raw(rules.len() as u16);
            rules_of[lhs.into_raw() as usize].push(id);
            rules.push(Rule {
                lhs,
                rhs,
                action: pr.action.clone(),
                captures: pr.captures.clone(),
                prec_sym,
                line: pr.line,
            });
        }

        // Bogus tokens may establish precedence but never appear in rules.
        for rule in &rules {
            for sym in &rule.rhs {
                if let SymbolID::T(t) = sym {
                    let bogus = terminal_level[t.into_raw() as usize]
                        .map_or(false, |lvl| level_assoc[lvl as usize] == Assoc::Bogus);
                    if bogus {
                        self.diagnostics.error(
                            Some(rule.line),
                            format!(
                                "rule produces bogus terminal {:?}",
                                terminal_names[t.into_raw() as usize]
                            ),
                        );
                    }
                }
            }
        }

        // Start symbols; default to the head of the first rule.
        if self.start.is_empty() {
            if let Some(first) = rules.first() {
                self.start.push(nonterminal_names[first.lhs.into_raw() as usize].clone());
            } else {
                self.diagnostics
                    .error(None, "a grammar needs at least one production rule");
            }
        }
        let mut start = Vec::new();
        for name in &self.start {
            match nt_index.get(name) {
                Some(&n) => start.push(n),
                None => self.diagnostics.error(
                    None,
                    format!("start symbol {name:?} has no production rules"),
                ),
            }
        }

        let nondet = self.nondet.take().map(|(names, discipline)| {
            let mut allowed = Set::default();
            for name in &names {
                match nt_index.get(name) {
                    Some(&n) => {
                        allowed.insert(n);
                    }
                    None => self.diagnostics.warning(
                        None,
                        format!("nondeterministic symbol {name:?} has no production rules"),
                    ),
                }
            }
            NondetDecl {
                allowed,
                discipline,
            }
        });

        if self.diagnostics.has_errors() {
            return Err(self.diagnostics.into_errors());
        }

        let mut grammar = Grammar {
            terminal_names,
            terminal_level,
            nonterminal_names,
            rules,
            rules_of,
            start,
            level_assoc,
            order: self.order,
            nondet,
            nullable: Vec::new(),
            first: Vec::new(),
        };
        grammar.nullable = grammar.compute_nullable();
        grammar.first = grammar.compute_first();
        grammar.validate(&mut self.diagnostics);

        tracing::debug!(
            terminals = grammar.terminal_count(),
            nonterminals = grammar.nonterminal_count(),
            rules = grammar.rules.len(),
            "grammar ready"
        );
        self.diagnostics.into_result(grammar)
    }
}

impl Grammar {
    fn compute_nullable(&self) -> Vec<bool> {
        // Disjunct per nonterminal; conjunct per rule whose RHS is all
        // nonterminal (a terminal can never derive epsilon).
        let mut closure = Closure::new(self.nonterminal_count());
        for rule in &self.rules {
            let mut inputs = Vec::with_capacity(rule.rhs.len());
            let mut viable = true;
            for sym in &rule.rhs {
                match sym {
                    SymbolID::N(n) => inputs.push(n.into_raw() as usize),
                    SymbolID::T(_) => {
                        viable = false;
                        break;
                    }
                }
            }
            if viable {
                closure.conjunct(&inputs, rule.lhs.into_raw() as usize);
            }
        }
        closure.solve([])
    }

    fn compute_first(&self) -> Vec<TerminalIDSet> {
        let mut first = vec![TerminalIDSet::default(); self.nonterminal_count()];
        let mut flows_into: Vec<Vec<usize>> = vec![Vec::new(); self.nonterminal_count()];
        for rule in &self.rules {
            let lhs = rule.lhs.into_raw() as usize;
            for sym in &rule.rhs {
                match sym {
                    SymbolID::T(t) => {
                        first[lhs].insert(*t);
                        break;
                    }
                    SymbolID::N(n) => {
                        flows_into[n.into_raw() as usize].push(lhs);
                        if !self.nullable[n.into_raw() as usize] {
                            break;
                        }
                    }
                }
            }
        }
        propagate_sets(&mut first, &flows_into);
        first
    }

    /// FIRST of a symbol string followed by nothing; also reports whether
    /// the whole string can derive epsilon.
    pub fn first_of_string(&self, symbols: &[SymbolID]) -> (TerminalIDSet, bool) {
        let mut out = TerminalIDSet::default();
        for sym in symbols {
            match sym {
                SymbolID::T(t) => {
                    out.insert(*t);
                    return (out, false);
                }
                SymbolID::N(n) => {
                    out.union_with(self.first_of(*n));
                    if !self.is_nullable(*n) {
                        return (out, false);
                    }
                }
            }
        }
        (out, true)
    }

    fn validate(&self, diagnostics: &mut Diagnostics) {
        self.assert_well_founded(diagnostics);
        self.assert_no_orphans(diagnostics);
        self.assert_no_rename_loops(diagnostics);
        self.assert_no_epsilon_loops(diagnostics);
    }

    /// A symbol is well-founded when it can produce some finite terminal
    /// string. Terminals seed the closure; a rule is a conjunct of its RHS.
    fn assert_well_founded(&self, diagnostics: &mut Diagnostics) {
        let nt_base = self.terminal_count();
        let mut closure = Closure::new(nt_base + self.nonterminal_count());
        for rule in &self.rules {
            let inputs: Vec<usize> = rule
                .rhs
                .iter()
                .map(|sym| match sym {
                    SymbolID::T(t) => t.into_raw() as usize,
                    SymbolID::N(n) => nt_base + n.into_raw() as usize,
                })
                .collect();
            closure.conjunct(&inputs, nt_base + rule.lhs.into_raw() as usize);
        }
        let well_founded = closure.solve(0..nt_base);
        let reachable = self.reachable_nonterminals();
        for n in self.nonterminals() {
            let ix = n.into_raw() as usize;
            if reachable[ix] && !well_founded[nt_base + ix] && !self.ambiguous_allowed(n) {
                diagnostics.error(
                    None,
                    format!("ill-founded symbol {:?}", self.nonterminal_name(n)),
                );
            }
        }
    }

    fn reachable_nonterminals(&self) -> Vec<bool> {
        let mut reachable = vec![false; self.nonterminal_count()];
        let mut stack: Vec<NonterminalID> = self.start.clone();
        while let Some(n) = stack.pop() {
            let ix = n.into_raw() as usize;
            if reachable[ix] {
                continue;
            }
            reachable[ix] = true;
            for &rule in self.rules_of(n) {
                for sym in &self.rule(rule).rhs {
                    if let SymbolID::N(m) = sym {
                        if !reachable[m.into_raw() as usize] {
                            stack.push(*m);
                        }
                    }
                }
            }
        }
        reachable
    }

    fn assert_no_orphans(&self, diagnostics: &mut Diagnostics) {
        let reachable = self.reachable_nonterminals();
        for n in self.nonterminals() {
            if !reachable[n.into_raw() as usize] {
                diagnostics.warning(
                    None,
                    format!(
                        "symbol {:?} is unreachable from any start symbol",
                        self.nonterminal_name(n)
                    ),
                );
            }
        }
    }

    /// A symbol replaceable by itself through unit rules is diseased.
    fn assert_no_rename_loops(&self, diagnostics: &mut Diagnostics) {
        let mut renames: Vec<Vec<usize>> = vec![Vec::new(); self.nonterminal_count()];
        for rule in &self.rules {
            if let [SymbolID::N(target)] = rule.rhs[..] {
                if target == rule.lhs {
                    diagnostics.error(
                        Some(rule.line),
                        format!(
                            "symbol {:?} may be replaced by itself in a loop",
                            self.nonterminal_name(rule.lhs)
                        ),
                    );
                } else {
                    renames[rule.lhs.into_raw() as usize].push(target.into_raw() as usize);
                }
            }
        }
        for component in strongly_connected_components(&renames) {
            if component.len() > 1 {
                let names: Vec<_> = component
                    .iter()
                    .map(|&ix| self.nonterminal_names[ix].as_str())
                    .collect();
                diagnostics.error(
                    None,
                    format!("symbols {:?} form a mutually-recursive renaming loop", names),
                );
            }
        }
    }

    /// Epsilon left-self-recursion is tolerable; everything else cyclic
    /// through nullable prefixes is pathological.
    fn assert_no_epsilon_loops(&self, diagnostics: &mut Diagnostics) {
        let mut reaches: Vec<Vec<usize>> = vec![Vec::new(); self.nonterminal_count()];
        for rule in &self.rules {
            let mut prefix: Vec<NonterminalID> = Vec::new();
            for sym in &rule.rhs {
                match sym {
                    SymbolID::N(n) if self.is_nullable(*n) => prefix.push(*n),
                    _ => break,
                }
            }
            if prefix.first() == Some(&rule.lhs) {
                prefix.remove(0);
            }
            if prefix.contains(&rule.lhs) {
                diagnostics.error(
                    Some(rule.line),
                    format!(
                        "rule for {:?} produces epsilon right-recursion",
                        self.nonterminal_name(rule.lhs)
                    ),
                );
            }
            for n in prefix {
                reaches[rule.lhs.into_raw() as usize].push(n.into_raw() as usize);
            }
        }
        for component in strongly_connected_components(&reaches) {
            if component.len() > 1 {
                let names: Vec<_> = component
                    .iter()
                    .map(|&ix| self.nonterminal_names[ix].as_str())
                    .collect();
                diagnostics.error(
                    None,
                    format!("symbols {:?} form a mutually-recursive epsilon loop", names),
                );
            }
        }
    }
}
