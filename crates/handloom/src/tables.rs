//! From automaton to finished parse table.
//!
//! Tabulation lays the automaton out as dense ACTION/GOTO matrices, resolves
//! whatever conflicts survived the precedence filter (deterministically with
//! warnings, or into split lists for a grammar declared non-deterministic),
//! bypasses semantics-free unit rules, folds pure-reduction states into
//! combined shift-reduce instructions, and finally compresses everything by
//! row and column equivalence classes. The error plane is kept apart from
//! the instruction plane so a default reduction can never swallow a true
//! error cell.

use handloom_runtime::definition::{
    Constructor, NonterminalID, Op, ParserTables, RuleID, RuleInfo, StateID, SymbolID, TerminalID,
};

use crate::diagnostics::{Diagnostic, Diagnostics, DefinitionErrors};
use crate::grammar::{Grammar, RuleAction};
use crate::lr::{self, Lookahead, Method};
use crate::types::Map;

/// Build the parse table for a validated grammar.
///
/// A non-deterministic declaration forces the LALR base method: once cells
/// may fork there is nothing for the stronger constructions to buy, and the
/// split lists assume the LALR state set.
pub fn build(
    grammar: &Grammar,
    method: Method,
) -> Result<(ParseTable, Vec<Diagnostic>), DefinitionErrors> {
    let span = tracing::trace_span!("tabulate");
    let _entered = span.enter();
    let mut diagnostics = Diagnostics::default();

    let nondet = grammar.nondet().is_some();
    let method = if nondet { Method::Lalr } else { method };
    let hfa = lr::construct(grammar, method);

    let n_terminals = grammar.terminal_count();
    let n_cols = n_terminals + 1; // the end-of-input column comes last
    let eoi_col = n_terminals;
    let error_col = TerminalID::ERROR.into_raw() as usize;
    let col_of = |t: TerminalID| -> usize {
        if t == TerminalID::EOI {
            eoi_col
        } else {
            t.into_raw() as usize
        }
    };

    // ---- dense matrices with conflicts resolved ----

    let mut splits: Vec<Vec<Op>> = Vec::new();
    let mut split_index: Map<Vec<Op>, u32> = Map::default();
    let mut action: Vec<Vec<Op>> = Vec::with_capacity(hfa.states.len());
    let mut goto_m: Vec<Vec<i32>> = Vec::with_capacity(hfa.states.len());
    let mut nonassoc_states: Vec<bool> = vec![false; hfa.states.len()];

    for (q, state) in hfa.states.iter().enumerate() {
        let mut row = vec![Op::Error; n_cols];
        let mut goto_row = vec![-1i32; grammar.nonterminal_count()];
        let mut shift_cell: Vec<Option<StateID>> = vec![None; n_cols];
        for (sym, &target) in &state.shift {
            match sym {
                SymbolID::T(t) => shift_cell[col_of(*t)] = Some(StateID::from_raw(target as u32)),
                SymbolID::N(n) => goto_row[n.into_raw() as usize] = target as i32,
            }
        }
        let mut reduce_cell: Vec<Vec<RuleID>> = vec![Vec::new(); n_cols];
        for (rule, lookahead) in &state.reduce {
            match lookahead {
                Lookahead::Everything => {
                    for cell in reduce_cell.iter_mut() {
                        cell.push(*rule);
                    }
                }
                Lookahead::Tokens(set) => {
                    for t in set.iter() {
                        reduce_cell[col_of(t)].push(*rule);
                    }
                }
            }
        }

        for col in 0..n_cols {
            let shift = shift_cell[col];
            let reduces = &reduce_cell[col];
            row[col] = match (shift, reduces.len()) {
                (None, 0) => Op::Error,
                (Some(s), 0) => Op::Shift(s),
                (None, 1) => Op::Reduce(reduces[0]),
                _ if nondet => {
                    let mut alternatives = Vec::new();
                    if let Some(s) = shift {
                        alternatives.push(Op::Shift(s));
                    }
                    let mut rules = reduces.clone();
                    rules.sort_by_key(|r| grammar.rule(*r).rhs.len());
                    alternatives.extend(rules.into_iter().map(Op::Reduce));
                    let ix = *split_index.entry(alternatives.clone()).or_insert_with(|| {
                        splits.push(alternatives);
                        (splits.len() - 1) as u32
                    });
                    Op::Split(ix)
                }
                (shift, _) => {
                    // Residual conflict in a deterministic grammar: report,
                    // then take the shift, or the earliest-defined rule.
                    let token = if col == eoi_col {
                        crate::grammar::EOI_NAME.to_owned()
                    } else {
                        grammar
                            .terminal_name(TerminalID::from_raw(col as u16))
                            .to_owned()
                    };
                    let path: Vec<&str> = hfa
                        .path_to(q)
                        .into_iter()
                        .filter_map(|s| hfa.breadcrumbs[s].map(|sym| grammar.symbol_name(sym)))
                        .collect();
                    let kind = if shift.is_some() {
                        "shift/reduce"
                    } else {
                        "reduce/reduce"
                    };
                    let mut detail = String::new();
                    for &r in reduces {
                        detail.push_str(&format!("\n    could reduce {}", grammar.display_rule(r)));
                    }
                    diagnostics.warning(
                        None,
                        format!(
                            "{kind} conflict on {token:?} after \"{}\"{detail}",
                            path.join(" ")
                        ),
                    );
                    match shift {
                        Some(s) => Op::Shift(s),
                        None => Op::Reduce(*reduces.iter().min().unwrap_or(&reduces[0])),
                    }
                }
            };
        }
        for &t in &state.nonassoc {
            row[col_of(t)] = Op::Error;
            nonassoc_states[q] = true;
        }
        action.push(row);
        goto_m.push(goto_row);
    }

    // The notional end-of-input shift in an accepting state is the accept.
    for &q in &hfa.accept {
        action[q][eoi_col] = Op::Accept;
    }

    if !nondet {
        eliminate_unit_rules(grammar, &mut action, &mut goto_m);
        combine_shift_reduce(grammar, &mut action, &goto_m);
    }

    // ---- recovery bookkeeping ----

    let mut no_default: Vec<bool> = vec![false; action.len()];
    for row in action.iter() {
        if let Op::Shift(target) = row[error_col] {
            no_default[target.index()] = true;
        }
    }
    for (q, row) in action.iter().enumerate() {
        if !matches!(row[error_col], Op::Error) {
            no_default[q] = true;
        }
    }

    // ---- compression ----

    let mut default_reduce: Vec<Option<RuleID>> = Vec::with_capacity(action.len());
    for (q, row) in action.iter().enumerate() {
        if no_default[q] {
            default_reduce.push(None);
            continue;
        }
        let mut counts: Map<RuleID, usize> = Map::default();
        for op in row {
            if let Op::Reduce(r) = op {
                *counts.entry(*r).or_default() += 1;
            }
        }
        default_reduce.push(
            counts
                .iter()
                .max_by_key(|(_, &n)| n)
                .filter(|(_, &n)| n > 1)
                .map(|(&r, _)| r),
        );
    }

    let mut eager: Vec<Option<Op>> = Vec::with_capacity(action.len());
    for (q, row) in action.iter().enumerate() {
        let mut distinct: Vec<Op> = Vec::new();
        for op in row {
            if !matches!(op, Op::Error) && !distinct.contains(op) {
                distinct.push(*op);
            }
        }
        let sole = match distinct[..] {
            [op @ Op::Reduce(_)] => Some(op),
            _ => None,
        };
        eager.push(if nonassoc_states[q] { None } else { sole });
    }

    // The error plane, interned separately from the instruction plane.
    let mut error_rows: Vec<bit_set::BitSet> = Vec::new();
    let mut error_index: Map<Vec<u32>, u32> = Map::default();
    let mut error_row_of: Vec<u32> = Vec::with_capacity(action.len());
    for row in &action {
        let bits: Vec<u32> = row
            .iter()
            .enumerate()
            .filter(|(_, op)| matches!(op, Op::Error))
            .map(|(c, _)| c as u32)
            .collect();
        let ix = *error_index.entry(bits.clone()).or_insert_with(|| {
            let mut set = bit_set::BitSet::with_capacity(n_cols);
            for c in &bits {
                set.insert(*c as usize);
            }
            error_rows.push(set);
            (error_rows.len() - 1) as u32
        });
        error_row_of.push(ix);
    }

    // Instruction rows: a cell equal to the state's default reduction needs
    // no explicit storage, which makes many rows collapse together.
    let blank_rows: Vec<Vec<Op>> = action
        .iter()
        .enumerate()
        .map(|(q, row)| {
            row.iter()
                .map(|op| match (op, default_reduce[q]) {
                    (Op::Reduce(r), Some(d)) if *r == d => Op::Error,
                    (op, _) => *op,
                })
                .collect()
        })
        .collect();
    let (action_col_of, narrowed) = column_classes(&blank_rows);
    let (action_row_of, action_rows) = row_classes(&narrowed);

    let goto_as_ops: Vec<Vec<i32>> = goto_m;
    let (goto_col_of, goto_narrowed) = column_classes(&goto_as_ops);
    let (goto_row_of, goto_rows) = row_classes(&goto_narrowed);

    // ---- rule records and names ----

    let mut constructors: Vec<String> = Vec::new();
    let mut constructor_index: Map<String, u16> = Map::default();
    let rules: Vec<RuleInfo> = grammar
        .rules()
        .iter()
        .map(|rule| {
            let constructor = match &rule.action {
                RuleAction::Pick(offset) => Constructor::Pick(*offset),
                RuleAction::Bundle => Constructor::Bundle,
                RuleAction::Message(name) => {
                    let ix = *constructor_index.entry(name.clone()).or_insert_with(|| {
                        constructors.push(name.clone());
                        (constructors.len() - 1) as u16
                    });
                    Constructor::Message(ix)
                }
            };
            RuleInfo {
                lhs: rule.lhs,
                rhs_len: rule.rhs.len() as u16,
                constructor,
                captures: rule.captures.clone(),
                line: rule.line,
            }
        })
        .collect();

    let initial: Map<String, StateID> = grammar
        .start()
        .iter()
        .zip(&hfa.initial)
        .map(|(&s, &q)| {
            (
                grammar.nonterminal_name(s).to_owned(),
                StateID::from_raw(q as u32),
            )
        })
        .collect();

    let breadcrumbs: Vec<Option<String>> = hfa
        .breadcrumbs
        .iter()
        .map(|b| b.map(|sym| grammar.symbol_name(sym).to_owned()))
        .collect();

    let ambiguous: Vec<bool> = grammar
        .nonterminals()
        .map(|n| grammar.ambiguous_allowed(n))
        .collect();

    let table = ParseTable {
        terminals: grammar
            .terminals()
            .map(|t| grammar.terminal_name(t).to_owned())
            .collect(),
        nonterminals: grammar
            .nonterminals()
            .map(|n| grammar.nonterminal_name(n).to_owned())
            .collect(),
        initial,
        n_states: action.len(),
        action_rows,
        action_row_of,
        action_col_of,
        error_rows,
        error_row_of,
        default_reduce,
        eager,
        goto_rows,
        goto_row_of,
        goto_col_of,
        rules,
        constructors,
        splits,
        breadcrumbs,
        ambiguous,
    };
    tracing::debug!(
        states = table.n_states,
        action_rows = table.action_rows.len(),
        goto_rows = table.goto_rows.len(),
        splits = table.splits.len(),
        "parse table ready"
    );
    diagnostics.into_result(table)
}

/// Intern identical rows; returns (row index per state, exemplars).
fn row_classes<T: Clone + Eq + std::hash::Hash>(matrix: &[Vec<T>]) -> (Vec<u32>, Vec<Vec<T>>) {
    let mut catalog: Map<Vec<T>, u32> = Map::default();
    let mut exemplars: Vec<Vec<T>> = Vec::new();
    let index = matrix
        .iter()
        .map(|row| {
            *catalog.entry(row.clone()).or_insert_with(|| {
                exemplars.push(row.clone());
                (exemplars.len() - 1) as u32
            })
        })
        .collect();
    (index, exemplars)
}

/// Intern identical columns; returns (class per column, narrowed matrix).
fn column_classes<T: Clone + Eq + std::hash::Hash>(matrix: &[Vec<T>]) -> (Vec<u16>, Vec<Vec<T>>) {
    let width = matrix.first().map_or(0, Vec::len);
    let mut catalog: Map<Vec<T>, u16> = Map::default();
    let mut keep: Vec<usize> = Vec::new();
    let mut class_of: Vec<u16> = Vec::with_capacity(width);
    for col in 0..width {
        let column: Vec<T> = matrix.iter().map(|row| row[col].clone()).collect();
        let class = *catalog.entry(column).or_insert_with(|| {
            keep.push(col);
            (keep.len() - 1) as u16
        });
        class_of.push(class);
    }
    let narrowed = matrix
        .iter()
        .map(|row| keep.iter().map(|&c| row[c].clone()).collect())
        .collect();
    (class_of, narrowed)
}

/// Bypass semantics-free unit rules: wherever the goto on N lands in a
/// state adequate to reduce `A -> N`, and the bypass target would detect
/// exactly the same errors, send the goto straight to where A would have
/// gone. Redirects iterate to fixpoint, which walks chains of renamings in
/// effectively reverse topological order of the goto graph.
fn eliminate_unit_rules(grammar: &Grammar, action: &mut [Vec<Op>], goto_m: &mut [Vec<i32>]) {
    // Which states do nothing but reduce one particular renaming rule?
    let sole_rename: Vec<Option<(NonterminalID, NonterminalID)>> = action
        .iter()
        .enumerate()
        .map(|(q, row)| {
            let mut sole: Option<RuleID> = None;
            for op in row {
                match op {
                    Op::Error => {}
                    Op::Reduce(r) if sole.map_or(true, |s| s == *r) => sole = Some(*r),
                    _ => return None,
                }
            }
            if goto_m[q].iter().any(|&g| g >= 0) {
                return None;
            }
            let rule = grammar.rule(sole?);
            if !rule.is_rename() {
                return None;
            }
            match rule.rhs[..] {
                [SymbolID::N(n)] => Some((rule.lhs, n)),
                _ => None,
            }
        })
        .collect();
    let error_profile = |row: &[Op]| -> Vec<bool> {
        row.iter().map(|op| matches!(op, Op::Error)).collect()
    };
    let profiles: Vec<Vec<bool>> = action.iter().map(|row| error_profile(row)).collect();

    let mut redirects = 0usize;
    let mut passes = 0usize;
    loop {
        let mut changed = false;
        for b in 0..goto_m.len() {
            for n_ix in 0..goto_m[b].len() {
                let q = goto_m[b][n_ix];
                if q < 0 {
                    continue;
                }
                if let Some((a, n)) = sole_rename[q as usize] {
                    if n.into_raw() as usize != n_ix {
                        continue;
                    }
                    let r = goto_m[b][a.into_raw() as usize];
                    if r >= 0 && r != q && profiles[q as usize] == profiles[r as usize] {
                        goto_m[b][n_ix] = r;
                        redirects += 1;
                        changed = true;
                    }
                }
            }
        }
        passes += 1;
        if !changed || passes > goto_m.len() {
            break;
        }
    }
    tracing::trace!(redirects, passes, "unit-rule elimination");
}

/// Where a shift lands in a state whose whole behavior is one reduction of
/// a nonempty rule on any lookahead at all (so its error function is
/// empty, and every post-goto state trivially matches it), fold the pair
/// into a combined instruction.
fn combine_shift_reduce(grammar: &Grammar, action: &mut [Vec<Op>], goto_m: &[Vec<i32>]) {
    let foldable: Vec<Option<RuleID>> = action
        .iter()
        .enumerate()
        .map(|(q, row)| {
            let mut sole: Option<RuleID> = None;
            for op in row {
                match op {
                    Op::Reduce(r) if sole.map_or(true, |s| s == *r) => sole = Some(*r),
                    _ => return None,
                }
            }
            if goto_m[q].iter().any(|&g| g >= 0) {
                return None;
            }
            let rule = sole?;
            (!grammar.rule(rule).rhs.is_empty()).then_some(rule)
        })
        .collect();

    let mut folded = 0usize;
    for row in action.iter_mut() {
        for op in row.iter_mut() {
            if let Op::Shift(target) = op {
                if let Some(rule) = foldable[target.index()] {
                    *op = Op::ShiftReduce(rule);
                    folded += 1;
                }
            }
        }
    }
    tracing::trace!(folded, "combined shift-reduce instructions");
}

/// The finished parse table: compressed matrices plus rule records, name
/// tables, split lists, and breadcrumbs. Immutable and freely shareable.
#[derive(Debug, Clone)]
pub struct ParseTable {
    terminals: Vec<String>,
    nonterminals: Vec<String>,
    initial: Map<String, StateID>,
    n_states: usize,
    action_rows: Vec<Vec<Op>>,
    action_row_of: Vec<u32>,
    action_col_of: Vec<u16>,
    error_rows: Vec<bit_set::BitSet>,
    error_row_of: Vec<u32>,
    default_reduce: Vec<Option<RuleID>>,
    eager: Vec<Option<Op>>,
    goto_rows: Vec<Vec<i32>>,
    goto_row_of: Vec<u32>,
    goto_col_of: Vec<u16>,
    rules: Vec<RuleInfo>,
    constructors: Vec<String>,
    splits: Vec<Vec<Op>>,
    breadcrumbs: Vec<Option<String>>,
    ambiguous: Vec<bool>,
}

impl ParseTable {
    fn col(&self, t: TerminalID) -> usize {
        if t == TerminalID::EOI {
            self.terminals.len()
        } else {
            t.into_raw() as usize
        }
    }

    /// Look up a terminal by its printable name, for driver convenience.
    pub fn terminal(&self, name: &str) -> Option<TerminalID> {
        self.terminals
            .iter()
            .position(|n| n == name)
            .map(|ix| TerminalID::from_raw(ix as u16))
    }
}

impl ParserTables for ParseTable {
    fn initial(&self, start: Option<&str>) -> Option<StateID> {
        match start {
            Some(name) => self.initial.get(name).copied(),
            None => self.initial.values().next().copied(),
        }
    }

    fn action(&self, state: StateID, terminal: TerminalID) -> Op {
        let col = self.col(terminal);
        let q = state.index();
        // The error plane outranks any default reduction, which is what
        // keeps error detection immediate.
        if self.error_rows[self.error_row_of[q] as usize].contains(col) {
            return Op::Error;
        }
        let class = self.action_col_of[col] as usize;
        let op = self.action_rows[self.action_row_of[q] as usize][class];
        match op {
            Op::Error => match self.default_reduce[q] {
                Some(r) => Op::Reduce(r),
                None => Op::Error,
            },
            op => op,
        }
    }

    fn eager_step(&self, state: StateID) -> Option<Op> {
        self.eager[state.index()]
    }

    fn goto(&self, state: StateID, nonterminal: NonterminalID) -> StateID {
        let class = self.goto_col_of[nonterminal.into_raw() as usize] as usize;
        let target = self.goto_rows[self.goto_row_of[state.index()] as usize][class];
        debug_assert!(target >= 0, "goto from an impossible configuration");
        StateID::from_raw(target as u32)
    }

    fn rule(&self, rule: RuleID) -> &RuleInfo {
        &self.rules[rule.index()]
    }

    fn split(&self, ix: u32) -> &[Op] {
        &self.splits[ix as usize]
    }

    fn constructor_name(&self, ix: u16) -> &str {
        &self.constructors[ix as usize]
    }

    fn terminal_name(&self, terminal: TerminalID) -> &str {
        if terminal == TerminalID::EOI {
            crate::grammar::EOI_NAME
        } else {
            &self.terminals[terminal.into_raw() as usize]
        }
    }

    fn nonterminal_name(&self, nonterminal: NonterminalID) -> &str {
        &self.nonterminals[nonterminal.into_raw() as usize]
    }

    fn terminals(&self) -> Vec<TerminalID> {
        (0..self.terminals.len() as u16)
            .map(TerminalID::from_raw)
            .collect()
    }

    fn constructors(&self) -> Vec<&str> {
        self.constructors.iter().map(String::as_str).collect()
    }

    fn breadcrumb(&self, state: StateID) -> Option<&str> {
        self.breadcrumbs[state.index()].as_deref()
    }

    fn ambiguous_allowed(&self, nonterminal: NonterminalID) -> bool {
        self.ambiguous[nonterminal.into_raw() as usize]
    }

    fn state_count(&self) -> usize {
        self.n_states
    }

    fn rule_count(&self) -> usize {
        self.rules.len()
    }
}
