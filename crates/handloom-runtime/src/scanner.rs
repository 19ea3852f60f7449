//! The table-driven scanning engine.
//!
//! Recognizes one lexeme at a time by running the DFA to a jam state and
//! taking the last recorded accept, which yields leftmost-longest semantics.
//! Rule ranks were already folded into the tables, so the engine never sees
//! them. Backtracking for trailing context, beginning-of-line anchors, and
//! scan-condition switching all live here.

use crate::definition::{ScanRuleID, ScanTables, Span, TerminalID, Trail};

/// Supplies the behavior behind each named scan action.
pub trait ScanActions {
    type Value;

    /// Whether this driver knows the named action. Checked for every rule
    /// when the scanner is constructed, so typos surface before any input
    /// is read.
    fn recognizes(&self, action: &str) -> bool;

    /// Perform the action for a just-matched lexeme. The action may emit
    /// zero or more tokens and may adjust the scan state through `yy`.
    fn invoke(&mut self, yy: &mut Lexeme<'_, '_, Self::Value>, action: &str);

    /// The scanner is stuck: no rule accepts and the cursor cannot move by
    /// rule. One code point will be skipped after this returns.
    fn blocked(&mut self, yy: &mut Lexeme<'_, '_, Self::Value>) {
        tracing::warn!(
            position = yy.position(),
            "scanner blocked; skipping one code point"
        );
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("driver does not recognize scan action {0:?} (rule at line {1})")]
    UnknownAction(String, u32),

    #[error("unknown scan condition {0:?}")]
    UnknownCondition(String),
}

/// A position in the text, possibly one notional step past the end where
/// the end-of-input sentinel lives.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Mark {
    byte: usize,
    past_end: bool,
}

/// The mutable scan state exposed to driver actions.
pub struct Lexeme<'a, 't, V> {
    text: &'t str,
    start: usize,
    mark: &'a mut Mark,
    condition: &'a mut ConditionState,
    buffer: &'a mut Vec<(TerminalID, V, Span)>,
    conditions: &'a dyn Fn(&str) -> Option<(u32, u32)>,
}

pub(crate) struct ConditionState {
    name: String,
    entry: (u32, u32),
    stack: Vec<(String, (u32, u32))>,
}

impl<V> Lexeme<'_, '_, V> {
    /// The text of the current match.
    pub fn matched_text(&self) -> &str {
        &self.text[self.start..self.mark.byte]
    }

    /// Byte offset of the start of the current match.
    pub fn position(&self) -> usize {
        self.start
    }

    /// Span of the current match.
    pub fn span(&self) -> Span {
        Span::new(self.start, self.mark.byte)
    }

    /// Switch to another scan condition.
    pub fn enter(&mut self, condition: &str) {
        match (self.conditions)(condition) {
            Some(entry) => {
                self.condition.name = condition.to_owned();
                self.condition.entry = entry;
            }
            None => tracing::error!(condition, "no such scan condition; staying put"),
        }
    }

    /// Switch conditions, remembering the current one for [`Lexeme::pop`].
    pub fn push(&mut self, condition: &str) {
        let old = (self.condition.name.clone(), self.condition.entry);
        self.enter(condition);
        self.condition.stack.push(old);
    }

    /// Return to the condition in effect before the matching `push`.
    pub fn pop(&mut self) {
        if let Some((name, entry)) = self.condition.stack.pop() {
            self.condition.name = name;
            self.condition.entry = entry;
        } else {
            tracing::error!("scan condition stack underflow");
        }
    }

    pub fn current_condition(&self) -> &str {
        &self.condition.name
    }

    /// Keep only the first `keep` characters of the match; the rest will be
    /// scanned again.
    pub fn less(&mut self, keep: usize) {
        let mut byte = self.start;
        let mut it = self.text[self.start..self.mark.byte].chars();
        for _ in 0..keep {
            match it.next() {
                Some(c) => byte += c.len_utf8(),
                None => break,
            }
        }
        *self.mark = Mark {
            byte,
            past_end: false,
        };
    }

    /// Emit a token. Emission order is source order.
    pub fn token(&mut self, kind: TerminalID, value: V) {
        let span = self.span();
        self.buffer.push((kind, value, span));
    }
}

/// The scanner proper: couples tables, text, and a driver, and iterates
/// tokens.
pub struct Scanner<'t, T, A: ScanActions> {
    tables: T,
    driver: A,
    text: &'t str,
    condition: ConditionState,
    start: usize,
    mark: Mark,
    buffer: Vec<(TerminalID, A::Value, Span)>,
    pending: usize,
    ran_eoi_rule: bool,
}

impl<'t, T, A> Scanner<'t, T, A>
where
    T: ScanTables,
    A: ScanActions,
{
    /// Build a scanner starting in `condition`. Every rule's action name is
    /// resolved against the driver here; unknown names fail fast.
    pub fn new(tables: T, text: &'t str, driver: A, condition: &str) -> Result<Self, ScanError> {
        for ix in 0..tables.rule_count() {
            let rule = ScanRuleID::from_raw(ix as u16);
            let name = tables.action_name(rule);
            if !driver.recognizes(name) {
                return Err(ScanError::UnknownAction(
                    name.to_owned(),
                    tables.rule_line(rule),
                ));
            }
        }
        let entry = tables
            .condition(condition)
            .ok_or_else(|| ScanError::UnknownCondition(condition.to_owned()))?;
        Ok(Self {
            tables,
            driver,
            text,
            condition: ConditionState {
                name: condition.to_owned(),
                entry,
                stack: Vec::new(),
            },
            start: 0,
            mark: Mark {
                byte: 0,
                past_end: false,
            },
            buffer: Vec::new(),
            pending: 0,
            ran_eoi_rule: false,
        })
    }

    /// The state to start matching from, given the condition and whether the
    /// cursor sits at the beginning of a line.
    fn entry_state(&self) -> u32 {
        let at_bol = self.start == 0
            || matches!(self.text.as_bytes().get(self.start - 1), Some(b'\n' | b'\r'));
        let (mid, bol) = self.condition.entry;
        if at_bol {
            bol
        } else {
            mid
        }
    }

    /// Run the DFA from `q0` as far as it will go, remembering the last
    /// accept seen. Leaves the mark at the chosen match end (trail already
    /// applied) and returns the winning rule, if any.
    fn scan_one(&mut self, q0: u32) -> Option<ScanRuleID> {
        let mut q = q0;
        let mut cursor = self.start;
        let mut past_end = false;
        let mut best: Option<(ScanRuleID, Trail)> = None;
        self.mark = Mark {
            byte: self.start,
            past_end: false,
        };
        loop {
            let cp = if past_end {
                break;
            } else {
                self.text[cursor..].chars().next()
            };
            let class = self.tables.classify(cp);
            q = match self.tables.next(q, class) {
                Some(next) => next,
                None => break,
            };
            match cp {
                Some(c) => cursor += c.len_utf8(),
                None => past_end = true,
            }
            if let Some(label) = self.tables.accept(q) {
                self.mark = Mark {
                    byte: cursor,
                    past_end,
                };
                best = Some(label);
            }
        }
        best.map(|(rule, trail)| {
            self.apply_trail(trail);
            rule
        })
    }

    fn apply_trail(&mut self, trail: Trail) {
        match trail {
            Trail::None => {}
            Trail::Keep(n) => {
                let matched = &self.text[self.start..self.mark.byte];
                let mut byte = self.start;
                let mut it = matched.chars();
                for _ in 0..n {
                    match it.next() {
                        Some(c) => byte += c.len_utf8(),
                        None => break,
                    }
                }
                self.mark = Mark {
                    byte,
                    past_end: false,
                };
            }
            Trail::Rewind(n) => {
                let mut n = n;
                if self.mark.past_end && n > 0 {
                    // The sentinel occupies one notional character.
                    self.mark.past_end = false;
                    n -= 1;
                }
                let mut byte = self.mark.byte;
                for _ in 0..n {
                    let before = &self.text[self.start..byte];
                    match before.chars().next_back() {
                        Some(c) => byte -= c.len_utf8(),
                        None => break,
                    }
                }
                self.mark = Mark {
                    byte,
                    past_end: false,
                };
            }
        }
    }

    fn invoke(&mut self, rule: ScanRuleID) {
        let action = self.tables.action_name(rule).to_owned();
        let tables = &self.tables;
        let mut yy = Lexeme {
            text: self.text,
            start: self.start,
            mark: &mut self.mark,
            condition: &mut self.condition,
            buffer: &mut self.buffer,
            conditions: &|name| tables.condition(name),
        };
        self.driver.invoke(&mut yy, &action);
    }

    fn blocked(&mut self) {
        let tables = &self.tables;
        let mut yy = Lexeme {
            text: self.text,
            start: self.start,
            mark: &mut self.mark,
            condition: &mut self.condition,
            buffer: &mut self.buffer,
            conditions: &|name| tables.condition(name),
        };
        self.driver.blocked(&mut yy);
    }

    /// Advance until at least one token is buffered or input is exhausted.
    fn refill(&mut self) {
        while self.pending >= self.buffer.len() && self.start < self.text.len() {
            let q0 = self.entry_state();
            match self.scan_one(q0) {
                Some(rule) => self.invoke(rule),
                None => {
                    // Skip one code point so progress is guaranteed.
                    let width = self.text[self.start..]
                        .chars()
                        .next()
                        .map_or(1, char::len_utf8);
                    self.mark = Mark {
                        byte: self.start + width,
                        past_end: false,
                    };
                    self.blocked();
                }
            }
            self.start = self.mark.byte;
        }
        if self.pending >= self.buffer.len() && !self.ran_eoi_rule {
            self.ran_eoi_rule = true;
            // One last chance for a rule keyed to the end-of-input sentinel.
            let q0 = self.entry_state();
            let class = self.tables.classify(None);
            if let Some(q) = self.tables.next(q0, class) {
                if let Some((rule, _)) = self.tables.accept(q) {
                    self.mark = Mark {
                        byte: self.start,
                        past_end: false,
                    };
                    self.invoke(rule);
                }
            }
        }
    }
}

impl<'t, T, A> Iterator for Scanner<'t, T, A>
where
    T: ScanTables,
    A: ScanActions,
    A::Value: Clone,
{
    type Item = (TerminalID, A::Value, Span);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pending >= self.buffer.len() {
            self.refill();
        }
        let item = self.buffer.get(self.pending).cloned();
        if item.is_some() {
            self.pending += 1;
            if self.pending == self.buffer.len() {
                self.buffer.clear();
                self.pending = 0;
            }
        }
        item
    }
}
