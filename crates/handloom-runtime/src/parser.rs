//! The deterministic shift-reduce engine.
//!
//! Push-mode: the caller feeds one token at a time and the machine performs
//! every reduction the token forces, dispatching semantic messages to the
//! driver as it goes. Error handling follows the recoverable-state scheme:
//! unwind to a state that shifts `$error$`, validate candidate
//! resynchronization points with a side-effect-free trial parse, and commit
//! only once three consecutive tokens (or end of input) check out.

use std::collections::VecDeque;

use crate::definition::{Constructor, Op, ParserTables, RuleID, Span, StateID, TerminalID};

/// Synthesizes semantic values and hears about parse trouble.
pub trait Combine {
    type Value: Clone;

    /// Dispatch a named message with the captured arguments.
    fn message(&mut self, name: &str, args: Vec<Self::Value>) -> Self::Value;

    /// Aggregate captures of a rule with no named message.
    fn bundle(&mut self, args: Vec<Self::Value>) -> Self::Value;

    /// Whether this driver knows the named message. Checked for every
    /// constructor when a parser is built.
    fn recognizes(&self, name: &str) -> bool {
        let _ = name;
        true
    }

    /// The stand-in value shifted for the `$error$` token during recovery.
    fn recovery_value(&mut self) -> Self::Value;

    /// Reconcile parallel derivations (generalized parsing only).
    fn ambiguity(&mut self, first: Self::Value, rest: Vec<Self::Value>) -> Self::Value {
        let _ = rest;
        first
    }

    fn unexpected_token(&mut self, terminal: TerminalID, span: Span, state: StateID) {
        let _ = (terminal, span, state);
    }

    fn unexpected_eof(&mut self) {}

    fn did_recover(&mut self) {}

    fn cannot_recover(&mut self) {}
}

impl<D: Combine + ?Sized> Combine for &mut D {
    type Value = D::Value;

    fn message(&mut self, name: &str, args: Vec<Self::Value>) -> Self::Value {
        (**self).message(name, args)
    }
    fn bundle(&mut self, args: Vec<Self::Value>) -> Self::Value {
        (**self).bundle(args)
    }
    fn recognizes(&self, name: &str) -> bool {
        (**self).recognizes(name)
    }
    fn recovery_value(&mut self) -> Self::Value {
        (**self).recovery_value()
    }
    fn ambiguity(&mut self, first: Self::Value, rest: Vec<Self::Value>) -> Self::Value {
        (**self).ambiguity(first, rest)
    }
    fn unexpected_token(&mut self, terminal: TerminalID, span: Span, state: StateID) {
        (**self).unexpected_token(terminal, span, state)
    }
    fn unexpected_eof(&mut self) {
        (**self).unexpected_eof()
    }
    fn did_recover(&mut self) {
        (**self).did_recover()
    }
    fn cannot_recover(&mut self) {
        (**self).cannot_recover()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("syntax error at {}..{}: unexpected {lookahead}; expected one of {expected:?}", span.start, span.end)]
    Syntax {
        lookahead: String,
        span: Span,
        expected: Vec<String>,
    },

    #[error("unexpected end of input; expected one of {expected:?}")]
    UnexpectedEof { expected: Vec<String> },

    #[error("driver does not recognize constructor {0:?}")]
    UnknownConstructor(String),

    #[error("no start symbol named {0:?}")]
    UnknownStart(String),

    #[error("table is non-deterministic; use a generalized engine")]
    Nondeterministic,

    #[error("parser already accepted")]
    AlreadyAccepted,
}

/// How many consecutive tokens a trial parse must consume before a recovery
/// hypothesis is committed.
const COMMIT_RUN: usize = 3;

/// Token window after a recovery during which further error notifications
/// are suppressed.
const QUIESCENCE: u32 = 3;

struct Recovery<V> {
    /// `(state after hypothetically shifting $error$, pop depth)`, in
    /// discovery order from the top of the stack.
    avenues: Vec<(StateID, usize)>,
    buffer: VecDeque<(TerminalID, V, Span)>,
}

pub struct Parser<T, D: Combine> {
    tables: T,
    driver: D,
    /// Entries strictly below the current state; each records the state that
    /// was current when its symbol shifted.
    stack: Vec<(StateID, D::Value, Span)>,
    state: StateID,
    recovery: Option<Recovery<D::Value>>,
    quiescence: u32,
    accepted: bool,
}

/// Where `find_shift` came to rest.
enum Found {
    Shift(StateID),
    ShiftReduce(RuleID),
    Accept,
    Error,
}

impl<T, D> Parser<T, D>
where
    T: ParserTables,
    D: Combine,
{
    /// Build a parser for the given start symbol (`None` = first declared).
    /// Every constructor name is resolved against the driver up front.
    pub fn new(tables: T, driver: D, start: Option<&str>) -> Result<Self, ParseError> {
        for name in tables.constructors() {
            if !driver.recognizes(name) {
                return Err(ParseError::UnknownConstructor(name.to_owned()));
            }
        }
        let state = tables
            .initial(start)
            .ok_or_else(|| ParseError::UnknownStart(start.unwrap_or("<default>").to_owned()))?;
        Ok(Self {
            tables,
            driver,
            stack: Vec::new(),
            state,
            recovery: None,
            quiescence: 0,
            accepted: false,
        })
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Offer the next token.
    pub fn feed(&mut self, terminal: TerminalID, value: D::Value, span: Span) -> Result<(), ParseError> {
        if self.accepted {
            return Err(ParseError::AlreadyAccepted);
        }
        if let Some(rec) = self.recovery.as_mut() {
            rec.buffer.push_back((terminal, value, span));
            return self.pump_recovery();
        }
        self.step(terminal, value, span)
    }

    /// Signal end of input and retrieve the final semantic value.
    pub fn finish(mut self) -> Result<D::Value, ParseError> {
        if self.accepted {
            return Err(ParseError::AlreadyAccepted);
        }
        if self.recovery.is_none() {
            match self.find_shift(TerminalID::EOI)? {
                Found::Accept => return self.succeed(),
                Found::Error => {
                    if self.quiescence == 0 {
                        self.driver.unexpected_eof();
                    }
                    let avenues = self.paths_to_recovery();
                    if avenues.is_empty() {
                        self.driver.cannot_recover();
                        return Err(ParseError::UnexpectedEof {
                            expected: self.expected_tokens(),
                        });
                    }
                    self.recovery = Some(Recovery {
                        avenues,
                        buffer: VecDeque::new(),
                    });
                }
                // The tables encode the end-of-input shift as Accept.
                Found::Shift(_) | Found::ShiftReduce(_) => unreachable!("shift on end of input"),
            }
        }
        self.pump_eof()?;
        self.succeed()
    }

    fn succeed(&mut self) -> Result<D::Value, ParseError> {
        self.accepted = true;
        debug_assert_eq!(self.stack.len(), 1, "accept with a deep stack");
        match self.stack.pop() {
            Some((_, value, _)) => Ok(value),
            None => Err(ParseError::AlreadyAccepted),
        }
    }

    // ---- the easy part they explain in all the books ----

    fn step(&mut self, terminal: TerminalID, value: D::Value, span: Span) -> Result<(), ParseError> {
        match self.find_shift(terminal)? {
            Found::Shift(next) => {
                self.shift(next, value, span);
                self.note_progress();
                self.eager_reduce();
                Ok(())
            }
            Found::ShiftReduce(rule) => {
                self.combined_shift_reduce(rule, value, span);
                self.note_progress();
                self.eager_reduce();
                Ok(())
            }
            Found::Accept => Err(ParseError::AlreadyAccepted),
            Found::Error => self.begin_recovery(terminal, value, span),
        }
    }

    /// Reduce until the ACTION table says what to do with this lookahead.
    fn find_shift(&mut self, terminal: TerminalID) -> Result<Found, ParseError> {
        loop {
            match self.tables.action(self.state, terminal) {
                Op::Reduce(rule) => self.reduce_by_rule(rule),
                Op::Shift(next) => return Ok(Found::Shift(next)),
                Op::ShiftReduce(rule) => return Ok(Found::ShiftReduce(rule)),
                Op::Accept => return Ok(Found::Accept),
                Op::Error => return Ok(Found::Error),
                Op::Split(_) => return Err(ParseError::Nondeterministic),
            }
        }
    }

    fn shift(&mut self, next: StateID, value: D::Value, span: Span) {
        self.stack.push((self.state, value, span));
        self.state = next;
    }

    /// A combined instruction shifts the token and reduces in one step; the
    /// intermediate state was folded away and is never observable.
    fn combined_shift_reduce(&mut self, rule: RuleID, value: D::Value, span: Span) {
        self.shift(StateID::from_raw(u32::MAX), value, span);
        self.reduce_by_rule(rule);
    }

    fn reduce_by_rule(&mut self, rule: RuleID) {
        let info = self.tables.rule(rule).clone();
        let len = self.stack.len();
        let depth = |offset: i16| (len as isize + offset as isize) as usize;
        let value = match info.constructor {
            Constructor::Pick(offset) => self.stack[depth(offset)].1.clone(),
            Constructor::Message(ix) => {
                let args: Vec<_> = info
                    .captures
                    .iter()
                    .map(|&offset| self.stack[depth(offset)].1.clone())
                    .collect();
                let name = self.tables.constructor_name(ix).to_owned();
                tracing::trace!(rule = ?rule, message = %name, "reduce");
                self.driver.message(&name, args)
            }
            Constructor::Bundle => {
                let args: Vec<_> = info
                    .captures
                    .iter()
                    .map(|&offset| self.stack[depth(offset)].1.clone())
                    .collect();
                self.driver.bundle(args)
            }
        };
        let span = self.stack[len - info.rhs_len as usize..]
            .iter()
            .fold(Span::default(), |acc, (_, _, s)| acc.cover(*s));
        self.pop_phrase(info.rhs_len as usize);
        let next = self.tables.goto(self.state, info.lhs);
        self.shift(next, value, span);
    }

    fn pop_phrase(&mut self, length: usize) {
        if length > 0 {
            let keep = self.stack.len() - length;
            self.state = self.stack[keep].0;
            self.stack.truncate(keep);
        }
    }

    /// Fire reductions that need no lookahead, so semantic actions are not
    /// delayed by one token.
    fn eager_reduce(&mut self) {
        while let Some(Op::Reduce(rule)) = self.tables.eager_step(self.state) {
            self.reduce_by_rule(rule);
        }
    }

    fn note_progress(&mut self) {
        self.quiescence = self.quiescence.saturating_sub(1);
    }

    // ---- error recovery ----

    fn begin_recovery(
        &mut self,
        terminal: TerminalID,
        value: D::Value,
        span: Span,
    ) -> Result<(), ParseError> {
        if self.quiescence == 0 {
            self.driver.unexpected_token(terminal, span, self.state);
        }
        let avenues = self.paths_to_recovery();
        if avenues.is_empty() {
            self.driver.cannot_recover();
            return Err(ParseError::Syntax {
                lookahead: self.tables.terminal_name(terminal).to_owned(),
                span,
                expected: self.expected_tokens(),
            });
        }
        let mut buffer = VecDeque::new();
        buffer.push_back((terminal, value, span));
        self.recovery = Some(Recovery { avenues, buffer });
        self.pump_recovery()
    }

    /// Every distinct state reachable by popping some depth and shifting
    /// `$error$`, shallowest pop first.
    fn paths_to_recovery(&self) -> Vec<(StateID, usize)> {
        let mut avenues: Vec<(StateID, usize)> = Vec::new();
        for depth in 0..=self.stack.len() {
            let q = self.state_at(depth);
            if matches!(self.tables.action(q, TerminalID::ERROR), Op::Error) {
                continue;
            }
            let mut trial = Hypothetical::new(&self.tables, &self.stack, self.state, depth);
            if trial.consume(TerminalID::ERROR).is_err() {
                continue;
            }
            let landed = trial.tos();
            if !avenues.iter().any(|&(s, _)| s == landed) {
                avenues.push((landed, depth));
            }
        }
        avenues
    }

    fn state_at(&self, depth: usize) -> StateID {
        if depth == 0 {
            self.state
        } else {
            self.stack[self.stack.len() - depth].0
        }
    }

    /// Attempt to commit a recovery using the buffered lookahead. Called
    /// whenever the buffer grows; waits until a full proposal is available.
    fn pump_recovery(&mut self) -> Result<(), ParseError> {
        loop {
            let Some(rec) = self.recovery.as_ref() else {
                return Ok(());
            };
            if rec.buffer.len() < COMMIT_RUN {
                return Ok(());
            }
            let window: Vec<_> = rec.buffer.iter().take(COMMIT_RUN).cloned().collect();
            match self.try_window(&window, false) {
                Some(depth) => return self.commit_recovery(depth),
                None => {
                    // Discard one terminal and hope for resynchronization
                    // further along.
                    if let Some(rec) = self.recovery.as_mut() {
                        rec.buffer.pop_front();
                    }
                }
            }
        }
    }

    /// End-of-input variant: shrinking proposals, each ending at the
    /// end-of-input sentinel.
    fn pump_eof(&mut self) -> Result<(), ParseError> {
        loop {
            let Some(rec) = self.recovery.as_ref() else {
                return Ok(());
            };
            let window: Vec<_> = rec.buffer.iter().cloned().collect();
            if let Some(depth) = self.try_window(&window, true) {
                return self.commit_recovery_at_eof(depth);
            }
            match self.recovery.as_mut().and_then(|r| r.buffer.pop_front()) {
                Some(_) => continue,
                None => {
                    self.driver.cannot_recover();
                    return Err(ParseError::UnexpectedEof {
                        expected: self.expected_tokens(),
                    });
                }
            }
        }
    }

    /// Check whether some avenue's trial parse survives the whole proposal.
    fn try_window(&self, window: &[(TerminalID, D::Value, Span)], with_eoi: bool) -> Option<usize> {
        let Some(rec) = self.recovery.as_ref() else {
            return None;
        };
        let first = window.first().map(|(t, _, _)| *t).unwrap_or(TerminalID::EOI);
        for &(landed, depth) in &rec.avenues {
            if matches!(self.tables.action(landed, first), Op::Error) {
                continue;
            }
            let mut trial = Hypothetical::new(&self.tables, &self.stack, self.state, depth);
            if trial.consume(TerminalID::ERROR).is_err() {
                continue;
            }
            let survives = window.iter().all(|(t, _, _)| trial.consume(*t).is_ok())
                && (!with_eoi || trial.consume(TerminalID::EOI).is_ok());
            if survives {
                return Some(depth);
            }
        }
        None
    }

    fn commit_recovery(&mut self, depth: usize) -> Result<(), ParseError> {
        let window = match self.recovery.take() {
            Some(rec) => rec.buffer,
            None => return Ok(()),
        };
        self.replay(depth, window)?;
        self.driver.did_recover();
        self.quiescence = QUIESCENCE;
        Ok(())
    }

    fn commit_recovery_at_eof(&mut self, depth: usize) -> Result<(), ParseError> {
        let window = match self.recovery.take() {
            Some(rec) => rec.buffer,
            None => return Ok(()),
        };
        self.replay(depth, window)?;
        self.driver.did_recover();
        match self.find_shift(TerminalID::EOI)? {
            Found::Accept => Ok(()),
            _ => Err(ParseError::UnexpectedEof {
                expected: self.expected_tokens(),
            }),
        }
    }

    /// Unwind, shift `$error$`, and run the validated proposal for real.
    fn replay(
        &mut self,
        depth: usize,
        window: VecDeque<(TerminalID, D::Value, Span)>,
    ) -> Result<(), ParseError> {
        let err_val = self.driver.recovery_value();
        self.pop_phrase(depth);
        match self.find_shift(TerminalID::ERROR)? {
            Found::Shift(next) => self.shift(next, err_val, Span::default()),
            Found::ShiftReduce(rule) => self.combined_shift_reduce(rule, err_val, Span::default()),
            // The avenue was validated by trial parse.
            Found::Accept | Found::Error => unreachable!("recovery avenue went stale"),
        }
        self.eager_reduce();
        for (terminal, value, span) in window {
            match self.find_shift(terminal)? {
                Found::Shift(next) => self.shift(next, value, span),
                Found::ShiftReduce(rule) => self.combined_shift_reduce(rule, value, span),
                Found::Accept | Found::Error => unreachable!("trial parse lied about {terminal:?}"),
            }
            self.eager_reduce();
        }
        Ok(())
    }

    // ---- expected-token reporting ----

    /// Terminals shiftable here, directly or after simulated reductions.
    pub fn expected_tokens(&self) -> Vec<String> {
        let mut out = Vec::new();
        for t in self.tables.terminals() {
            if t == TerminalID::ERROR {
                continue;
            }
            if self.would_accept(t) {
                out.push(self.tables.terminal_name(t).to_owned());
            }
        }
        if self.would_accept(TerminalID::EOI) {
            out.push("end of input".to_owned());
        }
        out
    }

    fn would_accept(&self, terminal: TerminalID) -> bool {
        Hypothetical::new(&self.tables, &self.stack, self.state, 0)
            .consume(terminal)
            .is_ok()
    }
}

/// Feed a whole token stream through a fresh parser.
pub fn parse<T, D, I>(
    tables: T,
    driver: D,
    start: Option<&str>,
    tokens: I,
) -> Result<D::Value, ParseError>
where
    T: ParserTables,
    D: Combine,
    I: IntoIterator<Item = (TerminalID, D::Value, Span)>,
{
    let mut parser = Parser::new(tables, driver, start)?;
    for (terminal, value, span) in tokens {
        parser.feed(terminal, value, span)?;
    }
    parser.finish()
}

/// A hypothetical branch of the parse stack, used to test recovery
/// hypotheses and to compute expected-token sets without side effects.
struct Hypothetical<'a, T, V> {
    tables: &'a T,
    stack: &'a [(StateID, V, Span)],
    current: StateID,
    /// How deep into the host stack the hypothetical bottom sits.
    watermark: usize,
    suffix: Vec<StateID>,
    budget: usize,
}

impl<'a, T, V> Hypothetical<'a, T, V>
where
    T: ParserTables,
{
    fn new(tables: &'a T, stack: &'a [(StateID, V, Span)], current: StateID, depth: usize) -> Self {
        let budget = 8 * tables.state_count() + 64;
        Self {
            tables,
            stack,
            current,
            watermark: depth,
            suffix: Vec::new(),
            budget,
        }
    }

    fn tos(&self) -> StateID {
        match self.suffix.last() {
            Some(&q) => q,
            None => self.host_state(self.watermark),
        }
    }

    fn host_state(&self, depth: usize) -> StateID {
        if depth == 0 {
            self.current
        } else {
            self.stack[self.stack.len() - depth].0
        }
    }

    fn pop_phrase(&mut self, length: usize) {
        if length > self.suffix.len() {
            self.watermark += length - self.suffix.len();
            self.suffix.clear();
        } else if length > 0 {
            self.suffix.truncate(self.suffix.len() - length);
        }
    }

    fn reduce(&mut self, rule: RuleID) {
        let (lhs, rhs_len) = {
            let info = self.tables.rule(rule);
            (info.lhs, info.rhs_len as usize)
        };
        self.pop_phrase(rhs_len);
        let next = self.tables.goto(self.tos(), lhs);
        self.suffix.push(next);
    }

    /// Consume one terminal or fail. Success leaves the hypothetical stack
    /// positioned after the shift.
    fn consume(&mut self, terminal: TerminalID) -> Result<(), ()> {
        loop {
            self.budget = self.budget.checked_sub(1).ok_or(())?;
            match self.tables.action(self.tos(), terminal) {
                Op::Reduce(rule) => self.reduce(rule),
                Op::Shift(next) => {
                    self.suffix.push(next);
                    return Ok(());
                }
                Op::ShiftReduce(rule) => {
                    self.suffix.push(StateID::from_raw(u32::MAX));
                    self.reduce(rule);
                    return Ok(());
                }
                Op::Accept => return Ok(()),
                Op::Error | Op::Split(_) => return Err(()),
            }
        }
    }
}
