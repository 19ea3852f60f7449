//! Rule elements and their elaboration down to plain BNF.
//!
//! Rules are written as element lists: symbols, captured symbols (a `.`
//! prefix, or an explicit mask through the other entry point), mid-rule
//! actions, macro calls, and inline alternation. Elaboration rewrites all
//! of that into plain rules: each macro call site becomes a mangled
//! nonterminal defined exactly once per distinct argument list, and each
//! embedded action becomes a fresh epsilon nonterminal whose rule sees the
//! same left context the action did.

use crate::grammar::{GrammarDef, PlainRule, RuleAction};
use crate::types::{Map, Set};

/// One element of a rule's right-hand side.
#[derive(Debug, Clone)]
pub enum Elem {
    /// A plain symbol by name.
    Sym(String),
    /// A semantically significant element.
    Cap(Box<Elem>),
    /// A mid-rule action with the given message name.
    Act(String),
    /// A macro call.
    Call(String, Vec<Elem>),
    /// Inline alternation `[a|b|c]`, a nonterminal renaming any member.
    Choice(Vec<Elem>),
}

impl From<&str> for Elem {
    /// A leading dot marks a capture: `".expr"` is a captured `expr`.
    fn from(name: &str) -> Self {
        match name.strip_prefix('.') {
            Some(rest) if !rest.is_empty() => Elem::Cap(Box::new(Elem::Sym(rest.to_owned()))),
            _ => Elem::Sym(name.to_owned()),
        }
    }
}

impl From<String> for Elem {
    fn from(name: String) -> Self {
        Elem::from(name.as_str())
    }
}

pub fn cap(elem: impl Into<Elem>) -> Elem {
    Elem::Cap(Box::new(elem.into()))
}

pub fn act(message: &str) -> Elem {
    Elem::Act(message.to_owned())
}

pub fn call<I, E>(name: &str, args: I) -> Elem
where
    I: IntoIterator<Item = E>,
    E: Into<Elem>,
{
    Elem::Call(name.to_owned(), args.into_iter().map(Into::into).collect())
}

pub fn choice<I, E>(alternatives: I) -> Elem
where
    I: IntoIterator<Item = E>,
    E: Into<Elem>,
{
    Elem::Choice(alternatives.into_iter().map(Into::into).collect())
}

/// One alternative of a rule: elements plus an optional message name and an
/// optional explicit precedence symbol.
#[derive(Debug, Clone)]
pub struct Alt {
    pub elems: Vec<Elem>,
    pub message: Option<String>,
    pub prec: Option<String>,
}

impl Alt {
    pub fn new<I, E>(elems: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Elem>,
    {
        Self {
            elems: elems.into_iter().map(Into::into).collect(),
            message: None,
            prec: None,
        }
    }

    /// Name the message this alternative sends on reduction.
    pub fn msg(mut self, name: &str) -> Self {
        self.message = Some(name.to_owned());
        self
    }

    /// Override the precedence symbol for conflict resolution.
    pub fn prec(mut self, symbol: &str) -> Self {
        self.prec = Some(symbol.to_owned());
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MacroDef {
    pub params: Vec<String>,
    pub alts: Vec<Alt>,
    pub line: u32,
}

/// Macro-within-macro substitutions form a DAG by construction; this bound
/// is a defensive backstop against an expansion that keeps minting fresh
/// argument lists.
const EXPANSION_BUDGET: usize = 10_000;

pub(crate) fn decide_action(
    message: Option<&str>,
    offsets: &[i16],
    size: i16,
    explicit: bool,
) -> RuleAction {
    match message {
        Some(name) => RuleAction::Message(name.to_owned()),
        None if size == 1 && !explicit => RuleAction::Pick(-1),
        None if offsets.len() == 1 => RuleAction::Pick(offsets[0]),
        None => RuleAction::Bundle,
    }
}

struct Elaborator {
    macros: Map<String, MacroDef>,
    void: Set<String>,
    out: Vec<PlainRule>,
    /// Mangled heads already given their rules.
    implemented: Set<String>,
    /// Macro call sites awaiting elaboration.
    worklist: Vec<(String, String, Vec<String>, u32)>,
    used_macros: Set<String>,
    action_counter: usize,
    spent: usize,
}

pub(crate) fn elaborate(def: &mut GrammarDef) -> Vec<PlainRule> {
    let mut ctx = Elaborator {
        macros: std::mem::take(&mut def.macros),
        void: std::mem::take(&mut def.void_names),
        out: std::mem::take(&mut def.extra_plain),
        implemented: Set::default(),
        worklist: Vec::new(),
        used_macros: Set::default(),
        action_counter: 0,
        spent: 0,
    };
    let pending = std::mem::take(&mut def.pending);
    for (lhs, alt, line) in &pending {
        ctx.install(def, lhs, alt, &Map::default(), *line);
    }
    while let Some((mangled, name, args, line)) = ctx.worklist.pop() {
        ctx.spent += 1;
        if ctx.spent > EXPANSION_BUDGET {
            def.diagnostics
                .error(Some(line), "macro expansion does not terminate");
            break;
        }
        let mac = match ctx.macros.get(&name) {
            Some(mac) => mac.clone(),
            None => {
                def.diagnostics
                    .error(Some(line), format!("macro {name:?} is called but never defined"));
                continue;
            }
        };
        ctx.used_macros.insert(name.clone());
        if mac.params.len() != args.len() {
            def.diagnostics.error(
                Some(line),
                format!(
                    "macro {name:?} takes {} argument(s) but got {}",
                    mac.params.len(),
                    args.len()
                ),
            );
            continue;
        }
        let bindings: Map<String, String> = mac
            .params
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect();
        for alt in &mac.alts {
            ctx.install(def, &mangled, alt, &bindings, mac.line);
        }
    }
    for (name, mac) in &ctx.macros {
        if !ctx.used_macros.contains(name) {
            def.diagnostics
                .warning(Some(mac.line), format!("macro {name:?} is defined but never used"));
        }
    }
    ctx.out
}

impl Elaborator {
    fn install(
        &mut self,
        def: &mut GrammarDef,
        head: &str,
        alt: &Alt,
        bindings: &Map<String, String>,
        line: u32,
    ) {
        let mut rhs: Vec<String> = Vec::with_capacity(alt.elems.len());
        let mut explicit: Vec<u16> = Vec::new();
        for elem in &alt.elems {
            self.install_elem(def, elem, false, bindings, &mut rhs, &mut explicit, line);
        }
        let size = rhs.len() as i16;
        let offsets: Vec<i16> = if explicit.is_empty() {
            // Pick up everything that carries a value if nothing is marked.
            (0..rhs.len())
                .filter(|&i| !self.void.contains(&rhs[i]))
                .map(|i| i as i16 - size)
                .collect()
        } else {
            explicit.iter().map(|&p| p as i16 - size).collect()
        };
        let action = decide_action(alt.message.as_deref(), &offsets, size, !explicit.is_empty());
        let prec_sym = alt
            .prec
            .as_ref()
            .map(|name| bindings.get(name).cloned().unwrap_or_else(|| name.clone()));
        self.out.push(PlainRule {
            lhs: head.to_owned(),
            rhs,
            action,
            captures: offsets,
            prec_sym,
            line,
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn install_elem(
        &mut self,
        def: &mut GrammarDef,
        elem: &Elem,
        captured: bool,
        bindings: &Map<String, String>,
        rhs: &mut Vec<String>,
        explicit: &mut Vec<u16>,
        line: u32,
    ) {
        match elem {
            Elem::Cap(inner) => {
                self.install_elem(def, inner, true, bindings, rhs, explicit, line)
            }
            Elem::Act(message) => {
                // Lift to a fresh epsilon nonterminal whose rule sees the
                // captured left context gathered so far.
                self.action_counter += 1;
                let placeholder = format!("{}@{}", message, self.action_counter);
                let here = rhs.len() as i16;
                let prefix: Vec<i16> = explicit.iter().map(|&p| p as i16 - here).collect();
                self.out.push(PlainRule {
                    lhs: placeholder.clone(),
                    rhs: Vec::new(),
                    action: RuleAction::Message(message.clone()),
                    captures: prefix,
                    prec_sym: None,
                    line,
                });
                rhs.push(placeholder);
            }
            other => {
                let name = self.resolve_symbol(def, other, bindings, line);
                if captured {
                    explicit.push(rhs.len() as u16);
                }
                rhs.push(name);
            }
        }
    }

    /// Reduce an element to the name of a symbol, minting and scheduling
    /// mangled nonterminals for macro calls and inline alternations.
    fn resolve_symbol(
        &mut self,
        def: &mut GrammarDef,
        elem: &Elem,
        bindings: &Map<String, String>,
        line: u32,
    ) -> String {
        match elem {
            Elem::Sym(name) => bindings.get(name).cloned().unwrap_or_else(|| name.clone()),
            Elem::Call(name, args) => {
                let args: Vec<String> = args
                    .iter()
                    .map(|a| self.resolve_symbol(def, a, bindings, line))
                    .collect();
                let mangled = format!("{}({})", name, args.join(","));
                if self.implemented.insert(mangled.clone()) {
                    self.worklist.push((mangled.clone(), name.clone(), args, line));
                }
                mangled
            }
            Elem::Choice(alternatives) => {
                let names: Vec<String> = alternatives
                    .iter()
                    .map(|a| self.resolve_symbol(def, a, bindings, line))
                    .collect();
                let mangled = format!("[{}]", names.join("|"));
                if self.implemented.insert(mangled.clone()) {
                    for name in &names {
                        self.out.push(PlainRule {
                            lhs: mangled.clone(),
                            rhs: vec![name.clone()],
                            action: RuleAction::Pick(-1),
                            captures: Vec::new(),
                            prec_sym: None,
                            line,
                        });
                    }
                }
                mangled
            }
            Elem::Cap(inner) => {
                def.diagnostics.error(
                    Some(line),
                    "a capture mark cannot nest inside a macro argument",
                );
                self.resolve_symbol(def, inner, bindings, line)
            }
            Elem::Act(_) => {
                def.diagnostics
                    .error(Some(line), "an action cannot stand for a symbol");
                String::from("<bogus>")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_prefix_marks_a_capture() {
        assert!(matches!(Elem::from(".expr"), Elem::Cap(_)));
        assert!(matches!(Elem::from("expr"), Elem::Sym(_)));
        // A bare dot is a symbol named ".", odd but not a capture of nothing.
        assert!(matches!(Elem::from("."), Elem::Sym(_)));
    }

    #[test]
    fn action_selection() {
        // Renaming: one symbol, nothing marked, no message.
        assert_eq!(decide_action(None, &[-1], 1, false), RuleAction::Pick(-1));
        // Bracketing: one mark among three symbols.
        assert_eq!(decide_action(None, &[-2], 3, true), RuleAction::Pick(-2));
        // Everything else bundles or messages.
        assert_eq!(decide_action(None, &[-3, -1], 3, true), RuleAction::Bundle);
        assert_eq!(
            decide_action(Some("add"), &[-3, -1], 3, true),
            RuleAction::Message("add".to_owned())
        );
    }
}
