//! The pattern language for scanner rules.
//!
//! Union, concatenation, the usual postfix operators, counted repetition,
//! character classes with intersection (`&&`) and difference (`^`), named
//! subexpressions `{name}`, a beginning-of-line anchor `^`, and trailing
//! context `R1/R2` with `$` as sugar for trailing end-of-line. Counted
//! repetition is rewritten into sequence/star/option at parse time, and
//! named references are expanded from the environment in the same single
//! pass, so nothing downstream ever sees either form.

use crate::charset::{self, Charset};
use crate::types::Map;

#[derive(Debug, Clone)]
pub enum Regex {
    Empty,
    Class(Charset),
    Cat(Box<Regex>, Box<Regex>),
    Alt(Box<Regex>, Box<Regex>),
    Star(Box<Regex>),
    Plus(Box<Regex>),
    Hook(Box<Regex>),
}

impl Regex {
    fn cat(a: Regex, b: Regex) -> Regex {
        match (a, b) {
            (Regex::Empty, b) => b,
            (a, Regex::Empty) => a,
            (a, b) => Regex::Cat(Box::new(a), Box::new(b)),
        }
    }

    /// Can this expression match the empty string?
    pub fn nullable(&self) -> bool {
        match self {
            Regex::Empty | Regex::Star(_) | Regex::Hook(_) => true,
            Regex::Class(_) => false,
            Regex::Cat(a, b) => a.nullable() && b.nullable(),
            Regex::Alt(a, b) => a.nullable() || b.nullable(),
            Regex::Plus(sub) => sub.nullable(),
        }
    }

    /// The length of every match, if they all agree.
    pub fn fixed_size(&self) -> Option<u32> {
        match self {
            Regex::Empty => Some(0),
            Regex::Class(_) => Some(1),
            Regex::Cat(a, b) => Some(a.fixed_size()? + b.fixed_size()?),
            Regex::Alt(a, b) => {
                let a = a.fixed_size()?;
                (a == b.fixed_size()?).then_some(a)
            }
            Regex::Star(_) | Regex::Plus(_) | Regex::Hook(_) => None,
        }
    }
}

/// A complete scanner pattern: anchor flag, stem, optional trailing context.
#[derive(Debug, Clone)]
pub struct Pattern {
    /// Only usable at the beginning of a line.
    pub anchored: bool,
    pub stem: Regex,
    pub trail: Option<Regex>,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("unexpected {0:?} at byte {1} of pattern")]
    Unexpected(char, usize),

    #[error("pattern ends in the middle of something")]
    UnexpectedEnd,

    #[error("no such named subexpression {0:?}")]
    UnknownReference(String),

    #[error("named subexpression {0:?} refers to itself")]
    RecursiveReference(String),

    #[error("named subexpression {0:?} is not a character class")]
    NotAClass(String),

    #[error("backwards range in character class")]
    BadRange,

    #[error("bad counted repetition")]
    BadCount,

    #[error("misplaced anchor")]
    MisplacedAnchor,

    #[error("variable size for both stem and trailing context in the same pattern")]
    VariableTrailingContext,
}

struct NamedDef {
    regex: Regex,
}

/// The named-subexpression environment, preloaded with the standard
/// classes.
pub struct PatternEnv {
    defs: Map<String, NamedDef>,
}

impl Default for PatternEnv {
    fn default() -> Self {
        let mut defs = Map::default();
        let mut class = |name: &str, set: Charset| {
            defs.insert(
                name.to_owned(),
                NamedDef {
                    regex: Regex::Class(set),
                },
            );
        };
        class("alpha", charset::posix_alpha());
        class("digit", charset::posix_digit());
        class("word", charset::posix_word());
        class("space", charset::posix_space());
        class("upper", charset::posix_upper());
        class("lower", charset::posix_lower());
        class("xdigit", charset::posix_xdigit());
        class("ANY", charset::dot());
        class("EOL", charset::eol());
        Self { defs }
    }
}

impl PatternEnv {
    /// Define a named subexpression. References inside the body resolve
    /// against definitions made so far; a reference to the name being
    /// defined is reported as recursion.
    pub fn define(&mut self, name: &str, source: &str) -> Result<(), PatternError> {
        let mut p = Parser::new(source, self, Some(name));
        let regex = p.alternation()?;
        p.expect_end()?;
        self.defs.insert(name.to_owned(), NamedDef { regex });
        Ok(())
    }

    fn lookup(&self, name: &str, defining: Option<&str>) -> Result<&NamedDef, PatternError> {
        if defining == Some(name) {
            return Err(PatternError::RecursiveReference(name.to_owned()));
        }
        self.defs
            .get(name)
            .ok_or_else(|| PatternError::UnknownReference(name.to_owned()))
    }
}

/// Parse one full scanner pattern.
pub fn parse_pattern(source: &str, env: &PatternEnv) -> Result<Pattern, PatternError> {
    let mut p = Parser::new(source, env, None);
    let anchored = p.eat('^');
    let stem = p.alternation()?;
    let mut trail = None;
    if p.eat('/') {
        trail = Some(p.alternation()?);
    }
    if p.eat('$') {
        let eol = Regex::Class(charset::eol());
        trail = Some(match trail {
            None => eol,
            Some(t) => Regex::cat(t, eol),
        });
    }
    p.expect_end()?;
    Ok(Pattern {
        anchored,
        stem,
        trail,
    })
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    env: &'a PatternEnv,
    defining: Option<&'a str>,
}

enum Escaped {
    One(i32),
    Set(Charset),
}

impl<'a> Parser<'a> {
    fn new(source: &str, env: &'a PatternEnv, defining: Option<&'a str>) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            env,
            defining,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eat(&mut self, want: char) -> bool {
        if self.peek() == Some(want) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected<T>(&self) -> Result<T, PatternError> {
        match self.peek() {
            Some(c) => Err(PatternError::Unexpected(c, self.pos)),
            None => Err(PatternError::UnexpectedEnd),
        }
    }

    fn expect(&mut self, want: char) -> Result<(), PatternError> {
        if self.eat(want) {
            Ok(())
        } else {
            self.unexpected()
        }
    }

    fn expect_end(&self) -> Result<(), PatternError> {
        if self.pos == self.chars.len() {
            Ok(())
        } else {
            self.unexpected()
        }
    }

    fn alternation(&mut self) -> Result<Regex, PatternError> {
        let mut acc = self.sequence()?;
        while self.eat('|') {
            let rhs = self.sequence()?;
            acc = Regex::Alt(Box::new(acc), Box::new(rhs));
        }
        Ok(acc)
    }

    fn sequence(&mut self) -> Result<Regex, PatternError> {
        let mut acc = Regex::Empty;
        while !matches!(self.peek(), None | Some('|' | ')' | '/' | '$')) {
            let item = self.repetition()?;
            acc = Regex::cat(acc, item);
        }
        Ok(acc)
    }

    fn repetition(&mut self) -> Result<Regex, PatternError> {
        let mut acc = self.atom()?;
        loop {
            match self.peek() {
                Some('*') => {
                    self.pos += 1;
                    acc = Regex::Star(Box::new(acc));
                }
                Some('+') => {
                    self.pos += 1;
                    acc = Regex::Plus(Box::new(acc));
                }
                Some('?') => {
                    self.pos += 1;
                    acc = Regex::Hook(Box::new(acc));
                }
                Some('{') if matches!(self.peek2(), Some(c) if c.is_ascii_digit() || c == ',') => {
                    acc = self.counted(acc)?;
                }
                _ => break,
            }
        }
        Ok(acc)
    }

    fn counted(&mut self, sub: Regex) -> Result<Regex, PatternError> {
        self.expect('{')?;
        let min = self.number()?;
        let max = if self.eat(',') {
            match self.peek() {
                Some('}') => None,
                _ => Some(self.number()?.ok_or(PatternError::BadCount)?),
            }
        } else {
            Some(min.ok_or(PatternError::BadCount)?)
        };
        self.expect('}')?;
        let min = min.unwrap_or(0);
        if let Some(max) = max {
            if max < min {
                return Err(PatternError::BadCount);
            }
        }
        let mut acc = Regex::Empty;
        for _ in 0..min {
            acc = Regex::cat(acc, sub.clone());
        }
        match max {
            None => Ok(Regex::cat(acc, Regex::Star(Box::new(sub)))),
            Some(max) => {
                for _ in min..max {
                    acc = Regex::cat(acc, Regex::Hook(Box::new(sub.clone())));
                }
                Ok(acc)
            }
        }
    }

    fn number(&mut self) -> Result<Option<u32>, PatternError> {
        let mut digits = String::new();
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            digits.push(self.bump().unwrap_or('0'));
        }
        if digits.is_empty() {
            return Ok(None);
        }
        digits.parse().map(Some).map_err(|_| PatternError::BadCount)
    }

    fn atom(&mut self) -> Result<Regex, PatternError> {
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let inner = self.alternation()?;
                self.expect(')')?;
                Ok(inner)
            }
            Some('[') => {
                self.pos += 1;
                let set = self.class()?;
                Ok(Regex::Class(set))
            }
            Some('{') => {
                self.pos += 1;
                let name = self.name()?;
                self.expect('}')?;
                let def = self.env.lookup(&name, self.defining)?;
                Ok(def.regex.clone())
            }
            Some('.') => {
                self.pos += 1;
                Ok(Regex::Class(charset::dot()))
            }
            Some('\\') => {
                self.pos += 1;
                match self.escape()? {
                    Escaped::One(cp) => Ok(Regex::Class(Charset::singleton(cp))),
                    Escaped::Set(set) => Ok(Regex::Class(set)),
                }
            }
            Some('*' | '+' | '?' | ']' | '}') => self.unexpected(),
            Some(c) => {
                self.pos += 1;
                Ok(Regex::Class(Charset::singleton(c as i32)))
            }
            None => self.unexpected(),
        }
    }

    fn name(&mut self) -> Result<String, PatternError> {
        let mut out = String::new();
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            out.push(self.bump().unwrap_or('_'));
        }
        if out.is_empty() {
            self.unexpected()
        } else {
            Ok(out)
        }
    }

    // ---- character classes ----

    fn class(&mut self) -> Result<Charset, PatternError> {
        let negate = self.eat('^');
        // A ']' in leading position is a member, not the closer.
        let mut acc = if self.eat(']') {
            Charset::singleton(']' as i32)
        } else {
            Charset::empty()
        };
        acc = acc.union(&self.class_part()?);
        loop {
            if self.peek() == Some('&') && self.peek2() == Some('&') {
                self.pos += 2;
                acc = acc.intersection(&self.class_part()?);
            } else if self.peek() == Some('^') {
                self.pos += 1;
                acc = acc.difference(&self.class_part()?);
            } else {
                break;
            }
        }
        self.expect(']')?;
        Ok(if negate { acc.complement() } else { acc })
    }

    /// A run of class items, unioned. Stops at `]`, `^`, or `&&`.
    fn class_part(&mut self) -> Result<Charset, PatternError> {
        let mut acc = Charset::empty();
        loop {
            match self.peek() {
                None => return self.unexpected(),
                Some(']' | '^') => break,
                Some('&') if self.peek2() == Some('&') => break,
                _ => {}
            }
            acc = acc.union(&self.class_item()?);
        }
        Ok(acc)
    }

    fn class_item(&mut self) -> Result<Charset, PatternError> {
        let first = match self.peek() {
            Some('{') => {
                self.pos += 1;
                let name = self.name()?;
                self.expect('}')?;
                let def = self.env.lookup(&name, self.defining)?;
                return match &def.regex {
                    Regex::Class(set) => Ok(set.clone()),
                    _ => Err(PatternError::NotAClass(name)),
                };
            }
            Some('\\') => {
                self.pos += 1;
                match self.escape()? {
                    Escaped::One(cp) => cp,
                    Escaped::Set(set) => return Ok(set),
                }
            }
            Some(c) => {
                self.pos += 1;
                c as i32
            }
            None => return self.unexpected(),
        };
        // A trailing '-' is a literal; otherwise it makes a range.
        if self.peek() == Some('-') && !matches!(self.peek2(), None | Some(']')) {
            self.pos += 1;
            let last = match self.peek() {
                Some('\\') => {
                    self.pos += 1;
                    match self.escape()? {
                        Escaped::One(cp) => cp,
                        Escaped::Set(_) => return Err(PatternError::BadRange),
                    }
                }
                Some(c) => {
                    self.pos += 1;
                    c as i32
                }
                None => return self.unexpected(),
            };
            if last < first {
                return Err(PatternError::BadRange);
            }
            Ok(Charset::range(first, last))
        } else {
            Ok(Charset::singleton(first))
        }
    }

    fn escape(&mut self) -> Result<Escaped, PatternError> {
        let c = match self.bump() {
            Some(c) => c,
            None => return Err(PatternError::UnexpectedEnd),
        };
        let one = |cp: i32| Ok(Escaped::One(cp));
        match c {
            'n' => one('\n' as i32),
            'r' => one('\r' as i32),
            't' => one('\t' as i32),
            'f' => one(0x0C),
            '0' => one(0),
            'e' => one(0x1B),
            'd' => Ok(Escaped::Set(charset::posix_digit())),
            'D' => Ok(Escaped::Set(charset::posix_digit().complement())),
            's' => Ok(Escaped::Set(charset::posix_space())),
            'S' => Ok(Escaped::Set(charset::posix_space().complement())),
            'w' => Ok(Escaped::Set(charset::posix_word())),
            'W' => Ok(Escaped::Set(charset::posix_word().complement())),
            'x' => {
                let mut value = 0i32;
                for _ in 0..2 {
                    let d = self.bump().and_then(|c| c.to_digit(16));
                    match d {
                        Some(d) => value = value * 16 + d as i32,
                        None => return self.unexpected(),
                    }
                }
                one(value)
            }
            'u' => {
                self.expect('{')?;
                let mut value: u32 = 0;
                let mut any = false;
                while let Some(d) = self.peek().and_then(|c| c.to_digit(16)) {
                    self.pos += 1;
                    value = value.saturating_mul(16).saturating_add(d);
                    any = true;
                }
                self.expect('}')?;
                if !any || value >= charset::UNIVERSE_END as u32 {
                    return self.unexpected();
                }
                one(value as i32)
            }
            other if other.is_alphanumeric() => Err(PatternError::Unexpected(other, self.pos - 1)),
            other => one(other as i32),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Pattern {
        parse_pattern(src, &PatternEnv::default()).unwrap()
    }

    #[test]
    fn simple_sequence_and_sizes() {
        let p = parse("abc");
        assert_eq!(p.stem.fixed_size(), Some(3));
        assert!(!p.stem.nullable());
        assert!(!p.anchored);
        assert!(p.trail.is_none());
    }

    #[test]
    fn alternation_and_star() {
        let p = parse("a(b|cd)*");
        assert_eq!(p.stem.fixed_size(), None);
        assert!(!p.stem.nullable());
        assert!(parse("a?").stem.nullable());
    }

    #[test]
    fn counted_repetition_expands() {
        let p = parse("a{2,4}");
        // Two mandatory, two optional.
        assert_eq!(p.stem.fixed_size(), None);
        let exact = parse("a{3}");
        assert_eq!(exact.stem.fixed_size(), Some(3));
        assert!(parse_pattern("a{4,2}", &PatternEnv::default()).is_err());
    }

    #[test]
    fn classes_with_difference_and_intersection() {
        let p = parse("[a-z^aeiou]");
        match &p.stem {
            Regex::Class(set) => {
                assert!(set.contains('b' as i32));
                assert!(!set.contains('e' as i32));
            }
            other => panic!("expected a class, got {other:?}"),
        }
        let q = parse(r"[\w&&[a-f]]+");
        assert!(q.stem.fixed_size().is_none());
    }

    #[test]
    fn negated_class() {
        let p = parse(r#"[^"]"#);
        match &p.stem {
            Regex::Class(set) => {
                assert!(set.contains('x' as i32));
                assert!(!set.contains('"' as i32));
                assert!(!set.contains(crate::charset::SENTINEL));
            }
            other => panic!("expected a class, got {other:?}"),
        }
    }

    #[test]
    fn leading_bracket_is_a_member() {
        let p = parse("[][(),|]");
        match &p.stem {
            Regex::Class(set) => {
                for c in "[](),|".chars() {
                    assert!(set.contains(c as i32), "missing {c:?}");
                }
                assert!(!set.contains('x' as i32));
            }
            other => panic!("expected a class, got {other:?}"),
        }
    }

    #[test]
    fn named_references_expand() {
        let mut env = PatternEnv::default();
        env.define("wholeNumber", r"[1-9]\d*").unwrap();
        env.define("signedInteger", r"-?(0|{wholeNumber})").unwrap();
        let p = parse_pattern("{signedInteger}", &env).unwrap();
        assert!(!p.stem.nullable());
    }

    #[test]
    fn recursion_is_reported() {
        let mut env = PatternEnv::default();
        let err = env.define("loop", "a{loop}").unwrap_err();
        assert_eq!(err, PatternError::RecursiveReference("loop".to_owned()));
        let err = env.define("other", "{nothing}").unwrap_err();
        assert_eq!(err, PatternError::UnknownReference("nothing".to_owned()));
    }

    #[test]
    fn anchors_and_trailing_context() {
        let p = parse("^foo/bar");
        assert!(p.anchored);
        assert_eq!(p.trail.as_ref().and_then(|t| t.fixed_size()), Some(3));
        let q = parse("foo$");
        assert_eq!(q.trail.as_ref().and_then(|t| t.fixed_size()), Some(1));
    }
}
