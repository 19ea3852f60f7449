//! Sets of code points, represented as sorted toggle boundaries.
//!
//! A set is a sorted vector of code points at which membership flips;
//! membership of `c` is therefore "an odd number of boundaries are <= c".
//! Set algebra is a linear merge of boundary lists. The domain is
//! `-1 ..= 0x10FFFF`, where `-1` stands for the end-of-input sentinel so
//! that patterns (the end-of-line class in particular) can mention it like
//! any other code point.

pub const SENTINEL: i32 = -1;
pub const UNIVERSE_END: i32 = 0x11_0000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Charset {
    bounds: Vec<i32>,
}

impl Charset {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn singleton(cp: i32) -> Self {
        Self {
            bounds: vec![cp, cp + 1],
        }
    }

    /// Both ends inclusive.
    pub fn range(first: i32, last: i32) -> Self {
        if last < first {
            return Self::empty();
        }
        Self {
            bounds: vec![first, last + 1],
        }
    }

    /// Every real code point; the sentinel is not included.
    pub fn full() -> Self {
        Self::range(0, UNIVERSE_END - 1)
    }

    pub fn eoi() -> Self {
        Self::singleton(SENTINEL)
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    pub fn contains(&self, cp: i32) -> bool {
        self.bounds.partition_point(|&b| b <= cp) % 2 == 1
    }

    pub fn bounds(&self) -> &[i32] {
        &self.bounds
    }

    /// The number of code points in the set, sentinel included.
    pub fn count(&self) -> u32 {
        self.bounds
            .chunks(2)
            .map(|pair| match *pair {
                [a, b] => (b - a) as u32,
                [_] => 0,
                _ => 0,
            })
            .sum()
    }

    fn combine(&self, other: &Self, keep: impl Fn(bool, bool) -> bool) -> Self {
        let mut bounds = Vec::new();
        let (mut i, mut j) = (0, 0);
        let (mut in_a, mut in_b) = (false, false);
        let mut inside = false;
        loop {
            let next_a = self.bounds.get(i).copied();
            let next_b = other.bounds.get(j).copied();
            let at = match (next_a, next_b) {
                (Some(a), Some(b)) => a.min(b),
                (Some(a), None) => a,
                (None, Some(b)) => b,
                (None, None) => break,
            };
            if next_a == Some(at) {
                in_a = !in_a;
                i += 1;
            }
            if next_b == Some(at) {
                in_b = !in_b;
                j += 1;
            }
            let now = keep(in_a, in_b);
            if now != inside {
                bounds.push(at);
                inside = now;
            }
        }
        Self { bounds }
    }

    pub fn union(&self, other: &Self) -> Self {
        self.combine(other, |a, b| a || b)
    }

    pub fn intersection(&self, other: &Self) -> Self {
        self.combine(other, |a, b| a && b)
    }

    pub fn difference(&self, other: &Self) -> Self {
        self.combine(other, |a, b| a && !b)
    }

    /// Complement over the real code points; never yields the sentinel.
    pub fn complement(&self) -> Self {
        Self::full().difference(self)
    }
}

/// Line-ending characters plus the end-of-input sentinel; the expansion of
/// the `$` anchor.
pub fn eol() -> Charset {
    Charset::singleton(SENTINEL)
        .union(&Charset::singleton('\n' as i32))
        .union(&Charset::singleton('\r' as i32))
}

/// Anything but a newline (and never the sentinel).
pub fn dot() -> Charset {
    Charset::singleton('\n' as i32).complement()
}

pub fn posix_digit() -> Charset {
    Charset::range('0' as i32, '9' as i32)
}

pub fn posix_word() -> Charset {
    posix_digit()
        .union(&Charset::range('A' as i32, 'Z' as i32))
        .union(&Charset::range('a' as i32, 'z' as i32))
        .union(&Charset::singleton('_' as i32))
}

pub fn posix_space() -> Charset {
    // space, tab, newline, vertical tab, form feed, carriage return
    Charset::singleton(' ' as i32).union(&Charset::range(0x09, 0x0D))
}

pub fn posix_alpha() -> Charset {
    Charset::range('A' as i32, 'Z' as i32).union(&Charset::range('a' as i32, 'z' as i32))
}

pub fn posix_upper() -> Charset {
    Charset::range('A' as i32, 'Z' as i32)
}

pub fn posix_lower() -> Charset {
    Charset::range('a' as i32, 'z' as i32)
}

pub fn posix_xdigit() -> Charset {
    posix_digit()
        .union(&Charset::range('A' as i32, 'F' as i32))
        .union(&Charset::range('a' as i32, 'f' as i32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_basics() {
        let s = Charset::range('a' as i32, 'z' as i32);
        assert!(s.contains('a' as i32));
        assert!(s.contains('m' as i32));
        assert!(s.contains('z' as i32));
        assert!(!s.contains('A' as i32));
        assert!(!s.contains(SENTINEL));
    }

    #[test]
    fn algebra() {
        let letters = posix_alpha();
        let vowels: Charset = "aeiou"
            .chars()
            .map(|c| Charset::singleton(c as i32))
            .fold(Charset::empty(), |acc, s| acc.union(&s));
        let consonants = letters.difference(&vowels);
        assert!(consonants.contains('b' as i32));
        assert!(!consonants.contains('e' as i32));
        assert_eq!(letters.intersection(&vowels), vowels);
        assert_eq!(consonants.union(&vowels), letters);
    }

    #[test]
    fn complement_excludes_sentinel() {
        let not_newline = dot();
        assert!(not_newline.contains('x' as i32));
        assert!(!not_newline.contains('\n' as i32));
        assert!(!not_newline.contains(SENTINEL));
        assert!(eol().contains(SENTINEL));
    }

    #[test]
    fn adjacent_ranges_normalize() {
        let a = Charset::range(0, 9);
        let b = Charset::range(10, 19);
        assert_eq!(a.union(&b), Charset::range(0, 19));
        assert_eq!(a.union(&b).bounds(), &[0, 20]);
    }

    #[test]
    fn counting() {
        assert_eq!(Charset::singleton(7).count(), 1);
        assert_eq!(Charset::range(0, 9).count(), 10);
        assert_eq!(eol().count(), 3);
    }
}
