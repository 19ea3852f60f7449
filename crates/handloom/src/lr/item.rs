//! The flat parse-item representation.
//!
//! A parse-item is a small integer indexing an array that holds every rule's
//! right-hand side laid out end to end, with a sentinel slot after each
//! rule; the successor item is just the next integer. Start symbols get one
//! pseudo-rule apiece (`[S]` with no rule ID) so the constructions need no
//! special cases for initial states. Per-item transparency and read-sets
//! are precomputed once; every LR construction leans on them.

use handloom_runtime::definition::{NonterminalID, RuleID, SymbolID, TerminalIDSet};

use crate::grammar::Grammar;

pub type ItemIx = usize;

#[derive(Debug)]
pub struct ItemMap {
    /// The symbol after the dot, or `None` at the end of a rule.
    symbol_at: Vec<Option<SymbolID>>,
    /// The owning rule; `None` within a start pseudo-rule.
    rule_of: Vec<Option<RuleID>>,
    /// The dot offset within the owning rule.
    offset: Vec<u16>,
    /// Head items (dot at zero) per nonterminal.
    front: Vec<Vec<ItemIx>>,
    /// One head item per start symbol, in declaration order.
    language_front: Vec<ItemIx>,
    /// Whether the suffix from this item can derive epsilon.
    transparent: Vec<bool>,
    /// FIRST of the suffix from this item.
    read_set: Vec<TerminalIDSet>,
}

impl ItemMap {
    pub fn from_grammar(grammar: &Grammar) -> Self {
        let mut symbol_at: Vec<Option<SymbolID>> = Vec::new();
        let mut rule_of: Vec<Option<RuleID>> = Vec::new();
        let mut offset: Vec<u16> = Vec::new();
        let mut front: Vec<Vec<ItemIx>> = vec![Vec::new(); grammar.nonterminal_count()];

        let mut plonk = |rhs: &[SymbolID],
                         rule: Option<RuleID>,
                         symbol_at: &mut Vec<Option<SymbolID>>,
                         rule_of: &mut Vec<Option<RuleID>>,
                         offset: &mut Vec<u16>|
         -> ItemIx {
            let head = symbol_at.len();
            for (i, sym) in rhs.iter().enumerate() {
                symbol_at.push(Some(*sym));
                rule_of.push(rule);
                offset.push(i as u16);
            }
            symbol_at.push(None);
            rule_of.push(rule);
            offset.push(rhs.len() as u16);
            head
        };

        for (ix, rule) in grammar.rules().iter().enumerate() {
            let head = plonk(
                &rule.rhs,
                Some(RuleID::from_raw(ix as u16)),
                &mut symbol_at,
                &mut rule_of,
                &mut offset,
            );
            front[rule.lhs.into_raw() as usize].push(head);
        }
        let mut language_front = Vec::with_capacity(grammar.start().len());
        for &start in grammar.start() {
            let head = plonk(
                &[SymbolID::N(start)],
                None,
                &mut symbol_at,
                &mut rule_of,
                &mut offset,
            );
            language_front.push(head);
        }

        // Transparency and read-sets, computed right to left so each item
        // sees its successor's answer.
        let count = symbol_at.len();
        let mut transparent = vec![false; count];
        let mut read_set = vec![TerminalIDSet::default(); count];
        for i in (0..count).rev() {
            match symbol_at[i] {
                None => transparent[i] = true,
                Some(SymbolID::T(t)) => {
                    read_set[i].insert(t);
                }
                Some(SymbolID::N(n)) => {
                    read_set[i].union_with(grammar.first_of(n));
                    if grammar.is_nullable(n) {
                        transparent[i] = transparent[i + 1];
                        let successor = read_set[i + 1].clone();
                        read_set[i].union_with(&successor);
                    }
                }
            }
        }

        Self {
            symbol_at,
            rule_of,
            offset,
            front,
            language_front,
            transparent,
            read_set,
        }
    }

    #[inline]
    pub fn symbol_at(&self, item: ItemIx) -> Option<SymbolID> {
        self.symbol_at[item]
    }

    #[inline]
    pub fn rule_of(&self, item: ItemIx) -> Option<RuleID> {
        self.rule_of[item]
    }

    #[inline]
    pub fn offset(&self, item: ItemIx) -> u16 {
        self.offset[item]
    }

    #[inline]
    pub fn head_of(&self, item: ItemIx) -> ItemIx {
        item - self.offset[item] as usize
    }

    pub fn front(&self, n: NonterminalID) -> &[ItemIx] {
        &self.front[n.into_raw() as usize]
    }

    pub fn language_front(&self) -> &[ItemIx] {
        &self.language_front
    }

    #[inline]
    pub fn is_transparent(&self, item: ItemIx) -> bool {
        self.transparent[item]
    }

    #[inline]
    pub fn read_set(&self, item: ItemIx) -> &TerminalIDSet {
        &self.read_set[item]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebnf::Alt;
    use crate::grammar::GrammarDef;

    fn tiny() -> Grammar {
        // S -> A b; A -> epsilon | a
        let mut def = GrammarDef::new();
        def.rule("S", Alt::new(["A", "b"]));
        def.rule("A", Alt::new::<[&str; 0], &str>([]));
        def.rule("A", Alt::new(["a"]));
        def.start("S");
        def.end().unwrap().0
    }

    #[test]
    fn layout_and_successors() {
        let g = tiny();
        let pim = ItemMap::from_grammar(&g);
        let s = g.find_nonterminal("S").unwrap();
        let head = pim.front(s)[0];
        assert_eq!(pim.offset(head), 0);
        assert!(matches!(pim.symbol_at(head), Some(SymbolID::N(_))));
        assert!(matches!(pim.symbol_at(head + 1), Some(SymbolID::T(_))));
        assert_eq!(pim.symbol_at(head + 2), None);
        assert_eq!(pim.head_of(head + 2), head);
    }

    #[test]
    fn transparency_and_read_sets() {
        let g = tiny();
        let pim = ItemMap::from_grammar(&g);
        let s = g.find_nonterminal("S").unwrap();
        let head = pim.front(s)[0];
        let a_tok = g.find_terminal("a").unwrap();
        let b_tok = g.find_terminal("b").unwrap();
        // Before "A b": A may vanish, so both a and b can come first, but
        // the string cannot vanish entirely.
        assert!(!pim.is_transparent(head));
        assert!(pim.read_set(head).contains(a_tok));
        assert!(pim.read_set(head).contains(b_tok));
        // After the dot passes "A", only b remains.
        assert!(!pim.read_set(head + 1).contains(a_tok));
        assert!(pim.is_transparent(head + 2));
    }
}
