//! Generalized (non-deterministic) parsing engines.
//!
//! Two strategies over the same split-carrying tables. The brute-force
//! cactus stack invokes semantic actions immediately and so requires them to
//! be pure; the graph-structured stack defers actions into a shared forest
//! and runs them once the parse commits. The grammar's declared discipline
//! picks the engine.

pub mod brute;
pub mod forest;
pub mod gss;

pub use brute::BruteParser;
pub use gss::GssParser;

/// Failures specific to the generalized engines.
#[derive(Debug, thiserror::Error)]
pub enum GeneralizedError {
    #[error("parser died midway at something ungrammatical")]
    DiedMidway,

    #[error("parser recognized a viable prefix, but not a complete sentence")]
    IncompleteSentence,

    #[error(
        "reduction budget exhausted without consuming input; \
         the grammar likely has hidden left recursion, which the \
         brute-force engine cannot handle"
    )]
    HiddenLeftRecursion,

    #[error("ambiguous parse at nonterminal {0:?}, which the grammar does not permit")]
    Ambiguous(String),

    #[error("cyclic derivation: the input has infinitely many parses")]
    CyclicDerivation,

    #[error("driver does not recognize constructor {0:?}")]
    UnknownConstructor(String),

    #[error("instruction not supported by the generalized engines")]
    UnsupportedInstruction,

    #[error("no start symbol named {0:?}")]
    UnknownStart(String),
}
