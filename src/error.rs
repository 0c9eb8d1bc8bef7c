//! Typed errors for the parts of the crate that need precise variants.
//!
//! Argument parsing and top-level wiring in `main` use `anyhow` for
//! ergonomic `.context(...)` chains; the matcher core uses these instead
//! since callers (tests, the CLI) branch on *which* compile error occurred.

use thiserror::Error;

/// Errors produced while compiling a pattern into a regex program.
///
/// Mirrors the NFA's fixed-size state budget (§4.4 / §9): once a pattern
/// would need more than 256 states, compilation is refused outright rather
/// than falling back to a heap-allocated state set.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegexError {
    #[error("unmatched '(' in pattern")]
    UnmatchedParen,
    #[error("unmatched ')' in pattern")]
    UnmatchedBracket,
    #[error("unterminated character class in pattern")]
    UnterminatedClass,
    #[error("pattern ends with a trailing backslash")]
    TrailingBackslash,
    #[error("pattern ended unexpectedly")]
    UnexpectedEnd,
    #[error("pattern requires more memory than is available")]
    OutOfMemory,
    #[error("pattern compiles to more than 256 NFA states")]
    TooManyStates,
    #[error("empty pattern is not allowed")]
    EmptyPattern,
}

/// Errors produced while building or evaluating ignore/glob patterns.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GlobError {
    #[error("unterminated character class in glob pattern")]
    UnterminatedClass,
    #[error("dangling escape at end of glob pattern")]
    TrailingEscape,
}

/// Errors surfaced from the configuration layer before any searching starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("pattern must not be empty")]
    EmptyPattern,
    #[error("invalid pattern: {0}")]
    Pattern(#[from] RegexError),
    #[error("invalid glob: {0}")]
    Glob(#[from] GlobError),
    #[error("--threads must be at least 1")]
    ZeroThreads,
}
