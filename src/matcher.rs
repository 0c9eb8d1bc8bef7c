//! Matcher façade (§4.5): picks a pipeline stage at construction time and
//! dispatches every search through it, enforcing word-boundary retries.
//!
//! Case-insensitivity is only carried by the literal and Aho-Corasick
//! engines, which each own a lowercased copy of their pattern(s) (as
//! described in §4.5's data model). The regex engine does not fold case:
//! `-i` on a pattern that compiles to the NFA engine is a known, documented
//! limitation rather than a silent no-op — §4.5 names "literal modes" as
//! the only ones that own a lowercased copy, and the rest of §4.4 never
//! mentions folding inside the NFA itself, so this crate treats regex-mode
//! case-insensitivity as out of scope rather than guessing at semantics
//! the spec never states.

use crate::ac::AhoCorasick;
use crate::error::RegexError;
use crate::literal::{self, Extracted, LiteralPosition};
use crate::regex::ast;
use crate::regex::compiler::{self, Program};
use crate::regex::nfa;
use crate::simd;
use crate::simd::scalar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug)]
enum Engine {
    Literal(Vec<u8>),
    Alternation(AhoCorasick),
    Regex { prog: Program, filter: Extracted },
}

/// Built once from configuration and shared read-only by every worker
/// thread (§3 lifetime note).
#[derive(Debug)]
pub struct Matcher {
    ignore_case: bool,
    word_boundary: bool,
    engine: Engine,
    max_pattern_len: usize,
}

impl Matcher {
    pub fn new(pattern: &[u8], ignore_case: bool, word_boundary: bool) -> Result<Self, RegexError> {
        if pattern.is_empty() {
            return Err(RegexError::EmptyPattern);
        }
        let extracted = literal::extract(pattern);
        let (engine, max_pattern_len) = if let Extracted::Alternation(alt) = &extracted {
            let longest = alt.literals.iter().map(Vec::len).max().unwrap_or(0);
            (Engine::Alternation(AhoCorasick::new(&alt.literals, ignore_case)), longest)
        } else if literal::is_pure_literal(pattern) {
            let lit = if ignore_case {
                pattern.iter().map(|&b| scalar::fold(b)).collect()
            } else {
                pattern.to_vec()
            };
            let len = lit.len();
            (Engine::Literal(lit), len)
        } else {
            let ast = ast::parse(pattern)?;
            let prog = compiler::compile(&ast)?;
            let filter_len = match &extracted {
                Extracted::Literal(li) => li.literal.len(),
                _ => 0,
            };
            (Engine::Regex { prog, filter: extracted }, filter_len)
        };
        Ok(Matcher { ignore_case, word_boundary, engine, max_pattern_len })
    }

    /// Upper bound on how many trailing bytes of `haystack` a single match
    /// might need to have available (used by the streaming reader to size
    /// its cross-refill retention).
    pub fn max_pattern_len(&self) -> usize {
        self.max_pattern_len
    }

    /// Returns the literal needle and case-folding flag when this matcher
    /// is a plain literal with no word-boundary enforcement — the case the
    /// streaming reader's fast full-buffer scan (§4.6) can serve directly,
    /// bypassing per-line iteration.
    pub fn plain_literal(&self) -> Option<PlainLiteral<'_>> {
        if self.word_boundary {
            return None;
        }
        match &self.engine {
            Engine::Literal(lit) => Some(PlainLiteral { needle: lit, ignore_case: self.ignore_case }),
            _ => None,
        }
    }

    pub fn find_first(&self, haystack: &[u8]) -> Option<Match> {
        self.find_first_from(haystack, 0)
    }

    /// Dispatches to the active engine, retrying on word-boundary failure
    /// (§4.5). Generic matches retry at `start + 1`.
    ///
    /// Suffix-anchored regex matches (e.g. `.*SUFFIX`) get different
    /// treatment: since `match_at` always reports the *longest* match
    /// reachable from a given start, and greedy `.*` reaches the same
    /// rightmost suffix occurrence regardless of where the search resumes,
    /// advancing `start` by one byte never changes the outcome. Instead,
    /// on failure the search is re-run against a haystack truncated right
    /// before the rejected occurrence (`end - |suffix|`), which keeps the
    /// window strictly shrinking (guaranteeing termination) while forcing
    /// the greedy simulation to land on the next earlier suffix occurrence
    /// instead of blocking on the rightmost, non-boundary one (§9).
    pub fn find_first_from(&self, haystack: &[u8], start: usize) -> Option<Match> {
        if start > haystack.len() {
            return None;
        }
        if !self.word_boundary {
            return self.raw_find_from(haystack, start);
        }
        if let Engine::Regex { prog, filter: Extracted::Literal(li) } = &self.engine {
            if li.position == LiteralPosition::Suffix {
                return find_suffix_with_boundary(prog, &li.literal, haystack, start);
            }
        }
        let mut pos = start;
        loop {
            if pos > haystack.len() {
                return None;
            }
            let m = self.raw_find_from(haystack, pos)?;
            if boundary_ok(haystack, m.start, m.end) {
                return Some(m);
            }
            pos = m.start + 1;
        }
    }

    fn raw_find_from(&self, haystack: &[u8], start: usize) -> Option<Match> {
        match &self.engine {
            Engine::Literal(lit) => {
                let pos = if self.ignore_case {
                    simd::find_substring_ignore_case(&haystack[start..], lit).map(|i| i + start)
                } else {
                    simd::find_substring_from(haystack, lit, start)
                };
                pos.map(|s| Match { start: s, end: s + lit.len() })
            }
            Engine::Alternation(ac) => {
                ac.find_first_from(haystack, start).map(|m| Match { start: m.start, end: m.end })
            }
            Engine::Regex { prog, filter } => regex_find_from(prog, filter, haystack, start),
        }
    }
}

fn regex_find_from(prog: &Program, filter: &Extracted, input: &[u8], start: usize) -> Option<Match> {
    match filter {
        Extracted::Literal(li) if li.position == LiteralPosition::Prefix => {
            regex_find_prefix(prog, &li.literal, input, start)
        }
        Extracted::Literal(li) if li.position == LiteralPosition::Suffix => {
            regex_find_suffix(prog, &li.literal, input, start)
        }
        Extracted::Literal(li) => regex_find_inner(prog, li, input, start),
        _ => regex_find_bruteforce(prog, input, start),
    }
}

fn regex_find_prefix(prog: &Program, prefix: &[u8], input: &[u8], start: usize) -> Option<Match> {
    let mut search_from = start;
    loop {
        let hit = simd::find_substring_from(input, prefix, search_from)?;
        if let Some(end) = nfa::match_at(prog, input, hit) {
            return Some(Match { start: hit, end });
        }
        search_from = hit + 1;
    }
}

/// Word-boundary-aware suffix search: retries against a progressively
/// truncated view of `haystack` so a rejected (non-boundary) occurrence
/// can never recur, while earlier occurrences remain reachable (see the
/// doc comment on [`Matcher::find_first_from`]).
fn find_suffix_with_boundary(
    prog: &Program,
    suffix: &[u8],
    haystack: &[u8],
    start: usize,
) -> Option<Match> {
    let mut limit = haystack.len();
    loop {
        let m = regex_find_suffix(prog, suffix, &haystack[..limit], start)?;
        if boundary_ok(haystack, m.start, m.end) {
            return Some(m);
        }
        let occurrence_start = m.end - suffix.len();
        if occurrence_start >= limit {
            return None;
        }
        limit = occurrence_start;
    }
}

fn regex_find_suffix(prog: &Program, suffix: &[u8], input: &[u8], start: usize) -> Option<Match> {
    let mut search_from = start;
    loop {
        let p = simd::find_substring_from(input, suffix, search_from)?;
        let needed_end = p + suffix.len();
        let mut s = start;
        while s <= p {
            if let Some(end) = nfa::match_at(prog, input, s) {
                if end >= needed_end {
                    return Some(Match { start: s, end });
                }
            }
            s += 1;
        }
        search_from = p + 1;
    }
}

fn regex_find_inner(
    prog: &Program,
    lit: &crate::literal::LiteralInfo,
    input: &[u8],
    start: usize,
) -> Option<Match> {
    let mut search_from = start;
    loop {
        let p = simd::find_substring_from(input, &lit.literal, search_from)?;
        let lo = p.saturating_sub(lit.min_offset).max(start);
        let mut s = lo;
        while s <= p {
            if let Some(end) = nfa::match_at(prog, input, s) {
                if end > p {
                    return Some(Match { start: s, end });
                }
            }
            s += 1;
        }
        search_from = p + 1;
    }
}

fn regex_find_bruteforce(prog: &Program, input: &[u8], start: usize) -> Option<Match> {
    for s in start..=input.len() {
        if let Some(end) = nfa::match_at(prog, input, s) {
            return Some(Match { start: s, end });
        }
    }
    None
}

/// A byte is a word character iff ASCII alphanumeric, `_`, or has its high
/// bit set (§4.5: all UTF-8 continuation/lead bytes count as word chars).
#[inline]
fn is_word(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

fn boundary_ok(haystack: &[u8], start: usize, end: usize) -> bool {
    let before_ok = start == 0 || !is_word(haystack[start - 1]);
    let after_ok = end == haystack.len() || !is_word(haystack[end]);
    before_ok && after_ok
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn literal_mode_basic() {
        let m = Matcher::new(b"hello", false, false).unwrap();
        let got = m.find_first(b"say hello world").unwrap();
        assert_eq!(got, Match { start: 4, end: 9 });
    }

    #[test]
    fn literal_ignore_case() {
        let m = Matcher::new(b"hello", true, false).unwrap();
        let got = m.find_first(b"HELLO world").unwrap();
        assert_eq!(got, Match { start: 0, end: 5 });
    }

    #[test]
    fn alternation_mode_count_scenario() {
        let m = Matcher::new(b"ERR_SYS|PME_TURN_OFF|LINK_REQ_RST|CFG_BME_EVT", false, false).unwrap();
        let hay = b"ERR_SYS here\nwarn here\nCFG_BME_EVT\n";
        let mut count = 0;
        let mut pos = 0;
        while let Some(hit) = m.find_first_from(hay, pos) {
            count += 1;
            pos = hit.end;
        }
        assert_eq!(count, 2);
    }

    #[test]
    fn regex_mode_basic() {
        let m = Matcher::new(b"fo+", false, false).unwrap();
        assert_eq!(m.find_first(b"xx foooo yy"), Some(Match { start: 3, end: 8 }));
    }

    #[test]
    fn word_boundary_suffix_anchored_retry() {
        // One line, four `_cache`-suffixed words; only `valid_cache` is
        // bounded by non-word characters on both sides under `.*_cache`.
        // The greedy `.*` still pins `start` at 0 (it always reaches back
        // to the earliest reachable position), so the reported match is
        // `[0, 32)` — the whole prefix up to and including `valid_cache`,
        // not just that word. What the suffix-anchored retry guarantees is
        // that `end` lands right after `valid_cache`, not after the later
        // non-boundary `here_cache_end`.
        let m = Matcher::new(b".*_cache", false, true).unwrap();
        let hay = b"xx_cache_y z_cache_w valid_cache here_cache_end";
        let got = m.find_first(hay).unwrap();
        assert_eq!(got.start, 0);
        assert_eq!(got.end, 32);
        assert!(hay[..got.end].ends_with(b"valid_cache"));
    }

    #[test]
    fn word_boundary_rejects_mid_word_literal() {
        let m = Matcher::new(b"cat", false, true).unwrap();
        assert_eq!(m.find_first(b"concatenate"), None);
        assert_eq!(m.find_first(b"a cat sat"), Some(Match { start: 2, end: 5 }));
    }

    #[test]
    fn empty_pattern_rejected() {
        assert_eq!(Matcher::new(b"", false, false).unwrap_err(), RegexError::EmptyPattern);
    }

    #[test]
    fn max_pattern_len_reports_literal_length() {
        let m = Matcher::new(b"hello", false, false).unwrap();
        assert_eq!(m.max_pattern_len(), 5);
    }
}
