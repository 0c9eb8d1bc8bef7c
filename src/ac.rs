//! Aho-Corasick automaton for pure-literal alternations (§4.3).
//!
//! Classical two-phase construction: a byte trie, then breadth-first
//! failure-link wiring with output merging. Transitions are stored sparse
//! (`(byte, state)` pairs) to keep memory low for narrow trees, per §9's
//! note that a dense `[256]` table is only worth it above a branching
//! threshold this crate's typical pattern counts never reach.

use std::collections::VecDeque;

use crate::simd;
use crate::simd::scalar;

/// Haystacks at or under this length are lowercased into a stack buffer and
/// run through the automaton directly; larger haystacks fall back to a
/// per-alternative SIMD scan (§4.3).
const STACK_LOWER_LIMIT: usize = 4096;

const ROOT: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcMatch {
    pub start: usize,
    pub end: usize,
    pub pattern: usize,
}

#[derive(Debug, Default)]
struct AcState {
    transitions: Vec<(u8, u32)>,
    fail: u32,
    /// Accepting pattern indices at this state, sorted ascending so ties
    /// at the same end position resolve to "the earliest pattern index".
    outputs: Vec<u32>,
}

impl AcState {
    fn transition(&self, b: u8) -> Option<u32> {
        self.transitions.iter().find(|&&(c, _)| c == b).map(|&(_, s)| s)
    }
}

/// Multi-pattern literal automaton, built once and read-only thereafter.
#[derive(Debug)]
pub struct AhoCorasick {
    states: Vec<AcState>,
    pattern_lens: Vec<usize>,
    /// Original (non-lowercased) patterns, kept for the large-haystack
    /// ignore-case fallback path.
    originals: Vec<Vec<u8>>,
    ignore_case: bool,
}

impl AhoCorasick {
    /// Builds the automaton over `patterns`. Under `ignore_case`, the trie
    /// is built from lowercased copies; `originals` is retained for the
    /// large-haystack fallback.
    pub fn new(patterns: &[Vec<u8>], ignore_case: bool) -> Self {
        let mut states = vec![AcState::default()];
        let pattern_lens = patterns.iter().map(Vec::len).collect();

        for (idx, pattern) in patterns.iter().enumerate() {
            let mut cur = ROOT;
            for &raw in pattern {
                let b = if ignore_case { scalar::fold(raw) } else { raw };
                cur = match states[cur as usize].transition(b) {
                    Some(next) => next,
                    None => {
                        states.push(AcState::default());
                        let next = (states.len() - 1) as u32;
                        states[cur as usize].transitions.push((b, next));
                        next
                    }
                };
            }
            states[cur as usize].outputs.push(idx as u32);
        }

        build_failure_links(&mut states);

        AhoCorasick {
            states,
            pattern_lens,
            originals: patterns.to_vec(),
            ignore_case,
        }
    }

    /// Returns the leftmost match at or after `start`, or `None`.
    pub fn find_first_from(&self, haystack: &[u8], start: usize) -> Option<AcMatch> {
        if start > haystack.len() {
            return None;
        }
        if !self.ignore_case {
            return self.run(&haystack[start..], start);
        }
        let remaining = haystack.len() - start;
        if remaining <= STACK_LOWER_LIMIT {
            let mut buf = [0u8; STACK_LOWER_LIMIT];
            let region = &haystack[start..];
            for (dst, &b) in buf.iter_mut().zip(region) {
                *dst = scalar::fold(b);
            }
            self.run(&buf[..region.len()], start)
        } else {
            self.find_first_large_ignore_case(haystack, start)
        }
    }

    fn run(&self, haystack: &[u8], base: usize) -> Option<AcMatch> {
        let mut state = ROOT;
        for (i, &b) in haystack.iter().enumerate() {
            state = self.step(state, b);
            if let Some(&pattern) = self.states[state as usize].outputs.first() {
                let len = self.pattern_lens[pattern as usize];
                let end = i + 1;
                let start = end - len;
                return Some(AcMatch {
                    start: start + base,
                    end: end + base,
                    pattern: pattern as usize,
                });
            }
        }
        None
    }

    fn step(&self, mut state: u32, b: u8) -> u32 {
        loop {
            if let Some(next) = self.states[state as usize].transition(b) {
                return next;
            }
            if state == ROOT {
                return ROOT;
            }
            state = self.states[state as usize].fail;
        }
    }

    /// For haystacks too large to lowercase onto the stack: scan for each
    /// alternative with the SIMD ignore-case substring finder and keep the
    /// earliest match, breaking ties by pattern index (§4.3).
    fn find_first_large_ignore_case(&self, haystack: &[u8], start: usize) -> Option<AcMatch> {
        let mut best: Option<AcMatch> = None;
        for (idx, pat) in self.originals.iter().enumerate() {
            let Some(pos) = simd::find_substring_ignore_case(&haystack[start..], pat) else {
                continue;
            };
            let s = pos + start;
            let e = s + pat.len();
            let better = match &best {
                None => true,
                Some(b) => s < b.start || (s == b.start && idx < b.pattern),
            };
            if better {
                best = Some(AcMatch { start: s, end: e, pattern: idx });
            }
        }
        best
    }
}

/// Breadth-first failure-link construction (§4.3 phase 2). For a state `s`
/// reached by byte `c` from `p`, `failure(s) = delta(failure(p), c)`,
/// falling back toward the root when no transition exists; `outputs(s)`
/// absorbs `outputs(failure(s))`.
fn build_failure_links(states: &mut [AcState]) {
    let mut queue = VecDeque::new();
    let root_transitions = states[ROOT as usize].transitions.clone();
    for &(_, s) in &root_transitions {
        states[s as usize].fail = ROOT;
        queue.push_back(s);
    }

    while let Some(s) = queue.pop_front() {
        let transitions = states[s as usize].transitions.clone();
        for (c, next) in transitions {
            queue.push_back(next);
            let mut f = states[s as usize].fail;
            let target = loop {
                if let Some(t) = states[f as usize].transition(c) {
                    break t;
                }
                if f == ROOT {
                    break ROOT;
                }
                f = states[f as usize].fail;
            };
            states[next as usize].fail = target;
            let mut merged = states[target as usize].outputs.clone();
            merged.extend(states[next as usize].outputs.iter().copied());
            merged.sort_unstable();
            merged.dedup();
            states[next as usize].outputs = merged;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pats(v: &[&str]) -> Vec<Vec<u8>> {
        v.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    #[test]
    fn finds_leftmost_alternative() {
        let ac = AhoCorasick::new(&pats(&["ERR_SYS", "PME_TURN_OFF", "LINK_REQ_RST", "CFG_BME_EVT"]), false);
        let hay = b"ERR_SYS here\nwarn here\nCFG_BME_EVT\n";
        let m = ac.find_first_from(hay, 0).unwrap();
        assert_eq!(&hay[m.start..m.end], b"ERR_SYS");

        let m2 = ac.find_first_from(hay, m.end).unwrap();
        assert_eq!(&hay[m2.start..m2.end], b"CFG_BME_EVT");
    }

    #[test]
    fn overlapping_suffix_uses_failure_link() {
        // "she" and "he" share a suffix; searching "ushers" must find "he"
        // starting at index 2 after failing out of "she"'s partial match,
        // without re-scanning from scratch.
        let ac = AhoCorasick::new(&pats(&["he", "she", "his", "hers"]), false);
        let hay = b"ushers";
        let m = ac.find_first_from(hay, 0).unwrap();
        assert_eq!(&hay[m.start..m.end], b"he");
    }

    #[test]
    fn ignore_case_small_haystack() {
        let ac = AhoCorasick::new(&pats(&["hello", "world"]), true);
        let m = ac.find_first_from(b"say HELLO there", 0).unwrap();
        assert_eq!(m.start, 4);
        assert_eq!(m.end, 9);
    }

    #[test]
    fn ignore_case_large_haystack_fallback() {
        let ac = AhoCorasick::new(&pats(&["needle"]), true);
        let mut hay = vec![b'x'; STACK_LOWER_LIMIT + 10];
        hay.extend_from_slice(b"NEEDLE");
        let m = ac.find_first_from(&hay, 0).unwrap();
        assert_eq!(m.start, STACK_LOWER_LIMIT + 10);
        assert_eq!(m.end, STACK_LOWER_LIMIT + 16);
    }

    #[test]
    fn no_match_returns_none() {
        let ac = AhoCorasick::new(&pats(&["zzz"]), false);
        assert_eq!(ac.find_first_from(b"abc", 0), None);
    }

    #[test]
    fn find_first_from_respects_start_offset() {
        let ac = AhoCorasick::new(&pats(&["ab"]), false);
        let hay = b"abab";
        assert_eq!(ac.find_first_from(hay, 0), Some(AcMatch { start: 0, end: 2, pattern: 0 }));
        assert_eq!(ac.find_first_from(hay, 1), Some(AcMatch { start: 2, end: 4, pattern: 0 }));
    }
}
