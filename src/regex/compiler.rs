//! Thompson construction: compiles an [`Ast`] into a flat [`Program`] of
//! NFA states (§4.4).
//!
//! Each state stores up to two outgoing transitions, used only by
//! `Epsilon` "split" nodes produced by alternation and quantifiers.
//! Fragments carry a list of dangling "out" slots that get patched once
//! the following fragment's start state is known; quantifiers always
//! allocate a fresh split/skip state rather than re-using an already
//! patched slot, so no `out` list ever aliases a slot twice.

use crate::error::RegexError;
use crate::regex::ast::Ast;
use crate::regex::charclass::CharClass;

/// Maximum number of NFA states a compiled program may have. Matching
/// relies on a stack-allocated 4x64-bit state set, so this is a hard
/// ceiling rather than a soft default (§3, §9).
pub const MAX_STATES: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum StateKind {
    Any,
    Char(u8),
    Class(CharClass),
    /// Epsilon transition. A plain epsilon uses only `out1`; a "split"
    /// (alternation/quantifier branch point) uses both.
    Epsilon,
    Match,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NfaState {
    pub kind: StateKind,
    pub out1: usize,
    pub out2: usize,
}

/// Sentinel meaning "no transition wired yet".
pub const NONE: usize = usize::MAX;

#[derive(Debug, PartialEq)]
pub struct Program {
    pub states: Vec<NfaState>,
    pub start: usize,
}

#[derive(Clone, Copy)]
enum Slot {
    Out1(usize),
    Out2(usize),
}

struct Frag {
    start: usize,
    outs: Vec<Slot>,
}

struct Builder {
    states: Vec<NfaState>,
}

impl Builder {
    fn push(&mut self, kind: StateKind) -> Result<usize, RegexError> {
        if self.states.len() >= MAX_STATES {
            return Err(RegexError::TooManyStates);
        }
        let idx = self.states.len();
        self.states.push(NfaState { kind, out1: NONE, out2: NONE });
        Ok(idx)
    }

    fn patch(&mut self, outs: &[Slot], target: usize) {
        for &slot in outs {
            match slot {
                Slot::Out1(s) => self.states[s].out1 = target,
                Slot::Out2(s) => self.states[s].out2 = target,
            }
        }
    }

    fn compile(&mut self, ast: &Ast) -> Result<Frag, RegexError> {
        match ast {
            Ast::Empty | Ast::StartAnchor | Ast::EndAnchor => {
                // Anchors are parsed but compiled as unconditional epsilon
                // transitions (documented limitation, §9 open question:
                // choice (a), preserve the simplification).
                let s = self.push(StateKind::Epsilon)?;
                Ok(Frag { start: s, outs: vec![Slot::Out1(s)] })
            }
            Ast::Literal(b) => {
                let s = self.push(StateKind::Char(*b))?;
                Ok(Frag { start: s, outs: vec![Slot::Out1(s)] })
            }
            Ast::Any => {
                let s = self.push(StateKind::Any)?;
                Ok(Frag { start: s, outs: vec![Slot::Out1(s)] })
            }
            Ast::Class(cls) => {
                let s = self.push(StateKind::Class(cls.clone()))?;
                Ok(Frag { start: s, outs: vec![Slot::Out1(s)] })
            }
            Ast::Concat(parts) => self.compile_concat(parts),
            Ast::Alternate(branches) => self.compile_alt(branches),
            Ast::Star(inner) => self.compile_star(inner),
            Ast::Plus(inner) => self.compile_plus(inner),
            Ast::Question(inner) => self.compile_question(inner),
        }
    }

    fn compile_concat(&mut self, parts: &[Ast]) -> Result<Frag, RegexError> {
        let mut iter = parts.iter();
        let first = iter.next().expect("non-empty concat");
        let mut frag = self.compile(first)?;
        for part in iter {
            let next = self.compile(part)?;
            self.patch(&frag.outs, next.start);
            frag = Frag { start: frag.start, outs: next.outs };
        }
        Ok(frag)
    }

    fn compile_alt(&mut self, branches: &[Ast]) -> Result<Frag, RegexError> {
        if branches.len() == 1 {
            return self.compile(&branches[0]);
        }
        let head = self.compile(&branches[0])?;
        let tail = self.compile_alt(&branches[1..])?;
        let split = self.push(StateKind::Epsilon)?;
        self.states[split].out1 = head.start;
        self.states[split].out2 = tail.start;
        let mut outs = head.outs;
        outs.extend(tail.outs);
        Ok(Frag { start: split, outs })
    }

    /// `e*`: greedy zero-or-more. A split tries the body first (out1),
    /// falling through (out2) once the body is exhausted; the body loops
    /// back into the same split.
    fn compile_star(&mut self, inner: &Ast) -> Result<Frag, RegexError> {
        let body = self.compile(inner)?;
        let split = self.push(StateKind::Epsilon)?;
        self.states[split].out1 = body.start;
        self.patch(&body.outs, split);
        Ok(Frag { start: split, outs: vec![Slot::Out2(split)] })
    }

    /// `e+`: one-or-more. The body runs once, then a trailing split either
    /// loops back into the body or falls through.
    fn compile_plus(&mut self, inner: &Ast) -> Result<Frag, RegexError> {
        let body = self.compile(inner)?;
        let split = self.push(StateKind::Epsilon)?;
        self.states[split].out1 = body.start;
        self.patch(&body.outs, split);
        Ok(Frag { start: body.start, outs: vec![Slot::Out2(split)] })
    }

    /// `e?`: the body is optional; a split either enters it or skips it.
    fn compile_question(&mut self, inner: &Ast) -> Result<Frag, RegexError> {
        let body = self.compile(inner)?;
        let split = self.push(StateKind::Epsilon)?;
        self.states[split].out1 = body.start;
        let mut outs = body.outs;
        outs.push(Slot::Out2(split));
        Ok(Frag { start: split, outs })
    }
}

pub fn compile(ast: &Ast) -> Result<Program, RegexError> {
    let mut builder = Builder { states: Vec::new() };
    let frag = builder.compile(ast)?;
    let match_state = builder.push(StateKind::Match)?;
    builder.patch(&frag.outs, match_state);
    Ok(Program { states: builder.states, start: frag.start })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::regex::ast::parse;

    fn compile_str(pattern: &[u8]) -> Program {
        compile(&parse(pattern).unwrap()).unwrap()
    }

    #[test]
    fn compiles_small_program() {
        let prog = compile_str(b"ab");
        assert!(prog.states.len() <= 4);
    }

    #[test]
    fn out_slots_never_double_patched() {
        // Exercises quantifier nesting heavily enough that a naive
        // implementation reusing patched slots would panic or silently
        // wire the wrong transition.
        let prog = compile_str(b"(a*b+)?c*");
        for s in &prog.states {
            match s.kind {
                StateKind::Match => {}
                _ => assert_ne!(s.out1, NONE, "state left unpatched"),
            }
        }
    }

    #[test]
    fn too_many_states_is_rejected() {
        // 90 repetitions of an alternation-heavy group comfortably exceeds
        // 256 states.
        let mut pat = Vec::new();
        for _ in 0..90 {
            pat.extend_from_slice(b"(a|b|c)");
        }
        let ast = parse(&pat).unwrap();
        assert_eq!(compile(&ast), Err(RegexError::TooManyStates));
    }
}
