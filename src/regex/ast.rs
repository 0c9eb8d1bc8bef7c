//! Recursive-descent parser from a raw byte pattern to an [`Ast`].
//!
//! Supported surface (§4.4): literals, `.`, character classes `[...]`/
//! `[^...]`/ranges, escapes `\n \r \t \s` (plain space) and a generic
//! escape (`\x` -> literal `x`), concatenation, alternation `|`, groups
//! `(...)`, and the quantifiers `* + ?`. `^`/`$` are parsed but compiled
//! to unconditional epsilon transitions (documented limitation, §9).

use crate::error::RegexError;
use crate::regex::charclass::CharClass;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ast {
    Empty,
    Literal(u8),
    Any,
    Class(CharClass),
    StartAnchor,
    EndAnchor,
    Concat(Vec<Ast>),
    Alternate(Vec<Ast>),
    Star(Box<Ast>),
    Plus(Box<Ast>),
    Question(Box<Ast>),
}

pub fn parse(pattern: &[u8]) -> Result<Ast, RegexError> {
    if pattern.is_empty() {
        return Err(RegexError::EmptyPattern);
    }
    let mut p = Parser { input: pattern, pos: 0 };
    let ast = p.parse_alternation()?;
    if p.pos != p.input.len() {
        // Only reachable via an unmatched ')'.
        return Err(RegexError::UnmatchedBracket);
    }
    Ok(ast)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn parse_alternation(&mut self) -> Result<Ast, RegexError> {
        let mut branches = vec![self.parse_concat()?];
        while self.peek() == Some(b'|') {
            self.bump();
            branches.push(self.parse_concat()?);
        }
        Ok(if branches.len() == 1 {
            branches.pop().expect("non-empty")
        } else {
            Ast::Alternate(branches)
        })
    }

    fn parse_concat(&mut self) -> Result<Ast, RegexError> {
        let mut parts = Vec::new();
        loop {
            match self.peek() {
                None | Some(b'|') | Some(b')') => break,
                _ => parts.push(self.parse_quantified()?),
            }
        }
        Ok(match parts.len() {
            0 => Ast::Empty,
            1 => parts.pop().expect("non-empty"),
            _ => Ast::Concat(parts),
        })
    }

    fn parse_quantified(&mut self) -> Result<Ast, RegexError> {
        let atom = self.parse_atom()?;
        Ok(match self.peek() {
            Some(b'*') => {
                self.bump();
                Ast::Star(Box::new(atom))
            }
            Some(b'+') => {
                self.bump();
                Ast::Plus(Box::new(atom))
            }
            Some(b'?') => {
                self.bump();
                Ast::Question(Box::new(atom))
            }
            _ => atom,
        })
    }

    fn parse_atom(&mut self) -> Result<Ast, RegexError> {
        match self.bump().ok_or(RegexError::UnexpectedEnd)? {
            b'(' => {
                let inner = self.parse_alternation()?;
                if self.bump() != Some(b')') {
                    return Err(RegexError::UnmatchedParen);
                }
                Ok(inner)
            }
            b')' => Err(RegexError::UnmatchedBracket),
            b'.' => Ok(Ast::Any),
            b'^' => Ok(Ast::StartAnchor),
            b'$' => Ok(Ast::EndAnchor),
            b'[' => self.parse_class(),
            b'\\' => self.parse_escape(),
            b'*' | b'+' | b'?' => Err(RegexError::UnexpectedEnd),
            b => Ok(Ast::Literal(b)),
        }
    }

    fn parse_escape(&mut self) -> Result<Ast, RegexError> {
        let b = self.bump().ok_or(RegexError::TrailingBackslash)?;
        Ok(match b {
            b'n' => Ast::Literal(b'\n'),
            b'r' => Ast::Literal(b'\r'),
            b't' => Ast::Literal(b'\t'),
            b's' => Ast::Literal(b' '),
            other => Ast::Literal(other),
        })
    }

    fn parse_class(&mut self) -> Result<Ast, RegexError> {
        let mut cls = CharClass::new();
        if self.peek() == Some(b'^') {
            self.bump();
            cls.negate();
        }
        let mut first = true;
        loop {
            match self.peek() {
                None => return Err(RegexError::UnterminatedClass),
                Some(b']') if !first => {
                    self.bump();
                    break;
                }
                _ => {}
            }
            first = false;
            let lo = self.class_char()?;
            if self.peek() == Some(b'-')
                && self.input.get(self.pos + 1).is_some_and(|&b| b != b']')
            {
                self.bump(); // consume '-'
                let hi = self.class_char()?;
                cls.add_range(lo, hi);
            } else {
                cls.add_char(lo);
            }
        }
        Ok(Ast::Class(cls))
    }

    fn class_char(&mut self) -> Result<u8, RegexError> {
        match self.bump().ok_or(RegexError::UnterminatedClass)? {
            b'\\' => self.bump().ok_or(RegexError::TrailingBackslash),
            b => Ok(b),
        }
    }
}
