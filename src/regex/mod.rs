//! The bounded Thompson-NFA regex engine (§4.4): recursive-descent parser
//! (`ast`), character-class bitmaps (`charclass`), fragment-based NFA
//! compiler (`compiler`), and allocation-free epsilon-closure simulation
//! (`nfa`).

pub mod ast;
pub mod charclass;
pub mod compiler;
pub mod nfa;
