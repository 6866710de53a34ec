//! Foldline HTML Tokenizer
//!
//! Lossless HTML5 tokenizer: every token carries the exact source text it
//! was read from.

mod tokenizer;

pub use tokenizer::{SpannedToken, Token, Tokenizer};
