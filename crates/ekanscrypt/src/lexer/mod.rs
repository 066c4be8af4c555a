//! Lexical analysis for ekanscrypt source code.
//!
//! The output is deliberately simple compared to the parser: words,
//! numbers, strings, special characters and newlines. Keywords are not
//! recognised here; the grouping engine decides what a word means.
//!
//! ## Structure
//!
//! - `scanner.rs` - `Scanner`, including the exec and import line modes
//! - `token.rs` - `Token` and `TokenKind` definitions
//! - `literals` - number and escape decoding
//!
//! ## Usage
//!
//! ```rust
//! use ekanscrypt::lexer::{tokenize, TokenKind};
//!
//! let tokens = tokenize("x = 42").unwrap();
//! assert_eq!(tokens[2].kind, TokenKind::Number);
//! ```

mod scanner;
mod token;

pub mod literals;

pub use scanner::{SPECIAL1, SPECIAL2, Scanner};
pub use token::{Token, TokenKind};

use crate::error::Result;

/// Tokenizes a complete source text.
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let tokens = Scanner::new(source).scan()?;
    tracing::trace!(count = tokens.len(), "tokenized source");
    Ok(tokens)
}
