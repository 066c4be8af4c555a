//! Lexeme definitions.

use std::fmt;

/// The different kinds of lexemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// A word: identifier, keyword, or an exec/import argument
    Text,
    /// Anything starting with a decimal digit, validated by the compiler
    Number,
    /// Plain quoted string
    String,
    /// `f"..."` string, expanded at runtime
    FormatString,
    /// `b"..."` string
    ByteString,
    /// `r"..."` string, compiled to a regex at runtime
    RegexString,
    /// `g"..."` string, expanded to matching paths at runtime
    GlobString,
    /// Character that never combines: `{}[](),~;:` and a lone `?`
    Special1,
    /// Operator built from `+-*/&|^=<>%!@`, plus `?.`
    Special2,
    /// End of a source line
    Newline,
    /// `${name}` inside an exec line
    Substitution,
}

/// A lexeme produced by the scanner.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of lexeme
    pub kind: TokenKind,
    /// 1-based line of the first character
    pub line: u32,
    /// 0-based column of the first character
    pub column: u32,
    /// Decoded text
    pub text: String,
}

impl Token {
    /// Creates a new token.
    pub fn new(kind: TokenKind, line: u32, column: u32, text: impl Into<String>) -> Self {
        Self {
            kind,
            line,
            column,
            text: text.into(),
        }
    }

    /// True for a text lexeme equal to `word`.
    pub fn is_text(&self, word: &str) -> bool {
        self.kind == TokenKind::Text && self.text == word
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>4}:{:<3} {:?} {:?}",
            self.line, self.column, self.kind, self.text
        )
    }
}
