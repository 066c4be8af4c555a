//! The scanner that produces lexemes from source text.

use unicode_xid::UnicodeXID;

use super::literals::{decode_escape, escape_width, simple_escape};
use super::{Token, TokenKind};
use crate::error::{Error, Result};

/// Characters that never combine with their neighbours.
pub const SPECIAL1: &str = "{}[](),~;:";
/// Characters that may combine into multi-character operators.
pub const SPECIAL2: &str = "+-*/&|^=<>%!@";

const NUMBER_CHARS: &str = "0123456789nxob_.jtgmkABCDEFabcdef";

/// Every operator a run of special-2 characters may split into.
const OPERATORS: &[&str] = &[
    "+", "-", "*", "/", "%", "&", "|", "^", "!", "@", "=", "<", ">", "==", "===", "!=", "!==",
    "<=", ">=", "<<", ">>", "**", "//", "+=", "-=", "*=", "**=", "/=", "//=", "%=", "@=", "|=",
    "&=", "^=", ">>=", "<<=", "&&", "||", "=>", "|>", "++", "--", "->",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Exec,
    Import,
}

/// A scanner that tokenizes ekanscrypt source code.
pub struct Scanner<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    column: u32,
    mode: Mode,
    tokens: Vec<Token>,
}

impl<'a> Scanner<'a> {
    /// Creates a new scanner for the given source code.
    pub fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().peekable(),
            line: 1,
            column: 0,
            mode: Mode::Normal,
            tokens: Vec::new(),
        }
    }

    /// Consumes the scanner, returning every lexeme in the source.
    pub fn scan(mut self) -> Result<Vec<Token>> {
        while self.peek().is_some() {
            match self.mode {
                Mode::Normal => self.scan_normal()?,
                Mode::Exec => self.scan_exec()?,
                Mode::Import => self.scan_import()?,
            }
        }
        Ok(self.tokens)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn peek_next(&self) -> Option<char> {
        let mut iter = self.chars.clone();
        iter.next();
        iter.next()
    }

    fn push(&mut self, kind: TokenKind, line: u32, column: u32, text: impl Into<String>) {
        self.tokens.push(Token::new(kind, line, column, text));
    }

    fn push_newline(&mut self) {
        let line = self.line;
        self.advance();
        self.push(TokenKind::Newline, line, 0, "");
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::lex(message, self.line, self.column)
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn skip_line_continuation(&mut self) -> Result<()> {
        self.advance();
        if self.peek() != Some('\n') {
            return Err(self.error("expected newline"));
        }
        self.advance();
        Ok(())
    }

    fn scan_normal(&mut self) -> Result<()> {
        let Some(ch) = self.peek() else {
            return Ok(());
        };
        let (line, column) = (self.line, self.column);

        match ch {
            '\n' => self.push_newline(),
            ' ' | '\t' | '\r' => {
                self.advance();
            }
            '#' => self.skip_comment(),
            '\\' => self.skip_line_continuation()?,
            '\'' | '"' => {
                self.advance();
                self.scan_string(TokenKind::String, ch, line, column)?;
            }
            '?' => {
                self.advance();
                if self.peek() == Some('.') {
                    self.advance();
                    self.push(TokenKind::Special2, line, column, "?.");
                } else {
                    self.push(TokenKind::Special1, line, column, "?");
                }
            }
            '.' => {
                if self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
                    self.scan_number(line, column);
                } else {
                    self.advance();
                    self.push(TokenKind::Special1, line, column, ".");
                }
            }
            c if SPECIAL1.contains(c) => {
                self.advance();
                self.push(TokenKind::Special1, line, column, c.to_string());
            }
            c if SPECIAL2.contains(c) => self.scan_operators()?,
            c if c.is_ascii_digit() => self.scan_number(line, column),
            c if is_id_start(c) => self.scan_word(line, column)?,
            c => return Err(self.error(format!("unexpected character '{}'", c))),
        }
        Ok(())
    }

    fn scan_number(&mut self, line: u32, column: u32) {
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if !NUMBER_CHARS.contains(ch) {
                break;
            }
            text.push(ch);
            self.advance();
        }
        self.push(TokenKind::Number, line, column, text);
    }

    /// Splits a run of special-2 characters into the longest valid operators.
    fn scan_operators(&mut self) -> Result<()> {
        let (line, column) = (self.line, self.column);
        let mut run = String::new();
        while let Some(ch) = self.peek().filter(|c| SPECIAL2.contains(*c)) {
            run.push(ch);
            self.advance();
        }

        let mut rest = run.as_str();
        let mut offset = 0;
        while !rest.is_empty() {
            let op = OPERATORS
                .iter()
                .filter(|op| rest.starts_with(**op))
                .max_by_key(|op| op.len())
                .ok_or_else(|| Error::lex("unexpected operator", line, column + offset))?;
            self.push(TokenKind::Special2, line, column + offset, *op);
            offset += op.len() as u32;
            rest = &rest[op.len()..];
        }
        Ok(())
    }

    fn scan_word(&mut self, line: u32, column: u32) -> Result<()> {
        let mut text = String::new();
        while let Some(ch) = self.peek().filter(|c| is_id_continue(*c)) {
            text.push(ch);
            self.advance();
        }

        if let Some(quote @ ('\'' | '"')) = self.peek() {
            let kind = match text.as_str() {
                "f" => Some(TokenKind::FormatString),
                "b" => Some(TokenKind::ByteString),
                "r" => Some(TokenKind::RegexString),
                "g" => Some(TokenKind::GlobString),
                _ => None,
            };
            if let Some(kind) = kind {
                self.advance();
                return self.scan_string(kind, quote, line, column);
            }
        }

        if self.mode == Mode::Normal && self.peek() == Some(' ') {
            let after_yield = self
                .tokens
                .last()
                .is_some_and(|prev| prev.is_text("yield"));
            match text.as_str() {
                "exec" => self.mode = Mode::Exec,
                "import" | "from" if !after_yield => self.mode = Mode::Import,
                _ => {}
            }
        }

        self.push(TokenKind::Text, line, column, text);
        Ok(())
    }

    /// Reads a quoted string; the opening quote is already consumed.
    fn scan_string(&mut self, kind: TokenKind, quote: char, line: u32, column: u32) -> Result<()> {
        let mut text = String::new();
        loop {
            let ch = match self.advance() {
                None | Some('\n') => {
                    return Err(Error::lex("unterminated string", line, column));
                }
                Some(ch) => ch,
            };

            if ch == quote {
                break;
            }
            if ch != '\\' {
                text.push(ch);
                continue;
            }

            let esc = self
                .advance()
                .ok_or_else(|| Error::lex("unterminated string", line, column))?;
            if esc == quote {
                text.push(esc);
            } else if let Some(decoded) = simple_escape(esc) {
                text.push(decoded);
            } else if let Some((width, radix)) = escape_width(esc) {
                let mut digits = String::new();
                for _ in 0..width {
                    match self.advance() {
                        Some(d) => digits.push(d),
                        None => return Err(self.error("unexpected end of sequence")),
                    }
                }
                let decoded = decode_escape(&digits, radix).ok_or_else(|| {
                    self.error(format!("invalid encoding '\\{}{}'", esc, digits))
                })?;
                text.push(decoded);
            } else {
                text.push('\\');
                text.push(esc);
            }
        }
        self.push(kind, line, column, text);
        Ok(())
    }

    fn scan_exec(&mut self) -> Result<()> {
        let Some(ch) = self.peek() else {
            return Ok(());
        };
        let (line, column) = (self.line, self.column);

        match ch {
            '\n' => {
                self.mode = Mode::Normal;
                self.push_newline();
            }
            ' ' | '\t' | '\r' => {
                self.advance();
            }
            '#' => {
                self.mode = Mode::Normal;
                self.skip_comment();
            }
            '\\' => self.skip_line_continuation()?,
            ',' | ';' | ')' | ']' | '}' => {
                self.mode = Mode::Normal;
                self.advance();
                self.push(TokenKind::Special1, line, column, ch.to_string());
            }
            '$' if self.peek_next() == Some('{') => self.scan_substitution()?,
            '<' | '>' => {
                self.advance();
                let mut op = ch.to_string();
                if self.peek() == Some(ch) {
                    self.advance();
                    op.push(ch);
                }
                self.push(TokenKind::Special2, line, column, op);
            }
            '|' => {
                self.advance();
                if self.peek() != Some('>') {
                    return Err(self.error("unexpected operator"));
                }
                self.advance();
                self.mode = Mode::Normal;
                self.push(TokenKind::Special2, line, column, "|>");
            }
            '\'' | '"' => {
                self.advance();
                self.scan_string(TokenKind::String, ch, line, column)?;
            }
            _ => {
                let mut text = String::new();
                while let Some(c) = self.peek() {
                    if c.is_whitespace()
                        || ",;)]}<>|#'\"".contains(c)
                        || (c == '$' && self.peek_next() == Some('{'))
                    {
                        break;
                    }
                    text.push(c);
                    self.advance();
                }
                if let Some(quote @ ('\'' | '"')) = self.peek() {
                    let kind = match text.as_str() {
                        "f" => Some(TokenKind::FormatString),
                        "b" => Some(TokenKind::ByteString),
                        "r" => Some(TokenKind::RegexString),
                        "g" => Some(TokenKind::GlobString),
                        _ => None,
                    };
                    if let Some(kind) = kind {
                        self.advance();
                        return self.scan_string(kind, quote, line, column);
                    }
                }
                self.push(TokenKind::Text, line, column, text);
            }
        }
        Ok(())
    }

    fn scan_substitution(&mut self) -> Result<()> {
        let (line, column) = (self.line, self.column);
        self.advance();
        self.advance();
        let mut name = String::new();
        loop {
            match self.advance() {
                Some('}') => break,
                None | Some('#' | ';' | '\n') => {
                    return Err(Error::lex("unexpected end of substitution", line, column));
                }
                Some(c) => name.push(c),
            }
        }
        self.push(TokenKind::Substitution, line, column, name);
        Ok(())
    }

    fn scan_import(&mut self) -> Result<()> {
        let Some(ch) = self.peek() else {
            return Ok(());
        };
        let (line, column) = (self.line, self.column);

        match ch {
            '\n' => {
                self.mode = Mode::Normal;
                self.push_newline();
            }
            ' ' | '\t' | '\r' | ',' => {
                self.advance();
            }
            '#' => {
                self.mode = Mode::Normal;
                self.skip_comment();
            }
            '\\' => self.skip_line_continuation()?,
            ';' | ')' | ']' | '}' => {
                self.mode = Mode::Normal;
                self.advance();
                self.push(TokenKind::Special1, line, column, ch.to_string());
            }
            _ => {
                let mut text = String::new();
                while let Some(c) = self.peek() {
                    if c.is_whitespace() || ",;)]}#".contains(c) {
                        break;
                    }
                    text.push(c);
                    self.advance();
                }
                self.push(TokenKind::Text, line, column, text);
            }
        }
        Ok(())
    }
}

fn is_id_start(ch: char) -> bool {
    ch == '_' || UnicodeXID::is_xid_start(ch)
}

fn is_id_continue(ch: char) -> bool {
    UnicodeXID::is_xid_continue(ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> Vec<(TokenKind, String)> {
        Scanner::new(source)
            .scan()
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    fn texts(source: &str) -> Vec<String> {
        scan(source).into_iter().map(|(_, text)| text).collect()
    }

    #[test]
    fn test_simple_tokens() {
        let tokens = scan("{ } ( ) ~");
        assert!(tokens.iter().all(|(kind, _)| *kind == TokenKind::Special1));
        assert_eq!(texts("{ } ( ) ~"), vec!["{", "}", "(", ")", "~"]);
    }

    #[test]
    fn test_operator_splitting() {
        assert_eq!(texts("a=-1"), vec!["a", "=", "-", "1"]);
        assert_eq!(texts("x**=2"), vec!["x", "**=", "2"]);
        assert_eq!(texts("a!==b"), vec!["a", "!==", "b"]);
        assert_eq!(texts("a=--b"), vec!["a", "=", "--", "b"]);
        assert_eq!(texts("f=>x"), vec!["f", "=>", "x"]);
        assert_eq!(texts("a->b"), vec!["a", "->", "b"]);
        assert_eq!(texts("a?.b"), vec!["a", "?.", "b"]);
        assert_eq!(texts("a ? b : c"), vec!["a", "?", "b", ":", "c"]);
    }

    #[test]
    fn test_positions() {
        let tokens = Scanner::new("a = 1\n  bb").scan().unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 0));
        assert_eq!((tokens[2].line, tokens[2].column), (1, 4));
        assert_eq!(tokens[3].kind, TokenKind::Newline);
        assert_eq!((tokens[4].line, tokens[4].column), (2, 2));
    }

    #[test]
    fn test_numbers() {
        let tokens = scan("42 3.14 .5 0xff 1_000kb");
        assert!(tokens.iter().all(|(kind, _)| *kind == TokenKind::Number));
        assert_eq!(texts("42 3.14 .5 0xff 1_000kb"), vec!["42", "3.14", ".5", "0xff", "1_000kb"]);
    }

    #[test]
    fn test_strings() {
        let tokens = scan(r#""hello" 'wo\'rld' f"${x}" b"raw" r"\d+" g"*.rs""#);
        assert_eq!(tokens[0], (TokenKind::String, "hello".to_string()));
        assert_eq!(tokens[1], (TokenKind::String, "wo'rld".to_string()));
        assert_eq!(tokens[2], (TokenKind::FormatString, "${x}".to_string()));
        assert_eq!(tokens[3], (TokenKind::ByteString, "raw".to_string()));
        assert_eq!(tokens[4], (TokenKind::RegexString, "\\d+".to_string()));
        assert_eq!(tokens[5], (TokenKind::GlobString, "*.rs".to_string()));
    }

    #[test]
    fn test_escapes() {
        assert_eq!(texts(r#""a\tb\x41B\o103""#), vec!["a\tbABC"]);
        let err = Scanner::new(r#""\xzz""#).scan().unwrap_err();
        assert!(err.to_string().contains("invalid encoding '\\xzz'"));
    }

    #[test]
    fn test_unterminated_string() {
        let err = Scanner::new("x = \"abc\n").scan().unwrap_err();
        assert!(err.to_string().contains("unterminated string"));
    }

    #[test]
    fn test_comments_and_continuation() {
        assert_eq!(texts("a # note\nb"), vec!["a", "", "b"]);
        assert_eq!(texts("a + \\\n b"), vec!["a", "+", "b"]);
        let err = Scanner::new("a \\ b").scan().unwrap_err();
        assert!(err.to_string().contains("expected newline"));
    }

    #[test]
    fn test_exec_mode() {
        let tokens = scan("exec ls -la ${dir} > out.txt; x");
        assert_eq!(tokens[0], (TokenKind::Text, "exec".to_string()));
        assert_eq!(tokens[1], (TokenKind::Text, "ls".to_string()));
        assert_eq!(tokens[2], (TokenKind::Text, "-la".to_string()));
        assert_eq!(tokens[3], (TokenKind::Substitution, "dir".to_string()));
        assert_eq!(tokens[4], (TokenKind::Special2, ">".to_string()));
        assert_eq!(tokens[5], (TokenKind::Text, "out.txt".to_string()));
        assert_eq!(tokens[6], (TokenKind::Special1, ";".to_string()));
        assert_eq!(tokens[7], (TokenKind::Text, "x".to_string()));
    }

    #[test]
    fn test_exec_pipe() {
        assert_eq!(
            texts("exec ls |> exec grep foo"),
            vec!["exec", "ls", "|>", "exec", "grep", "foo"]
        );
        let err = Scanner::new("exec ls | grep").scan().unwrap_err();
        assert!(err.to_string().contains("unexpected operator"));
    }

    #[test]
    fn test_import_mode() {
        assert_eq!(
            texts("from ..pkg.mod import a, b as c\nx"),
            vec!["from", "..pkg.mod", "import", "a", "b", "as", "c", "", "x"]
        );
        assert_eq!(texts("yield from gen"), vec!["yield", "from", "gen"]);
    }
}
