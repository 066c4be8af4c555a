//! Error types shared by every stage of the pipeline.

use std::fmt;

use thiserror::Error;

/// A message pinned to a source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Human readable description
    pub message: String,
    /// 1-based line number
    pub line: u32,
    /// 0-based column
    pub column: u32,
}

impl Diagnostic {
    /// Creates a new diagnostic.
    pub fn new(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at line {} column {}",
            self.message, self.line, self.column
        )
    }
}

/// Errors raised while tokenizing, grouping, compiling or running a unit.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed lexeme (bad escape, unterminated string, ...)
    #[error("lex error: {0}")]
    Lex(Diagnostic),
    /// Grouping or scope resolution failure
    #[error("syntax error: {0}")]
    Parse(Diagnostic),
    /// Node that cannot be translated to bytecode
    #[error("compile error: {0}")]
    Compile(Diagnostic),
    /// Compiler invariant violation (layout did not converge, stack underflow)
    #[error("internal compiler error: {0}")]
    Internal(String),
    /// Uncaught exception raised by script code
    #[error("{0}")]
    Runtime(String),
    /// Module could not be located or did not produce a namespace
    #[error("import error: {0}")]
    Import(String),
    /// Invalid configuration file or environment override
    #[error("config error: {0}")]
    Config(String),
    /// File system failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for ekanscrypt operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn lex(message: impl Into<String>, line: u32, column: u32) -> Self {
        Error::Lex(Diagnostic::new(message, line, column))
    }

    pub(crate) fn parse(message: impl Into<String>, line: u32, column: u32) -> Self {
        Error::Parse(Diagnostic::new(message, line, column))
    }

    pub(crate) fn compile(message: impl Into<String>, line: u32, column: u32) -> Self {
        Error::Compile(Diagnostic::new(message, line, column))
    }

    /// Returns the source position attached to this error, if any.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            Error::Lex(d) | Error::Parse(d) | Error::Compile(d) => Some(d),
            _ => None,
        }
    }

    /// Renders the error with a source excerpt and a caret under the column.
    ///
    /// Errors without a position render as their plain message.
    pub fn render(&self, path: &str, source: &str) -> String {
        let Some(diag) = self.diagnostic() else {
            return self.to_string();
        };

        let mut out = format!(
            "Syntax Error in File {} at line {} column {}\n {}\n",
            path, diag.line, diag.column, diag.message
        );

        let lines: Vec<&str> = source.lines().collect();
        let line = diag.line as usize;
        let first = line.saturating_sub(2).max(1);
        let last = (line + 2).min(lines.len());
        for number in first..=last {
            if let Some(text) = lines.get(number - 1) {
                out.push_str(&format!(" {:4}: {}\n", number, text));
            }
            if number == line {
                out.push_str(&" ".repeat(7 + diag.column as usize));
                out.push_str("^\n");
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_points_at_column() {
        let err = Error::parse("else without matching if", 3, 4);
        let source = "a = 1\nb = 2\nc = else\nd = 4\ne = 5\nf = 6";
        let text = err.render("demo.es", source);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Syntax Error in File demo.es at line 3 column 4");
        assert_eq!(lines[1], " else without matching if");
        assert_eq!(lines[2], "    1: a = 1");
        assert_eq!(lines[4], "    3: c = else");
        assert_eq!(lines[5], "           ^");
        assert_eq!(lines.last().copied(), Some("    5: e = 5"));
    }

    #[test]
    fn test_render_without_position() {
        let err = Error::Internal("failed to finalize".into());
        assert_eq!(
            err.render("x.es", ""),
            "internal compiler error: failed to finalize"
        );
    }
}
