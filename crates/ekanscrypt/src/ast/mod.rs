//! Syntax tree produced by the grouping engine.
//!
//! The tree is deliberately uniform: every node carries a kind, a text
//! payload and an ordered child list. Child order is meaningful, e.g. a
//! [`NodeKind::Branch`] is always `[test, when_true, when_false]`.
//! Passes rewrite nodes in place, so the same type is used from the
//! first grouping sweep through scope resolution.

use std::fmt;

use crate::lexer::{Token, TokenKind};

/// Keywords recognised when converting lexemes into nodes.
pub const KEYWORDS: &[&str] = &[
    "true", "false", "null", "nan", "infinity", "import", "from", "as", "if", "else", "switch",
    "case", "default", "return", "while", "do", "for", "break", "continue", "with", "in", "try",
    "catch", "finally", "raise", "class", "static", "const", "final", "var", "yield", "exec",
];

/// The container built by a literal display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildKind {
    /// `[a, b]`
    List,
    /// `()`
    Tuple,
    /// `{a, b}` or `{}`
    Set,
    /// `{k: v}`
    Map,
}

/// Every kind of node in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    // Leaves converted from lexemes
    /// Identifier
    Label,
    /// Numeric literal, still in source form
    Number,
    /// Plain string
    String,
    /// `f"..."`
    FormatString,
    /// `b"..."`
    ByteString,
    /// `r"..."`
    RegexString,
    /// `g"..."`
    GlobString,
    /// `${name}` inside an exec line
    Substitution,
    /// A reserved word not yet consumed by a rule
    Keyword,
    /// Operator built from a special-1 character, or a bracket group `()`
    Operator1,
    /// Operator built from special-2 characters
    Operator2,
    /// End of line, removed by the last sweep
    Newline,
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `nan`
    Nan,
    /// `infinity`
    Infinity,
    /// Placeholder for an absent operand
    Empty,

    // Intermediate forms removed by normalisation
    /// Argument list of a call or subscript
    Args,
    /// Pair produced by a comma
    TupleSeparator,

    // Expressions
    /// `a.b`: `[object, AttrLabel]`
    Attr,
    /// Right side of an attribute reference
    AttrLabel,
    /// `a?.b`: `[object, AttrLabel?]`
    OptionalAttr,
    /// `[callee, args...]`
    Call,
    /// `[object, index...]`
    Subscr,
    /// Container display
    Build(BuildKind),
    /// Tuple formed by commas
    Tuple,
    /// `[start|Empty, stop|Empty, ...]`
    Slice,
    /// `[test, when_true, when_false]`
    Branch,
    /// Chained comparison `[a, op, b, op, c ...]`
    MultiCompare,
    /// Unary operator before its operand
    Prefix,
    /// `x++` / `x--`
    Postfix,
    /// A label that refers to a variable of an enclosing body
    Reference,
    /// `[ParamList, LambdaClosure, body]`
    Lambda,
    /// Parameters of a lambda
    ParamList,
    /// References captured from the enclosing body
    LambdaClosure,
    /// Cell variables declared by a body
    Closure,
    /// Statement sequence
    Block,
    /// `[a, b, ..., "for"/"if" clause chain, body]`
    ListComprehension,
    /// Set comprehension
    SetComprehension,
    /// Dict comprehension
    DictComprehension,
    /// `yield x`
    Yield,
    /// `yield from x`
    YieldFrom,
    /// Exec line or `|>` pipe
    ExecProcess,

    // Declarations
    /// `var x`
    DefineVar,
    /// `final x`
    DefineFinal,
    /// `static x`
    DefineStatic,
    /// `[ClassParamList, Lambda]`
    Class,
    /// Base classes
    ClassParamList,
    /// Sets `__module__` and `__qualname__`
    ClassInit,
    /// Returns `__classcell__`
    ClassInit2,
    /// `[level, name, fromlist]`
    Import,

    // Statements
    /// `[value?]`
    Return,
    /// `[value?]`
    Raise,
    /// `[depth?]`
    Break,
    /// `[depth?]`
    Continue,
    /// `[test, body]`
    While,
    /// `[body, test]`
    DoWhile,
    /// `[target, sequence, body]`
    Foreach,
    /// `[value, cases...]`
    Switch,
    /// `[value, body?]`
    SwitchCase,
    /// `[body?]`
    SwitchDefault,
    /// `[items, body]`
    With,
    /// `[body, catch..., finally?]`
    TryCatch,
}

/// A node of the syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// What this node is
    pub kind: NodeKind,
    /// Payload: identifier, literal text, operator, or name
    pub text: String,
    /// 1-based source line
    pub line: u32,
    /// 0-based source column
    pub column: u32,
    /// Ordered operands
    pub children: Vec<Node>,
}

impl Node {
    /// Creates a leaf node.
    pub fn new(kind: NodeKind, text: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            column,
            children: Vec::new(),
        }
    }

    /// Creates a node positioned at `at`.
    pub fn at(kind: NodeKind, text: impl Into<String>, at: &Node) -> Self {
        Self::new(kind, text, at.line, at.column)
    }

    /// Builder: replaces the child list.
    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    /// Converts a lexeme into a node. Word classification happens in
    /// [`from_tokens`], which needs lookahead.
    fn from_token(token: Token) -> Self {
        let kind = match token.kind {
            TokenKind::Text => NodeKind::Label,
            TokenKind::Number => NodeKind::Number,
            TokenKind::String => NodeKind::String,
            TokenKind::FormatString => NodeKind::FormatString,
            TokenKind::ByteString => NodeKind::ByteString,
            TokenKind::RegexString => NodeKind::RegexString,
            TokenKind::GlobString => NodeKind::GlobString,
            TokenKind::Special1 => NodeKind::Operator1,
            TokenKind::Special2 => NodeKind::Operator2,
            TokenKind::Newline => NodeKind::Newline,
            TokenKind::Substitution => NodeKind::Substitution,
        };
        Self::new(kind, token.text, token.line, token.column)
    }

    /// True for an ungrouped operator with the given text.
    pub fn is_operator(&self, text: &str) -> bool {
        matches!(self.kind, NodeKind::Operator1 | NodeKind::Operator2) && self.text == text
    }

    /// True for an unconsumed keyword with the given text.
    pub fn is_keyword(&self, text: &str) -> bool {
        self.kind == NodeKind::Keyword && self.text == text
    }

    /// True for a `;` or `,` separator.
    pub fn is_separator(&self) -> bool {
        self.kind == NodeKind::Operator1 && (self.text == ";" || self.text == ",")
    }

    /// True when a call or subscript may follow this node.
    pub fn is_callable(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Label
                | NodeKind::Attr
                | NodeKind::OptionalAttr
                | NodeKind::Subscr
                | NodeKind::Call
        )
    }

    /// True for a string literal of any flavour.
    pub fn is_string(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::String
                | NodeKind::FormatString
                | NodeKind::ByteString
                | NodeKind::RegexString
                | NodeKind::GlobString
        )
    }

    /// Renders the tree as a compact s-expression.
    pub fn to_sexpr(&self) -> String {
        let mut out = String::new();
        self.write_sexpr(&mut out);
        out
    }

    fn write_sexpr(&self, out: &mut String) {
        if self.children.is_empty() {
            if let Some(leaf) = self.leaf_text() {
                out.push_str(&leaf);
                return;
            }
        }
        out.push('(');
        out.push_str(&self.tag());
        for child in &self.children {
            out.push(' ');
            child.write_sexpr(out);
        }
        out.push(')');
    }

    fn leaf_text(&self) -> Option<String> {
        let text = match self.kind {
            NodeKind::Label
            | NodeKind::Number
            | NodeKind::Keyword
            | NodeKind::Operator1
            | NodeKind::Operator2 => self.text.clone(),
            NodeKind::Reference => format!("&{}", self.text),
            NodeKind::AttrLabel => format!(".{}", self.text),
            NodeKind::String => format!("{:?}", self.text),
            NodeKind::FormatString => format!("f{:?}", self.text),
            NodeKind::ByteString => format!("b{:?}", self.text),
            NodeKind::RegexString => format!("r{:?}", self.text),
            NodeKind::GlobString => format!("g{:?}", self.text),
            NodeKind::Substitution => format!("${{{}}}", self.text),
            NodeKind::Newline => "\\n".to_string(),
            NodeKind::True => "true".to_string(),
            NodeKind::False => "false".to_string(),
            NodeKind::Null => "null".to_string(),
            NodeKind::Nan => "nan".to_string(),
            NodeKind::Infinity => "infinity".to_string(),
            NodeKind::Empty => "_".to_string(),
            _ => return None,
        };
        Some(text)
    }

    fn tag(&self) -> String {
        let name = match self.kind {
            NodeKind::Operator1 | NodeKind::Operator2 | NodeKind::Keyword => {
                return self.text.clone();
            }
            NodeKind::Prefix => return format!("pre{}", self.text),
            NodeKind::Postfix => return format!("post{}", self.text),
            NodeKind::Build(BuildKind::List) => "list",
            NodeKind::Build(BuildKind::Tuple) => "tuple",
            NodeKind::Build(BuildKind::Set) => "set",
            NodeKind::Build(BuildKind::Map) => "map",
            NodeKind::Args => "args",
            NodeKind::TupleSeparator => ",",
            NodeKind::Attr => "attr",
            NodeKind::OptionalAttr => "?.",
            NodeKind::Call => "call",
            NodeKind::Subscr => "subscr",
            NodeKind::Tuple => "tuple",
            NodeKind::Slice => "slice",
            NodeKind::Branch => "if",
            NodeKind::MultiCompare => "cmp",
            NodeKind::Lambda => "lambda",
            NodeKind::ParamList => "params",
            NodeKind::LambdaClosure => "freevars",
            NodeKind::Closure => "cellvars",
            NodeKind::Block => "block",
            NodeKind::ListComprehension => "listcomp",
            NodeKind::SetComprehension => "setcomp",
            NodeKind::DictComprehension => "dictcomp",
            NodeKind::Yield => "yield",
            NodeKind::YieldFrom => "yieldfrom",
            NodeKind::ExecProcess => "exec",
            NodeKind::DefineVar => "var",
            NodeKind::DefineFinal => "final",
            NodeKind::DefineStatic => "static",
            NodeKind::Class => "class",
            NodeKind::ClassParamList => "bases",
            NodeKind::ClassInit => "classinit",
            NodeKind::ClassInit2 => "classcell",
            NodeKind::Import => "import",
            NodeKind::Return => "return",
            NodeKind::Raise => "raise",
            NodeKind::Break => "break",
            NodeKind::Continue => "continue",
            NodeKind::While => "while",
            NodeKind::DoWhile => "do",
            NodeKind::Foreach => "for",
            NodeKind::Switch => "switch",
            NodeKind::SwitchCase => "case",
            NodeKind::SwitchDefault => "default",
            NodeKind::With => "with",
            NodeKind::TryCatch => "try",
            _ => return self.leaf_text().unwrap_or_default(),
        };
        let shows_text = matches!(
            self.kind,
            NodeKind::Lambda
                | NodeKind::Class
                | NodeKind::ClassInit
                | NodeKind::ClassInit2
                | NodeKind::Import
                | NodeKind::ExecProcess
        );
        if shows_text && !self.text.is_empty() {
            format!("{} {}", name, self.text)
        } else {
            name.to_string()
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_tree(f, 0)
    }
}

impl Node {
    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(
            f,
            "{:indent$}{:?} {:?} @{}:{}",
            "",
            self.kind,
            self.text,
            self.line,
            self.column,
            indent = depth * 2
        )?;
        for child in &self.children {
            child.fmt_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

/// Converts a lexeme stream into leaf nodes, classifying words.
///
/// `is not` and `not in` become single operators, `not` alone becomes `!`.
/// Words on an `exec` line are arguments and stay labels.
pub fn from_tokens(tokens: Vec<Token>) -> Vec<Node> {
    let mut nodes = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();
    let mut in_exec = false;

    while let Some(token) = iter.next() {
        if in_exec && ends_exec(&token) {
            in_exec = false;
        }
        if token.kind != TokenKind::Text || in_exec {
            nodes.push(Node::from_token(token));
            continue;
        }

        let mut node = Node::from_token(token);
        match node.text.as_str() {
            "exec" => {
                node.kind = NodeKind::Keyword;
                in_exec = true;
            }
            "true" | "True" => node.kind = NodeKind::True,
            "false" | "False" => node.kind = NodeKind::False,
            "null" | "None" => node.kind = NodeKind::Null,
            "nan" => node.kind = NodeKind::Nan,
            "infinity" => node.kind = NodeKind::Infinity,
            "as" | "in" => node.kind = NodeKind::Operator2,
            "is" => {
                if iter.peek().is_some_and(|next| next.is_text("not")) {
                    iter.next();
                    node.text = "is not".to_string();
                }
                node.kind = NodeKind::Operator2;
            }
            "not" => {
                if iter.peek().is_some_and(|next| next.is_text("in")) {
                    iter.next();
                    node.text = "not in".to_string();
                    node.kind = NodeKind::Operator2;
                } else {
                    node.text = "!".to_string();
                    node.kind = NodeKind::Operator1;
                }
            }
            word if KEYWORDS.contains(&word) => node.kind = NodeKind::Keyword,
            _ => {}
        }
        nodes.push(node);
    }
    nodes
}

fn ends_exec(token: &Token) -> bool {
    match token.kind {
        TokenKind::Newline => true,
        TokenKind::Special1 => matches!(token.text.as_str(), ";" | "," | ")" | "]" | "}"),
        TokenKind::Special2 => token.text == "|>",
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn kinds(source: &str) -> Vec<(NodeKind, String)> {
        from_tokens(tokenize(source).unwrap())
            .into_iter()
            .map(|n| (n.kind, n.text))
            .collect()
    }

    #[test]
    fn test_word_classification() {
        let nodes = kinds("x if true null None nan");
        assert_eq!(nodes[0].0, NodeKind::Label);
        assert_eq!(nodes[1].0, NodeKind::Keyword);
        assert_eq!(nodes[2].0, NodeKind::True);
        assert_eq!(nodes[3].0, NodeKind::Null);
        assert_eq!(nodes[4].0, NodeKind::Null);
        assert_eq!(nodes[5].0, NodeKind::Nan);
    }

    #[test]
    fn test_compound_word_operators() {
        let nodes = kinds("a is not b not in c not d");
        assert_eq!(nodes[1], (NodeKind::Operator2, "is not".to_string()));
        assert_eq!(nodes[3], (NodeKind::Operator2, "not in".to_string()));
        assert_eq!(nodes[5], (NodeKind::Operator1, "!".to_string()));
        assert_eq!(nodes.len(), 7);
    }

    #[test]
    fn test_sexpr() {
        let node = Node::new(NodeKind::Operator2, "+", 1, 0).with_children(vec![
            Node::new(NodeKind::Label, "a", 1, 0),
            Node::new(NodeKind::Number, "1", 1, 4),
        ]);
        assert_eq!(node.to_sexpr(), "(+ a 1)");
    }
}
