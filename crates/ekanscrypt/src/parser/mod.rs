//! The grouping engine: turns a flat lexeme stream into a syntax forest.
//!
//! There is no grammar in the usual sense. Instead an ordered table of
//! rewrite rules is applied to a flat `Vec<Node>`, one full sweep per
//! rule. Each rule looks for its operator or keyword and pulls the
//! neighbouring nodes in as children. Earlier rules bind tighter.
//!
//! ## Structure
//!
//! - `rules.rs` - the precedence table and the sweep driver
//! - `cursor.rs` - taking and peeking neighbours
//! - `grouping.rs` - brackets, attributes, exec lines, imports
//! - `operators.rs` - unary, binary, lambdas, slices, commas
//! - `keywords.rs` - statements, comprehensions, classes
//! - `normalize.rs` - passes that settle brackets and tuples
//!
//! ## Usage
//!
//! ```rust
//! use ekanscrypt::lexer::tokenize;
//! use ekanscrypt::parser::parse;
//!
//! let forest = parse(tokenize("x = 1 + 2 * 3").unwrap()).unwrap();
//! assert_eq!(forest[0].to_sexpr(), "(= x (+ 1 (* 2 3)))");
//! ```

mod cursor;
mod grouping;
mod keywords;
mod normalize;
mod operators;
pub mod rules;

#[cfg(test)]
mod tests;

use crate::ast::{self, Node, NodeKind};
use crate::error::Result;
use crate::lexer::Token;

/// The bracket a sequence is being grouped inside of.
///
/// Commas and `for` behave differently depending on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    /// `( ... )` that is not a call
    Paren,
    /// `f( ... )`
    Call,
    /// `x[ ... ]`
    Subscr,
    /// `[ ... ]` list display
    List,
    /// `{ ... }`
    Block,
}

/// Groups a lexeme stream into a forest of top-level statements.
pub fn parse(tokens: Vec<Token>) -> Result<Vec<Node>> {
    let mut nodes = ast::from_tokens(tokens);
    rules::group(&mut nodes, None)?;

    let mut module = Node::new(NodeKind::Block, "", 1, 0).with_children(nodes);
    normalize::walk(&mut module)?;
    normalize::finish(&mut module);

    tracing::debug!(statements = module.children.len(), "grouped module");
    Ok(module.children)
}
