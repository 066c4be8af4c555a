//! The precedence table.
//!
//! Rules are listed from strongest to weakest binding. Each one is a full
//! sweep over the sequence before the next one starts, which is what
//! gives an earlier rule higher precedence.

use super::{Parent, grouping, keywords, operators};
use crate::ast::Node;
use crate::error::Result;

/// Sweep direction of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Left to right, left associative
    Forward,
    /// Right to left, right associative
    Backward,
}

/// A rewrite applied at one position.
///
/// Returns how far the sweep advances: `0` to look at the same position
/// again because the neighbours changed, `1` to move on.
pub type Visit = fn(&mut Vec<Node>, usize, Option<Parent>, &[&str]) -> Result<usize>;

/// One row of the precedence table.
pub struct Rule {
    /// Sweep direction
    pub direction: Direction,
    /// Rewrite applied at every position
    pub visit: Visit,
    /// Operator or keyword texts the rewrite reacts to
    pub operators: &'static [&'static str],
}

const fn rule(direction: Direction, visit: Visit, operators: &'static [&'static str]) -> Rule {
    Rule {
        direction,
        visit,
        operators,
    }
}

use Direction::{Backward, Forward};

/// The grouping rules in the order they are applied.
pub static RULES: [Rule; 30] = [
    rule(Forward, grouping::visit_grouping, &["(", "[", "{", "?.", ".", "->"]),
    rule(Forward, grouping::visit_exec, &["exec"]),
    rule(Forward, grouping::visit_import, &["from", "import"]),
    rule(Forward, grouping::visit_string, &[]),
    rule(Backward, operators::visit_unary, &["+", "-", "~", "*", "**", "@"]),
    rule(Backward, operators::visit_unary_fix, &["++", "--"]),
    rule(Forward, operators::visit_binary, &["**"]),
    rule(Forward, operators::visit_binary, &["*", "@", "/", "//", "%"]),
    rule(Forward, operators::visit_binary, &["+", "-"]),
    rule(Forward, operators::visit_binary, &["<<", ">>"]),
    rule(Forward, operators::visit_binary, &["&"]),
    rule(Forward, operators::visit_binary, &["^"]),
    rule(Forward, operators::visit_binary, &["|"]),
    rule(Forward, operators::visit_proc_pipe, &["|>"]),
    rule(
        Forward,
        operators::visit_compare,
        &["<", "<=", ">", ">=", "==", "!=", "===", "!==", "is", "is not"],
    ),
    rule(Backward, operators::visit_unary, &["!"]),
    rule(Forward, operators::visit_binary, &["&&"]),
    rule(Forward, operators::visit_binary, &["||"]),
    rule(Backward, operators::visit_lambda, &["=>"]),
    rule(Forward, operators::visit_slice, &[":"]),
    rule(Forward, operators::visit_ternary, &["?"]),
    rule(Forward, operators::visit_comma_open, &[","]),
    rule(Forward, keywords::visit_keyword, &["var", "final", "static"]),
    rule(Backward, operators::visit_binary, &["in", "not in", "as"]),
    rule(
        Backward,
        operators::visit_binary,
        &[
            "=", "+=", "-=", "*=", "**=", "/=", "//=", "%=", "@=", "|=", "&=", "^=", ">>=", "<<=",
        ],
    ),
    rule(Forward, operators::visit_comma_enclosed, &[","]),
    rule(Forward, keywords::visit_loop_escape, &["continue", "break"]),
    rule(
        Forward,
        keywords::visit_keyword,
        &[
            "if", "else", "for", "do", "while", "switch", "return", "with", "case", "default",
            "try", "catch", "finally", "raise", "yield", "from", "class",
        ],
    ),
    rule(Forward, operators::visit_decorator, &["@"]),
    rule(Forward, operators::visit_separator, &[";"]),
];

/// Applies every rule of the table to `nodes`.
pub fn group(nodes: &mut Vec<Node>, parent: Option<Parent>) -> Result<()> {
    for rule in &RULES {
        let mut i = 0;
        while i < nodes.len() {
            let at = match rule.direction {
                Direction::Forward => i,
                Direction::Backward => nodes.len() - i - 1,
            };
            i += (rule.visit)(nodes, at, parent, rule.operators)?;
        }
    }
    Ok(())
}
