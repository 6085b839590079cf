//! Python syntax tree for TypeSage, built on tree-sitter-python.
//!
//! [`parse_module`] runs the tree-sitter grammar and lowers the concrete
//! tree into the typed [`ast`]. Any error or missing node in the concrete
//! tree fails the whole parse, reporting the earliest such node.

pub mod ast;
pub mod error;
mod lower;
pub mod token;
pub mod unparse;

pub use ast::*;
pub use error::ParseError;
pub use lower::MAX_NESTING;
pub use token::{Token, TokenKind, tokenize};
pub use unparse::unparse;

use tree_sitter::{Node, Parser, Tree};

/// Hard keywords. These can never be used as identifiers.
pub const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

pub(crate) fn parse_tree(source: &str) -> Result<Tree, ParseError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| ParseError::new(format!("Python grammar unavailable: {e}"), 1, 1))?;
    parser
        .parse(source, None)
        .ok_or_else(|| ParseError::new("parser produced no tree", 1, 1))
}

/// Parses a whole module.
pub fn parse_module(source: &str) -> Result<Module, ParseError> {
    let tree = parse_tree(source)?;
    let root = tree.root_node();
    let mut lowering = lower::Lowering::new(source);
    if let Some(node) = first_error(root) {
        let message = if node.is_missing() {
            format!("expected `{}`", node.kind())
        } else {
            let snippet: String = source
                .get(node.byte_range())
                .unwrap_or_default()
                .lines()
                .next()
                .unwrap_or_default()
                .chars()
                .take(20)
                .collect();
            format!("invalid syntax near `{}`", snippet.trim())
        };
        return Err(lowering.error_at(node, message));
    }
    lowering.module(root)
}

/// The first error or missing node in document order.
fn first_error(root: Node<'_>) -> Option<Node<'_>> {
    if !root.has_error() {
        return None;
    }
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}
