//! Flat token view of a snippet, read from the leaves of the concrete tree.
//!
//! Unlike [`crate::parse_module`] this never fails: partial lines such as
//! `if x:` with no body still yield every token they contain.

use tree_sitter::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifiers and keywords.
    Name,
    Int,
    Float,
    Imaginary,
    /// String and f-string literals, as one token each.
    Str,
    Bytes,
    Op,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
}

fn classify(text: &str) -> TokenKind {
    let mut chars = text.chars();
    let first = chars.next().unwrap_or(' ');
    let numeric = first.is_ascii_digit()
        || (first == '.' && chars.next().is_some_and(|c| c.is_ascii_digit()));
    if numeric {
        let lower = text.to_ascii_lowercase();
        if lower.ends_with('j') {
            TokenKind::Imaginary
        } else if !lower.starts_with("0x") && lower.contains(['.', 'e']) {
            TokenKind::Float
        } else {
            TokenKind::Int
        }
    } else if first == '_' || first.is_alphabetic() {
        TokenKind::Name
    } else {
        TokenKind::Op
    }
}

fn leaf<'a>(node: Node<'_>, source: &'a str) -> Option<Token<'a>> {
    if node.is_missing() || matches!(node.kind(), "comment" | "line_continuation") {
        return None;
    }
    let text = source.get(node.byte_range())?.trim();
    if text.is_empty() {
        return None;
    }
    let kind = if node.kind() == "string" {
        let prefix = text.find(['\'', '"']).unwrap_or(0);
        if text[..prefix].to_ascii_lowercase().contains('b') {
            TokenKind::Bytes
        } else {
            TokenKind::Str
        }
    } else {
        classify(text)
    };
    Some(Token { kind, text })
}

/// Tokens of `source` in order. String literals are not split.
pub fn tokenize(source: &str) -> Vec<Token<'_>> {
    let Ok(tree) = crate::parse_tree(source) else {
        return Vec::new();
    };
    let mut tokens = Vec::new();
    let mut cursor = tree.walk();
    loop {
        let node = cursor.node();
        let atomic = node.kind() == "string" || node.child_count() == 0;
        if atomic {
            tokens.extend(leaf(node, source));
        } else if cursor.goto_first_child() {
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                return tokens;
            }
        }
    }
}
