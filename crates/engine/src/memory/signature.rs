use analysis::is_builtin;
use python_ast::{TokenKind, is_keyword, tokenize};
use rustc_hash::FxHashMap;
use sha2::{Digest, Sha256};
use smallvec::SmallVec;
use std::fmt;

/// Placeholder for the identifier a pattern is about.
pub const FOCUS: &str = "$T";

/// Structural key of a usage pattern.
///
/// Two snippets share a signature when they differ only in the names of
/// local identifiers and the values of literals.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    digest: [u8; 32],
    shape: String,
}

impl Signature {
    /// Normalizes `snippet` around `focus` and hashes the result.
    pub fn of(snippet: &str, focus: &str) -> Self {
        let shape = normalize(snippet, focus);
        let digest = Sha256::digest(shape.as_bytes()).into();
        Self { digest, shape }
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.digest)
    }

    pub fn shape(&self) -> &str {
        &self.shape
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn normalize(snippet: &str, focus: &str) -> String {
    let snippet = snippet.trim();
    let tokens = tokenize(snippet);
    if tokens.is_empty() {
        return snippet
            .split_whitespace()
            .map(|word| if word == focus { FOCUS } else { word })
            .collect::<Vec<_>>()
            .join(" ");
    }

    let mut positional: FxHashMap<&str, usize> = FxHashMap::default();
    let mut parts: SmallVec<[String; 16]> = SmallVec::new();
    let mut after_dot = false;
    for token in &tokens {
        let name = token.text;
        let part = match token.kind {
            TokenKind::Name if name == focus => FOCUS.to_string(),
            TokenKind::Name if name == "True" || name == "False" => "<bool>".to_string(),
            TokenKind::Name if after_dot || is_keyword(name) || is_builtin(name) => {
                name.to_string()
            }
            TokenKind::Name => {
                let next = positional.len();
                let index = *positional.entry(name).or_insert(next);
                format!("${index}")
            }
            TokenKind::Int => "<int>".to_string(),
            TokenKind::Float => "<float>".to_string(),
            TokenKind::Imaginary => "<complex>".to_string(),
            TokenKind::Str => "<str>".to_string(),
            TokenKind::Bytes => "<bytes>".to_string(),
            TokenKind::Op => name.to_string(),
        };
        after_dot = token.kind == TokenKind::Op && name == ".";
        parts.push(part);
    }
    parts.join(" ")
}
