//! Line heuristics for replies that are not usable JSON.

use analysis::normalize_type_name;
use regex::Regex;
use rustc_hash::FxHashSet;
use std::sync::LazyLock;

use super::Candidate;

const TYPE: &str = r"[A-Za-z_][\w.]*(?:\[[^\]\n]*\])?(?:\s*\|\s*[A-Za-z_][\w.]*(?:\[[^\]\n]*\])?)*";

static QUOTED_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([A-Za-z_]\w*)"\s*:\s*"([^"\n]+)""#).expect("valid pair pattern")
});
static COLON_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^\s*(?:[-*•]\s*|\d+[.)]\s*)?`?([A-Za-z_]\w*)`?\s*:\s*`?({TYPE})`?\s*[,.;]?\s*$"
    ))
    .expect("valid colon pattern")
});
static IS_A: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"`?\b([A-Za-z_]\w*)`?\s+is\s+an?\s+`?([A-Za-z_][\w.]*(?:\[[^\]\n]*\])?)`?")
        .expect("valid is-a pattern")
});
static OF_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"`?\b([A-Za-z_]\w*)`?\s+is\s+of\s+type\s+`?({TYPE})`?"
    ))
    .expect("valid of-type pattern")
});

/// Keys of the structured reply format, never identifiers.
const RESERVED: &[&str] = &[
    "inferences",
    "explanations",
    "explanation",
    "confidence",
    "function_suggestions",
    "params",
    "return",
    "success",
    "error",
    "type",
    "reasoning",
    "note",
];

const STOPWORDS: &[&str] = &[
    "it", "this", "that", "which", "there", "what", "here", "each", "one", "variable",
    "value", "type", "result", "answer", "also", "and", "or", "so",
];

/// Types accepted from free prose, where any noun could follow "is a".
const PROSE_TYPES: &[&str] = &[
    "str", "int", "float", "bool", "bytes", "complex", "list", "dict", "set", "tuple",
    "frozenset", "None", "Callable", "Any", "TextIO",
];

fn is_identifier_candidate(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    !RESERVED.contains(&lower.as_str()) && !STOPWORDS.contains(&lower.as_str())
}

fn prose_type(raw: &str) -> Option<String> {
    let normalized = normalize_type_name(raw);
    let base = normalized.split('[').next().unwrap_or_default();
    let known = PROSE_TYPES.contains(&base)
        || base.chars().next().is_some_and(|c| c.is_ascii_uppercase());
    known.then_some(normalized)
}

/// Scans `raw` line by line for `identifier -> type` statements.
pub fn heuristic_candidates(raw: &str, confidence: f64) -> Vec<Candidate> {
    let mut seen = FxHashSet::default();
    let mut found = Vec::new();
    let mut push = |name: &str, ty: String| {
        if ty.is_empty() || !is_identifier_candidate(name) || !seen.insert(name.to_string()) {
            return;
        }
        found.push(Candidate {
            identifier: name.to_string(),
            inferred_type: ty,
            confidence,
            explanation: None,
        });
    };

    for line in raw.lines() {
        for caps in QUOTED_PAIR.captures_iter(line) {
            push(&caps[1], normalize_type_name(&caps[2]));
        }
        if let Some(caps) = COLON_LINE.captures(line) {
            push(&caps[1], normalize_type_name(&caps[2]));
        }
        for caps in OF_TYPE.captures_iter(line) {
            push(&caps[1], normalize_type_name(&caps[2]));
        }
        for caps in IS_A.captures_iter(line) {
            if let Some(ty) = prose_type(&caps[2]) {
                push(&caps[1], ty);
            }
        }
    }
    found
}
