//! Source rewriting for the annotate operation.
//!
//! Only single-line `def` headers without any annotation and single-target
//! `name = value` assignments are touched. Everything else is left as is.

use analysis::{SymbolDetails, SymbolKind};
use regex::Regex;
use std::fmt::Write;
use std::sync::LazyLock;

use crate::types::{AnalysisResult, FunctionSuggestion};

static DEF_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\()").expect("valid def pattern")
});

static HEADER_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*):(.*)$").expect("valid header tail pattern"));

/// Parameter types guessed from common names, checked in order.
const NAME_HINTS: &[(&str, &str)] = &[
    ("numbers", "list[int | float]"),
    ("items", "list"),
    ("data", "list"),
    ("text", "str"),
    ("value", "int | float"),
    ("count", "int"),
    ("index", "int"),
    ("name", "str"),
    ("path", "str"),
    ("file", "str"),
    ("content", "str"),
];

pub(crate) fn parameter_hint(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    if let Some((_, hint)) = NAME_HINTS.iter().find(|(p, _)| lower.contains(p)) {
        return hint;
    }
    if name.len() > 1 && name.ends_with('s') {
        return "list";
    }
    "Any"
}

/// Characters of `text` outside brackets and string literals, with their
/// byte offsets. A closing bracket with no opener counts as outside.
fn top_level(text: &str) -> Vec<(usize, char)> {
    let mut found = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (offset, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' if depth > 0 => depth -= 1,
            _ if depth == 0 => found.push((offset, c)),
            _ => {}
        }
    }
    found
}

fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (offset, _) in top_level(text).into_iter().filter(|(_, c)| *c == separator) {
        parts.push(&text[start..offset]);
        start = offset + separator.len_utf8();
    }
    parts.push(&text[start..]);
    parts
}

/// Whether `text` contains a plain `=` outside brackets and strings, as in
/// the tail of a chained assignment.
fn has_top_level_assign(text: &str) -> bool {
    top_level(text).into_iter().filter(|(_, c)| *c == '=').any(|(offset, _)| {
        let before = text[..offset].chars().next_back();
        let after = text[offset + 1..].chars().next();
        after != Some('=')
            && !matches!(
                before,
                Some('=' | '!' | '<' | '>' | ':' | '+' | '-' | '*' | '/' | '%' | '&' | '|' | '^' | '@')
            )
    })
}

fn annotate_parameter(param: &str, suggestion: Option<&FunctionSuggestion>) -> String {
    let trimmed = param.trim();
    let (name, default) = match top_level(trimmed).into_iter().find(|(_, c)| *c == '=') {
        Some((at, _)) => (trimmed[..at].trim(), Some(trimmed[at + 1..].trim())),
        None => (trimmed, None),
    };
    let plain = !name.is_empty()
        && name.chars().all(|c| c.is_alphanumeric() || c == '_')
        && name != "self"
        && name != "cls";
    if !plain {
        return trimmed.to_string();
    }
    let hint = suggestion
        .and_then(|s| s.param(name))
        .map(|p| p.inferred_type.as_str())
        .unwrap_or_else(|| parameter_hint(name));
    match default {
        Some(default) => format!("{name}: {hint} = {default}"),
        None => format!("{name}: {hint}"),
    }
}

/// Rewrites a `def` header, or `None` when it already carries annotations
/// or does not fit on one line.
fn annotate_header(
    line: &str,
    function: &str,
    inferred_return: Option<&str>,
    suggestion: Option<&FunctionSuggestion>,
) -> Option<String> {
    let caps = DEF_HEADER.captures(line)?;
    if &caps[2] != function {
        return None;
    }
    let open = caps.get(0)?.end();
    let inner = &line[open..];
    let (close, _) = top_level(inner).into_iter().find(|(_, c)| *c == ')')?;
    let tail = HEADER_TAIL.captures(&inner[close + 1..])?;

    let params = &inner[..close];
    let parts: Vec<&str> = split_top_level(params, ',')
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect();
    if parts.iter().any(|p| top_level(p).iter().any(|(_, c)| *c == ':')) {
        return None;
    }
    let params = if parts.is_empty() {
        params.to_string()
    } else {
        parts
            .into_iter()
            .map(|p| annotate_parameter(p, suggestion))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let returns = inferred_return
        .or_else(|| suggestion?.returns.as_ref().map(|r| r.inferred_type.as_str()))
        .unwrap_or("Any");
    Some(format!(
        "{}{}){} -> {returns}:{}",
        &caps[1], params, &tail[1], &tail[2]
    ))
}

/// Adds `value_type` to a single-target `name = value` line. Chained and
/// augmented assignments are left alone.
fn annotate_assignment(line: &str, variable: &str, value_type: &str) -> Option<String> {
    let pattern = format!(r"^(\s*){}(\s*=[^=].*)$", regex::escape(variable));
    let re = Regex::new(&pattern).ok()?;
    let caps = re.captures(line)?;
    let rest = &caps[2];
    let value = &rest[rest.find('=')? + 1..];
    if has_top_level_assign(value) {
        return None;
    }
    Some(format!("{}{variable}: {value_type}{}", &caps[1], rest))
}

fn header_comment(result: &AnalysisResult) -> String {
    let mut comment = String::from("# Inferred types for unresolved names:\n");
    for assertion in &result.assertions {
        let _ = writeln!(
            comment,
            "#   {}: {} ({}, confidence {:.2})",
            assertion.identifier, assertion.inferred_type, assertion.provenance, assertion.confidence
        );
    }
    comment
}

/// Returns the annotated source and how many declarations were annotated.
///
/// Parameter types come from `suggestions` when one names the parameter,
/// otherwise from name hints. Return types prefer what the body shows,
/// then the suggestion.
pub fn annotate_source(
    code: &str,
    result: &AnalysisResult,
    suggestions: &[FunctionSuggestion],
) -> (String, usize) {
    let mut lines: Vec<String> = code.lines().map(str::to_string).collect();
    let mut count = 0;

    for symbol in &result.symbols {
        let Some(index) = symbol.decl_line.checked_sub(1) else {
            continue;
        };
        let Some(line) = lines.get(index) else {
            continue;
        };

        let annotated = match (&symbol.kind, &symbol.details) {
            (
                SymbolKind::Function,
                SymbolDetails::Function {
                    returns: None,
                    inferred_return,
                    ..
                },
            ) => annotate_header(
                line,
                &symbol.name,
                inferred_return.as_deref(),
                suggestions
                    .iter()
                    .find(|s| s.function == symbol.name && s.line == symbol.decl_line),
            ),
            (
                SymbolKind::Variable,
                SymbolDetails::Variable {
                    annotation: None,
                    value_type: Some(value_type),
                },
            ) if !line.contains(&format!("{}:", symbol.name)) => {
                annotate_assignment(line, &symbol.name, value_type)
            }
            _ => None,
        };

        if let Some(annotated) = annotated {
            lines[index] = annotated;
            count += 1;
        }
    }

    let mut annotated = String::new();
    if !result.assertions.is_empty() {
        annotated.push_str(&header_comment(result));
    }
    annotated.push_str(&lines.join("\n"));
    if code.ends_with('\n') {
        annotated.push('\n');
    }
    (annotated, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Fingerprint;
    use crate::types::{Provenance, SourceUnit, TypeAssertion};

    fn annotate(code: &str) -> (String, usize) {
        let result =
            AnalysisResult::from_static(Fingerprint::of(&SourceUnit::new(code)), analysis::analyze_source(code));
        annotate_source(code, &result, &[])
    }

    #[test]
    fn test_parameter_hints() {
        assert_eq!(parameter_hint("numbers"), "list[int | float]");
        assert_eq!(parameter_hint("file_path"), "str");
        assert_eq!(parameter_hint("row_count"), "int");
        assert_eq!(parameter_hint("users"), "list");
        assert_eq!(parameter_hint("x"), "Any");
    }

    #[test]
    fn test_function_headers() {
        let code = "def greet(name, repeat=2):\n    return f\"hi {name}\"\n\n\ndef noop(self, *args, **kwargs):\n    pass\n";
        let (annotated, count) = annotate(code);
        assert_eq!(count, 2);
        assert_eq!(
            annotated,
            "def greet(name: str, repeat: Any = 2) -> str:\n    return f\"hi {name}\"\n\n\ndef noop(self, *args, **kwargs) -> None:\n    pass\n"
        );
    }

    #[test]
    fn test_existing_annotations_are_kept() {
        let code = "def f(a: int):\n    return a\n\n\ndef g(b) -> int:\n    return b\n\n\nx: int = 1\n";
        let (annotated, count) = annotate(code);
        assert_eq!(count, 0);
        assert_eq!(annotated, code);
    }

    #[test]
    fn test_variables_with_known_types() {
        let code = "limit = 10\nratio = 0.5\nlabel = compute()\nflags = [1, 2]\n";
        let (annotated, count) = annotate(code);
        assert_eq!(count, 3);
        assert_eq!(
            annotated,
            "limit: int = 10\nratio: float = 0.5\nlabel = compute()\nflags: list[int] = [1, 2]\n"
        );
    }

    #[test]
    fn test_header_comment_lists_assertions() {
        let code = "total = price * 2\n";
        let mut result = AnalysisResult::from_static(
            Fingerprint::of(&SourceUnit::new(code)),
            analysis::analyze_source(code),
        );
        result.assertions.push(TypeAssertion {
            identifier: "price".to_string(),
            inferred_type: "float".to_string(),
            confidence: 0.9,
            explanation: None,
            provenance: Provenance::ExternalInference,
        });
        let (annotated, _) = annotate_source(code, &result, &[]);
        assert_eq!(
            annotated,
            "# Inferred types for unresolved names:\n#   price: float (external-inference, confidence 0.90)\ntotal = price * 2\n"
        );
    }

    #[test]
    fn test_unparseable_source_is_returned_unchanged() {
        let code = "def broken(:\n";
        assert_eq!(annotate(code), (code.to_string(), 0));
    }

    #[test]
    fn test_defaults_with_commas_and_brackets() {
        let code = "def join(parts, sep=\",\"):\n    return sep.join(parts)\n\n\ndef pick(rows, key=lambda_key(0, 1), pad=\")\"):\n    return rows\n";
        let (annotated, count) = annotate(code);
        assert_eq!(count, 2);
        assert_eq!(
            annotated,
            "def join(parts: list, sep: Any = \",\") -> str:\n    return sep.join(parts)\n\n\ndef pick(rows: list, key: Any = lambda_key(0, 1), pad: Any = \")\") -> Any:\n    return rows\n"
        );
    }

    #[test]
    fn test_chained_assignments_are_left_alone() {
        let code = "a = b = 1\nflag = a == b\nc = 2\n";
        let (annotated, count) = annotate(code);
        assert_eq!(annotated, "a = b = 1\nflag: bool = a == b\nc: int = 2\n");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_top_level_split() {
        assert_eq!(
            split_top_level("a, b=(1, 2), c='x,y', d={'k': [1, 2]}", ','),
            vec!["a", " b=(1, 2)", " c='x,y'", " d={'k': [1, 2]}"]
        );
        assert!(has_top_level_assign(" b = 1"));
        assert!(!has_top_level_assign(" f(x=1)"));
        assert!(!has_top_level_assign(" a == b or c <= d or e != f"));
        assert!(!has_top_level_assign(" \"k=v\""));
    }

    #[test]
    fn test_suggestions_take_priority_over_hints() {
        let code = "def scale(value, factor):\n    return value * factor\n\n\ndef zero(items):\n    return 0\n";
        let result = AnalysisResult::from_static(
            Fingerprint::of(&SourceUnit::new(code)),
            analysis::analyze_source(code),
        );
        let slot = |identifier: &str, inferred_type: &str| TypeAssertion {
            identifier: identifier.to_string(),
            inferred_type: inferred_type.to_string(),
            confidence: 0.9,
            explanation: None,
            provenance: Provenance::ExternalInference,
        };
        let suggestions = vec![
            FunctionSuggestion {
                function: "scale".to_string(),
                line: 1,
                params: vec![slot("value", "float")],
                returns: Some(slot("scale", "float")),
            },
            FunctionSuggestion {
                function: "zero".to_string(),
                line: 5,
                params: vec![slot("items", "list[str]")],
                returns: Some(slot("zero", "str")),
            },
        ];
        let (annotated, count) = annotate_source(code, &result, &suggestions);
        assert_eq!(count, 2);
        assert_eq!(
            annotated,
            "def scale(value: float, factor: Any) -> float:\n    return value * factor\n\n\ndef zero(items: list[str]) -> int:\n    return 0\n"
        );
    }
}
