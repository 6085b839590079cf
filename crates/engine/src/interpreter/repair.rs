//! Best-effort fixes that turn JSON-like model output into JSON.
//!
//! Every pass leaves the contents of string literals untouched.

use regex::Regex;
use std::sync::LazyLock;

static BARE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)(\s*:)").expect("valid key pattern")
});
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").expect("valid comma pattern"));
static PY_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(True|False|None)\b").expect("valid literal pattern"));

/// Applies all passes in order: comments, quotes, keys, commas, literals.
pub fn repair(text: &str) -> String {
    let text = strip_comments(text);
    let text = single_to_double_quotes(&text);
    map_code(&text, |code| {
        let code = BARE_KEY.replace_all(code, "$1\"$2\"$3");
        let code = TRAILING_COMMA.replace_all(&code, "$1");
        PY_LITERAL
            .replace_all(&code, |caps: &regex::Captures| {
                match &caps[1] {
                    "True" => "true",
                    "False" => "false",
                    _ => "null",
                }
                .to_string()
            })
            .into_owned()
    })
}

/// Removes `//` line comments and `/* */` block comments outside strings.
fn strip_comments(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match (c, chars.get(i + 1)) {
            ('"' | '\'', _) => {
                quote = Some(c);
                out.push(c);
                i += 1;
            }
            ('/', Some('/')) => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            ('/', Some('*')) => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Rewrites `'...'` literals as `"..."`, escaping embedded double quotes.
fn single_to_double_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_double = false;

    while let Some(c) = chars.next() {
        if in_double {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                }
                '"' => in_double = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => {
                in_double = true;
                out.push(c);
            }
            '\'' => {
                out.push('"');
                while let Some(inner) = chars.next() {
                    match inner {
                        '\\' => match chars.next() {
                            Some('\'') => out.push('\''),
                            Some(next) => {
                                out.push('\\');
                                out.push(next);
                            }
                            None => {}
                        },
                        '\'' => break,
                        '"' => out.push_str("\\\""),
                        _ => out.push(inner),
                    }
                }
                out.push('"');
            }
            _ => out.push(c),
        }
    }
    out
}

/// Applies `f` to the text between double-quoted string literals.
fn map_code(text: &str, mut f: impl FnMut(&str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    let mut code_start = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                out.push_str(&text[code_start..=i]);
                code_start = i + 1;
            }
        } else if c == '"' {
            out.push_str(&f(&text[code_start..i]));
            in_string = true;
            code_start = i;
        }
    }

    if in_string {
        out.push_str(&text[code_start..]);
    } else {
        out.push_str(&f(&text[code_start..]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parses(text: &str) -> serde_json::Value {
        serde_json::from_str(&repair(text)).unwrap()
    }

    #[test]
    fn test_single_quotes_bare_keys_trailing_commas() {
        let value = parses(r#"{'x': 'int', y: "str",}"#);
        assert_eq!(value["x"], "int");
        assert_eq!(value["y"], "str");
    }

    #[test]
    fn test_comments_are_stripped_outside_strings() {
        let value = parses(
            "{\n  // inferred\n  \"url\": \"http://example.com\", /* block */\n  \"n\": 1\n}",
        );
        assert_eq!(value["url"], "http://example.com");
        assert_eq!(value["n"], 1);
    }

    #[test]
    fn test_python_literals() {
        let value = parses(r#"{"ok": True, "missing": None, "label": "True story"}"#);
        assert_eq!(value["ok"], true);
        assert!(value["missing"].is_null());
        assert_eq!(value["label"], "True story");
    }

    #[test]
    fn test_embedded_quotes() {
        let value = parses(r#"{'why': 'called with "abc"', 'it': 'it\'s a str'}"#);
        assert_eq!(value["why"], "called with \"abc\"");
        assert_eq!(value["it"], "it's a str");
    }

    #[test]
    fn test_valid_json_is_unchanged() {
        let text = r#"{"inferences": {"a": "list[int]"}, "confidence": {"a": 0.9}}"#;
        assert_eq!(repair(text), text);
    }
}
