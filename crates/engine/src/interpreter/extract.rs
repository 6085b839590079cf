use regex::Regex;
use std::sync::LazyLock;

static FENCED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)```").expect("valid fence pattern")
});

/// The JSON-looking part of a model reply.
///
/// Fenced code blocks are preferred; within the chosen text the first `{`
/// is matched to its balanced `}`. An object that never closes runs to the
/// end of the text.
pub fn extract_object(raw: &str) -> Option<&str> {
    for block in FENCED.captures_iter(raw).filter_map(|c| c.get(1)) {
        if let Some(object) = balanced_object(block.as_str()) {
            return Some(object);
        }
    }
    balanced_object(raw)
}

fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
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
            '"' | '\'' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    Some(&text[start..])
}
