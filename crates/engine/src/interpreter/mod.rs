//! Turns free-form model replies into typed candidates.
//!
//! Replies are extracted, repaired and parsed as JSON first. When that does
//! not yield anything, line heuristics are tried. Interpretation never
//! fails with an error; an empty outcome is reported as
//! [`Interpretation::Failed`].

mod extract;
mod fallback;
mod repair;

pub use extract::extract_object;
pub use fallback::heuristic_candidates;
pub use repair::repair;

use analysis::normalize_type_name;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::EngineConfig;

/// One `identifier -> type` claim read from a reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub identifier: String,
    pub inferred_type: String,
    pub confidence: f64,
    pub explanation: Option<String>,
}

/// Parameter and return types proposed for one function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCandidate {
    pub function: String,
    pub params: Vec<(String, String)>,
    pub returns: Option<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    /// Parsed from a JSON object, possibly after repair.
    Structured(Vec<Candidate>),
    /// Recovered by line heuristics.
    Fallback(Vec<Candidate>),
    Failed(String),
}

impl Interpretation {
    pub fn candidates(&self) -> &[Candidate] {
        match self {
            Interpretation::Structured(c) | Interpretation::Fallback(c) => c,
            Interpretation::Failed(_) => &[],
        }
    }
}

/// Keys a function suggestion map may be filed under.
const FUNCTION_KEYS: &[&str] = &["function_suggestions", "function_annotations"];

/// Keys of the reply format that never name an identifier.
const RESERVED_KEYS: &[&str] = &[
    "inferences",
    "explanations",
    "confidence",
    "function_suggestions",
    "function_annotations",
    "success",
    "error",
    "reasoning",
    "explanation",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseInterpreter {
    default_confidence: f64,
    fallback_confidence: f64,
}

impl Default for ResponseInterpreter {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl ResponseInterpreter {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            default_confidence: config.default_confidence.clamp(0.0, 1.0),
            fallback_confidence: config.fallback_confidence.clamp(0.0, 1.0),
        }
    }

    pub fn interpret(&self, raw: &str) -> Interpretation {
        let structured_error = match extract_object(raw) {
            None => "no JSON object in response".to_string(),
            Some(object) => match serde_json::from_str::<Value>(&repair(object)) {
                Ok(Value::Object(map)) => {
                    let candidates = self.structured(&map);
                    if !candidates.is_empty() {
                        return Interpretation::Structured(candidates);
                    }
                    "JSON object contains no inferences".to_string()
                }
                Ok(_) => "JSON value is not an object".to_string(),
                Err(e) => format!("invalid JSON: {e}"),
            },
        };
        debug!("Structured parse failed ({structured_error}), trying heuristics");

        let candidates = heuristic_candidates(raw, self.fallback_confidence);
        if candidates.is_empty() {
            Interpretation::Failed(structured_error)
        } else {
            Interpretation::Fallback(candidates)
        }
    }

    /// Reads a function suggestion reply. Unlike [`Self::interpret`] there
    /// is no line heuristic to fall back on.
    pub fn interpret_functions(&self, raw: &str) -> Result<Vec<FunctionCandidate>, String> {
        let object = extract_object(raw).ok_or_else(|| "no JSON object in response".to_string())?;
        let map = match serde_json::from_str::<Value>(&repair(object)) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err("JSON value is not an object".to_string()),
            Err(e) => return Err(format!("invalid JSON: {e}")),
        };
        let functions = FUNCTION_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_object))
            .ok_or_else(|| "JSON object contains no function suggestions".to_string())?;
        let confidence = map.get("confidence");

        Ok(functions
            .iter()
            .filter_map(|(function, entry)| {
                let entry = entry.as_object()?;
                let params: Vec<(String, String)> = entry
                    .get("params")
                    .and_then(Value::as_object)
                    .map(|params| {
                        params
                            .iter()
                            .filter_map(|(name, ty)| {
                                Some((name.clone(), normalize_type_name(ty.as_str()?)))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let returns = entry
                    .get("return")
                    .or_else(|| entry.get("returns"))
                    .and_then(Value::as_str)
                    .map(normalize_type_name);
                if params.is_empty() && returns.is_none() {
                    return None;
                }
                Some(FunctionCandidate {
                    function: function.clone(),
                    params,
                    returns,
                    confidence: self.confidence_of(confidence, function),
                })
            })
            .collect())
    }

    /// Confidence for `key`, from a per-name map or one shared number.
    fn confidence_of(&self, confidence: Option<&Value>, key: &str) -> f64 {
        match confidence {
            Some(Value::Object(per_name)) => per_name.get(key).and_then(Value::as_f64),
            Some(value) => value.as_f64(),
            None => None,
        }
        .unwrap_or(self.default_confidence)
        .clamp(0.0, 1.0)
    }

    fn structured(&self, map: &Map<String, Value>) -> Vec<Candidate> {
        let explanations = map.get("explanations").and_then(Value::as_object);
        let confidence = map.get("confidence");

        let entries: Vec<(&String, &Value)> = match map.get("inferences") {
            Some(Value::Object(inferences)) => inferences.iter().collect(),
            _ => map
                .iter()
                .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
                .collect(),
        };

        entries
            .into_iter()
            .filter_map(|(identifier, value)| {
                let raw_type = match value {
                    Value::String(s) => s.as_str(),
                    Value::Object(o) => o.get("type").and_then(Value::as_str)?,
                    _ => return None,
                };
                let inferred_type = normalize_type_name(raw_type);
                if identifier.is_empty() {
                    return None;
                }

                let confidence = self.confidence_of(confidence, identifier);

                let explanation = explanations
                    .and_then(|e| e.get(identifier))
                    .and_then(Value::as_str)
                    .map(str::to_string);

                Some(Candidate {
                    identifier: identifier.clone(),
                    inferred_type,
                    confidence,
                    explanation,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interpreter() -> ResponseInterpreter {
        ResponseInterpreter::default()
    }

    fn summary(candidates: &[Candidate]) -> Vec<(&str, &str, f64)> {
        candidates
            .iter()
            .map(|c| (c.identifier.as_str(), c.inferred_type.as_str(), c.confidence))
            .collect()
    }

    #[test]
    fn test_structured_reply() {
        let raw = r#"```json
{
  "inferences": {"price": "float", "items": "list[str]"},
  "explanations": {"price": "multiplied by a float"},
  "confidence": {"price": 0.9}
}
```"#;
        let Interpretation::Structured(candidates) = interpreter().interpret(raw) else {
            panic!("expected structured interpretation");
        };
        assert_eq!(
            summary(&candidates),
            vec![("items", "list[str]", 0.6), ("price", "float", 0.9)]
        );
        assert_eq!(
            candidates[1].explanation.as_deref(),
            Some("multiplied by a float")
        );
    }

    #[test]
    fn test_repaired_reply() {
        let Interpretation::Structured(candidates) =
            interpreter().interpret(r#"{'x': 'int', y: "str",}"#)
        else {
            panic!("expected structured interpretation");
        };
        assert_eq!(
            summary(&candidates),
            vec![("x", "int", 0.6), ("y", "str", 0.6)]
        );
    }

    #[test]
    fn test_scalar_confidence_is_clamped() {
        let raw = r#"{"inferences": {"n": "integer"}, "confidence": 1.7}"#;
        let interpretation = interpreter().interpret(raw);
        assert_eq!(summary(interpretation.candidates()), vec![("n", "int", 1.0)]);
    }

    #[test]
    fn test_fallback_reply() {
        let Interpretation::Fallback(candidates) =
            interpreter().interpret("x is a string, y is an integer")
        else {
            panic!("expected fallback interpretation");
        };
        assert_eq!(
            summary(&candidates),
            vec![("x", "str", 0.3), ("y", "int", 0.3)]
        );
    }

    #[test]
    fn test_empty_inferences_fall_through() {
        let raw = "{\"inferences\": {}}\nBut count is of type int";
        assert!(matches!(
            interpreter().interpret(raw),
            Interpretation::Fallback(_)
        ));
    }

    #[test]
    fn test_failure() {
        match interpreter().interpret("Sorry, I cannot help with that.") {
            Interpretation::Failed(reason) => assert_eq!(reason, "no JSON object in response"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            interpreter().interpret("{{{"),
            Interpretation::Failed(_)
        ));
        assert!(matches!(interpreter().interpret(""), Interpretation::Failed(_)));
    }

    #[test]
    fn test_function_suggestions() {
        let raw = r#"Sure:
```json
{"function_suggestions": {
    "scale": {"params": {"value": "float", "factor": "integer"}, "return": "float"},
    "noop": {"params": {}},
    "greet": {"return": "string"}
}, "confidence": {"scale": 0.9}}
```"#;
        let candidates = interpreter().interpret_functions(raw).unwrap();
        assert_eq!(
            candidates,
            vec![
                FunctionCandidate {
                    function: "greet".to_string(),
                    params: Vec::new(),
                    returns: Some("str".to_string()),
                    confidence: 0.6,
                },
                FunctionCandidate {
                    function: "scale".to_string(),
                    params: vec![
                        ("factor".to_string(), "int".to_string()),
                        ("value".to_string(), "float".to_string())
                    ],
                    returns: Some("float".to_string()),
                    confidence: 0.9,
                },
            ]
        );
    }

    #[test]
    fn test_function_annotations_key_is_accepted() {
        let raw = r#"{"function_annotations": {"f": {"params": {"x": "int"}}}, "confidence": 0.8}"#;
        let candidates = interpreter().interpret_functions(raw).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].params, vec![("x".to_string(), "int".to_string())]);
        assert_eq!(candidates[0].returns, None);
        assert_eq!(candidates[0].confidence, 0.8);
    }

    #[test]
    fn test_function_reply_without_suggestions() {
        assert_eq!(
            interpreter().interpret_functions(r#"{"inferences": {"x": "int"}}"#),
            Err("JSON object contains no function suggestions".to_string())
        );
        assert_eq!(
            interpreter().interpret_functions("no idea"),
            Err("no JSON object in response".to_string())
        );
    }
}
