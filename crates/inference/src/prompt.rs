use serde::{Deserialize, Serialize};
use std::fmt::Write;

const SYSTEM_PROMPT: &str = r#"You are an expert in Python type inference. Analyze the code and infer the most likely type of each listed identifier from how it is used.

Guidelines:
1. Look at operators, method calls, attribute access and call sites that involve the identifier.
2. Use Python 3.10+ annotation syntax: int, float, str, bool, list[int], dict[str, int], tuple[int, str], int | None.
3. Give a confidence between 0.0 and 1.0 for each inference and a one-sentence explanation.

Reply with JSON only, in exactly this shape:
{
    "inferences": {"name": "type"},
    "explanations": {"name": "reasoning"},
    "confidence": {"name": 0.85}
}"#;

const FUNCTION_SYSTEM_PROMPT: &str = r#"You are an expert in Python type annotations. Suggest parameter and return types for each listed function from how its parameters are used in the body.

Use Python 3.10+ annotation syntax. Leave out parameters you cannot type.

Reply with JSON only, in exactly this shape:
{
    "function_suggestions": {"name": {"params": {"parameter": "type"}, "return": "type"}},
    "confidence": 0.85
}"#;

/// One identifier the model is asked to type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTarget {
    pub name: String,
    pub line: usize,
    pub context: String,
}

/// One unannotated function the model is asked to annotate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionTarget {
    pub name: String,
    pub line: usize,
    pub header: String,
}

/// A chat prompt: a system instruction plus the user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    /// Builds the batched request for every unresolved identifier of a snippet.
    pub fn type_inference(code: &str, targets: &[PromptTarget]) -> Self {
        let mut user = String::new();
        let _ = writeln!(user, "Infer the types of the undeclared identifiers in this Python code.");
        let _ = writeln!(user);
        let _ = writeln!(user, "```python");
        let _ = writeln!(user, "{}", code.trim_end());
        let _ = writeln!(user, "```");
        let _ = writeln!(user);
        let _ = writeln!(user, "Undeclared identifiers:");
        for target in targets {
            let _ = writeln!(
                user,
                "- {} (line {}): {}",
                target.name, target.line, target.context
            );
        }
        Self::new(SYSTEM_PROMPT, user)
    }

    /// Asks for parameter and return types of every listed function.
    pub fn function_annotations(code: &str, targets: &[FunctionTarget]) -> Self {
        let mut user = String::new();
        let _ = writeln!(user, "Suggest type annotations for the functions of this Python code.");
        let _ = writeln!(user);
        let _ = writeln!(user, "```python");
        let _ = writeln!(user, "{}", code.trim_end());
        let _ = writeln!(user, "```");
        let _ = writeln!(user);
        let _ = writeln!(user, "Functions:");
        for target in targets {
            let _ = writeln!(user, "- {} (line {}): {}", target.name, target.line, target.header.trim());
        }
        Self::new(FUNCTION_SYSTEM_PROMPT, user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_inference_prompt() {
        let targets = vec![PromptTarget {
            name: "price".to_string(),
            line: 2,
            context: "total = price * 2".to_string(),
        }];
        let prompt = Prompt::type_inference("def f():\n    total = price * 2\n", &targets);

        assert!(prompt.system.contains("\"inferences\""));
        assert!(prompt.user.contains("```python\ndef f():\n    total = price * 2\n```"));
        assert!(prompt.user.contains("- price (line 2): total = price * 2"));
    }

    #[test]
    fn test_function_annotations_prompt() {
        let targets = vec![FunctionTarget {
            name: "scale".to_string(),
            line: 1,
            header: "def scale(value, factor):".to_string(),
        }];
        let prompt = Prompt::function_annotations("def scale(value, factor):\n    return value * factor\n", &targets);

        assert!(prompt.system.contains("\"function_suggestions\""));
        assert!(prompt.user.contains("- scale (line 1): def scale(value, factor):"));
        assert!(prompt.user.contains("    return value * factor\n```"));
    }
}
