//! Deterministic static analysis of Python snippets.
//!
//! [`analyze_source`] parses a snippet, builds its lexical scope tree,
//! records every declared symbol and reports reads of names that no
//! enclosing scope binds and that are not built-ins. Function and lambda
//! bodies are resolved after their enclosing body, so forward references to
//! later module-level definitions resolve the way they do at call time.

pub mod builtins;
pub mod resolver;
pub mod scopes;
pub mod types;
pub mod value_types;

pub use builtins::is_builtin;
pub use resolver::StaticAnalyzer;
pub use types::*;
pub use value_types::{EmptyEnv, TypeEnv, infer_value_type, normalize_type_name};

/// Parses and analyzes `source` with a default [`StaticAnalyzer`].
pub fn analyze_source(source: &str) -> StaticAnalysis {
    StaticAnalyzer::new().analyze_source(source)
}

#[cfg(test)]
mod tests;
