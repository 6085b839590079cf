use python_ast::ParseError;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Index of a scope in [`StaticAnalysis::scopes`]. The module scope is always `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(pub u32);

impl ScopeId {
    pub const MODULE: ScopeId = ScopeId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScopeKind {
    Module,
    Function,
    Class,
    Lambda,
    Comprehension,
}

impl ScopeKind {
    /// Scopes whose bodies run when called rather than where they are defined.
    pub fn is_deferred(self) -> bool {
        matches!(self, ScopeKind::Function | ScopeKind::Lambda)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub name: String,
    pub parent: Option<ScopeId>,
    pub line: usize,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Class,
    Variable,
    Import,
    Parameter,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ParameterKind {
    PositionalOnly,
    Positional,
    VarArgs,
    KeywordOnly,
    VarKeywords,
}

impl From<python_ast::ParamKind> for ParameterKind {
    fn from(kind: python_ast::ParamKind) -> Self {
        match kind {
            python_ast::ParamKind::PositionalOnly => ParameterKind::PositionalOnly,
            python_ast::ParamKind::Positional => ParameterKind::Positional,
            python_ast::ParamKind::VarArgs => ParameterKind::VarArgs,
            python_ast::ParamKind::KeywordOnly => ParameterKind::KeywordOnly,
            python_ast::ParamKind::VarKeywords => ParameterKind::VarKeywords,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub name: String,
    pub kind: ParameterKind,
    pub annotation: Option<String>,
    pub has_default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SymbolDetails {
    Function {
        parameters: Vec<ParameterInfo>,
        returns: Option<String>,
        /// Return type derived from the body's `return` statements.
        inferred_return: Option<String>,
        decorators: Vec<String>,
        is_async: bool,
        is_method: bool,
    },
    Class {
        bases: Vec<String>,
        decorators: Vec<String>,
    },
    Variable {
        annotation: Option<String>,
        /// Type derived from the first assigned value, when it is evident.
        value_type: Option<String>,
    },
    Import {
        module: Option<String>,
        imported: Option<String>,
    },
    Parameter {
        function: String,
        kind: ParameterKind,
        annotation: Option<String>,
        has_default: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub scope_id: ScopeId,
    pub decl_line: usize,
    pub details: SymbolDetails,
}

/// A read of a name that no enclosing scope binds and that is not a built-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedIdentifier {
    pub name: String,
    pub use_line: usize,
    pub column: usize,
    pub enclosing_scope_id: ScopeId,
    pub context_snippet: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticAnalysis {
    pub scopes: Vec<Scope>,
    pub symbols: Vec<Symbol>,
    pub unresolved: Vec<UnresolvedIdentifier>,
    pub error: Option<ParseError>,
}

impl StaticAnalysis {
    /// The deterministic result for input that could not be parsed.
    pub fn failed(error: ParseError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Distinct unresolved names in order of first use.
    pub fn unresolved_names(&self) -> Vec<&str> {
        let mut seen = rustc_hash::FxHashSet::default();
        self.unresolved
            .iter()
            .filter(|u| seen.insert(u.name.as_str()))
            .map(|u| u.name.as_str())
            .collect()
    }

    pub fn symbols_of_kind(&self, kind: SymbolKind) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(move |s| s.kind == kind)
    }
}
