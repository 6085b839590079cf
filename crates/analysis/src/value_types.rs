//! Types that are evident from a value expression alone.
//!
//! Only literal shapes, well-known builtin calls and common method calls are
//! recognized. Anything else yields `None` rather than a guess.

use python_ast::{Constant, Expr, ExprKind, Operator, UnaryOperator};

/// Number of elements inspected when typing a container display.
const SAMPLE_ELEMENTS: usize = 3;

/// What the caller knows about names at the point the value is evaluated.
pub trait TypeEnv {
    fn variable_type(&self, name: &str) -> Option<String>;
    fn is_class(&self, name: &str) -> bool;
}

/// An environment that knows nothing about any name.
pub struct EmptyEnv;

impl TypeEnv for EmptyEnv {
    fn variable_type(&self, _name: &str) -> Option<String> {
        None
    }

    fn is_class(&self, _name: &str) -> bool {
        false
    }
}

pub fn infer_value_type(expr: &Expr, env: &dyn TypeEnv) -> Option<String> {
    match &expr.kind {
        ExprKind::Constant(constant) => constant_type(constant),
        ExprKind::FString { .. } => Some("str".to_string()),
        ExprKind::Name(id) => env.variable_type(id),
        ExprKind::List(elts) => Some(container_type("list", elts, env)),
        ExprKind::Set(elts) => Some(container_type("set", elts, env)),
        ExprKind::Tuple(elts) => Some(tuple_type(elts, env)),
        ExprKind::Dict { keys, values } => Some(dict_type(keys, values, env)),
        ExprKind::ListComp { .. } => Some("list".to_string()),
        ExprKind::SetComp { .. } => Some("set".to_string()),
        ExprKind::DictComp { .. } => Some("dict".to_string()),
        ExprKind::GeneratorExp { .. } => Some("Generator".to_string()),
        ExprKind::Lambda { .. } => Some("Callable".to_string()),
        ExprKind::Compare { .. } => Some("bool".to_string()),
        ExprKind::BoolOp { values, .. } => {
            let types: Option<Vec<String>> =
                values.iter().map(|v| infer_value_type(v, env)).collect();
            types.map(|types| union(&types))
        }
        ExprKind::UnaryOp { op, operand } => match op {
            UnaryOperator::Not => Some("bool".to_string()),
            UnaryOperator::Invert => Some("int".to_string()),
            UnaryOperator::UAdd | UnaryOperator::USub => {
                let inner = infer_value_type(operand, env)?;
                matches!(inner.as_str(), "int" | "float" | "complex" | "bool").then(|| {
                    if inner == "bool" {
                        "int".to_string()
                    } else {
                        inner
                    }
                })
            }
        },
        ExprKind::BinOp { left, op, right } => binop_type(
            infer_value_type(left, env).as_deref(),
            *op,
            infer_value_type(right, env).as_deref(),
        ),
        ExprKind::IfExp { body, orelse, .. } => {
            let body = infer_value_type(body, env)?;
            let orelse = infer_value_type(orelse, env)?;
            Some(union(&[body, orelse]))
        }
        ExprKind::Call { func, .. } => call_type(func, env),
        ExprKind::NamedExpr { value, .. } => infer_value_type(value, env),
        _ => None,
    }
}

fn constant_type(constant: &Constant) -> Option<String> {
    let name = match constant {
        Constant::None => "None",
        Constant::Bool(_) => "bool",
        Constant::Int(_) => "int",
        Constant::Float(_) => "float",
        Constant::Complex(_) => "complex",
        Constant::Str(_) => "str",
        Constant::Bytes(_) => "bytes",
        Constant::Ellipsis => return None,
    };
    Some(name.to_string())
}

/// Joins distinct types with `|`, preserving first-seen order.
fn union(types: &[String]) -> String {
    let mut distinct: Vec<&str> = Vec::new();
    for ty in types {
        for part in ty.split(" | ") {
            if !distinct.contains(&part) {
                distinct.push(part);
            }
        }
    }
    distinct.join(" | ")
}

fn sample_types(elts: &[Expr], env: &dyn TypeEnv) -> Option<Vec<String>> {
    elts.iter()
        .take(SAMPLE_ELEMENTS)
        .map(|e| match e.kind {
            ExprKind::Starred(_) => None,
            _ => infer_value_type(e, env),
        })
        .collect()
}

fn container_type(container: &str, elts: &[Expr], env: &dyn TypeEnv) -> String {
    if elts.is_empty() {
        return container.to_string();
    }
    match sample_types(elts, env) {
        Some(types) => format!("{container}[{}]", union(&types)),
        None => container.to_string(),
    }
}

fn tuple_type(elts: &[Expr], env: &dyn TypeEnv) -> String {
    if elts.is_empty() || elts.len() > SAMPLE_ELEMENTS {
        return "tuple".to_string();
    }
    match sample_types(elts, env) {
        Some(types) => format!("tuple[{}]", types.join(", ")),
        None => "tuple".to_string(),
    }
}

fn dict_type(keys: &[Option<Expr>], values: &[Expr], env: &dyn TypeEnv) -> String {
    if keys.is_empty() {
        return "dict".to_string();
    }
    let mut key_types = Vec::new();
    let mut value_types = Vec::new();
    for (key, value) in keys.iter().zip(values).take(SAMPLE_ELEMENTS) {
        let Some(key) = key else {
            return "dict".to_string();
        };
        match (infer_value_type(key, env), infer_value_type(value, env)) {
            (Some(k), Some(v)) => {
                key_types.push(k);
                value_types.push(v);
            }
            _ => return "dict".to_string(),
        }
    }
    format!("dict[{}, {}]", union(&key_types), union(&value_types))
}

fn is_numeric(ty: &str) -> bool {
    matches!(ty, "int" | "float" | "bool")
}

fn binop_type(left: Option<&str>, op: Operator, right: Option<&str>) -> Option<String> {
    let (left, right) = (left?, right?);

    let numeric = |left: &str, right: &str| -> String {
        if op == Operator::Div || left == "float" || right == "float" {
            "float".to_string()
        } else {
            "int".to_string()
        }
    };

    match op {
        Operator::Add if left == right && matches!(left, "str" | "bytes") => {
            Some(left.to_string())
        }
        Operator::Add if left.starts_with("list") && right.starts_with("list") => {
            Some("list".to_string())
        }
        Operator::Mult if (left == "str" && right == "int") || (left == "int" && right == "str") => {
            Some("str".to_string())
        }
        Operator::Mult if left.starts_with("list") && right == "int" => Some(left.to_string()),
        Operator::Mod if left == "str" => Some("str".to_string()),
        Operator::BitOr | Operator::BitAnd | Operator::BitXor
            if left.starts_with("set") && right.starts_with("set") =>
        {
            Some("set".to_string())
        }
        Operator::BitOr | Operator::BitAnd | Operator::BitXor | Operator::LShift | Operator::RShift
            if is_numeric(left) && is_numeric(right) =>
        {
            Some("int".to_string())
        }
        Operator::MatMult => None,
        _ if is_numeric(left) && is_numeric(right) => Some(numeric(left, right)),
        _ => None,
    }
}

fn builtin_call_type(name: &str) -> Option<&'static str> {
    Some(match name {
        "len" | "id" | "hash" | "ord" | "round" => "int",
        "str" | "repr" | "input" | "chr" | "format" | "ascii" | "bin" | "hex" | "oct" => "str",
        "int" => "int",
        "float" => "float",
        "bool" | "isinstance" | "issubclass" | "hasattr" | "callable" | "any" | "all" => "bool",
        "list" | "sorted" => "list",
        "dict" => "dict",
        "set" => "set",
        "frozenset" => "frozenset",
        "tuple" => "tuple",
        "bytes" => "bytes",
        "bytearray" => "bytearray",
        "complex" => "complex",
        "range" => "range",
        "enumerate" => "enumerate",
        "zip" => "zip",
        "open" => "TextIO",
        "type" => "type",
        "object" => "object",
        "sum" => "int | float",
        "abs" => "int | float",
        "divmod" => "tuple[int, int]",
        "print" => "None",
        _ => return None,
    })
}

fn method_call_type(method: &str, receiver: Option<&str>) -> Option<String> {
    let ty = match method {
        "append" | "extend" | "insert" | "remove" | "clear" | "sort" | "reverse" | "update"
        | "add" | "discard" => "None",
        "split" | "rsplit" | "splitlines" => "list[str]",
        "join" | "strip" | "lstrip" | "rstrip" | "upper" | "lower" | "replace" | "format"
        | "capitalize" | "title" | "casefold" => "str",
        "encode" => "bytes",
        "decode" => "str",
        "keys" => "dict_keys",
        "values" => "dict_values",
        "items" => "dict_items",
        "count" | "index" | "find" | "rfind" => "int",
        "startswith" | "endswith" | "isdigit" | "isalpha" | "isalnum" | "isspace" | "isupper"
        | "islower" => "bool",
        "copy" => return receiver.map(str::to_string),
        _ => return None,
    };
    Some(ty.to_string())
}

fn call_type(func: &Expr, env: &dyn TypeEnv) -> Option<String> {
    match &func.kind {
        ExprKind::Name(name) => {
            if env.is_class(name) {
                return Some(name.clone());
            }
            builtin_call_type(name).map(str::to_string)
        }
        ExprKind::Attribute { value, attr } => {
            let receiver = infer_value_type(value, env);
            method_call_type(attr, receiver.as_deref())
        }
        _ => None,
    }
}

/// Canonical spelling for a type name produced by a model or a heuristic.
///
/// Strips quoting, maps runtime class names and plain English words to
/// their annotation spelling, and turns unknown markers into `Any`.
pub fn normalize_type_name(raw: &str) -> String {
    let trimmed = raw
        .trim()
        .trim_matches(|c| c == '`' || c == '"' || c == '\'')
        .trim()
        .trim_end_matches(['.', ',', ';'])
        .trim();

    let mapped = match trimmed.to_ascii_lowercase().as_str() {
        "" | "unknown" | "any" | "anything" => "Any",
        "nonetype" | "none" | "null" => "None",
        "textiowrapper" => "TextIO",
        "string" | "text" => "str",
        "integer" | "int" => "int",
        "boolean" | "bool" => "bool",
        "floating point" | "float" | "double" | "number" | "decimal number" => "float",
        "dictionary" | "mapping" | "dict" => "dict",
        "array" | "list" => "list",
        "tuple" => "tuple",
        "set" => "set",
        "bytes" | "byte string" => "bytes",
        "function" | "callable" => "Callable",
        _ => return trimmed.to_string(),
    };
    mapped.to_string()
}
