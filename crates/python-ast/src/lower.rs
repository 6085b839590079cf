//! Lowering of the tree-sitter-python concrete syntax tree into [`crate::ast`].
//!
//! The grammar node kinds are matched by name. Anything the tree contains
//! that has no counterpart in the syntax tree is reported as a
//! [`ParseError`] at the offending node rather than silently dropped.

use tree_sitter::Node;

use crate::ast::*;
use crate::error::ParseError;

/// Deepest nesting of statements, expressions and patterns accepted.
pub const MAX_NESTING: usize = 200;

type Result<T> = std::result::Result<T, ParseError>;

fn line(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

/// Named children, skipping comments and line continuations.
fn named(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    let nodes = node
        .named_children(&mut cursor)
        .filter(|child| !child.is_extra())
        .collect();
    nodes
}

fn children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    let nodes = node
        .children(&mut cursor)
        .filter(|child| !child.is_extra())
        .collect();
    nodes
}

fn fields<'t>(node: Node<'t>, name: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    let nodes = node.children_by_field_name(name, &mut cursor).collect();
    nodes
}

fn has_token(node: Node<'_>, token: &str) -> bool {
    children(node)
        .iter()
        .any(|child| !child.is_named() && child.kind() == token)
}

/// Strips the `type` wrapper the grammar puts around annotations.
fn unwrap_type(node: Node<'_>) -> Node<'_> {
    let mut node = node;
    while node.kind() == "type" {
        match named(node).as_slice() {
            [inner] => node = *inner,
            _ => break,
        }
    }
    node
}

fn number(text: &str, float: bool) -> Constant {
    if text.ends_with(['j', 'J']) {
        Constant::Complex(text.to_string())
    } else if float {
        Constant::Float(text.to_string())
    } else {
        Constant::Int(text.to_string())
    }
}

fn compare_operator(op: &str) -> Option<CmpOperator> {
    Some(match op {
        "==" => CmpOperator::Eq,
        "!=" | "<>" => CmpOperator::NotEq,
        "<" => CmpOperator::Lt,
        "<=" => CmpOperator::LtE,
        ">" => CmpOperator::Gt,
        ">=" => CmpOperator::GtE,
        "is" => CmpOperator::Is,
        "is not" => CmpOperator::IsNot,
        "in" => CmpOperator::In,
        "not in" => CmpOperator::NotIn,
        _ => return None,
    })
}

/// Literal contents between the quotes, with common escapes decoded
/// unless the literal is raw.
fn literal_body(text: &str, prefix: usize, raw: bool) -> String {
    let rest = &text[prefix..];
    let quote = if rest.starts_with("\"\"\"") || rest.starts_with("'''") {
        3
    } else {
        1
    };
    let body = rest
        .get(quote..rest.len().saturating_sub(quote))
        .unwrap_or_default();
    if raw {
        return body.to_string();
    }

    let mut decoded = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            decoded.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => decoded.push('\n'),
            Some('t') => decoded.push('\t'),
            Some('r') => decoded.push('\r'),
            Some('\n') => {}
            Some(c @ ('\\' | '\'' | '"')) => decoded.push(c),
            Some(other) => {
                decoded.push('\\');
                decoded.push(other);
            }
            None => decoded.push('\\'),
        }
    }
    decoded
}

pub(crate) struct Lowering<'s> {
    source: &'s str,
    depth: usize,
}

impl<'s> Lowering<'s> {
    pub(crate) fn new(source: &'s str) -> Self {
        Self { source, depth: 0 }
    }

    fn text(&self, node: Node<'_>) -> &'s str {
        self.source.get(node.byte_range()).unwrap_or_default()
    }

    /// 0-based character column of the node's first byte.
    fn column(&self, node: Node<'_>) -> usize {
        let start = node.start_byte();
        let line_start = start - node.start_position().column;
        self.source
            .get(line_start..start)
            .map_or(0, |prefix| prefix.chars().count())
    }

    pub(crate) fn error_at(&self, node: Node<'_>, message: impl Into<String>) -> ParseError {
        ParseError::new(message, line(node), self.column(node) + 1)
    }

    fn required<'t>(&self, node: Node<'t>, field: &str) -> Result<Node<'t>> {
        node.child_by_field_name(field)
            .ok_or_else(|| self.error_at(node, format!("`{}` without {field}", node.kind())))
    }

    fn enter(&mut self, node: Node<'_>) -> Result<()> {
        if self.depth >= MAX_NESTING {
            return Err(self.error_at(node, "too many nested blocks or expressions"));
        }
        self.depth += 1;
        Ok(())
    }

    fn at(&self, node: Node<'_>, kind: ExprKind) -> Expr {
        Expr::new(kind, line(node), self.column(node))
    }

    pub(crate) fn module(&mut self, root: Node<'_>) -> Result<Module> {
        Ok(Module {
            body: self.block(root)?,
        })
    }

    fn block(&mut self, node: Node<'_>) -> Result<Vec<Stmt>> {
        let body = named(node)
            .into_iter()
            .map(|child| self.stmt(child))
            .collect::<Result<Vec<_>>>()?;
        // The grammar accepts a bare newline as a suite.
        if body.is_empty() && node.kind() == "block" {
            return Err(self.error_at(node, "expected an indented block"));
        }
        Ok(body)
    }

    fn stmt(&mut self, node: Node<'_>) -> Result<Stmt> {
        self.enter(node)?;
        let stmt = self.lower_stmt(node);
        self.depth -= 1;
        stmt
    }

    fn lower_stmt(&mut self, node: Node<'_>) -> Result<Stmt> {
        let kind = match node.kind() {
            "expression_statement" => self.expression_statement(node)?,
            "return_statement" => StmtKind::Return(match named(node).first() {
                Some(value) => Some(self.expr(*value)?),
                None => None,
            }),
            "delete_statement" => {
                let targets = match named(node).as_slice() {
                    [list] if list.kind() == "expression_list" => self.exprs(named(*list))?,
                    nodes => self.exprs(nodes.to_vec())?,
                };
                StmtKind::Delete(targets)
            }
            "raise_statement" => {
                let cause = node.child_by_field_name("cause");
                let exc = named(node)
                    .into_iter()
                    .find(|child| Some(child.id()) != cause.map(|c| c.id()));
                StmtKind::Raise {
                    exc: exc.map(|e| self.expr(e)).transpose()?,
                    cause: cause.map(|c| self.expr(c)).transpose()?,
                }
            }
            "assert_statement" => {
                let parts = named(node);
                let Some(test) = parts.first() else {
                    return Err(self.error_at(node, "`assert` without a condition"));
                };
                StmtKind::Assert {
                    test: self.expr(*test)?,
                    msg: parts.get(1).map(|m| self.expr(*m)).transpose()?,
                }
            }
            "pass_statement" => StmtKind::Pass,
            "break_statement" => StmtKind::Break,
            "continue_statement" => StmtKind::Continue,
            "global_statement" => StmtKind::Global(self.identifiers(node)),
            "nonlocal_statement" => StmtKind::Nonlocal(self.identifiers(node)),
            "import_statement" => StmtKind::Import(self.aliases(node)?),
            "import_from_statement" | "future_import_statement" => self.import_from(node)?,
            "if_statement" => self.if_statement(node)?,
            "for_statement" => StmtKind::For {
                target: self.target(self.required(node, "left")?)?,
                iter: self.expr(self.required(node, "right")?)?,
                body: self.block(self.required(node, "body")?)?,
                orelse: self.else_clause(node)?,
                is_async: has_token(node, "async"),
            },
            "while_statement" => StmtKind::While {
                test: self.expr(self.required(node, "condition")?)?,
                body: self.block(self.required(node, "body")?)?,
                orelse: self.else_clause(node)?,
            },
            "try_statement" => self.try_statement(node)?,
            "with_statement" => self.with_statement(node)?,
            "function_definition" => StmtKind::FunctionDef(self.function(node, Vec::new())?),
            "class_definition" => StmtKind::ClassDef(self.class(node, Vec::new())?),
            "decorated_definition" => return self.decorated(node),
            "match_statement" => self.match_statement(node)?,
            "type_alias_statement" => self.type_alias(node)?,
            "print_statement" | "exec_statement" => {
                return Err(self.error_at(node, "Python 2 statement is not supported"));
            }
            other => return Err(self.error_at(node, format!("unsupported statement `{other}`"))),
        };
        Ok(Stmt {
            kind,
            line: line(node),
        })
    }

    fn expression_statement(&mut self, node: Node<'_>) -> Result<StmtKind> {
        let parts = named(node);
        match parts.as_slice() {
            [assignment] if assignment.kind() == "assignment" => self.assignment(*assignment),
            [augmented] if augmented.kind() == "augmented_assignment" => {
                let operator = self.required(*augmented, "operator")?;
                let op = Operator::from_augmented(self.text(operator)).ok_or_else(|| {
                    self.error_at(operator, format!("unknown operator `{}`", self.text(operator)))
                })?;
                Ok(StmtKind::AugAssign {
                    target: self.target(self.required(*augmented, "left")?)?,
                    op,
                    value: self.value(self.required(*augmented, "right")?)?,
                })
            }
            [single] => Ok(StmtKind::Expr(self.expr(*single)?)),
            [first, ..] => {
                let elements = self.exprs(parts.clone())?;
                Ok(StmtKind::Expr(self.at(*first, ExprKind::Tuple(elements))))
            }
            [] => Err(self.error_at(node, "empty expression statement")),
        }
    }

    fn assignment(&mut self, node: Node<'_>) -> Result<StmtKind> {
        let target = self.target(self.required(node, "left")?)?;
        if let Some(annotation) = node.child_by_field_name("type") {
            let value = match node.child_by_field_name("right") {
                Some(right) => Some(self.value(right)?),
                None => None,
            };
            return Ok(StmtKind::AnnAssign {
                target,
                annotation: self.expr(annotation)?,
                value,
            });
        }

        // `a = b = 1` nests as a right-recursive chain of assignments.
        let mut targets = vec![target];
        let mut right = self.required(node, "right")?;
        while right.kind() == "assignment" {
            if right.child_by_field_name("type").is_some() {
                return Err(self.error_at(right, "annotation inside a chained assignment"));
            }
            targets.push(self.target(self.required(right, "left")?)?);
            right = self.required(right, "right")?;
        }
        Ok(StmtKind::Assign {
            targets,
            value: self.value(right)?,
        })
    }

    /// Right-hand side of an assignment.
    fn value(&mut self, node: Node<'_>) -> Result<Expr> {
        match node.kind() {
            "assignment" | "augmented_assignment" => {
                Err(self.error_at(node, "assignment is not an expression"))
            }
            _ => self.expr(node),
        }
    }

    fn target(&mut self, node: Node<'_>) -> Result<Expr> {
        self.enter(node)?;
        let target = self.lower_target(node);
        self.depth -= 1;
        target
    }

    fn lower_target(&mut self, node: Node<'_>) -> Result<Expr> {
        let kind = match node.kind() {
            "pattern_list" | "tuple_pattern" | "tuple" | "expression_list" => {
                ExprKind::Tuple(self.targets(node)?)
            }
            "list_pattern" | "list" => ExprKind::List(self.targets(node)?),
            "list_splat_pattern" | "list_splat" => {
                let inner = self.only_child(node)?;
                ExprKind::Starred(Box::new(self.target(inner)?))
            }
            "parenthesized_expression" => return self.target(self.only_child(node)?),
            "as_pattern_target" => match named(node).as_slice() {
                [inner] => return self.target(*inner),
                _ => ExprKind::Name(self.text(node).trim().to_string()),
            },
            _ => return self.expr(node),
        };
        Ok(self.at(node, kind))
    }

    fn targets(&mut self, node: Node<'_>) -> Result<Vec<Expr>> {
        named(node)
            .into_iter()
            .map(|child| self.target(child))
            .collect()
    }

    fn identifiers(&self, node: Node<'_>) -> Vec<String> {
        named(node)
            .into_iter()
            .map(|child| self.text(child).to_string())
            .collect()
    }

    fn dotted(&self, node: Node<'_>) -> String {
        match node.kind() {
            "dotted_name" => self.identifiers(node).join("."),
            _ => self.text(node).to_string(),
        }
    }

    fn aliases(&self, node: Node<'_>) -> Result<Vec<Alias>> {
        fields(node, "name")
            .into_iter()
            .map(|name| match name.kind() {
                "aliased_import" => Ok(Alias {
                    name: self.dotted(self.required(name, "name")?),
                    asname: Some(self.text(self.required(name, "alias")?).to_string()),
                }),
                _ => Ok(Alias {
                    name: self.dotted(name),
                    asname: None,
                }),
            })
            .collect()
    }

    fn import_from(&self, node: Node<'_>) -> Result<StmtKind> {
        let (module, level) = if node.kind() == "future_import_statement" {
            (Some("__future__".to_string()), 0)
        } else {
            let module = self.required(node, "module_name")?;
            match module.kind() {
                "relative_import" => {
                    let mut level = 0;
                    let mut name = None;
                    for part in named(module) {
                        match part.kind() {
                            "import_prefix" => level = self.text(part).matches('.').count(),
                            _ => name = Some(self.dotted(part)),
                        }
                    }
                    (name, level)
                }
                _ => (Some(self.dotted(module)), 0),
            }
        };
        let names = if named(node).iter().any(|c| c.kind() == "wildcard_import") {
            vec![Alias {
                name: "*".to_string(),
                asname: None,
            }]
        } else {
            self.aliases(node)?
        };
        Ok(StmtKind::ImportFrom {
            module,
            names,
            level,
        })
    }

    fn else_clause(&mut self, node: Node<'_>) -> Result<Vec<Stmt>> {
        match node.child_by_field_name("alternative") {
            Some(clause) => self.block(self.required(clause, "body")?),
            None => Ok(Vec::new()),
        }
    }

    fn if_statement(&mut self, node: Node<'_>) -> Result<StmtKind> {
        let test = self.expr(self.required(node, "condition")?)?;
        let body = self.block(self.required(node, "consequence")?)?;
        let mut orelse = Vec::new();
        for clause in fields(node, "alternative").into_iter().rev() {
            match clause.kind() {
                "else_clause" => orelse = self.block(self.required(clause, "body")?)?,
                "elif_clause" => {
                    let kind = StmtKind::If {
                        test: self.expr(self.required(clause, "condition")?)?,
                        body: self.block(self.required(clause, "consequence")?)?,
                        orelse,
                    };
                    orelse = vec![Stmt {
                        kind,
                        line: line(clause),
                    }];
                }
                other => return Err(self.error_at(clause, format!("unexpected `{other}`"))),
            }
        }
        Ok(StmtKind::If { test, body, orelse })
    }

    fn try_statement(&mut self, node: Node<'_>) -> Result<StmtKind> {
        let body = self.block(self.required(node, "body")?)?;
        let mut handlers = Vec::new();
        let mut orelse = Vec::new();
        let mut finalbody = Vec::new();
        for clause in named(node) {
            match clause.kind() {
                "except_clause" | "except_group_clause" => handlers.push(self.handler(clause)?),
                "else_clause" => orelse = self.block(self.required(clause, "body")?)?,
                "finally_clause" => {
                    if let Some(block) = named(clause).into_iter().find(|c| c.kind() == "block") {
                        finalbody = self.block(block)?;
                    }
                }
                _ => {}
            }
        }
        Ok(StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        })
    }

    fn handler(&mut self, node: Node<'_>) -> Result<ExceptHandler> {
        let mut parts = named(node);
        let body = match parts.iter().rposition(|c| c.kind() == "block") {
            Some(index) => self.block(parts.remove(index))?,
            None => Vec::new(),
        };
        let (typ, name) = match parts.as_slice() {
            [] => (None, None),
            [pattern] if pattern.kind() == "as_pattern" => {
                let inner = named(*pattern);
                let typ = match inner.first() {
                    Some(typ) => Some(self.expr(*typ)?),
                    None => None,
                };
                let name = inner
                    .last()
                    .filter(|_| inner.len() > 1)
                    .map(|alias| self.text(*alias).trim().to_string());
                (typ, name)
            }
            [typ, rest @ ..] => (
                Some(self.expr(*typ)?),
                rest.first().map(|alias| self.text(*alias).trim().to_string()),
            ),
        };
        Ok(ExceptHandler {
            typ,
            name,
            body,
            line: line(node),
        })
    }

    fn with_statement(&mut self, node: Node<'_>) -> Result<StmtKind> {
        let mut items = Vec::new();
        for clause in named(node).into_iter().filter(|c| c.kind() == "with_clause") {
            for item in named(clause) {
                let value = item
                    .child_by_field_name("value")
                    .or_else(|| named(item).first().copied())
                    .ok_or_else(|| self.error_at(item, "empty `with` item"))?;
                if value.kind() == "as_pattern" {
                    let parts = named(value);
                    let (Some(context), Some(target)) = (parts.first(), parts.last()) else {
                        return Err(self.error_at(value, "incomplete `as` clause"));
                    };
                    items.push(WithItem {
                        context: self.expr(*context)?,
                        target: Some(self.target(*target)?),
                    });
                } else {
                    items.push(WithItem {
                        context: self.expr(value)?,
                        target: None,
                    });
                }
            }
        }
        Ok(StmtKind::With {
            items,
            body: self.block(self.required(node, "body")?)?,
            is_async: has_token(node, "async"),
        })
    }

    fn decorated(&mut self, node: Node<'_>) -> Result<Stmt> {
        let mut decorators = Vec::new();
        for decorator in named(node).into_iter().filter(|c| c.kind() == "decorator") {
            decorators.push(self.expr(self.only_child(decorator)?)?);
        }
        let definition = self.required(node, "definition")?;
        let kind = match definition.kind() {
            "function_definition" => StmtKind::FunctionDef(self.function(definition, decorators)?),
            "class_definition" => StmtKind::ClassDef(self.class(definition, decorators)?),
            other => return Err(self.error_at(definition, format!("cannot decorate `{other}`"))),
        };
        Ok(Stmt {
            kind,
            line: line(definition),
        })
    }

    fn function(&mut self, node: Node<'_>, decorators: Vec<Expr>) -> Result<FunctionDef> {
        let type_params = match node.child_by_field_name("type_parameters") {
            Some(params) => self.type_params(params)?,
            None => Vec::new(),
        };
        let returns = match node.child_by_field_name("return_type") {
            Some(returns) => Some(self.expr(returns)?),
            None => None,
        };
        Ok(FunctionDef {
            name: self.text(self.required(node, "name")?).to_string(),
            type_params,
            params: self.parameters(self.required(node, "parameters")?)?,
            body: self.block(self.required(node, "body")?)?,
            decorators,
            returns,
            is_async: has_token(node, "async"),
        })
    }

    fn class(&mut self, node: Node<'_>, decorators: Vec<Expr>) -> Result<ClassDef> {
        let type_params = match node.child_by_field_name("type_parameters") {
            Some(params) => self.type_params(params)?,
            None => Vec::new(),
        };
        let (bases, keywords) = match node.child_by_field_name("superclasses") {
            Some(arguments) => self.arguments(arguments)?,
            None => (Vec::new(), Vec::new()),
        };
        Ok(ClassDef {
            name: self.text(self.required(node, "name")?).to_string(),
            type_params,
            bases,
            keywords,
            body: self.block(self.required(node, "body")?)?,
            decorators,
        })
    }

    fn type_params(&mut self, node: Node<'_>) -> Result<Vec<TypeParam>> {
        let mut params = Vec::new();
        for param in named(node) {
            let param = unwrap_type(param);
            let (name, bound) = match param.kind() {
                "identifier" => (self.text(param), None),
                "splat_type" | "list_splat" | "list_splat_pattern" | "dictionary_splat" => {
                    (self.text(self.only_child(param)?), None)
                }
                "constrained_type" => {
                    let parts = named(param);
                    let (Some(name), Some(bound)) = (parts.first(), parts.last()) else {
                        return Err(self.error_at(param, "incomplete type parameter bound"));
                    };
                    (self.text(unwrap_type(*name)), Some(self.expr(*bound)?))
                }
                other => {
                    return Err(self.error_at(param, format!("unsupported type parameter `{other}`")));
                }
            };
            params.push(TypeParam {
                name: name.to_string(),
                bound,
                line: line(param),
            });
        }
        Ok(params)
    }

    fn type_alias(&mut self, node: Node<'_>) -> Result<StmtKind> {
        let parts = named(node);
        let (Some(left), Some(right), 2) = (parts.first(), parts.last(), parts.len()) else {
            return Err(self.error_at(node, "incomplete type alias"));
        };
        let left = unwrap_type(*left);
        let (name, type_params) = match left.kind() {
            "identifier" => (self.text(left).to_string(), Vec::new()),
            "generic_type" => {
                let pieces = named(left);
                let Some(name) = pieces.first() else {
                    return Err(self.error_at(left, "type alias without a name"));
                };
                let type_params = match pieces.get(1) {
                    Some(params) => self.type_params(*params)?,
                    None => Vec::new(),
                };
                (self.text(*name).to_string(), type_params)
            }
            other => return Err(self.error_at(left, format!("cannot alias `{other}`"))),
        };
        Ok(StmtKind::TypeAlias {
            name,
            type_params,
            value: self.expr(*right)?,
        })
    }

    fn parameters(&mut self, node: Node<'_>) -> Result<Parameters> {
        let mut params = Parameters::default();
        let mut keyword_only = false;
        for child in named(node) {
            let (name, annotation, default) = match child.kind() {
                "positional_separator" => {
                    for mut param in std::mem::take(&mut params.args) {
                        param.kind = ParamKind::PositionalOnly;
                        params.posonly.push(param);
                    }
                    continue;
                }
                "keyword_separator" => {
                    keyword_only = true;
                    continue;
                }
                "identifier" => (child, None, None),
                "list_splat_pattern" | "dictionary_splat_pattern" => (child, None, None),
                "default_parameter" => (
                    self.required(child, "name")?,
                    None,
                    Some(self.required(child, "value")?),
                ),
                "typed_parameter" => {
                    let Some(name) = named(child).first().copied() else {
                        return Err(self.error_at(child, "parameter without a name"));
                    };
                    (name, Some(self.required(child, "type")?), None)
                }
                "typed_default_parameter" => (
                    self.required(child, "name")?,
                    Some(self.required(child, "type")?),
                    Some(self.required(child, "value")?),
                ),
                other => {
                    return Err(self.error_at(child, format!("unsupported parameter `{other}`")));
                }
            };

            let (kind, text) = match name.kind() {
                "list_splat_pattern" => (ParamKind::VarArgs, self.text(self.only_child(name)?)),
                "dictionary_splat_pattern" => {
                    (ParamKind::VarKeywords, self.text(self.only_child(name)?))
                }
                "identifier" if keyword_only => (ParamKind::KeywordOnly, self.text(name)),
                "identifier" => (ParamKind::Positional, self.text(name)),
                other => {
                    return Err(self.error_at(name, format!("unsupported parameter `{other}`")));
                }
            };
            let param = Param {
                name: text.to_string(),
                annotation: annotation.map(|a| self.expr(a)).transpose()?,
                default: default.map(|d| self.expr(d)).transpose()?,
                kind,
                line: line(child),
            };
            match kind {
                ParamKind::VarArgs => {
                    params.vararg = Some(param);
                    keyword_only = true;
                }
                ParamKind::VarKeywords => params.kwarg = Some(param),
                ParamKind::KeywordOnly => params.kwonly.push(param),
                _ => params.args.push(param),
            }
        }
        Ok(params)
    }

    fn match_statement(&mut self, node: Node<'_>) -> Result<StmtKind> {
        let subjects = fields(node, "subject");
        let subject = match subjects.as_slice() {
            [single] => self.expr(*single)?,
            [first, ..] => {
                let elements = self.exprs(subjects.clone())?;
                self.at(*first, ExprKind::Tuple(elements))
            }
            [] => return Err(self.error_at(node, "`match` without a subject")),
        };
        let mut cases = Vec::new();
        for case in named(self.required(node, "body")?) {
            if case.kind() == "case_clause" {
                cases.push(self.case_clause(case)?);
            }
        }
        Ok(StmtKind::Match { subject, cases })
    }

    fn case_clause(&mut self, node: Node<'_>) -> Result<MatchCase> {
        let patterns: Vec<_> = named(node)
            .into_iter()
            .filter(|c| c.kind() == "case_pattern")
            .collect();
        let pattern = match patterns.as_slice() {
            [single] => self.pattern(*single)?,
            _ => Pattern::Sequence(
                patterns
                    .iter()
                    .map(|p| self.pattern(*p))
                    .collect::<Result<_>>()?,
            ),
        };
        let guard = match node.child_by_field_name("guard") {
            Some(guard) => Some(self.expr(self.only_child(guard)?)?),
            None => None,
        };
        Ok(MatchCase {
            pattern,
            guard,
            body: self.block(self.required(node, "consequence")?)?,
            line: line(node),
        })
    }

    fn pattern(&mut self, node: Node<'_>) -> Result<Pattern> {
        self.enter(node)?;
        let pattern = self.lower_pattern(node);
        self.depth -= 1;
        pattern
    }

    fn patterns(&mut self, nodes: Vec<Node<'_>>) -> Result<Vec<Pattern>> {
        nodes.into_iter().map(|n| self.pattern(n)).collect()
    }

    fn lower_pattern(&mut self, node: Node<'_>) -> Result<Pattern> {
        let parts = named(node);
        Ok(match node.kind() {
            "case_pattern" => match parts.as_slice() {
                [] if self.text(node).trim() == "_" => Pattern::Wildcard,
                [] => return Err(self.error_at(node, "empty pattern")),
                [number] if self.text(node).trim_start().starts_with('-') => {
                    let operand = self.expr(*number)?;
                    Pattern::Value(self.at(
                        node,
                        ExprKind::UnaryOp {
                            op: UnaryOperator::USub,
                            operand: Box::new(operand),
                        },
                    ))
                }
                [inner] => return self.pattern(*inner),
                _ => Pattern::Sequence(self.patterns(parts)?),
            },
            "as_pattern" => {
                let (Some(inner), Some(alias), true) = (parts.first(), parts.last(), parts.len() > 1)
                else {
                    return Err(self.error_at(node, "incomplete `as` pattern"));
                };
                Pattern::As {
                    pattern: Box::new(self.pattern(*inner)?),
                    name: self.text(*alias).trim().to_string(),
                }
            }
            "union_pattern" => Pattern::Or(self.patterns(parts)?),
            "list_pattern" | "tuple_pattern" => Pattern::Sequence(self.patterns(parts)?),
            "splat_pattern" => Pattern::Star(
                parts
                    .first()
                    .map(|name| self.text(*name).to_string())
                    .filter(|name| name != "_"),
            ),
            "dict_pattern" => {
                let mut keys = Vec::new();
                let mut patterns = Vec::new();
                let mut rest = None;
                for part in parts {
                    if part.kind() == "splat_pattern" {
                        rest = named(part).first().map(|n| self.text(*n).to_string());
                    } else if keys.len() == patterns.len() {
                        keys.push(self.pattern_value(part)?);
                    } else {
                        patterns.push(self.pattern(part)?);
                    }
                }
                if keys.len() != patterns.len() {
                    return Err(self.error_at(node, "mapping pattern key without a value"));
                }
                Pattern::Mapping {
                    keys,
                    patterns,
                    rest,
                }
            }
            "class_pattern" => {
                let Some((cls, arguments)) = parts.split_first() else {
                    return Err(self.error_at(node, "class pattern without a class"));
                };
                let cls = self.pattern_value(*cls)?;
                let mut patterns = Vec::new();
                let mut keywords = Vec::new();
                for argument in arguments {
                    let argument = match named(*argument).as_slice() {
                        [keyword] if keyword.kind() == "keyword_pattern" => *keyword,
                        _ => *argument,
                    };
                    if argument.kind() == "keyword_pattern" {
                        let pieces = named(argument);
                        let Some(name) = pieces.first() else {
                            return Err(self.error_at(argument, "keyword pattern without a name"));
                        };
                        let value = match pieces.get(1) {
                            Some(value) => self.pattern(*value)?,
                            None => Pattern::Wildcard,
                        };
                        keywords.push((self.text(*name).to_string(), value));
                    } else {
                        patterns.push(self.pattern(argument)?);
                    }
                }
                Pattern::Class {
                    cls,
                    patterns,
                    keywords,
                }
            }
            "dotted_name" if parts.len() > 1 => Pattern::Value(self.pattern_value(node)?),
            "dotted_name" | "identifier" => match self.text(node).trim() {
                "_" => Pattern::Wildcard,
                name => Pattern::Capture(name.to_string()),
            },
            "complex_pattern" => Pattern::Value(self.at(
                node,
                ExprKind::Constant(Constant::Complex(self.text(node).to_string())),
            )),
            "string" | "concatenated_string" | "integer" | "float" | "true" | "false" | "none" => {
                Pattern::Value(self.expr(node)?)
            }
            other => return Err(self.error_at(node, format!("unsupported pattern `{other}`"))),
        })
    }

    /// Lowers a dotted name or literal used as a value inside a pattern.
    fn pattern_value(&mut self, node: Node<'_>) -> Result<Expr> {
        if node.kind() != "dotted_name" {
            return self.expr(node);
        }
        let mut parts = named(node).into_iter();
        let Some(first) = parts.next() else {
            return Err(self.error_at(node, "empty dotted name"));
        };
        let mut value = self.at(first, ExprKind::Name(self.text(first).to_string()));
        for attr in parts {
            value = self.at(
                first,
                ExprKind::Attribute {
                    value: Box::new(value),
                    attr: self.text(attr).to_string(),
                },
            );
        }
        Ok(value)
    }

    fn only_child<'t>(&self, node: Node<'t>) -> Result<Node<'t>> {
        named(node)
            .first()
            .copied()
            .ok_or_else(|| self.error_at(node, format!("empty `{}`", node.kind())))
    }

    fn exprs(&mut self, nodes: Vec<Node<'_>>) -> Result<Vec<Expr>> {
        nodes.into_iter().map(|n| self.expr(n)).collect()
    }

    pub(crate) fn expr(&mut self, node: Node<'_>) -> Result<Expr> {
        self.enter(node)?;
        let expr = self.lower_expr(node);
        self.depth -= 1;
        expr
    }

    fn lower_expr(&mut self, node: Node<'_>) -> Result<Expr> {
        let kind = match node.kind() {
            "identifier" | "keyword_identifier" => ExprKind::Name(self.text(node).to_string()),
            "integer" => ExprKind::Constant(number(self.text(node), false)),
            "float" => ExprKind::Constant(number(self.text(node), true)),
            "true" => ExprKind::Constant(Constant::Bool(true)),
            "false" => ExprKind::Constant(Constant::Bool(false)),
            "none" => ExprKind::Constant(Constant::None),
            "ellipsis" => ExprKind::Constant(Constant::Ellipsis),
            "string" | "concatenated_string" => self.string(node)?,
            "parenthesized_expression" | "parenthesized_list_splat" | "type" => {
                return self.expr(self.only_child(node)?);
            }
            "tuple" | "expression_list" | "pattern_list" | "tuple_pattern" => {
                ExprKind::Tuple(self.exprs(named(node))?)
            }
            "list" | "list_pattern" => ExprKind::List(self.exprs(named(node))?),
            "set" => ExprKind::Set(self.exprs(named(node))?),
            "list_splat" | "list_splat_pattern" => {
                ExprKind::Starred(Box::new(self.expr(self.only_child(node)?)?))
            }
            "dictionary" => {
                let mut keys = Vec::new();
                let mut values = Vec::new();
                for entry in named(node) {
                    match entry.kind() {
                        "pair" => {
                            keys.push(Some(self.expr(self.required(entry, "key")?)?));
                            values.push(self.expr(self.required(entry, "value")?)?);
                        }
                        _ => {
                            keys.push(None);
                            values.push(self.expr(self.only_child(entry)?)?);
                        }
                    }
                }
                ExprKind::Dict { keys, values }
            }
            "attribute" => ExprKind::Attribute {
                value: Box::new(self.expr(self.required(node, "object")?)?),
                attr: self.text(self.required(node, "attribute")?).to_string(),
            },
            "subscript" => {
                let value = self.expr(self.required(node, "value")?)?;
                let subscripts = fields(node, "subscript");
                let slice = match subscripts.as_slice() {
                    [single] => self.expr(*single)?,
                    [first, ..] => {
                        let elements = self.exprs(subscripts.clone())?;
                        self.at(*first, ExprKind::Tuple(elements))
                    }
                    [] => return Err(self.error_at(node, "empty subscript")),
                };
                ExprKind::Subscript {
                    value: Box::new(value),
                    slice: Box::new(slice),
                }
            }
            "slice" => {
                let mut bounds: [Option<Box<Expr>>; 3] = [None, None, None];
                let mut colons = 0;
                for child in children(node) {
                    if child.is_named() {
                        if let Some(bound) = bounds.get_mut(colons) {
                            *bound = Some(Box::new(self.expr(child)?));
                        }
                    } else if child.kind() == ":" {
                        colons += 1;
                    }
                }
                let [lower, upper, step] = bounds;
                ExprKind::Slice { lower, upper, step }
            }
            "call" => {
                let func = self.expr(self.required(node, "function")?)?;
                let arguments = self.required(node, "arguments")?;
                let (args, keywords) = if arguments.kind() == "generator_expression" {
                    (vec![self.expr(arguments)?], Vec::new())
                } else {
                    self.arguments(arguments)?
                };
                ExprKind::Call {
                    func: Box::new(func),
                    args,
                    keywords,
                }
            }
            "binary_operator" => {
                let operator = self.required(node, "operator")?;
                let op = Operator::from_binary(self.text(operator)).ok_or_else(|| {
                    self.error_at(operator, format!("unknown operator `{}`", self.text(operator)))
                })?;
                ExprKind::BinOp {
                    left: Box::new(self.expr(self.required(node, "left")?)?),
                    op,
                    right: Box::new(self.expr(self.required(node, "right")?)?),
                }
            }
            "unary_operator" => {
                let op = match self.text(self.required(node, "operator")?) {
                    "-" => UnaryOperator::USub,
                    "+" => UnaryOperator::UAdd,
                    _ => UnaryOperator::Invert,
                };
                ExprKind::UnaryOp {
                    op,
                    operand: Box::new(self.expr(self.required(node, "argument")?)?),
                }
            }
            "not_operator" => ExprKind::UnaryOp {
                op: UnaryOperator::Not,
                operand: Box::new(self.expr(self.required(node, "argument")?)?),
            },
            "boolean_operator" => self.boolean_operator(node)?,
            "comparison_operator" => {
                let mut operands = Vec::new();
                let mut ops = Vec::new();
                let mut pending: Vec<&str> = Vec::new();
                for child in children(node) {
                    if child.is_named() {
                        if !pending.is_empty() {
                            let op = pending.join(" ");
                            ops.push(compare_operator(&op).ok_or_else(|| {
                                self.error_at(child, format!("unknown comparison `{op}`"))
                            })?);
                            pending.clear();
                        }
                        operands.push(self.expr(child)?);
                    } else {
                        pending.push(child.kind());
                    }
                }
                if operands.len() < 2 || ops.len() != operands.len() - 1 {
                    return Err(self.error_at(node, "malformed comparison"));
                }
                let left = operands.remove(0);
                ExprKind::Compare {
                    left: Box::new(left),
                    ops,
                    comparators: operands,
                }
            }
            "lambda" => {
                let params = match node.child_by_field_name("parameters") {
                    Some(params) => self.parameters(params)?,
                    None => Parameters::default(),
                };
                ExprKind::Lambda {
                    params: Box::new(params),
                    body: Box::new(self.expr(self.required(node, "body")?)?),
                }
            }
            "conditional_expression" => {
                let parts = named(node);
                let [body, test, orelse] = parts.as_slice() else {
                    return Err(self.error_at(node, "malformed conditional expression"));
                };
                ExprKind::IfExp {
                    test: Box::new(self.expr(*test)?),
                    body: Box::new(self.expr(*body)?),
                    orelse: Box::new(self.expr(*orelse)?),
                }
            }
            "named_expression" => ExprKind::NamedExpr {
                target: Box::new(self.expr(self.required(node, "name")?)?),
                value: Box::new(self.expr(self.required(node, "value")?)?),
            },
            "await" => ExprKind::Await(Box::new(self.expr(self.only_child(node)?)?)),
            "yield" => {
                let value = named(node).first().copied();
                match value {
                    Some(value) if has_token(node, "from") => {
                        ExprKind::YieldFrom(Box::new(self.expr(value)?))
                    }
                    Some(value) => ExprKind::Yield(Some(Box::new(self.expr(value)?))),
                    None => ExprKind::Yield(None),
                }
            }
            "list_comprehension" | "set_comprehension" | "generator_expression"
            | "dictionary_comprehension" => self.comprehension(node)?,
            "generic_type" => {
                let parts = named(node);
                let [value, params] = parts.as_slice() else {
                    return Err(self.error_at(node, "malformed generic type"));
                };
                let value = self.expr(*value)?;
                let arguments = named(*params);
                let slice = match arguments.as_slice() {
                    [single] => self.expr(*single)?,
                    _ => {
                        let elements = self.exprs(arguments)?;
                        self.at(*params, ExprKind::Tuple(elements))
                    }
                };
                ExprKind::Subscript {
                    value: Box::new(value),
                    slice: Box::new(slice),
                }
            }
            "union_type" => {
                let parts = named(node);
                let [left, right] = parts.as_slice() else {
                    return Err(self.error_at(node, "malformed union type"));
                };
                ExprKind::BinOp {
                    left: Box::new(self.expr(*left)?),
                    op: Operator::BitOr,
                    right: Box::new(self.expr(*right)?),
                }
            }
            "member_type" => {
                let parts = named(node);
                let [value, attr] = parts.as_slice() else {
                    return Err(self.error_at(node, "malformed member type"));
                };
                ExprKind::Attribute {
                    value: Box::new(self.expr(*value)?),
                    attr: self.text(*attr).to_string(),
                }
            }
            "splat_type" | "constrained_type" => return self.expr(self.only_child(node)?),
            other => return Err(self.error_at(node, format!("unsupported expression `{other}`"))),
        };
        Ok(self.at(node, kind))
    }

    /// `a and b and c` is left-nested in the tree; it is flattened into a
    /// single operation the way Python's own parser does.
    fn boolean_operator(&mut self, node: Node<'_>) -> Result<ExprKind> {
        let operator = self.text(self.required(node, "operator")?);
        let op = match operator {
            "and" => BoolOperator::And,
            _ => BoolOperator::Or,
        };
        let mut operands = vec![self.required(node, "right")?];
        let mut left = self.required(node, "left")?;
        while left.kind() == "boolean_operator"
            && left
                .child_by_field_name("operator")
                .is_some_and(|o| self.text(o) == operator)
        {
            operands.push(self.required(left, "right")?);
            left = self.required(left, "left")?;
        }
        operands.push(left);
        operands.reverse();
        Ok(ExprKind::BoolOp {
            op,
            values: self.exprs(operands)?,
        })
    }

    fn arguments(&mut self, node: Node<'_>) -> Result<(Vec<Expr>, Vec<Keyword>)> {
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        for argument in named(node) {
            match argument.kind() {
                "keyword_argument" => keywords.push(Keyword {
                    arg: Some(self.text(self.required(argument, "name")?).to_string()),
                    value: self.expr(self.required(argument, "value")?)?,
                }),
                "dictionary_splat" => keywords.push(Keyword {
                    arg: None,
                    value: self.expr(self.only_child(argument)?)?,
                }),
                _ => args.push(self.expr(argument)?),
            }
        }
        Ok((args, keywords))
    }

    fn comprehension(&mut self, node: Node<'_>) -> Result<ExprKind> {
        let body = self.required(node, "body")?;
        let mut generators: Vec<Comprehension> = Vec::new();
        for clause in named(node) {
            match clause.kind() {
                "for_in_clause" => {
                    let rights = fields(clause, "right");
                    let iter = match rights.as_slice() {
                        [single] => self.expr(*single)?,
                        [first, ..] => {
                            let elements = self.exprs(rights.clone())?;
                            self.at(*first, ExprKind::Tuple(elements))
                        }
                        [] => return Err(self.error_at(clause, "`for` clause without iterable")),
                    };
                    generators.push(Comprehension {
                        target: self.target(self.required(clause, "left")?)?,
                        iter,
                        ifs: Vec::new(),
                        is_async: has_token(clause, "async"),
                    });
                }
                "if_clause" => {
                    let condition = self.expr(self.only_child(clause)?)?;
                    let Some(generator) = generators.last_mut() else {
                        return Err(self.error_at(clause, "`if` clause before any `for`"));
                    };
                    generator.ifs.push(condition);
                }
                _ => {}
            }
        }

        Ok(match node.kind() {
            "dictionary_comprehension" => ExprKind::DictComp {
                key: Box::new(self.expr(self.required(body, "key")?)?),
                value: Box::new(self.expr(self.required(body, "value")?)?),
                generators,
            },
            kind => {
                let elt = Box::new(self.expr(body)?);
                match kind {
                    "list_comprehension" => ExprKind::ListComp { elt, generators },
                    "set_comprehension" => ExprKind::SetComp { elt, generators },
                    _ => ExprKind::GeneratorExp { elt, generators },
                }
            }
        })
    }

    fn string(&mut self, node: Node<'_>) -> Result<ExprKind> {
        let parts = match node.kind() {
            "concatenated_string" => named(node),
            _ => vec![node],
        };
        let mut value = String::new();
        let mut values = Vec::new();
        let mut formatted = false;
        let mut bytes = false;
        for part in parts {
            let text = self.text(part);
            let prefix = text.find(['\'', '"']).unwrap_or(0);
            let flags = text[..prefix].to_ascii_lowercase();
            formatted |= flags.contains('f');
            bytes |= flags.contains('b');
            value.push_str(&literal_body(text, prefix, flags.contains('r')));
            self.interpolations(part, &mut values)?;
        }
        Ok(if formatted {
            ExprKind::FString {
                text: self.text(node).to_string(),
                values,
            }
        } else if bytes {
            ExprKind::Constant(Constant::Bytes(value))
        } else {
            ExprKind::Constant(Constant::Str(value))
        })
    }

    /// Collects the expressions of `{...}` replacement fields, descending
    /// into format specs such as `{value:>{width}}`.
    fn interpolations(&mut self, node: Node<'_>, out: &mut Vec<Expr>) -> Result<()> {
        self.enter(node)?;
        let result = self.lower_interpolations(node, out);
        self.depth -= 1;
        result
    }

    fn lower_interpolations(&mut self, node: Node<'_>, out: &mut Vec<Expr>) -> Result<()> {
        for child in named(node) {
            match child.kind() {
                "interpolation" | "format_expression" => {
                    let expression = child
                        .child_by_field_name("expression")
                        .or_else(|| named(child).first().copied());
                    if let Some(expression) = expression {
                        out.push(self.expr(expression)?);
                    }
                    if let Some(spec) = child.child_by_field_name("format_specifier") {
                        self.interpolations(spec, out)?;
                    }
                }
                "format_specifier" => self.interpolations(child, out)?,
                _ => {}
            }
        }
        Ok(())
    }
}
