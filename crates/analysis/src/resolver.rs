use crate::builtins::is_builtin;
use crate::scopes::ScopeTable;
use crate::types::*;
use crate::value_types::{TypeEnv, infer_value_type};
use python_ast::{
    Comprehension, Expr, ExprKind, FunctionDef, MatchCase, Module, Parameters, Stmt, StmtKind,
    TypeParam, parse_module, unparse,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use tracing::debug;

/// Longest context snippet kept for an unresolved identifier, in characters.
const MAX_SNIPPET_CHARS: usize = 160;

/// Scope and symbol resolution over a parsed module.
///
/// The analyzer is stateless; every call builds a fresh scope arena.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticAnalyzer;

impl StaticAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Parses and analyzes `source`. Syntax errors produce an empty analysis
    /// carrying the error.
    pub fn analyze_source(&self, source: &str) -> StaticAnalysis {
        match parse_module(source) {
            Ok(module) => self.analyze(&module, source),
            Err(error) => {
                debug!(line = error.line, "source did not parse: {}", error.message);
                StaticAnalysis::failed(error)
            }
        }
    }

    pub fn analyze(&self, module: &Module, source: &str) -> StaticAnalysis {
        let mut resolver = Resolver::new(source);
        resolver.run(module);
        let analysis = resolver.finish();
        debug!(
            scopes = analysis.scopes.len(),
            symbols = analysis.symbols.len(),
            unresolved = analysis.unresolved.len(),
            "static analysis complete"
        );
        analysis
    }
}

/// Work queued until the enclosing scope's body has been fully visited.
enum Deferred<'a> {
    Function {
        scope: ScopeId,
        def: &'a FunctionDef,
        symbol: Option<usize>,
    },
    Lambda {
        scope: ScopeId,
        body: &'a Expr,
    },
    /// Alias values are evaluated lazily, like a function body.
    TypeAlias {
        scope: ScopeId,
        type_params: &'a [TypeParam],
        value: &'a Expr,
    },
}

/// Return statements seen while visiting one function body.
#[derive(Default)]
struct ReturnSummary {
    types: Vec<Option<String>>,
    yields: bool,
}

struct Resolver<'a> {
    lines: Vec<&'a str>,
    table: ScopeTable,
    symbols: Vec<Symbol>,
    symbol_index: FxHashMap<(ScopeId, String), usize>,
    unresolved: Vec<UnresolvedIdentifier>,
    variable_types: FxHashMap<(ScopeId, String), String>,
    classes: FxHashSet<(ScopeId, String)>,
    deferred: VecDeque<Deferred<'a>>,
    returns: ReturnSummary,
    /// Type parameters in effect while visiting annotations and bases.
    generic: Vec<&'a str>,
}

impl<'a> Resolver<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            lines: source.lines().collect(),
            table: ScopeTable::new(),
            symbols: Vec::new(),
            symbol_index: FxHashMap::default(),
            unresolved: Vec::new(),
            variable_types: FxHashMap::default(),
            classes: FxHashSet::default(),
            deferred: VecDeque::new(),
            returns: ReturnSummary::default(),
            generic: Vec::new(),
        }
    }

    fn run(&mut self, module: &'a Module) {
        self.visit_body(ScopeId::MODULE, &module.body);

        while let Some(work) = self.deferred.pop_front() {
            match work {
                Deferred::Function { scope, def, symbol } => {
                    self.returns = ReturnSummary::default();
                    self.visit_body(scope, &def.body);
                    let summary = std::mem::take(&mut self.returns);
                    if let Some(index) = symbol {
                        self.set_inferred_return(index, summary);
                    }
                }
                Deferred::Lambda { scope, body } => self.visit_expr(scope, body),
                Deferred::TypeAlias {
                    scope,
                    type_params,
                    value,
                } => self.with_type_params(scope, type_params, |resolver| {
                    resolver.visit_expr(scope, value)
                }),
            }
        }
    }

    fn finish(mut self) -> StaticAnalysis {
        self.unresolved
            .sort_by(|a, b| (a.use_line, a.column).cmp(&(b.use_line, b.column)));
        self.symbols.sort_by_key(|s| s.decl_line);
        StaticAnalysis {
            scopes: self.table.into_scopes(),
            symbols: self.symbols,
            unresolved: self.unresolved,
            error: None,
        }
    }

    // ---------------------------------------------------------------
    // Bookkeeping
    // ---------------------------------------------------------------

    fn snippet(&self, line: usize) -> String {
        let text = self
            .lines
            .get(line.saturating_sub(1))
            .map(|l| l.trim())
            .unwrap_or_default();
        text.chars().take(MAX_SNIPPET_CHARS).collect()
    }

    fn read(&mut self, scope: ScopeId, name: &str, line: usize, column: usize) {
        if self.table.resolve(scope, name).is_some()
            || is_builtin(name)
            || self.generic.iter().any(|param| *param == name)
        {
            return;
        }
        let context_snippet = self.snippet(line);
        self.unresolved.push(UnresolvedIdentifier {
            name: name.to_string(),
            use_line: line,
            column,
            enclosing_scope_id: scope,
            context_snippet,
        });
    }

    /// Records the first binding of a name in a scope as a symbol. Later
    /// rebindings only update the tracked value type.
    fn declare(
        &mut self,
        scope: ScopeId,
        name: &str,
        kind: SymbolKind,
        line: usize,
        details: SymbolDetails,
    ) -> Option<usize> {
        let target = self.table.bind(scope, name);
        let key = (target, name.to_string());
        if self.symbol_index.contains_key(&key) {
            return None;
        }
        let index = self.symbols.len();
        self.symbols.push(Symbol {
            name: name.to_string(),
            kind,
            scope_id: target,
            decl_line: line,
            details,
        });
        self.symbol_index.insert(key, index);
        Some(index)
    }

    fn declare_variable(
        &mut self,
        scope: ScopeId,
        name: &str,
        line: usize,
        annotation: Option<String>,
        value_type: Option<String>,
    ) {
        let target = self.table.bind(scope, name);
        match &value_type {
            Some(ty) => {
                self.variable_types
                    .insert((target, name.to_string()), ty.clone());
            }
            None => {
                self.variable_types.remove(&(target, name.to_string()));
            }
        }
        self.declare(
            scope,
            name,
            SymbolKind::Variable,
            line,
            SymbolDetails::Variable {
                annotation,
                value_type,
            },
        );
    }

    fn set_inferred_return(&mut self, index: usize, summary: ReturnSummary) {
        let inferred = if summary.yields {
            Some("Generator".to_string())
        } else if summary.types.is_empty() {
            Some("None".to_string())
        } else {
            let known: Option<Vec<String>> = summary.types.into_iter().collect();
            known.map(|types| {
                let mut distinct: Vec<String> = Vec::new();
                for ty in types {
                    if !distinct.contains(&ty) {
                        distinct.push(ty);
                    }
                }
                distinct.join(" | ")
            })
        };
        if let SymbolDetails::Function {
            inferred_return, ..
        } = &mut self.symbols[index].details
        {
            *inferred_return = inferred;
        }
    }

    fn value_type(&self, scope: ScopeId, value: &Expr) -> Option<String> {
        let env = ScopeEnv {
            resolver: self,
            scope,
        };
        infer_value_type(value, &env)
    }

    // ---------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------

    fn visit_body(&mut self, scope: ScopeId, body: &'a [Stmt]) {
        for stmt in body {
            self.visit_stmt(scope, stmt);
        }
    }

    fn visit_stmt(&mut self, scope: ScopeId, stmt: &'a Stmt) {
        let line = stmt.line;
        match &stmt.kind {
            StmtKind::FunctionDef(def) => self.visit_function(scope, def, line),
            StmtKind::ClassDef(class) => {
                for decorator in &class.decorators {
                    self.visit_expr(scope, decorator);
                }
                self.with_type_params(scope, &class.type_params, |resolver| {
                    for base in &class.bases {
                        resolver.visit_expr(scope, base);
                    }
                    for keyword in &class.keywords {
                        resolver.visit_expr(scope, &keyword.value);
                    }
                });

                let class_scope =
                    self.table
                        .push(ScopeKind::Class, &class.name, Some(scope), line);
                for param in &class.type_params {
                    self.table.declare_type_param(class_scope, &param.name);
                }
                self.visit_body(class_scope, &class.body);

                let target = self.table.bind(scope, &class.name);
                self.classes.insert((target, class.name.clone()));
                self.declare(
                    scope,
                    &class.name,
                    SymbolKind::Class,
                    line,
                    SymbolDetails::Class {
                        bases: class.bases.iter().map(unparse).collect(),
                        decorators: class.decorators.iter().map(unparse).collect(),
                    },
                );
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.visit_expr(scope, value);
                    let ty = self.value_type(scope, value);
                    self.returns.types.push(ty);
                }
            }
            StmtKind::Delete(targets) => {
                for target in targets {
                    self.visit_expr(scope, target);
                }
            }
            StmtKind::Assign { targets, value } => {
                self.visit_expr(scope, value);
                let value_type = self.value_type(scope, value);
                for target in targets {
                    self.bind_target(scope, target, line, value_type.clone());
                }
            }
            StmtKind::AugAssign { target, value, .. } => {
                self.visit_expr(scope, value);
                match &target.kind {
                    ExprKind::Name(name) => {
                        // Read the current binding before rebinding it.
                        self.read(scope, name, target.line, target.column);
                        self.table.bind(scope, name);
                    }
                    _ => self.visit_expr(scope, target),
                }
            }
            StmtKind::AnnAssign {
                target,
                annotation,
                value,
            } => {
                self.visit_annotation(scope, annotation);
                if let Some(value) = value {
                    self.visit_expr(scope, value);
                }
                match &target.kind {
                    ExprKind::Name(name) => {
                        let value_type = value.as_ref().and_then(|v| self.value_type(scope, v));
                        self.declare_variable(
                            scope,
                            name,
                            line,
                            Some(unparse(annotation)),
                            value_type,
                        );
                    }
                    _ => self.visit_expr(scope, target),
                }
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
                ..
            } => {
                self.visit_expr(scope, iter);
                self.bind_target(scope, target, line, None);
                self.visit_body(scope, body);
                self.visit_body(scope, orelse);
            }
            StmtKind::While { test, body, orelse } => {
                self.visit_expr(scope, test);
                self.visit_body(scope, body);
                self.visit_body(scope, orelse);
            }
            StmtKind::If { test, body, orelse } => {
                self.visit_expr(scope, test);
                self.visit_body(scope, body);
                self.visit_body(scope, orelse);
            }
            StmtKind::With { items, body, .. } => {
                for item in items {
                    self.visit_expr(scope, &item.context);
                    if let Some(target) = &item.target {
                        self.bind_target(scope, target, line, None);
                    }
                }
                self.visit_body(scope, body);
            }
            StmtKind::Raise { exc, cause } => {
                if let Some(exc) = exc {
                    self.visit_expr(scope, exc);
                }
                if let Some(cause) = cause {
                    self.visit_expr(scope, cause);
                }
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.visit_body(scope, body);
                for handler in handlers {
                    if let Some(typ) = &handler.typ {
                        self.visit_expr(scope, typ);
                    }
                    if let Some(name) = &handler.name {
                        let exception_type = handler.typ.as_ref().and_then(|t| match &t.kind {
                            ExprKind::Name(_) | ExprKind::Attribute { .. } => Some(unparse(t)),
                            _ => None,
                        });
                        self.declare_variable(scope, name, handler.line, None, exception_type);
                    }
                    self.visit_body(scope, &handler.body);
                }
                self.visit_body(scope, orelse);
                self.visit_body(scope, finalbody);
            }
            StmtKind::Assert { test, msg } => {
                self.visit_expr(scope, test);
                if let Some(msg) = msg {
                    self.visit_expr(scope, msg);
                }
            }
            StmtKind::Import(aliases) => {
                for alias in aliases {
                    let bound = alias
                        .asname
                        .clone()
                        .unwrap_or_else(|| alias.name.split('.').next().unwrap_or_default().to_string());
                    self.declare(
                        scope,
                        &bound,
                        SymbolKind::Import,
                        line,
                        SymbolDetails::Import {
                            module: Some(alias.name.clone()),
                            imported: None,
                        },
                    );
                }
            }
            StmtKind::ImportFrom {
                module,
                names,
                level,
            } => {
                let source = format!("{}{}", ".".repeat(*level), module.as_deref().unwrap_or(""));
                for alias in names.iter().filter(|a| a.name != "*") {
                    let bound = alias.asname.as_deref().unwrap_or(&alias.name);
                    self.declare(
                        scope,
                        bound,
                        SymbolKind::Import,
                        line,
                        SymbolDetails::Import {
                            module: Some(source.clone()),
                            imported: Some(alias.name.clone()),
                        },
                    );
                }
            }
            StmtKind::TypeAlias {
                name,
                type_params,
                value,
            } => {
                self.declare_variable(scope, name, line, None, None);
                self.deferred.push_back(Deferred::TypeAlias {
                    scope,
                    type_params,
                    value,
                });
            }
            StmtKind::Match { subject, cases } => {
                self.visit_expr(scope, subject);
                for case in cases {
                    self.visit_case(scope, case);
                }
            }
            StmtKind::Global(names) => {
                for name in names {
                    self.table.declare_global(scope, name);
                }
            }
            StmtKind::Nonlocal(names) => {
                for name in names {
                    self.table.declare_nonlocal(scope, name);
                }
            }
            StmtKind::Expr(expr) => self.visit_expr(scope, expr),
            StmtKind::Pass | StmtKind::Break | StmtKind::Continue => {}
        }
    }

    fn visit_function(&mut self, scope: ScopeId, def: &'a FunctionDef, line: usize) {
        // Decorators, defaults and annotations run in the defining scope.
        for decorator in &def.decorators {
            self.visit_expr(scope, decorator);
        }
        self.visit_parameter_defaults(scope, &def.params);
        self.with_type_params(scope, &def.type_params, |resolver| {
            for annotation in def.params.iter().filter_map(|p| p.annotation.as_ref()) {
                resolver.visit_annotation(scope, annotation);
            }
            if let Some(returns) = &def.returns {
                resolver.visit_annotation(scope, returns);
            }
        });

        let function_scope = self
            .table
            .push(ScopeKind::Function, &def.name, Some(scope), line);
        for param in &def.type_params {
            self.table.declare_type_param(function_scope, &param.name);
        }
        let parameters = self.declare_parameters(function_scope, &def.name, &def.params, line);

        let is_method = self.table.kind(scope) == ScopeKind::Class;
        let symbol = self.declare(
            scope,
            &def.name,
            SymbolKind::Function,
            line,
            SymbolDetails::Function {
                parameters,
                returns: def.returns.as_ref().map(unparse),
                inferred_return: None,
                decorators: def.decorators.iter().map(unparse).collect(),
                is_async: def.is_async,
                is_method,
            },
        );

        self.deferred.push_back(Deferred::Function {
            scope: function_scope,
            def,
            symbol,
        });
    }

    fn visit_parameter_defaults(&mut self, scope: ScopeId, params: &'a Parameters) {
        for default in params.iter().filter_map(|param| param.default.as_ref()) {
            self.visit_expr(scope, default);
        }
    }

    fn declare_parameters(
        &mut self,
        scope: ScopeId,
        function: &str,
        params: &Parameters,
        line: usize,
    ) -> Vec<ParameterInfo> {
        let mut infos = Vec::new();
        for param in params.iter() {
            let annotation = param.annotation.as_ref().map(unparse);
            let kind = ParameterKind::from(param.kind);
            let has_default = param.default.is_some();
            self.declare(
                scope,
                &param.name,
                SymbolKind::Parameter,
                param.line.max(line),
                SymbolDetails::Parameter {
                    function: function.to_string(),
                    kind,
                    annotation: annotation.clone(),
                    has_default,
                },
            );
            infos.push(ParameterInfo {
                name: param.name.clone(),
                kind,
                annotation,
                has_default,
            });
        }
        infos
    }

    /// Runs `visit` with `type_params` in effect. Bounds are read with
    /// every parameter of the list already visible.
    fn with_type_params(
        &mut self,
        scope: ScopeId,
        type_params: &'a [TypeParam],
        visit: impl FnOnce(&mut Self),
    ) {
        let depth = self.generic.len();
        self.generic
            .extend(type_params.iter().map(|param| param.name.as_str()));
        for bound in type_params.iter().filter_map(|param| param.bound.as_ref()) {
            self.visit_expr(scope, bound);
        }
        visit(self);
        self.generic.truncate(depth);
    }

    /// Pattern reads are evaluated before any capture binds; captures land
    /// in the enclosing scope like assignments.
    fn visit_case(&mut self, scope: ScopeId, case: &'a MatchCase) {
        for value in case.pattern.reads() {
            self.visit_expr(scope, value);
        }
        for name in case.pattern.captures() {
            self.declare_variable(scope, name, case.line, None, None);
        }
        if let Some(guard) = &case.guard {
            self.visit_expr(scope, guard);
        }
        self.visit_body(scope, &case.body);
    }

    /// String annotations are forward references and are not resolved.
    fn visit_annotation(&mut self, scope: ScopeId, annotation: &'a Expr) {
        self.visit_expr(scope, annotation);
    }

    fn bind_target(&mut self, scope: ScopeId, target: &'a Expr, line: usize, value_type: Option<String>) {
        match &target.kind {
            ExprKind::Name(name) => self.declare_variable(scope, name, line, None, value_type),
            ExprKind::Tuple(elts) | ExprKind::List(elts) => {
                for elt in elts {
                    self.bind_target(scope, elt, line, None);
                }
            }
            ExprKind::Starred(inner) => self.bind_target(scope, inner, line, None),
            _ => self.visit_expr(scope, target),
        }
    }

    // ---------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------

    fn visit_exprs(&mut self, scope: ScopeId, exprs: &'a [Expr]) {
        for expr in exprs {
            self.visit_expr(scope, expr);
        }
    }

    fn visit_expr(&mut self, scope: ScopeId, expr: &'a Expr) {
        match &expr.kind {
            ExprKind::Name(name) => self.read(scope, name, expr.line, expr.column),
            ExprKind::Constant(_) => {}
            ExprKind::FString { values, .. } => self.visit_exprs(scope, values),
            ExprKind::Attribute { value, .. } => self.visit_expr(scope, value),
            ExprKind::Subscript { value, slice } => {
                self.visit_expr(scope, value);
                self.visit_expr(scope, slice);
            }
            ExprKind::Call {
                func,
                args,
                keywords,
            } => {
                self.visit_expr(scope, func);
                self.visit_exprs(scope, args);
                for keyword in keywords {
                    self.visit_expr(scope, &keyword.value);
                }
            }
            ExprKind::BoolOp { values, .. } => self.visit_exprs(scope, values),
            ExprKind::BinOp { left, right, .. } => {
                self.visit_expr(scope, left);
                self.visit_expr(scope, right);
            }
            ExprKind::UnaryOp { operand, .. } => self.visit_expr(scope, operand),
            ExprKind::Compare {
                left, comparators, ..
            } => {
                self.visit_expr(scope, left);
                self.visit_exprs(scope, comparators);
            }
            ExprKind::IfExp { test, body, orelse } => {
                self.visit_expr(scope, test);
                self.visit_expr(scope, body);
                self.visit_expr(scope, orelse);
            }
            ExprKind::NamedExpr { target, value } => {
                self.visit_expr(scope, value);
                if let ExprKind::Name(name) = &target.kind {
                    let value_type = self.value_type(scope, value);
                    let bound = self.table.bind_outside_comprehensions(scope, name);
                    self.declare_variable(bound, name, target.line, None, value_type);
                }
            }
            ExprKind::Lambda { params, body } => {
                self.visit_parameter_defaults(scope, params);
                let lambda_scope =
                    self.table
                        .push(ScopeKind::Lambda, "<lambda>", Some(scope), expr.line);
                self.declare_parameters(lambda_scope, "<lambda>", params, expr.line);
                self.deferred.push_back(Deferred::Lambda {
                    scope: lambda_scope,
                    body: body.as_ref(),
                });
            }
            ExprKind::Dict { keys, values } => {
                for key in keys.iter().flatten() {
                    self.visit_expr(scope, key);
                }
                self.visit_exprs(scope, values);
            }
            ExprKind::Set(elts) | ExprKind::List(elts) | ExprKind::Tuple(elts) => {
                self.visit_exprs(scope, elts)
            }
            ExprKind::ListComp { elt, generators }
            | ExprKind::SetComp { elt, generators }
            | ExprKind::GeneratorExp { elt, generators } => {
                let inner = self.visit_comprehension(scope, generators, expr.line);
                self.visit_expr(inner, elt);
            }
            ExprKind::DictComp {
                key,
                value,
                generators,
            } => {
                let inner = self.visit_comprehension(scope, generators, expr.line);
                self.visit_expr(inner, key);
                self.visit_expr(inner, value);
            }
            ExprKind::Await(value) | ExprKind::Starred(value) => self.visit_expr(scope, value),
            ExprKind::Yield(value) => {
                self.returns.yields = true;
                if let Some(value) = value {
                    self.visit_expr(scope, value);
                }
            }
            ExprKind::YieldFrom(value) => {
                self.returns.yields = true;
                self.visit_expr(scope, value);
            }
            ExprKind::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    self.visit_expr(scope, part);
                }
            }
        }
    }

    /// The first iterable is evaluated in the enclosing scope; everything
    /// else runs in a synthetic child scope. Returns that child scope.
    fn visit_comprehension(
        &mut self,
        scope: ScopeId,
        generators: &'a [Comprehension],
        line: usize,
    ) -> ScopeId {
        if let Some(first) = generators.first() {
            self.visit_expr(scope, &first.iter);
        }
        let inner = self
            .table
            .push(ScopeKind::Comprehension, "<comprehension>", Some(scope), line);
        for (index, generator) in generators.iter().enumerate() {
            if index > 0 {
                self.visit_expr(inner, &generator.iter);
            }
            self.bind_comprehension_target(inner, &generator.target);
            for condition in &generator.ifs {
                self.visit_expr(inner, condition);
            }
        }
        inner
    }

    /// Comprehension targets are bound without creating symbols.
    fn bind_comprehension_target(&mut self, scope: ScopeId, target: &'a Expr) {
        match &target.kind {
            ExprKind::Name(name) => {
                self.table.bind(scope, name);
            }
            ExprKind::Tuple(elts) | ExprKind::List(elts) => {
                for elt in elts {
                    self.bind_comprehension_target(scope, elt);
                }
            }
            ExprKind::Starred(inner) => self.bind_comprehension_target(scope, inner),
            _ => self.visit_expr(scope, target),
        }
    }
}

/// Type environment as seen from one scope at the current point of the walk.
struct ScopeEnv<'r, 'a> {
    resolver: &'r Resolver<'a>,
    scope: ScopeId,
}

impl TypeEnv for ScopeEnv<'_, '_> {
    fn variable_type(&self, name: &str) -> Option<String> {
        let owner = self.resolver.table.resolve(self.scope, name)?;
        self.resolver
            .variable_types
            .get(&(owner, name.to_string()))
            .cloned()
    }

    fn is_class(&self, name: &str) -> bool {
        self.resolver
            .table
            .resolve(self.scope, name)
            .is_some_and(|owner| self.resolver.classes.contains(&(owner, name.to_string())))
    }
}
