use crate::types::{Scope, ScopeId, ScopeKind};
use rustc_hash::FxHashSet;

/// Arena of scopes with a parent index per entry.
///
/// Bindings are recorded as they are encountered, so a lookup only sees
/// names bound earlier in the traversal.
#[derive(Debug, Default)]
pub struct ScopeTable {
    scopes: Vec<Scope>,
    bindings: Vec<FxHashSet<String>>,
    globals: Vec<FxHashSet<String>>,
    nonlocals: Vec<FxHashSet<String>>,
    /// PEP 695 parameters, visible to every nested scope including methods.
    type_params: Vec<FxHashSet<String>>,
}

impl ScopeTable {
    pub fn new() -> Self {
        let mut table = Self::default();
        table.push(ScopeKind::Module, "<module>", None, 1);
        table
    }

    pub fn push(
        &mut self,
        kind: ScopeKind,
        name: &str,
        parent: Option<ScopeId>,
        line: usize,
    ) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            id,
            kind,
            name: name.to_string(),
            parent,
            line,
        });
        self.bindings.push(FxHashSet::default());
        self.globals.push(FxHashSet::default());
        self.nonlocals.push(FxHashSet::default());
        self.type_params.push(FxHashSet::default());
        id
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    pub fn kind(&self, id: ScopeId) -> ScopeKind {
        self.get(id).kind
    }

    pub fn declare_global(&mut self, scope: ScopeId, name: &str) {
        if scope != ScopeId::MODULE {
            self.globals[scope.index()].insert(name.to_string());
        }
    }

    pub fn declare_nonlocal(&mut self, scope: ScopeId, name: &str) {
        self.nonlocals[scope.index()].insert(name.to_string());
    }

    pub fn declare_type_param(&mut self, scope: ScopeId, name: &str) {
        self.type_params[scope.index()].insert(name.to_string());
    }

    /// Binds `name` and returns the scope the binding landed in.
    pub fn bind(&mut self, scope: ScopeId, name: &str) -> ScopeId {
        let target = self.binding_scope(scope, name);
        self.bindings[target.index()].insert(name.to_string());
        target
    }

    /// Walrus targets inside comprehensions bind in the nearest scope that
    /// is not itself a comprehension.
    pub fn bind_outside_comprehensions(&mut self, scope: ScopeId, name: &str) -> ScopeId {
        let mut current = scope;
        while self.kind(current) == ScopeKind::Comprehension {
            match self.get(current).parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        self.bind(current, name)
    }

    fn binding_scope(&self, scope: ScopeId, name: &str) -> ScopeId {
        if self.globals[scope.index()].contains(name) {
            return ScopeId::MODULE;
        }
        if self.nonlocals[scope.index()].contains(name) {
            return self
                .enclosing_functions(scope)
                .find(|&id| self.bindings[id.index()].contains(name))
                .or_else(|| self.enclosing_functions(scope).next())
                .unwrap_or(scope);
        }
        scope
    }

    fn enclosing_functions(&self, scope: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(self.get(scope).parent, |&id| self.get(id).parent)
            .filter(|&id| self.kind(id).is_deferred())
    }

    /// Walks the scope chain for `name`. Class scopes are only visible to
    /// code running directly in their body.
    pub fn resolve(&self, scope: ScopeId, name: &str) -> Option<ScopeId> {
        if self.globals[scope.index()].contains(name) {
            return self.bindings[0].contains(name).then_some(ScopeId::MODULE);
        }
        if self.nonlocals[scope.index()].contains(name) {
            return self
                .enclosing_functions(scope)
                .find(|&id| self.bindings[id.index()].contains(name));
        }

        let mut current = Some(scope);
        while let Some(id) = current {
            let entry = self.get(id);
            let visible = id == scope || entry.kind != ScopeKind::Class;
            if (visible && self.bindings[id.index()].contains(name))
                || self.type_params[id.index()].contains(name)
            {
                return Some(id);
            }
            current = entry.parent;
        }
        None
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn into_scopes(self) -> Vec<Scope> {
        self.scopes
    }
}
