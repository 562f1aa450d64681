//! The per-file semantic index: the lexical scope tree with symbol
//! tables and declarations, produced by the two-pass binder and consumed
//! by the type evaluator.

use index_vec::IndexVec;
use rustc_hash::FxHashMap;

use crate::diagnostic::Diagnostic;
use crate::module_resolver::ExecutionEnvironment;
use crate::node_key::NodeKey;
use crate::semantic_index::builder::SemanticIndexBuilder;
use crate::semantic_index::definition::{Declaration, DeclarationId};
use crate::semantic_index::symbol::{Scope, ScopeId, ScopeKind, Symbol, SymbolFlags, SymbolId};

pub mod builder;
pub mod definition;
pub mod symbol;

#[derive(Debug)]
pub struct SemanticIndex {
    pub(crate) scopes: IndexVec<ScopeId, Scope>,
    pub(crate) declarations: IndexVec<DeclarationId, Declaration>,
    /// Scope introduced by a node (function/class/lambda/comprehension
    /// definitions and the module itself).
    pub(crate) scopes_by_node: FxHashMap<NodeKey, ScopeId>,
    /// Enclosing scope of every expression.
    pub(crate) scope_by_expr: FxHashMap<NodeKey, ScopeId>,
    /// Parent link of every node visited during binding; the module node
    /// has no entry.
    pub(crate) parents: FxHashMap<NodeKey, NodeKey>,
    /// Binding-site name nodes to their declarations.
    pub(crate) declarations_by_target: FxHashMap<NodeKey, DeclarationId>,
}

/// Result of a recursive symbol lookup.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SymbolLookup {
    pub scope: ScopeId,
    pub symbol: SymbolId,
    /// The lookup left an independently-executable scope on its way to
    /// the defining scope. Narrowing from the capturing scope's flow does
    /// not apply to such names.
    pub crossed_execution_scope: bool,
}

impl SemanticIndex {
    /// Runs the two-pass binder over a module suite.
    pub fn from_suite(
        suite: &[rustpython_ast::Stmt],
        env: &ExecutionEnvironment,
    ) -> (SemanticIndex, Vec<Diagnostic>) {
        SemanticIndexBuilder::new(env).build(suite)
    }

    pub fn builtin_scope_id() -> ScopeId {
        ScopeId::from_usize(0)
    }

    pub fn module_scope_id() -> ScopeId {
        ScopeId::from_usize(1)
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id]
    }

    pub fn scopes(&self) -> impl Iterator<Item = (ScopeId, &Scope)> {
        self.scopes.iter_enumerated()
    }

    pub fn module_scope(&self) -> &Scope {
        self.scope(Self::module_scope_id())
    }

    pub fn declaration(&self, id: DeclarationId) -> &Declaration {
        &self.declarations[id]
    }

    pub fn scope_of_node(&self, key: NodeKey) -> Option<ScopeId> {
        self.scopes_by_node.get(&key).copied()
    }

    pub fn scope_of_expr(&self, key: NodeKey) -> Option<ScopeId> {
        self.scope_by_expr.get(&key).copied()
    }

    pub fn parent_of(&self, key: NodeKey) -> Option<NodeKey> {
        self.parents.get(&key).copied()
    }

    pub fn declaration_for_target(&self, key: NodeKey) -> Option<DeclarationId> {
        self.declarations_by_target.get(&key).copied()
    }

    pub fn symbol(&self, scope: ScopeId, symbol: SymbolId) -> &Symbol {
        self.scopes[scope].symbols().symbol(symbol)
    }

    /// Walks the scope chain looking for `name`.
    ///
    /// Class scopes other than the starting scope are skipped (their
    /// names are not visible to code nested inside them), `global` and
    /// `nonlocal` markers redirect the search, and leaving a module,
    /// function or lambda scope is recorded on the result.
    pub fn lookup_symbol(&self, start: ScopeId, name: &str) -> Option<SymbolLookup> {
        let mut current = start;
        let mut crossed = false;

        loop {
            let scope = &self.scopes[current];
            let invisible = scope.kind() == ScopeKind::Class && current != start;

            if !invisible {
                if let Some(symbol_id) = scope.symbols().symbol_id_by_name(name) {
                    let symbol = scope.symbols().symbol(symbol_id);
                    if symbol.flags().contains(SymbolFlags::MARKED_GLOBAL) {
                        return self.lookup_in_scope(Self::module_scope_id(), name, true);
                    }
                    if symbol.flags().contains(SymbolFlags::MARKED_NONLOCAL) {
                        // Resolved in the nearest enclosing function scope
                        // that binds the name.
                        return self.lookup_nonlocal(current, name);
                    }
                    return Some(SymbolLookup {
                        scope: current,
                        symbol: symbol_id,
                        crossed_execution_scope: crossed,
                    });
                }
            }

            if scope.kind().is_independently_executable() {
                crossed = true;
            }
            current = scope.parent()?;
        }
    }

    /// The scope and symbol a *binding* of `name` in `scope` writes to:
    /// the scope itself unless the symbol is marked `global` or
    /// `nonlocal`.
    pub fn binding_symbol(&self, scope: ScopeId, name: &str) -> Option<(ScopeId, SymbolId)> {
        let symbols = self.scopes[scope].symbols();
        let symbol_id = symbols.symbol_id_by_name(name)?;
        let flags = symbols.symbol(symbol_id).flags();
        if flags.contains(SymbolFlags::MARKED_GLOBAL) {
            let module = Self::module_scope_id();
            let symbol = self.scopes[module].symbols().symbol_id_by_name(name)?;
            return Some((module, symbol));
        }
        if flags.contains(SymbolFlags::MARKED_NONLOCAL) {
            let lookup = self.lookup_nonlocal(scope, name)?;
            return Some((lookup.scope, lookup.symbol));
        }
        Some((scope, symbol_id))
    }

    fn lookup_in_scope(&self, scope: ScopeId, name: &str, crossed: bool) -> Option<SymbolLookup> {
        let symbol = self.scopes[scope].symbols().symbol_id_by_name(name)?;
        Some(SymbolLookup {
            scope,
            symbol,
            crossed_execution_scope: crossed,
        })
    }

    fn lookup_nonlocal(&self, from: ScopeId, name: &str) -> Option<SymbolLookup> {
        let mut current = self.scopes[from].parent()?;
        loop {
            let scope = &self.scopes[current];
            if matches!(scope.kind(), ScopeKind::Function | ScopeKind::Lambda) {
                if let Some(symbol_id) = scope.symbols().symbol_id_by_name(name) {
                    let symbol = scope.symbols().symbol(symbol_id);
                    if !symbol.flags().contains(SymbolFlags::MARKED_NONLOCAL) {
                        return Some(SymbolLookup {
                            scope: current,
                            symbol: symbol_id,
                            crossed_execution_scope: true,
                        });
                    }
                }
            }
            if scope.kind() == ScopeKind::Module {
                return None;
            }
            current = scope.parent()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ScopeKind, SemanticIndex};
    use crate::module_resolver::ExecutionEnvironment;
    use crate::parse::Parsed;

    fn index(source: &str) -> SemanticIndex {
        let parsed = Parsed::from_text(&textwrap::dedent(source), "<test>");
        assert!(parsed.is_valid(), "parse errors: {:?}", parsed.errors());
        let (index, diagnostics) =
            SemanticIndex::from_suite(parsed.suite(), &ExecutionEnvironment::default());
        assert!(diagnostics.is_empty(), "bind diagnostics: {diagnostics:?}");
        index
    }

    fn index_with_diagnostics(source: &str) -> (SemanticIndex, Vec<crate::diagnostic::Diagnostic>) {
        let parsed = Parsed::from_text(&textwrap::dedent(source), "<test>");
        SemanticIndex::from_suite(parsed.suite(), &ExecutionEnvironment::default())
    }

    fn module_symbol_names(index: &SemanticIndex) -> Vec<String> {
        let mut names: Vec<String> = index
            .module_scope()
            .symbols()
            .symbols()
            .filter(|symbol| !symbol.is_ambient())
            .map(|symbol| symbol.name().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn empty_module_has_no_user_symbols() {
        let index = index("");
        assert!(module_symbol_names(&index).is_empty());
    }

    #[test]
    fn assignments_bind_names() {
        let index = index("x = 1\ny, z = 2, 3\n");
        assert_eq!(module_symbol_names(&index), ["x", "y", "z"]);
    }

    #[test]
    fn imports_bind_aliases() {
        let index = index(
            "
            import foo
            import foo.bar
            import baz.qux as alias
            from other import thing
            ",
        );
        assert_eq!(
            module_symbol_names(&index),
            ["alias", "foo", "thing"]
        );
    }

    #[test]
    fn class_and_function_scopes() {
        let index = index(
            "
            class C:
                x = 1

            def f():
                y = 2
            ",
        );
        assert_eq!(module_symbol_names(&index), ["C", "f"]);

        let class_scope = index
            .scopes()
            .find(|(_, scope)| scope.kind() == ScopeKind::Class)
            .expect("class scope")
            .1;
        assert!(class_scope.symbols().symbol_by_name("x").is_some());

        let function_scope = index
            .scopes()
            .find(|(_, scope)| scope.kind() == ScopeKind::Function)
            .expect("function scope")
            .1;
        assert!(function_scope.symbols().symbol_by_name("y").is_some());
        assert!(function_scope.symbols().symbol_by_name("x").is_none());
    }

    #[test]
    fn scope_parents_terminate_at_builtins() {
        let index = index(
            "
            def outer():
                def inner():
                    pass
            ",
        );
        for (id, _) in index.scopes() {
            let mut current = id;
            let mut hops = 0;
            while let Some(parent) = index.scope(current).parent() {
                current = parent;
                hops += 1;
                assert!(hops < 16, "cycle in scope parents");
            }
            assert_eq!(current, SemanticIndex::builtin_scope_id());
        }
    }

    #[test]
    fn class_scope_is_invisible_to_nested_functions() {
        let index = index(
            "
            class C:
                attr = 1
                def method(self):
                    pass
            ",
        );
        let (method_scope, _) = index
            .scopes()
            .find(|(_, scope)| scope.kind() == ScopeKind::Function)
            .expect("method scope");
        assert_eq!(index.lookup_symbol(method_scope, "attr"), None);
        // The class itself is a module-level name and stays visible.
        assert!(index.lookup_symbol(method_scope, "C").is_some());
    }

    #[test]
    fn lookup_records_execution_scope_crossings() {
        let index = index(
            "
            def outer():
                captured = 1
                def inner():
                    return captured
            ",
        );
        let (inner_scope, _) = index
            .scopes()
            .filter(|(_, scope)| scope.kind() == ScopeKind::Function)
            .find(|(_, scope)| scope.name() == &crate::Name::new("inner"))
            .expect("inner scope");
        let lookup = index.lookup_symbol(inner_scope, "captured").unwrap();
        assert!(lookup.crossed_execution_scope);

        let local = index.lookup_symbol(inner_scope, "inner");
        // `inner` is bound in `outer`'s scope.
        assert!(local.is_some_and(|lookup| lookup.crossed_execution_scope));
    }

    #[test]
    fn global_declaration_binds_in_module_scope() {
        let index = index(
            "
            def f():
                global counter
                counter = 1
            ",
        );
        assert!(index
            .module_scope()
            .symbols()
            .symbol_by_name("counter")
            .is_some());

        let (function_scope, _) = index
            .scopes()
            .find(|(_, scope)| scope.kind() == ScopeKind::Function)
            .unwrap();
        let lookup = index.lookup_symbol(function_scope, "counter").unwrap();
        assert_eq!(lookup.scope, SemanticIndex::module_scope_id());
    }

    #[test]
    fn nonlocal_binds_in_nearest_function_scope() {
        let index = index(
            "
            def outer():
                state = 0
                def inner():
                    nonlocal state
                    state = 1
            ",
        );
        let (inner_scope, _) = index
            .scopes()
            .filter(|(_, scope)| scope.kind() == ScopeKind::Function)
            .find(|(_, scope)| scope.name() == &crate::Name::new("inner"))
            .unwrap();
        let lookup = index.lookup_symbol(inner_scope, "state").unwrap();
        let defining = index.scope(lookup.scope);
        assert_eq!(defining.name(), &crate::Name::new("outer"));
    }

    #[test]
    fn nonlocal_at_module_level_is_an_error() {
        let (_, diagnostics) = index_with_diagnostics("nonlocal x\n");
        assert!(diagnostics
            .iter()
            .any(|diagnostic| diagnostic.message.contains("nonlocal")));
    }

    #[test]
    fn assignment_before_global_is_an_error() {
        let (_, diagnostics) = index_with_diagnostics(
            "
            def f():
                x = 1
                global x
            ",
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("global"));
    }

    #[test]
    fn binding_is_idempotent() {
        let source = "
            import os

            class C:
                def method(self, value: int) -> int:
                    if value:
                        result = value
                    else:
                        result = 0
                    return result
            ";
        let parsed = Parsed::from_text(&textwrap::dedent(source), "<test>");
        let env = ExecutionEnvironment::default();
        let (first, _) = SemanticIndex::from_suite(parsed.suite(), &env);
        let (second, _) = SemanticIndex::from_suite(parsed.suite(), &env);

        assert_eq!(first.scopes.len(), second.scopes.len());
        for ((_, a), (_, b)) in first.scopes().zip(second.scopes()) {
            assert_eq!(a, b);
        }
        assert_eq!(first.declarations, second.declarations);
        assert_eq!(first.parents, second.parents);
    }

    #[test]
    fn dead_branch_names_are_not_bound() {
        use crate::python_version::PythonVersion;

        let parsed = Parsed::from_text(
            &textwrap::dedent(
                "
                import sys
                if sys.version_info >= (3, 9):
                    newer = 1
                else:
                    older = 1
                ",
            ),
            "<test>",
        );
        let env = ExecutionEnvironment {
            python_version: PythonVersion::PY38,
            ..ExecutionEnvironment::default()
        };
        let (index, diagnostics) = SemanticIndex::from_suite(parsed.suite(), &env);
        assert!(diagnostics.is_empty());
        assert!(index.module_scope().symbols().symbol_by_name("older").is_some());
        assert!(index.module_scope().symbols().symbol_by_name("newer").is_none());
    }

    #[test]
    fn export_filter_is_recorded() {
        let index = index("__all__ = [\"public\"]\npublic = 1\nprivate = 2\n");
        let module = index.module_scope();
        assert!(module.exports("public"));
        assert!(!module.exports("private"));
    }
}
