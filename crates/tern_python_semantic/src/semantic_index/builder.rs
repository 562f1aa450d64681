//! The two-pass binder.
//!
//! Pass 1 records parent links, allocates the scope skeleton and the set
//! of names bound in each scope, honoring `global`/`nonlocal` and
//! statically-dead branches. Pass 2 populates the symbol tables with
//! ambient members and declarations, queueing function and lambda bodies
//! for a deferred walk so that names referenced inside them resolve
//! late, after the enclosing scope is fully populated.

use std::collections::VecDeque;

use index_vec::IndexVec;
use rustc_hash::FxHashMap;
use rustpython_ast as ast;
use rustpython_ast::text_size::TextRange;
use rustpython_ast::Ranged;

use crate::builtins;
use crate::diagnostic::Diagnostic;
use crate::module_resolver::ExecutionEnvironment;
use crate::name::Name;
use crate::node_key::NodeKey;
use crate::semantic_index::definition::{Declaration, DeclarationId, DeclarationKind};
use crate::semantic_index::symbol::{
    Scope, ScopeFlags, ScopeId, ScopeKind, SymbolFlags, SymbolId,
};
use crate::semantic_index::SemanticIndex;
use crate::types::static_truthiness;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum BindingKind {
    Local,
    Param,
    Global,
    Nonlocal,
}

#[derive(Debug, Default)]
struct BoundNames {
    order: Vec<Name>,
    kinds: FxHashMap<Name, BindingKind>,
}

impl BoundNames {
    fn get(&self, name: &str) -> Option<BindingKind> {
        self.kinds.get(name).copied()
    }

    fn insert(&mut self, name: Name, kind: BindingKind) {
        if !self.kinds.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.kinds.insert(name, kind);
    }

    fn set_kind(&mut self, name: Name, kind: BindingKind) {
        self.insert(name, kind);
    }
}

enum DeferredBody<'a> {
    Suite(ScopeId, &'a [ast::Stmt]),
    Expr(ScopeId, &'a ast::Expr),
}

pub(crate) struct SemanticIndexBuilder<'a> {
    env: &'a ExecutionEnvironment,

    scopes: IndexVec<ScopeId, Scope>,
    declarations: IndexVec<DeclarationId, Declaration>,
    scopes_by_node: FxHashMap<NodeKey, ScopeId>,
    scope_by_expr: FxHashMap<NodeKey, ScopeId>,
    parents: FxHashMap<NodeKey, NodeKey>,
    declarations_by_target: FxHashMap<NodeKey, DeclarationId>,
    diagnostics: Vec<Diagnostic>,

    bound_names: IndexVec<ScopeId, BoundNames>,
    nonlocal_checks: Vec<(ScopeId, Name, TextRange)>,
    scope_stack: Vec<ScopeId>,
    node_stack: Vec<NodeKey>,
    deferred: VecDeque<DeferredBody<'a>>,
}

impl<'a> SemanticIndexBuilder<'a> {
    pub(crate) fn new(env: &'a ExecutionEnvironment) -> Self {
        Self {
            env,
            scopes: IndexVec::new(),
            declarations: IndexVec::new(),
            scopes_by_node: FxHashMap::default(),
            scope_by_expr: FxHashMap::default(),
            parents: FxHashMap::default(),
            declarations_by_target: FxHashMap::default(),
            diagnostics: Vec::new(),
            bound_names: IndexVec::new(),
            nonlocal_checks: Vec::new(),
            scope_stack: Vec::new(),
            node_stack: Vec::new(),
            deferred: VecDeque::new(),
        }
    }

    pub(crate) fn build(mut self, suite: &'a [ast::Stmt]) -> (SemanticIndex, Vec<Diagnostic>) {
        let module_range = match (suite.first(), suite.last()) {
            (Some(first), Some(last)) => TextRange::new(first.range().start(), last.range().end()),
            _ => TextRange::default(),
        };
        let module_key = NodeKey::module(module_range);

        let builtin = self.scopes.push(Scope::new(
            ScopeKind::Builtin,
            None,
            Name::new_static("<builtins>"),
            None,
        ));
        self.bound_names.push(BoundNames::default());
        let module = self.scopes.push(Scope::new(
            ScopeKind::Module,
            Some(builtin),
            Name::new_static("<module>"),
            Some(module_key),
        ));
        self.bound_names.push(BoundNames::default());
        self.scopes_by_node.insert(module_key, module);

        // Pass 1: scope skeleton, parent links and bound-name sets.
        self.scope_stack.push(module);
        self.node_stack.push(module_key);
        self.pass1_suite(suite);
        self.check_nonlocal_bindings();
        debug_assert_eq!(self.scope_stack.len(), 1);
        debug_assert_eq!(self.node_stack.len(), 1);

        // Pass 2: symbol tables, declarations and deferred bodies.
        self.populate_symbol_tables();
        self.pass2_suite(suite);
        while let Some(deferred) = self.deferred.pop_front() {
            match deferred {
                DeferredBody::Suite(scope, body) => {
                    self.scope_stack.push(scope);
                    self.pass2_suite(body);
                    self.scope_stack.pop();
                }
                DeferredBody::Expr(scope, expr) => {
                    self.scope_stack.push(scope);
                    self.pass2_expr(expr);
                    self.scope_stack.pop();
                }
            }
        }
        self.scope_stack.pop();
        self.node_stack.pop();

        let index = SemanticIndex {
            scopes: self.scopes,
            declarations: self.declarations,
            scopes_by_node: self.scopes_by_node,
            scope_by_expr: self.scope_by_expr,
            parents: self.parents,
            declarations_by_target: self.declarations_by_target,
        };
        (index, self.diagnostics)
    }

    fn current_scope(&self) -> ScopeId {
        *self.scope_stack.last().expect("scope stack is never empty")
    }

    fn push_scope(&mut self, kind: ScopeKind, name: Name, node: NodeKey) -> ScopeId {
        let parent = self.current_scope();
        let id = self.scopes.push(Scope::new(kind, Some(parent), name, Some(node)));
        self.bound_names.push(BoundNames::default());
        self.scopes_by_node.insert(node, id);
        self.scope_stack.push(id);
        id
    }

    fn pop_scope(&mut self) {
        self.scope_stack.pop().expect("scope to pop");
    }

    fn record_parent(&mut self, child: NodeKey) {
        if let Some(parent) = self.node_stack.last() {
            self.parents.insert(child, *parent);
        }
    }

    // ------------------------------------------------------------------
    // Pass 1
    // ------------------------------------------------------------------

    fn bind_name(&mut self, name: &str, kind: BindingKind) {
        let scope = self.current_scope();
        let bound = &mut self.bound_names[scope];
        match bound.get(name) {
            // Assigning to a declared global/nonlocal binds there, not
            // locally.
            Some(BindingKind::Global | BindingKind::Nonlocal) if kind == BindingKind::Local => {}
            _ => bound.insert(Name::new(name), kind),
        }
    }

    fn declare_global(&mut self, name: &str, range: TextRange) {
        let scope = self.current_scope();
        if self.scopes[scope].kind() == ScopeKind::Module {
            return;
        }
        match self.bound_names[scope].get(name) {
            Some(BindingKind::Local | BindingKind::Param) => {
                self.diagnostics.push(Diagnostic::error(
                    range,
                    format!("'{name}' is assigned before global declaration"),
                ));
            }
            Some(BindingKind::Nonlocal) => {
                self.diagnostics.push(Diagnostic::error(
                    range,
                    format!("'{name}' was declared nonlocal and cannot also be global"),
                ));
            }
            _ => {
                self.bound_names[scope].set_kind(Name::new(name), BindingKind::Global);
                let module = SemanticIndex::module_scope_id();
                if self.bound_names[module].get(name).is_none() {
                    self.bound_names[module].insert(Name::new(name), BindingKind::Local);
                }
            }
        }
    }

    fn declare_nonlocal(&mut self, name: &str, range: TextRange) {
        let scope = self.current_scope();
        if self.scopes[scope].kind() == ScopeKind::Module {
            self.diagnostics.push(Diagnostic::error(
                range,
                format!("nonlocal declaration '{name}' not allowed at module level"),
            ));
            return;
        }
        match self.bound_names[scope].get(name) {
            Some(BindingKind::Local | BindingKind::Param) => {
                self.diagnostics.push(Diagnostic::error(
                    range,
                    format!("'{name}' is assigned before nonlocal declaration"),
                ));
            }
            Some(BindingKind::Global) => {
                self.diagnostics.push(Diagnostic::error(
                    range,
                    format!("'{name}' was declared global and cannot also be nonlocal"),
                ));
            }
            _ => {
                self.bound_names[scope].set_kind(Name::new(name), BindingKind::Nonlocal);
                self.nonlocal_checks.push((scope, Name::new(name), range));
            }
        }
    }

    /// After pass 1: every `nonlocal` must resolve to a binding in some
    /// enclosing function scope.
    fn check_nonlocal_bindings(&mut self) {
        let checks = std::mem::take(&mut self.nonlocal_checks);
        for (scope, name, range) in checks {
            let mut current = self.scopes[scope].parent();
            let mut found = false;
            while let Some(id) = current {
                let candidate = &self.scopes[id];
                if matches!(candidate.kind(), ScopeKind::Function | ScopeKind::Lambda) {
                    if matches!(
                        self.bound_names[id].get(&name),
                        Some(BindingKind::Local | BindingKind::Param)
                    ) {
                        found = true;
                        break;
                    }
                }
                if candidate.kind() == ScopeKind::Module {
                    break;
                }
                current = candidate.parent();
            }
            if !found {
                self.diagnostics.push(Diagnostic::error(
                    range,
                    format!("No binding for nonlocal '{name}' found"),
                ));
            }
        }
    }

    fn pass1_suite(&mut self, suite: &'a [ast::Stmt]) {
        for stmt in suite {
            self.pass1_stmt(stmt);
        }
    }

    fn pass1_parameters(&mut self, args: &'a ast::Arguments) {
        for arg in parameters(args) {
            let key = NodeKey::from_arg(arg);
            self.record_parent(key);
            self.bind_name(arg.arg.as_str(), BindingKind::Param);
        }
    }

    fn pass1_function(&mut self, stmt_key: NodeKey, def: FunctionDefRef<'a>) {
        for decorator in def.decorator_list {
            self.pass1_expr(&decorator.expression);
        }
        // Parameter annotations and defaults evaluate in the enclosing
        // scope, as does the return annotation.
        for annotation in parameter_annotations(def.args) {
            self.pass1_expr(annotation);
        }
        for default in parameter_defaults(def.args) {
            self.pass1_expr(default);
        }
        if let Some(returns) = def.returns {
            self.pass1_expr(returns);
        }

        self.bind_name(def.name, BindingKind::Local);

        self.push_scope(ScopeKind::Function, Name::new(def.name), stmt_key);
        self.pass1_parameters(def.args);
        self.pass1_suite(def.body);
        self.pop_scope();
    }

    fn pass1_stmt(&mut self, stmt: &'a ast::Stmt) {
        let key = NodeKey::from_stmt(stmt);
        self.record_parent(key);
        self.node_stack.push(key);

        match stmt {
            ast::Stmt::FunctionDef(node) => {
                self.pass1_function(key, FunctionDefRef::from_sync(node));
            }
            ast::Stmt::AsyncFunctionDef(node) => {
                self.pass1_function(key, FunctionDefRef::from_async(node));
            }
            ast::Stmt::ClassDef(node) => {
                for decorator in &node.decorator_list {
                    self.pass1_expr(&decorator.expression);
                }
                for base in &node.bases {
                    self.pass1_expr(base);
                }
                for keyword in &node.keywords {
                    self.pass1_expr(&keyword.value);
                }
                self.bind_name(node.name.as_str(), BindingKind::Local);
                self.push_scope(ScopeKind::Class, Name::new(node.name.as_str()), key);
                self.pass1_suite(&node.body);
                self.pop_scope();
            }
            ast::Stmt::Return(node) => {
                if let Some(value) = &node.value {
                    self.pass1_expr(value);
                }
            }
            ast::Stmt::Delete(node) => {
                for target in &node.targets {
                    self.pass1_expr(target);
                }
            }
            ast::Stmt::Assign(node) => {
                self.pass1_expr(&node.value);
                for target in &node.targets {
                    self.pass1_target(target);
                }
            }
            ast::Stmt::AugAssign(node) => {
                self.pass1_expr(&node.value);
                self.pass1_target(&node.target);
            }
            ast::Stmt::AnnAssign(node) => {
                self.pass1_expr(&node.annotation);
                if let Some(value) = &node.value {
                    self.pass1_expr(value);
                }
                self.pass1_target(&node.target);
            }
            ast::Stmt::TypeAlias(node) => {
                self.pass1_expr(&node.value);
                self.pass1_target(&node.name);
            }
            ast::Stmt::For(node) => {
                self.pass1_expr(&node.iter);
                self.pass1_target(&node.target);
                self.pass1_suite(&node.body);
                self.pass1_suite(&node.orelse);
            }
            ast::Stmt::AsyncFor(node) => {
                self.pass1_expr(&node.iter);
                self.pass1_target(&node.target);
                self.pass1_suite(&node.body);
                self.pass1_suite(&node.orelse);
            }
            ast::Stmt::While(node) => {
                self.pass1_expr(&node.test);
                if static_truthiness::evaluate(&node.test, self.env) != Some(false) {
                    self.pass1_suite(&node.body);
                }
                self.pass1_suite(&node.orelse);
            }
            ast::Stmt::If(node) => {
                for branch in static_truthiness::if_branches(node, self.env) {
                    if branch.test_is_live {
                        if let Some(test) = branch.test {
                            self.pass1_expr(test);
                        }
                    }
                    if branch.body_is_live {
                        self.pass1_suite(branch.body);
                    }
                }
            }
            ast::Stmt::With(node) => {
                self.pass1_with(&node.items, &node.body);
            }
            ast::Stmt::AsyncWith(node) => {
                self.pass1_with(&node.items, &node.body);
            }
            ast::Stmt::Match(node) => {
                self.pass1_expr(&node.subject);
                for case in &node.cases {
                    self.pass1_pattern(&case.pattern);
                    if let Some(guard) = &case.guard {
                        self.pass1_expr(guard);
                    }
                    self.pass1_suite(&case.body);
                }
            }
            ast::Stmt::Raise(node) => {
                if let Some(exc) = &node.exc {
                    self.pass1_expr(exc);
                }
                if let Some(cause) = &node.cause {
                    self.pass1_expr(cause);
                }
            }
            ast::Stmt::Try(node) => {
                self.pass1_try(&node.body, &node.handlers, &node.orelse, &node.finalbody);
            }
            ast::Stmt::TryStar(node) => {
                self.pass1_try(&node.body, &node.handlers, &node.orelse, &node.finalbody);
            }
            ast::Stmt::Assert(node) => {
                self.pass1_expr(&node.test);
                if let Some(msg) = &node.msg {
                    self.pass1_expr(msg);
                }
            }
            ast::Stmt::Import(node) => {
                for alias in &node.names {
                    let key = NodeKey::from_alias(alias);
                    self.record_parent(key);
                    let bound = alias
                        .asname
                        .as_ref()
                        .map(ast::Identifier::as_str)
                        .unwrap_or_else(|| top_level_module(alias.name.as_str()));
                    self.bind_name(bound, BindingKind::Local);
                }
            }
            ast::Stmt::ImportFrom(node) => {
                for alias in &node.names {
                    if alias.name.as_str() == "*" {
                        continue;
                    }
                    let key = NodeKey::from_alias(alias);
                    self.record_parent(key);
                    let bound = alias
                        .asname
                        .as_ref()
                        .map(ast::Identifier::as_str)
                        .unwrap_or(alias.name.as_str());
                    self.bind_name(bound, BindingKind::Local);
                }
            }
            ast::Stmt::Global(node) => {
                for name in &node.names {
                    self.declare_global(name.as_str(), stmt.range());
                }
            }
            ast::Stmt::Nonlocal(node) => {
                for name in &node.names {
                    self.declare_nonlocal(name.as_str(), stmt.range());
                }
            }
            ast::Stmt::Expr(node) => {
                self.pass1_expr(&node.value);
            }
            _ => {}
        }

        self.node_stack.pop();
    }

    fn pass1_with(&mut self, items: &'a [ast::WithItem], body: &'a [ast::Stmt]) {
        for item in items {
            self.pass1_expr(&item.context_expr);
            if let Some(optional_vars) = &item.optional_vars {
                self.pass1_target(optional_vars);
            }
        }
        self.pass1_suite(body);
    }

    fn pass1_try(
        &mut self,
        body: &'a [ast::Stmt],
        handlers: &'a [ast::ExceptHandler],
        orelse: &'a [ast::Stmt],
        finalbody: &'a [ast::Stmt],
    ) {
        self.pass1_suite(body);
        for handler in handlers {
            let ast::ExceptHandler::ExceptHandler(handler) = handler;
            if let Some(type_) = &handler.type_ {
                self.pass1_expr(type_);
            }
            if let Some(name) = &handler.name {
                self.bind_name(name.as_str(), BindingKind::Local);
            }
            self.pass1_suite(&handler.body);
        }
        self.pass1_suite(orelse);
        self.pass1_suite(finalbody);
    }

    fn pass1_pattern(&mut self, pattern: &'a ast::Pattern) {
        match pattern {
            ast::Pattern::MatchValue(node) => self.pass1_expr(&node.value),
            ast::Pattern::MatchSingleton(_) => {}
            ast::Pattern::MatchSequence(node) => {
                for pattern in &node.patterns {
                    self.pass1_pattern(pattern);
                }
            }
            ast::Pattern::MatchMapping(node) => {
                for key in &node.keys {
                    self.pass1_expr(key);
                }
                for pattern in &node.patterns {
                    self.pass1_pattern(pattern);
                }
                if let Some(rest) = &node.rest {
                    self.bind_name(rest.as_str(), BindingKind::Local);
                }
            }
            ast::Pattern::MatchClass(node) => {
                self.pass1_expr(&node.cls);
                for pattern in &node.patterns {
                    self.pass1_pattern(pattern);
                }
                for pattern in &node.kwd_patterns {
                    self.pass1_pattern(pattern);
                }
            }
            ast::Pattern::MatchStar(node) => {
                if let Some(name) = &node.name {
                    self.bind_name(name.as_str(), BindingKind::Local);
                }
            }
            ast::Pattern::MatchAs(node) => {
                if let Some(pattern) = &node.pattern {
                    self.pass1_pattern(pattern);
                }
                if let Some(name) = &node.name {
                    self.bind_name(name.as_str(), BindingKind::Local);
                }
            }
            ast::Pattern::MatchOr(node) => {
                for pattern in &node.patterns {
                    self.pass1_pattern(pattern);
                }
            }
        }
    }

    /// Binds assignment-target expressions: names bind, sequences recurse,
    /// attribute/subscript targets are plain uses.
    fn pass1_target(&mut self, target: &'a ast::Expr) {
        match target {
            ast::Expr::Name(node) => {
                let key = NodeKey::from_expr(target);
                self.record_parent(key);
                self.scope_by_expr.insert(key, self.current_scope());
                self.bind_name(node.id.as_str(), BindingKind::Local);
            }
            ast::Expr::Tuple(node) => {
                let key = NodeKey::from_expr(target);
                self.record_parent(key);
                self.scope_by_expr.insert(key, self.current_scope());
                self.node_stack.push(key);
                for element in &node.elts {
                    self.pass1_target(element);
                }
                self.node_stack.pop();
            }
            ast::Expr::List(node) => {
                let key = NodeKey::from_expr(target);
                self.record_parent(key);
                self.scope_by_expr.insert(key, self.current_scope());
                self.node_stack.push(key);
                for element in &node.elts {
                    self.pass1_target(element);
                }
                self.node_stack.pop();
            }
            ast::Expr::Starred(node) => {
                let key = NodeKey::from_expr(target);
                self.record_parent(key);
                self.scope_by_expr.insert(key, self.current_scope());
                self.node_stack.push(key);
                self.pass1_target(&node.value);
                self.node_stack.pop();
            }
            _ => self.pass1_expr(target),
        }
    }

    fn pass1_comprehension(
        &mut self,
        key: NodeKey,
        kind_name: &'static str,
        generators: &'a [ast::Comprehension],
        visit_elements: impl FnOnce(&mut Self),
    ) {
        let Some((first, rest)) = generators.split_first() else {
            return;
        };
        // The first generator's iterable evaluates in the enclosing scope;
        // everything else runs inside the comprehension scope.
        self.pass1_expr(&first.iter);

        self.push_scope(ScopeKind::Temporary, Name::new_static(kind_name), key);
        let scope = self.current_scope();
        self.scopes[scope].flags.insert(ScopeFlags::IS_LOOPING);

        self.pass1_target(&first.target);
        for condition in &first.ifs {
            self.pass1_expr(condition);
        }
        for generator in rest {
            self.pass1_expr(&generator.iter);
            self.pass1_target(&generator.target);
            for condition in &generator.ifs {
                self.pass1_expr(condition);
            }
        }
        visit_elements(self);
        self.pop_scope();
    }

    fn pass1_expr(&mut self, expr: &'a ast::Expr) {
        let key = NodeKey::from_expr(expr);
        self.record_parent(key);
        self.scope_by_expr.insert(key, self.current_scope());
        self.node_stack.push(key);

        match expr {
            ast::Expr::Lambda(node) => {
                for default in parameter_defaults(&node.args) {
                    self.pass1_expr(default);
                }
                self.push_scope(ScopeKind::Lambda, Name::new_static("<lambda>"), key);
                self.pass1_parameters(&node.args);
                self.pass1_expr(&node.body);
                self.pop_scope();
            }
            ast::Expr::ListComp(node) => {
                self.pass1_comprehension(key, "<listcomp>", &node.generators, |builder| {
                    builder.pass1_expr(&node.elt);
                });
            }
            ast::Expr::SetComp(node) => {
                self.pass1_comprehension(key, "<setcomp>", &node.generators, |builder| {
                    builder.pass1_expr(&node.elt);
                });
            }
            ast::Expr::DictComp(node) => {
                self.pass1_comprehension(key, "<dictcomp>", &node.generators, |builder| {
                    builder.pass1_expr(&node.key);
                    builder.pass1_expr(&node.value);
                });
            }
            ast::Expr::GeneratorExp(node) => {
                self.pass1_comprehension(key, "<genexpr>", &node.generators, |builder| {
                    builder.pass1_expr(&node.elt);
                });
            }
            ast::Expr::NamedExpr(node) => {
                self.pass1_expr(&node.value);
                self.pass1_target(&node.target);
            }
            ast::Expr::BoolOp(node) => {
                for value in &node.values {
                    self.pass1_expr(value);
                }
            }
            ast::Expr::BinOp(node) => {
                self.pass1_expr(&node.left);
                self.pass1_expr(&node.right);
            }
            ast::Expr::UnaryOp(node) => {
                self.pass1_expr(&node.operand);
            }
            ast::Expr::IfExp(node) => {
                self.pass1_expr(&node.test);
                self.pass1_expr(&node.body);
                self.pass1_expr(&node.orelse);
            }
            ast::Expr::Dict(node) => {
                for dict_key in node.keys.iter().flatten() {
                    self.pass1_expr(dict_key);
                }
                for value in &node.values {
                    self.pass1_expr(value);
                }
            }
            ast::Expr::Set(node) => {
                for element in &node.elts {
                    self.pass1_expr(element);
                }
            }
            ast::Expr::Await(node) => self.pass1_expr(&node.value),
            ast::Expr::Yield(node) => {
                if let Some(value) = &node.value {
                    self.pass1_expr(value);
                }
            }
            ast::Expr::YieldFrom(node) => self.pass1_expr(&node.value),
            ast::Expr::Compare(node) => {
                self.pass1_expr(&node.left);
                for comparator in &node.comparators {
                    self.pass1_expr(comparator);
                }
            }
            ast::Expr::Call(node) => {
                self.pass1_expr(&node.func);
                for arg in &node.args {
                    self.pass1_expr(arg);
                }
                for keyword in &node.keywords {
                    self.pass1_expr(&keyword.value);
                }
            }
            ast::Expr::FormattedValue(node) => {
                self.pass1_expr(&node.value);
                if let Some(spec) = &node.format_spec {
                    self.pass1_expr(spec);
                }
            }
            ast::Expr::JoinedStr(node) => {
                for value in &node.values {
                    self.pass1_expr(value);
                }
            }
            ast::Expr::Attribute(node) => self.pass1_expr(&node.value),
            ast::Expr::Subscript(node) => {
                self.pass1_expr(&node.value);
                self.pass1_expr(&node.slice);
            }
            ast::Expr::Starred(node) => self.pass1_expr(&node.value),
            ast::Expr::List(node) => {
                for element in &node.elts {
                    self.pass1_expr(element);
                }
            }
            ast::Expr::Tuple(node) => {
                for element in &node.elts {
                    self.pass1_expr(element);
                }
            }
            ast::Expr::Slice(node) => {
                for bound in [&node.lower, &node.upper, &node.step].into_iter().flatten() {
                    self.pass1_expr(bound);
                }
            }
            ast::Expr::Constant(_) | ast::Expr::Name(_) => {}
            _ => {}
        }

        self.node_stack.pop();
    }

    // ------------------------------------------------------------------
    // Pass 2
    // ------------------------------------------------------------------

    /// Inserts ambient members and the pass-1 bound names into every
    /// scope's symbol table, in deterministic order.
    fn populate_symbol_tables(&mut self) {
        for (scope_id, bound) in self.bound_names.iter_enumerated() {
            let scope = &mut self.scopes[scope_id];
            let ambient: &[&str] = match scope.kind() {
                ScopeKind::Builtin => builtins::AMBIENT_BUILTIN_NAMES,
                ScopeKind::Module => builtins::AMBIENT_MODULE_NAMES,
                ScopeKind::Class => builtins::AMBIENT_CLASS_NAMES,
                ScopeKind::Function => builtins::AMBIENT_FUNCTION_NAMES,
                ScopeKind::Lambda | ScopeKind::Temporary => &[],
            };
            for name in ambient {
                scope.symbols.add_or_update_symbol(
                    Name::new_static(name),
                    SymbolFlags::AMBIENT | SymbolFlags::IS_BOUND,
                );
            }

            for name in &bound.order {
                let flags = match bound.kinds[name] {
                    BindingKind::Local => SymbolFlags::INITIALLY_UNBOUND,
                    BindingKind::Param => SymbolFlags::IS_BOUND,
                    BindingKind::Global => SymbolFlags::MARKED_GLOBAL,
                    BindingKind::Nonlocal => SymbolFlags::MARKED_NONLOCAL,
                };
                scope.symbols.add_or_update_symbol(name.clone(), flags);
            }
        }
    }

    /// The scope in which a binding of `name` in `scope` actually lands,
    /// honoring `global`/`nonlocal` markers.
    fn binding_scope(&mut self, scope: ScopeId, name: &str) -> (ScopeId, SymbolId) {
        let symbols = self.scopes[scope].symbols();
        if let Some(symbol_id) = symbols.symbol_id_by_name(name) {
            let flags = symbols.symbol(symbol_id).flags();
            if flags.contains(SymbolFlags::MARKED_GLOBAL) {
                let module = SemanticIndex::module_scope_id();
                if let Some(id) = self.scopes[module].symbols().symbol_id_by_name(name) {
                    return (module, id);
                }
            } else if flags.contains(SymbolFlags::MARKED_NONLOCAL) {
                let mut current = self.scopes[scope].parent();
                while let Some(id) = current {
                    if matches!(
                        self.scopes[id].kind(),
                        ScopeKind::Function | ScopeKind::Lambda
                    ) {
                        if let Some(symbol) = self.scopes[id].symbols().symbol_id_by_name(name) {
                            if !self.scopes[id]
                                .symbols()
                                .symbol(symbol)
                                .flags()
                                .contains(SymbolFlags::MARKED_NONLOCAL)
                            {
                                return (id, symbol);
                            }
                        }
                    }
                    current = self.scopes[id].parent();
                }
            }
            return (scope, symbol_id);
        }
        // Pass 1 pre-registers every bound name; this only runs for
        // synthesized bindings.
        let id = self.scopes[scope]
            .symbols
            .add_or_update_symbol(Name::new(name), SymbolFlags::INITIALLY_UNBOUND);
        (scope, id)
    }

    fn add_declaration(
        &mut self,
        name: &str,
        kind: DeclarationKind,
        node: NodeKey,
        range: TextRange,
    ) -> DeclarationId {
        let declaration = self.declarations.push(Declaration { kind, node, range });
        let (scope, symbol) = self.binding_scope(self.current_scope(), name);
        self.scopes[scope]
            .symbols
            .add_declaration(symbol, declaration);
        self.scopes[scope].symbols.add_or_update_symbol(
            Name::new(name),
            SymbolFlags::IS_BOUND,
        );
        self.declarations_by_target.insert(node, declaration);
        declaration
    }

    fn mark_use(&mut self, name: &str) {
        let found = SemanticIndexView {
            scopes: &self.scopes,
        }
        .lookup(self.current_scope(), name);
        if let Some((scope, _)) = found {
            self.scopes[scope]
                .symbols
                .add_or_update_symbol(Name::new(name), SymbolFlags::IS_USED);
        }
    }

    fn pass2_suite(&mut self, suite: &'a [ast::Stmt]) {
        for stmt in suite {
            self.pass2_stmt(stmt);
        }
    }

    fn pass2_function(&mut self, stmt_key: NodeKey, range: TextRange, def: FunctionDefRef<'a>) {
        for decorator in def.decorator_list {
            self.pass2_expr(&decorator.expression);
        }
        for annotation in parameter_annotations(def.args) {
            self.pass2_expr(annotation);
        }
        for default in parameter_defaults(def.args) {
            self.pass2_expr(default);
        }
        if let Some(returns) = def.returns {
            self.pass2_expr(returns);
        }

        let is_method =
            self.scopes[self.current_scope()].kind() == ScopeKind::Class;
        let (return_sites, yield_sites) = collect_return_yield_sites(def.body);
        self.add_declaration(
            def.name,
            DeclarationKind::Function {
                is_method,
                is_async: def.is_async,
                return_exprs: return_sites,
                yield_exprs: yield_sites,
            },
            stmt_key,
            range,
        );

        let scope = self.scopes_by_node[&stmt_key];
        self.scope_stack.push(scope);
        for arg in parameters(def.args) {
            self.add_declaration(
                arg.arg.as_str(),
                DeclarationKind::Parameter,
                NodeKey::from_arg(arg),
                arg.range(),
            );
        }
        if suite_always_returns(def.body) {
            self.scopes[scope].flags.insert(ScopeFlags::ALWAYS_RETURNS);
        }
        if suite_always_raises(def.body) {
            self.scopes[scope].flags.insert(ScopeFlags::ALWAYS_RAISES);
        }
        self.scope_stack.pop();

        // Function bodies are analyzed late: names inside them resolve
        // against the fully-populated enclosing scope.
        self.deferred.push_back(DeferredBody::Suite(scope, def.body));
    }

    fn pass2_stmt(&mut self, stmt: &'a ast::Stmt) {
        match stmt {
            ast::Stmt::FunctionDef(node) => {
                self.pass2_function(
                    NodeKey::from_stmt(stmt),
                    identifier_range(&node.name),
                    FunctionDefRef::from_sync(node),
                );
            }
            ast::Stmt::AsyncFunctionDef(node) => {
                self.pass2_function(
                    NodeKey::from_stmt(stmt),
                    identifier_range(&node.name),
                    FunctionDefRef::from_async(node),
                );
            }
            ast::Stmt::ClassDef(node) => {
                for decorator in &node.decorator_list {
                    self.pass2_expr(&decorator.expression);
                }
                for base in &node.bases {
                    self.pass2_expr(base);
                }
                for keyword in &node.keywords {
                    self.pass2_expr(&keyword.value);
                }
                let key = NodeKey::from_stmt(stmt);
                self.add_declaration(
                    node.name.as_str(),
                    DeclarationKind::Class,
                    key,
                    identifier_range(&node.name),
                );
                // Class bodies execute immediately.
                let scope = self.scopes_by_node[&key];
                self.scope_stack.push(scope);
                self.pass2_suite(&node.body);
                self.scope_stack.pop();
            }
            ast::Stmt::Return(node) => {
                if let Some(value) = &node.value {
                    self.pass2_expr(value);
                }
            }
            ast::Stmt::Delete(node) => {
                for target in &node.targets {
                    self.pass2_expr(target);
                }
            }
            ast::Stmt::Assign(node) => {
                self.pass2_expr(&node.value);
                for target in &node.targets {
                    self.pass2_target(target, None);
                }
                self.record_export_list(node);
            }
            ast::Stmt::AugAssign(node) => {
                self.pass2_expr(&node.value);
                if let ast::Expr::Name(name) = node.target.as_ref() {
                    // The target of an augmented assignment is read too.
                    self.mark_use(name.id.as_str());
                }
                self.pass2_target(&node.target, None);
            }
            ast::Stmt::AnnAssign(node) => {
                self.pass2_expr(&node.annotation);
                if let Some(value) = &node.value {
                    self.pass2_expr(value);
                }
                self.pass2_target(&node.target, Some(&node.annotation));
            }
            ast::Stmt::TypeAlias(node) => {
                self.pass2_expr(&node.value);
                self.pass2_target(&node.name, None);
            }
            ast::Stmt::For(node) => {
                self.pass2_expr(&node.iter);
                self.pass2_target(&node.target, None);
                self.pass2_suite(&node.body);
                self.pass2_suite(&node.orelse);
            }
            ast::Stmt::AsyncFor(node) => {
                self.pass2_expr(&node.iter);
                self.pass2_target(&node.target, None);
                self.pass2_suite(&node.body);
                self.pass2_suite(&node.orelse);
            }
            ast::Stmt::While(node) => {
                self.pass2_expr(&node.test);
                if static_truthiness::evaluate(&node.test, self.env) != Some(false) {
                    self.pass2_suite(&node.body);
                }
                self.pass2_suite(&node.orelse);
            }
            ast::Stmt::If(node) => {
                for branch in static_truthiness::if_branches(node, self.env) {
                    if branch.test_is_live {
                        if let Some(test) = branch.test {
                            self.pass2_expr(test);
                        }
                    }
                    if branch.body_is_live {
                        self.pass2_suite(branch.body);
                    }
                }
            }
            ast::Stmt::With(node) => self.pass2_with(&node.items, &node.body),
            ast::Stmt::AsyncWith(node) => self.pass2_with(&node.items, &node.body),
            ast::Stmt::Match(node) => {
                self.pass2_expr(&node.subject);
                for case in &node.cases {
                    self.pass2_pattern(&case.pattern);
                    if let Some(guard) = &case.guard {
                        self.pass2_expr(guard);
                    }
                    self.pass2_suite(&case.body);
                }
            }
            ast::Stmt::Raise(node) => {
                if let Some(exc) = &node.exc {
                    self.pass2_expr(exc);
                }
                if let Some(cause) = &node.cause {
                    self.pass2_expr(cause);
                }
            }
            ast::Stmt::Try(node) => {
                self.pass2_try(&node.body, &node.handlers, &node.orelse, &node.finalbody);
            }
            ast::Stmt::TryStar(node) => {
                self.pass2_try(&node.body, &node.handlers, &node.orelse, &node.finalbody);
            }
            ast::Stmt::Assert(node) => {
                self.pass2_expr(&node.test);
                if let Some(msg) = &node.msg {
                    self.pass2_expr(msg);
                }
            }
            ast::Stmt::Import(node) => {
                let directive = NodeKey::from_stmt(stmt);
                for alias in &node.names {
                    let bound = alias
                        .asname
                        .as_ref()
                        .map(ast::Identifier::as_str)
                        .unwrap_or_else(|| top_level_module(alias.name.as_str()));
                    self.add_declaration(
                        bound,
                        DeclarationKind::Alias {
                            symbol: None,
                            directive,
                        },
                        NodeKey::from_alias(alias),
                        alias.range(),
                    );
                }
            }
            ast::Stmt::ImportFrom(node) => {
                let directive = NodeKey::from_stmt(stmt);
                for alias in &node.names {
                    if alias.name.as_str() == "*" {
                        continue;
                    }
                    let bound = alias
                        .asname
                        .as_ref()
                        .map(ast::Identifier::as_str)
                        .unwrap_or(alias.name.as_str());
                    self.add_declaration(
                        bound,
                        DeclarationKind::Alias {
                            symbol: Some(Name::new(alias.name.as_str())),
                            directive,
                        },
                        NodeKey::from_alias(alias),
                        alias.range(),
                    );
                }
            }
            ast::Stmt::Global(_) | ast::Stmt::Nonlocal(_) => {
                // Handled in pass 1.
            }
            ast::Stmt::Expr(node) => self.pass2_expr(&node.value),
            _ => {}
        }
    }

    fn pass2_with(&mut self, items: &'a [ast::WithItem], body: &'a [ast::Stmt]) {
        for item in items {
            self.pass2_expr(&item.context_expr);
            if let Some(optional_vars) = &item.optional_vars {
                self.pass2_target(optional_vars, None);
            }
        }
        self.pass2_suite(body);
    }

    fn pass2_try(
        &mut self,
        body: &'a [ast::Stmt],
        handlers: &'a [ast::ExceptHandler],
        orelse: &'a [ast::Stmt],
        finalbody: &'a [ast::Stmt],
    ) {
        self.pass2_suite(body);
        for handler in handlers {
            let ast::ExceptHandler::ExceptHandler(handler) = handler;
            if let Some(type_) = &handler.type_ {
                self.pass2_expr(type_);
            }
            if let Some(name) = &handler.name {
                self.add_declaration(
                    name.as_str(),
                    DeclarationKind::Variable {
                        annotation: None,
                        is_constant: false,
                    },
                    NodeKey::from_identifier(name),
                    identifier_range(name),
                );
            }
            self.pass2_suite(&handler.body);
        }
        self.pass2_suite(orelse);
        self.pass2_suite(finalbody);
    }

    fn pass2_pattern(&mut self, pattern: &'a ast::Pattern) {
        match pattern {
            ast::Pattern::MatchValue(node) => self.pass2_expr(&node.value),
            ast::Pattern::MatchSingleton(_) => {}
            ast::Pattern::MatchSequence(node) => {
                for pattern in &node.patterns {
                    self.pass2_pattern(pattern);
                }
            }
            ast::Pattern::MatchMapping(node) => {
                for key in &node.keys {
                    self.pass2_expr(key);
                }
                for pattern in &node.patterns {
                    self.pass2_pattern(pattern);
                }
                if let Some(rest) = &node.rest {
                    self.add_variable_declaration(rest);
                }
            }
            ast::Pattern::MatchClass(node) => {
                self.pass2_expr(&node.cls);
                for pattern in &node.patterns {
                    self.pass2_pattern(pattern);
                }
                for pattern in &node.kwd_patterns {
                    self.pass2_pattern(pattern);
                }
            }
            ast::Pattern::MatchStar(node) => {
                if let Some(name) = &node.name {
                    self.add_variable_declaration(name);
                }
            }
            ast::Pattern::MatchAs(node) => {
                if let Some(pattern) = &node.pattern {
                    self.pass2_pattern(pattern);
                }
                if let Some(name) = &node.name {
                    self.add_variable_declaration(name);
                }
            }
            ast::Pattern::MatchOr(node) => {
                for pattern in &node.patterns {
                    self.pass2_pattern(pattern);
                }
            }
        }
    }

    fn add_variable_declaration(&mut self, name: &ast::Identifier) {
        self.add_declaration(
            name.as_str(),
            DeclarationKind::Variable {
                annotation: None,
                is_constant: false,
            },
            NodeKey::module(identifier_range(name)),
            identifier_range(name),
        );
    }

    fn pass2_target(&mut self, target: &'a ast::Expr, annotation: Option<&'a ast::Expr>) {
        match target {
            ast::Expr::Name(node) => {
                self.add_declaration(
                    node.id.as_str(),
                    DeclarationKind::Variable {
                        annotation: annotation.map(NodeKey::from_expr),
                        is_constant: annotation.is_some_and(annotation_is_final),
                    },
                    NodeKey::from_expr(target),
                    target.range(),
                );
            }
            ast::Expr::Tuple(node) => {
                for element in &node.elts {
                    self.pass2_target(element, None);
                }
            }
            ast::Expr::List(node) => {
                for element in &node.elts {
                    self.pass2_target(element, None);
                }
            }
            ast::Expr::Starred(node) => self.pass2_target(&node.value, None),
            _ => self.pass2_expr(target),
        }
    }

    /// Records `__all__ = [...]` as the module's export filter.
    fn record_export_list(&mut self, node: &ast::StmtAssign) {
        if self.current_scope() != SemanticIndex::module_scope_id() {
            return;
        }
        let [ast::Expr::Name(target)] = node.targets.as_slice() else {
            return;
        };
        if target.id.as_str() != "__all__" {
            return;
        }
        let elements = match node.value.as_ref() {
            ast::Expr::List(list) => &list.elts,
            ast::Expr::Tuple(tuple) => &tuple.elts,
            _ => return,
        };
        let mut exports = Vec::with_capacity(elements.len());
        for element in elements {
            if let ast::Expr::Constant(ast::ExprConstant {
                value: ast::Constant::Str(value),
                ..
            }) = element
            {
                exports.push(Name::new(value));
            } else {
                return;
            }
        }
        let module = SemanticIndex::module_scope_id();
        self.scopes[module].export_names = Some(exports);
    }

    fn pass2_comprehension(
        &mut self,
        key: NodeKey,
        generators: &'a [ast::Comprehension],
        visit_elements: impl FnOnce(&mut Self),
    ) {
        let Some((first, rest)) = generators.split_first() else {
            return;
        };
        self.pass2_expr(&first.iter);
        let scope = self.scopes_by_node[&key];
        self.scope_stack.push(scope);
        self.pass2_target(&first.target, None);
        for condition in &first.ifs {
            self.pass2_expr(condition);
        }
        for generator in rest {
            self.pass2_expr(&generator.iter);
            self.pass2_target(&generator.target, None);
            for condition in &generator.ifs {
                self.pass2_expr(condition);
            }
        }
        visit_elements(self);
        self.scope_stack.pop();
    }

    fn pass2_expr(&mut self, expr: &'a ast::Expr) {
        match expr {
            ast::Expr::Name(node) => {
                if matches!(node.ctx, ast::ExprContext::Load) {
                    self.mark_use(node.id.as_str());
                }
            }
            ast::Expr::Lambda(node) => {
                for default in parameter_defaults(&node.args) {
                    self.pass2_expr(default);
                }
                let key = NodeKey::from_expr(expr);
                let scope = self.scopes_by_node[&key];
                self.scope_stack.push(scope);
                for arg in parameters(&node.args) {
                    self.add_declaration(
                        arg.arg.as_str(),
                        DeclarationKind::Parameter,
                        NodeKey::from_arg(arg),
                        arg.range(),
                    );
                }
                self.scope_stack.pop();
                self.deferred.push_back(DeferredBody::Expr(scope, &node.body));
            }
            ast::Expr::ListComp(node) => {
                self.pass2_comprehension(NodeKey::from_expr(expr), &node.generators, |builder| {
                    builder.pass2_expr(&node.elt);
                });
            }
            ast::Expr::SetComp(node) => {
                self.pass2_comprehension(NodeKey::from_expr(expr), &node.generators, |builder| {
                    builder.pass2_expr(&node.elt);
                });
            }
            ast::Expr::DictComp(node) => {
                self.pass2_comprehension(NodeKey::from_expr(expr), &node.generators, |builder| {
                    builder.pass2_expr(&node.key);
                    builder.pass2_expr(&node.value);
                });
            }
            ast::Expr::GeneratorExp(node) => {
                self.pass2_comprehension(NodeKey::from_expr(expr), &node.generators, |builder| {
                    builder.pass2_expr(&node.elt);
                });
            }
            ast::Expr::NamedExpr(node) => {
                self.pass2_expr(&node.value);
                self.pass2_target(&node.target, None);
            }
            ast::Expr::BoolOp(node) => {
                for value in &node.values {
                    self.pass2_expr(value);
                }
            }
            ast::Expr::BinOp(node) => {
                self.pass2_expr(&node.left);
                self.pass2_expr(&node.right);
            }
            ast::Expr::UnaryOp(node) => self.pass2_expr(&node.operand),
            ast::Expr::IfExp(node) => {
                self.pass2_expr(&node.test);
                self.pass2_expr(&node.body);
                self.pass2_expr(&node.orelse);
            }
            ast::Expr::Dict(node) => {
                for dict_key in node.keys.iter().flatten() {
                    self.pass2_expr(dict_key);
                }
                for value in &node.values {
                    self.pass2_expr(value);
                }
            }
            ast::Expr::Set(node) => {
                for element in &node.elts {
                    self.pass2_expr(element);
                }
            }
            ast::Expr::Await(node) => self.pass2_expr(&node.value),
            ast::Expr::Yield(node) => {
                if let Some(value) = &node.value {
                    self.pass2_expr(value);
                }
            }
            ast::Expr::YieldFrom(node) => self.pass2_expr(&node.value),
            ast::Expr::Compare(node) => {
                self.pass2_expr(&node.left);
                for comparator in &node.comparators {
                    self.pass2_expr(comparator);
                }
            }
            ast::Expr::Call(node) => {
                self.pass2_expr(&node.func);
                for arg in &node.args {
                    self.pass2_expr(arg);
                }
                for keyword in &node.keywords {
                    self.pass2_expr(&keyword.value);
                }
            }
            ast::Expr::FormattedValue(node) => {
                self.pass2_expr(&node.value);
                if let Some(spec) = &node.format_spec {
                    self.pass2_expr(spec);
                }
            }
            ast::Expr::JoinedStr(node) => {
                for value in &node.values {
                    self.pass2_expr(value);
                }
            }
            ast::Expr::Attribute(node) => self.pass2_expr(&node.value),
            ast::Expr::Subscript(node) => {
                self.pass2_expr(&node.value);
                self.pass2_expr(&node.slice);
            }
            ast::Expr::Starred(node) => self.pass2_expr(&node.value),
            ast::Expr::List(node) => {
                for element in &node.elts {
                    self.pass2_expr(element);
                }
            }
            ast::Expr::Tuple(node) => {
                for element in &node.elts {
                    self.pass2_expr(element);
                }
            }
            ast::Expr::Slice(node) => {
                for bound in [&node.lower, &node.upper, &node.step].into_iter().flatten() {
                    self.pass2_expr(bound);
                }
            }
            ast::Expr::Constant(_) => {}
            _ => {}
        }
    }
}

/// Minimal immutable view used for lookups while the builder holds the
/// scopes mutably elsewhere.
struct SemanticIndexView<'s> {
    scopes: &'s IndexVec<ScopeId, Scope>,
}

impl SemanticIndexView<'_> {
    fn lookup(&self, start: ScopeId, name: &str) -> Option<(ScopeId, SymbolId)> {
        let mut current = start;
        loop {
            let scope = &self.scopes[current];
            let invisible = scope.kind() == ScopeKind::Class && current != start;
            if !invisible {
                if let Some(symbol) = scope.symbols().symbol_id_by_name(name) {
                    return Some((current, symbol));
                }
            }
            current = scope.parent()?;
        }
    }
}

/// Common view over sync and async function definitions.
#[derive(Copy, Clone)]
struct FunctionDefRef<'a> {
    name: &'a str,
    args: &'a ast::Arguments,
    body: &'a [ast::Stmt],
    decorator_list: &'a [ast::Decorator],
    returns: Option<&'a ast::Expr>,
    is_async: bool,
}

impl<'a> FunctionDefRef<'a> {
    fn from_sync(node: &'a ast::StmtFunctionDef) -> Self {
        Self {
            name: node.name.as_str(),
            args: &node.args,
            body: &node.body,
            decorator_list: &node.decorator_list,
            returns: node.returns.as_deref(),
            is_async: false,
        }
    }

    fn from_async(node: &'a ast::StmtAsyncFunctionDef) -> Self {
        Self {
            name: node.name.as_str(),
            args: &node.args,
            body: &node.body,
            decorator_list: &node.decorator_list,
            returns: node.returns.as_deref(),
            is_async: true,
        }
    }
}

fn parameters(args: &ast::Arguments) -> impl Iterator<Item = &ast::Arg> {
    args.posonlyargs
        .iter()
        .map(ast::ArgWithDefault::as_arg)
        .chain(args.args.iter().map(ast::ArgWithDefault::as_arg))
        .chain(args.vararg.as_deref())
        .chain(args.kwonlyargs.iter().map(ast::ArgWithDefault::as_arg))
        .chain(args.kwarg.as_deref())
}

fn parameter_annotations(args: &ast::Arguments) -> impl Iterator<Item = &ast::Expr> {
    parameters(args).filter_map(|arg| arg.annotation.as_deref())
}

fn parameter_defaults(args: &ast::Arguments) -> impl Iterator<Item = &ast::Expr> {
    args.posonlyargs
        .iter()
        .chain(&args.args)
        .chain(&args.kwonlyargs)
        .filter_map(|arg| arg.default.as_deref())
}

fn top_level_module(dotted: &str) -> &str {
    dotted.split('.').next().unwrap_or(dotted)
}

fn identifier_range(identifier: &ast::Identifier) -> TextRange {
    identifier.range()
}

/// Return and yield sites at any depth inside a function body, not
/// descending into nested functions, lambdas or classes.
fn collect_return_yield_sites(body: &[ast::Stmt]) -> (Vec<NodeKey>, Vec<NodeKey>) {
    let mut returns = Vec::new();
    let mut yields = Vec::new();
    collect_sites_in_suite(body, &mut returns, &mut yields);
    (returns, yields)
}

fn collect_sites_in_suite(suite: &[ast::Stmt], returns: &mut Vec<NodeKey>, yields: &mut Vec<NodeKey>) {
    for stmt in suite {
        match stmt {
            ast::Stmt::FunctionDef(_) | ast::Stmt::AsyncFunctionDef(_) | ast::Stmt::ClassDef(_) => {}
            ast::Stmt::Return(_) => returns.push(NodeKey::from_stmt(stmt)),
            ast::Stmt::Expr(node) => collect_sites_in_expr(&node.value, yields),
            ast::Stmt::Assign(node) => collect_sites_in_expr(&node.value, yields),
            ast::Stmt::If(node) => {
                collect_sites_in_suite(&node.body, returns, yields);
                for clause in &node.elif_else_clauses {
                    collect_sites_in_suite(&clause.body, returns, yields);
                }
            }
            ast::Stmt::While(node) => {
                collect_sites_in_suite(&node.body, returns, yields);
                collect_sites_in_suite(&node.orelse, returns, yields);
            }
            ast::Stmt::For(node) => {
                collect_sites_in_suite(&node.body, returns, yields);
                collect_sites_in_suite(&node.orelse, returns, yields);
            }
            ast::Stmt::AsyncFor(node) => {
                collect_sites_in_suite(&node.body, returns, yields);
                collect_sites_in_suite(&node.orelse, returns, yields);
            }
            ast::Stmt::With(node) => collect_sites_in_suite(&node.body, returns, yields),
            ast::Stmt::AsyncWith(node) => collect_sites_in_suite(&node.body, returns, yields),
            ast::Stmt::Try(node) => {
                collect_sites_in_suite(&node.body, returns, yields);
                for handler in &node.handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    collect_sites_in_suite(&handler.body, returns, yields);
                }
                collect_sites_in_suite(&node.orelse, returns, yields);
                collect_sites_in_suite(&node.finalbody, returns, yields);
            }
            _ => {}
        }
    }
}

fn collect_sites_in_expr(expr: &ast::Expr, yields: &mut Vec<NodeKey>) {
    match expr {
        ast::Expr::Yield(_) | ast::Expr::YieldFrom(_) => yields.push(NodeKey::from_expr(expr)),
        ast::Expr::Await(node) => collect_sites_in_expr(&node.value, yields),
        ast::Expr::BinOp(node) => {
            collect_sites_in_expr(&node.left, yields);
            collect_sites_in_expr(&node.right, yields);
        }
        _ => {}
    }
}

fn annotation_is_final(annotation: &ast::Expr) -> bool {
    match annotation {
        ast::Expr::Name(name) => name.id.as_str() == "Final",
        ast::Expr::Subscript(subscript) => annotation_is_final(&subscript.value),
        ast::Expr::Attribute(attribute) => attribute.attr.as_str() == "Final",
        _ => false,
    }
}

/// Whether control provably leaves the suite through `return` whenever it
/// runs to the end: a top-level `return`, or an exhaustive `if`/`else`
/// whose arms all return.
fn suite_always_returns(suite: &[ast::Stmt]) -> bool {
    suite.iter().any(|stmt| match stmt {
        ast::Stmt::Return(_) => true,
        ast::Stmt::If(node) => {
            node.elif_else_clauses.last().is_some_and(|last| last.test.is_none())
                && suite_always_returns(&node.body)
                && node
                    .elif_else_clauses
                    .iter()
                    .all(|clause| suite_always_returns(&clause.body))
        }
        _ => false,
    })
}

fn suite_always_raises(suite: &[ast::Stmt]) -> bool {
    suite.iter().any(|stmt| match stmt {
        ast::Stmt::Raise(_) => true,
        ast::Stmt::If(node) => {
            node.elif_else_clauses.last().is_some_and(|last| last.test.is_none())
                && suite_always_raises(&node.body)
                && node
                    .elif_else_clauses
                    .iter()
                    .all(|clause| suite_always_raises(&clause.body))
        }
        _ => false,
    })
}
