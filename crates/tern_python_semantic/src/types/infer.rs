//! The type evaluator: walks each independently-executable scope's
//! statements in order, inferring and checking expression types,
//! evaluating annotations, recording per-declaration symbol types, and
//! maintaining the temporary-scope stack that narrowing consults.
//!
//! Runs in passes: every expression's result is cached on its node, and
//! the caller re-runs the pass while any node produced a different type
//! than in the previous pass.

use std::collections::VecDeque;

use rustpython_ast as ast;
use rustpython_ast::Ranged;

use crate::builtins::{KnownClass, KnownFunction, SpecialForm};
use crate::db::Db;
use crate::diagnostic::{rule_diagnostic, Diagnostic, DiagnosticAction, DiagnosticSettings, Rule};
use crate::files::FileId;
use crate::name::Name;
use crate::node_key::NodeKey;
use crate::semantic_index::symbol::{ScopeFlags, ScopeId, ScopeKind, SymbolFlags, SymbolId};
use crate::semantic_index::SemanticIndex;
use crate::types::builder::{union_of, UnionBuilder};
use crate::types::narrow::{self, NarrowingConstraint, SupportedExpr};
use crate::types::static_truthiness;
use crate::types::{
    ClassType, ClassTypeId, FunctionParameter, FunctionType, FunctionTypeFlags, ModuleType,
    ParameterCategory, Type, TypeStore, TypeVarType, Variance,
};

/// Outcome of one evaluation pass over a file.
#[derive(Debug, Default)]
pub struct TypeCheckResult {
    pub diagnostics: Vec<Diagnostic>,
    /// Whether any node's type differs from the previous pass; the
    /// driver schedules another pass while this holds.
    pub changed: bool,
}

/// Runs one evaluation pass.
pub fn analyze_types(db: &dyn Db, file: FileId, settings: &DiagnosticSettings) -> TypeCheckResult {
    let _span = tracing::trace_span!("analyze_types", ?file).entered();

    let (Some(parsed), Some(index)) = (db.parsed(file), db.semantic_index(file)) else {
        return TypeCheckResult::default();
    };
    let mut evaluator = TypeEvaluator::new(db, file, &index, settings);
    evaluator.analyze_module(parsed.suite());
    TypeCheckResult {
        diagnostics: evaluator.diagnostics,
        changed: evaluator.changed,
    }
}

/// The type of a module-level symbol as seen from other modules. `None`
/// when the name does not exist or is hidden by the export filter;
/// `Some(Unknown)` when it exists but has not been inferred yet.
pub fn public_symbol_type(db: &dyn Db, file: FileId, name: &str) -> Option<Type> {
    let index = db.semantic_index(file)?;
    let module = SemanticIndex::module_scope_id();
    let scope = index.module_scope();
    if !scope.exports(name) {
        return None;
    }
    let symbol = scope.symbols().symbol_id_by_name(name)?;
    if scope.symbols().symbol(symbol).is_ambient() {
        return db.builtin_types().builtin_symbol(name).or(Some(Type::Unknown));
    }
    Some(
        db.type_store()
            .declared_type(file, module, symbol)
            .or_else(|| db.type_store().symbol_type(file, module, symbol))
            .unwrap_or(Type::Unknown),
    )
}

/// A flow branch pushed while walking a conditional or looping region.
/// This is the only scope kind whose flags mutate after construction.
#[derive(Debug, Default)]
struct TemporaryScope {
    flags: ScopeFlags,
    constraints: Vec<NarrowingConstraint>,
}

impl TemporaryScope {
    fn conditional() -> Self {
        Self {
            flags: ScopeFlags::IS_CONDITIONAL,
            constraints: Vec::new(),
        }
    }

    fn looping() -> Self {
        Self {
            flags: ScopeFlags::IS_LOOPING,
            constraints: Vec::new(),
        }
    }

    fn constraint_for(&self, target: &SupportedExpr) -> Option<&NarrowingConstraint> {
        self.constraints
            .iter()
            .rev()
            .find(|constraint| &constraint.target == target)
    }
}

enum DeferredBody<'a> {
    Function {
        scope: ScopeId,
        function: crate::types::FunctionTypeId,
        body: &'a [ast::Stmt],
    },
    Lambda {
        scope: ScopeId,
        function: crate::types::FunctionTypeId,
        body: &'a ast::Expr,
    },
}

pub(crate) struct TypeEvaluator<'db> {
    db: &'db dyn Db,
    file: FileId,
    index: &'db SemanticIndex,
    settings: &'db DiagnosticSettings,

    diagnostics: Vec<Diagnostic>,
    changed: bool,

    scope_stack: Vec<ScopeId>,
    frames: Vec<TemporaryScope>,
    return_types: Vec<Type>,
    current_function: Option<crate::types::FunctionTypeId>,
}

impl<'db> TypeEvaluator<'db> {
    fn new(
        db: &'db dyn Db,
        file: FileId,
        index: &'db SemanticIndex,
        settings: &'db DiagnosticSettings,
    ) -> Self {
        Self {
            db,
            file,
            index,
            settings,
            diagnostics: Vec::new(),
            changed: false,
            scope_stack: vec![SemanticIndex::module_scope_id()],
            frames: vec![TemporaryScope::default()],
            return_types: Vec::new(),
            current_function: None,
        }
    }

    pub(crate) fn store(&self) -> &'db TypeStore {
        self.db.type_store()
    }

    pub(crate) fn builtins_file(&self) -> FileId {
        self.db.builtin_types().file
    }

    fn current_scope(&self) -> ScopeId {
        *self.scope_stack.last().expect("scope stack is never empty")
    }

    fn report(&mut self, rule: Rule, range: rustpython_ast::text_size::TextRange, message: String) {
        if let Some(diagnostic) = rule_diagnostic(self.settings, rule, range, message) {
            self.diagnostics.push(diagnostic);
        }
    }

    // ------------------------------------------------------------------
    // Module entry and deferred analysis
    // ------------------------------------------------------------------

    fn analyze_module(&mut self, suite: &'db [ast::Stmt]) {
        let mut deferred = VecDeque::new();
        self.analyze_suite(suite, &mut deferred);

        // Function and lambda bodies run after the enclosing scope is
        // fully populated, emulating late binding. Bodies queued while
        // draining are appended and drained in turn.
        while let Some(body) = deferred.pop_front() {
            let mut nested = VecDeque::new();
            match body {
                DeferredBody::Function {
                    scope,
                    function,
                    body,
                } => {
                    self.analyze_function_body(scope, function, &mut nested, |evaluator, queue| {
                        evaluator.analyze_suite(body, queue);
                    });
                }
                DeferredBody::Lambda {
                    scope,
                    function,
                    body,
                } => {
                    self.analyze_function_body(scope, function, &mut nested, |evaluator, queue| {
                        let ty = evaluator.expr_type_deferred(body, queue);
                        evaluator.return_types.push(ty);
                    });
                }
            }
            deferred.append(&mut nested);
        }
    }

    fn analyze_function_body(
        &mut self,
        scope: ScopeId,
        function: crate::types::FunctionTypeId,
        nested: &mut VecDeque<DeferredBody<'db>>,
        walk: impl FnOnce(&mut Self, &mut VecDeque<DeferredBody<'db>>),
    ) {
        let saved_returns = std::mem::take(&mut self.return_types);
        let saved_function = self.current_function.replace(function);
        let saved_frames = std::mem::replace(&mut self.frames, vec![TemporaryScope::default()]);
        self.scope_stack.push(scope);

        walk(self, nested);

        self.scope_stack.pop();
        self.frames = saved_frames;
        self.current_function = saved_function;
        let returns = std::mem::replace(&mut self.return_types, saved_returns);

        let inferred = if returns.is_empty() {
            Type::None
        } else {
            union_of(self.store(), self.file, returns)
        };
        self.changed |= self.store().set_inferred_return(function, inferred);
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn analyze_suite(&mut self, suite: &'db [ast::Stmt], deferred: &mut VecDeque<DeferredBody<'db>>) {
        for stmt in suite {
            self.analyze_stmt(stmt, deferred);
        }
    }

    fn analyze_stmt(&mut self, stmt: &'db ast::Stmt, deferred: &mut VecDeque<DeferredBody<'db>>) {
        match stmt {
            ast::Stmt::FunctionDef(node) => {
                self.analyze_function_def(stmt, FunctionNode::from_sync(node), deferred);
            }
            ast::Stmt::AsyncFunctionDef(node) => {
                self.analyze_function_def(stmt, FunctionNode::from_async(node), deferred);
            }
            ast::Stmt::ClassDef(node) => self.analyze_class_def(stmt, node, deferred),
            ast::Stmt::Assign(node) => {
                let value_ty = self.expr_type_deferred(&node.value, deferred);
                for target in &node.targets {
                    self.assign_target(target, value_ty, deferred);
                }
            }
            ast::Stmt::AnnAssign(node) => {
                let declared = self.annotation_type(&node.annotation);
                if let Some(value) = &node.value {
                    let value_ty = self.expr_type_deferred(value, deferred);
                    if !self.is_assignable(value_ty, declared) {
                        let message = format!(
                            "Expression of type '{}' cannot be assigned to declared type '{}'",
                            value_ty.display(self.store()),
                            declared.display(self.store()),
                        );
                        self.report(Rule::GeneralTypeIssues, value.range(), message);
                    }
                }
                if let ast::Expr::Name(name) = node.target.as_ref() {
                    if let Some((scope, symbol)) =
                        self.index.binding_symbol(self.current_scope(), name.id.as_str())
                    {
                        self.store()
                            .set_declared_type(self.file, scope, symbol, declared);
                    }
                }
                self.assign_target(&node.target, declared, deferred);
            }
            ast::Stmt::AugAssign(node) => {
                let value_ty = self.expr_type_deferred(&node.value, deferred);
                // The target of an augmented assignment is read first.
                let target_ty = match SupportedExpr::from_expr(&node.target) {
                    Some(chain) => self.chain_type(&chain),
                    None => self.expr_type_deferred(&node.target, deferred),
                };
                let result = self.binary_op_type(target_ty, node.op, value_ty);
                self.assign_target(&node.target, result, deferred);
            }
            ast::Stmt::Return(node) => {
                let ty = match &node.value {
                    Some(value) => self.expr_type_deferred(value, deferred),
                    None => Type::None,
                };
                self.return_types.push(ty);
                if let Some(function) = self.current_function {
                    if let Some(declared) = self.store().function(function).declared_return {
                        if !self.is_assignable(ty, declared) {
                            let message = format!(
                                "Expression of type '{}' cannot be assigned to return type '{}'",
                                ty.display(self.store()),
                                declared.display(self.store()),
                            );
                            self.report(Rule::GeneralTypeIssues, stmt.range(), message);
                        }
                    }
                }
                self.innermost_frame_flags(ScopeFlags::ALWAYS_RETURNS);
            }
            ast::Stmt::Raise(node) => {
                if let Some(exc) = &node.exc {
                    self.expr_type_deferred(exc, deferred);
                }
                if let Some(cause) = &node.cause {
                    self.expr_type_deferred(cause, deferred);
                }
                self.innermost_frame_flags(ScopeFlags::ALWAYS_RAISES);
            }
            ast::Stmt::Break(_) => {
                self.innermost_frame_flags(ScopeFlags::ALWAYS_BREAKS);
                for frame in self.frames.iter_mut().rev() {
                    if frame.flags.contains(ScopeFlags::IS_LOOPING) {
                        frame.flags.insert(ScopeFlags::MAY_BREAK);
                        break;
                    }
                }
            }
            ast::Stmt::Continue(_) => {
                self.innermost_frame_flags(ScopeFlags::ALWAYS_BREAKS);
            }
            ast::Stmt::If(node) => self.analyze_if(node, deferred),
            ast::Stmt::While(node) => self.analyze_while(node, deferred),
            ast::Stmt::For(node) => {
                self.analyze_for(&node.iter, &node.target, &node.body, &node.orelse, deferred);
            }
            ast::Stmt::AsyncFor(node) => {
                self.analyze_for(&node.iter, &node.target, &node.body, &node.orelse, deferred);
            }
            ast::Stmt::With(node) => self.analyze_with(&node.items, &node.body, deferred),
            ast::Stmt::AsyncWith(node) => self.analyze_with(&node.items, &node.body, deferred),
            ast::Stmt::Import(node) => {
                for alias in &node.names {
                    self.analyze_import_alias(alias);
                }
            }
            ast::Stmt::ImportFrom(node) => self.analyze_import_from(stmt, node),
            ast::Stmt::Try(node) => {
                self.analyze_try(&node.body, &node.handlers, &node.orelse, &node.finalbody, deferred);
            }
            ast::Stmt::TryStar(node) => {
                self.analyze_try(&node.body, &node.handlers, &node.orelse, &node.finalbody, deferred);
            }
            ast::Stmt::Assert(node) => {
                self.expr_type_deferred(&node.test, deferred);
                if let Some(msg) = &node.msg {
                    self.expr_type_deferred(msg, deferred);
                }
                // An assert narrows the rest of the scope like the true
                // branch of an `if`.
                let (positive, _) = narrow::build_constraints(self, &node.test);
                self.current_frame().constraints.extend(positive);
            }
            ast::Stmt::Delete(node) => {
                for target in &node.targets {
                    self.expr_type_deferred(target, deferred);
                }
            }
            ast::Stmt::Match(node) => {
                self.expr_type_deferred(&node.subject, deferred);
                for case in &node.cases {
                    if let Some(guard) = &case.guard {
                        self.expr_type_deferred(guard, deferred);
                    }
                    self.frames.push(TemporaryScope::conditional());
                    self.analyze_suite(&case.body, deferred);
                    self.frames.pop();
                }
            }
            ast::Stmt::Expr(node) => {
                self.expr_type_deferred(&node.value, deferred);
            }
            ast::Stmt::TypeAlias(node) => {
                let ty = self.annotation_type(&node.value);
                self.assign_target(&node.name, ty, deferred);
            }
            ast::Stmt::Global(_)
            | ast::Stmt::Nonlocal(_)
            | ast::Stmt::Pass(_) => {}
            _ => {}
        }
    }

    fn innermost_frame_flags(&mut self, flags: ScopeFlags) {
        if let Some(frame) = self.frames.last_mut() {
            frame.flags.insert(flags);
        }
    }

    fn current_frame(&mut self) -> &mut TemporaryScope {
        self.frames.last_mut().expect("at least one frame")
    }

    // ------------------------------------------------------------------
    // Conditionals and narrowing
    // ------------------------------------------------------------------

    fn analyze_if(&mut self, node: &'db ast::StmtIf, deferred: &mut VecDeque<DeferredBody<'db>>) {
        let env = self.db.execution_environment().clone();
        let branches = static_truthiness::if_branches(node, &env);

        let mut negations: Vec<NarrowingConstraint> = Vec::new();
        let mut finished: Vec<TemporaryScope> = Vec::new();
        let mut exhaustive = false;

        for branch in &branches {
            if branch.test_is_live {
                if let Some(test) = branch.test {
                    self.expr_type_deferred(test, deferred);
                }
            }
            if !branch.body_is_live {
                continue;
            }

            let mut frame = TemporaryScope::conditional();
            frame.constraints.extend(negations.iter().cloned());

            match branch.test {
                Some(test) if branch.test_value.is_none() => {
                    let (positive, negative) = narrow::build_constraints(self, test);
                    frame.constraints.extend(positive);
                    self.frames.push(frame);
                    self.analyze_suite(branch.body, deferred);
                    finished.push(self.frames.pop().expect("frame"));
                    negations.extend(negative);
                }
                Some(_) => {
                    // Statically-true test: the only reachable branch.
                    exhaustive = true;
                    self.frames.push(frame);
                    self.analyze_suite(branch.body, deferred);
                    finished.push(self.frames.pop().expect("frame"));
                }
                None => {
                    exhaustive = true;
                    self.frames.push(frame);
                    self.analyze_suite(branch.body, deferred);
                    finished.push(self.frames.pop().expect("frame"));
                }
            }
        }

        if !exhaustive {
            // The fall-through path: no branch taken, every test false.
            let mut frame = TemporaryScope::conditional();
            frame.constraints.extend(negations);
            finished.push(frame);
        }

        self.combine_temporary_scopes(finished);
    }

    /// Merges sibling conditional scopes into the enclosing scope.
    ///
    /// Branches that provably never fall through contribute nothing. Each
    /// target constrained in a surviving branch gets one merged
    /// constraint: the union of its per-branch types, with the current
    /// (pre-branch) type standing in for branches that left it alone.
    fn combine_temporary_scopes(&mut self, finished: Vec<TemporaryScope>) {
        let (live, dead): (Vec<_>, Vec<_>) = finished
            .into_iter()
            .partition(|frame| !frame.flags.never_falls_through());

        if live.is_empty() {
            // Every path terminates; control past the join is
            // unreachable.
            let all_raise = dead
                .iter()
                .all(|frame| frame.flags.contains(ScopeFlags::ALWAYS_RAISES));
            let flags = if all_raise {
                ScopeFlags::ALWAYS_RAISES
            } else if dead
                .iter()
                .all(|frame| frame.flags.contains(ScopeFlags::ALWAYS_BREAKS))
            {
                ScopeFlags::ALWAYS_BREAKS
            } else {
                ScopeFlags::ALWAYS_RETURNS
            };
            self.innermost_frame_flags(flags);
            return;
        }

        let mut targets: Vec<SupportedExpr> = Vec::new();
        for frame in &live {
            for constraint in &frame.constraints {
                if !targets.contains(&constraint.target) {
                    targets.push(constraint.target.clone());
                }
            }
        }

        let conditional = live.len() > 1;
        for target in targets {
            let fallback = self.chain_type(&target);
            let mut builder = UnionBuilder::new(self.store(), self.file);
            for frame in &live {
                let ty = frame
                    .constraint_for(&target)
                    .map(|constraint| constraint.ty)
                    .unwrap_or(fallback);
                builder = builder.add(ty);
            }
            let merged = builder.build();
            let mut constraint = NarrowingConstraint::new(target, merged);
            constraint.conditional = conditional;
            self.current_frame().constraints.push(constraint);
        }
    }

    fn analyze_while(
        &mut self,
        node: &'db ast::StmtWhile,
        deferred: &mut VecDeque<DeferredBody<'db>>,
    ) {
        self.expr_type_deferred(&node.test, deferred);
        let env = self.db.execution_environment().clone();
        let static_value = static_truthiness::evaluate(&node.test, &env);

        let mut negative_constraints = Vec::new();
        if static_value != Some(false) {
            let mut frame = TemporaryScope::looping();
            if static_value.is_none() {
                let (positive, negative) = narrow::build_constraints(self, &node.test);
                frame.constraints.extend(positive);
                negative_constraints = negative;
            }
            self.frames.push(frame);
            self.analyze_suite(&node.body, deferred);
            let frame = self.frames.pop().expect("frame");
            // Falling out of the loop means the test went false, unless a
            // break bypassed it.
            if !frame.flags.contains(ScopeFlags::MAY_BREAK) {
                self.current_frame().constraints.extend(negative_constraints);
            }
        }
        self.analyze_suite(&node.orelse, deferred);
    }

    fn analyze_for(
        &mut self,
        iter: &'db ast::Expr,
        target: &'db ast::Expr,
        body: &'db [ast::Stmt],
        orelse: &'db [ast::Stmt],
        deferred: &mut VecDeque<DeferredBody<'db>>,
    ) {
        let iter_ty = self.expr_type_deferred(iter, deferred);
        let element_ty = self.iteration_element_type(iter_ty);
        self.assign_target(target, element_ty, deferred);

        self.frames.push(TemporaryScope::looping());
        self.analyze_suite(body, deferred);
        self.frames.pop();
        self.analyze_suite(orelse, deferred);
    }

    fn analyze_with(
        &mut self,
        items: &'db [ast::WithItem],
        body: &'db [ast::Stmt],
        deferred: &mut VecDeque<DeferredBody<'db>>,
    ) {
        for item in items {
            self.expr_type_deferred(&item.context_expr, deferred);
            if let Some(optional_vars) = &item.optional_vars {
                // The context manager protocol's result type is unknown
                // without stubs.
                self.assign_target(optional_vars, Type::Unknown, deferred);
            }
        }
        self.analyze_suite(body, deferred);
    }

    fn analyze_try(
        &mut self,
        body: &'db [ast::Stmt],
        handlers: &'db [ast::ExceptHandler],
        orelse: &'db [ast::Stmt],
        finalbody: &'db [ast::Stmt],
        deferred: &mut VecDeque<DeferredBody<'db>>,
    ) {
        // Narrowings from the try body may not hold in the handlers, so
        // each region runs in a discarded conditional scope.
        self.frames.push(TemporaryScope::conditional());
        self.analyze_suite(body, deferred);
        self.frames.pop();

        for handler in handlers {
            let ast::ExceptHandler::ExceptHandler(handler) = handler;
            let exception_ty = match &handler.type_ {
                Some(type_expr) => {
                    let ty = self.expr_type_deferred(type_expr, deferred);
                    ty.to_instance(self.store())
                }
                None => Type::Unknown,
            };
            if let Some(name) = &handler.name {
                if let Some((scope, symbol)) =
                    self.index.binding_symbol(self.current_scope(), name.as_str())
                {
                    if let Some(declaration) = self
                        .index
                        .declaration_for_target(NodeKey::from_identifier(name))
                    {
                        self.changed |= self.store().set_symbol_source(
                            self.file,
                            scope,
                            symbol,
                            declaration,
                            exception_ty,
                        );
                    }
                }
            }
            self.frames.push(TemporaryScope::conditional());
            self.analyze_suite(&handler.body, deferred);
            self.frames.pop();
        }

        self.analyze_suite(orelse, deferred);
        self.analyze_suite(finalbody, deferred);
    }

    // ------------------------------------------------------------------
    // Imports
    // ------------------------------------------------------------------

    fn analyze_import_alias(&mut self, alias: &ast::Alias) {
        let key = NodeKey::from_alias(alias);
        let target = self.db.import_target(self.file, key);
        let module_name = alias.name.as_str();

        let ty = match &target {
            Some(target) if target.synthesized.is_some() => {
                Type::Module(ModuleType::Synthesized(target.synthesized.unwrap()))
            }
            Some(target) if target.result.is_import_found => {
                self.check_stub_presence(target, module_name, alias.range());
                // A dotted `import a.b` binds `a`.
                let bound_file = if alias.asname.is_some() {
                    target.file.or(target.top_file)
                } else {
                    target.top_file.or(target.file)
                };
                bound_file
                    .map(|file| Type::Module(ModuleType::File(file)))
                    .unwrap_or(Type::Unknown)
            }
            _ => {
                let message = format!("Import '{module_name}' could not be resolved");
                if let Some(mut diagnostic) =
                    rule_diagnostic(self.settings, Rule::MissingImports, alias.range(), message)
                {
                    diagnostic = diagnostic
                        .with_action(DiagnosticAction::create_type_stub(module_name.to_string()));
                    self.diagnostics.push(diagnostic);
                }
                Type::Unknown
            }
        };

        self.record_alias_type(key, alias, ty);
    }

    fn analyze_import_from(&mut self, stmt: &ast::Stmt, node: &ast::StmtImportFrom) {
        let directive_key = NodeKey::from_stmt(stmt);
        let target = self.db.import_target(self.file, directive_key);
        let module_display = {
            let dots = ".".repeat(node.level.map(|level| level.to_usize()).unwrap_or(0));
            let name = node
                .module
                .as_ref()
                .map(ast::Identifier::as_str)
                .unwrap_or("");
            format!("{dots}{name}")
        };

        let Some(target) = target else {
            return;
        };

        if target.synthesized.is_none() && !target.result.is_import_found {
            let message = format!("Import '{module_display}' could not be resolved");
            if let Some(diagnostic) =
                rule_diagnostic(self.settings, Rule::MissingImports, stmt.range(), message)
            {
                self.diagnostics.push(
                    diagnostic
                        .with_action(DiagnosticAction::create_type_stub(module_display.clone())),
                );
            }
            for alias in &node.names {
                if alias.name.as_str() != "*" {
                    self.record_alias_type(NodeKey::from_alias(alias), alias, Type::Unknown);
                }
            }
            return;
        }

        if target.synthesized.is_none() {
            self.check_stub_presence(&target, &module_display, stmt.range());
        }

        for alias in &node.names {
            let symbol_name = alias.name.as_str();
            if symbol_name == "*" {
                continue;
            }
            let ty = if let Some(module) = target.synthesized {
                self.db
                    .builtin_types()
                    .synthesized_member(module, symbol_name)
                    .unwrap_or(Type::Unknown)
            } else if let Some(file) = target.file {
                match public_symbol_type(self.db, file, symbol_name) {
                    Some(ty) => ty,
                    None => {
                        // Fall back to an implicitly-importable submodule.
                        if let Some((_, submodule)) = target
                            .submodules
                            .iter()
                            .find(|(name, _)| name == symbol_name)
                        {
                            Type::Module(ModuleType::File(*submodule))
                        } else {
                            let message = format!(
                                "'{symbol_name}' is not a known member of module '{module_display}'"
                            );
                            self.report(Rule::GeneralTypeIssues, alias.range(), message);
                            Type::Unknown
                        }
                    }
                }
            } else if let Some((_, submodule)) = target
                .submodules
                .iter()
                .find(|(name, _)| name == symbol_name)
            {
                Type::Module(ModuleType::File(*submodule))
            } else {
                Type::Unknown
            };
            self.record_alias_type(NodeKey::from_alias(alias), alias, ty);
        }
    }

    fn check_stub_presence(
        &mut self,
        target: &crate::db::ImportTarget,
        module_name: &str,
        range: rustpython_ast::text_size::TextRange,
    ) {
        use crate::module_resolver::ImportType;
        if target.result.is_stub_file || target.result.import_type != ImportType::ThirdParty {
            return;
        }
        let message = format!("Stub file not found for '{module_name}'");
        if let Some(diagnostic) =
            rule_diagnostic(self.settings, Rule::MissingTypeStubs, range, message)
        {
            self.diagnostics.push(
                diagnostic.with_action(DiagnosticAction::create_type_stub(module_name.to_string())),
            );
        }
    }

    fn record_alias_type(&mut self, key: NodeKey, alias: &ast::Alias, ty: Type) {
        let bound_name = alias
            .asname
            .as_ref()
            .map(ast::Identifier::as_str)
            .unwrap_or_else(|| {
                alias
                    .name
                    .as_str()
                    .split('.')
                    .next()
                    .unwrap_or(alias.name.as_str())
            });
        if let Some((scope, symbol)) = self.index.binding_symbol(self.current_scope(), bound_name) {
            if let Some(declaration) = self.index.declaration_for_target(key) {
                self.changed |=
                    self.store()
                        .set_symbol_source(self.file, scope, symbol, declaration, ty);
            }
        }
    }

    // ------------------------------------------------------------------
    // Definitions
    // ------------------------------------------------------------------

    fn analyze_function_def(
        &mut self,
        stmt: &'db ast::Stmt,
        node: FunctionNode<'db>,
        deferred: &mut VecDeque<DeferredBody<'db>>,
    ) {
        let key = NodeKey::from_stmt(stmt);
        let in_class = self.index.scope(self.current_scope()).kind() == ScopeKind::Class;

        // Decorators and annotations evaluate in the enclosing scope.
        let mut decorator_types = Vec::with_capacity(node.decorator_list.len());
        for decorator in node.decorator_list {
            decorator_types.push(self.expr_type_deferred(&decorator.expression, deferred));
        }

        let params = self.parameter_types(node.args);
        let declared_return = node.returns.map(|returns| self.annotation_type(returns));

        let function = match self.store_cached_function(key) {
            Some(function) => function,
            None => {
                let mut function = FunctionType::new(Name::new(node.name));
                if node.is_async {
                    function.flags.insert(FunctionTypeFlags::ASYNC);
                }
                if in_class {
                    function.flags.insert(FunctionTypeFlags::INSTANCE_METHOD);
                }
                if node.name == "__new__" {
                    // `__new__` behaves as a class-level constructor no
                    // matter how it is declared.
                    function.flags.insert(FunctionTypeFlags::CONSTRUCTOR);
                    function.flags.remove(FunctionTypeFlags::INSTANCE_METHOD);
                }
                function.doc_string = doc_string_of(node.body);
                let id = self.store().add_function(self.file, function);
                self.store().cache_node_object(self.file, key, Type::Function(id));
                id
            }
        };

        // Parameter and return details can change between passes as
        // other symbols converge.
        self.update_function_signature(function, &params, declared_return);

        // Parameters are typed in the function's own scope.
        let function_scope = self
            .index
            .scope_of_node(key)
            .expect("function node to have a scope");
        self.record_parameter_types(function_scope, node.args, &params);

        let result_ty = self.apply_function_decorators(function, node, &decorator_types);

        if let Some((scope, symbol)) = self.index.binding_symbol(self.current_scope(), node.name) {
            if let Some(declaration) = self.index.declaration_for_target(key) {
                self.changed |= self.store().set_symbol_source(
                    self.file,
                    scope,
                    symbol,
                    declaration,
                    result_ty,
                );
            }
        }

        deferred.push_back(DeferredBody::Function {
            scope: function_scope,
            function,
            body: node.body,
        });
    }

    fn store_cached_function(&self, key: NodeKey) -> Option<crate::types::FunctionTypeId> {
        match self.store().cached_node_object(self.file, key) {
            Some(Type::Function(function)) => Some(function),
            _ => None,
        }
    }

    fn update_function_signature(
        &mut self,
        function: crate::types::FunctionTypeId,
        params: &[FunctionParameter],
        declared_return: Option<Type>,
    ) {
        let store = self.store();
        let current = store.function(function);
        if current.params.len() != params.len()
            || current
                .params
                .iter()
                .zip(params)
                .any(|(a, b)| a.ty != b.ty || a.name != b.name)
            || current.declared_return != declared_return
        {
            self.changed = true;
            // Recreate in place through the arena entry.
            let mut updated = current;
            updated.params = params.to_vec();
            updated.declared_return = declared_return;
            self.replace_function(function, updated);
        }
    }

    fn replace_function(&self, id: crate::types::FunctionTypeId, function: FunctionType) {
        // The arena slot is rewritten; the id stays stable.
        self.store().overwrite_function(id, function);
    }

    fn parameter_types(&mut self, args: &'db ast::Arguments) -> Vec<FunctionParameter> {
        let mut params = Vec::new();
        let mut push = |evaluator: &mut Self,
                        arg: &'db ast::Arg,
                        category: ParameterCategory,
                        has_default: bool| {
            let ty = arg
                .annotation
                .as_deref()
                .map(|annotation| evaluator.annotation_type(annotation))
                .unwrap_or(Type::Unknown);
            params.push(FunctionParameter {
                category,
                name: Some(Name::new(arg.arg.as_str())),
                ty,
                has_default,
            });
        };

        for arg in args.posonlyargs.iter().chain(&args.args) {
            push(self, arg.as_arg(), ParameterCategory::Simple, arg.default.is_some());
        }
        if let Some(vararg) = args.vararg.as_deref() {
            push(self, vararg, ParameterCategory::VarArgList, false);
        }
        for arg in &args.kwonlyargs {
            push(self, arg.as_arg(), ParameterCategory::Simple, arg.default.is_some());
        }
        if let Some(kwarg) = args.kwarg.as_deref() {
            push(self, kwarg, ParameterCategory::VarArgDictionary, false);
        }
        params
    }

    fn record_parameter_types(
        &mut self,
        scope: ScopeId,
        args: &ast::Arguments,
        params: &[FunctionParameter],
    ) {
        let scope_symbols = self.index.scope(scope).symbols();
        let mut param_iter = params.iter();
        let record = |evaluator: &Self, arg: &ast::Arg, param: &FunctionParameter| {
            let Some(symbol) = scope_symbols.symbol_id_by_name(arg.arg.as_str()) else {
                return false;
            };
            let Some(declaration) = evaluator
                .index
                .declaration_for_target(NodeKey::from_arg(arg))
            else {
                return false;
            };
            evaluator
                .store()
                .set_declared_type(evaluator.file, scope, symbol, param.ty);
            evaluator.store().set_symbol_source(
                evaluator.file,
                scope,
                symbol,
                declaration,
                param.ty,
            )
        };

        let mut changed = false;
        for arg in args.posonlyargs.iter().chain(&args.args) {
            if let Some(param) = param_iter.next() {
                changed |= record(self, arg.as_arg(), param);
            }
        }
        if let Some(vararg) = args.vararg.as_deref() {
            if let Some(param) = param_iter.next() {
                changed |= record(self, vararg, param);
            }
        }
        for arg in &args.kwonlyargs {
            if let Some(param) = param_iter.next() {
                changed |= record(self, arg.as_arg(), param);
            }
        }
        if let Some(kwarg) = args.kwarg.as_deref() {
            if let Some(param) = param_iter.next() {
                changed |= record(self, kwarg, param);
            }
        }
        self.changed |= changed;
    }

    /// Applies decorator semantics: `@property` and accessor attachment,
    /// `@overload` accumulation, `@staticmethod`/`@classmethod` flags.
    fn apply_function_decorators(
        &mut self,
        function: crate::types::FunctionTypeId,
        node: FunctionNode<'db>,
        decorator_types: &[Type],
    ) -> Type {
        let mut result = Type::Function(function);

        for (decorator, decorator_ty) in node.decorator_list.iter().zip(decorator_types) {
            match &decorator.expression {
                ast::Expr::Name(_) => {
                    let known = decorator_ty
                        .into_class()
                        .and_then(|class| self.store().class_known(class));
                    match known {
                        Some(KnownClass::Property) => {
                            let id = self.store().add_property(
                                self.file,
                                crate::types::PropertyType {
                                    getter: Type::Function(function),
                                    setter: None,
                                    deleter: None,
                                },
                            );
                            result = Type::Property(id);
                        }
                        Some(KnownClass::StaticMethod) => {
                            self.set_function_flag(function, FunctionTypeFlags::STATIC_METHOD);
                        }
                        Some(KnownClass::ClassMethod) => {
                            self.set_function_flag(function, FunctionTypeFlags::CLASS_METHOD);
                        }
                        _ => {
                            if decorator_name(&decorator.expression) == Some("overload") {
                                result = self.accumulate_overload(function, node.name);
                            }
                        }
                    }
                }
                ast::Expr::Attribute(attribute) => {
                    // `@existing.setter` / `@existing.deleter` attach to a
                    // property already bound in this scope.
                    let accessor = attribute.attr.as_str();
                    if matches!(accessor, "setter" | "deleter") {
                        if let ast::Expr::Name(owner) = attribute.value.as_ref() {
                            if let Some(Type::Property(property)) =
                                self.lookup_value_type(owner.id.as_str())
                            {
                                let accessor_ty = Some(Type::Function(function));
                                if accessor == "setter" {
                                    self.store()
                                        .set_property_accessor(property, accessor_ty, None);
                                } else {
                                    self.store()
                                        .set_property_accessor(property, None, accessor_ty);
                                }
                                result = Type::Property(property);
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        result
    }

    fn set_function_flag(&self, function: crate::types::FunctionTypeId, flag: FunctionTypeFlags) {
        let mut updated = self.store().function(function);
        if !updated.flags.contains(flag) {
            updated.flags.insert(flag);
            if flag.contains(FunctionTypeFlags::STATIC_METHOD) {
                updated.flags.remove(FunctionTypeFlags::INSTANCE_METHOD);
            }
            self.store().overwrite_function(function, updated);
        }
    }

    /// `@overload`: accumulate this alternative onto any existing
    /// overloaded set bound to the same name.
    fn accumulate_overload(
        &mut self,
        function: crate::types::FunctionTypeId,
        name: &str,
    ) -> Type {
        match self.lookup_value_type(name) {
            Some(Type::Overloaded(existing)) => {
                self.store().push_overload(existing, function);
                Type::Overloaded(existing)
            }
            Some(Type::Function(existing)) if existing != function => {
                Type::Overloaded(self.store().add_overloaded(self.file, vec![existing, function]))
            }
            _ => Type::Overloaded(self.store().add_overloaded(self.file, vec![function])),
        }
    }

    /// The currently-inferred type of `name` in the enclosing scopes,
    /// without reporting diagnostics.
    fn lookup_value_type(&mut self, name: &str) -> Option<Type> {
        let lookup = self.index.lookup_symbol(self.current_scope(), name)?;
        Some(self.symbol_value_type(lookup.scope, lookup.symbol, name))
    }

    fn analyze_class_def(
        &mut self,
        stmt: &'db ast::Stmt,
        node: &'db ast::StmtClassDef,
        deferred: &mut VecDeque<DeferredBody<'db>>,
    ) {
        let key = NodeKey::from_stmt(stmt);

        for decorator in &node.decorator_list {
            self.expr_type_deferred(&decorator.expression, deferred);
        }

        let mut bases = Vec::with_capacity(node.bases.len());
        for base in &node.bases {
            bases.push(self.expr_type_deferred(base, deferred));
        }
        let mut metaclass = None;
        for keyword in &node.keywords {
            let value_ty = self.expr_type_deferred(&keyword.value, deferred);
            if keyword.arg.as_ref().is_some_and(|arg| arg.as_str() == "metaclass") {
                metaclass = Some(value_ty);
            }
        }

        // Every class other than `object` implicitly derives from it.
        let object = self.db.builtin_types().class_type(KnownClass::Object);
        if !bases.iter().any(|base| matches!(base, Type::Class(_))) && node.name.as_str() != "object"
        {
            bases.push(object);
        }

        let class = match self.store().cached_node_object(self.file, key) {
            Some(Type::Class(class)) => {
                self.update_class_bases(class, &bases, metaclass);
                class
            }
            _ => {
                let mut class = ClassType::new(Name::new(node.name.as_str()));
                class.scope = self.index.scope_of_node(key).map(|scope| (self.file, scope));
                class.bases = bases.clone();
                class.metaclass = metaclass;
                class.doc_string = doc_string_of(&node.body);
                let id = self.store().add_class(self.file, class);
                self.store().cache_node_object(self.file, key, Type::Class(id));
                id
            }
        };

        // Class bodies execute immediately, in the class scope.
        if let Some(scope) = self.index.scope_of_node(key) {
            self.scope_stack.push(scope);
            self.analyze_suite(&node.body, deferred);
            self.scope_stack.pop();
        }

        if let Some((scope, symbol)) =
            self.index.binding_symbol(self.current_scope(), node.name.as_str())
        {
            if let Some(declaration) = self.index.declaration_for_target(key) {
                self.changed |= self.store().set_symbol_source(
                    self.file,
                    scope,
                    symbol,
                    declaration,
                    Type::Class(class),
                );
            }
        }
    }

    fn update_class_bases(&mut self, class: ClassTypeId, bases: &[Type], metaclass: Option<Type>) {
        let current = self.store().class(class);
        if current.bases != bases || current.metaclass != metaclass {
            self.changed = true;
            let mut updated = current;
            updated.bases = bases.to_vec();
            updated.metaclass = metaclass;
            self.store().overwrite_class(class, updated);
        }
    }

    // ------------------------------------------------------------------
    // Assignment
    // ------------------------------------------------------------------

    fn assign_target(
        &mut self,
        target: &'db ast::Expr,
        value_ty: Type,
        deferred: &mut VecDeque<DeferredBody<'db>>,
    ) {
        match target {
            ast::Expr::Name(name) => self.assign_name(target, name, value_ty),
            ast::Expr::Tuple(tuple) => {
                self.assign_sequence(&tuple.elts, value_ty, deferred);
            }
            ast::Expr::List(list) => {
                self.assign_sequence(&list.elts, value_ty, deferred);
            }
            ast::Expr::Starred(starred) => {
                self.assign_target(&starred.value, Type::Unknown, deferred);
            }
            ast::Expr::Attribute(_) | ast::Expr::Subscript(_) => {
                self.expr_type_deferred(target, deferred);
                if let Some(chain) = SupportedExpr::from_expr(target) {
                    self.current_frame()
                        .constraints
                        .push(NarrowingConstraint::new(chain, value_ty));
                }
            }
            _ => {
                self.expr_type_deferred(target, deferred);
            }
        }
    }

    fn assign_sequence(
        &mut self,
        elements: &'db [ast::Expr],
        value_ty: Type,
        deferred: &mut VecDeque<DeferredBody<'db>>,
    ) {
        let element_types: Vec<Type> = match value_ty {
            Type::Tuple(tuple) => {
                let entry_types = self.store().tuple_elements(tuple);
                if entry_types.len() == elements.len() {
                    entry_types
                } else {
                    vec![Type::Unknown; elements.len()]
                }
            }
            _ => vec![Type::Unknown; elements.len()],
        };
        for (element, ty) in elements.iter().zip(element_types) {
            self.assign_target(element, ty, deferred);
        }
    }

    fn assign_name(&mut self, target: &ast::Expr, name: &ast::ExprName, value_ty: Type) {
        let node_key = NodeKey::from_expr(target);
        if let Some((scope, symbol)) =
            self.index.binding_symbol(self.current_scope(), name.id.as_str())
        {
            if let Some(declared) = self.store().declared_type(self.file, scope, symbol) {
                if !self.is_assignable(value_ty, declared) {
                    let message = format!(
                        "Expression of type '{}' cannot be assigned to declared type '{}'",
                        value_ty.display(self.store()),
                        declared.display(self.store()),
                    );
                    self.report(Rule::GeneralTypeIssues, target.range(), message);
                }
            }
            if let Some(declaration) = self.index.declaration_for_target(node_key) {
                self.changed |=
                    self.store()
                        .set_symbol_source(self.file, scope, symbol, declaration, value_ty);
            }
        }
        // A rebinding yields a fresh type: this unconditional assignment
        // constraint invalidates earlier narrowings for the target.
        if let Some(chain) = SupportedExpr::from_expr(target) {
            self.current_frame()
                .constraints
                .push(NarrowingConstraint::new(chain, value_ty));
        }
        self.store().cache_node_type(self.file, node_key, value_ty);
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Evaluates an expression, caching the result on the node and
    /// recording whether it changed since the last pass. Any lambda
    /// bodies encountered here are not queued for deferred analysis.
    pub(crate) fn expr_type(&mut self, expr: &'db ast::Expr) -> Type {
        let mut scratch = VecDeque::new();
        self.expr_type_deferred_inner(expr, &mut scratch)
    }

    fn expr_type_deferred(
        &mut self,
        expr: &'db ast::Expr,
        deferred: &mut VecDeque<DeferredBody<'db>>,
    ) -> Type {
        self.expr_type_deferred_inner(expr, deferred)
    }

    fn expr_type_deferred_inner(
        &mut self,
        expr: &'db ast::Expr,
        deferred: &mut VecDeque<DeferredBody<'db>>,
    ) -> Type {
        let key = NodeKey::from_expr(expr);
        let ty = self.eval_expr(expr, deferred);
        self.changed |= self.store().cache_node_type(self.file, key, ty);
        ty
    }

    fn eval_expr(
        &mut self,
        expr: &'db ast::Expr,
        deferred: &mut VecDeque<DeferredBody<'db>>,
    ) -> Type {
        match expr {
            ast::Expr::Constant(node) => self.constant_type(&node.value),
            ast::Expr::Name(node) => self.name_type(expr, node),
            ast::Expr::Attribute(node) => self.attribute_type(expr, node, deferred),
            ast::Expr::Subscript(node) => {
                let value_ty = self.expr_type_deferred(&node.value, deferred);
                self.subscript_type(value_ty, &node.slice, deferred).ty
            }
            ast::Expr::Call(node) => self.call_type(expr, node, deferred),
            ast::Expr::Tuple(node) => {
                let element_types: Vec<Type> = node
                    .elts
                    .iter()
                    .map(|element| self.expr_type_deferred(element, deferred))
                    .collect();
                Type::Tuple(self.store().add_tuple(self.file, element_types))
            }
            ast::Expr::List(node) => {
                for element in &node.elts {
                    self.expr_type_deferred(element, deferred);
                }
                self.db.builtin_types().instance(KnownClass::List)
            }
            ast::Expr::Set(node) => {
                for element in &node.elts {
                    self.expr_type_deferred(element, deferred);
                }
                self.db.builtin_types().instance(KnownClass::Set)
            }
            ast::Expr::Dict(node) => {
                for dict_key in node.keys.iter().flatten() {
                    self.expr_type_deferred(dict_key, deferred);
                }
                for value in &node.values {
                    self.expr_type_deferred(value, deferred);
                }
                self.db.builtin_types().instance(KnownClass::Dict)
            }
            ast::Expr::BinOp(node) => {
                let left = self.expr_type_deferred(&node.left, deferred);
                let right = self.expr_type_deferred(&node.right, deferred);
                self.binary_op_type(left, node.op, right)
            }
            ast::Expr::UnaryOp(node) => {
                let operand = self.expr_type_deferred(&node.operand, deferred);
                match node.op {
                    ast::UnaryOp::Not => self.db.builtin_types().instance(KnownClass::Bool),
                    ast::UnaryOp::USub | ast::UnaryOp::UAdd | ast::UnaryOp::Invert => {
                        match operand {
                            Type::Object(_) => operand,
                            Type::Any => Type::Any,
                            _ => Type::Unknown,
                        }
                    }
                }
            }
            ast::Expr::BoolOp(node) => {
                let mut builder = UnionBuilder::new(self.store(), self.file);
                for value in &node.values {
                    let ty = self.expr_type_deferred(value, deferred);
                    builder = builder.add(ty);
                }
                builder.build()
            }
            ast::Expr::Compare(node) => {
                self.expr_type_deferred(&node.left, deferred);
                for comparator in &node.comparators {
                    self.expr_type_deferred(comparator, deferred);
                }
                self.db.builtin_types().instance(KnownClass::Bool)
            }
            ast::Expr::IfExp(node) => {
                self.expr_type_deferred(&node.test, deferred);
                let env = self.db.execution_environment().clone();
                match static_truthiness::evaluate(&node.test, &env) {
                    Some(true) => self.expr_type_deferred(&node.body, deferred),
                    Some(false) => self.expr_type_deferred(&node.orelse, deferred),
                    None => {
                        let body = self.expr_type_deferred(&node.body, deferred);
                        let orelse = self.expr_type_deferred(&node.orelse, deferred);
                        union_of(self.store(), self.file, [body, orelse])
                    }
                }
            }
            ast::Expr::NamedExpr(node) => {
                let value_ty = self.expr_type_deferred(&node.value, deferred);
                self.assign_target(&node.target, value_ty, deferred);
                value_ty
            }
            ast::Expr::Lambda(node) => self.lambda_type(expr, node, deferred),
            ast::Expr::ListComp(node) => {
                self.comprehension_scope(expr, &node.generators, deferred, |ev, deferred| {
                    ev.expr_type_deferred(&node.elt, deferred);
                });
                self.db.builtin_types().instance(KnownClass::List)
            }
            ast::Expr::SetComp(node) => {
                self.comprehension_scope(expr, &node.generators, deferred, |ev, deferred| {
                    ev.expr_type_deferred(&node.elt, deferred);
                });
                self.db.builtin_types().instance(KnownClass::Set)
            }
            ast::Expr::DictComp(node) => {
                self.comprehension_scope(expr, &node.generators, deferred, |ev, deferred| {
                    ev.expr_type_deferred(&node.key, deferred);
                    ev.expr_type_deferred(&node.value, deferred);
                });
                self.db.builtin_types().instance(KnownClass::Dict)
            }
            ast::Expr::GeneratorExp(node) => {
                self.comprehension_scope(expr, &node.generators, deferred, |ev, deferred| {
                    ev.expr_type_deferred(&node.elt, deferred);
                });
                Type::Unknown
            }
            ast::Expr::Await(node) => {
                self.expr_type_deferred(&node.value, deferred);
                Type::Unknown
            }
            ast::Expr::Yield(node) => {
                if let Some(value) = &node.value {
                    self.expr_type_deferred(value, deferred);
                }
                Type::Unknown
            }
            ast::Expr::YieldFrom(node) => {
                self.expr_type_deferred(&node.value, deferred);
                Type::Unknown
            }
            ast::Expr::JoinedStr(node) => {
                for value in &node.values {
                    self.expr_type_deferred(value, deferred);
                }
                self.db.builtin_types().instance(KnownClass::Str)
            }
            ast::Expr::FormattedValue(node) => {
                self.expr_type_deferred(&node.value, deferred);
                self.db.builtin_types().instance(KnownClass::Str)
            }
            ast::Expr::Starred(node) => self.expr_type_deferred(&node.value, deferred),
            ast::Expr::Slice(node) => {
                for bound in [&node.lower, &node.upper, &node.step].into_iter().flatten() {
                    self.expr_type_deferred(bound, deferred);
                }
                self.db.builtin_types().instance(KnownClass::Slice)
            }
            _ => Type::Unknown,
        }
    }

    fn constant_type(&self, constant: &ast::Constant) -> Type {
        let builtins = self.db.builtin_types();
        match constant {
            ast::Constant::None => Type::None,
            ast::Constant::Bool(_) => builtins.instance(KnownClass::Bool),
            ast::Constant::Int(_) => builtins.instance(KnownClass::Int),
            ast::Constant::Float(_) => builtins.instance(KnownClass::Float),
            ast::Constant::Complex { .. } => builtins.instance(KnownClass::Complex),
            ast::Constant::Str(_) => builtins.instance(KnownClass::Str),
            ast::Constant::Bytes(_) => builtins.instance(KnownClass::Bytes),
            ast::Constant::Ellipsis => Type::Any,
            ast::Constant::Tuple(_) => builtins.instance(KnownClass::Tuple),
        }
    }

    fn name_type(&mut self, expr: &ast::Expr, node: &ast::ExprName) -> Type {
        if !matches!(node.ctx, ast::ExprContext::Load) {
            return Type::Unknown;
        }
        let name = node.id.as_str();
        let Some(lookup) = self.index.lookup_symbol(self.current_scope(), name) else {
            let message = format!("'{name}' is not defined");
            self.report(Rule::UndefinedVariable, expr.range(), message);
            return Type::Unknown;
        };

        let base = self.symbol_value_type(lookup.scope, lookup.symbol, name);

        // Names captured from an outer executable scope cannot be
        // narrowed by this scope's flow.
        if lookup.crossed_execution_scope
            && self.index.scope(lookup.scope).kind() != ScopeKind::Builtin
        {
            return base;
        }
        match SupportedExpr::from_expr(expr) {
            Some(chain) => self.apply_narrowing(&chain, base),
            None => base,
        }
    }

    fn symbol_value_type(&mut self, scope: ScopeId, symbol: SymbolId, name: &str) -> Type {
        let record = self.index.symbol(scope, symbol);
        if record.flags().contains(SymbolFlags::AMBIENT) {
            return self
                .db
                .builtin_types()
                .builtin_symbol(name)
                .unwrap_or(Type::Unknown);
        }
        self.store()
            .declared_type(self.file, scope, symbol)
            .or_else(|| self.store().symbol_type(self.file, scope, symbol))
            .unwrap_or(Type::Unknown)
    }

    /// The current narrowed type of a supported expression, resolved
    /// from scratch. Used as the fallback when merging branch scopes.
    pub(crate) fn chain_type(&mut self, chain: &SupportedExpr) -> Type {
        let parts = chain.parts();
        let Some((root, members)) = parts.split_first() else {
            return Type::Unknown;
        };
        let Some(lookup) = self.index.lookup_symbol(self.current_scope(), root) else {
            return Type::Unknown;
        };
        let mut ty = self.symbol_value_type(lookup.scope, lookup.symbol, root);
        for member in members {
            ty = self.member_type(ty, member).unwrap_or(Type::Unknown);
        }
        self.apply_narrowing(chain, ty)
    }

    /// Folds the applicable constraints over the temporary-scope stack;
    /// the nearest matching constraint wins.
    fn apply_narrowing(&self, chain: &SupportedExpr, base: Type) -> Type {
        let mut ty = base;
        for frame in &self.frames {
            for constraint in &frame.constraints {
                if &constraint.target == chain {
                    ty = constraint.ty;
                }
            }
        }
        ty
    }

    fn attribute_type(
        &mut self,
        expr: &'db ast::Expr,
        node: &'db ast::ExprAttribute,
        deferred: &mut VecDeque<DeferredBody<'db>>,
    ) -> Type {
        let value_ty = self.expr_type_deferred(&node.value, deferred);
        if !matches!(node.ctx, ast::ExprContext::Load) {
            return Type::Unknown;
        }
        let member = node.attr.as_str();
        let base = match self.member_type(value_ty, member) {
            Some(ty) => ty,
            None => {
                self.report_missing_member(value_ty, member, expr);
                Type::Unknown
            }
        };
        match SupportedExpr::from_expr(expr) {
            Some(chain) => self.apply_narrowing(&chain, base),
            None => base,
        }
    }

    fn report_missing_member(&mut self, value_ty: Type, member: &str, expr: &ast::Expr) {
        let optional = match value_ty {
            Type::None => true,
            Type::Union(union) => self.store().union_contains(union, Type::None),
            _ => false,
        };
        let rule = if optional {
            Rule::OptionalMemberAccess
        } else {
            Rule::GeneralTypeIssues
        };
        let message = format!(
            "'{member}' is not a known member of '{}'",
            value_ty.display(self.store())
        );
        self.report(rule, expr.range(), message);
    }

    /// Member lookup. `None` means the member is provably absent; known
    /// gaps in the model come back as `Some(Unknown)`.
    fn member_type(&mut self, value_ty: Type, member: &str) -> Option<Type> {
        match value_ty {
            Type::Any => Some(Type::Any),
            Type::Unknown | Type::Unbound | Type::Never | Type::Ellipsis | Type::TypeVar(_) => {
                Some(Type::Unknown)
            }
            Type::None => None,
            Type::Module(ModuleType::Synthesized(module)) => Some(
                self.db
                    .builtin_types()
                    .synthesized_member(module, member)
                    .unwrap_or(Type::Unknown),
            ),
            Type::Module(ModuleType::File(file)) => {
                if let Some(ty) = public_symbol_type(self.db, file, member) {
                    return Some(ty);
                }
                if let Some(submodule) = self.db.module_member_file(file, member) {
                    return Some(Type::Module(ModuleType::File(submodule)));
                }
                None
            }
            Type::Class(class) => self.class_member_type(class, member, false),
            Type::Object(class) => self.class_member_type(class, member, true),
            Type::Union(union) => {
                let elements = self.store().union_elements(union);
                let mut builder = UnionBuilder::new(self.store(), self.file);
                let mut missing: Option<Type> = None;
                for element in elements {
                    match self.member_type(element, member) {
                        Some(ty) => builder = builder.add(ty),
                        None => missing = Some(element),
                    }
                }
                if let Some(alternative) = missing {
                    // Reported against the offending alternative.
                    return if alternative == Type::None {
                        None
                    } else {
                        Some(builder.add(Type::Unknown).build())
                    };
                }
                Some(builder.build())
            }
            Type::Function(_) | Type::Overloaded(_) | Type::Property(_) => Some(Type::Unknown),
            Type::Tuple(_) => Some(Type::Unknown),
        }
    }

    fn class_member_type(
        &mut self,
        class: ClassTypeId,
        member: &str,
        instance_access: bool,
    ) -> Option<Type> {
        if let Some(ty) = self.lookup_class_member(class, member) {
            // Property access on an instance yields the getter's return.
            if instance_access {
                if let Type::Property(property) = ty {
                    let getter = self.store().property(property).getter;
                    if let Type::Function(getter) = getter {
                        return Some(self.store().function(getter).effective_return());
                    }
                    return Some(Type::Unknown);
                }
            }
            return Some(ty);
        }
        if self.class_has_known_members(class) {
            None
        } else {
            Some(Type::Unknown)
        }
    }

    fn lookup_class_member(&mut self, class: ClassTypeId, member: &str) -> Option<Type> {
        let mut visited = Vec::new();
        self.lookup_class_member_guarded(class, member, &mut visited)
    }

    fn lookup_class_member_guarded(
        &mut self,
        class: ClassTypeId,
        member: &str,
        visited: &mut Vec<ClassTypeId>,
    ) -> Option<Type> {
        if visited.contains(&class) {
            return None;
        }
        visited.push(class);
        if let Some(ty) = self.store().class_synthesized_member(class, member) {
            return Some(ty);
        }
        if let Some((file, scope_id)) = self.store().class_scope(class) {
            if let Some(index) = self.db.semantic_index(file) {
                let scope = index.scope(scope_id);
                if let Some(symbol) = scope.symbols().symbol_id_by_name(member) {
                    if scope.symbols().symbol(symbol).is_ambient() {
                        return self
                            .db
                            .builtin_types()
                            .builtin_symbol(member)
                            .or(Some(Type::Unknown));
                    }
                    let ty = self
                        .store()
                        .declared_type(file, scope_id, symbol)
                        .or_else(|| self.store().symbol_type(file, scope_id, symbol))
                        .unwrap_or(Type::Unknown);
                    return Some(ty);
                }
            }
        }
        for base in self.store().class_bases(class) {
            if let Type::Class(base) = base {
                if let Some(ty) = self.lookup_class_member_guarded(base, member, visited) {
                    return Some(ty);
                }
            }
        }
        None
    }

    /// Whether misses against this class are reportable: the checker
    /// knows the full member set only for classes with a body scope or
    /// synthesized members.
    fn class_has_known_members(&self, class: ClassTypeId) -> bool {
        let info = self.store().class(class);
        info.scope.is_some() || !info.synthesized_members.is_empty()
    }

    fn binary_op_type(&self, left: Type, op: ast::Operator, right: Type) -> Type {
        use KnownClass::{Bool, Bytes, Complex, Float, Int, List, Str};
        let builtins = self.db.builtin_types();
        let known = |ty: Type| match ty {
            Type::Object(class) => self.store().class_known(class),
            _ => None,
        };

        if left.is_any() || right.is_any() {
            return Type::Any;
        }
        if left.is_unknown() || right.is_unknown() {
            return Type::Unknown;
        }

        let numeric = |class: KnownClass| matches!(class, Int | Float | Complex | Bool);
        match (known(left), known(right)) {
            (Some(l), Some(r)) if numeric(l) && numeric(r) => {
                let result = if l == Complex || r == Complex {
                    Complex
                } else if l == Float || r == Float || matches!(op, ast::Operator::Div) {
                    Float
                } else {
                    Int
                };
                builtins.instance(result)
            }
            (Some(Str), Some(Str)) if matches!(op, ast::Operator::Add | ast::Operator::Mod) => {
                builtins.instance(Str)
            }
            (Some(Str), Some(Int)) if matches!(op, ast::Operator::Mult) => builtins.instance(Str),
            (Some(Bytes), Some(Bytes)) if matches!(op, ast::Operator::Add) => {
                builtins.instance(Bytes)
            }
            (Some(List), Some(List)) if matches!(op, ast::Operator::Add) => {
                builtins.instance(List)
            }
            _ => Type::Unknown,
        }
    }

    fn iteration_element_type(&self, iter_ty: Type) -> Type {
        match iter_ty {
            Type::Tuple(tuple) => {
                let elements = self.store().tuple_elements(tuple);
                union_of(self.store(), self.file, elements)
            }
            Type::Any => Type::Any,
            _ => Type::Unknown,
        }
    }

    fn lambda_type(
        &mut self,
        expr: &'db ast::Expr,
        node: &'db ast::ExprLambda,
        deferred: &mut VecDeque<DeferredBody<'db>>,
    ) -> Type {
        let key = NodeKey::from_expr(expr);
        for default in node
            .args
            .posonlyargs
            .iter()
            .chain(&node.args.args)
            .chain(&node.args.kwonlyargs)
            .filter_map(|arg| arg.default.as_deref())
        {
            self.expr_type_deferred(default, deferred);
        }

        let params = self.parameter_types(&node.args);
        let function = match self.store_cached_function(key) {
            Some(function) => function,
            None => {
                let mut function = FunctionType::new(Name::new_static("<lambda>"));
                function.params = params.clone();
                let id = self.store().add_function(self.file, function);
                self.store().cache_node_object(self.file, key, Type::Function(id));
                id
            }
        };

        if let Some(scope) = self.index.scope_of_node(key) {
            self.record_parameter_types(scope, &node.args, &params);
            deferred.push_back(DeferredBody::Lambda {
                scope,
                function,
                body: &node.body,
            });
        }
        Type::Function(function)
    }

    fn comprehension_scope(
        &mut self,
        expr: &'db ast::Expr,
        generators: &'db [ast::Comprehension],
        deferred: &mut VecDeque<DeferredBody<'db>>,
        visit_elements: impl FnOnce(&mut Self, &mut VecDeque<DeferredBody<'db>>),
    ) {
        let Some((first, rest)) = generators.split_first() else {
            return;
        };
        let first_iter_ty = self.expr_type_deferred(&first.iter, deferred);

        let Some(scope) = self.index.scope_of_node(NodeKey::from_expr(expr)) else {
            return;
        };
        self.scope_stack.push(scope);
        self.frames.push(TemporaryScope::looping());

        let element_ty = self.iteration_element_type(first_iter_ty);
        self.assign_target(&first.target, element_ty, deferred);
        for condition in &first.ifs {
            self.expr_type_deferred(condition, deferred);
        }
        for generator in rest {
            let iter_ty = self.expr_type_deferred(&generator.iter, deferred);
            let element_ty = self.iteration_element_type(iter_ty);
            self.assign_target(&generator.target, element_ty, deferred);
            for condition in &generator.ifs {
                self.expr_type_deferred(condition, deferred);
            }
        }
        visit_elements(self, deferred);

        self.frames.pop();
        self.scope_stack.pop();
    }

    // ------------------------------------------------------------------
    // Annotations
    // ------------------------------------------------------------------

    /// Evaluates a type annotation: class references stay classes during
    /// recursion; a class in the final value position becomes its
    /// instance unless the sub-evaluation already produced a class-typed
    /// result (`Type[C]`).
    pub(crate) fn annotation_type(&mut self, annotation: &'db ast::Expr) -> Type {
        let result = self.eval_annotation(annotation);
        let ty = if result.is_class_result {
            result.ty
        } else {
            match result.ty {
                Type::Class(class) => Type::Object(class),
                other => other,
            }
        };
        let key = NodeKey::from_expr(annotation);
        self.changed |= self.store().cache_node_type(self.file, key, ty);
        ty
    }

    fn eval_annotation(&mut self, annotation: &'db ast::Expr) -> AnnotationResult {
        match annotation {
            ast::Expr::Constant(node) => match &node.value {
                ast::Constant::None => AnnotationResult::value(Type::None),
                ast::Constant::Ellipsis => AnnotationResult::value(Type::Ellipsis),
                // String annotations are not re-parsed.
                ast::Constant::Str(_) => AnnotationResult::value(Type::Unknown),
                _ => AnnotationResult::value(Type::Unknown),
            },
            ast::Expr::Name(_) | ast::Expr::Attribute(_) => {
                let ty = self.expr_type(annotation);
                AnnotationResult::value(ty)
            }
            ast::Expr::Subscript(node) => {
                let value_ty = self.expr_type(&node.value);
                self.subscript_type(value_ty, &node.slice, &mut VecDeque::new())
            }
            ast::Expr::BinOp(node) if matches!(node.op, ast::Operator::BitOr) => {
                // PEP 604 unions: `int | None`.
                let left = self.annotation_type(&node.left);
                let right = self.annotation_type(&node.right);
                AnnotationResult::value(union_of(self.store(), self.file, [left, right]))
            }
            ast::Expr::Tuple(node) => {
                let element_types: Vec<Type> = node
                    .elts
                    .iter()
                    .map(|element| self.annotation_type(element))
                    .collect();
                AnnotationResult::value(Type::Tuple(
                    self.store().add_tuple(self.file, element_types),
                ))
            }
            _ => {
                let ty = self.expr_type(annotation);
                AnnotationResult::value(ty)
            }
        }
    }

    /// Index expressions: special forms get dedicated handling, ordinary
    /// classes specialize, everything else is unresolved.
    fn subscript_type(
        &mut self,
        value_ty: Type,
        slice: &'db ast::Expr,
        deferred: &mut VecDeque<DeferredBody<'db>>,
    ) -> AnnotationResult {
        match value_ty {
            Type::Class(class) => {
                if let Some(form) = self.store().class_special_form(class) {
                    return self.special_form_type(form, slice);
                }
                // Ordinary generic class: specialize with the provided
                // arguments, bounded by the declared parameter count.
                let args = self.annotation_arguments(slice);
                let declared = self.store().class_type_params(class);
                if !declared.is_empty() && args.len() > declared.len() {
                    let message = format!(
                        "Expected at most {} type argument(s) for '{}'",
                        declared.len(),
                        self.store().class_name(class),
                    );
                    self.report(Rule::GeneralTypeIssues, slice.range(), message);
                }
                let specialized = self.store().specialize_class(class, args);
                AnnotationResult::class(Type::Class(specialized))
            }
            Type::Object(_) => {
                self.expr_type_deferred(slice, deferred);
                Type::Unknown.into()
            }
            Type::Tuple(tuple) => {
                self.expr_type_deferred(slice, deferred);
                let elements = self.store().tuple_elements(tuple);
                AnnotationResult::value(union_of(self.store(), self.file, elements))
            }
            Type::Any => Type::Any.into(),
            _ => {
                self.expr_type_deferred(slice, deferred);
                Type::Unknown.into()
            }
        }
    }

    fn annotation_arguments(&mut self, slice: &'db ast::Expr) -> Vec<Type> {
        match slice {
            ast::Expr::Tuple(tuple) => tuple
                .elts
                .iter()
                .map(|element| self.annotation_type(element))
                .collect(),
            _ => vec![self.annotation_type(slice)],
        }
    }

    fn special_form_type(&mut self, form: SpecialForm, slice: &'db ast::Expr) -> AnnotationResult {
        let args: Vec<&'db ast::Expr> = match slice {
            ast::Expr::Tuple(tuple) => tuple.elts.iter().collect(),
            _ => vec![slice],
        };

        if args.is_empty() {
            return AnnotationResult::value(Type::Unknown);
        }
        if let Some(limit) = form.param_limit() {
            if args.len() > limit {
                let message = format!(
                    "Expected at most {limit} type argument(s) for '{}'",
                    form.name()
                );
                self.report(Rule::GeneralTypeIssues, slice.range(), message);
            }
        }

        match form {
            SpecialForm::Optional => {
                let inner = self.annotation_type(args[0]);
                AnnotationResult::value(union_of(self.store(), self.file, [inner, Type::None]))
            }
            SpecialForm::Union => {
                let mut builder = UnionBuilder::new(self.store(), self.file);
                for &arg in &args {
                    let ty = self.annotation_type(arg);
                    builder = builder.add(ty);
                }
                AnnotationResult::value(builder.build())
            }
            SpecialForm::Type => {
                let inner = self.annotation_type(args[0]);
                match inner {
                    Type::Object(class) => AnnotationResult::class(Type::Class(class)),
                    Type::Any => AnnotationResult::class(Type::Any),
                    _ => AnnotationResult::class(Type::Unknown),
                }
            }
            SpecialForm::Callable => {
                // Zero to two arguments; the parameter list is `...` or a
                // bracketed list. Only the return type is modeled.
                let return_ty = args
                    .get(1)
                    .copied()
                    .map(|arg| self.annotation_type(arg))
                    .unwrap_or(Type::Unknown);
                if let Some(first) = args.first().copied() {
                    if !matches!(
                        first,
                        ast::Expr::List(_)
                            | ast::Expr::Constant(ast::ExprConstant {
                                value: ast::Constant::Ellipsis,
                                ..
                            })
                    ) {
                        let message =
                            "Expected parameter list or '...' as first argument to 'Callable'"
                                .to_string();
                        self.report(Rule::GeneralTypeIssues, first.range(), message);
                    } else if let ast::Expr::List(list) = first {
                        for element in &list.elts {
                            self.annotation_type(element);
                        }
                    }
                }
                let mut function = FunctionType::new(Name::new_static("<callable>"));
                function.declared_return = Some(return_ty);
                let id = self.store().add_function(self.file, function);
                AnnotationResult::value(Type::Function(id))
            }
            SpecialForm::Generic | SpecialForm::Protocol => {
                // All arguments must be distinct type variables.
                let mut seen = Vec::new();
                for &arg in &args {
                    let ty = self.annotation_type(arg);
                    match ty {
                        Type::TypeVar(id) => {
                            if seen.contains(&id) {
                                let message = format!(
                                    "Type arguments for '{}' must be unique",
                                    form.name()
                                );
                                self.report(Rule::GeneralTypeIssues, arg.range(), message);
                            }
                            seen.push(id);
                        }
                        Type::Unknown | Type::Any => {}
                        _ => {
                            let message = format!(
                                "Type argument for '{}' must be a TypeVar",
                                form.name()
                            );
                            self.report(Rule::GeneralTypeIssues, arg.range(), message);
                        }
                    }
                }
                AnnotationResult::class(Type::Unknown)
            }
            SpecialForm::ClassVar | SpecialForm::Final => {
                let inner = self.annotation_type(args[0]);
                AnnotationResult::value(inner)
            }
            SpecialForm::Literal => {
                // The values, not their types, would be needed for true
                // literal support; each argument contributes its type.
                let mut builder = UnionBuilder::new(self.store(), self.file);
                for &arg in &args {
                    let ty = self.expr_type(arg);
                    builder = builder.add(ty);
                }
                AnnotationResult::value(builder.build())
            }
            SpecialForm::Tuple => {
                if args.len() == 2
                    && matches!(
                        args[1],
                        ast::Expr::Constant(ast::ExprConstant {
                            value: ast::Constant::Ellipsis,
                            ..
                        })
                    )
                {
                    // Homogeneous `Tuple[X, ...]`.
                    self.annotation_type(args[0]);
                    return AnnotationResult::value(
                        self.db.builtin_types().instance(KnownClass::Tuple),
                    );
                }
                let mut element_types = Vec::with_capacity(args.len());
                for &arg in &args {
                    element_types.push(self.annotation_type(arg));
                }
                AnnotationResult::value(Type::Tuple(
                    self.store().add_tuple(self.file, element_types),
                ))
            }
            _ => {
                // Shape families over builtin containers.
                let args_types = {
                    let mut types = Vec::with_capacity(args.len());
                    for &arg in &args {
                        types.push(self.annotation_type(arg));
                    }
                    types
                };
                match form.container_class() {
                    Some(container) => {
                        let base = self.db.builtin_types().class_id(container);
                        let specialized = self.store().specialize_class(base, args_types);
                        AnnotationResult::class(Type::Class(specialized))
                    }
                    None => AnnotationResult::value(Type::Unknown),
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn call_type(
        &mut self,
        expr: &'db ast::Expr,
        node: &'db ast::ExprCall,
        deferred: &mut VecDeque<DeferredBody<'db>>,
    ) -> Type {
        let callee = self.expr_type_deferred(&node.func, deferred);

        for arg in &node.args {
            self.expr_type_deferred(arg, deferred);
        }
        for keyword in &node.keywords {
            self.expr_type_deferred(&keyword.value, deferred);
        }

        match callee {
            Type::Function(function) => {
                match self.store().function_known(function) {
                    Some(KnownFunction::TypeVarFactory) => self.type_var_call(expr, node),
                    Some(KnownFunction::NamedTuple) => self.named_tuple_call(expr, node),
                    _ => self.store().function(function).effective_return(),
                }
            }
            Type::Overloaded(overloaded) => {
                let overloads = self.store().overloads(overloaded);
                match overloads.first() {
                    Some(first) => self.store().function(*first).effective_return(),
                    None => Type::Unknown,
                }
            }
            Type::Class(class) => {
                if self.store().class_special_form(class).is_some() {
                    return Type::Unknown;
                }
                Type::Object(class)
            }
            Type::Object(_) => Type::Unknown,
            Type::Any => Type::Any,
            Type::Unknown | Type::Unbound => Type::Unknown,
            Type::Union(union) => {
                let elements = self.store().union_elements(union);
                let mut builder = UnionBuilder::new(self.store(), self.file);
                for element in elements {
                    let result = match element {
                        Type::Function(function) => {
                            self.store().function(function).effective_return()
                        }
                        Type::Class(class) => Type::Object(class),
                        Type::Any => Type::Any,
                        _ => Type::Unknown,
                    };
                    builder = builder.add(result);
                }
                builder.build()
            }
            Type::Module(_) | Type::None => {
                let message = format!(
                    "Object of type '{}' is not callable",
                    callee.display(self.store())
                );
                self.report(Rule::GeneralTypeIssues, expr.range(), message);
                Type::Unknown
            }
            _ => Type::Unknown,
        }
    }

    /// `T = TypeVar("T", bound=..., covariant=..., contravariant=...)`.
    fn type_var_call(&mut self, expr: &'db ast::Expr, node: &'db ast::ExprCall) -> Type {
        let key = NodeKey::from_expr(expr);
        if let Some(cached) = self.store().cached_node_object(self.file, key) {
            return cached;
        }

        let Some(ast::Expr::Constant(ast::ExprConstant {
            value: ast::Constant::Str(name),
            ..
        })) = node.args.first()
        else {
            let message = "Expected name of TypeVar as first argument".to_string();
            self.report(Rule::GeneralTypeIssues, expr.range(), message);
            return Type::Unknown;
        };

        let mut bound = None;
        let mut covariant = false;
        let mut contravariant = false;
        for keyword in &node.keywords {
            match keyword.arg.as_ref().map(ast::Identifier::as_str) {
                Some("bound") => bound = Some(self.annotation_type(&keyword.value)),
                Some("covariant") => covariant = bool_argument(&keyword.value).unwrap_or(false),
                Some("contravariant") => {
                    contravariant = bool_argument(&keyword.value).unwrap_or(false);
                }
                _ => {}
            }
        }
        if covariant && contravariant {
            let message = "A TypeVar cannot be both covariant and contravariant".to_string();
            self.report(Rule::GeneralTypeIssues, expr.range(), message);
        }

        let constraints = node
            .args
            .iter()
            .skip(1)
            .map(|constraint| self.annotation_type(constraint))
            .collect();

        let variance = if covariant {
            Variance::Covariant
        } else if contravariant {
            Variance::Contravariant
        } else {
            Variance::Invariant
        };
        let id = self.store().add_type_var(
            self.file,
            TypeVarType {
                name: Name::new(name),
                bound,
                constraints,
                variance,
            },
        );
        let ty = Type::TypeVar(id);
        self.store().cache_node_object(self.file, key, ty);
        ty
    }

    /// `P = namedtuple("P", ["x", "y"])`: synthesizes a tuple-derived
    /// class with one member per entry and generated `__new__`/`__init__`
    /// signatures.
    fn named_tuple_call(&mut self, expr: &'db ast::Expr, node: &'db ast::ExprCall) -> Type {
        let key = NodeKey::from_expr(expr);
        if let Some(cached) = self.store().cached_node_object(self.file, key) {
            return cached;
        }

        let Some(ast::Expr::Constant(ast::ExprConstant {
            value: ast::Constant::Str(type_name),
            ..
        })) = node.args.first()
        else {
            let message = "Expected name of named tuple as first argument".to_string();
            self.report(Rule::GeneralTypeIssues, expr.range(), message);
            return Type::Unknown;
        };

        let fields = node
            .args
            .get(1)
            .map(named_tuple_fields)
            .unwrap_or_default();

        let builtins = self.db.builtin_types();
        let tuple_class = builtins.class_type(KnownClass::Tuple);
        let int_instance = builtins.instance(KnownClass::Int);
        let list_instance = builtins.instance(KnownClass::List);

        let mut class = ClassType::new(Name::new(type_name));
        class.bases = vec![tuple_class];
        for field in &fields {
            class
                .synthesized_members
                .push((Name::new(field), Type::Unknown));
        }
        let class_id = self.store().add_class(self.file, class);

        let make_init = |evaluator: &Self, name: &'static str, constructor: bool| {
            let mut function = FunctionType::new(Name::new_static(name));
            if constructor {
                function.flags.insert(FunctionTypeFlags::CONSTRUCTOR);
            } else {
                function.flags.insert(FunctionTypeFlags::INSTANCE_METHOD);
            }
            function.params.push(FunctionParameter {
                category: ParameterCategory::Simple,
                name: Some(Name::new_static(if constructor { "cls" } else { "self" })),
                ty: Type::Unknown,
                has_default: false,
            });
            for field in &fields {
                function.params.push(FunctionParameter {
                    category: ParameterCategory::Simple,
                    name: Some(Name::new(field)),
                    ty: Type::Unknown,
                    has_default: false,
                });
            }
            function.declared_return = Some(if constructor {
                Type::Object(class_id)
            } else {
                Type::None
            });
            evaluator.store().add_function(evaluator.file, function)
        };

        let new_id = make_init(self, "__new__", true);
        let init_id = make_init(self, "__init__", false);
        let simple_method = |evaluator: &Self, name: &'static str, returns: Type| {
            let mut function = FunctionType::new(Name::new(name));
            function.flags.insert(FunctionTypeFlags::INSTANCE_METHOD);
            function.params.push(FunctionParameter {
                category: ParameterCategory::Simple,
                name: Some(Name::new_static("self")),
                ty: Type::Unknown,
                has_default: false,
            });
            function.declared_return = Some(returns);
            evaluator.store().add_function(evaluator.file, function)
        };
        let keys_id = simple_method(self, "keys", list_instance);
        let items_id = simple_method(self, "items", list_instance);
        let len_id = simple_method(self, "__len__", int_instance);

        let mut updated = self.store().class(class_id);
        updated
            .synthesized_members
            .push((Name::new_static("__new__"), Type::Function(new_id)));
        updated
            .synthesized_members
            .push((Name::new_static("__init__"), Type::Function(init_id)));
        updated
            .synthesized_members
            .push((Name::new_static("keys"), Type::Function(keys_id)));
        updated
            .synthesized_members
            .push((Name::new_static("items"), Type::Function(items_id)));
        updated
            .synthesized_members
            .push((Name::new_static("__len__"), Type::Function(len_id)));
        self.store().overwrite_class(class_id, updated);

        let ty = Type::Class(class_id);
        self.store().cache_node_object(self.file, key, ty);
        ty
    }

    // ------------------------------------------------------------------
    // Assignability
    // ------------------------------------------------------------------

    /// A permissive assignability check: `Unknown`/`Any` are compatible
    /// in both directions, instances follow the class hierarchy with the
    /// numeric promotions, unions distribute.
    fn is_assignable(&self, source: Type, target: Type) -> bool {
        use KnownClass::{Bool, Complex, Float, Int, Object};

        if source == target {
            return true;
        }
        match (source, target) {
            (Type::Any | Type::Unknown | Type::Never | Type::Unbound, _) => true,
            (_, Type::Any | Type::Unknown) => true,
            (_, Type::TypeVar(_)) | (Type::TypeVar(_), _) => true,
            (Type::Union(source_union), _) => self
                .store()
                .union_elements(source_union)
                .into_iter()
                .all(|element| self.is_assignable(element, target)),
            (_, Type::Union(target_union)) => self
                .store()
                .union_elements(target_union)
                .into_iter()
                .any(|element| self.is_assignable(source, element)),
            (Type::None, Type::Object(class)) => {
                matches!(self.store().class_known(class), Some(Object))
            }
            (Type::Object(source_class), Type::Object(target_class)) => {
                if self.store().is_derived_from(source_class, target_class) {
                    return true;
                }
                let source_known = self.store().class_known(source_class);
                let target_known = self.store().class_known(target_class);
                matches!(
                    (source_known, target_known),
                    (Some(Int | Bool), Some(Float | Complex)) | (Some(Float), Some(Complex))
                )
            }
            (Type::Class(source_class), Type::Class(target_class)) => {
                self.store().is_derived_from(source_class, target_class)
            }
            // Everything is an `object`; tuples are `tuple` instances.
            (_, Type::Object(class)) if matches!(self.store().class_known(class), Some(Object)) => {
                true
            }
            (Type::Tuple(_), Type::Object(class)) => {
                matches!(self.store().class_known(class), Some(KnownClass::Tuple))
            }
            (Type::Function(_) | Type::Overloaded(_), Type::Function(_)) => true,
            (Type::Tuple(source_tuple), Type::Tuple(target_tuple)) => {
                let source_elements = self.store().tuple_elements(source_tuple);
                let target_elements = self.store().tuple_elements(target_tuple);
                source_elements.len() == target_elements.len()
                    && source_elements
                        .into_iter()
                        .zip(target_elements)
                        .all(|(s, t)| self.is_assignable(s, t))
            }
            _ => false,
        }
    }
}

/// Intermediate result shape during annotation evaluation; `is_class_
/// result` suppresses the final instance-wrap (`Type[C]` stays a class).
struct AnnotationResult {
    ty: Type,
    is_class_result: bool,
}

impl AnnotationResult {
    fn value(ty: Type) -> Self {
        Self {
            ty,
            is_class_result: false,
        }
    }

    fn class(ty: Type) -> Self {
        Self {
            ty,
            is_class_result: true,
        }
    }
}

impl From<Type> for AnnotationResult {
    fn from(ty: Type) -> Self {
        AnnotationResult::value(ty)
    }
}

/// Common view over sync and async function definitions.
#[derive(Copy, Clone)]
struct FunctionNode<'a> {
    name: &'a str,
    args: &'a ast::Arguments,
    body: &'a [ast::Stmt],
    decorator_list: &'a [ast::Decorator],
    returns: Option<&'a ast::Expr>,
    is_async: bool,
}

impl<'a> FunctionNode<'a> {
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

fn decorator_name(expr: &ast::Expr) -> Option<&str> {
    match expr {
        ast::Expr::Name(name) => Some(name.id.as_str()),
        ast::Expr::Attribute(attribute) => Some(attribute.attr.as_str()),
        _ => None,
    }
}

fn bool_argument(expr: &ast::Expr) -> Option<bool> {
    match expr {
        ast::Expr::Constant(ast::ExprConstant {
            value: ast::Constant::Bool(value),
            ..
        }) => Some(*value),
        _ => None,
    }
}

fn doc_string_of(body: &[ast::Stmt]) -> Option<String> {
    match body.first() {
        Some(ast::Stmt::Expr(node)) => match node.value.as_ref() {
            ast::Expr::Constant(ast::ExprConstant {
                value: ast::Constant::Str(text),
                ..
            }) => Some(text.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// Field list of a `namedtuple` call: a sequence of string literals, or
/// one comma/space-separated string.
fn named_tuple_fields(expr: &ast::Expr) -> Vec<String> {
    match expr {
        ast::Expr::List(list) => string_elements(&list.elts),
        ast::Expr::Tuple(tuple) => string_elements(&tuple.elts),
        ast::Expr::Constant(ast::ExprConstant {
            value: ast::Constant::Str(text),
            ..
        }) => text
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn string_elements(elements: &[ast::Expr]) -> Vec<String> {
    elements
        .iter()
        .filter_map(|element| match element {
            ast::Expr::Constant(ast::ExprConstant {
                value: ast::Constant::Str(text),
                ..
            }) => Some(text.clone()),
            _ => None,
        })
        .collect()
}
