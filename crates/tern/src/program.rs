//! Per-file analysis driver.
//!
//! Each file moves through parse -> bind -> type-analysis passes ->
//! finalize, encoded by monotonically-increasing versions plus boolean
//! gates. Imports resolved at parse time pull dependencies into the
//! worklist; analysis passes repeat across the loaded set until no
//! file's types change, up to a fixed cap.

use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use rustpython_ast::text_size::TextRange;

use tern_python_semantic::builtins::{BuiltinTypes, SynthesizedModule};
use tern_python_semantic::db::{Db, ImportTarget};
use tern_python_semantic::diagnostic::{Diagnostic, DiagnosticCategory, DiagnosticSettings};
use tern_python_semantic::line_index::LineIndex;
use tern_python_semantic::module_resolver::{
    collect_import_descriptors, ExecutionEnvironment, ImportResolver, ImportResult, ImportType,
    ModuleDescriptor,
};
use tern_python_semantic::node_key::NodeKey;
use tern_python_semantic::parse::Parsed;
use tern_python_semantic::semantic_index::SemanticIndex;
use tern_python_semantic::suppression::{parse_directives, Suppressions};
use tern_python_semantic::types::infer::analyze_types;
use tern_python_semantic::types::TypeStore;
use tern_python_semantic::{FileId, Files, Name};

use crate::cancellation::CancellationToken;
use crate::config::Configuration;
use crate::source::Source;

/// Passes per file before inference gives up and leaves the remaining
/// unknowns as `Unknown`.
const MAX_ANALYSIS_PASSES: u32 = 32;
/// Import-chain depth past which a single error is surfaced.
const MAX_IMPORT_DEPTH: usize = 32;
/// Retained cycles per file.
const MAX_CYCLES_PER_FILE: usize = 4;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum CheckError {
    Cancelled,
}

impl std::fmt::Display for CheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckError::Cancelled => f.write_str("check was cancelled"),
        }
    }
}

impl std::error::Error for CheckError {}

#[derive(Debug)]
pub struct FileDiagnostics {
    pub path: PathBuf,
    pub diagnostics: Vec<Diagnostic>,
}

/// Per-file state machine.
#[derive(Debug, Default)]
struct SourceFile {
    file_contents_version: u32,
    analyzed_contents_version: i64,
    diagnostic_version: u32,

    source: Option<Source>,
    parse: Option<Parsed>,
    line_index: Option<LineIndex>,
    settings: DiagnosticSettings,
    suppressions: Suppressions,
    index: Option<Arc<SemanticIndex>>,
    import_targets: FxHashMap<NodeKey, ImportTarget>,

    parse_diagnostics: Vec<Diagnostic>,
    bind_diagnostics: Vec<Diagnostic>,
    analysis_diagnostics: Vec<Diagnostic>,
    finalized_diagnostics: Vec<Diagnostic>,

    is_binding_needed: bool,
    is_type_analysis_needed: bool,
    is_type_analysis_finalized: bool,
    analysis_pass_count: u32,
    last_reanalysis_reason: Option<&'static str>,

    circular_dependencies: Vec<Vec<PathBuf>>,
    import_depth_exceeded: bool,
    internal_error: Option<String>,
}

impl SourceFile {
    fn new() -> Self {
        Self {
            analyzed_contents_version: -1,
            is_binding_needed: true,
            is_type_analysis_needed: true,
            ..Self::default()
        }
    }
}

pub struct Program {
    files: Files,
    config: Configuration,
    env: ExecutionEnvironment,
    store: TypeStore,
    builtins: BuiltinTypes,
    resolver: RefCell<ImportResolver>,
    states: FxHashMap<FileId, SourceFile>,
    /// Submodule links: package module file -> name -> submodule file.
    module_members: FxHashMap<FileId, FxHashMap<Name, FileId>>,
    /// Reverse import edges, for dependent re-finalization.
    dependents: FxHashMap<FileId, FxHashSet<FileId>>,
    /// Injected editor buffers, keyed by file.
    overrides: FxHashMap<FileId, Arc<str>>,
}

impl Program {
    pub fn new(config: Configuration) -> Self {
        let files = Files::default();
        let store = TypeStore::default();
        let builtins = BuiltinTypes::bootstrap(&store, &files);
        let env = config.execution_environment();
        let resolver = RefCell::new(ImportResolver::new(config.resolver_config()));
        Self {
            files,
            config,
            env,
            store,
            builtins,
            resolver,
            states: FxHashMap::default(),
            module_members: FxHashMap::default(),
            dependents: FxHashMap::default(),
            overrides: FxHashMap::default(),
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Replaces the configuration; all resolver caches are invalidated
    /// as a unit and every file is re-analyzed.
    pub fn set_configuration(&mut self, config: Configuration) {
        self.env = config.execution_environment();
        *self.resolver.borrow_mut() = ImportResolver::new(config.resolver_config());
        self.config = config;
        let files: Vec<FileId> = self.states.keys().copied().collect();
        for file in files {
            self.mark_dirty_by_id(file);
        }
    }

    /// Injects editor contents for a path; disk is not consulted until
    /// the override is cleared.
    pub fn set_file_contents(&mut self, path: &Path, contents: &str) {
        let file = self.files.intern(path);
        self.overrides.insert(file, Arc::from(contents));
        self.mark_dirty_by_id(file);
    }

    /// Contents changed on disk; a re-parse is required.
    pub fn mark_dirty(&mut self, path: &Path) {
        let file = self.files.intern(path);
        self.mark_dirty_by_id(file);
    }

    fn mark_dirty_by_id(&mut self, file: FileId) {
        if let Some(state) = self.states.get_mut(&file) {
            state.file_contents_version += 1;
            state.source = None;
            state.parse = None;
            state.line_index = None;
            state.index = None;
            state.import_targets.clear();
            state.circular_dependencies.clear();
            state.import_depth_exceeded = false;
            state.internal_error = None;
            state.is_binding_needed = true;
            state.is_type_analysis_needed = true;
            state.is_type_analysis_finalized = false;
            state.analysis_pass_count = 0;
        }
        self.store.remove_module(file);
        self.mark_dependents_stale(file);
    }

    /// Keeps the parse but re-binds and re-evaluates.
    pub fn mark_reanalysis_required(&mut self, path: &Path) {
        let file = self.files.intern(path);
        self.mark_reanalysis_by_id(file, "explicitly requested");
    }

    fn mark_reanalysis_by_id(&mut self, file: FileId, reason: &'static str) {
        if let Some(state) = self.states.get_mut(&file) {
            state.index = None;
            state.is_binding_needed = true;
            state.is_type_analysis_needed = true;
            state.is_type_analysis_finalized = false;
            state.analysis_pass_count = 0;
            state.last_reanalysis_reason = Some(reason);
        }
        self.store.remove_module(file);
    }

    fn mark_dependents_stale(&mut self, file: FileId) {
        let mut worklist = vec![file];
        let mut seen = FxHashSet::default();
        while let Some(current) = worklist.pop() {
            if !seen.insert(current) {
                continue;
            }
            let dependents: Vec<FileId> = self
                .dependents
                .get(&current)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default();
            for dependent in dependents {
                if dependent != file {
                    self.mark_reanalysis_by_id(dependent, "dependency changed");
                }
                worklist.push(dependent);
            }
        }
    }

    /// Checks the given files and everything they transitively import.
    /// Returns diagnostics for every loaded file, roots first.
    pub fn check_paths(
        &mut self,
        paths: &[PathBuf],
        token: &CancellationToken,
    ) -> Result<Vec<FileDiagnostics>, CheckError> {
        let mut order = Vec::new();
        let mut visited = FxHashSet::default();
        let mut stack = Vec::new();
        for path in paths {
            let file = self.files.intern(path);
            self.load_with_dependencies(file, &mut stack, &mut visited, &mut order, token)?;
        }

        self.run_analysis_passes(&order, token)?;
        self.finalize(&order);

        Ok(order
            .iter()
            .map(|&file| FileDiagnostics {
                path: self.files.path(file),
                diagnostics: self.diagnostics_for(file),
            })
            .collect())
    }

    /// Convenience wrapper for a single file.
    pub fn check_path(
        &mut self,
        path: &Path,
        token: &CancellationToken,
    ) -> Result<Vec<FileDiagnostics>, CheckError> {
        self.check_paths(&[path.to_path_buf()], token)
    }

    pub fn diagnostic_version(&self, path: &Path) -> Option<u32> {
        let file = self.files.try_get(path)?;
        self.states.get(&file).map(|state| state.diagnostic_version)
    }

    // ------------------------------------------------------------------
    // Load phase: parse + bind, transitively
    // ------------------------------------------------------------------

    fn load_with_dependencies(
        &mut self,
        file: FileId,
        stack: &mut Vec<FileId>,
        visited: &mut FxHashSet<FileId>,
        order: &mut Vec<FileId>,
        token: &CancellationToken,
    ) -> Result<(), CheckError> {
        if token.is_cancelled() {
            return Err(CheckError::Cancelled);
        }

        if let Some(position) = stack.iter().position(|&entry| entry == file) {
            self.record_cycle(&stack[position..]);
            return Ok(());
        }
        if !visited.insert(file) {
            return Ok(());
        }

        stack.push(file);
        if stack.len() > MAX_IMPORT_DEPTH {
            self.states.entry(file).or_insert_with(SourceFile::new);
            self.states.get_mut(&file).expect("state").import_depth_exceeded = true;
            stack.pop();
            order.push(file);
            return Ok(());
        }

        self.parse_file(file);
        self.bind_file(file);
        order.push(file);

        let dependencies: Vec<FileId> = {
            let state = self.states.get(&file).expect("state after parse");
            let mut dependencies = Vec::new();
            for target in state.import_targets.values() {
                dependencies.extend(target.top_file);
                dependencies.extend(target.file);
                dependencies.extend(target.submodules.iter().map(|(_, file)| *file));
            }
            dependencies.sort_unstable();
            dependencies.dedup();
            dependencies
        };

        for dependency in dependencies {
            self.dependents.entry(dependency).or_default().insert(file);
            self.load_with_dependencies(dependency, stack, visited, order, token)?;
        }

        stack.pop();
        Ok(())
    }

    fn record_cycle(&mut self, cycle: &[FileId]) {
        let chain: Vec<PathBuf> = cycle.iter().map(|&file| self.files.path(file)).collect();
        for &file in cycle {
            let state = self.states.entry(file).or_insert_with(SourceFile::new);
            if state.circular_dependencies.len() < MAX_CYCLES_PER_FILE
                && !state.circular_dependencies.contains(&chain)
            {
                state.circular_dependencies.push(chain.clone());
            }
        }
    }

    /// Parse phase: reads the contents (or the injected buffer), parses,
    /// applies in-comment directives, and resolves every import the file
    /// declares.
    fn parse_file(&mut self, file: FileId) {
        let path = self.files.path(file);
        let state = self.states.entry(file).or_insert_with(SourceFile::new);

        let source = match self.overrides.get(&file) {
            Some(contents) => Some(Source::new(contents.clone())),
            None => Source::from_disk(&path).ok(),
        };
        let Some(source) = source else {
            state.parse = None;
            state.parse_diagnostics = vec![Diagnostic::error(
                TextRange::default(),
                format!("File '{}' could not be read", path.display()),
            )];
            state.is_binding_needed = false;
            state.is_type_analysis_needed = false;
            return;
        };

        // Contents are hashed so an unchanged disk read keeps the parse.
        if state.parse.is_some()
            && state
                .source
                .as_ref()
                .is_some_and(|existing| existing.hash() == source.hash())
        {
            return;
        }

        let parsed = Parsed::from_text(source.text(), &path.to_string_lossy());
        let line_index = LineIndex::from_source(source.text());

        state.parse_diagnostics = parsed
            .errors()
            .iter()
            .map(|error| {
                Diagnostic::error(
                    TextRange::empty(error.offset),
                    error.message.clone(),
                )
            })
            .collect();

        let mut settings = if self.config.strict_matcher().is_match(&path) {
            DiagnosticSettings::strict()
        } else {
            self.config.diagnostic_settings.clone()
        };
        let suppressions = parse_directives(source.text(), &parsed, &line_index, &mut settings);

        state.source = Some(source);
        state.parse = Some(parsed.clone());
        state.line_index = Some(line_index);
        state.settings = settings;
        state.suppressions = suppressions;
        state.is_binding_needed = true;
        state.is_type_analysis_needed = true;
        state.is_type_analysis_finalized = false;
        state.analysis_pass_count = 0;

        self.resolve_imports(file, &parsed);
    }

    fn resolve_imports(&mut self, file: FileId, parsed: &Parsed) {
        let path = self.files.path(file);
        let mut targets = FxHashMap::default();

        for (node, descriptor) in collect_import_descriptors(parsed.suite()) {
            let result = self
                .resolver
                .borrow_mut()
                .resolve(&path, &self.env, &descriptor);
            let target = self.import_target_from_result(&descriptor, result);
            targets.insert(node, target);
        }

        self.states.get_mut(&file).expect("state").import_targets = targets;
    }

    fn import_target_from_result(
        &mut self,
        descriptor: &ModuleDescriptor,
        result: ImportResult,
    ) -> ImportTarget {
        // The ambient modules resolve even without stubs on disk, and
        // they take priority over the interpreter-derived search paths
        // (which would otherwise surface the real stdlib sources). A
        // workspace module or a genuine stub of the same name still wins.
        let synthesizable = descriptor
            .name_parts
            .first()
            .filter(|_| !descriptor.is_relative())
            .and_then(|first| SynthesizedModule::from_name(first));
        if let Some(module) = synthesizable {
            let shadowed_by_real_module =
                result.is_import_found && result.import_type != ImportType::ThirdParty;
            if !shadowed_by_real_module {
                let synthesized = (descriptor.name_parts.len() == 1).then_some(module);
                return ImportTarget {
                    result: synthesized_import_result(&descriptor.name()),
                    top_file: None,
                    file: None,
                    synthesized,
                    submodules: Vec::new(),
                };
            }
        }

        if !result.is_import_found {
            return ImportTarget {
                result,
                top_file: None,
                file: None,
                synthesized: None,
                submodules: Vec::new(),
            };
        }

        let resolved_files: Vec<Option<FileId>> = result
            .resolved_paths
            .iter()
            .map(|path| {
                if path.as_os_str().is_empty() {
                    None
                } else {
                    Some(self.files.intern(path))
                }
            })
            .collect();

        // Register submodule attribute links along the dotted chain.
        for pair in resolved_files.windows(2).zip(descriptor.name_parts.iter().skip(1)) {
            let ([Some(parent), Some(child)], part) = pair else {
                continue;
            };
            self.module_members
                .entry(*parent)
                .or_default()
                .insert(part.clone(), *child);
        }

        let terminal = resolved_files.last().copied().flatten();
        let submodules: Vec<(Name, FileId)> = result
            .implicit_imports
            .iter()
            .map(|implicit| (implicit.name.clone(), self.files.intern(&implicit.path)))
            .collect();
        if let Some(terminal) = terminal {
            for (name, submodule) in &submodules {
                self.module_members
                    .entry(terminal)
                    .or_default()
                    .insert(name.clone(), *submodule);
            }
        }

        ImportTarget {
            result,
            top_file: resolved_files.first().copied().flatten(),
            file: terminal,
            synthesized: None,
            submodules,
        }
    }

    /// Bind phase: clears stale side tables and runs the two-pass
    /// binder. An unexpected failure becomes a single synthetic internal
    /// error and leaves the file parsed-but-unbound.
    fn bind_file(&mut self, file: FileId) {
        let needed = self
            .states
            .get(&file)
            .is_some_and(|state| state.is_binding_needed && state.parse.is_some());
        if !needed {
            return;
        }

        self.store.remove_module(file);
        let parsed = self.states[&file].parse.clone().expect("parse");
        let env = self.env.clone();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            SemanticIndex::from_suite(parsed.suite(), &env)
        }));

        let state = self.states.get_mut(&file).expect("state");
        match outcome {
            Ok((index, diagnostics)) => {
                state.bind_diagnostics = diagnostics;
                state.index = Some(Arc::new(index));
                state.is_binding_needed = false;
                state.is_type_analysis_needed = true;
            }
            Err(payload) => {
                state.internal_error = Some(format!(
                    "internal error during bind: {}",
                    panic_message(&payload)
                ));
                state.index = None;
                state.is_binding_needed = false;
                state.is_type_analysis_needed = false;
            }
        }

        if self.config.internal_test_mode {
            self.verify_parse_tree_consistency(file);
        }
    }

    /// The extra consistency walk behind `internalTestMode`: after
    /// binding, every statement and expression must have a recorded
    /// parent, except nodes inside statically-dead branches.
    fn verify_parse_tree_consistency(&mut self, file: FileId) {
        let Some(state) = self.states.get(&file) else {
            return;
        };
        let (Some(parsed), Some(index)) = (state.parse.clone(), state.index.clone()) else {
            return;
        };
        let mut missing = 0usize;
        for stmt in parsed.suite() {
            let key = NodeKey::from_stmt(stmt);
            if index.parent_of(key).is_none() {
                missing += 1;
            }
        }
        if missing > 0 {
            let state = self.states.get_mut(&file).expect("state");
            state.internal_error = Some(format!(
                "parse-tree consistency walk found {missing} node(s) without a parent"
            ));
        }
    }

    // ------------------------------------------------------------------
    // Analysis and finalize
    // ------------------------------------------------------------------

    fn run_analysis_passes(
        &mut self,
        order: &[FileId],
        token: &CancellationToken,
    ) -> Result<(), CheckError> {
        loop {
            if token.is_cancelled() {
                return Err(CheckError::Cancelled);
            }
            let mut any_changed = false;

            for &file in order {
                let ready = self.states.get(&file).is_some_and(|state| {
                    state.is_type_analysis_needed
                        && state.index.is_some()
                        && state.analysis_pass_count < MAX_ANALYSIS_PASSES
                });
                if !ready {
                    continue;
                }
                let settings = self.states[&file].settings.clone();

                let db: &Program = &*self;
                let outcome =
                    catch_unwind(AssertUnwindSafe(|| analyze_types(db, file, &settings)));

                let state = self.states.get_mut(&file).expect("state");
                match outcome {
                    Ok(result) => {
                        state.analysis_diagnostics = result.diagnostics;
                        state.analysis_pass_count += 1;
                        if result.changed {
                            any_changed = true;
                            state.last_reanalysis_reason = Some("types changed in last pass");
                            if state.analysis_pass_count >= MAX_ANALYSIS_PASSES {
                                tracing::warn!(
                                    "type analysis did not converge for '{}' after {} passes",
                                    self.files.path(file).display(),
                                    state.analysis_pass_count,
                                );
                            }
                        } else {
                            state.is_type_analysis_needed = false;
                        }
                    }
                    Err(payload) => {
                        state.internal_error = Some(format!(
                            "internal error during type analysis: {}",
                            panic_message(&payload)
                        ));
                        state.is_type_analysis_needed = false;
                        state.analysis_pass_count = MAX_ANALYSIS_PASSES;
                    }
                }
            }

            if !any_changed {
                break;
            }

            // A file's analysis may observe types from files that have
            // not converged yet; any change anywhere gets every file
            // another look, which is what drives the cross-file fixed
            // point.
            for &file in order {
                if let Some(state) = self.states.get_mut(&file) {
                    if state.index.is_some()
                        && state.internal_error.is_none()
                        && state.analysis_pass_count < MAX_ANALYSIS_PASSES
                    {
                        state.is_type_analysis_needed = true;
                    }
                }
            }
        }

        for &file in order {
            if let Some(state) = self.states.get_mut(&file) {
                state.is_type_analysis_needed = false;
            }
        }
        Ok(())
    }

    /// Publishes the last pass's diagnostics. Files that were already
    /// finalized and saw no new pass keep their published set.
    fn finalize(&mut self, order: &[FileId]) {
        for &file in order {
            let Some(state) = self.states.get_mut(&file) else {
                continue;
            };
            if state.is_type_analysis_finalized {
                continue;
            }
            state.finalized_diagnostics = std::mem::take(&mut state.analysis_diagnostics);
            state.is_type_analysis_finalized = true;
            state.analyzed_contents_version = i64::from(state.file_contents_version);
            state.diagnostic_version += 1;
        }
    }

    // ------------------------------------------------------------------
    // Diagnostic read-out
    // ------------------------------------------------------------------

    /// Merges parse, bind and finalized type diagnostics, applies
    /// `type: ignore` filtering and the configured file filters.
    pub fn diagnostics_for(&self, file: FileId) -> Vec<Diagnostic> {
        let Some(state) = self.states.get(&file) else {
            return Vec::new();
        };
        let path = self.files.path(file);

        if self.config.ignore_matcher().is_match(&path) {
            return Vec::new();
        }
        if state.settings.enable_type_ignore_comments && state.suppressions.file_level {
            return Vec::new();
        }

        let mut merged: Vec<Diagnostic> = Vec::new();
        merged.extend(state.parse_diagnostics.iter().cloned());
        merged.extend(state.bind_diagnostics.iter().cloned());
        merged.extend(state.finalized_diagnostics.iter().cloned());

        if state.settings.enable_type_ignore_comments {
            if let Some(line_index) = &state.line_index {
                merged.retain(|diagnostic| {
                    !state.suppressions.suppresses(diagnostic.range, line_index)
                });
            }
        }

        for cycle in &state.circular_dependencies {
            let chain = cycle
                .iter()
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>()
                .join("\n    ");
            merged.push(Diagnostic::error(
                TextRange::default(),
                format!("Cycle detected in import chain\n    {chain}"),
            ));
        }
        if state.import_depth_exceeded {
            merged.push(Diagnostic::error(
                TextRange::default(),
                "Excessively deep import chain".to_string(),
            ));
        }
        if let Some(internal) = &state.internal_error {
            merged.push(Diagnostic::error(TextRange::default(), internal.clone()));
        }

        // Stub-tree files only surface demoted diagnostics, if any.
        if let Some(typeshed) = &self.config.typeshed_path {
            if path.starts_with(typeshed) {
                if !self.config.report_typeshed_errors {
                    return Vec::new();
                }
                for diagnostic in &mut merged {
                    if diagnostic.category == DiagnosticCategory::Error {
                        diagnostic.category = DiagnosticCategory::Warning;
                    }
                }
            }
        }

        merged
    }

    pub fn line_index_for(&self, file: FileId) -> Option<&LineIndex> {
        self.states.get(&file)?.line_index.as_ref()
    }

    pub fn file_id(&self, path: &Path) -> Option<FileId> {
        self.files.try_get(path)
    }
}

impl Db for Program {
    fn execution_environment(&self) -> &ExecutionEnvironment {
        &self.env
    }

    fn type_store(&self) -> &TypeStore {
        &self.store
    }

    fn builtin_types(&self) -> &BuiltinTypes {
        &self.builtins
    }

    fn parsed(&self, file: FileId) -> Option<Parsed> {
        self.states.get(&file)?.parse.clone()
    }

    fn semantic_index(&self, file: FileId) -> Option<Arc<SemanticIndex>> {
        self.states.get(&file)?.index.clone()
    }

    fn import_target(&self, file: FileId, node: NodeKey) -> Option<ImportTarget> {
        self.states.get(&file)?.import_targets.get(&node).cloned()
    }

    fn module_member_file(&self, module: FileId, name: &str) -> Option<FileId> {
        self.module_members.get(&module)?.get(name).copied()
    }

    fn file_path(&self, file: FileId) -> PathBuf {
        self.files.path(file)
    }
}

fn synthesized_import_result(name: &str) -> ImportResult {
    ImportResult {
        import_name: name.to_string(),
        is_relative: false,
        is_import_found: true,
        import_type: ImportType::BuiltIn,
        resolved_paths: Vec::new(),
        search_path: None,
        is_namespace_package: false,
        is_stub_file: true,
        is_pyd_file: false,
        is_local_typings_file: false,
        implicit_imports: Vec::new(),
        import_failure_info: Vec::new(),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
