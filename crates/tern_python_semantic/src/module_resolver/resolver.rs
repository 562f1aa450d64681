use std::path::{Path, PathBuf};
use std::process::Command;

use rustc_hash::FxHashMap;
use rustpython_ast as ast;

use crate::module_name::ModuleName;
use crate::module_resolver::typeshed::stdlib_version_dirs;
use crate::module_resolver::ExecutionEnvironment;
use crate::name::Name;
use crate::node_key::NodeKey;

/// An import directive, before resolution: `from ..pkg import a, b` is
/// `{ leading_dots: 2, name_parts: ["pkg"], imported_symbols: ["a", "b"] }`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ModuleDescriptor {
    pub leading_dots: u32,
    pub name_parts: Vec<Name>,
    pub imported_symbols: Option<Vec<Name>>,
    pub has_trailing_dot: bool,
}

impl ModuleDescriptor {
    pub fn absolute<'a>(parts: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            leading_dots: 0,
            name_parts: parts.into_iter().map(Name::new).collect(),
            imported_symbols: None,
            has_trailing_dot: false,
        }
    }

    /// The dotted display name, with one leading `.` per level.
    pub fn name(&self) -> String {
        let mut name = ".".repeat(self.leading_dots as usize);
        for (i, part) in self.name_parts.iter().enumerate() {
            if i > 0 {
                name.push('.');
            }
            name.push_str(part);
        }
        name
    }

    /// The absolute module name, when the descriptor has one.
    pub fn module_name(&self) -> Option<ModuleName> {
        if self.is_relative() {
            return None;
        }
        ModuleName::from_parts(self.name_parts.iter().map(Name::as_str))
    }

    pub fn is_relative(&self) -> bool {
        self.leading_dots > 0
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ImportType {
    BuiltIn,
    ThirdParty,
    Local,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImplicitImport {
    pub name: Name,
    pub path: PathBuf,
    pub is_stub_file: bool,
}

/// Outcome of resolving one import directive. `resolved_paths` has one
/// entry per name part; an empty path means the step traversed a directory
/// that had no initializer file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImportResult {
    pub import_name: String,
    pub is_relative: bool,
    pub is_import_found: bool,
    pub import_type: ImportType,
    pub resolved_paths: Vec<PathBuf>,
    pub search_path: Option<PathBuf>,
    pub is_namespace_package: bool,
    pub is_stub_file: bool,
    pub is_pyd_file: bool,
    pub is_local_typings_file: bool,
    pub implicit_imports: Vec<ImplicitImport>,
    pub import_failure_info: Vec<String>,
}

impl ImportResult {
    fn not_found(name: String, is_relative: bool, failure_info: Vec<String>) -> Self {
        Self {
            import_name: name,
            is_relative,
            is_import_found: false,
            import_type: ImportType::Local,
            resolved_paths: Vec::new(),
            search_path: None,
            is_namespace_package: false,
            is_stub_file: false,
            is_pyd_file: false,
            is_local_typings_file: false,
            implicit_imports: Vec::new(),
            import_failure_info: failure_info,
        }
    }

    /// The file the terminal name part resolved to, if any.
    pub fn resolved_file(&self) -> Option<&Path> {
        let last = self.resolved_paths.last()?;
        if last.as_os_str().is_empty() {
            None
        } else {
            Some(last)
        }
    }
}

/// Host-level resolver configuration; the per-environment knobs live in
/// [`ExecutionEnvironment`].
#[derive(Clone, Debug, Default)]
pub struct ImportResolverConfig {
    pub typeshed_path: Option<PathBuf>,
    pub typings_path: Option<PathBuf>,
    pub venv_path: Option<PathBuf>,
    pub default_venv: Option<String>,
    pub interpreter_path: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ImportResolver {
    config: ImportResolverConfig,
    /// Results for absolute imports, keyed by environment root and name.
    cache: FxHashMap<(PathBuf, ModuleName), ImportResult>,
    /// Search paths reported by an interpreter, keyed by interpreter path
    /// (empty string for the default interpreter).
    interpreter_paths: FxHashMap<String, Vec<PathBuf>>,
}

impl ImportResolver {
    pub fn new(config: ImportResolverConfig) -> Self {
        Self {
            config,
            cache: FxHashMap::default(),
            interpreter_paths: FxHashMap::default(),
        }
    }

    pub fn config(&self) -> &ImportResolverConfig {
        &self.config
    }

    /// Drops all cached state. Called whenever configuration changes.
    pub fn invalidate(&mut self) {
        self.cache.clear();
        self.interpreter_paths.clear();
    }

    #[tracing::instrument(level = "debug", skip(self, env))]
    pub fn resolve(
        &mut self,
        source_file: &Path,
        env: &ExecutionEnvironment,
        descriptor: &ModuleDescriptor,
    ) -> ImportResult {
        if descriptor.is_relative() {
            return self.resolve_relative(source_file, env, descriptor);
        }

        let Some(module_name) = descriptor.module_name() else {
            let failure_info = vec![format!("'{}' is not a valid module name", descriptor.name())];
            return ImportResult::not_found(descriptor.name(), false, failure_info);
        };

        let key = (env.root.clone(), module_name);
        if let Some(cached) = self.cache.get(&key) {
            let mut result = cached.clone();
            result.filter_implicit_imports(descriptor);
            return result;
        }

        let result = self.resolve_absolute(env, descriptor);
        self.cache.insert(key, result.clone());
        let mut result = result;
        result.filter_implicit_imports(descriptor);
        result
    }

    /// Walks up `leading_dots - 1` directories from the source file and
    /// resolves the remaining parts from there. Climbing above the
    /// workspace root fails.
    fn resolve_relative(
        &self,
        source_file: &Path,
        env: &ExecutionEnvironment,
        descriptor: &ModuleDescriptor,
    ) -> ImportResult {
        let name = descriptor.name();
        let mut failure_info = Vec::new();

        let Some(mut dir) = source_file.parent().map(Path::to_path_buf) else {
            failure_info.push(format!("Could not determine directory of '{}'", source_file.display()));
            return ImportResult::not_found(name, true, failure_info);
        };
        for _ in 1..descriptor.leading_dots {
            if !dir.pop() {
                failure_info.push("Relative import resolved above the filesystem root".to_string());
                return ImportResult::not_found(name, true, failure_info);
            }
        }
        if !dir.starts_with(&env.root) {
            failure_info.push(format!(
                "Relative import '{name}' escapes the workspace root '{}'",
                env.root.display()
            ));
            return ImportResult::not_found(name, true, failure_info);
        }

        // `from . import x` targets the package directory itself.
        if descriptor.name_parts.is_empty() {
            let initializer = ["__init__.pyi", "__init__.py"]
                .iter()
                .map(|init| dir.join(init))
                .find(|candidate| candidate.is_file());
            let is_stub_file = initializer
                .as_ref()
                .is_some_and(|init| init.extension().is_some_and(|ext| ext == "pyi"));
            let mut result = ImportResult {
                import_name: name,
                is_relative: true,
                is_import_found: true,
                import_type: ImportType::Local,
                resolved_paths: vec![initializer.unwrap_or_default()],
                search_path: Some(dir.clone()),
                is_namespace_package: false,
                is_stub_file,
                is_pyd_file: false,
                is_local_typings_file: false,
                implicit_imports: scan_implicit_imports(&dir),
                import_failure_info: Vec::new(),
            };
            result.filter_implicit_imports(descriptor);
            return result;
        }

        let attempt = resolve_in_root(&dir, &descriptor.name_parts, WalkOptions::default());
        match attempt.into_result(&name, ImportType::Local, &dir, &mut failure_info) {
            Some(mut result) => {
                result.is_relative = true;
                result.filter_implicit_imports(descriptor);
                result
            }
            None => ImportResult::not_found(name, true, failure_info),
        }
    }

    fn resolve_absolute(
        &mut self,
        env: &ExecutionEnvironment,
        descriptor: &ModuleDescriptor,
    ) -> ImportResult {
        let name = descriptor.name();
        let mut failure_info = Vec::new();

        if descriptor.name_parts.is_empty() {
            failure_info.push("Empty module name".to_string());
            return ImportResult::not_found(name, false, failure_info);
        }

        // Bundled stdlib stubs, most specific version bucket first.
        if let Some(typeshed) = self.config.typeshed_path.clone() {
            let stdlib = typeshed.join("stdlib");
            for bucket in stdlib_version_dirs(env.python_version) {
                let root = stdlib.join(&bucket);
                if !root.is_dir() {
                    continue;
                }
                let attempt = resolve_in_root(&root, &descriptor.name_parts, WalkOptions::default());
                if let Some(result) =
                    attempt.into_result(&name, ImportType::BuiltIn, &root, &mut failure_info)
                {
                    return result;
                }
            }
            failure_info.push(format!("Did not find '{name}' in stdlib type stubs"));
        }

        // The execution environment's own root.
        let attempt = resolve_in_root(&env.root, &descriptor.name_parts, WalkOptions::default());
        if let Some(result) =
            attempt.into_result(&name, ImportType::Local, &env.root, &mut failure_info)
        {
            return result;
        }
        failure_info.push(format!(
            "Did not find '{name}' in root directory '{}'",
            env.root.display()
        ));

        // Configured extra search roots, in order.
        for extra in &env.extra_paths {
            let attempt = resolve_in_root(extra, &descriptor.name_parts, WalkOptions::default());
            if let Some(result) =
                attempt.into_result(&name, ImportType::Local, extra, &mut failure_info)
            {
                return result;
            }
        }
        if !env.extra_paths.is_empty() {
            failure_info.push(format!("Did not find '{name}' in extra paths"));
        }

        // The user-configured typings directory.
        if let Some(typings) = self.config.typings_path.clone() {
            let attempt = resolve_in_root(&typings, &descriptor.name_parts, WalkOptions::default());
            if let Some(mut result) =
                attempt.into_result(&name, ImportType::Local, &typings, &mut failure_info)
            {
                result.is_local_typings_file = true;
                return result;
            }
            failure_info.push(format!("Did not find '{name}' in typings directory"));
        }

        // Bundled third-party stubs, same version fan-out.
        if let Some(typeshed) = self.config.typeshed_path.clone() {
            let third_party = typeshed.join("third_party");
            for bucket in stdlib_version_dirs(env.python_version) {
                let root = third_party.join(&bucket);
                if !root.is_dir() {
                    continue;
                }
                let attempt = resolve_in_root(&root, &descriptor.name_parts, WalkOptions::default());
                if let Some(result) =
                    attempt.into_result(&name, ImportType::ThirdParty, &root, &mut failure_info)
                {
                    return result;
                }
            }
            failure_info.push(format!("Did not find '{name}' in third-party type stubs"));
        }

        // Interpreter-derived search paths (site-packages). Third-party
        // packages may populate namespaces at runtime, so partial
        // resolution counts here.
        for site in self.site_search_paths(env, &mut failure_info) {
            // Prefer a sibling `<package>-stubs` stub package.
            let mut stub_parts = descriptor.name_parts.clone();
            stub_parts[0] = Name::new(&format!("{}-stubs", &descriptor.name_parts[0]));
            let attempt = resolve_in_root(
                &site,
                &stub_parts,
                WalkOptions {
                    allow_partial: false,
                    allow_pyd: false,
                },
            );
            if let Some(mut result) =
                attempt.into_result(&name, ImportType::ThirdParty, &site, &mut failure_info)
            {
                result.is_stub_file = true;
                return result;
            }

            let attempt = resolve_in_root(
                &site,
                &descriptor.name_parts,
                WalkOptions {
                    allow_partial: true,
                    allow_pyd: true,
                },
            );
            if let Some(result) =
                attempt.into_result(&name, ImportType::ThirdParty, &site, &mut failure_info)
            {
                return result;
            }
        }
        failure_info.push(format!("Did not find '{name}' in site-packages"));

        ImportResult::not_found(name, false, failure_info)
    }

    /// The third-party search roots: the selected virtual environment's
    /// site-packages when configured, otherwise whatever the interpreter
    /// reports.
    fn site_search_paths(
        &mut self,
        env: &ExecutionEnvironment,
        failure_info: &mut Vec<String>,
    ) -> Vec<PathBuf> {
        if let Some(venv_root) = self.config.venv_path.clone() {
            let venv = env
                .venv
                .clone()
                .or_else(|| self.config.default_venv.clone());
            if let Some(venv) = venv {
                let paths = site_packages_in_venv(&venv_root.join(&venv));
                if paths.is_empty() {
                    failure_info.push(format!(
                        "Found no site-packages directory in venv '{venv}'"
                    ));
                }
                return paths;
            }
        }
        self.interpreter_search_paths(failure_info).to_vec()
    }

    /// Search paths reported by the configured interpreter, queried once
    /// and cached per interpreter path.
    fn interpreter_search_paths(&mut self, failure_info: &mut Vec<String>) -> &[PathBuf] {
        let key = self
            .config
            .interpreter_path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_default();

        if !self.interpreter_paths.contains_key(&key) {
            let paths = query_interpreter(self.config.interpreter_path.as_deref(), failure_info);
            self.interpreter_paths.insert(key.clone(), paths);
        }
        &self.interpreter_paths[&key]
    }

    /// Completion support: module names reachable at the descriptor's
    /// final (possibly partial) component.
    pub fn completion_suggestions(
        &mut self,
        source_file: &Path,
        env: &ExecutionEnvironment,
        descriptor: &ModuleDescriptor,
        similarity_limit: f64,
    ) -> Vec<Name> {
        let mut roots = Vec::new();
        if descriptor.is_relative() {
            if let Some(mut dir) = source_file.parent().map(Path::to_path_buf) {
                let mut escaped = false;
                for _ in 1..descriptor.leading_dots {
                    if !dir.pop() {
                        escaped = true;
                        break;
                    }
                }
                if !escaped {
                    roots.push(dir);
                }
            }
        } else {
            roots.push(env.root.clone());
            roots.extend(env.extra_paths.iter().cloned());
        }

        let (parents, prefix) = match descriptor.name_parts.split_last() {
            Some((last, parents)) if !descriptor.has_trailing_dot => (parents, last.as_str()),
            _ => (&descriptor.name_parts[..], ""),
        };

        let mut suggestions = Vec::new();
        for root in roots {
            let mut dir = root;
            for parent in parents {
                dir.push(parent.as_str());
            }
            if !dir.is_dir() {
                continue;
            }
            for implicit in scan_implicit_imports(&dir) {
                let candidate = implicit.name;
                if candidate.contains('.') || candidate.starts_with("__") {
                    continue;
                }
                if name_similarity(prefix, &candidate) >= similarity_limit
                    && !suggestions.contains(&candidate)
                {
                    suggestions.push(candidate);
                }
            }
        }
        suggestions.sort();
        suggestions
    }
}

impl ImportResult {
    /// When the directive names specific symbols, only matching implicit
    /// imports are surfaced.
    fn filter_implicit_imports(&mut self, descriptor: &ModuleDescriptor) {
        if let Some(symbols) = &descriptor.imported_symbols {
            if !symbols.is_empty() {
                self.implicit_imports
                    .retain(|implicit| symbols.contains(&implicit.name));
            }
        }
    }
}

#[derive(Copy, Clone, Debug, Default)]
struct WalkOptions {
    allow_partial: bool,
    allow_pyd: bool,
}

#[derive(Debug, Default)]
struct ResolveAttempt {
    resolved_paths: Vec<PathBuf>,
    is_stub_file: bool,
    is_pyd_file: bool,
    is_namespace_package: bool,
    implicit_imports: Vec<ImplicitImport>,
    found: bool,
    failure: Option<String>,
}

impl ResolveAttempt {
    fn into_result(
        self,
        name: &str,
        import_type: ImportType,
        search_path: &Path,
        failure_info: &mut Vec<String>,
    ) -> Option<ImportResult> {
        if let Some(failure) = self.failure {
            failure_info.push(failure);
        }
        if !self.found {
            return None;
        }
        Some(ImportResult {
            import_name: name.to_string(),
            is_relative: false,
            is_import_found: true,
            import_type,
            resolved_paths: self.resolved_paths,
            search_path: Some(search_path.to_path_buf()),
            is_namespace_package: self.is_namespace_package,
            is_stub_file: self.is_stub_file,
            is_pyd_file: self.is_pyd_file,
            is_local_typings_file: false,
            implicit_imports: self.implicit_imports,
            import_failure_info: Vec::new(),
        })
    }
}

/// Walks the name parts below `root`. At each part a package directory
/// wins over a same-named module file; files are probed stub first, then
/// source, then native binary when allowed.
fn resolve_in_root(root: &Path, parts: &[Name], options: WalkOptions) -> ResolveAttempt {
    let mut attempt = ResolveAttempt::default();
    let mut dir = root.to_path_buf();

    for (index, part) in parts.iter().enumerate() {
        let is_last = index + 1 == parts.len();
        let package_dir = dir.join(part.as_str());

        if package_dir.is_dir() {
            let initializer = ["__init__.pyi", "__init__.py"]
                .iter()
                .map(|init| package_dir.join(init))
                .find(|candidate| candidate.is_file());

            match initializer {
                Some(init) => {
                    if is_last {
                        attempt.is_stub_file = init.extension().is_some_and(|ext| ext == "pyi");
                        attempt.implicit_imports = scan_implicit_imports(&package_dir);
                    }
                    attempt.resolved_paths.push(init);
                }
                None => {
                    attempt.resolved_paths.push(PathBuf::new());
                    if is_last {
                        attempt.implicit_imports = scan_implicit_imports(&package_dir);
                        attempt.is_namespace_package = true;
                        // An empty namespace package is not a resolution.
                        if attempt.implicit_imports.is_empty() {
                            attempt.failure = Some(format!(
                                "Namespace package '{}' contains no modules",
                                package_dir.display()
                            ));
                            attempt.found = options.allow_partial && index > 0;
                            if attempt.found {
                                attempt.resolved_paths.pop();
                            }
                            return attempt;
                        }
                    }
                }
            }
            dir = package_dir;
            if is_last {
                attempt.found = true;
            }
            continue;
        }

        let mut candidates = vec![dir.join(format!("{part}.pyi")), dir.join(format!("{part}.py"))];
        if options.allow_pyd {
            candidates.push(dir.join(format!("{part}.pyd")));
        }
        let file = candidates.into_iter().find(|candidate| candidate.is_file());

        match file {
            Some(file) if is_last => {
                attempt.is_stub_file = file.extension().is_some_and(|ext| ext == "pyi");
                attempt.is_pyd_file = file.extension().is_some_and(|ext| ext == "pyd");
                attempt.resolved_paths.push(file);
                attempt.found = true;
            }
            Some(file) => {
                attempt.failure = Some(format!(
                    "'{}' is a module, not a package; cannot resolve '{}' inside it",
                    file.display(),
                    parts[index + 1]
                ));
                attempt.found = options.allow_partial && index > 0;
                return attempt;
            }
            None => {
                attempt.failure = Some(format!(
                    "Did not find '{part}' in '{}'",
                    dir.display()
                ));
                attempt.found = options.allow_partial && index > 0;
                return attempt;
            }
        }
    }

    attempt
}

/// Enumerates the modules a package directory makes importable: module
/// files (stub preferred over source) and subdirectories that carry an
/// initializer.
fn scan_implicit_imports(dir: &Path) -> Vec<ImplicitImport> {
    let mut by_name: FxHashMap<Name, ImplicitImport> = FxHashMap::default();

    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let initializer = ["__init__.pyi", "__init__.py"]
                .iter()
                .map(|init| path.join(init))
                .find(|candidate| candidate.is_file());
            if let Some(init) = initializer {
                let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                    continue;
                };
                let is_stub_file = init.extension().is_some_and(|ext| ext == "pyi");
                by_name.insert(
                    Name::new(name),
                    ImplicitImport {
                        name: Name::new(name),
                        path: init,
                        is_stub_file,
                    },
                );
            }
            continue;
        }

        let (Some(stem), Some(ext)) = (
            path.file_stem().and_then(|stem| stem.to_str()),
            path.extension().and_then(|ext| ext.to_str()),
        ) else {
            continue;
        };
        if stem == "__init__" || !matches!(ext, "py" | "pyi") {
            continue;
        }
        let is_stub_file = ext == "pyi";
        let name = Name::new(stem);
        match by_name.get(&name) {
            // Stubs win over sources for the same module name.
            Some(existing) if existing.is_stub_file => {}
            _ => {
                by_name.insert(
                    name.clone(),
                    ImplicitImport {
                        name,
                        path,
                        is_stub_file,
                    },
                );
            }
        }
    }

    let mut implicit: Vec<_> = by_name.into_values().collect();
    implicit.sort_by(|a, b| a.name.cmp(&b.name));
    implicit
}

fn site_packages_in_venv(venv: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    let windows_layout = venv.join("Lib").join("site-packages");
    if windows_layout.is_dir() {
        paths.push(windows_layout);
    }

    let lib = venv.join("lib");
    if let Ok(entries) = std::fs::read_dir(&lib) {
        for entry in entries.flatten() {
            let candidate = entry.path().join("site-packages");
            if entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with("python"))
                && candidate.is_dir()
            {
                paths.push(candidate);
            }
        }
    }
    paths.sort();
    paths
}

/// Spawns the interpreter to report `sys.path`/`sys.prefix`, keeping only
/// directories that exist.
fn query_interpreter(interpreter: Option<&Path>, failure_info: &mut Vec<String>) -> Vec<PathBuf> {
    const QUERY: &str =
        "import sys, json; json.dump({\"path\": sys.path, \"prefix\": sys.prefix}, sys.stdout)";

    let program = interpreter
        .map(|path| path.as_os_str().to_os_string())
        .unwrap_or_else(|| "python3".into());

    let output = match Command::new(&program).args(["-c", QUERY]).output() {
        Ok(output) if output.status.success() => output,
        Ok(_) | Err(_) => {
            failure_info.push(format!(
                "Failed to query search paths from interpreter '{}'",
                program.to_string_lossy()
            ));
            return Vec::new();
        }
    };

    let Ok(value) = serde_json::from_slice::<serde_json::Value>(&output.stdout) else {
        failure_info.push("Interpreter reported malformed search paths".to_string());
        return Vec::new();
    };

    let mut paths = Vec::new();
    if let Some(entries) = value.get("path").and_then(|path| path.as_array()) {
        for entry in entries {
            if let Some(text) = entry.as_str() {
                let path = PathBuf::from(text);
                if !text.is_empty() && path.is_dir() {
                    paths.push(path);
                }
            }
        }
    }
    paths
}

/// Similarity in `[0, 1]` between a typed prefix and a candidate module
/// name; case-insensitive prefix matches rank highest.
fn name_similarity(prefix: &str, candidate: &str) -> f64 {
    if prefix.is_empty() {
        return 1.0;
    }
    let prefix = prefix.to_ascii_lowercase();
    let candidate_lower = candidate.to_ascii_lowercase();
    if candidate_lower.starts_with(&prefix) {
        return 1.0;
    }
    let mut matched = 0usize;
    let mut rest = candidate_lower.as_str();
    for ch in prefix.chars() {
        if let Some(at) = rest.find(ch) {
            matched += 1;
            rest = &rest[at + ch.len_utf8()..];
        }
    }
    matched as f64 / prefix.chars().count() as f64
}

/// Collects every import directive in a suite, including nested ones, in
/// source order, keyed by the directive statement node.
pub fn collect_import_descriptors(suite: &[ast::Stmt]) -> Vec<(NodeKey, ModuleDescriptor)> {
    let mut out = Vec::new();
    collect_from_suite(suite, &mut out);
    out
}

fn collect_from_suite(suite: &[ast::Stmt], out: &mut Vec<(NodeKey, ModuleDescriptor)>) {
    for stmt in suite {
        collect_from_stmt(stmt, out);
    }
}

fn collect_from_stmt(stmt: &ast::Stmt, out: &mut Vec<(NodeKey, ModuleDescriptor)>) {
    match stmt {
        ast::Stmt::Import(node) => {
            for alias in &node.names {
                out.push((
                    NodeKey::from_alias(alias),
                    ModuleDescriptor::absolute(alias.name.as_str().split('.')),
                ));
            }
        }
        ast::Stmt::ImportFrom(node) => {
            let name_parts: Vec<Name> = node
                .module
                .as_ref()
                .map(|module| module.as_str().split('.').map(Name::new).collect())
                .unwrap_or_default();
            let imported_symbols: Vec<Name> = node
                .names
                .iter()
                .filter(|alias| alias.name.as_str() != "*")
                .map(|alias| Name::new(alias.name.as_str()))
                .collect();
            out.push((
                NodeKey::from_stmt(stmt),
                ModuleDescriptor {
                    leading_dots: node.level.map(|level| level.to_u32()).unwrap_or(0),
                    name_parts,
                    imported_symbols: Some(imported_symbols),
                    has_trailing_dot: false,
                },
            ));
        }
        ast::Stmt::FunctionDef(node) => collect_from_suite(&node.body, out),
        ast::Stmt::AsyncFunctionDef(node) => collect_from_suite(&node.body, out),
        ast::Stmt::ClassDef(node) => collect_from_suite(&node.body, out),
        ast::Stmt::For(node) => {
            collect_from_suite(&node.body, out);
            collect_from_suite(&node.orelse, out);
        }
        ast::Stmt::AsyncFor(node) => {
            collect_from_suite(&node.body, out);
            collect_from_suite(&node.orelse, out);
        }
        ast::Stmt::While(node) => {
            collect_from_suite(&node.body, out);
            collect_from_suite(&node.orelse, out);
        }
        ast::Stmt::If(node) => {
            collect_from_suite(&node.body, out);
            for clause in &node.elif_else_clauses {
                collect_from_suite(&clause.body, out);
            }
        }
        ast::Stmt::With(node) => collect_from_suite(&node.body, out),
        ast::Stmt::AsyncWith(node) => collect_from_suite(&node.body, out),
        ast::Stmt::Try(node) => {
            collect_from_suite(&node.body, out);
            for handler in &node.handlers {
                let ast::ExceptHandler::ExceptHandler(handler) = handler;
                collect_from_suite(&handler.body, out);
            }
            collect_from_suite(&node.orelse, out);
            collect_from_suite(&node.finalbody, out);
        }
        ast::Stmt::TryStar(node) => {
            collect_from_suite(&node.body, out);
            for handler in &node.handlers {
                let ast::ExceptHandler::ExceptHandler(handler) = handler;
                collect_from_suite(&handler.body, out);
            }
            collect_from_suite(&node.orelse, out);
            collect_from_suite(&node.finalbody, out);
        }
        ast::Stmt::Match(node) => {
            for case in &node.cases {
                collect_from_suite(&case.body, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::{ImportResolver, ImportResolverConfig, ImportType, ModuleDescriptor};
    use crate::module_resolver::ExecutionEnvironment;
    use std::path::Path;

    struct TestCase {
        _temp_dir: tempfile::TempDir,
        resolver: ImportResolver,
        env: ExecutionEnvironment,
    }

    fn create_resolver() -> std::io::Result<TestCase> {
        let temp_dir = tempfile::tempdir()?;
        let root = temp_dir.path().join("src");
        std::fs::create_dir(&root)?;
        let root = root.canonicalize()?;

        let env = ExecutionEnvironment {
            root,
            ..ExecutionEnvironment::default()
        };

        Ok(TestCase {
            _temp_dir: temp_dir,
            resolver: ImportResolver::new(ImportResolverConfig::default()),
            env,
        })
    }

    fn descriptor(name: &str) -> ModuleDescriptor {
        ModuleDescriptor::absolute(name.split('.'))
    }

    #[test]
    fn first_party_module() -> std::io::Result<()> {
        let mut case = create_resolver()?;
        let foo = case.env.root.join("foo.py");
        std::fs::write(&foo, "x = 1\n")?;

        let source = case.env.root.join("main.py");
        let result = case.resolver.resolve(&source, &case.env, &descriptor("foo"));

        assert!(result.is_import_found);
        assert_eq!(result.import_type, ImportType::Local);
        assert_eq!(result.resolved_file(), Some(foo.as_path()));
        assert!(!result.is_stub_file);
        Ok(())
    }

    #[test]
    fn stub_preferred_over_source() -> std::io::Result<()> {
        let mut case = create_resolver()?;
        std::fs::write(case.env.root.join("foo.py"), "x = 1\n")?;
        let stub = case.env.root.join("foo.pyi");
        std::fs::write(&stub, "x: int\n")?;

        let source = case.env.root.join("main.py");
        let result = case.resolver.resolve(&source, &case.env, &descriptor("foo"));

        assert!(result.is_import_found);
        assert!(result.is_stub_file);
        assert_eq!(result.resolved_file(), Some(stub.as_path()));
        Ok(())
    }

    #[test]
    fn package_priority_over_module() -> std::io::Result<()> {
        let mut case = create_resolver()?;
        let pkg = case.env.root.join("foo");
        std::fs::create_dir(&pkg)?;
        let init = pkg.join("__init__.py");
        std::fs::write(&init, "")?;
        std::fs::write(case.env.root.join("foo.py"), "x = 1\n")?;

        let source = case.env.root.join("main.py");
        let result = case.resolver.resolve(&source, &case.env, &descriptor("foo"));

        assert_eq!(result.resolved_file(), Some(init.as_path()));
        Ok(())
    }

    #[test]
    fn sub_packages_walk_each_part() -> std::io::Result<()> {
        let mut case = create_resolver()?;
        let bar = case.env.root.join("foo").join("bar");
        std::fs::create_dir_all(&bar)?;
        std::fs::write(case.env.root.join("foo").join("__init__.py"), "")?;
        std::fs::write(bar.join("__init__.py"), "")?;
        let baz = bar.join("baz.py");
        std::fs::write(&baz, "x = 1\n")?;

        let source = case.env.root.join("main.py");
        let result = case
            .resolver
            .resolve(&source, &case.env, &descriptor("foo.bar.baz"));

        assert!(result.is_import_found);
        assert_eq!(result.resolved_paths.len(), 3);
        assert_eq!(result.resolved_file(), Some(baz.as_path()));
        Ok(())
    }

    #[test]
    fn namespace_package_without_modules_is_not_found() -> std::io::Result<()> {
        let mut case = create_resolver()?;
        std::fs::create_dir(case.env.root.join("empty_ns"))?;

        let source = case.env.root.join("main.py");
        let result = case
            .resolver
            .resolve(&source, &case.env, &descriptor("empty_ns"));

        assert!(!result.is_import_found);
        assert!(!result.import_failure_info.is_empty());
        Ok(())
    }

    #[test]
    fn namespace_package_with_modules_is_found() -> std::io::Result<()> {
        let mut case = create_resolver()?;
        let ns = case.env.root.join("ns");
        std::fs::create_dir(&ns)?;
        std::fs::write(ns.join("mod.py"), "x = 1\n")?;

        let source = case.env.root.join("main.py");
        let result = case.resolver.resolve(&source, &case.env, &descriptor("ns"));

        assert!(result.is_import_found);
        assert!(result.is_namespace_package);
        assert_eq!(result.resolved_file(), None);
        assert_eq!(result.implicit_imports.len(), 1);
        assert_eq!(result.implicit_imports[0].name.as_str(), "mod");
        Ok(())
    }

    #[test]
    fn relative_import_resolves_from_source_directory() -> std::io::Result<()> {
        let mut case = create_resolver()?;
        let pkg = case.env.root.join("pkg");
        std::fs::create_dir(&pkg)?;
        std::fs::write(pkg.join("__init__.py"), "")?;
        let sibling = pkg.join("sibling.py");
        std::fs::write(&sibling, "x = 1\n")?;

        let source = pkg.join("main.py");
        let result = case.resolver.resolve(
            &source,
            &case.env,
            &ModuleDescriptor {
                leading_dots: 1,
                name_parts: vec!["sibling".into()],
                imported_symbols: None,
                has_trailing_dot: false,
            },
        );

        assert!(result.is_import_found);
        assert!(result.is_relative);
        assert_eq!(result.resolved_file(), Some(sibling.as_path()));
        Ok(())
    }

    #[test]
    fn relative_import_escaping_the_root_fails() -> std::io::Result<()> {
        let mut case = create_resolver()?;
        let source = case.env.root.join("main.py");

        let result = case.resolver.resolve(
            &source,
            &case.env,
            &ModuleDescriptor {
                leading_dots: 3,
                name_parts: vec!["foo".into()],
                imported_symbols: None,
                has_trailing_dot: false,
            },
        );

        assert!(!result.is_import_found);
        assert!(result
            .import_failure_info
            .iter()
            .any(|line| line.contains("escapes the workspace root")));
        Ok(())
    }

    #[test]
    fn resolution_is_cache_stable() -> std::io::Result<()> {
        let mut case = create_resolver()?;
        let pkg = case.env.root.join("pkg");
        std::fs::create_dir(&pkg)?;
        std::fs::write(pkg.join("__init__.py"), "")?;
        std::fs::write(pkg.join("a.py"), "")?;
        std::fs::write(pkg.join("b.py"), "")?;

        let source = case.env.root.join("main.py");
        let first = case.resolver.resolve(&source, &case.env, &descriptor("pkg"));
        let second = case.resolver.resolve(&source, &case.env, &descriptor("pkg"));

        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn missing_import_reports_a_trace() -> std::io::Result<()> {
        let mut case = create_resolver()?;
        let source = case.env.root.join("main.py");
        let result = case
            .resolver
            .resolve(&source, &case.env, &descriptor("nonexistent_module"));

        assert!(!result.is_import_found);
        assert!(!result.import_failure_info.is_empty());
        Ok(())
    }

    #[test]
    fn completion_suggestions_filter_by_similarity() -> std::io::Result<()> {
        let mut case = create_resolver()?;
        std::fs::write(case.env.root.join("helpers.py"), "")?;
        std::fs::write(case.env.root.join("handlers.py"), "")?;
        std::fs::write(case.env.root.join("models.py"), "")?;
        std::fs::write(case.env.root.join("__dunder.py"), "")?;

        let source = case.env.root.join("main.py");
        let suggestions = case.resolver.completion_suggestions(
            &source,
            &case.env,
            &descriptor("hel"),
            0.8,
        );

        let names: Vec<&str> = suggestions.iter().map(|name| name.as_str()).collect();
        assert!(names.contains(&"helpers"));
        assert!(!names.contains(&"models"));
        assert!(!names.contains(&"__dunder"));
        Ok(())
    }

    #[test]
    fn typeshed_version_buckets_are_probed_in_order() -> std::io::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let typeshed = temp_dir.path().join("typeshed");
        let newer = typeshed.join("stdlib").join("3.8");
        let older = typeshed.join("stdlib").join("3.7");
        std::fs::create_dir_all(&newer)?;
        std::fs::create_dir_all(&older)?;
        std::fs::write(older.join("textwrap.pyi"), "def dedent(text: str) -> str: ...\n")?;

        let root = temp_dir.path().join("src");
        std::fs::create_dir(&root)?;
        let env = ExecutionEnvironment {
            root,
            ..ExecutionEnvironment::default()
        };
        let mut resolver = ImportResolver::new(ImportResolverConfig {
            typeshed_path: Some(typeshed),
            ..ImportResolverConfig::default()
        });

        let result = resolver.resolve(
            Path::new("main.py"),
            &env,
            &ModuleDescriptor::absolute(["textwrap"]),
        );
        assert!(result.is_import_found);
        assert_eq!(result.import_type, ImportType::BuiltIn);
        assert!(result.is_stub_file);
        Ok(())
    }
}
