use std::path::PathBuf;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tern_python_semantic::diagnostic::DiagnosticSettings;
use tern_python_semantic::module_resolver::{ExecutionEnvironment, ImportResolverConfig};
use tern_python_semantic::{PythonPlatform, PythonVersion};

/// Everything a check run is configured with: the execution environment,
/// the resolver roots, the diagnostic levels, and the strict/ignore
/// file filters.
#[derive(Debug, Default, Clone)]
pub struct Configuration {
    pub root: PathBuf,
    pub python_version: PythonVersion,
    pub python_platform: PythonPlatform,
    pub extra_paths: Vec<PathBuf>,
    pub venv_path: Option<PathBuf>,
    pub default_venv: Option<String>,
    pub venv: Option<String>,
    pub typeshed_path: Option<PathBuf>,
    pub typings_path: Option<PathBuf>,
    pub interpreter_path: Option<PathBuf>,
    pub diagnostic_settings: DiagnosticSettings,
    /// Globs naming files checked in strict mode.
    pub strict: Vec<String>,
    /// Globs naming files whose diagnostics are dropped entirely.
    pub ignore: Vec<String>,
    /// Report (demoted) diagnostics for files under the typeshed tree
    /// instead of dropping them.
    pub report_typeshed_errors: bool,
    /// Runs an extra parse-tree consistency walk after binding.
    pub internal_test_mode: bool,
}

impl Configuration {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            ..Self::default()
        }
    }

    pub fn execution_environment(&self) -> ExecutionEnvironment {
        ExecutionEnvironment {
            root: self.root.clone(),
            python_version: self.python_version,
            python_platform: self.python_platform,
            extra_paths: self.extra_paths.clone(),
            venv: self.venv.clone(),
        }
    }

    pub fn resolver_config(&self) -> ImportResolverConfig {
        ImportResolverConfig {
            typeshed_path: self.typeshed_path.clone(),
            typings_path: self.typings_path.clone(),
            venv_path: self.venv_path.clone(),
            default_venv: self.default_venv.clone(),
            interpreter_path: self.interpreter_path.clone(),
        }
    }

    pub fn strict_matcher(&self) -> GlobSet {
        build_glob_set(&self.strict)
    }

    pub fn ignore_matcher(&self) -> GlobSet {
        build_glob_set(&self.ignore)
    }
}

fn build_glob_set(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        if let Ok(glob) = Glob::new(pattern) {
            builder.add(glob);
        }
    }
    builder.build().unwrap_or_else(|_| GlobSet::empty())
}

#[cfg(test)]
mod tests {
    use super::Configuration;
    use std::path::{Path, PathBuf};

    #[test]
    fn glob_filters() {
        let config = Configuration {
            ignore: vec!["**/generated/**".to_string()],
            strict: vec!["**/core/*.py".to_string()],
            ..Configuration::new(PathBuf::from("/src"))
        };
        assert!(config
            .ignore_matcher()
            .is_match(Path::new("/src/generated/a.py")));
        assert!(!config.ignore_matcher().is_match(Path::new("/src/a.py")));
        assert!(config
            .strict_matcher()
            .is_match(Path::new("/src/core/a.py")));
    }
}
