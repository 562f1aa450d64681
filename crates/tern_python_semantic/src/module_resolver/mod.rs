//! Layered import resolution: maps an import directive to concrete files,
//! probing typeshed stubs, the workspace, configured extra roots, user
//! typings, and interpreter-derived search paths in a fixed order.

mod resolver;
mod typeshed;

pub use resolver::{
    collect_import_descriptors, ImplicitImport, ImportResolver, ImportResolverConfig, ImportResult,
    ImportType, ModuleDescriptor,
};
pub use typeshed::stdlib_version_dirs;

use std::path::PathBuf;

use crate::python_platform::PythonPlatform;
use crate::python_version::PythonVersion;

/// Fixes everything import resolution depends on besides the directive
/// itself: language version, platform, workspace root, extra search paths
/// and virtual-environment selection.
#[derive(Clone, Debug, Default)]
pub struct ExecutionEnvironment {
    pub root: PathBuf,
    pub python_version: PythonVersion,
    pub python_platform: PythonPlatform,
    pub extra_paths: Vec<PathBuf>,
    pub venv: Option<String>,
}
