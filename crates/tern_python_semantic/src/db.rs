use std::sync::Arc;

use crate::builtins::{BuiltinTypes, SynthesizedModule};
use crate::files::FileId;
use crate::module_resolver::{ExecutionEnvironment, ImportResult};
use crate::name::Name;
use crate::node_key::NodeKey;
use crate::parse::Parsed;
use crate::semantic_index::SemanticIndex;
use crate::types::TypeStore;

/// Everything the driver resolved for one import directive: the
/// [`ImportResult`] the resolver returned, plus the interned files it
/// maps to.
#[derive(Clone, Debug)]
pub struct ImportTarget {
    pub result: ImportResult,
    /// File of the first name part (`a` in `import a.b`).
    pub top_file: Option<FileId>,
    /// File of the terminal name part.
    pub file: Option<FileId>,
    /// Set when the directive resolved to an ambient synthesized module.
    pub synthesized: Option<SynthesizedModule>,
    /// Implicit imports of the terminal package, interned.
    pub submodules: Vec<(Name, FileId)>,
}

/// The host side of evaluation: the driver implements this so the
/// evaluator can reach parse results, bound indexes and resolved imports
/// of any loaded file.
pub trait Db {
    fn execution_environment(&self) -> &ExecutionEnvironment;

    fn type_store(&self) -> &TypeStore;

    fn builtin_types(&self) -> &BuiltinTypes;

    /// Parse output for a loaded file.
    fn parsed(&self, file: FileId) -> Option<Parsed>;

    /// Bound index for a loaded file.
    fn semantic_index(&self, file: FileId) -> Option<Arc<SemanticIndex>>;

    /// The resolution recorded for an import directive node during the
    /// file's parse phase.
    fn import_target(&self, file: FileId, node: NodeKey) -> Option<ImportTarget>;

    /// The file a submodule attribute of a package module refers to
    /// (`a.b` after `import a.b`).
    fn module_member_file(&self, module: FileId, name: &str) -> Option<FileId>;

    fn file_path(&self, file: FileId) -> std::path::PathBuf;
}
