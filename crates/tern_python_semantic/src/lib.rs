//! Semantic analysis for Python sources: name binding, import resolution,
//! type inference and flow-sensitive narrowing.
//!
//! The parse tree comes from `rustpython-parser` and is never mutated here;
//! everything this crate computes is attached to nodes through side tables
//! keyed by [`node_key::NodeKey`].

use std::hash::BuildHasherDefault;

use rustc_hash::FxHasher;

pub mod builtins;
pub mod db;
pub mod diagnostic;
pub mod files;
pub mod line_index;
pub mod module_name;
pub mod module_resolver;
pub mod name;
pub mod node_key;
pub mod parse;
pub mod python_platform;
pub mod python_version;
pub mod semantic_index;
pub mod suppression;
pub mod types;

pub use db::Db;
pub use files::{FileId, Files};
pub use name::Name;
pub use python_platform::PythonPlatform;
pub use python_version::PythonVersion;

pub(crate) type FxDashMap<K, V> = dashmap::DashMap<K, V, BuildHasherDefault<FxHasher>>;
