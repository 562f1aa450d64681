use rustpython_ast::text_size::TextRange;
use smallvec::SmallVec;

use crate::name::Name;
use crate::node_key::NodeKey;

index_vec::define_index_type! {
    /// Identity of one binding site within a file. Also serves as the
    /// source id keying a symbol's per-source inferred types, so that
    /// re-analysis replaces earlier contributions instead of accumulating
    /// them.
    pub struct DeclarationId = u32;
}

/// A record of where a symbol was introduced, distinct from its inferred
/// type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Declaration {
    pub kind: DeclarationKind,
    pub node: NodeKey,
    pub range: TextRange,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DeclarationKind {
    /// Pre-populated ambient name (builtin scope, `__name__`, ...).
    BuiltIn,
    Variable {
        annotation: Option<NodeKey>,
        is_constant: bool,
    },
    Parameter,
    Function {
        is_method: bool,
        is_async: bool,
        return_exprs: Vec<NodeKey>,
        yield_exprs: Vec<NodeKey>,
    },
    Class,
    /// An import alias: `import a.b`, `import a.b as c`, or
    /// `from a import b`. `symbol` is the name imported from the module
    /// for the `from` form.
    Alias {
        symbol: Option<Name>,
        directive: NodeKey,
    },
}

impl DeclarationKind {
    pub fn is_binding(&self) -> bool {
        true
    }
}

pub type DeclarationIds = SmallVec<[DeclarationId; 2]>;
