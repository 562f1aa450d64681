use std::hash::{Hash, Hasher};

use bitflags::bitflags;
use hashbrown::hash_map::RawEntryMut;
use index_vec::IndexVec;
use rustc_hash::FxHasher;

use crate::name::Name;
use crate::node_key::NodeKey;
use crate::semantic_index::definition::{DeclarationId, DeclarationIds};

type Map<K, V> = hashbrown::HashMap<K, V, ()>;

index_vec::define_index_type! {
    /// Identity of a scope within one file's scope tree.
    pub struct ScopeId = u32;
}

index_vec::define_index_type! {
    /// Identity of a symbol within its scope.
    pub struct SymbolId = u32;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ScopeKind {
    Builtin,
    Module,
    Class,
    Function,
    Lambda,
    /// A flow branch (if/else arm, loop body, comprehension). Executes
    /// inside its enclosing scope.
    Temporary,
}

impl ScopeKind {
    /// Module, function and lambda scopes execute independently; class and
    /// temporary scopes run inline in their parent. Names captured across
    /// an independently-executable boundary cannot be narrowed by the
    /// capturing scope's flow.
    pub fn is_independently_executable(self) -> bool {
        matches!(self, ScopeKind::Module | ScopeKind::Function | ScopeKind::Lambda)
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct ScopeFlags: u8 {
        const ALWAYS_RETURNS = 1 << 0;
        const ALWAYS_RAISES  = 1 << 1;
        const MAY_BREAK      = 1 << 2;
        const ALWAYS_BREAKS  = 1 << 3;
        const IS_CONDITIONAL = 1 << 4;
        const IS_LOOPING     = 1 << 5;
    }
}

impl ScopeFlags {
    /// Whether control provably never falls off the end of this scope.
    pub fn never_falls_through(self) -> bool {
        self.intersects(
            ScopeFlags::ALWAYS_RETURNS | ScopeFlags::ALWAYS_RAISES | ScopeFlags::ALWAYS_BREAKS,
        )
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct SymbolFlags: u8 {
        const IS_BOUND          = 1 << 0;
        const IS_USED           = 1 << 1;
        const MARKED_GLOBAL     = 1 << 2;
        const MARKED_NONLOCAL   = 1 << 3;
        /// The name starts out unbound in its scope (everything except
        /// parameters and ambient members).
        const INITIALLY_UNBOUND = 1 << 4;
        /// Pre-populated rather than written by user code.
        const AMBIENT           = 1 << 5;
    }
}

#[derive(Debug, Eq, PartialEq)]
pub struct Symbol {
    name: Name,
    flags: SymbolFlags,
    declarations: DeclarationIds,
}

impl Symbol {
    fn new(name: Name) -> Self {
        Self {
            name,
            flags: SymbolFlags::empty(),
            declarations: DeclarationIds::new(),
        }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn flags(&self) -> SymbolFlags {
        self.flags
    }

    pub fn is_bound(&self) -> bool {
        self.flags.contains(SymbolFlags::IS_BOUND)
    }

    pub fn is_used(&self) -> bool {
        self.flags.contains(SymbolFlags::IS_USED)
    }

    pub fn is_ambient(&self) -> bool {
        self.flags.contains(SymbolFlags::AMBIENT)
    }

    pub fn starts_unbound(&self) -> bool {
        self.flags.contains(SymbolFlags::INITIALLY_UNBOUND)
    }

    pub fn declarations(&self) -> &[DeclarationId] {
        &self.declarations
    }
}

/// Symbol table for a single scope: an arena of symbols plus a raw-entry
/// map hashed by symbol name.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: IndexVec<SymbolId, Symbol>,
    symbols_by_name: Map<SymbolId, ()>,
}

impl SymbolTable {
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.symbols.iter_enumerated().map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbol_id_by_name(&self, name: &str) -> Option<SymbolId> {
        let hash = hash_name(name);
        self.symbols_by_name
            .raw_entry()
            .from_hash(hash, |id| self.symbols[*id].name() == name)
            .map(|(id, ())| *id)
    }

    pub fn symbol_by_name(&self, name: &str) -> Option<&Symbol> {
        self.symbol_id_by_name(name).map(|id| self.symbol(id))
    }

    pub(crate) fn add_or_update_symbol(&mut self, name: Name, flags: SymbolFlags) -> SymbolId {
        let hash = hash_name(&name);
        let Self {
            symbols,
            symbols_by_name,
        } = self;
        let entry = symbols_by_name
            .raw_entry_mut()
            .from_hash(hash, |id| symbols[*id].name() == &name);

        match entry {
            RawEntryMut::Occupied(entry) => {
                let id = *entry.key();
                symbols[id].flags.insert(flags);
                id
            }
            RawEntryMut::Vacant(entry) => {
                let mut symbol = Symbol::new(name);
                symbol.flags.insert(flags);
                let id = symbols.push(symbol);
                entry.insert_with_hasher(hash, id, (), |id| hash_name(symbols[*id].name()));
                id
            }
        }
    }

    pub(crate) fn add_declaration(&mut self, symbol: SymbolId, declaration: DeclarationId) {
        let declarations = &mut self.symbols[symbol].declarations;
        if !declarations.contains(&declaration) {
            declarations.push(declaration);
        }
    }
}

impl PartialEq for SymbolTable {
    fn eq(&self, other: &Self) -> bool {
        // Names are captured in the symbols themselves; the lookup map is
        // derived state.
        self.symbols == other.symbols
    }
}

impl Eq for SymbolTable {}

fn hash_name(name: &str) -> u64 {
    let mut hasher = FxHasher::default();
    name.hash(&mut hasher);
    hasher.finish()
}

/// One lexical scope: symbol table, parent back-reference, flow flags and
/// the module-level export filter.
#[derive(Debug, Eq, PartialEq)]
pub struct Scope {
    pub(crate) kind: ScopeKind,
    pub(crate) parent: Option<ScopeId>,
    pub(crate) name: Name,
    pub(crate) node: Option<NodeKey>,
    pub(crate) symbols: SymbolTable,
    pub(crate) flags: ScopeFlags,
    /// Names listed in `__all__`, when the module declares one. Only
    /// these are visible to other modules.
    pub(crate) export_names: Option<Vec<Name>>,
}

impl Scope {
    pub(crate) fn new(kind: ScopeKind, parent: Option<ScopeId>, name: Name, node: Option<NodeKey>) -> Self {
        Self {
            kind,
            parent,
            name,
            node,
            symbols: SymbolTable::default(),
            flags: ScopeFlags::empty(),
            export_names: None,
        }
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn node(&self) -> Option<NodeKey> {
        self.node
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn flags(&self) -> ScopeFlags {
        self.flags
    }

    pub fn export_names(&self) -> Option<&[Name]> {
        self.export_names.as_deref()
    }

    /// Whether `name` is visible to other modules.
    pub fn exports(&self, name: &str) -> bool {
        match &self.export_names {
            Some(exports) => exports.iter().any(|export| export == name),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{SymbolFlags, SymbolTable};
    use crate::name::Name;

    #[test]
    fn same_name_resolves_to_one_symbol() {
        let mut table = SymbolTable::default();
        let one = table.add_or_update_symbol(Name::new("x"), SymbolFlags::IS_BOUND);
        let two = table.add_or_update_symbol(Name::new("x"), SymbolFlags::IS_USED);
        assert_eq!(one, two);
        let symbol = table.symbol(one);
        assert!(symbol.is_bound());
        assert!(symbol.is_used());
    }

    #[test]
    fn distinct_names_get_distinct_symbols() {
        let mut table = SymbolTable::default();
        let x = table.add_or_update_symbol(Name::new("x"), SymbolFlags::empty());
        let y = table.add_or_update_symbol(Name::new("y"), SymbolFlags::empty());
        assert_ne!(x, y);
        assert_eq!(table.symbol_id_by_name("y"), Some(y));
        assert_eq!(table.symbol_id_by_name("z"), None);
    }
}
