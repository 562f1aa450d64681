//! The type model: a tagged `Copy` value over per-file arenas.
//!
//! Types are immutable once fully specialized and are shared freely; the
//! arenas live in a [`TypeStore`] keyed by file so that a file's derived
//! types die with the file. Unions and tuples are interned per file,
//! which keeps repeated evaluation passes id-stable.

use bitflags::bitflags;
use index_vec::IndexVec;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::builtins::{KnownClass, KnownFunction, SpecialForm, SynthesizedModule};
use crate::files::FileId;
use crate::name::Name;
use crate::node_key::NodeKey;
use crate::semantic_index::definition::DeclarationId;
use crate::semantic_index::symbol::{ScopeId, SymbolId};
use crate::FxDashMap;

pub mod builder;
pub mod display;
pub mod infer;
pub mod narrow;
pub mod static_truthiness;

pub use builder::UnionBuilder;
pub use display::DisplayType;

macro_rules! file_scoped_id {
    ($(#[$doc:meta])* $name:ident, $local:ident) => {
        index_vec::define_index_type! {
            pub struct $local = u32;
        }

        $(#[$doc])*
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub struct $name {
            pub(crate) file: FileId,
            pub(crate) local: $local,
        }

        impl $name {
            pub fn file(self) -> FileId {
                self.file
            }
        }
    };
}

file_scoped_id!(
    /// A class object.
    ClassTypeId,
    ModuleClassId
);
file_scoped_id!(
    /// A function object.
    FunctionTypeId,
    ModuleFunctionId
);
file_scoped_id!(
    /// A set of `@overload` alternatives.
    OverloadedTypeId,
    ModuleOverloadedId
);
file_scoped_id!(
    /// A property with getter/setter/deleter.
    PropertyTypeId,
    ModulePropertyId
);
file_scoped_id!(
    /// A heterogeneous tuple.
    TupleTypeId,
    ModuleTupleId
);
file_scoped_id!(
    /// A type variable; compares by identity, never by name.
    TypeVarId,
    ModuleTypeVarId
);
file_scoped_id!(
    /// A flat, deduplicated union.
    UnionTypeId,
    ModuleUnionId
);

/// What a module expression refers to: a checked file, or one of the
/// synthesized ambient modules (`builtins`, `typing`, ...).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ModuleType {
    File(FileId),
    Synthesized(SynthesizedModule),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Type {
    /// Not yet inferred, or inference gave up.
    Unknown,
    /// The name has no value bound to it.
    Unbound,
    /// The dynamic type.
    Any,
    /// The `None` object.
    None,
    /// The empty set of values.
    Never,
    /// The `...` object.
    Ellipsis,
    /// A class object itself.
    Class(ClassTypeId),
    /// An instance of a class.
    Object(ClassTypeId),
    Function(FunctionTypeId),
    Overloaded(OverloadedTypeId),
    Property(PropertyTypeId),
    Module(ModuleType),
    Tuple(TupleTypeId),
    TypeVar(TypeVarId),
    Union(UnionTypeId),
}

impl Type {
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }

    pub const fn is_unbound(&self) -> bool {
        matches!(self, Type::Unbound)
    }

    pub const fn is_any(&self) -> bool {
        matches!(self, Type::Any)
    }

    pub const fn is_never(&self) -> bool {
        matches!(self, Type::Never)
    }

    pub const fn into_class(self) -> Option<ClassTypeId> {
        match self {
            Type::Class(id) => Some(id),
            _ => None,
        }
    }

    pub const fn into_object(self) -> Option<ClassTypeId> {
        match self {
            Type::Object(id) => Some(id),
            _ => None,
        }
    }

    pub fn display(self, store: &TypeStore) -> DisplayType<'_> {
        DisplayType::new(self, store)
    }

    /// The type of the value obtained by instantiating this type: a class
    /// in a value position becomes an instance of that class.
    pub fn to_instance(self, store: &TypeStore) -> Type {
        match self {
            Type::Class(class) => Type::Object(class),
            Type::Union(union) => {
                let elements = store.union_elements(union);
                let mut builder = UnionBuilder::new(store, union.file);
                for element in elements {
                    builder = builder.add(element.to_instance(store));
                }
                builder.build()
            }
            Type::Any => Type::Any,
            Type::Unknown => Type::Unknown,
            Type::Unbound => Type::Unknown,
            Type::Never => Type::Never,
            _ => Type::Unknown,
        }
    }

    /// Whether values of this type can evaluate truthy / falsy. `None` is
    /// always falsy, most instances can be either.
    pub fn can_be_truthy(self, store: &TypeStore) -> bool {
        match self {
            Type::None | Type::Never | Type::Unbound => false,
            Type::Union(union) => store
                .union_elements(union)
                .into_iter()
                .any(|element| element.can_be_truthy(store)),
            Type::Tuple(tuple) => !store.tuple_elements(tuple).is_empty(),
            _ => true,
        }
    }

    pub fn can_be_falsy(self, store: &TypeStore) -> bool {
        match self {
            Type::None | Type::Unknown | Type::Any | Type::Unbound | Type::Ellipsis => true,
            Type::Never => false,
            Type::Union(union) => store
                .union_elements(union)
                .into_iter()
                .any(|element| element.can_be_falsy(store)),
            Type::Tuple(tuple) => store.tuple_elements(tuple).is_empty(),
            // Instances of arbitrary classes may define __bool__/__len__.
            Type::Object(_) => true,
            Type::Class(_) | Type::Function(_) | Type::Overloaded(_) | Type::Module(_) => false,
            Type::Property(_) | Type::TypeVar(_) => true,
        }
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct ClassFlags: u8 {
        /// Declared by the builtin or typing machinery rather than user
        /// code.
        const BUILT_IN = 1 << 0;
        /// Index/call syntax is handled by dedicated code rather than
        /// generic specialization.
        const SPECIAL_BUILT_IN = 1 << 1;
    }
}

#[derive(Clone, Debug)]
pub struct ClassType {
    pub name: Name,
    pub flags: ClassFlags,
    pub known: Option<KnownClass>,
    pub special_form: Option<SpecialForm>,
    /// The class this one was cloned from during specialization.
    pub origin: Option<ClassTypeId>,
    /// Body scope for member lookup, when the class has a body.
    pub scope: Option<(FileId, ScopeId)>,
    pub bases: Vec<Type>,
    pub metaclass: Option<Type>,
    pub type_params: Vec<Type>,
    pub type_args: Option<Vec<Type>>,
    /// Members synthesized by the checker (named-tuple fields, generated
    /// dunders), looked up before the body scope.
    pub synthesized_members: Vec<(Name, Type)>,
    pub doc_string: Option<String>,
}

impl ClassType {
    pub fn new(name: Name) -> Self {
        Self {
            name,
            flags: ClassFlags::empty(),
            known: None,
            special_form: None,
            origin: None,
            scope: None,
            bases: Vec::new(),
            metaclass: None,
            type_params: Vec::new(),
            type_args: None,
            synthesized_members: Vec::new(),
            doc_string: None,
        }
    }
}

bitflags! {
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct FunctionTypeFlags: u8 {
        const INSTANCE_METHOD = 1 << 0;
        const CLASS_METHOD    = 1 << 1;
        const STATIC_METHOD   = 1 << 2;
        const CONSTRUCTOR     = 1 << 3;
        const ASYNC           = 1 << 4;
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ParameterCategory {
    Simple,
    VarArgList,
    VarArgDictionary,
}

#[derive(Clone, Debug)]
pub struct FunctionParameter {
    pub category: ParameterCategory,
    pub name: Option<Name>,
    pub ty: Type,
    pub has_default: bool,
}

#[derive(Clone, Debug)]
pub struct FunctionType {
    pub name: Name,
    pub flags: FunctionTypeFlags,
    pub known: Option<KnownFunction>,
    pub params: Vec<FunctionParameter>,
    pub declared_return: Option<Type>,
    pub inferred_return: Option<Type>,
    pub doc_string: Option<String>,
}

impl FunctionType {
    pub fn new(name: Name) -> Self {
        Self {
            name,
            flags: FunctionTypeFlags::empty(),
            known: None,
            params: Vec::new(),
            declared_return: None,
            inferred_return: None,
            doc_string: None,
        }
    }

    /// The type a call to this function evaluates to.
    pub fn effective_return(&self) -> Type {
        self.declared_return
            .or(self.inferred_return)
            .unwrap_or(Type::Unknown)
    }
}

#[derive(Clone, Debug)]
pub struct OverloadedFunctionType {
    pub overloads: Vec<FunctionTypeId>,
}

#[derive(Clone, Debug)]
pub struct PropertyType {
    pub getter: Type,
    pub setter: Option<Type>,
    pub deleter: Option<Type>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Variance {
    Invariant,
    Covariant,
    Contravariant,
}

#[derive(Clone, Debug)]
pub struct TypeVarType {
    pub name: Name,
    pub bound: Option<Type>,
    pub constraints: Vec<Type>,
    pub variance: Variance,
}

/// Per-source inferred contributions for a symbol, keyed by declaration
/// so that a re-evaluation of the same site replaces its earlier
/// contribution.
type SymbolSources = SmallVec<[(DeclarationId, Type); 2]>;

#[derive(Debug, Default)]
struct ModuleTypeStore {
    classes: IndexVec<ModuleClassId, ClassType>,
    functions: IndexVec<ModuleFunctionId, FunctionType>,
    overloads: IndexVec<ModuleOverloadedId, OverloadedFunctionType>,
    properties: IndexVec<ModulePropertyId, PropertyType>,
    tuples: IndexVec<ModuleTupleId, Vec<Type>>,
    type_vars: IndexVec<ModuleTypeVarId, TypeVarType>,
    unions: IndexVec<ModuleUnionId, Vec<Type>>,
    union_interner: FxHashMap<Vec<Type>, ModuleUnionId>,
    tuple_interner: FxHashMap<Vec<Type>, ModuleTupleId>,

    /// Expression-type cache, keyed by node identity.
    node_types: FxHashMap<NodeKey, Type>,
    /// Class/function/typevar objects constructed for a declaration node;
    /// stable across evaluation passes.
    node_objects: FxHashMap<NodeKey, Type>,
    symbol_sources: FxHashMap<(ScopeId, SymbolId), SymbolSources>,
    declared_types: FxHashMap<(ScopeId, SymbolId), Type>,
}

/// All type arenas, keyed by file. Interior-mutable so evaluation can
/// create types while reading others; accessors copy data out and never
/// hold a map guard across another store call.
#[derive(Debug, Default)]
pub struct TypeStore {
    modules: FxDashMap<FileId, ModuleTypeStore>,
}

impl TypeStore {
    /// Drops every type derived from `file`. Called when the file's
    /// contents change or a re-analysis is requested.
    pub fn remove_module(&self, file: FileId) {
        self.modules.remove(&file);
    }

    fn with_module<R>(&self, file: FileId, f: impl FnOnce(&mut ModuleTypeStore) -> R) -> R {
        let mut module = self.modules.entry(file).or_default();
        f(&mut module)
    }

    pub fn add_class(&self, file: FileId, class: ClassType) -> ClassTypeId {
        let local = self.with_module(file, |module| module.classes.push(class));
        ClassTypeId { file, local }
    }

    /// Cheap specialization: clones the class, records the applied type
    /// arguments, and remembers the original.
    pub fn specialize_class(&self, id: ClassTypeId, type_args: Vec<Type>) -> ClassTypeId {
        let mut clone = self.class(id);
        clone.origin = Some(self.generic_origin(id));
        clone.type_args = Some(type_args);
        self.add_class(id.file, clone)
    }

    pub fn class(&self, id: ClassTypeId) -> ClassType {
        self.with_module(id.file, |module| module.classes[id.local].clone())
    }

    /// Rewrites a class arena slot in place; the id stays stable across
    /// evaluation passes.
    pub fn overwrite_class(&self, id: ClassTypeId, class: ClassType) {
        self.with_module(id.file, |module| {
            module.classes[id.local] = class;
        });
    }

    pub fn class_name(&self, id: ClassTypeId) -> Name {
        self.with_module(id.file, |module| module.classes[id.local].name.clone())
    }

    pub fn class_flags(&self, id: ClassTypeId) -> ClassFlags {
        self.with_module(id.file, |module| module.classes[id.local].flags)
    }

    pub fn class_known(&self, id: ClassTypeId) -> Option<KnownClass> {
        self.with_module(id.file, |module| module.classes[id.local].known)
    }

    pub fn class_special_form(&self, id: ClassTypeId) -> Option<SpecialForm> {
        self.with_module(id.file, |module| module.classes[id.local].special_form)
    }

    pub fn class_scope(&self, id: ClassTypeId) -> Option<(FileId, ScopeId)> {
        self.with_module(id.file, |module| module.classes[id.local].scope)
    }

    pub fn class_bases(&self, id: ClassTypeId) -> Vec<Type> {
        self.with_module(id.file, |module| module.classes[id.local].bases.clone())
    }

    pub fn class_type_params(&self, id: ClassTypeId) -> Vec<Type> {
        self.with_module(id.file, |module| {
            module.classes[id.local].type_params.clone()
        })
    }

    pub fn class_type_args(&self, id: ClassTypeId) -> Option<Vec<Type>> {
        self.with_module(id.file, |module| {
            module.classes[id.local].type_args.clone()
        })
    }

    pub fn class_synthesized_member(&self, id: ClassTypeId, name: &str) -> Option<Type> {
        self.with_module(id.file, |module| {
            module.classes[id.local]
                .synthesized_members
                .iter()
                .find(|(member, _)| member == name)
                .map(|(_, ty)| *ty)
        })
    }

    pub fn generic_origin(&self, id: ClassTypeId) -> ClassTypeId {
        self.with_module(id.file, |module| module.classes[id.local].origin)
            .unwrap_or(id)
    }

    /// Identity up to specialization.
    pub fn is_same_generic_class(&self, a: ClassTypeId, b: ClassTypeId) -> bool {
        self.generic_origin(a) == self.generic_origin(b)
    }

    /// Whether `sub` is `sup` or transitively derives from it. Malformed
    /// self-referential hierarchies terminate instead of recursing.
    pub fn is_derived_from(&self, sub: ClassTypeId, sup: ClassTypeId) -> bool {
        let mut visited = Vec::new();
        self.is_derived_from_guarded(sub, sup, &mut visited)
    }

    fn is_derived_from_guarded(
        &self,
        sub: ClassTypeId,
        sup: ClassTypeId,
        visited: &mut Vec<ClassTypeId>,
    ) -> bool {
        if self.is_same_generic_class(sub, sup) {
            return true;
        }
        if visited.contains(&sub) {
            return false;
        }
        visited.push(sub);
        for base in self.class_bases(sub) {
            if let Type::Class(base) = base {
                if self.is_derived_from_guarded(base, sup, visited) {
                    return true;
                }
            }
        }
        false
    }

    pub fn add_function(&self, file: FileId, function: FunctionType) -> FunctionTypeId {
        let local = self.with_module(file, |module| module.functions.push(function));
        FunctionTypeId { file, local }
    }

    pub fn function(&self, id: FunctionTypeId) -> FunctionType {
        self.with_module(id.file, |module| module.functions[id.local].clone())
    }

    /// Rewrites a function arena slot in place; the id stays stable
    /// across evaluation passes.
    pub fn overwrite_function(&self, id: FunctionTypeId, function: FunctionType) {
        self.with_module(id.file, |module| {
            module.functions[id.local] = function;
        });
    }

    pub fn function_known(&self, id: FunctionTypeId) -> Option<KnownFunction> {
        self.with_module(id.file, |module| module.functions[id.local].known)
    }

    pub fn set_inferred_return(&self, id: FunctionTypeId, ty: Type) -> bool {
        self.with_module(id.file, |module| {
            let function = &mut module.functions[id.local];
            let changed = function.inferred_return != Some(ty);
            function.inferred_return = Some(ty);
            changed
        })
    }

    pub fn add_overloaded(&self, file: FileId, overloads: Vec<FunctionTypeId>) -> OverloadedTypeId {
        let local = self.with_module(file, |module| {
            module.overloads.push(OverloadedFunctionType { overloads })
        });
        OverloadedTypeId { file, local }
    }

    pub fn overloads(&self, id: OverloadedTypeId) -> Vec<FunctionTypeId> {
        self.with_module(id.file, |module| module.overloads[id.local].overloads.clone())
    }

    pub fn push_overload(&self, id: OverloadedTypeId, overload: FunctionTypeId) {
        self.with_module(id.file, |module| {
            let overloads = &mut module.overloads[id.local].overloads;
            if !overloads.contains(&overload) {
                overloads.push(overload);
            }
        });
    }

    pub fn add_property(&self, file: FileId, property: PropertyType) -> PropertyTypeId {
        let local = self.with_module(file, |module| module.properties.push(property));
        PropertyTypeId { file, local }
    }

    pub fn property(&self, id: PropertyTypeId) -> PropertyType {
        self.with_module(id.file, |module| module.properties[id.local].clone())
    }

    pub fn set_property_accessor(
        &self,
        id: PropertyTypeId,
        setter: Option<Type>,
        deleter: Option<Type>,
    ) {
        self.with_module(id.file, |module| {
            let property = &mut module.properties[id.local];
            if setter.is_some() {
                property.setter = setter;
            }
            if deleter.is_some() {
                property.deleter = deleter;
            }
        });
    }

    pub fn add_tuple(&self, file: FileId, elements: Vec<Type>) -> TupleTypeId {
        let local = self.with_module(file, |module| {
            if let Some(existing) = module.tuple_interner.get(&elements) {
                *existing
            } else {
                let local = module.tuples.push(elements.clone());
                module.tuple_interner.insert(elements, local);
                local
            }
        });
        TupleTypeId { file, local }
    }

    pub fn tuple_elements(&self, id: TupleTypeId) -> Vec<Type> {
        self.with_module(id.file, |module| module.tuples[id.local].clone())
    }

    pub fn add_type_var(&self, file: FileId, type_var: TypeVarType) -> TypeVarId {
        let local = self.with_module(file, |module| module.type_vars.push(type_var));
        TypeVarId { file, local }
    }

    pub fn type_var(&self, id: TypeVarId) -> TypeVarType {
        self.with_module(id.file, |module| module.type_vars[id.local].clone())
    }

    /// Adds a raw union with exactly the given elements, interned.
    /// Callers normalize through [`UnionBuilder`] first.
    pub(crate) fn add_union(&self, file: FileId, elements: Vec<Type>) -> UnionTypeId {
        let local = self.with_module(file, |module| {
            if let Some(existing) = module.union_interner.get(&elements) {
                *existing
            } else {
                let local = module.unions.push(elements.clone());
                module.union_interner.insert(elements, local);
                local
            }
        });
        UnionTypeId { file, local }
    }

    pub fn union_elements(&self, id: UnionTypeId) -> Vec<Type> {
        self.with_module(id.file, |module| module.unions[id.local].clone())
    }

    /// Whether the union contains the exact element type.
    pub fn union_contains(&self, id: UnionTypeId, ty: Type) -> bool {
        self.with_module(id.file, |module| module.unions[id.local].contains(&ty))
    }

    // ---- evaluation caches ------------------------------------------

    /// Caches the type of an expression node; reports whether the value
    /// differs from the previous pass, which drives the fixed point.
    pub fn cache_node_type(&self, file: FileId, node: NodeKey, ty: Type) -> bool {
        self.with_module(file, |module| {
            module.node_types.insert(node, ty) != Some(ty)
        })
    }

    pub fn cached_node_type(&self, file: FileId, node: NodeKey) -> Option<Type> {
        self.with_module(file, |module| module.node_types.get(&node).copied())
    }

    /// Declaration-keyed cache for constructed classes/functions/type
    /// vars, so repeated passes reuse the same arena ids.
    pub fn cache_node_object(&self, file: FileId, node: NodeKey, ty: Type) {
        self.with_module(file, |module| {
            module.node_objects.insert(node, ty);
        });
    }

    pub fn cached_node_object(&self, file: FileId, node: NodeKey) -> Option<Type> {
        self.with_module(file, |module| module.node_objects.get(&node).copied())
    }

    /// Records one binding site's contribution to a symbol's inferred
    /// type, replacing the site's earlier contribution. Returns whether
    /// anything changed.
    pub fn set_symbol_source(
        &self,
        file: FileId,
        scope: ScopeId,
        symbol: SymbolId,
        source: DeclarationId,
        ty: Type,
    ) -> bool {
        self.with_module(file, |module| {
            let sources = module.symbol_sources.entry((scope, symbol)).or_default();
            if let Some(slot) = sources.iter_mut().find(|(existing, _)| *existing == source) {
                let changed = slot.1 != ty;
                slot.1 = ty;
                changed
            } else {
                sources.push((source, ty));
                true
            }
        })
    }

    fn symbol_source_types(&self, file: FileId, scope: ScopeId, symbol: SymbolId) -> Vec<Type> {
        self.with_module(file, |module| {
            module
                .symbol_sources
                .get(&(scope, symbol))
                .map(|sources| sources.iter().map(|(_, ty)| *ty).collect())
                .unwrap_or_default()
        })
    }

    /// The accumulated inferred type of a symbol: the join of its
    /// per-source contributions.
    pub fn symbol_type(&self, file: FileId, scope: ScopeId, symbol: SymbolId) -> Option<Type> {
        let sources = self.symbol_source_types(file, scope, symbol);
        if sources.is_empty() {
            return None;
        }
        let mut builder = UnionBuilder::new(self, file);
        for ty in sources {
            builder = builder.add(ty);
        }
        Some(builder.build())
    }

    pub fn set_declared_type(&self, file: FileId, scope: ScopeId, symbol: SymbolId, ty: Type) {
        self.with_module(file, |module| {
            module.declared_types.insert((scope, symbol), ty);
        });
    }

    pub fn declared_type(&self, file: FileId, scope: ScopeId, symbol: SymbolId) -> Option<Type> {
        self.with_module(file, |module| {
            module.declared_types.get(&(scope, symbol)).copied()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ClassType, Type, TypeStore};
    use crate::files::Files;
    use crate::name::Name;
    use std::path::Path;

    #[test]
    fn unions_are_interned_per_file() {
        let files = Files::default();
        let file = files.intern(Path::new("/src/a.py"));
        let store = TypeStore::default();

        let a = store.add_union(file, vec![Type::None, Type::Ellipsis]);
        let b = store.add_union(file, vec![Type::None, Type::Ellipsis]);
        assert_eq!(a, b);

        let c = store.add_union(file, vec![Type::Ellipsis, Type::None]);
        assert_ne!(a, c);
    }

    #[test]
    fn specialization_preserves_generic_identity() {
        let files = Files::default();
        let file = files.intern(Path::new("/src/a.py"));
        let store = TypeStore::default();

        let base = store.add_class(file, ClassType::new(Name::new("Box")));
        let special = store.specialize_class(base, vec![Type::None]);
        assert_ne!(base, special);
        assert!(store.is_same_generic_class(base, special));
        assert_eq!(store.class_type_args(special), Some(vec![Type::None]));
        // The original is untouched.
        assert_eq!(store.class_type_args(base), None);
    }

    #[test]
    fn symbol_sources_replace_by_declaration() {
        use crate::semantic_index::definition::DeclarationId;
        use crate::semantic_index::symbol::{ScopeId, SymbolId};

        let files = Files::default();
        let file = files.intern(Path::new("/src/a.py"));
        let store = TypeStore::default();
        let scope = ScopeId::from_usize(1);
        let symbol = SymbolId::from_usize(0);
        let site = DeclarationId::from_usize(0);

        assert!(store.set_symbol_source(file, scope, symbol, site, Type::None));
        assert!(store.set_symbol_source(file, scope, symbol, site, Type::Ellipsis));
        // Same site, same type: converged.
        assert!(!store.set_symbol_source(file, scope, symbol, site, Type::Ellipsis));
        assert_eq!(store.symbol_type(file, scope, symbol), Some(Type::Ellipsis));
    }
}
