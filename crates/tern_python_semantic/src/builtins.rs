//! Ambient names and the synthesized `builtins`/`typing`/`collections`/
//! `sys`/`os` modules.
//!
//! The checker does not require stub files for these: the well-known
//! classes and functions are constructed once per program into a
//! reserved file's type arenas and looked up through [`BuiltinTypes`].

use std::path::Path;

use rustc_hash::FxHashMap;

use crate::files::{FileId, Files};
use crate::name::Name;
use crate::types::{
    ClassFlags, ClassType, ClassTypeId, FunctionParameter, FunctionType, FunctionTypeId,
    ParameterCategory, Type, TypeStore,
};

/// The fixed allow-list the builtin scope is pre-populated from.
pub static AMBIENT_BUILTIN_NAMES: &[&str] = &[
    "object", "type", "int", "float", "complex", "bool", "str", "bytes", "bytearray", "list",
    "dict", "set", "frozenset", "tuple", "slice", "range", "property", "staticmethod",
    "classmethod", "super", "len", "isinstance", "issubclass", "print", "repr", "abs", "all",
    "any", "ascii", "bin", "callable", "chr", "dir", "divmod", "enumerate", "filter", "format",
    "getattr", "setattr", "delattr", "hasattr", "hash", "hex", "id", "input", "iter", "map",
    "max", "min", "next", "oct", "open", "ord", "pow", "reversed", "round", "sorted", "sum",
    "vars", "zip", "globals", "locals", "eval", "exec", "compile", "memoryview", "NotImplemented",
    "__import__", "__debug__", "BaseException", "Exception", "ArithmeticError", "AssertionError",
    "AttributeError", "BufferError", "EOFError", "ImportError", "IndexError", "KeyError",
    "KeyboardInterrupt", "LookupError", "MemoryError", "ModuleNotFoundError", "NameError",
    "NotImplementedError", "OSError", "OverflowError", "RecursionError", "ReferenceError",
    "RuntimeError", "StopIteration", "StopAsyncIteration", "SyntaxError", "SystemError",
    "SystemExit", "TypeError", "UnboundLocalError", "UnicodeDecodeError", "UnicodeEncodeError",
    "UnicodeError", "ValueError", "ZeroDivisionError", "Warning", "DeprecationWarning",
    "UserWarning",
];

pub static AMBIENT_MODULE_NAMES: &[&str] = &[
    "__name__",
    "__file__",
    "__doc__",
    "__package__",
    "__loader__",
    "__spec__",
    "__builtins__",
];

pub static AMBIENT_CLASS_NAMES: &[&str] = &[
    "__class__",
    "__dict__",
    "__doc__",
    "__name__",
    "__qualname__",
    "__module__",
];

pub static AMBIENT_FUNCTION_NAMES: &[&str] = &[
    "__defaults__",
    "__code__",
    "__globals__",
    "__dict__",
    "__doc__",
    "__name__",
    "__qualname__",
    "__kwdefaults__",
    "__annotations__",
];

/// Classes the checker has dedicated knowledge about.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum KnownClass {
    Object,
    Type,
    Int,
    Float,
    Complex,
    Bool,
    Str,
    Bytes,
    ByteArray,
    List,
    Dict,
    Set,
    FrozenSet,
    Tuple,
    Slice,
    Range,
    Property,
    StaticMethod,
    ClassMethod,
    BaseException,
    Exception,
    NoneType,
    Deque,
    DefaultDict,
    OrderedDict,
    Counter,
    ChainMap,
}

impl KnownClass {
    pub fn name(self) -> &'static str {
        match self {
            KnownClass::Object => "object",
            KnownClass::Type => "type",
            KnownClass::Int => "int",
            KnownClass::Float => "float",
            KnownClass::Complex => "complex",
            KnownClass::Bool => "bool",
            KnownClass::Str => "str",
            KnownClass::Bytes => "bytes",
            KnownClass::ByteArray => "bytearray",
            KnownClass::List => "list",
            KnownClass::Dict => "dict",
            KnownClass::Set => "set",
            KnownClass::FrozenSet => "frozenset",
            KnownClass::Tuple => "tuple",
            KnownClass::Slice => "slice",
            KnownClass::Range => "range",
            KnownClass::Property => "property",
            KnownClass::StaticMethod => "staticmethod",
            KnownClass::ClassMethod => "classmethod",
            KnownClass::BaseException => "BaseException",
            KnownClass::Exception => "Exception",
            KnownClass::NoneType => "NoneType",
            KnownClass::Deque => "deque",
            KnownClass::DefaultDict => "defaultdict",
            KnownClass::OrderedDict => "OrderedDict",
            KnownClass::Counter => "Counter",
            KnownClass::ChainMap => "ChainMap",
        }
    }

    const ALL: &'static [KnownClass] = &[
        KnownClass::Object,
        KnownClass::Type,
        KnownClass::Int,
        KnownClass::Float,
        KnownClass::Complex,
        KnownClass::Bool,
        KnownClass::Str,
        KnownClass::Bytes,
        KnownClass::ByteArray,
        KnownClass::List,
        KnownClass::Dict,
        KnownClass::Set,
        KnownClass::FrozenSet,
        KnownClass::Tuple,
        KnownClass::Slice,
        KnownClass::Range,
        KnownClass::Property,
        KnownClass::StaticMethod,
        KnownClass::ClassMethod,
        KnownClass::BaseException,
        KnownClass::Exception,
        KnownClass::NoneType,
        KnownClass::Deque,
        KnownClass::DefaultDict,
        KnownClass::OrderedDict,
        KnownClass::Counter,
        KnownClass::ChainMap,
    ];
}

/// Functions whose calls get dedicated handling (narrowing, synthesis).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum KnownFunction {
    IsInstance,
    IsSubclass,
    Len,
    Repr,
    Print,
    /// `collections.namedtuple` / `typing.NamedTuple`.
    NamedTuple,
    /// The `typing.TypeVar` factory.
    TypeVarFactory,
}

/// Classes from the typing module whose index/call syntax is handled by
/// dedicated code.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SpecialForm {
    Callable,
    Dict,
    List,
    Set,
    FrozenSet,
    Tuple,
    Union,
    Optional,
    ClassVar,
    Generic,
    Protocol,
    Type,
    ChainMap,
    Deque,
    Counter,
    DefaultDict,
    Final,
    Literal,
}

impl SpecialForm {
    pub fn name(self) -> &'static str {
        match self {
            SpecialForm::Callable => "Callable",
            SpecialForm::Dict => "Dict",
            SpecialForm::List => "List",
            SpecialForm::Set => "Set",
            SpecialForm::FrozenSet => "FrozenSet",
            SpecialForm::Tuple => "Tuple",
            SpecialForm::Union => "Union",
            SpecialForm::Optional => "Optional",
            SpecialForm::ClassVar => "ClassVar",
            SpecialForm::Generic => "Generic",
            SpecialForm::Protocol => "Protocol",
            SpecialForm::Type => "Type",
            SpecialForm::ChainMap => "ChainMap",
            SpecialForm::Deque => "Deque",
            SpecialForm::Counter => "Counter",
            SpecialForm::DefaultDict => "DefaultDict",
            SpecialForm::Final => "Final",
            SpecialForm::Literal => "Literal",
        }
    }

    /// Maximum number of type arguments the form's subscript accepts.
    pub fn param_limit(self) -> Option<usize> {
        match self {
            SpecialForm::Callable => Some(2),
            SpecialForm::Optional | SpecialForm::Type | SpecialForm::ClassVar | SpecialForm::Final => {
                Some(1)
            }
            SpecialForm::List
            | SpecialForm::Set
            | SpecialForm::FrozenSet
            | SpecialForm::Deque
            | SpecialForm::Counter => Some(1),
            SpecialForm::Dict | SpecialForm::DefaultDict | SpecialForm::ChainMap => Some(2),
            SpecialForm::Tuple
            | SpecialForm::Union
            | SpecialForm::Generic
            | SpecialForm::Protocol
            | SpecialForm::Literal => None,
        }
    }

    /// The builtin container the shape family specializes.
    pub fn container_class(self) -> Option<KnownClass> {
        match self {
            SpecialForm::Dict => Some(KnownClass::Dict),
            SpecialForm::List => Some(KnownClass::List),
            SpecialForm::Set => Some(KnownClass::Set),
            SpecialForm::FrozenSet => Some(KnownClass::FrozenSet),
            SpecialForm::Tuple => Some(KnownClass::Tuple),
            SpecialForm::ChainMap => Some(KnownClass::ChainMap),
            SpecialForm::Deque => Some(KnownClass::Deque),
            SpecialForm::Counter => Some(KnownClass::Counter),
            SpecialForm::DefaultDict => Some(KnownClass::DefaultDict),
            _ => None,
        }
    }

    const ALL: &'static [SpecialForm] = &[
        SpecialForm::Callable,
        SpecialForm::Dict,
        SpecialForm::List,
        SpecialForm::Set,
        SpecialForm::FrozenSet,
        SpecialForm::Tuple,
        SpecialForm::Union,
        SpecialForm::Optional,
        SpecialForm::ClassVar,
        SpecialForm::Generic,
        SpecialForm::Protocol,
        SpecialForm::Type,
        SpecialForm::ChainMap,
        SpecialForm::Deque,
        SpecialForm::Counter,
        SpecialForm::DefaultDict,
        SpecialForm::Final,
        SpecialForm::Literal,
    ];
}

/// The ambient modules every file can import without stubs on disk.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SynthesizedModule {
    Builtins,
    Typing,
    Collections,
    Sys,
    Os,
}

impl SynthesizedModule {
    pub fn name(self) -> &'static str {
        match self {
            SynthesizedModule::Builtins => "builtins",
            SynthesizedModule::Typing => "typing",
            SynthesizedModule::Collections => "collections",
            SynthesizedModule::Sys => "sys",
            SynthesizedModule::Os => "os",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "builtins" => Some(Self::Builtins),
            "typing" => Some(Self::Typing),
            "collections" => Some(Self::Collections),
            "sys" => Some(Self::Sys),
            "os" => Some(Self::Os),
            _ => None,
        }
    }
}

/// Handles to the bootstrapped well-known types. Built once per program;
/// the backing arenas live under a reserved pseudo-file that is never
/// invalidated.
#[derive(Debug)]
pub struct BuiltinTypes {
    pub file: FileId,
    classes: FxHashMap<KnownClass, ClassTypeId>,
    functions: FxHashMap<KnownFunction, FunctionTypeId>,
    special_forms: FxHashMap<SpecialForm, ClassTypeId>,
}

impl BuiltinTypes {
    pub fn bootstrap(store: &TypeStore, files: &Files) -> Self {
        let file = files.intern(Path::new("<builtins>"));
        let mut classes = FxHashMap::default();

        // `object` first; everything else derives from it.
        let object = store.add_class(file, {
            let mut class = ClassType::new(Name::new_static("object"));
            class.flags = ClassFlags::BUILT_IN;
            class.known = Some(KnownClass::Object);
            class
        });
        classes.insert(KnownClass::Object, object);

        for known in KnownClass::ALL {
            if *known == KnownClass::Object {
                continue;
            }
            let mut class = ClassType::new(Name::new_static(known.name()));
            class.flags = ClassFlags::BUILT_IN;
            class.known = Some(*known);
            class.bases = vec![Type::Class(object)];
            let id = store.add_class(file, class);
            classes.insert(*known, id);
        }

        // Fix up the handful of non-object base classes.
        let patched: &[(KnownClass, KnownClass)] = &[
            (KnownClass::Bool, KnownClass::Int),
            (KnownClass::Exception, KnownClass::BaseException),
        ];
        for (sub, sup) in patched {
            let sub_id = classes[sub];
            let mut class = store.class(sub_id);
            class.bases = vec![Type::Class(classes[sup])];
            let rebased = store.add_class(file, class);
            classes.insert(*sub, rebased);
        }

        let instance = |known: KnownClass| Type::Object(classes[&known]);

        let mut functions = FxHashMap::default();
        let simple = |name: &'static str,
                      known: KnownFunction,
                      params: Vec<FunctionParameter>,
                      returns: Type| {
            let mut function = FunctionType::new(Name::new_static(name));
            function.known = Some(known);
            function.params = params;
            function.declared_return = Some(returns);
            function
        };
        let param = |name: &'static str| FunctionParameter {
            category: ParameterCategory::Simple,
            name: Some(Name::new_static(name)),
            ty: Type::Any,
            has_default: false,
        };
        let var_args = || FunctionParameter {
            category: ParameterCategory::VarArgList,
            name: Some(Name::new_static("args")),
            ty: Type::Any,
            has_default: false,
        };

        functions.insert(
            KnownFunction::IsInstance,
            store.add_function(
                file,
                simple(
                    "isinstance",
                    KnownFunction::IsInstance,
                    vec![param("obj"), param("class_or_tuple")],
                    instance(KnownClass::Bool),
                ),
            ),
        );
        functions.insert(
            KnownFunction::IsSubclass,
            store.add_function(
                file,
                simple(
                    "issubclass",
                    KnownFunction::IsSubclass,
                    vec![param("cls"), param("class_or_tuple")],
                    instance(KnownClass::Bool),
                ),
            ),
        );
        functions.insert(
            KnownFunction::Len,
            store.add_function(
                file,
                simple(
                    "len",
                    KnownFunction::Len,
                    vec![param("obj")],
                    instance(KnownClass::Int),
                ),
            ),
        );
        functions.insert(
            KnownFunction::Repr,
            store.add_function(
                file,
                simple(
                    "repr",
                    KnownFunction::Repr,
                    vec![param("obj")],
                    instance(KnownClass::Str),
                ),
            ),
        );
        functions.insert(
            KnownFunction::Print,
            store.add_function(
                file,
                simple(
                    "print",
                    KnownFunction::Print,
                    vec![var_args()],
                    Type::None,
                ),
            ),
        );
        functions.insert(
            KnownFunction::NamedTuple,
            store.add_function(
                file,
                simple(
                    "namedtuple",
                    KnownFunction::NamedTuple,
                    vec![param("typename"), param("field_names")],
                    Type::Unknown,
                ),
            ),
        );
        functions.insert(
            KnownFunction::TypeVarFactory,
            store.add_function(
                file,
                simple(
                    "TypeVar",
                    KnownFunction::TypeVarFactory,
                    vec![param("name")],
                    Type::Unknown,
                ),
            ),
        );

        let mut special_forms = FxHashMap::default();
        for form in SpecialForm::ALL {
            let mut class = ClassType::new(Name::new_static(form.name()));
            class.flags = ClassFlags::BUILT_IN | ClassFlags::SPECIAL_BUILT_IN;
            class.special_form = Some(*form);
            class.bases = vec![Type::Class(object)];
            special_forms.insert(*form, store.add_class(file, class));
        }

        Self {
            file,
            classes,
            functions,
            special_forms,
        }
    }

    pub fn class_id(&self, known: KnownClass) -> ClassTypeId {
        self.classes[&known]
    }

    pub fn class_type(&self, known: KnownClass) -> Type {
        Type::Class(self.classes[&known])
    }

    pub fn instance(&self, known: KnownClass) -> Type {
        Type::Object(self.classes[&known])
    }

    pub fn function(&self, known: KnownFunction) -> Type {
        Type::Function(self.functions[&known])
    }

    pub fn special_form_class(&self, form: SpecialForm) -> Type {
        Type::Class(self.special_forms[&form])
    }

    /// The type bound to an ambient builtin-scope name, when the checker
    /// models it; other allow-listed names evaluate to `Unknown`.
    pub fn builtin_symbol(&self, name: &str) -> Option<Type> {
        if let Some(known) = KnownClass::ALL
            .iter()
            .find(|known| known.name() == name && !matches!(known, KnownClass::NoneType))
        {
            return Some(self.class_type(*known));
        }
        let function = match name {
            "isinstance" => KnownFunction::IsInstance,
            "issubclass" => KnownFunction::IsSubclass,
            "len" => KnownFunction::Len,
            "repr" => KnownFunction::Repr,
            "print" => KnownFunction::Print,
            _ => {
                return match name {
                    "NotImplemented" => Some(self.instance(KnownClass::Object)),
                    "__debug__" => Some(self.instance(KnownClass::Bool)),
                    "__name__" | "__file__" | "__doc__" | "__package__" | "__qualname__"
                    | "__module__" => Some(self.instance(KnownClass::Str)),
                    "__dict__" => Some(self.instance(KnownClass::Dict)),
                    "__class__" => Some(self.class_type(KnownClass::Object)),
                    _ => None,
                }
            }
        };
        Some(self.function(function))
    }

    /// Member lookup for the synthesized ambient modules.
    pub fn synthesized_member(&self, module: SynthesizedModule, name: &str) -> Option<Type> {
        match module {
            SynthesizedModule::Builtins => self.builtin_symbol(name),
            SynthesizedModule::Typing => self.typing_member(name),
            SynthesizedModule::Collections => self.collections_member(name),
            SynthesizedModule::Sys => self.sys_member(name),
            SynthesizedModule::Os => self.os_member(name),
        }
    }

    fn typing_member(&self, name: &str) -> Option<Type> {
        if let Some(form) = SpecialForm::ALL.iter().find(|form| form.name() == name) {
            return Some(self.special_form_class(*form));
        }
        match name {
            "TypeVar" => Some(self.function(KnownFunction::TypeVarFactory)),
            "NamedTuple" => Some(self.function(KnownFunction::NamedTuple)),
            "TYPE_CHECKING" => Some(self.instance(KnownClass::Bool)),
            "Any" => Some(Type::Any),
            "Text" => Some(self.class_type(KnownClass::Str)),
            "overload" | "cast" | "no_type_check" | "runtime_checkable" => Some(Type::Unknown),
            _ => None,
        }
    }

    fn collections_member(&self, name: &str) -> Option<Type> {
        match name {
            "namedtuple" => Some(self.function(KnownFunction::NamedTuple)),
            "deque" => Some(self.class_type(KnownClass::Deque)),
            "defaultdict" => Some(self.class_type(KnownClass::DefaultDict)),
            "OrderedDict" => Some(self.class_type(KnownClass::OrderedDict)),
            "Counter" => Some(self.class_type(KnownClass::Counter)),
            "ChainMap" => Some(self.class_type(KnownClass::ChainMap)),
            _ => None,
        }
    }

    fn sys_member(&self, name: &str) -> Option<Type> {
        match name {
            "version_info" => Some(self.instance(KnownClass::Tuple)),
            "platform" | "prefix" | "exec_prefix" | "executable" => {
                Some(self.instance(KnownClass::Str))
            }
            "path" | "argv" => Some(self.instance(KnownClass::List)),
            "maxsize" => Some(self.instance(KnownClass::Int)),
            "modules" => Some(self.instance(KnownClass::Dict)),
            "stdout" | "stderr" | "stdin" => Some(self.instance(KnownClass::Object)),
            _ => None,
        }
    }

    fn os_member(&self, name: &str) -> Option<Type> {
        match name {
            "name" | "sep" | "linesep" | "curdir" | "pardir" => {
                Some(self.instance(KnownClass::Str))
            }
            "environ" => Some(self.instance(KnownClass::Dict)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BuiltinTypes, KnownClass, SpecialForm, SynthesizedModule};
    use crate::files::Files;
    use crate::types::{Type, TypeStore};

    #[test]
    fn bootstrap_wires_base_classes() {
        let store = TypeStore::default();
        let files = Files::default();
        let builtins = BuiltinTypes::bootstrap(&store, &files);

        let bool_id = builtins.class_id(KnownClass::Bool);
        let int_id = builtins.class_id(KnownClass::Int);
        let object_id = builtins.class_id(KnownClass::Object);
        assert!(store.is_derived_from(bool_id, int_id));
        assert!(store.is_derived_from(bool_id, object_id));
        assert!(!store.is_derived_from(int_id, bool_id));
    }

    #[test]
    fn typing_members_resolve() {
        let store = TypeStore::default();
        let files = Files::default();
        let builtins = BuiltinTypes::bootstrap(&store, &files);

        let optional = builtins
            .synthesized_member(SynthesizedModule::Typing, "Optional")
            .unwrap();
        let Type::Class(class) = optional else {
            panic!("Optional should be a class");
        };
        assert_eq!(store.class_special_form(class), Some(SpecialForm::Optional));
        assert_eq!(
            builtins.synthesized_member(SynthesizedModule::Typing, "Any"),
            Some(Type::Any)
        );
        assert_eq!(
            builtins.synthesized_member(SynthesizedModule::Typing, "NoSuchThing"),
            None
        );
    }
}
