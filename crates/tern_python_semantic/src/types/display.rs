use std::fmt;

use crate::types::{ModuleType, Type, TypeStore};

/// Human-readable rendering of a type against its store.
#[derive(Copy, Clone)]
pub struct DisplayType<'a> {
    ty: Type,
    store: &'a TypeStore,
}

impl<'a> DisplayType<'a> {
    pub(crate) fn new(ty: Type, store: &'a TypeStore) -> Self {
        Self { ty, store }
    }
}

impl fmt::Display for DisplayType<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.store;
        match self.ty {
            Type::Unknown => f.write_str("Unknown"),
            Type::Unbound => f.write_str("Unbound"),
            Type::Any => f.write_str("Any"),
            Type::None => f.write_str("None"),
            Type::Never => f.write_str("Never"),
            Type::Ellipsis => f.write_str("ellipsis"),
            Type::Class(class) => {
                write!(f, "Type[{}]", store.class_name(class))?;
                if let Some(args) = store.class_type_args(class) {
                    display_type_args(f, store, &args)?;
                }
                Ok(())
            }
            Type::Object(class) => {
                write!(f, "{}", store.class_name(class))?;
                if let Some(args) = store.class_type_args(class) {
                    display_type_args(f, store, &args)?;
                }
                Ok(())
            }
            Type::Function(function) => {
                write!(f, "{}", store.function(function).name)
            }
            Type::Overloaded(overloaded) => {
                let overloads = store.overloads(overloaded);
                match overloads.first() {
                    Some(first) => write!(
                        f,
                        "Overload[{}]",
                        store.function(*first).name
                    ),
                    None => f.write_str("Overload[]"),
                }
            }
            Type::Property(_) => f.write_str("property"),
            Type::Module(ModuleType::File(_)) => f.write_str("Module"),
            Type::Module(ModuleType::Synthesized(module)) => {
                write!(f, "Module(\"{}\")", module.name())
            }
            Type::Tuple(tuple) => {
                f.write_str("Tuple[")?;
                let elements = store.tuple_elements(tuple);
                if elements.is_empty() {
                    f.write_str("()")?;
                }
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", element.display(store))?;
                }
                f.write_str("]")
            }
            Type::TypeVar(type_var) => {
                write!(f, "{}", store.type_var(type_var).name)
            }
            Type::Union(union) => {
                let elements = store.union_elements(union);
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{}", element.display(store))?;
                }
                Ok(())
            }
        }
    }
}

fn display_type_args(
    f: &mut fmt::Formatter<'_>,
    store: &TypeStore,
    args: &[Type],
) -> fmt::Result {
    f.write_str("[")?;
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", arg.display(store))?;
    }
    f.write_str("]")
}
