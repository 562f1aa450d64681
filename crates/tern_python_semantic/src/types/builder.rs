//! Union construction.
//!
//! Invariants maintained here:
//!   * unions are flat: a union never contains another union;
//!   * elements are deduplicated, keeping first-seen order;
//!   * `Never` contributes nothing;
//!   * `Any` absorbs the whole union;
//!   * a union of one element is that element, a union of none is
//!     `Never`.
//!
//! Because of these invariants, [`UnionBuilder::build`] does not
//! necessarily produce a `Type::Union`.

use crate::files::FileId;
use crate::types::{Type, TypeStore};

pub struct UnionBuilder<'a> {
    store: &'a TypeStore,
    file: FileId,
    elements: Vec<Type>,
    saw_any: bool,
}

impl<'a> UnionBuilder<'a> {
    pub fn new(store: &'a TypeStore, file: FileId) -> Self {
        Self {
            store,
            file,
            elements: Vec::new(),
            saw_any: false,
        }
    }

    #[must_use]
    pub fn add(mut self, ty: Type) -> Self {
        match ty {
            Type::Union(union) => {
                for element in self.store.union_elements(union) {
                    self = self.add(element);
                }
            }
            Type::Never => {}
            Type::Any => self.saw_any = true,
            _ => {
                if !self.elements.contains(&ty) {
                    self.elements.push(ty);
                }
            }
        }
        self
    }

    pub fn build(self) -> Type {
        if self.saw_any {
            return Type::Any;
        }
        match self.elements.len() {
            0 => Type::Never,
            1 => self.elements[0],
            _ => Type::Union(self.store.add_union(self.file, self.elements)),
        }
    }
}

/// Joins an iterator of types into their union.
pub fn union_of(
    store: &TypeStore,
    file: FileId,
    types: impl IntoIterator<Item = Type>,
) -> Type {
    let mut builder = UnionBuilder::new(store, file);
    for ty in types {
        builder = builder.add(ty);
    }
    builder.build()
}

/// Removes the alternatives of `ty` that fail `keep`. A non-union type is
/// treated as a single alternative; narrowing everything away yields
/// `Never`. `Any` survives every filter.
pub fn filter_union(
    store: &TypeStore,
    file: FileId,
    ty: Type,
    mut keep: impl FnMut(Type) -> bool,
) -> Type {
    match ty {
        Type::Any | Type::Unknown => ty,
        Type::Union(union) => {
            let mut builder = UnionBuilder::new(store, file);
            for element in store.union_elements(union) {
                if element.is_any() || keep(element) {
                    builder = builder.add(element);
                }
            }
            builder.build()
        }
        _ => {
            if keep(ty) {
                ty
            } else {
                Type::Never
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{union_of, UnionBuilder};
    use crate::files::Files;
    use crate::types::{Type, TypeStore};
    use std::path::Path;

    fn setup() -> (TypeStore, crate::files::FileId) {
        let files = Files::default();
        let file = files.intern(Path::new("/src/a.py"));
        (TypeStore::default(), file)
    }

    #[test]
    fn empty_union_is_never() {
        let (store, file) = setup();
        assert_eq!(UnionBuilder::new(&store, file).build(), Type::Never);
    }

    #[test]
    fn single_element_collapses() {
        let (store, file) = setup();
        assert_eq!(union_of(&store, file, [Type::None]), Type::None);
    }

    #[test]
    fn never_is_dropped() {
        let (store, file) = setup();
        assert_eq!(
            union_of(&store, file, [Type::None, Type::Never]),
            Type::None
        );
    }

    #[test]
    fn any_absorbs() {
        let (store, file) = setup();
        assert_eq!(
            union_of(&store, file, [Type::None, Type::Any, Type::Ellipsis]),
            Type::Any
        );
    }

    #[test]
    fn nested_unions_flatten_and_dedup() {
        let (store, file) = setup();
        let inner = union_of(&store, file, [Type::None, Type::Ellipsis]);
        let outer = union_of(&store, file, [inner, Type::None, Type::Unknown]);
        let Type::Union(id) = outer else {
            panic!("expected a union, got {outer:?}");
        };
        assert_eq!(
            store.union_elements(id),
            vec![Type::None, Type::Ellipsis, Type::Unknown]
        );
    }
}
