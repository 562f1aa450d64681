//! Flow-sensitive narrowing: building type constraints from `if`/`while`
//! tests and applying them at use sites.
//!
//! A constraint targets a *supported expression*, a name or a chain of
//! member accesses bottoming at a name, and records the type the
//! expression has within the constrained scope's extent. Matching is
//! structural on the chain, never on node identity.

use rustpython_ast as ast;
use smallvec::SmallVec;

use crate::builtins::KnownFunction;
use crate::name::Name;
use crate::types::builder::{filter_union, union_of, UnionBuilder};
use crate::types::infer::TypeEvaluator;
use crate::types::{Type, TypeStore};

/// A name or member-access chain bottoming at a name: `x`, `a.b.c`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SupportedExpr(SmallVec<[Name; 2]>);

impl SupportedExpr {
    /// Builds the chain when the expression has a supported shape.
    pub fn from_expr(expr: &ast::Expr) -> Option<Self> {
        let mut parts = SmallVec::new();
        collect_chain(expr, &mut parts)?;
        Some(Self(parts))
    }

    pub fn parts(&self) -> &[Name] {
        &self.0
    }
}

fn collect_chain(expr: &ast::Expr, into: &mut SmallVec<[Name; 2]>) -> Option<()> {
    match expr {
        ast::Expr::Name(name) => {
            into.push(Name::new(name.id.as_str()));
            Some(())
        }
        ast::Expr::Attribute(attribute) => {
            collect_chain(&attribute.value, into)?;
            into.push(Name::new(attribute.attr.as_str()));
            Some(())
        }
        _ => None,
    }
}

/// A narrowing recorded on a temporary scope: within the scope's extent,
/// `target` has type `ty`.
#[derive(Clone, Debug)]
pub struct NarrowingConstraint {
    pub target: SupportedExpr,
    pub ty: Type,
    /// Produced by a join of conditional branches rather than a test or
    /// an unconditional assignment.
    pub conditional: bool,
}

impl NarrowingConstraint {
    pub fn new(target: SupportedExpr, ty: Type) -> Self {
        Self {
            target,
            ty,
            conditional: false,
        }
    }
}

/// Builds the `(if, else)` constraint pair a test expression implies.
pub(crate) fn build_constraints<'db>(
    evaluator: &mut TypeEvaluator<'db>,
    test: &'db ast::Expr,
) -> (Vec<NarrowingConstraint>, Vec<NarrowingConstraint>) {
    let mut positive = Vec::new();
    let mut negative = Vec::new();
    build_into(evaluator, test, true, &mut positive);
    build_into(evaluator, test, false, &mut negative);
    (positive, negative)
}

fn build_into<'db>(
    evaluator: &mut TypeEvaluator<'db>,
    test: &'db ast::Expr,
    sense: bool,
    out: &mut Vec<NarrowingConstraint>,
) {
    match test {
        ast::Expr::UnaryOp(ast::ExprUnaryOp {
            op: ast::UnaryOp::Not,
            operand,
            ..
        }) => build_into(evaluator, operand, !sense, out),
        ast::Expr::BoolOp(ast::ExprBoolOp { op, values, .. }) => {
            // `A and B` narrows the true branch by both operands; the
            // false branch learns nothing (either side may have failed).
            // `A or B` is the mirror image.
            let usable = match (op, sense) {
                (ast::BoolOp::And, true) | (ast::BoolOp::Or, false) => true,
                (ast::BoolOp::And, false) | (ast::BoolOp::Or, true) => false,
            };
            if usable {
                for value in values {
                    build_into(evaluator, value, sense, out);
                }
            }
        }
        ast::Expr::Compare(compare) => build_comparison(evaluator, compare, sense, out),
        ast::Expr::Call(call) => build_isinstance(evaluator, call, sense, out),
        ast::Expr::NamedExpr(named) => build_into(evaluator, &named.value, sense, out),
        _ => build_truthiness(evaluator, test, sense, out),
    }
}

/// `X is None`, `X is not None`, and `type(X) is C`.
fn build_comparison<'db>(
    evaluator: &mut TypeEvaluator<'db>,
    compare: &'db ast::ExprCompare,
    sense: bool,
    out: &mut Vec<NarrowingConstraint>,
) {
    let [op] = compare.ops.as_slice() else {
        return;
    };
    let [right] = compare.comparators.as_slice() else {
        return;
    };
    let positive = match (op, sense) {
        (ast::CmpOp::Is, sense) => sense,
        (ast::CmpOp::IsNot, sense) => !sense,
        _ => return,
    };

    if is_none_literal(right) {
        // `X is None` / `X is not None`.
        let Some(target) = SupportedExpr::from_expr(&compare.left) else {
            return;
        };
        let current = evaluator.chain_type(&target);
        let store = evaluator.store();
        let narrowed = if positive {
            narrow_to_none(store, evaluator.builtins_file(), current)
        } else {
            remove_none(store, evaluator.builtins_file(), current)
        };
        out.push(NarrowingConstraint::new(target, narrowed));
        return;
    }

    // `type(X) is C`: narrow the alternatives whose class is the same
    // generic class as `C`.
    let ast::Expr::Call(call) = &*compare.left else {
        return;
    };
    if !is_name(&call.func, "type") || call.args.len() != 1 {
        return;
    }
    let Some(target) = SupportedExpr::from_expr(&call.args[0]) else {
        return;
    };
    let filter = evaluator.expr_type(right);
    let Type::Class(filter_class) = filter else {
        return;
    };
    let current = evaluator.chain_type(&target);
    let store = evaluator.store();
    let file = evaluator.builtins_file();
    let narrowed = filter_union(store, file, current, |alternative| {
        let same = matches!(
            alternative,
            Type::Object(class) if store.is_same_generic_class(class, filter_class)
        );
        if positive {
            same
        } else {
            !same
        }
    });
    out.push(NarrowingConstraint::new(target, narrowed));
}

/// `isinstance(X, C)` and `isinstance(X, (C1, C2, ...))`.
fn build_isinstance<'db>(
    evaluator: &mut TypeEvaluator<'db>,
    call: &'db ast::ExprCall,
    sense: bool,
    out: &mut Vec<NarrowingConstraint>,
) {
    let func_ty = evaluator.expr_type(&call.func);
    let Type::Function(function) = func_ty else {
        return;
    };
    if evaluator.store().function_known(function) != Some(KnownFunction::IsInstance)
        || !call.keywords.is_empty()
        || call.args.len() != 2
    {
        return;
    }
    let Some(target) = SupportedExpr::from_expr(&call.args[0]) else {
        return;
    };

    let filter_ty = evaluator.expr_type(&call.args[1]);
    let current = evaluator.chain_type(&target);
    let file = evaluator.builtins_file();
    let store = evaluator.store();
    let mut filters = Vec::new();
    match filter_ty {
        Type::Class(class) => filters.push(class),
        Type::Tuple(tuple) => {
            for element in store.tuple_elements(tuple) {
                if let Type::Class(class) = element {
                    filters.push(class);
                }
            }
        }
        _ => return,
    }
    if filters.is_empty() {
        return;
    }

    let narrowed = if sense {
        match current {
            // A dynamic value narrows to the filters themselves.
            Type::Any | Type::Unknown => {
                union_of(store, file, filters.iter().map(|class| Type::Object(*class)))
            }
            _ => {
                let mut builder = UnionBuilder::new(store, file);
                for alternative in alternatives(store, current) {
                    match alternative {
                        Type::Object(class) => {
                            if let Some(kept) = narrow_alternative(store, class, &filters) {
                                builder = builder.add(kept);
                            }
                        }
                        Type::Any => builder = builder.add(Type::Any),
                        _ => {}
                    }
                }
                builder.build()
            }
        }
    } else {
        filter_union(store, file, current, |alternative| match alternative {
            Type::Object(class) => !filters
                .iter()
                .any(|filter| store.is_derived_from(class, *filter)),
            _ => true,
        })
    };
    out.push(NarrowingConstraint::new(target, narrowed));
}

/// Positive branch: the alternative survives if its class derives from a
/// filter; when a filter is a proper subclass of the alternative, the
/// alternative narrows *to* the filter.
fn narrow_alternative(
    store: &TypeStore,
    class: crate::types::ClassTypeId,
    filters: &[crate::types::ClassTypeId],
) -> Option<Type> {
    for filter in filters {
        if store.is_derived_from(class, *filter) {
            return Some(Type::Object(class));
        }
        if store.is_derived_from(*filter, class) {
            return Some(Type::Object(*filter));
        }
    }
    None
}

/// Truthiness of a bare name or member chain: the truthy branch keeps
/// only truthy-capable alternatives, the falsy branch only falsy-capable
/// ones.
fn build_truthiness<'db>(
    evaluator: &mut TypeEvaluator<'db>,
    test: &'db ast::Expr,
    sense: bool,
    out: &mut Vec<NarrowingConstraint>,
) {
    let Some(target) = SupportedExpr::from_expr(test) else {
        return;
    };
    let current = evaluator.chain_type(&target);
    let store = evaluator.store();
    let file = evaluator.builtins_file();
    let narrowed = filter_union(store, file, current, |alternative| {
        if sense {
            alternative.can_be_truthy(store)
        } else {
            alternative.can_be_falsy(store)
        }
    });
    out.push(NarrowingConstraint::new(target, narrowed));
}

fn alternatives(store: &TypeStore, ty: Type) -> Vec<Type> {
    match ty {
        Type::Union(union) => store.union_elements(union),
        _ => vec![ty],
    }
}

fn is_none_literal(expr: &ast::Expr) -> bool {
    matches!(
        expr,
        ast::Expr::Constant(ast::ExprConstant {
            value: ast::Constant::None,
            ..
        })
    )
}

fn is_name(expr: &ast::Expr, name: &str) -> bool {
    matches!(expr, ast::Expr::Name(node) if node.id.as_str() == name)
}

/// `X is None`: `None` retained from a union; a type that cannot be
/// `None` narrows to `Never`; `Any` survives.
pub(crate) fn narrow_to_none(store: &TypeStore, file: crate::files::FileId, ty: Type) -> Type {
    filter_union(store, file, ty, |alternative| alternative == Type::None)
}

/// `X is not None`: `None` removed from a union; a bare `None` becomes
/// `Never`; `Any` survives.
pub(crate) fn remove_none(store: &TypeStore, file: crate::files::FileId, ty: Type) -> Type {
    filter_union(store, file, ty, |alternative| alternative != Type::None)
}

#[cfg(test)]
mod tests {
    use super::{narrow_to_none, remove_none};
    use crate::files::Files;
    use crate::types::builder::union_of;
    use crate::types::{Type, TypeStore};
    use std::path::Path;

    #[test]
    fn none_narrowing_on_unions() {
        let files = Files::default();
        let file = files.intern(Path::new("/src/a.py"));
        let store = TypeStore::default();

        let optional = union_of(&store, file, [Type::Ellipsis, Type::None]);
        assert_eq!(narrow_to_none(&store, file, optional), Type::None);
        assert_eq!(remove_none(&store, file, optional), Type::Ellipsis);

        // Narrowing `None` away from plain `None` leaves `Never`.
        assert_eq!(remove_none(&store, file, Type::None), Type::Never);
        // `Any` survives both branches.
        assert_eq!(narrow_to_none(&store, file, Type::Any), Type::Any);
        assert_eq!(remove_none(&store, file, Type::Any), Type::Any);
    }
}
