use super::{Permission, Primitive, Type};
use crate::semantic_analysis::scope_context::TypeDeclEntry;
use crate::semantic_analysis::ScopeContext;
use std::collections::HashSet;

/// `e as T` is restricted to explicit numeric primitive pairs; everything
/// else must go through constructors or `transmute`.
pub fn cast_valid(from: &Type, to: &Type) -> bool {
    match (from.as_prim(), to.as_prim()) {
        (Some(from), Some(to)) => from.is_numeric() && to.is_numeric(),
        _ => false,
    }
}

/// Whether a numeric cast can drop information, for the precision warning.
pub fn cast_loses_precision(from: Primitive, to: Primitive) -> bool {
    if from.is_float() && to.is_integer() {
        return true;
    }
    if from.is_float() && to.is_float() {
        return float_rank(from) > float_rank(to);
    }
    if from.is_integer() && to.is_float() {
        return false;
    }
    match (from.integer_bits(), to.integer_bits()) {
        (Some(from_bits), Some(to_bits)) => {
            from_bits > to_bits || (from_bits == to_bits && from.is_signed_integer() != to.is_signed_integer())
        }
        // Pointer-sized operands: conservatively silent.
        _ => false,
    }
}

fn float_rank(prim: Primitive) -> u32 {
    match prim {
        Primitive::F16 => 16,
        Primitive::F32 => 32,
        Primitive::F64 => 64,
        _ => 0,
    }
}

/// The structural `Bitcopy` predicate gating `transmute`: plain bit patterns
/// only, no permissions, no checked pointers, no managed sequences.
pub fn is_bitcopy(ctx: &ScopeContext, ty: &Type) -> bool {
    let mut visiting = HashSet::new();
    bitcopy_inner(ctx, ty, &mut visiting)
}

fn bitcopy_inner(ctx: &ScopeContext, ty: &Type, visiting: &mut HashSet<Vec<String>>) -> bool {
    use Type::*;
    match ty {
        Prim(prim) => !matches!(prim, Primitive::Never),
        Tuple(elements) => elements
            .iter()
            .all(|element| bitcopy_inner(ctx, element, visiting)),
        Array(element, _) => bitcopy_inner(ctx, element, visiting),
        RawPtr(..) => true,
        Union(members) => members
            .iter()
            .all(|member| bitcopy_inner(ctx, member, visiting)),
        Path { path, .. } => {
            if !visiting.insert(path.clone()) {
                // Recursive nominal type: a cycle through itself cannot be a
                // plain bit pattern.
                return false;
            }
            let result = match ctx.lookup_type_decl(path) {
                Some(TypeDeclEntry::Record(decl)) => decl.fields().all(|field| {
                    ctx.resolved_field_type(path, &field.name)
                        .map(|field_ty| bitcopy_inner(ctx, &field_ty, visiting))
                        .unwrap_or(false)
                }),
                _ => false,
            };
            visiting.remove(path);
            result
        }
        _ => false,
    }
}

/// Arrays coerce to slices with the outer permission preserved:
/// `Perm(p, Array(T, n))` becomes `Perm(p, Slice(T))`.
pub fn coerce_array_to_slice(ty: &Type) -> Option<Type> {
    match ty {
        Type::Array(element, _) => Some(Type::Slice(element.clone())),
        Type::Perm(perm, base) => {
            coerce_array_to_slice(base).map(|inner| Type::Perm(*perm, Box::new(inner)))
        }
        _ => None,
    }
}

/// Permissions never change the outcome of a bitcopy check other than by
/// being present at all.
pub fn strip_for_transmute(ty: &Type) -> Option<&Type> {
    match ty {
        Type::Perm(Permission::Const, base) => Some(base),
        Type::Perm(..) => None,
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Permission, Primitive, Type};

    #[test]
    fn casts_are_numeric_only() {
        assert!(cast_valid(
            &Type::Prim(Primitive::U8),
            &Type::Prim(Primitive::U64)
        ));
        assert!(cast_valid(
            &Type::Prim(Primitive::F64),
            &Type::Prim(Primitive::I32)
        ));
        assert!(!cast_valid(&Type::bool(), &Type::Prim(Primitive::U8)));
        assert!(!cast_valid(
            &Type::Str(None),
            &Type::Prim(Primitive::U8)
        ));
    }

    #[test]
    fn narrowing_detection() {
        assert!(cast_loses_precision(Primitive::U64, Primitive::U8));
        assert!(cast_loses_precision(Primitive::F64, Primitive::F32));
        assert!(!cast_loses_precision(Primitive::U8, Primitive::U64));
    }

    #[test]
    fn slice_coercion_preserves_permission() {
        let arr = Type::Perm(
            Permission::Const,
            Box::new(Type::Array(Box::new(Type::bool()), 3)),
        );
        let sliced = coerce_array_to_slice(&arr).unwrap();
        assert_eq!(
            sliced,
            Type::Perm(
                Permission::Const,
                Box::new(Type::Slice(Box::new(Type::bool())))
            )
        );
    }
}
