use super::equiv::type_equiv;
use super::{Permission, PtrState, Type};
use crate::error::{recovered, CompileError, CompileResult};
use crate::semantic_analysis::modal::modal_niche_eligible;
use crate::semantic_analysis::ScopeContext;
use crate::span::Span;

/// The subtyping lattice. `!` is bottom; permissions admit `unique <= const`;
/// unions widen by membership; modal states subsume into their modal only
/// when the layout treats the state tag as a niche.
pub fn is_subtype(ctx: &ScopeContext, sub: &Type, sup: &Type) -> bool {
    use Type::*;
    if sub.is_error_recovery() || sup.is_error_recovery() {
        return true;
    }
    if sub.is_never() {
        return true;
    }
    if type_equiv(sub, sup) {
        return true;
    }
    match (sub, sup) {
        (Perm(p1, t1), Perm(p2, t2)) => {
            let perm_ok = p1 == p2 || (*p1 == Permission::Unique && *p2 == Permission::Const);
            perm_ok && is_subtype(ctx, t1, t2)
        }
        (Tuple(subs), Tuple(sups)) => {
            subs.len() == sups.len()
                && subs
                    .iter()
                    .zip(sups.iter())
                    .all(|(s, u)| is_subtype(ctx, s, u))
        }
        (Array(s, n1), Array(u, n2)) => n1 == n2 && is_subtype(ctx, s, u),
        (Slice(s), Slice(u)) => is_subtype(ctx, s, u),
        (
            Func {
                params: p1,
                ret: r1,
            },
            Func {
                params: p2,
                ret: r2,
            },
        ) => {
            p1.len() == p2.len()
                && p1.iter().zip(p2.iter()).all(|(a, b)| {
                    // Contravariant in parameters; move modes must agree.
                    a.mode == b.mode && is_subtype(ctx, &b.ty, &a.ty)
                })
                && is_subtype(ctx, r1, r2)
        }
        (Ptr(t1, state1), Ptr(t2, state2)) => {
            type_equiv(t1, t2)
                && (state1 == state2 || (*state1 == Some(PtrState::Valid) && state2.is_none()))
        }
        // Union widening is by canonical membership, not recursive subtyping.
        (Union(subs), Union(sups)) => subs
            .iter()
            .all(|member| sups.iter().any(|candidate| type_equiv(member, candidate))),
        (_, Union(sups)) => sups.iter().any(|candidate| type_equiv(sub, candidate)),
        (
            Type::ModalState {
                path: sub_path,
                args: sub_args,
                ..
            },
            Type::Path {
                path: sup_path,
                args: sup_args,
            },
        ) => {
            sub_path == sup_path
                && sub_args.len() == sup_args.len()
                && sub_args
                    .iter()
                    .zip(sup_args.iter())
                    .all(|(a, b)| type_equiv(a, b))
                && modal_niche_eligible(ctx, sub_path)
        }
        // A refinement may always be forgotten.
        (Type::Refine { base, .. }, _) => is_subtype(ctx, base, sup),
        _ => false,
    }
}

/// Checks `sub <= sup` and reports the failure with the right diagnostic:
/// a modal state failing only on niche eligibility gets the dedicated
/// subsumption error, anything else the generic mismatch.
pub fn check_subtype(
    ctx: &ScopeContext,
    sub: &Type,
    sup: &Type,
    span: &Span,
    help: &str,
) -> CompileResult<()> {
    if is_subtype(ctx, sub, sup) {
        return recovered((), vec![], vec![]);
    }
    let error = match (sub, sup) {
        (
            Type::ModalState {
                path: sub_path,
                args: sub_args,
                ..
            },
            Type::Path {
                path: sup_path,
                args: sup_args,
            },
        ) if sub_path == sup_path
            && sub_args.len() == sup_args.len()
            && !modal_niche_eligible(ctx, sub_path) =>
        {
            CompileError::SubsumptionModalNonNiche {
                state_type: sub.friendly_type_str(),
                modal_type: sup.friendly_type_str(),
                span: span.clone(),
            }
        }
        _ => CompileError::TypeMismatch {
            expected: sup.friendly_type_str(),
            received: sub.friendly_type_str(),
            help: help.to_string(),
            span: span.clone(),
        },
    };
    CompileResult::from_error(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic_analysis::ScopeContext;
    use crate::types::Primitive;

    fn ctx() -> ScopeContext {
        ScopeContext::for_tests()
    }

    #[test]
    fn never_is_bottom() {
        let ctx = ctx();
        for sup in &[
            Type::bool(),
            Type::unit(),
            Type::Slice(Box::new(Type::Prim(Primitive::U8))),
            Type::union_of(vec![Type::bool(), Type::Prim(Primitive::I32)]),
        ] {
            assert!(is_subtype(&ctx, &Type::never(), sup));
        }
    }

    #[test]
    fn unique_weakens_to_const() {
        let ctx = ctx();
        let unique = Type::Perm(Permission::Unique, Box::new(Type::bool()));
        let konst = Type::Perm(Permission::Const, Box::new(Type::bool()));
        assert!(is_subtype(&ctx, &unique, &konst));
        assert!(!is_subtype(&ctx, &konst, &unique));
    }

    #[test]
    fn member_widens_into_union() {
        let ctx = ctx();
        let union = Type::union_of(vec![Type::bool(), Type::Prim(Primitive::I32)]);
        assert!(is_subtype(&ctx, &Type::bool(), &union));
        assert!(!is_subtype(&ctx, &Type::Prim(Primitive::U8), &union));
    }

    #[test]
    fn valid_pointer_weakens_to_unstated() {
        let ctx = ctx();
        let valid = Type::Ptr(Box::new(Type::bool()), Some(PtrState::Valid));
        let plain = Type::Ptr(Box::new(Type::bool()), None);
        assert!(is_subtype(&ctx, &valid, &plain));
        assert!(!is_subtype(&ctx, &plain, &valid));
    }

    #[test]
    fn no_implicit_numeric_widening() {
        let ctx = ctx();
        assert!(!is_subtype(
            &ctx,
            &Type::Prim(Primitive::U8),
            &Type::Prim(Primitive::U16)
        ));
    }
}
