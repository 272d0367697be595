//! Match typing and exhaustiveness. Coverage is judged per scrutinee shape:
//! enums by variant set, modals by state set, unions by member set, anything
//! else by the presence of an irrefutable arm.

use super::super::pattern::{irrefutable_pattern, paths_agree, type_pattern};
use super::super::scope_context::{ScopeContext, ScopeKind, TypeDeclEntry};
use super::super::statement::{StmtTypeContext, TypeBinding, TypeEnv};
use super::{check_expr, infer_expr};
use crate::ast::*;
use crate::error::*;
use crate::ident::id_key;
use crate::span::Span;
use crate::types::{type_equiv, Type};
use std::collections::HashSet;

pub fn type_match_expr(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    expr: &Expr,
    value: &Expr,
    arms: &[MatchArm],
    expected: Option<&Type>,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];

    let scrutinee_ty = check!(
        infer_expr(ctx, tcx, env, value),
        Type::ErrorRecovery,
        warnings,
        errors
    );

    let mut arm_ty: Option<Type> = None;
    for arm in arms {
        env.push_scope();
        ctx.push_scope(ScopeKind::Local);
        let bindings = type_pattern(ctx, &tcx.generics, &arm.pattern, &scrutinee_ty)
            .settle(&mut warnings, &mut errors)
            .unwrap_or_default();
        for (name, ty) in bindings {
            env.insert(
                name.key().clone(),
                TypeBinding {
                    mutability: Mutability::Let,
                    ty,
                },
            );
        }
        if let Some(guard) = &arm.guard {
            let _ = check_expr(ctx, tcx, env, guard, &Type::bool())
                .settle(&mut warnings, &mut errors);
        }
        let body_res = match expected {
            Some(expected) => check_expr(ctx, tcx, env, &arm.body, expected),
            None => infer_expr(ctx, tcx, env, &arm.body),
        };
        let body_ty = body_res
            .settle(&mut warnings, &mut errors)
            .unwrap_or(Type::ErrorRecovery);
        ctx.pop_scope();
        env.pop_scope();

        if expected.is_none() {
            match &arm_ty {
                None => arm_ty = Some(body_ty),
                Some(existing) => {
                    // `!`-typed arms (diverging bodies) join into anything.
                    if existing.is_never() {
                        arm_ty = Some(body_ty);
                    } else if !body_ty.is_never() && !type_equiv(existing, &body_ty) {
                        errors.push(CompileError::MatchArmTypeMismatch {
                            first: existing.friendly_type_str(),
                            second: body_ty.friendly_type_str(),
                            span: arm.span.clone(),
                        });
                    }
                }
            }
        }
    }

    check_exhaustiveness(ctx, &scrutinee_ty, arms, &expr.span, &mut errors);

    let result = match expected {
        Some(expected) => expected.clone(),
        None => arm_ty.unwrap_or_else(Type::unit),
    };
    if errors.is_empty() {
        recovered(result, warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

fn check_exhaustiveness(
    ctx: &ScopeContext,
    scrutinee_ty: &Type,
    arms: &[MatchArm],
    span: &Span,
    errors: &mut Vec<CompileError>,
) {
    let stripped = scrutinee_ty.strip_perm();
    if stripped.is_error_recovery() {
        return;
    }

    // A guard-free irrefutable arm covers everything, whatever the shape.
    let has_irrefutable = arms
        .iter()
        .any(|arm| arm.guard.is_none() && irrefutable_pattern(ctx, &arm.pattern, scrutinee_ty));
    if has_irrefutable {
        return;
    }

    match stripped {
        Type::Path { path, .. } => match ctx.lookup_type_decl(path) {
            Some(TypeDeclEntry::Enum(decl)) => {
                let mut covered: HashSet<String> = HashSet::new();
                for arm in arms {
                    if arm.guard.is_some() {
                        continue;
                    }
                    if let PatternKind::Enum {
                        path: arm_path,
                        variant,
                        ..
                    } = &arm.pattern.kind
                    {
                        if paths_agree(ctx, arm_path, path) {
                            covered.insert(variant.key().clone());
                        }
                    }
                }
                let missing: Vec<String> = decl
                    .variants
                    .iter()
                    .filter(|variant| !covered.contains(variant.name.key()))
                    .map(|variant| variant.name.name.clone())
                    .collect();
                if !missing.is_empty() {
                    errors.push(CompileError::MatchEnumNonExhaustive {
                        ty: stripped.friendly_type_str(),
                        missing: missing.join(", "),
                        span: span.clone(),
                    });
                }
            }
            Some(TypeDeclEntry::Modal(decl)) => {
                let mut covered: HashSet<String> = HashSet::new();
                for arm in arms {
                    if arm.guard.is_some() {
                        continue;
                    }
                    if let PatternKind::Modal { state, .. } = &arm.pattern.kind {
                        covered.insert(state.key().clone());
                    }
                }
                let missing: Vec<String> = decl
                    .states
                    .iter()
                    .filter(|state| !covered.contains(state.name.key()))
                    .map(|state| state.name.name.clone())
                    .collect();
                if !missing.is_empty() {
                    errors.push(CompileError::MatchModalNonExhaustive {
                        ty: stripped.friendly_type_str(),
                        missing: missing.join(", "),
                        span: span.clone(),
                    });
                }
            }
            _ => {
                errors.push(CompileError::MatchNoIrrefutableArm { span: span.clone() });
            }
        },
        Type::ModalState { state, .. } => {
            // Pinned-state scrutinee: its own state must be covered.
            let covered = arms.iter().any(|arm| {
                arm.guard.is_none()
                    && matches!(
                        &arm.pattern.kind,
                        PatternKind::Modal { state: arm_state, .. }
                            if *arm_state.key() == id_key(state)
                    )
            });
            if !covered {
                errors.push(CompileError::MatchModalNonExhaustive {
                    ty: stripped.friendly_type_str(),
                    missing: state.clone(),
                    span: span.clone(),
                });
            }
        }
        Type::Union(members) => {
            let mut missing: Vec<String> = vec![];
            for member in members {
                let covered = arms.iter().any(|arm| {
                    if arm.guard.is_some() {
                        return false;
                    }
                    match &arm.pattern.kind {
                        PatternKind::Typed { ty, .. } => {
                            let mut warnings = vec![];
                            let mut errs = vec![];
                            super::super::type_resolution::resolve_type_expr(
                                ctx,
                                ty,
                                &Default::default(),
                            )
                            .settle(&mut warnings, &mut errs)
                            .map(|resolved| type_equiv(&resolved, member))
                            .unwrap_or(false)
                        }
                        _ => false,
                    }
                });
                if !covered {
                    missing.push(member.friendly_type_str());
                }
            }
            if !missing.is_empty() {
                errors.push(CompileError::MatchUnionNonExhaustive {
                    ty: stripped.friendly_type_str(),
                    missing: missing.join(", "),
                    span: span.clone(),
                });
            }
        }
        _ => {
            errors.push(CompileError::MatchNoIrrefutableArm { span: span.clone() });
        }
    }
}
