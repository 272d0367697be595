//! Expression typing: the `Infer` and `Check` modes, mutually recursive
//! through every expression form. Every typed expression records its type in
//! the context's `expr -> type` map for downstream consumers.

mod call;
pub(crate) mod concurrency;
mod match_expr;

pub(crate) use call::{type_call, type_method_call};
pub(crate) use match_expr::type_match_expr;

use super::place::{deref_type, is_place_expr, place_info, project_field, project_tuple};
use super::scope_context::{EntityKind, ScopeContext};
use super::statement::{check_block, type_block, StmtTypeContext, TypeEnv};
use super::type_resolution::{resolve_type_expr, type_wf};
use crate::ast::*;
use crate::error::*;
use crate::ident::path_to_string;
use crate::types::casts::{cast_loses_precision, cast_valid, is_bitcopy, strip_for_transmute};
use crate::types::const_len::const_len;
use crate::types::subtyping::check_subtype;
use crate::types::{type_equiv, Primitive, PtrState, Type};

/// Infers the type of `expr`.
pub fn infer_expr(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    expr: &Expr,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let ty = check!(
        infer_expr_inner(ctx, tcx, env, expr),
        Type::ErrorRecovery,
        warnings,
        errors
    );
    ctx.record_expr_type(expr.id, ty.clone());
    if errors.is_empty() {
        recovered(ty, warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

/// Checks `expr` against `expected`, adopting the expectation where the form
/// allows it (numeric literals, null literals, branch expressions, empty
/// aggregates). Returns the expression's adopted type.
pub fn check_expr(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    expr: &Expr,
    expected: &Type,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let ty = check!(
        check_expr_inner(ctx, tcx, env, expr, expected),
        Type::ErrorRecovery,
        warnings,
        errors
    );
    ctx.record_expr_type(expr.id, ty.clone());
    if errors.is_empty() {
        recovered(ty, warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

fn check_expr_inner(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    expr: &Expr,
    expected: &Type,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let stripped = expected.strip_perm();

    match &expr.kind {
        ExprKind::NullLiteral => {
            let admissible = matches!(
                stripped,
                Type::Ptr(_, Some(PtrState::Null)) | Type::RawPtr(..)
            ) || stripped.is_error_recovery();
            if !admissible {
                errors.push(CompileError::TypeMismatch {
                    expected: expected.friendly_type_str(),
                    received: "null".into(),
                    help: "A null literal only checks against a null-state or raw pointer."
                        .into(),
                    span: expr.span.clone(),
                });
                return failed(warnings, errors);
            }
            recovered(expected.clone(), warnings, errors)
        }
        ExprKind::IntLiteral {
            value,
            suffix: None,
        } => match stripped.as_prim() {
            Some(prim) if prim.is_integer() => {
                if !prim.fits(*value) {
                    errors.push(CompileError::IntLiteralOutOfRange {
                        literal: value.to_string(),
                        ty: prim.name().into(),
                        span: expr.span.clone(),
                    });
                    return failed(warnings, errors);
                }
                recovered(Type::Prim(prim), warnings, errors)
            }
            _ => fallback_check(ctx, tcx, env, expr, expected),
        },
        ExprKind::FloatLiteral { suffix: None, .. } => match stripped.as_prim() {
            Some(prim) if prim.is_float() => recovered(Type::Prim(prim), warnings, errors),
            _ => fallback_check(ctx, tcx, env, expr, expected),
        },
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            check!(
                check_expr(ctx, tcx, env, cond, &Type::bool()),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            check!(
                check_expr(ctx, tcx, env, then_branch, expected),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            match else_branch {
                Some(else_branch) => {
                    check!(
                        check_expr(ctx, tcx, env, else_branch, expected),
                        Type::ErrorRecovery,
                        warnings,
                        errors
                    );
                }
                None => {
                    check!(
                        check_subtype(
                            ctx,
                            &Type::unit(),
                            expected,
                            &expr.span,
                            "An `if` without `else` produces `()`.",
                        ),
                        (),
                        warnings,
                        errors
                    );
                }
            }
            recovered(expected.clone(), warnings, errors)
        }
        ExprKind::Match { value, arms } => {
            let ty = check!(
                type_match_expr(ctx, tcx, env, expr, value, arms, Some(expected)),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            recovered(ty, warnings, errors)
        }
        ExprKind::Block(block) => {
            let (ty, _) = check!(
                check_block(ctx, tcx, env, block, expected),
                (Type::ErrorRecovery, Default::default()),
                warnings,
                errors
            );
            recovered(ty, warnings, errors)
        }
        ExprKind::UnsafeBlock(block) => {
            let unsafe_tcx = tcx.in_unsafe_block();
            let (ty, _) = check!(
                check_block(ctx, &unsafe_tcx, env, block, expected),
                (Type::ErrorRecovery, Default::default()),
                warnings,
                errors
            );
            recovered(ty, warnings, errors)
        }
        ExprKind::Tuple(elements) => match stripped {
            Type::Tuple(element_types) if element_types.len() == elements.len() => {
                let element_types = element_types.clone();
                for (element, element_ty) in elements.iter().zip(element_types.iter()) {
                    check!(
                        check_expr(ctx, tcx, env, element, element_ty),
                        Type::ErrorRecovery,
                        warnings,
                        errors
                    );
                }
                recovered(stripped.clone(), warnings, errors)
            }
            _ => fallback_check(ctx, tcx, env, expr, expected),
        },
        ExprKind::Array(elements) => match stripped {
            Type::Array(element_ty, len) => {
                let element_ty = element_ty.clone();
                if elements.len() as u64 != *len {
                    errors.push(CompileError::TypeMismatch {
                        expected: expected.friendly_type_str(),
                        received: format!("an array literal of {} elements", elements.len()),
                        help: "The literal's length must match the array type's length.".into(),
                        span: expr.span.clone(),
                    });
                    return failed(warnings, errors);
                }
                for element in elements {
                    check!(
                        check_expr(ctx, tcx, env, element, &element_ty),
                        Type::ErrorRecovery,
                        warnings,
                        errors
                    );
                }
                recovered(stripped.clone(), warnings, errors)
            }
            _ => fallback_check(ctx, tcx, env, expr, expected),
        },
        ExprKind::EnumLiteral {
            path,
            variant,
            payload,
        } => match stripped {
            Type::Path { args, .. } => {
                let args = args.clone();
                let ty = check!(
                    call::type_enum_literal(
                        ctx,
                        tcx,
                        env,
                        path,
                        variant,
                        payload.as_ref(),
                        &expr.span,
                        Some(&args)
                    ),
                    Type::ErrorRecovery,
                    warnings,
                    errors
                );
                check!(
                    check_subtype(
                        ctx,
                        &ty,
                        expected,
                        &expr.span,
                        "The enum literal does not fit what this position expects.",
                    ),
                    (),
                    warnings,
                    errors
                );
                recovered(ty, warnings, errors)
            }
            _ => fallback_check(ctx, tcx, env, expr, expected),
        },
        _ => fallback_check(ctx, tcx, env, expr, expected),
    }
}

fn fallback_check(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    expr: &Expr,
    expected: &Type,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let actual = check!(
        infer_expr(ctx, tcx, env, expr),
        Type::ErrorRecovery,
        warnings,
        errors
    );
    check!(
        check_subtype(
            ctx,
            &actual,
            expected,
            &expr.span,
            "This expression's type does not fit what the context expects.",
        ),
        return failed(warnings, errors),
        warnings,
        errors
    );
    recovered(actual, warnings, errors)
}

fn infer_expr_inner(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    expr: &Expr,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let span = &expr.span;

    let ty = match &expr.kind {
        ExprKind::Error => Type::ErrorRecovery,
        ExprKind::IntLiteral { value, suffix } => match suffix {
            Some(suffix) => match Primitive::from_name(suffix) {
                Some(prim) if prim.is_integer() => {
                    if !prim.fits(*value) {
                        errors.push(CompileError::IntLiteralOutOfRange {
                            literal: value.to_string(),
                            ty: prim.name().into(),
                            span: span.clone(),
                        });
                    }
                    Type::Prim(prim)
                }
                _ => {
                    errors.push(CompileError::UnknownPrimitive {
                        name: suffix.clone(),
                        span: span.clone(),
                    });
                    Type::ErrorRecovery
                }
            },
            None => {
                if !Primitive::I32.fits(*value) {
                    errors.push(CompileError::IntLiteralOutOfRange {
                        literal: value.to_string(),
                        ty: "i32".into(),
                        span: span.clone(),
                    });
                }
                Type::Prim(Primitive::I32)
            }
        },
        ExprKind::FloatLiteral { suffix, .. } => match suffix {
            Some(suffix) => match Primitive::from_name(suffix) {
                Some(prim) if prim.is_float() => Type::Prim(prim),
                _ => {
                    errors.push(CompileError::UnknownPrimitive {
                        name: suffix.clone(),
                        span: span.clone(),
                    });
                    Type::ErrorRecovery
                }
            },
            None => Type::Prim(Primitive::F64),
        },
        ExprKind::BoolLiteral(_) => Type::bool(),
        ExprKind::CharLiteral(_) => Type::Prim(Primitive::Char),
        ExprKind::StringLiteral(_) => Type::Str(Some(crate::types::SeqState::View)),
        ExprKind::NullLiteral => {
            errors.push(CompileError::NullLiteralNeedsContext { span: span.clone() });
            Type::ErrorRecovery
        }
        ExprKind::Identifier(name) => {
            if let Some(binding) = env.bind_of(name.key()) {
                binding.ty.clone()
            } else if let Some(decl) = ctx.lookup_static(&[], &name.name).cloned() {
                static_value_type(ctx, tcx, &decl, &mut warnings, &mut errors)
            } else if let Some(decl) = ctx.lookup_proc(&[], &name.name).cloned() {
                check!(
                    super::declaration::procedure_signature(ctx, &decl),
                    Type::ErrorRecovery,
                    warnings,
                    errors
                )
            } else {
                match ctx.lookup_entity(name.key()) {
                    Some(entity) if entity.kind != EntityKind::Value => {
                        errors.push(CompileError::NotAValue {
                            name: name.name.clone(),
                            what_it_is: entity.kind.friendly_name(),
                            span: name.span.clone(),
                        });
                        Type::ErrorRecovery
                    }
                    Some(entity) => {
                        // A value imported through `using`: chase the origin.
                        let origin = entity.origin.clone().unwrap_or_default();
                        resolve_module_value(ctx, tcx, &origin, name, &mut warnings, &mut errors)
                    }
                    None => {
                        errors.push(CompileError::UnknownName {
                            name: name.name.clone(),
                            span: name.span.clone(),
                        });
                        Type::ErrorRecovery
                    }
                }
            }
        }
        ExprKind::QualifiedName { path, name } => {
            resolve_module_value(ctx, tcx, path, name, &mut warnings, &mut errors)
        }
        ExprKind::EnumLiteral {
            path,
            variant,
            payload,
        } => check!(
            call::type_enum_literal(ctx, tcx, env, path, variant, payload.as_ref(), span, None),
            Type::ErrorRecovery,
            warnings,
            errors
        ),
        ExprKind::RecordLiteral {
            path,
            generic_args,
            state,
            fields,
        } => check!(
            call::type_record_literal(
                ctx,
                tcx,
                env,
                path,
                generic_args,
                state.as_ref(),
                fields,
                span
            ),
            Type::ErrorRecovery,
            warnings,
            errors
        ),
        ExprKind::Tuple(elements) => {
            if elements.is_empty() {
                Type::unit()
            } else {
                let mut element_types = Vec::with_capacity(elements.len());
                for element in elements {
                    element_types.push(check!(
                        infer_expr(ctx, tcx, env, element),
                        Type::ErrorRecovery,
                        warnings,
                        errors
                    ));
                }
                Type::Tuple(element_types)
            }
        }
        ExprKind::Array(elements) => {
            let mut iter = elements.iter();
            match iter.next() {
                None => {
                    errors.push(CompileError::TypeMismatch {
                        expected: "an array with at least one element".into(),
                        received: "an empty array literal".into(),
                        help: "Empty array literals need a checked context to supply the \
                               element type."
                            .into(),
                        span: span.clone(),
                    });
                    Type::ErrorRecovery
                }
                Some(first) => {
                    let first_ty = check!(
                        infer_expr(ctx, tcx, env, first),
                        Type::ErrorRecovery,
                        warnings,
                        errors
                    );
                    for element in iter {
                        let element_ty = check!(
                            infer_expr(ctx, tcx, env, element),
                            Type::ErrorRecovery,
                            warnings,
                            errors
                        );
                        if !type_equiv(&element_ty, &first_ty) {
                            errors.push(CompileError::TypeMismatch {
                                expected: first_ty.friendly_type_str(),
                                received: element_ty.friendly_type_str(),
                                help: "Array elements must all have the same type.".into(),
                                span: element.span.clone(),
                            });
                        }
                    }
                    Type::Array(Box::new(first_ty), elements.len() as u64)
                }
            }
        }
        ExprKind::ArrayRepeat { value, count } => {
            let element_ty = check!(
                infer_expr(ctx, tcx, env, value),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            let len = check!(
                const_len(ctx, count),
                return failed(warnings, errors),
                warnings,
                errors
            );
            Type::Array(Box::new(element_ty), len)
        }
        ExprKind::Sizeof(target) | ExprKind::Alignof(target) => {
            let resolved = check!(
                resolve_type_expr(ctx, target, &tcx.generics),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            check!(
                type_wf(ctx, &resolved, span),
                (),
                warnings,
                errors
            );
            Type::usize()
        }
        ExprKind::Range { lo, hi, .. } => {
            for endpoint in [lo, hi].iter().filter_map(|endpoint| endpoint.as_deref()) {
                check!(
                    check_expr(ctx, tcx, env, endpoint, &Type::usize()),
                    Type::ErrorRecovery,
                    warnings,
                    errors
                );
            }
            Type::Range
        }
        ExprKind::Binary { op, lhs, rhs } => {
            check!(
                type_binary(ctx, tcx, env, *op, lhs, rhs, span),
                Type::ErrorRecovery,
                warnings,
                errors
            )
        }
        ExprKind::Unary { op, value } => match op {
            UnaryOp::Not => {
                check!(
                    check_expr(ctx, tcx, env, value, &Type::bool()),
                    Type::ErrorRecovery,
                    warnings,
                    errors
                );
                Type::bool()
            }
            UnaryOp::Neg => {
                let ty = check!(
                    infer_expr(ctx, tcx, env, value),
                    Type::ErrorRecovery,
                    warnings,
                    errors
                );
                let admissible = ty
                    .as_prim()
                    .map(|prim| prim.is_signed_integer() || prim.is_float())
                    .unwrap_or_else(|| ty.is_error_recovery());
                if !admissible {
                    errors.push(CompileError::BinaryOpUndefined {
                        op: "-".into(),
                        ty: ty.friendly_type_str(),
                        span: span.clone(),
                    });
                }
                ty
            }
        },
        ExprKind::Cast { value, ty } => {
            let from = check!(
                infer_expr(ctx, tcx, env, value),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            let to = check!(
                resolve_type_expr(ctx, ty, &tcx.generics),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            if !from.is_error_recovery() && !to.is_error_recovery() {
                if !cast_valid(&from, &to) {
                    errors.push(CompileError::CastInvalid {
                        from: from.friendly_type_str(),
                        to: to.friendly_type_str(),
                        span: span.clone(),
                    });
                } else if let (Some(from_prim), Some(to_prim)) = (from.as_prim(), to.as_prim()) {
                    warn_unless(
                        !cast_loses_precision(from_prim, to_prim),
                        &mut warnings,
                        span.clone(),
                        Warning::LossOfPrecision {
                            initial_type: from.friendly_type_str(),
                            cast_to: to.friendly_type_str(),
                        }
                    );
                }
            }
            to
        }
        ExprKind::Deref(base) => {
            let base_ty = check!(
                infer_expr(ctx, tcx, env, base),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            check!(
                deref_type(ctx, tcx, &base_ty, span),
                Type::ErrorRecovery,
                warnings,
                errors
            )
        }
        ExprKind::AddressOf(place) => {
            if !is_place_expr(place) {
                errors.push(CompileError::AddressOfNonPlace { span: span.clone() });
                Type::ErrorRecovery
            } else {
                let info = check!(
                    place_info(ctx, tcx, env, place),
                    None,
                    warnings,
                    errors
                );
                match info {
                    Some(info) => Type::Ptr(Box::new(info.ty), Some(PtrState::Valid)),
                    None => Type::ErrorRecovery,
                }
            }
        }
        ExprKind::Move(place) => {
            if !is_place_expr(place) {
                errors.push(CompileError::MoveNonPlace { span: span.clone() });
                Type::ErrorRecovery
            } else {
                let info = check!(
                    place_info(ctx, tcx, env, place),
                    None,
                    warnings,
                    errors
                );
                match info {
                    Some(info) => info.ty,
                    None => Type::ErrorRecovery,
                }
            }
        }
        ExprKind::Alloc { region, value } => {
            match region {
                Some(region) => {
                    let known = tcx.regions.contains(region.key())
                        || env.bind_of(region.key()).is_some();
                    if !known {
                        errors.push(CompileError::UnknownRegion {
                            name: region.name.clone(),
                            span: region.span.clone(),
                        });
                    }
                }
                None => {
                    if tcx.regions.is_empty() {
                        errors.push(CompileError::AllocOutsideRegion { span: span.clone() });
                    }
                }
            }
            if tcx.parallel.map(|parallel| parallel.gpu).unwrap_or(false) {
                errors.push(CompileError::GpuHeapAlloc { span: span.clone() });
            }
            let value_ty = check!(
                infer_expr(ctx, tcx, env, value),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            Type::Ptr(Box::new(value_ty), Some(PtrState::Valid))
        }
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            check!(
                check_expr(ctx, tcx, env, cond, &Type::bool()),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            let then_ty = check!(
                infer_expr(ctx, tcx, env, then_branch),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            match else_branch {
                Some(else_branch) => {
                    let else_ty = check!(
                        infer_expr(ctx, tcx, env, else_branch),
                        Type::ErrorRecovery,
                        warnings,
                        errors
                    );
                    check!(
                        join_branch_types(&then_ty, &else_ty, span),
                        Type::ErrorRecovery,
                        warnings,
                        errors
                    )
                }
                None => {
                    if !then_ty.is_unit() && !then_ty.is_never() && !then_ty.is_error_recovery() {
                        errors.push(CompileError::TypeMismatch {
                            expected: "()".into(),
                            received: then_ty.friendly_type_str(),
                            help: "An `if` without `else` must produce `()`.".into(),
                            span: span.clone(),
                        });
                    }
                    Type::unit()
                }
            }
        }
        ExprKind::Match { value, arms } => check!(
            type_match_expr(ctx, tcx, env, expr, value, arms, None),
            Type::ErrorRecovery,
            warnings,
            errors
        ),
        ExprKind::Loop { body } => {
            let loop_tcx = tcx.in_loop();
            let (_, flow) = check!(
                type_block(ctx, &loop_tcx, env, body),
                (Type::ErrorRecovery, Default::default()),
                warnings,
                errors
            );
            check!(
                loop_result_type(&flow, true, span),
                Type::ErrorRecovery,
                warnings,
                errors
            )
        }
        ExprKind::While { cond, body } => {
            check!(
                check_expr(ctx, tcx, env, cond, &Type::bool()),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            let loop_tcx = tcx.in_loop();
            let (_, flow) = check!(
                type_block(ctx, &loop_tcx, env, body),
                (Type::ErrorRecovery, Default::default()),
                warnings,
                errors
            );
            check!(
                loop_result_type(&flow, false, span),
                Type::ErrorRecovery,
                warnings,
                errors
            )
        }
        ExprKind::For {
            pattern,
            iter,
            body,
        } => {
            let iter_ty = check!(
                infer_expr(ctx, tcx, env, iter),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            let element_ty = match iter_element_type(&iter_ty) {
                Some(element_ty) => element_ty,
                None => {
                    errors.push(CompileError::DispatchRangeExpected {
                        ty: iter_ty.friendly_type_str(),
                        span: iter.span.clone(),
                    });
                    Type::ErrorRecovery
                }
            };
            env.push_scope();
            ctx.push_scope(super::scope_context::ScopeKind::Local);
            let bindings = check!(
                super::pattern::type_pattern(ctx, &tcx.generics, pattern, &element_ty),
                vec![],
                warnings,
                errors
            );
            for (name, ty) in bindings {
                env.insert(
                    name.key().clone(),
                    super::statement::TypeBinding {
                        mutability: Mutability::Let,
                        ty,
                    },
                );
            }
            let loop_tcx = tcx.in_loop();
            let res = super::statement::type_block_in_place(ctx, &loop_tcx, env, body);
            ctx.pop_scope();
            env.pop_scope();
            let (_, flow) = check!(
                res,
                (Type::ErrorRecovery, Default::default()),
                warnings,
                errors
            );
            check!(
                loop_result_type(&flow, false, span),
                Type::ErrorRecovery,
                warnings,
                errors
            )
        }
        ExprKind::Block(block) => {
            let (ty, _) = check!(
                type_block(ctx, tcx, env, block),
                (Type::ErrorRecovery, Default::default()),
                warnings,
                errors
            );
            ty
        }
        ExprKind::UnsafeBlock(block) => {
            let unsafe_tcx = tcx.in_unsafe_block();
            let (ty, _) = check!(
                type_block(ctx, &unsafe_tcx, env, block),
                (Type::ErrorRecovery, Default::default()),
                warnings,
                errors
            );
            ty
        }
        ExprKind::Transmute { from, to, value } => {
            if !tcx.in_unsafe && !ctx.in_unsafe_span(span) {
                errors.push(CompileError::TransmuteOutsideUnsafe { span: span.clone() });
            }
            let from_ty = check!(
                resolve_type_expr(ctx, from, &tcx.generics),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            let to_ty = check!(
                resolve_type_expr(ctx, to, &tcx.generics),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            for ty in [&from_ty, &to_ty].iter().copied() {
                let target = match strip_for_transmute(ty) {
                    Some(target) => target,
                    None => {
                        errors.push(CompileError::TransmuteNonBitcopy {
                            ty: ty.friendly_type_str(),
                            span: span.clone(),
                        });
                        continue;
                    }
                };
                if !target.is_error_recovery() && !is_bitcopy(ctx, target) {
                    errors.push(CompileError::TransmuteNonBitcopy {
                        ty: ty.friendly_type_str(),
                        span: span.clone(),
                    });
                }
            }
            check!(
                check_expr(ctx, tcx, env, value, &from_ty),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            to_ty
        }
        ExprKind::FieldAccess { base, name } => {
            let base_ty = check!(
                infer_expr(ctx, tcx, env, base),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            check!(
                project_field(ctx, &base_ty, name, span),
                Type::ErrorRecovery,
                warnings,
                errors
            )
        }
        ExprKind::TupleAccess { base, index } => {
            let base_ty = check!(
                infer_expr(ctx, tcx, env, base),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            let (ty, _) = check!(
                project_tuple(&base_ty, *index, span),
                (Type::ErrorRecovery, 0),
                warnings,
                errors
            );
            ty
        }
        ExprKind::IndexAccess { base, index } => {
            let base_ty = check!(
                infer_expr(ctx, tcx, env, base),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            if matches!(index.kind, ExprKind::Range { .. }) {
                check!(
                    infer_expr(ctx, tcx, env, index),
                    Type::ErrorRecovery,
                    warnings,
                    errors
                );
                match crate::types::coerce_array_to_slice(&base_ty) {
                    Some(sliced) => sliced,
                    None => match base_ty.strip_perm() {
                        Type::Slice(_) => base_ty.clone(),
                        Type::ErrorRecovery => Type::ErrorRecovery,
                        other => {
                            errors.push(CompileError::IndexBaseNotIndexable {
                                ty: other.friendly_type_str(),
                                span: span.clone(),
                            });
                            Type::ErrorRecovery
                        }
                    },
                }
            } else {
                let (ty, _) = check!(
                    super::place::project_index(ctx, tcx, env, &base_ty, index, span),
                    (Type::ErrorRecovery, 0),
                    warnings,
                    errors
                );
                ty
            }
        }
        ExprKind::Call {
            callee,
            generic_args,
            args,
        } => check!(
            type_call(ctx, tcx, env, callee, generic_args, args, span),
            Type::ErrorRecovery,
            warnings,
            errors
        ),
        ExprKind::MethodCall {
            receiver,
            name,
            args,
        } => check!(
            type_method_call(ctx, tcx, env, receiver, name, args, span),
            Type::ErrorRecovery,
            warnings,
            errors
        ),
        ExprKind::Propagate(value) => {
            check!(
                type_propagate(ctx, tcx, env, value, span),
                Type::ErrorRecovery,
                warnings,
                errors
            )
        }
        ExprKind::Yield { value } => check!(
            concurrency::type_yield(ctx, tcx, env, value, span),
            Type::ErrorRecovery,
            warnings,
            errors
        ),
        ExprKind::YieldFrom { value } => check!(
            concurrency::type_yield_from(ctx, tcx, env, value, span),
            Type::ErrorRecovery,
            warnings,
            errors
        ),
        ExprKind::Sync(value) => check!(
            concurrency::type_sync(ctx, tcx, env, value, span),
            Type::ErrorRecovery,
            warnings,
            errors
        ),
        ExprKind::Race(arms) => check!(
            concurrency::type_race(ctx, tcx, env, arms, span),
            Type::ErrorRecovery,
            warnings,
            errors
        ),
        ExprKind::All(elements) => check!(
            concurrency::type_all(ctx, tcx, env, elements, span),
            Type::ErrorRecovery,
            warnings,
            errors
        ),
        ExprKind::Parallel { domain, body } => check!(
            concurrency::type_parallel(ctx, tcx, env, domain, body, span),
            Type::ErrorRecovery,
            warnings,
            errors
        ),
        ExprKind::Spawn { options, body } => check!(
            concurrency::type_spawn(ctx, tcx, env, options, body, span),
            Type::ErrorRecovery,
            warnings,
            errors
        ),
        ExprKind::Wait(handle) => check!(
            concurrency::type_wait(ctx, tcx, env, handle, span),
            Type::ErrorRecovery,
            warnings,
            errors
        ),
        ExprKind::Dispatch {
            pattern,
            range,
            options,
            body,
        } => check!(
            concurrency::type_dispatch(ctx, tcx, env, pattern, range, options, body, span),
            Type::ErrorRecovery,
            warnings,
            errors
        ),
    };

    if errors.is_empty() {
        recovered(ty, warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

fn resolve_module_value(
    ctx: &ScopeContext,
    tcx: &StmtTypeContext,
    path: &[String],
    name: &crate::ident::Ident,
    warnings: &mut Vec<CompileWarning>,
    errors: &mut Vec<CompileError>,
) -> Type {
    if let Some(decl) = ctx.lookup_static(path, &name.name).cloned() {
        if !super::visibility::can_access_vis(&ctx.current_module, path, decl.vis) {
            errors.push(CompileError::NotVisible {
                name: name.name.clone(),
                module: path_to_string(path),
                span: name.span.clone(),
            });
        }
        return static_value_type(ctx, tcx, &decl, warnings, errors);
    }
    if let Some(decl) = ctx.lookup_proc(path, &name.name).cloned() {
        if !super::visibility::can_access_vis(&ctx.current_module, path, decl.vis) {
            errors.push(CompileError::NotVisible {
                name: name.name.clone(),
                module: path_to_string(path),
                span: name.span.clone(),
            });
        }
        let mut sig_warnings = vec![];
        let mut sig_errors = vec![];
        let sig = super::declaration::procedure_signature(ctx, &decl)
            .settle(&mut sig_warnings, &mut sig_errors);
        warnings.append(&mut sig_warnings);
        errors.append(&mut sig_errors);
        return sig.unwrap_or(Type::ErrorRecovery);
    }
    errors.push(CompileError::UnknownName {
        name: format!("{}::{}", path_to_string(path), name.name),
        span: name.span.clone(),
    });
    Type::ErrorRecovery
}

fn static_value_type(
    ctx: &ScopeContext,
    tcx: &StmtTypeContext,
    decl: &StaticDecl,
    warnings: &mut Vec<CompileWarning>,
    errors: &mut Vec<CompileError>,
) -> Type {
    match &decl.ty {
        Some(ascription) => check!(
            resolve_type_expr(ctx, ascription, &tcx.generics),
            Type::ErrorRecovery,
            warnings,
            errors
        ),
        None => match &decl.init.kind {
            ExprKind::IntLiteral { suffix, .. } => suffix
                .as_deref()
                .and_then(Primitive::from_name)
                .map(Type::Prim)
                .unwrap_or(Type::Prim(Primitive::I32)),
            ExprKind::FloatLiteral { .. } => Type::Prim(Primitive::F64),
            ExprKind::BoolLiteral(_) => Type::bool(),
            ExprKind::CharLiteral(_) => Type::Prim(Primitive::Char),
            ExprKind::StringLiteral(_) => Type::Str(Some(crate::types::SeqState::View)),
            _ => Type::ErrorRecovery,
        },
    }
}

fn type_binary(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    span: &crate::span::Span,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];

    if op.is_logical() {
        check!(
            check_expr(ctx, tcx, env, lhs, &Type::bool()),
            Type::ErrorRecovery,
            warnings,
            errors
        );
        check!(
            check_expr(ctx, tcx, env, rhs, &Type::bool()),
            Type::ErrorRecovery,
            warnings,
            errors
        );
        return recovered(Type::bool(), warnings, errors);
    }

    let lhs_ty = check!(
        infer_expr(ctx, tcx, env, lhs),
        Type::ErrorRecovery,
        warnings,
        errors
    );
    let operand = lhs_ty.strip_perm().clone();
    check!(
        check_expr(ctx, tcx, env, rhs, &operand),
        Type::ErrorRecovery,
        warnings,
        errors
    );

    let prim = operand.as_prim();
    let defined = if op.is_comparison() {
        prim.map(|prim| prim.is_numeric() || prim == Primitive::Bool || prim == Primitive::Char)
            .unwrap_or(false)
    } else if matches!(
        op,
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr
    ) {
        prim.map(|prim| prim.is_integer()).unwrap_or(false)
    } else {
        prim.map(|prim| prim.is_numeric()).unwrap_or(false)
    };
    if !defined && !operand.is_error_recovery() {
        errors.push(CompileError::BinaryOpUndefined {
            op: op.symbol().to_string(),
            ty: operand.friendly_type_str(),
            span: span.clone(),
        });
    }

    let result = if op.is_comparison() {
        Type::bool()
    } else {
        operand
    };
    if errors.is_empty() {
        recovered(result, warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

/// Branch join under structural equivalence, with `!` absorbing into the
/// other branch.
fn join_branch_types(
    then_ty: &Type,
    else_ty: &Type,
    span: &crate::span::Span,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let joined = if type_equiv(then_ty, else_ty) {
        then_ty.clone()
    } else if then_ty.is_never() {
        else_ty.clone()
    } else if else_ty.is_never() {
        then_ty.clone()
    } else {
        errors.push(CompileError::TypeMismatch {
            expected: then_ty.friendly_type_str(),
            received: else_ty.friendly_type_str(),
            help: "Both branches of an `if` expression must have the same type.".into(),
            span: span.clone(),
        });
        return failed(warnings, errors);
    };
    recovered(joined, warnings, errors)
}

/// The type a loop expression produces, from the breaks its body performed.
fn loop_result_type(
    flow: &super::statement::FlowInfo,
    infinite: bool,
    span: &crate::span::Span,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let mut break_ty: Option<Type> = None;
    for ty in &flow.breaks {
        match &break_ty {
            None => break_ty = Some(ty.clone()),
            Some(existing) => {
                if !type_equiv(existing, ty) {
                    errors.push(CompileError::MatchArmTypeMismatch {
                        first: existing.friendly_type_str(),
                        second: ty.friendly_type_str(),
                        span: span.clone(),
                    });
                }
            }
        }
    }
    if flow.break_void {
        if let Some(existing) = &break_ty {
            if !existing.is_unit() {
                errors.push(CompileError::MatchArmTypeMismatch {
                    first: existing.friendly_type_str(),
                    second: "()".into(),
                    span: span.clone(),
                });
            }
        }
        break_ty = Some(Type::unit());
    }
    let result = match break_ty {
        Some(ty) => ty,
        // An infinite loop that never breaks never produces a value.
        None if infinite => Type::never(),
        None => Type::unit(),
    };
    if errors.is_empty() {
        recovered(result, warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

fn iter_element_type(iter_ty: &Type) -> Option<Type> {
    let perm = iter_ty.perm_of();
    match iter_ty.strip_perm() {
        Type::Range => Some(Type::usize()),
        Type::Array(element, _) | Type::Slice(element) => {
            Some(Type::wrap_perm(perm, (**element).clone()))
        }
        Type::ErrorRecovery => Some(Type::ErrorRecovery),
        _ => None,
    }
}

/// `e?`: the operand must be union-shaped with at least one member feeding
/// the procedure's error channel; the rest continues.
fn type_propagate(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    value: &Expr,
    span: &crate::span::Span,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let value_ty = check!(
        infer_expr(ctx, tcx, env, value),
        Type::ErrorRecovery,
        warnings,
        errors
    );
    let members = match value_ty.strip_perm() {
        Type::Union(members) => members.clone(),
        Type::ErrorRecovery => return recovered(Type::ErrorRecovery, warnings, errors),
        other => {
            errors.push(CompileError::PropagateShape {
                ty: other.friendly_type_str(),
                span: span.clone(),
            });
            return failed(warnings, errors);
        }
    };
    let return_members: Vec<Type> = match tcx.return_type.strip_perm() {
        Type::Union(return_members) => return_members.clone(),
        other => vec![other.clone()],
    };
    let (propagated, kept): (Vec<Type>, Vec<Type>) = members.into_iter().partition(|member| {
        return_members
            .iter()
            .any(|candidate| type_equiv(member, candidate))
    });
    if propagated.is_empty() {
        errors.push(CompileError::PropagateReturnMismatch {
            expected: tcx.return_type.friendly_type_str(),
            received: value_ty.friendly_type_str(),
            span: span.clone(),
        });
        return failed(warnings, errors);
    }
    if kept.is_empty() {
        // Everything propagates; control never continues normally.
        return recovered(Type::never(), warnings, errors);
    }
    recovered(Type::union_of(kept), warnings, errors)
}
