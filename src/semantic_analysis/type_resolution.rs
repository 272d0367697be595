//! Lowering of syntax-level types into canonical type terms: path lookup,
//! alias expansion, generic instantiation, array length evaluation.

use super::scope_context::{ScopeContext, TypeDeclEntry};
use super::visibility::can_access_keys;
use crate::ast::*;
use crate::error::*;
use crate::ident::{id_key, path_key, path_to_string, IdKey};
use crate::span::Span;
use crate::types::const_len::const_len;
use crate::types::{Permission, Primitive, RefinePredicate, Type};
use std::collections::HashSet;

pub type GenericsEnv = HashSet<IdKey>;

pub fn generics_of(params: &[TypeParam]) -> GenericsEnv {
    params.iter().map(|param| param.name.key().clone()).collect()
}

pub fn resolve_type_expr(
    ctx: &ScopeContext,
    ty: &TypeExpr,
    generics: &GenericsEnv,
) -> CompileResult<Type> {
    let mut visiting = HashSet::new();
    resolve_inner(ctx, ty, generics, &mut visiting)
}

fn resolve_inner(
    ctx: &ScopeContext,
    ty: &TypeExpr,
    generics: &GenericsEnv,
    visiting: &mut HashSet<Vec<IdKey>>,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let span = &ty.span;
    let resolved = match &ty.kind {
        TypeExprKind::Name(name) => {
            if let Some(prim) = Primitive::from_name(&name.name) {
                Type::Prim(prim)
            } else if generics.contains(name.key()) {
                Type::Generic {
                    name: name.name.clone(),
                }
            } else {
                check!(
                    resolve_nominal(ctx, &[name.name.clone()], &[], None, span, generics, visiting),
                    return failed(warnings, errors),
                    warnings,
                    errors
                )
            }
        }
        TypeExprKind::Perm(perm, base) => {
            if *perm == Permission::Shared {
                errors.push(CompileError::SharedPermUnsupported { span: span.clone() });
            }
            let base = check!(
                resolve_inner(ctx, base, generics, visiting),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            Type::Perm(*perm, Box::new(base))
        }
        TypeExprKind::Union(members) => {
            if members.len() < 2 {
                errors.push(CompileError::UnionTooFewMembers { span: span.clone() });
            }
            let mut resolved = Vec::with_capacity(members.len());
            for member in members {
                resolved.push(check!(
                    resolve_inner(ctx, member, generics, visiting),
                    Type::ErrorRecovery,
                    warnings,
                    errors
                ));
            }
            Type::union_of(resolved)
        }
        TypeExprKind::Func { params, ret } => {
            let mut resolved = Vec::with_capacity(params.len());
            for param in params {
                let param_ty = check!(
                    resolve_inner(ctx, &param.ty, generics, visiting),
                    Type::ErrorRecovery,
                    warnings,
                    errors
                );
                resolved.push(crate::types::FuncParam {
                    mode: param.mode,
                    ty: param_ty,
                });
            }
            let ret = check!(
                resolve_inner(ctx, ret, generics, visiting),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            Type::Func {
                params: resolved,
                ret: Box::new(ret),
            }
        }
        TypeExprKind::Tuple(elements) => {
            if elements.is_empty() {
                // The empty tuple is the unit type's canonical spelling.
                Type::unit()
            } else {
                let mut resolved = Vec::with_capacity(elements.len());
                for element in elements {
                    resolved.push(check!(
                        resolve_inner(ctx, element, generics, visiting),
                        Type::ErrorRecovery,
                        warnings,
                        errors
                    ));
                }
                Type::Tuple(resolved)
            }
        }
        TypeExprKind::Array { element, length } => {
            let element = check!(
                resolve_inner(ctx, element, generics, visiting),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            let length = check!(
                const_len(ctx, length),
                return failed(warnings, errors),
                warnings,
                errors
            );
            Type::Array(Box::new(element), length)
        }
        TypeExprKind::Slice(element) => {
            let element = check!(
                resolve_inner(ctx, element, generics, visiting),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            Type::Slice(Box::new(element))
        }
        TypeExprKind::Ptr { element, state } => {
            let element = check!(
                resolve_inner(ctx, element, generics, visiting),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            Type::Ptr(Box::new(element), *state)
        }
        TypeExprKind::RawPtr { qual, element } => {
            let element = check!(
                resolve_inner(ctx, element, generics, visiting),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            Type::RawPtr(*qual, Box::new(element))
        }
        TypeExprKind::Str(state) => Type::Str(*state),
        TypeExprKind::Bytes(state) => Type::Bytes(*state),
        TypeExprKind::Dynamic(path) => {
            if ctx.lookup_class(path).is_none() {
                errors.push(CompileError::SuperclassUndefined {
                    path: path_to_string(path),
                    span: span.clone(),
                });
                Type::ErrorRecovery
            } else {
                Type::Dynamic(path.clone())
            }
        }
        TypeExprKind::Path { path, generic_args } => {
            check!(
                resolve_nominal(ctx, path, generic_args, None, span, generics, visiting),
                return failed(warnings, errors),
                warnings,
                errors
            )
        }
        TypeExprKind::ModalState {
            path,
            generic_args,
            state,
        } => {
            check!(
                resolve_nominal(
                    ctx,
                    path,
                    generic_args,
                    Some(state),
                    span,
                    generics,
                    visiting
                ),
                return failed(warnings, errors),
                warnings,
                errors
            )
        }
        TypeExprKind::Refine { base, predicate } => {
            let base = check!(
                resolve_inner(ctx, base, generics, visiting),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            Type::Refine {
                base: Box::new(base),
                predicate: RefinePredicate {
                    text: render_predicate(predicate),
                    span: predicate.span.clone(),
                },
            }
        }
        TypeExprKind::Range => Type::Range,
    };
    recovered(resolved, warnings, errors)
}

fn resolve_nominal(
    ctx: &ScopeContext,
    path: &[String],
    generic_args: &[TypeExpr],
    state: Option<&crate::ident::Ident>,
    span: &Span,
    generics: &GenericsEnv,
    visiting: &mut HashSet<Vec<IdKey>>,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];

    let entry = match ctx.lookup_type_decl(path) {
        Some(entry) => entry.clone(),
        None => {
            errors.push(CompileError::UnknownTypePath {
                path: path_to_string(path),
                span: span.clone(),
            });
            return failed(warnings, errors);
        }
    };

    // Visibility gate: builtins carry no declaring module.
    if let Some(decl_module) = ctx.type_decl_module(path) {
        if !decl_module.is_empty()
            && !can_access_keys(&path_key(&ctx.current_module), &decl_module, entry.vis())
        {
            errors.push(CompileError::NotVisible {
                name: entry.name().name.clone(),
                module: decl_module.join("::"),
                span: span.clone(),
            });
        }
    }

    // Arity, with defaults filling the tail.
    let params = entry.type_parameters().to_vec();
    let mut args = Vec::with_capacity(params.len());
    if generic_args.len() > params.len() {
        errors.push(CompileError::TypeArityMismatch {
            path: path_to_string(path),
            expected: params.len(),
            received: generic_args.len(),
            span: span.clone(),
        });
        return failed(warnings, errors);
    }
    for (index, param) in params.iter().enumerate() {
        if let Some(arg) = generic_args.get(index) {
            args.push(check!(
                resolve_inner(ctx, arg, generics, visiting),
                Type::ErrorRecovery,
                warnings,
                errors
            ));
        } else if let Some(default) = &param.default {
            let decl_generics = generics_of(&params);
            args.push(check!(
                resolve_inner(ctx, default, &decl_generics, visiting),
                Type::ErrorRecovery,
                warnings,
                errors
            ));
        } else {
            errors.push(CompileError::TypeArityMismatch {
                path: path_to_string(path),
                expected: params.len(),
                received: generic_args.len(),
                span: span.clone(),
            });
            return failed(warnings, errors);
        }
    }

    // Bound satisfaction; unresolved generics are vouched for by their own
    // declared bounds.
    for (param, arg) in params.iter().zip(args.iter()) {
        if matches!(arg, Type::Generic { .. } | Type::ErrorRecovery) {
            continue;
        }
        for bound in &param.bounds {
            if !super::classes::type_implements_class(ctx, arg, bound) {
                errors.push(CompileError::GenericBoundUnsatisfied {
                    param: param.name.name.clone(),
                    class_path: path_to_string(bound),
                    span: span.clone(),
                });
            }
        }
    }

    let resolved = match &entry {
        TypeDeclEntry::Alias(alias) => {
            if let Some(state) = state {
                errors.push(CompileError::UnknownModalState {
                    path: path_to_string(path),
                    state: state.name.clone(),
                    span: span.clone(),
                });
                return failed(warnings, errors);
            }
            let alias_key = {
                let mut key = ctx.type_decl_module(path).unwrap_or_default();
                key.push(alias.name.key().clone());
                key
            };
            if !visiting.insert(alias_key.clone()) {
                errors.push(CompileError::AliasCycle {
                    path: path_to_string(path),
                    span: span.clone(),
                });
                return failed(warnings, errors);
            }
            let declaring = ctx.type_decl_module(path).unwrap_or_default();
            let resolved = if alias.opaque && declaring != path_key(&ctx.current_module) {
                Type::Opaque {
                    path: path.to_vec(),
                    origin: alias.origin,
                }
            } else {
                let alias_generics = generics_of(&alias.type_parameters);
                let underlying = check!(
                    resolve_inner(ctx, &alias.ty, &alias_generics, visiting),
                    Type::ErrorRecovery,
                    warnings,
                    errors
                );
                let map: std::collections::HashMap<String, Type> = alias
                    .type_parameters
                    .iter()
                    .map(|param| param.name.name.clone())
                    .zip(args.iter().cloned())
                    .collect();
                crate::types::subst_generics(&underlying, &map)
            };
            visiting.remove(&alias_key);
            resolved
        }
        TypeDeclEntry::Modal(modal) => {
            if let Some(state) = state {
                let known = modal
                    .states
                    .iter()
                    .any(|candidate| candidate.name.key() == state.key());
                if !known {
                    errors.push(CompileError::UnknownModalState {
                        path: path_to_string(path),
                        state: state.name.clone(),
                        span: span.clone(),
                    });
                }
                Type::ModalState {
                    path: path.to_vec(),
                    state: state.name.clone(),
                    args,
                }
            } else {
                Type::Path {
                    path: path.to_vec(),
                    args,
                }
            }
        }
        TypeDeclEntry::Record(_) | TypeDeclEntry::Enum(_) => {
            if let Some(state) = state {
                errors.push(CompileError::UnknownModalState {
                    path: path_to_string(path),
                    state: state.name.clone(),
                    span: span.clone(),
                });
            }
            Type::Path {
                path: path.to_vec(),
                args,
            }
        }
    };

    recovered(resolved, warnings, errors)
}

/// Structural well-formedness of an already-resolved type term.
pub fn type_wf(ctx: &ScopeContext, ty: &Type, span: &Span) -> CompileResult<()> {
    let mut warnings = vec![];
    let mut errors = vec![];
    type_wf_inner(ctx, ty, span, &mut warnings, &mut errors);
    if errors.is_empty() {
        recovered((), warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

fn type_wf_inner(
    ctx: &ScopeContext,
    ty: &Type,
    span: &Span,
    warnings: &mut Vec<CompileWarning>,
    errors: &mut Vec<CompileError>,
) {
    use Type::*;
    match ty {
        Prim(_) | Range | Generic { .. } | ErrorRecovery | Str(_) | Bytes(_) | Opaque { .. } => {}
        Perm(perm, base) => {
            if *perm == Permission::Shared {
                errors.push(CompileError::SharedPermUnsupported { span: span.clone() });
            }
            type_wf_inner(ctx, base, span, warnings, errors);
        }
        Union(members) => {
            if members.len() < 2 {
                errors.push(CompileError::UnionTooFewMembers { span: span.clone() });
            }
            for member in members {
                type_wf_inner(ctx, member, span, warnings, errors);
            }
        }
        Tuple(elements) => {
            for element in elements {
                type_wf_inner(ctx, element, span, warnings, errors);
            }
        }
        Array(element, _) | Slice(element) => type_wf_inner(ctx, element, span, warnings, errors),
        Ptr(element, _) | RawPtr(_, element) => {
            type_wf_inner(ctx, element, span, warnings, errors)
        }
        Dynamic(path) => {
            if ctx.lookup_class(path).is_none() {
                errors.push(CompileError::SuperclassUndefined {
                    path: path_to_string(path),
                    span: span.clone(),
                });
            }
        }
        Path { path, args } => {
            match ctx.lookup_type_decl(path) {
                Some(entry) => {
                    let expected = entry.type_parameters().len();
                    if args.len() != expected {
                        errors.push(CompileError::TypeArityMismatch {
                            path: path_to_string(path),
                            expected,
                            received: args.len(),
                            span: span.clone(),
                        });
                    }
                }
                None => errors.push(CompileError::UnknownTypePath {
                    path: path_to_string(path),
                    span: span.clone(),
                }),
            }
            for arg in args {
                type_wf_inner(ctx, arg, span, warnings, errors);
            }
        }
        ModalState { path, state, args } => {
            match ctx.lookup_type_decl(path) {
                Some(TypeDeclEntry::Modal(modal)) => {
                    let known = modal
                        .states
                        .iter()
                        .any(|candidate| id_key(&candidate.name.name) == id_key(state));
                    if !known {
                        errors.push(CompileError::UnknownModalState {
                            path: path_to_string(path),
                            state: state.clone(),
                            span: span.clone(),
                        });
                    }
                }
                Some(_) => errors.push(CompileError::UnknownModalState {
                    path: path_to_string(path),
                    state: state.clone(),
                    span: span.clone(),
                }),
                None => errors.push(CompileError::UnknownTypePath {
                    path: path_to_string(path),
                    span: span.clone(),
                }),
            }
            for arg in args {
                type_wf_inner(ctx, arg, span, warnings, errors);
            }
        }
        Func { params, ret } => {
            for param in params {
                type_wf_inner(ctx, &param.ty, span, warnings, errors);
            }
            type_wf_inner(ctx, ret, span, warnings, errors);
        }
        Refine { base, .. } => type_wf_inner(ctx, base, span, warnings, errors),
    }
}

/// Canonical rendering of a refinement predicate, used as its structural
/// identity.
pub fn render_predicate(expr: &Expr) -> String {
    use ExprKind::*;
    match &expr.kind {
        IntLiteral { value, .. } => value.to_string(),
        FloatLiteral { value, .. } => value.to_string(),
        BoolLiteral(value) => value.to_string(),
        CharLiteral(value) => format!("'{}'", value),
        StringLiteral(value) => format!("{:?}", value),
        NullLiteral => "null".into(),
        Identifier(name) => name.name.clone(),
        QualifiedName { path, name } => format!("{}::{}", path_to_string(path), name.name),
        Binary { op, lhs, rhs } => format!(
            "({} {} {})",
            render_predicate(lhs),
            op.symbol(),
            render_predicate(rhs)
        ),
        Unary { op, value } => {
            let symbol = match op {
                UnaryOp::Not => "not ",
                UnaryOp::Neg => "-",
            };
            format!("{}{}", symbol, render_predicate(value))
        }
        FieldAccess { base, name } => format!("{}.{}", render_predicate(base), name.name),
        TupleAccess { base, index } => match index {
            Some(index) => format!("{}.{}", render_predicate(base), index),
            None => format!("{}.<non-const>", render_predicate(base)),
        },
        Call { callee, args, .. } => {
            let rendered: Vec<String> = args
                .iter()
                .map(|arg| render_predicate(&arg.value))
                .collect();
            format!("{}({})", render_predicate(callee), rendered.join(", "))
        }
        _ => "<pred>".into(),
    }
}
