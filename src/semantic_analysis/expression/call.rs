//! Call typing: procedure calls, record default construction, record and
//! enum literals, and method resolution through records, modal states and
//! class default methods.

use super::super::classes;
use super::super::modal;
use super::super::place::is_place_expr;
use super::super::scope_context::{ScopeContext, TypeDeclEntry};
use super::super::statement::{StmtTypeContext, TypeEnv};
use super::super::type_resolution::resolve_type_expr;
use super::{check_expr, infer_expr};
use crate::ast::*;
use crate::error::*;
use crate::ident::{path_to_string, Ident};
use crate::span::Span;
use crate::types::{subst_generics, FuncParam, Permission, Type};
use either::Either;
use std::collections::HashMap;

/// Types `callee(generic_args...)(args...)`. A zero-argument call to a
/// record path is default construction and is handled before callable
/// dispatch.
pub fn type_call(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    callee: &Expr,
    generic_args: &[TypeExpr],
    args: &[Arg],
    span: &Span,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];

    if let Some(record_path) = callee_record_path(ctx, env, callee) {
        return type_record_default_call(ctx, tcx, &record_path, generic_args, args, span);
    }

    let callee_ty = check!(
        infer_expr(ctx, tcx, env, callee),
        Type::ErrorRecovery,
        warnings,
        errors
    );
    let (params, ret) = match callee_ty.strip_perm() {
        Type::Func { params, ret } => (params.clone(), (**ret).clone()),
        Type::ErrorRecovery => return recovered(Type::ErrorRecovery, warnings, errors),
        other => {
            errors.push(CompileError::CalleeNotFunction {
                ty: other.friendly_type_str(),
                span: callee.span.clone(),
            });
            return failed(warnings, errors);
        }
    };

    // Explicit generic arguments substitute into the signature up front;
    // leftover placeholders are inferred from the arguments.
    let explicit = check!(
        resolve_generic_args(ctx, tcx, callee, generic_args),
        HashMap::new(),
        warnings,
        errors
    );
    let params: Vec<FuncParam> = params
        .iter()
        .map(|param| FuncParam {
            mode: param.mode,
            ty: subst_generics(&param.ty, &explicit),
        })
        .collect();
    let ret = subst_generics(&ret, &explicit);

    let inferred = check!(
        check_call_args(ctx, tcx, env, &params, args, span),
        HashMap::new(),
        warnings,
        errors
    );
    let result = subst_generics(&ret, &inferred);
    if errors.is_empty() {
        recovered(result, warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

/// Resolves the record path a call's callee denotes, if any: an identifier
/// or qualified name bound to a record type rather than a value.
fn callee_record_path(
    ctx: &ScopeContext,
    env: &TypeEnv,
    callee: &Expr,
) -> Option<Vec<String>> {
    let path = match &callee.kind {
        ExprKind::Identifier(name) => {
            if env.bind_of(name.key()).is_some() {
                return None;
            }
            vec![name.name.clone()]
        }
        ExprKind::QualifiedName { path, name } => {
            let mut full = path.clone();
            full.push(name.name.clone());
            full
        }
        _ => return None,
    };
    match ctx.lookup_type_decl(&path) {
        Some(TypeDeclEntry::Record(_)) => Some(path),
        _ => None,
    }
}

/// `R()`: every field must carry an initializer; the initializers were
/// checked against their field types during declaration checking.
fn type_record_default_call(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    path: &[String],
    generic_args: &[TypeExpr],
    args: &[Arg],
    span: &Span,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let decl = match ctx.lookup_type_decl(path) {
        Some(TypeDeclEntry::Record(decl)) => decl.clone(),
        _ => {
            errors.push(CompileError::UnknownTypePath {
                path: path_to_string(path),
                span: span.clone(),
            });
            return failed(warnings, errors);
        }
    };
    if !args.is_empty() {
        errors.push(CompileError::ArgCountMismatch {
            expected: 0,
            received: args.len(),
            span: span.clone(),
        });
    }
    for field in decl.fields() {
        if field.init.is_none() {
            errors.push(CompileError::RecordDefaultInit {
                path: path_to_string(path),
                field: field.name.name.clone(),
                span: span.clone(),
            });
        }
    }
    let mut resolved_args = Vec::with_capacity(generic_args.len());
    for arg in generic_args {
        resolved_args.push(check!(
            resolve_type_expr(ctx, arg, &tcx.generics),
            Type::ErrorRecovery,
            warnings,
            errors
        ));
    }
    if resolved_args.len() != decl.type_parameters.len() {
        if !decl.type_parameters.is_empty() || !resolved_args.is_empty() {
            errors.push(CompileError::TypeArityMismatch {
                path: path_to_string(path),
                expected: decl.type_parameters.len(),
                received: resolved_args.len(),
                span: span.clone(),
            });
        }
    }
    let result = Type::Path {
        path: path.to_vec(),
        args: resolved_args,
    };
    if errors.is_empty() {
        recovered(result, warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

fn resolve_generic_args(
    ctx: &ScopeContext,
    tcx: &StmtTypeContext,
    callee: &Expr,
    generic_args: &[TypeExpr],
) -> CompileResult<HashMap<String, Type>> {
    let mut warnings = vec![];
    let mut errors = vec![];
    if generic_args.is_empty() {
        return recovered(HashMap::new(), warnings, errors);
    }
    let decl = match &callee.kind {
        ExprKind::Identifier(name) => ctx.lookup_proc(&[], &name.name).cloned(),
        ExprKind::QualifiedName { path, name } => ctx.lookup_proc(path, &name.name).cloned(),
        _ => None,
    };
    let decl = match decl {
        Some(decl) => decl,
        None => return recovered(HashMap::new(), warnings, errors),
    };
    if generic_args.len() != decl.type_parameters.len() {
        errors.push(CompileError::TypeArityMismatch {
            path: decl.name.name.clone(),
            expected: decl.type_parameters.len(),
            received: generic_args.len(),
            span: callee.span.clone(),
        });
        return failed(warnings, errors);
    }
    let mut map = HashMap::new();
    for (param, arg) in decl.type_parameters.iter().zip(generic_args.iter()) {
        let resolved = check!(
            resolve_type_expr(ctx, arg, &tcx.generics),
            Type::ErrorRecovery,
            warnings,
            errors
        );
        for bound in &param.bounds {
            if !matches!(resolved, Type::Generic { .. } | Type::ErrorRecovery)
                && !classes::type_implements_class(ctx, &resolved, bound)
            {
                errors.push(CompileError::GenericBoundUnsatisfied {
                    param: param.name.name.clone(),
                    class_path: path_to_string(bound),
                    span: arg.span.clone(),
                });
            }
        }
        map.insert(param.name.name.clone(), resolved);
    }
    recovered(map, warnings, errors)
}

/// Checks a call's arguments against its parameters: move modes, place
/// requirements for permissioned parameters, and argument subtyping. Returns
/// generic placeholder bindings inferred along the way.
pub(crate) fn check_call_args(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    params: &[FuncParam],
    args: &[Arg],
    span: &Span,
) -> CompileResult<HashMap<String, Type>> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let mut inferred: HashMap<String, Type> = HashMap::new();

    if args.len() != params.len() {
        errors.push(CompileError::ArgCountMismatch {
            expected: params.len(),
            received: args.len(),
            span: span.clone(),
        });
        return failed(warnings, errors);
    }

    for (arg, param) in args.iter().zip(params.iter()) {
        match param.mode {
            Some(ParamMode::Move) => {
                let is_move = arg.moved || matches!(arg.value.kind, ExprKind::Move(_));
                if !is_move {
                    errors.push(CompileError::CallMoveMissing {
                        span: arg.span.clone(),
                    });
                }
            }
            None => {
                if arg.moved {
                    errors.push(CompileError::CallMoveUnexpected {
                        span: arg.span.clone(),
                    });
                }
                if param.ty.perm_of().is_some() && !is_place_expr(&arg.value) {
                    errors.push(CompileError::CallArgNotPlace {
                        span: arg.span.clone(),
                    });
                }
            }
        }

        let expected = subst_generics(&param.ty, &inferred);
        if contains_generic(&expected) {
            // Placeholders left: infer from the argument, then bind.
            let actual = check!(
                infer_expr(ctx, tcx, env, &arg.value),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            unify_generic(&expected, &actual, &mut inferred);
            let rechecked = subst_generics(&expected, &inferred);
            if contains_generic(&rechecked) {
                errors.push(CompileError::CallArgType {
                    expected: expected.friendly_type_str(),
                    received: actual.friendly_type_str(),
                    span: arg.value.span.clone(),
                });
            } else if !crate::types::is_subtype(ctx, &actual, &rechecked) {
                errors.push(CompileError::CallArgType {
                    expected: rechecked.friendly_type_str(),
                    received: actual.friendly_type_str(),
                    span: arg.value.span.clone(),
                });
            }
        } else {
            // Argument mismatches surface under the call's own rule id.
            let arg_span = arg.value.span.clone();
            let _ = check_expr(ctx, tcx, env, &arg.value, &expected)
                .map_errors(|error| match error {
                    CompileError::TypeMismatch {
                        expected, received, ..
                    } => CompileError::CallArgType {
                        expected,
                        received,
                        span: arg_span.clone(),
                    },
                    other => other,
                })
                .settle(&mut warnings, &mut errors);
        }
    }

    if errors.is_empty() {
        recovered(inferred, warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

fn contains_generic(ty: &Type) -> bool {
    use Type::*;
    match ty {
        Generic { .. } => true,
        Perm(_, base) => contains_generic(base),
        Union(members) => members.iter().any(contains_generic),
        Tuple(elements) => elements.iter().any(contains_generic),
        Array(element, _) | Slice(element) => contains_generic(element),
        Ptr(element, _) | RawPtr(_, element) => contains_generic(element),
        Path { args, .. } | ModalState { args, .. } => args.iter().any(contains_generic),
        Func { params, ret } => {
            params.iter().any(|param| contains_generic(&param.ty)) || contains_generic(ret)
        }
        Refine { base, .. } => contains_generic(base),
        _ => false,
    }
}

/// One-pass structural unification of generic placeholders against an
/// argument's inferred type. First binding wins; later conflicts surface as
/// ordinary argument type errors.
fn unify_generic(expected: &Type, actual: &Type, map: &mut HashMap<String, Type>) {
    use Type::*;
    match (expected, actual) {
        (Generic { name }, _) => {
            map.entry(name.clone()).or_insert_with(|| actual.clone());
        }
        (Perm(_, a), Perm(_, b)) => unify_generic(a, b, map),
        (Perm(_, a), _) => unify_generic(a, actual, map),
        (Tuple(a), Tuple(b)) if a.len() == b.len() => {
            for (a, b) in a.iter().zip(b.iter()) {
                unify_generic(a, b, map);
            }
        }
        (Union(a), Union(b)) if a.len() == b.len() => {
            for (a, b) in a.iter().zip(b.iter()) {
                unify_generic(a, b, map);
            }
        }
        (Array(a, _), Array(b, _)) | (Slice(a), Slice(b)) => unify_generic(a, b, map),
        (Ptr(a, _), Ptr(b, _)) | (RawPtr(_, a), RawPtr(_, b)) => unify_generic(a, b, map),
        (
            Path { args: a, .. },
            Path { args: b, .. },
        )
        | (
            ModalState { args: a, .. },
            ModalState { args: b, .. },
        ) if a.len() == b.len() => {
            for (a, b) in a.iter().zip(b.iter()) {
                unify_generic(a, b, map);
            }
        }
        (
            Func {
                params: a,
                ret: ar,
            },
            Func {
                params: b,
                ret: br,
            },
        ) if a.len() == b.len() => {
            for (a, b) in a.iter().zip(b.iter()) {
                unify_generic(&a.ty, &b.ty, map);
            }
            unify_generic(ar, br, map);
        }
        _ => {}
    }
}

/// Enum literal typing. Checked mode passes the expected instantiation so
/// generic payloads resolve; inferred mode reconstructs the arguments from
/// the payload.
pub(crate) fn type_enum_literal(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    path: &[String],
    variant: &Ident,
    payload: Option<&EnumPayload>,
    span: &Span,
    expected_args: Option<&[Type]>,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let decl = match ctx.lookup_type_decl(path) {
        Some(TypeDeclEntry::Enum(decl)) => decl.clone(),
        Some(_) | None => {
            errors.push(CompileError::UnknownTypePath {
                path: path_to_string(path),
                span: span.clone(),
            });
            return failed(warnings, errors);
        }
    };
    let variant_decl = match decl
        .variants
        .iter()
        .find(|candidate| candidate.name == *variant)
    {
        Some(variant_decl) => variant_decl.clone(),
        None => {
            errors.push(CompileError::UnknownField {
                field: variant.name.clone(),
                ty: path_to_string(path),
                available: decl
                    .variants
                    .iter()
                    .map(|candidate| candidate.name.name.clone())
                    .collect::<Vec<_>>()
                    .join(", "),
                span: variant.span.clone(),
            });
            return failed(warnings, errors);
        }
    };

    let decl_generics = super::super::declaration::decl_generics(&decl.type_parameters, &[]);
    let mut subst: HashMap<String, Type> = match expected_args {
        Some(args) => decl
            .type_parameters
            .iter()
            .map(|param| param.name.name.clone())
            .zip(args.iter().cloned())
            .collect(),
        None => HashMap::new(),
    };

    match (&variant_decl.payload, payload) {
        (None, None) => {}
        (Some(VariantPayload::Tuple(declared)), Some(EnumPayload::Tuple(values))) => {
            if declared.len() != values.len() {
                errors.push(CompileError::ArgCountMismatch {
                    expected: declared.len(),
                    received: values.len(),
                    span: span.clone(),
                });
            }
            for (declared_ty, value) in declared.iter().zip(values.iter()) {
                let raw = check!(
                    resolve_type_expr(ctx, declared_ty, &decl_generics),
                    Type::ErrorRecovery,
                    warnings,
                    errors
                );
                let target = subst_generics(&raw, &subst);
                if contains_generic(&target) {
                    let actual = check!(
                        infer_expr(ctx, tcx, env, value),
                        Type::ErrorRecovery,
                        warnings,
                        errors
                    );
                    unify_generic(&target, &actual, &mut subst);
                } else {
                    check!(
                        check_expr(ctx, tcx, env, value, &target),
                        Type::ErrorRecovery,
                        warnings,
                        errors
                    );
                }
            }
        }
        (Some(VariantPayload::Record(declared)), Some(EnumPayload::Record(values))) => {
            for init in values {
                let field_decl = declared
                    .iter()
                    .find(|candidate| candidate.name == init.name);
                match field_decl {
                    Some(field_decl) => {
                        let raw = check!(
                            resolve_type_expr(ctx, &field_decl.ty, &decl_generics),
                            Type::ErrorRecovery,
                            warnings,
                            errors
                        );
                        let target = subst_generics(&raw, &subst);
                        if contains_generic(&target) {
                            let actual = check!(
                                infer_expr(ctx, tcx, env, &init.value),
                                Type::ErrorRecovery,
                                warnings,
                                errors
                            );
                            unify_generic(&target, &actual, &mut subst);
                        } else {
                            check!(
                                check_expr(ctx, tcx, env, &init.value, &target),
                                Type::ErrorRecovery,
                                warnings,
                                errors
                            );
                        }
                    }
                    None => errors.push(CompileError::UnknownField {
                        field: init.name.name.clone(),
                        ty: path_to_string(path),
                        available: declared
                            .iter()
                            .map(|field| field.name.name.clone())
                            .collect::<Vec<_>>()
                            .join(", "),
                        span: init.span.clone(),
                    }),
                }
            }
        }
        _ => {
            errors.push(CompileError::PatternShape {
                ty: path_to_string(path),
                span: span.clone(),
            });
        }
    }

    let args: Vec<Type> = decl
        .type_parameters
        .iter()
        .map(|param| {
            subst
                .get(&param.name.name)
                .cloned()
                .unwrap_or(Type::ErrorRecovery)
        })
        .collect();
    if args.iter().any(|arg| arg.is_error_recovery()) && !decl.type_parameters.is_empty() {
        if expected_args.is_none() && payload.is_none() {
            errors.push(CompileError::TypeArityMismatch {
                path: path_to_string(path),
                expected: decl.type_parameters.len(),
                received: 0,
                span: span.clone(),
            });
        }
    }
    let result = Type::Path {
        path: path.to_vec(),
        args,
    };
    if errors.is_empty() {
        recovered(result, warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

/// Record (and modal-state) literal typing: every written field must exist
/// and check; missing fields fall back to their initializers.
pub(crate) fn type_record_literal(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    path: &[String],
    generic_args: &[TypeExpr],
    state: Option<&Ident>,
    fields: &[FieldInit],
    span: &Span,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];

    let mut resolved_args = Vec::with_capacity(generic_args.len());
    for arg in generic_args {
        resolved_args.push(check!(
            resolve_type_expr(ctx, arg, &tcx.generics),
            Type::ErrorRecovery,
            warnings,
            errors
        ));
    }

    match ctx.lookup_type_decl(path) {
        Some(TypeDeclEntry::Record(decl)) => {
            let decl = decl.clone();
            if state.is_some() {
                errors.push(CompileError::UnknownModalState {
                    path: path_to_string(path),
                    state: state.map(|state| state.name.clone()).unwrap_or_default(),
                    span: span.clone(),
                });
            }
            if resolved_args.len() != decl.type_parameters.len() {
                errors.push(CompileError::TypeArityMismatch {
                    path: path_to_string(path),
                    expected: decl.type_parameters.len(),
                    received: resolved_args.len(),
                    span: span.clone(),
                });
            }
            let decl_generics =
                super::super::declaration::decl_generics(&decl.type_parameters, &[]);
            let subst = super::super::pattern::generic_subst(&decl.type_parameters, &resolved_args);
            let mut seen: Vec<crate::ident::IdKey> = vec![];
            for init in fields {
                if seen.contains(init.name.key()) {
                    errors.push(CompileError::RecordDupField {
                        name: init.name.name.clone(),
                        span: init.span.clone(),
                    });
                    continue;
                }
                seen.push(init.name.key().clone());
                let field_decl = decl.fields().find(|field| field.name == init.name).cloned();
                match field_decl {
                    Some(field_decl) => {
                        let raw = check!(
                            resolve_type_expr(ctx, &field_decl.ty, &decl_generics),
                            Type::ErrorRecovery,
                            warnings,
                            errors
                        );
                        let target = subst_generics(&raw, &subst);
                        check!(
                            check_expr(ctx, tcx, env, &init.value, &target),
                            Type::ErrorRecovery,
                            warnings,
                            errors
                        );
                    }
                    None => errors.push(CompileError::UnknownField {
                        field: init.name.name.clone(),
                        ty: path_to_string(path),
                        available: decl
                            .fields()
                            .map(|field| field.name.name.clone())
                            .collect::<Vec<_>>()
                            .join(", "),
                        span: init.span.clone(),
                    }),
                }
            }
            for field in decl.fields() {
                let written = fields.iter().any(|init| init.name == field.name);
                if !written && field.init.is_none() {
                    errors.push(CompileError::RecordDefaultInit {
                        path: path_to_string(path),
                        field: field.name.name.clone(),
                        span: span.clone(),
                    });
                }
            }
            let result = Type::Path {
                path: path.to_vec(),
                args: resolved_args,
            };
            if errors.is_empty() {
                recovered(result, warnings, errors)
            } else {
                failed(warnings, errors)
            }
        }
        Some(TypeDeclEntry::Modal(decl)) => {
            let decl = decl.clone();
            let state = match state {
                Some(state) => state.clone(),
                None => {
                    // A modal value is always constructed in a named state.
                    errors.push(CompileError::ModalFieldNeedsState {
                        field: String::new(),
                        ty: path_to_string(path),
                        span: span.clone(),
                    });
                    return failed(warnings, errors);
                }
            };
            let state_block = match modal::lookup_state(&decl, &state.name) {
                Some(state_block) => state_block.clone(),
                None => {
                    errors.push(CompileError::UnknownModalState {
                        path: path_to_string(path),
                        state: state.name.clone(),
                        span: state.span.clone(),
                    });
                    return failed(warnings, errors);
                }
            };
            let decl_generics =
                super::super::declaration::decl_generics(&decl.type_parameters, &[]);
            let subst = super::super::pattern::generic_subst(&decl.type_parameters, &resolved_args);
            for init in fields {
                match modal::state_field(&state_block, &init.name.name) {
                    Some(field_decl) => {
                        let raw = check!(
                            resolve_type_expr(ctx, &field_decl.ty, &decl_generics),
                            Type::ErrorRecovery,
                            warnings,
                            errors
                        );
                        let target = subst_generics(&raw, &subst);
                        check!(
                            check_expr(ctx, tcx, env, &init.value, &target),
                            Type::ErrorRecovery,
                            warnings,
                            errors
                        );
                    }
                    None => errors.push(CompileError::UnknownField {
                        field: init.name.name.clone(),
                        ty: format!("{}@{}", path_to_string(path), state.name),
                        available: state_block
                            .fields()
                            .map(|field| field.name.name.clone())
                            .collect::<Vec<_>>()
                            .join(", "),
                        span: init.span.clone(),
                    }),
                }
            }
            let result = Type::ModalState {
                path: path.to_vec(),
                state: state.name.clone(),
                args: resolved_args,
            };
            if errors.is_empty() {
                recovered(result, warnings, errors)
            } else {
                failed(warnings, errors)
            }
        }
        _ => {
            errors.push(CompileError::UnknownTypePath {
                path: path_to_string(path),
                span: span.clone(),
            });
            failed(warnings, errors)
        }
    }
}

/// Method resolution: the receiver's own members first, then the closed set
/// of default methods contributed by implemented classes.
pub fn type_method_call(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    receiver: &Expr,
    name: &Ident,
    args: &[Arg],
    span: &Span,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let receiver_ty = check!(
        infer_expr(ctx, tcx, env, receiver),
        Type::ErrorRecovery,
        warnings,
        errors
    );
    if receiver_ty.is_error_recovery() {
        return recovered(Type::ErrorRecovery, warnings, errors);
    }

    let resolved = check!(
        resolve_method(ctx, &receiver_ty, name, span),
        return failed(warnings, errors),
        warnings,
        errors
    );

    let (params, ret, receiver_decl) = match &resolved {
        Either::Left(own) => (own.params.clone(), own.return_type.clone(), own.receiver.clone()),
        Either::Right((_, default)) => (
            default.params.clone(),
            default.return_type.clone(),
            default.receiver.clone(),
        ),
    };

    check_receiver_permission(&receiver_ty, &receiver_decl, span, &mut errors);

    // Resolve the signature under the receiver's instantiation.
    let (decl_generics, subst) = receiver_subst(ctx, &receiver_ty);
    let mut func_params = Vec::with_capacity(params.len());
    for param in &params {
        let raw = check!(
            resolve_type_expr(ctx, &param.ty, &decl_generics),
            Type::ErrorRecovery,
            warnings,
            errors
        );
        func_params.push(FuncParam {
            mode: param.mode,
            ty: subst_generics(&raw, &subst),
        });
    }
    let ret = match &ret {
        Some(ret) => {
            let raw = check!(
                resolve_type_expr(ctx, ret, &decl_generics),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            subst_generics(&raw, &subst)
        }
        None => Type::unit(),
    };

    check!(
        check_call_args(ctx, tcx, env, &func_params, args, span),
        HashMap::new(),
        warnings,
        errors
    );

    // Transitions rebuild the receiver in the target state.
    let result = match transition_target(ctx, &receiver_ty, name) {
        Some(target) => target,
        None => ret,
    };
    if errors.is_empty() {
        recovered(result, warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

/// A method found on the receiver itself, or a class default with its owner.
fn resolve_method(
    ctx: &ScopeContext,
    receiver_ty: &Type,
    name: &Ident,
    span: &Span,
) -> CompileResult<Either<OwnMethod, (classes::ClassRef, ClassMethodDecl)>> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let stripped = receiver_ty.strip_perm();

    match stripped {
        Type::Path { path, .. } => match ctx.lookup_type_decl(path) {
            Some(TypeDeclEntry::Record(decl)) => {
                let decl = decl.clone();
                if let Some(method) = decl.methods().find(|method| method.name == *name) {
                    return recovered(
                        Either::Left(OwnMethod {
                            receiver: method.receiver.clone(),
                            params: method.params.clone(),
                            return_type: method.return_type.clone(),
                        }),
                        warnings,
                        errors,
                    );
                }
                let default = check!(
                    classes::lookup_default_method(
                        ctx,
                        &decl.implements,
                        &name.name,
                        receiver_ty,
                        span
                    ),
                    return failed(warnings, errors),
                    warnings,
                    errors
                );
                match default {
                    Some((owner, method)) => recovered(Either::Right((owner, method)), warnings, errors),
                    None => {
                        errors.push(CompileError::UnknownMethod {
                            name: name.name.clone(),
                            ty: receiver_ty.friendly_type_str(),
                            span: span.clone(),
                        });
                        failed(warnings, errors)
                    }
                }
            }
            Some(TypeDeclEntry::Enum(decl)) => {
                let decl = decl.clone();
                let default = check!(
                    classes::lookup_default_method(
                        ctx,
                        &decl.implements,
                        &name.name,
                        receiver_ty,
                        span
                    ),
                    return failed(warnings, errors),
                    warnings,
                    errors
                );
                match default {
                    Some((owner, method)) => recovered(Either::Right((owner, method)), warnings, errors),
                    None => {
                        errors.push(CompileError::UnknownMethod {
                            name: name.name.clone(),
                            ty: receiver_ty.friendly_type_str(),
                            span: span.clone(),
                        });
                        failed(warnings, errors)
                    }
                }
            }
            _ => {
                errors.push(CompileError::UnknownMethod {
                    name: name.name.clone(),
                    ty: receiver_ty.friendly_type_str(),
                    span: span.clone(),
                });
                failed(warnings, errors)
            }
        },
        Type::ModalState { path, state, .. } => {
            let decl = match modal::lookup_modal(ctx, path) {
                Some(decl) => decl.clone(),
                None => {
                    errors.push(CompileError::UnknownMethod {
                        name: name.name.clone(),
                        ty: receiver_ty.friendly_type_str(),
                        span: span.clone(),
                    });
                    return failed(warnings, errors);
                }
            };
            let state_block = match modal::lookup_state(&decl, state) {
                Some(state_block) => state_block.clone(),
                None => {
                    errors.push(CompileError::UnknownMethod {
                        name: name.name.clone(),
                        ty: receiver_ty.friendly_type_str(),
                        span: span.clone(),
                    });
                    return failed(warnings, errors);
                }
            };
            if let Some(method) = modal::state_method(&state_block, &name.name) {
                return recovered(
                    Either::Left(OwnMethod {
                        receiver: Receiver::Shorthand(Permission::Const),
                        params: method.params.clone(),
                        return_type: method.return_type.clone(),
                    }),
                    warnings,
                    errors,
                );
            }
            if let Some(transition) = modal::state_transition(&state_block, &name.name) {
                return recovered(
                    Either::Left(OwnMethod {
                        receiver: Receiver::Shorthand(Permission::Unique),
                        params: transition.params.clone(),
                        return_type: None,
                    }),
                    warnings,
                    errors,
                );
            }
            let default = check!(
                classes::lookup_default_method(
                    ctx,
                    &decl.implements,
                    &name.name,
                    receiver_ty,
                    span
                ),
                return failed(warnings, errors),
                warnings,
                errors
            );
            match default {
                Some((owner, method)) => recovered(Either::Right((owner, method)), warnings, errors),
                None => {
                    errors.push(CompileError::UnknownMethod {
                        name: name.name.clone(),
                        ty: receiver_ty.friendly_type_str(),
                        span: span.clone(),
                    });
                    failed(warnings, errors)
                }
            }
        }
        Type::Dynamic(class_path) => {
            let table = check!(
                classes::class_method_table(ctx, class_path, span),
                return failed(warnings, errors),
                warnings,
                errors
            );
            match table
                .into_iter()
                .find(|entry| entry.method.name == *name)
            {
                Some(entry) => recovered(Either::Right((entry.owner, entry.method)), warnings, errors),
                None => {
                    errors.push(CompileError::UnknownMethod {
                        name: name.name.clone(),
                        ty: receiver_ty.friendly_type_str(),
                        span: span.clone(),
                    });
                    failed(warnings, errors)
                }
            }
        }
        _ => {
            errors.push(CompileError::UnknownMethod {
                name: name.name.clone(),
                ty: receiver_ty.friendly_type_str(),
                span: span.clone(),
            });
            failed(warnings, errors)
        }
    }
}

struct OwnMethod {
    receiver: Receiver,
    params: Vec<Param>,
    return_type: Option<TypeExpr>,
}

fn check_receiver_permission(
    receiver_ty: &Type,
    receiver_decl: &Receiver,
    span: &Span,
    errors: &mut Vec<CompileError>,
) {
    if let Receiver::Shorthand(Permission::Unique) = receiver_decl {
        if receiver_ty.perm_of() == Some(Permission::Const) {
            errors.push(CompileError::TypeMismatch {
                expected: format!("unique {}", receiver_ty.strip_perm().friendly_type_str()),
                received: receiver_ty.friendly_type_str(),
                help: "This method requires a `unique` receiver.".into(),
                span: span.clone(),
            });
        }
    }
}

/// Generic environment and substitution for a method resolved through a
/// nominal receiver.
fn receiver_subst(
    ctx: &ScopeContext,
    receiver_ty: &Type,
) -> (
    super::super::type_resolution::GenericsEnv,
    HashMap<String, Type>,
) {
    match receiver_ty.strip_perm() {
        Type::Path { path, args } | Type::ModalState { path, args, .. } => {
            match ctx.lookup_type_decl(path) {
                Some(entry) => {
                    let params = entry.type_parameters().to_vec();
                    let generics = super::super::type_resolution::generics_of(&params);
                    let subst = super::super::pattern::generic_subst(&params, args);
                    (generics, subst)
                }
                None => (Default::default(), HashMap::new()),
            }
        }
        _ => (Default::default(), HashMap::new()),
    }
}

/// If `name` is a transition on the receiver's current state, the call
/// produces the modal pinned to the transition's target state.
fn transition_target(ctx: &ScopeContext, receiver_ty: &Type, name: &Ident) -> Option<Type> {
    match receiver_ty.strip_perm() {
        Type::ModalState { path, state, args } => {
            let decl = modal::lookup_modal(ctx, path)?;
            let state_block = modal::lookup_state(decl, state)?;
            let transition = modal::state_transition(state_block, &name.name)?;
            Some(Type::ModalState {
                path: path.clone(),
                state: transition.target_state.name.clone(),
                args: args.clone(),
            })
        }
        _ => None,
    }
}
