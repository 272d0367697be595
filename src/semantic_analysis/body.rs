//! Body-level phases: typing every procedure, method, transition and static
//! initializer, then running the bind checker over each of them.

use super::bind_check::bind_check_body;
use super::declaration::decl_generics;
use super::scope_context::{ScopeContext, ScopeKind};
use super::statement::{type_block, StmtTypeContext, TypeBinding, TypeEnv};
use super::type_resolution::{generics_of, resolve_type_expr, GenericsEnv};
use crate::ast::*;
use crate::error::*;
use crate::ident::Ident;
use crate::types::{Permission, Type};

/// Types every body in every module. Expression types land in the context's
/// `expr -> type` map as a side effect, which the bind checker consumes.
pub fn check_module_bodies(ctx: &mut ScopeContext) -> CompileResult<()> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let modules = ctx.sigma.mods.clone();
    for module in &modules {
        ctx.enter_module(&module.path);
        for item in &module.items {
            match item {
                Item::Static(decl) => {
                    check!(
                        check_static_body(ctx, decl),
                        continue,
                        warnings,
                        errors
                    );
                }
                Item::Procedure(decl) => {
                    check!(
                        check_procedure_body(ctx, decl),
                        continue,
                        warnings,
                        errors
                    );
                }
                Item::Record(decl) => {
                    let self_ty = nominal_self_type(&decl.name, &decl.type_parameters);
                    for method in decl.methods() {
                        check!(
                            check_callable_body(
                                ctx,
                                &decl_generics(&decl.type_parameters, &decl.where_clause),
                                Some((&method.receiver, self_ty.clone())),
                                &method.params,
                                method.return_type.as_ref(),
                                &method.body,
                            ),
                            continue,
                            warnings,
                            errors
                        );
                    }
                }
                Item::Modal(decl) => {
                    let generics = decl_generics(&decl.type_parameters, &decl.where_clause);
                    for state in &decl.states {
                        let self_ty = modal_self_type(decl, state);
                        for member in &state.members {
                            match member {
                                StateMember::Method(method) => {
                                    check!(
                                        check_callable_body(
                                            ctx,
                                            &generics,
                                            Some((
                                                &Receiver::Shorthand(Permission::Const),
                                                self_ty.clone()
                                            )),
                                            &method.params,
                                            method.return_type.as_ref(),
                                            &method.body,
                                        ),
                                        continue,
                                        warnings,
                                        errors
                                    );
                                }
                                StateMember::Transition(transition) => {
                                    check!(
                                        check_callable_body(
                                            ctx,
                                            &generics,
                                            Some((
                                                &Receiver::Shorthand(Permission::Unique),
                                                self_ty.clone()
                                            )),
                                            &transition.params,
                                            None,
                                            &transition.body,
                                        ),
                                        continue,
                                        warnings,
                                        errors
                                    );
                                }
                                StateMember::Field(_) => {}
                            }
                        }
                    }
                }
                Item::Class(decl) => {
                    let generics = generics_of(&decl.type_parameters);
                    let self_ty = Type::Dynamic(vec![decl.name.name.clone()]);
                    for class_item in &decl.items {
                        if let ClassItem::Method(method) = class_item {
                            if let Some(body) = &method.body {
                                check!(
                                    check_callable_body(
                                        ctx,
                                        &generics,
                                        Some((&method.receiver, self_ty.clone())),
                                        &method.params,
                                        method.return_type.as_ref(),
                                        body,
                                    ),
                                    continue,
                                    warnings,
                                    errors
                                );
                            }
                        }
                    }
                }
                Item::Enum(_) | Item::TypeAlias(_) | Item::Using(_) | Item::Error(_) => {}
            }
        }
    }
    if errors.is_empty() {
        recovered((), warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

/// Bind-checks every body typed above.
pub fn bind_check_modules(ctx: &mut ScopeContext) -> CompileResult<()> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let modules = ctx.sigma.mods.clone();
    for module in &modules {
        ctx.enter_module(&module.path);
        for item in &module.items {
            match item {
                Item::Procedure(decl) => {
                    check!(
                        bind_check_body(ctx, &decl.params, &decl.body, None),
                        continue,
                        warnings,
                        errors
                    );
                }
                Item::Record(decl) => {
                    for method in decl.methods() {
                        let self_param = receiver_param(&method.receiver, &method.span);
                        check!(
                            bind_check_body(ctx, &method.params, &method.body, Some(&self_param)),
                            continue,
                            warnings,
                            errors
                        );
                    }
                }
                Item::Modal(decl) => {
                    for state in &decl.states {
                        for member in &state.members {
                            match member {
                                StateMember::Method(method) => {
                                    let self_param = receiver_param(
                                        &Receiver::Shorthand(Permission::Const),
                                        &method.span,
                                    );
                                    check!(
                                        bind_check_body(
                                            ctx,
                                            &method.params,
                                            &method.body,
                                            Some(&self_param)
                                        ),
                                        continue,
                                        warnings,
                                        errors
                                    );
                                }
                                StateMember::Transition(transition) => {
                                    let self_param = receiver_param(
                                        &Receiver::Shorthand(Permission::Unique),
                                        &transition.span,
                                    );
                                    check!(
                                        bind_check_body(
                                            ctx,
                                            &transition.params,
                                            &transition.body,
                                            Some(&self_param)
                                        ),
                                        continue,
                                        warnings,
                                        errors
                                    );
                                }
                                StateMember::Field(_) => {}
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
    if errors.is_empty() {
        recovered((), warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

fn check_static_body(ctx: &mut ScopeContext, decl: &StaticDecl) -> CompileResult<()> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let tcx = StmtTypeContext::new(Type::unit());
    let mut env = TypeEnv::new();
    match &decl.ty {
        Some(ascription) => {
            let expected = check!(
                resolve_type_expr(ctx, ascription, &tcx.generics),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            check!(
                super::expression::check_expr(ctx, &tcx, &mut env, &decl.init, &expected),
                Type::ErrorRecovery,
                warnings,
                errors
            );
        }
        None => {
            check!(
                super::expression::infer_expr(ctx, &tcx, &mut env, &decl.init),
                Type::ErrorRecovery,
                warnings,
                errors
            );
        }
    }
    if errors.is_empty() {
        recovered((), warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

fn check_procedure_body(ctx: &mut ScopeContext, decl: &ProcedureDecl) -> CompileResult<()> {
    let generics = decl_generics(&decl.type_parameters, &decl.where_clause);
    check_callable_body(
        ctx,
        &generics,
        None,
        &decl.params,
        decl.return_type.as_ref(),
        &decl.body,
    )
}

/// Shared body-typing for procedures, methods and transitions: resolve the
/// signature, bind parameters (and `self`), type the block against the
/// return type.
fn check_callable_body(
    ctx: &mut ScopeContext,
    generics: &GenericsEnv,
    self_binding: Option<(&Receiver, Type)>,
    params: &[Param],
    return_type: Option<&TypeExpr>,
    body: &Block,
) -> CompileResult<()> {
    let mut warnings = vec![];
    let mut errors = vec![];

    let ret = match return_type {
        Some(return_type) => check!(
            resolve_type_expr(ctx, return_type, generics),
            Type::ErrorRecovery,
            warnings,
            errors
        ),
        None => Type::unit(),
    };
    let tcx = StmtTypeContext::with_generics(ret.clone(), generics.clone());

    let mut env = TypeEnv::new();
    ctx.push_scope(ScopeKind::Procedure);
    if let Some((receiver, self_ty)) = &self_binding {
        let bound = match receiver {
            Receiver::Shorthand(perm) => Type::Perm(*perm, Box::new(self_ty.clone())),
            Receiver::Explicit { ty, .. } => check!(
                resolve_type_expr(ctx, ty, generics),
                self_ty.clone(),
                warnings,
                errors
            ),
        };
        env.insert(
            crate::ident::id_key("self"),
            TypeBinding {
                mutability: Mutability::Let,
                ty: bound,
            },
        );
    }
    for param in params {
        let ty = check!(
            resolve_type_expr(ctx, &param.ty, generics),
            Type::ErrorRecovery,
            warnings,
            errors
        );
        env.insert(
            param.name.key().clone(),
            TypeBinding {
                mutability: Mutability::Let,
                ty,
            },
        );
    }

    let res = type_block(ctx, &tcx, &mut env, body);
    ctx.pop_scope();
    let (body_ty, flow) = check!(
        res,
        (Type::ErrorRecovery, Default::default()),
        warnings,
        errors
    );

    // An expression-bodied block must fit the return type; statement-bodied
    // blocks rely on their `return`s, which were checked individually.
    if body.tail.is_some() {
        check!(
            crate::types::subtyping::check_subtype(
                ctx,
                &body_ty,
                &ret,
                &body.span,
                "The body's trailing expression must fit the declared return type.",
            ),
            (),
            warnings,
            errors
        );
    } else if flow.results.is_empty() && !ret.is_unit() && !ret.is_error_recovery() {
        errors.push(CompileError::TypeMismatch {
            expected: ret.friendly_type_str(),
            received: "()".into(),
            help: "This body never returns a value.".into(),
            span: body.span.clone(),
        });
    }

    if errors.is_empty() {
        recovered((), warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

fn nominal_self_type(name: &Ident, params: &[TypeParam]) -> Type {
    Type::Path {
        path: vec![name.name.clone()],
        args: params
            .iter()
            .map(|param| Type::Generic {
                name: param.name.name.clone(),
            })
            .collect(),
    }
}

fn modal_self_type(decl: &ModalDecl, state: &StateBlock) -> Type {
    Type::ModalState {
        path: vec![decl.name.name.clone()],
        state: state.name.name.clone(),
        args: decl
            .type_parameters
            .iter()
            .map(|param| Type::Generic {
                name: param.name.name.clone(),
            })
            .collect(),
    }
}

fn receiver_param(receiver: &Receiver, span: &crate::span::Span) -> Param {
    let mode = match receiver {
        Receiver::Shorthand(_) => None,
        Receiver::Explicit { mode, .. } => *mode,
    };
    Param {
        mode,
        name: Ident::new("self", span.clone()),
        ty: TypeExpr::new(TypeExprKind::Tuple(vec![]), span.clone()),
        span: span.clone(),
    }
}
