//! Declaration-level checking: well-formedness of records, enums, modals,
//! classes and aliases, plus procedure signatures. Runs after toplevel
//! collection and before any body is typed.

use super::attributes::{check_attributes, AttrTarget};
use super::classes;
use super::scope_context::{ScopeContext, TypeDeclEntry};
use super::statement::{StmtTypeContext, TypeEnv};
use super::type_resolution::{generics_of, resolve_type_expr, GenericsEnv};
use crate::ast::*;
use crate::error::*;
use crate::ident::{IdKey, Ident};
use crate::span::Span;
use crate::style::{is_class_case_name, is_snake_case_name};
use crate::types::{FuncParam, Type};
use std::collections::HashSet;

/// Checks every declaration of every module. Body typing is a later phase;
/// here only signatures, shapes and field initializers are on the hook.
pub fn check_module_decls(ctx: &mut ScopeContext) -> CompileResult<()> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let modules = ctx.sigma.mods.clone();
    for module in &modules {
        ctx.enter_module(&module.path);
        for item in &module.items {
            match item {
                Item::Record(decl) => {
                    check!(
                        check_record_wf(ctx, decl),
                        continue,
                        warnings,
                        errors
                    );
                }
                Item::Enum(decl) => {
                    check!(check_enum_wf(ctx, decl), continue, warnings, errors);
                }
                Item::Modal(decl) => {
                    check!(check_modal_wf(ctx, decl), continue, warnings, errors);
                }
                Item::Class(decl) => {
                    check!(check_class_wf(ctx, decl), continue, warnings, errors);
                }
                Item::TypeAlias(decl) => {
                    check!(check_alias_wf(ctx, decl), continue, warnings, errors);
                }
                Item::Procedure(decl) => {
                    check!(
                        check_procedure_signature(ctx, decl),
                        continue,
                        warnings,
                        errors
                    );
                }
                Item::Static(decl) => {
                    if let Some(ty) = &decl.ty {
                        check!(
                            resolve_type_expr(ctx, ty, &HashSet::new()),
                            continue,
                            warnings,
                            errors
                        );
                    }
                }
                Item::Using(_) | Item::Error(_) => {}
            }
        }
    }
    if errors.is_empty() {
        recovered((), warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

fn check_duplicate_names<'a>(
    names: impl Iterator<Item = &'a Ident>,
    mut on_dup: impl FnMut(&Ident),
) {
    let mut seen: HashSet<IdKey> = HashSet::new();
    for name in names {
        if !seen.insert(name.key().clone()) {
            on_dup(name);
        }
    }
}

pub fn check_record_wf(ctx: &mut ScopeContext, decl: &RecordDecl) -> CompileResult<()> {
    let mut warnings = vec![];
    let mut errors = vec![];

    check!(
        check_attributes(&decl.attrs, AttrTarget::Record),
        (),
        warnings,
        errors
    );
    warn_unless(
        is_class_case_name(&decl.name.name),
        &mut warnings,
        decl.name.span.clone(),
        Warning::NonClassCaseRecordName {
            record_name: decl.name.name.clone()
        }
    );

    check_duplicate_names(decl.fields().map(|field| &field.name), |name| {
        errors.push(CompileError::RecordDupField {
            name: name.name.clone(),
            span: name.span.clone(),
        })
    });

    let generics = decl_generics(&decl.type_parameters, &decl.where_clause);
    for field in decl.fields() {
        warn_unless(
            is_snake_case_name(&field.name.name),
            &mut warnings,
            field.name.span.clone(),
            Warning::NonSnakeCaseFieldName {
                field_name: field.name.name.clone()
            }
        );
        let field_ty = check!(
            resolve_type_expr(ctx, &field.ty, &generics),
            continue,
            warnings,
            errors
        );
        if let Some(init) = &field.init {
            let tcx = StmtTypeContext::with_generics(Type::unit(), generics.clone());
            let mut env = TypeEnv::new();
            check!(
                super::expression::check_expr(ctx, &tcx, &mut env, init, &field_ty),
                continue,
                warnings,
                errors
            );
        }
    }

    for method in decl.methods() {
        check!(
            check_method_signature(ctx, &generics, &method.params, method.return_type.as_ref()),
            continue,
            warnings,
            errors
        );
    }

    let entry = TypeDeclEntry::Record(decl.clone());
    check!(
        classes::check_impl_completeness(ctx, &entry, &decl.span),
        (),
        warnings,
        errors
    );

    if errors.is_empty() {
        recovered((), warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

pub fn check_enum_wf(ctx: &mut ScopeContext, decl: &EnumDecl) -> CompileResult<()> {
    let mut warnings = vec![];
    let mut errors = vec![];

    check!(
        check_attributes(&decl.attrs, AttrTarget::Enum),
        (),
        warnings,
        errors
    );
    warn_unless(
        is_class_case_name(&decl.name.name),
        &mut warnings,
        decl.name.span.clone(),
        Warning::NonClassCaseEnumName {
            enum_name: decl.name.name.clone()
        }
    );

    check_duplicate_names(decl.variants.iter().map(|variant| &variant.name), |name| {
        errors.push(CompileError::EnumDupVariant {
            name: name.name.clone(),
            span: name.span.clone(),
        })
    });

    let generics = decl_generics(&decl.type_parameters, &decl.where_clause);
    for variant in &decl.variants {
        warn_unless(
            is_class_case_name(&variant.name.name),
            &mut warnings,
            variant.name.span.clone(),
            Warning::NonClassCaseEnumVariantName {
                variant_name: variant.name.name.clone()
            }
        );
        match &variant.payload {
            Some(VariantPayload::Tuple(elements)) => {
                for element in elements {
                    check!(
                        resolve_type_expr(ctx, element, &generics),
                        continue,
                        warnings,
                        errors
                    );
                }
            }
            Some(VariantPayload::Record(fields)) => {
                check_duplicate_names(fields.iter().map(|field| &field.name), |name| {
                    errors.push(CompileError::RecordDupField {
                        name: name.name.clone(),
                        span: name.span.clone(),
                    })
                });
                for field in fields {
                    check!(
                        resolve_type_expr(ctx, &field.ty, &generics),
                        continue,
                        warnings,
                        errors
                    );
                }
            }
            None => {}
        }
    }

    let entry = TypeDeclEntry::Enum(decl.clone());
    check!(
        classes::check_impl_completeness(ctx, &entry, &decl.span),
        (),
        warnings,
        errors
    );

    if errors.is_empty() {
        recovered((), warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

pub fn check_modal_wf(ctx: &mut ScopeContext, decl: &ModalDecl) -> CompileResult<()> {
    let mut warnings = vec![];
    let mut errors = vec![];

    check!(
        check_attributes(&decl.attrs, AttrTarget::Modal),
        (),
        warnings,
        errors
    );
    warn_unless(
        is_class_case_name(&decl.name.name),
        &mut warnings,
        decl.name.span.clone(),
        Warning::NonClassCaseModalName {
            modal_name: decl.name.name.clone()
        }
    );

    check_duplicate_names(decl.states.iter().map(|state| &state.name), |name| {
        errors.push(CompileError::ModalDupState {
            name: name.name.clone(),
            span: name.span.clone(),
        })
    });

    let generics = decl_generics(&decl.type_parameters, &decl.where_clause);
    for state in &decl.states {
        warn_unless(
            is_class_case_name(&state.name.name),
            &mut warnings,
            state.name.span.clone(),
            Warning::NonClassCaseModalStateName {
                state_name: state.name.name.clone()
            }
        );
        check_duplicate_names(state.fields().map(|field| &field.name), |name| {
            errors.push(CompileError::RecordDupField {
                name: name.name.clone(),
                span: name.span.clone(),
            })
        });
        for member in &state.members {
            match member {
                StateMember::Field(field) => {
                    check!(
                        resolve_type_expr(ctx, &field.ty, &generics),
                        continue,
                        warnings,
                        errors
                    );
                }
                StateMember::Method(method) => {
                    check!(
                        check_method_signature(
                            ctx,
                            &generics,
                            &method.params,
                            method.return_type.as_ref()
                        ),
                        continue,
                        warnings,
                        errors
                    );
                }
                StateMember::Transition(transition) => {
                    // The target state is the transition's whole point; a
                    // dangling target is fatal for the declaration.
                    if super::modal::lookup_state(decl, &transition.target_state.name).is_none() {
                        errors.push(CompileError::UnknownModalState {
                            path: decl.name.name.clone(),
                            state: transition.target_state.name.clone(),
                            span: transition.target_state.span.clone(),
                        });
                    }
                    check!(
                        check_method_signature(ctx, &generics, &transition.params, None),
                        continue,
                        warnings,
                        errors
                    );
                }
            }
        }
    }

    let entry = TypeDeclEntry::Modal(decl.clone());
    check!(
        classes::check_impl_completeness(ctx, &entry, &decl.span),
        (),
        warnings,
        errors
    );

    if errors.is_empty() {
        recovered((), warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

pub fn check_class_wf(ctx: &mut ScopeContext, decl: &ClassDecl) -> CompileResult<()> {
    let mut warnings = vec![];
    let mut errors = vec![];

    warn_unless(
        is_class_case_name(&decl.name.name),
        &mut warnings,
        decl.name.span.clone(),
        Warning::NonClassCaseClassName {
            class_name: decl.name.name.clone()
        }
    );

    // Supers must resolve and the hierarchy must linearize.
    let path = vec![decl.name.name.clone()];
    check!(
        classes::linearize(ctx, &path, &decl.span),
        return failed(warnings, errors),
        warnings,
        errors
    );

    let generics = decl_generics(&decl.type_parameters, &[]);
    for item in &decl.items {
        match item {
            ClassItem::Method(method) => {
                check!(
                    check_method_signature(
                        ctx,
                        &generics,
                        &method.params,
                        method.return_type.as_ref()
                    ),
                    continue,
                    warnings,
                    errors
                );
            }
            ClassItem::AssociatedType(assoc) => {
                if let Some(default) = &assoc.default {
                    check!(
                        resolve_type_expr(ctx, default, &generics),
                        continue,
                        warnings,
                        errors
                    );
                }
            }
            ClassItem::AbstractState(_) => {}
        }
    }

    if errors.is_empty() {
        recovered((), warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

pub fn check_alias_wf(ctx: &mut ScopeContext, decl: &TypeAliasDecl) -> CompileResult<()> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let generics = generics_of(&decl.type_parameters);
    check!(
        resolve_type_expr(ctx, &decl.ty, &generics),
        return failed(warnings, errors),
        warnings,
        errors
    );
    recovered((), warnings, errors)
}

pub fn check_procedure_signature(
    ctx: &mut ScopeContext,
    decl: &ProcedureDecl,
) -> CompileResult<()> {
    let mut warnings = vec![];
    let mut errors = vec![];

    check!(
        check_attributes(&decl.attrs, AttrTarget::Procedure),
        (),
        warnings,
        errors
    );
    warn_unless(
        is_snake_case_name(&decl.name.name),
        &mut warnings,
        decl.name.span.clone(),
        Warning::NonSnakeCaseProcedureName {
            name: decl.name.name.clone()
        }
    );

    let generics = decl_generics(&decl.type_parameters, &decl.where_clause);
    for param in &decl.type_parameters {
        for bound in &param.bounds {
            if ctx.lookup_class(bound).is_none() {
                errors.push(CompileError::SuperclassUndefined {
                    path: crate::ident::path_to_string(bound),
                    span: param.span.clone(),
                });
            }
        }
    }
    check!(
        check_method_signature(ctx, &generics, &decl.params, decl.return_type.as_ref()),
        return failed(warnings, errors),
        warnings,
        errors
    );
    if errors.is_empty() {
        recovered((), warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

fn check_method_signature(
    ctx: &ScopeContext,
    generics: &GenericsEnv,
    params: &[Param],
    return_type: Option<&TypeExpr>,
) -> CompileResult<()> {
    let mut warnings = vec![];
    let mut errors = vec![];
    for param in params {
        check!(
            resolve_type_expr(ctx, &param.ty, generics),
            continue,
            warnings,
            errors
        );
    }
    if let Some(return_type) = return_type {
        check!(
            resolve_type_expr(ctx, return_type, generics),
            return failed(warnings, errors),
            warnings,
            errors
        );
    }
    if errors.is_empty() {
        recovered((), warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

/// The generic environment a declaration's bodies and signatures resolve
/// under: its type parameters plus any where-clause-only parameters.
pub fn decl_generics(params: &[TypeParam], where_clause: &[WherePredicate]) -> GenericsEnv {
    let mut generics = generics_of(params);
    for predicate in where_clause {
        generics.insert(predicate.type_param.key().clone());
    }
    generics
}

/// The `Func` type of a declared procedure, for call sites resolving it by
/// name.
pub fn procedure_signature(ctx: &ScopeContext, decl: &ProcedureDecl) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let generics = decl_generics(&decl.type_parameters, &decl.where_clause);
    let mut params = Vec::with_capacity(decl.params.len());
    for param in &decl.params {
        let ty = check!(
            resolve_type_expr(ctx, &param.ty, &generics),
            Type::ErrorRecovery,
            warnings,
            errors
        );
        params.push(FuncParam {
            mode: param.mode,
            ty,
        });
    }
    let ret = match &decl.return_type {
        Some(return_type) => check!(
            resolve_type_expr(ctx, return_type, &generics),
            Type::ErrorRecovery,
            warnings,
            errors
        ),
        None => Type::unit(),
    };
    recovered(
        Type::Func {
            params,
            ret: Box::new(ret),
        },
        warnings,
        errors,
    )
}

/// Resolved parameter/return types for a procedure body: the environment its
/// block is typed in.
pub fn resolved_params(
    ctx: &ScopeContext,
    generics: &GenericsEnv,
    params: &[Param],
) -> CompileResult<Vec<(Ident, Type)>> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let mut out = Vec::with_capacity(params.len());
    for param in params {
        let ty = check!(
            resolve_type_expr(ctx, &param.ty, generics),
            Type::ErrorRecovery,
            warnings,
            errors
        );
        out.push((param.name.clone(), ty));
    }
    recovered(out, warnings, errors)
}

/// The span a declaration is best pointed at.
pub fn item_span(item: &Item) -> Span {
    match item {
        Item::Using(decl) => decl.span.clone(),
        Item::Static(decl) => decl.span.clone(),
        Item::Procedure(decl) => decl.span.clone(),
        Item::Record(decl) => decl.span.clone(),
        Item::Enum(decl) => decl.span.clone(),
        Item::Modal(decl) => decl.span.clone(),
        Item::Class(decl) => decl.span.clone(),
        Item::TypeAlias(decl) => decl.span.clone(),
        Item::Error(span) => span.clone(),
    }
}
