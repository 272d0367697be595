//! Place expressions: storage-designating expression chains rooted in a
//! binding or static, plus the projection typing shared between expression
//! inference and the assignment/address-of rules.

use super::scope_context::{ScopeContext, TypeDeclEntry};
use super::statement::{StmtTypeContext, TypeEnv};
use super::type_resolution::resolve_type_expr;
use crate::ast::*;
use crate::error::*;
use crate::ident::{path_to_string, IdKey};
use crate::span::Span;
use crate::types::const_len::const_eval_int;
use crate::types::{PtrState, Type};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum PlaceSeg {
    Field(IdKey),
    TupleIndex(u64),
    Index(u64),
    Deref,
}

#[derive(Debug, Clone)]
pub enum PlaceRoot {
    /// A local binding or parameter, by folded name.
    Binding(IdKey),
    /// A module-level static.
    Static { name: String, mutability: Mutability },
}

#[derive(Debug, Clone)]
pub struct PlaceInfo {
    pub ty: Type,
    pub root: PlaceRoot,
    /// Projection path from the root, outermost first.
    pub projection: Vec<PlaceSeg>,
}

/// Syntactic place check: identifiers, field/tuple/index projections and
/// dereferences of places.
pub fn is_place_expr(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Identifier(_) | ExprKind::QualifiedName { .. } => true,
        ExprKind::FieldAccess { base, .. }
        | ExprKind::TupleAccess { base, .. }
        | ExprKind::IndexAccess { base, .. } => is_place_expr(base),
        ExprKind::Deref(base) => is_place_expr(base),
        _ => false,
    }
}

/// Types a place expression. Returns `None` (without diagnostics) when the
/// expression is not place-shaped; the caller owns that error message.
pub fn place_info(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    expr: &Expr,
) -> CompileResult<Option<PlaceInfo>> {
    let mut warnings = vec![];
    let mut errors = vec![];

    let info = match &expr.kind {
        ExprKind::Identifier(name) => {
            if let Some(binding) = env.bind_of(name.key()) {
                Some(PlaceInfo {
                    ty: binding.ty.clone(),
                    root: PlaceRoot::Binding(name.key().clone()),
                    projection: vec![],
                })
            } else if let Some(decl) = ctx.lookup_static(&[], &name.name).cloned() {
                let ty = static_type(ctx, tcx, &decl, &mut warnings, &mut errors);
                Some(PlaceInfo {
                    ty,
                    root: PlaceRoot::Static {
                        name: decl.name.name.clone(),
                        mutability: decl.mutability,
                    },
                    projection: vec![],
                })
            } else {
                errors.push(CompileError::UnknownName {
                    name: name.name.clone(),
                    span: name.span.clone(),
                });
                return failed(warnings, errors);
            }
        }
        ExprKind::QualifiedName { path, name } => {
            match ctx.lookup_static(path, &name.name).cloned() {
                Some(decl) => {
                    let ty = static_type(ctx, tcx, &decl, &mut warnings, &mut errors);
                    Some(PlaceInfo {
                        ty,
                        root: PlaceRoot::Static {
                            name: format!("{}::{}", path_to_string(path), name.name),
                            mutability: decl.mutability,
                        },
                        projection: vec![],
                    })
                }
                None => None,
            }
        }
        ExprKind::FieldAccess { base, name } => {
            let base_info = check!(
                place_info(ctx, tcx, env, base),
                return failed(warnings, errors),
                warnings,
                errors
            );
            match base_info {
                Some(mut info) => {
                    let ty = check!(
                        project_field(ctx, &info.ty, name, &expr.span),
                        Type::ErrorRecovery,
                        warnings,
                        errors
                    );
                    info.projection.push(PlaceSeg::Field(name.key().clone()));
                    info.ty = ty;
                    Some(info)
                }
                None => None,
            }
        }
        ExprKind::TupleAccess { base, index } => {
            let base_info = check!(
                place_info(ctx, tcx, env, base),
                return failed(warnings, errors),
                warnings,
                errors
            );
            match base_info {
                Some(mut info) => {
                    let (ty, resolved_index) = check!(
                        project_tuple(&info.ty, *index, &expr.span),
                        (Type::ErrorRecovery, 0),
                        warnings,
                        errors
                    );
                    info.projection.push(PlaceSeg::TupleIndex(resolved_index));
                    info.ty = ty;
                    Some(info)
                }
                None => None,
            }
        }
        ExprKind::IndexAccess { base, index } => {
            let base_info = check!(
                place_info(ctx, tcx, env, base),
                return failed(warnings, errors),
                warnings,
                errors
            );
            match base_info {
                Some(mut info) => {
                    let (ty, resolved_index) = check!(
                        project_index(ctx, tcx, env, &info.ty, index, &expr.span),
                        (Type::ErrorRecovery, 0),
                        warnings,
                        errors
                    );
                    info.projection.push(PlaceSeg::Index(resolved_index));
                    info.ty = ty;
                    Some(info)
                }
                None => None,
            }
        }
        ExprKind::Deref(base) => {
            let base_info = check!(
                place_info(ctx, tcx, env, base),
                return failed(warnings, errors),
                warnings,
                errors
            );
            match base_info {
                Some(mut info) => {
                    let ty = check!(
                        deref_type(ctx, tcx, &info.ty, &expr.span),
                        Type::ErrorRecovery,
                        warnings,
                        errors
                    );
                    info.projection.push(PlaceSeg::Deref);
                    info.ty = ty;
                    Some(info)
                }
                None => None,
            }
        }
        _ => None,
    };

    if let Some(info) = &info {
        ctx.record_expr_type(expr.id, info.ty.clone());
    }
    recovered(info, warnings, errors)
}

fn static_type(
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
        // Unascribed statics carry their initializer's literal type; deeper
        // inference happens when the static itself is checked.
        None => match &decl.init.kind {
            ExprKind::IntLiteral { suffix, .. } => suffix
                .as_deref()
                .and_then(crate::types::Primitive::from_name)
                .map(Type::Prim)
                .unwrap_or(Type::Prim(crate::types::Primitive::I32)),
            ExprKind::BoolLiteral(_) => Type::bool(),
            ExprKind::FloatLiteral { .. } => Type::Prim(crate::types::Primitive::F64),
            ExprKind::CharLiteral(_) => Type::Prim(crate::types::Primitive::Char),
            ExprKind::StringLiteral(_) => Type::Str(Some(crate::types::SeqState::View)),
            _ => Type::ErrorRecovery,
        },
    }
}

/// Field projection, shared by expression typing and place typing. The outer
/// permission survives the projection.
pub fn project_field(
    ctx: &ScopeContext,
    base_ty: &Type,
    name: &crate::ident::Ident,
    span: &Span,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let perm = base_ty.perm_of();
    let stripped = base_ty.strip_perm();

    let projected = match stripped {
        Type::Path { path, args } => match ctx.lookup_type_decl(path) {
            Some(TypeDeclEntry::Record(decl)) => {
                let decl = decl.clone();
                let field = decl.fields().find(|field| field.name == *name).cloned();
                match field {
                    Some(field) => {
                        let decl_module = ctx.type_decl_module(path).unwrap_or_default();
                        if !super::visibility::can_access_keys(
                            &crate::ident::path_key(&ctx.current_module),
                            &decl_module,
                            field.vis,
                        ) {
                            errors.push(CompileError::FieldNotVisible {
                                field: name.name.clone(),
                                ty: stripped.friendly_type_str(),
                                span: span.clone(),
                            });
                        }
                        let decl_generics =
                            super::declaration::decl_generics(&decl.type_parameters, &[]);
                        let raw = check!(
                            resolve_type_expr(ctx, &field.ty, &decl_generics),
                            Type::ErrorRecovery,
                            warnings,
                            errors
                        );
                        let subst = super::pattern::generic_subst(&decl.type_parameters, args);
                        crate::types::subst_generics(&raw, &subst)
                    }
                    None => {
                        let available: Vec<String> = decl
                            .fields()
                            .map(|field| field.name.name.clone())
                            .collect();
                        errors.push(CompileError::UnknownField {
                            field: name.name.clone(),
                            ty: stripped.friendly_type_str(),
                            available: available.join(", "),
                            span: span.clone(),
                        });
                        Type::ErrorRecovery
                    }
                }
            }
            Some(TypeDeclEntry::Modal(decl)) => {
                let decl = decl.clone();
                // Without a pinned state, a field is reachable only when every
                // state declares it.
                if !super::modal::field_common_to_all_states(&decl, &name.name) {
                    errors.push(CompileError::ModalFieldNeedsState {
                        field: name.name.clone(),
                        ty: stripped.friendly_type_str(),
                        span: span.clone(),
                    });
                    Type::ErrorRecovery
                } else {
                    modal_state_field_type(ctx, &decl, &decl.states[0], name, args, span)
                        .unwrap_or_else(|mut errs| {
                            errors.append(&mut errs);
                            Type::ErrorRecovery
                        })
                }
            }
            _ => {
                errors.push(unknown_field_error(name, stripped, span));
                Type::ErrorRecovery
            }
        },
        Type::ModalState { path, state, args } => match super::modal::lookup_modal(ctx, path) {
            Some(decl) => {
                let decl = decl.clone();
                match super::modal::lookup_state(&decl, state) {
                    Some(state_block) => {
                        let state_block = state_block.clone();
                        match super::modal::state_field(&state_block, &name.name) {
                            Some(_) => modal_state_field_type(
                                ctx,
                                &decl,
                                &state_block,
                                name,
                                args,
                                span,
                            )
                            .unwrap_or_else(|mut errs| {
                                errors.append(&mut errs);
                                Type::ErrorRecovery
                            }),
                            None => {
                                errors.push(unknown_field_error(name, stripped, span));
                                Type::ErrorRecovery
                            }
                        }
                    }
                    None => {
                        errors.push(unknown_field_error(name, stripped, span));
                        Type::ErrorRecovery
                    }
                }
            }
            None => {
                errors.push(unknown_field_error(name, stripped, span));
                Type::ErrorRecovery
            }
        },
        Type::Union(_) => {
            errors.push(CompileError::UnionDirectAccess { span: span.clone() });
            Type::ErrorRecovery
        }
        Type::ErrorRecovery => Type::ErrorRecovery,
        _ => {
            errors.push(unknown_field_error(name, stripped, span));
            Type::ErrorRecovery
        }
    };

    let result = Type::wrap_perm(perm, projected);
    if errors.is_empty() {
        recovered(result, warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

fn unknown_field_error(name: &crate::ident::Ident, ty: &Type, span: &Span) -> CompileError {
    CompileError::UnknownField {
        field: name.name.clone(),
        ty: ty.friendly_type_str(),
        available: String::new(),
        span: span.clone(),
    }
}

fn modal_state_field_type(
    ctx: &ScopeContext,
    decl: &ModalDecl,
    state: &StateBlock,
    name: &crate::ident::Ident,
    args: &[Type],
    _span: &Span,
) -> Result<Type, Vec<CompileError>> {
    let field = match super::modal::state_field(state, &name.name) {
        Some(field) => field,
        None => return Ok(Type::ErrorRecovery),
    };
    let decl_generics = super::declaration::decl_generics(&decl.type_parameters, &[]);
    let mut warnings = vec![];
    let mut errors = vec![];
    match resolve_type_expr(ctx, &field.ty, &decl_generics).settle(&mut warnings, &mut errors) {
        Some(raw) => {
            let subst = super::pattern::generic_subst(&decl.type_parameters, args);
            Ok(crate::types::subst_generics(&raw, &subst))
        }
        None => Err(errors),
    }
}

/// Tuple projection: literal index, in bounds, permission preserved.
pub fn project_tuple(
    base_ty: &Type,
    index: Option<u64>,
    span: &Span,
) -> CompileResult<(Type, u64)> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let perm = base_ty.perm_of();
    let stripped = base_ty.strip_perm();

    let index = match index {
        Some(index) => index,
        None => {
            errors.push(CompileError::TupleIndexNotConst { span: span.clone() });
            return failed(warnings, errors);
        }
    };
    match stripped {
        Type::Tuple(elements) => {
            if (index as usize) >= elements.len() {
                errors.push(CompileError::TupleIndexOutOfBounds {
                    index,
                    len: elements.len(),
                    span: span.clone(),
                });
                return failed(warnings, errors);
            }
            let projected = Type::wrap_perm(perm, elements[index as usize].clone());
            recovered((projected, index), warnings, errors)
        }
        Type::ErrorRecovery => recovered((Type::ErrorRecovery, index), warnings, errors),
        _ => {
            errors.push(CompileError::IndexBaseNotIndexable {
                ty: stripped.friendly_type_str(),
                span: span.clone(),
            });
            failed(warnings, errors)
        }
    }
}

/// Constant array indexing. Slices reject direct indexing; ranges slice
/// instead (handled by expression typing before this is called).
pub fn project_index(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    base_ty: &Type,
    index: &Expr,
    span: &Span,
) -> CompileResult<(Type, u64)> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let perm = base_ty.perm_of();
    let stripped = base_ty.strip_perm().clone();

    match stripped {
        Type::Array(element, len) => {
            check!(
                super::expression::check_expr(ctx, tcx, env, index, &Type::usize()),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            let value = match const_eval_int(ctx, index) {
                Some(value) if value >= 0 => value as u64,
                Some(_) | None => {
                    errors.push(CompileError::ArrayIndexNotConst { span: span.clone() });
                    return failed(warnings, errors);
                }
            };
            if value >= len {
                errors.push(CompileError::ArrayIndexOutOfBounds {
                    index: value,
                    len,
                    span: span.clone(),
                });
                return failed(warnings, errors);
            }
            recovered(
                (Type::wrap_perm(perm, (*element).clone()), value),
                warnings,
                errors,
            )
        }
        Type::Slice(_) => {
            errors.push(CompileError::IndexSliceDirect { span: span.clone() });
            failed(warnings, errors)
        }
        Type::ErrorRecovery => recovered((Type::ErrorRecovery, 0), warnings, errors),
        other => {
            errors.push(CompileError::IndexBaseNotIndexable {
                ty: other.friendly_type_str(),
                span: span.clone(),
            });
            failed(warnings, errors)
        }
    }
}

/// Dereference typing: checked pointers must not be pinned to a dead state;
/// raw pointers demand an unsafe span.
pub fn deref_type(
    ctx: &ScopeContext,
    tcx: &StmtTypeContext,
    base_ty: &Type,
    span: &Span,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];
    match base_ty.strip_perm() {
        Type::Ptr(element, state) => match state {
            Some(PtrState::Valid) | None => recovered((**element).clone(), warnings, errors),
            Some(dead) => {
                errors.push(CompileError::DerefInvalidState {
                    state: dead.name().to_string(),
                    span: span.clone(),
                });
                failed(warnings, errors)
            }
        },
        Type::RawPtr(_, element) => {
            if !tcx.in_unsafe && !ctx.in_unsafe_span(span) {
                errors.push(CompileError::RawDerefOutsideUnsafe { span: span.clone() });
                return failed(warnings, errors);
            }
            recovered((**element).clone(), warnings, errors)
        }
        Type::ErrorRecovery => recovered(Type::ErrorRecovery, warnings, errors),
        other => {
            errors.push(CompileError::DerefNonPtr {
                ty: other.friendly_type_str(),
                span: span.clone(),
            });
            failed(warnings, errors)
        }
    }
}

/// The root-and-path permission key of a place expression, for the bind
/// checker. `None` when the expression is not rooted in a binding.
pub fn place_key_of(expr: &Expr) -> Option<(IdKey, Vec<PlaceSeg>)> {
    match &expr.kind {
        ExprKind::Identifier(name) => Some((name.key().clone(), vec![])),
        ExprKind::FieldAccess { base, name } => {
            let (root, mut path) = place_key_of(base)?;
            path.push(PlaceSeg::Field(name.key().clone()));
            Some((root, path))
        }
        ExprKind::TupleAccess { base, index } => {
            let (root, mut path) = place_key_of(base)?;
            path.push(PlaceSeg::TupleIndex(index.unwrap_or(0)));
            Some((root, path))
        }
        ExprKind::IndexAccess { base, index } => {
            let (root, mut path) = place_key_of(base)?;
            let resolved = match &index.kind {
                ExprKind::IntLiteral { value, .. } if *value >= 0 => *value as u64,
                _ => 0,
            };
            path.push(PlaceSeg::Index(resolved));
            Some((root, path))
        }
        ExprKind::Deref(base) => {
            let (root, mut path) = place_key_of(base)?;
            path.push(PlaceSeg::Deref);
            Some((root, path))
        }
        _ => None,
    }
}

