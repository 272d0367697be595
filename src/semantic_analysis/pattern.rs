//! Pattern typing: shape checking against the scrutinee type, binding
//! introduction with permission stripping, and refutability.

use super::modal::{lookup_state, state_field};
use super::scope_context::{ScopeContext, TypeDeclEntry};
use super::type_resolution::{resolve_type_expr, GenericsEnv};
use crate::ast::*;
use crate::error::*;
use crate::ident::{IdKey, Ident};
use crate::types::{type_equiv, Permission, Primitive, Type};
use std::collections::{HashMap, HashSet};

/// Types `pattern` against `expected` and returns the bindings it
/// introduces. Bindings inherit the scrutinee's outer permission around
/// their projected types.
pub fn type_pattern(
    ctx: &ScopeContext,
    generics: &GenericsEnv,
    pattern: &Pattern,
    expected: &Type,
) -> CompileResult<Vec<(Ident, Type)>> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let perm = expected.perm_of();
    let stripped = expected.strip_perm();

    let bindings = match &pattern.kind {
        PatternKind::Wildcard => vec![],
        PatternKind::Identifier(name) => vec![(name.clone(), expected.clone())],
        PatternKind::Typed { name, ty } => {
            let narrowed = check!(
                resolve_type_expr(ctx, ty, generics),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            let admissible = type_equiv(&narrowed, stripped)
                || union_has_member(stripped, &narrowed)
                || crate::types::is_subtype(ctx, &narrowed, stripped);
            if !admissible {
                errors.push(CompileError::PatternShape {
                    ty: expected.friendly_type_str(),
                    span: pattern.span.clone(),
                });
            }
            vec![(name.clone(), Type::wrap_perm(perm, narrowed))]
        }
        PatternKind::Literal(literal) => {
            check_literal_shape(literal, stripped, &pattern.span, &mut errors);
            vec![]
        }
        PatternKind::Tuple(elements) => match stripped {
            Type::Tuple(element_types) => {
                if element_types.len() != elements.len() {
                    errors.push(CompileError::PatternTupleArity {
                        expected: element_types.len(),
                        received: elements.len(),
                        span: pattern.span.clone(),
                    });
                    return failed(warnings, errors);
                }
                let mut bindings = vec![];
                for (sub, element_ty) in elements.iter().zip(element_types.iter()) {
                    let sub_expected = Type::wrap_perm(perm, element_ty.clone());
                    bindings.extend(check!(
                        type_pattern(ctx, generics, sub, &sub_expected),
                        vec![],
                        warnings,
                        errors
                    ));
                }
                bindings
            }
            Type::ErrorRecovery => vec![],
            _ => {
                errors.push(CompileError::PatternShape {
                    ty: expected.friendly_type_str(),
                    span: pattern.span.clone(),
                });
                return failed(warnings, errors);
            }
        },
        PatternKind::Record { path, fields } => {
            let (decl, subst) = match record_decl_for(ctx, path, stripped) {
                Some(found) => found,
                None => {
                    errors.push(CompileError::PatternShape {
                        ty: expected.friendly_type_str(),
                        span: pattern.span.clone(),
                    });
                    return failed(warnings, errors);
                }
            };
            let mut bindings = vec![];
            let mut seen: HashSet<IdKey> = HashSet::new();
            for field in fields {
                if !seen.insert(field.name.key().clone()) {
                    errors.push(CompileError::PatternDupField {
                        field: field.name.name.clone(),
                        span: field.span.clone(),
                    });
                    continue;
                }
                let field_decl = decl
                    .fields()
                    .find(|candidate| candidate.name == field.name)
                    .cloned();
                let field_decl = match field_decl {
                    Some(field_decl) => field_decl,
                    None => {
                        errors.push(CompileError::PatternUnknownField {
                            field: field.name.name.clone(),
                            ty: expected.friendly_type_str(),
                            span: field.span.clone(),
                        });
                        continue;
                    }
                };
                let decl_generics = super::declaration::decl_generics(&decl.type_parameters, &[]);
                let raw_ty = check!(
                    resolve_type_expr(ctx, &field_decl.ty, &decl_generics),
                    Type::ErrorRecovery,
                    warnings,
                    errors
                );
                let field_ty = crate::types::subst_generics(&raw_ty, &subst);
                let sub_expected = Type::wrap_perm(perm, field_ty);
                match &field.pattern {
                    Some(sub) => bindings.extend(check!(
                        type_pattern(ctx, generics, sub, &sub_expected),
                        vec![],
                        warnings,
                        errors
                    )),
                    None => bindings.push((field.name.clone(), sub_expected)),
                }
            }
            bindings
        }
        PatternKind::Enum {
            path,
            variant,
            payload,
        } => {
            let (decl, subst) = match enum_decl_for(ctx, path, stripped) {
                Some(found) => found,
                None => {
                    errors.push(CompileError::PatternShape {
                        ty: expected.friendly_type_str(),
                        span: pattern.span.clone(),
                    });
                    return failed(warnings, errors);
                }
            };
            let variant_decl = decl
                .variants
                .iter()
                .find(|candidate| candidate.name == *variant)
                .cloned();
            let variant_decl = match variant_decl {
                Some(variant_decl) => variant_decl,
                None => {
                    errors.push(CompileError::PatternShape {
                        ty: expected.friendly_type_str(),
                        span: variant.span.clone(),
                    });
                    return failed(warnings, errors);
                }
            };
            let decl_generics = super::declaration::decl_generics(&decl.type_parameters, &[]);
            check!(
                type_enum_payload(
                    ctx,
                    generics,
                    &decl_generics,
                    &subst,
                    perm,
                    &variant_decl,
                    payload.as_ref(),
                    pattern,
                    expected
                ),
                vec![],
                warnings,
                errors
            )
        }
        PatternKind::Modal { state, fields } => {
            let modal_path = match stripped {
                Type::Path { path, .. } | Type::ModalState { path, .. } => path.clone(),
                Type::ErrorRecovery => return recovered(vec![], warnings, errors),
                _ => {
                    errors.push(CompileError::PatternShape {
                        ty: expected.friendly_type_str(),
                        span: pattern.span.clone(),
                    });
                    return failed(warnings, errors);
                }
            };
            let decl = match super::modal::lookup_modal(ctx, &modal_path) {
                Some(decl) => decl.clone(),
                None => {
                    errors.push(CompileError::PatternShape {
                        ty: expected.friendly_type_str(),
                        span: pattern.span.clone(),
                    });
                    return failed(warnings, errors);
                }
            };
            let state_block = match lookup_state(&decl, &state.name) {
                Some(state_block) => state_block.clone(),
                None => {
                    errors.push(CompileError::UnknownModalState {
                        path: crate::ident::path_to_string(&modal_path),
                        state: state.name.clone(),
                        span: state.span.clone(),
                    });
                    return failed(warnings, errors);
                }
            };
            let mut bindings = vec![];
            if let Some(fields) = fields {
                let mut seen: HashSet<IdKey> = HashSet::new();
                for field in fields {
                    if !seen.insert(field.name.key().clone()) {
                        errors.push(CompileError::PatternDupField {
                            field: field.name.name.clone(),
                            span: field.span.clone(),
                        });
                        continue;
                    }
                    let field_decl = match state_field(&state_block, &field.name.name) {
                        Some(field_decl) => field_decl.clone(),
                        None => {
                            errors.push(CompileError::PatternUnknownField {
                                field: field.name.name.clone(),
                                ty: expected.friendly_type_str(),
                                span: field.span.clone(),
                            });
                            continue;
                        }
                    };
                    let decl_generics =
                        super::declaration::decl_generics(&decl.type_parameters, &[]);
                    let field_ty = check!(
                        resolve_type_expr(ctx, &field_decl.ty, &decl_generics),
                        Type::ErrorRecovery,
                        warnings,
                        errors
                    );
                    let sub_expected = Type::wrap_perm(perm, field_ty);
                    match &field.pattern {
                        Some(sub) => bindings.extend(check!(
                            type_pattern(ctx, generics, sub, &sub_expected),
                            vec![],
                            warnings,
                            errors
                        )),
                        None => bindings.push((field.name.clone(), sub_expected)),
                    }
                }
            }
            bindings
        }
        PatternKind::Range { lo, hi, inclusive } => {
            check_range_shape(lo, hi, *inclusive, stripped, &pattern.span, &mut errors);
            vec![]
        }
    };

    if errors.is_empty() {
        recovered(bindings, warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

fn check_literal_shape(
    literal: &PatternLiteral,
    stripped: &Type,
    span: &crate::span::Span,
    errors: &mut Vec<CompileError>,
) {
    let fits = match (literal, stripped.as_prim()) {
        (PatternLiteral::Int(_), Some(prim)) => prim.is_integer(),
        (PatternLiteral::Bool(_), Some(Primitive::Bool)) => true,
        (PatternLiteral::Char(_), Some(Primitive::Char)) => true,
        (_, _) => stripped.is_error_recovery(),
    };
    if !fits {
        errors.push(CompileError::PatternShape {
            ty: stripped.friendly_type_str(),
            span: span.clone(),
        });
    }
}

fn check_range_shape(
    lo: &PatternLiteral,
    hi: &PatternLiteral,
    inclusive: bool,
    stripped: &Type,
    span: &crate::span::Span,
    errors: &mut Vec<CompileError>,
) {
    let (lo, hi) = match (lo, hi) {
        (PatternLiteral::Int(lo), PatternLiteral::Int(hi)) => (*lo, *hi),
        (PatternLiteral::Char(lo), PatternLiteral::Char(hi)) => (*lo as i128, *hi as i128),
        _ => {
            errors.push(CompileError::RangePatternNotConst { span: span.clone() });
            return;
        }
    };
    let prim_ok = stripped
        .as_prim()
        .map(|prim| prim.is_integer() || prim == Primitive::Char)
        .unwrap_or_else(|| stripped.is_error_recovery());
    if !prim_ok {
        errors.push(CompileError::PatternShape {
            ty: stripped.friendly_type_str(),
            span: span.clone(),
        });
        return;
    }
    let empty = if inclusive { lo > hi } else { lo >= hi };
    if empty {
        errors.push(CompileError::RangePatternEmpty { span: span.clone() });
    }
}

fn type_enum_payload(
    ctx: &ScopeContext,
    generics: &GenericsEnv,
    decl_generics: &GenericsEnv,
    subst: &HashMap<String, Type>,
    perm: Option<Permission>,
    variant: &VariantDecl,
    payload: Option<&EnumPayloadPattern>,
    pattern: &Pattern,
    expected: &Type,
) -> CompileResult<Vec<(Ident, Type)>> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let mut bindings = vec![];

    match (&variant.payload, payload) {
        (None, None) => {}
        (Some(VariantPayload::Tuple(declared)), Some(EnumPayloadPattern::Tuple(subs))) => {
            if declared.len() != subs.len() {
                errors.push(CompileError::PatternTupleArity {
                    expected: declared.len(),
                    received: subs.len(),
                    span: pattern.span.clone(),
                });
                return failed(warnings, errors);
            }
            for (sub, declared_ty) in subs.iter().zip(declared.iter()) {
                let raw = check!(
                    resolve_type_expr(ctx, declared_ty, decl_generics),
                    Type::ErrorRecovery,
                    warnings,
                    errors
                );
                let sub_expected = Type::wrap_perm(perm, crate::types::subst_generics(&raw, subst));
                bindings.extend(check!(
                    type_pattern(ctx, generics, sub, &sub_expected),
                    vec![],
                    warnings,
                    errors
                ));
            }
        }
        (Some(VariantPayload::Record(declared)), Some(EnumPayloadPattern::Record(subs))) => {
            let mut seen: HashSet<IdKey> = HashSet::new();
            for field in subs {
                if !seen.insert(field.name.key().clone()) {
                    errors.push(CompileError::PatternDupField {
                        field: field.name.name.clone(),
                        span: field.span.clone(),
                    });
                    continue;
                }
                let field_decl = declared
                    .iter()
                    .find(|candidate| candidate.name == field.name);
                let field_decl = match field_decl {
                    Some(field_decl) => field_decl,
                    None => {
                        errors.push(CompileError::PatternUnknownField {
                            field: field.name.name.clone(),
                            ty: expected.friendly_type_str(),
                            span: field.span.clone(),
                        });
                        continue;
                    }
                };
                let raw = check!(
                    resolve_type_expr(ctx, &field_decl.ty, decl_generics),
                    Type::ErrorRecovery,
                    warnings,
                    errors
                );
                let sub_expected = Type::wrap_perm(perm, crate::types::subst_generics(&raw, subst));
                match &field.pattern {
                    Some(sub) => bindings.extend(check!(
                        type_pattern(ctx, generics, sub, &sub_expected),
                        vec![],
                        warnings,
                        errors
                    )),
                    None => bindings.push((field.name.clone(), sub_expected)),
                }
            }
        }
        _ => {
            errors.push(CompileError::PatternShape {
                ty: expected.friendly_type_str(),
                span: pattern.span.clone(),
            });
            return failed(warnings, errors);
        }
    }

    if errors.is_empty() {
        recovered(bindings, warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

/// Finds the record declaration a record pattern refers to, requiring it to
/// match the scrutinee's nominal path, and the generic substitution from the
/// scrutinee's arguments.
fn record_decl_for(
    ctx: &ScopeContext,
    pattern_path: &[String],
    stripped: &Type,
) -> Option<(RecordDecl, HashMap<String, Type>)> {
    let (scrutinee_path, args) = match stripped {
        Type::Path { path, args } => (path, args),
        _ => return None,
    };
    if !paths_agree(ctx, pattern_path, scrutinee_path) {
        return None;
    }
    match ctx.lookup_type_decl(scrutinee_path) {
        Some(TypeDeclEntry::Record(decl)) => {
            let subst = generic_subst(&decl.type_parameters, args);
            Some((decl.clone(), subst))
        }
        _ => None,
    }
}

fn enum_decl_for(
    ctx: &ScopeContext,
    pattern_path: &[String],
    stripped: &Type,
) -> Option<(EnumDecl, HashMap<String, Type>)> {
    let (scrutinee_path, args) = match stripped {
        Type::Path { path, args } => (path, args),
        _ => return None,
    };
    if !paths_agree(ctx, pattern_path, scrutinee_path) {
        return None;
    }
    match ctx.lookup_type_decl(scrutinee_path) {
        Some(TypeDeclEntry::Enum(decl)) => {
            let subst = generic_subst(&decl.type_parameters, args);
            Some((decl.clone(), subst))
        }
        _ => None,
    }
}

pub(crate) fn paths_agree(ctx: &ScopeContext, written: &[String], canonical: &[String]) -> bool {
    if let (Some(a), Some(b)) = (
        ctx.type_decl_module(written),
        ctx.type_decl_module(canonical),
    ) {
        let mut key_a = a;
        key_a.push(crate::ident::id_key(written.last().map(String::as_str).unwrap_or("")));
        let mut key_b = b;
        key_b.push(crate::ident::id_key(
            canonical.last().map(String::as_str).unwrap_or(""),
        ));
        key_a == key_b
    } else {
        false
    }
}

pub(crate) fn generic_subst(params: &[TypeParam], args: &[Type]) -> HashMap<String, Type> {
    params
        .iter()
        .map(|param| param.name.name.clone())
        .zip(args.iter().cloned())
        .collect()
}

fn union_has_member(ty: &Type, candidate: &Type) -> bool {
    match ty {
        Type::Union(members) => members.iter().any(|member| type_equiv(member, candidate)),
        _ => false,
    }
}

/// Whether a pattern can never fail against `expected`. Refutable patterns
/// are rejected in `let`/`var` position and count for match exhaustiveness.
pub fn irrefutable_pattern(ctx: &ScopeContext, pattern: &Pattern, expected: &Type) -> bool {
    let stripped = expected.strip_perm();
    match &pattern.kind {
        PatternKind::Wildcard | PatternKind::Identifier(_) => true,
        PatternKind::Typed { ty, .. } => {
            // Only a trivial narrowing is irrefutable; checked without
            // diagnostics.
            let mut warnings = vec![];
            let mut errors = vec![];
            match resolve_type_expr(ctx, ty, &GenericsEnv::new()).settle(&mut warnings, &mut errors) {
                Some(narrowed) => type_equiv(&narrowed, stripped),
                None => false,
            }
        }
        PatternKind::Literal(_) | PatternKind::Range { .. } => false,
        PatternKind::Tuple(elements) => match stripped {
            Type::Tuple(element_types) if element_types.len() == elements.len() => elements
                .iter()
                .zip(element_types.iter())
                .all(|(sub, ty)| irrefutable_pattern(ctx, sub, ty)),
            _ => false,
        },
        PatternKind::Record { fields, .. } => fields.iter().all(|field| {
            field
                .pattern
                .as_ref()
                .map(|sub| {
                    // Field projections are checked for shape during typing;
                    // refutability only needs the sub-pattern's own shape.
                    matches!(
                        sub.kind,
                        PatternKind::Wildcard | PatternKind::Identifier(_)
                    ) || irrefutable_against_unknown(sub)
                })
                .unwrap_or(true)
        }),
        PatternKind::Enum { path, .. } => match stripped {
            Type::Path {
                path: scrutinee, ..
            } => match ctx.lookup_type_decl(scrutinee) {
                Some(TypeDeclEntry::Enum(decl)) => {
                    decl.variants.len() == 1 && paths_agree(ctx, path, scrutinee)
                }
                _ => false,
            },
            _ => false,
        },
        PatternKind::Modal { state, .. } => match stripped {
            Type::ModalState {
                state: scrutinee_state,
                ..
            } => crate::ident::id_key(scrutinee_state) == *state.key(),
            Type::Path { path, .. } => super::modal::lookup_modal(ctx, path)
                .map(|decl| decl.states.len() == 1 && lookup_state(decl, &state.name).is_some())
                .unwrap_or(false),
            _ => false,
        },
    }
}

fn irrefutable_against_unknown(pattern: &Pattern) -> bool {
    match &pattern.kind {
        PatternKind::Wildcard | PatternKind::Identifier(_) => true,
        PatternKind::Tuple(elements) => elements.iter().all(irrefutable_against_unknown),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Span;

    fn pattern(kind: PatternKind) -> Pattern {
        Pattern {
            span: Span::builtin(),
            kind,
        }
    }

    #[test]
    fn bindings_keep_the_scrutinee_permission() {
        let ctx = ScopeContext::for_tests();
        let scrutinee = Type::Perm(
            Permission::Const,
            Box::new(Type::Tuple(vec![Type::bool(), Type::usize()])),
        );
        let pat = pattern(PatternKind::Tuple(vec![
            pattern(PatternKind::Identifier(Ident::builtin("flag"))),
            pattern(PatternKind::Wildcard),
        ]));
        let mut warnings = vec![];
        let mut errors = vec![];
        let bindings = type_pattern(&ctx, &GenericsEnv::new(), &pat, &scrutinee)
            .settle(&mut warnings, &mut errors)
            .expect("tuple pattern types");
        assert_eq!(bindings.len(), 1);
        assert_eq!(
            bindings[0].1,
            Type::Perm(Permission::Const, Box::new(Type::bool()))
        );
    }

    #[test]
    fn tuple_arity_mismatch_is_reported() {
        let ctx = ScopeContext::for_tests();
        let scrutinee = Type::Tuple(vec![Type::bool()]);
        let pat = pattern(PatternKind::Tuple(vec![
            pattern(PatternKind::Wildcard),
            pattern(PatternKind::Wildcard),
        ]));
        let res = type_pattern(&ctx, &GenericsEnv::new(), &pat, &scrutinee);
        assert!(res
            .errors()
            .iter()
            .any(|error| matches!(error, CompileError::PatternTupleArity { .. })));
    }

    #[test]
    fn literal_patterns_are_refutable() {
        let ctx = ScopeContext::for_tests();
        let pat = pattern(PatternKind::Literal(PatternLiteral::Int(3)));
        assert!(!irrefutable_pattern(
            &ctx,
            &pat,
            &Type::Prim(crate::types::Primitive::I32)
        ));
        let ident = pattern(PatternKind::Identifier(Ident::builtin("x")));
        assert!(irrefutable_pattern(
            &ctx,
            &ident,
            &Type::Prim(crate::types::Primitive::I32)
        ));
    }
}
