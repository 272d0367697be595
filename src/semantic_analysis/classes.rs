//! Class machinery: C3 linearization, method-resolution tables, default
//! method lookup, implementation completeness and the orphan rule.

use super::scope_context::{ScopeContext, TypeDeclEntry};
use crate::ast::*;
use crate::error::*;
use crate::ident::{path_key, path_to_string, IdKey};
use crate::span::Span;
use crate::types::Type;
use std::collections::BTreeMap;

/// A class identity: its folded signature key plus the path as written, for
/// diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRef {
    pub key: Vec<IdKey>,
    pub path: ClassPath,
}

fn class_ref(ctx: &ScopeContext, path: &[String]) -> Option<ClassRef> {
    let module = ctx.class_decl_module(path)?;
    let decl = ctx.lookup_class(path)?;
    let mut key = module;
    key.push(decl.name.key().clone());
    Some(ClassRef {
        key,
        path: path.to_vec(),
    })
}

/// C3 linearization of `path`'s superclass hierarchy, the class itself
/// first. Fails on unknown superclasses and on hierarchies with no
/// consistent merge order.
pub fn linearize(ctx: &ScopeContext, path: &[String], span: &Span) -> CompileResult<Vec<ClassRef>> {
    let mut warnings = vec![];
    let mut errors = vec![];
    match linearize_inner(ctx, path, &mut Vec::new()) {
        Ok(order) => recovered(order, warnings, errors),
        Err(LinearizeError::Unknown(missing)) => {
            errors.push(CompileError::SuperclassUndefined {
                path: missing,
                span: span.clone(),
            });
            failed(warnings, errors)
        }
        Err(LinearizeError::Inconsistent) | Err(LinearizeError::Cyclic) => {
            errors.push(CompileError::LinearizationFailed {
                class_path: path_to_string(path),
                span: span.clone(),
            });
            failed(warnings, errors)
        }
    }
}

enum LinearizeError {
    Unknown(String),
    Inconsistent,
    Cyclic,
}

fn linearize_inner(
    ctx: &ScopeContext,
    path: &[String],
    visiting: &mut Vec<Vec<IdKey>>,
) -> Result<Vec<ClassRef>, LinearizeError> {
    let this = class_ref(ctx, path)
        .ok_or_else(|| LinearizeError::Unknown(path_to_string(path)))?;
    if visiting.contains(&this.key) {
        return Err(LinearizeError::Cyclic);
    }
    visiting.push(this.key.clone());
    let decl = ctx
        .lookup_class(path)
        .ok_or_else(|| LinearizeError::Unknown(path_to_string(path)))?
        .clone();

    let mut sequences: Vec<Vec<ClassRef>> = Vec::new();
    for superclass in &decl.supers {
        sequences.push(linearize_inner(ctx, superclass, visiting)?);
    }
    let direct: Vec<ClassRef> = decl
        .supers
        .iter()
        .filter_map(|superclass| class_ref(ctx, superclass))
        .collect();
    if direct.len() != decl.supers.len() {
        visiting.pop();
        return Err(LinearizeError::Unknown(
            decl.supers
                .iter()
                .find(|superclass| class_ref(ctx, superclass).is_none())
                .map(|superclass| path_to_string(superclass))
                .unwrap_or_default(),
        ));
    }
    sequences.push(direct);
    visiting.pop();

    let merged = c3_merge(sequences).ok_or(LinearizeError::Inconsistent)?;
    let mut order = vec![this];
    for item in merged {
        if !order.iter().any(|existing| existing.key == item.key) {
            order.push(item);
        }
    }
    Ok(order)
}

/// The C3 merge: repeatedly take the head of some sequence that appears in
/// no other sequence's tail.
fn c3_merge(mut sequences: Vec<Vec<ClassRef>>) -> Option<Vec<ClassRef>> {
    let mut out = Vec::new();
    loop {
        sequences.retain(|sequence| !sequence.is_empty());
        if sequences.is_empty() {
            return Some(out);
        }
        let mut picked: Option<ClassRef> = None;
        for sequence in &sequences {
            let head = &sequence[0];
            let in_some_tail = sequences
                .iter()
                .any(|other| other.iter().skip(1).any(|item| item.key == head.key));
            if !in_some_tail {
                picked = Some(head.clone());
                break;
            }
        }
        let picked = picked?;
        for sequence in sequences.iter_mut() {
            if sequence.first().map(|head| head.key == picked.key).unwrap_or(false) {
                sequence.remove(0);
            }
        }
        out.push(picked);
    }
}

/// One entry of a method-resolution table: the method plus the class that
/// contributed it. Callers scan in order and take the first name match.
#[derive(Debug, Clone)]
pub struct MethodEntry {
    pub owner: ClassRef,
    pub method: ClassMethodDecl,
}

pub fn class_method_table(
    ctx: &ScopeContext,
    path: &[String],
    span: &Span,
) -> CompileResult<Vec<MethodEntry>> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let order = check!(
        linearize(ctx, path, span),
        return failed(warnings, errors),
        warnings,
        errors
    );
    let mut table = Vec::new();
    for owner in order {
        if let Some(decl) = ctx.lookup_class(&owner.path) {
            for item in &decl.items {
                if let ClassItem::Method(method) = item {
                    table.push(MethodEntry {
                        owner: owner.clone(),
                        method: method.clone(),
                    });
                }
            }
        }
    }
    recovered(table, warnings, errors)
}

/// Every class a type is known to implement, closed over superclasses.
fn implemented_class_keys(ctx: &ScopeContext, ty: &Type) -> Vec<Vec<IdKey>> {
    let implements: Vec<ClassPath> = match ty.strip_perm() {
        Type::Dynamic(path) => vec![path.clone()],
        Type::Path { path, .. } | Type::ModalState { path, .. } => {
            match ctx.lookup_type_decl(path) {
                Some(TypeDeclEntry::Record(decl)) => decl.implements.clone(),
                Some(TypeDeclEntry::Enum(decl)) => decl.implements.clone(),
                Some(TypeDeclEntry::Modal(decl)) => decl.implements.clone(),
                _ => vec![],
            }
        }
        _ => vec![],
    };
    let mut keys = Vec::new();
    for class in &implements {
        if let Ok(order) = linearize_quiet(ctx, class) {
            for item in order {
                if !keys.contains(&item.key) {
                    keys.push(item.key);
                }
            }
        }
    }
    keys
}

fn linearize_quiet(ctx: &ScopeContext, path: &[String]) -> Result<Vec<ClassRef>, ()> {
    linearize_inner(ctx, path, &mut Vec::new()).map_err(|_| ())
}

/// Bound satisfaction: whether `ty` implements the class at `class_path`,
/// directly or through a superclass.
pub fn type_implements_class(ctx: &ScopeContext, ty: &Type, class_path: &[String]) -> bool {
    let target = match class_ref(ctx, class_path) {
        Some(target) => target.key,
        None => return false,
    };
    implemented_class_keys(ctx, ty).contains(&target)
}

/// Looks up a default method named `name` contributed by any class the type
/// implements. Two hits from unrelated classes are fatal ambiguity.
pub fn lookup_default_method(
    ctx: &ScopeContext,
    implements: &[ClassPath],
    name: &str,
    receiver_ty: &Type,
    span: &Span,
) -> CompileResult<Option<(ClassRef, ClassMethodDecl)>> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let key = crate::ident::id_key(name);
    // owner key -> (owner, method); BTreeMap keeps candidate order stable.
    let mut candidates: BTreeMap<Vec<IdKey>, (ClassRef, ClassMethodDecl)> = BTreeMap::new();
    for class in implements {
        let order = match linearize_quiet(ctx, class) {
            Ok(order) => order,
            Err(()) => continue,
        };
        for owner in order {
            let decl = match ctx.lookup_class(&owner.path) {
                Some(decl) => decl,
                None => continue,
            };
            let found = decl.items.iter().find_map(|item| match item {
                ClassItem::Method(method)
                    if *method.name.key() == key && method.body.is_some() =>
                {
                    Some(method.clone())
                }
                _ => None,
            });
            if let Some(method) = found {
                candidates.entry(owner.key.clone()).or_insert((owner, method));
                // First hit along this linearization wins; deeper ancestors
                // are overridden.
                break;
            }
        }
    }
    if candidates.len() > 1 {
        let mut owners = candidates.values();
        let first = owners.next().map(|(owner, _)| path_to_string(&owner.path));
        let second = owners.next().map(|(owner, _)| path_to_string(&owner.path));
        errors.push(CompileError::AmbiguousMethod {
            name: name.to_string(),
            ty: receiver_ty.friendly_type_str(),
            first: first.unwrap_or_default(),
            second: second.unwrap_or_default(),
            span: span.clone(),
        });
        return failed(warnings, errors);
    }
    recovered(
        candidates.into_iter().next().map(|(_, hit)| hit),
        warnings,
        errors,
    )
}

/// Names of implementing members a class demands. Used by the completeness
/// check below.
struct ClassSurface {
    abstract_methods: Vec<String>,
    abstract_assoc_types: Vec<String>,
    abstract_states: Vec<String>,
}

fn class_surface(ctx: &ScopeContext, path: &[String], span: &Span) -> CompileResult<ClassSurface> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let order = check!(
        linearize(ctx, path, span),
        return failed(warnings, errors),
        warnings,
        errors
    );
    let mut surface = ClassSurface {
        abstract_methods: vec![],
        abstract_assoc_types: vec![],
        abstract_states: vec![],
    };
    let mut defaulted: Vec<IdKey> = vec![];
    for owner in &order {
        let decl = match ctx.lookup_class(&owner.path) {
            Some(decl) => decl,
            None => continue,
        };
        for item in &decl.items {
            match item {
                ClassItem::Method(method) => {
                    if method.body.is_some() {
                        defaulted.push(method.name.key().clone());
                    } else if !surface
                        .abstract_methods
                        .iter()
                        .any(|existing| crate::ident::id_key(existing) == *method.name.key())
                    {
                        surface.abstract_methods.push(method.name.name.clone());
                    }
                }
                ClassItem::AssociatedType(assoc) => {
                    if assoc.default.is_none() {
                        surface.abstract_assoc_types.push(assoc.name.name.clone());
                    }
                }
                ClassItem::AbstractState(state) => {
                    surface.abstract_states.push(state.name.name.clone());
                }
            }
        }
    }
    // A default anywhere in the MRO discharges the abstract requirement.
    surface
        .abstract_methods
        .retain(|name| !defaulted.contains(&crate::ident::id_key(name)));
    recovered(surface, warnings, errors)
}

/// `CheckImplCompleteness`: every abstract method, associated type and
/// abstract state of each implemented class must have a matching
/// implementation on the type (or, for associated types, a same-named alias
/// in the implementing module).
pub fn check_impl_completeness(
    ctx: &ScopeContext,
    entry: &TypeDeclEntry,
    span: &Span,
) -> CompileResult<()> {
    let mut warnings = vec![];
    let mut errors = vec![];

    let implements: &[ClassPath] = match entry {
        TypeDeclEntry::Record(decl) => &decl.implements,
        TypeDeclEntry::Enum(decl) => &decl.implements,
        TypeDeclEntry::Modal(decl) => &decl.implements,
        TypeDeclEntry::Alias(_) => &[],
    };

    for class in implements {
        if ctx.lookup_class(class).is_none() {
            errors.push(CompileError::SuperclassUndefined {
                path: path_to_string(class),
                span: span.clone(),
            });
            continue;
        }
        check!(
            check_orphan_rule(ctx, class, entry, span),
            continue,
            warnings,
            errors
        );
        let surface = check!(
            class_surface(ctx, class, span),
            continue,
            warnings,
            errors
        );

        let missing_methods: Vec<String> = surface
            .abstract_methods
            .iter()
            .filter(|name| !type_defines_method(entry, name))
            .cloned()
            .collect();
        if !missing_methods.is_empty() {
            errors.push(CompileError::ImplIncomplete {
                class_path: path_to_string(class),
                what: "method(s)",
                missing: missing_methods.join(", "),
                span: span.clone(),
            });
        }

        let missing_assoc: Vec<String> = surface
            .abstract_assoc_types
            .iter()
            .filter(|name| ctx.lookup_type_decl(&[(*name).clone()]).is_none())
            .cloned()
            .collect();
        if !missing_assoc.is_empty() {
            errors.push(CompileError::ImplIncomplete {
                class_path: path_to_string(class),
                what: "associated type(s)",
                missing: missing_assoc.join(", "),
                span: span.clone(),
            });
        }

        if !surface.abstract_states.is_empty() {
            let missing_states: Vec<String> = match entry {
                TypeDeclEntry::Modal(decl) => surface
                    .abstract_states
                    .iter()
                    .filter(|name| super::modal::lookup_state(decl, name).is_none())
                    .cloned()
                    .collect(),
                _ => surface.abstract_states.clone(),
            };
            if !missing_states.is_empty() {
                errors.push(CompileError::ImplIncomplete {
                    class_path: path_to_string(class),
                    what: "state(s)",
                    missing: missing_states.join(", "),
                    span: span.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        recovered((), warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

fn type_defines_method(entry: &TypeDeclEntry, name: &str) -> bool {
    let key = crate::ident::id_key(name);
    match entry {
        TypeDeclEntry::Record(decl) => decl.methods().any(|method| *method.name.key() == key),
        TypeDeclEntry::Modal(decl) => decl.states.iter().any(|state| {
            super::modal::state_method(state, name).is_some()
                || super::modal::state_transition(state, name).is_some()
        }),
        _ => false,
    }
}

/// The orphan rule: a module may only wire class `C` onto type `T` when it
/// declares `C` or `T`. Since `implements` clauses sit on the type
/// declaration itself, `T` is always local; the guard still rejects
/// signature surgery where the declaring modules diverge.
pub fn check_orphan_rule(
    ctx: &ScopeContext,
    class: &[String],
    entry: &TypeDeclEntry,
    span: &Span,
) -> CompileResult<()> {
    let warnings = vec![];
    let mut errors = vec![];
    let here = path_key(&ctx.current_module);
    let class_module = ctx.class_decl_module(class);
    let type_module = {
        let mut key = here.clone();
        key.push(entry.name().key().clone());
        if ctx.sigma.types.contains_key(&key) {
            Some(here.clone())
        } else {
            None
        }
    };
    let declares_class = class_module.map(|module| module == here).unwrap_or(false);
    let declares_type = type_module.is_some();
    if !declares_class && !declares_type {
        errors.push(CompileError::OrphanImpl {
            class_path: path_to_string(class),
            ty: entry.name().name.clone(),
            span: span.clone(),
        });
        return failed(warnings, errors);
    }
    recovered((), warnings, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::Ident;

    fn class(name: &str, supers: Vec<Vec<&str>>) -> ClassDecl {
        ClassDecl {
            vis: Visibility::Public,
            name: Ident::builtin(name),
            type_parameters: vec![],
            supers: supers
                .into_iter()
                .map(|path| path.into_iter().map(|part| part.to_string()).collect())
                .collect(),
            items: vec![],
            span: Span::builtin(),
        }
    }

    fn install(ctx: &mut ScopeContext, decl: ClassDecl) {
        let key = vec![decl.name.key().clone()];
        ctx.sigma.classes.insert(key, decl);
    }

    #[test]
    fn diamond_linearizes_in_c3_order() {
        let mut ctx = ScopeContext::for_tests();
        install(&mut ctx, class("Base", vec![]));
        install(&mut ctx, class("Left", vec![vec!["Base"]]));
        install(&mut ctx, class("Right", vec![vec!["Base"]]));
        install(
            &mut ctx,
            class("Bottom", vec![vec!["Left"], vec!["Right"]]),
        );
        let order = {
            let mut warnings = vec![];
            let mut errors = vec![];
            linearize(&ctx, &["Bottom".to_string()], &Span::builtin())
                .settle(&mut warnings, &mut errors)
                .expect("diamond linearizes")
        };
        let names: Vec<String> = order
            .iter()
            .map(|class| class.path.join("::"))
            .collect();
        assert_eq!(names, vec!["Bottom", "Left", "Right", "Base"]);
    }

    #[test]
    fn cyclic_hierarchy_fails_linearization() {
        let mut ctx = ScopeContext::for_tests();
        install(&mut ctx, class("Ouro", vec![vec!["Boros"]]));
        install(&mut ctx, class("Boros", vec![vec!["Ouro"]]));
        let res = linearize(&ctx, &["Ouro".to_string()], &Span::builtin());
        assert!(res
            .errors()
            .iter()
            .any(|error| matches!(error, CompileError::LinearizationFailed { .. })));
    }
}
