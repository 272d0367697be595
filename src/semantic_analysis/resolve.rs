//! Toplevel name collection and `using` expansion. Walks every module in
//! deterministic order, fills the signature and each module's name map, and
//! resolves opaque alias underlyings inside their declaring modules.

use super::scope_context::*;
use crate::ast::*;
use crate::error::*;
use crate::ident::{path_key, path_to_string, Ident};
use crate::span::Span;

/// Collects every module's toplevel names into `Sigma` and the per-module
/// scopes. Runs in three passes: declarations, `using` expansion (which needs
/// every declaration in place), then opaque underlyings.
pub fn collect_toplevel(ctx: &mut ScopeContext) -> CompileResult<()> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let modules = ctx.sigma.mods.clone();

    for module in &modules {
        let scope = check!(
            collect_module_decls(ctx, module),
            continue,
            warnings,
            errors
        );
        ctx.module_scopes.insert(path_key(&module.path), scope);
    }

    for module in &modules {
        let mut scope = ctx
            .module_scopes
            .get(&path_key(&module.path))
            .cloned()
            .unwrap_or_else(|| Scope::new(ScopeKind::Module));
        for item in &module.items {
            if let Item::Using(using) = item {
                check!(
                    expand_using(ctx, module, &mut scope, using),
                    continue,
                    warnings,
                    errors
                );
            }
        }
        ctx.module_scopes.insert(path_key(&module.path), scope);
    }

    for module in &modules {
        ctx.enter_module(&module.path);
        for item in &module.items {
            if let Item::TypeAlias(alias) = item {
                if !alias.opaque {
                    continue;
                }
                let generics = alias
                    .type_parameters
                    .iter()
                    .map(|param| param.name.key().clone())
                    .collect();
                let underlying = check!(
                    super::type_resolution::resolve_type_expr(ctx, &alias.ty, &generics),
                    continue,
                    warnings,
                    errors
                );
                ctx.sigma.opaque_underlying.insert(alias.origin, underlying);
            }
        }
    }

    if errors.is_empty() {
        recovered((), warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

fn collect_module_decls(ctx: &mut ScopeContext, module: &AstModule) -> CompileResult<Scope> {
    let warnings = vec![];
    let mut errors = vec![];
    let mut scope = Scope::new(ScopeKind::Module);
    let module_key = path_key(&module.path);

    let mut declare = |scope: &mut Scope,
                       errors: &mut Vec<CompileError>,
                       name: &Ident,
                       kind: EntityKind,
                       span: &Span| {
        if is_reserved_name(name.key()) {
            errors.push(CompileError::ReservedName {
                name: name.name.clone(),
                span: name.span.clone(),
            });
            return false;
        }
        if scope.contains(name.key()) {
            errors.push(CompileError::DuplicateIntroduction {
                name: name.name.clone(),
                span: name.span.clone(),
            });
            return false;
        }
        scope.insert(
            name.key().clone(),
            Entity {
                kind,
                origin: Some(module.path.clone()),
                source: EntitySource::Decl,
                span: span.clone(),
            },
        );
        true
    };

    for item in &module.items {
        match item {
            Item::Record(decl) => {
                if declare(&mut scope, &mut errors, &decl.name, EntityKind::Type, &decl.span) {
                    let mut key = module_key.clone();
                    key.push(decl.name.key().clone());
                    ctx.sigma
                        .types
                        .insert(key, TypeDeclEntry::Record(decl.clone()));
                }
            }
            Item::Enum(decl) => {
                if declare(&mut scope, &mut errors, &decl.name, EntityKind::Type, &decl.span) {
                    let mut key = module_key.clone();
                    key.push(decl.name.key().clone());
                    ctx.sigma.types.insert(key, TypeDeclEntry::Enum(decl.clone()));
                }
            }
            Item::Modal(decl) => {
                if declare(&mut scope, &mut errors, &decl.name, EntityKind::Type, &decl.span) {
                    let mut key = module_key.clone();
                    key.push(decl.name.key().clone());
                    ctx.sigma
                        .types
                        .insert(key, TypeDeclEntry::Modal(decl.clone()));
                }
            }
            Item::TypeAlias(decl) => {
                if declare(&mut scope, &mut errors, &decl.name, EntityKind::Type, &decl.span) {
                    let mut key = module_key.clone();
                    key.push(decl.name.key().clone());
                    ctx.sigma
                        .types
                        .insert(key, TypeDeclEntry::Alias(decl.clone()));
                }
            }
            Item::Class(decl) => {
                if declare(&mut scope, &mut errors, &decl.name, EntityKind::Class, &decl.span) {
                    let mut key = module_key.clone();
                    key.push(decl.name.key().clone());
                    ctx.sigma.classes.insert(key, decl.clone());
                }
            }
            Item::Static(decl) => {
                if declare(&mut scope, &mut errors, &decl.name, EntityKind::Value, &decl.span) {
                    let mut key = module_key.clone();
                    key.push(decl.name.key().clone());
                    ctx.sigma.statics.insert(key, decl.clone());
                }
            }
            Item::Procedure(decl) => {
                if declare(&mut scope, &mut errors, &decl.name, EntityKind::Value, &decl.span) {
                    let mut key = module_key.clone();
                    key.push(decl.name.key().clone());
                    ctx.sigma.procs.insert(key, decl.clone());
                }
            }
            Item::Using(_) | Item::Error(_) => {}
        }
    }

    recovered(scope, warnings, errors)
}

/// Expands one `using` declaration into `Using`-sourced entities. Importing
/// over an existing name in the same scope is a hard error, exactly like
/// redeclaring it.
fn expand_using(
    ctx: &ScopeContext,
    module: &AstModule,
    scope: &mut Scope,
    using: &UsingDecl,
) -> CompileResult<()> {
    let warnings = vec![];
    let mut errors = vec![];

    let mut import = |scope: &mut Scope,
                      errors: &mut Vec<CompileError>,
                      target_module: &[String],
                      name: &Ident,
                      alias: Option<&Ident>| {
        let (kind, vis) = match entity_kind_of(ctx, target_module, name) {
            Some(found) => found,
            None => {
                errors.push(CompileError::UnknownName {
                    name: format!("{}::{}", path_to_string(target_module), name.name),
                    span: using.span.clone(),
                });
                return;
            }
        };
        if !super::visibility::can_access_vis(&module.path, target_module, vis) {
            errors.push(CompileError::NotVisible {
                name: name.name.clone(),
                module: path_to_string(target_module),
                span: using.span.clone(),
            });
            return;
        }
        let bound = alias.unwrap_or(name);
        if scope.contains(bound.key()) {
            errors.push(CompileError::DuplicateIntroduction {
                name: bound.name.clone(),
                span: using.span.clone(),
            });
            return;
        }
        scope.insert(
            bound.key().clone(),
            Entity {
                kind,
                origin: Some(target_module.to_vec()),
                source: EntitySource::Using,
                span: using.span.clone(),
            },
        );
    };

    match &using.clause {
        UsingClause::Path { path, alias } => {
            if !module_exists(ctx, path) {
                errors.push(CompileError::ModuleNotFound {
                    path: path_to_string(path),
                    span: using.span.clone(),
                });
                return failed(warnings, errors);
            }
            let bound = alias
                .clone()
                .or_else(|| path.last().map(|last| Ident::new(last.clone(), using.span.clone())));
            if let Some(bound) = bound {
                if scope.contains(bound.key()) {
                    errors.push(CompileError::DuplicateIntroduction {
                        name: bound.name.clone(),
                        span: using.span.clone(),
                    });
                } else {
                    scope.insert(
                        bound.key().clone(),
                        Entity {
                            kind: EntityKind::ModuleAlias,
                            origin: Some(path.clone()),
                            source: EntitySource::Using,
                            span: using.span.clone(),
                        },
                    );
                }
            }
        }
        UsingClause::List { module_path, specs } => {
            if !module_exists(ctx, module_path) {
                errors.push(CompileError::ModuleNotFound {
                    path: path_to_string(module_path),
                    span: using.span.clone(),
                });
                return failed(warnings, errors);
            }
            for spec in specs {
                import(scope, &mut errors, module_path, &spec.name, spec.alias.as_ref());
            }
        }
        UsingClause::Wildcard { module_path } => {
            if !module_exists(ctx, module_path) {
                errors.push(CompileError::ModuleNotFound {
                    path: path_to_string(module_path),
                    span: using.span.clone(),
                });
                return failed(warnings, errors);
            }
            if let Some(target_scope) = ctx.module_scopes.get(&path_key(module_path)) {
                let names: Vec<(String, Span)> = target_scope
                    .iter()
                    .filter(|(_, entity)| entity.source == EntitySource::Decl)
                    .map(|(key, entity)| (key.clone(), entity.span.clone()))
                    .collect();
                for (key, span) in names {
                    let name = Ident::new(key, span);
                    import(scope, &mut errors, module_path, &name, None);
                }
            }
        }
    }

    if errors.is_empty() {
        recovered((), warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

fn module_exists(ctx: &ScopeContext, path: &[String]) -> bool {
    let key = path_key(path);
    ctx.sigma
        .mods
        .iter()
        .any(|module| path_key(&module.path) == key)
}

fn entity_kind_of(
    ctx: &ScopeContext,
    module: &[String],
    name: &Ident,
) -> Option<(EntityKind, Visibility)> {
    let mut key = path_key(module);
    key.push(name.key().clone());
    if let Some(entry) = ctx.sigma.types.get(&key) {
        return Some((EntityKind::Type, entry.vis()));
    }
    if let Some(class) = ctx.sigma.classes.get(&key) {
        return Some((EntityKind::Class, class.vis));
    }
    if let Some(stat) = ctx.sigma.statics.get(&key) {
        return Some((EntityKind::Value, stat.vis));
    }
    if let Some(proc) = ctx.sigma.procs.get(&key) {
        return Some((EntityKind::Value, proc.vis));
    }
    None
}
