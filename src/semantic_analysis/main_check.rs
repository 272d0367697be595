//! The executable-assembly gate: exactly one well-shaped `main` in the root
//! module. Libraries skip this entirely.

use super::scope_context::ScopeContext;
use crate::ast::*;
use crate::error::*;
use crate::ident::id_key;
use crate::project::{AssemblyKind, Project};
use crate::types::{Primitive, Type};

pub fn main_check_project(ctx: &mut ScopeContext, project: &Project) -> CompileResult<()> {
    let mut warnings = vec![];
    let mut errors = vec![];
    if project.kind != AssemblyKind::Executable {
        return recovered((), warnings, errors);
    }
    let root = match project.root_module() {
        Some(root) => root.path.clone(),
        None => {
            errors.push(CompileError::NoMainProcedure);
            return failed(warnings, errors);
        }
    };
    ctx.enter_module(&root);

    let mains: Vec<ProcedureDecl> = ctx
        .sigma
        .mods
        .iter()
        .find(|module| module.path == root)
        .map(|module| {
            module
                .items
                .iter()
                .filter_map(|item| match item {
                    Item::Procedure(decl) if *decl.name.key() == id_key("main") => {
                        Some(decl.clone())
                    }
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    match mains.len() {
        0 => {
            errors.push(CompileError::NoMainProcedure);
            return failed(warnings, errors);
        }
        1 => {}
        _ => {
            errors.push(CompileError::MultipleMainProcedures {
                span: mains.last().map(|decl| decl.span.clone()).unwrap(),
            });
        }
    }

    let main = &mains[0];
    if !main.params.is_empty() {
        errors.push(CompileError::MainBadSignature {
            span: main.span.clone(),
        });
    }
    if let Some(return_type) = &main.return_type {
        let resolved = check!(
            super::type_resolution::resolve_type_expr(ctx, return_type, &Default::default()),
            Type::ErrorRecovery,
            warnings,
            errors
        );
        let admissible = resolved.is_unit()
            || resolved.is_error_recovery()
            || resolved
                .as_prim()
                .map(Primitive::is_integer)
                .unwrap_or(false);
        if !admissible {
            errors.push(CompileError::MainBadSignature {
                span: main.span.clone(),
            });
        }
    }

    if errors.is_empty() {
        recovered((), warnings, errors)
    } else {
        failed(warnings, errors)
    }
}
