//! The semantic analysis pipeline: toplevel collection, declaration
//! checking, body typing, bind checking, init planning and the main check,
//! each phase gated on the previous one being error-free.

pub mod attributes;
pub mod bind_check;
pub mod body;
pub mod capabilities;
pub mod classes;
pub mod declaration;
pub mod expression;
pub mod init_plan;
pub mod main_check;
pub mod modal;
pub mod pattern;
pub mod place;
pub mod resolve;
pub mod scope_context;
pub mod statement;
pub mod type_resolution;
pub mod visibility;

#[cfg(test)]
mod tests;

pub use init_plan::{InitGraph, InitPlan};
pub use scope_context::{Entity, EntityKind, EntitySource, ScopeContext, Sigma};
pub use statement::{FlowInfo, StmtTypeContext, TypeEnv};

use crate::ast::{AstModule, NodeId};
use crate::error::*;
use crate::project::Project;
use crate::types::Type;
use crate::utils::dedup_stream;
use std::collections::HashMap;

/// Everything the core produces for one run: the verdict, the ordered
/// diagnostic stream, the `expr -> type` map for codegen, and the init plan
/// when planning got far enough to run.
#[derive(Debug, Clone)]
pub struct TypecheckResult {
    pub ok: bool,
    pub diags: DiagnosticStream,
    pub expr_types: HashMap<NodeId, Type>,
    pub init_plan: Option<InitPlan>,
}

/// Runs the full pipeline over `modules`. The context's `expr_types` map is
/// swapped in fresh at entry and handed to the result at exit, so repeated
/// runs never observe each other.
pub fn typecheck_modules(
    ctx: &mut ScopeContext,
    modules: Vec<AstModule>,
    project: Option<&Project>,
) -> TypecheckResult {
    let mut warnings = vec![];
    let mut errors = vec![];

    let saved_expr_types = std::mem::replace(&mut ctx.expr_types, HashMap::new());
    ctx.sigma.mods = modules;

    let mut init_plan = None;

    // Phase 1: names and signatures.
    let collected = resolve::collect_toplevel(ctx)
        .settle(&mut warnings, &mut errors)
        .is_some();

    // Phase 2: declaration well-formedness.
    if collected && errors.is_empty() {
        let _ = declaration::check_module_decls(ctx).settle(&mut warnings, &mut errors);
    }

    // Phase 3: bodies.
    if errors.is_empty() {
        let _ = body::check_module_bodies(ctx).settle(&mut warnings, &mut errors);
    }

    // Phase 4: bind / borrow checking.
    if errors.is_empty() {
        let _ = body::bind_check_modules(ctx).settle(&mut warnings, &mut errors);
    }

    // Phase 5: init planning.
    if errors.is_empty() {
        init_plan = init_plan::build_init_plan(ctx).settle(&mut warnings, &mut errors);
    }

    // Phase 6: the main gate, for executables only.
    if errors.is_empty() {
        if let Some(project) = project {
            let _ = main_check::main_check_project(ctx, project).settle(&mut warnings, &mut errors);
        }
    }

    let errors = dedup_stream(errors);
    let warnings = dedup_stream(warnings);
    let mut diags: DiagnosticStream = errors.iter().map(CompileError::to_diagnostic).collect();
    diags.extend(warnings.iter().map(CompileWarning::to_diagnostic));

    let expr_types = std::mem::replace(&mut ctx.expr_types, saved_expr_types);

    TypecheckResult {
        ok: errors.is_empty(),
        diags,
        expr_types,
        init_plan,
    }
}
