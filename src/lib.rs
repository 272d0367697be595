//! Semantic analysis core of the Cursive0 compiler: type inference and
//! checking, borrow/bind checking, and cross-module initialization planning
//! over a resolved AST.

#[macro_use]
pub mod error;

pub mod ast;
mod ident;
pub mod project;
pub mod semantic_analysis;
mod span;
mod style;
pub mod types;
pub(crate) mod utils;

pub use crate::error::{
    CompileError, CompileResult, CompileWarning, Diagnostic, DiagnosticStream, Severity, Warning,
};
pub use crate::ident::{id_key, IdKey, Ident};
pub use crate::project::{AssemblyKind, Project, ProjectModule};
pub use crate::semantic_analysis::{
    typecheck_modules, InitPlan, ScopeContext, Sigma, TypecheckResult,
};
pub use crate::span::Span;
pub use crate::types::{Permission, Primitive, Type};

use crate::ast::AstModule;

/// Checks a whole project: normalizes the module order, then runs the
/// pipeline with the project's assembly kind gating the `main` check.
pub fn check_project(mut project: Project, modules: Vec<AstModule>) -> TypecheckResult {
    project.normalize();
    let mut modules = modules;
    modules.sort_by(|a, b| {
        crate::project::key_cmp(
            &crate::project::module_key(&a.path),
            &crate::project::module_key(&b.path),
        )
    });
    let mut ctx = ScopeContext::new();
    typecheck_modules(&mut ctx, modules, Some(&project))
}

/// Checks a bare module list with no project gating, for library-style
/// embedders and tests.
pub fn check_modules(modules: Vec<AstModule>) -> TypecheckResult {
    let mut modules = modules;
    modules.sort_by(|a, b| {
        crate::project::key_cmp(
            &crate::project::module_key(&a.path),
            &crate::project::module_key(&b.path),
        )
    });
    let mut ctx = ScopeContext::new();
    typecheck_modules(&mut ctx, modules, None)
}
