//! Statement and block typing. Every statement threads the typing
//! environment forward and reports its non-local exits through [`FlowInfo`];
//! blocks aggregate those into their own type.

use super::capabilities::{async_sig_of, region_active_type};
use super::expression::{check_expr, infer_expr};
use super::pattern::{irrefutable_pattern, type_pattern};
use super::place::place_info;
use super::scope_context::{ScopeContext, ScopeKind};
use super::type_resolution::{resolve_type_expr, GenericsEnv};
use crate::ast::*;
use crate::error::*;
use crate::ident::{IdKey, Ident};
use crate::types::const_len::const_eval_bool;
use crate::types::{Permission, Type};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct TypeBinding {
    pub mutability: Mutability,
    pub ty: Type,
}

/// The typing environment Γ: lexical scopes of `name -> (mutability, type)`,
/// disjoint from the scope context's entity scopes.
#[derive(Debug, Clone)]
pub struct TypeEnv {
    scopes: Vec<HashMap<IdKey, TypeBinding>>,
}

impl TypeEnv {
    pub fn new() -> TypeEnv {
        TypeEnv {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1, "cannot pop the root typing scope");
        self.scopes.pop();
    }

    pub fn insert(&mut self, key: IdKey, binding: TypeBinding) {
        self.scopes
            .last_mut()
            .expect("typing env always has a scope")
            .insert(key, binding);
    }

    pub fn bind_of(&self, key: &str) -> Option<&TypeBinding> {
        self.scopes.iter().rev().find_map(|scope| scope.get(key))
    }

    pub fn mut_of(&self, key: &str) -> Option<Mutability> {
        self.bind_of(key).map(|binding| binding.mutability)
    }

    pub fn bound_in_top(&self, key: &str) -> bool {
        self.scopes
            .last()
            .map(|scope| scope.contains_key(key))
            .unwrap_or(false)
    }

    pub fn bound_in_outer(&self, key: &str) -> bool {
        self.scopes
            .iter()
            .rev()
            .skip(1)
            .any(|scope| scope.contains_key(key))
    }
}

impl Default for TypeEnv {
    fn default() -> Self {
        TypeEnv::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopFlag {
    None,
    Loop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelContext {
    pub gpu: bool,
}

/// Everything a statement needs to know about where it sits.
#[derive(Debug, Clone)]
pub struct StmtTypeContext {
    pub return_type: Type,
    pub loop_flag: LoopFlag,
    pub in_unsafe: bool,
    pub in_defer: bool,
    pub keys_held: bool,
    pub parallel: Option<ParallelContext>,
    pub in_async: bool,
    /// Active region aliases, innermost last.
    pub regions: Vec<IdKey>,
    pub generics: GenericsEnv,
}

impl StmtTypeContext {
    pub fn new(return_type: Type) -> StmtTypeContext {
        StmtTypeContext::with_generics(return_type, GenericsEnv::new())
    }

    pub fn with_generics(return_type: Type, generics: GenericsEnv) -> StmtTypeContext {
        let in_async = async_sig_of(&return_type).is_some();
        StmtTypeContext {
            return_type,
            loop_flag: LoopFlag::None,
            in_unsafe: false,
            in_defer: false,
            keys_held: false,
            parallel: None,
            in_async,
            regions: vec![],
            generics,
        }
    }

    pub fn in_loop(&self) -> StmtTypeContext {
        let mut next = self.clone();
        next.loop_flag = LoopFlag::Loop;
        next
    }

    pub fn in_unsafe_block(&self) -> StmtTypeContext {
        let mut next = self.clone();
        next.in_unsafe = true;
        next
    }

    pub fn in_defer_block(&self) -> StmtTypeContext {
        let mut next = self.clone();
        next.in_defer = true;
        next.loop_flag = LoopFlag::None;
        next
    }

    pub fn with_keys_held(&self) -> StmtTypeContext {
        let mut next = self.clone();
        next.keys_held = true;
        next
    }

    pub fn with_region(&self, alias: IdKey) -> StmtTypeContext {
        let mut next = self.clone();
        next.regions.push(alias);
        next
    }

    pub fn in_parallel(&self, gpu: bool) -> StmtTypeContext {
        let mut next = self.clone();
        next.parallel = Some(ParallelContext { gpu });
        next
    }
}

/// Non-local exits flowing out of a statement or block.
#[derive(Debug, Clone, Default)]
pub struct FlowInfo {
    /// Types returned via `return`.
    pub results: Vec<Type>,
    /// Types carried by `break` values.
    pub breaks: Vec<Type>,
    /// Whether some `break` carried no value.
    pub break_void: bool,
    /// Types collected by `result` statements for a parallel block.
    pub par_results: Vec<Type>,
}

impl FlowInfo {
    pub fn absorb(&mut self, mut other: FlowInfo) {
        self.results.append(&mut other.results);
        self.breaks.append(&mut other.breaks);
        self.break_void |= other.break_void;
        self.par_results.append(&mut other.par_results);
    }

    /// Whether this statement unconditionally leaves the enclosing block.
    fn diverges(stmt: &Stmt) -> bool {
        matches!(
            stmt,
            Stmt::Return { .. } | Stmt::Break { .. } | Stmt::Continue { .. }
        )
    }
}

pub fn type_stmt(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    stmt: &Stmt,
) -> CompileResult<FlowInfo> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let mut flow = FlowInfo::default();

    match stmt {
        Stmt::Let(binding) => {
            type_binding_stmt(
                ctx,
                tcx,
                env,
                binding,
                Mutability::Let,
                &mut warnings,
                &mut errors,
            );
        }
        Stmt::Var(binding) => {
            type_binding_stmt(
                ctx,
                tcx,
                env,
                binding,
                Mutability::Var,
                &mut warnings,
                &mut errors,
            );
        }
        Stmt::ShadowLet(shadow) => {
            type_shadow_stmt(
                ctx,
                tcx,
                env,
                shadow,
                Mutability::Let,
                &mut warnings,
                &mut errors,
            );
        }
        Stmt::ShadowVar(shadow) => {
            type_shadow_stmt(
                ctx,
                tcx,
                env,
                shadow,
                Mutability::Var,
                &mut warnings,
                &mut errors,
            );
        }
        Stmt::Assign { place, value, span } => {
            type_assign(ctx, tcx, env, place, value, span, &mut warnings, &mut errors);
        }
        Stmt::CompoundAssign {
            place,
            op,
            value,
            span,
        } => {
            let place_ty =
                type_assign(ctx, tcx, env, place, value, span, &mut warnings, &mut errors);
            if let Some(place_ty) = place_ty {
                let elem = place_ty.strip_perm();
                let defined = if op.is_logical() {
                    elem.as_prim() == Some(crate::types::Primitive::Bool)
                } else if op.is_comparison() {
                    // `x === e` is not a thing; comparisons never compound.
                    false
                } else if matches!(
                    op,
                    BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr
                ) {
                    elem.as_prim().map(|prim| prim.is_integer()).unwrap_or(false)
                } else {
                    elem.is_numeric()
                };
                if !defined && !elem.is_error_recovery() {
                    errors.push(CompileError::BinaryOpUndefined {
                        op: op.symbol().to_string(),
                        ty: elem.friendly_type_str(),
                        span: span.clone(),
                    });
                }
            }
        }
        Stmt::Expr { value, .. } => {
            check!(
                infer_expr(ctx, tcx, env, value),
                Type::ErrorRecovery,
                warnings,
                errors
            );
        }
        Stmt::Defer { body, span } => {
            let defer_tcx = tcx.in_defer_block();
            let (body_ty, body_flow) = check!(
                type_block(ctx, &defer_tcx, env, body),
                (Type::ErrorRecovery, FlowInfo::default()),
                warnings,
                errors
            );
            if !body_ty.is_unit() && !body_ty.is_error_recovery() {
                errors.push(CompileError::DeferNonUnit { span: span.clone() });
            }
            // Non-local exits inside the defer body were already reported as
            // Defer-Transfer-Err; nothing propagates outward.
            let _ = body_flow;
        }
        Stmt::Region { alias, body, span } => {
            let alias_ident = match alias {
                Some(alias) => alias.clone(),
                None => Ident::new(ctx.fresh_region_name(), span.clone()),
            };
            env.push_scope();
            ctx.push_scope(ScopeKind::Local);
            env.insert(
                alias_ident.key().clone(),
                TypeBinding {
                    mutability: Mutability::Let,
                    ty: region_active_type(),
                },
            );
            let region_tcx = tcx.with_region(alias_ident.key().clone());
            let res = type_block_in_place(ctx, &region_tcx, env, body);
            ctx.pop_scope();
            env.pop_scope();
            let (_, body_flow) = check!(
                res,
                (Type::ErrorRecovery, FlowInfo::default()),
                warnings,
                errors
            );
            flow.absorb(body_flow);
        }
        Stmt::Frame { target, body, span } => {
            match target {
                Some(target) => {
                    let is_region = env
                        .bind_of(target.key())
                        .map(|binding| {
                            crate::types::type_equiv(
                                binding.ty.strip_perm(),
                                &region_active_type(),
                            )
                        })
                        .unwrap_or(false)
                        || tcx.regions.contains(target.key());
                    if !is_region {
                        errors.push(CompileError::UnknownRegion {
                            name: target.name.clone(),
                            span: target.span.clone(),
                        });
                    }
                }
                None => {
                    if tcx.regions.is_empty() {
                        errors.push(CompileError::FrameWithoutRegion { span: span.clone() });
                    }
                }
            }
            let (_, body_flow) = check!(
                type_block(ctx, tcx, env, body),
                (Type::ErrorRecovery, FlowInfo::default()),
                warnings,
                errors
            );
            flow.absorb(body_flow);
        }
        Stmt::Return { value, span } => {
            if tcx.in_defer {
                errors.push(CompileError::DeferNonLocalExit { span: span.clone() });
            }
            let returned = match value {
                Some(value) => check!(
                    check_expr(ctx, tcx, env, value, &tcx.return_type),
                    Type::ErrorRecovery,
                    warnings,
                    errors
                ),
                None => {
                    check!(
                        crate::types::subtyping::check_subtype(
                            ctx,
                            &Type::unit(),
                            &tcx.return_type,
                            span,
                            "A bare `return` returns `()`.",
                        ),
                        (),
                        warnings,
                        errors
                    );
                    Type::unit()
                }
            };
            flow.results.push(returned);
        }
        Stmt::Result { value, span } => {
            if tcx.parallel.is_none() {
                errors.push(CompileError::ResultOutsideParallel { span: span.clone() });
            }
            let ty = check!(
                infer_expr(ctx, tcx, env, value),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            flow.par_results.push(ty);
        }
        Stmt::Break { value, span } => {
            if tcx.in_defer {
                errors.push(CompileError::DeferNonLocalExit { span: span.clone() });
            } else if tcx.loop_flag != LoopFlag::Loop {
                errors.push(CompileError::BreakOutsideLoop { span: span.clone() });
            }
            match value {
                Some(value) => {
                    let ty = check!(
                        infer_expr(ctx, tcx, env, value),
                        Type::ErrorRecovery,
                        warnings,
                        errors
                    );
                    flow.breaks.push(ty);
                }
                None => flow.break_void = true,
            }
        }
        Stmt::Continue { span } => {
            if tcx.in_defer {
                errors.push(CompileError::DeferNonLocalExit { span: span.clone() });
            } else if tcx.loop_flag != LoopFlag::Loop {
                errors.push(CompileError::ContinueOutsideLoop { span: span.clone() });
            }
        }
        Stmt::Unsafe { body, .. } => {
            let unsafe_tcx = tcx.in_unsafe_block();
            let (_, body_flow) = check!(
                type_block(ctx, &unsafe_tcx, env, body),
                (Type::ErrorRecovery, FlowInfo::default()),
                warnings,
                errors
            );
            flow.absorb(body_flow);
        }
        Stmt::Key { paths, body, .. } => {
            for path in paths {
                if env.bind_of(path.root.key()).is_none() {
                    errors.push(CompileError::UnknownName {
                        name: path.root.name.clone(),
                        span: path.root.span.clone(),
                    });
                }
            }
            let key_tcx = tcx.with_keys_held();
            let (_, body_flow) = check!(
                type_block(ctx, &key_tcx, env, body),
                (Type::ErrorRecovery, FlowInfo::default()),
                warnings,
                errors
            );
            flow.absorb(body_flow);
        }
        Stmt::StaticAssert { condition, span } => match const_eval_bool(ctx, condition) {
            None => errors.push(CompileError::StaticAssertNotConst { span: span.clone() }),
            Some(false) => errors.push(CompileError::StaticAssertFailed { span: span.clone() }),
            Some(true) => {}
        },
        Stmt::Error { .. } => {}
    }

    recovered(flow, warnings, errors)
}

fn type_binding_stmt(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    binding: &BindingStmt,
    mutability: Mutability,
    warnings: &mut Vec<CompileWarning>,
    errors: &mut Vec<CompileError>,
) {
    let init_ty = match &binding.ty {
        Some(ascription) => {
            let expected = check!(
                resolve_type_expr(ctx, ascription, &tcx.generics),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            check!(
                check_expr(ctx, tcx, env, &binding.init, &expected),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            expected
        }
        None => check!(
            infer_expr(ctx, tcx, env, &binding.init),
            Type::ErrorRecovery,
            warnings,
            errors
        ),
    };

    if !irrefutable_pattern(ctx, &binding.pattern, &init_ty) {
        errors.push(CompileError::LetRefutablePattern {
            span: binding.pattern.span.clone(),
        });
    }
    let bindings = check!(
        type_pattern(ctx, &tcx.generics, &binding.pattern, &init_ty),
        vec![],
        warnings,
        errors
    );
    for (name, ty) in bindings {
        if env.bound_in_top(name.key()) {
            errors.push(CompileError::DuplicateIntroduction {
                name: name.name.clone(),
                span: name.span.clone(),
            });
            continue;
        }
        if env.bound_in_outer(name.key()) {
            errors.push(CompileError::ShadowRequiresKeyword {
                name: name.name.clone(),
                span: name.span.clone(),
            });
            continue;
        }
        env.insert(name.key().clone(), TypeBinding { mutability, ty });
    }
}

fn type_shadow_stmt(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    shadow: &ShadowStmt,
    mutability: Mutability,
    warnings: &mut Vec<CompileWarning>,
    errors: &mut Vec<CompileError>,
) {
    let ty = match &shadow.ty {
        Some(ascription) => {
            let expected = check!(
                resolve_type_expr(ctx, ascription, &tcx.generics),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            check!(
                check_expr(ctx, tcx, env, &shadow.init, &expected),
                Type::ErrorRecovery,
                warnings,
                errors
            );
            expected
        }
        None => check!(
            infer_expr(ctx, tcx, env, &shadow.init),
            Type::ErrorRecovery,
            warnings,
            errors
        ),
    };

    if env.bound_in_top(shadow.name.key()) {
        errors.push(CompileError::DuplicateIntroduction {
            name: shadow.name.name.clone(),
            span: shadow.name.span.clone(),
        });
        return;
    }
    if !env.bound_in_outer(shadow.name.key()) {
        errors.push(CompileError::ShadowTargetMissing {
            name: shadow.name.name.clone(),
            span: shadow.name.span.clone(),
        });
        return;
    }
    env.insert(shadow.name.key().clone(), TypeBinding { mutability, ty });
}

fn type_assign(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    place: &Expr,
    value: &Expr,
    span: &crate::span::Span,
    warnings: &mut Vec<CompileWarning>,
    errors: &mut Vec<CompileError>,
) -> Option<Type> {
    let info = check!(
        place_info(ctx, tcx, env, place),
        return None,
        warnings,
        errors
    );
    let info = match info {
        Some(info) => info,
        None => {
            // A non-place has no mutable root to assign through.
            errors.push(CompileError::AssignImmutable {
                name: "<expression>".to_string(),
                span: span.clone(),
            });
            return None;
        }
    };
    match &info.root {
        super::place::PlaceRoot::Binding(root) => {
            if env.mut_of(root) != Some(Mutability::Var) {
                errors.push(CompileError::AssignImmutable {
                    name: root.clone(),
                    span: span.clone(),
                });
            }
        }
        super::place::PlaceRoot::Static { name, mutability } => {
            if *mutability != Mutability::Var {
                errors.push(CompileError::AssignImmutable {
                    name: name.clone(),
                    span: span.clone(),
                });
            }
        }
    }
    if info.ty.perm_of() == Some(Permission::Const) {
        errors.push(CompileError::AssignConst { span: span.clone() });
    }
    let target = info.ty.strip_perm().clone();
    check!(
        check_expr(ctx, tcx, env, value, &target),
        Type::ErrorRecovery,
        warnings,
        errors
    );
    Some(info.ty)
}

/// Types a statement sequence, warning on statements that follow an
/// unconditional exit.
pub fn type_stmt_seq(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    stmts: &[Stmt],
) -> CompileResult<FlowInfo> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let mut flow = FlowInfo::default();
    let mut unreachable_reported = false;
    let mut diverged = false;
    for stmt in stmts {
        if diverged && !unreachable_reported {
            warnings.push(CompileWarning {
                span: stmt.span().clone(),
                warning_content: Warning::UnreachableCode,
            });
            unreachable_reported = true;
        }
        let stmt_flow = check!(
            type_stmt(ctx, tcx, env, stmt),
            FlowInfo::default(),
            warnings,
            errors
        );
        flow.absorb(stmt_flow);
        diverged = diverged || FlowInfo::diverges(stmt);
    }
    recovered(flow, warnings, errors)
}

/// Types a block in a fresh nested scope. The scope pops on every path,
/// diagnostic or not.
pub fn type_block(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    block: &Block,
) -> CompileResult<(Type, FlowInfo)> {
    env.push_scope();
    ctx.push_scope(ScopeKind::Local);
    let result = type_block_in_place(ctx, tcx, env, block);
    ctx.pop_scope();
    env.pop_scope();
    result
}

/// Block typing without scope management, for callers that already arranged
/// the scope (patterns, regions, loop headers).
pub fn type_block_in_place(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    block: &Block,
) -> CompileResult<(Type, FlowInfo)> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let mut flow = check!(
        type_stmt_seq(ctx, tcx, env, &block.stmts),
        FlowInfo::default(),
        warnings,
        errors
    );
    let block_ty = match &block.tail {
        Some(tail) => check!(
            infer_expr(ctx, tcx, env, tail),
            Type::ErrorRecovery,
            warnings,
            errors
        ),
        None => Type::unit(),
    };
    recovered((block_ty, flow), warnings, errors)
}

/// Types a block against an expected type.
pub fn check_block(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    block: &Block,
    expected: &Type,
) -> CompileResult<(Type, FlowInfo)> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let (ty, flow) = check!(
        type_block(ctx, tcx, env, block),
        return failed(warnings, errors),
        warnings,
        errors
    );
    check!(
        crate::types::subtyping::check_subtype(
            ctx,
            &ty,
            expected,
            &block.span,
            "The block's type does not fit what this position expects.",
        ),
        (),
        warnings,
        errors
    );
    recovered((ty, flow), warnings, errors)
}
