//! Structured concurrency and async typing: parallel/spawn/wait/dispatch,
//! yield/sync/race/all, and the capture-permission analysis for spawned
//! tasks.

use super::super::capabilities::{
    async_sig_of, is_execution_domain_class_path, is_gpu_domain_class_path, make_spawned_type,
    spawned_inner, tracked_args,
};
use super::super::classes::type_implements_class;
use super::super::scope_context::{ScopeContext, ScopeKind};
use super::super::statement::{
    type_block, type_block_in_place, StmtTypeContext, TypeBinding, TypeEnv,
};
use super::{check_expr, infer_expr};
use crate::ast::*;
use crate::error::*;
use crate::ident::IdKey;
use crate::span::Span;
use crate::types::{type_equiv, Permission, Primitive, Type};
use std::collections::HashSet;

/// Whether a type can serve as a `parallel` domain, and whether it is a GPU
/// domain (which tightens the capture rules).
fn domain_kind(ctx: &ScopeContext, ty: &Type) -> Option<bool> {
    match ty.strip_perm() {
        Type::Dynamic(path) => {
            if is_execution_domain_class_path(path) {
                Some(is_gpu_domain_class_path(path))
            } else if ctx.lookup_class(path).is_some() {
                // User classes qualify when their hierarchy reaches
                // ExecutionDomain.
                let execution_domain = vec!["ExecutionDomain".to_string()];
                if type_implements_class(ctx, ty, &execution_domain) {
                    let gpu = vec!["GpuDomain".to_string()];
                    Some(type_implements_class(ctx, ty, &gpu))
                } else {
                    None
                }
            } else {
                None
            }
        }
        _ => {
            let execution_domain = vec!["ExecutionDomain".to_string()];
            if type_implements_class(ctx, ty, &execution_domain) {
                let gpu = vec!["GpuDomain".to_string()];
                Some(type_implements_class(ctx, ty, &gpu))
            } else {
                None
            }
        }
    }
}

pub fn type_parallel(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    domain: &Expr,
    body: &Block,
    span: &Span,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];

    let domain_ty = check!(
        infer_expr(ctx, tcx, env, domain),
        Type::ErrorRecovery,
        warnings,
        errors
    );
    let gpu = match domain_kind(ctx, &domain_ty) {
        Some(gpu) => gpu,
        None => {
            if !domain_ty.is_error_recovery() {
                errors.push(CompileError::ParallelDomainNotExecutionDomain {
                    ty: domain_ty.friendly_type_str(),
                    span: domain.span.clone(),
                });
            }
            false
        }
    };
    if gpu && tcx.parallel.map(|parallel| parallel.gpu).unwrap_or(false) {
        errors.push(CompileError::GpuNestedParallel { span: span.clone() });
    }

    let parallel_tcx = tcx.in_parallel(gpu);
    let (body_ty, flow) = check!(
        type_block(ctx, &parallel_tcx, env, body),
        (Type::ErrorRecovery, Default::default()),
        warnings,
        errors
    );

    // `result` statements, when present, define the block's value; they must
    // agree on one type.
    let mut collected: Option<Type> = None;
    for ty in &flow.par_results {
        match &collected {
            None => collected = Some(ty.clone()),
            Some(existing) => {
                if !type_equiv(existing, ty) {
                    errors.push(CompileError::MatchArmTypeMismatch {
                        first: existing.friendly_type_str(),
                        second: ty.friendly_type_str(),
                        span: span.clone(),
                    });
                }
            }
        }
    }

    let result = collected.unwrap_or(body_ty);
    if errors.is_empty() {
        recovered(result, warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

pub fn type_spawn(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    options: &[SpawnOption],
    body: &Block,
    span: &Span,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];

    let parallel = match tcx.parallel {
        Some(parallel) => parallel,
        None => {
            errors.push(CompileError::SpawnOutsideParallel { span: span.clone() });
            return failed(warnings, errors);
        }
    };

    let mut move_listed: HashSet<IdKey> = HashSet::new();
    for option in options {
        match option {
            SpawnOption::Name(value) => {
                let ty = check!(
                    infer_expr(ctx, tcx, env, value),
                    Type::ErrorRecovery,
                    warnings,
                    errors
                );
                if !matches!(ty.strip_perm(), Type::Str(_) | Type::ErrorRecovery) {
                    errors.push(CompileError::TypeMismatch {
                        expected: "String".into(),
                        received: ty.friendly_type_str(),
                        help: "A spawn's `name:` option must be a string.".into(),
                        span: value.span.clone(),
                    });
                }
            }
            SpawnOption::MoveCapture(name) => {
                move_listed.insert(name.key().clone());
            }
        }
    }

    // Capture-permission rules for every free variable of the task body.
    for (name, span) in free_variables(body) {
        let binding = match env.bind_of(&name) {
            Some(binding) => binding.clone(),
            None => continue,
        };
        let perm = binding.ty.perm_of();
        if parallel.gpu {
            if perm == Some(Permission::Shared) {
                errors.push(CompileError::GpuSharedCapture { span: span.clone() });
                continue;
            }
            if matches!(binding.ty.strip_perm(), Type::Ptr(..) | Type::RawPtr(..)) {
                errors.push(CompileError::GpuHostPointerCapture { span: span.clone() });
                continue;
            }
        }
        match perm {
            Some(Permission::Unique) => {
                if !move_listed.contains(&name) {
                    errors.push(CompileError::UniqueCaptureNotMoved {
                        name,
                        span,
                    });
                }
            }
            Some(Permission::Shared) | Some(Permission::Const) => {}
            None => {
                if binding.mutability == Mutability::Var {
                    errors.push(CompileError::VarCaptureWithoutShared { name, span });
                }
            }
        }
    }

    let (body_ty, _) = check!(
        type_block(ctx, tcx, env, body),
        (Type::ErrorRecovery, Default::default()),
        warnings,
        errors
    );

    let result = make_spawned_type(body_ty);
    if errors.is_empty() {
        recovered(result, warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

pub fn type_wait(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    handle: &Expr,
    span: &Span,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];

    if tcx.keys_held {
        errors.push(CompileError::WaitWhileKeysHeld { span: span.clone() });
    }

    let handle_ty = check!(
        infer_expr(ctx, tcx, env, handle),
        Type::ErrorRecovery,
        warnings,
        errors
    );
    let stripped = handle_ty.strip_perm();
    let result = if let Some(inner) = spawned_inner(stripped) {
        inner.clone()
    } else if let Some((value, error)) = tracked_args(stripped) {
        Type::union_of(vec![value.clone(), error.clone()])
    } else if stripped.is_error_recovery() {
        Type::ErrorRecovery
    } else {
        errors.push(CompileError::WaitNotSpawned {
            ty: handle_ty.friendly_type_str(),
            span: handle.span.clone(),
        });
        return failed(warnings, errors);
    };

    if errors.is_empty() {
        recovered(result, warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

pub fn type_dispatch(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    pattern: &Pattern,
    range: &Expr,
    options: &[DispatchOption],
    body: &Block,
    span: &Span,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];

    if tcx.parallel.is_none() {
        errors.push(CompileError::DispatchOutsideParallel { span: span.clone() });
    }

    let range_ty = check!(
        infer_expr(ctx, tcx, env, range),
        Type::ErrorRecovery,
        warnings,
        errors
    );
    if !matches!(range_ty.strip_perm(), Type::Range | Type::ErrorRecovery) {
        errors.push(CompileError::DispatchRangeExpected {
            ty: range_ty.friendly_type_str(),
            span: range.span.clone(),
        });
    }

    let mut reduce: Option<ReduceOp> = None;
    for option in options {
        match option {
            DispatchOption::Reduce(op) => reduce = Some(*op),
            DispatchOption::Ordered => {}
            DispatchOption::Chunk(chunk) => {
                check!(
                    check_expr(ctx, tcx, env, chunk, &Type::usize()),
                    Type::ErrorRecovery,
                    warnings,
                    errors
                );
            }
        }
    }

    env.push_scope();
    ctx.push_scope(ScopeKind::Local);
    let bindings =
        super::super::pattern::type_pattern(ctx, &tcx.generics, pattern, &Type::usize())
            .settle(&mut warnings, &mut errors)
            .unwrap_or_default();
    for (name, ty) in bindings {
        env.insert(
            name.key().clone(),
            TypeBinding {
                mutability: Mutability::Let,
                ty,
            },
        );
    }
    let loop_tcx = tcx.in_loop();
    let body_res = type_block_in_place(ctx, &loop_tcx, env, body);
    ctx.pop_scope();
    env.pop_scope();
    let (body_ty, _) = check!(
        body_res,
        (Type::ErrorRecovery, Default::default()),
        warnings,
        errors
    );

    let result = match reduce {
        Some(op) => {
            let supported = match op {
                ReduceOp::Add | ReduceOp::Mul | ReduceOp::Min | ReduceOp::Max => {
                    body_ty.as_prim().map(|prim| prim.is_numeric()).unwrap_or(false)
                }
                ReduceOp::And | ReduceOp::Or => body_ty.as_prim() == Some(Primitive::Bool),
            };
            if !supported && !body_ty.is_error_recovery() {
                errors.push(CompileError::DispatchReduceShape { span: span.clone() });
            }
            body_ty
        }
        None => Type::unit(),
    };
    if errors.is_empty() {
        recovered(result, warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

pub fn type_yield(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    value: &Expr,
    span: &Span,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];

    let sig = match async_sig_of(&tcx.return_type) {
        Some(sig) => sig,
        None => {
            errors.push(CompileError::YieldOutsideAsync { span: span.clone() });
            return failed(warnings, errors);
        }
    };
    let value_ty = check!(
        infer_expr(ctx, tcx, env, value),
        Type::ErrorRecovery,
        warnings,
        errors
    );
    if !crate::types::is_subtype(ctx, &value_ty, &sig.out) {
        errors.push(CompileError::YieldTypeMismatch {
            expected: sig.out.friendly_type_str(),
            received: value_ty.friendly_type_str(),
            span: value.span.clone(),
        });
    }
    if errors.is_empty() {
        recovered(sig.input, warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

pub fn type_yield_from(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    value: &Expr,
    span: &Span,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];

    let outer = match async_sig_of(&tcx.return_type) {
        Some(outer) => outer,
        None => {
            errors.push(CompileError::YieldOutsideAsync { span: span.clone() });
            return failed(warnings, errors);
        }
    };
    let value_ty = check!(
        infer_expr(ctx, tcx, env, value),
        Type::ErrorRecovery,
        warnings,
        errors
    );
    let inner = match async_sig_of(&value_ty) {
        Some(inner) => inner,
        None => {
            errors.push(CompileError::YieldFromNotAsync {
                ty: value_ty.friendly_type_str(),
                span: value.span.clone(),
            });
            return failed(warnings, errors);
        }
    };
    // The inner generator's out and err splice into the caller's channels.
    if !crate::types::is_subtype(ctx, &inner.out, &outer.out) {
        errors.push(CompileError::YieldTypeMismatch {
            expected: outer.out.friendly_type_str(),
            received: inner.out.friendly_type_str(),
            span: value.span.clone(),
        });
    }
    if !inner.err.is_never() && !crate::types::is_subtype(ctx, &inner.err, &outer.err) {
        errors.push(CompileError::YieldTypeMismatch {
            expected: outer.err.friendly_type_str(),
            received: inner.err.friendly_type_str(),
            span: value.span.clone(),
        });
    }
    if errors.is_empty() {
        recovered(inner.result, warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

pub fn type_sync(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    value: &Expr,
    span: &Span,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];

    if tcx.in_async {
        errors.push(CompileError::SyncInAsyncContext { span: span.clone() });
    }
    let value_ty = check!(
        infer_expr(ctx, tcx, env, value),
        Type::ErrorRecovery,
        warnings,
        errors
    );
    let sig = match async_sig_of(&value_ty) {
        Some(sig) => sig,
        None => {
            errors.push(CompileError::SyncNotAsync {
                ty: value_ty.friendly_type_str(),
                span: value.span.clone(),
            });
            return failed(warnings, errors);
        }
    };
    if !sig.out.is_unit() {
        errors.push(CompileError::SyncNotAsync {
            ty: value_ty.friendly_type_str(),
            span: value.span.clone(),
        });
    }
    let result = if sig.err.is_never() {
        sig.result
    } else {
        Type::union_of(vec![sig.result, sig.err])
    };
    if errors.is_empty() {
        recovered(result, warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

/// `race [e_1, ..., e_n]` completes with whichever arm finishes first, so it
/// produces the union of every arm's result and error channel.
pub fn type_race(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    arms: &[Expr],
    _span: &Span,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let mut members = vec![];
    for arm in arms {
        let arm_ty = check!(
            infer_expr(ctx, tcx, env, arm),
            Type::ErrorRecovery,
            warnings,
            errors
        );
        match async_sig_of(&arm_ty) {
            Some(sig) => {
                members.push(sig.result);
                if !sig.err.is_never() {
                    members.push(sig.err);
                }
            }
            None => errors.push(CompileError::RaceArmNotAsync {
                ty: arm_ty.friendly_type_str(),
                span: arm.span.clone(),
            }),
        }
    }
    if errors.is_empty() {
        recovered(Type::union_of(members), warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

/// `all [e_1, ..., e_n]` joins every async and tuples their results; a
/// fallible element widens the whole expression with its error channel.
pub fn type_all(
    ctx: &mut ScopeContext,
    tcx: &StmtTypeContext,
    env: &mut TypeEnv,
    elements: &[Expr],
    _span: &Span,
) -> CompileResult<Type> {
    let mut warnings = vec![];
    let mut errors = vec![];
    let mut results = vec![];
    let mut errs = vec![];
    for element in elements {
        let element_ty = check!(
            infer_expr(ctx, tcx, env, element),
            Type::ErrorRecovery,
            warnings,
            errors
        );
        match async_sig_of(&element_ty) {
            Some(sig) => {
                results.push(sig.result);
                if !sig.err.is_never() {
                    errs.push(sig.err);
                }
            }
            None => errors.push(CompileError::AllElemNotAsync {
                ty: element_ty.friendly_type_str(),
                span: element.span.clone(),
            }),
        }
    }
    let tupled = Type::Tuple(results);
    let result = if errs.is_empty() {
        tupled
    } else {
        let mut members = vec![tupled];
        members.append(&mut errs);
        Type::union_of(members)
    };
    if errors.is_empty() {
        recovered(result, warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

// --- free-variable analysis ---------------------------------------------

/// Free variables of a spawned task body: identifier uses not bound inside
/// the body itself. Names are folded keys; spans point at the first use.
pub(crate) fn free_variables(body: &Block) -> Vec<(IdKey, Span)> {
    let mut walker = FreeVars {
        bound: vec![HashSet::new()],
        free: vec![],
        seen: HashSet::new(),
    };
    walker.walk_block_scoped(body);
    walker.free
}

struct FreeVars {
    bound: Vec<HashSet<IdKey>>,
    free: Vec<(IdKey, Span)>,
    seen: HashSet<IdKey>,
}

impl FreeVars {
    fn is_bound(&self, key: &str) -> bool {
        self.bound.iter().any(|scope| scope.contains(key))
    }

    fn bind(&mut self, key: IdKey) {
        self.bound
            .last_mut()
            .expect("free-vars walker always has a scope")
            .insert(key);
    }

    fn use_of(&mut self, key: &IdKey, span: &Span) {
        if !self.is_bound(key) && self.seen.insert(key.clone()) {
            self.free.push((key.clone(), span.clone()));
        }
    }

    fn walk_block_scoped(&mut self, block: &Block) {
        self.bound.push(HashSet::new());
        for stmt in &block.stmts {
            self.walk_stmt(stmt);
        }
        if let Some(tail) = &block.tail {
            self.walk_expr(tail);
        }
        self.bound.pop();
    }

    fn walk_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let(binding) | Stmt::Var(binding) => {
                self.walk_expr(&binding.init);
                self.walk_pattern(&binding.pattern);
            }
            Stmt::ShadowLet(shadow) | Stmt::ShadowVar(shadow) => {
                self.walk_expr(&shadow.init);
                self.bind(shadow.name.key().clone());
            }
            Stmt::Assign { place, value, .. } | Stmt::CompoundAssign { place, value, .. } => {
                self.walk_expr(place);
                self.walk_expr(value);
            }
            Stmt::Expr { value, .. }
            | Stmt::Result { value, .. }
            | Stmt::StaticAssert {
                condition: value, ..
            } => self.walk_expr(value),
            Stmt::Defer { body, .. }
            | Stmt::Frame { body, .. }
            | Stmt::Unsafe { body, .. }
            | Stmt::Key { body, .. } => self.walk_block_scoped(body),
            Stmt::Region { alias, body, .. } => {
                self.bound.push(HashSet::new());
                if let Some(alias) = alias {
                    self.bind(alias.key().clone());
                }
                for stmt in &body.stmts {
                    self.walk_stmt(stmt);
                }
                if let Some(tail) = &body.tail {
                    self.walk_expr(tail);
                }
                self.bound.pop();
            }
            Stmt::Return { value, .. } | Stmt::Break { value, .. } => {
                if let Some(value) = value {
                    self.walk_expr(value);
                }
            }
            Stmt::Continue { .. } | Stmt::Error { .. } => {}
        }
    }

    fn walk_pattern(&mut self, pattern: &Pattern) {
        match &pattern.kind {
            PatternKind::Identifier(name) | PatternKind::Typed { name, .. } => {
                self.bind(name.key().clone());
            }
            PatternKind::Tuple(elements) => {
                for element in elements {
                    self.walk_pattern(element);
                }
            }
            PatternKind::Record { fields, .. } => {
                for field in fields {
                    match &field.pattern {
                        Some(sub) => self.walk_pattern(sub),
                        None => self.bind(field.name.key().clone()),
                    }
                }
            }
            PatternKind::Enum { payload, .. } => match payload {
                Some(EnumPayloadPattern::Tuple(elements)) => {
                    for element in elements {
                        self.walk_pattern(element);
                    }
                }
                Some(EnumPayloadPattern::Record(fields)) => {
                    for field in fields {
                        match &field.pattern {
                            Some(sub) => self.walk_pattern(sub),
                            None => self.bind(field.name.key().clone()),
                        }
                    }
                }
                None => {}
            },
            PatternKind::Modal { fields, .. } => {
                if let Some(fields) = fields {
                    for field in fields {
                        match &field.pattern {
                            Some(sub) => self.walk_pattern(sub),
                            None => self.bind(field.name.key().clone()),
                        }
                    }
                }
            }
            PatternKind::Wildcard | PatternKind::Literal(_) | PatternKind::Range { .. } => {}
        }
    }

    fn walk_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Identifier(name) => {
                let key = name.key().clone();
                self.use_of(&key, &name.span);
            }
            ExprKind::EnumLiteral { payload, .. } => match payload {
                Some(EnumPayload::Tuple(elements)) => {
                    for element in elements {
                        self.walk_expr(element);
                    }
                }
                Some(EnumPayload::Record(fields)) => {
                    for field in fields {
                        self.walk_expr(&field.value);
                    }
                }
                None => {}
            },
            ExprKind::RecordLiteral { fields, .. } => {
                for field in fields {
                    self.walk_expr(&field.value);
                }
            }
            ExprKind::Tuple(elements) | ExprKind::Array(elements) | ExprKind::All(elements) => {
                for element in elements {
                    self.walk_expr(element);
                }
            }
            ExprKind::Race(arms) => {
                for arm in arms {
                    self.walk_expr(arm);
                }
            }
            ExprKind::ArrayRepeat { value, count } => {
                self.walk_expr(value);
                self.walk_expr(count);
            }
            ExprKind::Range { lo, hi, .. } => {
                if let Some(lo) = lo {
                    self.walk_expr(lo);
                }
                if let Some(hi) = hi {
                    self.walk_expr(hi);
                }
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.walk_expr(lhs);
                self.walk_expr(rhs);
            }
            ExprKind::Unary { value, .. }
            | ExprKind::Cast { value, .. }
            | ExprKind::Deref(value)
            | ExprKind::AddressOf(value)
            | ExprKind::Move(value)
            | ExprKind::Propagate(value)
            | ExprKind::Yield { value }
            | ExprKind::YieldFrom { value }
            | ExprKind::Sync(value)
            | ExprKind::Wait(value)
            | ExprKind::Transmute { value, .. } => self.walk_expr(value),
            ExprKind::Alloc { value, .. } => self.walk_expr(value),
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.walk_expr(cond);
                self.walk_expr(then_branch);
                if let Some(else_branch) = else_branch {
                    self.walk_expr(else_branch);
                }
            }
            ExprKind::Match { value, arms } => {
                self.walk_expr(value);
                for arm in arms {
                    self.bound.push(HashSet::new());
                    self.walk_pattern(&arm.pattern);
                    if let Some(guard) = &arm.guard {
                        self.walk_expr(guard);
                    }
                    self.walk_expr(&arm.body);
                    self.bound.pop();
                }
            }
            ExprKind::Loop { body } => self.walk_block_scoped(body),
            ExprKind::While { cond, body } => {
                self.walk_expr(cond);
                self.walk_block_scoped(body);
            }
            ExprKind::For {
                pattern,
                iter,
                body,
            } => {
                self.walk_expr(iter);
                self.bound.push(HashSet::new());
                self.walk_pattern(pattern);
                for stmt in &body.stmts {
                    self.walk_stmt(stmt);
                }
                if let Some(tail) = &body.tail {
                    self.walk_expr(tail);
                }
                self.bound.pop();
            }
            ExprKind::Block(body) | ExprKind::UnsafeBlock(body) => self.walk_block_scoped(body),
            ExprKind::FieldAccess { base, .. } | ExprKind::TupleAccess { base, .. } => {
                self.walk_expr(base)
            }
            ExprKind::IndexAccess { base, index } => {
                self.walk_expr(base);
                self.walk_expr(index);
            }
            ExprKind::Call { callee, args, .. } => {
                self.walk_expr(callee);
                for arg in args {
                    self.walk_expr(&arg.value);
                }
            }
            ExprKind::MethodCall { receiver, args, .. } => {
                self.walk_expr(receiver);
                for arg in args {
                    self.walk_expr(&arg.value);
                }
            }
            ExprKind::Parallel { domain, body } => {
                self.walk_expr(domain);
                self.walk_block_scoped(body);
            }
            ExprKind::Spawn { options, body } => {
                for option in options {
                    if let SpawnOption::Name(value) = option {
                        self.walk_expr(value);
                    }
                }
                self.walk_block_scoped(body);
            }
            ExprKind::Dispatch {
                pattern,
                range,
                options,
                body,
            } => {
                self.walk_expr(range);
                for option in options {
                    if let DispatchOption::Chunk(chunk) = option {
                        self.walk_expr(chunk);
                    }
                }
                self.bound.push(HashSet::new());
                self.walk_pattern(pattern);
                for stmt in &body.stmts {
                    self.walk_stmt(stmt);
                }
                if let Some(tail) = &body.tail {
                    self.walk_expr(tail);
                }
                self.bound.pop();
            }
            ExprKind::Sizeof(_)
            | ExprKind::Alignof(_)
            | ExprKind::Error
            | ExprKind::IntLiteral { .. }
            | ExprKind::FloatLiteral { .. }
            | ExprKind::BoolLiteral(_)
            | ExprKind::CharLiteral(_)
            | ExprKind::StringLiteral(_)
            | ExprKind::NullLiteral
            | ExprKind::QualifiedName { .. } => {}
        }
    }
}
