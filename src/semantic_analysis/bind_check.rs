//! The borrow/bind checker. Runs per procedure body after typing, over the
//! `expr -> type` map the typing phase recorded. Each binding carries a move
//! state, a movability and a responsibility; each `(root, projection)` place
//! carries a permission activation state modelling reborrow-style
//! deactivation of `unique` places across calls.

use super::expression::concurrency::free_variables;
use super::place::{place_key_of, PlaceSeg};
use super::scope_context::ScopeContext;
use crate::ast::*;
use crate::error::*;
use crate::ident::IdKey;
use crate::span::Span;
use crate::types::{Permission, Type};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Loop bodies must reach a bind-state fixpoint within this many rounds.
const LOOP_FIX_CAP: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
enum BindState {
    Valid,
    Moved,
    PartiallyMoved(BTreeSet<IdKey>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Movability {
    Mov,
    Immov,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Responsibility {
    Resp,
    Alias,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BindInfo {
    state: BindState,
    mov: Movability,
    mutability: Mutability,
    resp: Responsibility,
    /// Set when the binding was moved into a spawned task, so later uses
    /// report the concurrency rule rather than the plain move error.
    spawn_moved: bool,
}

impl BindInfo {
    fn owned(mutability: Mutability) -> BindInfo {
        BindInfo {
            state: BindState::Valid,
            mov: Movability::Mov,
            mutability,
            resp: Responsibility::Resp,
            spawn_moved: false,
        }
    }

    fn alias(mutability: Mutability) -> BindInfo {
        BindInfo {
            state: BindState::Valid,
            mov: Movability::Immov,
            mutability,
            resp: Responsibility::Alias,
            spawn_moved: false,
        }
    }
}

type BindScope = BTreeMap<IdKey, BindInfo>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActiveState {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct PermKey {
    root: IdKey,
    path: Vec<PlaceSeg>,
}

type PermScope = BTreeMap<PermKey, ActiveState>;

/// The whole per-body state: binding scopes and permission scopes move in
/// lockstep.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Bundle {
    binds: Vec<BindScope>,
    perms: Vec<PermScope>,
}

impl Bundle {
    fn new() -> Bundle {
        Bundle {
            binds: vec![BindScope::new()],
            perms: vec![PermScope::new()],
        }
    }

    fn push_scope(&mut self) {
        self.binds.push(BindScope::new());
        self.perms.push(PermScope::new());
    }

    fn pop_scope(&mut self) {
        self.binds.pop();
        self.perms.pop();
    }

    fn intro(&mut self, name: IdKey, info: BindInfo) {
        self.binds
            .last_mut()
            .expect("bind env always has a scope")
            .insert(name, info);
    }

    fn info_of(&self, name: &str) -> Option<&BindInfo> {
        self.binds.iter().rev().find_map(|scope| scope.get(name))
    }

    fn info_of_mut(&mut self, name: &str) -> Option<&mut BindInfo> {
        self.binds
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
    }

    fn perm_of(&self, key: &PermKey) -> ActiveState {
        for scope in self.perms.iter().rev() {
            if let Some(state) = scope.get(key) {
                return *state;
            }
        }
        ActiveState::Active
    }

    fn set_perm(&mut self, key: PermKey, state: ActiveState) {
        self.perms
            .last_mut()
            .expect("perm env always has a scope")
            .insert(key, state);
    }
}

type BindOutcome<T> = Result<T, CompileError>;

/// Checks one procedure body. Inputs are the module path, the declared
/// parameters and an optional `self`; the verdict is ok or the first
/// violation, pointed at the offending use.
pub fn bind_check_body(
    ctx: &ScopeContext,
    params: &[Param],
    body: &Block,
    self_param: Option<&Param>,
) -> CompileResult<()> {
    let mut bundle = Bundle::new();
    for param in self_param.iter().copied().chain(params.iter()) {
        let info = match param.mode {
            Some(ParamMode::Move) => BindInfo::owned(Mutability::Let),
            None => BindInfo::alias(Mutability::Let),
        };
        bundle.intro(param.name.key().clone(), info);
    }
    match eval_block(ctx, bundle, body) {
        Ok(_) => recovered((), vec![], vec![]),
        Err(error) => failed(vec![], vec![error]),
    }
}

// --- access, move, assignment ----------------------------------------------

fn head_field(path: &[PlaceSeg]) -> Option<&IdKey> {
    match path.first() {
        Some(PlaceSeg::Field(field)) => Some(field),
        _ => None,
    }
}

/// Access of a place: the root must not be moved (or, if partially moved,
/// the head field must be outside the moved set), and every ancestor
/// permission key must be active.
fn access_place(
    bundle: &Bundle,
    root: &IdKey,
    path: &[PlaceSeg],
    span: &Span,
) -> BindOutcome<()> {
    let info = match bundle.info_of(root) {
        Some(info) => info,
        // Statics and module values are not tracked per-binding.
        None => return Ok(()),
    };
    match &info.state {
        BindState::Valid => {}
        BindState::Moved => {
            if info.spawn_moved {
                return Err(CompileError::UseAfterMoveAcrossSpawn {
                    name: root.clone(),
                    span: span.clone(),
                });
            }
            return Err(CompileError::PlaceMoved {
                name: root.clone(),
                span: span.clone(),
            });
        }
        BindState::PartiallyMoved(moved) => match head_field(path) {
            Some(head) if !moved.contains(head) => {}
            _ => {
                let field = head_field(path)
                    .cloned()
                    .or_else(|| moved.iter().next().cloned())
                    .unwrap_or_default();
                return Err(CompileError::PlacePartiallyMoved {
                    name: root.clone(),
                    field,
                    span: span.clone(),
                });
            }
        },
    }
    // Every prefix of the key, including the root itself, must be active.
    for cut in 0..=path.len() {
        let key = PermKey {
            root: root.clone(),
            path: path[..cut].to_vec(),
        };
        if bundle.perm_of(&key) == ActiveState::Inactive {
            return Err(CompileError::PlaceUniqueInactive { span: span.clone() });
        }
    }
    Ok(())
}

/// A move of a whole binding or of a single field.
fn move_place(
    ctx: &ScopeContext,
    bundle: &mut Bundle,
    place: &Expr,
    span: &Span,
) -> BindOutcome<()> {
    let (root, path) = match place_key_of(place) {
        Some(found) => found,
        None => return Ok(()),
    };
    access_place(bundle, &root, &path, span)?;
    let info = match bundle.info_of(&root) {
        Some(info) => info.clone(),
        None => return Ok(()),
    };
    if info.mov != Movability::Mov {
        return Err(CompileError::MoveImmovable {
            name: root.clone(),
            span: span.clone(),
        });
    }
    if path.is_empty() {
        if info.state != BindState::Valid {
            return Err(CompileError::MoveAlreadyMoved {
                name: root.clone(),
                span: span.clone(),
            });
        }
        if let Some(info) = bundle.info_of_mut(&root) {
            info.state = BindState::Moved;
        }
        return Ok(());
    }

    // Field move: the path must run through `unique` permissions all the way
    // down, judged from the types the typing phase recorded.
    if !field_path_is_unique(ctx, place) {
        let field = match head_field(&path) {
            Some(field) => field.clone(),
            None => String::new(),
        };
        return Err(CompileError::MoveFieldNonUnique {
            field,
            span: span.clone(),
        });
    }
    let head = match head_field(&path) {
        Some(head) => head.clone(),
        None => {
            return Err(CompileError::MoveFieldNonUnique {
                field: String::new(),
                span: span.clone(),
            })
        }
    };
    let new_state = match info.state {
        BindState::Valid => {
            let mut moved = BTreeSet::new();
            moved.insert(head);
            BindState::PartiallyMoved(moved)
        }
        BindState::PartiallyMoved(mut moved) => {
            if moved.contains(&head) {
                return Err(CompileError::MoveFieldAlreadyMoved {
                    name: root.clone(),
                    field: head,
                    span: span.clone(),
                });
            }
            moved.insert(head);
            BindState::PartiallyMoved(moved)
        }
        BindState::Moved => {
            return Err(CompileError::MoveAlreadyMoved {
                name: root.clone(),
                span: span.clone(),
            })
        }
    };
    if let Some(info) = bundle.info_of_mut(&root) {
        info.state = new_state;
    }
    Ok(())
}

/// Every base along a moved field path must carry the `unique` permission in
/// its recorded type.
fn field_path_is_unique(ctx: &ScopeContext, place: &Expr) -> bool {
    match &place.kind {
        ExprKind::Identifier(_) => true,
        ExprKind::FieldAccess { base, .. }
        | ExprKind::TupleAccess { base, .. }
        | ExprKind::IndexAccess { base, .. } => {
            let base_unique = ctx
                .expr_type(base.id)
                .map(|ty| {
                    ty.perm_of() == Some(Permission::Unique) || ty.is_error_recovery()
                })
                .unwrap_or(false);
            base_unique && field_path_is_unique(ctx, base)
        }
        ExprKind::Deref(base) => field_path_is_unique(ctx, base),
        _ => false,
    }
}

/// A whole-place assignment revalidates the binding; a field assignment
/// restores that field.
fn assign_place(bundle: &mut Bundle, place: &Expr, span: &Span) -> BindOutcome<()> {
    let (root, path) = match place_key_of(place) {
        Some(found) => found,
        None => return Ok(()),
    };
    if path.is_empty() {
        if let Some(info) = bundle.info_of_mut(&root) {
            info.state = BindState::Valid;
            info.spawn_moved = false;
        }
        return Ok(());
    }
    if let Some(head) = head_field(&path).cloned() {
        let restored = match bundle.info_of(&root).map(|info| info.state.clone()) {
            Some(BindState::PartiallyMoved(mut moved)) if moved.contains(&head) => {
                moved.remove(&head);
                Some(if moved.is_empty() {
                    BindState::Valid
                } else {
                    BindState::PartiallyMoved(moved)
                })
            }
            _ => None,
        };
        if let Some(state) = restored {
            if let Some(info) = bundle.info_of_mut(&root) {
                info.state = state;
            }
            return Ok(());
        }
    }
    access_place(bundle, &root, &path, span)
}

// --- joins -----------------------------------------------------------------

fn join_state(lhs: &BindState, rhs: &BindState) -> BindState {
    use BindState::*;
    match (lhs, rhs) {
        (Moved, _) | (_, Moved) => Moved,
        (PartiallyMoved(a), PartiallyMoved(b)) => {
            let mut merged = a.clone();
            merged.extend(b.iter().cloned());
            PartiallyMoved(merged)
        }
        (PartiallyMoved(a), Valid) => PartiallyMoved(a.clone()),
        (Valid, PartiallyMoved(b)) => PartiallyMoved(b.clone()),
        (Valid, Valid) => Valid,
    }
}

fn join_info(lhs: &BindInfo, rhs: &BindInfo) -> Option<BindInfo> {
    if lhs.mov != rhs.mov || lhs.mutability != rhs.mutability || lhs.resp != rhs.resp {
        return None;
    }
    let mut out = lhs.clone();
    out.state = join_state(&lhs.state, &rhs.state);
    out.spawn_moved = lhs.spawn_moved || rhs.spawn_moved;
    Some(out)
}

fn join_bundles(lhs: &Bundle, rhs: &Bundle, span: &Span) -> BindOutcome<Bundle> {
    if lhs.binds.len() != rhs.binds.len() || lhs.perms.len() != rhs.perms.len() {
        return Err(CompileError::BindJoinMismatch { span: span.clone() });
    }
    let mut binds = Vec::with_capacity(lhs.binds.len());
    for (left, right) in lhs.binds.iter().zip(rhs.binds.iter()) {
        if left.len() != right.len() {
            return Err(CompileError::BindJoinMismatch { span: span.clone() });
        }
        let mut scope = BindScope::new();
        for ((name_l, info_l), (name_r, info_r)) in left.iter().zip(right.iter()) {
            if name_l != name_r {
                return Err(CompileError::BindJoinMismatch { span: span.clone() });
            }
            match join_info(info_l, info_r) {
                Some(joined) => {
                    scope.insert(name_l.clone(), joined);
                }
                None => return Err(CompileError::BindJoinMismatch { span: span.clone() }),
            }
        }
        binds.push(scope);
    }
    let mut perms = Vec::with_capacity(lhs.perms.len());
    for (left, right) in lhs.perms.iter().zip(rhs.perms.iter()) {
        let mut scope = PermScope::new();
        let keys: BTreeSet<PermKey> = left.keys().chain(right.keys()).cloned().collect();
        for key in keys {
            let state_l = left.get(&key).copied().unwrap_or(ActiveState::Active);
            let state_r = right.get(&key).copied().unwrap_or(ActiveState::Active);
            let joined = if state_l == ActiveState::Active && state_r == ActiveState::Active {
                ActiveState::Active
            } else {
                ActiveState::Inactive
            };
            scope.insert(key, joined);
        }
        perms.push(scope);
    }
    Ok(Bundle { binds, perms })
}

/// The loop fixpoint: re-run the body from the joined entry state until
/// nothing changes, bounded by the iteration cap.
fn loop_fix(
    ctx: &ScopeContext,
    init: Bundle,
    span: &Span,
    step: impl Fn(&ScopeContext, Bundle) -> BindOutcome<Bundle>,
) -> BindOutcome<Bundle> {
    let mut current = init.clone();
    for _ in 0..LOOP_FIX_CAP {
        let after = step(ctx, current.clone())?;
        let joined = join_bundles(&init, &after, span)?;
        if joined == current {
            return Ok(joined);
        }
        current = joined;
    }
    Err(CompileError::LoopFixpointOverflow { span: span.clone() })
}

// --- argument passing ------------------------------------------------------

/// Evaluates a call's arguments: move parameters consume their argument
/// places; unique place arguments lend their permission keys out for the
/// duration of the call and take them back afterwards.
fn arg_pass(
    ctx: &ScopeContext,
    mut bundle: Bundle,
    params: Option<&[crate::types::FuncParam]>,
    args: &[Arg],
) -> BindOutcome<Bundle> {
    let mut lent: Vec<PermKey> = vec![];
    for (index, arg) in args.iter().enumerate() {
        let param = params.and_then(|params| params.get(index));
        let is_move_param = param
            .map(|param| param.mode == Some(ParamMode::Move))
            .unwrap_or(false);
        if is_move_param {
            if arg.moved {
                bundle = eval_expr(ctx, bundle, &arg.value)?;
                bundle = perform_move(ctx, bundle, &arg.value, &arg.span)?;
                continue;
            }
            match &arg.value.kind {
                ExprKind::Move(_) => {
                    bundle = eval_expr(ctx, bundle, &arg.value)?;
                }
                _ => {
                    return Err(CompileError::ArgPassMoveMissing {
                        span: arg.span.clone(),
                    })
                }
            }
            continue;
        }

        bundle = eval_expr(ctx, bundle, &arg.value)?;

        // A unique place handed to a permissioned parameter goes inactive
        // until the call returns; downgrades to const behave identically.
        let param_wants_place = param.map(|param| param.ty.perm_of().is_some()).unwrap_or(false);
        let arg_is_unique_place = ctx
            .expr_type(arg.value.id)
            .map(|ty| ty.perm_of() == Some(Permission::Unique))
            .unwrap_or(false);
        if param_wants_place && arg_is_unique_place {
            if let Some((root, path)) = place_key_of(&arg.value) {
                for cut in 0..=path.len() {
                    let key = PermKey {
                        root: root.clone(),
                        path: path[..cut].to_vec(),
                    };
                    bundle.set_perm(key.clone(), ActiveState::Inactive);
                    lent.push(key);
                }
            }
        }
    }
    // The call as a whole has returned: reactivate everything lent out.
    for key in lent {
        bundle.set_perm(key, ActiveState::Active);
    }
    Ok(bundle)
}

fn perform_move(
    ctx: &ScopeContext,
    mut bundle: Bundle,
    place: &Expr,
    span: &Span,
) -> BindOutcome<Bundle> {
    move_place(ctx, &mut bundle, place, span)?;
    Ok(bundle)
}

// --- expression and statement walking --------------------------------------

fn eval_block(ctx: &ScopeContext, mut bundle: Bundle, block: &Block) -> BindOutcome<Bundle> {
    bundle.push_scope();
    let result = eval_block_in_place(ctx, bundle, block);
    match result {
        Ok(mut bundle) => {
            bundle.pop_scope();
            Ok(bundle)
        }
        Err(error) => Err(error),
    }
}

fn eval_block_in_place(
    ctx: &ScopeContext,
    mut bundle: Bundle,
    block: &Block,
) -> BindOutcome<Bundle> {
    for stmt in &block.stmts {
        bundle = eval_stmt(ctx, bundle, stmt)?;
    }
    if let Some(tail) = &block.tail {
        bundle = eval_expr(ctx, bundle, tail)?;
    }
    Ok(bundle)
}

fn intro_pattern(ctx: &ScopeContext, bundle: &mut Bundle, pattern: &Pattern, init: &Expr) {
    // Bindings behind a permissioned initializer are aliases; owned values
    // make the binding responsible for its storage.
    let init_perm = ctx.expr_type(init.id).and_then(Type::perm_of);
    let template = |mutability| match init_perm {
        Some(_) => BindInfo::alias(mutability),
        None => BindInfo::owned(mutability),
    };
    intro_pattern_names(bundle, pattern, &template(Mutability::Let));
}

fn intro_pattern_names(bundle: &mut Bundle, pattern: &Pattern, info: &BindInfo) {
    match &pattern.kind {
        PatternKind::Identifier(name) | PatternKind::Typed { name, .. } => {
            bundle.intro(name.key().clone(), info.clone());
        }
        PatternKind::Tuple(elements) => {
            for element in elements {
                intro_pattern_names(bundle, element, info);
            }
        }
        PatternKind::Record { fields, .. } => {
            for field in fields {
                match &field.pattern {
                    Some(sub) => intro_pattern_names(bundle, sub, info),
                    None => bundle.intro(field.name.key().clone(), info.clone()),
                }
            }
        }
        PatternKind::Enum { payload, .. } => match payload {
            Some(EnumPayloadPattern::Tuple(elements)) => {
                for element in elements {
                    intro_pattern_names(bundle, element, info);
                }
            }
            Some(EnumPayloadPattern::Record(fields)) => {
                for field in fields {
                    match &field.pattern {
                        Some(sub) => intro_pattern_names(bundle, sub, info),
                        None => bundle.intro(field.name.key().clone(), info.clone()),
                    }
                }
            }
            None => {}
        },
        PatternKind::Modal { fields, .. } => {
            if let Some(fields) = fields {
                for field in fields {
                    match &field.pattern {
                        Some(sub) => intro_pattern_names(bundle, sub, info),
                        None => bundle.intro(field.name.key().clone(), info.clone()),
                    }
                }
            }
        }
        PatternKind::Wildcard | PatternKind::Literal(_) | PatternKind::Range { .. } => {}
    }
}

fn eval_binding_stmt(
    ctx: &ScopeContext,
    mut bundle: Bundle,
    binding: &BindingStmt,
    mutability: Mutability,
) -> BindOutcome<Bundle> {
    bundle = eval_expr(ctx, bundle, &binding.init)?;
    let init_perm = ctx.expr_type(binding.init.id).and_then(Type::perm_of);
    let info = match init_perm {
        Some(_) => BindInfo::alias(mutability),
        None => BindInfo::owned(mutability),
    };
    intro_pattern_names(&mut bundle, &binding.pattern, &info);
    Ok(bundle)
}

fn eval_stmt(ctx: &ScopeContext, mut bundle: Bundle, stmt: &Stmt) -> BindOutcome<Bundle> {
    match stmt {
        Stmt::Let(binding) => eval_binding_stmt(ctx, bundle, binding, Mutability::Let),
        Stmt::Var(binding) => eval_binding_stmt(ctx, bundle, binding, Mutability::Var),
        Stmt::ShadowLet(shadow) => {
            bundle = eval_expr(ctx, bundle, &shadow.init)?;
            let init_perm = ctx.expr_type(shadow.init.id).and_then(Type::perm_of);
            let info = match init_perm {
                Some(_) => BindInfo::alias(Mutability::Let),
                None => BindInfo::owned(Mutability::Let),
            };
            bundle.intro(shadow.name.key().clone(), info);
            Ok(bundle)
        }
        Stmt::ShadowVar(shadow) => {
            bundle = eval_expr(ctx, bundle, &shadow.init)?;
            let init_perm = ctx.expr_type(shadow.init.id).and_then(Type::perm_of);
            let info = match init_perm {
                Some(_) => BindInfo::alias(Mutability::Var),
                None => BindInfo::owned(Mutability::Var),
            };
            bundle.intro(shadow.name.key().clone(), info);
            Ok(bundle)
        }
        Stmt::Assign { place, value, span } | Stmt::CompoundAssign { place, value, span, .. } => {
            bundle = eval_expr(ctx, bundle, value)?;
            assign_place(&mut bundle, place, span)?;
            Ok(bundle)
        }
        Stmt::Expr { value, .. } | Stmt::Result { value, .. } => eval_expr(ctx, bundle, value),
        Stmt::Defer { body, .. }
        | Stmt::Frame { body, .. }
        | Stmt::Unsafe { body, .. }
        | Stmt::Key { body, .. } => eval_block(ctx, bundle, body),
        Stmt::Region { alias, body, .. } => {
            bundle.push_scope();
            if let Some(alias) = alias {
                bundle.intro(alias.key().clone(), BindInfo::alias(Mutability::Let));
            }
            bundle = eval_block_in_place(ctx, bundle, body)?;
            bundle.pop_scope();
            Ok(bundle)
        }
        Stmt::Return { value, .. } | Stmt::Break { value, .. } => {
            if let Some(value) = value {
                bundle = eval_expr(ctx, bundle, value)?;
            }
            Ok(bundle)
        }
        Stmt::Continue { .. } | Stmt::StaticAssert { .. } | Stmt::Error { .. } => Ok(bundle),
    }
}

fn eval_exprs(ctx: &ScopeContext, mut bundle: Bundle, exprs: &[Expr]) -> BindOutcome<Bundle> {
    for expr in exprs {
        bundle = eval_expr(ctx, bundle, expr)?;
    }
    Ok(bundle)
}

fn eval_expr(ctx: &ScopeContext, mut bundle: Bundle, expr: &Expr) -> BindOutcome<Bundle> {
    // Place-shaped expressions are a single access of the designated
    // location.
    if let Some((root, path)) = place_key_of(expr) {
        access_place(&bundle, &root, &path, &expr.span)?;
        return Ok(bundle);
    }

    match &expr.kind {
        ExprKind::Move(place) => {
            move_place(ctx, &mut bundle, place, &expr.span)?;
            Ok(bundle)
        }
        ExprKind::AddressOf(place) => {
            if let Some((root, path)) = place_key_of(place) {
                access_place(&bundle, &root, &path, &expr.span)?;
            }
            Ok(bundle)
        }
        ExprKind::Call { callee, args, .. } => {
            bundle = eval_expr(ctx, bundle, callee)?;
            let params = ctx.expr_type(callee.id).cloned().and_then(|ty| match ty {
                Type::Func { params, .. } => Some(params),
                _ => None,
            });
            arg_pass(ctx, bundle, params.as_deref(), args)
        }
        ExprKind::MethodCall { receiver, args, .. } => {
            bundle = eval_expr(ctx, bundle, receiver)?;
            arg_pass(ctx, bundle, None, args)
        }
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            bundle = eval_expr(ctx, bundle, cond)?;
            let then_bundle = eval_expr(ctx, bundle.clone(), then_branch)?;
            let else_bundle = match else_branch {
                Some(else_branch) => eval_expr(ctx, bundle.clone(), else_branch)?,
                None => bundle.clone(),
            };
            join_bundles(&then_bundle, &else_bundle, &expr.span)
        }
        ExprKind::Match { value, arms } => {
            bundle = eval_expr(ctx, bundle, value)?;
            let mut joined: Option<Bundle> = None;
            for arm in arms {
                let mut arm_bundle = bundle.clone();
                arm_bundle.push_scope();
                intro_pattern(ctx, &mut arm_bundle, &arm.pattern, value);
                if let Some(guard) = &arm.guard {
                    arm_bundle = eval_expr(ctx, arm_bundle, guard)?;
                }
                arm_bundle = eval_expr(ctx, arm_bundle, &arm.body)?;
                arm_bundle.pop_scope();
                joined = Some(match joined {
                    None => arm_bundle,
                    Some(existing) => join_bundles(&existing, &arm_bundle, &arm.span)?,
                });
            }
            Ok(joined.unwrap_or(bundle))
        }
        ExprKind::Loop { body } => loop_fix(ctx, bundle, &expr.span, |ctx, entry| {
            eval_block(ctx, entry, body)
        }),
        ExprKind::While { cond, body } => {
            bundle = eval_expr(ctx, bundle, cond)?;
            loop_fix(ctx, bundle, &expr.span, |ctx, entry| {
                let after = eval_block(ctx, entry, body)?;
                eval_expr(ctx, after, cond)
            })
        }
        ExprKind::For {
            pattern,
            iter,
            body,
        } => {
            bundle = eval_expr(ctx, bundle, iter)?;
            let pattern = pattern.clone();
            let iter = iter.clone();
            loop_fix(ctx, bundle, &expr.span, move |ctx, mut entry| {
                entry.push_scope();
                intro_pattern(ctx, &mut entry, &pattern, &iter);
                let mut after = eval_block_in_place(ctx, entry, body)?;
                after.pop_scope();
                Ok(after)
            })
        }
        ExprKind::Block(body) | ExprKind::UnsafeBlock(body) => eval_block(ctx, bundle, body),
        ExprKind::Spawn { options, body } => {
            let mut move_listed: HashSet<IdKey> = HashSet::new();
            for option in options {
                match option {
                    SpawnOption::Name(value) => {
                        bundle = eval_expr(ctx, bundle, value)?;
                    }
                    SpawnOption::MoveCapture(name) => {
                        move_listed.insert(name.key().clone());
                    }
                }
            }
            // Captures are accesses at spawn time.
            for (name, span) in free_variables(body) {
                if bundle.info_of(&name).is_some() {
                    access_place(&bundle, &name, &[], &span)?;
                }
            }
            bundle = eval_block(ctx, bundle, body)?;
            // Move-listed captures are gone after the spawn; later uses are
            // use-after-move across tasks.
            for name in move_listed {
                if let Some(info) = bundle.info_of_mut(&name) {
                    info.state = BindState::Moved;
                    info.spawn_moved = true;
                }
            }
            Ok(bundle)
        }
        ExprKind::Parallel { domain, body } => {
            bundle = eval_expr(ctx, bundle, domain)?;
            eval_block(ctx, bundle, body)
        }
        ExprKind::Dispatch {
            pattern,
            range,
            options,
            body,
        } => {
            bundle = eval_expr(ctx, bundle, range)?;
            for option in options {
                if let DispatchOption::Chunk(chunk) = option {
                    bundle = eval_expr(ctx, bundle, chunk)?;
                }
            }
            let pattern = pattern.clone();
            let range = range.clone();
            loop_fix(ctx, bundle, &expr.span, move |ctx, mut entry| {
                entry.push_scope();
                intro_pattern(ctx, &mut entry, &pattern, &range);
                let mut after = eval_block_in_place(ctx, entry, body)?;
                after.pop_scope();
                Ok(after)
            })
        }
        ExprKind::EnumLiteral { payload, .. } => match payload {
            Some(EnumPayload::Tuple(elements)) => eval_exprs(ctx, bundle, elements),
            Some(EnumPayload::Record(fields)) => {
                for field in fields {
                    bundle = eval_expr(ctx, bundle, &field.value)?;
                }
                Ok(bundle)
            }
            None => Ok(bundle),
        },
        ExprKind::RecordLiteral { fields, .. } => {
            for field in fields {
                bundle = eval_expr(ctx, bundle, &field.value)?;
            }
            Ok(bundle)
        }
        ExprKind::Tuple(elements) | ExprKind::Array(elements) | ExprKind::All(elements) => {
            eval_exprs(ctx, bundle, elements)
        }
        ExprKind::Race(arms) => eval_exprs(ctx, bundle, arms),
        ExprKind::ArrayRepeat { value, count } => {
            bundle = eval_expr(ctx, bundle, value)?;
            eval_expr(ctx, bundle, count)
        }
        ExprKind::Range { lo, hi, .. } => {
            if let Some(lo) = lo {
                bundle = eval_expr(ctx, bundle, lo)?;
            }
            if let Some(hi) = hi {
                bundle = eval_expr(ctx, bundle, hi)?;
            }
            Ok(bundle)
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            bundle = eval_expr(ctx, bundle, lhs)?;
            eval_expr(ctx, bundle, rhs)
        }
        ExprKind::Unary { value, .. }
        | ExprKind::Cast { value, .. }
        | ExprKind::Propagate(value)
        | ExprKind::Yield { value }
        | ExprKind::YieldFrom { value }
        | ExprKind::Sync(value)
        | ExprKind::Wait(value)
        | ExprKind::Transmute { value, .. }
        | ExprKind::Alloc { value, .. } => eval_expr(ctx, bundle, value),
        ExprKind::Deref(base) => eval_expr(ctx, bundle, base),
        ExprKind::FieldAccess { base, .. }
        | ExprKind::TupleAccess { base, .. } => eval_expr(ctx, bundle, base),
        ExprKind::IndexAccess { base, index } => {
            bundle = eval_expr(ctx, bundle, base)?;
            eval_expr(ctx, bundle, index)
        }
        ExprKind::Error
        | ExprKind::IntLiteral { .. }
        | ExprKind::FloatLiteral { .. }
        | ExprKind::BoolLiteral(_)
        | ExprKind::CharLiteral(_)
        | ExprKind::StringLiteral(_)
        | ExprKind::NullLiteral
        | ExprKind::Identifier(_)
        | ExprKind::QualifiedName { .. }
        | ExprKind::Sizeof(_)
        | ExprKind::Alignof(_) => Ok(bundle),
    }
}
