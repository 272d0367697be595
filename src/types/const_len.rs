use crate::ast::{BinaryOp, Expr, ExprKind};
use crate::error::{failed, recovered, CompileError, CompileResult};
use crate::semantic_analysis::ScopeContext;

/// Evaluates a compile-time array length: an integer literal, or a path to an
/// integer `static let`. Anything else poisons the containing array type.
pub fn const_len(ctx: &ScopeContext, expr: &Expr) -> CompileResult<u64> {
    match const_eval_int(ctx, expr) {
        Some(value) if value >= 0 => recovered(value as u64, vec![], vec![]),
        _ => failed(
            vec![],
            vec![CompileError::ConstLenInvalid {
                span: expr.span.clone(),
            }],
        ),
    }
}

/// The tiny constant evaluator backing `const_len`, constant array indices,
/// range patterns and `static_assert`. Follows `static let` paths one level;
/// `static var` items are runtime state and never constant.
pub fn const_eval_int(ctx: &ScopeContext, expr: &Expr) -> Option<i128> {
    match &expr.kind {
        ExprKind::IntLiteral { value, .. } => Some(*value),
        ExprKind::Unary {
            op: crate::ast::UnaryOp::Neg,
            value,
        } => const_eval_int(ctx, value).map(|value| -value),
        ExprKind::Identifier(name) => {
            let decl = ctx.lookup_static(&[], &name.name)?;
            static_int_value(decl)
        }
        ExprKind::QualifiedName { path, name } => {
            let decl = ctx.lookup_static(path, &name.name)?;
            static_int_value(decl)
        }
        _ => None,
    }
}

fn static_int_value(decl: &crate::ast::StaticDecl) -> Option<i128> {
    if decl.mutability != crate::ast::Mutability::Let {
        return None;
    }
    match &decl.init.kind {
        ExprKind::IntLiteral { value, .. } => Some(*value),
        _ => None,
    }
}

/// Constant boolean evaluation for `static_assert`: boolean literals plus
/// comparisons between constant integers.
pub fn const_eval_bool(ctx: &ScopeContext, expr: &Expr) -> Option<bool> {
    match &expr.kind {
        ExprKind::BoolLiteral(value) => Some(*value),
        ExprKind::Unary {
            op: crate::ast::UnaryOp::Not,
            value,
        } => const_eval_bool(ctx, value).map(|value| !value),
        ExprKind::Binary { op, lhs, rhs } if op.is_comparison() => {
            let lhs = const_eval_int(ctx, lhs)?;
            let rhs = const_eval_int(ctx, rhs)?;
            Some(match op {
                BinaryOp::Eq => lhs == rhs,
                BinaryOp::Neq => lhs != rhs,
                BinaryOp::Lt => lhs < rhs,
                BinaryOp::Leq => lhs <= rhs,
                BinaryOp::Gt => lhs > rhs,
                BinaryOp::Geq => lhs >= rhs,
                _ => unreachable!(),
            })
        }
        ExprKind::Binary { op, lhs, rhs } if op.is_logical() => {
            let lhs = const_eval_bool(ctx, lhs)?;
            let rhs = const_eval_bool(ctx, rhs)?;
            Some(match op {
                BinaryOp::And => lhs && rhs,
                BinaryOp::Or => lhs || rhs,
                _ => unreachable!(),
            })
        }
        _ => None,
    }
}
