use super::pattern::Pattern;
use super::statement::Block;
use super::ty::TypeExpr;
use super::{ModulePath, NodeId, TypePath};
use crate::ident::Ident;
use crate::span::Span;

#[derive(Debug, Clone)]
pub struct Expr {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(id: NodeId, kind: ExprKind, span: Span) -> Expr {
        Expr { id, span, kind }
    }
}

/// A call argument: `move` marks explicit ownership transfer at the call
/// site.
#[derive(Debug, Clone)]
pub struct Arg {
    pub moved: bool,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct FieldInit {
    pub name: Ident,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum EnumPayload {
    Tuple(Vec<Expr>),
    Record(Vec<FieldInit>),
}

#[derive(Debug, Clone)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeKind {
    Full,
    From,
    To,
    ToInclusive,
    Exclusive,
    Inclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Neq,
    Lt,
    Leq,
    Gt,
    Geq,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        use BinaryOp::*;
        matches!(self, Eq | Neq | Lt | Leq | Gt | Geq)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn symbol(self) -> &'static str {
        use BinaryOp::*;
        match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Rem => "%",
            And => "and",
            Or => "or",
            BitAnd => "&",
            BitOr => "|",
            BitXor => "^",
            Shl => "<<",
            Shr => ">>",
            Eq => "==",
            Neq => "!=",
            Lt => "<",
            Leq => "<=",
            Gt => ">",
            Geq => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Add,
    Mul,
    Min,
    Max,
    And,
    Or,
}

#[derive(Debug, Clone)]
pub enum SpawnOption {
    /// `name: <string literal>`
    Name(Expr),
    /// `move x` explicitly moves a captured binding into the task.
    MoveCapture(Ident),
}

#[derive(Debug, Clone)]
pub enum DispatchOption {
    Reduce(ReduceOp),
    Ordered,
    Chunk(Expr),
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Placeholder produced by upstream error recovery.
    Error,
    IntLiteral {
        value: i128,
        suffix: Option<String>,
    },
    FloatLiteral {
        value: f64,
        suffix: Option<String>,
    },
    BoolLiteral(bool),
    CharLiteral(char),
    StringLiteral(String),
    NullLiteral,
    Identifier(Ident),
    /// `a::b::name` referring to a value in another module.
    QualifiedName {
        path: ModulePath,
        name: Ident,
    },
    /// `E::V`, `E::V(..)` or `E::V { .. }`.
    EnumLiteral {
        path: TypePath,
        variant: Ident,
        payload: Option<EnumPayload>,
    },
    /// `R { f: v, .. }`, optionally pinned to a modal state `R@S { .. }`.
    RecordLiteral {
        path: TypePath,
        generic_args: Vec<TypeExpr>,
        state: Option<Ident>,
        fields: Vec<FieldInit>,
    },
    Tuple(Vec<Expr>),
    Array(Vec<Expr>),
    ArrayRepeat {
        value: Box<Expr>,
        count: Box<Expr>,
    },
    Sizeof(TypeExpr),
    Alignof(TypeExpr),
    Range {
        kind: RangeKind,
        lo: Option<Box<Expr>>,
        hi: Option<Box<Expr>>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        value: Box<Expr>,
    },
    Cast {
        value: Box<Expr>,
        ty: TypeExpr,
    },
    Deref(Box<Expr>),
    AddressOf(Box<Expr>),
    Move(Box<Expr>),
    Alloc {
        region: Option<Ident>,
        value: Box<Expr>,
    },
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
    },
    Match {
        value: Box<Expr>,
        arms: Vec<MatchArm>,
    },
    Loop {
        body: Block,
    },
    While {
        cond: Box<Expr>,
        body: Block,
    },
    For {
        pattern: Box<Pattern>,
        iter: Box<Expr>,
        body: Block,
    },
    Block(Block),
    UnsafeBlock(Block),
    Transmute {
        from: TypeExpr,
        to: TypeExpr,
        value: Box<Expr>,
    },
    FieldAccess {
        base: Box<Expr>,
        name: Ident,
    },
    /// `e.0`; `index` is `None` when the written index was not an integer
    /// literal.
    TupleAccess {
        base: Box<Expr>,
        index: Option<u64>,
    },
    IndexAccess {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        generic_args: Vec<TypeExpr>,
        args: Vec<Arg>,
    },
    MethodCall {
        receiver: Box<Expr>,
        name: Ident,
        args: Vec<Arg>,
    },
    Propagate(Box<Expr>),
    Yield {
        value: Box<Expr>,
    },
    YieldFrom {
        value: Box<Expr>,
    },
    Sync(Box<Expr>),
    Race(Vec<Expr>),
    All(Vec<Expr>),
    Parallel {
        domain: Box<Expr>,
        body: Block,
    },
    Spawn {
        options: Vec<SpawnOption>,
        body: Block,
    },
    Wait(Box<Expr>),
    Dispatch {
        pattern: Box<Pattern>,
        range: Box<Expr>,
        options: Vec<DispatchOption>,
        body: Block,
    },
}
