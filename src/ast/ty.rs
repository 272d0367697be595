use super::{ClassPath, Expr, TypePath};
use crate::ident::Ident;
use crate::span::Span;
use crate::types::{Permission, PtrState, RawPtrQual, SeqState};

/// A type as written in source. Resolution into the canonical [`crate::types::Type`]
/// term happens during semantic analysis (path lookup, alias expansion, array
/// length evaluation).
#[derive(Debug, Clone)]
pub struct TypeExpr {
    pub span: Span,
    pub kind: TypeExprKind,
}

#[derive(Debug, Clone)]
pub struct TypeExprFuncParam {
    pub mode: Option<super::ParamMode>,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone)]
pub enum TypeExprKind {
    /// A primitive name (`i32`, `bool`, `!`, ...) or a generic parameter in
    /// scope; which one is decided during resolution.
    Name(Ident),
    Perm(Permission, Box<TypeExpr>),
    Union(Vec<TypeExpr>),
    Func {
        params: Vec<TypeExprFuncParam>,
        ret: Box<TypeExpr>,
    },
    Tuple(Vec<TypeExpr>),
    Array {
        element: Box<TypeExpr>,
        length: Box<Expr>,
    },
    Slice(Box<TypeExpr>),
    Ptr {
        element: Box<TypeExpr>,
        state: Option<PtrState>,
    },
    RawPtr {
        qual: RawPtrQual,
        element: Box<TypeExpr>,
    },
    Str(Option<SeqState>),
    Bytes(Option<SeqState>),
    Dynamic(ClassPath),
    Path {
        path: TypePath,
        generic_args: Vec<TypeExpr>,
    },
    ModalState {
        path: TypePath,
        generic_args: Vec<TypeExpr>,
        state: Ident,
    },
    Refine {
        base: Box<TypeExpr>,
        predicate: Box<Expr>,
    },
    Range,
}

impl TypeExpr {
    pub fn new(kind: TypeExprKind, span: Span) -> TypeExpr {
        TypeExpr { span, kind }
    }
}
