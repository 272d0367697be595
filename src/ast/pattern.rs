use super::ty::TypeExpr;
use super::TypePath;
use crate::ident::Ident;
use crate::span::Span;

#[derive(Debug, Clone)]
pub struct Pattern {
    pub span: Span,
    pub kind: PatternKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatternLiteral {
    Int(i128),
    Bool(bool),
    Char(char),
}

#[derive(Debug, Clone)]
pub struct FieldPattern {
    pub name: Ident,
    /// `None` is the shorthand `R { f }` binding the field under its own
    /// name.
    pub pattern: Option<Pattern>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum EnumPayloadPattern {
    Tuple(Vec<Pattern>),
    Record(Vec<FieldPattern>),
}

#[derive(Debug, Clone)]
pub enum PatternKind {
    Wildcard,
    Identifier(Ident),
    /// `x: T` binds `x` while narrowing to `T`; refutable in union
    /// contexts.
    Typed { name: Ident, ty: TypeExpr },
    Literal(PatternLiteral),
    Tuple(Vec<Pattern>),
    Record {
        path: TypePath,
        fields: Vec<FieldPattern>,
    },
    Enum {
        path: TypePath,
        variant: Ident,
        payload: Option<EnumPayloadPattern>,
    },
    /// `@State { .. }` against a modal scrutinee.
    Modal {
        state: Ident,
        fields: Option<Vec<FieldPattern>>,
    },
    Range {
        lo: PatternLiteral,
        hi: PatternLiteral,
        inclusive: bool,
    },
}
