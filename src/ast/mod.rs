//! The resolved abstract syntax consumed by the analysis core. The parser and
//! manifest walk live upstream; everything here arrives fully built and is
//! treated as immutable.

pub mod expression;
pub mod pattern;
pub mod statement;
pub mod ty;

pub use expression::*;
pub use pattern::*;
pub use statement::*;
pub use ty::*;

use crate::ident::Ident;
use crate::span::Span;

pub type ModulePath = Vec<String>;
pub type TypePath = Vec<String>;
pub type ClassPath = Vec<String>;

/// Stable identity of an AST node. Expression typing keys the `expr -> type`
/// map by this, and opaque aliases use it as their origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Internal,
    Protected,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutability {
    Let,
    Var,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamMode {
    Move,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub mode: Option<ParamMode>,
    pub name: Ident,
    pub ty: TypeExpr,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Receiver {
    /// `const self` / `unique self` shorthand.
    Shorthand(crate::types::Permission),
    /// An explicit `self: T` annotation, optionally by move.
    Explicit {
        mode: Option<ParamMode>,
        ty: TypeExpr,
    },
}

#[derive(Debug, Clone)]
pub struct AttributeItem {
    pub name: Ident,
    pub span: Span,
}

pub type AttributeList = Vec<AttributeItem>;

#[derive(Debug, Clone)]
pub struct TypeParam {
    pub name: Ident,
    pub bounds: Vec<ClassPath>,
    pub default: Option<TypeExpr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct WherePredicate {
    pub type_param: Ident,
    pub bounds: Vec<ClassPath>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum UsingClause {
    /// `using a::b` or `using a::b as c`
    Path {
        path: ModulePath,
        alias: Option<Ident>,
    },
    /// `using a::b::{x, y as z}`
    List {
        module_path: ModulePath,
        specs: Vec<UsingSpec>,
    },
    /// `using a::b::*`
    Wildcard { module_path: ModulePath },
}

#[derive(Debug, Clone)]
pub struct UsingSpec {
    pub name: Ident,
    pub alias: Option<Ident>,
}

#[derive(Debug, Clone)]
pub struct UsingDecl {
    pub vis: Visibility,
    pub clause: UsingClause,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct StaticDecl {
    pub vis: Visibility,
    pub mutability: Mutability,
    pub name: Ident,
    pub ty: Option<TypeExpr>,
    pub init: Expr,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ProcedureDecl {
    pub attrs: AttributeList,
    pub vis: Visibility,
    pub name: Ident,
    pub type_parameters: Vec<TypeParam>,
    pub where_clause: Vec<WherePredicate>,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub vis: Visibility,
    pub name: Ident,
    pub ty: TypeExpr,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub vis: Visibility,
    pub name: Ident,
    pub receiver: Receiver,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum RecordMember {
    Field(FieldDecl),
    Method(MethodDecl),
}

#[derive(Debug, Clone)]
pub struct RecordDecl {
    pub attrs: AttributeList,
    pub vis: Visibility,
    pub name: Ident,
    pub type_parameters: Vec<TypeParam>,
    pub implements: Vec<ClassPath>,
    pub where_clause: Vec<WherePredicate>,
    pub members: Vec<RecordMember>,
    pub span: Span,
}

impl RecordDecl {
    pub fn fields(&self) -> impl Iterator<Item = &FieldDecl> {
        self.members.iter().filter_map(|member| match member {
            RecordMember::Field(field) => Some(field),
            RecordMember::Method(_) => None,
        })
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodDecl> {
        self.members.iter().filter_map(|member| match member {
            RecordMember::Method(method) => Some(method),
            RecordMember::Field(_) => None,
        })
    }
}

#[derive(Debug, Clone)]
pub enum VariantPayload {
    Tuple(Vec<TypeExpr>),
    Record(Vec<FieldDecl>),
}

#[derive(Debug, Clone)]
pub struct VariantDecl {
    pub name: Ident,
    pub payload: Option<VariantPayload>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct EnumDecl {
    pub attrs: AttributeList,
    pub vis: Visibility,
    pub name: Ident,
    pub type_parameters: Vec<TypeParam>,
    pub implements: Vec<ClassPath>,
    pub where_clause: Vec<WherePredicate>,
    pub variants: Vec<VariantDecl>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct StateFieldDecl {
    pub vis: Visibility,
    pub name: Ident,
    pub ty: TypeExpr,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct StateMethodDecl {
    pub vis: Visibility,
    pub name: Ident,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub body: Block,
    pub span: Span,
}

/// Transitions are the only way a modal value changes state.
#[derive(Debug, Clone)]
pub struct TransitionDecl {
    pub vis: Visibility,
    pub name: Ident,
    pub params: Vec<Param>,
    pub target_state: Ident,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum StateMember {
    Field(StateFieldDecl),
    Method(StateMethodDecl),
    Transition(TransitionDecl),
}

#[derive(Debug, Clone)]
pub struct StateBlock {
    pub name: Ident,
    pub members: Vec<StateMember>,
    pub span: Span,
}

impl StateBlock {
    pub fn fields(&self) -> impl Iterator<Item = &StateFieldDecl> {
        self.members.iter().filter_map(|member| match member {
            StateMember::Field(field) => Some(field),
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ModalDecl {
    pub attrs: AttributeList,
    pub vis: Visibility,
    pub name: Ident,
    pub type_parameters: Vec<TypeParam>,
    pub implements: Vec<ClassPath>,
    pub where_clause: Vec<WherePredicate>,
    pub states: Vec<StateBlock>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ClassMethodDecl {
    pub vis: Visibility,
    pub name: Ident,
    pub receiver: Receiver,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    /// Present for default methods, absent for abstract ones.
    pub body: Option<Block>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct AssociatedTypeDecl {
    pub vis: Visibility,
    pub name: Ident,
    pub default: Option<TypeExpr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct AbstractStateDecl {
    pub vis: Visibility,
    pub name: Ident,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ClassItem {
    Method(ClassMethodDecl),
    AssociatedType(AssociatedTypeDecl),
    AbstractState(AbstractStateDecl),
}

#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub vis: Visibility,
    pub name: Ident,
    pub type_parameters: Vec<TypeParam>,
    pub supers: Vec<ClassPath>,
    pub items: Vec<ClassItem>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct TypeAliasDecl {
    pub vis: Visibility,
    pub name: Ident,
    pub type_parameters: Vec<TypeParam>,
    /// An `opaque` alias hides its underlying type outside the declaring
    /// module.
    pub opaque: bool,
    pub origin: NodeId,
    pub ty: TypeExpr,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Item {
    Using(UsingDecl),
    Static(StaticDecl),
    Procedure(ProcedureDecl),
    Record(RecordDecl),
    Enum(EnumDecl),
    Modal(ModalDecl),
    Class(ClassDecl),
    TypeAlias(TypeAliasDecl),
    Error(Span),
}

#[derive(Debug, Clone)]
pub struct AstModule {
    pub path: ModulePath,
    pub items: Vec<Item>,
    /// Spans the parser marked as `unsafe`-covered; raw-pointer and
    /// transmute rules accept either these or an enclosing unsafe block.
    pub unsafe_spans: Vec<Span>,
}
