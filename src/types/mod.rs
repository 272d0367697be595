//! The canonical type term. Types are value trees; nominal types reference
//! their declarations by path rather than by ownership, so mutually recursive
//! records stay finite.

pub mod casts;
pub mod const_len;
pub mod equiv;
pub mod subtyping;
pub mod type_key;

pub use casts::{cast_valid, coerce_array_to_slice, is_bitcopy};
pub use equiv::type_equiv;
pub use subtyping::is_subtype;
pub use type_key::{sort_union_members, type_key, TypeKey};

use crate::ast::{NodeId, ParamMode, TypePath};
use crate::span::Span;
use derivative::Derivative;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Permission {
    Const,
    Unique,
    Shared,
}

impl Permission {
    pub fn keyword(self) -> &'static str {
        match self {
            Permission::Const => "const",
            Permission::Unique => "unique",
            Permission::Shared => "shared",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PtrState {
    Valid,
    Null,
    Expired,
}

impl PtrState {
    pub fn name(self) -> &'static str {
        match self {
            PtrState::Valid => "Valid",
            PtrState::Null => "Null",
            PtrState::Expired => "Expired",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RawPtrQual {
    Imm,
    Mut,
}

/// State of the built-in `String`/`Bytes` sequence types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SeqState {
    Managed,
    View,
}

impl SeqState {
    pub fn name(self) -> &'static str {
        match self {
            SeqState::Managed => "Managed",
            SeqState::View => "View",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Primitive {
    I8,
    I16,
    I32,
    I64,
    I128,
    Isize,
    U8,
    U16,
    U32,
    U64,
    U128,
    Usize,
    F16,
    F32,
    F64,
    Bool,
    Char,
    Unit,
    Never,
}

impl Primitive {
    pub fn name(self) -> &'static str {
        use Primitive::*;
        match self {
            I8 => "i8",
            I16 => "i16",
            I32 => "i32",
            I64 => "i64",
            I128 => "i128",
            Isize => "isize",
            U8 => "u8",
            U16 => "u16",
            U32 => "u32",
            U64 => "u64",
            U128 => "u128",
            Usize => "usize",
            F16 => "f16",
            F32 => "f32",
            F64 => "f64",
            Bool => "bool",
            Char => "char",
            Unit => "()",
            Never => "!",
        }
    }

    pub fn from_name(name: &str) -> Option<Primitive> {
        use Primitive::*;
        Some(match name {
            "i8" => I8,
            "i16" => I16,
            "i32" => I32,
            "i64" => I64,
            "i128" => I128,
            "isize" => Isize,
            "u8" => U8,
            "u16" => U16,
            "u32" => U32,
            "u64" => U64,
            "u128" => U128,
            "usize" => Usize,
            "f16" => F16,
            "f32" => F32,
            "f64" => F64,
            "bool" => Bool,
            "char" => Char,
            "()" => Unit,
            "!" => Never,
            _ => return None,
        })
    }

    pub fn is_integer(self) -> bool {
        use Primitive::*;
        matches!(
            self,
            I8 | I16 | I32 | I64 | I128 | Isize | U8 | U16 | U32 | U64 | U128 | Usize
        )
    }

    pub fn is_signed_integer(self) -> bool {
        use Primitive::*;
        matches!(self, I8 | I16 | I32 | I64 | I128 | Isize)
    }

    pub fn is_float(self) -> bool {
        matches!(self, Primitive::F16 | Primitive::F32 | Primitive::F64)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Bit width for sized integers; `None` for pointer-sized and
    /// non-integer primitives.
    pub fn integer_bits(self) -> Option<u32> {
        use Primitive::*;
        Some(match self {
            I8 | U8 => 8,
            I16 | U16 => 16,
            I32 | U32 => 32,
            I64 | U64 => 64,
            I128 | U128 => 128,
            _ => return None,
        })
    }

    /// Whether `value` is representable in this integer primitive. The
    /// pointer-sized types are checked at their narrowest guaranteed width.
    pub fn fits(self, value: i128) -> bool {
        use Primitive::*;
        match self {
            I8 => value >= i8::MIN as i128 && value <= i8::MAX as i128,
            I16 => value >= i16::MIN as i128 && value <= i16::MAX as i128,
            I32 => value >= i32::MIN as i128 && value <= i32::MAX as i128,
            I64 | Isize => value >= i64::MIN as i128 && value <= i64::MAX as i128,
            I128 => true,
            U8 => value >= 0 && value <= u8::MAX as i128,
            U16 => value >= 0 && value <= u16::MAX as i128,
            U32 => value >= 0 && value <= u32::MAX as i128,
            U64 | Usize => value >= 0 && value <= u64::MAX as i128,
            U128 => value >= 0,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncParam {
    pub mode: Option<ParamMode>,
    pub ty: Type,
}

/// A refinement predicate, carried structurally but never discharged here.
/// The span is excluded from equality so spelling-identical refinements from
/// different sites compare equal.
#[derive(Derivative, Clone)]
#[derivative(Debug, PartialEq, Eq, Hash)]
pub struct RefinePredicate {
    pub text: String,
    #[derivative(PartialEq = "ignore", Hash = "ignore")]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Prim(Primitive),
    Perm(Permission, Box<Type>),
    /// Invariant: at least two members, sorted by `TypeKey`, deduplicated.
    /// Build through [`Type::union_of`].
    Union(Vec<Type>),
    Tuple(Vec<Type>),
    Array(Box<Type>, u64),
    Slice(Box<Type>),
    Ptr(Box<Type>, Option<PtrState>),
    RawPtr(RawPtrQual, Box<Type>),
    Str(Option<SeqState>),
    Bytes(Option<SeqState>),
    Dynamic(TypePath),
    Path {
        path: TypePath,
        args: Vec<Type>,
    },
    ModalState {
        path: TypePath,
        state: String,
        args: Vec<Type>,
    },
    Func {
        params: Vec<FuncParam>,
        ret: Box<Type>,
    },
    Range,
    Opaque {
        path: TypePath,
        origin: NodeId,
    },
    Refine {
        base: Box<Type>,
        predicate: RefinePredicate,
    },
    /// An unresolved generic parameter inside a generic declaration body.
    Generic {
        name: String,
    },
    // used for recovering from errors in the ast
    ErrorRecovery,
}

impl Default for Type {
    fn default() -> Self {
        Type::Prim(Primitive::Unit)
    }
}

impl Type {
    pub fn unit() -> Type {
        Type::Prim(Primitive::Unit)
    }

    pub fn never() -> Type {
        Type::Prim(Primitive::Never)
    }

    pub fn bool() -> Type {
        Type::Prim(Primitive::Bool)
    }

    pub fn usize() -> Type {
        Type::Prim(Primitive::Usize)
    }

    pub fn path(path: TypePath) -> Type {
        Type::Path { path, args: vec![] }
    }

    /// Canonicalizing union constructor: flattens nested unions, sorts
    /// members by key and collapses duplicates. Degenerate inputs collapse to
    /// the sole member (or unit for an empty list).
    pub fn union_of(members: Vec<Type>) -> Type {
        let mut flat = Vec::with_capacity(members.len());
        for member in members {
            match member {
                Type::Union(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        let mut sorted = sort_union_members(flat);
        match sorted.len() {
            0 => Type::unit(),
            1 => sorted.remove(0),
            _ => Type::Union(sorted),
        }
    }

    pub fn is_never(&self) -> bool {
        matches!(self, Type::Prim(Primitive::Never))
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Type::Prim(Primitive::Unit))
    }

    pub fn is_error_recovery(&self) -> bool {
        matches!(self, Type::ErrorRecovery)
    }

    pub fn as_prim(&self) -> Option<Primitive> {
        match self {
            Type::Prim(prim) => Some(*prim),
            _ => None,
        }
    }

    /// The permission wrapper, if any.
    pub fn perm_of(&self) -> Option<Permission> {
        match self {
            Type::Perm(perm, _) => Some(*perm),
            _ => None,
        }
    }

    /// The type with any outer permission removed.
    pub fn strip_perm(&self) -> &Type {
        match self {
            Type::Perm(_, base) => base.strip_perm(),
            other => other,
        }
    }

    /// Re-applies `perm` (if present) around `ty`. The inverse of
    /// `strip_perm` for projection rules that preserve the outer wrapper.
    pub fn wrap_perm(perm: Option<Permission>, ty: Type) -> Type {
        match perm {
            Some(perm) => Type::Perm(perm, Box::new(ty)),
            None => ty,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_prim().map(|prim| prim.is_numeric()).unwrap_or(false)
    }

    pub fn friendly_type_str(&self) -> String {
        use Type::*;
        match self {
            Prim(prim) => prim.name().into(),
            Perm(perm, base) => format!("{} {}", perm.keyword(), base.friendly_type_str()),
            Union(members) => {
                let parts: Vec<String> =
                    members.iter().map(|member| member.friendly_type_str()).collect();
                parts.join(" | ")
            }
            Tuple(elements) => {
                let parts: Vec<String> =
                    elements.iter().map(|element| element.friendly_type_str()).collect();
                format!("({})", parts.join(", "))
            }
            Array(element, len) => format!("[{}; {}]", element.friendly_type_str(), len),
            Slice(element) => format!("[{}]", element.friendly_type_str()),
            Ptr(element, state) => {
                let mut out = format!("Ptr<{}>", element.friendly_type_str());
                if let Some(state) = state {
                    let _ = write!(out, "@{}", state.name());
                }
                out
            }
            RawPtr(qual, element) => match qual {
                RawPtrQual::Imm => format!("*imm {}", element.friendly_type_str()),
                RawPtrQual::Mut => format!("*mut {}", element.friendly_type_str()),
            },
            Str(state) => match state {
                Some(state) => format!("String@{}", state.name()),
                None => "String".into(),
            },
            Bytes(state) => match state {
                Some(state) => format!("Bytes@{}", state.name()),
                None => "Bytes".into(),
            },
            Dynamic(path) => format!("dyn {}", path.join("::")),
            Path { path, args } => render_path(path, None, args),
            ModalState { path, state, args } => render_path(path, Some(state), args),
            Func { params, ret } => {
                let parts: Vec<String> = params
                    .iter()
                    .map(|param| match param.mode {
                        Some(ParamMode::Move) => format!("move {}", param.ty.friendly_type_str()),
                        None => param.ty.friendly_type_str(),
                    })
                    .collect();
                format!("fn({}) -> {}", parts.join(", "), ret.friendly_type_str())
            }
            Range => "Range".into(),
            Opaque { path, .. } => format!("opaque {}", path.join("::")),
            Refine { base, predicate } => {
                format!("{} where {{ {} }}", base.friendly_type_str(), predicate.text)
            }
            Generic { name } => name.clone(),
            ErrorRecovery => "\"unknown due to error\"".into(),
        }
    }
}

fn render_path(path: &[String], state: Option<&str>, args: &[Type]) -> String {
    let mut out = path.join("::");
    if !args.is_empty() {
        let parts: Vec<String> = args.iter().map(|arg| arg.friendly_type_str()).collect();
        let _ = write!(out, "<{}>", parts.join(", "));
    }
    if let Some(state) = state {
        let _ = write!(out, "@{}", state);
    }
    out
}

/// Substitutes generic parameter placeholders for concrete arguments, used
/// when projecting fields/methods out of an instantiated nominal type.
pub fn subst_generics(ty: &Type, map: &std::collections::HashMap<String, Type>) -> Type {
    use Type::*;
    match ty {
        Generic { name } => map.get(name).cloned().unwrap_or_else(|| ty.clone()),
        Perm(perm, base) => Perm(*perm, Box::new(subst_generics(base, map))),
        Union(members) => Type::union_of(
            members
                .iter()
                .map(|member| subst_generics(member, map))
                .collect(),
        ),
        Tuple(elements) => Tuple(
            elements
                .iter()
                .map(|element| subst_generics(element, map))
                .collect(),
        ),
        Array(element, len) => Array(Box::new(subst_generics(element, map)), *len),
        Slice(element) => Slice(Box::new(subst_generics(element, map))),
        Ptr(element, state) => Ptr(Box::new(subst_generics(element, map)), *state),
        RawPtr(qual, element) => RawPtr(*qual, Box::new(subst_generics(element, map))),
        Path { path, args } => Path {
            path: path.clone(),
            args: args.iter().map(|arg| subst_generics(arg, map)).collect(),
        },
        ModalState { path, state, args } => ModalState {
            path: path.clone(),
            state: state.clone(),
            args: args.iter().map(|arg| subst_generics(arg, map)).collect(),
        },
        Func { params, ret } => Func {
            params: params
                .iter()
                .map(|param| FuncParam {
                    mode: param.mode,
                    ty: subst_generics(&param.ty, map),
                })
                .collect(),
            ret: Box::new(subst_generics(ret, map)),
        },
        Refine { base, predicate } => Refine {
            base: Box::new(subst_generics(base, map)),
            predicate: predicate.clone(),
        },
        other => other.clone(),
    }
}
