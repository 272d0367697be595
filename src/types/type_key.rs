//! Canonical, totally ordered serialization of type terms. Two types are
//! structurally equal exactly when their keys are equal, and union members
//! are stored in key order so member ordering never leaks into equality.

use super::{FuncParam, Type};
use crate::ast::ParamMode;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyAtom {
    Number(u64),
    Text(String),
    Key(Box<TypeKey>),
    KeyList(Vec<TypeKey>),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TypeKey {
    atoms: Vec<KeyAtom>,
}

impl TypeKey {
    fn tagged(tag: &str) -> TypeKey {
        TypeKey {
            atoms: vec![KeyAtom::Text(tag.into())],
        }
    }

    fn push_number(mut self, value: u64) -> TypeKey {
        self.atoms.push(KeyAtom::Number(value));
        self
    }

    fn push_text(mut self, value: impl Into<String>) -> TypeKey {
        self.atoms.push(KeyAtom::Text(value.into()));
        self
    }

    fn push_key(mut self, value: TypeKey) -> TypeKey {
        self.atoms.push(KeyAtom::Key(Box::new(value)));
        self
    }

    fn push_key_list(mut self, value: Vec<TypeKey>) -> TypeKey {
        self.atoms.push(KeyAtom::KeyList(value));
        self
    }
}

fn path_text(path: &[String]) -> String {
    path.join("::")
}

fn func_param_key(param: &FuncParam) -> TypeKey {
    let tag = match param.mode {
        Some(ParamMode::Move) => "move",
        None => "",
    };
    TypeKey::tagged("param")
        .push_text(tag)
        .push_key(type_key(&param.ty))
}

pub fn type_key(ty: &Type) -> TypeKey {
    use Type::*;
    match ty {
        Prim(prim) => TypeKey::tagged("prim").push_text(prim.name()),
        Perm(perm, base) => TypeKey::tagged("perm")
            .push_text(perm.keyword())
            .push_key(type_key(base)),
        Union(members) => {
            // Members are kept sorted by construction; re-sorting here keeps
            // the key canonical even for hand-built terms.
            let mut keys: Vec<TypeKey> = members.iter().map(type_key).collect();
            keys.sort();
            keys.dedup();
            TypeKey::tagged("union").push_key_list(keys)
        }
        Tuple(elements) => {
            TypeKey::tagged("tuple").push_key_list(elements.iter().map(type_key).collect())
        }
        Array(element, len) => TypeKey::tagged("array")
            .push_number(*len)
            .push_key(type_key(element)),
        Slice(element) => TypeKey::tagged("slice").push_key(type_key(element)),
        Ptr(element, state) => TypeKey::tagged("ptr")
            .push_text(state.map(|state| state.name()).unwrap_or(""))
            .push_key(type_key(element)),
        RawPtr(qual, element) => TypeKey::tagged("rawptr")
            .push_text(match qual {
                super::RawPtrQual::Imm => "imm",
                super::RawPtrQual::Mut => "mut",
            })
            .push_key(type_key(element)),
        Str(state) => {
            TypeKey::tagged("string").push_text(state.map(|state| state.name()).unwrap_or(""))
        }
        Bytes(state) => {
            TypeKey::tagged("bytes").push_text(state.map(|state| state.name()).unwrap_or(""))
        }
        Dynamic(path) => TypeKey::tagged("dynamic").push_text(path_text(path)),
        Path { path, args } => TypeKey::tagged("path")
            .push_text(path_text(path))
            .push_key_list(args.iter().map(type_key).collect()),
        ModalState { path, state, args } => TypeKey::tagged("modalstate")
            .push_text(path_text(path))
            .push_text(state.clone())
            .push_key_list(args.iter().map(type_key).collect()),
        Func { params, ret } => TypeKey::tagged("func")
            .push_key_list(params.iter().map(func_param_key).collect())
            .push_key(type_key(ret)),
        Range => TypeKey::tagged("range"),
        Opaque { path, origin } => TypeKey::tagged("opaque")
            .push_text(path_text(path))
            .push_number(origin.0 as u64),
        Refine { base, predicate } => TypeKey::tagged("refine")
            .push_text(predicate.text.clone())
            .push_key(type_key(base)),
        Generic { name } => TypeKey::tagged("generic").push_text(name.clone()),
        ErrorRecovery => TypeKey::tagged("error"),
    }
}

/// Sorts union members into canonical key order, dropping duplicates.
pub fn sort_union_members(members: Vec<Type>) -> Vec<Type> {
    let mut keyed: Vec<(TypeKey, Type)> = members
        .into_iter()
        .map(|member| (type_key(&member), member))
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.dedup_by(|a, b| a.0 == b.0);
    keyed.into_iter().map(|(_, member)| member).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Primitive;

    #[test]
    fn union_key_ignores_member_order() {
        let a = Type::Union(vec![
            Type::Prim(Primitive::I32),
            Type::Prim(Primitive::Bool),
        ]);
        let b = Type::Union(vec![
            Type::Prim(Primitive::Bool),
            Type::Prim(Primitive::I32),
        ]);
        assert_eq!(type_key(&a), type_key(&b));
    }

    #[test]
    fn distinct_constructors_get_distinct_keys() {
        let slice = Type::Slice(Box::new(Type::Prim(Primitive::U8)));
        let array = Type::Array(Box::new(Type::Prim(Primitive::U8)), 4);
        assert_ne!(type_key(&slice), type_key(&array));
    }

    #[test]
    fn keys_are_totally_ordered() {
        let mut keys = vec![
            type_key(&Type::Prim(Primitive::Bool)),
            type_key(&Type::Range),
            type_key(&Type::Prim(Primitive::I32)),
        ];
        keys.sort();
        let resorted = {
            let mut again = keys.clone();
            again.sort();
            again
        };
        assert_eq!(keys, resorted);
    }
}
