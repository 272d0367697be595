//! The attribute registry: a closed set of known attribute names, each with
//! the declaration kinds it may sit on. Attributes carry no further
//! semantics at this layer.

use crate::ast::AttributeList;
use crate::error::*;
use crate::ident::id_key;
use lazy_static::lazy_static;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrTarget {
    Procedure,
    Record,
    Enum,
    Modal,
}

impl AttrTarget {
    fn friendly_name(self) -> &'static str {
        match self {
            AttrTarget::Procedure => "a procedure",
            AttrTarget::Record => "a record",
            AttrTarget::Enum => "an enum",
            AttrTarget::Modal => "a modal type",
        }
    }
}

lazy_static! {
    static ref REGISTRY: HashMap<&'static str, Vec<AttrTarget>> = {
        use AttrTarget::*;
        let mut map: HashMap<&'static str, Vec<AttrTarget>> = HashMap::new();
        map.insert("inline", vec![Procedure]);
        map.insert("cold", vec![Procedure]);
        map.insert("deprecated", vec![Procedure, Record, Enum, Modal]);
        map.insert("packed", vec![Record]);
        map.insert("exhaustive", vec![Enum]);
        map
    };
}

pub fn check_attributes(attrs: &AttributeList, target: AttrTarget) -> CompileResult<()> {
    let warnings = vec![];
    let mut errors = vec![];
    for attr in attrs {
        match REGISTRY.get(id_key(&attr.name.name).as_str()) {
            None => errors.push(CompileError::UnknownAttribute {
                name: attr.name.name.clone(),
                span: attr.span.clone(),
            }),
            Some(targets) if !targets.contains(&target) => {
                errors.push(CompileError::AttributeWrongTarget {
                    name: attr.name.name.clone(),
                    target: target.friendly_name(),
                    span: attr.span.clone(),
                })
            }
            Some(_) => {}
        }
    }
    if errors.is_empty() {
        recovered((), warnings, errors)
    } else {
        failed(warnings, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AttributeItem;
    use crate::ident::Ident;
    use crate::span::Span;

    fn attr(name: &str) -> AttributeItem {
        AttributeItem {
            name: Ident::builtin(name),
            span: Span::builtin(),
        }
    }

    #[test]
    fn unknown_attributes_are_rejected() {
        let res = check_attributes(&vec![attr("sparkly")], AttrTarget::Record);
        assert_eq!(res.errors()[0].code(), "E-ATTR-0001");
    }

    #[test]
    fn wrong_target_is_rejected() {
        let res = check_attributes(&vec![attr("inline")], AttrTarget::Record);
        assert_eq!(res.errors()[0].code(), "E-ATTR-0002");
    }

    #[test]
    fn known_attribute_on_right_target_passes() {
        let res = check_attributes(&vec![attr("inline")], AttrTarget::Procedure);
        assert!(!res.has_errors());
    }
}
