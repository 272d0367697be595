//! Modal type support: state lookup, per-state fields and methods, and the
//! transition table. Transitions are the only value-level way to change
//! state.

use super::scope_context::{ScopeContext, TypeDeclEntry};
use crate::ast::{ModalDecl, StateBlock, StateFieldDecl, StateMember, StateMethodDecl, TransitionDecl};
use crate::ident::id_key;

pub fn lookup_modal<'a>(ctx: &'a ScopeContext, path: &[String]) -> Option<&'a ModalDecl> {
    match ctx.lookup_type_decl(path) {
        Some(TypeDeclEntry::Modal(decl)) => Some(decl),
        _ => None,
    }
}

pub fn lookup_state<'a>(decl: &'a ModalDecl, state: &str) -> Option<&'a StateBlock> {
    let key = id_key(state);
    decl.states
        .iter()
        .find(|candidate| *candidate.name.key() == key)
}

pub fn state_names(decl: &ModalDecl) -> Vec<String> {
    decl.states
        .iter()
        .map(|state| state.name.name.clone())
        .collect()
}

pub fn state_field<'a>(state: &'a StateBlock, name: &str) -> Option<&'a StateFieldDecl> {
    let key = id_key(name);
    state.fields().find(|field| *field.name.key() == key)
}

pub fn state_method<'a>(state: &'a StateBlock, name: &str) -> Option<&'a StateMethodDecl> {
    let key = id_key(name);
    state.members.iter().find_map(|member| match member {
        StateMember::Method(method) if *method.name.key() == key => Some(method),
        _ => None,
    })
}

pub fn state_transition<'a>(state: &'a StateBlock, name: &str) -> Option<&'a TransitionDecl> {
    let key = id_key(name);
    state.members.iter().find_map(|member| match member {
        StateMember::Transition(transition) if *transition.name.key() == key => Some(transition),
        _ => None,
    })
}

/// Whether a field name is unambiguous across states, i.e. accessing it does
/// not require matching on the state first. Holds when every state that
/// declares the field gives it the same declared type text, and no state
/// omits it.
pub fn field_common_to_all_states(decl: &ModalDecl, name: &str) -> bool {
    decl.states
        .iter()
        .all(|state| state_field(state, name).is_some())
}

/// Conservative stand-in for the layout subsystem's niche-eligibility
/// predicate: a modal can drop its state tag only when at most one state
/// carries fields, so the tag needs no payload-overlapping storage.
pub fn modal_niche_eligible(ctx: &ScopeContext, path: &[String]) -> bool {
    let decl = match lookup_modal(ctx, path) {
        Some(decl) => decl,
        None => return false,
    };
    let states_with_fields = decl
        .states
        .iter()
        .filter(|state| state.fields().next().is_some())
        .count();
    states_with_fields <= 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;
    use crate::ident::Ident;
    use crate::span::Span;

    fn modal_with_states(states: Vec<StateBlock>) -> ModalDecl {
        ModalDecl {
            attrs: vec![],
            vis: Visibility::Public,
            name: Ident::builtin("Door"),
            type_parameters: vec![],
            implements: vec![],
            where_clause: vec![],
            states,
            span: Span::builtin(),
        }
    }

    fn state(name: &str, fields: Vec<&str>) -> StateBlock {
        StateBlock {
            name: Ident::builtin(name),
            members: fields
                .into_iter()
                .map(|field| {
                    StateMember::Field(StateFieldDecl {
                        vis: Visibility::Public,
                        name: Ident::builtin(field),
                        ty: TypeExpr::new(
                            TypeExprKind::Name(Ident::builtin("i32")),
                            Span::builtin(),
                        ),
                        span: Span::builtin(),
                    })
                })
                .collect(),
            span: Span::builtin(),
        }
    }

    #[test]
    fn state_lookup_is_case_folded() {
        let decl = modal_with_states(vec![state("Open", vec![]), state("Closed", vec![])]);
        assert!(lookup_state(&decl, "open").is_some());
        assert!(lookup_state(&decl, "Ajar").is_none());
    }

    #[test]
    fn niche_needs_at_most_one_payload_state() {
        let mut ctx = ScopeContext::for_tests();
        let slim = modal_with_states(vec![state("Open", vec!["angle"]), state("Closed", vec![])]);
        let fat = modal_with_states(vec![
            state("Open", vec!["angle"]),
            state("Closed", vec!["lock"]),
        ]);
        ctx.sigma.types.insert(
            vec!["slim".to_string()],
            crate::semantic_analysis::scope_context::TypeDeclEntry::Modal(slim),
        );
        ctx.sigma.types.insert(
            vec!["fat".to_string()],
            crate::semantic_analysis::scope_context::TypeDeclEntry::Modal(fat),
        );
        assert!(modal_niche_eligible(&ctx, &["slim".to_string()]));
        assert!(!modal_niche_eligible(&ctx, &["fat".to_string()]));
    }
}
