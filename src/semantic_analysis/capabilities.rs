//! Built-in capability classes and concurrency/async types. These are
//! installed into the universe scope exactly once per context, so user code
//! can name `ExecutionDomain`, `Spawned` or `Future` without declaring them.

use super::scope_context::{
    Entity, EntityKind, EntitySource, ScopeContext, TypeDeclEntry,
};
use crate::ast::*;
use crate::ident::{id_key, Ident};
use crate::span::Span;
use crate::types::Type;

/// Origins for builtin opaque nodes live far above anything the parser
/// assigns.
const BUILTIN_ORIGIN_BASE: u32 = 0xFFFF_0000;

fn builtin_ident(name: &str) -> Ident {
    Ident::builtin(name)
}

fn name_type(name: &str) -> TypeExpr {
    TypeExpr::new(TypeExprKind::Name(builtin_ident(name)), Span::builtin())
}

fn unit_type() -> TypeExpr {
    TypeExpr::new(TypeExprKind::Tuple(vec![]), Span::builtin())
}

fn type_param(name: &str) -> TypeParam {
    TypeParam {
        name: builtin_ident(name),
        bounds: vec![],
        default: None,
        span: Span::builtin(),
    }
}

fn empty_state(name: &str) -> StateBlock {
    StateBlock {
        name: builtin_ident(name),
        members: vec![],
        span: Span::builtin(),
    }
}

fn builtin_modal(name: &str, params: Vec<TypeParam>, states: Vec<StateBlock>) -> ModalDecl {
    ModalDecl {
        attrs: vec![],
        vis: Visibility::Public,
        name: builtin_ident(name),
        type_parameters: params,
        implements: vec![],
        where_clause: vec![],
        states,
        span: Span::builtin(),
    }
}

fn builtin_class(name: &str, supers: Vec<ClassPath>) -> ClassDecl {
    ClassDecl {
        vis: Visibility::Public,
        name: builtin_ident(name),
        type_parameters: vec![],
        supers,
        items: vec![],
        span: Span::builtin(),
    }
}

fn async_alias(
    name: &str,
    params: Vec<&str>,
    args: Vec<TypeExpr>,
    origin: u32,
) -> TypeAliasDecl {
    TypeAliasDecl {
        vis: Visibility::Public,
        name: builtin_ident(name),
        type_parameters: params.into_iter().map(type_param).collect(),
        opaque: false,
        origin: NodeId(origin),
        ty: TypeExpr::new(
            TypeExprKind::Path {
                path: vec!["Async".to_string()],
                generic_args: args,
            },
            Span::builtin(),
        ),
        span: Span::builtin(),
    }
}

pub fn build_execution_domain_class_decl() -> ClassDecl {
    builtin_class("ExecutionDomain", vec![])
}

pub fn build_cpu_domain_class_decl() -> ClassDecl {
    builtin_class("CpuDomain", vec![vec!["ExecutionDomain".to_string()]])
}

pub fn build_gpu_domain_class_decl() -> ClassDecl {
    builtin_class("GpuDomain", vec![vec!["ExecutionDomain".to_string()]])
}

pub fn build_inline_domain_class_decl() -> ClassDecl {
    builtin_class("InlineDomain", vec![vec!["ExecutionDomain".to_string()]])
}

pub fn build_file_system_class_decl() -> ClassDecl {
    builtin_class("FileSystem", vec![])
}

pub fn build_heap_allocator_class_decl() -> ClassDecl {
    builtin_class("HeapAllocator", vec![])
}

pub fn build_reactor_class_decl() -> ClassDecl {
    builtin_class("Reactor", vec![])
}

pub fn build_spawned_modal_decl() -> ModalDecl {
    builtin_modal(
        "Spawned",
        vec![type_param("T")],
        vec![empty_state("Pending"), empty_state("Ready")],
    )
}

pub fn build_tracked_modal_decl() -> ModalDecl {
    builtin_modal(
        "Tracked",
        vec![type_param("T"), type_param("E")],
        vec![empty_state("Pending"), empty_state("Ready")],
    )
}

pub fn build_cancel_token_modal_decl() -> ModalDecl {
    builtin_modal(
        "CancelToken",
        vec![],
        vec![empty_state("Active"), empty_state("Cancelled")],
    )
}

pub fn build_region_modal_decl() -> ModalDecl {
    builtin_modal("Region", vec![], vec![empty_state("Active")])
}

pub fn build_async_modal_decl() -> ModalDecl {
    builtin_modal(
        "Async",
        vec![
            type_param("Out"),
            type_param("In"),
            type_param("Result"),
            type_param("E"),
        ],
        vec![
            empty_state("Suspended"),
            empty_state("Completed"),
            empty_state("Failed"),
        ],
    )
}

/// `Sequence<T> = Async<T, (), (), !>` and friends. The aliases expand during
/// type resolution, so the rest of the core only ever sees `Async`.
pub fn build_async_alias_decls() -> Vec<TypeAliasDecl> {
    vec![
        async_alias(
            "Sequence",
            vec!["T"],
            vec![name_type("T"), unit_type(), unit_type(), name_type("!")],
            BUILTIN_ORIGIN_BASE + 1,
        ),
        async_alias(
            "Future",
            vec!["T", "E"],
            vec![unit_type(), unit_type(), name_type("T"), name_type("E")],
            BUILTIN_ORIGIN_BASE + 2,
        ),
        async_alias(
            "Stream",
            vec!["T", "E"],
            vec![name_type("T"), unit_type(), unit_type(), name_type("E")],
            BUILTIN_ORIGIN_BASE + 3,
        ),
        async_alias(
            "Pipe",
            vec!["I", "O"],
            vec![name_type("O"), name_type("I"), unit_type(), name_type("!")],
            BUILTIN_ORIGIN_BASE + 4,
        ),
        async_alias(
            "Exchange",
            vec!["T"],
            vec![name_type("T"), name_type("T"), unit_type(), name_type("!")],
            BUILTIN_ORIGIN_BASE + 5,
        ),
    ]
}

/// Installs every builtin into the signature and the universe scope. Runs
/// exactly once, from `ScopeContext::new`.
pub fn install_universe(ctx: &mut ScopeContext) {
    let classes = vec![
        build_execution_domain_class_decl(),
        build_cpu_domain_class_decl(),
        build_gpu_domain_class_decl(),
        build_inline_domain_class_decl(),
        build_file_system_class_decl(),
        build_heap_allocator_class_decl(),
        build_reactor_class_decl(),
    ];
    for decl in classes {
        let key = vec![decl.name.key().clone()];
        ctx.universe_scope_mut().insert(
            decl.name.key().clone(),
            Entity {
                kind: EntityKind::Class,
                origin: None,
                source: EntitySource::Decl,
                span: Span::builtin(),
            },
        );
        ctx.sigma.classes.insert(key, decl);
    }

    let modals = vec![
        build_spawned_modal_decl(),
        build_tracked_modal_decl(),
        build_cancel_token_modal_decl(),
        build_region_modal_decl(),
        build_async_modal_decl(),
    ];
    for decl in modals {
        let key = vec![decl.name.key().clone()];
        ctx.universe_scope_mut().insert(
            decl.name.key().clone(),
            Entity {
                kind: EntityKind::Type,
                origin: None,
                source: EntitySource::Decl,
                span: Span::builtin(),
            },
        );
        ctx.sigma.types.insert(key, TypeDeclEntry::Modal(decl));
    }

    for decl in build_async_alias_decls() {
        let key = vec![decl.name.key().clone()];
        ctx.universe_scope_mut().insert(
            decl.name.key().clone(),
            Entity {
                kind: EntityKind::Type,
                origin: None,
                source: EntitySource::Decl,
                span: Span::builtin(),
            },
        );
        ctx.sigma.types.insert(key, TypeDeclEntry::Alias(decl));
    }
}

// --- shape helpers over resolved types ---

fn is_builtin_path(path: &[String], name: &str) -> bool {
    path.len() == 1 && id_key(&path[0]) == id_key(name)
}

pub fn make_spawned_type(inner: Type) -> Type {
    Type::Path {
        path: vec!["Spawned".to_string()],
        args: vec![inner],
    }
}

pub fn spawned_inner(ty: &Type) -> Option<&Type> {
    match ty {
        Type::Path { path, args } | Type::ModalState { path, args, .. }
            if is_builtin_path(path, "Spawned") && args.len() == 1 =>
        {
            Some(&args[0])
        }
        _ => None,
    }
}

pub fn tracked_args(ty: &Type) -> Option<(&Type, &Type)> {
    match ty {
        Type::Path { path, args } | Type::ModalState { path, args, .. }
            if is_builtin_path(path, "Tracked") && args.len() == 2 =>
        {
            Some((&args[0], &args[1]))
        }
        _ => None,
    }
}

pub fn region_active_type() -> Type {
    Type::ModalState {
        path: vec!["Region".to_string()],
        state: "Active".to_string(),
        args: vec![],
    }
}

/// The async signature `(out, in, result, err)` of an async-shaped type.
/// Aliases are already expanded by resolution, so only `Async` itself needs
/// recognizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncSig {
    pub out: Type,
    pub input: Type,
    pub result: Type,
    pub err: Type,
}

pub fn async_sig_of(ty: &Type) -> Option<AsyncSig> {
    match ty.strip_perm() {
        Type::Path { path, args } | Type::ModalState { path, args, .. }
            if is_builtin_path(path, "Async") && args.len() == 4 =>
        {
            Some(AsyncSig {
                out: args[0].clone(),
                input: args[1].clone(),
                result: args[2].clone(),
                err: args[3].clone(),
            })
        }
        _ => None,
    }
}

pub fn is_execution_domain_class_path(path: &[String]) -> bool {
    is_builtin_path(path, "ExecutionDomain")
        || is_builtin_path(path, "CpuDomain")
        || is_builtin_path(path, "GpuDomain")
        || is_builtin_path(path, "InlineDomain")
}

pub fn is_gpu_domain_class_path(path: &[String]) -> bool {
    is_builtin_path(path, "GpuDomain")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Primitive;

    #[test]
    fn async_sig_reads_the_four_components() {
        let ty = Type::Path {
            path: vec!["Async".to_string()],
            args: vec![
                Type::Prim(Primitive::I32),
                Type::unit(),
                Type::unit(),
                Type::never(),
            ],
        };
        let sig = async_sig_of(&ty).unwrap();
        assert_eq!(sig.out, Type::Prim(Primitive::I32));
        assert_eq!(sig.err, Type::never());
    }

    #[test]
    fn spawned_inner_extraction() {
        let ty = make_spawned_type(Type::bool());
        assert_eq!(spawned_inner(&ty), Some(&Type::bool()));
        assert_eq!(spawned_inner(&Type::bool()), None);
    }
}
