//! End-to-end pipeline tests over hand-built ASTs: one per headline
//! behavior, plus determinism.

use super::*;
use crate::ast::*;
use crate::ident::Ident;
use crate::project::{AssemblyKind, Project, ProjectModule};
use crate::span::Span;
use crate::types::{Permission, PtrState};

struct AstBuilder {
    next: u32,
}

impl AstBuilder {
    fn new() -> AstBuilder {
        AstBuilder { next: 0 }
    }

    fn id(&mut self) -> NodeId {
        self.next += 1;
        NodeId(self.next)
    }

    fn e(&mut self, kind: ExprKind) -> Expr {
        let id = self.id();
        Expr::new(id, kind, Span::builtin())
    }

    fn int(&mut self, value: i128) -> Expr {
        self.e(ExprKind::IntLiteral {
            value,
            suffix: None,
        })
    }

    fn var(&mut self, name: &str) -> Expr {
        self.e(ExprKind::Identifier(Ident::builtin(name)))
    }

    fn qualified(&mut self, module: &[&str], name: &str) -> Expr {
        self.e(ExprKind::QualifiedName {
            path: module.iter().map(|part| part.to_string()).collect(),
            name: Ident::builtin(name),
        })
    }
}

fn name_ty(name: &str) -> TypeExpr {
    TypeExpr::new(TypeExprKind::Name(Ident::builtin(name)), Span::builtin())
}

fn perm_ty(perm: Permission, base: TypeExpr) -> TypeExpr {
    TypeExpr::new(TypeExprKind::Perm(perm, Box::new(base)), Span::builtin())
}

fn ptr_ty(element: TypeExpr) -> TypeExpr {
    TypeExpr::new(
        TypeExprKind::Ptr {
            element: Box::new(element),
            state: Some(PtrState::Valid),
        },
        Span::builtin(),
    )
}

fn union_ty(members: Vec<TypeExpr>) -> TypeExpr {
    TypeExpr::new(TypeExprKind::Union(members), Span::builtin())
}

fn block(stmts: Vec<Stmt>, tail: Option<Expr>) -> Block {
    Block {
        stmts,
        tail: tail.map(Box::new),
        span: Span::builtin(),
    }
}

fn param(name: &str, ty: TypeExpr) -> Param {
    Param {
        mode: None,
        name: Ident::builtin(name),
        ty,
        span: Span::builtin(),
    }
}

fn move_param(name: &str, ty: TypeExpr) -> Param {
    Param {
        mode: Some(ParamMode::Move),
        name: Ident::builtin(name),
        ty,
        span: Span::builtin(),
    }
}

fn proc_decl(name: &str, params: Vec<Param>, return_type: Option<TypeExpr>, body: Block) -> Item {
    Item::Procedure(ProcedureDecl {
        attrs: vec![],
        vis: Visibility::Public,
        name: Ident::builtin(name),
        type_parameters: vec![],
        where_clause: vec![],
        params,
        return_type,
        body,
        span: Span::builtin(),
    })
}

fn record_field(name: &str, ty: TypeExpr, init: Option<Expr>) -> RecordMember {
    RecordMember::Field(FieldDecl {
        vis: Visibility::Public,
        name: Ident::builtin(name),
        ty,
        init,
        span: Span::builtin(),
    })
}

fn record_decl(name: &str, members: Vec<RecordMember>) -> Item {
    Item::Record(RecordDecl {
        attrs: vec![],
        vis: Visibility::Public,
        name: Ident::builtin(name),
        type_parameters: vec![],
        implements: vec![],
        where_clause: vec![],
        members,
        span: Span::builtin(),
    })
}

fn static_decl(name: &str, ty: TypeExpr, init: Expr) -> Item {
    Item::Static(StaticDecl {
        vis: Visibility::Public,
        mutability: Mutability::Let,
        name: Ident::builtin(name),
        ty: Some(ty),
        init,
        span: Span::builtin(),
    })
}

fn module(path: &[&str], items: Vec<Item>) -> AstModule {
    AstModule {
        path: path.iter().map(|part| part.to_string()).collect(),
        items,
        unsafe_spans: vec![],
    }
}

fn expr_stmt(value: Expr) -> Stmt {
    Stmt::Expr {
        value,
        span: Span::builtin(),
    }
}

fn let_stmt(name: &str, init: Expr) -> Stmt {
    Stmt::Let(BindingStmt {
        pattern: Pattern {
            span: Span::builtin(),
            kind: PatternKind::Identifier(Ident::builtin(name)),
        },
        ty: None,
        init,
        span: Span::builtin(),
    })
}

fn error_codes(result: &TypecheckResult) -> Vec<&'static str> {
    result
        .diags
        .iter()
        .filter(|diag| diag.severity == crate::error::Severity::Error)
        .map(|diag| diag.code)
        .collect()
}

// --- record default construction -------------------------------------------

fn record_default_modules(with_b_init: bool) -> Vec<AstModule> {
    let mut b = AstBuilder::new();
    let init_a = b.int(1);
    let init_b = if with_b_init { Some(b.int(2)) } else { None };
    let rec = record_decl(
        "Rec",
        vec![
            record_field("a", name_ty("i32"), Some(init_a)),
            record_field("b", name_ty("i32"), init_b),
        ],
    );
    let callee = b.var("Rec");
    let call = b.e(ExprKind::Call {
        callee: Box::new(callee),
        generic_args: vec![],
        args: vec![],
    });
    let body = block(vec![let_stmt("r", call)], None);
    vec![module(&["main"], vec![rec, proc_decl("build", vec![], None, body)])]
}

#[test]
fn record_default_call_checks() {
    let result = crate::check_modules(record_default_modules(true));
    assert!(result.ok, "unexpected diagnostics: {:?}", result.diags);
}

#[test]
fn record_default_call_requires_initializers() {
    let result = crate::check_modules(record_default_modules(false));
    assert!(error_codes(&result).contains(&"Record-Default-Init-Err"));
}

// --- union match exhaustiveness ---------------------------------------------

fn union_match_modules(cover_bool: bool) -> Vec<AstModule> {
    let mut b = AstBuilder::new();
    let mut arms = vec![MatchArm {
        pattern: Pattern {
            span: Span::builtin(),
            kind: PatternKind::Typed {
                name: Ident::builtin("x"),
                ty: name_ty("i32"),
            },
        },
        guard: None,
        body: b.int(1),
        span: Span::builtin(),
    }];
    if cover_bool {
        arms.push(MatchArm {
            pattern: Pattern {
                span: Span::builtin(),
                kind: PatternKind::Typed {
                    name: Ident::builtin("y"),
                    ty: name_ty("bool"),
                },
            },
            guard: None,
            body: b.int(1),
            span: Span::builtin(),
        });
    }
    let scrutinee = b.var("u");
    let match_expr = b.e(ExprKind::Match {
        value: Box::new(scrutinee),
        arms,
    });
    let body = block(vec![], Some(match_expr));
    let proc = proc_decl(
        "pick",
        vec![param("u", union_ty(vec![name_ty("i32"), name_ty("bool")]))],
        Some(name_ty("i32")),
        body,
    );
    vec![module(&["main"], vec![proc])]
}

#[test]
fn union_match_exhaustive() {
    let result = crate::check_modules(union_match_modules(true));
    assert!(result.ok, "unexpected diagnostics: {:?}", result.diags);
}

#[test]
fn union_match_missing_member() {
    let result = crate::check_modules(union_match_modules(false));
    assert!(error_codes(&result).contains(&"Match-Union-NonExhaustive"));
}

// --- move and use-after-move -------------------------------------------------

#[test]
fn use_after_move_is_rejected() {
    let mut b = AstBuilder::new();
    let moved = b.var("v");
    let move_expr = b.e(ExprKind::Move(Box::new(moved)));
    let reuse = b.var("v");
    let body = block(vec![let_stmt("w", move_expr), expr_stmt(reuse)], None);
    let proc = proc_decl("consume", vec![move_param("v", name_ty("i32"))], None, body);
    let result = crate::check_modules(vec![module(&["main"], vec![proc])]);
    assert!(error_codes(&result).contains(&"B-Place-Moved-Err"));
}

// --- unique downgrade across a call -----------------------------------------

fn downgrade_modules(double_borrow: bool) -> Vec<AstModule> {
    let mut b = AstBuilder::new();
    let reader = proc_decl(
        "read",
        vec![param("x", perm_ty(Permission::Const, ptr_ty(name_ty("i32"))))],
        None,
        block(vec![], None),
    );
    let reader2 = proc_decl(
        "read_pair",
        vec![
            param("x", perm_ty(Permission::Const, ptr_ty(name_ty("i32")))),
            param("y", perm_ty(Permission::Const, ptr_ty(name_ty("i32")))),
        ],
        None,
        block(vec![], None),
    );
    let callee = if double_borrow {
        b.var("read_pair")
    } else {
        b.var("read")
    };
    let mut args = vec![Arg {
        moved: false,
        value: b.var("p"),
        span: Span::builtin(),
    }];
    if double_borrow {
        args.push(Arg {
            moved: false,
            value: b.var("p"),
            span: Span::builtin(),
        });
    }
    let call = b.e(ExprKind::Call {
        callee: Box::new(callee),
        generic_args: vec![],
        args,
    });
    let reuse = b.var("p");
    let body = block(vec![expr_stmt(call), expr_stmt(reuse)], None);
    let caller = proc_decl(
        "lend",
        vec![param("p", perm_ty(Permission::Unique, ptr_ty(name_ty("i32"))))],
        None,
        body,
    );
    vec![module(&["main"], vec![reader, reader2, caller])]
}

#[test]
fn unique_downgrade_reactivates_after_call() {
    let result = crate::check_modules(downgrade_modules(false));
    assert!(result.ok, "unexpected diagnostics: {:?}", result.diags);
}

#[test]
fn unique_place_cannot_be_borrowed_twice_in_one_call() {
    let result = crate::check_modules(downgrade_modules(true));
    assert!(error_codes(&result).contains(&"B-Place-Unique-Err"));
}

// --- init cycle --------------------------------------------------------------

#[test]
fn init_cycle_is_reported() {
    let mut b = AstBuilder::new();
    let beta_ref = b.qualified(&["beta"], "b");
    let alpha_ref = b.qualified(&["alpha"], "a");
    let alpha = module(&["alpha"], vec![static_decl("a", name_ty("i32"), beta_ref)]);
    let beta = module(&["beta"], vec![static_decl("b", name_ty("i32"), alpha_ref)]);
    let result = crate::check_modules(vec![alpha, beta]);
    assert!(error_codes(&result).contains(&"E-MOD-1401"));
    let plan = result.init_plan.expect("plan is carried even on cycles");
    assert!(!plan.topo_ok);
}

#[test]
fn init_order_is_dependency_first() {
    let mut b = AstBuilder::new();
    let base_val = b.int(1);
    let dep_ref = b.qualified(&["zcore"], "base");
    let zcore = module(&["zcore"], vec![static_decl("base", name_ty("i32"), base_val)]);
    let app = module(&["app"], vec![static_decl("derived", name_ty("i32"), dep_ref)]);
    let result = crate::check_modules(vec![app, zcore]);
    assert!(result.ok, "unexpected diagnostics: {:?}", result.diags);
    let plan = result.init_plan.expect("planner ran");
    assert!(plan.topo_ok);
    let order: Vec<String> = plan
        .init_order
        .iter()
        .map(|path| path.join("::"))
        .collect();
    assert_eq!(order, vec!["zcore", "app"]);
}

// --- GPU capture rules --------------------------------------------------------

#[test]
fn gpu_spawn_rejects_shared_captures() {
    let mut b = AstBuilder::new();
    let use_shared = b.var("shared_x");
    let body = block(vec![expr_stmt(use_shared)], None);

    let mut ctx = ScopeContext::for_tests();
    let tcx = StmtTypeContext::new(crate::types::Type::unit()).in_parallel(true);
    let mut env = TypeEnv::new();
    env.insert(
        crate::ident::id_key("shared_x"),
        crate::semantic_analysis::statement::TypeBinding {
            mutability: Mutability::Let,
            ty: crate::types::Type::Perm(
                Permission::Shared,
                Box::new(crate::types::Type::bool()),
            ),
        },
    );
    let res = crate::semantic_analysis::expression::concurrency::type_spawn(&mut ctx, &tcx, &mut env, &[], &body, &Span::builtin());
    assert!(res
        .errors()
        .iter()
        .any(|error| error.code() == "E-CON-0150"));
}

#[test]
fn gpu_spawn_rejects_host_pointer_captures() {
    let mut b = AstBuilder::new();
    let use_ptr = b.var("host_p");
    let body = block(vec![expr_stmt(use_ptr)], None);
    let spawn = b.e(ExprKind::Spawn {
        options: vec![],
        body,
    });
    let domain = b.var("dev");
    let parallel = b.e(ExprKind::Parallel {
        domain: Box::new(domain),
        body: block(vec![expr_stmt(spawn)], None),
    });
    let proc = proc_decl(
        "kernel",
        vec![
            param(
                "dev",
                TypeExpr::new(
                    TypeExprKind::Dynamic(vec!["GpuDomain".to_string()]),
                    Span::builtin(),
                ),
            ),
            param("host_p", ptr_ty(name_ty("i32"))),
        ],
        None,
        block(vec![expr_stmt(parallel)], None),
    );
    let result = crate::check_modules(vec![module(&["main"], vec![proc])]);
    assert!(error_codes(&result).contains(&"E-CON-0151"));
}

// --- determinism --------------------------------------------------------------

#[test]
fn repeated_runs_are_bitwise_identical() {
    let first = crate::check_modules(record_default_modules(false));
    let second = crate::check_modules(record_default_modules(false));
    assert_eq!(first.diags, second.diags);
    let mut keys_a: Vec<NodeId> = first.expr_types.keys().copied().collect();
    let mut keys_b: Vec<NodeId> = second.expr_types.keys().copied().collect();
    keys_a.sort();
    keys_b.sort();
    assert_eq!(keys_a, keys_b);
}

// --- main gate ----------------------------------------------------------------

#[test]
fn executable_requires_main() {
    let project = {
        let mut project = Project::new("demo", AssemblyKind::Executable);
        project.modules = vec![ProjectModule {
            path: vec!["main".to_string()],
            files: vec![],
        }];
        project
    };
    let lib_only = vec![module(&["main"], vec![])];
    let result = crate::check_project(project.clone(), lib_only);
    assert!(error_codes(&result).contains(&"E-PRJ-0301"));

    let mut b = AstBuilder::new();
    let body = block(vec![], Some(b.int(0)));
    let with_main = vec![module(
        &["main"],
        vec![proc_decl("main", vec![], Some(name_ty("i32")), body)],
    )];
    let result = crate::check_project(project, with_main);
    assert!(result.ok, "unexpected diagnostics: {:?}", result.diags);
}

#[test]
fn shadowing_requires_the_keyword() {
    let mut b = AstBuilder::new();
    let first = b.int(1);
    let second = b.int(2);
    let inner = block(vec![let_stmt("x", second)], None);
    let inner_expr = b.e(ExprKind::Block(inner));
    let body = block(vec![let_stmt("x", first), expr_stmt(inner_expr)], None);
    let proc = proc_decl("shadowy", vec![], None, body);
    let result = crate::check_modules(vec![module(&["main"], vec![proc])]);
    assert!(error_codes(&result).contains(&"Intro-Shadow-Required"));
}

#[test]
fn shadow_statement_rebinding_is_accepted() {
    let mut b = AstBuilder::new();
    let first = b.int(1);
    let second = b.int(2);
    let inner = block(
        vec![Stmt::ShadowLet(ShadowStmt {
            name: Ident::builtin("x"),
            ty: None,
            init: second,
            span: Span::builtin(),
        })],
        None,
    );
    let inner_expr = b.e(ExprKind::Block(inner));
    let body = block(vec![let_stmt("x", first), expr_stmt(inner_expr)], None);
    let proc = proc_decl("shadowy", vec![], None, body);
    let result = crate::check_modules(vec![module(&["main"], vec![proc])]);
    assert!(result.ok, "unexpected diagnostics: {:?}", result.diags);
}

#[test]
fn loop_fixpoint_rejects_moves_in_loop_bodies() {
    let mut b = AstBuilder::new();
    let moved = b.var("v");
    let move_expr = b.e(ExprKind::Move(Box::new(moved)));
    let loop_body = block(vec![let_stmt("w", move_expr)], None);
    let loop_expr = b.e(ExprKind::Loop { body: loop_body });
    let body = block(vec![expr_stmt(loop_expr)], None);
    let proc = proc_decl("churn", vec![move_param("v", name_ty("i32"))], None, body);
    let result = crate::check_modules(vec![module(&["main"], vec![proc])]);
    // The second trip through the loop body observes the moved binding.
    assert!(error_codes(&result)
        .iter()
        .any(|code| *code == "B-Place-Moved-Err" || *code == "B-Move-Whole-Moved-Err"));
}
