//! The init planner: a dependency graph across statics, type references and
//! lazily-reached values, topologically ordered so every module's statics
//! initialize after everything they reach eagerly.

use super::scope_context::ScopeContext;
use crate::ast::*;
use crate::error::*;
use crate::ident::{path_key, path_to_string, IdKey};
use crate::project::fold_module_path;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EdgeKind {
    /// A type named in an item signature.
    Type,
    /// A value a static initializer reaches while running.
    Eager,
    /// A reference reached only behind a spawn/async body or a procedure
    /// call, which cannot fire during initialization.
    Lazy,
}

#[derive(Debug, Clone, Default)]
pub struct InitGraph {
    pub modules: Vec<ModulePath>,
    pub type_edges: Vec<(usize, usize)>,
    pub eager_edges: Vec<(usize, usize)>,
    pub lazy_edges: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, Default)]
pub struct InitPlan {
    pub graph: InitGraph,
    pub init_order: Vec<ModulePath>,
    pub topo_ok: bool,
}

/// Builds the dependency graph and runs Kahn's sort over the type and eager
/// edges. Lazy edges ride along for downstream consumers but never order
/// initialization.
pub fn build_init_plan(ctx: &mut ScopeContext) -> CompileResult<InitPlan> {
    let mut warnings = vec![];
    let mut errors = vec![];

    let modules = ctx.sigma.mods.clone();
    let index_of: BTreeMap<Vec<IdKey>, usize> = modules
        .iter()
        .enumerate()
        .map(|(index, module)| (path_key(&module.path), index))
        .collect();

    let mut graph = InitGraph {
        modules: modules.iter().map(|module| module.path.clone()).collect(),
        ..InitGraph::default()
    };

    for (index, module) in modules.iter().enumerate() {
        ctx.enter_module(&module.path);
        let mut sink = EdgeSink {
            ctx: &*ctx,
            index_of: &index_of,
            from: index,
            edges: BTreeSet::new(),
        };
        for item in &module.items {
            sink.gather_item(item);
        }
        for (kind, to) in sink.edges {
            match kind {
                EdgeKind::Type => graph.type_edges.push((index, to)),
                EdgeKind::Eager => graph.eager_edges.push((index, to)),
                EdgeKind::Lazy => graph.lazy_edges.push((index, to)),
            }
        }
    }

    // Kahn over type + eager edges; the dependency points at the module that
    // must come first.
    let mut di: DiGraph<usize, EdgeKind> = DiGraph::new();
    let nodes: Vec<NodeIndex> = (0..modules.len()).map(|index| di.add_node(index)).collect();
    for (from, to) in graph.type_edges.iter().chain(graph.eager_edges.iter()) {
        if from != to {
            di.add_edge(nodes[*from], nodes[*to], EdgeKind::Eager);
        }
    }

    let mut remaining: BTreeMap<usize, usize> = (0..modules.len())
        .map(|index| {
            (
                index,
                di.neighbors_directed(nodes[index], Direction::Outgoing)
                    .count(),
            )
        })
        .collect();
    let mut ready: BTreeSet<(String, usize)> = remaining
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(index, _)| (fold_module_path(&modules[*index].path), *index))
        .collect();

    let mut init_order = vec![];
    let mut emitted = vec![false; modules.len()];
    while let Some((key, index)) = ready.iter().next().cloned() {
        ready.remove(&(key, index));
        emitted[index] = true;
        init_order.push(modules[index].path.clone());
        for dependant in di.neighbors_directed(nodes[index], Direction::Incoming) {
            let dependant = di[dependant];
            if emitted[dependant] {
                continue;
            }
            let count = remaining.get_mut(&dependant).expect("node has a count");
            *count = count.saturating_sub(1);
            if *count == 0 {
                ready.insert((fold_module_path(&modules[dependant].path), dependant));
            }
        }
    }

    let topo_ok = init_order.len() == modules.len();
    if !topo_ok {
        let cycle: Vec<String> = modules
            .iter()
            .enumerate()
            .filter(|(index, _)| !emitted[*index])
            .map(|(_, module)| path_to_string(&module.path))
            .collect();
        errors.push(CompileError::InitCycle {
            cycle: cycle.join(" -> "),
        });
    }

    let plan = InitPlan {
        graph,
        init_order,
        topo_ok,
    };
    // The plan is handed back even on cycles, so tooling can render the
    // graph and the partial order alongside the diagnostic.
    recovered(plan, warnings, errors)
}

struct EdgeSink<'a> {
    ctx: &'a ScopeContext,
    index_of: &'a BTreeMap<Vec<IdKey>, usize>,
    from: usize,
    edges: BTreeSet<(EdgeKind, usize)>,
}

impl<'a> EdgeSink<'a> {
    fn add_type_edge(&mut self, path: &[String]) {
        if let Some(module) = self.ctx.type_decl_module(path) {
            if let Some(&to) = self.index_of.get(&module) {
                if to != self.from {
                    self.edges.insert((EdgeKind::Type, to));
                }
            }
        }
    }

    fn add_value_edge(&mut self, module_path: &[String], name: &str, kind: EdgeKind) {
        let mut key = if module_path.is_empty() {
            path_key(&self.ctx.current_module)
        } else {
            path_key(module_path)
        };
        key.push(crate::ident::id_key(name));
        let module = {
            let mut module = key;
            module.pop();
            module
        };
        if let Some(&to) = self.index_of.get(&module) {
            if to != self.from {
                self.edges.insert((kind, to));
            }
        }
    }

    fn gather_item(&mut self, item: &Item) {
        match item {
            Item::Static(decl) => {
                if let Some(ty) = &decl.ty {
                    self.gather_type(ty);
                }
                self.gather_expr(&decl.init, EdgeKind::Eager);
            }
            Item::Procedure(decl) => {
                for param in &decl.params {
                    self.gather_type(&param.ty);
                }
                if let Some(ret) = &decl.return_type {
                    self.gather_type(ret);
                }
                self.gather_block(&decl.body, EdgeKind::Lazy);
            }
            Item::Record(decl) => {
                for field in decl.fields() {
                    self.gather_type(&field.ty);
                    if let Some(init) = &field.init {
                        self.gather_expr(init, EdgeKind::Eager);
                    }
                }
            }
            Item::Enum(decl) => {
                for variant in &decl.variants {
                    match &variant.payload {
                        Some(VariantPayload::Tuple(elements)) => {
                            for element in elements {
                                self.gather_type(element);
                            }
                        }
                        Some(VariantPayload::Record(fields)) => {
                            for field in fields {
                                self.gather_type(&field.ty);
                            }
                        }
                        None => {}
                    }
                }
            }
            Item::Modal(decl) => {
                for state in &decl.states {
                    for field in state.fields() {
                        self.gather_type(&field.ty);
                    }
                }
            }
            Item::TypeAlias(decl) => self.gather_type(&decl.ty),
            Item::Class(_) | Item::Using(_) | Item::Error(_) => {}
        }
    }

    fn gather_type(&mut self, ty: &TypeExpr) {
        match &ty.kind {
            TypeExprKind::Name(name) => {
                if crate::types::Primitive::from_name(&name.name).is_none() {
                    self.add_type_edge(&[name.name.clone()]);
                }
            }
            TypeExprKind::Path { path, generic_args }
            | TypeExprKind::ModalState {
                path, generic_args, ..
            } => {
                self.add_type_edge(path);
                for arg in generic_args {
                    self.gather_type(arg);
                }
            }
            TypeExprKind::Perm(_, base) | TypeExprKind::Slice(base) => self.gather_type(base),
            TypeExprKind::Ptr { element, .. } | TypeExprKind::RawPtr { element, .. } => {
                self.gather_type(element)
            }
            TypeExprKind::Array { element, .. } => self.gather_type(element),
            TypeExprKind::Union(members) => {
                for member in members {
                    self.gather_type(member);
                }
            }
            TypeExprKind::Tuple(elements) => {
                for element in elements {
                    self.gather_type(element);
                }
            }
            TypeExprKind::Func { params, ret } => {
                for param in params {
                    self.gather_type(&param.ty);
                }
                self.gather_type(ret);
            }
            TypeExprKind::Refine { base, .. } => self.gather_type(base),
            TypeExprKind::Dynamic(_)
            | TypeExprKind::Str(_)
            | TypeExprKind::Bytes(_)
            | TypeExprKind::Range => {}
        }
    }

    fn gather_block(&mut self, block: &Block, kind: EdgeKind) {
        for stmt in &block.stmts {
            self.gather_stmt(stmt, kind);
        }
        if let Some(tail) = &block.tail {
            self.gather_expr(tail, kind);
        }
    }

    fn gather_stmt(&mut self, stmt: &Stmt, kind: EdgeKind) {
        match stmt {
            Stmt::Let(binding) | Stmt::Var(binding) => self.gather_expr(&binding.init, kind),
            Stmt::ShadowLet(shadow) | Stmt::ShadowVar(shadow) => {
                self.gather_expr(&shadow.init, kind)
            }
            Stmt::Assign { place, value, .. } | Stmt::CompoundAssign { place, value, .. } => {
                self.gather_expr(place, kind);
                self.gather_expr(value, kind);
            }
            Stmt::Expr { value, .. }
            | Stmt::Result { value, .. }
            | Stmt::StaticAssert {
                condition: value, ..
            } => self.gather_expr(value, kind),
            Stmt::Defer { body, .. }
            | Stmt::Region { body, .. }
            | Stmt::Frame { body, .. }
            | Stmt::Unsafe { body, .. }
            | Stmt::Key { body, .. } => self.gather_block(body, kind),
            Stmt::Return { value, .. } | Stmt::Break { value, .. } => {
                if let Some(value) = value {
                    self.gather_expr(value, kind);
                }
            }
            Stmt::Continue { .. } | Stmt::Error { .. } => {}
        }
    }

    fn gather_expr(&mut self, expr: &Expr, kind: EdgeKind) {
        match &expr.kind {
            ExprKind::QualifiedName { path, name } => {
                self.add_value_edge(path, &name.name, kind);
            }
            ExprKind::Identifier(name) => {
                // Only names that resolve to another module's value through
                // `using` create an edge.
                if let Some(entity) = self.ctx.lookup_entity(name.key()) {
                    if let Some(origin) = &entity.origin {
                        if path_key(origin) != path_key(&self.ctx.current_module) {
                            self.add_value_edge(origin, &name.name, kind);
                        }
                    }
                }
            }
            ExprKind::RecordLiteral { path, fields, .. } => {
                self.add_type_edge(path);
                for field in fields {
                    self.gather_expr(&field.value, kind);
                }
            }
            ExprKind::EnumLiteral { path, payload, .. } => {
                self.add_type_edge(path);
                match payload {
                    Some(EnumPayload::Tuple(elements)) => {
                        for element in elements {
                            self.gather_expr(element, kind);
                        }
                    }
                    Some(EnumPayload::Record(fields)) => {
                        for field in fields {
                            self.gather_expr(&field.value, kind);
                        }
                    }
                    None => {}
                }
            }
            // Task bodies run later; everything under them is lazy.
            ExprKind::Spawn { body, .. } => self.gather_block(body, EdgeKind::Lazy),
            ExprKind::Parallel { domain, body } => {
                self.gather_expr(domain, kind);
                self.gather_block(body, EdgeKind::Lazy);
            }
            ExprKind::Dispatch { range, body, .. } => {
                self.gather_expr(range, kind);
                self.gather_block(body, EdgeKind::Lazy);
            }
            ExprKind::Tuple(elements) | ExprKind::Array(elements) | ExprKind::All(elements) => {
                for element in elements {
                    self.gather_expr(element, kind);
                }
            }
            ExprKind::Race(arms) => {
                for arm in arms {
                    self.gather_expr(arm, kind);
                }
            }
            ExprKind::ArrayRepeat { value, count } => {
                self.gather_expr(value, kind);
                self.gather_expr(count, kind);
            }
            ExprKind::Range { lo, hi, .. } => {
                if let Some(lo) = lo {
                    self.gather_expr(lo, kind);
                }
                if let Some(hi) = hi {
                    self.gather_expr(hi, kind);
                }
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.gather_expr(lhs, kind);
                self.gather_expr(rhs, kind);
            }
            ExprKind::Unary { value, .. }
            | ExprKind::Cast { value, .. }
            | ExprKind::Deref(value)
            | ExprKind::AddressOf(value)
            | ExprKind::Move(value)
            | ExprKind::Propagate(value)
            | ExprKind::Yield { value }
            | ExprKind::YieldFrom { value }
            | ExprKind::Sync(value)
            | ExprKind::Wait(value)
            | ExprKind::Transmute { value, .. }
            | ExprKind::Alloc { value, .. } => self.gather_expr(value, kind),
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.gather_expr(cond, kind);
                self.gather_expr(then_branch, kind);
                if let Some(else_branch) = else_branch {
                    self.gather_expr(else_branch, kind);
                }
            }
            ExprKind::Match { value, arms } => {
                self.gather_expr(value, kind);
                for arm in arms {
                    if let Some(guard) = &arm.guard {
                        self.gather_expr(guard, kind);
                    }
                    self.gather_expr(&arm.body, kind);
                }
            }
            ExprKind::Loop { body } => self.gather_block(body, kind),
            ExprKind::While { cond, body } => {
                self.gather_expr(cond, kind);
                self.gather_block(body, kind);
            }
            ExprKind::For { iter, body, .. } => {
                self.gather_expr(iter, kind);
                self.gather_block(body, kind);
            }
            ExprKind::Block(body) | ExprKind::UnsafeBlock(body) => self.gather_block(body, kind),
            ExprKind::FieldAccess { base, .. } | ExprKind::TupleAccess { base, .. } => {
                self.gather_expr(base, kind)
            }
            ExprKind::IndexAccess { base, index } => {
                self.gather_expr(base, kind);
                self.gather_expr(index, kind);
            }
            ExprKind::Call { callee, args, .. } => {
                self.gather_expr(callee, kind);
                for arg in args {
                    self.gather_expr(&arg.value, kind);
                }
            }
            ExprKind::MethodCall { receiver, args, .. } => {
                self.gather_expr(receiver, kind);
                for arg in args {
                    self.gather_expr(&arg.value, kind);
                }
            }
            ExprKind::Sizeof(ty) | ExprKind::Alignof(ty) => self.gather_type(ty),
            ExprKind::Error
            | ExprKind::IntLiteral { .. }
            | ExprKind::FloatLiteral { .. }
            | ExprKind::BoolLiteral(_)
            | ExprKind::CharLiteral(_)
            | ExprKind::StringLiteral(_)
            | ExprKind::NullLiteral => {}
        }
    }
}
