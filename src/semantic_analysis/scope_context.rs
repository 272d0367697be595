use crate::ast::*;
use crate::error::*;
use crate::ident::{id_key, path_key, path_to_string, IdKey, Ident};
use crate::span::Span;
use crate::types::Type;
use lazy_static::lazy_static;
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap, HashSet};

lazy_static! {
    /// Names the universe owns outright; user declarations may never take
    /// them.
    static ref RESERVED_NAMES: HashSet<&'static str> = {
        let mut set = HashSet::new();
        set.insert("cursive");
        for prim in &[
            "i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16", "u32", "u64", "u128",
            "usize", "f16", "f32", "f64", "bool", "char",
        ] {
            set.insert(*prim);
        }
        for special in &["string", "bytes", "ptr", "range"] {
            set.insert(*special);
        }
        set
    };
}

pub fn is_reserved_name(key: &str) -> bool {
    RESERVED_NAMES.contains(key) || key.starts_with("gen_")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Value,
    Type,
    Class,
    ModuleAlias,
}

impl EntityKind {
    pub fn friendly_name(self) -> &'static str {
        match self {
            EntityKind::Value => "value",
            EntityKind::Type => "type",
            EntityKind::Class => "class",
            EntityKind::ModuleAlias => "module alias",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitySource {
    Decl,
    Using,
    RegionAlias,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub kind: EntityKind,
    /// The module that declares the named item; `None` for universe
    /// builtins and locals.
    pub origin: Option<ModulePath>,
    pub source: EntitySource,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Universe,
    Module,
    Procedure,
    Local,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    entries: BTreeMap<IdKey, Entity>,
}

impl Scope {
    pub fn new(kind: ScopeKind) -> Scope {
        Scope {
            kind,
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Entity> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: IdKey, entity: Entity) {
        self.entries.insert(key, entity);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IdKey, &Entity)> {
        self.entries.iter()
    }
}

#[derive(Debug, Clone)]
pub enum TypeDeclEntry {
    Record(RecordDecl),
    Enum(EnumDecl),
    Modal(ModalDecl),
    Alias(TypeAliasDecl),
}

impl TypeDeclEntry {
    pub fn name(&self) -> &Ident {
        match self {
            TypeDeclEntry::Record(decl) => &decl.name,
            TypeDeclEntry::Enum(decl) => &decl.name,
            TypeDeclEntry::Modal(decl) => &decl.name,
            TypeDeclEntry::Alias(decl) => &decl.name,
        }
    }

    pub fn vis(&self) -> Visibility {
        match self {
            TypeDeclEntry::Record(decl) => decl.vis,
            TypeDeclEntry::Enum(decl) => decl.vis,
            TypeDeclEntry::Modal(decl) => decl.vis,
            TypeDeclEntry::Alias(decl) => decl.vis,
        }
    }

    pub fn type_parameters(&self) -> &[TypeParam] {
        match self {
            TypeDeclEntry::Record(decl) => &decl.type_parameters,
            TypeDeclEntry::Enum(decl) => &decl.type_parameters,
            TypeDeclEntry::Modal(decl) => &decl.type_parameters,
            TypeDeclEntry::Alias(decl) => &decl.type_parameters,
        }
    }

    pub fn friendly_name(&self) -> &'static str {
        match self {
            TypeDeclEntry::Record(_) => "record",
            TypeDeclEntry::Enum(_) => "enum",
            TypeDeclEntry::Modal(_) => "modal type",
            TypeDeclEntry::Alias(_) => "type alias",
        }
    }
}

/// The project signature: every declared type, class, static and procedure,
/// keyed by fully-qualified folded path. Read-only once toplevel collection
/// finishes.
#[derive(Debug, Clone, Default)]
pub struct Sigma {
    pub mods: Vec<AstModule>,
    pub types: BTreeMap<Vec<IdKey>, TypeDeclEntry>,
    pub classes: BTreeMap<Vec<IdKey>, ClassDecl>,
    pub statics: BTreeMap<Vec<IdKey>, StaticDecl>,
    pub procs: BTreeMap<Vec<IdKey>, ProcedureDecl>,
    /// Underlying types of opaque aliases, keyed by the alias' origin node.
    /// Populated only while checking the declaring module.
    pub opaque_underlying: HashMap<NodeId, Type>,
}

#[derive(Debug, Clone)]
pub struct ScopeContext {
    pub sigma: Sigma,
    pub current_module: ModulePath,
    /// Bottom-up: `[0]` universe, `[1]` module, `[2]` procedure, locals
    /// above.
    pub scopes: Vec<Scope>,
    /// Per-module name maps captured during collection; the init planner
    /// walks these.
    pub module_scopes: BTreeMap<Vec<IdKey>, Scope>,
    /// The `expr -> type` map, keyed by node identity. Swapped in per run.
    pub expr_types: HashMap<NodeId, Type>,
    fresh_region_counter: u32,
}

impl ScopeContext {
    pub fn new() -> ScopeContext {
        let mut ctx = ScopeContext {
            sigma: Sigma::default(),
            current_module: vec![],
            scopes: vec![Scope::new(ScopeKind::Universe)],
            module_scopes: BTreeMap::new(),
            expr_types: HashMap::new(),
            fresh_region_counter: 0,
        };
        super::capabilities::install_universe(&mut ctx);
        ctx
    }

    #[cfg(test)]
    pub fn for_tests() -> ScopeContext {
        ScopeContext::new()
    }

    // --- scope discipline ---

    pub fn universe_scope(&self) -> &Scope {
        &self.scopes[0]
    }

    pub fn universe_scope_mut(&mut self) -> &mut Scope {
        &mut self.scopes[0]
    }

    pub fn module_scope(&self) -> Option<&Scope> {
        self.scopes.get(1)
    }

    pub fn push_scope(&mut self, kind: ScopeKind) {
        self.scopes.push(Scope::new(kind));
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1, "cannot pop the universe scope");
        self.scopes.pop();
    }

    /// Enters `module` for body-level work: resets the scope stack to
    /// universe + that module's collected names.
    pub fn enter_module(&mut self, module: &[String]) {
        self.current_module = module.to_vec();
        self.scopes.truncate(1);
        let scope = self
            .module_scopes
            .get(&path_key(module))
            .cloned()
            .unwrap_or_else(|| Scope::new(ScopeKind::Module));
        self.scopes.push(scope);
    }

    /// Introduces a name into the innermost scope. Same-scope rebinding and
    /// reserved names are hard errors.
    pub fn insert_entity(&mut self, name: &Ident, entity: Entity) -> CompileResult<()> {
        let key = name.key().clone();
        if is_reserved_name(&key) {
            return failed(
                vec![],
                vec![CompileError::ReservedName {
                    name: name.name.clone(),
                    span: name.span.clone(),
                }],
            );
        }
        let top = self.scopes.last_mut().expect("scope stack is never empty");
        if top.contains(&key) {
            return failed(
                vec![],
                vec![CompileError::DuplicateIntroduction {
                    name: name.name.clone(),
                    span: name.span.clone(),
                }],
            );
        }
        top.insert(key, entity);
        recovered((), vec![], vec![])
    }

    /// Looks a name up from the innermost scope outward.
    pub fn lookup_entity(&self, key: &str) -> Option<&Entity> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(key))
    }

    /// Whether `key` is bound anywhere below the innermost scope (the
    /// `shadow` keyword's precondition).
    pub fn bound_in_outer_scope(&self, key: &str) -> bool {
        self.scopes
            .iter()
            .rev()
            .skip(1)
            .any(|scope| scope.contains(key))
    }

    pub fn bound_in_current_scope(&self, key: &str) -> bool {
        self.scopes
            .last()
            .map(|scope| scope.contains(key))
            .unwrap_or(false)
    }

    // --- signature lookups ---

    /// Resolves a possibly-relative type path against the current module,
    /// then as absolute, then as a universe builtin.
    pub fn lookup_type_decl(&self, path: &[String]) -> Option<&TypeDeclEntry> {
        for key in self.candidate_keys(path) {
            if let Some(entry) = self.sigma.types.get(&key) {
                return Some(entry);
            }
        }
        None
    }

    /// The module that declares the type at `path`, resolved the same way as
    /// [`Self::lookup_type_decl`].
    pub fn type_decl_module(&self, path: &[String]) -> Option<Vec<IdKey>> {
        for key in self.candidate_keys(path) {
            if self.sigma.types.contains_key(&key) {
                let mut module = key;
                module.pop();
                return Some(module);
            }
        }
        None
    }

    pub fn lookup_class(&self, path: &[String]) -> Option<&ClassDecl> {
        for key in self.candidate_keys(path) {
            if let Some(decl) = self.sigma.classes.get(&key) {
                return Some(decl);
            }
        }
        None
    }

    pub fn class_decl_module(&self, path: &[String]) -> Option<Vec<IdKey>> {
        for key in self.candidate_keys(path) {
            if self.sigma.classes.contains_key(&key) {
                let mut module = key;
                module.pop();
                return Some(module);
            }
        }
        None
    }

    pub fn lookup_static(&self, module: &[String], name: &str) -> Option<&StaticDecl> {
        let mut key = if module.is_empty() {
            path_key(&self.current_module)
        } else {
            path_key(module)
        };
        key.push(id_key(name));
        self.sigma.statics.get(&key)
    }

    pub fn lookup_proc(&self, module: &[String], name: &str) -> Option<&ProcedureDecl> {
        let mut key = if module.is_empty() {
            path_key(&self.current_module)
        } else {
            path_key(module)
        };
        key.push(id_key(name));
        self.sigma.procs.get(&key)
    }

    /// Candidate folded keys for a path written in source. `using`-imported
    /// names and module aliases resolve through the scope entity's recorded
    /// origin; after that, relative to the current module, then absolute,
    /// then bare (universe builtins). At most three candidates exist, and
    /// every lookup builds them, so they stay on the stack.
    fn candidate_keys(&self, path: &[String]) -> SmallVec<[Vec<IdKey>; 3]> {
        let folded = path_key(path);
        let mut candidates: SmallVec<[Vec<IdKey>; 3]> = SmallVec::new();
        if let Some(first) = folded.first() {
            if let Some(entity) = self.lookup_entity(first) {
                match (&entity.kind, &entity.origin) {
                    (EntityKind::Type, Some(origin))
                    | (EntityKind::Class, Some(origin))
                    | (EntityKind::Value, Some(origin))
                        if folded.len() == 1 =>
                    {
                        let mut key = path_key(origin);
                        key.push(first.clone());
                        candidates.push(key);
                    }
                    (EntityKind::ModuleAlias, Some(origin)) if folded.len() > 1 => {
                        let mut key = path_key(origin);
                        key.extend(folded[1..].iter().cloned());
                        candidates.push(key);
                    }
                    _ => {}
                }
            }
        }
        if !self.current_module.is_empty() {
            let mut relative = path_key(&self.current_module);
            relative.extend(folded.iter().cloned());
            candidates.push(relative);
        }
        candidates.push(folded);
        candidates
    }

    /// The resolved type of a record field, for structural predicates that
    /// chase nominal paths (bitcopy).
    pub fn resolved_field_type(&self, path: &[String], field: &Ident) -> Option<Type> {
        let decl = match self.lookup_type_decl(path) {
            Some(TypeDeclEntry::Record(decl)) => decl.clone(),
            _ => return None,
        };
        let field = decl.fields().find(|candidate| candidate.name == *field)?;
        let mut warnings = vec![];
        let mut errors = vec![];
        let generics = decl
            .type_parameters
            .iter()
            .map(|param| param.name.key().clone())
            .collect();
        super::type_resolution::resolve_type_expr(self, &field.ty, &generics)
            .settle(&mut warnings, &mut errors)
    }

    pub fn record_expr_type(&mut self, id: NodeId, ty: Type) {
        self.expr_types.insert(id, ty);
    }

    pub fn expr_type(&self, id: NodeId) -> Option<&Type> {
        self.expr_types.get(&id)
    }

    /// Whether `span` falls inside one of the current module's parser-marked
    /// unsafe spans.
    pub fn in_unsafe_span(&self, span: &Span) -> bool {
        let module = self
            .sigma
            .mods
            .iter()
            .find(|module| module.path == self.current_module);
        match module {
            Some(module) => module
                .unsafe_spans
                .iter()
                .any(|unsafe_span| unsafe_span.start() <= span.start() && span.end() <= unsafe_span.end()),
            None => false,
        }
    }

    /// Fresh, deterministic names for implicit regions.
    pub fn fresh_region_name(&mut self) -> String {
        self.fresh_region_counter += 1;
        format!("gen_region_{}", self.fresh_region_counter)
    }

    pub fn current_module_string(&self) -> String {
        path_to_string(&self.current_module)
    }
}

impl Default for ScopeContext {
    fn default() -> Self {
        ScopeContext::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_names_are_rejected() {
        let mut ctx = ScopeContext::new();
        ctx.push_scope(ScopeKind::Local);
        let res = ctx.insert_entity(
            &Ident::builtin("cursive"),
            Entity {
                kind: EntityKind::Value,
                origin: None,
                source: EntitySource::Decl,
                span: Span::builtin(),
            },
        );
        assert!(res.value.is_none());
        assert!(matches!(
            res.errors()[0],
            CompileError::ReservedName { .. }
        ));
    }

    #[test]
    fn same_scope_rebinding_is_a_duplicate() {
        let mut ctx = ScopeContext::new();
        ctx.push_scope(ScopeKind::Local);
        let entity = Entity {
            kind: EntityKind::Value,
            origin: None,
            source: EntitySource::Decl,
            span: Span::builtin(),
        };
        assert!(ctx
            .insert_entity(&Ident::builtin("x"), entity.clone())
            .value
            .is_some());
        let res = ctx.insert_entity(&Ident::builtin("x"), entity);
        assert!(matches!(
            res.errors()[0],
            CompileError::DuplicateIntroduction { .. }
        ));
    }

    #[test]
    fn universe_has_builtin_capabilities() {
        let ctx = ScopeContext::new();
        assert!(ctx.lookup_class(&vec!["ExecutionDomain".to_string()]).is_some());
        assert!(ctx.lookup_type_decl(&vec!["Spawned".to_string()]).is_some());
    }
}
