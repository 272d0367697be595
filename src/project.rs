use crate::ident::id_key;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// What kind of artifact an assembly produces. Executables must pass the
/// `main` check; libraries are exempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyKind {
    Executable,
    Library,
}

/// The project descriptor handed in by the manifest/filesystem walk. The walk
/// itself is an external collaborator; this core only consumes its output and
/// re-derives the deterministic ordering.
#[derive(Debug, Clone)]
pub struct Project {
    pub assembly_name: String,
    pub kind: AssemblyKind,
    pub modules: Vec<ProjectModule>,
}

#[derive(Debug, Clone)]
pub struct ProjectModule {
    /// `::`-separated module path components.
    pub path: Vec<String>,
    pub files: Vec<PathBuf>,
}

impl Project {
    pub fn new(assembly_name: impl Into<String>, kind: AssemblyKind) -> Project {
        Project {
            assembly_name: assembly_name.into(),
            kind,
            modules: Vec::new(),
        }
    }

    /// The root module of an assembly is its first module in deterministic
    /// order.
    pub fn root_module(&self) -> Option<&ProjectModule> {
        self.modules.first()
    }

    /// Sorts modules (and their files) into the deterministic order shared
    /// with the filesystem walk. All later phases iterate this order.
    pub fn normalize(&mut self) {
        for module in self.modules.iter_mut() {
            module
                .files
                .sort_by(|a, b| key_cmp(&file_key(a), &file_key(b)));
        }
        self.modules
            .sort_by(|a, b| key_cmp(&module_key(&a.path), &module_key(&b.path)));
    }
}

/// An ordering key: the folded form decides, the raw form breaks ties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey {
    pub folded: String,
    pub raw: String,
}

/// Folds every component of a filesystem path to NFC + case fold and rejoins
/// with `/`. The folded string is the primary ordering key.
pub fn fold_path(path: &Path) -> String {
    let comps: Vec<String> = path
        .components()
        .map(|comp| id_key(&comp.as_os_str().to_string_lossy()))
        .collect();
    comps.join("/")
}

/// Folds a `::`-separated module path.
pub fn fold_module_path(path: &[String]) -> String {
    let comps: Vec<String> = path.iter().map(|comp| id_key(comp)).collect();
    comps.join("::")
}

/// Byte-wise UTF-8 lexicographic comparison. Deliberately not locale-aware:
/// it must order identically on every platform.
pub fn utf8_lex_less(a: &str, b: &str) -> bool {
    a.as_bytes() < b.as_bytes()
}

pub fn key_less(a: &OrderKey, b: &OrderKey) -> bool {
    if utf8_lex_less(&a.folded, &b.folded) {
        return true;
    }
    if a.folded == b.folded {
        return utf8_lex_less(&a.raw, &b.raw);
    }
    false
}

pub(crate) fn key_cmp(a: &OrderKey, b: &OrderKey) -> Ordering {
    if key_less(a, b) {
        Ordering::Less
    } else if key_less(b, a) {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}

pub fn file_key(file: &Path) -> OrderKey {
    OrderKey {
        folded: fold_path(file),
        raw: file.to_string_lossy().into_owned(),
    }
}

pub fn module_key(path: &[String]) -> OrderKey {
    OrderKey {
        folded: fold_module_path(path),
        raw: path.join("::"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|part| part.to_string()).collect()
    }

    #[test]
    fn ordering_folds_case_before_raw_tiebreak() {
        let a = module_key(&module(&["App", "Main"]));
        let b = module_key(&module(&["app", "main"]));
        // Folded keys are equal; the raw spelling breaks the tie, uppercase
        // bytes first.
        assert_eq!(a.folded, b.folded);
        assert!(key_less(&a, &b));
    }

    #[test]
    fn normalize_orders_modules_deterministically() {
        let mut project = Project::new("demo", AssemblyKind::Library);
        project.modules = vec![
            ProjectModule {
                path: module(&["zeta"]),
                files: vec![],
            },
            ProjectModule {
                path: module(&["Alpha"]),
                files: vec![],
            },
            ProjectModule {
                path: module(&["beta"]),
                files: vec![],
            },
        ];
        project.normalize();
        let order: Vec<String> = project
            .modules
            .iter()
            .map(|module| module.path.join("::"))
            .collect();
        assert_eq!(order, vec!["Alpha", "beta", "zeta"]);
    }
}
