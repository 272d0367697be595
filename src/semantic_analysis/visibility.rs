use crate::ast::Visibility;
use crate::ident::{path_key, IdKey};

/// Whether `accessor_module` may see an item declared in `decl_module` at
/// visibility `vis`. Comparisons run over folded path keys so module-path
/// spelling never matters.
pub fn can_access_vis(accessor_module: &[String], decl_module: &[String], vis: Visibility) -> bool {
    can_access_keys(&path_key(accessor_module), &path_key(decl_module), vis)
}

pub fn can_access_keys(accessor: &[IdKey], decl: &[IdKey], vis: Visibility) -> bool {
    match vis {
        Visibility::Public => true,
        // A single assembly is analyzed at a time, so everything in sight is
        // assembly-local.
        Visibility::Internal => true,
        Visibility::Protected => accessor == decl || accessor.starts_with(decl),
        Visibility::Private => accessor == decl,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|part| part.to_string()).collect()
    }

    #[test]
    fn private_is_module_local() {
        assert!(can_access_vis(
            &module(&["app"]),
            &module(&["app"]),
            Visibility::Private
        ));
        assert!(!can_access_vis(
            &module(&["app", "sub"]),
            &module(&["app"]),
            Visibility::Private
        ));
    }

    #[test]
    fn protected_extends_to_submodules() {
        assert!(can_access_vis(
            &module(&["app", "sub"]),
            &module(&["app"]),
            Visibility::Protected
        ));
        assert!(!can_access_vis(
            &module(&["other"]),
            &module(&["app"]),
            Visibility::Protected
        ));
    }

    #[test]
    fn folding_applies_to_module_paths() {
        assert!(can_access_vis(
            &module(&["App"]),
            &module(&["app"]),
            Visibility::Private
        ));
    }
}
