use inflector::cases::classcase::is_class_case;
use inflector::cases::snakecase::is_snake_case;

/// Whether this name is idiomatic for a type-level declaration.
pub(crate) fn is_class_case_name(name: &str) -> bool {
    is_class_case(name)
}

/// Whether this name is idiomatic for a field, binding or procedure.
pub(crate) fn is_snake_case_name(name: &str) -> bool {
    is_snake_case(name)
}
