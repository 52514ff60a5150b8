//! Process-wide (well, translation-unit-wide) symbol tables: functions by
//! mangled signature, and globals.
//!
//! Grounded on spec.md §4.4's "Symbol tables (process-wide for a single
//! translation unit): globals (defined), global forward declarations,
//! functions (by mangled signature), function forward declarations (by
//! mangled signature). Redeclarations collide across tables." Both
//! function tables are folded into one here — a forward declaration and its
//! matching definition share one [`FunctionEntry`] — since "collide across
//! tables" just means the defined/forward split doesn't grant immunity from
//! duplicate-signature detection.

use std::collections::HashMap;

use vergec_parser::Type;

use crate::mangle::mangle;

/// One overload of a declared function.
#[derive(Debug, Clone)]
pub struct FunctionEntry {
    /// Parameter types, in declaration order.
    pub params: Vec<Type>,
    /// Declared return type.
    pub return_type: Type,
    /// The mangled label this overload emits as.
    pub mangled: String,
    /// True once a definition (not just a forward declaration) has been
    /// seen for this signature.
    pub has_body: bool,
}

/// One declared global.
#[derive(Debug, Clone)]
pub struct GlobalEntry {
    /// Declared type.
    pub ty: Type,
    /// True once a definition (not just a forward declaration) has been
    /// seen.
    pub defined: bool,
    /// True if the global's initializer is static-evaluable (always true
    /// for an undefined/forward-declared global, vacuously).
    pub static_eval: bool,
}

/// Functions (by base name, holding every overload) and globals declared so
/// far in this translation unit.
#[derive(Debug, Clone, Default)]
pub struct SymbolTables {
    functions: HashMap<String, Vec<FunctionEntry>>,
    globals: HashMap<String, GlobalEntry>,
}

impl SymbolTables {
    /// An empty set of tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a function overload. Returns `Err(())` if a *definition*
    /// (not just a forward declaration) of the exact same signature was
    /// already registered — spec.md's "invalid redeclaration".
    pub fn declare_function(
        &mut self,
        base_name: &str,
        params: Vec<Type>,
        return_type: Type,
        has_body: bool,
    ) -> Result<String, ()> {
        let mangled = mangle(base_name, &params);
        let overloads = self.functions.entry(base_name.to_string()).or_default();
        if let Some(existing) = overloads.iter_mut().find(|e| e.mangled == mangled) {
            if existing.has_body && has_body {
                return Err(());
            }
            existing.has_body |= has_body;
            existing.return_type = return_type;
        } else {
            overloads.push(FunctionEntry { params, return_type, mangled: mangled.clone(), has_body });
        }
        Ok(mangled)
    }

    /// All overloads declared under `base_name`.
    #[must_use]
    pub fn overloads(&self, base_name: &str) -> &[FunctionEntry] {
        self.functions.get(base_name).map_or(&[], Vec::as_slice)
    }

    /// Resolves a call: finds the overload of `base_name` whose parameter
    /// types structurally match `arg_types` exactly, per spec.md's "picks
    /// the one whose parameter types exactly match the call's argument
    /// types."
    #[must_use]
    pub fn resolve_call(&self, base_name: &str, arg_types: &[Type]) -> Option<&FunctionEntry> {
        self.overloads(base_name).iter().find(|entry| {
            entry.params.len() == arg_types.len()
                && entry
                    .params
                    .iter()
                    .zip(arg_types)
                    .all(|(p, a)| p.structurally_eq(a))
        })
    }

    /// Declares a global. Returns `Err(())` on redeclaration of an already
    /// *defined* global.
    pub fn declare_global(&mut self, name: &str, ty: Type, defined: bool, static_eval: bool) -> Result<(), ()> {
        if let Some(existing) = self.globals.get_mut(name) {
            if existing.defined && defined {
                return Err(());
            }
            existing.defined |= defined;
            existing.static_eval = static_eval || existing.static_eval;
            existing.ty = ty;
            Ok(())
        } else {
            self.globals.insert(name.to_string(), GlobalEntry { ty, defined, static_eval });
            Ok(())
        }
    }

    /// Looks up a global by name.
    #[must_use]
    pub fn global(&self, name: &str) -> Option<&GlobalEntry> {
        self.globals.get(name)
    }

    /// All base names with at least one declared overload — used to build
    /// "did you mean" candidate lists for unresolved calls.
    #[must_use]
    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// All declared global names — used the same way.
    #[must_use]
    pub fn global_names(&self) -> impl Iterator<Item = &str> {
        self.globals.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vergec_parser::{IntWidth, TypeShape};

    fn int() -> Type {
        Type::new(TypeShape::Int(IntWidth::I64))
    }

    #[test]
    fn overload_selection_matches_exact_params() {
        let mut tables = SymbolTables::new();
        tables
            .declare_function("f", vec![int()], Type::new(TypeShape::Void), true)
            .unwrap();
        let bool_ty = Type::new(TypeShape::Bool);
        tables
            .declare_function("f", vec![bool_ty.clone()], Type::new(TypeShape::Void), true)
            .unwrap();
        assert!(tables.resolve_call("f", &[int()]).is_some());
        assert!(tables.resolve_call("f", &[bool_ty]).is_some());
        assert!(tables.resolve_call("f", &[]).is_none());
    }

    #[test]
    fn redefinition_of_same_signature_is_rejected() {
        let mut tables = SymbolTables::new();
        tables
            .declare_function("f", vec![int()], Type::new(TypeShape::Void), true)
            .unwrap();
        let result = tables.declare_function("f", vec![int()], Type::new(TypeShape::Void), true);
        assert!(result.is_err());
    }

    #[test]
    fn forward_decl_then_definition_is_allowed() {
        let mut tables = SymbolTables::new();
        tables
            .declare_function("f", vec![int()], Type::new(TypeShape::Void), false)
            .unwrap();
        let result = tables.declare_function("f", vec![int()], Type::new(TypeShape::Void), true);
        assert!(result.is_ok());
    }

    #[test]
    fn global_redefinition_is_rejected() {
        let mut tables = SymbolTables::new();
        tables.declare_global("g", int(), true, true).unwrap();
        assert!(tables.declare_global("g", int(), true, true).is_err());
    }
}
