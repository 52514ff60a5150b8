//! Struct member layout: the offsets the code generator needs for `.`/`->`
//! access and for sizing `Construct` expressions and frame slots.
//!
//! Grounded on `original_source/floral/src/Type.hpp`'s `offsetOf`, but
//! computed once per struct during analysis rather than walked on every
//! member access. Members are packed sequentially with no alignment padding
//! — the original does not align either, and this spec's structs are never
//! passed across an ABI boundary that would require it.

use std::collections::HashMap;

use vergec_parser::Type;

/// One data member's name, declared type, and byte offset from the struct's
/// base address.
#[derive(Debug, Clone)]
pub struct MemberLayout {
    /// Member name.
    pub name: String,
    /// Declared type.
    pub ty: Type,
    /// Byte offset from the struct base.
    pub offset: u64,
}

/// A struct's full layout: its members in declaration order, and the
/// struct's total size.
#[derive(Debug, Clone, Default)]
pub struct StructLayout {
    /// Members, in declaration order (also offset order, since layout is
    /// unpadded and sequential).
    pub members: Vec<MemberLayout>,
    /// Total size in bytes, the sum of every member's size.
    pub size: u64,
}

impl StructLayout {
    /// Builds a layout from a member list, assigning sequential offsets.
    #[must_use]
    pub fn from_members(members: &[(String, Type)]) -> Self {
        let mut offset = 0u64;
        let mut laid_out = Vec::with_capacity(members.len());
        for (name, ty) in members {
            let size = ty.size();
            laid_out.push(MemberLayout {
                name: name.clone(),
                ty: ty.clone(),
                offset,
            });
            offset += size;
        }
        Self {
            members: laid_out,
            size: offset,
        }
    }

    /// Looks up a member by name.
    #[must_use]
    pub fn member(&self, name: &str) -> Option<&MemberLayout> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// All struct layouts declared in a translation unit, keyed by (possibly
/// namespace-qualified) struct name.
#[derive(Debug, Clone, Default)]
pub struct LayoutTable {
    structs: HashMap<String, StructLayout>,
}

impl LayoutTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a struct's layout.
    pub fn declare(&mut self, name: impl Into<String>, members: &[(String, Type)]) {
        self.structs.insert(name.into(), StructLayout::from_members(members));
    }

    /// Looks up a struct's layout by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&StructLayout> {
        self.structs.get(name)
    }

    /// The size in bytes of `ty`, resolving struct references through this
    /// table (unlike [`Type::size`], which returns 0 for an unresolved
    /// struct shape).
    #[must_use]
    pub fn size_of(&self, ty: &Type) -> u64 {
        match &ty.shape {
            vergec_parser::TypeShape::Struct(name) => self.get(name).map_or(0, |l| l.size),
            vergec_parser::TypeShape::Alias(_, inner) => self.size_of(inner),
            vergec_parser::TypeShape::Pointer(_) => 8,
            vergec_parser::TypeShape::StaticArray(elem, len) => self.size_of(elem) * len,
            vergec_parser::TypeShape::Tuple(elems) => elems.iter().map(|e| self.size_of(e)).sum(),
            _ => ty.size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vergec_parser::{IntWidth, TypeShape};

    #[test]
    fn sequential_offsets_with_no_padding() {
        let members = vec![
            ("a".to_string(), Type::new(TypeShape::Int(IntWidth::U8))),
            ("b".to_string(), Type::new(TypeShape::Int(IntWidth::I64))),
        ];
        let layout = StructLayout::from_members(&members);
        assert_eq!(layout.member("a").unwrap().offset, 0);
        assert_eq!(layout.member("b").unwrap().offset, 1);
        assert_eq!(layout.size, 9);
    }

    #[test]
    fn size_of_resolves_struct_through_table() {
        let mut table = LayoutTable::new();
        table.declare("Point", &[
            ("x".to_string(), Type::new(TypeShape::Int(IntWidth::I64))),
            ("y".to_string(), Type::new(TypeShape::Int(IntWidth::I64))),
        ]);
        let ty = Type::new(TypeShape::Struct("Point".into()));
        assert_eq!(table.size_of(&ty), 16);
    }
}
