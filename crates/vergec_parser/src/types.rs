//! The vergec type representation.
//!
//! Grounded on `original_source/floral/src/Type.hpp`'s tagged-variant class,
//! but replacing its raw-pointer ownership with an arena-free `Rc`-based
//! tree per spec.md §9's "Cyclic/shared ownership" design note: struct and
//! alias references are `(name)` lookups against the registries carried by
//! [`TypeRegistry`] rather than raw pointers into a global table.

use std::fmt;
use std::rc::Rc;

/// The maximum arity of a tuple type, mirroring the original's
/// `MAX_TUPLE_SIZE`.
pub const MAX_TUPLE_SIZE: usize = 64;

/// Integer signedness/width combinations, plus the two wide-char kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IntWidth {
    /// 8-bit signed.
    I8,
    /// 8-bit unsigned.
    U8,
    /// 16-bit signed.
    I16,
    /// 16-bit unsigned.
    U16,
    /// 32-bit signed.
    I32,
    /// 32-bit unsigned.
    U32,
    /// 64-bit signed.
    I64,
    /// 64-bit unsigned.
    U64,
    /// 32-bit wide character, signed per the lexer's literal rules.
    WideChar,
    /// 32-bit wide character, unsigned.
    WideUChar,
}

impl IntWidth {
    /// Size in bytes.
    #[must_use]
    pub const fn size(self) -> u32 {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::WideChar | Self::WideUChar => 4,
            Self::I64 | Self::U64 => 8,
        }
    }

    /// True if this width is signed.
    #[must_use]
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64 | Self::WideChar)
    }
}

/// The shape of a type, independent of its `const` qualifier.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeShape {
    /// A primitive integer of a given width/signedness.
    Int(IntWidth),
    /// `Bool`.
    Bool,
    /// `Void`, the type of a function with no return value.
    Void,
    /// A floating-point literal's type. Reserved but inert per spec.md §1:
    /// no operator overload or code-generation path accepts it; it exists
    /// only so `Literal::Float` has somewhere to point.
    Float,
    /// A placeholder used during inference before a concrete shape is
    /// known; never survives past analysis.
    Incomplete,
    /// `&T`.
    Pointer(Rc<Type>),
    /// `T[N]`, a fixed-length array.
    StaticArray(Rc<Type>, u64),
    /// `(T1, T2, …)`, 1 to [`MAX_TUPLE_SIZE`] elements.
    Tuple(Vec<Rc<Type>>),
    /// `P1, P2, … -> R`.
    Function(Vec<Rc<Type>>, Rc<Type>),
    /// A reference to a declared struct, by name.
    Struct(String),
    /// A reference to a declared type alias, by name, carrying the type it
    /// was last resolved to.
    Alias(String, Rc<Type>),
}

/// A type: a [`TypeShape`] plus a `const` qualifier.
#[derive(Clone, Debug, PartialEq)]
pub struct Type {
    /// The type's structural shape.
    pub shape: TypeShape,
    /// Whether this type is `const`-qualified.
    pub is_const: bool,
}

impl Type {
    /// Builds a non-const type from a shape.
    #[must_use]
    pub fn new(shape: TypeShape) -> Self {
        Self { shape, is_const: false }
    }

    /// Builds a const-qualified type from a shape.
    #[must_use]
    pub fn new_const(shape: TypeShape) -> Self {
        Self { shape, is_const: true }
    }

    /// Returns the same shape with `const` set.
    #[must_use]
    pub fn as_const(&self) -> Self {
        Self {
            shape: self.shape.clone(),
            is_const: true,
        }
    }

    /// Returns the same shape with `const` cleared.
    #[must_use]
    pub fn as_mut(&self) -> Self {
        Self {
            shape: self.shape.clone(),
            is_const: false,
        }
    }

    /// Whichever of `self`/`other` is const wins — used when typing
    /// `number + number` per spec.md §4.4's operator table.
    #[must_use]
    pub fn more_const(&self, other: &Self) -> Self {
        if self.is_const || other.is_const {
            self.as_const()
        } else {
            self.as_mut()
        }
    }

    /// True if this type (ignoring `const`) structurally equals `other`.
    #[must_use]
    pub fn structurally_eq(&self, other: &Self) -> bool {
        shape_eq(&self.shape, &other.shape)
    }

    /// True if this is an integer or wide-char type.
    #[must_use]
    pub fn is_integer(&self) -> bool {
        matches!(self.shape, TypeShape::Int(_))
    }

    /// True if this is `Bool`.
    #[must_use]
    pub fn is_bool(&self) -> bool {
        matches!(self.shape, TypeShape::Bool)
    }

    /// True if this is `Void`.
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self.shape, TypeShape::Void)
    }

    /// True if this is the reserved floating-point type.
    #[must_use]
    pub fn is_float(&self) -> bool {
        matches!(self.shape, TypeShape::Float)
    }

    /// True if this is a pointer.
    #[must_use]
    pub fn is_pointer(&self) -> bool {
        matches!(self.shape, TypeShape::Pointer(_))
    }

    /// True if this type is a "number" for arithmetic operator purposes:
    /// any integer width.
    #[must_use]
    pub fn is_number(&self) -> bool {
        self.is_integer()
    }

    /// True if this is `Incomplete`.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        matches!(self.shape, TypeShape::Incomplete)
    }

    /// Unwraps one layer of pointer, returning the pointee.
    #[must_use]
    pub fn pointee(&self) -> Option<&Type> {
        match &self.shape {
            TypeShape::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    /// Resolves through any chain of aliases to the underlying shape.
    #[must_use]
    pub fn resolved(&self) -> &Type {
        match &self.shape {
            TypeShape::Alias(_, inner) => inner.resolved(),
            _ => self,
        }
    }

    /// Size in bytes. Struct sizes must be looked up through a
    /// [`TypeRegistry`]; calling this on an unresolved `Struct` shape
    /// returns `0` and is a bug in a caller that forgot to resolve first.
    #[must_use]
    pub fn size(&self) -> u64 {
        match &self.shape {
            TypeShape::Int(width) => u64::from(width.size()),
            TypeShape::Bool => 1,
            TypeShape::Void | TypeShape::Incomplete => 0,
            TypeShape::Float => 8,
            TypeShape::Pointer(_) | TypeShape::Function(..) => 8,
            TypeShape::StaticArray(elem, len) => elem.size() * len,
            TypeShape::Tuple(elems) => elems.iter().map(|e| e.size()).sum(),
            TypeShape::Struct(_) => 0,
            TypeShape::Alias(_, inner) => inner.size(),
        }
    }

    /// A short identifier used to build mangled function names, e.g. `i`
    /// for `Int`, `u` for `UInt`/pointer, `ch`/`uch` for char types.
    /// Grounded on spec.md §4.4's mangling table.
    #[must_use]
    pub fn short_id(&self) -> String {
        match &self.shape {
            TypeShape::Int(IntWidth::I64) => "i".into(),
            TypeShape::Int(IntWidth::U64) => "u".into(),
            TypeShape::Int(IntWidth::I32) => "i32".into(),
            TypeShape::Int(IntWidth::U32) => "u32".into(),
            TypeShape::Int(IntWidth::I16) => "i16".into(),
            TypeShape::Int(IntWidth::U16) => "u16".into(),
            TypeShape::Int(IntWidth::I8) => "ch".into(),
            TypeShape::Int(IntWidth::U8) => "uch".into(),
            TypeShape::Int(IntWidth::WideChar) => "wch".into(),
            TypeShape::Int(IntWidth::WideUChar) => "wuch".into(),
            TypeShape::Bool => "b".into(),
            TypeShape::Void => "v".into(),
            TypeShape::Float => "f".into(),
            TypeShape::Incomplete => "?".into(),
            TypeShape::Pointer(inner) => format!("{}ptr", inner.short_id()),
            TypeShape::StaticArray(inner, _) => format!("{}arr", inner.short_id()),
            TypeShape::Tuple(elems) => {
                let mut s = "t".to_string();
                for e in elems {
                    s.push_str(&e.short_id());
                }
                s
            }
            TypeShape::Function(params, ret) => {
                let ps: String = params.iter().map(Type::short_id).collect::<Vec<_>>().join("");
                format!("{ps}to{}fptr", ret.short_id())
            }
            TypeShape::Struct(name) | TypeShape::Alias(name, _) => name.clone(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_const {
            write!(f, "const ")?;
        }
        match &self.shape {
            TypeShape::Int(IntWidth::I64) => write!(f, "Int"),
            TypeShape::Int(IntWidth::U64) => write!(f, "UInt"),
            TypeShape::Int(IntWidth::I32) => write!(f, "Int32"),
            TypeShape::Int(IntWidth::U32) => write!(f, "UInt32"),
            TypeShape::Int(IntWidth::I16) => write!(f, "Short"),
            TypeShape::Int(IntWidth::U16) => write!(f, "UShort"),
            TypeShape::Int(IntWidth::I8) => write!(f, "Char"),
            TypeShape::Int(IntWidth::U8) => write!(f, "UChar"),
            TypeShape::Int(IntWidth::WideChar) => write!(f, "WideChar"),
            TypeShape::Int(IntWidth::WideUChar) => write!(f, "WideUChar"),
            TypeShape::Bool => write!(f, "Bool"),
            TypeShape::Void => write!(f, "Void"),
            TypeShape::Float => write!(f, "Float"),
            TypeShape::Incomplete => write!(f, "<incomplete>"),
            TypeShape::Pointer(inner) => write!(f, "&{inner}"),
            TypeShape::StaticArray(inner, len) => write!(f, "{inner}[{len}]"),
            TypeShape::Tuple(elems) => {
                write!(f, "(")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, ")")
            }
            TypeShape::Function(params, ret) => {
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, " -> {ret}")
            }
            TypeShape::Struct(name) => write!(f, "struct {name}"),
            TypeShape::Alias(name, _) => write!(f, "{name}"),
        }
    }
}

fn shape_eq(a: &TypeShape, b: &TypeShape) -> bool {
    match (a, b) {
        (TypeShape::Alias(_, inner), other) | (other, TypeShape::Alias(_, inner)) => {
            shape_eq(&inner.shape, other)
        }
        (TypeShape::Int(x), TypeShape::Int(y)) => x == y,
        (TypeShape::Bool, TypeShape::Bool)
        | (TypeShape::Void, TypeShape::Void)
        | (TypeShape::Float, TypeShape::Float)
        | (TypeShape::Incomplete, TypeShape::Incomplete) => true,
        (TypeShape::Pointer(x), TypeShape::Pointer(y)) => shape_eq(&x.shape, &y.shape),
        (TypeShape::StaticArray(x, lx), TypeShape::StaticArray(y, ly)) => {
            lx == ly && shape_eq(&x.shape, &y.shape)
        }
        (TypeShape::Tuple(xs), TypeShape::Tuple(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| shape_eq(&x.shape, &y.shape))
        }
        (TypeShape::Function(xp, xr), TypeShape::Function(yp, yr)) => {
            xp.len() == yp.len()
                && xp.iter().zip(yp).all(|(x, y)| shape_eq(&x.shape, &y.shape))
                && shape_eq(&xr.shape, &yr.shape)
        }
        (TypeShape::Struct(x), TypeShape::Struct(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int() -> Type {
        Type::new(TypeShape::Int(IntWidth::I64))
    }

    #[test]
    fn const_and_mut_are_structurally_equal() {
        assert!(int().structurally_eq(&int().as_const()));
    }

    #[test]
    fn pointer_short_id() {
        let ptr = Type::new(TypeShape::Pointer(Rc::new(Type::new(TypeShape::Int(IntWidth::I8)))));
        assert_eq!(ptr.short_id(), "chptr");
    }

    #[test]
    fn function_short_id() {
        let f = Type::new(TypeShape::Function(
            vec![Rc::new(int())],
            Rc::new(Type::new(TypeShape::Bool)),
        ));
        assert_eq!(f.short_id(), "itobfptr");
    }

    #[test]
    fn alias_resolves_through_to_underlying_shape() {
        let alias = Type::new(TypeShape::Alias("MyInt".into(), Rc::new(int())));
        assert!(alias.resolved().is_integer());
        assert!(alias.structurally_eq(&int()));
    }

    #[test]
    fn more_const_prefers_const_operand() {
        let a = int();
        let b = int().as_const();
        assert!(a.more_const(&b).is_const);
    }

    #[test]
    fn array_size_is_element_size_times_length() {
        let arr = Type::new(TypeShape::StaticArray(Rc::new(int()), 4));
        assert_eq!(arr.size(), 32);
    }

    #[test]
    fn display_renders_pointer_and_array() {
        let ptr = Type::new(TypeShape::Pointer(Rc::new(int())));
        assert_eq!(ptr.to_string(), "&Int");
        let arr = Type::new(TypeShape::StaticArray(Rc::new(int()), 3));
        assert_eq!(arr.to_string(), "Int[3]");
    }
}
