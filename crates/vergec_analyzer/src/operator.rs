//! The closed operator overload table from spec.md §4.4.

use std::rc::Rc;

use vergec_lexer::TokenKind;
use vergec_parser::{Type, TypeShape};

/// Resolves the result type of applying `op` to `left`/`right` (either may
/// be absent for a one-sided unary), or `None` if no overload matches.
#[must_use]
pub fn resolve(op: &TokenKind, left: Option<&Type>, right: Option<&Type>) -> Option<Type> {
    match (op, left, right) {
        // Unary prefix/postfix
        (TokenKind::Amp, None, Some(inner)) => {
            Some(Type::new(TypeShape::Pointer(Rc::new(inner.clone()))))
        }
        (TokenKind::Star, None, Some(inner)) => inner.resolved().pointee().cloned(),
        (TokenKind::Minus, None, Some(inner)) if inner.is_number() => Some(inner.as_mut()),
        (TokenKind::Bang, None, Some(inner)) if inner.is_bool() => Some(inner.as_mut()),
        (TokenKind::Tilde, None, Some(inner)) if inner.is_integer() => Some(inner.as_mut()),
        (TokenKind::Inc | TokenKind::Dec, Some(inner), None) if inner.is_number() || inner.is_pointer() => {
            Some(inner.as_mut())
        }
        (TokenKind::Inc | TokenKind::Dec, None, Some(inner)) if inner.is_number() || inner.is_pointer() => {
            Some(inner.as_mut())
        }
        (TokenKind::Plus, None, Some(inner)) if inner.is_number() => Some(inner.as_mut()),

        // Pointer arithmetic
        (TokenKind::Plus | TokenKind::Minus, Some(l), Some(r))
            if l.resolved().is_pointer() && r.resolved().is_integer() =>
        {
            Some(l.as_mut())
        }

        // Numeric arithmetic
        (TokenKind::Plus | TokenKind::Minus, Some(l), Some(r))
            if l.resolved().is_number() && r.resolved().is_number() =>
        {
            Some(l.more_const(r))
        }
        (TokenKind::Star | TokenKind::Slash, Some(l), Some(r))
            if l.resolved().is_number() && r.resolved().is_number() =>
        {
            Some(l.more_const(r))
        }

        // Compound assignment keeps the lhs type
        (TokenKind::PlusEq | TokenKind::MinusEq | TokenKind::StarEq | TokenKind::SlashEq, Some(l), Some(r))
            if (l.resolved().is_pointer() || l.resolved().is_number())
                && (r.resolved().is_number() || r.resolved().is_pointer()) =>
        {
            Some(l.as_mut())
        }

        // Comparisons
        (
            TokenKind::EqEq | TokenKind::NotEq | TokenKind::Less | TokenKind::LessEq | TokenKind::Greater | TokenKind::GreaterEq,
            Some(l),
            Some(r),
        ) if l.structurally_eq(r) => Some(Type::new(TypeShape::Bool)),

        // Boolean logic
        (TokenKind::AmpAmp | TokenKind::PipePipe | TokenKind::CaretCaret, Some(l), Some(r))
            if l.resolved().is_bool() && r.resolved().is_bool() =>
        {
            Some(Type::new(TypeShape::Bool))
        }

        // Subscript
        (TokenKind::LBracket, Some(l), Some(r)) if r.resolved().is_integer() => match &l.resolved().shape {
            TypeShape::Pointer(inner) | TypeShape::StaticArray(inner, _) => Some((**inner).clone()),
            _ => None,
        },

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vergec_parser::IntWidth;

    fn int() -> Type {
        Type::new(TypeShape::Int(IntWidth::I64))
    }

    fn ptr_to_int() -> Type {
        Type::new(TypeShape::Pointer(Rc::new(int())))
    }

    #[test]
    fn pointer_plus_integer_yields_pointer() {
        let result = resolve(&TokenKind::Plus, Some(&ptr_to_int()), Some(&int())).unwrap();
        assert!(result.is_pointer());
    }

    #[test]
    fn number_plus_number_yields_more_const_number() {
        let result = resolve(&TokenKind::Plus, Some(&int()), Some(&int().as_const())).unwrap();
        assert!(result.is_const);
    }

    #[test]
    fn comparison_yields_bool() {
        let result = resolve(&TokenKind::EqEq, Some(&int()), Some(&int())).unwrap();
        assert!(result.is_bool());
    }

    #[test]
    fn subscript_on_pointer_yields_pointee() {
        let result = resolve(&TokenKind::LBracket, Some(&ptr_to_int()), Some(&int())).unwrap();
        assert!(result.is_integer());
    }

    #[test]
    fn address_of_yields_pointer_to_operand() {
        let result = resolve(&TokenKind::Amp, None, Some(&int())).unwrap();
        assert!(result.is_pointer());
    }

    #[test]
    fn dereference_yields_pointee() {
        let result = resolve(&TokenKind::Star, None, Some(&ptr_to_int())).unwrap();
        assert!(result.is_integer());
    }

    #[test]
    fn no_overload_for_mismatched_types() {
        assert!(resolve(&TokenKind::Plus, Some(&int()), Some(&Type::new(TypeShape::Bool))).is_none());
    }

    #[test]
    fn boolean_logic_requires_both_operands_bool() {
        let b = Type::new(TypeShape::Bool);
        assert!(resolve(&TokenKind::AmpAmp, Some(&b), Some(&b)).is_some());
        assert!(resolve(&TokenKind::AmpAmp, Some(&b), Some(&int())).is_none());
    }
}
