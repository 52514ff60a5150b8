//! Abstract syntax tree: declarations, statements, and expressions.
//!
//! One enum per category, per spec.md §9's "Deep inheritance hierarchies"
//! design note — the original's `Node`/`Declaration`/`Statement`/
//! `Expression` class hierarchy collapses into three tagged variants here,
//! and the `dynamic_cast` chains in emission become exhaustive matches.

use std::cell::RefCell;
use std::rc::Rc;

use vergec_foundation::Span;
use vergec_lexer::TokenKind;

use crate::types::Type;

/// A complete translation unit.
#[derive(Debug, Clone, Default)]
pub struct File {
    /// Top-level declarations, in source order.
    pub declarations: Vec<Declaration>,
    /// Index into `declarations` of the `main` function, if present and
    /// eligible (see spec.md §4.4's entry-point recognition rule).
    pub main_index: Option<usize>,
}

/// One of {zero, direct(expr), copy(expr)} — see spec.md §3.
#[derive(Debug, Clone)]
pub enum Initializer {
    /// No explicit initializer; storage is zeroed.
    Zero,
    /// `let x: T = expr;` — forces `expr`'s type const.
    Direct(Box<Expression>),
    /// `var x = expr;` (or `let`) via assignment-style copy — allows
    /// unconsting for safe types.
    Copy(Box<Expression>),
}

/// Attribute bits applying to a function declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionAttributes {
    /// `static`: file-local linkage, no `global` directive emitted.
    pub is_static: bool,
    /// `inline`: hint only; the code generator may still emit a call.
    pub is_inline: bool,
    /// True if the body is reg-only eligible (single return expression),
    /// decided by the analyzer.
    pub reg_only: bool,
}

/// A top-level or namespace-nested declaration.
#[derive(Debug, Clone)]
pub enum Declaration {
    /// `func NAME(params) -> RET { body }` or with `: RET` return syntax.
    Function {
        /// Possibly namespace-qualified name.
        name: String,
        /// `(param name, declared type)` pairs, in order.
        params: Vec<(String, Type)>,
        /// Declared return type.
        return_type: Type,
        /// Statement body.
        body: Vec<Statement>,
        /// `static`/`inline`/reg-only bits.
        attributes: FunctionAttributes,
        /// Optional `#[deprecated("...")]`-style message; vergec has no
        /// attribute syntax for this yet, so it is always `None` from the
        /// parser and reserved for a future extension.
        deprecation: Option<String>,
        /// Bytes of stack this function's own locals need, filled in by
        /// the analyzer.
        static_allocation_size: RefCell<u64>,
        /// Source location.
        span: Span,
    },
    /// `func NAME(params) -> RET;` with no body.
    FunctionForwardDecl {
        /// Possibly namespace-qualified name.
        name: String,
        /// Declared parameter types, in order.
        params: Vec<(String, Type)>,
        /// Declared return type.
        return_type: Type,
        /// Source location.
        span: Span,
    },
    /// `global NAME: TYPE = INIT;` or `global NAME: TYPE;`.
    Global {
        /// Possibly namespace-qualified name.
        name: String,
        /// Declared type.
        ty: Type,
        /// The global's initializer.
        initializer: Initializer,
        /// Source location.
        span: Span,
    },
    /// `global NAME: TYPE;` with no initializer, forward-declared for use
    /// before its defining translation unit is linked.
    GlobalForwardDecl {
        /// Possibly namespace-qualified name.
        name: String,
        /// Declared type.
        ty: Type,
        /// Source location.
        span: Span,
    },
    /// `struct NAME { members... }`.
    Struct {
        /// Struct name.
        name: String,
        /// Data members, in declaration order (determines `offsetOf`).
        members: Vec<(String, Type)>,
        /// Method declarations, desugared to take the struct pointer as
        /// an implicit first argument at analysis time.
        methods: Vec<Declaration>,
        /// Constructor declarations (methods named the same as the
        /// struct).
        constructors: Vec<Declaration>,
        /// Source location.
        span: Span,
    },
    /// `type NAME = TYPE;`.
    TypeAlias {
        /// Alias name.
        name: String,
        /// The type being aliased.
        aliased: Type,
        /// Source location.
        span: Span,
    },
    /// `namespace NAME { declarations... }`, flattened into the enclosing
    /// declaration list by the parser with qualified names (see
    /// [`crate::parser::Parser`]'s namespace handling); this variant
    /// remains only to preserve the original nesting in diagnostics/`--emit
    /// ast-info` dumps.
    Namespace {
        /// Namespace name.
        name: String,
        /// Declarations lexically nested inside this namespace.
        nested: Vec<Declaration>,
        /// Source location.
        span: Span,
    },
}

impl Declaration {
    /// The declaration's source region.
    #[must_use]
    pub fn span(&self) -> &Span {
        match self {
            Self::Function { span, .. }
            | Self::FunctionForwardDecl { span, .. }
            | Self::Global { span, .. }
            | Self::GlobalForwardDecl { span, .. }
            | Self::Struct { span, .. }
            | Self::TypeAlias { span, .. }
            | Self::Namespace { span, .. } => span,
        }
    }

    /// The declaration's (possibly namespace-qualified) name, if it has
    /// one in the single-name sense (namespaces are excluded).
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Function { name, .. }
            | Self::FunctionForwardDecl { name, .. }
            | Self::Global { name, .. }
            | Self::GlobalForwardDecl { name, .. }
            | Self::Struct { name, .. }
            | Self::TypeAlias { name, .. } => Some(name),
            Self::Namespace { .. } => None,
        }
    }
}

/// A statement.
#[derive(Debug, Clone)]
pub enum Statement {
    /// `let NAME[: TYPE] = INIT;` — initializer type is forced const.
    Let {
        /// Bound name.
        name: String,
        /// Declared or inferred type.
        ty: Type,
        /// The binding's initializer.
        initializer: Initializer,
        /// Source location.
        span: Span,
    },
    /// `var NAME[: TYPE] = INIT;`.
    Var {
        /// Bound name.
        name: String,
        /// Declared or inferred type.
        ty: Type,
        /// The binding's initializer.
        initializer: Initializer,
        /// Source location.
        span: Span,
    },
    /// `lvalue = rvalue;`.
    Assignment {
        /// The assignment target.
        target: Expression,
        /// The value being assigned.
        value: Expression,
        /// Source location.
        span: Span,
    },
    /// `lvalue <- rvalue;`: assignment through a pointer value.
    PointerAssignment {
        /// The pointer expression.
        target: Expression,
        /// The value stored at `*target`.
        value: Expression,
        /// Source location.
        span: Span,
    },
    /// `return [expr];`.
    Return {
        /// The returned value, absent for `Void` functions.
        value: Option<Expression>,
        /// True if this statement was synthesized by the analyzer for a
        /// `Void` function that fell off the end of its body.
        synthetic: bool,
        /// Source location.
        span: Span,
    },
    /// A call used as a statement, its result discarded.
    CallStatement {
        /// The call expression.
        call: Expression,
        /// Source location.
        span: Span,
    },
    /// Any other expression used as a statement.
    ExpressionStatement {
        /// The expression.
        expr: Expression,
        /// Source location.
        span: Span,
    },
    /// `if (cond) { then } [else { else_ }]`.
    If {
        /// The condition.
        condition: Expression,
        /// The taken branch.
        then_branch: Vec<Statement>,
        /// The untaken branch, if any.
        else_branch: Option<Vec<Statement>>,
        /// Source location.
        span: Span,
    },
    /// `while (cond) { body }`.
    While {
        /// The loop condition.
        condition: Expression,
        /// The loop body.
        body: Vec<Statement>,
        /// Source location.
        span: Span,
    },
    /// `for (init; check; modify) { body }`, desugared by the code
    /// generator into `init; while(check) { body; modify; }` per spec.md
    /// §4.5.
    For {
        /// The loop-scoped initializer statement.
        init: Box<Statement>,
        /// The loop condition.
        check: Expression,
        /// The per-iteration update statement.
        modify: Box<Statement>,
        /// The loop body.
        body: Vec<Statement>,
        /// Source location.
        span: Span,
    },
    /// `{ statements... }`, introducing a new scope.
    Block {
        /// Nested statements.
        statements: Vec<Statement>,
        /// Source location.
        span: Span,
    },
    /// `;` alone.
    Empty {
        /// Source location.
        span: Span,
    },
}

impl Statement {
    /// The statement's source region.
    #[must_use]
    pub fn span(&self) -> &Span {
        match self {
            Self::Let { span, .. }
            | Self::Var { span, .. }
            | Self::Assignment { span, .. }
            | Self::PointerAssignment { span, .. }
            | Self::Return { span, .. }
            | Self::CallStatement { span, .. }
            | Self::ExpressionStatement { span, .. }
            | Self::If { span, .. }
            | Self::While { span, .. }
            | Self::For { span, .. }
            | Self::Block { span, .. }
            | Self::Empty { span } => span,
        }
    }
}

/// A literal value, tagged by its lexical kind.
#[derive(Debug, Clone)]
pub enum Literal {
    /// `true`/`false`.
    Bool(bool),
    /// A decimal, hex, or suffixed integer literal.
    Int(u64),
    /// A floating-point literal.
    Float(f64),
    /// An ASCII string literal (already concatenated and escape-decoded).
    AsciiString(String),
    /// A wide string literal, decoded into code points.
    WideString(Vec<u32>),
    /// `null`.
    Null,
}

/// The construction mode for a `construct` expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructMode {
    /// Allocated inline on the enclosing frame.
    Stack,
    /// Reserved for a future heap-allocation extension; the parser never
    /// produces this today because the source language has no `new`
    /// keyword, but the variant is kept so the code generator's match is
    /// exhaustive against the type rather than a boolean.
    Heap,
}

/// An expression. Every expression gets a `ty`/`static_eval` slot filled in
/// by the analyzer; both start `None`/`false` from the parser.
#[derive(Debug, Clone)]
pub struct Expression {
    /// The expression's shape.
    pub kind: ExpressionKind,
    /// Source location.
    pub span: Span,
    /// Resolved type, filled in by the analyzer. `None` until analysis
    /// runs (or if analysis failed for this expression).
    pub ty: RefCell<Option<Type>>,
    /// Whether this expression is compile-time constant, per spec.md
    /// §4.4's static-evaluability rule.
    pub static_eval: RefCell<bool>,
}

impl Expression {
    /// Builds an expression with no type/static-eval information yet.
    #[must_use]
    pub fn new(kind: ExpressionKind, span: Span) -> Self {
        Self {
            kind,
            span,
            ty: RefCell::new(None),
            static_eval: RefCell::new(false),
        }
    }
}

/// The shape of an expression, per spec.md §3.
#[derive(Debug, Clone)]
pub enum ExpressionKind {
    /// A literal value.
    Literal(Literal),
    /// A bare identifier, possibly namespace-qualified with `::`.
    Symbol(String),
    /// A binary (or one-sided unary, encoded with one side absent)
    /// operator expression.
    Binary {
        /// The left operand, absent for a pure-prefix unary.
        left: Option<Box<Expression>>,
        /// The operator token kind and its precedence-table entry.
        op: TokenKind,
        /// Operator precedence, carried alongside `op` so the lowering
        /// and pretty-printing passes don't need to re-derive it from the
        /// table in `vergec_analyzer::operator`.
        precedence: u8,
        /// The right operand, absent for a pure-postfix unary.
        right: Option<Box<Expression>>,
    },
    /// `NAME(args...)`.
    Call {
        /// Callee name, possibly namespace-qualified.
        name: String,
        /// Argument expressions, in order.
        args: Vec<Expression>,
        /// The overload-selected parameter types, filled in by the
        /// analyzer.
        resolved_params: RefCell<Option<Vec<Type>>>,
    },
    /// `NAME(args...)` where `NAME` names a struct type or an alias to
    /// one, per the parser's lookahead disambiguation rule.
    Construct {
        /// Struct name.
        struct_name: String,
        /// Member initializer expressions, in declaration order.
        args: Vec<Expression>,
        /// Stack or heap allocation mode.
        mode: ConstructMode,
    },
    /// `[e1, e2, ...]`.
    ArrayLiteral(Vec<Expression>),
    /// `sizeof(TYPE)`.
    Sizeof(Type),
    /// `unsafe_cast<TYPE>(expr)`.
    UnsafeCast(Type, Box<Expression>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeShape;

    fn dummy_span() -> Span {
        Span::at_start("a.vg")
    }

    #[test]
    fn expression_starts_untyped() {
        let expr = Expression::new(ExpressionKind::Literal(Literal::Int(1)), dummy_span());
        assert!(expr.ty.borrow().is_none());
        assert!(!*expr.static_eval.borrow());
    }

    #[test]
    fn declaration_span_accessor_covers_every_variant() {
        let span = dummy_span();
        let decl = Declaration::TypeAlias {
            name: "MyInt".into(),
            aliased: Type::new(TypeShape::Bool),
            span: span.clone(),
        };
        assert_eq!(decl.span(), &span);
        assert_eq!(decl.name(), Some("MyInt"));
    }

    #[test]
    fn namespace_declaration_has_no_flat_name() {
        let decl = Declaration::Namespace {
            name: "ns".into(),
            nested: Vec::new(),
            span: dummy_span(),
        };
        assert_eq!(decl.name(), None);
    }
}
