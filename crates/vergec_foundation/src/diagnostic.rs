//! The compiler's unified diagnostic type.
//!
//! A thin `Diagnostic` wrapper carrying a structured `DiagnosticKind` (one
//! `thiserror` variant per failure named in the error taxonomy) plus
//! optional `DiagnosticContext`.

use std::fmt;

use thiserror::Error;

use crate::span::Span;

/// A diagnostic emitted by any pass: an error or a warning.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Diagnostic {
    /// What went wrong.
    pub kind: DiagnosticKind,
    /// Error or warning.
    pub severity: Severity,
    /// Where it happened, and any extra help.
    pub context: Option<DiagnosticContext>,
}

impl Diagnostic {
    /// Creates a new error-severity diagnostic.
    #[must_use]
    pub fn error(kind: DiagnosticKind) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            context: None,
        }
    }

    /// Creates a new warning-severity diagnostic.
    #[must_use]
    pub fn warning(kind: DiagnosticKind) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            context: None,
        }
    }

    /// Attaches context to this diagnostic.
    #[must_use]
    pub fn with_context(mut self, context: DiagnosticContext) -> Self {
        self.context = Some(context);
        self
    }

    /// True if this diagnostic is a warning (non-fatal to the pipeline).
    #[must_use]
    pub fn is_warning(&self) -> bool {
        matches!(self.severity, Severity::Warning)
    }

    /// The closed error-taxonomy domain this diagnostic's kind belongs to.
    #[must_use]
    pub fn domain(&self) -> Domain {
        self.kind.domain()
    }
}

/// Error vs. warning. Replaces a bare `isWarning` boolean with a named type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// A hard failure; the driver will not run the next pass.
    Error,
    /// A soft finding; the pipeline continues.
    Warning,
}

/// The closed set of error-taxonomy domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    /// Preprocessor directive errors.
    Preprocessing,
    /// Lexer errors.
    Lex,
    /// Parser errors.
    Parse,
    /// Name-resolution errors.
    Resolution,
    /// Type-checking errors.
    Type,
    /// Semantic rejections that are neither resolution nor type errors.
    GeneralRejection,
    /// "Should not happen" internal errors.
    Internal,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Preprocessing => "preprocessing error",
            Self::Lex => "lex error",
            Self::Parse => "parse error",
            Self::Resolution => "resolution error",
            Self::Type => "type error",
            Self::GeneralRejection => "rejection",
            Self::Internal => "internal error",
        };
        f.write_str(s)
    }
}

/// Every diagnosable condition named by the error taxonomy.
#[derive(Debug, Error)]
pub enum DiagnosticKind {
    // -- preprocessing --
    /// An `#ifdef`/`#ifndef` was never closed by a matching `#endif`.
    #[error("unterminated conditional block")]
    UnterminatedConditional,
    /// A directive required an identifier next but found something else.
    #[error("expected identifier after `{directive}`")]
    ExpectedIdentifierAfterDirective {
        /// The directive that required an identifier.
        directive: String,
    },
    /// Trailing garbage after a directive's arguments.
    #[error("expected newline after directive, found `{found}`")]
    ExpectedNewlineAfterDirective {
        /// What was found instead of a newline.
        found: String,
    },
    /// `#include` was followed by something other than `<path>` or `"path"`.
    #[error("unexpected character after #include")]
    UnexpectedCharacterAfterInclude,
    /// The named include path could not be resolved.
    #[error("unknown include path `{path}`")]
    UnknownIncludePath {
        /// The path that failed to resolve.
        path: String,
    },
    /// `#endif` with no matching `#ifdef`/`#ifndef`.
    #[error("`#endif` without a matching `#ifdef`/`#ifndef`")]
    UnmatchedEndif,

    // -- lex --
    /// A byte did not start any recognized token.
    #[error("unknown character `{ch}`")]
    UnknownCharacter {
        /// The offending character.
        ch: char,
    },
    /// A string literal ran off the end of the line or file before closing.
    #[error("unterminated string literal")]
    UnterminatedString,
    /// A character literal ran off the end of the line or file before
    /// closing.
    #[error("unterminated character literal")]
    UnterminatedChar,
    /// An integer literal's suffix did not match any recognized combination.
    #[error("unknown numeric suffix `{suffix}`")]
    UnknownNumericSuffix {
        /// The offending suffix text.
        suffix: String,
    },
    /// A wide-character literal decoded to more than 4 bytes.
    #[error("wide character literal exceeds 4 bytes")]
    OverlongWideChar,

    // -- parse --
    /// The parser wanted one of a set of tokens and found something else.
    #[error("unexpected token: found {found}, expected {expected}")]
    UnexpectedToken {
        /// A human-readable name for the token that was found.
        found: String,
        /// A human-readable description of what was expected.
        expected: String,
    },
    /// A closing delimiter (`)`, `]`, `}`) was never found.
    #[error("missing closing `{delimiter}`")]
    MissingClosingDelimiter {
        /// The delimiter that was never closed.
        delimiter: String,
    },
    /// A top-level construct did not start with a recognized declarator.
    #[error("invalid top-level form")]
    InvalidTopLevelForm,

    // -- resolution --
    /// The same name was declared twice in a context that forbids it.
    #[error("invalid redeclaration of `{name}`")]
    InvalidRedeclaration {
        /// The redeclared name.
        name: String,
    },
    /// A symbol was referenced but never declared.
    #[error("unknown symbol `{name}`")]
    UnknownSymbol {
        /// The unresolved name.
        name: String,
    },
    /// No `main` function was found.
    #[error("no `main` function found")]
    MissingMain,
    /// `main`'s signature did not match either accepted form.
    #[error("`main` must take no arguments or (Int32, &&Char)")]
    MainSignatureMismatch,
    /// No declared overload matches a call's argument types.
    #[error("no overload of `{name}` matches the given arguments")]
    NoMatchingOverload {
        /// The called function's base name.
        name: String,
    },

    // -- type --
    /// An assignment's right-hand side type is incompatible with the left.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The required type.
        expected: String,
        /// The type actually produced.
        actual: String,
    },
    /// An assignment targeted a const lvalue, or wrote through a const
    /// pointer.
    #[error("assignment to const value: {description}")]
    ConstViolation {
        /// What was being assigned to.
        description: String,
    },
    /// No entry in the operator table matches this operator/operand-type
    /// combination.
    #[error("no overload of `{op}` for operand types ({left}, {right})")]
    NoOperatorOverload {
        /// The operator token's text.
        op: String,
        /// The left operand's type (or "-" if unary).
        left: String,
        /// The right operand's type (or "-" if unary).
        right: String,
    },
    /// `unsafe_cast<T>(e)` requires `sizeof(typeof(e)) == sizeof(T)`.
    #[error("unsafe_cast size mismatch: {from} is {from_size} bytes, {to} is {to_size} bytes")]
    UnsafeCastSizeMismatch {
        /// The source expression's type name.
        from: String,
        /// The source expression's size in bytes.
        from_size: usize,
        /// The destination type name.
        to: String,
        /// The destination type's size in bytes.
        to_size: usize,
    },
    /// A `return e;`'s type did not match the enclosing function's
    /// declared return type.
    #[error("return type mismatch: function returns {expected}, got {actual}")]
    WrongReturnType {
        /// The function's declared return type.
        expected: String,
        /// The returned expression's type.
        actual: String,
    },
    /// A global's initializer is not static-evaluable, but the code
    /// generator can only emit globals from a compile-time constant.
    #[error("global `{name}`'s initializer is not a compile-time constant")]
    NonStaticGlobalInitializer {
        /// The global's name.
        name: String,
    },

    // -- general rejection --
    /// An expression appeared where only a declaration is legal.
    #[error("expression used as a top-level declaration")]
    ExpressionAsTopLevelDeclaration,

    // -- warnings --
    /// A `var` was declared with a `zero` initializer and never assigned
    /// before being read.
    #[error("`{name}` is used uninitialized")]
    UninitializedVar {
        /// The variable's name.
        name: String,
    },
    /// A copy-initialized `var` silently dropped `const`.
    #[error("implicit un-const of `{name}`")]
    ImplicitUnconst {
        /// The variable's name.
        name: String,
    },
    /// An inner scope's declaration hides an outer one of the same name.
    #[error("`{name}` shadows an outer declaration")]
    Shadowing {
        /// The shadowing name.
        name: String,
    },

    // -- internal --
    /// A "should not happen" internal invariant was violated.
    #[error("internal error: {message}")]
    Internal {
        /// A description of the violated invariant.
        message: String,
    },
}

impl DiagnosticKind {
    /// The closed-taxonomy domain this kind belongs to.
    #[must_use]
    pub fn domain(&self) -> Domain {
        match self {
            Self::UnterminatedConditional
            | Self::ExpectedIdentifierAfterDirective { .. }
            | Self::ExpectedNewlineAfterDirective { .. }
            | Self::UnexpectedCharacterAfterInclude
            | Self::UnknownIncludePath { .. }
            | Self::UnmatchedEndif => Domain::Preprocessing,

            Self::UnknownCharacter { .. }
            | Self::UnterminatedString
            | Self::UnterminatedChar
            | Self::UnknownNumericSuffix { .. }
            | Self::OverlongWideChar => Domain::Lex,

            Self::UnexpectedToken { .. }
            | Self::MissingClosingDelimiter { .. }
            | Self::InvalidTopLevelForm => Domain::Parse,

            Self::InvalidRedeclaration { .. }
            | Self::UnknownSymbol { .. }
            | Self::MissingMain
            | Self::MainSignatureMismatch
            | Self::NoMatchingOverload { .. } => Domain::Resolution,

            Self::TypeMismatch { .. }
            | Self::ConstViolation { .. }
            | Self::NoOperatorOverload { .. }
            | Self::UnsafeCastSizeMismatch { .. }
            | Self::WrongReturnType { .. }
            | Self::NonStaticGlobalInitializer { .. } => Domain::Type,

            Self::ExpressionAsTopLevelDeclaration => Domain::GeneralRejection,

            Self::UninitializedVar { .. } | Self::ImplicitUnconst { .. } | Self::Shadowing { .. } => {
                Domain::GeneralRejection
            }

            Self::Internal { .. } => Domain::Internal,
        }
    }
}

/// Where a diagnostic occurred, and any extra help for fixing it.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticContext {
    /// The text region the diagnostic applies to.
    pub region: Option<Span>,
    /// `(pos, length)` of the offending range, independent of `region`'s
    /// line/column bookkeeping — kept separate because spec.md's error
    /// location is a raw offset pair used for editor integration.
    pub error_loc: Option<(usize, usize)>,
    /// A suggested fix, e.g. "did you mean `foo`?".
    pub fix_hint: Option<String>,
    /// A path to report instead of the region's own file (used when an
    /// error in an `#include`d file should be blamed on the includer).
    pub overridden_path: Option<String>,
}

impl DiagnosticContext {
    /// An empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the text region.
    #[must_use]
    pub fn with_region(mut self, region: Span) -> Self {
        self.error_loc = Some((region.start, region.len()));
        self.region = Some(region);
        self
    }

    /// Sets a fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Overrides the reported path.
    #[must_use]
    pub fn with_overridden_path(mut self, path: impl Into<String>) -> Self {
        self.overridden_path = Some(path.into());
        self
    }
}

impl fmt::Display for DiagnosticContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(region) = &self.region {
            let path = self.overridden_path.as_deref().unwrap_or(&region.file);
            write!(f, "at {path}:{}:{}", region.line, region.column)?;
        }
        if let Some(hint) = &self.fix_hint {
            write!(f, " ({hint})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_display_uses_kind_message() {
        let diag = Diagnostic::error(DiagnosticKind::UnknownSymbol { name: "q".into() });
        assert_eq!(format!("{diag}"), "unknown symbol `q`");
    }

    #[test]
    fn diagnostic_domain_routing() {
        let diag = Diagnostic::error(DiagnosticKind::UnterminatedString);
        assert_eq!(diag.domain(), Domain::Lex);
        let diag = Diagnostic::error(DiagnosticKind::MissingMain);
        assert_eq!(diag.domain(), Domain::Resolution);
    }

    #[test]
    fn warning_is_non_fatal() {
        let diag = Diagnostic::warning(DiagnosticKind::Shadowing { name: "x".into() });
        assert!(diag.is_warning());
    }

    #[test]
    fn context_with_fix_hint_displays() {
        let span = Span::new(0, 1, 3, 4, "a.vg");
        let ctx = DiagnosticContext::new()
            .with_region(span)
            .with_fix_hint("did you mean `foo`?");
        let rendered = format!("{ctx}");
        assert!(rendered.contains("a.vg:3:4"));
        assert!(rendered.contains("did you mean"));
    }
}
