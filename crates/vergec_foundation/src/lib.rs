//! Diagnostics, text regions, and the file resolution map shared by every
//! vergec pipeline stage.
//!
//! This crate provides:
//! - [`Span`] - text regions attached to every token and AST node
//! - [`FileResolutionMap`] - maps expanded-source byte ranges back to files
//! - [`Diagnostic`], [`DiagnosticKind`], [`DiagnosticContext`] - the unified
//!   error/warning type every pass reports through
//! - [`suggest`] - "did you mean" helper for unknown-identifier diagnostics

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod diagnostic;
pub mod file_map;
pub mod span;
pub mod suggest;

pub use diagnostic::{Diagnostic, DiagnosticContext, DiagnosticKind, Domain, Severity};
pub use file_map::{FileRange, FileResolutionMap};
pub use span::Span;
pub use suggest::suggest;

/// Result alias used throughout the pipeline crates: `Ok` on success, or a
/// list of diagnostics accumulated by the failing pass.
pub type Result<T> = std::result::Result<T, Vec<Diagnostic>>;
