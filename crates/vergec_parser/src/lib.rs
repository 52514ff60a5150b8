//! AST, type representation, and recursive-descent parser for the vergec
//! source language.
//!
//! This crate provides:
//! - [`Type`]/[`TypeShape`] - the type representation
//! - [`File`], [`Declaration`], [`Statement`], [`Expression`] - the AST
//! - [`Parser`] and [`parse`] - turning a token stream into a [`File`]
//! - [`TypeRegistry`] - struct/alias lookahead bookkeeping

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod ast;
pub mod parser;
pub mod registry;
pub mod types;

pub use ast::{
    ConstructMode, Declaration, Expression, ExpressionKind, File, FunctionAttributes, Initializer,
    Literal, Statement,
};
pub use parser::{parse, Parser};
pub use registry::{StructInfo, TypeRegistry};
pub use types::{IntWidth, Type, TypeShape, MAX_TUPLE_SIZE};
