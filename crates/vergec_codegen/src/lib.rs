//! Code generation: lowers an analyzed translation unit into the
//! structured, four-section NASM-style instruction IR defined in [`ir`].
//!
//! The visitor builds around a tagged [`Location`] result (register,
//! `rbp`-relative slot, register-relative slot, literal, or label) instead
//! of an always-materialized value, so pointer arithmetic, member access,
//! and argument placement can each pick the cheapest addressing form at the
//! point they're consumed.
//!
//! This crate provides:
//! - [`register`] - the integer register file and operand widths
//! - [`location`] - where an expression's result currently lives
//! - [`frame`] - per-function scratch-register and stack-slot bookkeeping
//! - [`ir`] - the instruction/section IR itself
//! - [`codegen`] - the visitor that walks a [`vergec_parser::File`] and
//!   emits IR

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod codegen;
pub mod frame;
pub mod ir;
pub mod location;
pub mod register;

pub use codegen::{generate, CodegenOptions, Output};
pub use frame::Frame;
pub use ir::{Instruction, JumpKind, MemoryOperand, Operand, Section, SectionKind, LABEL_PREFIX};
pub use location::{Location, LocationKind, LiteralValue};
pub use register::{Register, Width};
