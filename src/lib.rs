//! vergec - an ahead-of-time compiler for a small systems language,
//! targeting 64-bit x86 NASM-style assembly.
//!
//! This crate is the thin root of a layered workspace, re-exporting each
//! pipeline-stage crate and adding only the three things that don't belong
//! to any one stage: the driver that runs them in order, the
//! [`options::CommandLineOptions`] surface the driver reads, and the
//! assembly printer that concatenates the code generator's four sections.
//!
//! # Architecture
//!
//! ```text
//! Layer 5: vergec            — driver, CommandLineOptions, AssemblyPrinter
//! Layer 4: vergec_peephole    — peephole optimizer over the instruction IR
//! Layer 3: vergec_codegen     — Frame, Location, Instruction IR, code generator
//! Layer 2: vergec_analyzer    — scope stack, symbol tables, operator oracle
//! Layer 1: vergec_parser      — AST, Type syntax, recursive-descent parser
//! Layer 0: vergec_lexer       — preprocessor, token, span, lexer
//! Layer -: vergec_foundation  — diagnostics, text regions, file resolution map
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod driver;
pub mod options;
pub mod printer;

pub use vergec_analyzer as analyzer;
pub use vergec_codegen as codegen;
pub use vergec_foundation as foundation;
pub use vergec_lexer as lexer;
pub use vergec_parser as parser;
pub use vergec_peephole as peephole;

pub use driver::{compile, CompileOutput};
pub use options::{CommandLineOptions, LibrarySet, OptimizationLevel};
