//! Macro preprocessor and lexer for the vergec source language.
//!
//! This crate provides:
//! - [`Preprocessor`] - textual macro expansion and `#include` splicing
//! - [`Lexer`] - tokenization of the expanded source
//! - [`Token`] and [`TokenKind`] - the lexical token vocabulary
//!
//! # Example
//!
//! ```
//! use vergec_lexer::{Lexer, NoIncludes, Preprocessor};
//!
//! let source = "func main(): Int { return 0; }";
//! let preprocessed = Preprocessor::new(&NoIncludes)
//!     .preprocess(source, "main.vg")
//!     .unwrap();
//! let (tokens, diagnostics) = Lexer::tokenize_all(&preprocessed.source, &preprocessed.resolution_map);
//! assert!(diagnostics.is_empty());
//! assert!(tokens.len() > 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod lexer;
pub mod preprocessor;
pub mod token;

pub use lexer::Lexer;
pub use preprocessor::{IncludeResolver, NoIncludes, Preprocessed, Preprocessor};
pub use token::{IntLiteralKind, Token, TokenKind};
