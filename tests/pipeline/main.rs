//! Cross-layer integration tests for vergec
//!
//! Tests that verify correct interaction between multiple pipeline crates,
//! from source text down to rendered assembly.

mod end_to_end;
mod optimizer_effect;
