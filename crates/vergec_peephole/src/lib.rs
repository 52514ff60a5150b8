//! The peephole optimizer: iterates sliding windows over the `.text`
//! section's instruction stream, rewriting or deleting instructions until a
//! fixed point, then prunes unreferenced `extern` declarations.
//!
//! This crate provides:
//! - [`optimize`] - runs the full fixed-point pass over an
//!   [`vergec_codegen::Output`]
//! - [`rules`] - the window-1/2/3 rewrite rules
//! - [`prune`] - unreferenced-`extern` elimination

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod prune;
pub mod rules;

use vergec_codegen::{Instruction, Output};

/// Runs the peephole optimizer over `output`'s text section in place, then
/// prunes unreferenced `extern` declarations from it.
///
/// `level` is the optimization level (0-3). Level 0 performs no rewriting
/// at all and is the identity transform callers use to inspect unoptimized
/// output; levels 1-3 currently all run the same fixed-point pass and so
/// always agree with each other.
pub fn optimize(output: &mut Output, level: u8) {
    if level == 0 {
        return;
    }
    run_fixed_point(&mut output.text.instructions);
    prune::prune_unreferenced_externs(output);
}

/// Repeatedly applies two- and three-instruction rules until neither fires
/// in a full pass, then runs a single trailing single-instruction pass.
fn run_fixed_point(instructions: &mut Vec<Instruction>) {
    loop {
        let mut changed = false;
        changed |= apply_window(instructions, 3, rules::try_window3);
        changed |= apply_window(instructions, 2, rules::try_window2);
        if !changed {
            break;
        }
    }
    apply_window(instructions, 1, rules::try_window1);
}

/// Scans `instructions` left to right with a window of `size`, replacing the
/// window with a rule's rewrite whenever one fires and restarting the scan
/// at the rewrite's start (since a rewrite can expose a new match abutting
/// it). Returns true if any rewrite happened during this pass.
fn apply_window(
    instructions: &mut Vec<Instruction>,
    size: usize,
    rule: impl Fn(&[Instruction]) -> Option<Rewrite>,
) -> bool {
    let mut changed = false;
    let mut i = 0;
    while i + size <= instructions.len() {
        let window = &instructions[i..i + size];
        if window.iter().any(Instruction::is_non_optimizable) {
            i += 1;
            continue;
        }
        match rule(window) {
            Some(Rewrite::Replace(replacement)) => {
                instructions.splice(i..i + size, replacement);
                changed = true;
                i = i.saturating_sub(size.saturating_sub(1));
            }
            Some(Rewrite::Delete) => {
                instructions.splice(i..i + size, []);
                changed = true;
                i = i.saturating_sub(size.saturating_sub(1));
            }
            None => i += 1,
        }
    }
    changed
}

/// What a rule wants done with the window it matched.
pub enum Rewrite {
    /// Replace the window with these instructions (may be shorter, equal,
    /// or (for window-1 splitting) the same length with one substitution).
    Replace(Vec<Instruction>),
    /// Delete the window entirely.
    Delete,
}

#[cfg(test)]
mod tests {
    use super::*;
    use vergec_codegen::{LiteralValue, Operand, Register, Section, SectionKind, Width};

    fn mov(dst: Operand, src: Operand) -> Instruction {
        Instruction::Mov { dst, src, comment: None }
    }

    fn empty_output() -> Output {
        Output {
            text: Section::new(SectionKind::Text),
            bss: Section::new(SectionKind::Bss),
            rodata: Section::new(SectionKind::Rodata),
            data: Section::new(SectionKind::Data),
        }
    }

    mod proptests {
        use proptest::prelude::*;

        use super::{empty_output, Instruction, LiteralValue, Operand, Register, Width};
        use crate::optimize;

        const POOL: [Register; 3] = [Register::Rax, Register::Rbx, Register::Rcx];

        fn arb_register() -> impl Strategy<Value = Register> {
            (0..POOL.len()).prop_map(|i| POOL[i])
        }

        fn arb_instruction() -> impl Strategy<Value = Instruction> {
            prop_oneof![
                (arb_register(), arb_register())
                    .prop_map(|(dst, src)| Instruction::Mov { dst: Operand::reg(dst, Width::B64), src: Operand::reg(src, Width::B64), comment: None }),
                (arb_register(), 0i64..256).prop_map(|(dst, imm)| Instruction::Mov {
                    dst: Operand::reg(dst, Width::B64),
                    src: Operand::Immediate(LiteralValue::Signed(imm)),
                    comment: None,
                }),
                arb_register().prop_map(|r| Instruction::Push { src: Operand::reg(r, Width::B64), comment: None }),
                arb_register().prop_map(|r| Instruction::Pop { dst: Operand::reg(r, Width::B64), comment: None }),
                (arb_register(), arb_register())
                    .prop_map(|(dst, src)| Instruction::Xor { dst: Operand::reg(dst, Width::B64), src: Operand::reg(src, Width::B64), comment: None }),
                (arb_register(), 0i64..256).prop_map(|(dst, imm)| Instruction::Add {
                    dst: Operand::reg(dst, Width::B64),
                    src: Operand::Immediate(LiteralValue::Signed(imm)),
                    comment: None,
                }),
            ]
        }

        proptest! {
            /// spec.md §8's round-trip law: "Running the peephole optimizer
            /// a second time on its own output produces no further
            /// changes (fixed point)." Exercised here over random
            /// instruction streams instead of one hand-picked fixture.
            #[test]
            fn optimizing_twice_agrees_with_optimizing_once(instructions in prop::collection::vec(arb_instruction(), 0..24)) {
                let mut output = empty_output();
                output.text.instructions = instructions;

                optimize(&mut output, 1);
                let once = output.text.instructions.clone();
                optimize(&mut output, 1);

                prop_assert_eq!(once, output.text.instructions);
            }
        }
    }

    #[test]
    fn fixed_point_is_idempotent_on_its_own_output() {
        let mut output = Output {
            text: Section::new(SectionKind::Text),
            bss: Section::new(SectionKind::Bss),
            rodata: Section::new(SectionKind::Rodata),
            data: Section::new(SectionKind::Data),
        };
        output.text.push(mov(Operand::reg(Register::Rax, Width::B64), Operand::reg(Register::Rax, Width::B64)));
        output.text.push(Instruction::Push { src: Operand::reg(Register::Rbx, Width::B64), comment: None });
        output.text.push(Instruction::Pop { dst: Operand::reg(Register::Rbx, Width::B64), comment: None });
        output.text.push(mov(
            Operand::reg(Register::Rcx, Width::B64),
            Operand::Immediate(LiteralValue::Signed(0)),
        ));

        optimize(&mut output, 1);
        let once = output.text.instructions.clone();
        optimize(&mut output, 1);
        assert_eq!(once, output.text.instructions, "second pass must be a no-op fixed point");
    }

    #[test]
    fn level_zero_leaves_self_move_untouched() {
        let mut output = Output {
            text: Section::new(SectionKind::Text),
            bss: Section::new(SectionKind::Bss),
            rodata: Section::new(SectionKind::Rodata),
            data: Section::new(SectionKind::Data),
        };
        output.text.push(mov(Operand::reg(Register::Rax, Width::B64), Operand::reg(Register::Rax, Width::B64)));
        optimize(&mut output, 0);
        assert_eq!(output.text.instructions.len(), 1);
    }

    #[test]
    fn non_optimizable_window_is_skipped() {
        let mut output = Output {
            text: Section::new(SectionKind::Text),
            bss: Section::new(SectionKind::Bss),
            rodata: Section::new(SectionKind::Rodata),
            data: Section::new(SectionKind::Data),
        };
        output.text.push(Instruction::Mov {
            dst: Operand::reg(Register::Rax, Width::B64),
            src: Operand::reg(Register::Rax, Width::B64),
            comment: Some("@ stack guard canary move".into()),
        });
        optimize(&mut output, 3);
        assert_eq!(output.text.instructions.len(), 1, "the '@'-marked move must survive");
    }
}
