//! Unreferenced-`extern` elimination (spec.md §4.6's "Extern pruning").
//!
//! Runs once, after instruction rewriting has settled, over the `.text`
//! section only — `extern` declarations are always emitted there
//! (spec.md §6's "extern directives ... rendered in `section .text`").

use std::collections::HashSet;

use vergec_codegen::{Instruction, Output};

/// Removes every `extern NAME` declaration in `output.text` whose name is
/// never referenced by a `call`, `jmp`, `lea [rel NAME]`, or `mov`
/// elsewhere in the section.
pub fn prune_unreferenced_externs(output: &mut Output) {
    let externs: Vec<String> = output
        .text
        .instructions
        .iter()
        .filter_map(|inst| match inst {
            Instruction::Extern { name } => Some(name.clone()),
            _ => None,
        })
        .collect();
    if externs.is_empty() {
        return;
    }

    let referenced: HashSet<&str> = externs
        .iter()
        .filter(|name| {
            output.text.instructions.iter().any(|inst| {
                !matches!(inst, Instruction::Extern { .. }) && inst.references_label(name)
            })
        })
        .map(String::as_str)
        .collect();

    output.text.instructions.retain(|inst| match inst {
        Instruction::Extern { name } => referenced.contains(name.as_str()),
        _ => true,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use vergec_codegen::{Operand, Register, Section, SectionKind, Width};

    fn fresh_output() -> Output {
        Output {
            text: Section::new(SectionKind::Text),
            bss: Section::new(SectionKind::Bss),
            rodata: Section::new(SectionKind::Rodata),
            data: Section::new(SectionKind::Data),
        }
    }

    #[test]
    fn unreferenced_extern_is_dropped() {
        let mut output = fresh_output();
        output.text.push(Instruction::Extern { name: "_floralid_unused".into() });
        output.text.push(Instruction::Extern { name: "_floralid_used".into() });
        output.text.push(Instruction::Call { target: "_floralid_used".into(), comment: None });

        prune_unreferenced_externs(&mut output);

        let names: Vec<&str> = output
            .text
            .instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::Extern { name } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["_floralid_used"]);
    }

    #[test]
    fn extern_referenced_only_via_rel_lea_survives() {
        let mut output = fresh_output();
        output.text.push(Instruction::Extern { name: "_floralid_table".into() });
        output.text.push(Instruction::Lea {
            dst: Operand::reg(Register::Rax, Width::B64),
            src: Operand::Memory(vergec_codegen::MemoryOperand::RelativeLabel("_floralid_table".into(), Width::B64)),
            comment: None,
        });
        prune_unreferenced_externs(&mut output);
        assert_eq!(output.text.instructions.len(), 2, "the lea reference must keep the extern");
    }
}
