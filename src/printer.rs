//! The assembly printer (spec.md §4.7 / §6): concatenates the four
//! section strings the code generator and peephole optimizer produced
//! into one translation unit, in the fixed order `.text`, `.bss`,
//! `.rodata`, `.data`, skipping any section that has no instructions.
//!
//! This is deliberately thin — [`vergec_codegen::Section`] already
//! implements [`std::fmt::Display`] in exactly the shape spec.md §6
//! requires (`section KIND` header, two-space-indented operation lines,
//! trailing `; comment`). The printer's only job is picking which
//! sections to include and in what order.

use vergec_codegen::Output;

/// Renders `output`'s four sections into one assembly translation unit,
/// omitting empty sections.
#[must_use]
pub fn render(output: &Output) -> String {
    let mut rendered = String::new();
    for section in [&output.text, &output.bss, &output.rodata, &output.data] {
        if section.is_empty() {
            continue;
        }
        if !rendered.is_empty() {
            rendered.push('\n');
        }
        rendered.push_str(&section.to_string());
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use vergec_codegen::{Instruction, Operand, Register, Section, SectionKind, Width};

    #[test]
    fn empty_sections_are_omitted() {
        let mut text = Section::new(SectionKind::Text);
        text.push(Instruction::Label { name: "_floralid_main".into(), global: true, spaced: false });
        text.push(Instruction::Ret { comment: None });
        let output = Output {
            text,
            bss: Section::new(SectionKind::Bss),
            rodata: Section::new(SectionKind::Rodata),
            data: Section::new(SectionKind::Data),
        };
        let rendered = render(&output);
        assert!(rendered.contains("section .text"));
        assert!(!rendered.contains("section .bss"));
        assert!(!rendered.contains("section .rodata"));
        assert!(!rendered.contains("section .data"));
    }

    #[test]
    fn non_empty_sections_render_in_fixed_order() {
        let mut text = Section::new(SectionKind::Text);
        text.push(Instruction::Ret { comment: None });
        let mut bss = Section::new(SectionKind::Bss);
        bss.push(Instruction::Reserved { label: "_floralid_g".into(), element: vergec_codegen::ir::DataSize::Qword, count: 1 });
        let mut rodata = Section::new(SectionKind::Rodata);
        rodata.push(Instruction::StringData { label: "_floralid_s0".into(), text: "hi".into() });
        let output = Output { text, bss, rodata, data: Section::new(SectionKind::Data) };

        let rendered = render(&output);
        let text_pos = rendered.find("section .text").unwrap();
        let bss_pos = rendered.find("section .bss").unwrap();
        let rodata_pos = rendered.find("section .rodata").unwrap();
        assert!(text_pos < bss_pos);
        assert!(bss_pos < rodata_pos);
        let _ = Operand::reg(Register::Rax, Width::B64);
    }
}
