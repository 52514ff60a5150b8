//! The structured instruction IR emitted by the code generator, rewritten
//! by the peephole optimizer, and rendered by the assembly printer.
//!
//! Operation lines render as `  <mnemonic> <operands> ; <comment>`; memory
//! operands render as `[rbp+K]`, `[rbp-K]`, `[reg]`, `[reg+K]`, or
//! `[rel LBL]` as appropriate.

use std::fmt;

use crate::location::LiteralValue;
use crate::register::{Register, Width};

/// The label prefix every emitted symbol carries. Every externally
/// referenced symbol uses this program-wide prefix on definition.
pub const LABEL_PREFIX: &str = "_floralid_";

/// An instruction operand.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// A bare register at a given width.
    Register(Register, Width),
    /// A memory reference.
    Memory(MemoryOperand),
    /// An immediate literal.
    Immediate(LiteralValue),
    /// A bare label, used as a `call`/`jmp` target (no `[...]`).
    Label(String),
}

impl Operand {
    /// A register operand at the given width.
    #[must_use]
    pub const fn reg(register: Register, width: Width) -> Self {
        Self::Register(register, width)
    }
}

/// A memory operand's addressing form.
#[derive(Clone, Debug, PartialEq)]
pub enum MemoryOperand {
    /// `[rbp+K]` / `[rbp-K]`.
    RbpOffset(i64, Width),
    /// `[reg]`.
    Register(Register, Width),
    /// `[reg+K]`.
    RegisterOffset(Register, i64, Width),
    /// `[base+index]` or `[base+index*scale]` — a struct/array member
    /// reached through a register-held base plus a register-held,
    /// compile-time-scaled index, as produced by a scaled `lea`.
    BaseIndexScale { base: Register, index: Register, scale: u8, width: Width },
    /// `[rel LBL]`.
    RelativeLabel(String, Width),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register(reg, width) => write!(f, "{}", reg.name(*width)),
            Self::Memory(mem) => write!(f, "{mem}"),
            Self::Immediate(value) => write!(f, "{}", value.render()),
            Self::Label(name) => write!(f, "{name}"),
        }
    }
}

impl fmt::Display for MemoryOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RbpOffset(offset, width) => {
                let sign = if *offset >= 0 { "+" } else { "-" };
                write!(f, "{} [rbp{sign}{}]", width.keyword(), offset.unsigned_abs())
            }
            Self::Register(reg, width) => write!(f, "{} [{}]", width.keyword(), reg.name(Width::B64)),
            Self::RegisterOffset(reg, offset, width) => {
                let sign = if *offset >= 0 { "+" } else { "-" };
                write!(f, "{} [{}{sign}{}]", width.keyword(), reg.name(Width::B64), offset.unsigned_abs())
            }
            Self::BaseIndexScale { base, index, scale, width } => {
                if *scale == 1 {
                    write!(f, "{} [{}+{}]", width.keyword(), base.name(Width::B64), index.name(Width::B64))
                } else {
                    write!(f, "{} [{}+{}*{scale}]", width.keyword(), base.name(Width::B64), index.name(Width::B64))
                }
            }
            Self::RelativeLabel(label, width) => write!(f, "{} [rel {label}]", width.keyword()),
        }
    }
}

/// The conditional flavor of a jump.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JumpKind {
    /// `jmp` — unconditional.
    Normal,
    /// `jz`.
    Zero,
    /// `jnz`.
    NonZero,
    /// `je`.
    Equal,
    /// `jne`.
    Unequal,
    /// `jl`.
    Less,
    /// `jge`.
    GreaterEqual,
}

impl JumpKind {
    /// The NASM mnemonic for this jump kind.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Normal => "jmp",
            Self::Zero => "jz",
            Self::NonZero => "jnz",
            Self::Equal => "je",
            Self::Unequal => "jne",
            Self::Less => "jl",
            Self::GreaterEqual => "jge",
        }
    }

    /// The kind that reverses this condition's sense, used when a lowered
    /// `if` without an `else` needs to skip the `then` branch.
    #[must_use]
    pub const fn negated(self) -> Self {
        match self {
            Self::Normal => Self::Normal,
            Self::Zero => Self::NonZero,
            Self::NonZero => Self::Zero,
            Self::Equal => Self::Unequal,
            Self::Unequal => Self::Equal,
            Self::Less => Self::GreaterEqual,
            Self::GreaterEqual => Self::Less,
        }
    }
}

/// The element size of a data directive (`db`/`dw`/`dd`/`dq` and their
/// `res*` reservation counterparts).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataSize {
    /// 1 byte.
    Byte,
    /// 2 bytes.
    Word,
    /// 4 bytes.
    Dword,
    /// 8 bytes.
    Qword,
}

impl DataSize {
    /// The initialized-data directive keyword (`db`, `dw`, `dd`, `dq`).
    #[must_use]
    pub const fn data_directive(self) -> &'static str {
        match self {
            Self::Byte => "db",
            Self::Word => "dw",
            Self::Dword => "dd",
            Self::Qword => "dq",
        }
    }

    /// The reservation directive keyword (`resb`, `resw`, `resd`, `resq`).
    #[must_use]
    pub const fn reserve_directive(self) -> &'static str {
        match self {
            Self::Byte => "resb",
            Self::Word => "resw",
            Self::Dword => "resd",
            Self::Qword => "resq",
        }
    }

    /// Picks a [`DataSize`] from a byte count, rounding up to the nearest
    /// directive width (an 8-byte struct field becomes a `dq`).
    #[must_use]
    pub const fn from_size(bytes: u64) -> Self {
        match bytes {
            1 => Self::Byte,
            2 => Self::Word,
            3 | 4 => Self::Dword,
            _ => Self::Qword,
        }
    }
}

/// One instruction in a [`Section`]. Every operation-shaped variant carries
/// an optional comment that survives peephole rewriting; a comment starting
/// with `@` marks it non-optimizable.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    /// Text the generator could not usefully structure further. Used
    /// sparingly — prefer a typed variant.
    Raw {
        /// The literal instruction text (no leading indentation).
        text: String,
        /// Trailing comment, if any.
        comment: Option<String>,
    },
    /// A label definition. `spaced` requests a blank line before it when
    /// rendered (used at function boundaries).
    Label {
        /// The label's full (already-prefixed) name.
        name: String,
        /// True if this label is externally visible and needs a preceding
        /// `global` directive.
        global: bool,
        /// True to emit a blank line before this label.
        spaced: bool,
    },
    /// `extern NAME`.
    Extern {
        /// The externally-defined symbol.
        name: String,
    },
    /// `global NAME`.
    GlobalDirective {
        /// The symbol being exported.
        name: String,
    },
    /// Initialized data: `LABEL: dq V1, V2, ...`.
    InitializedData {
        /// The label this data is addressed by.
        label: String,
        /// Element width.
        element: DataSize,
        /// Values, in order.
        values: Vec<LiteralValue>,
    },
    /// Zero-initialized reservation: `LABEL: resq N`.
    Reserved {
        /// The label this storage is addressed by.
        label: String,
        /// Element width.
        element: DataSize,
        /// Element count.
        count: u64,
    },
    /// String data: `LABEL: db "...", 0`.
    StringData {
        /// The label this data is addressed by.
        label: String,
        /// The string's raw text (already escape-decoded).
        text: String,
    },
    /// `LABEL equ $ - OF`, used to compute a string's length at assemble
    /// time.
    LengthOf {
        /// The label being defined.
        label: String,
        /// The label being measured from.
        of: String,
    },
    /// `LABEL: dq TARGET` — a pointer-valued global initialized from another
    /// label's address (e.g. a `&Char` global pointing at a deposited string
    /// literal).
    LabelInitializedData {
        /// The label this pointer is addressed by.
        label: String,
        /// The label it points at.
        target: String,
    },
    /// `mov dst, src`.
    Mov {
        /// Destination operand.
        dst: Operand,
        /// Source operand.
        src: Operand,
        /// Trailing comment.
        comment: Option<String>,
    },
    /// `movzx dst, src` — zero-extends a narrower memory or register operand
    /// into a wider destination.
    Movzx {
        /// Destination register (wider than `src`).
        dst: Operand,
        /// Source operand, narrower than `dst`.
        src: Operand,
        /// Trailing comment.
        comment: Option<String>,
    },
    /// `lea dst, src` (src is always a [`MemoryOperand`] wrapped in
    /// [`Operand::Memory`]).
    Lea {
        /// Destination register.
        dst: Operand,
        /// Source memory operand.
        src: Operand,
        /// Trailing comment.
        comment: Option<String>,
    },
    /// `add dst, src`.
    Add {
        /// Destination/accumulator operand.
        dst: Operand,
        /// Source operand.
        src: Operand,
        /// Trailing comment.
        comment: Option<String>,
    },
    /// `sub dst, src`.
    Sub {
        /// Destination/accumulator operand.
        dst: Operand,
        /// Source operand.
        src: Operand,
        /// Trailing comment.
        comment: Option<String>,
    },
    /// `xor dst, src`.
    Xor {
        /// Destination/accumulator operand.
        dst: Operand,
        /// Source operand.
        src: Operand,
        /// Trailing comment.
        comment: Option<String>,
    },
    /// `and dst, src`.
    And {
        /// Destination/accumulator operand.
        dst: Operand,
        /// Source operand.
        src: Operand,
        /// Trailing comment.
        comment: Option<String>,
    },
    /// `or dst, src`.
    Or {
        /// Destination/accumulator operand.
        dst: Operand,
        /// Source operand.
        src: Operand,
        /// Trailing comment.
        comment: Option<String>,
    },
    /// `imul dst, src`.
    Mul {
        /// Destination/accumulator operand.
        dst: Operand,
        /// Source operand.
        src: Operand,
        /// Trailing comment.
        comment: Option<String>,
    },
    /// `idiv src`; the dividend is the implicit `rdx:rax` pair.
    Div {
        /// The divisor operand.
        src: Operand,
        /// Trailing comment.
        comment: Option<String>,
    },
    /// `neg dst`.
    Neg {
        /// The operand negated in place.
        dst: Operand,
        /// Trailing comment.
        comment: Option<String>,
    },
    /// `not dst`.
    Not {
        /// The operand complemented in place.
        dst: Operand,
        /// Trailing comment.
        comment: Option<String>,
    },
    /// `cmp left, right`.
    Cmp {
        /// The left-hand operand.
        left: Operand,
        /// The right-hand operand.
        right: Operand,
        /// Trailing comment.
        comment: Option<String>,
    },
    /// `push src`.
    Push {
        /// The operand pushed.
        src: Operand,
        /// Trailing comment.
        comment: Option<String>,
    },
    /// `pop dst`.
    Pop {
        /// The operand popped into.
        dst: Operand,
        /// Trailing comment.
        comment: Option<String>,
    },
    /// `call TARGET`.
    Call {
        /// The callee's (already-mangled, already-prefixed) label.
        target: String,
        /// Trailing comment.
        comment: Option<String>,
    },
    /// `ret`.
    Ret {
        /// Trailing comment.
        comment: Option<String>,
    },
    /// `leave` (`mov rsp, rbp; pop rbp`, folded by the assembler).
    Leave {
        /// Trailing comment.
        comment: Option<String>,
    },
    /// `syscall`.
    Syscall {
        /// Trailing comment.
        comment: Option<String>,
    },
    /// A conditional or unconditional jump.
    Jump {
        /// The jump's condition flavor.
        kind: JumpKind,
        /// The branch target label.
        target: String,
        /// Trailing comment.
        comment: Option<String>,
    },
}

impl Instruction {
    /// The trailing comment carried by this instruction, if it has one.
    #[must_use]
    pub fn comment(&self) -> Option<&str> {
        match self {
            Self::Raw { comment, .. }
            | Self::Mov { comment, .. }
            | Self::Movzx { comment, .. }
            | Self::Lea { comment, .. }
            | Self::Add { comment, .. }
            | Self::Sub { comment, .. }
            | Self::Xor { comment, .. }
            | Self::And { comment, .. }
            | Self::Or { comment, .. }
            | Self::Mul { comment, .. }
            | Self::Div { comment, .. }
            | Self::Neg { comment, .. }
            | Self::Not { comment, .. }
            | Self::Cmp { comment, .. }
            | Self::Push { comment, .. }
            | Self::Pop { comment, .. }
            | Self::Call { comment, .. }
            | Self::Ret { comment }
            | Self::Leave { comment }
            | Self::Syscall { comment }
            | Self::Jump { comment, .. } => comment.as_deref(),
            Self::Label { .. }
            | Self::Extern { .. }
            | Self::GlobalDirective { .. }
            | Self::InitializedData { .. }
            | Self::Reserved { .. }
            | Self::StringData { .. }
            | Self::LengthOf { .. }
            | Self::LabelInitializedData { .. } => None,
        }
    }

    /// True if a comment starting with `@` marks this instruction as
    /// exempt from peephole rewriting.
    #[must_use]
    pub fn is_non_optimizable(&self) -> bool {
        self.comment().is_some_and(|c| c.starts_with('@'))
    }

    /// The label this instruction defines, if it defines exactly one — used
    /// by extern pruning and by reference-counting passes.
    #[must_use]
    pub fn defines_label(&self) -> Option<&str> {
        match self {
            Self::Label { name, .. }
            | Self::InitializedData { label: name, .. }
            | Self::Reserved { label: name, .. }
            | Self::StringData { label: name, .. }
            | Self::LengthOf { label: name, .. }
            | Self::LabelInitializedData { label: name, .. } => Some(name),
            _ => None,
        }
    }

    /// Every label this instruction *references* (as a call/jump target or
    /// inside a `[rel LBL]` operand) — used by extern pruning.
    #[must_use]
    pub fn references_label(&self, label: &str) -> bool {
        let operand_refs = |op: &Operand| match op {
            Operand::Label(l) => l == label,
            Operand::Memory(MemoryOperand::RelativeLabel(l, _)) => l == label,
            _ => false,
        };
        match self {
            Self::Call { target, .. } | Self::Jump { target, .. } => target == label,
            Self::Mov { dst, src, .. }
            | Self::Movzx { dst, src, .. }
            | Self::Lea { dst, src, .. }
            | Self::Add { dst, src, .. }
            | Self::Sub { dst, src, .. }
            | Self::Xor { dst, src, .. }
            | Self::And { dst, src, .. }
            | Self::Or { dst, src, .. }
            | Self::Mul { dst, src, .. } => operand_refs(dst) || operand_refs(src),
            Self::Push { src, .. } => operand_refs(src),
            Self::Pop { dst, .. } | Self::Neg { dst, .. } | Self::Not { dst, .. } => operand_refs(dst),
            Self::Cmp { left, right, .. } => operand_refs(left) || operand_refs(right),
            Self::Div { src, .. } => operand_refs(src),
            Self::LengthOf { of, .. } => of == label,
            Self::LabelInitializedData { target, .. } => target == label,
            _ => false,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn with_comment(f: &mut fmt::Formatter<'_>, body: &str, comment: Option<&str>) -> fmt::Result {
            match comment {
                Some(c) => write!(f, "  {body} ; {c}"),
                None => write!(f, "  {body}"),
            }
        }

        match self {
            Self::Raw { text, comment } => with_comment(f, text, comment.as_deref()),
            Self::Label { name, .. } => write!(f, "{name}:"),
            Self::Extern { name } => write!(f, "extern {name}"),
            Self::GlobalDirective { name } => write!(f, "global {name}"),
            Self::InitializedData { label, element, values } => {
                let rendered: Vec<String> = values.iter().map(|v| v.render()).collect();
                write!(f, "{label}: {} {}", element.data_directive(), rendered.join(", "))
            }
            Self::Reserved { label, element, count } => {
                write!(f, "{label}: {} {count}", element.reserve_directive())
            }
            Self::StringData { label, text } => write!(f, "{label}: db \"{text}\", 0"),
            Self::LengthOf { label, of } => write!(f, "{label} equ $ - {of}"),
            Self::LabelInitializedData { label, target } => write!(f, "{label}: dq {target}"),
            Self::Mov { dst, src, comment } => with_comment(f, &format!("mov {dst}, {src}"), comment.as_deref()),
            Self::Movzx { dst, src, comment } => with_comment(f, &format!("movzx {dst}, {src}"), comment.as_deref()),
            Self::Lea { dst, src, comment } => with_comment(f, &format!("lea {dst}, {src}"), comment.as_deref()),
            Self::Add { dst, src, comment } => with_comment(f, &format!("add {dst}, {src}"), comment.as_deref()),
            Self::Sub { dst, src, comment } => with_comment(f, &format!("sub {dst}, {src}"), comment.as_deref()),
            Self::Xor { dst, src, comment } => with_comment(f, &format!("xor {dst}, {src}"), comment.as_deref()),
            Self::And { dst, src, comment } => with_comment(f, &format!("and {dst}, {src}"), comment.as_deref()),
            Self::Or { dst, src, comment } => with_comment(f, &format!("or {dst}, {src}"), comment.as_deref()),
            Self::Mul { dst, src, comment } => with_comment(f, &format!("imul {dst}, {src}"), comment.as_deref()),
            Self::Div { src, comment } => with_comment(f, &format!("idiv {src}"), comment.as_deref()),
            Self::Neg { dst, comment } => with_comment(f, &format!("neg {dst}"), comment.as_deref()),
            Self::Not { dst, comment } => with_comment(f, &format!("not {dst}"), comment.as_deref()),
            Self::Cmp { left, right, comment } => {
                with_comment(f, &format!("cmp {left}, {right}"), comment.as_deref())
            }
            Self::Push { src, comment } => with_comment(f, &format!("push {src}"), comment.as_deref()),
            Self::Pop { dst, comment } => with_comment(f, &format!("pop {dst}"), comment.as_deref()),
            Self::Call { target, comment } => with_comment(f, &format!("call {target}"), comment.as_deref()),
            Self::Ret { comment } => with_comment(f, "ret", comment.as_deref()),
            Self::Leave { comment } => with_comment(f, "leave", comment.as_deref()),
            Self::Syscall { comment } => with_comment(f, "syscall", comment.as_deref()),
            Self::Jump { kind, target, comment } => {
                with_comment(f, &format!("{} {target}", kind.mnemonic()), comment.as_deref())
            }
        }
    }
}

/// Which of the four NASM sections an instruction belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectionKind {
    /// `section .text` — code.
    Text,
    /// `section .bss` — zero-initialized storage.
    Bss,
    /// `section .rodata` — read-only initialized storage.
    Rodata,
    /// `section .data` — mutable initialized storage.
    Data,
}

impl SectionKind {
    /// The NASM section directive name.
    #[must_use]
    pub const fn directive(self) -> &'static str {
        match self {
            Self::Text => "section .text",
            Self::Bss => "section .bss",
            Self::Rodata => "section .rodata",
            Self::Data => "section .data",
        }
    }
}

/// An ordered block of instructions belonging to one NASM section.
#[derive(Clone, Debug, Default)]
pub struct Section {
    kind: Option<SectionKind>,
    /// The section's instructions, in emission order.
    pub instructions: Vec<Instruction>,
}

impl Section {
    /// An empty section of the given kind.
    #[must_use]
    pub fn new(kind: SectionKind) -> Self {
        Self { kind: Some(kind), instructions: Vec::new() }
    }

    /// This section's kind.
    ///
    /// # Panics
    /// Panics if called on a default-constructed `Section` that was never
    /// given a kind.
    #[must_use]
    pub fn kind(&self) -> SectionKind {
        self.kind.expect("Section::kind called on an unkinded section")
    }

    /// Appends an instruction.
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// True if this section has no instructions — empty sections are
    /// skipped entirely by the assembly printer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.kind().directive())?;
        for (i, inst) in self.instructions.iter().enumerate() {
            if i > 0 {
                if let Instruction::Label { spaced: true, .. } = inst {
                    writeln!(f)?;
                }
            }
            writeln!(f, "{inst}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mov_renders_with_two_space_indent_and_comment() {
        let inst = Instruction::Mov {
            dst: Operand::reg(Register::Rax, Width::B64),
            src: Operand::Immediate(LiteralValue::Signed(0)),
            comment: Some("zero".into()),
        };
        assert_eq!(inst.to_string(), "  mov rax, 0 ; zero");
    }

    #[test]
    fn non_optimizable_comment_is_detected() {
        let inst = Instruction::Mov {
            dst: Operand::reg(Register::Rax, Width::B64),
            src: Operand::reg(Register::Rax, Width::B64),
            comment: Some("@ stack guard".into()),
        };
        assert!(inst.is_non_optimizable());
    }

    #[test]
    fn rbp_offset_memory_operand_renders_sign() {
        let mem = MemoryOperand::RbpOffset(-8, Width::B64);
        assert_eq!(mem.to_string(), "QWORD [rbp-8]");
        let mem = MemoryOperand::RbpOffset(16, Width::B64);
        assert_eq!(mem.to_string(), "QWORD [rbp+16]");
    }

    #[test]
    fn empty_section_has_no_content_but_still_a_kind() {
        let section = Section::new(SectionKind::Bss);
        assert!(section.is_empty());
        assert_eq!(section.kind(), SectionKind::Bss);
    }

    #[test]
    fn call_references_its_target_label() {
        let inst = Instruction::Call { target: "f_i".into(), comment: None };
        assert!(inst.references_label("f_i"));
        assert!(!inst.references_label("g"));
    }
}
