//! The sixteen general-purpose integer registers and their sub-width names.
//!
//! Grounded on spec.md §4.5's "System-V-AMD64 integer subset" calling
//! convention and §3's Location "register (by index; 8/16/32/64-bit
//! sub-encoding)".

use std::fmt;

/// A general-purpose 64-bit integer register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Register {
    /// Return-value / dividend register; also used by `idiv`.
    Rax,
    /// Callee-saved.
    Rbx,
    /// 4th integer argument.
    Rcx,
    /// 3rd integer argument; high half of a 128-bit `idiv` result.
    Rdx,
    /// 2nd integer argument.
    Rsi,
    /// 1st integer argument.
    Rdi,
    /// Frame base pointer, callee-saved.
    Rbp,
    /// Stack pointer.
    Rsp,
    /// 5th integer argument.
    R8,
    /// 6th integer argument.
    R9,
    /// Caller-saved scratch, no ABI role.
    R10,
    /// Caller-saved scratch, no ABI role.
    R11,
    /// Callee-saved.
    R12,
    /// Callee-saved.
    R13,
    /// Callee-saved.
    R14,
    /// Callee-saved.
    R15,
}

impl Register {
    /// The first six System-V-AMD64 integer argument registers, in order.
    pub const ARGUMENT_REGISTERS: [Register; 6] =
        [Register::Rdi, Register::Rsi, Register::Rdx, Register::Rcx, Register::R8, Register::R9];

    /// The registers this code generator draws scratch values from. `Rax`
    /// is excluded (reserved for return values and `idiv`'s dividend);
    /// `Rbp`/`Rsp` are excluded (frame bookkeeping).
    pub const SCRATCH_POOL: [Register; 13] = [
        Register::Rcx,
        Register::Rdx,
        Register::Rsi,
        Register::Rdi,
        Register::R8,
        Register::R9,
        Register::R10,
        Register::R11,
        Register::Rbx,
        Register::R12,
        Register::R13,
        Register::R14,
        Register::R15,
    ];

    /// True for `Rbx`, `Rbp`, `R12`-`R15`: must be preserved across a call
    /// by the callee, per spec.md §4.5's calling-convention paragraph.
    #[must_use]
    pub const fn is_callee_saved(self) -> bool {
        matches!(self, Self::Rbx | Self::Rbp | Self::R12 | Self::R13 | Self::R14 | Self::R15)
    }

    /// Renders this register at a given operand width, e.g. `Rax` at
    /// [`Width::B32`] is `eax`.
    #[must_use]
    pub const fn name(self, width: Width) -> &'static str {
        use Width::{B16, B32, B64, B8};
        match (self, width) {
            (Self::Rax, B64) => "rax",
            (Self::Rax, B32) => "eax",
            (Self::Rax, B16) => "ax",
            (Self::Rax, B8) => "al",
            (Self::Rbx, B64) => "rbx",
            (Self::Rbx, B32) => "ebx",
            (Self::Rbx, B16) => "bx",
            (Self::Rbx, B8) => "bl",
            (Self::Rcx, B64) => "rcx",
            (Self::Rcx, B32) => "ecx",
            (Self::Rcx, B16) => "cx",
            (Self::Rcx, B8) => "cl",
            (Self::Rdx, B64) => "rdx",
            (Self::Rdx, B32) => "edx",
            (Self::Rdx, B16) => "dx",
            (Self::Rdx, B8) => "dl",
            (Self::Rsi, B64) => "rsi",
            (Self::Rsi, B32) => "esi",
            (Self::Rsi, B16) => "si",
            (Self::Rsi, B8) => "sil",
            (Self::Rdi, B64) => "rdi",
            (Self::Rdi, B32) => "edi",
            (Self::Rdi, B16) => "di",
            (Self::Rdi, B8) => "dil",
            (Self::Rbp, B64) => "rbp",
            (Self::Rbp, B32) => "ebp",
            (Self::Rbp, B16) => "bp",
            (Self::Rbp, B8) => "bpl",
            (Self::Rsp, B64) => "rsp",
            (Self::Rsp, B32) => "esp",
            (Self::Rsp, B16) => "sp",
            (Self::Rsp, B8) => "spl",
            (Self::R8, B64) => "r8",
            (Self::R8, B32) => "r8d",
            (Self::R8, B16) => "r8w",
            (Self::R8, B8) => "r8b",
            (Self::R9, B64) => "r9",
            (Self::R9, B32) => "r9d",
            (Self::R9, B16) => "r9w",
            (Self::R9, B8) => "r9b",
            (Self::R10, B64) => "r10",
            (Self::R10, B32) => "r10d",
            (Self::R10, B16) => "r10w",
            (Self::R10, B8) => "r10b",
            (Self::R11, B64) => "r11",
            (Self::R11, B32) => "r11d",
            (Self::R11, B16) => "r11w",
            (Self::R11, B8) => "r11b",
            (Self::R12, B64) => "r12",
            (Self::R12, B32) => "r12d",
            (Self::R12, B16) => "r12w",
            (Self::R12, B8) => "r12b",
            (Self::R13, B64) => "r13",
            (Self::R13, B32) => "r13d",
            (Self::R13, B16) => "r13w",
            (Self::R13, B8) => "r13b",
            (Self::R14, B64) => "r14",
            (Self::R14, B32) => "r14d",
            (Self::R14, B16) => "r14w",
            (Self::R14, B8) => "r14b",
            (Self::R15, B64) => "r15",
            (Self::R15, B32) => "r15d",
            (Self::R15, B16) => "r15w",
            (Self::R15, B8) => "r15b",
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name(Width::B64))
    }
}

/// An operand width, chosen from a value's byte size at the point it's
/// emitted (spec.md §4.5's "the operand size is resolved at emission
/// time").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Width {
    /// 1 byte.
    B8,
    /// 2 bytes.
    B16,
    /// 4 bytes.
    B32,
    /// 8 bytes.
    B64,
}

impl Width {
    /// Picks the narrowest width that can hold `size_bytes`, defaulting to
    /// [`Width::B64`] for anything wider than 8 (struct-typed values never
    /// live directly in a register operand; the caller should be
    /// addressing them by pointer instead).
    #[must_use]
    pub const fn from_size(size_bytes: u64) -> Self {
        match size_bytes {
            1 => Self::B8,
            2 => Self::B16,
            3 | 4 => Self::B32,
            _ => Self::B64,
        }
    }

    /// The NASM size-override keyword for a memory operand of this width.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::B8 => "BYTE",
            Self::B16 => "WORD",
            Self::B32 => "DWORD",
            Self::B64 => "QWORD",
        }
    }
}
