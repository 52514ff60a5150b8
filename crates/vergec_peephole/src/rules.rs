//! Window-1, window-2, and window-3 peephole rewrite rules.
//! Every rule here is called only on windows that contain no
//! `@`-commented ("non-optimizable") instruction — [`crate::apply_window`]
//! filters those out before a rule ever sees the window.

use vergec_codegen::{Instruction, LiteralValue, MemoryOperand, Operand, Register, Width};

use crate::Rewrite;

/// True if `op` reads the current value of `reg` — used to guard
/// dead-write elimination and the `mov tmp, a; op tmp, b; mov dst, tmp`
/// fold against silently dropping a still-needed read.
fn operand_reads_register(op: &Operand, reg: Register) -> bool {
    match op {
        Operand::Register(r, _) => *r == reg,
        Operand::Memory(mem) => match mem {
            MemoryOperand::Register(r, _) | MemoryOperand::RegisterOffset(r, _, _) => *r == reg,
            MemoryOperand::BaseIndexScale { base, index, .. } => *base == reg || *index == reg,
            MemoryOperand::RbpOffset(..) | MemoryOperand::RelativeLabel(..) => false,
        },
        Operand::Immediate(_) | Operand::Label(_) => false,
    }
}

fn literal_operand(op: &Operand) -> Option<LiteralValue> {
    match op {
        Operand::Immediate(v) => Some(*v),
        _ => None,
    }
}

fn fold_literal(a: LiteralValue, b: LiteralValue, f: impl Fn(i64, i64) -> i64) -> LiteralValue {
    match (a, b) {
        (LiteralValue::Unsigned(x), LiteralValue::Unsigned(y)) => {
            LiteralValue::Unsigned(f(i64::try_from(x).unwrap_or(i64::MAX), i64::try_from(y).unwrap_or(i64::MAX)) as u64)
        }
        (x, y) => {
            let xi = match x {
                LiteralValue::Signed(v) => v,
                LiteralValue::Unsigned(v) => i64::try_from(v).unwrap_or(i64::MAX),
            };
            let yi = match y {
                LiteralValue::Signed(v) => v,
                LiteralValue::Unsigned(v) => i64::try_from(v).unwrap_or(i64::MAX),
            };
            LiteralValue::Signed(f(xi, yi))
        }
    }
}

/// A register that can be encoded without a REX prefix — the "low-half"
/// register set contrasted with `r8`-`r15` when deciding whether a
/// narrower immediate encoding applies.
fn is_low_half(reg: Register) -> bool {
    !matches!(
        reg,
        Register::R8 | Register::R9 | Register::R10 | Register::R11 | Register::R12 | Register::R13 | Register::R14 | Register::R15
    )
}

fn fits_in_i8(value: LiteralValue) -> bool {
    match value {
        LiteralValue::Signed(v) => i8::try_from(v).is_ok(),
        LiteralValue::Unsigned(v) => u8::try_from(v).is_ok(),
    }
}

/// Single-instruction rules: drop `mov r, r`; narrow a `mov r, imm`
/// of a low-half register to its 32-bit sub-encoding when the immediate
/// fits in 8 bits; fold `xor r, r` to its 32-bit encoding.
pub fn try_window1(window: &[Instruction]) -> Option<Rewrite> {
    let [inst] = window else { return None };
    match inst {
        Instruction::Mov { dst: Operand::Register(dr, dw), src: Operand::Register(sr, sw), .. }
            if dr == sr && dw == sw =>
        {
            Some(Rewrite::Delete)
        }
        Instruction::Mov { dst: Operand::Register(reg, Width::B64), src: Operand::Immediate(imm), comment }
            if is_low_half(*reg) && fits_in_i8(*imm) =>
        {
            Some(Rewrite::Replace(vec![Instruction::Mov {
                dst: Operand::Register(*reg, Width::B32),
                src: Operand::Immediate(*imm),
                comment: comment.clone(),
            }]))
        }
        Instruction::Xor { dst: Operand::Register(dr, Width::B64), src: Operand::Register(sr, Width::B64), comment }
            if dr == sr =>
        {
            Some(Rewrite::Replace(vec![Instruction::Xor {
                dst: Operand::Register(*dr, Width::B32),
                src: Operand::Register(*sr, Width::B32),
                comment: comment.clone(),
            }]))
        }
        _ => None,
    }
}

/// Two-instruction rules.
pub fn try_window2(window: &[Instruction]) -> Option<Rewrite> {
    let [first, second] = window else { return None };

    // `mov a, x ; mov b, a` (a is register) -> `mov b, x`.
    if let (
        Instruction::Mov { dst: a1, src: x, comment: c1 },
        Instruction::Mov { dst: b, src: a2, comment: c2 },
    ) = (first, second)
    {
        if matches!(a1, Operand::Register(..)) && a1 == a2 {
            return Some(Rewrite::Replace(vec![Instruction::Mov {
                dst: b.clone(),
                src: x.clone(),
                comment: c2.clone().or_else(|| c1.clone()),
            }]));
        }
    }

    // `mov a, x ; add/sub/imul a, imm` -> `mov a, x op imm`, when x is
    // itself literal-sourced.
    if let Instruction::Mov { dst: a1, src: x, comment: c1 } = first {
        let x_lit = literal_operand(x);
        if let Some(x_lit) = x_lit {
            let folded = match second {
                Instruction::Add { dst: a2, src: imm, comment: c2 } if a1 == a2 => {
                    literal_operand(imm).map(|imm| (fold_literal(x_lit, imm, |p, q| p + q), c2))
                }
                Instruction::Sub { dst: a2, src: imm, comment: c2 } if a1 == a2 => {
                    literal_operand(imm).map(|imm| (fold_literal(x_lit, imm, |p, q| p - q), c2))
                }
                Instruction::Mul { dst: a2, src: imm, comment: c2 } if a1 == a2 => {
                    literal_operand(imm).map(|imm| (fold_literal(x_lit, imm, |p, q| p * q), c2))
                }
                _ => None,
            };
            if let Some((value, c2)) = folded {
                return Some(Rewrite::Replace(vec![Instruction::Mov {
                    dst: a1.clone(),
                    src: Operand::Immediate(value),
                    comment: c2.clone().or_else(|| c1.clone()),
                }]));
            }
        }
    }

    // `lea r, [M] ; mov r, r` — the second instruction is a self-move and
    // contributes nothing.
    if let (Instruction::Lea { dst: r1, .. }, Instruction::Mov { dst: r2, src: r3, .. }) = (first, second) {
        if r2 == r3 && r1 == r2 {
            return Some(Rewrite::Replace(vec![first.clone()]));
        }
    }

    // `push r ; pop r` -> delete both.
    if let (Instruction::Push { src, .. }, Instruction::Pop { dst, .. }) = (first, second) {
        if src == dst {
            return Some(Rewrite::Delete);
        }
    }

    // `mov r, m ; cmp r, n` -> `cmp m, n`, when n doesn't itself read r
    // (codegen never reuses a comparison's scratch register afterwards, so
    // dropping the load here never strands a needed value).
    if let (
        Instruction::Mov { dst: Operand::Register(r, rw), src: m, comment: c1 },
        Instruction::Cmp { left: Operand::Register(cr, cw), right: n, comment: c2 },
    ) = (first, second)
    {
        if r == cr && rw == cw && !operand_reads_register(n, *r) {
            return Some(Rewrite::Replace(vec![Instruction::Cmp {
                left: m.clone(),
                right: n.clone(),
                comment: c2.clone().or_else(|| c1.clone()),
            }]));
        }
    }

    // Dead-write elimination: `mov a, x ; mov a, y` -> `mov a, y`, when y
    // doesn't read a's prior value.
    if let (Instruction::Mov { dst: a1, .. }, Instruction::Mov { dst: a2, src: y, comment: c2 }) = (first, second) {
        if a1 == a2 {
            let reads_prior = match a1 {
                Operand::Register(reg, _) => operand_reads_register(y, *reg),
                _ => true, // memory destinations may alias; leave alone
            };
            if !reads_prior {
                return Some(Rewrite::Replace(vec![Instruction::Mov {
                    dst: a2.clone(),
                    src: y.clone(),
                    comment: c2.clone(),
                }]));
            }
        }
    }

    None
}

/// Three-instruction rules.
pub fn try_window3(window: &[Instruction]) -> Option<Rewrite> {
    let [first, second, third] = window else { return None };

    // `mov tmp, a ; op tmp, b ; mov dst, tmp` -> `op a, b ; mov dst, a`,
    // when `a` is itself a register (so the binary op can target it
    // in place) and `tmp` isn't read again past the fold (it's replaced
    // wholesale by `a`, so this holds as long as `a` and `tmp` differ).
    if let (
        Instruction::Mov { dst: tmp1, src: a, comment: c1 },
        Instruction::Mov { dst, src: tmp3, comment: c3 },
    ) = (first, third)
    {
        if tmp1 == tmp3 && matches!(a, Operand::Register(..)) && a != tmp1 {
            let rewritten = match second {
                Instruction::Add { dst: tmp2, src: b, comment: c2 } if tmp2 == tmp1 => {
                    Some(Instruction::Add { dst: a.clone(), src: b.clone(), comment: c2.clone().or_else(|| c1.clone()) })
                }
                Instruction::Sub { dst: tmp2, src: b, comment: c2 } if tmp2 == tmp1 => {
                    Some(Instruction::Sub { dst: a.clone(), src: b.clone(), comment: c2.clone().or_else(|| c1.clone()) })
                }
                Instruction::Xor { dst: tmp2, src: b, comment: c2 } if tmp2 == tmp1 => {
                    Some(Instruction::Xor { dst: a.clone(), src: b.clone(), comment: c2.clone().or_else(|| c1.clone()) })
                }
                Instruction::And { dst: tmp2, src: b, comment: c2 } if tmp2 == tmp1 => {
                    Some(Instruction::And { dst: a.clone(), src: b.clone(), comment: c2.clone().or_else(|| c1.clone()) })
                }
                Instruction::Or { dst: tmp2, src: b, comment: c2 } if tmp2 == tmp1 => {
                    Some(Instruction::Or { dst: a.clone(), src: b.clone(), comment: c2.clone().or_else(|| c1.clone()) })
                }
                Instruction::Mul { dst: tmp2, src: b, comment: c2 } if tmp2 == tmp1 => {
                    Some(Instruction::Mul { dst: a.clone(), src: b.clone(), comment: c2.clone().or_else(|| c1.clone()) })
                }
                _ => None,
            };
            if let Some(op_inst) = rewritten {
                return Some(Rewrite::Replace(vec![
                    op_inst,
                    Instruction::Mov { dst: dst.clone(), src: a.clone(), comment: c3.clone() },
                ]));
            }
        }
    }

    // `pop a ; push a ; pop b` -> `mov b, a`.
    if let (
        Instruction::Pop { dst: a1, comment: c1 },
        Instruction::Push { src: a2, .. },
        Instruction::Pop { dst: b, comment: c3 },
    ) = (first, second, third)
    {
        if a1 == a2 {
            return Some(Rewrite::Replace(vec![Instruction::Mov {
                dst: b.clone(),
                src: a1.clone(),
                comment: c3.clone().or_else(|| c1.clone()),
            }]));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use vergec_codegen::LiteralValue;

    fn reg_op(r: Register, w: Width) -> Operand {
        Operand::Register(r, w)
    }

    #[test]
    fn self_move_is_dropped() {
        let window = [Instruction::Mov {
            dst: reg_op(Register::Rax, Width::B64),
            src: reg_op(Register::Rax, Width::B64),
            comment: None,
        }];
        assert!(matches!(try_window1(&window), Some(Rewrite::Delete)));
    }

    #[test]
    fn small_immediate_move_narrows_to_32_bit() {
        let window = [Instruction::Mov {
            dst: reg_op(Register::Rax, Width::B64),
            src: Operand::Immediate(LiteralValue::Signed(5)),
            comment: None,
        }];
        let Some(Rewrite::Replace(out)) = try_window1(&window) else { panic!("expected rewrite") };
        assert_eq!(out, vec![Instruction::Mov {
            dst: reg_op(Register::Rax, Width::B32),
            src: Operand::Immediate(LiteralValue::Signed(5)),
            comment: None,
        }]);
    }

    #[test]
    fn r8_is_not_low_half_and_is_left_alone() {
        let window = [Instruction::Mov {
            dst: reg_op(Register::R8, Width::B64),
            src: Operand::Immediate(LiteralValue::Signed(5)),
            comment: None,
        }];
        assert!(try_window1(&window).is_none());
    }

    #[test]
    fn mov_mov_chain_folds_through_register() {
        let window = [
            Instruction::Mov { dst: reg_op(Register::Rcx, Width::B64), src: Operand::Label("lbl".into()), comment: None },
            Instruction::Mov { dst: reg_op(Register::Rax, Width::B64), src: reg_op(Register::Rcx, Width::B64), comment: None },
        ];
        let Some(Rewrite::Replace(out)) = try_window2(&window) else { panic!("expected rewrite") };
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Instruction::Mov { dst, src: Operand::Label(l), .. } if *dst == reg_op(Register::Rax, Width::B64) && l == "lbl"));
    }

    #[test]
    fn literal_add_folds_at_compile_time() {
        let window = [
            Instruction::Mov {
                dst: reg_op(Register::Rax, Width::B64),
                src: Operand::Immediate(LiteralValue::Signed(1)),
                comment: None,
            },
            Instruction::Add {
                dst: reg_op(Register::Rax, Width::B64),
                src: Operand::Immediate(LiteralValue::Signed(2)),
                comment: None,
            },
        ];
        let Some(Rewrite::Replace(out)) = try_window2(&window) else { panic!("expected rewrite") };
        assert_eq!(
            out,
            vec![Instruction::Mov {
                dst: reg_op(Register::Rax, Width::B64),
                src: Operand::Immediate(LiteralValue::Signed(3)),
                comment: None,
            }]
        );
    }

    #[test]
    fn push_pop_same_register_is_deleted() {
        let window = [
            Instruction::Push { src: reg_op(Register::Rbx, Width::B64), comment: None },
            Instruction::Pop { dst: reg_op(Register::Rbx, Width::B64), comment: None },
        ];
        assert!(matches!(try_window2(&window), Some(Rewrite::Delete)));
    }

    #[test]
    fn pop_push_pop_becomes_mov() {
        let window = [
            Instruction::Pop { dst: reg_op(Register::Rax, Width::B64), comment: None },
            Instruction::Push { src: reg_op(Register::Rax, Width::B64), comment: None },
            Instruction::Pop { dst: reg_op(Register::Rbx, Width::B64), comment: None },
        ];
        let Some(Rewrite::Replace(out)) = try_window3(&window) else { panic!("expected rewrite") };
        assert_eq!(
            out,
            vec![Instruction::Mov { dst: reg_op(Register::Rbx, Width::B64), src: reg_op(Register::Rax, Width::B64), comment: None }]
        );
    }

    #[test]
    fn mov_op_mov_through_temp_folds_into_operand() {
        let window = [
            Instruction::Mov { dst: reg_op(Register::Rcx, Width::B64), src: reg_op(Register::Rax, Width::B64), comment: None },
            Instruction::Add {
                dst: reg_op(Register::Rcx, Width::B64),
                src: Operand::Immediate(LiteralValue::Signed(4)),
                comment: None,
            },
            Instruction::Mov { dst: reg_op(Register::Rbx, Width::B64), src: reg_op(Register::Rcx, Width::B64), comment: None },
        ];
        let Some(Rewrite::Replace(out)) = try_window3(&window) else { panic!("expected rewrite") };
        assert_eq!(out.len(), 2);
        assert!(matches!(&out[0], Instruction::Add { dst, .. } if *dst == reg_op(Register::Rax, Width::B64)));
        assert!(matches!(&out[1], Instruction::Mov { dst, src, .. } if *dst == reg_op(Register::Rbx, Width::B64) && *src == reg_op(Register::Rax, Width::B64)));
    }
}
