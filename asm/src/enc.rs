//! Instruction encoder.
//!
//! Second-pass translation of a parsed [`Stmt`] into its 32-bit encoding,
//! with the full symbol table in hand. Immediates that do not fit the
//! 8-bit-with-rotation form are retried through the architectural twin
//! (`MOV`/`MVN`, `ADD`/`SUB`, `CMP`/`CMN`, `AND`/`BIC`) before being
//! rejected.

use armlet_arch::Word;
use armlet_core::cpu::insn::{AluOp, ShiftOp};
use indexmap::IndexMap;

use crate::parse::{Arg, BlockMode, Expr, MemOff, Mn, Root, ShiftAmt, Size, Stmt};
use crate::Note;

/// Symbol table used during encoding.
pub(crate) type Syms = IndexMap<String, i64>;

/// Encoding context for one statement.
pub(crate) struct Ctx<'a> {
    /// Address of the instruction.
    pub addr: Word,
    /// Source line, for diagnostics.
    pub line: u32,
    /// Complete symbol table.
    pub syms: &'a Syms,
    /// Address of the statement's literal-pool slot, if it has one.
    pub lit: Option<Word>,
}

impl Ctx<'_> {
    fn fail(&self, msg: impl Into<String>) -> Note {
        Note::new(self.line, 1, msg.into())
    }

    fn eval(&self, expr: &Expr) -> Result<i64, Note> {
        expr.eval(self.syms).map_err(|msg| self.fail(msg))
    }
}

/// Encodes one statement.
pub(crate) fn encode(stmt: &Stmt, ctx: &Ctx) -> Result<Word, Note> {
    let cond = stmt.mn.cond.bits() << 28;
    let word = match stmt.mn.root {
        Root::Dp(op) => dp(stmt, op, ctx)?,
        Root::Mul { acc } => mul(stmt, acc, ctx)?,
        Root::MulLong { signed, acc } => mul_long(stmt, signed, acc, ctx)?,
        Root::Ldr => transfer(stmt, true, ctx)?,
        Root::Str => transfer(stmt, false, ctx)?,
        Root::Ldm => block(stmt, true, ctx)?,
        Root::Stm => block(stmt, false, ctx)?,
        Root::B { link } => branch(stmt, link, ctx)?,
        Root::Bx { link } => {
            let [Arg::Reg(rm)] = stmt.args[..] else {
                return Err(ctx.fail("expected `BX Rm`"));
            };
            0x012f_ff10 | u32::from(link) << 5 | Word::from(rm)
        }
        Root::Mrs => {
            let [Arg::Reg(rd), Arg::Psr { spsr, .. }] = stmt.args[..] else {
                return Err(ctx.fail("expected `MRS Rd, CPSR|SPSR`"));
            };
            0x010f_0000 | Word::from(spsr) << 22 | Word::from(rd) << 12
        }
        Root::Msr => msr(stmt, ctx)?,
        Root::Swp => {
            let [Arg::Reg(rd), Arg::Reg(rm), Arg::Mem {
                base,
                off: MemOff::None,
                ..
            }] = stmt.args[..]
            else {
                return Err(ctx.fail("expected `SWP Rd, Rm, [Rn]`"));
            };
            let byte = u32::from(stmt.mn.size == Size::Byte);
            0x0100_0090 | byte << 22 | Word::from(base) << 16 | Word::from(rd) << 12 | Word::from(rm)
        }
        Root::Swi => {
            let imm = match &stmt.args[..] {
                [Arg::Imm(expr) | Arg::Expr(expr)] => ctx.eval(expr)?,
                [] => 0,
                _ => return Err(ctx.fail("expected `SWI #imm`")),
            };
            if !(0..=0x00ff_ffff).contains(&imm) {
                return Err(ctx.fail("SWI number out of range"));
            }
            0x0f00_0000 | imm as Word
        }
        Root::Push => {
            let [Arg::RegList { list, .. }] = stmt.args[..] else {
                return Err(ctx.fail("expected `PUSH {list}`"));
            };
            0x092d_0000 | Word::from(list)
        }
        Root::Pop => {
            let [Arg::RegList { list, .. }] = stmt.args[..] else {
                return Err(ctx.fail("expected `POP {list}`"));
            };
            0x08bd_0000 | Word::from(list)
        }
        Root::Nop => 0x01a0_0000,
        Root::Adr => adr(stmt, ctx)?,
    };
    Ok(cond | word)
}

/// Finds the 8-bit immediate and even rotation encoding a value.
fn imm_rotate(value: Word) -> Option<Word> {
    (0..16).find_map(|rot| {
        let rotated = value.rotate_left(2 * rot);
        (rotated <= 0xff).then(|| rot << 8 | rotated)
    })
}

/// Data processing, with immediate-twin fallbacks.
fn dp(stmt: &Stmt, op: AluOp, ctx: &Ctx) -> Result<Word, Note> {
    let (rd, rn, op2) = match (&stmt.args[..], op.is_test(), op.is_unary()) {
        ([Arg::Reg(rd), op2], false, true) => (*rd, 0, op2),
        ([Arg::Reg(rn), op2], true, false) => (0, *rn, op2),
        ([Arg::Reg(rd), Arg::Reg(rn), op2], false, false) => (*rd, *rn, op2),
        // Two-operand shorthand: `ADD R0, #1`.
        ([Arg::Reg(rd), op2 @ Arg::Imm(_)], false, false) => (*rd, *rd, op2),
        _ => return Err(ctx.fail(format!("bad operands for {op:?}"))),
    };
    let s = stmt.mn.s || op.is_test();
    let base = |op: AluOp| {
        op.bits() << 21 | Word::from(s) << 20 | Word::from(rn) << 16 | Word::from(rd) << 12
    };
    match op2 {
        Arg::Imm(expr) => {
            let value = ctx.eval(expr)? as Word;
            if let Some(imm) = imm_rotate(value) {
                return Ok(1 << 25 | base(op) | imm);
            }
            // Retry through the architectural twin.
            let twin = match op {
                AluOp::Mov => Some((AluOp::Mvn, !value)),
                AluOp::Mvn => Some((AluOp::Mov, !value)),
                AluOp::And => Some((AluOp::Bic, !value)),
                AluOp::Bic => Some((AluOp::And, !value)),
                AluOp::Add => Some((AluOp::Sub, value.wrapping_neg())),
                AluOp::Sub => Some((AluOp::Add, value.wrapping_neg())),
                AluOp::Cmp => Some((AluOp::Cmn, value.wrapping_neg())),
                AluOp::Cmn => Some((AluOp::Cmp, value.wrapping_neg())),
                _ => None,
            };
            if let Some((op, value)) = twin {
                if let Some(imm) = imm_rotate(value) {
                    return Ok(1 << 25 | base(op) | imm);
                }
            }
            Err(ctx.fail(format!("immediate {value:#x} cannot be encoded")))
        }
        Arg::Reg(rm) => Ok(base(op) | Word::from(*rm)),
        Arg::Shifted { rm, op: shop, amount } => {
            Ok(base(op) | shift_bits(*shop, amount, ctx)? | Word::from(*rm))
        }
        _ => Err(ctx.fail("bad second operand")),
    }
}

/// Encodes shift bits [11:4] for a shifted register operand.
fn shift_bits(op: ShiftOp, amount: &ShiftAmt, ctx: &Ctx) -> Result<Word, Note> {
    match amount {
        ShiftAmt::Rrx => Ok(ShiftOp::Ror.bits() << 5),
        ShiftAmt::Reg(rs) => Ok(Word::from(*rs) << 8 | op.bits() << 5 | 1 << 4),
        ShiftAmt::Imm(expr) => {
            let value = ctx.eval(expr)?;
            let field = match (op, value) {
                (ShiftOp::Lsl, 0..=31) => value as Word,
                (ShiftOp::Lsr | ShiftOp::Asr, 1..=31) => value as Word,
                // LSR/ASR #32 encode as amount zero.
                (ShiftOp::Lsr | ShiftOp::Asr, 32) => 0,
                (ShiftOp::Ror, 1..=31) => value as Word,
                _ => return Err(ctx.fail(format!("shift amount {value} out of range"))),
            };
            Ok(field << 7 | op.bits() << 5)
        }
    }
}

fn mul(stmt: &Stmt, acc: bool, ctx: &Ctx) -> Result<Word, Note> {
    let s = Word::from(stmt.mn.s) << 20;
    match (acc, &stmt.args[..]) {
        (false, [Arg::Reg(rd), Arg::Reg(rm), Arg::Reg(rs)]) => Ok(s
            | Word::from(*rd) << 16
            | Word::from(*rs) << 8
            | 0x90
            | Word::from(*rm)),
        (true, [Arg::Reg(rd), Arg::Reg(rm), Arg::Reg(rs), Arg::Reg(rn)]) => Ok(1 << 21
            | s
            | Word::from(*rd) << 16
            | Word::from(*rn) << 12
            | Word::from(*rs) << 8
            | 0x90
            | Word::from(*rm)),
        _ => Err(ctx.fail("bad operands for multiply")),
    }
}

fn mul_long(stmt: &Stmt, signed: bool, acc: bool, ctx: &Ctx) -> Result<Word, Note> {
    let [Arg::Reg(rdlo), Arg::Reg(rdhi), Arg::Reg(rm), Arg::Reg(rs)] = stmt.args[..] else {
        return Err(ctx.fail("expected `RdLo, RdHi, Rm, Rs`"));
    };
    Ok(1 << 23
        | Word::from(signed) << 22
        | Word::from(acc) << 21
        | Word::from(stmt.mn.s) << 20
        | Word::from(rdhi) << 16
        | Word::from(rdlo) << 12
        | Word::from(rs) << 8
        | 0x90
        | Word::from(rm))
}

/// Single and halfword transfers, including the `=literal` and bare-label
/// PC-relative forms.
fn transfer(stmt: &Stmt, load: bool, ctx: &Ctx) -> Result<Word, Note> {
    let [Arg::Reg(rd), ref place] = stmt.args[..] else {
        return Err(ctx.fail("expected `Rd, <address>`"));
    };
    let halfish = matches!(stmt.mn.size, Size::Half | Size::SByte | Size::SHalf);
    match place {
        Arg::Mem { base, off, pre, wb } => {
            if halfish {
                transfer_hs(stmt, load, rd, *base, off, *pre, *wb, ctx)
            } else {
                transfer_word(stmt, load, rd, *base, off, *pre, *wb, ctx)
            }
        }
        Arg::Literal(_) | Arg::Expr(_) => {
            // PC-relative: the target is a pool slot or a label.
            let target = match place {
                Arg::Literal(_) => ctx
                    .lit
                    .ok_or_else(|| ctx.fail("literal pool slot missing"))?,
                Arg::Expr(expr) => ctx.eval(expr)? as Word,
                _ => unreachable!(),
            };
            let diff = i64::from(target) - i64::from(ctx.addr) - 8;
            let off = MemOff::Imm(Expr::Num(diff));
            if halfish {
                transfer_hs(stmt, load, rd, 15, &off, true, false, ctx)
            } else {
                transfer_word(stmt, load, rd, 15, &off, true, false, ctx)
            }
        }
        _ => Err(ctx.fail("expected an address operand")),
    }
}

#[allow(clippy::too_many_arguments)]
fn transfer_word(
    stmt: &Stmt,
    load: bool,
    rd: u8,
    base: u8,
    off: &MemOff,
    pre: bool,
    wb: bool,
    ctx: &Ctx,
) -> Result<Word, Note> {
    let mut word = 1 << 26
        | Word::from(pre) << 24
        | Word::from(wb) << 21
        | Word::from(load) << 20
        | Word::from(base) << 16
        | Word::from(rd) << 12;
    if stmt.mn.size == Size::Byte {
        word |= 1 << 22;
    }
    match off {
        MemOff::None => {
            word |= 1 << 23;
        }
        MemOff::Imm(expr) => {
            let value = ctx.eval(expr)?;
            let (up, magnitude) = if value < 0 { (false, -value) } else { (true, value) };
            if magnitude > 0xfff {
                return Err(ctx.fail(format!("offset {value} out of range (max 4095)")));
            }
            word |= Word::from(up) << 23 | magnitude as Word;
        }
        MemOff::Reg { neg, rm, shift } => {
            word |= 1 << 25 | Word::from(!neg) << 23 | Word::from(*rm);
            if let Some((op, amount)) = shift {
                word |= shift_bits(*op, &ShiftAmt::Imm(amount.clone()), ctx)?;
            }
        }
    }
    Ok(word)
}

#[allow(clippy::too_many_arguments)]
fn transfer_hs(
    stmt: &Stmt,
    load: bool,
    rd: u8,
    base: u8,
    off: &MemOff,
    pre: bool,
    wb: bool,
    ctx: &Ctx,
) -> Result<Word, Note> {
    let sh = match (stmt.mn.size, load) {
        (Size::Half, _) => 0b01,
        (Size::SByte, true) => 0b10,
        (Size::SHalf, true) => 0b11,
        _ => return Err(ctx.fail("signed stores do not exist")),
    };
    let mut word = Word::from(pre) << 24
        | Word::from(wb) << 21
        | Word::from(load) << 20
        | Word::from(base) << 16
        | Word::from(rd) << 12
        | sh << 5
        | 0x90;
    match off {
        MemOff::None => {
            word |= 1 << 23 | 1 << 22;
        }
        MemOff::Imm(expr) => {
            let value = ctx.eval(expr)?;
            let (up, magnitude) = if value < 0 { (false, -value) } else { (true, value) };
            if magnitude > 0xff {
                return Err(ctx.fail(format!("offset {value} out of range (max 255)")));
            }
            let magnitude = magnitude as Word;
            word |= 1 << 22 | Word::from(up) << 23 | (magnitude & 0xf0) << 4 | magnitude & 0xf;
        }
        MemOff::Reg { neg, rm, shift } => {
            if shift.is_some() {
                return Err(ctx.fail("halfword transfers take unshifted offsets"));
            }
            word |= Word::from(!neg) << 23 | Word::from(*rm);
        }
    }
    Ok(word)
}

fn block(stmt: &Stmt, load: bool, ctx: &Ctx) -> Result<Word, Note> {
    let (rn, wb, list, caret) = match stmt.args[..] {
        [Arg::Reg(rn), Arg::RegList { list, caret }] => (rn, false, list, caret),
        [Arg::RegWb(rn), Arg::RegList { list, caret }] => (rn, true, list, caret),
        _ => return Err(ctx.fail("expected `Rn{!}, {list}`")),
    };
    if list == 0 {
        return Err(ctx.fail("empty register list"));
    }
    let BlockMode { pre, up } = stmt.mn.mode.unwrap_or(BlockMode {
        pre: false,
        up: true,
    });
    Ok(1 << 27
        | Word::from(pre) << 24
        | Word::from(up) << 23
        | Word::from(caret) << 22
        | Word::from(wb) << 21
        | Word::from(load) << 20
        | Word::from(rn) << 16
        | Word::from(list))
}

fn branch(stmt: &Stmt, link: bool, ctx: &Ctx) -> Result<Word, Note> {
    let [Arg::Expr(ref expr)] = stmt.args[..] else {
        return Err(ctx.fail("expected a branch target"));
    };
    let target = ctx.eval(expr)? as Word;
    let diff = i64::from(target) - i64::from(ctx.addr) - 8;
    if diff % 4 != 0 {
        return Err(ctx.fail("branch target is not word-aligned"));
    }
    let words = diff / 4;
    if !(-0x0080_0000..0x0080_0000).contains(&words) {
        return Err(ctx.fail("branch target out of range"));
    }
    Ok(0x0a00_0000 | Word::from(link) << 24 | (words as Word & 0x00ff_ffff))
}

fn msr(stmt: &Stmt, ctx: &Ctx) -> Result<Word, Note> {
    let [Arg::Psr { spsr, mask }, ref src] = stmt.args[..] else {
        return Err(ctx.fail("expected `MSR psr, source`"));
    };
    let base = Word::from(spsr) << 22 | Word::from(mask) << 16 | 0xf000;
    match src {
        Arg::Reg(rm) => Ok(0x0120_0000 | base | Word::from(*rm)),
        Arg::Imm(expr) => {
            let value = ctx.eval(expr)? as Word;
            let imm = imm_rotate(value)
                .ok_or_else(|| ctx.fail(format!("immediate {value:#x} cannot be encoded")))?;
            Ok(0x0320_0000 | base | imm)
        }
        _ => Err(ctx.fail("bad MSR source")),
    }
}

fn adr(stmt: &Stmt, ctx: &Ctx) -> Result<Word, Note> {
    let [Arg::Reg(rd), Arg::Expr(ref expr)] = stmt.args[..] else {
        return Err(ctx.fail("expected `ADR Rd, label`"));
    };
    let target = ctx.eval(expr)?;
    let diff = target - i64::from(ctx.addr) - 8;
    let (op, magnitude) = if diff < 0 {
        (AluOp::Sub, -diff)
    } else {
        (AluOp::Add, diff)
    };
    let imm = imm_rotate(magnitude as Word)
        .ok_or_else(|| ctx.fail(format!("address offset {diff} cannot be encoded")))?;
    Ok(1 << 25 | op.bits() << 21 | 0xf << 16 | Word::from(rd) << 12 | imm)
}
