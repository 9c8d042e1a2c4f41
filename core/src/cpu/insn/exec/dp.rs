//! Data-processing instructions.

use armlet_arch::reg::{Flag, Mode};
use armlet_arch::Word;

use super::{adc, operand2, Insn, Kind};
use crate::cpu::{Cpu, Error, Result, Step};
use crate::cpu::insn::AluOp;

pub(super) fn exec(cpu: &mut Cpu, insn: &Insn) -> Result<Step> {
    let Kind::Data { op, s, rn, rd, op2 } = insn.kind else {
        unreachable!()
    };
    let shifted = operand2(cpu, op2);
    let a = cpu.reg.get(usize::from(rn));
    let b = shifted.value;
    let c = Word::from(cpu.reg.cpsr.test(Flag::C));

    // Logical results take C from the shifter and leave V alone;
    // arithmetic results take both from the adder.
    let (value, carry, overflow) = match op {
        AluOp::And | AluOp::Tst => logical(a & b, shifted.carry),
        AluOp::Eor | AluOp::Teq => logical(a ^ b, shifted.carry),
        AluOp::Orr => logical(a | b, shifted.carry),
        AluOp::Bic => logical(a & !b, shifted.carry),
        AluOp::Mov => logical(b, shifted.carry),
        AluOp::Mvn => logical(!b, shifted.carry),
        AluOp::Sub | AluOp::Cmp => arith(adc(a, !b, 1)),
        AluOp::Rsb => arith(adc(b, !a, 1)),
        AluOp::Add | AluOp::Cmn => arith(adc(a, b, 0)),
        AluOp::Adc => arith(adc(a, b, c)),
        AluOp::Sbc => arith(adc(a, !b, c)),
        AluOp::Rsc => arith(adc(b, !a, c)),
    };

    if !op.is_test() {
        cpu.reg.set(usize::from(rd), value);
    }
    if s {
        if rd == 15 && !op.is_test() {
            // Exception return: restore CPSR from SPSR.
            return restore(cpu, insn, value);
        }
        cpu.reg.cpsr.set(Flag::N, value >> 31 != 0);
        cpu.reg.cpsr.set(Flag::Z, value == 0);
        cpu.reg.cpsr.set(Flag::C, carry);
        if let Some(overflow) = overflow {
            cpu.reg.cpsr.set(Flag::V, overflow);
        }
    }
    Ok(Step::Done)
}

fn logical(value: Word, carry: bool) -> (Word, bool, Option<bool>) {
    (value, carry, None)
}

fn arith((value, carry, overflow): (Word, bool, bool)) -> (Word, bool, Option<bool>) {
    (value, carry, Some(overflow))
}

/// Restores the CPSR from the current mode's SPSR after a write to R15.
fn restore(cpu: &mut Cpu, insn: &Insn, _value: Word) -> Result<Step> {
    if let Some(spsr) = cpu.reg.spsr() {
        let mode = Mode::from_bits(spsr).ok_or(Error::Mode {
            addr: insn.addr,
            bits: spsr & 0x1f,
        })?;
        cpu.reg.set_mode(mode);
        cpu.reg.cpsr.set_bits(spsr);
    }
    Ok(Step::Done)
}
