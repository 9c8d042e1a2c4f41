//! Status register transfers.

use armlet_arch::reg::Mode;
use armlet_arch::Word;

use super::{operand2, Insn, Kind};
use crate::cpu::{Cpu, Error, Result, Step};

/// Thumb bit, forced clear on this machine.
const T_BIT: Word = 1 << 5;

pub(super) fn exec(cpu: &mut Cpu, insn: &Insn) -> Result<Step> {
    match insn.kind {
        Kind::Mrs { spsr, rd } => {
            let value = if spsr {
                // Reading a missing SPSR yields the CPSR.
                cpu.reg.spsr().unwrap_or_else(|| cpu.reg.cpsr.bits())
            } else {
                cpu.reg.cpsr.bits()
            };
            cpu.reg.set(usize::from(rd), value);
        }
        Kind::Msr { spsr, mask, op2 } => {
            let value = operand2(cpu, op2).value;
            let mut select: Word = 0;
            for (bit, field) in [(0u8, 0xff), (1, 0xff00), (2, 0x00ff_0000), (3, 0xff00_0000)] {
                if mask >> bit & 1 != 0 {
                    select |= field;
                }
            }
            if spsr {
                if let Some(current) = cpu.reg.spsr() {
                    cpu.reg.set_spsr(current & !select | value & select);
                }
            } else {
                let next = (cpu.reg.cpsr.bits() & !select | value & select) & !T_BIT;
                if select & 0xff != 0 {
                    // The control field may change mode; validate and swap
                    // the register banks before committing.
                    let mode = Mode::from_bits(next).ok_or(Error::Mode {
                        addr: insn.addr,
                        bits: next & 0x1f,
                    })?;
                    cpu.reg.set_mode(mode);
                }
                cpu.reg.cpsr.set_bits(next);
            }
        }
        _ => unreachable!(),
    }
    Ok(Step::Done)
}
