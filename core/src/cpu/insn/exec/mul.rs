//! Multiply instructions.
//!
//! The `S` variants set N and Z from the result; C and V are left unchanged
//! for determinism.

use armlet_arch::reg::Flag;
use armlet_arch::Word;

use super::{Insn, Kind};
use crate::cpu::{Cpu, Result, Step};

pub(super) fn exec(cpu: &mut Cpu, insn: &Insn) -> Result<Step> {
    match insn.kind {
        Kind::Mul {
            acc,
            s,
            rd,
            rn,
            rs,
            rm,
        } => {
            let mut value = cpu
                .reg
                .get(usize::from(rm))
                .wrapping_mul(cpu.reg.get(usize::from(rs)));
            if acc {
                value = value.wrapping_add(cpu.reg.get(usize::from(rn)));
            }
            cpu.reg.set(usize::from(rd), value);
            if s {
                cpu.reg.cpsr.set(Flag::N, value >> 31 != 0);
                cpu.reg.cpsr.set(Flag::Z, value == 0);
            }
        }
        Kind::MulLong {
            signed,
            acc,
            s,
            rdhi,
            rdlo,
            rs,
            rm,
        } => {
            let a = cpu.reg.get(usize::from(rm));
            let b = cpu.reg.get(usize::from(rs));
            let mut value = if signed {
                (i64::from(a as i32) * i64::from(b as i32)) as u64
            } else {
                u64::from(a) * u64::from(b)
            };
            if acc {
                let prior =
                    u64::from(cpu.reg.get(usize::from(rdhi))) << 32 | u64::from(cpu.reg.get(usize::from(rdlo)));
                value = value.wrapping_add(prior);
            }
            cpu.reg.set(usize::from(rdlo), value as Word);
            cpu.reg.set(usize::from(rdhi), (value >> 32) as Word);
            if s {
                cpu.reg.cpsr.set(Flag::N, value >> 63 != 0);
                cpu.reg.cpsr.set(Flag::Z, value == 0);
            }
        }
        _ => unreachable!(),
    }
    Ok(Step::Done)
}
