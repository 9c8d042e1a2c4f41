//! Block data transfers.

use armlet_arch::mem::Width;
use armlet_arch::reg::Mode;
use armlet_arch::Word;

use super::{Insn, Kind};
use crate::cpu::{Cpu, Error, Result, Step};

pub(super) fn exec(cpu: &mut Cpu, insn: &Insn) -> Result<Step> {
    let Kind::Block {
        load,
        pre,
        up,
        s,
        wb,
        rn,
        list,
    } = insn.kind
    else {
        unreachable!()
    };
    if list == 0 {
        return Err(Error::Invalid {
            addr: insn.addr,
            code: insn.code,
        });
    }
    let base = cpu.reg.get(usize::from(rn));
    let count = 4 * list.count_ones();
    // The lowest-numbered register always occupies the lowest address.
    let lowest = match (pre, up) {
        (false, true) => base,
        (true, true) => base.wrapping_add(4),
        (false, false) => base.wrapping_sub(count).wrapping_add(4),
        (true, false) => base.wrapping_sub(count),
    };
    let updated = if up {
        base.wrapping_add(count)
    } else {
        base.wrapping_sub(count)
    };
    let lowest_reg = (0..16).find(|idx| list >> idx & 1 != 0);

    let mut addr = lowest;
    if load {
        let mut to_pc = None;
        for idx in 0..16 {
            if list >> idx & 1 == 0 {
                continue;
            }
            let value = cpu.mem.read(addr, Width::Word)?;
            if idx == 15 {
                to_pc = Some(value);
            } else {
                cpu.reg.set(idx, value);
            }
            addr = addr.wrapping_add(4);
        }
        // A loaded base wins over the writeback.
        if wb && list >> rn & 1 == 0 {
            cpu.reg.set(usize::from(rn), updated);
        }
        if let Some(value) = to_pc {
            if s {
                // Exception return variant: restore CPSR from SPSR.
                if let Some(spsr) = cpu.reg.spsr() {
                    let mode = Mode::from_bits(spsr).ok_or(Error::Mode {
                        addr: insn.addr,
                        bits: spsr & 0x1f,
                    })?;
                    cpu.reg.set_mode(mode);
                    cpu.reg.cpsr.set_bits(spsr);
                }
            }
            cpu.reg.set_pc(value);
        }
    } else {
        for idx in 0..16 {
            if list >> idx & 1 == 0 {
                continue;
            }
            let value = if idx == usize::from(rn) && wb {
                // Base in a store list: the original base is stored when it
                // is the lowest listed register, the updated base otherwise.
                if lowest_reg == Some(idx) {
                    base
                } else {
                    updated
                }
            } else {
                cpu.reg.get(idx)
            };
            cpu.mem.write(addr, Width::Word, value)?;
            addr = addr.wrapping_add(4);
        }
        if wb {
            cpu.reg.set(usize::from(rn), updated);
        }
    }
    Ok(Step::Done)
}

#[cfg(test)]
mod tests {
    use armlet_arch::mem::{Perms, Region};
    use armlet_arch::reg::SP;

    use super::*;

    fn cpu_with(word: Word) -> Cpu {
        let mut cpu = Cpu::new();
        cpu.mem
            .map(Region::new("code", 0x8000, 0x9000, Perms::RX))
            .unwrap();
        cpu.mem
            .map(Region::new("stack", 0x4_0000, 0x4_8000, Perms::RW))
            .unwrap();
        cpu.mem.patch(0x8000, &word.to_le_bytes()).unwrap();
        cpu.reg.set_pc(0x8000);
        cpu.reg.take_jump();
        cpu
    }

    #[test]
    fn push_and_pop_round_trip() {
        // STMDB SP!, {R0, R1, LR}
        let mut cpu = cpu_with(0xe92d_4003);
        cpu.reg.set(SP, 0x4_8000);
        cpu.reg.set(0, 0x11);
        cpu.reg.set(1, 0x22);
        cpu.reg.set(14, 0x33);
        cpu.step().unwrap();
        assert_eq!(cpu.reg.get(SP), 0x4_7ff4);
        assert_eq!(cpu.mem.view(0x4_7ff4, 4).unwrap(), 0x11u32.to_le_bytes());
        assert_eq!(cpu.mem.view(0x4_7ff8, 4).unwrap(), 0x22u32.to_le_bytes());
        assert_eq!(cpu.mem.view(0x4_7ffc, 4).unwrap(), 0x33u32.to_le_bytes());

        // LDMIA SP!, {R2, R3, R4}
        cpu.mem.patch(0x8004, &0xe8bd_001cu32.to_le_bytes()).unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.reg.get(SP), 0x4_8000);
        assert_eq!(cpu.reg.get(2), 0x11);
        assert_eq!(cpu.reg.get(3), 0x22);
        assert_eq!(cpu.reg.get(4), 0x33);
    }

    #[test]
    fn ldm_into_pc_flushes() {
        // LDMIA R0, {PC}
        let mut cpu = cpu_with(0xe890_8000);
        cpu.reg.set(0, 0x4_0000);
        cpu.mem.patch(0x4_0000, &0x8100u32.to_le_bytes()).unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.reg.pc(), 0x8100);
    }

    #[test]
    fn stm_with_base_lowest_stores_the_original() {
        // STMIA R0!, {R0, R1}
        let mut cpu = cpu_with(0xe8a0_0003);
        cpu.reg.set(0, 0x4_0000);
        cpu.reg.set(1, 0x99);
        cpu.step().unwrap();
        assert_eq!(cpu.mem.view(0x4_0000, 4).unwrap(), 0x4_0000u32.to_le_bytes());
        assert_eq!(cpu.reg.get(0), 0x4_0008);
    }

    #[test]
    fn empty_register_lists_are_invalid() {
        let mut cpu = cpu_with(0xe8a0_0000);
        cpu.reg.set(0, 0x4_0000);
        assert!(matches!(cpu.step(), Err(Error::Invalid { .. })));
    }
}
