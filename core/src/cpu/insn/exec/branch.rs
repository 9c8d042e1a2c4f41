//! Branch instructions.

use armlet_arch::reg::{LR, PC};
use armlet_arch::Word;

use super::{Insn, Kind};
use crate::cpu::{Cpu, Result, Step};

pub(super) fn exec(cpu: &mut Cpu, insn: &Insn) -> Result<Step> {
    match insn.kind {
        Kind::Branch { link, off } => {
            // The offset is relative to the pipelined PC.
            let target = cpu.reg.get(PC).wrapping_add(off as Word);
            if link {
                cpu.reg.set(LR, cpu.reg.pc().wrapping_add(4));
            }
            cpu.reg.set_pc(target);
        }
        Kind::BranchX { link, rm } => {
            let target = cpu.reg.get(usize::from(rm));
            if link {
                cpu.reg.set(LR, cpu.reg.pc().wrapping_add(4));
            }
            // The Thumb bit is ignored on this machine.
            cpu.reg.set_pc(target & !1);
        }
        _ => unreachable!(),
    }
    Ok(Step::Done)
}

#[cfg(test)]
mod tests {
    use armlet_arch::mem::{Perms, Region};

    use super::*;

    #[test]
    fn branch_with_link_records_the_return_address() {
        let mut cpu = Cpu::new();
        cpu.mem
            .map(Region::new("code", 0x8000, 0x9000, Perms::RX))
            .unwrap();
        // BL +8 (target = PC + 8 + 8)
        cpu.mem.patch(0x8000, &0xeb00_0002u32.to_le_bytes()).unwrap();
        cpu.reg.set_pc(0x8000);
        cpu.reg.take_jump();
        cpu.step().unwrap();
        assert_eq!(cpu.reg.pc(), 0x8010);
        assert_eq!(cpu.reg.get(LR), 0x8004);
    }
}
