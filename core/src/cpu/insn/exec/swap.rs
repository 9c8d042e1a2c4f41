//! Atomic swap.
//!
//! There is a single memory agent on this machine, so atomicity reduces to
//! performing the read and write back to back with no fault in between.

use armlet_arch::mem::Width;

use super::{Insn, Kind};
use crate::cpu::{Cpu, Result, Step};

pub(super) fn exec(cpu: &mut Cpu, insn: &Insn) -> Result<Step> {
    let Kind::Swap { byte, rn, rd, rm } = insn.kind else {
        unreachable!()
    };
    let addr = cpu.reg.get(usize::from(rn));
    let source = cpu.reg.get(usize::from(rm));
    let value = if byte {
        let old = cpu.mem.read(addr, Width::Byte)?;
        cpu.mem.write(addr, Width::Byte, source & 0xff)?;
        old
    } else {
        let aligned = addr & !0b11;
        let old = cpu.mem.read(aligned, Width::Word)?.rotate_right(8 * (addr & 0b11));
        cpu.mem.write(aligned, Width::Word, source)?;
        old
    };
    cpu.reg.set(usize::from(rd), value);
    Ok(Step::Done)
}

#[cfg(test)]
mod tests {
    use armlet_arch::mem::{Perms, Region};
    use armlet_arch::Word;

    use super::*;

    #[test]
    fn swap_exchanges_register_and_memory() {
        let mut cpu = Cpu::new();
        cpu.mem
            .map(Region::new("code", 0x8000, 0x9000, Perms::RX))
            .unwrap();
        cpu.mem
            .map(Region::new("data", 0x1_0000, 0x2_0000, Perms::RW))
            .unwrap();
        // SWP R0, R2, [R1]
        cpu.mem.patch(0x8000, &0xe101_0092u32.to_le_bytes()).unwrap();
        cpu.mem.patch(0x1_0000, &0xdddd_0000u32.to_le_bytes()).unwrap();
        cpu.reg.set_pc(0x8000);
        cpu.reg.take_jump();
        cpu.reg.set(1, 0x1_0000);
        cpu.reg.set(2, 0x1234_5678);
        cpu.step().unwrap();
        assert_eq!(cpu.reg.get(0), 0xdddd_0000);
        assert_eq!(
            cpu.mem.view(0x1_0000, 4).unwrap(),
            0x1234_5678u32.to_le_bytes()
        );
    }
}
