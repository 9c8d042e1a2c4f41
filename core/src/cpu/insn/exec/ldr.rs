//! Single data transfers.

use armlet_arch::mem::Width;
use armlet_arch::Word;

use super::{operand2, Insn, Kind, Operand};
use crate::cpu::insn::Offset;
use crate::cpu::{Cpu, Result, Step};

pub(super) fn exec(cpu: &mut Cpu, insn: &Insn) -> Result<Step> {
    let Kind::Transfer {
        load,
        byte,
        pre,
        up,
        wb,
        rn,
        rd,
        off,
    } = insn.kind
    else {
        unreachable!()
    };
    let base = cpu.reg.get(usize::from(rn));
    let off = match off {
        Offset::Imm(imm) => Word::from(imm),
        Offset::Reg { rm, shift } => operand2(cpu, Operand::Reg { rm, shift }).value,
    };
    let off = if up { off } else { off.wrapping_neg() };
    let addr = if pre { base.wrapping_add(off) } else { base };

    if load {
        let value = if byte {
            cpu.mem.read(addr, Width::Byte)?
        } else {
            // A word load rotates the aligned word by the low address bits.
            let raw = cpu.mem.read(addr & !0b11, Width::Word)?;
            raw.rotate_right(8 * (addr & 0b11))
        };
        // Writeback happens before the destination, so a load into the
        // base register wins.
        writeback(cpu, rn, base, off, pre, wb);
        cpu.reg.set(usize::from(rd), value);
    } else {
        let value = cpu.reg.get(usize::from(rd));
        if byte {
            cpu.mem.write(addr, Width::Byte, value & 0xff)?;
        } else {
            // Word stores go to the aligned address.
            cpu.mem.write(addr & !0b11, Width::Word, value)?;
        }
        writeback(cpu, rn, base, off, pre, wb);
    }
    Ok(Step::Done)
}

/// Applies the addressing-mode writeback: always for post-indexed, only
/// with `!` for pre-indexed.
fn writeback(cpu: &mut Cpu, rn: u8, base: Word, off: Word, pre: bool, wb: bool) {
    if !pre || wb {
        cpu.reg.set(usize::from(rn), base.wrapping_add(off));
    }
}

#[cfg(test)]
mod tests {
    use armlet_arch::mem::{Perms, Region};

    use super::*;

    fn cpu_with(words: &[Word]) -> Cpu {
        let mut cpu = Cpu::new();
        cpu.mem
            .map(Region::new("code", 0x8000, 0x9000, Perms::RX))
            .unwrap();
        cpu.mem
            .map(Region::new("data", 0x1_0000, 0x2_0000, Perms::RW))
            .unwrap();
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        cpu.mem.patch(0x8000, &bytes).unwrap();
        cpu.reg.set_pc(0x8000);
        cpu.reg.take_jump();
        cpu
    }

    #[test]
    fn pre_indexed_writeback_updates_the_base() {
        // LDR R1, [R2, #4]!
        let mut cpu = cpu_with(&[0xe5b2_1004]);
        cpu.reg.set(2, 0x1_0000);
        cpu.mem.patch(0x1_0004, &0xcafe_f00du32.to_le_bytes()).unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.reg.get(1), 0xcafe_f00d);
        assert_eq!(cpu.reg.get(2), 0x1_0004);
    }

    #[test]
    fn post_indexed_store_writes_then_steps_the_base() {
        // STRB R0, [R1], #-1
        let mut cpu = cpu_with(&[0xe441_0001]);
        cpu.reg.set(0, 0xab);
        cpu.reg.set(1, 0x1_0010);
        cpu.step().unwrap();
        assert_eq!(cpu.mem.view(0x1_0010, 1).unwrap(), vec![0xab]);
        assert_eq!(cpu.reg.get(1), 0x1_000f);
    }

    #[test]
    fn unaligned_word_loads_rotate() {
        // LDR R0, [R1]
        let mut cpu = cpu_with(&[0xe591_0000]);
        cpu.mem.patch(0x1_0000, &0x1122_3344u32.to_le_bytes()).unwrap();
        cpu.reg.set(1, 0x1_0001);
        cpu.step().unwrap();
        assert_eq!(cpu.reg.get(0), 0x4411_2233);
    }

    #[test]
    fn load_into_the_base_wins_over_writeback() {
        // LDR R1, [R1], #4
        let mut cpu = cpu_with(&[0xe491_1004]);
        cpu.reg.set(1, 0x1_0000);
        cpu.mem.patch(0x1_0000, &0x5555_aaaau32.to_le_bytes()).unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.reg.get(1), 0x5555_aaaa);
    }
}
