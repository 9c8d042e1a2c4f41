//! Software interrupts.
//!
//! The dispatch itself lives in [`crate::swi`]; this handler only routes the
//! comment field through it.

use super::{Insn, Kind};
use crate::cpu::{Cpu, Result, Step};
use crate::swi;

pub(super) fn exec(cpu: &mut Cpu, insn: &Insn) -> Result<Step> {
    let Kind::Swi { imm } = insn.kind else {
        unreachable!()
    };
    swi::call(cpu, insn.addr, imm)
}

#[cfg(test)]
mod tests {
    use armlet_arch::mem::{Perms, Region};
    use armlet_arch::Word;

    use super::*;
    use crate::cpu::Error;

    fn cpu_with(words: &[Word]) -> Cpu {
        let mut cpu = Cpu::new();
        cpu.mem
            .map(Region::new("code", 0x8000, 0x9000, Perms::RX))
            .unwrap();
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        cpu.mem.patch(0x8000, &bytes).unwrap();
        cpu.reg.set_pc(0x8000);
        cpu.reg.take_jump();
        cpu
    }

    #[test]
    fn exit_halts_at_the_swi() {
        // MOV R0, #65; SWI #0
        let mut cpu = cpu_with(&[0xe3a0_0041, 0xef00_0000]);
        assert_eq!(cpu.step().unwrap(), Step::Done);
        assert_eq!(cpu.step().unwrap(), Step::Halted);
        assert_eq!(cpu.reg.pc(), 0x8004);
    }

    #[test]
    fn write_char_reaches_the_console() {
        // MOV R0, #65; SWI #1; SWI #7
        let mut cpu = cpu_with(&[0xe3a0_0041, 0xef00_0001, 0xef00_0007]);
        cpu.step().unwrap();
        cpu.step().unwrap();
        cpu.step().unwrap();
        assert_eq!(cpu.con.output(), b"A\n");
    }

    #[test]
    fn blocked_reads_rewind_and_retry() {
        // SWI #4 (READ_CHAR)
        let mut cpu = cpu_with(&[0xef00_0004]);
        assert_eq!(cpu.step().unwrap(), Step::Blocked);
        assert_eq!(cpu.reg.pc(), 0x8000);
        cpu.con.feed(b"Z");
        assert_eq!(cpu.step().unwrap(), Step::Done);
        assert_eq!(cpu.reg.get(0), u32::from(b'Z'));
        assert_eq!(cpu.reg.pc(), 0x8004);
    }

    #[test]
    fn unknown_swis_fault() {
        let mut cpu = cpu_with(&[0xef00_00ff]);
        assert!(matches!(
            cpu.step(),
            Err(Error::UnhandledSwi { imm: 0xff, .. })
        ));
        assert_eq!(cpu.reg.pc(), 0x8000);
    }
}
