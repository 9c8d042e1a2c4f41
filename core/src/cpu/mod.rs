//! Central processing unit.
//!
//! The [`Cpu`] owns the architectural state (register file, memory, console,
//! virtual files) and drives the fetch/decode/execute loop one instruction
//! at a time. It knows nothing about breakpoints or sessions; the debugger
//! and the service observe it from outside at instruction boundaries.

use std::time::Instant;

use armlet_arch::mem::{self, Memory};
use armlet_arch::reg::File;
use armlet_arch::{Block, Word};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

use crate::swi::{Console, Vfs};

pub mod insn;

use self::insn::Insn;

/// A convenient type alias for [`Result`](std::result::Result).
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Outcome of executing a single instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Step {
    /// The instruction completed; the machine can continue.
    Done,
    /// The program exited via the EXIT syscall; the PC holds at the SWI.
    Halted,
    /// A console read could not be satisfied; the PC holds at the SWI and
    /// the step must be retried once input arrives.
    Blocked,
}

/// Central processing unit.
#[derive(Debug)]
pub struct Cpu {
    /// Register file.
    pub reg: File,
    /// Mapped memory.
    pub mem: Memory,
    /// Console buffers.
    pub con: Console,
    /// Virtual file table for the file syscalls.
    pub(crate) vfs: Vfs,
    /// Executed cycle count.
    pub cycles: u64,
    /// Reset timestamp, the CLOCK syscall's epoch.
    pub(crate) epoch: Instant,
    /// Generator behind the RAND syscall.
    pub(crate) rng: StdRng,
}

impl Cpu {
    /// Constructs a new `Cpu` with unmapped memory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reg: File::new(),
            mem: Memory::new(),
            con: Console::default(),
            vfs: Vfs::default(),
            cycles: 0,
            epoch: Instant::now(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Executes exactly one instruction.
    ///
    /// The access records are cleared first, so afterwards they describe
    /// this instruction alone. On a fault the PC is rewound to the
    /// offending instruction.
    ///
    /// # Errors
    ///
    /// Errors on an invalid encoding, a memory fault, or an unhandled SWI.
    pub fn step(&mut self) -> Result<Step> {
        self.mem.clear_records();
        let pc = self.reg.pc();
        let res = self.exec_at(pc);
        if res.is_err() {
            // Leave the PC at the offending instruction.
            self.reg.set_pc(pc);
            self.reg.take_jump();
        }
        res
    }

    fn exec_at(&mut self, pc: Word) -> Result<Step> {
        let code = self.mem.fetch(pc)?;
        let insn = Insn::decode(pc, code);
        // A stale flush flag must not suppress the sequential advance.
        self.reg.take_jump();
        if !insn.cond.passes(&self.reg.cpsr) {
            self.reg.advance();
            self.cycles += 1;
            return Ok(Step::Done);
        }
        let step = insn::exec::exec(self, &insn)?;
        if !self.reg.take_jump() {
            self.reg.advance();
        }
        self.cycles += cost(&insn);
        Ok(step)
    }

    /// Fetches and decodes the instruction at an address.
    ///
    /// # Errors
    ///
    /// Errors if the fetch faults; undefined encodings still decode (to
    /// [`Undef`](insn::Kind::Undef)) so the disassembler can render them.
    pub fn insn_at(&self, addr: Word) -> Result<Insn> {
        let code = self.mem.fetch(addr)?;
        Ok(Insn::decode(addr, code))
    }

    /// Decodes up to `count` instructions starting at `addr`.
    ///
    /// Stops early at the first fetch fault (end of the mapped code).
    #[must_use]
    pub fn disasm(&self, addr: Word, count: usize) -> Vec<Insn> {
        (0..count)
            .map_while(|idx| self.insn_at(addr.wrapping_add(4 * idx as Word)).ok())
            .collect()
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Block for Cpu {
    fn reset(&mut self) {
        self.reg.reset();
        self.con.reset();
        self.vfs.reset();
        self.cycles = 0;
        self.epoch = Instant::now();
    }
}

/// Rough cycle cost of an instruction, for the cycle counters.
fn cost(insn: &Insn) -> u64 {
    use self::insn::Kind;
    match insn.kind {
        Kind::Branch { .. } | Kind::BranchX { .. } => 3,
        Kind::Transfer { load, .. } | Kind::TransferHs { load, .. } => 2 + u64::from(load),
        Kind::Block { list, .. } => 2 + u64::from(list.count_ones()),
        Kind::Mul { .. } => 3,
        Kind::MulLong { .. } | Kind::Swap { .. } => 4,
        Kind::Swi { .. } => 3,
        _ => 1,
    }
}

/// An error raised while executing an instruction.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Error {
    /// Encoding not recognised by this machine.
    #[error("invalid instruction {code:#010x} at {addr:#010x}")]
    Invalid {
        /// Address of the instruction.
        addr: Word,
        /// Raw encoding.
        code: Word,
    },
    /// Memory system fault.
    #[error(transparent)]
    Memory(#[from] mem::Error),
    /// SWI immediate without a handler.
    #[error("unhandled swi {imm:#04x} at {addr:#010x}")]
    UnhandledSwi {
        /// Address of the SWI instruction.
        addr: Word,
        /// SWI comment field.
        imm: Word,
    },
    /// A status register write selected invalid mode bits.
    #[error("invalid mode bits {bits:#04x} written at {addr:#010x}")]
    Mode {
        /// Address of the instruction.
        addr: Word,
        /// Offending mode bits.
        bits: Word,
    },
}
