//! Register models.
//!
//! The [register file](File) holds the sixteen general registers with the
//! classical pipeline convention on reads of R15, the banked SP/LR shadows
//! per processor [mode](Mode), and the [status register](Cpsr) with its
//! saved copies.

use std::fmt::{self, Display};

use crate::{Block, Word};

/// Stack pointer register index.
pub const SP: usize = 13;
/// Link register index.
pub const LR: usize = 14;
/// Program counter register index.
pub const PC: usize = 15;

/// Processor mode, encoded in CPSR bits [4:0].
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Mode {
    /// User.
    #[default]
    Usr,
    /// Fast interrupt.
    Fiq,
    /// Interrupt.
    Irq,
    /// Supervisor.
    Svc,
    /// Abort.
    Abt,
    /// Undefined.
    Und,
    /// System.
    Sys,
}

impl Mode {
    /// Decodes mode bits; unknown encodings yield `None`.
    #[must_use]
    pub fn from_bits(bits: Word) -> Option<Self> {
        match bits & 0x1f {
            0x10 => Some(Self::Usr),
            0x11 => Some(Self::Fiq),
            0x12 => Some(Self::Irq),
            0x13 => Some(Self::Svc),
            0x17 => Some(Self::Abt),
            0x1b => Some(Self::Und),
            0x1f => Some(Self::Sys),
            _ => None,
        }
    }

    /// Encodes the mode into CPSR bits [4:0].
    #[must_use]
    pub const fn bits(self) -> Word {
        match self {
            Self::Usr => 0x10,
            Self::Fiq => 0x11,
            Self::Irq => 0x12,
            Self::Svc => 0x13,
            Self::Abt => 0x17,
            Self::Und => 0x1b,
            Self::Sys => 0x1f,
        }
    }

    /// Index of the SP/LR bank used by the mode.
    ///
    /// User and System share the same bank.
    const fn bank(self) -> usize {
        match self {
            Self::Usr | Self::Sys => 0,
            Self::Fiq => 1,
            Self::Irq => 2,
            Self::Svc => 3,
            Self::Abt => 4,
            Self::Und => 5,
        }
    }

    /// Index of the mode's SPSR, if it has one.
    const fn spsr(self) -> Option<usize> {
        match self {
            Self::Usr | Self::Sys => None,
            Self::Fiq => Some(0),
            Self::Irq => Some(1),
            Self::Svc => Some(2),
            Self::Abt => Some(3),
            Self::Und => Some(4),
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usr => write!(f, "usr"),
            Self::Fiq => write!(f, "fiq"),
            Self::Irq => write!(f, "irq"),
            Self::Svc => write!(f, "svc"),
            Self::Abt => write!(f, "abt"),
            Self::Und => write!(f, "und"),
            Self::Sys => write!(f, "sys"),
        }
    }
}

/// Status register flag positions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flag {
    /// Negative.
    N = 31,
    /// Zero.
    Z = 30,
    /// Carry / not-borrow.
    C = 29,
    /// Signed overflow.
    V = 28,
    /// IRQ disable.
    I = 7,
    /// FIQ disable.
    F = 6,
    /// Thumb state (always clear on this machine).
    T = 5,
}

/// Current program status register.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Cpsr(Word);

impl Cpsr {
    /// Constructs a `Cpsr` for the given mode with all flags clear.
    #[must_use]
    pub const fn with_mode(mode: Mode) -> Self {
        Self(mode.bits())
    }

    /// Raw register value.
    #[must_use]
    pub const fn bits(self) -> Word {
        self.0
    }

    /// Overwrites the raw register value.
    pub fn set_bits(&mut self, bits: Word) {
        self.0 = bits;
    }

    /// Tests a flag.
    #[must_use]
    pub const fn test(self, flag: Flag) -> bool {
        self.0 >> (flag as u32) & 1 != 0
    }

    /// Updates a flag.
    pub fn set(&mut self, flag: Flag, value: bool) {
        let mask = 1 << (flag as u32);
        if value {
            self.0 |= mask;
        } else {
            self.0 &= !mask;
        }
    }

    /// Decodes the mode bits.
    ///
    /// Unknown encodings are reported as `None`; the machine treats them as
    /// faults at the point of the write.
    #[must_use]
    pub fn mode(self) -> Option<Mode> {
        Mode::from_bits(self.0)
    }
}

impl Display for Cpsr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{n}{z}{c}{v} {mode}",
            n = if self.test(Flag::N) { 'N' } else { 'n' },
            z = if self.test(Flag::Z) { 'Z' } else { 'z' },
            c = if self.test(Flag::C) { 'C' } else { 'c' },
            v = if self.test(Flag::V) { 'V' } else { 'v' },
            mode = self.mode().map_or("???".to_string(), |m| m.to_string()),
        )
    }
}

/// Condition code field, bits [31:28] of every instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Cond {
    /// Equal (Z set).
    Eq,
    /// Not equal (Z clear).
    Ne,
    /// Carry set / unsigned higher or same.
    Cs,
    /// Carry clear / unsigned lower.
    Cc,
    /// Minus (N set).
    Mi,
    /// Plus (N clear).
    Pl,
    /// Overflow set.
    Vs,
    /// Overflow clear.
    Vc,
    /// Unsigned higher.
    Hi,
    /// Unsigned lower or same.
    Ls,
    /// Signed greater or equal.
    Ge,
    /// Signed less.
    Lt,
    /// Signed greater.
    Gt,
    /// Signed less or equal.
    Le,
    /// Always.
    Al,
    /// Never.
    Nv,
}

impl Cond {
    /// Decodes a 4-bit condition field.
    #[must_use]
    pub fn from_bits(bits: Word) -> Self {
        match bits & 0xf {
            0x0 => Self::Eq,
            0x1 => Self::Ne,
            0x2 => Self::Cs,
            0x3 => Self::Cc,
            0x4 => Self::Mi,
            0x5 => Self::Pl,
            0x6 => Self::Vs,
            0x7 => Self::Vc,
            0x8 => Self::Hi,
            0x9 => Self::Ls,
            0xa => Self::Ge,
            0xb => Self::Lt,
            0xc => Self::Gt,
            0xd => Self::Le,
            0xe => Self::Al,
            _ => Self::Nv,
        }
    }

    /// Encodes the condition into bits [31:28].
    #[must_use]
    pub const fn bits(self) -> Word {
        self as Word
    }

    /// Evaluates the condition against the current flags.
    #[must_use]
    pub fn passes(self, cpsr: &Cpsr) -> bool {
        let n = cpsr.test(Flag::N);
        let z = cpsr.test(Flag::Z);
        let c = cpsr.test(Flag::C);
        let v = cpsr.test(Flag::V);
        match self {
            Self::Eq => z,
            Self::Ne => !z,
            Self::Cs => c,
            Self::Cc => !c,
            Self::Mi => n,
            Self::Pl => !n,
            Self::Vs => v,
            Self::Vc => !v,
            Self::Hi => c && !z,
            Self::Ls => !c || z,
            Self::Ge => n == v,
            Self::Lt => n != v,
            Self::Gt => !z && n == v,
            Self::Le => z || n != v,
            Self::Al => true,
            Self::Nv => false,
        }
    }

    /// Mnemonic suffix; empty for AL.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Eq => "EQ",
            Self::Ne => "NE",
            Self::Cs => "CS",
            Self::Cc => "CC",
            Self::Mi => "MI",
            Self::Pl => "PL",
            Self::Vs => "VS",
            Self::Vc => "VC",
            Self::Hi => "HI",
            Self::Ls => "LS",
            Self::Ge => "GE",
            Self::Lt => "LT",
            Self::Gt => "GT",
            Self::Le => "LE",
            Self::Al => "",
            Self::Nv => "NV",
        }
    }
}

/// Register file with banked SP/LR shadows.
///
/// The file stores the raw program counter; [`get`](File::get) applies the
/// pipeline convention and returns `PC + 8` for R15. Writes to R15 are
/// word-aligned and flag a pipeline flush which the executor consumes via
/// [`take_jump`](File::take_jump).
#[derive(Clone, Debug)]
pub struct File {
    gpr: [Word; 16],
    bank: [[Word; 2]; 6],
    spsr: [Word; 5],
    /// Current program status register.
    pub cpsr: Cpsr,
    jump: bool,
}

impl File {
    /// Constructs a zeroed `File` in User mode.
    #[must_use]
    pub fn new() -> Self {
        Self {
            gpr: [0; 16],
            bank: [[0; 2]; 6],
            spsr: [0; 5],
            cpsr: Cpsr::with_mode(Mode::Usr),
            jump: false,
        }
    }

    /// Reads a register, applying the `PC + 8` convention to R15.
    #[must_use]
    pub fn get(&self, idx: usize) -> Word {
        debug_assert!(idx < 16);
        if idx == PC {
            self.gpr[PC].wrapping_add(8)
        } else {
            self.gpr[idx]
        }
    }

    /// Writes a register.
    ///
    /// Writes to R15 are word-aligned and flag a pipeline flush.
    pub fn set(&mut self, idx: usize, value: Word) {
        debug_assert!(idx < 16);
        if idx == PC {
            self.set_pc(value);
        } else {
            self.gpr[idx] = value;
        }
    }

    /// Raw program counter: the address of the current instruction.
    #[must_use]
    pub const fn pc(&self) -> Word {
        self.gpr[PC]
    }

    /// Overwrites the program counter, flagging a pipeline flush.
    pub fn set_pc(&mut self, value: Word) {
        self.gpr[PC] = value & !0b11;
        self.jump = true;
    }

    /// Advances the program counter past the current instruction.
    ///
    /// Unlike [`set_pc`](File::set_pc) this does not flag a flush; it is the
    /// executor's sequential step.
    pub fn advance(&mut self) {
        self.gpr[PC] = self.gpr[PC].wrapping_add(4);
    }

    /// Consumes the pipeline flush flag.
    pub fn take_jump(&mut self) -> bool {
        std::mem::take(&mut self.jump)
    }

    /// Snapshot of the raw register values.
    #[must_use]
    pub const fn snapshot(&self) -> [Word; 16] {
        self.gpr
    }

    /// Current processor mode.
    ///
    /// The mode bits are validated on every CPSR write, so this cannot fail.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.cpsr.mode().unwrap_or_default()
    }

    /// Switches processor mode, swapping the banked SP/LR.
    pub fn set_mode(&mut self, mode: Mode) {
        let old = self.mode();
        if old.bank() != mode.bank() {
            self.bank[old.bank()] = [self.gpr[SP], self.gpr[LR]];
            [self.gpr[SP], self.gpr[LR]] = self.bank[mode.bank()];
        }
        let bits = self.cpsr.bits() & !0x1f | mode.bits();
        self.cpsr.set_bits(bits);
    }

    /// Reads the SPSR of the current mode, if it has one.
    #[must_use]
    pub fn spsr(&self) -> Option<Word> {
        self.mode().spsr().map(|idx| self.spsr[idx])
    }

    /// Writes the SPSR of the current mode; ignored in User/System.
    pub fn set_spsr(&mut self, value: Word) {
        if let Some(idx) = self.mode().spsr() {
            self.spsr[idx] = value;
        }
    }
}

impl Default for File {
    fn default() -> Self {
        Self::new()
    }
}

impl Block for File {
    fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn r15_reads_ahead_of_the_pipeline() {
        let mut reg = File::new();
        reg.set_pc(0x8000);
        reg.take_jump();
        assert_eq!(reg.pc(), 0x8000);
        assert_eq!(reg.get(PC), 0x8008);
    }

    #[test]
    fn pc_writes_flush_and_align() {
        let mut reg = File::new();
        reg.set(PC, 0x8006);
        assert_eq!(reg.pc(), 0x8004);
        assert!(reg.take_jump());
        assert!(!reg.take_jump());
        reg.advance();
        assert_eq!(reg.pc(), 0x8008);
        assert!(!reg.take_jump());
    }

    #[test]
    fn mode_switch_swaps_sp_and_lr_banks() {
        let mut reg = File::new();
        reg.set(SP, 0x4_8000);
        reg.set(LR, 0x8010);
        reg.set_mode(Mode::Irq);
        assert_eq!(reg.mode(), Mode::Irq);
        assert_eq!(reg.get(SP), 0);
        reg.set(SP, 0x7000);
        reg.set_mode(Mode::Usr);
        assert_eq!(reg.get(SP), 0x4_8000);
        assert_eq!(reg.get(LR), 0x8010);
        reg.set_mode(Mode::Irq);
        assert_eq!(reg.get(SP), 0x7000);
    }

    #[test]
    fn user_and_system_share_a_bank() {
        let mut reg = File::new();
        reg.set(SP, 0x1234);
        reg.set_mode(Mode::Sys);
        assert_eq!(reg.get(SP), 0x1234);
    }

    #[test]
    fn conditions_follow_the_flags() {
        let mut cpsr = Cpsr::default();
        cpsr.set(Flag::Z, true);
        assert!(Cond::Eq.passes(&cpsr));
        assert!(!Cond::Ne.passes(&cpsr));
        assert!(Cond::Ls.passes(&cpsr));
        cpsr.set(Flag::Z, false);
        cpsr.set(Flag::N, true);
        assert!(Cond::Lt.passes(&cpsr));
        cpsr.set(Flag::V, true);
        assert!(Cond::Ge.passes(&cpsr));
        assert!(Cond::Al.passes(&cpsr));
        assert!(!Cond::Nv.passes(&cpsr));
    }
}
