//! Machine facade.
//!
//! [`Machine`] assembles the CPU, memory map, console, and program object
//! into one steppable unit with an observable [`Status`]. It owns the
//! status transitions on every instruction; the debugger and the session
//! service layer their policy (breakpoints, cancellation, events) on top of
//! [`step`](Machine::step) and [`run`](Machine::run).

use std::fmt::{self, Display};
use std::sync::atomic::{AtomicBool, Ordering};

use armlet_arch::mem::{Memory, Perms, Region};
use armlet_arch::reg::SP;
use armlet_arch::{Block, Word};
use log::debug;

use crate::cpu::{Cpu, Error, Result, Step};
use crate::prog::{Program, SourceMap};

/// Observable machine status.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Status {
    /// No program loaded.
    #[default]
    Idle,
    /// Program loaded, not started.
    Loaded,
    /// The executor is actively iterating.
    Running,
    /// Stopped at a user-visible point.
    Paused,
    /// A console read is blocked on stdin.
    WaitingForInput,
    /// The program exited via the EXIT syscall.
    Halted,
    /// A fault stopped execution.
    Error,
}

impl Status {
    /// Wire name of the status, as published to clients.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loaded => "loaded",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::WaitingForInput => "waiting_for_input",
            Self::Halted => "halted",
            Self::Error => "error",
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Memory layout parameters for a machine.
#[derive(Clone, Copy, Debug)]
pub struct Layout {
    /// Base of the read-write data window.
    pub data_base: Word,
    /// Size of the data window, stack included.
    pub data_size: Word,
    /// Size of the stack carved off the top of the data window.
    pub stack_size: Word,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            data_base: 0x0001_0000,
            data_size: 0x0004_0000,
            stack_size: 0x0000_8000,
        }
    }
}

impl Layout {
    /// First address past the data window; the initial stack pointer.
    #[must_use]
    pub const fn stack_top(&self) -> Word {
        self.data_base + self.data_size
    }

    /// Base of the stack region.
    #[must_use]
    pub const fn stack_base(&self) -> Word {
        self.stack_top() - self.stack_size
    }
}

/// Outcome of a [`run`](Machine::run) loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Halt {
    /// The program exited.
    Exited,
    /// A console read blocked on stdin.
    Blocked,
    /// The cancellation flag was observed.
    Cancelled,
    /// The instruction budget ran out.
    Limit,
    /// A fault stopped execution; see [`Machine::fault`].
    Faulted,
}

/// A complete virtual machine.
#[derive(Debug)]
pub struct Machine {
    /// Processor and its attached state.
    pub cpu: Cpu,
    /// Observable status.
    pub status: Status,
    layout: Layout,
    prog: Option<Program>,
    map: SourceMap,
    fault: Option<Error>,
}

impl Machine {
    /// Constructs an idle machine with the given memory layout.
    #[must_use]
    pub fn new(layout: Layout) -> Self {
        Self {
            cpu: Cpu::new(),
            status: Status::Idle,
            layout,
            prog: None,
            map: SourceMap::default(),
            fault: None,
        }
    }

    /// The machine's memory layout.
    #[must_use]
    pub const fn layout(&self) -> Layout {
        self.layout
    }

    /// The loaded program, if any.
    #[must_use]
    pub fn program(&self) -> Option<&Program> {
        self.prog.as_ref()
    }

    /// The source map of the loaded program.
    #[must_use]
    pub const fn source_map(&self) -> &SourceMap {
        &self.map
    }

    /// The fault that sent the machine to [`Status::Error`], if any.
    #[must_use]
    pub const fn fault(&self) -> Option<&Error> {
        self.fault.as_ref()
    }

    /// Loads a program: builds the memory map, places code and data,
    /// installs the source map, and leaves the machine [`Status::Loaded`].
    ///
    /// A failed load leaves the previous program intact.
    ///
    /// # Errors
    ///
    /// Errors if the program places bytes outside the mapped regions.
    pub fn load(&mut self, prog: Program) -> Result<()> {
        let mut mem = Memory::new();
        let layout = self.layout;
        // Code region around the program span, rounded out to pages.
        if let Some((lo, hi)) = prog.span() {
            let lo = lo & !0xfff;
            let hi = (hi + 0xfff) & !0xfff;
            mem.map(Region::new("code", lo, hi, Perms::RX))?;
            // The data window yields to an overlapping code region.
            let data_base = if hi > layout.data_base && lo < layout.stack_top() {
                hi.max(layout.data_base)
            } else {
                layout.data_base
            };
            if data_base < layout.stack_base() {
                mem.map(Region::new("data", data_base, layout.stack_base(), Perms::RW))?;
            }
        } else {
            mem.map(Region::new(
                "data",
                layout.data_base,
                layout.stack_base(),
                Perms::RW,
            ))?;
        }
        mem.map(Region::new(
            "stack",
            layout.stack_base(),
            layout.stack_top(),
            Perms::RW,
        ))?;
        for line in &prog.code {
            mem.patch(line.addr, &line.code.to_le_bytes())?;
        }
        for chunk in &prog.data {
            mem.patch(chunk.addr, &chunk.bytes)?;
        }
        debug!(
            "loaded program: origin {:#010x}, entry {:#010x}, {} instructions",
            prog.origin,
            prog.entry,
            prog.code.len()
        );
        self.cpu.mem = mem;
        self.map = SourceMap::build(&prog);
        self.prog = Some(prog);
        self.boot();
        Ok(())
    }

    /// Re-initialises registers, console, and memory from the loaded
    /// program (or to empty) and returns to [`Status::Loaded`] /
    /// [`Status::Idle`].
    pub fn reset(&mut self) {
        if let Some(prog) = self.prog.take() {
            // Rebuilding the map is infallible for a program that loaded.
            self.load(prog).expect("reloading a loaded program");
        } else {
            self.cpu.reset();
            self.cpu.mem.unmap();
            self.status = Status::Idle;
            self.fault = None;
        }
    }

    /// Places the register file at the program entry.
    fn boot(&mut self) {
        self.cpu.reset();
        self.fault = None;
        if let Some(prog) = &self.prog {
            self.cpu.reg.set(SP, self.layout.stack_top());
            self.cpu.reg.set_pc(prog.entry);
            self.cpu.reg.take_jump();
            self.status = Status::Loaded;
        } else {
            self.status = Status::Idle;
        }
    }

    /// Executes exactly one instruction, ignoring breakpoints and
    /// watchpoints, and transitions the status.
    ///
    /// Returns the raw [`Step`] outcome; on [`Step::Done`] the status is
    /// left for the caller to set ([`Status::Paused`] for a single step,
    /// [`Status::Running`] inside a run loop).
    ///
    /// # Errors
    ///
    /// Errors on a program fault, after transitioning to [`Status::Error`].
    pub fn step(&mut self) -> Result<Step> {
        match self.status {
            Status::Idle => return Err(Error::Invalid {
                addr: self.cpu.reg.pc(),
                code: 0,
            }),
            Status::Halted | Status::Error => {
                // Stepping a finished machine is a caller bug upstream;
                // surface the existing terminal state unchanged.
                return Ok(Step::Halted);
            }
            _ => {}
        }
        match self.cpu.step() {
            Ok(Step::Done) => Ok(Step::Done),
            Ok(Step::Halted) => {
                self.status = Status::Halted;
                Ok(Step::Halted)
            }
            Ok(Step::Blocked) => {
                self.status = Status::WaitingForInput;
                Ok(Step::Blocked)
            }
            Err(err) => {
                self.status = Status::Error;
                self.fault = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Runs up to `max` instructions in a tight loop, stopping on exit,
    /// fault, blocked input, or the cancellation flag.
    pub fn run(&mut self, max: u64, cancel: &AtomicBool) -> Halt {
        self.status = Status::Running;
        for _ in 0..max {
            if cancel.load(Ordering::Relaxed) {
                self.status = Status::Paused;
                return Halt::Cancelled;
            }
            match self.step() {
                Ok(Step::Done) => {}
                Ok(Step::Halted) => return Halt::Exited,
                Ok(Step::Blocked) => return Halt::Blocked,
                Err(_) => return Halt::Faulted,
            }
        }
        self.status = Status::Paused;
        Halt::Limit
    }

    /// Snapshot of the raw register values.
    #[must_use]
    pub fn registers(&self) -> [Word; 16] {
        self.cpu.reg.snapshot()
    }

    /// Classifies a fault address against the stack region: a miss just
    /// below the stack base is a stack overflow rather than a plain
    /// memory fault.
    #[must_use]
    pub fn is_stack_overflow(&self, addr: Word) -> bool {
        let base = self.layout.stack_base();
        addr < base && addr >= base.saturating_sub(0x1000)
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new(Layout::default())
    }
}

impl Block for Machine {
    fn reset(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::prog::Line;

    fn program(words: &[Word]) -> Program {
        Program {
            origin: 0x8000,
            entry: 0x8000,
            code: words
                .iter()
                .enumerate()
                .map(|(idx, &code)| Line {
                    addr: 0x8000 + 4 * idx as Word,
                    code,
                    number: idx as u32 + 1,
                    text: String::new(),
                })
                .collect(),
            data: Vec::new(),
            symbols: IndexMap::new(),
        }
    }

    #[test]
    fn load_builds_the_default_map() {
        let mut vm = Machine::default();
        vm.load(program(&[0xe3a0_0000, 0xef00_0000])).unwrap();
        assert_eq!(vm.status, Status::Loaded);
        assert_eq!(vm.cpu.reg.pc(), 0x8000);
        assert_eq!(vm.cpu.reg.get(SP), 0x5_0000);
        let names: Vec<_> = vm.cpu.mem.regions().map(|r| r.name.clone()).collect();
        assert_eq!(names, ["code", "data", "stack"]);
    }

    #[test]
    fn run_to_exit_halts() {
        let mut vm = Machine::default();
        vm.load(program(&[0xe3a0_0007, 0xef00_0000])).unwrap();
        let halt = vm.run(100, &AtomicBool::new(false));
        assert_eq!(halt, Halt::Exited);
        assert_eq!(vm.status, Status::Halted);
        assert_eq!(vm.cpu.reg.get(0), 7);
        // The PC holds at the SWI.
        assert_eq!(vm.cpu.reg.pc(), 0x8004);
    }

    #[test]
    fn faults_park_the_machine_in_error() {
        // LDR R0, [R1] with R1 unmapped.
        let mut vm = Machine::default();
        vm.load(program(&[0xe591_0000])).unwrap();
        assert!(vm.step().is_err());
        assert_eq!(vm.status, Status::Error);
        assert!(vm.fault().is_some());
        // State stays introspectable.
        assert_eq!(vm.registers()[15], 0x8000);
    }

    #[test]
    fn reset_restores_the_entry_state() {
        let mut vm = Machine::default();
        vm.load(program(&[0xe3a0_0007, 0xef00_0000])).unwrap();
        vm.run(100, &AtomicBool::new(false));
        vm.reset();
        assert_eq!(vm.status, Status::Loaded);
        assert_eq!(vm.cpu.reg.pc(), 0x8000);
        assert_eq!(vm.registers()[0], 0);
        assert!(vm.source_map().is_code(0x8000));
    }

    #[test]
    fn budget_exhaustion_pauses() {
        // Tight loop: B .
        let mut vm = Machine::default();
        vm.load(program(&[0xeaff_fffe])).unwrap();
        let halt = vm.run(10, &AtomicBool::new(false));
        assert_eq!(halt, Halt::Limit);
        assert_eq!(vm.status, Status::Paused);
    }
}
