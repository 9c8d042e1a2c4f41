//! # Interactive Debugger
//!
//! Wraps a [`Machine`] with breakpoints, watchpoints, step modes, an
//! execution trace, statistics, and a command language. The debugger owns
//! the interleaving of free-running execution and client-driven stepping:
//! [`resume`](Debugger::resume) checks breakpoints before and watchpoints
//! after every instruction, polls a cancellation flag between instructions,
//! and never interrupts an instruction mid-flight.

#![warn(clippy::pedantic)]

use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use armlet_arch::mem::Access;
use armlet_arch::reg::{LR, SP};
use armlet_arch::Word;
use armlet_core::cpu::Step as CoreStep;
use armlet_core::{Insn, Machine, Status};
use indexmap::IndexMap;
use log::warn;
use thiserror::Error;

mod exec;
pub mod lang;
pub mod stats;
pub mod trace;

pub use crate::stats::Stats;
pub use crate::trace::Trace;

/// A convenient type alias for [`Result`](std::result::Result).
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A breakpoint.
#[derive(Clone, Debug, Default)]
pub struct Breakpoint {
    /// Fires only while enabled.
    pub enable: bool,
    /// Times the breakpoint has fired.
    pub hits: u64,
    /// Optional condition: fires only when the expression is non-zero.
    pub cond: Option<(String, lang::Expr)>,
}

/// Watchpoint trigger kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Watch {
    /// Data loads.
    Read,
    /// Data stores.
    Write,
    /// Loads and stores.
    Access,
}

impl Display for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Access => write!(f, "access"),
        }
    }
}

impl FromStr for Watch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "access" => Ok(Self::Access),
            _ => Err(Error::WatchKind(s.to_string())),
        }
    }
}

/// A watchpoint: a data-address breakpoint of word width.
#[derive(Clone, Debug)]
pub struct Watchpoint {
    /// Identifier, assigned by a per-debugger counter.
    pub id: u32,
    /// Watched address.
    pub addr: Word,
    /// Trigger kind.
    pub kind: Watch,
    /// Fires only while enabled.
    pub enable: bool,
    /// Times the watchpoint has fired.
    pub hits: u64,
}

/// Why execution returned to the caller.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stop {
    /// A step boundary: one instruction completed (or a one-shot return
    /// breakpoint fired).
    Step,
    /// A user breakpoint fired at the address.
    Breakpoint(Word),
    /// A watchpoint fired.
    Watchpoint {
        /// Watchpoint identifier.
        id: u32,
        /// Watched address.
        addr: Word,
    },
    /// The cancellation flag was observed.
    Pause,
    /// The program exited.
    Halt,
    /// A console read is blocked on stdin.
    Input,
    /// The cycle budget ran out.
    Limit,
    /// A program fault; details in [`Machine::fault`].
    Fault,
}

/// One-shot internal breakpoint used by step-over and step-out.
#[derive(Clone, Copy, Debug)]
struct Shot {
    addr: Word,
    sp: Word,
}

/// The debugger state wrapped around one machine.
#[derive(Debug, Default)]
pub struct Debugger {
    bpts: IndexMap<Word, Option<Breakpoint>>,
    wpts: IndexMap<u32, Watchpoint>,
    next: u32,
    shot: Option<Shot>,
    /// Execution trace ring.
    pub trace: Trace,
    /// Execution statistics.
    pub stats: Stats,
}

impl Debugger {
    /// Constructs a debugger with the given trace capacity.
    #[must_use]
    pub fn new(trace_cap: usize) -> Self {
        Self {
            trace: Trace::new(trace_cap),
            ..Self::default()
        }
    }

    /// Creates a breakpoint.
    ///
    /// The address must name an instruction in the source map; the
    /// condition, when present, is parsed now and evaluated on every
    /// crossing.
    ///
    /// # Errors
    ///
    /// Errors on invalid addresses, duplicate breakpoints, and broken
    /// condition expressions.
    pub fn add_breakpoint(
        &mut self,
        vm: &Machine,
        addr: Word,
        cond: Option<&str>,
    ) -> Result<()> {
        let cond = cond
            .map(|src| Ok::<_, Error>((src.to_string(), lang::expression(src)?)))
            .transpose()?;
        self.insert_breakpoint(vm, addr, cond)
    }

    /// Installs an already parsed breakpoint.
    fn insert_breakpoint(
        &mut self,
        vm: &Machine,
        addr: Word,
        cond: Option<(String, lang::Expr)>,
    ) -> Result<()> {
        if !vm.source_map().is_code(addr) {
            return Err(Error::NotCode(addr));
        }
        match self.bpts.entry(addr).or_insert(None) {
            Some(_) => Err(Error::Exists(addr)),
            slot => {
                *slot = Some(Breakpoint {
                    enable: true,
                    hits: 0,
                    cond,
                });
                Ok(())
            }
        }
    }

    /// Removes the breakpoint at an address.
    ///
    /// # Errors
    ///
    /// Errors if no breakpoint exists there.
    pub fn remove_breakpoint(&mut self, addr: Word) -> Result<()> {
        match self.bpts.get_mut(&addr) {
            Some(slot @ Some(_)) => {
                // Tombstone the slot so breakpoint numbering stays stable.
                *slot = None;
                Ok(())
            }
            _ => Err(Error::Missing(addr)),
        }
    }

    /// Enables or disables the breakpoint at an address.
    ///
    /// # Errors
    ///
    /// Errors if no breakpoint exists there.
    pub fn set_breakpoint_enabled(&mut self, addr: Word, enable: bool) -> Result<()> {
        match self.bpts.get_mut(&addr) {
            Some(Some(bpt)) => {
                bpt.enable = enable;
                Ok(())
            }
            _ => Err(Error::Missing(addr)),
        }
    }

    /// Live breakpoints in creation order.
    pub fn breakpoints(&self) -> impl Iterator<Item = (Word, &Breakpoint)> {
        self.bpts
            .iter()
            .filter_map(|(&addr, slot)| slot.as_ref().map(|bpt| (addr, bpt)))
    }

    /// Creates a watchpoint and returns its ID.
    pub fn add_watchpoint(&mut self, addr: Word, kind: Watch) -> u32 {
        self.next += 1;
        let id = self.next;
        self.wpts.insert(
            id,
            Watchpoint {
                id,
                addr,
                kind,
                enable: true,
                hits: 0,
            },
        );
        id
    }

    /// Removes a watchpoint by ID.
    ///
    /// # Errors
    ///
    /// Errors if the ID is unknown.
    pub fn remove_watchpoint(&mut self, id: u32) -> Result<()> {
        self.wpts
            .shift_remove(&id)
            .map(|_| ())
            .ok_or(Error::MissingWatch(id))
    }

    /// Watchpoints in creation order.
    pub fn watchpoints(&self) -> impl Iterator<Item = &Watchpoint> {
        self.wpts.values()
    }

    /// Executes exactly one instruction and reports the boundary.
    ///
    /// Breakpoints are not consulted; watchpoints, trace, and statistics
    /// observe the instruction as usual.
    pub fn step(&mut self, vm: &mut Machine) -> Stop {
        let stop = self.exec_one(vm);
        if matches!(stop, Stop::Step | Stop::Watchpoint { .. }) {
            vm.status = Status::Paused;
        }
        stop
    }

    /// Steps over a call: a call instruction runs to its return address
    /// (same frame or above); anything else is a plain step. User
    /// breakpoints and watchpoints win over the internal return stop.
    pub fn step_over(
        &mut self,
        vm: &mut Machine,
        cancel: &AtomicBool,
        limit: u64,
    ) -> Stop {
        let pc = vm.cpu.reg.pc();
        match vm.cpu.insn_at(pc) {
            Ok(insn) if insn.is_call() => {
                self.shot = Some(Shot {
                    addr: pc.wrapping_add(4),
                    sp: vm.cpu.reg.get(SP),
                });
                let stop = self.resume(vm, cancel, limit, true);
                self.shot = None;
                stop
            }
            _ => self.step(vm),
        }
    }

    /// Runs until the current function returns, via a one-shot breakpoint
    /// at the link register.
    ///
    /// # Errors
    ///
    /// Errors when LR does not point into executable memory.
    pub fn step_out(
        &mut self,
        vm: &mut Machine,
        cancel: &AtomicBool,
        limit: u64,
    ) -> Result<Stop> {
        let lr = vm.cpu.reg.get(LR) & !0b11;
        if !vm
            .cpu
            .mem
            .region_at(lr)
            .is_some_and(|region| region.perms.exec)
        {
            return Err(Error::NoReturn(lr));
        }
        self.shot = Some(Shot {
            addr: lr,
            sp: vm.cpu.reg.get(SP),
        });
        let stop = self.resume(vm, cancel, limit, true);
        self.shot = None;
        Ok(stop)
    }

    /// Runs freely until something stops execution.
    ///
    /// Per iteration: observe the cancellation flag, check the cycle
    /// budget, check breakpoints at the current PC, execute one
    /// instruction, then check watchpoints.
    ///
    /// `first` marks the opening call of a fresh logical run: only there
    /// is the breakpoint check skipped for the starting instruction, so
    /// resuming from a breakpoint makes progress. A caller slicing one
    /// run into several `resume` calls must pass `false` on every
    /// continuation so a breakpoint sitting at a slice's starting PC
    /// still fires.
    pub fn resume(
        &mut self,
        vm: &mut Machine,
        cancel: &AtomicBool,
        limit: u64,
        mut first: bool,
    ) -> Stop {
        let start = vm.cpu.cycles;
        loop {
            if cancel.load(Ordering::Relaxed) {
                vm.status = Status::Paused;
                return Stop::Pause;
            }
            if vm.cpu.cycles.wrapping_sub(start) >= limit {
                vm.status = Status::Paused;
                return Stop::Limit;
            }
            let pc = vm.cpu.reg.pc();
            if !first {
                if let Some(stop) = self.hit_breakpoint(vm, pc) {
                    vm.status = Status::Paused;
                    return stop;
                }
                if let Some(shot) = self.shot {
                    if shot.addr == pc && vm.cpu.reg.get(SP) >= shot.sp {
                        vm.status = Status::Paused;
                        return Stop::Step;
                    }
                }
            }
            first = false;
            vm.status = Status::Running;
            match self.exec_one(vm) {
                Stop::Step => {}
                stop @ Stop::Watchpoint { .. } => {
                    vm.status = Status::Paused;
                    return stop;
                }
                stop => return stop,
            }
        }
    }

    /// Evaluates the breakpoint at an address, bumping its hit count when
    /// it fires.
    fn hit_breakpoint(&mut self, vm: &Machine, pc: Word) -> Option<Stop> {
        let bpt = self.bpts.get_mut(&pc)?.as_mut()?;
        if !bpt.enable {
            return None;
        }
        if let Some((src, expr)) = &bpt.cond {
            match expr.eval(vm) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(err) => {
                    // A broken condition fires rather than silently
                    // skipping a requested stop.
                    warn!("breakpoint condition `{src}`: {err}");
                }
            }
        }
        bpt.hits += 1;
        Some(Stop::Breakpoint(pc))
    }

    /// Executes one instruction with the post-execute hooks: trace,
    /// statistics, and the watchpoint check against the access records.
    fn exec_one(&mut self, vm: &mut Machine) -> Stop {
        let pc = vm.cpu.reg.pc();
        let insn = vm.cpu.insn_at(pc).ok();
        let before = vm.cpu.cycles;
        match vm.step() {
            Ok(step) => {
                if !matches!(step, CoreStep::Blocked) {
                    if let Some(insn) = &insn {
                        self.observe(vm, insn, vm.cpu.cycles.wrapping_sub(before));
                    }
                }
                match step {
                    CoreStep::Halted => Stop::Halt,
                    CoreStep::Blocked => Stop::Input,
                    CoreStep::Done => match self.hit_watchpoint(vm) {
                        Some((id, addr)) => Stop::Watchpoint { id, addr },
                        None => Stop::Step,
                    },
                }
            }
            Err(_) => Stop::Fault,
        }
    }

    /// Feeds the trace and statistics hooks.
    fn observe(&mut self, vm: &Machine, insn: &Insn, delta: u64) {
        if self.trace.enabled() {
            self.trace.push(trace::Entry {
                pc: insn.addr,
                code: insn.code,
                text: insn.to_string(),
                regs: vm.registers(),
                cpsr: vm.cpu.reg.cpsr.bits(),
                cycles: vm.cpu.cycles,
                at: SystemTime::now(),
            });
        }
        if self.stats.enabled() {
            self.stats.record(insn, vm, delta);
        }
    }

    /// Matches the access records against the watchpoint table.
    fn hit_watchpoint(&mut self, vm: &Machine) -> Option<(u32, Word)> {
        let read = vm.cpu.mem.last_read();
        let write = vm.cpu.mem.last_write();
        let overlaps = |access: Option<Access>, at: Word| {
            access.is_some_and(|access| {
                access.addr < at.wrapping_add(4)
                    && at < access.addr.wrapping_add(access.width.size())
            })
        };
        for wpt in self.wpts.values_mut() {
            if !wpt.enable {
                continue;
            }
            let hit = match wpt.kind {
                Watch::Read => overlaps(read, wpt.addr),
                Watch::Write => overlaps(write, wpt.addr),
                Watch::Access => overlaps(read, wpt.addr) || overlaps(write, wpt.addr),
            };
            if hit {
                wpt.hits += 1;
                return Some((wpt.id, wpt.addr));
            }
        }
        None
    }

    /// Executes a free-form command line, returning its rendered output.
    ///
    /// # Errors
    ///
    /// Errors on parse failures and command-level failures; execution
    /// commands honour the cancellation flag and cycle budget.
    pub fn command(
        &mut self,
        vm: &mut Machine,
        input: &str,
        cancel: &AtomicBool,
        limit: u64,
    ) -> Result<String> {
        match lang::command(input)? {
            Some(cmd) => exec::dispatch(self, vm, cmd, cancel, limit),
            None => Ok(String::new()),
        }
    }

    /// Drops debugger state that belongs to a program run, keeping
    /// breakpoints and watchpoints (the restart contract).
    pub fn on_restart(&mut self) {
        self.shot = None;
        self.trace.clear();
        self.stats.clear();
    }

    /// Drops all debugger state (the reset contract).
    pub fn clear(&mut self) {
        let cap_trace = std::mem::take(&mut self.trace);
        *self = Self::default();
        self.trace = Trace::new(cap_trace.capacity());
    }
}

/// A type specifying categories of [`Debugger`] errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Duplicate breakpoint.
    #[error("breakpoint already exists at {0:#010x}")]
    Exists(Word),
    /// No breakpoint at the address.
    #[error("no breakpoint at {0:#010x}")]
    Missing(Word),
    /// No watchpoint with the ID.
    #[error("no watchpoint {0}")]
    MissingWatch(u32),
    /// Address outside the source map.
    #[error("{0:#010x} is not an instruction address")]
    NotCode(Word),
    /// LR does not hold a plausible return address.
    #[error("{0:#010x} is not a return address")]
    NoReturn(Word),
    /// Unknown watchpoint kind string.
    #[error("unknown watchpoint kind `{0}`")]
    WatchKind(String),
    /// Command language failure.
    #[error(transparent)]
    Language(#[from] lang::Error),
    /// Expression evaluation failure.
    #[error(transparent)]
    Eval(#[from] lang::Eval),
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_CANCEL: AtomicBool = AtomicBool::new(false);
    const LIMIT: u64 = 1_000_000;

    fn boot(source: &str) -> Machine {
        let prog = armlet_asm::assemble(source).expect("test program assembles");
        let mut vm = Machine::default();
        vm.load(prog).expect("test program loads");
        vm
    }

    #[test]
    fn breakpoints_stop_a_free_run() {
        let mut vm = boot(
            ".org 0x8000\n\
             MOV R0, #0\n\
             loop: ADD R0, R0, #1\n\
             CMP R0, #5\n\
             BLT loop\n\
             SWI #0\n",
        );
        let mut dbg = Debugger::default();
        dbg.add_breakpoint(&vm, 0x8008, None).unwrap();
        let stop = dbg.resume(&mut vm, &NO_CANCEL, LIMIT, true);
        assert_eq!(stop, Stop::Breakpoint(0x8008));
        assert_eq!(vm.status, Status::Paused);
        assert_eq!(vm.cpu.reg.pc(), 0x8008);
        assert_eq!(vm.registers()[0], 1);
        assert_eq!(dbg.breakpoints().next().unwrap().1.hits, 1);
        // Resuming from the breakpoint makes progress and re-fires.
        let stop = dbg.resume(&mut vm, &NO_CANCEL, LIMIT, true);
        assert_eq!(stop, Stop::Breakpoint(0x8008));
        assert_eq!(vm.registers()[0], 2);
    }

    #[test]
    fn conditional_breakpoints_check_truthiness() {
        let mut vm = boot(
            ".org 0x8000\n\
             MOV R0, #0\n\
             loop: ADD R0, R0, #1\n\
             CMP R0, #5\n\
             BLT loop\n\
             SWI #0\n",
        );
        let mut dbg = Debugger::default();
        dbg.add_breakpoint(&vm, 0x8008, Some("r0 - 3")).unwrap();
        let stop = dbg.resume(&mut vm, &NO_CANCEL, LIMIT, true);
        // Fires only once the condition is non-zero: r0 == 1.
        assert_eq!(stop, Stop::Breakpoint(0x8008));
        assert_eq!(vm.registers()[0], 1);
        dbg.remove_breakpoint(0x8008).unwrap();
        dbg.add_breakpoint(&vm, 0x8008, Some("r0 - 1")).unwrap();
        let stop = dbg.resume(&mut vm, &NO_CANCEL, LIMIT, true);
        assert_eq!(stop, Stop::Breakpoint(0x8008));
        assert_eq!(vm.registers()[0], 2);
    }

    #[test]
    fn breakpoints_validate_and_deduplicate() {
        let vm = boot(".org 0x8000\nMOV R0, #0\nSWI #0\n");
        let mut dbg = Debugger::default();
        assert!(matches!(
            dbg.add_breakpoint(&vm, 0x9000, None),
            Err(Error::NotCode(0x9000))
        ));
        dbg.add_breakpoint(&vm, 0x8000, None).unwrap();
        assert!(matches!(
            dbg.add_breakpoint(&vm, 0x8000, None),
            Err(Error::Exists(0x8000))
        ));
        dbg.remove_breakpoint(0x8000).unwrap();
        assert_eq!(dbg.breakpoints().count(), 0);
        assert!(dbg.remove_breakpoint(0x8000).is_err());
    }

    #[test]
    fn write_watchpoints_fire_after_the_store() {
        let mut vm = boot(
            ".org 0x8000\n\
             MOV R0, #0xab\n\
             MOV R1, #0x10000\n\
             STR R0, [R1]\n\
             SWI #0\n",
        );
        let mut dbg = Debugger::default();
        let id = dbg.add_watchpoint(0x1_0000, Watch::Write);
        let stop = dbg.resume(&mut vm, &NO_CANCEL, LIMIT, true);
        assert_eq!(stop, Stop::Watchpoint { id, addr: 0x1_0000 });
        assert_eq!(vm.status, Status::Paused);
        let write = vm.cpu.mem.last_write().unwrap();
        assert_eq!(write.addr, 0x1_0000);
        assert_eq!(write.width.size(), 4);
    }

    #[test]
    fn read_watchpoints_track_loads() {
        let mut vm = boot(
            ".org 0x8000\n\
             MOV R1, #0x10000\n\
             STR R1, [R1]\n\
             LDR R2, [R1]\n\
             SWI #0\n",
        );
        let mut dbg = Debugger::default();
        let id = dbg.add_watchpoint(0x1_0000, Watch::Read);
        let stop = dbg.resume(&mut vm, &NO_CANCEL, LIMIT, true);
        // The store does not fire it; the load does.
        assert_eq!(stop, Stop::Watchpoint { id, addr: 0x1_0000 });
        assert_eq!(vm.cpu.reg.pc(), 0x800c);
    }

    #[test]
    fn step_over_skips_a_call_in_one_operation() {
        let mut vm = boot(
            ".org 0x8000\n\
             BL f\n\
             MOV R0, #1\n\
             SWI #0\n\
             f: MOV R1, #2\n\
             MOV PC, LR\n",
        );
        let mut dbg = Debugger::default();
        let stop = dbg.step_over(&mut vm, &NO_CANCEL, LIMIT);
        assert_eq!(stop, Stop::Step);
        assert_eq!(vm.cpu.reg.pc(), 0x8004);
        assert_eq!(vm.registers()[1], 2);
        // A plain instruction just steps.
        let stop = dbg.step_over(&mut vm, &NO_CANCEL, LIMIT);
        assert_eq!(stop, Stop::Step);
        assert_eq!(vm.cpu.reg.pc(), 0x8008);
    }

    #[test]
    fn user_breakpoints_win_over_step_over() {
        let mut vm = boot(
            ".org 0x8000\n\
             BL f\n\
             MOV R0, #1\n\
             SWI #0\n\
             f: MOV R1, #2\n\
             MOV PC, LR\n",
        );
        let mut dbg = Debugger::default();
        dbg.add_breakpoint(&vm, 0x800c, None).unwrap();
        let stop = dbg.step_over(&mut vm, &NO_CANCEL, LIMIT);
        assert_eq!(stop, Stop::Breakpoint(0x800c));
        assert_eq!(vm.cpu.reg.pc(), 0x800c);
    }

    #[test]
    fn step_out_returns_to_the_caller() {
        let mut vm = boot(
            ".org 0x8000\n\
             BL f\n\
             MOV R0, #1\n\
             SWI #0\n\
             f: MOV R1, #2\n\
             MOV R2, #3\n\
             MOV PC, LR\n",
        );
        let mut dbg = Debugger::default();
        // Step into the callee.
        dbg.step(&mut vm);
        assert_eq!(vm.cpu.reg.pc(), 0x800c);
        let stop = dbg.step_out(&mut vm, &NO_CANCEL, LIMIT).unwrap();
        assert_eq!(stop, Stop::Step);
        assert_eq!(vm.cpu.reg.pc(), 0x8004);
        // With a garbage LR, step-out refuses.
        vm.cpu.reg.set(LR, 0x100);
        assert!(matches!(
            dbg.step_out(&mut vm, &NO_CANCEL, LIMIT),
            Err(Error::NoReturn(_))
        ));
    }

    #[test]
    fn cancellation_pauses_between_instructions() {
        let mut vm = boot(".org 0x8000\nloop: B loop\n");
        let mut dbg = Debugger::default();
        let cancel = AtomicBool::new(true);
        let stop = dbg.resume(&mut vm, &cancel, LIMIT, true);
        assert_eq!(stop, Stop::Pause);
        assert_eq!(vm.status, Status::Paused);
    }

    #[test]
    fn cycle_budget_caps_a_run() {
        let mut vm = boot(".org 0x8000\nloop: B loop\n");
        let mut dbg = Debugger::default();
        let stop = dbg.resume(&mut vm, &NO_CANCEL, 100, true);
        assert_eq!(stop, Stop::Limit);
        assert_eq!(vm.status, Status::Paused);
    }

    #[test]
    fn trace_and_stats_observe_execution() {
        let mut vm = boot(
            ".org 0x8000\n\
             MOV R0, #10\n\
             MOV R1, #20\n\
             ADD R2, R0, R1\n\
             SWI #0\n",
        );
        let mut dbg = Debugger::default();
        dbg.trace.set_enabled(true);
        dbg.stats.set_enabled(true);
        let stop = dbg.resume(&mut vm, &NO_CANCEL, LIMIT, true);
        assert_eq!(stop, Stop::Halt);
        assert_eq!(dbg.trace.len(), 4);
        let first = dbg.trace.entries().next().unwrap();
        assert_eq!(first.pc, 0x8000);
        assert_eq!(first.text, "MOV R0, #0xa");
        assert_eq!(dbg.stats.instructions, 4);
        assert_eq!(dbg.stats.mnemonics.get("MOV"), Some(&2));
        assert_eq!(dbg.stats.mnemonics.get("ADD"), Some(&1));
        assert_eq!(dbg.stats.swis, 1);
    }

    #[test]
    fn faults_surface_as_stops() {
        let mut vm = boot(".org 0x8000\nMOV R1, #0\nLDR R0, [R1]\nSWI #0\n");
        let mut dbg = Debugger::default();
        let stop = dbg.resume(&mut vm, &NO_CANCEL, LIMIT, true);
        assert_eq!(stop, Stop::Fault);
        assert_eq!(vm.status, Status::Error);
        assert_eq!(vm.cpu.reg.pc(), 0x8004);
    }

    #[test]
    fn restart_keeps_points_and_clears_the_run() {
        let mut vm = boot(".org 0x8000\nMOV R0, #1\nSWI #0\n");
        let mut dbg = Debugger::default();
        dbg.add_breakpoint(&vm, 0x8004, None).unwrap();
        dbg.add_watchpoint(0x1_0000, Watch::Access);
        dbg.trace.set_enabled(true);
        dbg.resume(&mut vm, &NO_CANCEL, LIMIT, true);
        dbg.on_restart();
        assert_eq!(dbg.breakpoints().count(), 1);
        assert_eq!(dbg.watchpoints().count(), 1);
        assert!(dbg.trace.is_empty());
        dbg.clear();
        assert_eq!(dbg.breakpoints().count(), 0);
        assert_eq!(dbg.watchpoints().count(), 0);
    }

    #[test]
    fn command_line_round_trip() {
        let mut vm = boot(
            ".org 0x8000\n\
             _start: MOV R0, #7\n\
             SWI #0\n",
        );
        let mut dbg = Debugger::default();
        let out = dbg
            .command(&mut vm, "break 0x8004", &NO_CANCEL, LIMIT)
            .unwrap();
        assert!(out.contains("0x00008004"));
        let out = dbg.command(&mut vm, "step", &NO_CANCEL, LIMIT).unwrap();
        assert!(out.contains("0x00008004"));
        let out = dbg.command(&mut vm, "print r0 * 2", &NO_CANCEL, LIMIT).unwrap();
        assert!(out.contains("14"));
        let out = dbg
            .command(&mut vm, "info registers", &NO_CANCEL, LIMIT)
            .unwrap();
        assert!(out.contains("r0: 00000007"));
        let out = dbg
            .command(&mut vm, "info breakpoints", &NO_CANCEL, LIMIT)
            .unwrap();
        assert!(out.contains("0x00008004"));
        assert!(dbg.command(&mut vm, "", &NO_CANCEL, LIMIT).unwrap().is_empty());
    }
}
