//! Per-session debugger service.
//!
//! Transport-neutral operations over one session's VM + debugger pair.
//! Every mutating operation takes the session lock, so transport
//! concurrency can never interleave a step with a reset. Events are
//! published while the lock is held, which keeps them in occurrence order.
//!
//! `run` spawns a cooperative executor task that re-acquires the lock in
//! bounded batches, polls the cancellation flag between instructions, and
//! parks on the stdin notify while the program waits for input.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use armlet::arch::reg::SP;
use armlet::arch::Word;
use armlet::core::Status;
use armlet::dbg::{lang, Stop, Watch};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::cfg::{MAX_DISASM, MAX_READ_LEN, MAX_SOURCE_LEN, MAX_STDIN, RUN_BATCH};
use crate::err::{fault_kind, ApiError, Kind};
use crate::evt::{EventData, OutputData, Payload, StateData};
use crate::session::{Inner, Session};

/// Which step flavour a step request selects.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepKind {
    /// One instruction.
    Into,
    /// Step over calls.
    Over,
    /// Run until the current function returns.
    Out,
}

/// Summary row for `GET /session`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Session ID.
    pub id: Uuid,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Current status wire name.
    pub status: &'static str,
}

/// Body of `GET /session/{id}`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Info {
    /// Current status wire name.
    pub status: &'static str,
    /// Current program counter.
    pub pc: Word,
    /// Executed cycles.
    pub cycles: u64,
    /// Whether the last step stored to memory.
    pub has_write: bool,
    /// Address of that store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_addr: Option<Word>,
    /// Width of that store in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_size: Option<u32>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// One reported assembly diagnostic.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadError {
    /// 1-based source line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
    /// Message.
    pub message: String,
}

/// Body of `POST /session/{id}/load`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReply {
    /// Whether the program is now loaded.
    pub success: bool,
    /// Symbol table, present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbols: Option<Vec<Symbol>>,
    /// Diagnostics, present on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<LoadError>>,
}

/// One symbol table entry.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
    /// Symbol name.
    pub name: String,
    /// Resolved address or value.
    pub address: Word,
}

/// Register snapshot returned by step and inspection requests.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registers {
    /// R0..R15, raw values.
    pub registers: [Word; 16],
    /// Status register.
    pub cpsr: Word,
    /// Current program counter (raw, not pipelined).
    pub pc: Word,
    /// Executed cycles.
    pub cycles: u64,
    /// Current status wire name.
    pub status: &'static str,
}

/// Body of `GET /session/{id}/memory`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryReply {
    /// Start address.
    pub address: Word,
    /// Byte count.
    pub length: usize,
    /// The bytes.
    pub data: Vec<u8>,
}

/// One disassembled instruction.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisasmLine {
    /// Instruction address.
    pub address: Word,
    /// Raw encoding.
    pub opcode: Word,
    /// Mnemonic with suffixes.
    pub mnemonic: String,
    /// Operand text.
    pub operands: String,
    /// Symbol defined at this address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

/// One source map entry.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLine {
    /// Instruction address.
    pub address: Word,
    /// Source text.
    pub line: String,
    /// 1-based source line number.
    pub line_number: u32,
}

/// One breakpoint row.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointRow {
    /// Breakpoint address.
    pub address: Word,
    /// Whether it fires.
    pub enabled: bool,
    /// Times it has fired.
    pub hits: u64,
    /// Condition source, when conditional.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// One watchpoint row.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchpointRow {
    /// Watchpoint ID.
    pub id: u32,
    /// Watched address.
    pub address: Word,
    /// Kind wire name.
    pub kind: String,
    /// Whether it fires.
    pub enabled: bool,
    /// Times it has fired.
    pub hits: u64,
}

/// One trace entry on the wire.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRow {
    /// Instruction address.
    pub pc: Word,
    /// Raw encoding.
    pub opcode: Word,
    /// Disassembled text.
    pub text: String,
    /// Register snapshot after execution.
    pub registers: [Word; 16],
    /// CPSR after execution.
    pub cpsr: Word,
    /// Cycle counter after execution.
    pub cycles: u64,
    /// Capture time, milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Statistics on the wire.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReply {
    /// Whether collection is on.
    pub enabled: bool,
    /// Instructions executed.
    pub instructions: u64,
    /// Cycles spent.
    pub cycles: u64,
    /// Executions per mnemonic.
    pub mnemonics: Vec<(String, u64)>,
    /// Branches taken.
    pub branches_taken: u64,
    /// Branches not taken.
    pub branches_skipped: u64,
    /// Loads by width [byte, half, word].
    pub loads: [u64; 3],
    /// Stores by width [byte, half, word].
    pub stores: [u64; 3],
    /// Software interrupts.
    pub swis: u64,
    /// Wall-clock milliseconds collecting.
    pub wall_millis: u128,
}

/// One stack window row.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackRow {
    /// Word address.
    pub address: Word,
    /// Word value.
    pub value: Word,
}

/// Stdin request body.
#[derive(Clone, Debug, Deserialize)]
pub struct StdinBody {
    /// Bytes to queue.
    pub data: String,
}

impl Session {
    fn publish(&self, payload: Payload) {
        let _ = self.events.send(crate::evt::Envelope {
            session_id: self.id,
            payload,
        });
    }

    /// Drains freshly written console bytes into an output event.
    fn flush_output(&self, inner: &mut Inner) {
        if let Some(content) = inner.vm.cpu.con.drain_fresh() {
            self.publish(Payload::Output(OutputData {
                stream: "stdout",
                content,
            }));
        }
    }

    fn publish_state(&self, inner: &Inner) {
        self.publish(Payload::State(StateData {
            status: inner.vm.status.name(),
            pc: Some(inner.vm.cpu.reg.pc()),
            registers: Some(inner.vm.registers()),
        }));
    }

    fn publish_event(&self, event: &'static str, address: Option<Word>, message: Option<String>) {
        self.publish(Payload::Event(EventData {
            event,
            address,
            message,
        }));
    }

    /// Publishes the aftermath of a stop: output first (program order),
    /// then the state it produced, then the event that depends on it.
    fn emit_stop(&self, inner: &mut Inner, stop: Stop) {
        self.flush_output(inner);
        self.publish_state(inner);
        match stop {
            Stop::Breakpoint(addr) => self.publish_event("breakpoint_hit", Some(addr), None),
            Stop::Watchpoint { id, addr } => self.publish_event(
                "watchpoint_hit",
                Some(addr),
                Some(format!("watchpoint {id}")),
            ),
            Stop::Halt => self.publish_event("halted", None, None),
            Stop::Fault => {
                let (kind, addr) = self.classify_fault(inner);
                let message = inner.vm.fault().map(|fault| {
                    format!("{}: {fault}", kind.name())
                });
                self.publish_event("error", addr, message);
            }
            Stop::Limit => {}
            Stop::Step | Stop::Pause | Stop::Input => {}
        }
    }

    fn classify_fault(&self, inner: &Inner) -> (Kind, Option<Word>) {
        inner.vm.fault().map_or((Kind::MemoryFault, None), |fault| {
            let sp = inner.vm.cpu.reg.get(SP);
            let overflow = inner.vm.is_stack_overflow(sp)
                || matches!(
                    fault,
                    armlet::core::Error::Memory(err) if inner.vm.is_stack_overflow(err.addr())
                );
            fault_kind(fault, overflow)
        })
    }

    /// Interrupts any active executor so the caller can take the lock for
    /// a state-replacing operation.
    fn interrupt(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.cancel.store(true, Ordering::SeqCst);
        self.stdin.notify_one();
    }

    fn registers_of(inner: &Inner) -> Registers {
        Registers {
            registers: inner.vm.registers(),
            cpsr: inner.vm.cpu.reg.cpsr.bits(),
            pc: inner.vm.cpu.reg.pc(),
            cycles: inner.vm.cpu.cycles,
            status: inner.vm.status.name(),
        }
    }

    /// Summary row for the session list.
    pub async fn summary(&self) -> Summary {
        let inner = self.state.lock().await;
        Summary {
            id: self.id,
            created_at: self.created_at,
            status: inner.vm.status.name(),
        }
    }

    /// `GET /session/{id}`.
    pub async fn info(&self) -> Info {
        self.touch();
        let inner = self.state.lock().await;
        let write = inner.vm.cpu.mem.last_write();
        Info {
            status: inner.vm.status.name(),
            pc: inner.vm.cpu.reg.pc(),
            cycles: inner.vm.cpu.cycles,
            has_write: write.is_some(),
            write_addr: write.map(|access| access.addr),
            write_size: write.map(|access| access.width.size()),
            created_at: self.created_at,
        }
    }

    /// Assembles and loads source. Parse failures report diagnostics and
    /// leave any previously loaded program intact.
    ///
    /// # Errors
    ///
    /// Errors on over-size source or a program that does not fit the
    /// memory map.
    pub async fn load(&self, source: &str) -> Result<LoadReply, ApiError> {
        if source.len() > MAX_SOURCE_LEN {
            return Err(ApiError::invalid("source too large"));
        }
        self.touch();
        self.interrupt();
        let mut inner = self.state.lock().await;
        match armlet::asm::assemble(source) {
            Err(notes) => Ok(LoadReply {
                success: false,
                symbols: None,
                errors: Some(
                    notes
                        .into_iter()
                        .map(|note| LoadError {
                            line: note.line,
                            column: note.col,
                            message: note.msg,
                        })
                        .collect(),
                ),
            }),
            Ok(prog) => {
                inner.vm.load(prog).map_err(|err| {
                    ApiError::invalid("program does not fit the memory map")
                        .detail(err.to_string())
                })?;
                inner.dbg.clear();
                debug!(session = %self.id, "program loaded");
                self.publish_state(&inner);
                Ok(LoadReply {
                    success: true,
                    symbols: Some(
                        inner
                            .vm
                            .source_map()
                            .symbols()
                            .map(|(name, address)| Symbol {
                                name: name.to_string(),
                                address,
                            })
                            .collect(),
                    ),
                    errors: None,
                })
            }
        }
    }

    /// One step / step-over / step-out operation.
    ///
    /// # Errors
    ///
    /// Errors when no program is loaded, a run is active, or the machine
    /// is finished.
    pub async fn step(&self, kind: StepKind) -> Result<Registers, ApiError> {
        self.touch();
        let mut guard = self.state.lock().await;
        match guard.vm.status {
            Status::Idle => return Err(ApiError::invalid("no program loaded")),
            Status::Running => return Err(ApiError::invalid("session is running; stop it first")),
            Status::Halted | Status::Error => {
                return Err(ApiError::invalid("program is finished; reset or restart"))
            }
            Status::Loaded | Status::Paused | Status::WaitingForInput => {}
        }
        self.cancel.store(false, Ordering::SeqCst);
        let limit = guard.cfg.max_cycles;
        let Inner { vm, dbg, .. } = &mut *guard;
        let stop = match kind {
            StepKind::Into => dbg.step(vm),
            StepKind::Over => dbg.step_over(vm, &self.cancel, limit),
            StepKind::Out => dbg.step_out(vm, &self.cancel, limit).map_err(ApiError::from)?,
        };
        self.emit_stop(&mut guard, stop);
        Ok(Self::registers_of(&guard))
    }

    /// Starts (or restarts, after a halt) free-running execution.
    ///
    /// # Errors
    ///
    /// Errors when no program is loaded.
    pub async fn run(self: &Arc<Self>) -> Result<(), ApiError> {
        self.touch();
        let mut inner = self.state.lock().await;
        match inner.vm.status {
            Status::Idle => return Err(ApiError::invalid("no program loaded")),
            Status::Running => return Ok(()),
            Status::Halted | Status::Error => {
                // Implicit restart so "run it again" is a single call.
                inner.vm.reset();
                inner.dbg.on_restart();
            }
            Status::Loaded | Status::Paused | Status::WaitingForInput => {}
        }
        inner.vm.status = Status::Running;
        self.publish_state(&inner);
        drop(inner);
        self.cancel.store(false, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        let session = Arc::clone(self);
        tokio::spawn(session.run_task());
        Ok(())
    }

    /// The cooperative run executor.
    async fn run_task(self: Arc<Self>) {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let mut spent: u64 = 0;
        // Only the opening batch of the run may skip the breakpoint check
        // for its starting instruction; batch boundaries are invisible to
        // the client, so a breakpoint sitting at a later batch's starting
        // PC must still fire.
        let mut fresh = true;
        loop {
            let mut guard = self.state.lock().await;
            if self.epoch.load(Ordering::SeqCst) != epoch {
                // The session was re-loaded or destroyed under us; the
                // fresh state is not ours to touch.
                break;
            }
            if self.cancel.load(Ordering::SeqCst) {
                guard.vm.status = Status::Paused;
                self.emit_stop(&mut guard, Stop::Pause);
                break;
            }
            if guard.vm.status == Status::WaitingForInput
                && guard.vm.cpu.con.pending_input() == 0
            {
                drop(guard);
                self.stdin.notified().await;
                continue;
            }
            let total = guard.cfg.max_cycles;
            let batch = RUN_BATCH.min(total.saturating_sub(spent)).max(1);
            let before = guard.vm.cpu.cycles;
            let Inner { vm, dbg, .. } = &mut *guard;
            let stop = dbg.resume(vm, &self.cancel, batch, fresh);
            spent += vm.cpu.cycles.wrapping_sub(before);
            // A blocked read rewinds the PC onto an instruction the run
            // already carried past its breakpoint check; the retry must
            // not re-fire it.
            fresh = matches!(stop, Stop::Input);
            match stop {
                Stop::Limit if spent < total => {
                    // Batch boundary: release the lock so other requests
                    // can observe state, then continue.
                    guard.vm.status = Status::Running;
                    self.flush_output(&mut guard);
                    drop(guard);
                    tokio::task::yield_now().await;
                }
                Stop::Limit => {
                    self.emit_stop(&mut guard, stop);
                    self.publish_event(
                        "cycle_limit_exceeded",
                        None,
                        Some(format!("stopped after {spent} cycles")),
                    );
                    break;
                }
                Stop::Input => {
                    self.emit_stop(&mut guard, stop);
                    // Loop around and park on stdin.
                }
                Stop::Step | Stop::Pause => {
                    self.emit_stop(&mut guard, Stop::Pause);
                    break;
                }
                Stop::Breakpoint(_) | Stop::Watchpoint { .. } | Stop::Halt | Stop::Fault => {
                    self.emit_stop(&mut guard, stop);
                    break;
                }
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }

    /// Requests cancellation; idempotent and non-blocking.
    pub fn stop(&self) {
        self.touch();
        self.cancel.store(true, Ordering::SeqCst);
        self.stdin.notify_one();
    }

    /// Reset: back to the loaded program's entry state, debugger cleared.
    pub async fn reset(&self) {
        self.touch();
        self.interrupt();
        let mut inner = self.state.lock().await;
        inner.vm.reset();
        inner.dbg.clear();
        self.publish_state(&inner);
    }

    /// Restart: like reset, but breakpoints and watchpoints survive.
    pub async fn restart(&self) {
        self.touch();
        self.interrupt();
        let mut inner = self.state.lock().await;
        inner.vm.reset();
        inner.dbg.on_restart();
        self.publish_state(&inner);
    }

    /// Queues stdin bytes. If the program is parked on input and no
    /// executor is active, the blocked step is completed here; an active
    /// executor is woken instead.
    ///
    /// # Errors
    ///
    /// Errors on an over-size submission.
    pub async fn send_stdin(&self, data: &str) -> Result<(), ApiError> {
        if data.len() > MAX_STDIN {
            return Err(ApiError::invalid("stdin submission too large"));
        }
        self.touch();
        let mut guard = self.state.lock().await;
        guard.vm.cpu.con.feed(data.as_bytes());
        if guard.vm.status == Status::WaitingForInput {
            if self.running.load(Ordering::SeqCst) {
                drop(guard);
                self.stdin.notify_one();
            } else {
                // A bare Step parked here; complete that one step now.
                let Inner { vm, dbg, .. } = &mut *guard;
                let stop = dbg.step(vm);
                self.emit_stop(&mut guard, stop);
            }
        }
        Ok(())
    }

    /// Breakpoint management.
    ///
    /// # Errors
    ///
    /// Errors on invalid addresses, duplicates, or broken conditions.
    pub async fn add_breakpoint(
        &self,
        addr: Word,
        cond: Option<&str>,
    ) -> Result<(), ApiError> {
        self.touch();
        let mut guard = self.state.lock().await;
        let Inner { vm, dbg, .. } = &mut *guard;
        dbg.add_breakpoint(vm, addr, cond)?;
        Ok(())
    }

    /// Removes a breakpoint.
    ///
    /// # Errors
    ///
    /// Errors when none exists at the address.
    pub async fn remove_breakpoint(&self, addr: Word) -> Result<(), ApiError> {
        self.touch();
        let mut inner = self.state.lock().await;
        inner.dbg.remove_breakpoint(addr)?;
        Ok(())
    }

    /// Lists breakpoints as defensive copies.
    pub async fn breakpoints(&self) -> Vec<BreakpointRow> {
        self.touch();
        let inner = self.state.lock().await;
        inner
            .dbg
            .breakpoints()
            .map(|(address, bpt)| BreakpointRow {
                address,
                enabled: bpt.enable,
                hits: bpt.hits,
                condition: bpt.cond.as_ref().map(|(src, _)| src.clone()),
            })
            .collect()
    }

    /// Adds a watchpoint of the given kind.
    ///
    /// # Errors
    ///
    /// Errors on an unknown kind string.
    pub async fn add_watchpoint(&self, addr: Word, kind: &str) -> Result<u32, ApiError> {
        self.touch();
        let kind: Watch = kind.parse().map_err(ApiError::from)?;
        let mut inner = self.state.lock().await;
        Ok(inner.dbg.add_watchpoint(addr, kind))
    }

    /// Removes a watchpoint by ID.
    ///
    /// # Errors
    ///
    /// Errors when the ID is unknown.
    pub async fn remove_watchpoint(&self, id: u32) -> Result<(), ApiError> {
        self.touch();
        let mut inner = self.state.lock().await;
        inner.dbg.remove_watchpoint(id)?;
        Ok(())
    }

    /// Lists watchpoints as defensive copies.
    pub async fn watchpoints(&self) -> Vec<WatchpointRow> {
        self.touch();
        let inner = self.state.lock().await;
        inner
            .dbg
            .watchpoints()
            .map(|wpt| WatchpointRow {
                id: wpt.id,
                address: wpt.addr,
                kind: wpt.kind.to_string(),
                enabled: wpt.enable,
                hits: wpt.hits,
            })
            .collect()
    }

    /// Register snapshot.
    pub async fn registers(&self) -> Registers {
        self.touch();
        let inner = self.state.lock().await;
        Self::registers_of(&inner)
    }

    /// Bounded memory read.
    ///
    /// # Errors
    ///
    /// Errors on over-size lengths or unmapped ranges.
    pub async fn read_memory(&self, addr: Word, len: usize) -> Result<MemoryReply, ApiError> {
        if len > MAX_READ_LEN {
            return Err(ApiError::invalid("read length exceeds 1 MiB"));
        }
        self.touch();
        let inner = self.state.lock().await;
        let data = inner
            .vm
            .cpu
            .mem
            .view(addr, len)
            .map_err(|err| ApiError::new(Kind::MemoryFault, err.to_string()))?;
        Ok(MemoryReply {
            address: addr,
            length: data.len(),
            data,
        })
    }

    /// Bounded disassembly window.
    ///
    /// # Errors
    ///
    /// Errors on over-size windows.
    pub async fn disassembly(&self, addr: Word, count: usize) -> Result<Vec<DisasmLine>, ApiError> {
        if count > MAX_DISASM {
            return Err(ApiError::invalid("disassembly window too large"));
        }
        self.touch();
        let inner = self.state.lock().await;
        Ok(inner
            .vm
            .cpu
            .disasm(addr, count)
            .into_iter()
            .map(|insn| DisasmLine {
                address: insn.addr,
                opcode: insn.code,
                mnemonic: insn.mnemonic(),
                operands: insn.operands(),
                symbol: inner
                    .vm
                    .source_map()
                    .symbol_at(insn.addr)
                    .map(ToString::to_string),
            })
            .collect())
    }

    /// Buffered console output; does not clear.
    pub async fn console(&self) -> String {
        self.touch();
        let inner = self.state.lock().await;
        String::from_utf8_lossy(inner.vm.cpu.con.output()).into_owned()
    }

    /// Source map as defensive copies.
    pub async fn source_map(&self) -> Vec<SourceLine> {
        self.touch();
        let inner = self.state.lock().await;
        inner
            .vm
            .source_map()
            .entries()
            .into_iter()
            .map(|entry| SourceLine {
                address: entry.addr,
                line: entry.text,
                line_number: entry.number,
            })
            .collect()
    }

    /// The word window between SP and the stack top, capped at 256 words.
    pub async fn stack(&self) -> Vec<StackRow> {
        self.touch();
        let inner = self.state.lock().await;
        let top = inner.vm.layout().stack_top();
        let sp = inner.vm.cpu.reg.get(SP) & !0b11;
        let mut rows = Vec::new();
        let mut addr = sp;
        while addr < top && rows.len() < 256 {
            if let Ok(bytes) = inner.vm.cpu.mem.view(addr, 4) {
                rows.push(StackRow {
                    address: addr,
                    value: Word::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
                });
            } else {
                break;
            }
            addr = addr.wrapping_add(4);
        }
        rows
    }

    /// Enables or disables tracing.
    pub async fn set_trace(&self, on: bool) {
        self.touch();
        let mut inner = self.state.lock().await;
        inner.dbg.trace.set_enabled(on);
    }

    /// Trace entries, optionally bounded to a cycle range.
    pub async fn trace(&self, from: Option<u64>, to: Option<u64>) -> Vec<TraceRow> {
        self.touch();
        let inner = self.state.lock().await;
        let entries = inner
            .dbg
            .trace
            .range(from.unwrap_or(0), to.unwrap_or(u64::MAX));
        entries
            .into_iter()
            .map(|entry| TraceRow {
                pc: entry.pc,
                opcode: entry.code,
                text: entry.text,
                registers: entry.regs,
                cpsr: entry.cpsr,
                cycles: entry.cycles,
                timestamp: entry
                    .at
                    .duration_since(std::time::UNIX_EPOCH)
                    .map_or(0, |d| d.as_millis() as i64),
            })
            .collect()
    }

    /// Enables or disables statistics collection.
    pub async fn set_stats(&self, on: bool) {
        self.touch();
        let mut inner = self.state.lock().await;
        inner.dbg.stats.set_enabled(on);
    }

    /// Statistics snapshot.
    pub async fn stats(&self) -> StatsReply {
        self.touch();
        let inner = self.state.lock().await;
        let stats = &inner.dbg.stats;
        StatsReply {
            enabled: stats.enabled(),
            instructions: stats.instructions,
            cycles: stats.cycles,
            mnemonics: stats
                .mnemonics
                .iter()
                .map(|(&name, &count)| (name.to_string(), count))
                .collect(),
            branches_taken: stats.taken,
            branches_skipped: stats.skipped,
            loads: [stats.loads.byte, stats.loads.half, stats.loads.word],
            stores: [stats.stores.byte, stats.stores.half, stats.stores.word],
            swis: stats.swis,
            wall_millis: stats.wall().as_millis(),
        }
    }

    /// Executes a free-form debug command line.
    ///
    /// # Errors
    ///
    /// Errors on parse or command failures.
    pub async fn command(&self, input: &str) -> Result<String, ApiError> {
        self.touch();
        self.cancel.store(false, Ordering::SeqCst);
        let mut guard = self.state.lock().await;
        if guard.vm.status == Status::Running {
            return Err(ApiError::invalid("session is running; stop it first"));
        }
        let limit = guard.cfg.max_cycles;
        let Inner { vm, dbg, .. } = &mut *guard;
        let out = dbg
            .command(vm, input, &self.cancel, limit)
            .map_err(|err| ApiError::expression(err.to_string()))?;
        // Commands may have executed instructions; reflect that.
        self.flush_output(&mut guard);
        self.publish_state(&guard);
        Ok(out)
    }

    /// Evaluates a standalone expression.
    ///
    /// # Errors
    ///
    /// Errors on parse or evaluation failure.
    pub async fn evaluate(&self, expr: &str) -> Result<i64, ApiError> {
        self.touch();
        let inner = self.state.lock().await;
        let parsed =
            lang::expression(expr).map_err(|err| ApiError::expression(err.to_string()))?;
        parsed
            .eval(&inner.vm)
            .map_err(|err| ApiError::expression(err.to_string()))
    }
}
