//! Command execution.
//!
//! One function per command, each rendering its result as text for the
//! debug command line.

use std::fmt::Write as _;
use std::sync::atomic::AtomicBool;

use armlet_arch::reg::PC;
use armlet_arch::Word;
use armlet_core::Machine;
use itertools::Itertools;

use crate::lang::{Command, Expr, Topic};
use crate::{Debugger, Result, Stop, Watch};

pub(crate) fn dispatch(
    dbg: &mut Debugger,
    vm: &mut Machine,
    cmd: Command,
    cancel: &AtomicBool,
    limit: u64,
) -> Result<String> {
    match cmd {
        Command::Break { at, cond } => r#break(dbg, vm, &at, cond),
        Command::Delete(at) => delete(dbg, vm, &at),
        Command::Enable(at) => enable(dbg, vm, &at, true),
        Command::Disable(at) => enable(dbg, vm, &at, false),
        Command::Watch(kind, at) => watch(dbg, vm, kind, &at),
        Command::Unwatch(id) => unwatch(dbg, vm, &id),
        Command::Step(count) => step(dbg, vm, count.unwrap_or(1)),
        Command::Next => next(dbg, vm, cancel, limit),
        Command::Finish => finish(dbg, vm, cancel, limit),
        Command::Continue => r#continue(dbg, vm, cancel, limit),
        Command::Print(expr) => print(vm, &expr),
        Command::Examine { count, at } => examine(vm, count, &at),
        Command::Info(topic) => Ok(info(dbg, vm, topic)),
    }
}

fn r#break(
    dbg: &mut Debugger,
    vm: &Machine,
    at: &Expr,
    cond: Option<Expr>,
) -> Result<String> {
    let addr = at.eval(vm)? as Word;
    let cond = cond.map(|expr| (expr.to_string(), expr));
    dbg.insert_breakpoint(vm, addr, cond)?;
    Ok(format!("breakpoint created at {addr:#010x}"))
}

fn delete(dbg: &mut Debugger, vm: &Machine, at: &Expr) -> Result<String> {
    let addr = at.eval(vm)? as Word;
    dbg.remove_breakpoint(addr)?;
    Ok(format!("breakpoint at {addr:#010x} deleted"))
}

fn enable(dbg: &mut Debugger, vm: &Machine, at: &Expr, on: bool) -> Result<String> {
    let addr = at.eval(vm)? as Word;
    dbg.set_breakpoint_enabled(addr, on)?;
    Ok(format!(
        "breakpoint at {addr:#010x} {}",
        if on { "enabled" } else { "disabled" },
    ))
}

fn watch(dbg: &mut Debugger, vm: &Machine, kind: Watch, at: &Expr) -> Result<String> {
    let addr = at.eval(vm)? as Word;
    let id = dbg.add_watchpoint(addr, kind);
    Ok(format!("watchpoint {id} ({kind}) at {addr:#010x}"))
}

fn unwatch(dbg: &mut Debugger, vm: &Machine, id: &Expr) -> Result<String> {
    let id = id.eval(vm)? as u32;
    dbg.remove_watchpoint(id)?;
    Ok(format!("watchpoint {id} deleted"))
}

fn step(dbg: &mut Debugger, vm: &mut Machine, count: u64) -> Result<String> {
    let mut stop = Stop::Step;
    for _ in 0..count.max(1) {
        stop = dbg.step(vm);
        if !matches!(stop, Stop::Step) {
            break;
        }
    }
    Ok(report(vm, stop))
}

fn next(
    dbg: &mut Debugger,
    vm: &mut Machine,
    cancel: &AtomicBool,
    limit: u64,
) -> Result<String> {
    let stop = dbg.step_over(vm, cancel, limit);
    Ok(report(vm, stop))
}

fn finish(
    dbg: &mut Debugger,
    vm: &mut Machine,
    cancel: &AtomicBool,
    limit: u64,
) -> Result<String> {
    let stop = dbg.step_out(vm, cancel, limit)?;
    Ok(report(vm, stop))
}

fn r#continue(
    dbg: &mut Debugger,
    vm: &mut Machine,
    cancel: &AtomicBool,
    limit: u64,
) -> Result<String> {
    let stop = dbg.resume(vm, cancel, limit, true);
    Ok(report(vm, stop))
}

fn print(vm: &Machine, expr: &Expr) -> Result<String> {
    let value = expr.eval(vm)?;
    Ok(format!("{expr} = {value} ({:#010x})", value as Word))
}

fn examine(vm: &Machine, count: u32, at: &Expr) -> Result<String> {
    let addr = (at.eval(vm)? as Word) & !0b11;
    let count = count.clamp(1, 256) as usize;
    let bytes = vm
        .cpu
        .mem
        .view(addr, count * 4)
        .map_err(|err| crate::lang::Eval::Memory(err.to_string()))?;
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let _ = write!(out, "{:#010x}:", addr + 16 * row as Word);
        for word in chunk.chunks(4) {
            let word = Word::from_le_bytes([word[0], word[1], word[2], word[3]]);
            let _ = write!(out, " {word:08x}");
        }
        out.push('\n');
    }
    Ok(out.trim_end().to_string())
}

fn info(dbg: &Debugger, vm: &Machine, topic: Topic) -> String {
    match topic {
        Topic::Registers => {
            let mut out = String::new();
            for chunk in &vm.registers().iter().enumerate().chunks(4) {
                let row = chunk
                    .map(|(idx, value)| format!("{:>4}: {value:08x}", name(idx)))
                    .join("  ");
                let _ = writeln!(out, "{row}");
            }
            let _ = write!(
                out,
                "cpsr: {:08x} [{}]  cycles: {}",
                vm.cpu.reg.cpsr.bits(),
                vm.cpu.reg.cpsr,
                vm.cpu.cycles,
            );
            out
        }
        Topic::Breakpoints => {
            let mut out = String::new();
            for (addr, bpt) in dbg.breakpoints() {
                let state = if bpt.enable { "enabled" } else { "disabled" };
                let _ = write!(out, "{addr:#010x}  {state}  hits: {}", bpt.hits);
                if let Some((src, _)) = &bpt.cond {
                    let _ = write!(out, "  if {src}");
                }
                out.push('\n');
            }
            if out.is_empty() {
                "no breakpoints".to_string()
            } else {
                out.trim_end().to_string()
            }
        }
        Topic::Watchpoints => {
            let mut out = String::new();
            for wpt in dbg.watchpoints() {
                let state = if wpt.enable { "enabled" } else { "disabled" };
                let _ = writeln!(
                    out,
                    "{}: {} at {:#010x}  {state}  hits: {}",
                    wpt.id, wpt.kind, wpt.addr, wpt.hits,
                );
            }
            if out.is_empty() {
                "no watchpoints".to_string()
            } else {
                out.trim_end().to_string()
            }
        }
    }
}

fn name(idx: usize) -> &'static str {
    const NAMES: [&str; 16] = [
        "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "r12", "sp",
        "lr", "pc",
    ];
    NAMES[idx]
}

/// Renders why execution stopped.
fn report(vm: &Machine, stop: Stop) -> String {
    let pc = vm.cpu.reg.get(PC).wrapping_sub(8);
    match stop {
        Stop::Step => format!("stopped at {pc:#010x}"),
        Stop::Breakpoint(addr) => format!("breakpoint hit at {addr:#010x}"),
        Stop::Watchpoint { id, addr } => {
            format!("watchpoint {id} hit at {addr:#010x} (pc {pc:#010x})")
        }
        Stop::Pause => format!("paused at {pc:#010x}"),
        Stop::Halt => "program exited".to_string(),
        Stop::Input => "waiting for input".to_string(),
        Stop::Limit => format!("cycle limit reached at {pc:#010x}"),
        Stop::Fault => match vm.fault() {
            Some(fault) => format!("fault: {fault}"),
            None => "fault".to_string(),
        },
    }
}
