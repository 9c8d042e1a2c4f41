//! End-to-end scenarios over the assembler, machine, and debugger.

use std::sync::atomic::AtomicBool;

use armlet::prelude::*;

const NO_CANCEL: AtomicBool = AtomicBool::new(false);
const LIMIT: u64 = 1_000_000;

fn boot(source: &str) -> Machine {
    let prog = assemble(source).expect("scenario program assembles");
    let mut vm = Machine::default();
    vm.load(prog).expect("scenario program loads");
    vm
}

/// Hello output: run to EXIT, console carries the text, PC holds at the
/// SWI.
#[test]
fn hello_world() {
    let mut vm = boot(
        ".org 0x8000\n\
         _start:\n\
         LDR R0, =message\n\
         SWI #0x02\n\
         SWI #0x00\n\
         message: .asciz \"Hello, World!\"\n",
    );
    let mut dbg = Debugger::default();
    let stop = dbg.resume(&mut vm, &NO_CANCEL, LIMIT, true);
    assert_eq!(stop, Stop::Halt);
    assert_eq!(vm.status, Status::Halted);
    assert_eq!(vm.cpu.con.output(), b"Hello, World!");
    assert_eq!(vm.cpu.reg.pc(), 0x8008);
}

/// Arithmetic: five steps leave the documented register values.
#[test]
fn arithmetic() {
    let mut vm = boot(
        ".org 0x8000\n\
         MOV R0, #10\n\
         MOV R1, #20\n\
         ADD R2, R0, R1\n\
         SUB R3, R1, R0\n\
         MUL R4, R0, R1\n\
         SWI #0\n",
    );
    let mut dbg = Debugger::default();
    for _ in 0..5 {
        assert_eq!(dbg.step(&mut vm), Stop::Step);
    }
    let regs = vm.registers();
    assert_eq!(regs[2], 0x0000_001e);
    assert_eq!(regs[3], 0x0000_000a);
    assert_eq!(regs[4], 0x0000_00c8);
}

/// Breakpoint hit: paused at the CMP with R0 == 1 and one recorded hit.
#[test]
fn breakpoint_hit() {
    let mut vm = boot(
        ".org 0x8000\n\
         MOV R0, #0\n\
         loop: ADD R0, R0, #1\n\
         CMP R0, #5\n\
         BLT loop\n\
         SWI #0\n",
    );
    let mut dbg = Debugger::default();
    // Line 4 holds the CMP.
    let cmp = vm.source_map().addr_of_line(4).unwrap();
    assert_eq!(cmp, 0x8008);
    dbg.add_breakpoint(&vm, cmp, None).unwrap();
    let stop = dbg.resume(&mut vm, &NO_CANCEL, LIMIT, true);
    assert_eq!(stop, Stop::Breakpoint(cmp));
    assert_eq!(vm.status, Status::Paused);
    assert_eq!(vm.cpu.reg.pc(), cmp);
    assert_eq!(vm.registers()[0], 1);
    assert_eq!(dbg.breakpoints().next().unwrap().1.hits, 1);
}

/// Watchpoint write: paused after the STR with the write record set.
#[test]
fn watchpoint_write() {
    let mut vm = boot(
        ".org 0x8000\n\
         MOV R0, #0x2a\n\
         LDR R1, =0x10000\n\
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
    assert_eq!(write.width, Width::Word);
    assert_eq!(write.value, 0x2a);
}

/// Step-over a BL: one operation lands past the call with the callee's
/// side effects applied.
#[test]
fn step_over_bl() {
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
}

/// Waiting for input: a blocked READ_CHAR parks the machine; input and a
/// re-run complete it.
#[test]
fn waiting_for_input() {
    let mut vm = boot(
        ".org 0x8000\n\
         SWI #0x04\n\
         SWI #0x01\n\
         SWI #0x00\n",
    );
    let mut dbg = Debugger::default();
    let stop = dbg.step(&mut vm);
    assert_eq!(stop, Stop::Input);
    assert_eq!(vm.status, Status::WaitingForInput);
    vm.cpu.con.feed(b"A");
    let stop = dbg.resume(&mut vm, &NO_CANCEL, LIMIT, true);
    assert_eq!(stop, Stop::Halt);
    assert_eq!(vm.status, Status::Halted);
    assert_eq!(vm.cpu.con.output(), b"A");
}

/// Universal invariant: the PC stays word-aligned through arbitrary
/// stepping unless the machine faulted.
#[test]
fn pc_stays_aligned() {
    let mut vm = boot(
        ".org 0x8000\n\
         _start: MOV R0, #0\n\
         loop: ADD R0, R0, #1\n\
         CMP R0, #100\n\
         BLT loop\n\
         SWI #0\n",
    );
    let mut dbg = Debugger::default();
    loop {
        let stop = dbg.step(&mut vm);
        assert_eq!(vm.cpu.reg.pc() % 4, 0);
        if stop != Stop::Step {
            assert_eq!(stop, Stop::Halt);
            break;
        }
    }
}

/// Source map round-trip: every entry maps line to address and back.
#[test]
fn source_map_round_trip() {
    let vm = boot(
        ".org 0x8000\n\
         _start: MOV R0, #1\n\
         ADD R0, R0, #2\n\
         SWI #0\n",
    );
    let map = vm.source_map();
    assert_eq!(map.len(), 3);
    for entry in map.entries() {
        assert_eq!(map.addr_of_line(entry.number), Some(entry.addr));
        assert_eq!(map.line_at(entry.addr).unwrap().0, entry.number);
    }
    assert_eq!(map.addr_of("_start"), Some(0x8000));
    assert_eq!(map.symbol_at(0x8000), Some("_start"));
}

/// Reset returns to the entry state; restart preserves debugger points.
#[test]
fn reset_and_restart_contracts() {
    let mut vm = boot(
        ".org 0x8000\n\
         _start: MOV R0, #7\n\
         SWI #0\n",
    );
    let mut dbg = Debugger::default();
    dbg.add_breakpoint(&vm, 0x8004, None).unwrap();
    dbg.add_watchpoint(0x1_0000, Watch::Access);
    dbg.resume(&mut vm, &NO_CANCEL, LIMIT, true);
    assert_eq!(vm.status, Status::Halted);

    // Restart: program back at entry, registers zeroed, points kept.
    vm.reset();
    dbg.on_restart();
    assert_eq!(vm.status, Status::Loaded);
    assert_eq!(vm.cpu.reg.pc(), 0x8000);
    assert_eq!(vm.registers()[0], 0);
    assert_eq!(dbg.breakpoints().count(), 1);
    assert_eq!(dbg.watchpoints().count(), 1);

    // Reset: the debugger state goes too.
    vm.reset();
    dbg.clear();
    assert_eq!(dbg.breakpoints().count(), 0);
    assert_eq!(dbg.watchpoints().count(), 0);
}

/// The stack works end to end: a leaf routine round-trips registers
/// through STMFD/LDMFD.
#[test]
fn stack_round_trip() {
    let mut vm = boot(
        ".org 0x8000\n\
         _start:\n\
         MOV R0, #5\n\
         BL double\n\
         SWI #0\n\
         double:\n\
         STMFD SP!, {R4, LR}\n\
         MOV R4, R0\n\
         ADD R0, R4, R4\n\
         LDMFD SP!, {R4, PC}\n",
    );
    let mut dbg = Debugger::default();
    let stop = dbg.resume(&mut vm, &NO_CANCEL, LIMIT, true);
    assert_eq!(stop, Stop::Halt);
    assert_eq!(vm.registers()[0], 10);
    // SP is balanced.
    assert_eq!(vm.cpu.reg.get(13), vm.layout().stack_top());
}
