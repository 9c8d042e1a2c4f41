//! Service-level integration tests: sessions driven through the same
//! operations the transport uses, without the HTTP layer in between.

use std::sync::Arc;
use std::time::Duration;

use armlet_server::err::Kind;
use armlet_server::evt::Payload;
use armlet_server::svc::StepKind;
use armlet_server::{Config, Registry, Session};
use tokio::time::{sleep, timeout};

const HELLO: &str = "\
.org 0x8000
_start:
        LDR     R0, =message
        SWI     #0x02
        SWI     #0x07
        SWI     #0x00
message:
        .asciz  \"Hello, World!\"
";

const COUNT: &str = "\
.org 0x8000
_start:
        MOV     R0, #0
loop:   ADD     R0, R0, #1
        CMP     R0, #5
        BLT     loop
        SWI     #0x00
";

const ECHO: &str = "\
.org 0x8000
_start:
        LDR     R0, =0x10000
        MOV     R1, #64
        SWI     #0x05
        LDR     R0, =0x10000
        SWI     #0x02
        SWI     #0x00
";

async fn session_with(source: &str) -> (Arc<Registry>, Arc<Session>) {
    let registry = Registry::new(Config::default());
    let session = registry.create(None).await.unwrap();
    let reply = session.load(source).await.unwrap();
    assert!(reply.success, "load failed: {:?}", reply.errors);
    (registry, session)
}

async fn wait_status(session: &Session, want: &str) {
    timeout(Duration::from_secs(5), async {
        loop {
            if session.registers().await.status == want {
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| {
        panic!("timed out waiting for status `{want}`");
    });
}

#[tokio::test]
async fn hello_runs_to_halt() {
    let (_registry, session) = session_with(HELLO).await;
    session.run().await.unwrap();
    wait_status(&session, "halted").await;
    assert!(session.console().await.contains("Hello, World!"));
    // The PC holds at the SWI EXIT.
    assert_eq!(session.registers().await.pc, 0x800c);
}

#[tokio::test]
async fn run_after_halt_restarts_implicitly() {
    let (_registry, session) = session_with(HELLO).await;
    session.run().await.unwrap();
    wait_status(&session, "halted").await;
    session.run().await.unwrap();
    wait_status(&session, "halted").await;
    let output = session.console().await;
    assert_eq!(output.matches("Hello, World!").count(), 1);
}

#[tokio::test]
async fn breakpoints_pause_a_run_and_events_arrive_in_order() {
    let (_registry, session) = session_with(COUNT).await;
    let mut rx = session.subscribe();
    session.add_breakpoint(0x8008, None).await.unwrap();
    session.run().await.unwrap();
    wait_status(&session, "paused").await;

    let regs = session.registers().await;
    assert_eq!(regs.pc, 0x8008);
    assert_eq!(regs.registers[0], 1);
    let rows = session.breakpoints().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].hits, 1);

    // The paused state precedes the breakpoint event that depends on it.
    let mut saw_paused = false;
    loop {
        let envelope = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event stream stalled")
            .expect("event stream closed");
        match envelope.payload {
            Payload::State(state) if state.status == "paused" => saw_paused = true,
            Payload::Event(event) if event.event == "breakpoint_hit" => {
                assert!(saw_paused, "breakpoint event before paused state");
                assert_eq!(event.address, Some(0x8008));
                break;
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn breakpoints_fire_on_executor_batch_boundaries() {
    // The executor slices one Run into 8192-cycle batches. With a 1-cycle
    // MOV followed by a 4-cycle loop body (ADD + B), the first batch ends
    // before the 2049th ADD: PC back at `loop`, R0 == 2048, 8193 cycles
    // spent. The condition below is integer division, zero for every
    // earlier crossing and first truthy at exactly that boundary, so the
    // breakpoint must fire when the next batch resumes rather than being
    // skipped as a resume point.
    let (_registry, session) = session_with(
        ".org 0x8000\n\
         _start: MOV R0, #0\n\
         loop:   ADD R0, R0, #1\n\
         B loop\n",
    )
    .await;
    session
        .add_breakpoint(0x8004, Some("r0 / 2048"))
        .await
        .unwrap();
    session.run().await.unwrap();
    wait_status(&session, "paused").await;

    let regs = session.registers().await;
    assert_eq!(regs.pc, 0x8004);
    // Stopping one loop crossing later would read 2049: the batch
    // boundary was treated as a fresh run and stepped past the hit.
    assert_eq!(regs.registers[0], 2048);
    let rows = session.breakpoints().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].hits, 1);
}

#[tokio::test]
async fn stdin_wakes_a_waiting_step() {
    let (_registry, session) = session_with(ECHO).await;
    session.step(StepKind::Into).await.unwrap();
    session.step(StepKind::Into).await.unwrap();
    let regs = session.step(StepKind::Into).await.unwrap();
    assert_eq!(regs.status, "waiting_for_input");

    // Feeding a line completes the blocked step without a second step
    // request.
    session.send_stdin("hi\n").await.unwrap();
    assert_eq!(session.registers().await.status, "paused");
    session.run().await.unwrap();
    wait_status(&session, "halted").await;
    assert!(session.console().await.contains("hi"));
}

#[tokio::test]
async fn stdin_wakes_a_waiting_run() {
    let (_registry, session) = session_with(ECHO).await;
    session.run().await.unwrap();
    wait_status(&session, "waiting_for_input").await;
    session.send_stdin("echoed\n").await.unwrap();
    wait_status(&session, "halted").await;
    assert!(session.console().await.contains("echoed"));
}

#[tokio::test]
async fn stop_pauses_an_infinite_loop() {
    let registry = Registry::new(Config::default());
    let session = registry.create(None).await.unwrap();
    let reply = session
        .load(".org 0x8000\nloop: B loop\n")
        .await
        .unwrap();
    assert!(reply.success);
    session.run().await.unwrap();
    sleep(Duration::from_millis(20)).await;
    session.stop();
    wait_status(&session, "paused").await;
    // Stop is idempotent.
    session.stop();
    wait_status(&session, "paused").await;
}

#[tokio::test]
async fn faults_keep_the_session_introspectable() {
    let registry = Registry::new(Config::default());
    let session = registry.create(None).await.unwrap();
    let reply = session
        .load(".org 0x8000\nMOV R1, #0\nLDR R0, [R1]\nSWI #0\n")
        .await
        .unwrap();
    assert!(reply.success);
    session.run().await.unwrap();
    wait_status(&session, "error").await;
    // Registers and memory stay readable; the PC names the faulting
    // instruction.
    assert_eq!(session.registers().await.pc, 0x8004);
    assert!(session.read_memory(0x8000, 16).await.is_ok());
}

#[tokio::test]
async fn parse_failures_leave_the_previous_program() {
    let (_registry, session) = session_with(HELLO).await;
    let reply = session.load("FROB R1\n").await.unwrap();
    assert!(!reply.success);
    let errors = reply.errors.unwrap();
    assert_eq!(errors[0].line, 1);
    // The old program still runs.
    session.run().await.unwrap();
    wait_status(&session, "halted").await;
}

#[tokio::test]
async fn destroyed_sessions_are_gone() {
    let (registry, session) = session_with(HELLO).await;
    let id = session.id;
    let mut rx = session.subscribe();
    drop(session);
    registry.destroy(id).await.unwrap();
    let err = registry.get(id).await.unwrap_err();
    assert_eq!(err.kind, Kind::NoActiveSession);
    // Subscribers observe closure once the session is gone.
    let closed = timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return true,
                Err(_) => {}
            }
        }
    })
    .await
    .unwrap();
    assert!(closed);
}

#[tokio::test]
async fn sessions_are_isolated() {
    let registry = Registry::new(Config::default());
    let a = registry.create(None).await.unwrap();
    let b = registry.create(None).await.unwrap();
    a.load(HELLO).await.unwrap();
    b.load(COUNT).await.unwrap();
    a.run().await.unwrap();
    wait_status(&a, "halted").await;
    // Session B is untouched by A's run.
    assert_eq!(b.registers().await.status, "loaded");
    assert!(b.console().await.is_empty());
}

#[tokio::test]
async fn watchpoints_report_the_write() {
    let registry = Registry::new(Config::default());
    let session = registry.create(None).await.unwrap();
    let reply = session
        .load(
            ".org 0x8000\n\
             MOV R0, #0xab\n\
             LDR R1, =0x10000\n\
             STR R0, [R1]\n\
             SWI #0\n",
        )
        .await
        .unwrap();
    assert!(reply.success);
    session.add_watchpoint(0x1_0000, "write").await.unwrap();
    session.run().await.unwrap();
    wait_status(&session, "paused").await;
    let info = session.info().await;
    assert!(info.has_write);
    assert_eq!(info.write_addr, Some(0x1_0000));
    assert_eq!(info.write_size, Some(4));
    // Bad watchpoint kinds are rejected.
    let err = session.add_watchpoint(0, "sideways").await.unwrap_err();
    assert_eq!(err.kind, Kind::InvalidRequest);
}

#[tokio::test]
async fn expressions_and_commands_work_over_the_service() {
    let (_registry, session) = session_with(COUNT).await;
    session.step(StepKind::Into).await.unwrap();
    let value = session.evaluate("r0 + 2").await.unwrap();
    assert_eq!(value, 2);
    let value = session.evaluate("_start").await.unwrap();
    assert_eq!(value, 0x8000);
    assert!(session.evaluate("missing").await.is_err());
    let out = session.command("info registers").await.unwrap();
    assert!(out.contains("r0: 00000000"));
}
