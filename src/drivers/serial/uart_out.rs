//! Serial transmit region.
//!
//! ```text
//!   Stopped ──START(fifo)──▶ Started
//!                            ├── Inactive ──WRITE──▶ Active (kick DMA)
//!                            ├── Active   ──DMA_DONE, more──▶ Active (next span)
//!                            │            ──DMA_DONE, empty─▶ Inactive + EMPTY_IND
//!                            │            ──timer──▶ Failed + FAIL_IND(TIMEOUT)
//!                            └── Failed
//! ```
//!
//! Writers append to the transmit ring buffer and publish `UartOutWriteReq`.
//! Each transfer sends the contiguous readable span (capped at
//! [`TX_CHUNK`]); the read index moves only when the transfer is done.

use log::{debug, warn};

use crate::active::{ActiveCore, TimerId};
use crate::app::ports::{PortError, UartTxPort};
use crate::error::{ErrorCode, Status, reason};
use crate::events::{Evt, Payload, Signal};
use crate::fifo::Fifo;
use crate::hsm::{Hsm, Outcome, Region, StateDescriptor, StateId};
use UartOutState as S;

/// Largest single DMA transfer.
pub const TX_CHUNK: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UartOutState {
    Root = 0,
    Stopped = 1,
    Started = 2,
    Inactive = 3,
    Active = 4,
    Failed = 5,
}

impl UartOutState {
    pub const COUNT: usize = 6;
}

impl StateId for UartOutState {
    fn index(self) -> usize {
        self as usize
    }
}

pub struct UartOutCtx {
    port: Box<dyn UartTxPort>,
    fifo: Option<&'static Fifo>,
    active_timer: TimerId,
    timeout_ms: u32,
    /// Bytes handed to the DMA engine and not yet released.
    in_flight: u32,
    /// Why the last START was refused.
    pub fault: Option<Status>,
}

pub type UartOut = Region<UartOutState, UartOutCtx, { UartOutState::COUNT }>;

pub fn region(port: Box<dyn UartTxPort>, active_timer: TimerId, timeout_ms: u32) -> UartOut {
    let ctx = UartOutCtx {
        port,
        fifo: None,
        active_timer,
        timeout_ms,
        in_flight: 0,
        fault: None,
    };
    Region::new(
        Hsm::new("uart_out", build_state_table(), UartOutState::Root),
        ctx,
    )
}

/// Hand the next contiguous span to the DMA engine.
fn start_transfer(ctx: &mut UartOutCtx) -> Result<(), PortError> {
    let Some(fifo) = ctx.fifo else {
        return Err(PortError::Hardware);
    };
    let mut buf = [0u8; TX_CHUNK];
    let span = (fifo.contiguous_used() as usize).min(TX_CHUNK);
    let n = fifo.peek(&mut buf[..span]);
    ctx.port.begin_dma(&buf[..n])?;
    ctx.in_flight = n as u32;
    debug!("uart_out: sending {n} bytes");
    Ok(())
}

fn has_data(ctx: &UartOutCtx) -> bool {
    ctx.fifo.is_some_and(|f| !f.is_empty())
}

fn fail(core: &mut ActiveCore, status: Status) -> Outcome<S> {
    warn!("uart_out: {status}");
    let seq = core.next_seq();
    core.publish(Evt::reply(Signal::UartOutFailInd, seq, status));
    Outcome::Transition(S::Failed)
}

/// Kick a transfer and go (back) to Active, or fail.
fn send_next(ctx: &mut UartOutCtx, core: &mut ActiveCore) -> Outcome<S> {
    match start_transfer(ctx) {
        Ok(()) => Outcome::Transition(S::Active),
        Err(err) => fail(
            core,
            Status::new(ErrorCode::HardwareFailure, err.reason()),
        ),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

type Desc = StateDescriptor<UartOutState, UartOutCtx>;

fn build_state_table() -> [Desc; S::COUNT] {
    [
        Desc {
            id: S::Root,
            name: "Root",
            parent: None,
            initial: Some(S::Stopped),
            on_entry: None,
            on_exit: None,
            on_event: |_, _, _| Outcome::Handled,
        },
        Desc {
            id: S::Stopped,
            name: "Stopped",
            parent: Some(S::Root),
            initial: None,
            on_entry: None,
            on_exit: None,
            on_event: stopped_event,
        },
        Desc {
            id: S::Started,
            name: "Started",
            parent: Some(S::Root),
            initial: Some(S::Inactive),
            on_entry: None,
            on_exit: Some(started_exit),
            on_event: started_event,
        },
        Desc {
            id: S::Inactive,
            name: "Inactive",
            parent: Some(S::Started),
            initial: None,
            on_entry: None,
            on_exit: None,
            on_event: inactive_event,
        },
        Desc {
            id: S::Active,
            name: "Active",
            parent: Some(S::Started),
            initial: None,
            on_entry: Some(active_entry),
            on_exit: Some(active_exit),
            on_event: active_event,
        },
        Desc {
            id: S::Failed,
            name: "Failed",
            parent: Some(S::Started),
            initial: None,
            on_entry: Some(failed_entry),
            on_exit: None,
            on_event: failed_event,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  Handlers
// ═══════════════════════════════════════════════════════════════════════════

fn stopped_event(ctx: &mut UartOutCtx, _: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match (e.sig, e.payload) {
        (Signal::UartOutStartReq, Payload::Fifo(fifo)) => {
            fifo.reset();
            match ctx.port.start() {
                Ok(()) => {
                    ctx.fault = None;
                    ctx.fifo = Some(fifo);
                    Outcome::Transition(S::Started)
                }
                Err(err) => {
                    warn!("uart_out: start failed: {err}");
                    ctx.fault = Some(Status::new(ErrorCode::HardwareFailure, err.reason()));
                    Outcome::Handled
                }
            }
        }
        _ => Outcome::Super,
    }
}

fn started_exit(ctx: &mut UartOutCtx, _: &mut ActiveCore) {
    ctx.port.stop();
    ctx.in_flight = 0;
}

fn started_event(_: &mut UartOutCtx, core: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match e.sig {
        Signal::UartOutStopReq => Outcome::Transition(S::Stopped),
        Signal::UartOutHwFail => fail(
            core,
            Status::new(ErrorCode::HardwareFailure, PortError::Hardware.reason()),
        ),
        _ => Outcome::Super,
    }
}

fn inactive_event(ctx: &mut UartOutCtx, core: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match e.sig {
        Signal::UartOutWriteReq if has_data(ctx) => send_next(ctx, core),
        Signal::UartOutWriteReq => Outcome::Handled,
        _ => Outcome::Super,
    }
}

fn active_entry(ctx: &mut UartOutCtx, core: &mut ActiveCore) {
    core.arm(ctx.active_timer, ctx.timeout_ms);
}

fn active_exit(ctx: &mut UartOutCtx, core: &mut ActiveCore) {
    core.disarm(ctx.active_timer);
}

fn active_event(ctx: &mut UartOutCtx, core: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match e.sig {
        // Picked up when the transfer in flight completes.
        Signal::UartOutWriteReq => Outcome::Handled,
        Signal::UartOutDmaDone => {
            if let Some(fifo) = ctx.fifo {
                fifo.inc_read_index(ctx.in_flight.min(fifo.used_count()));
            }
            ctx.in_flight = 0;
            if has_data(ctx) {
                send_next(ctx, core)
            } else {
                let seq = core.next_seq();
                core.publish(Evt::new(Signal::UartOutEmptyInd).with_seq(seq));
                Outcome::Transition(S::Inactive)
            }
        }
        Signal::UartOutActiveTimer => fail(core, Status::new(ErrorCode::Timeout, reason::NONE)),
        _ => Outcome::Super,
    }
}

fn failed_entry(ctx: &mut UartOutCtx, _: &mut ActiveCore) {
    ctx.port.stop();
    ctx.in_flight = 0;
}

fn failed_event(_: &mut UartOutCtx, _: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match e.sig {
        Signal::UartOutHwFail | Signal::UartOutWriteReq | Signal::UartOutDmaDone => {
            Outcome::Handled
        }
        _ => Outcome::Super,
    }
}
