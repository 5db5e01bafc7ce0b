//! Serial receive region: circular DMA into a ring buffer.
//!
//! ```text
//!   Stopped ──START(fifo)──▶ Started
//!                            ├── Normal
//!                            │    ├── Inactive ──DATA_RDY──▶ Active
//!                            │    └── Active   ──timer, quiet──▶ Inactive (flush)
//!                            │                 ──timer, busy ──▶ Active   (re-arm)
//!                            └── Failed        (hardware error, DMA stopped)
//! ```
//!
//! An overflow is reported, then the engine is restarted on an emptied
//! buffer; if that restart fails the region drops into Failed.
//!
//! The DMA engine stores bytes ahead of the ring buffer's write index on its
//! own.  Nothing is visible to the consumer until a reconciliation step
//! commits it: on every half/full transfer interrupt while Normal, and when
//! the line goes quiet.  Reconciliation runs inside this region's
//! run-to-completion step, so it needs no critical section: the write index
//! has exactly one writer.

use log::{debug, info, trace, warn};

use crate::active::{ActiveCore, TimerId};
use crate::app::ports::{PortError, UartRxPort};
use crate::error::{ErrorCode, Status};
use crate::events::{Evt, Payload, Signal};
use crate::fifo::Fifo;
use crate::hsm::{Hsm, Outcome, Region, StateDescriptor, StateId};
use UartInState as S;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UartInState {
    Root = 0,
    Stopped = 1,
    Started = 2,
    Normal = 3,
    Inactive = 4,
    Active = 5,
    Failed = 6,
}

impl UartInState {
    pub const COUNT: usize = 7;
}

impl StateId for UartInState {
    fn index(self) -> usize {
        self as usize
    }
}

pub struct UartInCtx {
    port: Box<dyn UartRxPort>,
    fifo: Option<&'static Fifo>,
    activity_timer: TimerId,
    activity_ms: u32,
    /// Activity seen since the timer was last armed.
    data_seen: bool,
    /// Why the last START was refused.
    pub fault: Option<Status>,
}

pub type UartIn = Region<UartInState, UartInCtx, { UartInState::COUNT }>;

pub fn region(port: Box<dyn UartRxPort>, activity_timer: TimerId, activity_ms: u32) -> UartIn {
    let ctx = UartInCtx {
        port,
        fifo: None,
        activity_timer,
        activity_ms,
        data_seen: false,
        fault: None,
    };
    Region::new(
        Hsm::new("uart_in", build_state_table(), UartInState::Root),
        ctx,
    )
}

// ═══════════════════════════════════════════════════════════════════════════
//  Reconciliation
// ═══════════════════════════════════════════════════════════════════════════

/// Outcome of one reconciliation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Hardware has not moved since the last step.
    Idle,
    /// `n` new bytes committed.
    Committed(u32),
    /// More arrived than there was room for.  Nothing was committed.
    Overflow { pending: u32, available: u32 },
}

/// Commit everything the hardware stored up to free-running `position`,
/// unless that would overrun unconsumed data.
pub fn reconcile(fifo: &Fifo, position: u32) -> Reconciled {
    let pending = fifo.pending_from(position);
    // A position behind the write index is a wrap whose lap interrupt has
    // not run yet; the next sample sees it.
    if pending == 0 || pending > u32::MAX / 2 {
        return Reconciled::Idle;
    }
    let available = fifo.avail_count();
    if pending > available {
        return Reconciled::Overflow { pending, available };
    }
    fifo.inc_write_index(pending);
    Reconciled::Committed(pending)
}

/// Sample the hardware once, reconcile and report.
///
/// After an overflow the engine has already written over unconsumed bytes,
/// so the buffer is emptied and reception restarted from slot 0.  Returns
/// `false` if that restart failed; the caller parks the region in Failed.
fn reconcile_and_report(ctx: &mut UartInCtx, core: &mut ActiveCore) -> bool {
    let Some(fifo) = ctx.fifo else { return true };
    let position = ctx.port.position(fifo.capacity());
    match reconcile(fifo, position) {
        Reconciled::Idle => true,
        Reconciled::Committed(n) => {
            trace!("uart_in: committed {n} bytes");
            let seq = core.next_seq();
            core.publish(Evt::new(Signal::UartInDataInd).with_seq(seq));
            true
        }
        Reconciled::Overflow { pending, available } => {
            warn!("uart_in: overflow, {pending} bytes pending, {available} free");
            let seq = core.next_seq();
            let reason = pending.min(u32::from(u16::MAX)) as u16;
            core.publish(Evt::reply(
                Signal::UartInFailInd,
                seq,
                Status::new(ErrorCode::Overflow, reason),
            ));
            restart_dma(ctx, fifo, core)
        }
    }
}

fn restart_dma(ctx: &mut UartInCtx, fifo: &'static Fifo, core: &mut ActiveCore) -> bool {
    ctx.port.stop_dma();
    fifo.reset();
    match ctx.port.start_dma(fifo) {
        Ok(()) => {
            debug!("uart_in: DMA restarted after overflow");
            true
        }
        Err(err) => {
            warn!("uart_in: DMA restart failed: {err}");
            let seq = core.next_seq();
            core.publish(Evt::reply(
                Signal::UartInFailInd,
                seq,
                Status::new(ErrorCode::HardwareFailure, err.reason()),
            ));
            false
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

type Desc = StateDescriptor<UartInState, UartInCtx>;

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
            initial: Some(S::Normal),
            on_entry: Some(started_entry),
            on_exit: Some(started_exit),
            on_event: started_event,
        },
        Desc {
            id: S::Normal,
            name: "Normal",
            parent: Some(S::Started),
            initial: Some(S::Inactive),
            on_entry: None,
            on_exit: None,
            on_event: normal_event,
        },
        Desc {
            id: S::Inactive,
            name: "Inactive",
            parent: Some(S::Normal),
            initial: None,
            on_entry: None,
            on_exit: None,
            on_event: inactive_event,
        },
        Desc {
            id: S::Active,
            name: "Active",
            parent: Some(S::Normal),
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

fn stopped_event(ctx: &mut UartInCtx, _: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match (e.sig, e.payload) {
        (Signal::UartInStartReq, Payload::Fifo(fifo)) => {
            fifo.reset();
            match ctx.port.start_dma(fifo) {
                Ok(()) => {
                    ctx.fault = None;
                    ctx.fifo = Some(fifo);
                    Outcome::Transition(S::Started)
                }
                Err(err) => {
                    warn!("uart_in: DMA start failed: {err}");
                    ctx.fault = Some(Status::new(ErrorCode::HardwareFailure, err.reason()));
                    Outcome::Handled
                }
            }
        }
        _ => Outcome::Super,
    }
}

fn started_entry(ctx: &mut UartInCtx, _: &mut ActiveCore) {
    ctx.port.enable_rx_int();
    info!("uart_in: receiving");
}

fn started_exit(ctx: &mut UartInCtx, _: &mut ActiveCore) {
    ctx.port.disable_rx_int();
    ctx.port.stop_dma();
}

fn started_event(_: &mut UartInCtx, core: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match e.sig {
        Signal::UartInStopReq => Outcome::Transition(S::Stopped),
        Signal::UartInHwFail => {
            warn!("uart_in: hardware failure");
            let seq = core.next_seq();
            core.publish(Evt::reply(
                Signal::UartInFailInd,
                seq,
                Status::new(ErrorCode::HardwareFailure, PortError::Hardware.reason()),
            ));
            Outcome::Transition(S::Failed)
        }
        _ => Outcome::Super,
    }
}

fn normal_event(ctx: &mut UartInCtx, core: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match e.sig {
        Signal::UartInDmaRecv => {
            if reconcile_and_report(ctx, core) {
                Outcome::Handled
            } else {
                Outcome::Transition(S::Failed)
            }
        }
        _ => Outcome::Super,
    }
}

fn inactive_event(_: &mut UartInCtx, _: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match e.sig {
        Signal::UartInDataRdy => Outcome::Transition(S::Active),
        _ => Outcome::Super,
    }
}

fn active_entry(ctx: &mut UartInCtx, core: &mut ActiveCore) {
    ctx.data_seen = false;
    core.arm(ctx.activity_timer, ctx.activity_ms);
}

fn active_exit(ctx: &mut UartInCtx, core: &mut ActiveCore) {
    core.disarm(ctx.activity_timer);
}

fn active_event(ctx: &mut UartInCtx, core: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match e.sig {
        Signal::UartInDataRdy => {
            ctx.data_seen = true;
            Outcome::Handled
        }
        Signal::UartInActiveTimer if ctx.data_seen => Outcome::Transition(S::Active),
        Signal::UartInActiveTimer => {
            debug!("uart_in: line quiet, flushing");
            if reconcile_and_report(ctx, core) {
                Outcome::Transition(S::Inactive)
            } else {
                Outcome::Transition(S::Failed)
            }
        }
        _ => Outcome::Super,
    }
}

fn failed_entry(ctx: &mut UartInCtx, _: &mut ActiveCore) {
    ctx.port.disable_rx_int();
    ctx.port.stop_dma();
}

fn failed_event(_: &mut UartInCtx, _: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match e.sig {
        Signal::UartInHwFail => Outcome::Handled,
        _ => Outcome::Super,
    }
}
