//! Orchestrator state handlers and table builder.

use log::{info, warn};

use super::SystemState as S;
use super::context::{Direction, SystemCtx, Tally};
use crate::active::ActiveCore;
use crate::error::{ErrorCode, Status, reason};
use crate::events::{Evt, Signal};
use crate::hsm::{Outcome, StateDescriptor};

type Desc = StateDescriptor<S, SystemCtx>;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

pub fn build_state_table() -> [Desc; S::COUNT] {
    [
        Desc {
            id: S::Root,
            name: "Root",
            parent: None,
            initial: Some(S::Stopped),
            on_entry: None,
            on_exit: None,
            on_event: root_event,
        },
        Desc {
            id: S::Stopped,
            name: "Stopped",
            parent: Some(S::Root),
            initial: None,
            on_entry: Some(stopped_entry),
            on_exit: None,
            on_event: stopped_event,
        },
        Desc {
            id: S::Starting,
            name: "Starting",
            parent: Some(S::Root),
            initial: Some(S::Starting1),
            on_entry: None,
            on_exit: None,
            on_event: starting_event,
        },
        Desc {
            id: S::Starting1,
            name: "Starting1",
            parent: Some(S::Starting),
            initial: None,
            on_entry: Some(starting1_entry),
            on_exit: Some(phase_exit),
            on_event: crate::hsm::pass,
        },
        Desc {
            id: S::Starting2,
            name: "Starting2",
            parent: Some(S::Starting),
            initial: None,
            on_entry: Some(starting2_entry),
            on_exit: Some(phase_exit),
            on_event: crate::hsm::pass,
        },
        Desc {
            id: S::Started,
            name: "Started",
            parent: Some(S::Root),
            initial: None,
            on_entry: Some(started_entry),
            on_exit: None,
            on_event: started_event,
        },
        Desc {
            id: S::Stopping,
            name: "Stopping",
            parent: Some(S::Root),
            initial: Some(S::Stopping2),
            on_entry: Some(stopping_entry),
            on_exit: None,
            on_event: stopping_event,
        },
        Desc {
            id: S::Stopping2,
            name: "Stopping2",
            parent: Some(S::Stopping),
            initial: None,
            on_entry: Some(stopping2_entry),
            on_exit: Some(stop_phase_exit),
            on_event: crate::hsm::pass,
        },
        Desc {
            id: S::Stopping1,
            name: "Stopping1",
            parent: Some(S::Stopping),
            initial: None,
            on_entry: Some(stopping1_entry),
            on_exit: Some(stop_phase_exit),
            on_event: crate::hsm::pass,
        },
    ]
}

fn start_phase_state(phase: usize) -> S {
    if phase == 0 { S::Starting1 } else { S::Starting2 }
}

fn stop_phase_state(phase: usize) -> S {
    if phase == 0 { S::Stopping1 } else { S::Stopping2 }
}

fn is_start_cfm(sig: Signal) -> bool {
    matches!(
        sig,
        Signal::SerialStartCfm | Signal::LedStartCfm | Signal::ButtonStartCfm
    )
}

fn is_stop_cfm(sig: Signal) -> bool {
    matches!(
        sig,
        Signal::SerialStopCfm | Signal::LedStopCfm | Signal::ButtonStopCfm
    )
}

// ═══════════════════════════════════════════════════════════════════════════
//  Root
// ═══════════════════════════════════════════════════════════════════════════

fn root_event(_: &mut SystemCtx, core: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    if e.sig == Signal::SystemStartReq {
        core.publish(Evt::reply(
            Signal::SystemStartCfm,
            e.seq,
            Status::new(ErrorCode::State, reason::NONE),
        ));
    }
    // Late confirms, indications for other states and unknown signals.
    Outcome::Handled
}

// ═══════════════════════════════════════════════════════════════════════════
//  Stopped
// ═══════════════════════════════════════════════════════════════════════════

fn stopped_entry(_: &mut SystemCtx, _: &mut ActiveCore) {
    info!("system: stopped");
}

fn stopped_event(ctx: &mut SystemCtx, core: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match e.sig {
        Signal::SystemStartReq => {
            info!("system: START #{}", e.seq);
            ctx.start_req = Some(e.seq);
            ctx.start_failure = None;
            ctx.reset_confirmed();
            Outcome::Transition(S::Starting)
        }
        Signal::SystemStopReq => {
            core.publish(Evt::reply(Signal::SystemStopCfm, e.seq, Status::SUCCESS));
            Outcome::Handled
        }
        _ => Outcome::Super,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Starting
// ═══════════════════════════════════════════════════════════════════════════

fn starting1_entry(ctx: &mut SystemCtx, core: &mut ActiveCore) {
    ctx.begin_phase(core, 0, Direction::Start);
}

fn starting2_entry(ctx: &mut SystemCtx, core: &mut ActiveCore) {
    ctx.begin_phase(core, 1, Direction::Start);
}

fn phase_exit(ctx: &mut SystemCtx, core: &mut ActiveCore) {
    core.disarm(ctx.state_timer);
}

fn starting_event(ctx: &mut SystemCtx, core: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match e.sig {
        sig if is_start_cfm(sig) => match ctx.tally(e) {
            Tally::Stale | Tally::Pending => Outcome::Handled,
            Tally::Complete if ctx.phase + 1 < ctx.phase_count() => {
                Outcome::Transition(start_phase_state(ctx.phase + 1))
            }
            Tally::Complete => {
                if let Some(seq) = ctx.start_req.take() {
                    core.publish(Evt::reply(Signal::SystemStartCfm, seq, Status::SUCCESS));
                }
                Outcome::Transition(S::Started)
            }
            Tally::Failed(driver, status) => {
                warn!("system: start aborted, {} failed", driver.name());
                ctx.start_failure = Some(status);
                Outcome::Transition(S::Stopping)
            }
        },
        Signal::SystemStateTimer => {
            let status = ctx.timeout_status();
            warn!("system: start phase {} timed out: {}", ctx.phase + 1, status);
            ctx.start_failure = Some(status);
            Outcome::Transition(S::Stopping)
        }
        Signal::SystemStopReq => {
            if let Some(seq) = ctx.start_req.take() {
                core.publish(Evt::reply(
                    Signal::SystemStartCfm,
                    seq,
                    Status::new(ErrorCode::State, reason::ABORTED),
                ));
            }
            ctx.stop_req = Some(e.seq);
            Outcome::Transition(S::Stopping)
        }
        Signal::SystemStartReq => {
            core.publish(Evt::reply(
                Signal::SystemStartCfm,
                e.seq,
                Status::new(ErrorCode::State, reason::BUSY),
            ));
            Outcome::Handled
        }
        _ => Outcome::Super,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Started
// ═══════════════════════════════════════════════════════════════════════════

fn started_entry(ctx: &mut SystemCtx, _: &mut ActiveCore) {
    info!("system: started ({} driver confirms)", ctx.confirmed());
}

fn started_event(ctx: &mut SystemCtx, core: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match e.sig {
        Signal::SystemStopReq => {
            info!("system: STOP #{}", e.seq);
            ctx.stop_req = Some(e.seq);
            Outcome::Transition(S::Stopping)
        }
        Signal::SystemStartReq => {
            core.publish(Evt::reply(
                Signal::SystemStartCfm,
                e.seq,
                Status::new(ErrorCode::State, reason::REDUNDANT),
            ));
            Outcome::Handled
        }
        Signal::ButtonUpInd => {
            let seq = core.next_seq();
            core.publish(Evt::new(Signal::LedOffReq).with_seq(seq));
            Outcome::Handled
        }
        Signal::ButtonHoldInd => {
            let seq = core.next_seq();
            core.publish(Evt::new(Signal::LedOnReq).with_seq(seq));
            Outcome::Handled
        }
        _ => Outcome::Super,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Stopping
// ═══════════════════════════════════════════════════════════════════════════

fn stopping_entry(ctx: &mut SystemCtx, _: &mut ActiveCore) {
    ctx.stop_failure = None;
}

fn stopping2_entry(ctx: &mut SystemCtx, core: &mut ActiveCore) {
    ctx.begin_phase(core, 1, Direction::Stop);
}

fn stopping1_entry(ctx: &mut SystemCtx, core: &mut ActiveCore) {
    ctx.begin_phase(core, 0, Direction::Stop);
}

fn stop_phase_exit(ctx: &mut SystemCtx, core: &mut ActiveCore) {
    core.disarm(ctx.state_timer);
    // Every held STOP comes back; the next state answers or re-defers it.
    core.recall_all();
}

fn stopping_event(ctx: &mut SystemCtx, core: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match e.sig {
        sig if is_stop_cfm(sig) => match ctx.tally(e) {
            Tally::Stale | Tally::Pending => Outcome::Handled,
            Tally::Complete => next_stop_phase(ctx, core),
            Tally::Failed(driver, status) => {
                warn!("system: {} failed to stop: {}", driver.name(), status);
                record_stop_failure(ctx, status);
                if ctx.outstanding() == 0 {
                    next_stop_phase(ctx, core)
                } else {
                    Outcome::Handled
                }
            }
        },
        Signal::SystemStateTimer => {
            let status = ctx.timeout_status();
            warn!("system: stop phase {} timed out: {}", ctx.phase + 1, status);
            record_stop_failure(ctx, status);
            next_stop_phase(ctx, core)
        }
        Signal::SystemStopReq => {
            if !core.defer(e) {
                core.publish(Evt::reply(
                    Signal::SystemStopCfm,
                    e.seq,
                    Status::new(ErrorCode::State, reason::BUSY),
                ));
            }
            Outcome::Handled
        }
        _ => Outcome::Super,
    }
}

/// First stop failure wins.
fn record_stop_failure(ctx: &mut SystemCtx, status: Status) {
    if ctx.stop_failure.is_none() {
        ctx.stop_failure = Some(status);
    }
}

/// Move to the next stop phase, or finish and answer the requests.
fn next_stop_phase(ctx: &mut SystemCtx, core: &mut ActiveCore) -> Outcome<S> {
    if ctx.phase > 0 {
        return Outcome::Transition(stop_phase_state(ctx.phase - 1));
    }
    if let Some(seq) = ctx.start_req.take() {
        let status = ctx
            .start_failure
            .unwrap_or(Status::new(ErrorCode::Unspecified, reason::NONE));
        core.publish(Evt::reply(Signal::SystemStartCfm, seq, status));
    }
    if let Some(seq) = ctx.stop_req.take() {
        let status = ctx.stop_failure.unwrap_or(Status::SUCCESS);
        core.publish(Evt::reply(Signal::SystemStopCfm, seq, status));
    }
    Outcome::Transition(S::Stopped)
}
