//! Traffic controller state handlers and table builder.

use log::{info, warn};

use super::TrafficCtx;
use super::TrafficState as S;
use super::lamp::command;
use crate::active::ActiveCore;
use crate::app::ports::Colour;
use crate::error::{ErrorCode, Status, reason};
use crate::events::{Axis, Evt, Payload, Signal};
use crate::hsm::{Outcome, StateDescriptor};
use crate::inject::{Injection, USAGE};

type Desc = StateDescriptor<S, TrafficCtx>;

const NS: Axis = Axis::NorthSouth;
const EW: Axis = Axis::EastWest;

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
            on_entry: None,
            on_exit: None,
            on_event: stopped_event,
        },
        Desc {
            id: S::Started,
            name: "Started",
            parent: Some(S::Root),
            initial: Some(S::NsGo),
            on_entry: Some(started_entry),
            on_exit: Some(started_exit),
            on_event: started_event,
        },
        Desc {
            id: S::NsGo,
            name: "NsGo",
            parent: Some(S::Started),
            initial: Some(S::NsMinTimeWait),
            on_entry: Some(ns_go_entry),
            on_exit: None,
            on_event: ns_go_event,
        },
        Desc {
            id: S::NsMinTimeWait,
            name: "NsMinTimeWait",
            parent: Some(S::NsGo),
            initial: None,
            on_entry: Some(ns_min_wait_entry),
            on_exit: Some(ns_min_wait_exit),
            on_event: ns_min_wait_event,
        },
        Desc {
            id: S::NsMinTimeExceeded,
            name: "NsMinTimeExceeded",
            parent: Some(S::NsGo),
            initial: None,
            on_entry: None,
            on_exit: None,
            on_event: crate::hsm::pass,
        },
        Desc {
            id: S::NsClearing,
            name: "NsClearing",
            parent: Some(S::Started),
            initial: None,
            on_entry: Some(ns_clearing_entry),
            on_exit: Some(wait_exit),
            on_event: ns_clearing_event,
        },
        Desc {
            id: S::EwGo,
            name: "EwGo",
            parent: Some(S::Started),
            initial: Some(S::EwMinTimeWait),
            on_entry: Some(ew_go_entry),
            on_exit: Some(ew_go_exit),
            on_event: ew_go_event,
        },
        Desc {
            id: S::EwMinTimeWait,
            name: "EwMinTimeWait",
            parent: Some(S::EwGo),
            initial: None,
            on_entry: Some(ew_min_wait_entry),
            on_exit: Some(ew_min_wait_exit),
            on_event: ew_min_wait_event,
        },
        Desc {
            id: S::EwMinTimeExceeded,
            name: "EwMinTimeExceeded",
            parent: Some(S::EwGo),
            initial: None,
            on_entry: None,
            on_exit: None,
            on_event: crate::hsm::pass,
        },
        Desc {
            id: S::EwClearing,
            name: "EwClearing",
            parent: Some(S::Started),
            initial: None,
            on_entry: Some(ew_clearing_entry),
            on_exit: Some(wait_exit),
            on_event: ew_clearing_event,
        },
        Desc {
            id: S::Flashing,
            name: "Flashing",
            parent: Some(S::Started),
            initial: Some(S::FlashingOn),
            on_entry: Some(flashing_entry),
            on_exit: Some(flashing_exit),
            on_event: flashing_event,
        },
        Desc {
            id: S::FlashingOn,
            name: "FlashingOn",
            parent: Some(S::Flashing),
            initial: None,
            on_entry: Some(flashing_on_entry),
            on_exit: None,
            on_event: flashing_on_event,
        },
        Desc {
            id: S::FlashingOff,
            name: "FlashingOff",
            parent: Some(S::Flashing),
            initial: None,
            on_entry: Some(flashing_off_entry),
            on_exit: None,
            on_event: flashing_off_event,
        },
    ]
}

fn car(axis: Axis) -> Evt {
    Evt::new(Signal::TrafficCarReq).with_payload(Payload::Axis(axis))
}

fn is_car(e: &Evt, axis: Axis) -> bool {
    e.sig == Signal::TrafficCarReq && e.axis() == Some(axis)
}

// ═══════════════════════════════════════════════════════════════════════════
//  Root / Stopped
// ═══════════════════════════════════════════════════════════════════════════

fn root_event(ctx: &mut TrafficCtx, core: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match e.sig {
        Signal::TrafficStartReq => {
            core.publish(Evt::reply(
                Signal::TrafficStartCfm,
                e.seq,
                Status::new(ErrorCode::State, reason::REDUNDANT),
            ));
        }
        Signal::UartInDataInd => {
            let mut unknown = false;
            let left = ctx.injector.drain(|inj| match inj {
                Injection::Arrival(axis) => core.post_fifo(car(axis)),
                Injection::Fault => core.post_fifo(Evt::new(Signal::TrafficErrorReq)),
                Injection::Unknown(_) => unknown = true,
            });
            if unknown {
                ctx.console.print(core, USAGE);
            }
            if left > 0 {
                // Pick up the rest after the posted arrivals.
                core.post_fifo(Evt::new(Signal::UartInDataInd));
            }
        }
        _ => {}
    }
    Outcome::Handled
}

fn stopped_event(_: &mut TrafficCtx, core: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match e.sig {
        Signal::TrafficStartReq => {
            core.publish(Evt::reply(Signal::TrafficStartCfm, e.seq, Status::SUCCESS));
            Outcome::Transition(S::Started)
        }
        Signal::TrafficStopReq => {
            core.publish(Evt::reply(Signal::TrafficStopCfm, e.seq, Status::SUCCESS));
            Outcome::Handled
        }
        _ => Outcome::Super,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Started
// ═══════════════════════════════════════════════════════════════════════════

fn started_entry(ctx: &mut TrafficCtx, core: &mut ActiveCore) {
    info!("traffic: started");
    ctx.init_lamps(core);
    ctx.console.print(core, USAGE);
}

fn started_exit(ctx: &mut TrafficCtx, core: &mut ActiveCore) {
    for axis in Axis::BOTH {
        ctx.lamps[axis.index()].dispatch(core, &command(Colour::Off, axis));
    }
    ctx.car_waiting = false;
    info!("traffic: stopped");
}

fn started_event(ctx: &mut TrafficCtx, core: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match e.sig {
        Signal::TrafficStopReq => {
            core.publish(Evt::reply(Signal::TrafficStopCfm, e.seq, Status::SUCCESS));
            Outcome::Transition(S::Stopped)
        }
        Signal::TrafficErrorReq => {
            warn!("traffic: fault, flashing");
            Outcome::Transition(S::Flashing)
        }
        Signal::LampRedReq | Signal::LampYellowReq | Signal::LampGreenReq | Signal::LampOffReq => {
            if let Some(axis) = e.axis() {
                ctx.lamps[axis.index()].dispatch(core, e);
            }
            Outcome::Handled
        }
        _ => Outcome::Super,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Go / minimum green / clearing, shared by both axes
// ═══════════════════════════════════════════════════════════════════════════

fn go_entry(core: &mut ActiveCore, axis: Axis) {
    info!("traffic: {} go", axis);
    core.post_lifo(command(Colour::Green, axis));
    core.post_lifo(command(Colour::Red, axis.opposite()));
}

fn min_wait_entry(ctx: &mut TrafficCtx, core: &mut ActiveCore, axis: Axis) {
    ctx.car_waiting = false;
    core.arm(ctx.wait_timer, ctx.min_green_ms(axis));
}

/// Re-raise a latched opposing arrival so the enclosing Go state sees it.
fn min_wait_exit(ctx: &mut TrafficCtx, core: &mut ActiveCore, axis: Axis) {
    if ctx.car_waiting {
        ctx.car_waiting = false;
        core.post_lifo(car(axis.opposite()));
    }
    core.disarm(ctx.wait_timer);
}

fn min_wait_event(ctx: &mut TrafficCtx, e: &Evt, axis: Axis, exceeded: S) -> Outcome<S> {
    match e.sig {
        Signal::TrafficCarReq if is_car(e, axis.opposite()) => {
            ctx.car_waiting = true;
            Outcome::Handled
        }
        Signal::TrafficWaitTimer => Outcome::Transition(exceeded),
        _ => Outcome::Super,
    }
}

fn clearing_entry(ctx: &mut TrafficCtx, core: &mut ActiveCore, axis: Axis) {
    core.post_lifo(command(Colour::Yellow, axis));
    core.arm(ctx.wait_timer, ctx.clearance_ms(axis));
}

fn wait_exit(ctx: &mut TrafficCtx, core: &mut ActiveCore) {
    core.disarm(ctx.wait_timer);
}

// ── North-south ──────────────────────────────────────────────

fn ns_go_entry(_: &mut TrafficCtx, core: &mut ActiveCore) {
    go_entry(core, NS);
}

fn ns_go_event(_: &mut TrafficCtx, _: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match e.sig {
        Signal::TrafficCarReq if is_car(e, EW) => Outcome::Transition(S::NsClearing),
        Signal::TrafficCarReq => Outcome::Handled,
        _ => Outcome::Super,
    }
}

fn ns_min_wait_entry(ctx: &mut TrafficCtx, core: &mut ActiveCore) {
    min_wait_entry(ctx, core, NS);
}

fn ns_min_wait_exit(ctx: &mut TrafficCtx, core: &mut ActiveCore) {
    min_wait_exit(ctx, core, NS);
}

fn ns_min_wait_event(ctx: &mut TrafficCtx, _: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    min_wait_event(ctx, e, NS, S::NsMinTimeExceeded)
}

fn ns_clearing_entry(ctx: &mut TrafficCtx, core: &mut ActiveCore) {
    clearing_entry(ctx, core, NS);
}

fn ns_clearing_event(_: &mut TrafficCtx, _: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match e.sig {
        Signal::TrafficWaitTimer => Outcome::Transition(S::EwGo),
        _ => Outcome::Super,
    }
}

// ── East-west ────────────────────────────────────────────────

fn ew_go_entry(ctx: &mut TrafficCtx, core: &mut ActiveCore) {
    go_entry(core, EW);
    core.arm(ctx.idle_timer, ctx.timing.ew_idle_ms);
}

fn ew_go_exit(ctx: &mut TrafficCtx, core: &mut ActiveCore) {
    core.disarm(ctx.idle_timer);
}

fn ew_go_event(ctx: &mut TrafficCtx, core: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match e.sig {
        Signal::TrafficCarReq if is_car(e, EW) => {
            core.rearm(ctx.idle_timer, ctx.timing.ew_idle_ms);
            Outcome::Handled
        }
        Signal::TrafficCarReq | Signal::TrafficIdleTimer => Outcome::Transition(S::EwClearing),
        _ => Outcome::Super,
    }
}

fn ew_min_wait_entry(ctx: &mut TrafficCtx, core: &mut ActiveCore) {
    min_wait_entry(ctx, core, EW);
}

fn ew_min_wait_exit(ctx: &mut TrafficCtx, core: &mut ActiveCore) {
    min_wait_exit(ctx, core, EW);
}

fn ew_min_wait_event(ctx: &mut TrafficCtx, _: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    min_wait_event(ctx, e, EW, S::EwMinTimeExceeded)
}

fn ew_clearing_entry(ctx: &mut TrafficCtx, core: &mut ActiveCore) {
    clearing_entry(ctx, core, EW);
}

fn ew_clearing_event(_: &mut TrafficCtx, _: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match e.sig {
        Signal::TrafficWaitTimer => Outcome::Transition(S::NsGo),
        _ => Outcome::Super,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Flashing
// ═══════════════════════════════════════════════════════════════════════════

fn flashing_entry(ctx: &mut TrafficCtx, core: &mut ActiveCore) {
    let blink = ctx.timing.blink_ms;
    core.arm_periodic(ctx.blink_timer, blink, blink);
}

fn flashing_exit(ctx: &mut TrafficCtx, core: &mut ActiveCore) {
    core.disarm(ctx.blink_timer);
}

fn flashing_event(_: &mut TrafficCtx, _: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match e.sig {
        // Already flashing; only STOP leaves.
        Signal::TrafficErrorReq | Signal::TrafficCarReq => Outcome::Handled,
        _ => Outcome::Super,
    }
}

fn flashing_on_entry(_: &mut TrafficCtx, core: &mut ActiveCore) {
    for axis in Axis::BOTH {
        core.post_lifo(command(Colour::Red, axis));
    }
}

fn flashing_on_event(_: &mut TrafficCtx, _: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match e.sig {
        Signal::TrafficBlinkTimer => Outcome::Transition(S::FlashingOff),
        _ => Outcome::Super,
    }
}

fn flashing_off_entry(_: &mut TrafficCtx, core: &mut ActiveCore) {
    for axis in Axis::BOTH {
        core.post_lifo(command(Colour::Off, axis));
    }
}

fn flashing_off_event(_: &mut TrafficCtx, _: &mut ActiveCore, e: &Evt) -> Outcome<S> {
    match e.sig {
        Signal::TrafficBlinkTimer => Outcome::Transition(S::FlashingOn),
        _ => Outcome::Super,
    }
}
