//! User LED driver.
//!
//! Drives one `embedded-hal` output pin, active-high.  ON/OFF requests are
//! only accepted while started; every request gets a confirm.  A pin error
//! confirms HARDWARE-FAILURE and leaves the state unchanged.

use embedded_hal::digital::OutputPin;
use log::{info, warn};

use crate::active::{Active, ActiveCore};
use crate::error::{ErrorCode, Result, Status, reason};
use crate::events::{Evt, Signal};
use crate::hsm::{Hsm, Outcome, StateDescriptor, StateId};

pub const NAME: &str = "led";

/// Reason code for a pin write error.
const PIN_FAULT: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LedState {
    Root = 0,
    Stopped = 1,
    Started = 2,
}

impl LedState {
    pub const COUNT: usize = 3;
}

impl StateId for LedState {
    fn index(self) -> usize {
        self as usize
    }
}

pub struct LedCtx<P> {
    pin: P,
    lit: bool,
}

impl<P: OutputPin> LedCtx<P> {
    pub fn is_lit(&self) -> bool {
        self.lit
    }

    fn drive(&mut self, on: bool) -> Status {
        let res = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        match res {
            Ok(()) => {
                self.lit = on;
                Status::SUCCESS
            }
            Err(err) => {
                warn!("led: pin write failed: {err:?}");
                Status::new(ErrorCode::HardwareFailure, PIN_FAULT)
            }
        }
    }
}

pub type LedAct<P> = Active<LedState, LedCtx<P>, { LedState::COUNT }>;

const SUBSCRIPTIONS: &[Signal] = &[
    Signal::LedStartReq,
    Signal::LedStopReq,
    Signal::LedOnReq,
    Signal::LedOffReq,
];

pub fn create<P: OutputPin + 'static>(pin: P) -> Result<LedAct<P>> {
    let core = ActiveCore::new(NAME);
    let ctx = LedCtx { pin, lit: false };
    let hsm = Hsm::new(NAME, build_state_table(), LedState::Root);
    Ok(Active::new(core, hsm, ctx, SUBSCRIPTIONS))
}

fn build_state_table<P: OutputPin>() -> [StateDescriptor<LedState, LedCtx<P>>; LedState::COUNT] {
    [
        StateDescriptor {
            id: LedState::Root,
            name: "Root",
            parent: None,
            initial: Some(LedState::Stopped),
            on_entry: None,
            on_exit: None,
            on_event: |_, _, _| Outcome::Handled,
        },
        StateDescriptor {
            id: LedState::Stopped,
            name: "Stopped",
            parent: Some(LedState::Root),
            initial: None,
            on_entry: None,
            on_exit: None,
            on_event: stopped_event::<P>,
        },
        StateDescriptor {
            id: LedState::Started,
            name: "Started",
            parent: Some(LedState::Root),
            initial: None,
            on_entry: None,
            on_exit: None,
            on_event: started_event::<P>,
        },
    ]
}

fn stopped_event<P: OutputPin>(
    ctx: &mut LedCtx<P>,
    core: &mut ActiveCore,
    e: &Evt,
) -> Outcome<LedState> {
    match e.sig {
        Signal::LedStartReq => {
            let status = ctx.drive(false);
            core.publish(Evt::reply(Signal::LedStartCfm, e.seq, status));
            if status.is_success() {
                info!("led: started");
                Outcome::Transition(LedState::Started)
            } else {
                Outcome::Handled
            }
        }
        Signal::LedStopReq => {
            core.publish(Evt::reply(Signal::LedStopCfm, e.seq, Status::SUCCESS));
            Outcome::Handled
        }
        Signal::LedOnReq | Signal::LedOffReq => {
            let cfm = if e.sig == Signal::LedOnReq {
                Signal::LedOnCfm
            } else {
                Signal::LedOffCfm
            };
            core.publish(Evt::reply(cfm, e.seq, Status::new(ErrorCode::State, reason::NONE)));
            Outcome::Handled
        }
        _ => Outcome::Super,
    }
}

fn started_event<P: OutputPin>(
    ctx: &mut LedCtx<P>,
    core: &mut ActiveCore,
    e: &Evt,
) -> Outcome<LedState> {
    match e.sig {
        Signal::LedOnReq => {
            let status = ctx.drive(true);
            core.publish(Evt::reply(Signal::LedOnCfm, e.seq, status));
            Outcome::Handled
        }
        Signal::LedOffReq => {
            let status = ctx.drive(false);
            core.publish(Evt::reply(Signal::LedOffCfm, e.seq, status));
            Outcome::Handled
        }
        Signal::LedStopReq => {
            let status = ctx.drive(false);
            core.publish(Evt::reply(Signal::LedStopCfm, e.seq, status));
            Outcome::Transition(LedState::Stopped)
        }
        Signal::LedStartReq => {
            core.publish(Evt::reply(
                Signal::LedStartCfm,
                e.seq,
                Status::new(ErrorCode::State, reason::REDUNDANT),
            ));
            Outcome::Handled
        }
        _ => Outcome::Super,
    }
}
