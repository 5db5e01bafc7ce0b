//! Push-button driver.
//!
//! ## Hardware
//!
//! Active-low momentary switch with external pull-up.  The edge interrupt
//! only raises `ButtonTrig`; the pin level is read here, inside the
//! run-to-completion step, so bounces collapse into at most one
//! indication per settled level.
//!
//! ## Gestures
//!
//! | Gesture  | Condition                          | Event           |
//! |----------|------------------------------------|-----------------|
//! | Press    | Level goes low                     | `ButtonDownInd` |
//! | Release  | Level goes high                    | `ButtonUpInd`   |
//! | Hold     | Still low after `hold_ms`          | `ButtonHoldInd` |

use embedded_hal::digital::InputPin;
use log::{debug, info, warn};

use crate::active::{Active, ActiveCore, TimerId};
use crate::config::ButtonConfig;
use crate::error::{ErrorCode, Result, Status, reason};
use crate::events::{Evt, Signal};
use crate::hsm::{Hsm, Outcome, StateDescriptor, StateId};

pub const NAME: &str = "button";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ButtonState {
    Root = 0,
    Stopped = 1,
    Started = 2,
    Up = 3,
    Down = 4,
}

impl ButtonState {
    pub const COUNT: usize = 5;
}

impl StateId for ButtonState {
    fn index(self) -> usize {
        self as usize
    }
}

pub struct ButtonCtx<P> {
    pin: P,
    hold_timer: TimerId,
    hold_ms: u32,
}

impl<P: InputPin> ButtonCtx<P> {
    /// `None` if the pin could not be read.
    fn pressed(&mut self) -> Option<bool> {
        match self.pin.is_low() {
            Ok(low) => Some(low),
            Err(err) => {
                warn!("button: pin read failed: {err:?}");
                None
            }
        }
    }
}

pub type ButtonAct<P> = Active<ButtonState, ButtonCtx<P>, { ButtonState::COUNT }>;

const SUBSCRIPTIONS: &[Signal] = &[
    Signal::ButtonStartReq,
    Signal::ButtonStopReq,
    Signal::ButtonTrig,
];

pub fn create<P: InputPin + 'static>(pin: P, config: &ButtonConfig) -> Result<ButtonAct<P>> {
    let mut core = ActiveCore::new(NAME);
    let hold_timer = core.add_timer(Signal::ButtonHoldTimer)?;
    let ctx = ButtonCtx {
        pin,
        hold_timer,
        hold_ms: config.hold_ms,
    };
    let hsm = Hsm::new(NAME, build_state_table(), ButtonState::Root);
    Ok(Active::new(core, hsm, ctx, SUBSCRIPTIONS))
}

type Desc<P> = StateDescriptor<ButtonState, ButtonCtx<P>>;

fn build_state_table<P: InputPin>() -> [Desc<P>; ButtonState::COUNT] {
    [
        Desc {
            id: ButtonState::Root,
            name: "Root",
            parent: None,
            initial: Some(ButtonState::Stopped),
            on_entry: None,
            on_exit: None,
            on_event: |_, _, _| Outcome::Handled,
        },
        Desc {
            id: ButtonState::Stopped,
            name: "Stopped",
            parent: Some(ButtonState::Root),
            initial: None,
            on_entry: None,
            on_exit: None,
            on_event: stopped_event::<P>,
        },
        Desc {
            id: ButtonState::Started,
            name: "Started",
            parent: Some(ButtonState::Root),
            initial: Some(ButtonState::Up),
            on_entry: None,
            on_exit: None,
            on_event: started_event::<P>,
        },
        Desc {
            id: ButtonState::Up,
            name: "Up",
            parent: Some(ButtonState::Started),
            initial: None,
            on_entry: None,
            on_exit: None,
            on_event: up_event::<P>,
        },
        Desc {
            id: ButtonState::Down,
            name: "Down",
            parent: Some(ButtonState::Started),
            initial: None,
            on_entry: Some(down_entry::<P>),
            on_exit: Some(down_exit::<P>),
            on_event: down_event::<P>,
        },
    ]
}

fn stopped_event<P: InputPin>(
    ctx: &mut ButtonCtx<P>,
    core: &mut ActiveCore,
    e: &Evt,
) -> Outcome<ButtonState> {
    match e.sig {
        Signal::ButtonStartReq => match ctx.pressed() {
            Some(_) => {
                info!("button: started");
                core.publish(Evt::reply(Signal::ButtonStartCfm, e.seq, Status::SUCCESS));
                Outcome::Transition(ButtonState::Started)
            }
            None => {
                core.publish(Evt::reply(
                    Signal::ButtonStartCfm,
                    e.seq,
                    Status::new(ErrorCode::HardwareFailure, reason::NONE),
                ));
                Outcome::Handled
            }
        },
        Signal::ButtonStopReq => {
            core.publish(Evt::reply(Signal::ButtonStopCfm, e.seq, Status::SUCCESS));
            Outcome::Handled
        }
        _ => Outcome::Super,
    }
}

fn started_event<P: InputPin>(
    _: &mut ButtonCtx<P>,
    core: &mut ActiveCore,
    e: &Evt,
) -> Outcome<ButtonState> {
    match e.sig {
        Signal::ButtonStopReq => {
            core.publish(Evt::reply(Signal::ButtonStopCfm, e.seq, Status::SUCCESS));
            Outcome::Transition(ButtonState::Stopped)
        }
        Signal::ButtonStartReq => {
            core.publish(Evt::reply(
                Signal::ButtonStartCfm,
                e.seq,
                Status::new(ErrorCode::State, reason::REDUNDANT),
            ));
            Outcome::Handled
        }
        _ => Outcome::Super,
    }
}

fn up_event<P: InputPin>(
    ctx: &mut ButtonCtx<P>,
    core: &mut ActiveCore,
    e: &Evt,
) -> Outcome<ButtonState> {
    match e.sig {
        Signal::ButtonTrig if ctx.pressed() == Some(true) => {
            debug!("button: down");
            let seq = core.next_seq();
            core.publish(Evt::new(Signal::ButtonDownInd).with_seq(seq));
            Outcome::Transition(ButtonState::Down)
        }
        Signal::ButtonTrig => Outcome::Handled,
        _ => Outcome::Super,
    }
}

fn down_entry<P: InputPin>(ctx: &mut ButtonCtx<P>, core: &mut ActiveCore) {
    core.arm(ctx.hold_timer, ctx.hold_ms);
}

fn down_exit<P: InputPin>(ctx: &mut ButtonCtx<P>, core: &mut ActiveCore) {
    core.disarm(ctx.hold_timer);
}

fn down_event<P: InputPin>(
    ctx: &mut ButtonCtx<P>,
    core: &mut ActiveCore,
    e: &Evt,
) -> Outcome<ButtonState> {
    match e.sig {
        Signal::ButtonTrig if ctx.pressed() == Some(false) => {
            debug!("button: up");
            let seq = core.next_seq();
            core.publish(Evt::new(Signal::ButtonUpInd).with_seq(seq));
            Outcome::Transition(ButtonState::Up)
        }
        Signal::ButtonTrig => Outcome::Handled,
        Signal::ButtonHoldTimer => {
            debug!("button: hold");
            let seq = core.next_seq();
            core.publish(Evt::new(Signal::ButtonHoldInd).with_seq(seq));
            Outcome::Handled
        }
        _ => Outcome::Super,
    }
}
