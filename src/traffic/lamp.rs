//! Lamp region: one traffic head, stepped by colour commands.
//!
//! The region keeps the last commanded colour and drives its port on every
//! state entry.  Nothing ever reads it back.

use crate::active::ActiveCore;
use crate::app::ports::{Colour, LampPort};
use crate::events::{Axis, Evt, Payload, Signal};
use crate::hsm::{ActionFn, Hsm, Outcome, Region, StateDescriptor, StateId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LampState {
    Root = 0,
    Off = 1,
    Red = 2,
    Yellow = 3,
    Green = 4,
}

impl LampState {
    pub const COUNT: usize = 5;

    pub const fn colour(self) -> Colour {
        match self {
            Self::Root | Self::Off => Colour::Off,
            Self::Red => Colour::Red,
            Self::Yellow => Colour::Yellow,
            Self::Green => Colour::Green,
        }
    }
}

impl StateId for LampState {
    fn index(self) -> usize {
        self as usize
    }
}

pub struct LampCtx {
    axis: Axis,
    port: Box<dyn LampPort>,
}

impl LampCtx {
    pub fn axis(&self) -> Axis {
        self.axis
    }
}

pub type Lamp = Region<LampState, LampCtx, { LampState::COUNT }>;

pub fn region(axis: Axis, port: Box<dyn LampPort>) -> Lamp {
    let label = match axis {
        Axis::NorthSouth => "lamp_ns",
        Axis::EastWest => "lamp_ew",
    };
    Region::new(
        Hsm::new(label, build_state_table(), LampState::Root),
        LampCtx { axis, port },
    )
}

/// Colour command for `axis`.
pub fn command(colour: Colour, axis: Axis) -> Evt {
    let sig = match colour {
        Colour::Off => Signal::LampOffReq,
        Colour::Red => Signal::LampRedReq,
        Colour::Yellow => Signal::LampYellowReq,
        Colour::Green => Signal::LampGreenReq,
    };
    Evt::new(sig).with_payload(Payload::Axis(axis))
}

fn build_state_table() -> [StateDescriptor<LampState, LampCtx>; LampState::COUNT] {
    let leaf = |id: LampState, name: &'static str| {
        let entry: ActionFn<LampCtx> = match id {
            LampState::Red => red_entry,
            LampState::Yellow => yellow_entry,
            LampState::Green => green_entry,
            _ => off_entry,
        };
        StateDescriptor {
            id,
            name,
            parent: Some(LampState::Root),
            initial: None,
            on_entry: Some(entry),
            on_exit: None,
            on_event: crate::hsm::pass,
        }
    };
    [
        StateDescriptor {
            id: LampState::Root,
            name: "Root",
            parent: None,
            initial: Some(LampState::Off),
            on_entry: None,
            on_exit: None,
            on_event: root_event,
        },
        leaf(LampState::Off, "Off"),
        leaf(LampState::Red, "Red"),
        leaf(LampState::Yellow, "Yellow"),
        leaf(LampState::Green, "Green"),
    ]
}

fn show(ctx: &mut LampCtx, colour: Colour) {
    log::debug!("lamp {}: {}", ctx.axis, colour);
    ctx.port.show(colour);
}

fn off_entry(ctx: &mut LampCtx, _: &mut ActiveCore) {
    show(ctx, Colour::Off);
}

fn red_entry(ctx: &mut LampCtx, _: &mut ActiveCore) {
    show(ctx, Colour::Red);
}

fn yellow_entry(ctx: &mut LampCtx, _: &mut ActiveCore) {
    show(ctx, Colour::Yellow);
}

fn green_entry(ctx: &mut LampCtx, _: &mut ActiveCore) {
    show(ctx, Colour::Green);
}

fn root_event(_: &mut LampCtx, _: &mut ActiveCore, e: &Evt) -> Outcome<LampState> {
    match e.sig {
        Signal::LampOffReq => Outcome::Transition(LampState::Off),
        Signal::LampRedReq => Outcome::Transition(LampState::Red),
        Signal::LampYellowReq => Outcome::Transition(LampState::Yellow),
        Signal::LampGreenReq => Outcome::Transition(LampState::Green),
        _ => Outcome::Handled,
    }
}
