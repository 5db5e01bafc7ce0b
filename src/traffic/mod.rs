//! Traffic light controller for a two-axis intersection.
//!
//! ```text
//!   Stopped ──START──▶ Started ─────────────────────────── ERROR ──▶ Flashing
//!                       │                                           ├ FlashingOn  (red/red)
//!                       │  NsGo (NS green, EW red)                  └ FlashingOff (off/off)
//!                       │   ├ NsMinTimeWait ──wait──▶ NsMinTimeExceeded
//!                       │   └──EW car──▶ NsClearing (NS yellow) ──wait──▶ EwGo
//!                       │  EwGo (EW green, NS red, idle timer)
//!                       │   ├ EwMinTimeWait ──wait──▶ EwMinTimeExceeded
//!                       │   └──NS car / idle──▶ EwClearing (EW yellow) ──wait──▶ NsGo
//!                       │
//!                       └ lamp_ns, lamp_ew: orthogonal lamp regions
//! ```
//!
//! North-south is the main road: it rests on green.  An east-west arrival
//! during the north-south minimum green is latched and re-raised once the
//! minimum has passed.  East-west green ends after its minimum when a
//! north-south car arrives or no east-west car has been seen for the idle
//! time.
//!
//! The sequencer talks to the lamps only through colour commands it posts
//! to itself; each command is stepped into the region named by its axis.

pub mod lamp;
pub mod states;

use crate::active::{Active, ActiveCore, TimerId};
use crate::app::ports::LampPort;
use crate::config::TrafficTiming;
use crate::error::Result;
use crate::events::{Axis, Signal};
use crate::hsm::{Hsm, StateId};
use crate::inject::{CharInjector, Console};
use crate::system::SerialBuffers;
pub use lamp::{Lamp, LampState};

pub const NAME: &str = "traffic";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TrafficState {
    Root = 0,
    Stopped = 1,
    Started = 2,
    NsGo = 3,
    NsMinTimeWait = 4,
    NsMinTimeExceeded = 5,
    NsClearing = 6,
    EwGo = 7,
    EwMinTimeWait = 8,
    EwMinTimeExceeded = 9,
    EwClearing = 10,
    Flashing = 11,
    FlashingOn = 12,
    FlashingOff = 13,
}

impl TrafficState {
    pub const COUNT: usize = 14;
}

impl StateId for TrafficState {
    fn index(self) -> usize {
        self as usize
    }
}

pub struct TrafficCtx {
    /// Indexed by [`Axis::index`].
    pub lamps: [Lamp; 2],
    timing: TrafficTiming,
    wait_timer: TimerId,
    idle_timer: TimerId,
    blink_timer: TimerId,
    /// Opposing arrival seen during a minimum green.
    car_waiting: bool,
    injector: CharInjector,
    console: Console,
}

impl TrafficCtx {
    pub fn lamp(&self, axis: Axis) -> &Lamp {
        &self.lamps[axis.index()]
    }

    pub fn car_waiting(&self) -> bool {
        self.car_waiting
    }

    fn min_green_ms(&self, axis: Axis) -> u32 {
        match axis {
            Axis::NorthSouth => self.timing.min_green_ns_ms,
            Axis::EastWest => self.timing.min_green_ew_ms,
        }
    }

    fn clearance_ms(&self, axis: Axis) -> u32 {
        match axis {
            Axis::NorthSouth => self.timing.clearance_ns_ms,
            Axis::EastWest => self.timing.clearance_ew_ms,
        }
    }

    fn init_lamps(&mut self, core: &mut ActiveCore) {
        for lamp in &mut self.lamps {
            lamp.init(core);
        }
    }
}

pub type TrafficAct = Active<TrafficState, TrafficCtx, { TrafficState::COUNT }>;

const SUBSCRIPTIONS: &[Signal] = &[
    Signal::TrafficStartReq,
    Signal::TrafficStopReq,
    Signal::TrafficCarReq,
    Signal::TrafficErrorReq,
    Signal::UartInDataInd,
];

/// Build the controller.  `ns` and `ew` drive the two lamp heads; serial
/// buffers carry the debug injection path and the console.
pub fn create(
    timing: &TrafficTiming,
    ns: Box<dyn LampPort>,
    ew: Box<dyn LampPort>,
    serial: SerialBuffers,
) -> Result<TrafficAct> {
    timing.validate()?;
    let mut core = ActiveCore::new(NAME);
    let wait_timer = core.add_timer(Signal::TrafficWaitTimer)?;
    let idle_timer = core.add_timer(Signal::TrafficIdleTimer)?;
    let blink_timer = core.add_timer(Signal::TrafficBlinkTimer)?;
    let ctx = TrafficCtx {
        lamps: [
            lamp::region(Axis::NorthSouth, ns),
            lamp::region(Axis::EastWest, ew),
        ],
        timing: *timing,
        wait_timer,
        idle_timer,
        blink_timer,
        car_waiting: false,
        injector: CharInjector::new(serial.rx),
        console: Console::new(serial.tx),
    };
    let hsm = Hsm::new(NAME, states::build_state_table(), TrafficState::Root);
    Ok(Active::new(core, hsm, ctx, SUBSCRIPTIONS))
}
