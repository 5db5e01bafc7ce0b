//! System orchestrator: starts and stops every driver in dependency order.
//!
//! ```text
//!                 START                 all CFM ok              all CFM ok
//!   ┌─────────┐ ───────▶ ┌───────────┐ ─────────▶ ┌───────────┐ ─────────▶ ┌─────────┐
//!   │ Stopped │          │ Starting1 │            │ Starting2 │            │ Started │
//!   └─────────┘          │ (serial)  │            │ (led, btn)│            └─────────┘
//!        ▲               └───────────┘            └───────────┘                 │
//!        │                     │ fail / timeout / STOP  │                        │ STOP
//!        │                     ▼                        ▼                        ▼
//!        │               ┌───────────┐   all CFM    ┌───────────┐               │
//!        └────────────── │ Stopping1 │ ◀─────────── │ Stopping2 │ ◀─────────────┘
//!                        │ (serial)  │  or timeout  │ (led, btn)│
//!                        └───────────┘              └───────────┘
//! ```
//!
//! Every phase arms its timer at half the total budget, issues one request
//! per driver with a fresh sequence number and counts matching confirms.
//! In a start phase the first failure or the timeout aborts into a full
//! stop; the START confirm then carries that first error.  Stop phases
//! record the first failure and carry on, so the system always ends up in
//! Stopped.  A STOP arriving mid-stop is deferred and recalled when the
//! phase in flight exits.

pub mod context;
pub mod states;

use serde::{Deserialize, Serialize};

use crate::active::{Active, ActiveCore};
use crate::config::AppConfig;
use crate::error::{Reason, Result};
use crate::events::Signal;
use crate::fifo::Fifo;
use crate::hsm::{Hsm, StateId};
pub use context::SystemCtx;

pub const NAME: &str = "system";

// ---------------------------------------------------------------------------
// Drivers under orchestration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DriverId {
    Serial = 1,
    Led = 2,
    Button = 3,
}

impl DriverId {
    /// Every driver the board registers.  A startup plan must list each once.
    pub const ALL: [DriverId; 3] = [Self::Serial, Self::Led, Self::Button];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Serial => "serial",
            Self::Led => "led",
            Self::Button => "button",
        }
    }

    pub const fn start_req(self) -> Signal {
        match self {
            Self::Serial => Signal::SerialStartReq,
            Self::Led => Signal::LedStartReq,
            Self::Button => Signal::ButtonStartReq,
        }
    }

    pub const fn start_cfm(self) -> Signal {
        match self {
            Self::Serial => Signal::SerialStartCfm,
            Self::Led => Signal::LedStartCfm,
            Self::Button => Signal::ButtonStartCfm,
        }
    }

    pub const fn stop_req(self) -> Signal {
        match self {
            Self::Serial => Signal::SerialStopReq,
            Self::Led => Signal::LedStopReq,
            Self::Button => Signal::ButtonStopReq,
        }
    }

    pub const fn stop_cfm(self) -> Signal {
        match self {
            Self::Serial => Signal::SerialStopCfm,
            Self::Led => Signal::LedStopCfm,
            Self::Button => Signal::ButtonStopCfm,
        }
    }

    /// Reason code naming this driver in a TIMEOUT status.
    pub const fn reason(self) -> Reason {
        self as Reason
    }
}

/// Ring buffers handed to the serial driver on START.
#[derive(Debug, Clone, Copy)]
pub struct SerialBuffers {
    pub tx: &'static Fifo,
    pub rx: &'static Fifo,
}

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SystemState {
    Root = 0,
    Stopped = 1,
    Starting = 2,
    Starting1 = 3,
    Starting2 = 4,
    Started = 5,
    Stopping = 6,
    Stopping2 = 7,
    Stopping1 = 8,
}

impl SystemState {
    pub const COUNT: usize = 9;
}

impl StateId for SystemState {
    fn index(self) -> usize {
        self as usize
    }
}

pub type SystemAct = Active<SystemState, SystemCtx, { SystemState::COUNT }>;

const SUBSCRIPTIONS: &[Signal] = &[
    Signal::SystemStartReq,
    Signal::SystemStopReq,
    Signal::SerialStartCfm,
    Signal::SerialStopCfm,
    Signal::LedStartCfm,
    Signal::LedStopCfm,
    Signal::ButtonStartCfm,
    Signal::ButtonStopCfm,
    Signal::ButtonUpInd,
    Signal::ButtonHoldInd,
];

/// Build the orchestrator.  Fails if the startup plan or its budgets are
/// inconsistent.
pub fn create(config: &AppConfig, buffers: SerialBuffers) -> Result<SystemAct> {
    config.orchestrator.validate(&config.drivers)?;
    let mut core = ActiveCore::new(NAME);
    let state_timer = core.add_timer(Signal::SystemStateTimer)?;
    let ctx = SystemCtx::new(
        config.orchestrator.clone(),
        config.drivers,
        buffers,
        state_timer,
    );
    let hsm = Hsm::new(NAME, states::build_state_table(), SystemState::Root);
    Ok(Active::new(core, hsm, ctx, SUBSCRIPTIONS))
}
