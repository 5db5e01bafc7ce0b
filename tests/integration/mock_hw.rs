//! Test rig for integration tests.
//!
//! Assembles the full board on the simulated peripherals and adds a
//! recorder object that keeps every confirm and indication published, so
//! tests can assert on the complete reply history.

use std::cell::RefCell;
use std::rc::Rc;

use embedded_hal::digital::{ErrorKind, ErrorType, OutputPin};
use signalbox::active::{ActiveCore, ActiveObject};
use signalbox::adapters::sim::{SimLamp, SimPin, SimUartRx, SimUartTx};
use signalbox::app::board::{Board, Hardware};
use signalbox::config::AppConfig;
use signalbox::error::Status;
use signalbox::events::{Axis, Evt, Signal};
use signalbox::isr::{self, IsrLine};

/// Served before every other object so its mailbox never backs up.
pub const RECORDER_PRIO: u8 = 9;

/// Confirms and indications worth asserting on.
pub const WATCHED: &[Signal] = &[
    Signal::SystemStartCfm,
    Signal::SystemStopCfm,
    Signal::SerialStartCfm,
    Signal::SerialStopCfm,
    Signal::LedStartCfm,
    Signal::LedStopCfm,
    Signal::LedOnCfm,
    Signal::LedOffCfm,
    Signal::ButtonStartCfm,
    Signal::ButtonStopCfm,
    Signal::ButtonDownInd,
    Signal::ButtonUpInd,
    Signal::ButtonHoldInd,
    Signal::TrafficStartCfm,
    Signal::TrafficStopCfm,
    Signal::UartInDataInd,
    Signal::UartInFailInd,
    Signal::UartOutEmptyInd,
    Signal::UartOutFailInd,
];

pub type Seen = Rc<RefCell<Vec<Evt>>>;

// ── Recorder ──────────────────────────────────────────────────

pub struct Recorder {
    core: ActiveCore,
    watched: &'static [Signal],
    seen: Seen,
}

impl Recorder {
    pub fn boxed(watched: &'static [Signal], seen: &Seen) -> Box<Self> {
        Box::new(Self {
            core: ActiveCore::new("recorder"),
            watched,
            seen: Rc::clone(seen),
        })
    }
}

impl ActiveObject for Recorder {
    fn name(&self) -> &'static str {
        self.core.name()
    }
    fn subscriptions(&self) -> &'static [Signal] {
        self.watched
    }
    fn init(&mut self) {}
    fn dispatch(&mut self, evt: &Evt) {
        self.seen.borrow_mut().push(*evt);
    }
    fn core(&self) -> &ActiveCore {
        &self.core
    }
    fn core_mut(&mut self) -> &mut ActiveCore {
        &mut self.core
    }
    fn state_name(&self) -> &'static str {
        "Recording"
    }
}

// ── Failing pin ───────────────────────────────────────────────

/// Output pin whose every write fails.
pub struct FailingPin;

impl ErrorType for FailingPin {
    type Error = ErrorKind;
}

impl OutputPin for FailingPin {
    fn set_low(&mut self) -> Result<(), ErrorKind> {
        Err(ErrorKind::Other)
    }
    fn set_high(&mut self) -> Result<(), ErrorKind> {
        Err(ErrorKind::Other)
    }
}

// ── Rig ───────────────────────────────────────────────────────

pub struct Rig {
    pub board: Board,
    pub line: &'static IsrLine,
    pub rx: SimUartRx,
    pub tx: SimUartTx,
    /// Detached when the rig was built with a custom LED pin.
    pub led: SimPin,
    pub button: SimPin,
    pub ns: SimLamp,
    pub ew: SimLamp,
    pub seen: Seen,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        Self::with_config(&AppConfig::default())
    }

    pub fn with_config(config: &AppConfig) -> Self {
        let led = SimPin::new(false);
        let mut rig = Self::build(config, led.clone(), WATCHED);
        rig.led = led;
        rig
    }

    pub fn with_led<L: OutputPin + 'static>(led: L) -> Self {
        Self::build(&AppConfig::default(), led, WATCHED)
    }

    /// Only `watched` reaches the recorder.
    pub fn watching(watched: &'static [Signal]) -> Self {
        let led = SimPin::new(false);
        let mut rig = Self::build(&AppConfig::default(), led.clone(), watched);
        rig.led = led;
        rig
    }

    fn build<L: OutputPin + 'static>(
        config: &AppConfig,
        led: L,
        watched: &'static [Signal],
    ) -> Self {
        let (line, drain) = isr::channel();
        let rx = SimUartRx::new(line);
        let tx = SimUartTx::new(line);
        let button = SimPin::new(true);
        let ns = SimLamp::new(Axis::NorthSouth);
        let ew = SimLamp::new(Axis::EastWest);
        let seen = Seen::default();

        let board = Board::assemble_with(
            config,
            Hardware {
                uart_rx: Box::new(rx.clone()),
                uart_tx: Box::new(tx.clone()),
                led,
                button: button.clone(),
                lamp_ns: Box::new(ns.clone()),
                lamp_ew: Box::new(ew.clone()),
            },
            drain,
            vec![(RECORDER_PRIO, Recorder::boxed(watched, &seen) as Box<dyn ActiveObject>)],
        )
        .unwrap();

        Self {
            board,
            line,
            rx,
            tx,
            led: SimPin::default(),
            button,
            ns,
            ew,
            seen,
        }
    }

    pub fn request(&mut self, sig: Signal) -> u16 {
        self.board.request(sig)
    }

    pub fn settle(&mut self) {
        self.board.dispatcher.run_until_idle();
    }

    pub fn advance(&mut self, ms: u32) {
        self.board.dispatcher.advance(ms);
    }

    pub fn state(&self, name: &str) -> &'static str {
        self.board.dispatcher.state_of(name).unwrap()
    }

    /// Everything recorded with signal `sig`, oldest first.
    pub fn replies(&self, sig: Signal) -> Vec<Evt> {
        self.seen
            .borrow()
            .iter()
            .filter(|e| e.sig == sig)
            .copied()
            .collect()
    }

    /// Status of the single confirm `sig` answering request `seq`.
    pub fn status_of(&self, sig: Signal, seq: u16) -> Status {
        let matching: Vec<Evt> = self
            .replies(sig)
            .into_iter()
            .filter(|e| e.seq == seq)
            .collect();
        assert_eq!(matching.len(), 1, "{sig} #{seq} answered {} times", matching.len());
        matching[0].status_or_success()
    }

    /// Start the system and run until it settles.
    pub fn start_system(&mut self) -> u16 {
        let seq = self.request(Signal::SystemStartReq);
        self.settle();
        assert_eq!(self.state("system"), "Started");
        seq
    }

    /// Start the system, then the traffic controller.
    pub fn start_all(&mut self) {
        self.start_system();
        self.request(Signal::TrafficStartReq);
        self.settle();
    }
}

impl Default for Rig {
    fn default() -> Self {
        Self::new()
    }
}
