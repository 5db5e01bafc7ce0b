//! Serial driver: one active object owning a receive and a transmit region.
//!
//! ```text
//!   SerialAct
//!   ├── Stopped ──SERIAL_START(tx, rx)──▶ Started   (both regions started)
//!   └── Started ──SERIAL_STOP──────────▶ Stopped   (both regions stopped)
//!
//!   regions (orthogonal, driven inline):
//!     uart_in   Stopped / Started{Normal{Inactive, Active}, Failed}
//!     uart_out  Stopped / Started{Inactive, Active, Failed}
//! ```
//!
//! START either brings up both directions or neither: if one region
//! refuses, the other is stopped again and the confirm carries the fault.

pub mod uart_in;
pub mod uart_out;

use log::{info, warn};

use crate::active::{Active, ActiveCore};
use crate::app::ports::{UartRxPort, UartTxPort};
use crate::config::SerialConfig;
use crate::error::{ErrorCode, Result, Status, reason};
use crate::events::{Evt, Payload, Signal};
use crate::hsm::{Hsm, Outcome, StateDescriptor, StateId};
pub use uart_in::{Reconciled, UartIn, UartInState, reconcile};
pub use uart_out::{UartOut, UartOutState};

pub const NAME: &str = "serial";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SerialState {
    Root = 0,
    Stopped = 1,
    Started = 2,
}

impl SerialState {
    pub const COUNT: usize = 3;
}

impl StateId for SerialState {
    fn index(self) -> usize {
        self as usize
    }
}

pub struct SerialCtx {
    pub rx: UartIn,
    pub tx: UartOut,
}

pub type SerialAct = Active<SerialState, SerialCtx, { SerialState::COUNT }>;

const SUBSCRIPTIONS: &[Signal] = &[
    Signal::SerialStartReq,
    Signal::SerialStopReq,
    Signal::UartInDataRdy,
    Signal::UartInDmaRecv,
    Signal::UartInHwFail,
    Signal::UartOutWriteReq,
    Signal::UartOutDmaDone,
    Signal::UartOutHwFail,
];

pub fn create(
    rx_port: Box<dyn UartRxPort>,
    tx_port: Box<dyn UartTxPort>,
    config: &SerialConfig,
) -> Result<SerialAct> {
    let mut core = ActiveCore::new(NAME);
    let rx_timer = core.add_timer(Signal::UartInActiveTimer)?;
    let tx_timer = core.add_timer(Signal::UartOutActiveTimer)?;
    let ctx = SerialCtx {
        rx: uart_in::region(rx_port, rx_timer, config.rx_activity_ms),
        tx: uart_out::region(tx_port, tx_timer, config.tx_timeout_ms),
    };
    let hsm = Hsm::new(NAME, build_state_table(), SerialState::Root);
    Ok(Active::new(core, hsm, ctx, SUBSCRIPTIONS))
}

type Desc = StateDescriptor<SerialState, SerialCtx>;

fn build_state_table() -> [Desc; SerialState::COUNT] {
    [
        Desc {
            id: SerialState::Root,
            name: "Root",
            parent: None,
            initial: Some(SerialState::Stopped),
            on_entry: Some(root_entry),
            on_exit: None,
            on_event: |_, _, _| Outcome::Handled,
        },
        Desc {
            id: SerialState::Stopped,
            name: "Stopped",
            parent: Some(SerialState::Root),
            initial: None,
            on_entry: None,
            on_exit: None,
            on_event: stopped_event,
        },
        Desc {
            id: SerialState::Started,
            name: "Started",
            parent: Some(SerialState::Root),
            initial: None,
            on_entry: None,
            on_exit: Some(started_exit),
            on_event: started_event,
        },
    ]
}

fn root_entry(ctx: &mut SerialCtx, core: &mut ActiveCore) {
    ctx.rx.init(core);
    ctx.tx.init(core);
}

fn stop_regions(ctx: &mut SerialCtx, core: &mut ActiveCore) {
    ctx.rx.dispatch(core, &Evt::new(Signal::UartInStopReq));
    ctx.tx.dispatch(core, &Evt::new(Signal::UartOutStopReq));
}

fn stopped_event(ctx: &mut SerialCtx, core: &mut ActiveCore, e: &Evt) -> Outcome<SerialState> {
    match (e.sig, e.payload) {
        (Signal::SerialStartReq, Payload::Serial { tx, rx }) => {
            ctx.rx.dispatch(
                core,
                &Evt::new(Signal::UartInStartReq).with_payload(Payload::Fifo(rx)),
            );
            ctx.tx.dispatch(
                core,
                &Evt::new(Signal::UartOutStartReq).with_payload(Payload::Fifo(tx)),
            );
            let rx_up = ctx.rx.is_in(UartInState::Started);
            let tx_up = ctx.tx.is_in(UartOutState::Started);
            if rx_up && tx_up {
                info!("serial: started");
                core.publish(Evt::reply(Signal::SerialStartCfm, e.seq, Status::SUCCESS));
                return Outcome::Transition(SerialState::Started);
            }
            let fault = ctx
                .rx
                .ctx
                .fault
                .or(ctx.tx.ctx.fault)
                .unwrap_or(Status::new(ErrorCode::HardwareFailure, reason::NONE));
            warn!("serial: start refused: {fault}");
            stop_regions(ctx, core);
            core.publish(Evt::reply(Signal::SerialStartCfm, e.seq, fault));
            Outcome::Handled
        }
        (Signal::SerialStartReq, _) => {
            warn!("serial: START without buffers");
            core.publish(Evt::reply(
                Signal::SerialStartCfm,
                e.seq,
                Status::new(ErrorCode::Unspecified, reason::NONE),
            ));
            Outcome::Handled
        }
        (Signal::SerialStopReq, _) => {
            core.publish(Evt::reply(Signal::SerialStopCfm, e.seq, Status::SUCCESS));
            Outcome::Handled
        }
        _ => Outcome::Super,
    }
}

fn started_exit(ctx: &mut SerialCtx, core: &mut ActiveCore) {
    stop_regions(ctx, core);
    info!("serial: stopped");
}

fn started_event(ctx: &mut SerialCtx, core: &mut ActiveCore, e: &Evt) -> Outcome<SerialState> {
    match e.sig {
        Signal::SerialStopReq => {
            core.publish(Evt::reply(Signal::SerialStopCfm, e.seq, Status::SUCCESS));
            Outcome::Transition(SerialState::Stopped)
        }
        Signal::SerialStartReq => {
            core.publish(Evt::reply(
                Signal::SerialStartCfm,
                e.seq,
                Status::new(ErrorCode::State, reason::REDUNDANT),
            ));
            Outcome::Handled
        }
        Signal::UartInDataRdy
        | Signal::UartInDmaRecv
        | Signal::UartInHwFail
        | Signal::UartInActiveTimer => {
            ctx.rx.dispatch(core, e);
            Outcome::Handled
        }
        Signal::UartOutWriteReq
        | Signal::UartOutDmaDone
        | Signal::UartOutHwFail
        | Signal::UartOutActiveTimer => {
            ctx.tx.dispatch(core, e);
            Outcome::Handled
        }
        _ => Outcome::Super,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::active::{Action, ActiveObject};
    use crate::app::ports::PortError;
    use crate::fifo::Fifo;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Wire {
        rx_running: bool,
        rx_int: bool,
        rx_fail: bool,
        rx_laps: u32,
        tx_running: bool,
        sent: std::vec::Vec<u8>,
    }

    type Shared = Rc<RefCell<Wire>>;

    struct Rx(Shared, u32);

    impl UartRxPort for Rx {
        fn start_dma(&mut self, _: &'static Fifo) -> core::result::Result<(), PortError> {
            let mut w = self.0.borrow_mut();
            if w.rx_fail {
                return Err(PortError::Hardware);
            }
            w.rx_running = true;
            Ok(())
        }
        fn stop_dma(&mut self) {
            self.0.borrow_mut().rx_running = false;
        }
        fn remaining(&self) -> u32 {
            self.1
        }
        fn laps(&self) -> u32 {
            self.0.borrow().rx_laps
        }
        fn enable_rx_int(&mut self) {
            self.0.borrow_mut().rx_int = true;
        }
        fn disable_rx_int(&mut self) {
            self.0.borrow_mut().rx_int = false;
        }
    }

    struct Tx(Shared);

    impl UartTxPort for Tx {
        fn start(&mut self) -> core::result::Result<(), PortError> {
            self.0.borrow_mut().tx_running = true;
            Ok(())
        }
        fn stop(&mut self) {
            self.0.borrow_mut().tx_running = false;
        }
        fn begin_dma(&mut self, data: &[u8]) -> core::result::Result<(), PortError> {
            self.0.borrow_mut().sent.extend_from_slice(data);
            Ok(())
        }
    }

    fn make(wire: &Shared, remaining: u32) -> SerialAct {
        let cfg = crate::config::AppConfig::default().serial;
        let mut act = create(
            Box::new(Rx(wire.clone(), remaining)),
            Box::new(Tx(wire.clone())),
            &cfg,
        )
        .unwrap();
        act.init();
        published(&mut act);
        act
    }

    fn published(act: &mut SerialAct) -> std::vec::Vec<Evt> {
        let mut out = std::vec::Vec::new();
        while let Some(a) = act.core_mut().take_action() {
            if let Action::Publish(e) = a {
                out.push(e);
            }
        }
        out
    }

    fn start_evt(tx: &'static Fifo, rx: &'static Fifo) -> Evt {
        Evt::new(Signal::SerialStartReq)
            .with_seq(7)
            .with_payload(Payload::Serial { tx, rx })
    }

    #[test]
    fn start_brings_up_both_directions() {
        let wire = Shared::default();
        let mut act = make(&wire, 16);
        let (tx, rx) = (Fifo::leak(16).unwrap(), Fifo::leak(16).unwrap());
        act.dispatch(&start_evt(tx, rx));
        let out = published(&mut act);
        assert_eq!(out[0].sig, Signal::SerialStartCfm);
        assert_eq!(out[0].seq, 7);
        assert!(out[0].status_or_success().is_success());
        assert_eq!(act.current(), SerialState::Started);
        assert!(wire.borrow().rx_running && wire.borrow().rx_int);
        assert!(wire.borrow().tx_running);
        assert!(act.ctx().rx.is_in(UartInState::Inactive));
    }

    #[test]
    fn rx_refusal_rolls_back_tx() {
        let wire = Shared::default();
        wire.borrow_mut().rx_fail = true;
        let mut act = make(&wire, 16);
        let (tx, rx) = (Fifo::leak(16).unwrap(), Fifo::leak(16).unwrap());
        act.dispatch(&start_evt(tx, rx));
        let out = published(&mut act);
        assert_eq!(
            out[0].status_or_success(),
            Status::new(ErrorCode::HardwareFailure, PortError::Hardware.reason())
        );
        assert_eq!(act.current(), SerialState::Stopped);
        assert!(!wire.borrow().tx_running);
    }

    #[test]
    fn dma_progress_is_reconciled_and_reported() {
        let wire = Shared::default();
        // Engine has stored 5 of 16.
        let mut act = make(&wire, 11);
        let (tx, rx) = (Fifo::leak(16).unwrap(), Fifo::leak(16).unwrap());
        act.dispatch(&start_evt(tx, rx));
        published(&mut act);

        act.dispatch(&Evt::new(Signal::UartInDmaRecv));
        let out = published(&mut act);
        assert_eq!(out[0].sig, Signal::UartInDataInd);
        assert_eq!(rx.used_count(), 5);
    }

    #[test]
    fn overflow_restarts_reception() {
        let wire = Shared::default();
        let mut act = make(&wire, 11);
        let (tx, rx) = (Fifo::leak(16).unwrap(), Fifo::leak(16).unwrap());
        act.dispatch(&start_evt(tx, rx));
        published(&mut act);
        act.dispatch(&Evt::new(Signal::UartInDmaRecv));
        published(&mut act);

        // A whole lap lands on top of the 5 unread bytes.
        wire.borrow_mut().rx_laps = 1;
        act.dispatch(&Evt::new(Signal::UartInDmaRecv));
        let out = published(&mut act);
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].status_or_success(),
            Status::new(ErrorCode::Overflow, 16)
        );
        assert_eq!(rx.used_count(), 0);
        assert_eq!(rx.write_index(), 0);
        assert!(wire.borrow().rx_running);
        assert!(act.ctx().rx.is_in(UartInState::Inactive));
    }

    #[test]
    fn failed_restart_after_overflow_parks_receive() {
        let wire = Shared::default();
        let mut act = make(&wire, 11);
        let (tx, rx) = (Fifo::leak(16).unwrap(), Fifo::leak(16).unwrap());
        act.dispatch(&start_evt(tx, rx));
        published(&mut act);
        act.dispatch(&Evt::new(Signal::UartInDmaRecv));
        published(&mut act);

        {
            let mut w = wire.borrow_mut();
            w.rx_laps = 1;
            w.rx_fail = true;
        }
        act.dispatch(&Evt::new(Signal::UartInDmaRecv));
        let out = published(&mut act);
        let errors: std::vec::Vec<ErrorCode> =
            out.iter().map(|e| e.status_or_success().error).collect();
        assert_eq!(errors, [ErrorCode::Overflow, ErrorCode::HardwareFailure]);
        assert!(act.ctx().rx.is_in(UartInState::Failed));
        assert!(!wire.borrow().rx_running);
    }

    #[test]
    fn write_sends_and_reports_empty() {
        let wire = Shared::default();
        let mut act = make(&wire, 16);
        let (tx, rx) = (Fifo::leak(16).unwrap(), Fifo::leak(16).unwrap());
        act.dispatch(&start_evt(tx, rx));
        published(&mut act);

        tx.write(b"hello");
        act.dispatch(&Evt::new(Signal::UartOutWriteReq));
        assert!(act.ctx().tx.is_in(UartOutState::Active));
        assert_eq!(wire.borrow().sent, b"hello");
        // Not released until the transfer completes.
        assert_eq!(tx.used_count(), 5);

        act.dispatch(&Evt::new(Signal::UartOutDmaDone));
        let out = published(&mut act);
        assert_eq!(out[0].sig, Signal::UartOutEmptyInd);
        assert!(tx.is_empty());
        assert!(act.ctx().tx.is_in(UartOutState::Inactive));
    }

    #[test]
    fn stop_confirms_and_releases_hardware() {
        let wire = Shared::default();
        let mut act = make(&wire, 16);
        let (tx, rx) = (Fifo::leak(16).unwrap(), Fifo::leak(16).unwrap());
        act.dispatch(&start_evt(tx, rx));
        published(&mut act);

        act.dispatch(&Evt::new(Signal::SerialStopReq).with_seq(8));
        let out = published(&mut act);
        assert_eq!(out[0].sig, Signal::SerialStopCfm);
        assert_eq!(out[0].seq, 8);
        assert!(!wire.borrow().rx_running && !wire.borrow().rx_int);
        assert!(!wire.borrow().tx_running);
        assert!(act.ctx().rx.is_in(UartInState::Stopped));
    }

    #[test]
    fn hardware_fault_parks_receive_in_failed() {
        let wire = Shared::default();
        let mut act = make(&wire, 16);
        let (tx, rx) = (Fifo::leak(16).unwrap(), Fifo::leak(16).unwrap());
        act.dispatch(&start_evt(tx, rx));
        published(&mut act);

        act.dispatch(&Evt::new(Signal::UartInHwFail));
        let out = published(&mut act);
        assert_eq!(out[0].sig, Signal::UartInFailInd);
        assert!(act.ctx().rx.is_in(UartInState::Failed));
        assert!(!wire.borrow().rx_running);
        // The active object itself stays up so STOP still confirms.
        assert_eq!(act.current(), SerialState::Started);
    }
}
