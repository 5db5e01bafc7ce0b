//! Host simulation of the board's peripherals.
//!
//! Each adapter is a cheap `Clone` handle over shared state: one clone is
//! boxed into the driver that owns the port, the other stays with the
//! simulator (or test) that plays the outside world.
//!
//! | Adapter      | Implements          | Completion raised on the [`IsrLine`] |
//! |--------------|---------------------|--------------------------------------|
//! | `SimUartRx`  | `UartRxPort`        | `UartInDmaRecv`, `UartInDataRdy`, `UartInHwFail` |
//! | `SimUartTx`  | `UartTxPort`        | `UartOutDmaDone`, `UartOutHwFail`    |
//! | `SimPin`     | `OutputPin`, `InputPin` | `ButtonTrig` via [`SimPin::press`] |
//! | `SimLamp`    | `LampPort`          | none                                 |

use core::cell::{Cell, RefCell};
use core::convert::Infallible;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::io::Write;
use std::sync::Arc;

use critical_section::Mutex;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use log::{debug, info};

use crate::app::ports::{Colour, LampPort, PortError, UartRxPort, UartTxPort};
use crate::events::{Axis, Evt, Signal};
use crate::fifo::Fifo;
use crate::isr::IsrLine;

// ───────────────────────────────────────────────────────────────
// Receive: circular DMA
// ───────────────────────────────────────────────────────────────

struct RxWire {
    fifo: Mutex<Cell<Option<&'static Fifo>>>,
    running: AtomicBool,
    int_enabled: AtomicBool,
    remaining: AtomicU32,
    laps: AtomicU32,
}

/// Circular receive DMA.  [`inject`](Self::inject) plays bytes arriving on
/// the line.
#[derive(Clone)]
pub struct SimUartRx {
    wire: Arc<RxWire>,
    isr: &'static IsrLine,
}

impl SimUartRx {
    pub fn new(isr: &'static IsrLine) -> Self {
        Self {
            wire: Arc::new(RxWire {
                fifo: Mutex::new(Cell::new(None)),
                running: AtomicBool::new(false),
                int_enabled: AtomicBool::new(false),
                remaining: AtomicU32::new(0),
                laps: AtomicU32::new(0),
            }),
            isr,
        }
    }

    fn fifo(&self) -> Option<&'static Fifo> {
        critical_section::with(|cs| self.wire.fifo.borrow(cs).get())
    }

    /// Store `bytes` the way the DMA engine would, raising the half and
    /// full transfer interrupts as the counter passes them.  Returns the
    /// bytes accepted (none while stopped).
    pub fn inject(&self, bytes: &[u8]) -> usize {
        let Some(fifo) = self.fifo() else { return 0 };
        if !self.wire.running.load(Ordering::Acquire) || bytes.is_empty() {
            return 0;
        }
        let cap = fifo.capacity();
        for &b in bytes {
            let laps = self.wire.laps.load(Ordering::Acquire);
            let remaining = self.wire.remaining.load(Ordering::Acquire);
            let pos = laps.wrapping_mul(cap).wrapping_add(cap - remaining);
            fifo.store_at(pos, b);

            let remaining = remaining - 1;
            if remaining == 0 {
                self.wire.laps.fetch_add(1, Ordering::AcqRel);
                self.wire.remaining.store(cap, Ordering::Release);
                self.isr.raise(Evt::new(Signal::UartInDmaRecv));
            } else {
                self.wire.remaining.store(remaining, Ordering::Release);
                if remaining == cap / 2 {
                    self.isr.raise(Evt::new(Signal::UartInDmaRecv));
                }
            }
        }
        if self.wire.int_enabled.load(Ordering::Acquire) {
            self.isr.raise(Evt::new(Signal::UartInDataRdy));
        }
        bytes.len()
    }

    /// Raise a line error.
    pub fn fault(&self) {
        self.isr.raise(Evt::new(Signal::UartInHwFail));
    }

    pub fn is_running(&self) -> bool {
        self.wire.running.load(Ordering::Acquire)
    }
}

impl UartRxPort for SimUartRx {
    fn start_dma(&mut self, fifo: &'static Fifo) -> Result<(), PortError> {
        if self.wire.running.swap(true, Ordering::AcqRel) {
            return Err(PortError::Busy);
        }
        critical_section::with(|cs| self.wire.fifo.borrow(cs).set(Some(fifo)));
        self.wire.laps.store(0, Ordering::Release);
        self.wire.remaining.store(fifo.capacity(), Ordering::Release);
        debug!("sim: rx DMA started ({} B)", fifo.capacity());
        Ok(())
    }

    fn stop_dma(&mut self) {
        self.wire.running.store(false, Ordering::Release);
    }

    fn remaining(&self) -> u32 {
        self.wire.remaining.load(Ordering::Acquire)
    }

    fn laps(&self) -> u32 {
        self.wire.laps.load(Ordering::Acquire)
    }

    fn enable_rx_int(&mut self) {
        self.wire.int_enabled.store(true, Ordering::Release);
    }

    fn disable_rx_int(&mut self) {
        self.wire.int_enabled.store(false, Ordering::Release);
    }
}

// ───────────────────────────────────────────────────────────────
// Transmit
// ───────────────────────────────────────────────────────────────

struct TxWire {
    running: AtomicBool,
    /// Raise DMA-done as soon as a transfer begins.
    auto_complete: AtomicBool,
    echo: AtomicBool,
    sent: Mutex<RefCell<Vec<u8>>>,
}

/// Transmit DMA.  Completes every transfer at once unless
/// [`hold`](Self::hold) is set, in which case [`complete`](Self::complete)
/// finishes it.
#[derive(Clone)]
pub struct SimUartTx {
    wire: Arc<TxWire>,
    isr: &'static IsrLine,
}

impl SimUartTx {
    pub fn new(isr: &'static IsrLine) -> Self {
        Self {
            wire: Arc::new(TxWire {
                running: AtomicBool::new(false),
                auto_complete: AtomicBool::new(true),
                echo: AtomicBool::new(false),
                sent: Mutex::new(RefCell::new(Vec::new())),
            }),
            isr,
        }
    }

    /// Copy everything sent to stdout.
    #[must_use]
    pub fn echo_stdout(self) -> Self {
        self.wire.echo.store(true, Ordering::Release);
        self
    }

    pub fn hold(&self, hold: bool) {
        self.wire.auto_complete.store(!hold, Ordering::Release);
    }

    pub fn complete(&self) {
        self.isr.raise(Evt::new(Signal::UartOutDmaDone));
    }

    /// Bytes sent so far, draining the record.
    pub fn take_output(&self) -> Vec<u8> {
        critical_section::with(|cs| self.wire.sent.borrow_ref_mut(cs).split_off(0))
    }

    pub fn is_running(&self) -> bool {
        self.wire.running.load(Ordering::Acquire)
    }
}

impl UartTxPort for SimUartTx {
    fn start(&mut self) -> Result<(), PortError> {
        self.wire.running.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&mut self) {
        self.wire.running.store(false, Ordering::Release);
    }

    fn begin_dma(&mut self, data: &[u8]) -> Result<(), PortError> {
        if !self.wire.running.load(Ordering::Acquire) {
            return Err(PortError::Hardware);
        }
        critical_section::with(|cs| self.wire.sent.borrow_ref_mut(cs).extend_from_slice(data));
        if self.wire.echo.load(Ordering::Acquire) {
            let mut out = std::io::stdout().lock();
            // Console output is best effort.
            let _ = out.write_all(data).and_then(|()| out.flush());
        }
        if self.wire.auto_complete.load(Ordering::Acquire) {
            self.complete();
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// GPIO
// ───────────────────────────────────────────────────────────────

/// A pin whose level is shared between its clones.  `true` is high.
#[derive(Clone, Default)]
pub struct SimPin {
    level: Arc<AtomicBool>,
}

impl SimPin {
    pub fn new(high: bool) -> Self {
        Self {
            level: Arc::new(AtomicBool::new(high)),
        }
    }

    pub fn is_set_high(&self) -> bool {
        self.level.load(Ordering::Acquire)
    }

    /// Drive the level from outside and raise the edge interrupt.  The
    /// button is active-low: `pressed` pulls the line low.
    pub fn press(&self, isr: &IsrLine, pressed: bool) {
        self.level.store(!pressed, Ordering::Release);
        isr.raise(Evt::new(Signal::ButtonTrig));
    }
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.level.store(false, Ordering::Release);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.level.store(true, Ordering::Release);
        Ok(())
    }
}

impl InputPin for SimPin {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.level.load(Ordering::Acquire))
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.level.load(Ordering::Acquire))
    }
}

// ───────────────────────────────────────────────────────────────
// Lamps
// ───────────────────────────────────────────────────────────────

/// Records every colour shown and logs it.
#[derive(Clone)]
pub struct SimLamp {
    axis: Axis,
    shown: Arc<Mutex<RefCell<Vec<Colour>>>>,
}

impl SimLamp {
    pub fn new(axis: Axis) -> Self {
        Self {
            axis,
            shown: Arc::new(Mutex::new(RefCell::new(Vec::new()))),
        }
    }

    pub fn last(&self) -> Option<Colour> {
        critical_section::with(|cs| self.shown.borrow_ref(cs).last().copied())
    }

    pub fn history(&self) -> Vec<Colour> {
        critical_section::with(|cs| self.shown.borrow_ref(cs).clone())
    }
}

impl LampPort for SimLamp {
    fn show(&mut self, colour: Colour) {
        info!("lamp {}: {}", self.axis, colour);
        critical_section::with(|cs| self.shown.borrow_ref_mut(cs).push(colour));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isr;

    #[test]
    fn rx_raises_half_and_full_transfer() {
        let (line, mut drain) = isr::channel();
        let mut rx = SimUartRx::new(line);
        let fifo = Fifo::leak(8).unwrap();
        rx.start_dma(fifo).unwrap();
        assert_eq!(rx.inject(b"abcdefgh"), 8);
        let sigs: Vec<_> = core::iter::from_fn(|| drain.pop()).map(|e| e.sig).collect();
        assert_eq!(sigs, [Signal::UartInDmaRecv, Signal::UartInDmaRecv]);
        assert_eq!(rx.laps(), 1);
        assert_eq!(rx.position(8), 8);
    }

    #[test]
    fn rx_data_ready_only_when_enabled() {
        let (line, mut drain) = isr::channel();
        let mut rx = SimUartRx::new(line);
        rx.start_dma(Fifo::leak(64).unwrap()).unwrap();
        rx.inject(b"x");
        assert!(drain.pop().is_none());
        rx.enable_rx_int();
        rx.inject(b"y");
        assert_eq!(drain.pop().map(|e| e.sig), Some(Signal::UartInDataRdy));
        assert_eq!(rx.position(64), 2);
    }

    #[test]
    fn rx_ignores_bytes_while_stopped() {
        let (line, _drain) = isr::channel();
        let rx = SimUartRx::new(line);
        assert_eq!(rx.inject(b"lost"), 0);
    }

    #[test]
    fn tx_records_and_completes() {
        let (line, mut drain) = isr::channel();
        let mut tx = SimUartTx::new(line);
        assert_eq!(tx.begin_dma(b"no"), Err(PortError::Hardware));
        tx.start().unwrap();
        tx.begin_dma(b"ok").unwrap();
        assert_eq!(tx.take_output(), b"ok");
        assert_eq!(drain.pop().map(|e| e.sig), Some(Signal::UartOutDmaDone));

        tx.hold(true);
        tx.begin_dma(b"!").unwrap();
        assert!(drain.pop().is_none());
    }

    #[test]
    fn pin_clones_share_level() {
        let (line, mut drain) = isr::channel();
        let outside = SimPin::new(true);
        let mut inside = outside.clone();
        assert!(!inside.is_low().unwrap());
        outside.press(line, true);
        assert!(inside.is_low().unwrap());
        assert_eq!(drain.pop().map(|e| e.sig), Some(Signal::ButtonTrig));
    }
}
