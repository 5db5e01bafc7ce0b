//! Port traits: the boundary between the state machines and the hardware.
//!
//! ```text
//!   Adapter (sim / MCU HAL) ──▶ Port trait ──▶ driver active object
//! ```
//!
//! Drivers own their ports as boxed trait objects (serial, lamps) or as
//! `embedded-hal` pins (LED, button).  Completion of asynchronous hardware
//! work (DMA progress, transfer done, errors) never comes back through a
//! port method; the adapter raises an event on the
//! [`IsrLine`](crate::isr::IsrLine) instead.

use core::fmt;

use crate::fifo::Fifo;

// ───────────────────────────────────────────────────────────────
// Port errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortError {
    /// Peripheral is already running or has a transfer in flight.
    Busy,
    /// Peripheral reported a fault.
    Hardware,
}

impl PortError {
    /// Reason code carried in a HARDWARE-FAILURE status.
    pub const fn reason(self) -> u16 {
        match self {
            Self::Busy => 1,
            Self::Hardware => 2,
        }
    }
}

impl fmt::Display for PortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "peripheral busy"),
            Self::Hardware => write!(f, "peripheral fault"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Serial receive (circular DMA into a ring buffer)
// ───────────────────────────────────────────────────────────────

/// Receive side of a UART whose DMA engine writes continuously into a
/// [`Fifo`]'s storage.
///
/// The adapter raises `UartInDmaRecv` on half/full transfer complete,
/// `UartInDataRdy` on receive activity while the activity interrupt is
/// enabled, and `UartInHwFail` on line errors.
pub trait UartRxPort {
    /// Start circular reception into `fifo`'s storage, from slot 0.
    fn start_dma(&mut self, fifo: &'static Fifo) -> Result<(), PortError>;

    fn stop_dma(&mut self);

    /// DMA transfer counter: bytes left before the engine wraps to slot 0.
    /// In `1..=capacity`.
    fn remaining(&self) -> u32;

    /// Completed passes over the buffer since [`start_dma`](Self::start_dma).
    /// Maintained by the transfer-complete interrupt.
    fn laps(&self) -> u32;

    /// Free-running count of bytes the engine has stored since start.
    ///
    /// The lap counter is sampled on both sides of the transfer counter so
    /// a wrap between the two reads is not mistaken for a step backwards.
    /// Still best-effort: a wrap whose interrupt has not run yet reads as
    /// one lap short, which reconciliation treats as nothing new.
    fn position(&self, capacity: u32) -> u32 {
        loop {
            let laps = self.laps();
            let remaining = self.remaining().clamp(1, capacity);
            if self.laps() == laps {
                return laps
                    .wrapping_mul(capacity)
                    .wrapping_add(capacity - remaining);
            }
        }
    }

    fn enable_rx_int(&mut self);

    fn disable_rx_int(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Serial transmit
// ───────────────────────────────────────────────────────────────

/// Transmit side.  One DMA transfer at a time; completion is signalled
/// by `UartOutDmaDone` on the interrupt line.
pub trait UartTxPort {
    fn start(&mut self) -> Result<(), PortError>;

    fn stop(&mut self);

    /// Begin sending `data`.  The adapter copies what it needs before
    /// returning.
    fn begin_dma(&mut self, data: &[u8]) -> Result<(), PortError>;
}

// ───────────────────────────────────────────────────────────────
// Traffic lamp
// ───────────────────────────────────────────────────────────────

/// Lamp colour.  `Off` darkens all three lenses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Colour {
    Off,
    Red,
    Yellow,
    Green,
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Red => write!(f, "red"),
            Self::Yellow => write!(f, "yellow"),
            Self::Green => write!(f, "green"),
        }
    }
}

/// Output side of one traffic lamp head.  Write-only: the controller never
/// reads a lamp back.
pub trait LampPort {
    fn show(&mut self, colour: Colour);
}
