//! Event catalog.
//!
//! Every message exchanged between active objects is an [`Evt`]: a
//! [`Signal`], a 16-bit sequence number, an optional [`Status`] (confirms
//! and indications) and a small [`Payload`].
//!
//! ```text
//!   requester ──REQ(seq)──▶ driver
//!   requester ◀──CFM(seq, status)── driver
//!   anyone    ◀──IND(seq[, status])── driver     (broadcast)
//!   owner     ◀──TIMER(generation)── its own time event
//!   driver    ◀──HW── interrupt line
//! ```
//!
//! Events are `Copy`.  Queues own their copies; a published event is copied
//! into every subscriber's mailbox.

use core::fmt;

use crate::error::Status;
use crate::fifo::Fifo;

/// Broad category of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Request,
    Confirm,
    Indication,
    Timer,
    Hardware,
}

macro_rules! signals {
    ($( $(#[$meta:meta])* $name:ident => $kind:ident, )*) => {
        /// Every signal in the system.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Signal {
            $( $(#[$meta])* $name, )*
        }

        impl Signal {
            pub const ALL: &'static [Signal] = &[$(Signal::$name,)*];

            pub const fn name(self) -> &'static str {
                match self {
                    $( Signal::$name => stringify!($name), )*
                }
            }

            pub const fn kind(self) -> SignalKind {
                match self {
                    $( Signal::$name => SignalKind::$kind, )*
                }
            }
        }
    };
}

signals! {
    // ── System orchestrator ───────────────────────────────
    SystemStartReq => Request,
    SystemStartCfm => Confirm,
    SystemStopReq => Request,
    SystemStopCfm => Confirm,
    SystemStateTimer => Timer,

    // ── Serial (receive + transmit pair) ──────────────────
    SerialStartReq => Request,
    SerialStartCfm => Confirm,
    SerialStopReq => Request,
    SerialStopCfm => Confirm,

    // ── Serial receive ────────────────────────────────────
    UartInStartReq => Request,
    UartInStopReq => Request,
    /// New bytes committed to the receive ring buffer.
    UartInDataInd => Indication,
    /// Overflow or hardware failure on the receive path.
    UartInFailInd => Indication,
    UartInActiveTimer => Timer,
    /// Receive activity pulse.
    UartInDataRdy => Hardware,
    /// DMA half/full transfer complete.
    UartInDmaRecv => Hardware,
    UartInHwFail => Hardware,

    // ── Serial transmit ───────────────────────────────────
    UartOutStartReq => Request,
    UartOutStopReq => Request,
    /// Bytes were written to the transmit ring buffer.
    UartOutWriteReq => Request,
    /// Transmit ring buffer drained.
    UartOutEmptyInd => Indication,
    UartOutFailInd => Indication,
    UartOutActiveTimer => Timer,
    UartOutDmaDone => Hardware,
    UartOutHwFail => Hardware,

    // ── Button ────────────────────────────────────────────
    ButtonStartReq => Request,
    ButtonStartCfm => Confirm,
    ButtonStopReq => Request,
    ButtonStopCfm => Confirm,
    ButtonUpInd => Indication,
    ButtonDownInd => Indication,
    ButtonHoldInd => Indication,
    ButtonHoldTimer => Timer,
    /// Edge interrupt on the button pin.
    ButtonTrig => Hardware,

    // ── User LED ──────────────────────────────────────────
    LedStartReq => Request,
    LedStartCfm => Confirm,
    LedStopReq => Request,
    LedStopCfm => Confirm,
    LedOnReq => Request,
    LedOnCfm => Confirm,
    LedOffReq => Request,
    LedOffCfm => Confirm,

    // ── Traffic light controller ──────────────────────────
    TrafficStartReq => Request,
    TrafficStartCfm => Confirm,
    TrafficStopReq => Request,
    TrafficStopCfm => Confirm,
    /// Vehicle arrival; payload carries the axis.
    TrafficCarReq => Request,
    TrafficErrorReq => Request,
    TrafficWaitTimer => Timer,
    TrafficIdleTimer => Timer,
    TrafficBlinkTimer => Timer,

    // ── Lamp region commands ──────────────────────────────
    LampRedReq => Request,
    LampYellowReq => Request,
    LampGreenReq => Request,
    LampOffReq => Request,
}

impl Signal {
    pub const fn is_timer(self) -> bool {
        matches!(self.kind(), SignalKind::Timer)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ───────────────────────────────────────────────────────────────
// Payload
// ───────────────────────────────────────────────────────────────

/// Traffic axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Axis {
    NorthSouth = 0,
    EastWest = 1,
}

impl Axis {
    pub const BOTH: [Axis; 2] = [Axis::NorthSouth, Axis::EastWest];

    pub const fn opposite(self) -> Self {
        match self {
            Self::NorthSouth => Self::EastWest,
            Self::EastWest => Self::NorthSouth,
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NorthSouth => f.write_str("NS"),
            Self::EastWest => f.write_str("EW"),
        }
    }
}

/// Event payload.  Buffers are shared by `'static` reference; the owning
/// driver and the consumer coordinate through the buffer's own indices.
#[derive(Debug, Clone, Copy, Default)]
pub enum Payload {
    #[default]
    None,
    /// Transmit and receive buffers handed to the serial driver on START.
    Serial { tx: &'static Fifo, rx: &'static Fifo },
    /// Single buffer handed to one serial direction on START.
    Fifo(&'static Fifo),
    Axis(Axis),
}

// ───────────────────────────────────────────────────────────────
// Event
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct Evt {
    pub sig: Signal,
    /// Wraps.  For timer events this holds the arming generation.
    pub seq: u16,
    pub status: Option<Status>,
    pub payload: Payload,
}

impl Evt {
    pub const fn new(sig: Signal) -> Self {
        Self {
            sig,
            seq: 0,
            status: None,
            payload: Payload::None,
        }
    }

    /// A confirm or indication carrying `status`.
    pub const fn reply(sig: Signal, seq: u16, status: Status) -> Self {
        Self {
            sig,
            seq,
            status: Some(status),
            payload: Payload::None,
        }
    }

    #[must_use]
    pub const fn with_seq(mut self, seq: u16) -> Self {
        self.seq = seq;
        self
    }

    #[must_use]
    pub const fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub const fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Status, treating "no status" as success.
    pub fn status_or_success(&self) -> Status {
        self.status.unwrap_or(Status::SUCCESS)
    }

    pub fn axis(&self) -> Option<Axis> {
        match self.payload {
            Payload::Axis(a) => Some(a),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn names_match_variants() {
        assert_eq!(Signal::SystemStartReq.name(), "SystemStartReq");
        assert_eq!(Signal::LampOffReq.to_string(), "LampOffReq");
    }

    #[test]
    fn timer_signals_are_flagged() {
        let timers: Vec<_> = Signal::ALL.iter().filter(|s| s.is_timer()).collect();
        assert_eq!(timers.len(), 7);
        assert!(Signal::TrafficBlinkTimer.is_timer());
        assert!(!Signal::UartInDataInd.is_timer());
    }

    #[test]
    fn discriminants_follow_declaration_order() {
        for (i, sig) in Signal::ALL.iter().enumerate() {
            assert_eq!(*sig as usize, i);
        }
    }

    #[test]
    fn builder_and_status_default() {
        let e = Evt::new(Signal::LedOnReq).with_seq(7);
        assert_eq!(e.seq, 7);
        assert!(e.status_or_success().is_success());

        let e = Evt::reply(Signal::LedOnCfm, 7, Status::new(ErrorCode::State, 0));
        assert_eq!(e.status_or_success().error, ErrorCode::State);
    }

    #[test]
    fn axis_payload() {
        let e = Evt::new(Signal::TrafficCarReq).with_payload(Payload::Axis(Axis::EastWest));
        assert_eq!(e.axis(), Some(Axis::EastWest));
        assert_eq!(Axis::EastWest.opposite(), Axis::NorthSouth);
        assert_eq!(Evt::new(Signal::TrafficCarReq).axis(), None);
    }
}
