//! Debug character injection and console output over the serial port.
//!
//! Bytes typed into the serial receive path stand in for road sensors:
//!
//! | Byte       | Meaning                 |
//! |------------|-------------------------|
//! | `n`, `s`   | north-south car arrives |
//! | `e`, `w`   | east-west car arrives   |
//! | `r`        | simulated lamp fault    |
//!
//! Whitespace and control bytes are skipped; anything else prints the usage
//! text.  This is a test affordance kept out of the core event vocabulary:
//! only the traffic controller decodes it.

use log::{debug, warn};

use crate::active::ActiveCore;
use crate::events::{Axis, Evt, Signal};
use crate::fifo::Fifo;

/// Bytes decoded per receive indication.  Keeps the self-posts of one
/// handler well inside the outbox.
pub const INJECT_BATCH: usize = 8;

pub const USAGE: &str = "\r\n\
traffic: n/s = north-south car, e/w = east-west car, r = fault\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injection {
    Arrival(Axis),
    Fault,
    Unknown(u8),
}

pub fn decode(byte: u8) -> Option<Injection> {
    match byte {
        b'n' | b's' => Some(Injection::Arrival(Axis::NorthSouth)),
        b'e' | b'w' => Some(Injection::Arrival(Axis::EastWest)),
        b'r' => Some(Injection::Fault),
        b if b.is_ascii_whitespace() || b.is_ascii_control() => None,
        b => Some(Injection::Unknown(b)),
    }
}

/// Reads injected bytes out of the receive buffer.
#[derive(Debug, Clone, Copy)]
pub struct CharInjector {
    rx: &'static Fifo,
}

impl CharInjector {
    pub fn new(rx: &'static Fifo) -> Self {
        Self { rx }
    }

    /// Decode up to [`INJECT_BATCH`] bytes.  Returns how many bytes are
    /// still waiting afterwards.
    pub fn drain(&self, mut each: impl FnMut(Injection)) -> u32 {
        let mut buf = [0u8; INJECT_BATCH];
        let n = self.rx.read(&mut buf);
        for &b in &buf[..n] {
            if let Some(inj) = decode(b) {
                debug!("inject: {:?}", inj);
                each(inj);
            }
        }
        self.rx.used_count()
    }
}

/// Text output through the serial transmit buffer.
#[derive(Debug, Clone, Copy)]
pub struct Console {
    tx: &'static Fifo,
}

impl Console {
    pub fn new(tx: &'static Fifo) -> Self {
        Self { tx }
    }

    /// Queue `text` and ask the transmit driver to send it.
    pub fn print(&self, core: &mut ActiveCore, text: &str) {
        let n = self.tx.write(text.as_bytes());
        if n < text.len() {
            warn!("console: dropped {} bytes", text.len() - n);
        }
        if n > 0 {
            let seq = core.next_seq();
            core.publish(Evt::new(Signal::UartOutWriteReq).with_seq(seq));
        }
    }
}
