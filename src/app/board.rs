//! Board assembly: every active object wired to its ports and registered
//! with one dispatcher.
//!
//! ```text
//!   priority  object    ports
//!   5         serial    UartRxPort + UartTxPort
//!   4         button    InputPin
//!   3         led       OutputPin
//!   2         system    -
//!   1         traffic   LampPort x2, serial buffers
//! ```
//!
//! Drivers sit above the orchestrator so a request is always served before
//! the next confirm is counted.

use embedded_hal::digital::{InputPin, OutputPin};
use log::info;

use super::ports::{LampPort, UartRxPort, UartTxPort};
use crate::active::{ActiveObject, Dispatcher};
use crate::config::AppConfig;
use crate::error::Result;
use crate::events::{Evt, Signal};
use crate::fifo::Fifo;
use crate::isr::IsrDrain;
use crate::system::SerialBuffers;
use crate::{drivers, system, traffic};

pub const SERIAL_PRIO: u8 = 5;
pub const BUTTON_PRIO: u8 = 4;
pub const LED_PRIO: u8 = 3;
pub const SYSTEM_PRIO: u8 = 2;
pub const TRAFFIC_PRIO: u8 = 1;

/// Everything the board needs from the outside world.
pub struct Hardware<L, B> {
    pub uart_rx: Box<dyn UartRxPort>,
    pub uart_tx: Box<dyn UartTxPort>,
    pub led: L,
    pub button: B,
    pub lamp_ns: Box<dyn LampPort>,
    pub lamp_ew: Box<dyn LampPort>,
}

pub struct Board {
    pub dispatcher: Dispatcher,
    pub buffers: SerialBuffers,
    seq: u16,
}

impl Board {
    /// Validate `config`, build every object and run their initial
    /// transitions.  Nothing is started yet.
    pub fn assemble<L, B>(config: &AppConfig, hw: Hardware<L, B>, isr: IsrDrain) -> Result<Self>
    where
        L: OutputPin + 'static,
        B: InputPin + 'static,
    {
        Self::assemble_with(config, hw, isr, Vec::new())
    }

    /// As [`assemble`](Self::assemble), also registering `observers`
    /// (monitors, recorders) at the given priorities.
    pub fn assemble_with<L, B>(
        config: &AppConfig,
        hw: Hardware<L, B>,
        isr: IsrDrain,
        observers: Vec<(u8, Box<dyn ActiveObject>)>,
    ) -> Result<Self>
    where
        L: OutputPin + 'static,
        B: InputPin + 'static,
    {
        config.validate()?;
        let buffers = SerialBuffers {
            tx: Fifo::leak(1 << config.serial.tx_fifo_order)?,
            rx: Fifo::leak(1 << config.serial.rx_fifo_order)?,
        };

        let mut dispatcher = Dispatcher::new(config.tick_ms).with_isr(isr);
        dispatcher.register(
            SERIAL_PRIO,
            Box::new(drivers::serial::create(hw.uart_rx, hw.uart_tx, &config.serial)?),
        )?;
        dispatcher.register(
            BUTTON_PRIO,
            Box::new(drivers::button::create(hw.button, &config.button)?),
        )?;
        dispatcher.register(LED_PRIO, Box::new(drivers::led::create(hw.led)?))?;
        dispatcher.register(SYSTEM_PRIO, Box::new(system::create(config, buffers)?))?;
        dispatcher.register(
            TRAFFIC_PRIO,
            Box::new(traffic::create(
                &config.traffic,
                hw.lamp_ns,
                hw.lamp_ew,
                buffers,
            )?),
        )?;
        for (priority, ao) in observers {
            dispatcher.register(priority, ao)?;
        }
        dispatcher.start();
        info!(
            "board: assembled (rx {} B, tx {} B, tick {} ms)",
            buffers.rx.capacity(),
            buffers.tx.capacity(),
            config.tick_ms
        );
        Ok(Self {
            dispatcher,
            buffers,
            seq: 0,
        })
    }

    /// Publish a request with a fresh sequence number, which is returned.
    pub fn request(&mut self, sig: Signal) -> u16 {
        self.seq = self.seq.wrapping_add(1);
        self.dispatcher.publish(Evt::new(sig).with_seq(self.seq));
        self.seq
    }
}
