//! Application configuration.
//!
//! All tunable parameters: orchestrator budgets and startup plan, driver
//! request timeouts, serial buffer sizes, button and traffic timing.
//! Loaded from JSON on the host simulator; [`AppConfig::validate`] rejects
//! combinations the state machines cannot honour.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::system::DriverId;

/// Drivers started together in one phase.
pub const MAX_PHASE_DRIVERS: usize = 3;
/// Startup phases.  Shutdown runs them in reverse.
pub const PHASES: usize = 2;

pub type Phase = heapless::Vec<DriverId, MAX_PHASE_DRIVERS>;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub orchestrator: OrchestratorConfig,
    pub drivers: DriverTimeouts,
    pub serial: SerialConfig,
    pub button: ButtonConfig,
    pub traffic: TrafficTiming,
    /// Dispatcher time step (milliseconds)
    pub tick_ms: u32,
}

/// System start/stop sequencing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Total START budget; each phase gets half (milliseconds)
    pub start_timeout_ms: u32,
    /// Total STOP budget; each phase gets half (milliseconds)
    pub stop_timeout_ms: u32,
    /// Drivers per phase, in dependency order
    pub phases: [Phase; PHASES],
}

/// Time a driver is given to confirm a START or STOP (milliseconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverTimeouts {
    pub serial_ms: u32,
    pub led_ms: u32,
    pub button_ms: u32,
}

impl DriverTimeouts {
    pub fn of(&self, driver: DriverId) -> u32 {
        match driver {
            DriverId::Serial => self.serial_ms,
            DriverId::Led => self.led_ms,
            DriverId::Button => self.button_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Receive ring buffer is `1 << rx_fifo_order` bytes
    pub rx_fifo_order: u8,
    /// Transmit ring buffer is `1 << tx_fifo_order` bytes
    pub tx_fifo_order: u8,
    /// Receive goes back to Inactive after this long without activity
    pub rx_activity_ms: u32,
    /// Longest a single transmit DMA transfer may take
    pub tx_timeout_ms: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonConfig {
    /// Press duration that produces a HOLD indication
    pub hold_ms: u32,
}

/// Traffic light phase timing (milliseconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficTiming {
    pub min_green_ns_ms: u32,
    pub min_green_ew_ms: u32,
    pub clearance_ns_ms: u32,
    pub clearance_ew_ms: u32,
    /// East-west green ends after this long without east-west traffic
    pub ew_idle_ms: u32,
    /// Half-period of the flashing fail-safe
    pub blink_ms: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig {
                start_timeout_ms: 600,
                stop_timeout_ms: 600,
                phases: [
                    Phase::from_slice(&[DriverId::Serial]).unwrap_or_default(),
                    Phase::from_slice(&[DriverId::Led, DriverId::Button]).unwrap_or_default(),
                ],
            },
            drivers: DriverTimeouts {
                serial_ms: 200,
                led_ms: 100,
                button_ms: 100,
            },
            serial: SerialConfig {
                rx_fifo_order: 8, // 256 B
                tx_fifo_order: 9, // 512 B
                rx_activity_ms: 20,
                tx_timeout_ms: 200,
            },
            button: ButtonConfig { hold_ms: 1000 },
            traffic: TrafficTiming {
                min_green_ns_ms: 8000,
                min_green_ew_ms: 5000,
                clearance_ns_ms: 3000,
                clearance_ew_ms: 3000,
                ew_idle_ms: 6000,
                blink_ms: 500,
            },
            tick_ms: 10,
        }
    }
}

impl AppConfig {
    /// Reject configurations the state machines cannot honour.
    pub fn validate(&self) -> Result<()> {
        self.orchestrator.validate(&self.drivers)?;

        for order in [self.serial.rx_fifo_order, self.serial.tx_fifo_order] {
            let cap = 1usize.checked_shl(u32::from(order)).unwrap_or(0);
            if !(crate::fifo::MIN_CAPACITY..=crate::fifo::MAX_CAPACITY).contains(&cap) {
                return Err(Error::Config("fifo order out of range"));
            }
        }
        if self.serial.rx_activity_ms == 0 || self.serial.tx_timeout_ms == 0 {
            return Err(Error::Config("serial timing must be non-zero"));
        }
        if self.button.hold_ms == 0 {
            return Err(Error::Config("button hold time must be non-zero"));
        }
        self.traffic.validate()?;
        if self.tick_ms == 0 {
            return Err(Error::Config("tick must be non-zero"));
        }
        Ok(())
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Compact binary form for flash storage.
    pub fn to_blob(&self) -> anyhow::Result<Vec<u8>> {
        postcard::to_allocvec(self).map_err(|e| anyhow::anyhow!("config blob: {e}"))
    }

    pub fn from_blob(bytes: &[u8]) -> anyhow::Result<Self> {
        let cfg: Self =
            postcard::from_bytes(bytes).map_err(|e| anyhow::anyhow!("config blob: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

impl OrchestratorConfig {
    /// Each phase gets half the total budget, and that half must outlast
    /// every request issued in the phase.
    pub fn validate(&self, timeouts: &DriverTimeouts) -> Result<()> {
        let mut seen: heapless::Vec<DriverId, { MAX_PHASE_DRIVERS * PHASES }> =
            heapless::Vec::new();
        for phase in &self.phases {
            if phase.is_empty() {
                return Err(Error::Config("startup phase has no drivers"));
            }
            for &driver in phase {
                if seen.contains(&driver) {
                    return Err(Error::Config("driver listed in more than one phase"));
                }
                let _ = seen.push(driver);
                let t = timeouts.of(driver);
                if self.start_timeout_ms / 2 <= t {
                    return Err(Error::Config("start phase budget below a driver timeout"));
                }
                if self.stop_timeout_ms / 2 <= t {
                    return Err(Error::Config("stop phase budget below a driver timeout"));
                }
            }
        }
        if DriverId::ALL.iter().any(|d| !seen.contains(d)) {
            return Err(Error::Config("driver missing from the startup plan"));
        }
        Ok(())
    }

    pub fn start_phase_ms(&self) -> u32 {
        self.start_timeout_ms / 2
    }

    pub fn stop_phase_ms(&self) -> u32 {
        self.stop_timeout_ms / 2
    }
}

impl TrafficTiming {
    pub fn validate(&self) -> Result<()> {
        let all = [
            self.min_green_ns_ms,
            self.min_green_ew_ms,
            self.clearance_ns_ms,
            self.clearance_ew_ms,
            self.ew_idle_ms,
            self.blink_ms,
        ];
        if all.contains(&0) {
            return Err(Error::Config("traffic timing must be non-zero"));
        }
        if self.ew_idle_ms <= self.min_green_ew_ms {
            return Err(Error::Config("east-west idle must exceed its minimum green"));
        }
        Ok(())
    }
}
