//! Orchestrator context: the startup plan plus per-phase bookkeeping.

use heapless::Vec;
use log::{debug, error, info};

use super::{DriverId, SerialBuffers};
use crate::active::{ActiveCore, TimerId};
use crate::config::{DriverTimeouts, MAX_PHASE_DRIVERS, OrchestratorConfig};
use crate::error::{ErrorCode, Status};
use crate::events::{Evt, Payload, Signal};

/// Which way a phase drives its drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Start,
    Stop,
}

/// A request still waiting for its confirm.
#[derive(Debug, Clone, Copy)]
struct Outstanding {
    driver: DriverId,
    cfm: Signal,
    seq: u16,
}

/// Result of matching a confirm against the outstanding requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tally {
    /// Not one of ours (old phase, wrong sequence, duplicate).
    Stale,
    /// Counted; more to come.
    Pending,
    /// Counted; that was the last one.
    Complete,
    /// The driver reported failure.
    Failed(DriverId, Status),
}

pub struct SystemCtx {
    plan: OrchestratorConfig,
    timeouts: DriverTimeouts,
    buffers: SerialBuffers,
    pub(super) state_timer: TimerId,
    /// Phase in flight (index into the plan).
    pub(super) phase: usize,
    outstanding: Vec<Outstanding, MAX_PHASE_DRIVERS>,
    /// Successful driver confirms since the last START.
    confirmed: u32,
    pub(super) start_req: Option<u16>,
    pub(super) start_failure: Option<Status>,
    pub(super) stop_req: Option<u16>,
    pub(super) stop_failure: Option<Status>,
}

impl SystemCtx {
    pub fn new(
        plan: OrchestratorConfig,
        timeouts: DriverTimeouts,
        buffers: SerialBuffers,
        state_timer: TimerId,
    ) -> Self {
        Self {
            plan,
            timeouts,
            buffers,
            state_timer,
            phase: 0,
            outstanding: Vec::new(),
            confirmed: 0,
            start_req: None,
            start_failure: None,
            stop_req: None,
            stop_failure: None,
        }
    }

    pub fn confirmed(&self) -> u32 {
        self.confirmed
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub(super) fn reset_confirmed(&mut self) {
        self.confirmed = 0;
    }

    /// Arm the phase timer and send one request per driver in `phase`.
    pub(super) fn begin_phase(&mut self, core: &mut ActiveCore, phase: usize, dir: Direction) {
        self.phase = phase;
        self.outstanding.clear();

        let budget = match dir {
            Direction::Start => self.plan.start_phase_ms(),
            Direction::Stop => self.plan.stop_phase_ms(),
        };
        core.arm(self.state_timer, budget);

        for &driver in &self.plan.phases[phase] {
            let seq = core.next_seq();
            let (req, cfm) = match dir {
                Direction::Start => (driver.start_req(), driver.start_cfm()),
                Direction::Stop => (driver.stop_req(), driver.stop_cfm()),
            };
            let mut evt = Evt::new(req).with_seq(seq);
            if req == Signal::SerialStartReq {
                evt = evt.with_payload(Payload::Serial {
                    tx: self.buffers.tx,
                    rx: self.buffers.rx,
                });
            }
            debug!(
                "system: {:?} phase {} -> {} #{} (driver budget {} ms of {} ms)",
                dir,
                phase + 1,
                driver.name(),
                seq,
                self.timeouts.of(driver),
                budget
            );
            core.publish(evt);
            if self
                .outstanding
                .push(Outstanding { driver, cfm, seq })
                .is_err()
            {
                // Unreachable with a validated plan; the phase then times out.
                error!("system: phase {} has too many drivers", phase + 1);
            }
        }
    }

    /// Match a confirm against the requests of the phase in flight.
    pub(super) fn tally(&mut self, evt: &Evt) -> Tally {
        let Some(pos) = self
            .outstanding
            .iter()
            .position(|o| o.cfm == evt.sig && o.seq == evt.seq)
        else {
            debug!("system: ignoring stale {} #{}", evt.sig, evt.seq);
            return Tally::Stale;
        };
        let done = self.outstanding.swap_remove(pos);
        let status = evt.status_or_success();
        if !status.is_success() {
            info!("system: {} failed: {}", done.driver.name(), status);
            return Tally::Failed(done.driver, status);
        }
        self.confirmed += 1;
        if self.outstanding.is_empty() {
            Tally::Complete
        } else {
            Tally::Pending
        }
    }

    /// TIMEOUT status naming the first driver that has not answered.
    pub(super) fn timeout_status(&self) -> Status {
        let reason = self.outstanding.first().map_or(0, |o| o.driver.reason());
        Status::new(ErrorCode::Timeout, reason)
    }

    pub(super) fn phase_count(&self) -> usize {
        self.plan.phases.len()
    }
}
