//! Time events owned by an active object.
//!
//! Each timer posts a fixed signal to its owner.  Every arm or disarm bumps
//! the timer's generation, and an expiry carries the generation it was
//! produced under in its `seq` field.  The dispatcher drops expiries whose
//! generation is out of date, so once a state disarms a timer on exit no
//! expiry from it can reach the next state, even if one was already queued.

use heapless::Vec;

use crate::error::{Error, Result};
use crate::events::{Evt, Signal};

/// Timers per active object.
pub const MAX_TIMERS: usize = 4;

/// Handle returned by [`ActiveCore::add_timer`](super::ActiveCore::add_timer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerId(u8);

#[derive(Debug, Clone, Copy)]
struct TimeEvt {
    sig: Signal,
    armed: bool,
    remaining: u32,
    /// 0 for one-shot.
    period: u32,
    generation: u16,
}

pub(crate) struct TimerSet {
    timers: Vec<TimeEvt, MAX_TIMERS>,
}

impl TimerSet {
    pub(crate) const fn new() -> Self {
        Self { timers: Vec::new() }
    }

    pub(crate) fn add(&mut self, owner: &'static str, sig: Signal) -> Result<TimerId> {
        debug_assert!(sig.is_timer(), "{owner}: {sig} is not a timer signal");
        debug_assert!(
            self.timers.iter().all(|t| t.sig != sig),
            "{owner}: duplicate timer {sig}"
        );
        let id = TimerId(self.timers.len() as u8);
        self.timers
            .push(TimeEvt {
                sig,
                armed: false,
                remaining: 0,
                period: 0,
                generation: 0,
            })
            .map_err(|_| Error::TooManyTimers(owner))?;
        Ok(id)
    }

    pub(crate) fn arm(&mut self, id: TimerId, ms: u32, period: u32) {
        if let Some(t) = self.timers.get_mut(id.0 as usize) {
            t.generation = t.generation.wrapping_add(1);
            t.armed = true;
            // A zero delay still goes through one tick.
            t.remaining = ms.max(1);
            t.period = period;
        }
    }

    pub(crate) fn disarm(&mut self, id: TimerId) -> bool {
        match self.timers.get_mut(id.0 as usize) {
            Some(t) => {
                let was_armed = t.armed;
                t.generation = t.generation.wrapping_add(1);
                t.armed = false;
                was_armed
            }
            None => false,
        }
    }

    pub(crate) fn is_armed(&self, id: TimerId) -> bool {
        self.timers.get(id.0 as usize).is_some_and(|t| t.armed)
    }

    /// Count every armed timer down by `ms`; hand each expiry to `expired`.
    pub(crate) fn advance(&mut self, ms: u32, mut expired: impl FnMut(Evt)) {
        for t in self.timers.iter_mut().filter(|t| t.armed) {
            if t.remaining > ms {
                t.remaining -= ms;
                continue;
            }
            if t.period > 0 {
                t.remaining = t.period;
            } else {
                t.armed = false;
            }
            expired(Evt::new(t.sig).with_seq(t.generation));
        }
    }

    pub(crate) fn is_stale(&self, evt: &Evt) -> bool {
        self.timers
            .iter()
            .find(|t| t.sig == evt.sig)
            .is_some_and(|t| t.generation != evt.seq)
    }
}
