//! Cooperative priority dispatcher.
//!
//! ```text
//!   IsrDrain ──publish──┐
//!                       ▼
//!   ┌──────────┬───────────────────┬──────────────────────┐
//!   │ priority │ active object     │ mailbox              │
//!   ├──────────┼───────────────────┼──────────────────────┤
//!   │ 5        │ serial            │ [evt, evt]           │ ◀── highest first
//!   │ 3        │ led               │ []                   │
//!   │ 2        │ system            │ [evt]                │
//!   └──────────┴───────────────────┴──────────────────────┘
//!                       │
//!          dispatch one event, route the handler's outbox
//! ```
//!
//! One event at a time: the highest-priority non-empty mailbox is served,
//! the handler runs to completion, and the actions it queued are routed
//! before anything else is dispatched.  Time only moves in
//! [`tick`](Dispatcher::tick), which counts every object's timers down and
//! posts expiries to their owners.

use heapless::{Deque, Vec};
use log::{error, info, trace};

use super::{Action, ActiveObject};
use crate::error::{Error, Result};
use crate::events::Evt;
use crate::isr::IsrDrain;

/// Events each mailbox can hold.
pub const MAILBOX_CAP: usize = 16;
/// Active objects one dispatcher can host.
pub const MAX_ACTIVE: usize = 8;

struct Slot {
    priority: u8,
    ao: Box<dyn ActiveObject>,
    mailbox: Deque<Evt, MAILBOX_CAP>,
}

pub struct Dispatcher {
    /// Sorted by descending priority.
    slots: Vec<Slot, MAX_ACTIVE>,
    isr: Option<IsrDrain>,
    tick_ms: u32,
    now_ms: u64,
    started: bool,
    dropped: u32,
}

impl Dispatcher {
    pub fn new(tick_ms: u32) -> Self {
        Self {
            slots: Vec::new(),
            isr: None,
            tick_ms: tick_ms.max(1),
            now_ms: 0,
            started: false,
            dropped: 0,
        }
    }

    /// Attach the consumer half of the interrupt queue.
    #[must_use]
    pub fn with_isr(mut self, drain: IsrDrain) -> Self {
        self.isr = Some(drain);
        self
    }

    /// Add an active object.  Priorities and names must be unique; higher
    /// numbers are served first.
    pub fn register(&mut self, priority: u8, ao: Box<dyn ActiveObject>) -> Result<()> {
        if self.started {
            return Err(Error::Registration("already started"));
        }
        if self.slots.iter().any(|s| s.priority == priority) {
            return Err(Error::Registration("duplicate priority"));
        }
        if self.slots.iter().any(|s| s.ao.name() == ao.name()) {
            return Err(Error::Registration("duplicate name"));
        }
        let pos = self
            .slots
            .iter()
            .position(|s| s.priority < priority)
            .unwrap_or(self.slots.len());
        self.slots
            .insert(
                pos,
                Slot {
                    priority,
                    ao,
                    mailbox: Deque::new(),
                },
            )
            .map_err(|_| Error::Registration("too many active objects"))
    }

    /// Run every object's initial transition, highest priority first.
    pub fn start(&mut self) {
        for idx in 0..self.slots.len() {
            info!(
                "dispatcher: starting {} (priority {})",
                self.slots[idx].ao.name(),
                self.slots[idx].priority
            );
            self.slots[idx].ao.init();
            self.route(idx);
        }
        self.started = true;
    }

    /// Broadcast `evt` to every subscriber.
    pub fn publish(&mut self, evt: Evt) {
        for idx in 0..self.slots.len() {
            if self.slots[idx].ao.subscriptions().contains(&evt.sig) {
                self.enqueue(idx, evt, false);
            }
        }
    }

    /// Post `evt` straight into the named object's mailbox.
    pub fn post(&mut self, name: &str, evt: Evt) -> Result<()> {
        let idx = self
            .slots
            .iter()
            .position(|s| s.ao.name() == name)
            .ok_or(Error::UnknownActiveObject)?;
        let slot = &mut self.slots[idx];
        slot.mailbox
            .push_back(evt)
            .map_err(|_| Error::MailboxFull(slot.ao.name()))
    }

    /// Publish everything raised from interrupt context so far.
    pub fn drain_interrupts(&mut self) -> usize {
        let mut n = 0;
        while let Some(evt) = self.isr.as_mut().and_then(IsrDrain::pop) {
            self.publish(evt);
            n += 1;
        }
        n
    }

    /// Dispatch until every mailbox and the interrupt queue are empty.
    /// Returns the number of events handled.
    pub fn run_until_idle(&mut self) -> usize {
        let mut handled = 0;
        loop {
            self.drain_interrupts();
            let Some(idx) = self.slots.iter().position(|s| !s.mailbox.is_empty()) else {
                break;
            };
            let Some(evt) = self.slots[idx].mailbox.pop_front() else {
                break;
            };
            let slot = &mut self.slots[idx];
            if slot.ao.core().is_stale(&evt) {
                trace!("{}: dropped stale {}", slot.ao.name(), evt.sig);
                continue;
            }
            trace!("{} <- {} #{}", slot.ao.name(), evt.sig, evt.seq);
            slot.ao.dispatch(&evt);
            self.route(idx);
            handled += 1;
        }
        handled
    }

    /// Advance every timer by `ms` and post the expiries.
    pub fn tick(&mut self, ms: u32) {
        self.now_ms += u64::from(ms);
        let mut dropped = 0;
        for slot in &mut self.slots {
            let Slot { ao, mailbox, .. } = slot;
            let name = ao.name();
            ao.core_mut().advance_timers(ms, |evt| {
                if mailbox.push_back(evt).is_err() {
                    error!("{name}: mailbox full, dropped {}", evt.sig);
                    dropped += 1;
                }
            });
        }
        self.dropped += dropped;
    }

    /// Let `ms` of time pass in steps of the configured tick, running to
    /// idle after each step.
    pub fn advance(&mut self, ms: u32) {
        self.run_until_idle();
        let mut left = ms;
        while left > 0 {
            let step = left.min(self.tick_ms);
            self.tick(step);
            self.run_until_idle();
            left -= step;
        }
    }

    pub fn tick_ms(&self) -> u32 {
        self.tick_ms
    }

    /// Milliseconds of simulated time since construction.
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Current leaf state of the named object.
    pub fn state_of(&self, name: &str) -> Option<&'static str> {
        self.slots
            .iter()
            .find(|s| s.ao.name() == name)
            .map(|s| s.ao.state_name())
    }

    /// Events lost to full mailboxes.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    pub fn is_idle(&self) -> bool {
        self.slots.iter().all(|s| s.mailbox.is_empty())
            && self.isr.as_ref().is_none_or(IsrDrain::is_empty)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn route(&mut self, idx: usize) {
        while let Some(action) = self.slots[idx].ao.core_mut().take_action() {
            match action {
                Action::Publish(evt) => self.publish(evt),
                Action::PostFifo(evt) => self.enqueue(idx, evt, false),
                Action::PostLifo(evt) => self.enqueue(idx, evt, true),
            }
        }
    }

    fn enqueue(&mut self, idx: usize, evt: Evt, front: bool) {
        let slot = &mut self.slots[idx];
        let queued = if front {
            slot.mailbox.push_front(evt)
        } else {
            slot.mailbox.push_back(evt)
        };
        if queued.is_err() {
            error!("{}: mailbox full, dropped {}", slot.ao.name(), evt.sig);
            self.dropped += 1;
        }
    }
}
