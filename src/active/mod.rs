//! Active objects.
//!
//! An active object is a state machine with its own mailbox, private time
//! events and a private defer queue.  Handlers never touch mailboxes or
//! other objects directly; every side effect on the outside world goes
//! through the object's [`ActiveCore`] as a queued [`Action`] that the
//! [`Dispatcher`] routes once the handler has run to completion.
//!
//! ```text
//!            ┌───────────── ActiveCore ─────────────┐
//!  mailbox ─▶│ handler ──▶ outbox [Publish, Post..] │──▶ Dispatcher
//!            │         ──▶ deferred [Evt; 4]        │
//!            │         ──▶ timers   [TimeEvt; 4]    │
//!            └──────────────────────────────────────┘
//! ```

pub mod dispatcher;
pub mod timer;

pub use dispatcher::Dispatcher;
pub use timer::TimerId;

use heapless::Deque;
use log::{error, warn};

use crate::error::Result;
use crate::events::{Evt, Signal};
use crate::hsm::{Hsm, StateId};
use timer::TimerSet;

/// Actions a single handler invocation may queue.
pub const OUTBOX_CAP: usize = 16;
/// Events an object may hold back with [`ActiveCore::defer`].
pub const DEFER_CAP: usize = 4;

/// Side effect requested by a handler.
#[derive(Debug, Clone, Copy)]
pub enum Action {
    /// Broadcast to every subscriber.
    Publish(Evt),
    /// Append to the object's own mailbox.
    PostFifo(Evt),
    /// Put at the front of the object's own mailbox.
    PostLifo(Evt),
}

/// Per-object services available to state handlers.
pub struct ActiveCore {
    name: &'static str,
    seq: u16,
    outbox: Deque<Action, OUTBOX_CAP>,
    deferred: Deque<Evt, DEFER_CAP>,
    timers: TimerSet,
}

impl ActiveCore {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            seq: 0,
            outbox: Deque::new(),
            deferred: Deque::new(),
            timers: TimerSet::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Next request sequence number.  Wraps.
    pub fn next_seq(&mut self) -> u16 {
        self.seq = self.seq.wrapping_add(1);
        self.seq
    }

    // ── Outbox ───────────────────────────────────────────────

    pub fn publish(&mut self, evt: Evt) {
        self.queue(Action::Publish(evt));
    }

    pub fn post_fifo(&mut self, evt: Evt) {
        self.queue(Action::PostFifo(evt));
    }

    /// The posted event is the very next one this object handles.
    pub fn post_lifo(&mut self, evt: Evt) {
        self.queue(Action::PostLifo(evt));
    }

    fn queue(&mut self, action: Action) {
        if self.outbox.push_back(action).is_err() {
            error!("{}: outbox full, dropped {:?}", self.name, action);
        }
    }

    pub(crate) fn take_action(&mut self) -> Option<Action> {
        self.outbox.pop_front()
    }

    // ── Defer / recall ───────────────────────────────────────

    /// Hold `evt` back until [`recall`](Self::recall).  Returns `false` if
    /// the defer queue is full.
    pub fn defer(&mut self, evt: &Evt) -> bool {
        match self.deferred.push_back(*evt) {
            Ok(()) => true,
            Err(_) => {
                warn!("{}: defer queue full, {} not deferred", self.name, evt.sig);
                false
            }
        }
    }

    /// Move the oldest deferred event to the front of the mailbox.
    /// Returns `false` if nothing was deferred.
    pub fn recall(&mut self) -> bool {
        match self.deferred.pop_front() {
            Some(evt) => {
                self.post_lifo(evt);
                true
            }
            None => false,
        }
    }

    /// Move every deferred event to the front of the mailbox, ahead of
    /// anything already queued, keeping the order they were deferred in.
    /// Returns how many came back.
    pub fn recall_all(&mut self) -> usize {
        let n = self.deferred.len();
        // Each LIFO post lands in front of the previous one, so go newest first.
        while let Some(evt) = self.deferred.pop_back() {
            self.post_lifo(evt);
        }
        n
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    // ── Timers ───────────────────────────────────────────────

    /// Register a time event that posts `sig` to this object.  Call at
    /// construction time.
    pub fn add_timer(&mut self, sig: Signal) -> Result<TimerId> {
        self.timers.add(self.name, sig)
    }

    /// One-shot: post after `ms`.
    pub fn arm(&mut self, id: TimerId, ms: u32) {
        self.timers.arm(id, ms, 0);
    }

    /// Post after `ms`, then every `period` ms.
    pub fn arm_periodic(&mut self, id: TimerId, ms: u32, period: u32) {
        self.timers.arm(id, ms, period);
    }

    /// Returns `true` if the timer was armed.  An expiry already sitting in
    /// the mailbox is discarded.
    pub fn disarm(&mut self, id: TimerId) -> bool {
        self.timers.disarm(id)
    }

    /// Restart a one-shot countdown at `ms`.  Returns `true` if it was armed.
    pub fn rearm(&mut self, id: TimerId, ms: u32) -> bool {
        let was_armed = self.timers.is_armed(id);
        self.timers.arm(id, ms, 0);
        was_armed
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.timers.is_armed(id)
    }

    pub(crate) fn advance_timers(&mut self, ms: u32, expired: impl FnMut(Evt)) {
        self.timers.advance(ms, expired);
    }

    /// `true` if `evt` is a timer expiry overtaken by a later arm or disarm.
    pub(crate) fn is_stale(&self, evt: &Evt) -> bool {
        evt.sig.is_timer() && self.timers.is_stale(evt)
    }
}

// ───────────────────────────────────────────────────────────────
// Active object trait
// ───────────────────────────────────────────────────────────────

/// The dispatcher's view of an active object.
pub trait ActiveObject {
    fn name(&self) -> &'static str;

    /// Signals this object receives from [`Dispatcher::publish`].
    fn subscriptions(&self) -> &'static [Signal];

    /// Top-most initial transition.  Runs once from [`Dispatcher::start`].
    fn init(&mut self);

    /// Run one event to completion.
    fn dispatch(&mut self, evt: &Evt);

    fn core(&self) -> &ActiveCore;

    fn core_mut(&mut self) -> &mut ActiveCore;

    /// Name of the current leaf state, for diagnostics.
    fn state_name(&self) -> &'static str;
}

/// An [`Hsm`] with its context and core: the concrete active object every
/// module in this crate builds on.
pub struct Active<S: StateId, C, const N: usize> {
    core: ActiveCore,
    hsm: Hsm<S, C, N>,
    ctx: C,
    subscriptions: &'static [Signal],
}

impl<S: StateId, C, const N: usize> Active<S, C, N> {
    pub fn new(
        core: ActiveCore,
        hsm: Hsm<S, C, N>,
        ctx: C,
        subscriptions: &'static [Signal],
    ) -> Self {
        Self {
            core,
            hsm,
            ctx,
            subscriptions,
        }
    }

    pub fn ctx(&self) -> &C {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut C {
        &mut self.ctx
    }

    pub fn is_in(&self, state: S) -> bool {
        self.hsm.is_in(state)
    }

    pub fn current(&self) -> S {
        self.hsm.current()
    }
}

impl<S: StateId, C, const N: usize> ActiveObject for Active<S, C, N> {
    fn name(&self) -> &'static str {
        self.core.name()
    }

    fn subscriptions(&self) -> &'static [Signal] {
        self.subscriptions
    }

    fn init(&mut self) {
        self.hsm.init(&mut self.ctx, &mut self.core);
    }

    fn dispatch(&mut self, evt: &Evt) {
        self.hsm.dispatch(&mut self.ctx, &mut self.core, evt);
    }

    fn core(&self) -> &ActiveCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ActiveCore {
        &mut self.core
    }

    fn state_name(&self) -> &'static str {
        self.hsm.state_name()
    }
}
