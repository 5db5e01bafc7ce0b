//! Hierarchical state machine engine.
//!
//! The classic function-pointer state table, extended with a parent link
//! and an initial child per state:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  State table                                                     │
//! │  ┌──────────┬─────────┬──────────┬──────────┬──────────┬───────┐ │
//! │  │ id       │ parent  │ initial  │ on_entry │ on_exit  │ on_evt│ │
//! │  ├──────────┼─────────┼──────────┼──────────┼──────────┼───────┤ │
//! │  │ Root     │ -       │ Stopped  │ fn       │ -        │ fn    │ │
//! │  │ Stopped  │ Root    │ -        │ -        │ -        │ fn    │ │
//! │  │ Started  │ Root    │ Idle     │ fn       │ fn       │ fn    │ │
//! │  │ Idle     │ Started │ -        │ fn       │ fn       │ fn    │ │
//! │  └──────────┴─────────┴──────────┴──────────┴──────────┴───────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Dispatch offers the event to the current leaf, then walks parent links
//! until some handler returns [`Outcome::Handled`] or
//! [`Outcome::Transition`].  A transition exits from the current leaf up
//! to the least common ancestor of source and target, enters down to the
//! target, then follows initial children until a leaf is reached.
//!
//! Self-transitions and transitions to an ancestor are external: the
//! target is exited and re-entered.
//!
//! Handlers receive the machine's context and the owning active object's
//! [`ActiveCore`], through which they publish, post to themselves, defer
//! and arm timers.  Orthogonal regions are plain [`Region`]s owned by the
//! parent's context and driven inline from its handlers.

use core::fmt;

use heapless::Vec;
use log::{debug, error, trace};

use crate::active::ActiveCore;
use crate::events::Evt;

/// Deepest supported nesting, root included.
pub const MAX_DEPTH: usize = 8;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Implemented by each machine's `#[repr(u8)]` state enum.  `index()` must
/// equal the state's position in its table.
pub trait StateId: Copy + Eq + fmt::Debug + 'static {
    fn index(self) -> usize;
}

/// What a handler did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<S> {
    Handled,
    Transition(S),
    /// Not handled here; offer it to the parent.
    Super,
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Entry and exit actions.
pub type ActionFn<C> = fn(&mut C, &mut ActiveCore);

/// Event handler.
pub type HandlerFn<S, C> = fn(&mut C, &mut ActiveCore, &Evt) -> Outcome<S>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

pub struct StateDescriptor<S, C> {
    pub id: S,
    pub name: &'static str,
    pub parent: Option<S>,
    /// Initial child entered after this state when it is a transition target.
    pub initial: Option<S>,
    pub on_entry: Option<ActionFn<C>>,
    pub on_exit: Option<ActionFn<C>>,
    pub on_event: HandlerFn<S, C>,
}

/// Handler for states that only delegate to their parent.
pub fn pass<S, C>(_: &mut C, _: &mut ActiveCore, _: &Evt) -> Outcome<S> {
    Outcome::Super
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Hsm<S: StateId, C, const N: usize> {
    label: &'static str,
    table: [StateDescriptor<S, C>; N],
    top: S,
    current: S,
}

impl<S: StateId, C, const N: usize> Hsm<S, C, N> {
    /// Build an engine over `table`, rooted at `top`.  Nothing runs until
    /// [`init`](Self::init).
    pub fn new(label: &'static str, table: [StateDescriptor<S, C>; N], top: S) -> Self {
        debug_assert!(
            table.iter().enumerate().all(|(i, d)| d.id.index() == i),
            "{label}: state table out of order"
        );
        debug_assert!(table[top.index()].parent.is_none(), "{label}: top has a parent");
        Self {
            label,
            table,
            top,
            current: top,
        }
    }

    /// Enter the top state and drill down its initial children.
    pub fn init(&mut self, ctx: &mut C, core: &mut ActiveCore) {
        debug!("{}: init in {}", self.label, self.name_of(self.top));
        self.current = self.top;
        self.enter(self.top, ctx, core);
        self.drill(ctx, core);
    }

    /// Deliver one event.  Returns `false` if no state claimed it.
    pub fn dispatch(&mut self, ctx: &mut C, core: &mut ActiveCore, evt: &Evt) -> bool {
        trace!("{}: {} in {}", self.label, evt.sig, self.name_of(self.current));
        let mut state = Some(self.current);
        while let Some(s) = state {
            match (self.table[s.index()].on_event)(ctx, core, evt) {
                Outcome::Handled => return true,
                Outcome::Transition(target) => {
                    self.transition(s, target, ctx, core);
                    return true;
                }
                Outcome::Super => state = self.table[s.index()].parent,
            }
        }
        trace!("{}: {} unhandled", self.label, evt.sig);
        false
    }

    /// Current leaf state.
    pub fn current(&self) -> S {
        self.current
    }

    pub fn state_name(&self) -> &'static str {
        self.name_of(self.current)
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// `true` if `state` is the current leaf or one of its ancestors.
    pub fn is_in(&self, state: S) -> bool {
        self.is_ancestor_or_self(state, self.current)
    }

    pub fn name_of(&self, state: S) -> &'static str {
        self.table[state.index()].name
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn parent_of(&self, state: S) -> Option<S> {
        self.table[state.index()].parent
    }

    fn is_ancestor_or_self(&self, ancestor: S, mut state: S) -> bool {
        loop {
            if state == ancestor {
                return true;
            }
            match self.parent_of(state) {
                Some(p) => state = p,
                None => return false,
            }
        }
    }

    /// First state on the path from `source` (inclusive) to the top that
    /// strictly contains `target`.  `None` means "above the top".
    fn lca(&self, source: S, target: S) -> Option<S> {
        let mut candidate = Some(source);
        while let Some(c) = candidate {
            if c != target && self.is_ancestor_or_self(c, target) {
                return Some(c);
            }
            candidate = self.parent_of(c);
        }
        None
    }

    fn transition(&mut self, source: S, target: S, ctx: &mut C, core: &mut ActiveCore) {
        debug!(
            "{}: {} -> {}",
            self.label,
            self.name_of(self.current),
            self.name_of(target)
        );
        let lca = self.lca(source, target);

        let mut s = Some(self.current);
        while s != lca {
            let Some(state) = s else { break };
            self.exit(state, ctx, core);
            s = self.parent_of(state);
        }

        self.enter_path(lca, target, ctx, core);
        self.current = target;
        self.drill(ctx, core);
    }

    /// Enter every state from just below `from` down to `to`.
    fn enter_path(&mut self, from: Option<S>, to: S, ctx: &mut C, core: &mut ActiveCore) {
        let mut path: Vec<S, MAX_DEPTH> = Vec::new();
        let mut s = Some(to);
        while s != from {
            let Some(state) = s else { break };
            if path.push(state).is_err() {
                error!("{}: nesting deeper than {MAX_DEPTH}", self.label);
                break;
            }
            s = self.parent_of(state);
        }
        for state in path.iter().rev() {
            self.enter(*state, ctx, core);
        }
    }

    fn drill(&mut self, ctx: &mut C, core: &mut ActiveCore) {
        while let Some(child) = self.table[self.current.index()].initial {
            self.enter_path(Some(self.current), child, ctx, core);
            self.current = child;
        }
    }

    fn enter(&self, state: S, ctx: &mut C, core: &mut ActiveCore) {
        if let Some(entry) = self.table[state.index()].on_entry {
            entry(ctx, core);
        }
    }

    fn exit(&self, state: S, ctx: &mut C, core: &mut ActiveCore) {
        if let Some(exit) = self.table[state.index()].on_exit {
            exit(ctx, core);
        }
    }
}

// ---------------------------------------------------------------------------
// Region: a machine bundled with its context
// ---------------------------------------------------------------------------

/// A sub-machine owned by a parent active object.  The parent drives it
/// inline from its own handlers, sharing its [`ActiveCore`].
pub struct Region<S: StateId, C, const N: usize> {
    pub hsm: Hsm<S, C, N>,
    pub ctx: C,
}

impl<S: StateId, C, const N: usize> Region<S, C, N> {
    pub fn new(hsm: Hsm<S, C, N>, ctx: C) -> Self {
        Self { hsm, ctx }
    }

    pub fn init(&mut self, core: &mut ActiveCore) {
        self.hsm.init(&mut self.ctx, core);
    }

    pub fn dispatch(&mut self, core: &mut ActiveCore, evt: &Evt) -> bool {
        self.hsm.dispatch(&mut self.ctx, core, evt)
    }

    pub fn is_in(&self, state: S) -> bool {
        self.hsm.is_in(state)
    }

    pub fn current(&self) -> S {
        self.hsm.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Signal;

    // A small machine that records its entry/exit trail.
    //
    //   Top ─┬─ A ─┬─ A1
    //        │     └─ A2
    //        └─ B
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(u8)]
    enum T {
        Top = 0,
        A = 1,
        A1 = 2,
        A2 = 3,
        B = 4,
    }

    impl StateId for T {
        fn index(self) -> usize {
            self as usize
        }
    }

    #[derive(Default)]
    struct Trail(std::vec::Vec<&'static str>);

    macro_rules! trail_fn {
        ($name:ident, $tag:literal) => {
            fn $name(c: &mut Trail, _: &mut ActiveCore) {
                c.0.push($tag);
            }
        };
    }
    trail_fn!(a_entry, "A+");
    trail_fn!(a_exit, "A-");
    trail_fn!(a1_entry, "A1+");
    trail_fn!(a1_exit, "A1-");
    trail_fn!(a2_entry, "A2+");
    trail_fn!(a2_exit, "A2-");
    trail_fn!(b_entry, "B+");
    trail_fn!(b_exit, "B-");

    fn top_event(_: &mut Trail, _: &mut ActiveCore, e: &Evt) -> Outcome<T> {
        match e.sig {
            Signal::LampOffReq => Outcome::Transition(T::Top),
            _ => Outcome::Handled,
        }
    }

    fn a_event(_: &mut Trail, _: &mut ActiveCore, e: &Evt) -> Outcome<T> {
        match e.sig {
            Signal::LampRedReq => Outcome::Transition(T::B),
            Signal::LampYellowReq => Outcome::Transition(T::A),
            _ => Outcome::Super,
        }
    }

    fn a1_event(_: &mut Trail, _: &mut ActiveCore, e: &Evt) -> Outcome<T> {
        match e.sig {
            Signal::LampGreenReq => Outcome::Transition(T::A2),
            _ => Outcome::Super,
        }
    }

    fn a2_event(_: &mut Trail, _: &mut ActiveCore, e: &Evt) -> Outcome<T> {
        match e.sig {
            Signal::LampGreenReq => Outcome::Transition(T::A2),
            _ => Outcome::Super,
        }
    }

    fn b_event(_: &mut Trail, _: &mut ActiveCore, e: &Evt) -> Outcome<T> {
        match e.sig {
            Signal::LampRedReq => Outcome::Transition(T::A2),
            _ => Outcome::Super,
        }
    }

    fn make_hsm() -> Hsm<T, Trail, 5> {
        let table = [
            StateDescriptor {
                id: T::Top,
                name: "Top",
                parent: None,
                initial: Some(T::A),
                on_entry: None,
                on_exit: None,
                on_event: top_event,
            },
            StateDescriptor {
                id: T::A,
                name: "A",
                parent: Some(T::Top),
                initial: Some(T::A1),
                on_entry: Some(a_entry),
                on_exit: Some(a_exit),
                on_event: a_event,
            },
            StateDescriptor {
                id: T::A1,
                name: "A1",
                parent: Some(T::A),
                initial: None,
                on_entry: Some(a1_entry),
                on_exit: Some(a1_exit),
                on_event: a1_event,
            },
            StateDescriptor {
                id: T::A2,
                name: "A2",
                parent: Some(T::A),
                initial: None,
                on_entry: Some(a2_entry),
                on_exit: Some(a2_exit),
                on_event: a2_event,
            },
            StateDescriptor {
                id: T::B,
                name: "B",
                parent: Some(T::Top),
                initial: None,
                on_entry: Some(b_entry),
                on_exit: Some(b_exit),
                on_event: b_event,
            },
        ];
        Hsm::new("test", table, T::Top)
    }

    fn setup() -> (Hsm<T, Trail, 5>, Trail, ActiveCore) {
        let mut hsm = make_hsm();
        let mut trail = Trail::default();
        let mut core = ActiveCore::new("test");
        hsm.init(&mut trail, &mut core);
        (hsm, trail, core)
    }

    fn send(hsm: &mut Hsm<T, Trail, 5>, trail: &mut Trail, core: &mut ActiveCore, sig: Signal) {
        trail.0.clear();
        hsm.dispatch(trail, core, &Evt::new(sig));
    }

    #[test]
    fn init_drills_to_leaf() {
        let (hsm, trail, _) = setup();
        assert_eq!(hsm.current(), T::A1);
        assert_eq!(trail.0, ["A+", "A1+"]);
        assert!(hsm.is_in(T::A));
        assert!(hsm.is_in(T::Top));
        assert!(!hsm.is_in(T::B));
    }

    #[test]
    fn sibling_transition_stays_inside_parent() {
        let (mut hsm, mut trail, mut core) = setup();
        send(&mut hsm, &mut trail, &mut core, Signal::LampGreenReq);
        assert_eq!(hsm.current(), T::A2);
        assert_eq!(trail.0, ["A1-", "A2+"]);
    }

    #[test]
    fn self_transition_exits_and_reenters() {
        let (mut hsm, mut trail, mut core) = setup();
        send(&mut hsm, &mut trail, &mut core, Signal::LampGreenReq);
        send(&mut hsm, &mut trail, &mut core, Signal::LampGreenReq);
        assert_eq!(hsm.current(), T::A2);
        assert_eq!(trail.0, ["A2-", "A2+"]);
    }

    #[test]
    fn inherited_handler_exits_from_leaf() {
        let (mut hsm, mut trail, mut core) = setup();
        send(&mut hsm, &mut trail, &mut core, Signal::LampRedReq);
        assert_eq!(hsm.current(), T::B);
        assert_eq!(trail.0, ["A1-", "A-", "B+"]);
    }

    #[test]
    fn transition_into_nested_target_enters_each_level() {
        let (mut hsm, mut trail, mut core) = setup();
        send(&mut hsm, &mut trail, &mut core, Signal::LampRedReq);
        send(&mut hsm, &mut trail, &mut core, Signal::LampRedReq);
        assert_eq!(hsm.current(), T::A2);
        assert_eq!(trail.0, ["B-", "A+", "A2+"]);
    }

    #[test]
    fn transition_to_own_ancestor_reenters_it() {
        let (mut hsm, mut trail, mut core) = setup();
        send(&mut hsm, &mut trail, &mut core, Signal::LampGreenReq);
        send(&mut hsm, &mut trail, &mut core, Signal::LampYellowReq);
        assert_eq!(hsm.current(), T::A1);
        assert_eq!(trail.0, ["A2-", "A-", "A+", "A1+"]);
    }

    #[test]
    fn transition_to_top_reinitialises() {
        let (mut hsm, mut trail, mut core) = setup();
        send(&mut hsm, &mut trail, &mut core, Signal::LampOffReq);
        assert_eq!(hsm.current(), T::A1);
        assert_eq!(trail.0, ["A1-", "A-", "A+", "A1+"]);
    }

    #[test]
    fn unhandled_reaches_top() {
        let (mut hsm, mut trail, mut core) = setup();
        assert!(hsm.dispatch(&mut trail, &mut core, &Evt::new(Signal::ButtonTrig)));
        assert_eq!(hsm.current(), T::A1);
    }
}
