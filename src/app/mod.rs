//! Application layer.
//!
//! The state machines never see hardware directly.  They talk to the
//! **port traits** in [`ports`]; [`board`] wires concrete adapters to those
//! ports and registers every active object with the dispatcher.

pub mod board;
pub mod ports;
