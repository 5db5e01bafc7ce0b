//! Signalbox controller library.
//!
//! Event-driven active objects under a cooperative dispatcher: a system
//! orchestrator that starts and stops the drivers in dependency order, a
//! serial driver reconciling circular DMA into a ring buffer, button and
//! LED drivers, and a traffic light controller.  Hardware sits behind the
//! port traits in [`app::ports`]; [`adapters::sim`] plays it on the host.

#![deny(unused_must_use)]

pub mod active;
pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod events;
pub mod fifo;
pub mod hsm;
pub mod inject;
pub mod isr;
pub mod system;
pub mod traffic;
