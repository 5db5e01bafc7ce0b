//! Device drivers: each one an active object over its port.

pub mod button;
pub mod lamp;
pub mod led;
pub mod serial;
