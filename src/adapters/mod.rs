//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter    | Implements                           | Connects to            |
//! |------------|--------------------------------------|------------------------|
//! | `sim`      | UartRxPort, UartTxPort, LampPort     | Host simulation        |
//! |            | embedded-hal OutputPin / InputPin    |                        |
//! | `log_sink` | `log::Log`                           | stderr                 |

pub mod log_sink;
pub mod sim;
