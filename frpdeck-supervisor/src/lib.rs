//! frpdeck Supervisor - process supervision and wiring for the frpc agent
//!
//! Builds on `frpdeck-core`:
//! - [`ProcessSupervisor`] keeps the cached state of the single frpc process
//!   and feeds its output into the log sink
//! - [`LocalRunner`] spawns frpc as a local child and publishes its output and
//!   exit on the event bus
//! - [`Deck`] assembles every component, routes backend events and exposes
//!   one stream of state updates

mod deck;
mod error;
mod process;
mod runner;

pub use deck::Deck;
pub use error::{Result, SupervisorError};
pub use process::{ProcessSnapshot, ProcessSupervisor};
pub use runner::LocalRunner;
