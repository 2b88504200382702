//! External build-tool process surface for buildbridge
//!
//! This crate builds tool invocations (targets, flags, environment, event
//! stream destination), spawns the tool as a child process, and mirrors its
//! output line-by-line to the client notifier while collecting it.

pub mod command;
pub mod process;
pub mod runner;

pub use command::*;
pub use process::*;
pub use runner::*;
