//! Build event consumption and output resolution engine.
//!
//! One invocation of the external build tool produces an ordered stream of
//! build events. This crate ingests that stream, reconstructs the task
//! lifecycle it describes, resolves the deduplicated artifact set out of the
//! tool's named-file-set DAG, and translates structured test reports into a
//! task forest for the client, tolerating malformed frames and partial
//! failures along the way.
//!
//! Data flows one direction:
//!
//! ```text
//! tool process -> EventTransport -> BuildEventInterpreter
//!              -> { OutputIndex, notifier calls, diagnostics calls }
//!              -> CompilationOrchestrator result
//! ```

pub mod event;
pub mod interpreter;
pub mod orchestrator;
pub mod output_index;
pub mod paths;
pub mod test_report;
pub mod transport;

pub use event::*;
pub use interpreter::*;
pub use orchestrator::*;
pub use output_index::*;
pub use paths::*;
pub use test_report::*;
pub use transport::*;
