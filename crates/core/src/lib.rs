//! Core domain types, errors, and collaborator contracts for `buildbridge`.
//!
//! This crate establishes the foundational data structures and error handling
//! mechanisms used by the rest of the workspace. It aims to provide clear,
//! type-safe, and consistent building blocks.
//!
//! ## Key Components
//!
//! - **`errors`**: Defines the primary `Error` enum and `Result` type alias,
//!   centralizing all possible failure modes for predictable error handling.
//! - **`types`**: Domain-specific newtype wrappers and data structures like
//!   `TaskId`, `TargetId`, and `ExitStatus` that enforce invariants at the
//!   type level.
//! - **`notifier`**: The `BuildClientNotifier` contract over which the engine
//!   reports task lifecycle, test results, and diagnostics to the client.
//! - **`diagnostics`**: The `DiagnosticsExtractor` seam; the extraction logic
//!   itself lives outside this workspace and is consumed as a black box.
//! - **`constants`**: Shared static constants such as command verbs and the
//!   conventional output-group name.

pub mod constants;
pub mod diagnostics;
pub mod errors;
pub mod notifier;
pub mod testing;
pub mod types;

pub use self::{
    constants::*,
    diagnostics::{Diagnostic, DiagnosticSeverity, DiagnosticsExtractor, NullDiagnostics},
    errors::{Error, Result, ResultExt},
    notifier::{
        BuildClientNotifier, CompileReportData, CompileTaskData, PublishDiagnosticsParams,
        TaskFinishData, TaskFinishParams, TaskProgressParams, TaskStartData, TaskStartParams,
        TestFinishData, TestNotifier, TestReportData,
    },
    types::{format_duration, EnvironmentVariables, ExitStatus, TargetId, TaskId, TestOutcome},
};
