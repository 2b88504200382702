//! The diagnostics-extraction seam.
//!
//! Turning raw tool stderr into structured diagnostics is handled outside
//! this workspace; the engine only needs a place to push text into and get
//! publishable diagnostic batches back.

use serde::{Deserialize, Serialize};

use crate::notifier::PublishDiagnosticsParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Information,
    Hint,
}

/// A structured compiler/tool message associated with a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

/// Extracts structured diagnostics from raw tool output.
///
/// Implementations are shared across concurrent invocations and must be safe
/// for concurrent calls.
pub trait DiagnosticsExtractor: Send + Sync {
    /// Extract diagnostics from a chunk of stderr text attributed to
    /// `target_label`. Best effort: an implementation that understands
    /// nothing returns an empty batch.
    fn extract_diagnostics(
        &self,
        stderr: &str,
        target_label: &str,
        origin_id: Option<&str>,
    ) -> Vec<PublishDiagnosticsParams>;

    /// Produce the batches that retract every diagnostic previously published
    /// for `target_label` (empty diagnostic sets with `reset` semantics).
    fn clear_former_diagnostics(&self, target_label: &str) -> Vec<PublishDiagnosticsParams>;
}

/// Extractor that produces nothing; used when no language plugin is wired in
#[derive(Debug, Default)]
pub struct NullDiagnostics;

impl DiagnosticsExtractor for NullDiagnostics {
    fn extract_diagnostics(
        &self,
        _stderr: &str,
        _target_label: &str,
        _origin_id: Option<&str>,
    ) -> Vec<PublishDiagnosticsParams> {
        Vec::new()
    }

    fn clear_former_diagnostics(&self, _target_label: &str) -> Vec<PublishDiagnosticsParams> {
        Vec::new()
    }
}
