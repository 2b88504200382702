//! Shared test doubles for the notifier and diagnostics seams.
//!
//! These live in the library (not behind `cfg(test)`) so every crate in the
//! workspace can drive the engine against recording collaborators without
//! mocking frameworks.

use std::sync::Mutex;

use crate::diagnostics::DiagnosticsExtractor;
use crate::notifier::{
    BuildClientNotifier, PublishDiagnosticsParams, TaskFinishParams, TaskProgressParams,
    TaskStartParams,
};

/// Notifier that records every call for later assertions
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub task_starts: Mutex<Vec<TaskStartParams>>,
    pub task_progress: Mutex<Vec<TaskProgressParams>>,
    pub task_finishes: Mutex<Vec<TaskFinishParams>>,
    pub diagnostics: Mutex<Vec<PublishDiagnosticsParams>>,
    pub stdout_lines: Mutex<Vec<String>>,
    pub stderr_lines: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starts(&self) -> Vec<TaskStartParams> {
        self.task_starts.lock().unwrap().clone()
    }

    pub fn finishes(&self) -> Vec<TaskFinishParams> {
        self.task_finishes.lock().unwrap().clone()
    }

    pub fn published_diagnostics(&self) -> Vec<PublishDiagnosticsParams> {
        self.diagnostics.lock().unwrap().clone()
    }

    pub fn progress_messages(&self) -> Vec<String> {
        self.task_progress
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.message.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl BuildClientNotifier for RecordingNotifier {
    async fn on_task_start(&self, params: TaskStartParams) {
        self.task_starts.lock().unwrap().push(params);
    }

    async fn on_task_progress(&self, params: TaskProgressParams) {
        self.task_progress.lock().unwrap().push(params);
    }

    async fn on_task_finish(&self, params: TaskFinishParams) {
        self.task_finishes.lock().unwrap().push(params);
    }

    async fn on_publish_diagnostics(&self, params: PublishDiagnosticsParams) {
        self.diagnostics.lock().unwrap().push(params);
    }

    async fn on_print_stdout(&self, line: &str) {
        self.stdout_lines.lock().unwrap().push(line.to_string());
    }

    async fn on_print_stderr(&self, line: &str) {
        self.stderr_lines.lock().unwrap().push(line.to_string());
    }
}

/// Extractor that records the text it was handed and emits one clearing
/// batch per `clear_former_diagnostics` call
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    pub extracted: Mutex<Vec<(String, String)>>,
    pub cleared: Mutex<Vec<String>>,
}

impl RecordingDiagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extracted_for(&self, target_label: &str) -> Vec<String> {
        self.extracted
            .lock()
            .unwrap()
            .iter()
            .filter(|(label, _)| label == target_label)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn cleared_targets(&self) -> Vec<String> {
        self.cleared.lock().unwrap().clone()
    }
}

impl DiagnosticsExtractor for RecordingDiagnostics {
    fn extract_diagnostics(
        &self,
        stderr: &str,
        target_label: &str,
        _origin_id: Option<&str>,
    ) -> Vec<PublishDiagnosticsParams> {
        self.extracted
            .lock()
            .unwrap()
            .push((target_label.to_string(), stderr.to_string()));
        Vec::new()
    }

    fn clear_former_diagnostics(&self, target_label: &str) -> Vec<PublishDiagnosticsParams> {
        self.cleared.lock().unwrap().push(target_label.to_string());
        vec![PublishDiagnosticsParams::clearing(target_label, None)]
    }
}
