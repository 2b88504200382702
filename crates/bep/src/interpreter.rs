//! The per-invocation event state machine.
//!
//! One interpreter instance consumes the event records of exactly one tool
//! invocation, in arrival order, and pushes side effects to the notifier and
//! diagnostics collaborators while accumulating the output index. It is not
//! thread-safe by design: each invocation gets a fresh instance driven by a
//! single consumer.
//!
//! Anomalies never escape as errors. A frame the state cannot account for is
//! logged and dropped; a missing artifact degrades to empty content.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use buildbridge_core::{
    format_duration, BuildClientNotifier, CompileReportData, CompileTaskData, DiagnosticsExtractor,
    ExitStatus, TargetId, TaskFinishData, TaskFinishParams, TaskId, TaskProgressParams,
    TaskStartData, TaskStartParams, TestFinishData, TestNotifier, TestReportData,
    BUILD_COMMAND, CONTINUATION_MESSAGE_PREFIX, DEFAULT_OUTPUT_GROUP, GENERIC_TEST_CASE_NAME,
    TEST_COMMAND, TEST_REPORT_SUFFIX,
};
use tracing::{debug, info, trace, warn};

use crate::event::{AbortReason, BepTestStatus, BuildEventRecord, EventFile, FilePayload, OutputGroup};
use crate::output_index::{OutputIndex, OutputIndexSnapshot};
use crate::paths::PathResolver;
use crate::test_report::TestReportTranslator;

/// Mutable state for one invocation
#[derive(Debug, Default)]
struct BuildInvocationState {
    /// At most one top-level build task is ever open; the invariant is
    /// zero-or-one, not a stack
    open_task: Option<TaskId>,
    index: OutputIndex,
    terminal: Option<ExitStatus>,
}

/// Consumes one invocation's event records in strict arrival order
pub struct BuildEventInterpreter {
    notifier: Arc<dyn BuildClientNotifier>,
    diagnostics: Arc<dyn DiagnosticsExtractor>,
    paths: Arc<dyn PathResolver>,
    origin_id: Option<String>,
    target: Option<TargetId>,
    artifact_suffixes: Option<Vec<String>>,
    state: BuildInvocationState,
}

impl BuildEventInterpreter {
    #[must_use]
    pub fn new(
        notifier: Arc<dyn BuildClientNotifier>,
        diagnostics: Arc<dyn DiagnosticsExtractor>,
        paths: Arc<dyn PathResolver>,
        origin_id: Option<String>,
        target: Option<TargetId>,
    ) -> Self {
        Self {
            notifier,
            diagnostics,
            paths,
            origin_id,
            target,
            artifact_suffixes: None,
            state: BuildInvocationState::default(),
        }
    }

    /// Restrict registered named-set files to these suffixes. Default keeps
    /// every resolvable file.
    #[must_use]
    pub fn with_artifact_suffixes(mut self, suffixes: Vec<String>) -> Self {
        self.artifact_suffixes = Some(suffixes);
        self
    }

    /// The terminal classification, once a `Finished` event was consumed
    #[must_use]
    pub fn terminal_status(&self) -> Option<ExitStatus> {
        self.state.terminal
    }

    /// Consume the interpreter, keeping the accumulated output index
    #[must_use]
    pub fn into_snapshot(self) -> OutputIndexSnapshot {
        self.state.index.snapshot()
    }

    fn test_notifier(&self) -> TestNotifier {
        TestNotifier::new(self.notifier.clone(), self.origin_id.clone())
    }

    /// Dispatch one event. Exhaustive over the event union; adding a kind
    /// fails compilation until it is handled here.
    pub async fn handle_event(&mut self, event: BuildEventRecord) {
        match event {
            BuildEventRecord::Started {
                uuid,
                command,
                start_time_millis,
            } => self.on_started(uuid, &command, start_time_millis).await,
            BuildEventRecord::Progress { stderr } => self.on_progress(&stderr).await,
            BuildEventRecord::BuildMetrics { wall_time_millis } => {
                self.on_build_metrics(wall_time_millis).await;
            }
            BuildEventRecord::NamedSetOfFiles {
                id,
                files,
                file_set_ids,
            } => self.on_named_set(&id, files, file_set_ids),
            BuildEventRecord::TargetCompleted {
                label,
                success,
                output_groups,
            } => self.on_target_completed(&label, success, output_groups).await,
            BuildEventRecord::ActionCompleted {
                label,
                success,
                stderr,
            } => self.on_action_completed(&label, success, stderr).await,
            BuildEventRecord::TestResult {
                label,
                status,
                outputs,
            } => self.on_test_result(&label, &status, outputs).await,
            BuildEventRecord::TestSummary { label, .. } => {
                // Reserved for aggregate/remote scenarios
                trace!(label, "ignoring test summary event");
            }
            BuildEventRecord::Finished { exit_code } => self.on_finished(exit_code).await,
            BuildEventRecord::Aborted {
                reason,
                description,
            } => self.on_aborted(&reason, &description),
            BuildEventRecord::Unknown => trace!("skipping unconsumed event kind"),
        }
    }

    async fn on_started(&mut self, uuid: String, command: &str, start_time_millis: i64) {
        if command != BUILD_COMMAND && command != TEST_COMMAND {
            trace!(command, "ignoring start of unrelated command");
            return;
        }
        if self.state.open_task.is_some() {
            // Last start wins; staying resilient beats strict bookkeeping
            warn!(uuid, "build started while another build task is open");
        }
        self.state.index.clear();
        self.state.terminal = None;

        let task_id = TaskId::new(uuid);
        let data = self
            .target
            .as_ref()
            .map(|target| TaskStartData::CompileTask(CompileTaskData { target: target.clone() }));
        self.notifier
            .on_task_start(TaskStartParams {
                task_id: task_id.clone(),
                origin_id: self.origin_id.clone(),
                event_time_millis: Some(start_time_millis),
                data,
            })
            .await;
        self.state.open_task = Some(task_id);
    }

    async fn on_progress(&mut self, stderr: &str) {
        if stderr.trim().is_empty() {
            return;
        }

        // Best effort; whatever the extractor cannot parse is just log text
        if let Some(target) = self.target.clone() {
            for params in self.diagnostics.extract_diagnostics(
                stderr,
                target.as_str(),
                self.origin_id.as_deref(),
            ) {
                self.notifier.on_publish_diagnostics(params).await;
            }
        }

        self.notifier
            .on_task_progress(TaskProgressParams {
                task_id: self.state.open_task.clone(),
                origin_id: self.origin_id.clone(),
                message: stderr.to_string(),
            })
            .await;

        let filtered: Vec<&str> = stderr
            .lines()
            .filter(|line| !line.starts_with(CONTINUATION_MESSAGE_PREFIX))
            .collect();
        if !filtered.is_empty() {
            info!("{}", filtered.join("\n"));
        }
    }

    async fn on_build_metrics(&mut self, wall_time_millis: u64) {
        let duration = Duration::from_millis(wall_time_millis);
        self.notifier
            .on_task_progress(TaskProgressParams {
                task_id: self.state.open_task.clone(),
                origin_id: self.origin_id.clone(),
                message: format!("Command completed in {}", format_duration(duration)),
            })
            .await;
    }

    fn on_named_set(&mut self, id: &str, files: Vec<EventFile>, children: Vec<String>) {
        let keep = |file: &EventFile| match &self.artifact_suffixes {
            Some(suffixes) => suffixes.iter().any(|suffix| file.name.ends_with(suffix)),
            None => true,
        };
        let resolved: Vec<PathBuf> = files
            .iter()
            .filter(|file| keep(file))
            .filter_map(|file| file.uri.as_deref())
            .filter_map(|uri| self.paths.resolve_uri(uri))
            .collect();

        if let Err(e) = self.state.index.register_file_set(id, resolved, children) {
            warn!(error = %e, "dropping unregistrable named file set");
        }
    }

    async fn on_target_completed(&mut self, label: &str, success: bool, groups: Vec<OutputGroup>) {
        // Prefer the client's canonical form when the emitted label is the
        // same target modulo the repository marker
        let resolved_label = match &self.target {
            Some(target) if target.matches_label(label) => target.as_str().to_string(),
            _ => label.to_string(),
        };
        debug!(label = %resolved_label, success, "target completed");

        self.state.index.record_root_target(&resolved_label);
        let touches_default = groups.iter().any(|g| g.name == DEFAULT_OUTPUT_GROUP);
        for group in groups {
            self.state
                .index
                .register_group_roots(&group.name, group.file_set_ids);
        }

        // Action-level failure events are not re-emitted on a successful
        // rebuild, so success is the moment to retract stale diagnostics.
        if success && touches_default {
            for params in self.diagnostics.clear_former_diagnostics(&resolved_label) {
                self.notifier.on_publish_diagnostics(params).await;
            }
        }
    }

    async fn on_action_completed(&mut self, label: &str, success: bool, stderr: FilePayload) {
        if success {
            return;
        }
        let text = self.read_stderr_payload(&stderr).await;
        for params in
            self.diagnostics
                .extract_diagnostics(&text, label, self.origin_id.as_deref())
        {
            self.notifier.on_publish_diagnostics(params).await;
        }
    }

    /// Inline bytes win; a URI is read from disk; anything unreadable
    /// degrades to empty text
    async fn read_stderr_payload(&self, payload: &FilePayload) -> String {
        if let Some(contents) = &payload.contents {
            return contents.clone();
        }
        let Some(uri) = payload.uri.as_deref() else {
            return String::new();
        };
        let Some(path) = self.paths.resolve_uri(uri) else {
            debug!(uri, "stderr reference is not locally readable");
            return String::new();
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read action stderr");
                String::new()
            }
        }
    }

    async fn on_test_result(&mut self, label: &str, status: &BepTestStatus, outputs: Vec<EventFile>) {
        // Nothing to correlate the results to without an originating request
        if self.origin_id.is_none() {
            debug!(label, "ignoring test result without an origin id");
            return;
        }

        let parent = match &self.state.open_task {
            Some(open) => TaskId::child_of(open),
            None => TaskId::fresh(),
        };
        let tests = self.test_notifier();
        tests.begin_test_target(label, &parent).await;

        let outcome = status.to_outcome();
        let report_path = outputs
            .iter()
            .filter(|file| file.name.ends_with(TEST_REPORT_SUFFIX))
            .filter_map(|file| file.uri.as_deref())
            .filter_map(|uri| self.paths.resolve_uri(uri))
            .next();

        let translated = match report_path {
            Some(path) => {
                let translator = TestReportTranslator::new(parent.clone(), tests.clone());
                match translator.parse_and_report(&path).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(error = %e, "falling back to a generic test event");
                        false
                    }
                }
            }
            None => false,
        };
        if !translated {
            // No usable report: one synthesized child carrying the outcome
            let child = TaskId::child_of(&parent);
            tests.start_test(GENERIC_TEST_CASE_NAME, &child).await;
            tests
                .finish_test(&child, TestFinishData::bare(GENERIC_TEST_CASE_NAME, outcome))
                .await;
        }

        tests
            .end_test_target(TestReportData::single(outcome), &parent)
            .await;
    }

    async fn on_finished(&mut self, exit_code: i32) {
        let Some(task_id) = self.state.open_task.take() else {
            warn!("finish event without exactly one open build task");
            return;
        };

        let status = ExitStatus::from_exit_code(exit_code);
        self.state.terminal = Some(status);

        let data = self.target.as_ref().map(|target| {
            TaskFinishData::CompileReport(CompileReportData {
                target: target.clone(),
                errors: i64::from(!status.is_ok()),
                warnings: 0,
            })
        });
        self.notifier
            .on_task_finish(TaskFinishParams {
                task_id,
                origin_id: self.origin_id.clone(),
                event_time_millis: Some(buildbridge_core::notifier::now_millis()),
                status,
                data,
            })
            .await;
    }

    fn on_aborted(&self, reason: &AbortReason, description: &str) {
        match reason {
            AbortReason::NoBuild => {}
            AbortReason::Other(reason) => {
                // Not terminal by itself; classification still comes from
                // `Finished` or process exit
                warn!(reason, description, "command aborted");
            }
        }
    }
}
