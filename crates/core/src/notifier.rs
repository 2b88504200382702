//! Outbound notification contract between the engine and the client.
//!
//! The engine never talks to the wire directly; it pushes typed task
//! lifecycle notifications into a [`BuildClientNotifier`] and the outer
//! server decides how they reach the client. Implementations are shared
//! across concurrent invocations and must be safe for concurrent calls.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::diagnostics::Diagnostic;
use crate::types::{ExitStatus, TargetId, TaskId, TestOutcome};

/// Milliseconds since the epoch, for notification timestamps
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Payload attached to a `task_start` notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dataKind", content = "data", rename_all = "kebab-case")]
pub enum TaskStartData {
    /// A compile task for a single in-scope target is starting
    CompileTask(CompileTaskData),
    /// A single test or test suite is starting
    TestStart(TestStartData),
    /// The test run for a whole target is starting
    TestTask(TestTaskData),
}

/// Payload attached to a `task_finish` notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dataKind", content = "data", rename_all = "kebab-case")]
pub enum TaskFinishData {
    /// Error/warning counts for a finished compile task
    CompileReport(CompileReportData),
    /// Outcome of a single test or test suite
    TestFinish(TestFinishData),
    /// Aggregate counts for a finished per-target test run
    TestReport(TestReportData),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileTaskData {
    pub target: TargetId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileReportData {
    pub target: TargetId,
    pub errors: i64,
    pub warnings: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStartData {
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestTaskData {
    pub target_label: String,
}

/// JUnit-style detail for a finished test case or suite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestFinishData {
    pub display_name: String,
    pub outcome: TestOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl TestFinishData {
    /// Minimal detail: a name and an outcome
    #[must_use]
    pub fn bare(display_name: impl Into<String>, outcome: TestOutcome) -> Self {
        Self {
            display_name: display_name.into(),
            outcome,
            message: None,
            duration_seconds: None,
            class_name: None,
            package: None,
            full_output: None,
            error_type: None,
        }
    }
}

/// Aggregate counts for one per-target test run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReportData {
    pub passed: i64,
    pub failed: i64,
    pub ignored: i64,
    pub cancelled: i64,
    pub skipped: i64,
}

impl TestReportData {
    /// A report counting a single run with the given outcome
    #[must_use]
    pub fn single(outcome: TestOutcome) -> Self {
        let mut report = Self::default();
        match outcome {
            TestOutcome::Passed => report.passed = 1,
            TestOutcome::Failed => report.failed = 1,
            TestOutcome::Skipped => report.skipped = 1,
            TestOutcome::Ignored => report.ignored = 1,
            TestOutcome::Cancelled => report.cancelled = 1,
        }
        report
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStartParams {
    pub task_id: TaskId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_time_millis: Option<i64>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub data: Option<TaskStartData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgressParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFinishParams {
    pub task_id: TaskId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_time_millis: Option<i64>,
    pub status: ExitStatus,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub data: Option<TaskFinishData>,
}

/// One batch of diagnostics for one target/document. `reset` retracts
/// everything previously published for the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishDiagnosticsParams {
    pub target_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub reset: bool,
}

impl PublishDiagnosticsParams {
    /// An empty, resetting batch that retracts stale diagnostics
    #[must_use]
    pub fn clearing(target_label: impl Into<String>, origin_id: Option<String>) -> Self {
        Self {
            target_label: target_label.into(),
            origin_id,
            diagnostics: Vec::new(),
            reset: true,
        }
    }
}

/// Client-facing notification sink.
///
/// Calls are one-way; delivery failures are the outer server's problem, so
/// none of these return errors.
#[async_trait::async_trait]
pub trait BuildClientNotifier: Send + Sync {
    async fn on_task_start(&self, params: TaskStartParams);
    async fn on_task_progress(&self, params: TaskProgressParams);
    async fn on_task_finish(&self, params: TaskFinishParams);
    async fn on_publish_diagnostics(&self, params: PublishDiagnosticsParams);
    async fn on_print_stdout(&self, line: &str);
    async fn on_print_stderr(&self, line: &str);
}

/// Convenience wrapper for the test-specific notification shapes.
///
/// Suites and cases are reported as plain task start/finish pairs carrying
/// test payloads; this keeps the param assembly in one place.
#[derive(Clone)]
pub struct TestNotifier {
    notifier: Arc<dyn BuildClientNotifier>,
    origin_id: Option<String>,
}

impl TestNotifier {
    #[must_use]
    pub fn new(notifier: Arc<dyn BuildClientNotifier>, origin_id: Option<String>) -> Self {
        Self {
            notifier,
            origin_id,
        }
    }

    /// Notify the client that a single test or suite has started
    pub async fn start_test(&self, display_name: &str, task_id: &TaskId) {
        self.notifier
            .on_task_start(TaskStartParams {
                task_id: task_id.clone(),
                origin_id: self.origin_id.clone(),
                event_time_millis: Some(now_millis()),
                data: Some(TaskStartData::TestStart(TestStartData {
                    display_name: display_name.to_string(),
                })),
            })
            .await;
    }

    /// Notify the client that a single test or suite has finished
    pub async fn finish_test(&self, task_id: &TaskId, data: TestFinishData) {
        self.notifier
            .on_task_finish(TaskFinishParams {
                task_id: task_id.clone(),
                origin_id: self.origin_id.clone(),
                event_time_millis: Some(now_millis()),
                status: ExitStatus::Ok,
                data: Some(TaskFinishData::TestFinish(data)),
            })
            .await;
    }

    /// Notify the client that the test run for a whole target has begun
    pub async fn begin_test_target(&self, target_label: &str, task_id: &TaskId) {
        self.notifier
            .on_task_start(TaskStartParams {
                task_id: task_id.clone(),
                origin_id: self.origin_id.clone(),
                event_time_millis: Some(now_millis()),
                data: Some(TaskStartData::TestTask(TestTaskData {
                    target_label: target_label.to_string(),
                })),
            })
            .await;
    }

    /// Notify the client that the test run for a whole target is done,
    /// with aggregate counts
    pub async fn end_test_target(&self, report: TestReportData, task_id: &TaskId) {
        self.notifier
            .on_task_finish(TaskFinishParams {
                task_id: task_id.clone(),
                origin_id: self.origin_id.clone(),
                event_time_millis: Some(now_millis()),
                status: ExitStatus::Ok,
                data: Some(TaskFinishData::TestReport(report)),
            })
            .await;
    }
}
