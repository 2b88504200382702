//! Decoded build events and the newline-delimited frame codec.
//!
//! The external tool owns the event schema; this module only models the
//! kinds and fields the interpreter consumes. Events are decoded from the
//! tool's JSON serialization of its event protocol, one envelope per line,
//! identically for the event-log file and the push socket. Everything else
//! in the stream decodes to [`BuildEventRecord::Unknown`] and is skipped.

use buildbridge_core::{Error, Result, TestOutcome};
use serde::{Deserialize, Serialize};

/// A file reference carried by an event, usually as a `file://` URI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// Stderr payload of an action: inline text or a URI to a file, or neither
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
}

/// One output group contributed by a completed target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputGroup {
    pub name: String,
    #[serde(default)]
    pub file_set_ids: Vec<String>,
}

/// The tool's own test status vocabulary. Unrecognized values survive
/// decoding as `Unknown` instead of failing the frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BepTestStatus {
    NoStatus,
    Passed,
    Flaky,
    Timeout,
    Failed,
    Incomplete,
    RemoteFailure,
    ToolHaltedBeforeTesting,
    Unknown(String),
}

impl From<String> for BepTestStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "NO_STATUS" => BepTestStatus::NoStatus,
            "PASSED" => BepTestStatus::Passed,
            "FLAKY" => BepTestStatus::Flaky,
            "TIMEOUT" => BepTestStatus::Timeout,
            "FAILED" => BepTestStatus::Failed,
            "INCOMPLETE" => BepTestStatus::Incomplete,
            "REMOTE_FAILURE" => BepTestStatus::RemoteFailure,
            "TOOL_HALTED_BEFORE_TESTING" => BepTestStatus::ToolHaltedBeforeTesting,
            _ => BepTestStatus::Unknown(value),
        }
    }
}

impl From<BepTestStatus> for String {
    fn from(value: BepTestStatus) -> Self {
        match value {
            BepTestStatus::NoStatus => "NO_STATUS".to_string(),
            BepTestStatus::Passed => "PASSED".to_string(),
            BepTestStatus::Flaky => "FLAKY".to_string(),
            BepTestStatus::Timeout => "TIMEOUT".to_string(),
            BepTestStatus::Failed => "FAILED".to_string(),
            BepTestStatus::Incomplete => "INCOMPLETE".to_string(),
            BepTestStatus::RemoteFailure => "REMOTE_FAILURE".to_string(),
            BepTestStatus::ToolHaltedBeforeTesting => "TOOL_HALTED_BEFORE_TESTING".to_string(),
            BepTestStatus::Unknown(value) => value,
        }
    }
}

impl BepTestStatus {
    /// Fixed mapping into the client vocabulary. Anything the table does not
    /// recognize maps to a conservative non-passed outcome.
    #[must_use]
    pub fn to_outcome(&self) -> TestOutcome {
        match self {
            BepTestStatus::Passed => TestOutcome::Passed,
            BepTestStatus::Failed | BepTestStatus::Flaky | BepTestStatus::Timeout => {
                TestOutcome::Failed
            }
            BepTestStatus::ToolHaltedBeforeTesting => TestOutcome::Cancelled,
            BepTestStatus::NoStatus
            | BepTestStatus::Incomplete
            | BepTestStatus::RemoteFailure
            | BepTestStatus::Unknown(_) => TestOutcome::Ignored,
        }
    }
}

/// Why an event stream ended without a normal `Finished`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AbortReason {
    /// The invocation never requested a build; benign
    NoBuild,
    Other(String),
}

impl From<String> for AbortReason {
    fn from(value: String) -> Self {
        if value == "NO_BUILD" {
            AbortReason::NoBuild
        } else {
            AbortReason::Other(value)
        }
    }
}

impl From<AbortReason> for String {
    fn from(value: AbortReason) -> Self {
        match value {
            AbortReason::NoBuild => "NO_BUILD".to_string(),
            AbortReason::Other(value) => value,
        }
    }
}

/// A decoded, immutable event from the tool's stream.
///
/// Closed union: adding a kind means extending the interpreter's exhaustive
/// match, checked at compile time. Each variant carries only the fields the
/// interpreter needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BuildEventRecord {
    Started {
        uuid: String,
        command: String,
        #[serde(default)]
        start_time_millis: i64,
    },
    Progress {
        #[serde(default)]
        stderr: String,
    },
    BuildMetrics {
        #[serde(default)]
        wall_time_millis: u64,
    },
    NamedSetOfFiles {
        id: String,
        #[serde(default)]
        files: Vec<EventFile>,
        #[serde(default)]
        file_set_ids: Vec<String>,
    },
    TargetCompleted {
        label: String,
        success: bool,
        #[serde(default)]
        output_groups: Vec<OutputGroup>,
    },
    ActionCompleted {
        label: String,
        success: bool,
        #[serde(default)]
        stderr: FilePayload,
    },
    TestResult {
        label: String,
        status: BepTestStatus,
        #[serde(default)]
        outputs: Vec<EventFile>,
    },
    TestSummary {
        label: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        overall_status: Option<BepTestStatus>,
    },
    Finished {
        exit_code: i32,
    },
    Aborted {
        reason: AbortReason,
        #[serde(default)]
        description: String,
    },
    /// An envelope kind this engine does not consume
    #[serde(other)]
    Unknown,
}

impl BuildEventRecord {
    /// Decode one frame. A failure here is a [`Error::Transport`]: the
    /// caller skips the frame and keeps the stream alive.
    pub fn decode_line(line: &str) -> Result<Self> {
        serde_json::from_str(line).map_err(|e| Error::transport(format!("{e}: {line:.120}")))
    }

    /// Encode one frame, newline included
    pub fn to_json_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_target_completed() {
        let event = BuildEventRecord::TargetCompleted {
            label: "//a:b".to_string(),
            success: true,
            output_groups: vec![OutputGroup {
                name: "default".to_string(),
                file_set_ids: vec!["s1".to_string()],
            }],
        };
        let line = event.to_json_line().expect("encode");
        assert!(line.ends_with('\n'));
        let decoded = BuildEventRecord::decode_line(line.trim()).expect("decode");
        assert_eq!(decoded, event);
    }

    #[test]
    fn unknown_kind_decodes_to_unknown() {
        let decoded =
            BuildEventRecord::decode_line(r#"{"kind":"configuredLabel","label":"//a:b"}"#)
                .expect("decode");
        assert_eq!(decoded, BuildEventRecord::Unknown);
    }

    #[test]
    fn malformed_frame_is_a_transport_error() {
        let err = BuildEventRecord::decode_line("{not json").unwrap_err();
        assert!(matches!(err, buildbridge_core::Error::Transport { .. }));
    }

    #[test]
    fn unrecognized_test_status_survives_decoding() {
        let decoded = BuildEventRecord::decode_line(
            r#"{"kind":"testResult","label":"//a:t","status":"SOME_FUTURE_STATUS","outputs":[]}"#,
        )
        .expect("decode");
        match decoded {
            BuildEventRecord::TestResult { status, .. } => {
                assert_eq!(status.to_outcome(), TestOutcome::Ignored);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn status_mapping_table() {
        assert_eq!(BepTestStatus::Passed.to_outcome(), TestOutcome::Passed);
        assert_eq!(BepTestStatus::Flaky.to_outcome(), TestOutcome::Failed);
        assert_eq!(BepTestStatus::Timeout.to_outcome(), TestOutcome::Failed);
        assert_eq!(
            BepTestStatus::ToolHaltedBeforeTesting.to_outcome(),
            TestOutcome::Cancelled
        );
        assert_eq!(BepTestStatus::RemoteFailure.to_outcome(), TestOutcome::Ignored);
    }
}
