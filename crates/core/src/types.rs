use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

/// Correlation identifier for a unit of work reported to the client.
///
/// Task ids form a forest: each id optionally lists its parent ids, which is
/// how test cases nest under test suites and suites under the per-target
/// test task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
}

impl TaskId {
    /// Create a root task id from an externally supplied identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parents: Vec::new(),
        }
    }

    /// Create a fresh task id nested under `parent`
    #[must_use]
    pub fn child_of(parent: &TaskId) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            parents: vec![parent.id.clone()],
        }
    }

    /// Create a fresh task id with no parent
    #[must_use]
    pub fn fresh() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Canonical identifier of a build target as the client supplies it,
/// e.g. `@//src/server:server` or `//src/server:server`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetId(String);

impl TargetId {
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a label emitted by the build tool refers to this target.
    ///
    /// The tool emits labels without the leading repository marker that
    /// client identifiers may carry (`//pkg:name` vs `@//pkg:name` vs
    /// `@@//pkg:name`), and the exact form has changed across tool versions.
    /// Both sides are therefore compared with leading `@` markers stripped.
    /// This is the single place that normalization lives; override here if
    /// the tool's label format changes again.
    #[must_use]
    pub fn matches_label(&self, emitted: &str) -> bool {
        self.0.trim_start_matches('@') == emitted.trim_start_matches('@')
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Outcome of a single test case or suite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestOutcome {
    Passed,
    Failed,
    Skipped,
    Ignored,
    Cancelled,
}

/// Terminal classification of one invocation, mirrored to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitStatus {
    Ok,
    Error,
    Cancelled,
}

impl ExitStatus {
    /// Map the external tool's numeric exit code. Zero is success, eight is
    /// the tool's interrupted code, everything else is a failure.
    #[must_use]
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            0 => ExitStatus::Ok,
            8 => ExitStatus::Cancelled,
            _ => ExitStatus::Error,
        }
    }

    #[must_use]
    pub fn is_ok(self) -> bool {
        matches!(self, ExitStatus::Ok)
    }
}

/// Wrapper type for environment variables handed to the external tool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariables(HashMap<String, String>);

impl EnvironmentVariables {
    /// Create a new empty environment
    #[must_use]
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Create from an existing HashMap
    #[must_use]
    pub fn from_map(map: HashMap<String, String>) -> Self {
        Self(map)
    }

    /// Insert a variable, returning the previous value if any
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Merge another set of environment variables into this one.
    /// Variables in `other` overwrite existing ones.
    pub fn merge(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert to the inner HashMap
    #[must_use]
    pub fn into_inner(self) -> HashMap<String, String> {
        self.0
    }
}

impl Deref for EnvironmentVariables {
    type Target = HashMap<String, String>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for EnvironmentVariables {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<HashMap<String, String>> for EnvironmentVariables {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}

/// Human-readable duration for client log lines ("2m 3s", "1.5s", "250ms")
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1_000 {
        return format!("{millis}ms");
    }
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        return format!("{secs:.1}s");
    }
    let minutes = duration.as_secs() / 60;
    let rest = duration.as_secs() % 60;
    format!("{minutes}m {rest}s")
}
