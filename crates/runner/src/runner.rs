use std::path::PathBuf;
use std::sync::Arc;

use buildbridge_core::{BuildClientNotifier, Result, TaskProgressParams};
use tokio::process::Command;
use tracing::info;

use crate::command::{render_invocation, ToolCommand};
use crate::process::ToolProcess;

/// Launches the external build tool.
///
/// Holds the per-workspace configuration (binary, workspace root, flags that
/// every invocation carries); each call to [`BuildToolRunner::spawn`] starts
/// one independent process.
#[derive(Debug, Clone)]
pub struct BuildToolRunner {
    binary: PathBuf,
    workspace_root: Option<PathBuf>,
    base_flags: Vec<String>,
}

impl BuildToolRunner {
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            workspace_root: None,
            base_flags: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    /// Flags applied to every invocation, before per-invocation flags
    #[must_use]
    pub fn with_base_flags(mut self, flags: impl IntoIterator<Item = String>) -> Self {
        self.base_flags.extend(flags);
        self
    }

    /// Spawn one invocation, echoing the command line to the notifier
    pub async fn spawn(
        &self,
        tool_command: ToolCommand,
        notifier: Option<Arc<dyn BuildClientNotifier>>,
        origin_id: Option<&str>,
    ) -> Result<ToolProcess> {
        let args = tool_command.to_args(&self.base_flags);
        let rendered = render_invocation(&self.binary, &args, tool_command.environment());
        info!(invocation = %rendered, "invoking build tool");
        if let Some(notifier) = &notifier {
            notifier
                .on_task_progress(TaskProgressParams {
                    task_id: None,
                    origin_id: origin_id.map(str::to_string),
                    message: format!("Invoking: {rendered}"),
                })
                .await;
        }

        let mut command = Command::new(&self.binary);
        command.args(&args);
        command.envs(tool_command.environment().clone().into_inner());
        if let Some(root) = &self.workspace_root {
            command.current_dir(root);
        }

        ToolProcess::spawn(command, notifier)
    }
}
