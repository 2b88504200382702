//! Ties the runner, transport, and interpreter together for one invocation.
//!
//! The orchestrator owns the whole lifecycle: set up the event stream, spawn
//! the tool pointed at it, consume the stream while the process runs, signal
//! the consumer when the process exits, and fold everything into one result.
//! Each invocation picks its stream kind: a tailed file by default, or a unix
//! socket the tool connects to. A lost event stream degrades to the process
//! exit code; it never fails a run that the tool itself completed.

use std::sync::Arc;

use buildbridge_core::{
    BuildClientNotifier, DiagnosticsExtractor, EnvironmentVariables, Error, ExitStatus,
    NullDiagnostics, Result, TargetId, BUILD_COMMAND, EVENT_FILE_PREFIX, TEST_COMMAND,
};
use buildbridge_runner::{BuildToolRunner, EventStreamDestination, ProcessResult, ToolCommand};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::interpreter::BuildEventInterpreter;
use crate::output_index::OutputIndexSnapshot;
use crate::paths::{LocalPathResolver, PathResolver};
use crate::transport::{EventTransport, FileTailTransport, SocketTransport, TransportStats};

/// How the tool hands its event stream to the orchestrator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventStreamKind {
    /// The tool appends frames to a file the orchestrator tails
    #[default]
    File,
    /// The tool connects to a unix socket the orchestrator listens on
    Socket,
}

/// Everything one invocation needs beyond the per-workspace runner config
#[derive(Debug, Clone)]
pub struct InvocationParams {
    verb: String,
    targets: Vec<String>,
    flags: Vec<String>,
    environment: EnvironmentVariables,
    origin_id: Option<String>,
    target: Option<TargetId>,
    artifact_suffixes: Option<Vec<String>>,
    event_stream: EventStreamKind,
}

impl InvocationParams {
    #[must_use]
    pub fn build(targets: impl IntoIterator<Item = String>) -> Self {
        Self::with_verb(BUILD_COMMAND, targets)
    }

    #[must_use]
    pub fn test(targets: impl IntoIterator<Item = String>) -> Self {
        Self::with_verb(TEST_COMMAND, targets)
    }

    fn with_verb(verb: &str, targets: impl IntoIterator<Item = String>) -> Self {
        Self {
            verb: verb.to_string(),
            targets: targets.into_iter().collect(),
            flags: Vec::new(),
            environment: EnvironmentVariables::new(),
            origin_id: None,
            target: None,
            artifact_suffixes: None,
            event_stream: EventStreamKind::default(),
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: impl IntoIterator<Item = String>) -> Self {
        self.flags.extend(flags);
        self
    }

    #[must_use]
    pub fn with_environment(mut self, environment: EnvironmentVariables) -> Self {
        self.environment.merge(environment);
        self
    }

    /// Correlate every notification of this run with a client request
    #[must_use]
    pub fn with_origin_id(mut self, origin_id: impl Into<String>) -> Self {
        self.origin_id = Some(origin_id.into());
        self
    }

    /// The single in-scope target, when the client asked for one
    #[must_use]
    pub fn with_target(mut self, target: TargetId) -> Self {
        self.target = Some(target);
        self
    }

    #[must_use]
    pub fn with_artifact_suffixes(mut self, suffixes: Vec<String>) -> Self {
        self.artifact_suffixes = Some(suffixes);
        self
    }

    /// Pick how events travel from the tool for this invocation
    #[must_use]
    pub fn with_event_stream(mut self, kind: EventStreamKind) -> Self {
        self.event_stream = kind;
        self
    }
}

/// Keeps the stream's backing filesystem entry alive for the whole run
enum StreamGuard {
    File(tempfile::NamedTempFile),
    Socket(tempfile::TempDir),
}

/// Outcome of one orchestrated invocation that ran to completion
#[derive(Debug)]
pub struct CompilationResult {
    /// Terminal classification; the event stream's own verdict wins over
    /// the raw process exit code
    pub status: ExitStatus,
    pub process: ProcessResult,
    pub transport: TransportStats,
    pub outputs: OutputIndexSnapshot,
}

/// Runs build/test invocations end to end
pub struct CompilationOrchestrator {
    runner: BuildToolRunner,
    notifier: Arc<dyn BuildClientNotifier>,
    diagnostics: Arc<dyn DiagnosticsExtractor>,
    paths: Arc<dyn PathResolver>,
}

impl CompilationOrchestrator {
    #[must_use]
    pub fn new(runner: BuildToolRunner, notifier: Arc<dyn BuildClientNotifier>) -> Self {
        Self {
            runner,
            notifier,
            diagnostics: Arc::new(NullDiagnostics),
            paths: Arc::new(LocalPathResolver),
        }
    }

    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticsExtractor>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    #[must_use]
    pub fn with_path_resolver(mut self, paths: Arc<dyn PathResolver>) -> Self {
        self.paths = paths;
        self
    }

    /// Run one invocation to completion.
    ///
    /// `cancel` flipping to true kills the tool process, tears down the
    /// event stream, and returns [`Error::Cancelled`]; a cancelled caller
    /// never sees a [`CompilationResult`].
    pub async fn run(
        &self,
        params: InvocationParams,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<CompilationResult> {
        let (finish_tx, finish_rx) = watch::channel(false);

        // The file or socket must exist before the consumer opens it and
        // before the tool receives its path
        let (destination, mut transport, _guard): (
            EventStreamDestination,
            Box<dyn EventTransport>,
            StreamGuard,
        ) = match params.event_stream {
            EventStreamKind::File => {
                let event_file = tempfile::Builder::new()
                    .prefix(EVENT_FILE_PREFIX)
                    .suffix(".jsonl")
                    .tempfile()
                    .map_err(|e| Error::transport(format!("cannot create event file: {e}")))?;
                let path = event_file.path().to_path_buf();
                debug!(path = %path.display(), "event file ready");
                (
                    EventStreamDestination::File(path.clone()),
                    Box::new(FileTailTransport::new(path, finish_rx)),
                    StreamGuard::File(event_file),
                )
            }
            EventStreamKind::Socket => {
                let dir = tempfile::Builder::new()
                    .prefix(EVENT_FILE_PREFIX)
                    .tempdir()
                    .map_err(|e| Error::transport(format!("cannot create socket dir: {e}")))?;
                let path = dir.path().join("events.sock");
                let transport = SocketTransport::bind(&path, finish_rx)?;
                debug!(path = %path.display(), "event socket ready");
                (
                    EventStreamDestination::Socket(path),
                    Box::new(transport),
                    StreamGuard::Socket(dir),
                )
            }
        };

        let mut interpreter = BuildEventInterpreter::new(
            self.notifier.clone(),
            self.diagnostics.clone(),
            self.paths.clone(),
            params.origin_id.clone(),
            params.target.clone(),
        );
        if let Some(suffixes) = params.artifact_suffixes.clone() {
            interpreter = interpreter.with_artifact_suffixes(suffixes);
        }

        let command = ToolCommand::new(&params.verb)
            .with_flags(params.flags.clone())
            .with_targets(params.targets.clone())
            .with_environment(params.environment.clone())
            .with_event_stream(destination);

        let process = self
            .runner
            .spawn(command, Some(self.notifier.clone()), params.origin_id.as_deref())
            .await?;

        let consumer = tokio::spawn(async move {
            let stats = transport.consume(&mut interpreter).await;
            (interpreter, stats)
        });

        let (process_result, cancelled) = process.wait_cancellable(&mut cancel).await?;
        // The tool wrote everything it ever will; this also releases a
        // socket consumer the tool never connected to
        let _ = finish_tx.send(true);

        let (interpreter, stats) = consumer.await.map_err(|e| Error::Internal {
            message: format!("event consumer task failed: {e}"),
        })?;
        let transport_stats = match stats {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "event stream was lost; falling back to the exit code");
                TransportStats::default()
            }
        };

        if cancelled {
            return Err(Error::Cancelled);
        }

        Ok(CompilationResult {
            status: interpreter
                .terminal_status()
                .unwrap_or(process_result.exit),
            process: process_result,
            transport: transport_stats,
            outputs: interpreter.into_snapshot(),
        })
    }
}
