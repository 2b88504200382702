//! Event ingestion from the running tool process.
//!
//! Two transports carry the same newline-delimited frames: a file the tool
//! appends to while running, and a unix socket the tool connects to. Either
//! way the consumer is single and ordered; a frame that fails to decode is
//! counted and skipped, never fatal, so one corrupt line cannot take down
//! the rest of the stream.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use buildbridge_core::{Error, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::event::BuildEventRecord;
use crate::interpreter::BuildEventInterpreter;

/// How long the file tail sleeps at end-of-file before re-polling
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Counters for one consumed stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub events_delivered: u64,
    pub frames_skipped: u64,
}

/// Source of ordered event frames for exactly one invocation
#[async_trait]
pub trait EventTransport: Send {
    /// Consume the stream to completion, feeding every decodable frame to
    /// the interpreter in arrival order
    async fn consume(&mut self, interpreter: &mut BuildEventInterpreter) -> Result<TransportStats>;
}

async fn dispatch_frame(
    frame: &str,
    interpreter: &mut BuildEventInterpreter,
    stats: &mut TransportStats,
) {
    match BuildEventRecord::decode_line(frame) {
        Ok(event) => {
            interpreter.handle_event(event).await;
            stats.events_delivered += 1;
        }
        Err(e) => {
            warn!(error = %e, "skipping undecodable event frame");
            stats.frames_skipped += 1;
        }
    }
}

/// Tails the event file the tool appends to while it runs.
///
/// The file grows concurrently with reading, so end-of-file is not
/// end-of-stream: only complete lines are dispatched, a trailing partial
/// line stays buffered until its newline arrives, and end-of-file after the
/// finish signal has fired ends the stream.
pub struct FileTailTransport {
    path: PathBuf,
    finished: watch::Receiver<bool>,
}

impl FileTailTransport {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, finished: watch::Receiver<bool>) -> Self {
        Self {
            path: path.into(),
            finished,
        }
    }
}

#[async_trait]
impl EventTransport for FileTailTransport {
    async fn consume(&mut self, interpreter: &mut BuildEventInterpreter) -> Result<TransportStats> {
        let file = tokio::fs::File::open(&self.path).await.map_err(|e| {
            Error::transport(format!(
                "cannot open event file {}: {e}",
                self.path.display()
            ))
        })?;
        let mut reader = BufReader::new(file);
        let mut stats = TransportStats::default();
        let mut partial = String::new();
        let mut chunk = Vec::new();
        let mut done = *self.finished.borrow();

        loop {
            chunk.clear();
            let n = reader
                .read_until(b'\n', &mut chunk)
                .await
                .map_err(|e| Error::transport(format!("event file read failed: {e}")))?;
            if n == 0 {
                if done {
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                    changed = self.finished.changed() => {
                        // Sender gone counts as finished too
                        done = changed.is_err() || *self.finished.borrow();
                    }
                }
                continue;
            }

            // Non-UTF-8 bytes become replacement characters; the frame then
            // fails to decode and is counted, not fatal
            partial.push_str(&String::from_utf8_lossy(&chunk));
            if !partial.ends_with('\n') {
                // Mid-write; the rest of the line is still coming
                continue;
            }
            let frame = partial.trim_end();
            if !frame.is_empty() {
                dispatch_frame(frame, interpreter, &mut stats).await;
            }
            partial.clear();
        }

        // A writer killed mid-line leaves an unterminated tail frame
        let frame = partial.trim();
        if !frame.is_empty() {
            dispatch_frame(frame, interpreter, &mut stats).await;
        }

        debug!(
            events = stats.events_delivered,
            skipped = stats.frames_skipped,
            "event file drained"
        );
        Ok(stats)
    }
}

/// Accepts one connection from the tool on a unix socket and reads frames
/// until the peer closes.
///
/// Binding happens at construction so the socket path exists before the tool
/// is spawned with it. The finish signal unblocks a pending accept when the
/// tool exits without ever connecting.
pub struct SocketTransport {
    listener: UnixListener,
    path: PathBuf,
    finished: watch::Receiver<bool>,
}

impl SocketTransport {
    pub fn bind(path: impl Into<PathBuf>, finished: watch::Receiver<bool>) -> Result<Self> {
        let path = path.into();
        let listener = UnixListener::bind(&path).map_err(|e| {
            Error::transport(format!("cannot bind event socket {}: {e}", path.display()))
        })?;
        Ok(Self {
            listener,
            path,
            finished,
        })
    }

    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.path
    }
}

/// Resolves once the finish signal is true or its sender is gone
async fn finish_fired(finished: &mut watch::Receiver<bool>) {
    let _ = finished.wait_for(|done| *done).await;
}

#[async_trait]
impl EventTransport for SocketTransport {
    async fn consume(&mut self, interpreter: &mut BuildEventInterpreter) -> Result<TransportStats> {
        let mut stats = TransportStats::default();
        let accepted = tokio::select! {
            result = self.listener.accept() => Some(
                result.map_err(|e| {
                    Error::transport(format!("event socket accept failed: {e}"))
                })?,
            ),
            () = finish_fired(&mut self.finished) => None,
        };
        let Some((stream, _)) = accepted else {
            debug!(path = %self.path.display(), "no event producer connected");
            return Ok(stats);
        };
        debug!(path = %self.path.display(), "event producer connected");

        let mut reader = BufReader::new(stream);
        let mut chunk = Vec::new();
        loop {
            chunk.clear();
            let n = reader
                .read_until(b'\n', &mut chunk)
                .await
                .map_err(|e| Error::transport(format!("event socket read failed: {e}")))?;
            if n == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&chunk);
            let frame = line.trim();
            if frame.is_empty() {
                continue;
            }
            dispatch_frame(frame, interpreter, &mut stats).await;
        }

        debug!(
            events = stats.events_delivered,
            skipped = stats.frames_skipped,
            "event socket closed"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::LocalPathResolver;
    use buildbridge_core::testing::{RecordingDiagnostics, RecordingNotifier};
    use buildbridge_core::ExitStatus;
    use std::io::Write;
    use std::sync::Arc;

    fn interpreter(notifier: Arc<RecordingNotifier>) -> BuildEventInterpreter {
        BuildEventInterpreter::new(
            notifier,
            Arc::new(RecordingDiagnostics::new()),
            Arc::new(LocalPathResolver),
            None,
            None,
        )
    }

    fn frames() -> String {
        let events = [
            BuildEventRecord::Started {
                uuid: "build-1".to_string(),
                command: "build".to_string(),
                start_time_millis: 1,
            },
            BuildEventRecord::Progress {
                stderr: "hello".to_string(),
            },
            BuildEventRecord::Progress {
                stderr: "world".to_string(),
            },
            BuildEventRecord::Finished { exit_code: 0 },
        ];
        let mut out = String::new();
        for event in &events {
            out.push_str(&event.to_json_line().expect("encode"));
        }
        out
    }

    #[tokio::test]
    async fn file_tail_reads_to_eof_after_finish_signal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, frames()).expect("write events");

        let (tx, rx) = watch::channel(true);
        let notifier = Arc::new(RecordingNotifier::new());
        let mut interp = interpreter(notifier.clone());
        let mut transport = FileTailTransport::new(&path, rx);
        let stats = transport.consume(&mut interp).await.expect("consume");
        drop(tx);

        assert_eq!(stats.events_delivered, 4);
        assert_eq!(stats.frames_skipped, 0);
        assert_eq!(notifier.progress_messages(), vec!["hello", "world"]);
        assert_eq!(interp.terminal_status(), Some(ExitStatus::Ok));
    }

    #[tokio::test]
    async fn file_tail_follows_a_growing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.jsonl");
        let all = frames();
        let (head, rest) = all.split_at(all.find('\n').expect("newline") + 1);
        std::fs::write(&path, head).expect("write head");

        let (tx, rx) = watch::channel(false);
        let notifier = Arc::new(RecordingNotifier::new());
        let mut interp = interpreter(notifier.clone());
        let mut transport = FileTailTransport::new(&path, rx);

        let rest = rest.to_string();
        let append_path = path.clone();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            std::fs::OpenOptions::new()
                .append(true)
                .open(&append_path)
                .and_then(|mut file| file.write_all(rest.as_bytes()))
                .expect("append rest");
            tx.send(true).expect("signal finish");
        });

        let stats = transport.consume(&mut interp).await.expect("consume");
        writer.await.expect("writer task");

        assert_eq!(stats.events_delivered, 4);
        assert_eq!(notifier.progress_messages(), vec!["hello", "world"]);
    }

    #[tokio::test]
    async fn malformed_frame_is_skipped_and_later_frames_survive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.jsonl");
        let all = frames();
        let mut lines: Vec<&str> = all.lines().collect();
        lines.insert(2, "{this is not an event");
        std::fs::write(&path, lines.join("\n") + "\n").expect("write events");

        let (_tx, rx) = watch::channel(true);
        let notifier = Arc::new(RecordingNotifier::new());
        let mut interp = interpreter(notifier.clone());
        let mut transport = FileTailTransport::new(&path, rx);
        let stats = transport.consume(&mut interp).await.expect("consume");

        assert_eq!(stats.events_delivered, 4);
        assert_eq!(stats.frames_skipped, 1);
        assert_eq!(notifier.progress_messages(), vec!["hello", "world"]);
        assert_eq!(interp.terminal_status(), Some(ExitStatus::Ok));
    }

    #[tokio::test]
    async fn non_utf8_frame_is_skipped_like_any_other() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.jsonl");
        let all = frames();
        let mut lines: Vec<&[u8]> = all.as_bytes().split(|b| *b == b'\n').collect();
        lines.insert(2, b"\xff\xfe\x80");
        std::fs::write(&path, lines.join(&b"\n"[..])).expect("write events");

        let (_tx, rx) = watch::channel(true);
        let notifier = Arc::new(RecordingNotifier::new());
        let mut interp = interpreter(notifier.clone());
        let mut transport = FileTailTransport::new(&path, rx);
        let stats = transport.consume(&mut interp).await.expect("consume");

        assert_eq!(stats.events_delivered, 4);
        assert_eq!(stats.frames_skipped, 1);
        // Frames after the binary garbage still reached the interpreter
        assert_eq!(interp.terminal_status(), Some(ExitStatus::Ok));
    }

    #[tokio::test]
    async fn unterminated_tail_frame_is_still_attempted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.jsonl");
        let all = frames();
        // Drop the final newline: the last frame arrives unterminated
        std::fs::write(&path, all.trim_end()).expect("write events");

        let (_tx, rx) = watch::channel(true);
        let notifier = Arc::new(RecordingNotifier::new());
        let mut interp = interpreter(notifier);
        let mut transport = FileTailTransport::new(&path, rx);
        let stats = transport.consume(&mut interp).await.expect("consume");

        assert_eq!(stats.events_delivered, 4);
        assert_eq!(interp.terminal_status(), Some(ExitStatus::Ok));
    }

    #[tokio::test]
    async fn missing_event_file_is_a_transport_error() {
        let (_tx, rx) = watch::channel(true);
        let notifier = Arc::new(RecordingNotifier::new());
        let mut interp = interpreter(notifier);
        let mut transport = FileTailTransport::new("/nonexistent/events.jsonl", rx);
        let err = transport.consume(&mut interp).await.expect_err("must fail");
        assert!(matches!(err, Error::Transport { .. }));
    }

    #[tokio::test]
    async fn socket_reads_frames_until_peer_closes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.sock");
        let (_finish_tx, finish_rx) = watch::channel(false);
        let mut transport = SocketTransport::bind(&path, finish_rx).expect("bind");

        let producer_path = path.clone();
        let producer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            let mut stream = tokio::net::UnixStream::connect(&producer_path)
                .await
                .expect("connect");
            stream
                .write_all(frames().as_bytes())
                .await
                .expect("write frames");
        });

        let notifier = Arc::new(RecordingNotifier::new());
        let mut interp = interpreter(notifier.clone());
        let stats = transport.consume(&mut interp).await.expect("consume");
        producer.await.expect("producer task");

        assert_eq!(stats.events_delivered, 4);
        assert_eq!(stats.frames_skipped, 0);
        assert_eq!(notifier.progress_messages(), vec!["hello", "world"]);
        assert_eq!(interp.terminal_status(), Some(ExitStatus::Ok));
    }

    #[tokio::test]
    async fn socket_finish_signal_unblocks_a_pending_accept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("events.sock");
        let (finish_tx, finish_rx) = watch::channel(false);
        let mut transport = SocketTransport::bind(&path, finish_rx).expect("bind");

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = finish_tx.send(true);
        });

        let notifier = Arc::new(RecordingNotifier::new());
        let mut interp = interpreter(notifier);
        let stats = transport.consume(&mut interp).await.expect("consume");
        assert_eq!(stats, TransportStats::default());
    }
}
