use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, info, trace, warn};

use super::transport::{CloseReason, ConsumerEvents, ConsumerSink, TransportError};
use super::{RelaySettings, SessionOutcome};
use crate::transcoder::{StderrDrain, TranscoderHandle};

/// Grace for stderr to deliver its last lines once the process has exited.
const EXITED_DRAIN_SETTLE: Duration = Duration::from_millis(200);

#[derive(Debug, Default, Clone, Copy)]
struct RelayStats {
    chunks: u64,
    bytes: u64,
}

#[derive(Debug)]
enum RelayEnd {
    UpstreamEnded(RelayStats),
    UpstreamFailed(std::io::Error),
    ConsumerDisconnected,
    WriteFailed(TransportError),
}

/// One consumer connection plus its dedicated transcoder.
pub(crate) struct RelaySession {
    stream_id: String,
    handle: TranscoderHandle,
    settings: RelaySettings,
    torn_down: bool,
}

impl RelaySession {
    pub(crate) fn new(stream_id: &str, handle: TranscoderHandle, settings: RelaySettings) -> Self {
        Self {
            stream_id: stream_id.to_string(),
            handle,
            settings,
            torn_down: false,
        }
    }

    /// Relay until the first termination trigger, then tear down exactly once.
    pub(crate) async fn run<S, E>(mut self, mut sink: S, mut events: E) -> SessionOutcome
    where
        S: ConsumerSink,
        E: ConsumerEvents,
    {
        let stderr = self
            .handle
            .take_stderr()
            .map(|stream| StderrDrain::spawn(&self.stream_id, stream));

        let Some(mut stdout) = self.handle.take_stdout() else {
            error!(stream_id = %self.stream_id, "Transcoder stdout was not captured");
            self.teardown(
                &mut sink,
                stderr,
                CloseReason::InternalError("Transcoder output unavailable".into()),
                false,
            )
            .await;
            return SessionOutcome::UpstreamFailed;
        };

        let end = tokio::select! {
            end = relay_chunks(&self.stream_id, &mut stdout, &mut sink, self.settings.chunk_size) => end,
            _ = events.disconnected() => RelayEnd::ConsumerDisconnected,
        };

        let upstream_ended = matches!(end, RelayEnd::UpstreamEnded(_));
        let (outcome, reason) = self.classify(end);
        self.teardown(&mut sink, stderr, reason, upstream_ended).await;
        drop(stdout);
        outcome
    }

    fn classify(&self, end: RelayEnd) -> (SessionOutcome, CloseReason) {
        let stream_id = &self.stream_id;
        match end {
            RelayEnd::ConsumerDisconnected => {
                info!(stream_id = %stream_id, "Consumer disconnected");
                (SessionOutcome::ConsumerDisconnected, CloseReason::Normal)
            }
            RelayEnd::WriteFailed(e) => {
                info!(stream_id = %stream_id, "Consumer write failed: {}", e);
                (SessionOutcome::ConsumerWriteFailed, CloseReason::Normal)
            }
            RelayEnd::UpstreamFailed(e) => {
                error!(stream_id = %stream_id, "Error reading transcoder output: {}", e);
                (
                    SessionOutcome::UpstreamFailed,
                    CloseReason::InternalError("Transcoder output failed".into()),
                )
            }
            RelayEnd::UpstreamEnded(stats) if self.handle.uptime() < self.settings.liveness_window => {
                error!(
                    stream_id = %stream_id,
                    "Transcoder output ended during startup after {} bytes",
                    stats.bytes
                );
                (
                    SessionOutcome::UpstreamFailed,
                    CloseReason::InternalError("Transcoder exited during startup".into()),
                )
            }
            RelayEnd::UpstreamEnded(stats) => {
                info!(
                    stream_id = %stream_id,
                    chunks = stats.chunks,
                    bytes = stats.bytes,
                    "Transcoder output ended, transcoder might have exited"
                );
                (SessionOutcome::UpstreamEnded, CloseReason::Normal)
            }
        }
    }

    /// Stop stderr, stop the process, close the consumer. Runs at most once.
    ///
    /// When stdout has ended the process is usually on its way out, so its
    /// last stderr lines are given a moment to arrive before the drain stops.
    pub(super) async fn teardown<S: ConsumerSink>(
        &mut self,
        sink: &mut S,
        stderr: Option<StderrDrain>,
        reason: CloseReason,
        upstream_ended: bool,
    ) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Some(drain) = stderr {
            let exit = if upstream_ended || !self.handle.is_alive() {
                drain.settle(EXITED_DRAIN_SETTLE).await
            } else {
                drain.cancel().await
            };
            debug!(stream_id = %self.stream_id, "stderr drain stopped: {:?}", exit);
        }

        if self.handle.is_alive() {
            info!(
                stream_id = %self.stream_id,
                pid = self.handle.pid(),
                "Transcoder still running, terminating"
            );
            if let Err(e) = self.handle.terminate(self.settings.grace_period).await {
                error!(stream_id = %self.stream_id, "Transcoder could not be terminated: {}", e);
            }
        } else {
            info!(
                stream_id = %self.stream_id,
                "Transcoder already exited ({})",
                self.handle.describe_exit()
            );
        }

        match sink.close(reason).await {
            Ok(()) => debug!(stream_id = %self.stream_id, "Consumer connection closed"),
            Err(TransportError::Closed) => {
                debug!(stream_id = %self.stream_id, "Consumer connection already closed")
            }
            Err(e) => warn!(stream_id = %self.stream_id, "Error closing consumer connection: {}", e),
        }
    }
}

impl Drop for RelaySession {
    fn drop(&mut self) {
        if !self.torn_down {
            // The handle's own drop kills the process group
            warn!(stream_id = %self.stream_id, "Relay session dropped before teardown");
        }
    }
}

async fn relay_chunks<R, S>(
    stream_id: &str,
    stdout: &mut R,
    sink: &mut S,
    chunk_size: usize,
) -> RelayEnd
where
    R: AsyncRead + Unpin,
    S: ConsumerSink,
{
    let mut buf = vec![0u8; chunk_size];
    let mut stats = RelayStats::default();

    loop {
        let n = match stdout.read(&mut buf).await {
            Ok(0) => return RelayEnd::UpstreamEnded(stats),
            Ok(n) => n,
            Err(e) => return RelayEnd::UpstreamFailed(e),
        };

        trace!(stream_id, bytes = n, "Relaying chunk");
        if let Err(e) = sink.send_chunk(buf[..n].to_vec()).await {
            return RelayEnd::WriteFailed(e);
        }
        stats.chunks += 1;
        stats.bytes += n as u64;
    }
}
