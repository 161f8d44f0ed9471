//! Live relay: a dedicated transcoder per consumer, stdout streamed in chunks.
//!
//! A session ends on the first of consumer disconnect, upstream end of
//! stream, a relay error or a write failure. Teardown then stops the stderr
//! drain, terminates the process with a grace period and closes the
//! consumer connection, in that order and at most once.

pub mod session;
pub mod transport;

pub use transport::{CloseReason, ConsumerEvents, ConsumerSink, TransportError};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::{CameraConfig, RelayConfig, TranscoderConfig};
use crate::transcoder::{InvocationBuilder, OutputSpec, TranscoderHandle};
use session::RelaySession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Camera unknown or disabled; no process was spawned.
    Rejected,
    SpawnFailed,
    ConsumerDisconnected,
    UpstreamEnded,
    ConsumerWriteFailed,
    UpstreamFailed,
}

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub chunk_size: usize,
    pub grace_period: Duration,
    /// Upstream ending sooner than this after spawn counts as a failure.
    pub liveness_window: Duration,
}

impl RelaySettings {
    pub fn from_config(relay: &RelayConfig, transcoder: &TranscoderConfig) -> Self {
        Self {
            chunk_size: relay.chunk_size,
            grace_period: transcoder.grace_period,
            liveness_window: transcoder.liveness_window,
        }
    }
}

type SessionCounts = Arc<Mutex<HashMap<String, usize>>>;

/// Counts a session for its stream while alive.
struct ActiveSession {
    stream_id: String,
    counts: SessionCounts,
}

impl ActiveSession {
    fn enter(stream_id: &str, counts: &SessionCounts) -> Self {
        *lock_counts(counts).entry(stream_id.to_string()).or_default() += 1;
        Self {
            stream_id: stream_id.to_string(),
            counts: Arc::clone(counts),
        }
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        let mut counts = lock_counts(&self.counts);
        if let Some(count) = counts.get_mut(&self.stream_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(&self.stream_id);
            }
        }
    }
}

fn lock_counts(counts: &SessionCounts) -> std::sync::MutexGuard<'_, HashMap<String, usize>> {
    counts.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct LiveRelayPublisher {
    invocation: Arc<dyn InvocationBuilder>,
    settings: RelaySettings,
    sessions: SessionCounts,
}

impl LiveRelayPublisher {
    pub fn new(invocation: Arc<dyn InvocationBuilder>, settings: RelaySettings) -> Self {
        Self {
            invocation,
            settings,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Relay sessions currently open for `stream_id`.
    pub fn active_sessions(&self, stream_id: &str) -> usize {
        lock_counts(&self.sessions)
            .get(stream_id)
            .copied()
            .unwrap_or(0)
    }

    /// Serve one consumer until the session ends. The consumer connection is
    /// always closed by the time this returns.
    pub async fn serve<S, E>(
        &self,
        stream_id: &str,
        camera: Option<&CameraConfig>,
        mut sink: S,
        events: E,
    ) -> SessionOutcome
    where
        S: ConsumerSink,
        E: ConsumerEvents,
    {
        let camera = match camera {
            Some(camera) if camera.enabled => camera,
            Some(_) => {
                warn!(stream_id, "Rejecting relay consumer: camera is disabled");
                close_quietly(&mut sink, CloseReason::PolicyViolation("Camera not found or disabled".into())).await;
                return SessionOutcome::Rejected;
            }
            None => {
                warn!(stream_id, "Rejecting relay consumer: camera not found");
                close_quietly(&mut sink, CloseReason::PolicyViolation("Camera not found or disabled".into())).await;
                return SessionOutcome::Rejected;
            }
        };

        let mut handle = match TranscoderHandle::spawn(
            stream_id,
            camera,
            &OutputSpec::Relay,
            self.invocation.as_ref(),
        ) {
            Ok(handle) => handle,
            Err(e) => {
                error!(stream_id, "Failed to start relay transcoder: {}", e);
                close_quietly(
                    &mut sink,
                    CloseReason::InternalError("Failed to start video stream".into()),
                )
                .await;
                return SessionOutcome::SpawnFailed;
            }
        };
        handle.mark_running();
        info!(stream_id, pid = handle.pid(), "Started relay transcoder");

        let _active = ActiveSession::enter(stream_id, &self.sessions);
        RelaySession::new(stream_id, handle, self.settings.clone())
            .run(sink, events)
            .await
    }
}

async fn close_quietly<S: ConsumerSink>(sink: &mut S, reason: CloseReason) {
    match sink.close(reason).await {
        Ok(()) | Err(TransportError::Closed) => {}
        Err(e) => warn!("Error closing consumer connection: {}", e),
    }
}
