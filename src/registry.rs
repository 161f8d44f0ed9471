//! Registry of segmented-output transcoders, at most one per stream.
//!
//! Every operation on a stream identifier runs inside that identifier's
//! critical section, so concurrent start/stop calls for one camera are
//! serialized while different cameras proceed independently.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::{CameraConfig, TranscoderConfig};
use crate::error::StreamError;
use crate::transcoder::{InvocationBuilder, OutputSpec, SpawnError, StderrDrain, TranscoderHandle};

/// How long a drain may keep reading after its process is gone.
const DRAIN_SETTLE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamStatus {
    pub running: bool,
    pub output_ready: bool,
}

#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub grace_period: Duration,
    pub liveness_window: Duration,
}

impl From<&TranscoderConfig> for RegistrySettings {
    fn from(config: &TranscoderConfig) -> Self {
        Self {
            grace_period: config.grace_period,
            liveness_window: config.liveness_window,
        }
    }
}

struct Entry {
    handle: TranscoderHandle,
    stderr: Option<StderrDrain>,
}

type Slot = Arc<Mutex<Option<Entry>>>;

pub struct ProcessRegistry {
    invocation: Arc<dyn InvocationBuilder>,
    settings: RegistrySettings,
    slots: std::sync::Mutex<HashMap<String, Slot>>,
}

impl ProcessRegistry {
    pub fn new(invocation: Arc<dyn InvocationBuilder>, settings: RegistrySettings) -> Self {
        Self {
            invocation,
            settings,
            slots: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    /// Start a transcoder for `stream_id` unless a live one already exists.
    ///
    /// `Started` is only returned once the process has survived the liveness
    /// window; a process that dies inside it is reported as a spawn failure.
    pub async fn request_start(
        &self,
        stream_id: &str,
        camera: Option<&CameraConfig>,
        output: &OutputSpec,
    ) -> Result<StartOutcome, StreamError> {
        let camera = camera.ok_or_else(|| StreamError::NotFound(stream_id.to_string()))?;
        if !camera.enabled {
            return Err(StreamError::Disabled(stream_id.to_string()));
        }

        let slot = self.slot(stream_id);
        let mut guard = slot.lock().await;

        if let Some(entry) = guard.as_mut() {
            if entry.handle.is_alive() {
                info!(stream_id, "Transcoder is already running");
                return Ok(StartOutcome::AlreadyRunning);
            }
        }
        if let Some(stale) = guard.take() {
            Self::reap(stale).await;
        }

        let mut handle = TranscoderHandle::spawn(stream_id, camera, output, self.invocation.as_ref())?;
        let stderr = handle
            .take_stderr()
            .map(|stream| StderrDrain::spawn(stream_id, stream));

        tokio::time::sleep(self.settings.liveness_window).await;

        if !handle.is_alive() {
            let status = handle.describe_exit();
            error!(stream_id, "Transcoder exited during startup: {}", status);
            if let Some(drain) = stderr {
                drain.settle(DRAIN_SETTLE).await;
            }
            return Err(SpawnError::ExitedEarly {
                stream_id: stream_id.to_string(),
                status,
            }
            .into());
        }

        handle.mark_running();
        info!(stream_id, pid = handle.pid(), "Started segmented transcoder");
        *guard = Some(Entry { handle, stderr });
        Ok(StartOutcome::Started)
    }

    /// Terminate and forget the transcoder for `stream_id`. No-op if absent.
    pub async fn request_stop(&self, stream_id: &str) {
        let Some(slot) = self.existing_slot(stream_id) else {
            return;
        };
        let mut guard = slot.lock().await;
        let Some(entry) = guard.take() else {
            debug!(stream_id, "No transcoder to stop");
            return;
        };
        self.retire(stream_id, entry).await;
        info!(stream_id, "Stopped segmented transcoder");
    }

    /// Liveness of the entry (reaping it if exited) plus manifest presence.
    pub async fn status(&self, stream_id: &str, output: &OutputSpec) -> StreamStatus {
        let running = match self.existing_slot(stream_id) {
            Some(slot) => {
                let mut guard = slot.lock().await;
                let alive = guard
                    .as_mut()
                    .is_some_and(|entry| entry.handle.is_alive());
                if !alive {
                    if let Some(stale) = guard.take() {
                        Self::reap(stale).await;
                    }
                }
                alive
            }
            None => false,
        };

        let output_ready = output.manifest_path().is_some_and(|path| path.exists());
        StreamStatus {
            running,
            output_ready,
        }
    }

    /// Pid of the live transcoder for `stream_id`, if any.
    pub async fn pid(&self, stream_id: &str) -> Option<u32> {
        let slot = self.existing_slot(stream_id)?;
        let mut guard = slot.lock().await;
        let entry = guard.as_mut()?;
        if entry.handle.is_alive() {
            entry.handle.pid()
        } else {
            None
        }
    }

    /// Stop every registered transcoder concurrently.
    pub async fn stop_all(&self) {
        let ids: Vec<String> = self.lock_slots().keys().cloned().collect();
        if ids.is_empty() {
            return;
        }
        info!("Stopping {} transcoder slot(s)", ids.len());
        futures::future::join_all(ids.iter().map(|id| self.request_stop(id))).await;
    }

    async fn retire(&self, stream_id: &str, mut entry: Entry) {
        if let Err(e) = entry.handle.terminate(self.settings.grace_period).await {
            // The handle is marked Failed and dropped with the entry
            error!(stream_id, "Transcoder could not be terminated: {}", e);
        }
        if let Some(drain) = entry.stderr.take() {
            drain.settle(DRAIN_SETTLE).await;
        }
    }

    async fn reap(mut entry: Entry) {
        let stream_id = entry.handle.stream_id().to_string();
        warn!(
            stream_id = %stream_id,
            "Transcoder exited on its own ({}), removing entry",
            entry.handle.describe_exit()
        );
        if let Some(drain) = entry.stderr.take() {
            drain.settle(DRAIN_SETTLE).await;
        }
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn slot(&self, stream_id: &str) -> Slot {
        Arc::clone(self.lock_slots().entry(stream_id.to_string()).or_default())
    }

    fn existing_slot(&self, stream_id: &str) -> Option<Slot> {
        self.lock_slots().get(stream_id).map(Arc::clone)
    }
}
