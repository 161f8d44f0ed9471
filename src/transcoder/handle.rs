//! Ownership of one external transcoder process.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, error, info, warn};

use super::error::{SpawnError, TerminateError};
use super::invocation::{InvocationBuilder, OutputSpec, SegmentedOutput, TranscoderCommand};
use crate::config::CameraConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleState {
    Starting,
    Running,
    Stopping,
    Terminated,
    Failed,
}

/// The in-process representative of a spawned transcoder.
///
/// The handle exclusively owns the child and its pipes. It is spawned in its
/// own process group with `kill_on_drop`, so dropping a handle without
/// calling [`TranscoderHandle::terminate`] still releases the process.
#[derive(Debug)]
pub struct TranscoderHandle {
    stream_id: String,
    child: Child,
    pid: Option<u32>,
    state: HandleState,
    started_at: DateTime<Utc>,
    started: Instant,
    exit_status: Option<ExitStatus>,
}

impl TranscoderHandle {
    /// Build the invocation for `output` and launch it.
    ///
    /// Segmented output has its directory prepared first. Launch failures are
    /// returned to the caller, never only logged.
    pub fn spawn(
        stream_id: &str,
        camera: &CameraConfig,
        output: &OutputSpec,
        invocation: &dyn InvocationBuilder,
    ) -> Result<Self, SpawnError> {
        if let OutputSpec::Segmented(segmented) = output {
            prepare_output_dir(segmented)?;
        }
        let command = invocation.build(camera, output);
        Self::spawn_command(stream_id, &command, output.captures_stdout())
    }

    pub fn spawn_command(
        stream_id: &str,
        command: &TranscoderCommand,
        capture_stdout: bool,
    ) -> Result<Self, SpawnError> {
        info!(stream_id, "Starting transcoder: {}", command.display());

        let mut cmd = configure_command(command, capture_stdout);
        let child = cmd.spawn().map_err(|e| {
            error!(
                stream_id,
                "Failed to spawn '{}': {:?} (kind: {:?})",
                command.program,
                e,
                e.kind()
            );
            SpawnError::from_launch(e, &command.program)
        })?;

        let pid = child.id();
        debug!(stream_id, pid, "Transcoder process spawned");

        Ok(Self {
            stream_id: stream_id.to_string(),
            child,
            pid,
            state: HandleState::Starting,
            started_at: Utc::now(),
            started: Instant::now(),
            exit_status: None,
        })
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Exit status for log and error messages.
    pub fn describe_exit(&self) -> String {
        match self.exit_status {
            Some(status) => status.to_string(),
            None => "still running".to_string(),
        }
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    pub fn mark_running(&mut self) {
        if self.state == HandleState::Starting {
            self.state = HandleState::Running;
        }
    }

    /// Non-blocking poll of the process exit status.
    ///
    /// Reaps the process if it has exited, so a stale handle is never
    /// reported as alive.
    pub fn is_alive(&mut self) -> bool {
        if matches!(self.state, HandleState::Terminated | HandleState::Failed) {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                self.record_exit(status);
                false
            }
            Err(e) => {
                warn!(stream_id = %self.stream_id, "Failed to poll transcoder status: {}", e);
                self.state = HandleState::Failed;
                false
            }
        }
    }

    /// Graceful signal, bounded wait, then forceful kill and unconditional reap.
    pub async fn terminate(&mut self, grace_period: Duration) -> Result<(), TerminateError> {
        if !self.is_alive() {
            debug!(
                stream_id = %self.stream_id,
                "Transcoder already exited ({})",
                self.describe_exit()
            );
            return Ok(());
        }

        self.state = HandleState::Stopping;
        info!(stream_id = %self.stream_id, pid = self.pid, "Terminating transcoder");
        self.signal_group(GroupSignal::Terminate);

        match tokio::time::timeout(grace_period, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.record_exit(status);
                info!(
                    stream_id = %self.stream_id,
                    "Transcoder terminated with {}",
                    status
                );
                return Ok(());
            }
            Ok(Err(e)) => {
                warn!(stream_id = %self.stream_id, "Waiting for transcoder failed: {}", e);
            }
            Err(_) => {
                warn!(
                    stream_id = %self.stream_id,
                    pid = self.pid,
                    "Transcoder did not exit within {:?}, killing",
                    grace_period
                );
            }
        }

        self.kill().await
    }

    async fn kill(&mut self) -> Result<(), TerminateError> {
        self.signal_group(GroupSignal::Kill);

        if let Err(source) = self.child.start_kill() {
            // The group signal may already have taken it down
            if !self.is_alive() {
                return Ok(());
            }
            return Err(self.kill_failed(source));
        }

        match self.child.wait().await {
            Ok(status) => {
                self.record_exit(status);
                info!(
                    stream_id = %self.stream_id,
                    "Transcoder killed, {}",
                    status
                );
                Ok(())
            }
            Err(source) => Err(self.kill_failed(source)),
        }
    }

    fn kill_failed(&mut self, source: std::io::Error) -> TerminateError {
        self.state = HandleState::Failed;
        TerminateError {
            stream_id: self.stream_id.clone(),
            pid: self.pid,
            source,
        }
    }

    fn record_exit(&mut self, status: ExitStatus) {
        self.exit_status = Some(status);
        if self.state != HandleState::Failed {
            self.state = HandleState::Terminated;
        }
    }

    #[cfg(unix)]
    fn signal_group(&self, signal: GroupSignal) {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.pid else { return };
        let signal = match signal {
            GroupSignal::Terminate => Signal::SIGTERM,
            GroupSignal::Kill => Signal::SIGKILL,
        };
        // The process group id equals the leader's pid (see `configure_command`)
        if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
            debug!(stream_id = %self.stream_id, "Failed to send {} to group {}: {}", signal, pid, e);
        }
    }

    #[cfg(not(unix))]
    fn signal_group(&mut self, signal: GroupSignal) {
        if signal == GroupSignal::Terminate {
            let _ = self.child.start_kill();
        }
    }
}

impl Drop for TranscoderHandle {
    fn drop(&mut self) {
        if matches!(
            self.state,
            HandleState::Starting | HandleState::Running | HandleState::Stopping
        ) && matches!(self.child.try_wait(), Ok(None))
        {
            warn!(
                stream_id = %self.stream_id,
                pid = self.pid,
                "Transcoder handle dropped while process is running, killing"
            );
            self.signal_group(GroupSignal::Kill);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupSignal {
    Terminate,
    Kill,
}

fn configure_command(command: &TranscoderCommand, capture_stdout: bool) -> Command {
    let mut cmd = Command::new(&command.program);

    // Own process group so signals reach every helper the tool forks
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }

    cmd.args(&command.args);
    if let Some(dir) = &command.working_dir {
        cmd.current_dir(dir);
    }

    cmd.stdin(Stdio::null());
    cmd.stdout(if capture_stdout {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);
    cmd
}

/// Create the segment directory and clear a manifest left by a previous run.
fn prepare_output_dir(output: &SegmentedOutput) -> Result<(), SpawnError> {
    let dir_error = |source: std::io::Error| SpawnError::OutputDir {
        path: output.directory.clone(),
        source,
    };

    std::fs::create_dir_all(&output.directory).map_err(dir_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&output.directory, std::fs::Permissions::from_mode(0o755))
            .map_err(dir_error)?;
    }

    match std::fs::remove_file(&output.manifest) {
        Ok(()) => debug!("Removed stale manifest {}", output.manifest.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(dir_error(e)),
    }

    Ok(())
}
