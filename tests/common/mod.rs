//! Common test utilities and helpers

#![allow(dead_code)]

use async_trait::async_trait;
use camproxy::config::{CameraConfig, ProxyConfig};
use camproxy::relay::{CloseReason, ConsumerEvents, ConsumerSink, TransportError};
use camproxy::transcoder::{
    InvocationBuilder, OutputSpec, TranscoderCommand, TranscoderCommandBuilder,
};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// Runs a shell script in place of the real transcoder.
///
/// `{manifest}` in the script is replaced with the segmented manifest path
/// and `{pidfile}` with [`ShellInvocation::pid_file`].
#[derive(Clone)]
pub struct ShellInvocation {
    script: String,
    pid_file: Option<PathBuf>,
}

impl ShellInvocation {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            pid_file: None,
        }
    }

    pub fn with_pid_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.pid_file = Some(path.into());
        self
    }
}

impl InvocationBuilder for ShellInvocation {
    fn build(&self, _camera: &CameraConfig, output: &OutputSpec) -> TranscoderCommand {
        let mut script = self.script.clone();
        if let Some(manifest) = output.manifest_path() {
            script = script.replace("{manifest}", &manifest.display().to_string());
        }
        if let Some(pid_file) = &self.pid_file {
            script = script.replace("{pidfile}", &pid_file.display().to_string());
        }
        TranscoderCommandBuilder::new("sh")
            .arg("-c")
            .arg(script)
            .build()
    }
}

/// Two cameras, `cam1` enabled and `cam-off` disabled, streaming into `streams_dir`.
pub fn test_config(streams_dir: &Path) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.server.streams_dir = streams_dir.to_path_buf();
    config.transcoder.grace_period = Duration::from_secs(2);
    config.transcoder.liveness_window = Duration::from_millis(200);

    let cam1 = CameraConfig::new("cam1", "127.0.0.1", 8888);
    let off = CameraConfig::new("cam-off", "127.0.0.1", 8889).disabled();
    config.cameras.insert(cam1.id.clone(), cam1);
    config.cameras.insert(off.id.clone(), off);
    config
}

/// Signal 0 probe; zombies still count as alive.
pub fn pid_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

pub fn kill_pid(pid: u32) {
    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
}

/// Poll `path` until the script has written its pid.
pub async fn read_pid_file(path: &Path) -> u32 {
    for _ in 0..100 {
        if let Ok(content) = tokio::fs::read_to_string(path).await {
            if let Ok(pid) = content.trim().parse() {
                return pid;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("pid file {} never written", path.display());
}

pub async fn wait_until_dead(pid: u32, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if !pid_alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    !pid_alive(pid)
}

/// Sink that records chunks and close reasons; optionally fails writes
/// after a number of successful chunks.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub chunks: Arc<Mutex<Vec<Vec<u8>>>>,
    pub closes: Arc<Mutex<Vec<CloseReason>>>,
    fail_after: Option<usize>,
}

impl RecordingSink {
    pub fn failing_after(chunks: usize) -> Self {
        Self {
            fail_after: Some(chunks),
            ..Self::default()
        }
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.chunks.lock().unwrap().concat()
    }

    pub fn closes(&self) -> Vec<CloseReason> {
        self.closes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConsumerSink for RecordingSink {
    async fn send_chunk(&mut self, chunk: Vec<u8>) -> Result<(), TransportError> {
        let mut chunks = self.chunks.lock().unwrap();
        if self.fail_after.is_some_and(|limit| chunks.len() >= limit) {
            return Err(TransportError::Failed("broken pipe".into()));
        }
        chunks.push(chunk);
        Ok(())
    }

    async fn close(&mut self, reason: CloseReason) -> Result<(), TransportError> {
        self.closes.lock().unwrap().push(reason);
        Ok(())
    }
}

/// Consumer that disconnects when the paired sender fires (or is dropped),
/// or never if built with [`ScriptedEvents::never`].
pub struct ScriptedEvents(Option<oneshot::Receiver<()>>);

impl ScriptedEvents {
    pub fn never() -> Self {
        Self(None)
    }

    pub fn trigger() -> (oneshot::Sender<()>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self(Some(rx)))
    }
}

#[async_trait]
impl ConsumerEvents for ScriptedEvents {
    async fn disconnected(&mut self) {
        match self.0.take() {
            Some(rx) => {
                let _ = rx.await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
