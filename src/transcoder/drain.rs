//! Draining a transcoder's diagnostic stream into the log.

use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Why a drain loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainExit {
    EndOfStream,
    Cancelled,
    Failed,
}

/// A background task forwarding stderr lines until end-of-stream or cancellation.
///
/// [`StderrDrain::cancel`] only returns once the task has observed the
/// cancellation, so the caller may safely terminate the process afterwards.
pub struct StderrDrain {
    stream_id: String,
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<DrainExit>,
}

impl StderrDrain {
    /// Forward each line as a `debug` event tagged with the stream id.
    pub fn spawn<R>(stream_id: &str, stream: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let id = stream_id.to_string();
        Self::spawn_with_sink(stream_id, stream, move |line| {
            debug!(stream_id = %id, "transcoder: {}", line);
        })
    }

    pub fn spawn_with_sink<R, F>(stream_id: &str, stream: R, sink: F) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        F: FnMut(&str) + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(drain_lines(stream_id.to_string(), stream, cancel_rx, sink));
        Self {
            stream_id: stream_id.to_string(),
            cancel: Some(cancel_tx),
            task,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Request cancellation and wait for the task to acknowledge it.
    pub async fn cancel(mut self) -> DrainExit {
        if let Some(cancel) = self.cancel.take() {
            // Err means the task already finished on its own
            let _ = cancel.send(());
        }
        self.join().await
    }

    /// Let the stream reach end-of-stream for up to `within`, then cancel.
    pub async fn settle(mut self, within: Duration) -> DrainExit {
        match tokio::time::timeout(within, &mut self.task).await {
            Ok(result) => Self::exit_from(&self.stream_id, result),
            Err(_) => self.cancel().await,
        }
    }

    async fn join(self) -> DrainExit {
        let result = self.task.await;
        Self::exit_from(&self.stream_id, result)
    }

    fn exit_from(
        stream_id: &str,
        result: Result<DrainExit, tokio::task::JoinError>,
    ) -> DrainExit {
        result.unwrap_or_else(|e| {
            warn!(stream_id, "stderr drain task failed: {}", e);
            DrainExit::Failed
        })
    }
}

async fn drain_lines<R, F>(
    stream_id: String,
    stream: R,
    mut cancel: oneshot::Receiver<()>,
    mut sink: F,
) -> DrainExit
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();

    loop {
        line.clear();
        tokio::select! {
            biased;
            // A dropped sender counts as cancellation too
            _ = &mut cancel => {
                debug!(stream_id = %stream_id, "stderr drain cancelled");
                return DrainExit::Cancelled;
            }
            read = reader.read_until(b'\n', &mut line) => match read {
                Ok(0) => {
                    debug!(stream_id = %stream_id, "Transcoder stderr stream ended");
                    return DrainExit::EndOfStream;
                }
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line);
                    let text = text.trim_end();
                    if !text.is_empty() {
                        sink(text);
                    }
                }
                Err(e) => {
                    warn!(stream_id = %stream_id, "Error reading transcoder stderr: {}", e);
                    return DrainExit::Failed;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_drain_forwards_lines_until_eof() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let lines = Arc::new(Mutex::new(Vec::new()));
        let collected = Arc::clone(&lines);
        let drain = StderrDrain::spawn_with_sink("cam1", reader, move |line| {
            collected.lock().unwrap().push(line.to_string());
        });

        writer.write_all(b"frame=1\r\nframe=2\n\nbad \xff byte\n").await.unwrap();
        drop(writer);

        assert_eq!(drain.settle(Duration::from_secs(5)).await, DrainExit::EndOfStream);
        assert_eq!(
            *lines.lock().unwrap(),
            vec!["frame=1", "frame=2", "bad \u{fffd} byte"]
        );
    }

    #[tokio::test]
    async fn test_cancel_is_acknowledged_on_idle_stream() {
        let (_writer, reader) = tokio::io::duplex(64);
        let drain = StderrDrain::spawn("cam1", reader);
        assert!(!drain.is_finished());
        assert_eq!(drain.cancel().await, DrainExit::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_after_finish_reports_eof() {
        let (writer, reader) = tokio::io::duplex(64);
        drop(writer);
        let drain = StderrDrain::spawn("cam1", reader);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(drain.cancel().await, DrainExit::EndOfStream);
    }
}
