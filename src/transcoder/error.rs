use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("Transcoder binary not found: {program}")]
    NotFound { program: String },

    #[error("Permission denied launching {program}")]
    PermissionDenied { program: String },

    #[error("Failed to launch {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to capture {0} of transcoder")]
    MissingPipe(&'static str),

    #[error("Failed to prepare output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Transcoder for {stream_id} exited during startup ({status})")]
    ExitedEarly { stream_id: String, status: String },
}

impl SpawnError {
    /// Classify an error returned by `Command::spawn`.
    pub fn from_launch(error: std::io::Error, program: &str) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => SpawnError::NotFound {
                program: program.to_string(),
            },
            std::io::ErrorKind::PermissionDenied => SpawnError::PermissionDenied {
                program: program.to_string(),
            },
            _ => SpawnError::Io {
                program: program.to_string(),
                source: error,
            },
        }
    }
}

/// The forceful kill itself failed; the process is considered unrecoverable.
#[derive(Debug, thiserror::Error)]
#[error("Failed to kill transcoder for {stream_id} (pid {pid:?}): {source}")]
pub struct TerminateError {
    pub stream_id: String,
    pub pid: Option<u32>,
    #[source]
    pub source: std::io::Error,
}
