use crate::config::CameraConfig;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::{error, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to connect to camera {id}: {source}")]
    Connect {
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out connecting to camera {0}")]
    ConnectTimeout(String),

    #[error("Not connected to camera stream")]
    NotConnected,

    #[error("Camera stream ended")]
    Ended,

    #[error("Error reading from camera stream: {0}")]
    Read(#[from] std::io::Error),
}

/// Connect/read/close wrapper around a camera's raw TCP byte stream.
pub struct CameraSource {
    config: CameraConfig,
    socket: Option<TcpStream>,
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            socket: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    pub async fn connect(&mut self) -> Result<(), SourceError> {
        if self.is_connected() {
            return Ok(());
        }

        let addr = (self.config.ip_address.as_str(), self.config.port);
        let socket = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(socket)) => socket,
            Ok(Err(source)) => {
                error!(camera = %self.config.id, "Failed to connect to camera: {}", source);
                return Err(SourceError::Connect {
                    id: self.config.id.clone(),
                    source,
                });
            }
            Err(_) => return Err(SourceError::ConnectTimeout(self.config.id.clone())),
        };

        info!(
            "Connected to camera {} at {}:{}",
            self.config.id, self.config.ip_address, self.config.port
        );
        self.socket = Some(socket);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if self.socket.take().is_some() {
            info!("Disconnected from camera {}", self.config.id);
        }
    }

    /// Read up to `chunk_size` bytes. Any failure leaves the source disconnected.
    pub async fn read_chunk(&mut self, chunk_size: usize) -> Result<Vec<u8>, SourceError> {
        let socket = self.socket.as_mut().ok_or(SourceError::NotConnected)?;

        let mut buf = vec![0u8; chunk_size];
        match socket.read(&mut buf).await {
            Ok(0) => {
                warn!("Camera stream {} returned no data", self.config.id);
                self.disconnect();
                Err(SourceError::Ended)
            }
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) => {
                error!("Error reading from camera {}: {}", self.config.id, e);
                self.disconnect();
                Err(SourceError::Read(e))
            }
        }
    }
}
