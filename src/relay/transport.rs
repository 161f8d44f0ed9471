use async_trait::async_trait;
use thiserror::Error;

/// Close reason reported to a relay consumer, mirroring websocket close codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    Normal,
    PolicyViolation(String),
    InternalError(String),
}

impl CloseReason {
    pub fn code(&self) -> u16 {
        match self {
            CloseReason::Normal => 1000,
            CloseReason::PolicyViolation(_) => 1008,
            CloseReason::InternalError(_) => 1011,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            CloseReason::Normal => "",
            CloseReason::PolicyViolation(msg) | CloseReason::InternalError(msg) => msg,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Consumer connection is closed")]
    Closed,

    #[error("Consumer transport failed: {0}")]
    Failed(String),
}

/// Write half of a consumer connection.
#[async_trait]
pub trait ConsumerSink: Send {
    async fn send_chunk(&mut self, chunk: Vec<u8>) -> Result<(), TransportError>;

    /// Close with `reason`. [`TransportError::Closed`] means it already was.
    async fn close(&mut self, reason: CloseReason) -> Result<(), TransportError>;
}

/// Read half of a consumer connection; only close and error signals matter.
#[async_trait]
pub trait ConsumerEvents: Send {
    /// Resolves once the consumer has gone away.
    async fn disconnected(&mut self);
}
