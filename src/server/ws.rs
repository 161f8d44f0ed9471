use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tracing::trace;

use crate::relay::{CloseReason, ConsumerEvents, ConsumerSink, TransportError};

/// Split an upgraded socket into the relay's write and read halves.
pub fn split_socket(socket: WebSocket) -> (WsSink, WsEvents) {
    let (sender, receiver) = socket.split();
    (
        WsSink {
            sender,
            closed: false,
        },
        WsEvents { receiver },
    )
}

pub struct WsSink {
    sender: SplitSink<WebSocket, Message>,
    closed: bool,
}

#[async_trait]
impl ConsumerSink for WsSink {
    async fn send_chunk(&mut self, chunk: Vec<u8>) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.sender
            .send(Message::Binary(chunk.into()))
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))
    }

    async fn close(&mut self, reason: CloseReason) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.closed = true;

        let frame = CloseFrame {
            code: reason.code(),
            reason: reason.message().to_string().into(),
        };
        // A failed close frame means the peer is already gone
        if self.sender.send(Message::Close(Some(frame))).await.is_err() {
            return Err(TransportError::Closed);
        }
        self.sender.close().await.map_err(|_| TransportError::Closed)
    }
}

pub struct WsEvents {
    receiver: SplitStream<WebSocket>,
}

#[async_trait]
impl ConsumerEvents for WsEvents {
    async fn disconnected(&mut self) {
        while let Some(msg) = self.receiver.next().await {
            match msg {
                Ok(Message::Close(frame)) => {
                    trace!("Consumer sent close frame: {:?}", frame);
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    trace!("Consumer socket error: {}", e);
                    return;
                }
            }
        }
    }
}
