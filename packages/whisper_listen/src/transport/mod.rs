//! Pub/sub transport used by the listener.
//!
//! Submodules:
//! - `framing`: JSON frames exchanged with the pub/sub server
//! - `websocket`: WebSocket client with reader/writer tasks
//! - `memory`: scripted in-process transport for tests

pub mod framing;
#[cfg(test)]
pub mod memory;
pub mod websocket;

use tokio_tungstenite::tungstenite;
use whisper_protocol::InboundMessage;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("pub/sub server is unavailable")]
    Unavailable,

    #[error("connection closed")]
    Closed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TransportError {
    pub fn from_tungstenite(err: tungstenite::Error) -> Self {
        let is_connect = match &err {
            tungstenite::Error::Io(io_err) => matches!(
                io_err.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        };
        if is_connect {
            Self::Unavailable
        } else {
            Self::Other(err.into())
        }
    }
}

/// Channel-oriented pub/sub primitives the session driver needs.
pub trait Transport {
    async fn attach(&mut self, channel: &str) -> Result<(), TransportError>;

    async fn detach(&mut self, channel: &str) -> Result<(), TransportError>;

    async fn publish(&mut self, channel: &str, name: &str, data: &str)
    -> Result<(), TransportError>;

    async fn enter_presence(&mut self, channel: &str, data: &str) -> Result<(), TransportError>;

    async fn update_presence(&mut self, channel: &str, data: &str) -> Result<(), TransportError>;

    /// Next message on any attached channel; `None` once the connection is gone.
    async fn next_message(&mut self) -> Option<InboundMessage>;

    async fn close(&mut self) -> Result<(), TransportError>;
}
