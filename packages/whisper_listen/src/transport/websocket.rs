//! WebSocket pub/sub client.
//!
//! A writer task drains the outbound frame queue into the socket; a reader
//! task decodes `message` frames and forwards them to the session. Closing
//! the outbound queue lets the writer flush what is queued and close the
//! socket.

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tracing::{debug, info, warn};
use whisper_protocol::InboundMessage;

use super::framing::{Frame, PresenceAction, decode_frame, encode_frame};
use super::{Transport, TransportError};
use crate::config::TransportConfig;

/// How long `close` waits for the writer to flush.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct WsTransport {
    client_id: String,
    outbound: Option<mpsc::Sender<Frame>>,
    inbound: mpsc::Receiver<InboundMessage>,
    writer: Option<JoinHandle<()>>,
    reader: JoinHandle<()>,
}

impl WsTransport {
    pub async fn connect(config: &TransportConfig, client_id: &str) -> Result<Self, TransportError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(&config.url)
            .await
            .map_err(TransportError::from_tungstenite)?;
        info!(url = %config.url, "connected to pub/sub server");

        let (mut ws_write, mut ws_read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<Frame>(config.channel_capacity);
        let (in_tx, in_rx) = mpsc::channel::<InboundMessage>(config.channel_capacity);

        let writer = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let text = match encode_frame(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "failed to encode frame");
                        continue;
                    }
                };
                if let Err(e) = ws_write.send(tungstenite::Message::Text(text.into())).await {
                    warn!(error = %e, "websocket write failed");
                    break;
                }
            }
            let _ = ws_write.close().await;
            debug!("websocket writer finished");
        });

        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_read.next().await {
                match msg {
                    Ok(tungstenite::Message::Text(text)) => match decode_frame(&text) {
                        Ok(Some(Frame::Message {
                            channel,
                            name,
                            data,
                        })) => {
                            let inbound = InboundMessage {
                                channel,
                                name,
                                data,
                            };
                            if in_tx.send(inbound).await.is_err() {
                                break;
                            }
                        }
                        Ok(Some(other)) => {
                            debug!(frame = ?other, "ignoring non-message frame from server");
                        }
                        Ok(None) => {}
                        Err(e) => warn!(error = %e, "undecodable frame from server"),
                    },
                    Ok(tungstenite::Message::Close(_)) => {
                        info!("server closed the connection");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "websocket read failed");
                        break;
                    }
                    _ => {}
                }
            }
            debug!("websocket reader finished");
        });

        Ok(Self {
            client_id: client_id.to_string(),
            outbound: Some(out_tx),
            inbound: in_rx,
            writer: Some(writer),
            reader,
        })
    }

    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        outbound
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed)
    }

    fn presence(&self, channel: &str, action: PresenceAction, data: &str) -> Frame {
        Frame::Presence {
            channel: channel.to_string(),
            action,
            client_id: self.client_id.clone(),
            data: data.to_string(),
        }
    }
}

impl Transport for WsTransport {
    async fn attach(&mut self, channel: &str) -> Result<(), TransportError> {
        debug!(channel, "attaching");
        self.send(Frame::Attach {
            channel: channel.to_string(),
        })
        .await
    }

    async fn detach(&mut self, channel: &str) -> Result<(), TransportError> {
        debug!(channel, "detaching");
        self.send(Frame::Detach {
            channel: channel.to_string(),
        })
        .await
    }

    async fn publish(
        &mut self,
        channel: &str,
        name: &str,
        data: &str,
    ) -> Result<(), TransportError> {
        self.send(Frame::Publish {
            channel: channel.to_string(),
            name: name.to_string(),
            data: data.to_string(),
        })
        .await
    }

    async fn enter_presence(&mut self, channel: &str, data: &str) -> Result<(), TransportError> {
        self.send(self.presence(channel, PresenceAction::Enter, data))
            .await
    }

    async fn update_presence(&mut self, channel: &str, data: &str) -> Result<(), TransportError> {
        self.send(self.presence(channel, PresenceAction::Update, data))
            .await
    }

    async fn next_message(&mut self) -> Option<InboundMessage> {
        self.inbound.recv().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // Dropping the sender ends the writer loop after it drains the queue.
        self.outbound.take();
        if let Some(writer) = self.writer.take() {
            if tokio::time::timeout(CLOSE_TIMEOUT, writer).await.is_err() {
                warn!("timed out flushing websocket writer");
            }
        }
        self.reader.abort();
        info!("transport closed");
        Ok(())
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.reader.abort();
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}
