//! Scripted in-process transport.
//!
//! Inbound messages are queued up front; `next_message` returns `None` once
//! the script is exhausted, which the driver treats as a lost connection.
//! Every outbound call is recorded for assertions.

use std::collections::VecDeque;

use whisper_protocol::InboundMessage;

use super::{Transport, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Attach(String),
    Detach(String),
    Publish {
        channel: String,
        name: String,
        data: String,
    },
    EnterPresence(String),
    UpdatePresence(String),
    Close,
}

#[derive(Debug, Default)]
pub struct MemoryTransport {
    script: VecDeque<InboundMessage>,
    pub calls: Vec<Call>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, channel: &str, name: &str, data: &str) {
        self.script.push_back(InboundMessage {
            channel: channel.to_string(),
            name: name.to_string(),
            data: data.to_string(),
        });
    }

    /// `(name, data)` of every publish, in order.
    pub fn published(&self) -> Vec<(&str, &str)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::Publish { name, data, .. } => Some((name.as_str(), data.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn closed(&self) -> bool {
        self.calls.contains(&Call::Close)
    }
}

impl Transport for MemoryTransport {
    async fn attach(&mut self, channel: &str) -> Result<(), TransportError> {
        self.calls.push(Call::Attach(channel.to_string()));
        Ok(())
    }

    async fn detach(&mut self, channel: &str) -> Result<(), TransportError> {
        self.calls.push(Call::Detach(channel.to_string()));
        Ok(())
    }

    async fn publish(
        &mut self,
        channel: &str,
        name: &str,
        data: &str,
    ) -> Result<(), TransportError> {
        if self.closed() {
            return Err(TransportError::Closed);
        }
        self.calls.push(Call::Publish {
            channel: channel.to_string(),
            name: name.to_string(),
            data: data.to_string(),
        });
        Ok(())
    }

    async fn enter_presence(&mut self, _channel: &str, data: &str) -> Result<(), TransportError> {
        self.calls.push(Call::EnterPresence(data.to_string()));
        Ok(())
    }

    async fn update_presence(&mut self, _channel: &str, data: &str) -> Result<(), TransportError> {
        self.calls.push(Call::UpdatePresence(data.to_string()));
        Ok(())
    }

    async fn next_message(&mut self) -> Option<InboundMessage> {
        self.script.pop_front()
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.calls.push(Call::Close);
        Ok(())
    }
}
