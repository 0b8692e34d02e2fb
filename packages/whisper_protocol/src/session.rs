//! Session coordinator: routes transport messages to the handshake and
//! content state machines and owns everything they share.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::address::{ChannelKind, WHISPERER_TARGET, content_channel, control_channel, is_addressed_to};
use crate::chunk::{ControlPacket, parse_content_chunk, parse_control_packet};
use crate::content::{self, ContentEffect, ContentState, TextBuffer};
use crate::counters::{INITIAL_OFFER, INITIAL_READ, ReadCounters};
use crate::effect::{Direction, Effect, ExitReason};
use crate::error::RejectedChunk;
use crate::handshake::{self, AdmissionStatus, HandshakeState};
use crate::links::Link;

/// Who this listener is and which conversation it is listening to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub conversation_id: String,
    pub conversation_name: String,
    pub whisperer_name: String,
    pub client_id: String,
    pub client_name: String,
}

/// A message delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel: String,
    /// Target: a client id or `ALL`.
    pub name: String,
    pub data: String,
}

/// What happened to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Applied,
    /// Addressed to another client.
    NotAddressed,
    Malformed(RejectedChunk),
    /// Arrived after exit, or on a channel this session is not joined to.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct Session {
    identity: Identity,
    handshake: HandshakeState,
    content: ContentState,
    counters: ReadCounters,
}

impl Session {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            handshake: HandshakeState::default(),
            content: ContentState::default(),
            counters: ReadCounters::new(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn status(&self) -> &AdmissionStatus {
        &self.handshake.status
    }

    pub fn text(&self) -> &TextBuffer {
        &self.content.text
    }

    pub fn links(&self) -> &[Link] {
        &self.content.links
    }

    pub fn reread_in_progress(&self) -> bool {
        self.content.reread_in_progress
    }

    pub fn transcript_url(&self) -> Option<String> {
        self.handshake.transcript_url(&self.identity.conversation_id)
    }

    pub fn is_exited(&self) -> bool {
        self.handshake.status.is_exited()
    }

    /// Subscribe the control channel and offer to listen. Only the first
    /// call does anything.
    pub fn start(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if !self.counters.try_fire(INITIAL_OFFER, 1) {
            debug!("session already started");
            return effects;
        }
        effects.push(Effect::Subscribe {
            channel: control_channel(&self.identity.conversation_id),
        });
        let offer = handshake::listen_offer(&self.identity);
        handshake::send_presence(&self.identity, WHISPERER_TARGET, &offer, &mut effects);
        effects
    }

    pub fn handle(&mut self, message: &InboundMessage) -> (Disposition, Vec<Effect>) {
        if self.is_exited() {
            trace!(channel = %message.channel, "session exited, ignoring message");
            return (Disposition::Ignored, Vec::new());
        }
        if !is_addressed_to(&message.name, &self.identity.client_id) {
            trace!(addressed_to = %message.name, "message addressed elsewhere");
            return (Disposition::NotAddressed, Vec::new());
        }

        let (disposition, mut effects) =
            match ChannelKind::classify(&self.identity.conversation_id, &message.channel) {
                Some(ChannelKind::Control) => self.on_control(&message.data),
                Some(ChannelKind::Content(id)) => self.on_content(&id, &message.data),
                None => {
                    debug!(channel = %message.channel, "message on foreign channel");
                    (Disposition::Ignored, Vec::new())
                }
            };
        effects.sort_by_key(|e| matches!(e, Effect::Exit(_)));
        (disposition, effects)
    }

    /// User-requested resync of the live text.
    pub fn request_reread(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.is_exited() || self.handshake.status.content_id().is_none() {
            debug!(status = %self.handshake.status, "not joined, reread request ignored");
            return effects;
        }
        self.begin_reread(&mut effects);
        effects
    }

    /// Leave the conversation. Only the first call publishes `dropping`.
    pub fn leave(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.is_exited() {
            debug!("already exited");
            return effects;
        }
        handshake::exit(
            &mut self.handshake,
            &self.identity,
            ExitReason::UserInitiated,
            true,
            &mut effects,
        );
        effects
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.handshake.status.to_string(),
            live: self.content.text.live.clone(),
            past: self.content.text.past.clone(),
            links: self.content.links.clone(),
            reread_in_progress: self.content.reread_in_progress,
            transcript_url: self.transcript_url(),
            exit: match &self.handshake.status {
                AdmissionStatus::Exited(reason) => Some(reason.clone()),
                _ => None,
            },
        }
    }

    fn on_control(&mut self, data: &str) -> (Disposition, Vec<Effect>) {
        let packet = match parse_control_packet(data) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(chunk = %data, error = %e, "discarding malformed control chunk");
                return (Disposition::Malformed(RejectedChunk::new(&e, data)), Vec::new());
            }
        };

        let mut effects = Vec::new();
        if matches!(packet, ControlPacket::Presence(_)) {
            effects.push(Effect::LogPresence {
                direction: Direction::Received,
                chunk: data.to_string(),
            });
        }

        let before = self.handshake.status.content_id().cloned();
        let state = std::mem::take(&mut self.handshake);
        let (state, handshake_effects) = handshake::transition(state, &self.identity, packet);
        self.handshake = state;
        effects.extend(handshake_effects);

        if !self.is_exited() {
            let after = self.handshake.status.content_id().cloned();
            if before != after {
                if let Some(old) = &before {
                    effects.push(Effect::Unsubscribe {
                        channel: content_channel(&self.identity.conversation_id, old),
                    });
                }
                if let Some(new) = &after {
                    self.content = self.content.reset();
                    effects.push(Effect::Subscribe {
                        channel: content_channel(&self.identity.conversation_id, new),
                    });
                    if self.counters.try_fire(INITIAL_READ, 1) {
                        self.begin_reread(&mut effects);
                    }
                }
            }
        }
        (Disposition::Applied, effects)
    }

    fn on_content(&mut self, content_id: &str, data: &str) -> (Disposition, Vec<Effect>) {
        let joined = self.handshake.status.content_id();
        if joined.map(|id| id.as_str()) != Some(content_id) {
            debug!(content_id, "content for a channel we have not joined");
            return (Disposition::Ignored, Vec::new());
        }

        let chunk = match parse_content_chunk(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(chunk = %data, error = %e, "discarding malformed content chunk");
                return (Disposition::Malformed(RejectedChunk::new(&e, data)), Vec::new());
            }
        };

        let state = std::mem::take(&mut self.content);
        let (state, content_effects) = content::transition(state, &chunk);
        self.content = state;

        let mut effects = Vec::new();
        for effect in content_effects {
            match effect {
                ContentEffect::Cue(cue) => effects.push(Effect::Cue(cue)),
                ContentEffect::RequestReread => {
                    handshake::send_reread_request(&self.identity, &mut effects)
                }
            }
        }
        (Disposition::Applied, effects)
    }

    fn begin_reread(&mut self, effects: &mut Vec<Effect>) {
        if self.content.begin_reread() {
            debug!("requesting reread of live text");
            handshake::send_reread_request(&self.identity, effects);
        } else {
            debug!("reread already in progress");
        }
    }
}

/// Read-only view for presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub status: String,
    pub live: String,
    pub past: String,
    pub links: Vec<Link>,
    pub reread_in_progress: bool,
    pub transcript_url: Option<String>,
    pub exit: Option<ExitReason>,
}
