//! Admission handshake on the control channel.
//!
//! A listener offers itself (`listenOffer`), answers the Whisperer's
//! `whisperOffer` with a `listenRequest`, and is admitted by `listenAuthYes`
//! carrying the content channel id. Everything else either ends the session
//! or nudges the handshake back to the start with a fresh offer.

use std::fmt;

use tracing::{debug, info, warn};

use crate::address::{ContentId, WHISPERER_TARGET, control_channel};
use crate::chunk::{ControlChunk, ControlOffset, ControlPacket, PresenceChunk};
use crate::effect::{Direction, Effect, ExitReason, PublishKind};
use crate::session::Identity;

/// Scope sent with `requestReread`.
pub const REREAD_LIVE: &str = "live";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AdmissionStatus {
    #[default]
    Waiting,
    Requesting,
    Joined(ContentId),
    Exited(ExitReason),
}

impl AdmissionStatus {
    pub fn content_id(&self) -> Option<&ContentId> {
        match self {
            Self::Joined(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_exited(&self) -> bool {
        matches!(self, Self::Exited(_))
    }
}

/// `waiting`, `requesting`, or the content id once joined.
impl fmt::Display for AdmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => f.write_str("waiting"),
            Self::Requesting => f.write_str("requesting"),
            Self::Joined(id) => write!(f, "{id}"),
            Self::Exited(reason) => write!(f, "exited ({reason})"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeState {
    pub status: AdmissionStatus,
    pub transcript_id: Option<String>,
}

impl HandshakeState {
    pub fn transcript_url(&self, conversation_id: &str) -> Option<String> {
        self.transcript_id
            .as_deref()
            .map(|id| transcript_url(conversation_id, id))
    }
}

pub fn transcript_url(conversation_id: &str, transcript_id: &str) -> String {
    format!("/transcript/{conversation_id}/{transcript_id}")
}

// --- Outbound chunks ---

pub fn listen_offer(identity: &Identity) -> PresenceChunk {
    PresenceChunk {
        conversation_id: identity.conversation_id.clone(),
        client_id: identity.client_id.clone(),
        profile_id: identity.client_id.clone(),
        ..PresenceChunk::new(ControlOffset::ListenOffer)
    }
}

/// `listenRequest`/`joining` reply to a chunk from the Whisperer.
fn reply(identity: &Identity, verb: ControlOffset, to: &PresenceChunk) -> PresenceChunk {
    PresenceChunk {
        conversation_id: identity.conversation_id.clone(),
        conversation_name: to.conversation_name.clone(),
        client_id: identity.client_id.clone(),
        profile_id: identity.client_id.clone(),
        client_name: identity.client_name.clone(),
        ..PresenceChunk::new(verb)
    }
}

pub fn drop_notice(identity: &Identity) -> PresenceChunk {
    PresenceChunk {
        client_id: identity.client_id.clone(),
        ..PresenceChunk::new(ControlOffset::Dropping)
    }
}

pub fn reread_request() -> ControlChunk {
    ControlChunk::new(ControlOffset::RequestReread, REREAD_LIVE)
}

/// Publish a presence chunk on the control channel and report it.
pub(crate) fn send_presence(
    identity: &Identity,
    target: &str,
    chunk: &PresenceChunk,
    effects: &mut Vec<Effect>,
) {
    let data = chunk.to_string();
    effects.push(Effect::Publish {
        channel: control_channel(&identity.conversation_id),
        name: target.to_string(),
        data: data.clone(),
        kind: PublishKind::Presence,
    });
    effects.push(Effect::LogPresence {
        direction: Direction::Sent,
        chunk: data,
    });
}

pub(crate) fn send_reread_request(identity: &Identity, effects: &mut Vec<Effect>) {
    effects.push(Effect::Publish {
        channel: control_channel(&identity.conversation_id),
        name: WHISPERER_TARGET.to_string(),
        data: reread_request().to_string(),
        kind: PublishKind::RereadRequest,
    });
}

// --- Transition ---

pub fn transition(
    mut state: HandshakeState,
    identity: &Identity,
    packet: ControlPacket,
) -> (HandshakeState, Vec<Effect>) {
    let mut effects = Vec::new();
    if state.status.is_exited() {
        debug!(status = %state.status, "ignoring control packet after exit");
        return (state, effects);
    }

    match packet {
        ControlPacket::Control(chunk) => on_control(&mut state, identity, chunk, &mut effects),
        ControlPacket::Presence(chunk) => on_presence(&mut state, identity, chunk, &mut effects),
    }
    (state, effects)
}

fn on_control(
    state: &mut HandshakeState,
    identity: &Identity,
    chunk: ControlChunk,
    effects: &mut Vec<Effect>,
) {
    match chunk.offset {
        ControlOffset::TranscriptId => {
            let url = transcript_url(&identity.conversation_id, &chunk.text);
            info!(transcript_id = %chunk.text, "transcript available");
            state.transcript_id = Some(chunk.text);
            effects.push(Effect::TranscriptAvailable { url });
        }
        other => {
            warn!(verb = %other, text = %chunk.text, "discarding unexpected control chunk");
        }
    }
}

fn on_presence(
    state: &mut HandshakeState,
    identity: &Identity,
    chunk: PresenceChunk,
    effects: &mut Vec<Effect>,
) {
    match chunk.offset {
        ControlOffset::WhisperOffer => {
            info!(from = %chunk.client_id, conversation = %chunk.conversation_name, "whisper offer, requesting to listen");
            state.status = AdmissionStatus::Requesting;
            let request = reply(identity, ControlOffset::ListenRequest, &chunk);
            send_presence(identity, &chunk.client_id, &request, effects);
        }
        ControlOffset::ListenAuthYes => match chunk.content_id.parse::<ContentId>() {
            Ok(content_id) => {
                info!(content_id = %content_id, "admitted to conversation");
                state.status = AdmissionStatus::Joined(content_id);
                let joining = reply(identity, ControlOffset::Joining, &chunk);
                send_presence(identity, &chunk.client_id, &joining, effects);
            }
            Err(e) => {
                warn!(content_id = %chunk.content_id, error = %e, "admitted with invalid content id");
                exit(
                    state,
                    identity,
                    ExitReason::InvalidContentId {
                        content_id: chunk.content_id,
                    },
                    true,
                    effects,
                );
            }
        },
        ControlOffset::ListenAuthNo => {
            info!("listen request refused");
            exit(state, identity, ExitReason::Refused, true, effects);
        }
        ControlOffset::Dropping => {
            info!("whisperer dropped the conversation");
            exit(state, identity, ExitReason::WhispererStopped, false, effects);
        }
        ControlOffset::Restart => {
            info!("whisperer restarted the conversation");
            exit(state, identity, ExitReason::WhispererPaused, false, effects);
        }
        other => {
            debug!(verb = %other, "unexpected presence chunk, offering again");
            send_presence(identity, WHISPERER_TARGET, &listen_offer(identity), effects);
        }
    }
}

/// Enter the terminal state, optionally telling the Whisperer first.
pub(crate) fn exit(
    state: &mut HandshakeState,
    identity: &Identity,
    reason: ExitReason,
    notify: bool,
    effects: &mut Vec<Effect>,
) {
    if notify {
        send_presence(identity, WHISPERER_TARGET, &drop_notice(identity), effects);
    }
    state.status = AdmissionStatus::Exited(reason.clone());
    effects.push(Effect::Exit(reason));
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT: &str = "6f1c2a0e-3b7d-4e59-9a1f-0c8d2e4b6a71";

    fn identity() -> Identity {
        Identity {
            conversation_id: "conv".into(),
            conversation_name: "Standup".into(),
            whisperer_name: "Dan".into(),
            client_id: "me".into(),
            client_name: "Alice".into(),
        }
    }

    fn presence(verb: ControlOffset, from: &str, content_id: &str) -> ControlPacket {
        ControlPacket::Presence(PresenceChunk {
            conversation_id: "conv".into(),
            conversation_name: "Standup".into(),
            client_id: from.into(),
            profile_id: from.into(),
            client_name: "Dan".into(),
            content_id: content_id.into(),
            offset: verb,
        })
    }

    fn publishes(effects: &[Effect]) -> Vec<(&str, &str)> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Publish { name, data, .. } => Some((name.as_str(), data.as_str())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn outbound_shapes() {
        let id = identity();
        assert_eq!(listen_offer(&id).to_string(), "-26|conv||me|me||");
        assert_eq!(drop_notice(&id).to_string(), "-25|||me|||");
        assert_eq!(reread_request().to_string(), "-5|live");
    }

    #[test]
    fn publishes_are_tagged_by_kind() {
        let id = identity();
        let mut effects = Vec::new();
        send_presence(&id, WHISPERER_TARGET, &listen_offer(&id), &mut effects);
        send_reread_request(&id, &mut effects);
        let kinds: Vec<PublishKind> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::Publish { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec![PublishKind::Presence, PublishKind::RereadRequest]);
    }

    #[test]
    fn whisper_offer_requests_to_listen() {
        let id = identity();
        let (state, effects) = transition(
            HandshakeState::default(),
            &id,
            presence(ControlOffset::WhisperOffer, "dan-client", ""),
        );
        assert_eq!(state.status, AdmissionStatus::Requesting);
        assert_eq!(
            publishes(&effects),
            vec![("dan-client", "-21|conv|Standup|me|me|Alice|")]
        );
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::LogPresence {
                direction: Direction::Sent,
                ..
            }
        )));
    }

    #[test]
    fn auth_yes_joins() {
        let id = identity();
        let state = HandshakeState {
            status: AdmissionStatus::Requesting,
            transcript_id: None,
        };
        let (state, effects) = transition(
            state,
            &id,
            presence(ControlOffset::ListenAuthYes, "dan-client", CONTENT),
        );
        assert_eq!(state.status.to_string(), CONTENT);
        assert_eq!(state.status.content_id().map(|c| c.as_str()), Some(CONTENT));
        assert_eq!(
            publishes(&effects),
            vec![("dan-client", "-24|conv|Standup|me|me|Alice|")]
        );
    }

    #[test]
    fn auth_yes_from_waiting_also_joins() {
        let (state, _) = transition(
            HandshakeState::default(),
            &identity(),
            presence(ControlOffset::ListenAuthYes, "dan-client", CONTENT),
        );
        assert!(matches!(state.status, AdmissionStatus::Joined(_)));
    }

    #[test]
    fn auth_yes_with_bad_content_id_drops() {
        let (state, effects) = transition(
            HandshakeState::default(),
            &identity(),
            presence(ControlOffset::ListenAuthYes, "dan-client", "not-a-uuid"),
        );
        let reason = ExitReason::InvalidContentId {
            content_id: "not-a-uuid".into(),
        };
        assert_eq!(state.status, AdmissionStatus::Exited(reason.clone()));
        assert_eq!(publishes(&effects), vec![("whisperer", "-25|||me|||")]);
        assert_eq!(effects.last(), Some(&Effect::Exit(reason)));
    }

    #[test]
    fn auth_no_refuses() {
        let (state, effects) = transition(
            HandshakeState::default(),
            &identity(),
            presence(ControlOffset::ListenAuthNo, "dan-client", ""),
        );
        assert_eq!(state.status, AdmissionStatus::Exited(ExitReason::Refused));
        assert_eq!(publishes(&effects), vec![("whisperer", "-25|||me|||")]);
    }

    #[test]
    fn whisperer_drop_and_restart_exit_silently() {
        for (verb, reason) in [
            (ControlOffset::Dropping, ExitReason::WhispererStopped),
            (ControlOffset::Restart, ExitReason::WhispererPaused),
        ] {
            let (state, effects) =
                transition(HandshakeState::default(), &identity(), presence(verb, "dan", ""));
            assert_eq!(state.status, AdmissionStatus::Exited(reason.clone()));
            assert!(publishes(&effects).is_empty());
            assert_eq!(effects, vec![Effect::Exit(reason)]);
        }
    }

    #[test]
    fn unexpected_presence_reoffers() {
        for verb in [
            ControlOffset::ListenOffer,
            ControlOffset::ListenRequest,
            ControlOffset::Joining,
            ControlOffset::RequestReread,
        ] {
            let (state, effects) =
                transition(HandshakeState::default(), &identity(), presence(verb, "x", ""));
            assert_eq!(state.status, AdmissionStatus::Waiting);
            assert_eq!(publishes(&effects), vec![("whisperer", "-26|conv||me|me||")]);
        }
    }

    #[test]
    fn transcript_id_recorded_in_any_state() {
        let state = HandshakeState {
            status: AdmissionStatus::Requesting,
            transcript_id: None,
        };
        let packet = ControlPacket::Control(ControlChunk::new(ControlOffset::TranscriptId, "t42"));
        let (state, effects) = transition(state, &identity(), packet);
        assert_eq!(state.status, AdmissionStatus::Requesting);
        assert_eq!(state.transcript_id.as_deref(), Some("t42"));
        assert_eq!(
            effects,
            vec![Effect::TranscriptAvailable {
                url: "/transcript/conv/t42".into()
            }]
        );
        assert_eq!(
            state.transcript_url("conv").as_deref(),
            Some("/transcript/conv/t42")
        );
    }

    #[test]
    fn other_control_chunks_are_discarded() {
        let packet = ControlPacket::Control(ControlChunk::new(ControlOffset::RequestReread, "live"));
        let (state, effects) = transition(HandshakeState::default(), &identity(), packet);
        assert_eq!(state, HandshakeState::default());
        assert!(effects.is_empty());
    }

    #[test]
    fn exited_ignores_everything() {
        let state = HandshakeState {
            status: AdmissionStatus::Exited(ExitReason::Refused),
            transcript_id: None,
        };
        let (after, effects) = transition(
            state.clone(),
            &identity(),
            presence(ControlOffset::WhisperOffer, "dan", ""),
        );
        assert_eq!(after, state);
        assert!(effects.is_empty());
    }

    #[test]
    fn status_strings() {
        assert_eq!(AdmissionStatus::Waiting.to_string(), "waiting");
        assert_eq!(AdmissionStatus::Requesting.to_string(), "requesting");
    }
}
