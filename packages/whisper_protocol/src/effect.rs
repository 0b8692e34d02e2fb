//! Side effects requested by the state machines, executed by the driver.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Exit reason string that marks a listener-initiated disconnect.
pub const USER_INITIATED_DISCONNECT: &str = "user-initiated-disconnect";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Publish `data` on `channel` under message name `name`.
    Publish {
        channel: String,
        name: String,
        data: String,
        kind: PublishKind,
    },
    Subscribe {
        channel: String,
    },
    Unsubscribe {
        channel: String,
    },
    Cue(AudioCue),
    /// Report a presence chunk to the telemetry side channel.
    LogPresence {
        direction: Direction,
        chunk: String,
    },
    TranscriptAvailable {
        url: String,
    },
    /// Terminal: run the exit protocol and release the transport.
    Exit(ExitReason),
}

/// What an outbound publish carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishKind {
    /// A presence chunk of the admission handshake.
    Presence,
    /// A `requestReread` control chunk.
    RereadRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cue", content = "name", rename_all = "snake_case")]
pub enum AudioCue {
    /// Live text went from empty to non-empty.
    TypingStart,
    /// A line was promoted.
    TypingEnd,
    /// Live text was erased.
    TypingStop,
    /// A named sound requested by the Whisperer.
    Sound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Received => "received",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ExitReason {
    UserInitiated,
    WhispererStopped,
    WhispererPaused,
    Refused,
    InvalidContentId { content_id: String },
}

impl ExitReason {
    pub fn code(&self) -> &str {
        match self {
            Self::UserInitiated => "user_initiated",
            Self::WhispererStopped => "whisperer_stopped",
            Self::WhispererPaused => "whisperer_paused",
            Self::Refused => "refused",
            Self::InvalidContentId { .. } => "invalid_content_id",
        }
    }

    /// Human-readable reason; the user-initiated sentinel is returned verbatim.
    pub fn message(&self, whisperer_name: &str) -> String {
        match self {
            Self::UserInitiated => USER_INITIATED_DISCONNECT.to_string(),
            Self::WhispererStopped => format!("{whisperer_name} has stopped whispering."),
            Self::WhispererPaused => format!(
                "{whisperer_name} has paused the conversation.  Please try listening again."
            ),
            Self::Refused => {
                format!("{whisperer_name} has refused your presence in this conversation")
            }
            Self::InvalidContentId { .. } => {
                "There was a communication error (invalid channel id).  Please report a bug."
                    .to_string()
            }
        }
    }

    pub fn is_user_initiated(&self) -> bool {
        matches!(self, Self::UserInitiated)
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserInitiated => write!(f, "user initiated"),
            Self::WhispererStopped => write!(f, "whisperer stopped"),
            Self::WhispererPaused => write!(f, "whisperer paused"),
            Self::Refused => write!(f, "refused"),
            Self::InvalidContentId { content_id } => {
                write!(f, "invalid content id: {content_id:?}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_messages() {
        assert_eq!(
            ExitReason::WhispererStopped.message("Dan"),
            "Dan has stopped whispering."
        );
        assert_eq!(
            ExitReason::Refused.message("Dan"),
            "Dan has refused your presence in this conversation"
        );
        assert_eq!(
            ExitReason::UserInitiated.message("Dan"),
            USER_INITIATED_DISCONNECT
        );
        assert!(ExitReason::UserInitiated.is_user_initiated());
        assert!(!ExitReason::WhispererPaused.is_user_initiated());
    }

    #[test]
    fn exit_reason_serde() {
        let reason = ExitReason::InvalidContentId {
            content_id: "bad".into(),
        };
        let json = serde_json::to_string(&reason).unwrap();
        assert_eq!(json, r#"{"reason":"invalid_content_id","content_id":"bad"}"#);
        assert_eq!(reason.code(), "invalid_content_id");
    }

    #[test]
    fn direction_strings() {
        assert_eq!(Direction::Sent.as_str(), "sent");
        assert_eq!(Direction::Received.as_str(), "received");
    }
}
