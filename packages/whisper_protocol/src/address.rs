//! Channel naming, message addressing, and content-channel identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ContentIdError;

/// Message name that addresses every listener on a channel.
pub const BROADCAST_TARGET: &str = "ALL";

/// Well-known message name for packets meant for the Whisperer.
pub const WHISPERER_TARGET: &str = "whisperer";

const CONTENT_ID_LEN: usize = 36;

/// Whether a message named `name` is meant for `client_id`.
///
/// Names compare ASCII case-insensitively.
pub fn is_addressed_to(name: &str, client_id: &str) -> bool {
    name.eq_ignore_ascii_case(client_id) || name.eq_ignore_ascii_case(BROADCAST_TARGET)
}

pub fn control_channel(conversation_id: &str) -> String {
    format!("{conversation_id}:control")
}

pub fn content_channel(conversation_id: &str, content_id: &ContentId) -> String {
    format!("{conversation_id}:{content_id}")
}

/// Which of a conversation's channels a channel name refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelKind {
    Control,
    Content(String),
}

impl ChannelKind {
    /// Classify `channel`, or `None` if it belongs to another conversation.
    pub fn classify(conversation_id: &str, channel: &str) -> Option<Self> {
        let suffix = channel
            .strip_prefix(conversation_id)
            .and_then(|rest| rest.strip_prefix(':'))?;
        if suffix == "control" {
            Some(Self::Control)
        } else {
            Some(Self::Content(suffix.to_string()))
        }
    }
}

/// A 36-character token naming a conversation's content channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentId(String);

impl ContentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ContentId {
    type Err = ContentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(bad) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-'))
        {
            return Err(ContentIdError::InvalidChar(bad));
        }
        if s.len() != CONTENT_ID_LEN {
            return Err(ContentIdError::Length(s.len()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for ContentId {
    type Error = ContentIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentId> for String {
    fn from(id: ContentId) -> Self {
        id.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
