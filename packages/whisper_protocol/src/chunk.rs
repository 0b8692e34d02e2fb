//! Wire codec for control, presence, and content chunks.
//!
//! Every chunk is a `|`-delimited string whose first field is a signed
//! integer offset. Non-negative offsets are character positions in the live
//! text; negative offsets are protocol tokens.
//!
//! ```text
//! content:   <offset>|<text>
//! control:   <verb>|<text>
//! presence:  <verb>|<conversationId>|<conversationName>|<clientId>|<profileId>|<clientName>|<contentId>
//! ```
//!
//! Two-field chunks split at the first separator only, so their text may
//! itself contain `|`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ChunkError;

pub const SEPARATOR: char = '|';

const PRESENCE_FIELDS: usize = 7;

/// Control-protocol verbs carried on the control channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlOffset {
    ListenOffer,
    ListenRequest,
    WhisperOffer,
    ListenAuthYes,
    ListenAuthNo,
    Joining,
    Dropping,
    Restart,
    RequestReread,
    TranscriptId,
}

impl ControlOffset {
    pub const ALL: [ControlOffset; 10] = [
        Self::ListenOffer,
        Self::ListenRequest,
        Self::WhisperOffer,
        Self::ListenAuthYes,
        Self::ListenAuthNo,
        Self::Joining,
        Self::Dropping,
        Self::Restart,
        Self::RequestReread,
        Self::TranscriptId,
    ];

    pub fn wire_value(self) -> i64 {
        match self {
            Self::RequestReread => -5,
            Self::WhisperOffer => -20,
            Self::ListenRequest => -21,
            Self::ListenAuthYes => -22,
            Self::ListenAuthNo => -23,
            Self::Joining => -24,
            Self::Dropping => -25,
            Self::ListenOffer => -26,
            Self::Restart => -27,
            Self::TranscriptId => -28,
        }
    }

    pub fn from_wire(value: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|verb| verb.wire_value() == value)
    }

    /// The symbolic name, e.g. `"listenOffer"`.
    pub fn name(self) -> &'static str {
        match self {
            Self::ListenOffer => "listenOffer",
            Self::ListenRequest => "listenRequest",
            Self::WhisperOffer => "whisperOffer",
            Self::ListenAuthYes => "listenAuthYes",
            Self::ListenAuthNo => "listenAuthNo",
            Self::Joining => "joining",
            Self::Dropping => "dropping",
            Self::Restart => "restart",
            Self::RequestReread => "requestReread",
            Self::TranscriptId => "transcriptId",
        }
    }
}

impl fmt::Display for ControlOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ControlOffset {
    type Err = ChunkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|verb| verb.name() == s)
            .ok_or_else(|| ChunkError::UnknownVerb(s.to_string()))
    }
}

/// Map a symbolic verb to its wire token.
pub fn control_offset_value(verb: ControlOffset) -> String {
    verb.wire_value().to_string()
}

/// Offset of a content chunk: a character position or a special token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentOffset {
    Position(usize),
    Newline,
    PastText,
    LiveText,
    StartReread,
    PlaySound,
}

impl ContentOffset {
    pub fn wire_value(self) -> i64 {
        match self {
            Self::Position(n) => n as i64,
            Self::Newline => -1,
            Self::PastText => -2,
            Self::LiveText => -3,
            Self::StartReread => -4,
            Self::PlaySound => -6,
        }
    }

    pub fn from_wire(value: i64) -> Result<Self, ChunkError> {
        match value {
            n if n >= 0 => usize::try_from(n)
                .map(Self::Position)
                .map_err(|_| ChunkError::InvalidOffset(n.to_string())),
            -1 => Ok(Self::Newline),
            -2 => Ok(Self::PastText),
            -3 => Ok(Self::LiveText),
            -4 => Ok(Self::StartReread),
            -6 => Ok(Self::PlaySound),
            other => Err(ChunkError::UnknownOffset(other)),
        }
    }

    /// Incremental live-text updates: positions and line promotion.
    pub fn is_diff(self) -> bool {
        matches!(self, Self::Position(_) | Self::Newline)
    }
}

impl fmt::Display for ContentOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Position(n) => write!(f, "{n}"),
            Self::Newline => f.write_str("newline"),
            Self::PastText => f.write_str("pastText"),
            Self::LiveText => f.write_str("liveText"),
            Self::StartReread => f.write_str("startReread"),
            Self::PlaySound => f.write_str("playSound"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChunk {
    pub offset: ContentOffset,
    pub text: String,
}

impl ContentChunk {
    pub fn new(offset: ContentOffset, text: impl Into<String>) -> Self {
        Self {
            offset,
            text: text.into(),
        }
    }

    pub fn is_diff(&self) -> bool {
        self.offset.is_diff()
    }
}

impl fmt::Display for ContentChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.offset.wire_value(), self.text)
    }
}

impl FromStr for ContentChunk {
    type Err = ChunkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (offset, text) = split_two(s)?;
        Ok(Self {
            offset: ContentOffset::from_wire(parse_offset(offset)?)?,
            text: text.to_string(),
        })
    }
}

/// Two-field control chunk: `<verb>|<text>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlChunk {
    pub offset: ControlOffset,
    pub text: String,
}

impl ControlChunk {
    pub fn new(offset: ControlOffset, text: impl Into<String>) -> Self {
        Self {
            offset,
            text: text.into(),
        }
    }
}

impl fmt::Display for ControlChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.offset.wire_value(), self.text)
    }
}

impl FromStr for ControlChunk {
    type Err = ChunkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (offset, text) = split_two(s)?;
        Ok(Self {
            offset: parse_verb(offset)?,
            text: text.to_string(),
        })
    }
}

/// Seven-field handshake chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceChunk {
    pub offset: ControlOffset,
    pub conversation_id: String,
    pub conversation_name: String,
    pub client_id: String,
    pub profile_id: String,
    pub client_name: String,
    pub content_id: String,
}

impl PresenceChunk {
    /// A chunk with the given verb and every other field empty.
    pub fn new(offset: ControlOffset) -> Self {
        Self {
            offset,
            conversation_id: String::new(),
            conversation_name: String::new(),
            client_id: String::new(),
            profile_id: String::new(),
            client_name: String::new(),
            content_id: String::new(),
        }
    }
}

impl fmt::Display for PresenceChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = [
            self.conversation_id.as_str(),
            self.conversation_name.as_str(),
            self.client_id.as_str(),
            self.profile_id.as_str(),
            self.client_name.as_str(),
            self.content_id.as_str(),
        ];
        write!(f, "{}", self.offset.wire_value())?;
        for field in fields {
            write!(f, "{SEPARATOR}{field}")?;
        }
        Ok(())
    }
}

impl FromStr for PresenceChunk {
    type Err = ChunkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ChunkError::Empty);
        }
        let fields: Vec<&str> = s.split(SEPARATOR).collect();
        let [offset, conversation_id, conversation_name, client_id, profile_id, client_name, content_id] =
            fields[..]
        else {
            return Err(ChunkError::FieldCount {
                expected: PRESENCE_FIELDS,
                found: fields.len(),
            });
        };
        Ok(Self {
            offset: parse_verb(offset)?,
            conversation_id: conversation_id.to_string(),
            conversation_name: conversation_name.to_string(),
            client_id: client_id.to_string(),
            profile_id: profile_id.to_string(),
            client_name: client_name.to_string(),
            content_id: content_id.to_string(),
        })
    }
}

/// A control-channel payload, discriminated by shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlPacket {
    Presence(PresenceChunk),
    Control(ControlChunk),
}

pub fn parse_content_chunk(raw: &str) -> Result<ContentChunk, ChunkError> {
    raw.parse()
}

pub fn parse_control_chunk(raw: &str) -> Result<ControlChunk, ChunkError> {
    raw.parse()
}

pub fn parse_presence_chunk(raw: &str) -> Result<PresenceChunk, ChunkError> {
    raw.parse()
}

/// Presence shape first, then the two-field control shape.
pub fn parse_control_packet(raw: &str) -> Result<ControlPacket, ChunkError> {
    match parse_presence_chunk(raw) {
        Ok(presence) => Ok(ControlPacket::Presence(presence)),
        Err(_) => parse_control_chunk(raw).map(ControlPacket::Control),
    }
}

// --- Field helpers ---

fn split_two(s: &str) -> Result<(&str, &str), ChunkError> {
    if s.is_empty() {
        return Err(ChunkError::Empty);
    }
    s.split_once(SEPARATOR).ok_or(ChunkError::MissingSeparator)
}

fn parse_offset(field: &str) -> Result<i64, ChunkError> {
    let digits = field.strip_prefix('-').unwrap_or(field);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ChunkError::InvalidOffset(field.to_string()));
    }
    field
        .parse()
        .map_err(|_| ChunkError::InvalidOffset(field.to_string()))
}

fn parse_verb(field: &str) -> Result<ControlOffset, ChunkError> {
    let value = parse_offset(field)?;
    ControlOffset::from_wire(value).ok_or(ChunkError::UnknownOffset(value))
}
