//! Listener-side session protocol for Whisper live transcription.
//!
//! Pure state machines and wire codec: no IO, no async. The driver feeds
//! transport messages into a [`Session`] and executes the [`Effect`]s it
//! returns.

pub mod address;
pub mod chunk;
pub mod content;
pub mod counters;
pub mod effect;
pub mod error;
pub mod handshake;
pub mod links;
pub mod session;

pub use address::{BROADCAST_TARGET, ContentId, WHISPERER_TARGET};
pub use chunk::{
    ContentChunk, ContentOffset, ControlChunk, ControlOffset, ControlPacket, PresenceChunk,
    control_offset_value, parse_content_chunk, parse_control_chunk, parse_control_packet,
    parse_presence_chunk,
};
pub use content::{ContentState, TextBuffer};
pub use effect::{
    AudioCue, Direction, Effect, ExitReason, PublishKind, USER_INITIATED_DISCONNECT,
};
pub use error::{ChunkError, ContentIdError, RejectedChunk};
pub use handshake::{AdmissionStatus, HandshakeState};
pub use links::{Link, extract_links};
pub use session::{Disposition, Identity, InboundMessage, Session, SessionSnapshot};
