//! JSON frames exchanged with the pub/sub server over a WebSocket.
//!
//! Every frame is one text message: `{ "v": 1, "type": "...", ... }`.
//! Outbound: `attach`, `detach`, `publish`, `presence`. Inbound: `message`.

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Frame format version.
pub const FRAME_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceAction {
    Enter,
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    Attach {
        channel: String,
    },
    Detach {
        channel: String,
    },
    Publish {
        channel: String,
        name: String,
        data: String,
    },
    Presence {
        channel: String,
        action: PresenceAction,
        client_id: String,
        data: String,
    },
    Message {
        channel: String,
        name: String,
        data: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    v: u32,
    #[serde(flatten)]
    frame: serde_json::Value,
}

pub fn encode_frame(frame: &Frame) -> Result<String> {
    let envelope = Envelope {
        v: FRAME_VERSION,
        frame: serde_json::to_value(frame)?,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Decode one frame.
///
/// Returns `Ok(None)` for frames from a newer version or of a type this
/// client does not understand.
pub fn decode_frame(text: &str) -> Result<Option<Frame>> {
    let envelope: Envelope = serde_json::from_str(text)?;

    if envelope.v != FRAME_VERSION {
        tracing::warn!(version = envelope.v, "unknown frame version, skipping");
        return Ok(None);
    }

    match serde_json::from_value::<Frame>(envelope.frame) {
        Ok(frame) => Ok(Some(frame)),
        Err(e) => {
            tracing::warn!(error = %e, "unknown or malformed frame, skipping");
            Ok(None)
        }
    }
}
