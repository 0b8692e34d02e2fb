//! Live/past text reconstruction from content chunks.
//!
//! `transition(state, chunk) -> (state, effects)` is pure: the caller owns
//! the state between chunks and executes the returned effects.
//!
//! Offsets count UTF-16 code units, as the Whisperer measures its text. A
//! diff whose offset lies beyond the end of the live text, or inside a
//! surrogate pair, means this listener missed a chunk; instead of
//! corrupting the buffer it asks the Whisperer to resend the live text
//! (a "reread"). Any diff that applies cleanly while a reread is pending
//! completes the reread implicitly, so a lost `liveText` reply cannot wedge
//! the session.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::chunk::{ContentChunk, ContentOffset};
use crate::effect::AudioCue;
use crate::links::{Link, extract_links};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBuffer {
    /// The current, not yet terminated line.
    pub live: String,
    /// Promoted lines, each terminated by `\n`. Only ever appended to.
    pub past: String,
}

impl TextBuffer {
    /// Length of the live line in UTF-16 code units.
    pub fn live_len(&self) -> usize {
        self.live.encode_utf16().count()
    }

    /// Byte index of UTF-16 position `offset` in the live line. `None` if the
    /// offset is past the end or splits a surrogate pair.
    pub fn live_byte_index(&self, offset: usize) -> Option<usize> {
        let mut units = 0;
        for (byte, c) in self.live.char_indices() {
            if units == offset {
                return Some(byte);
            }
            units += c.len_utf16();
            if units > offset {
                return None;
            }
        }
        (units == offset).then_some(self.live.len())
    }

    /// `live = live[..cut] + text`, `cut` being a byte index on a char boundary.
    fn replace_from(&mut self, cut: usize, text: &str) {
        self.live.truncate(cut);
        self.live.push_str(text);
    }

    /// Move the live line into the past and return it.
    fn promote(&mut self) -> String {
        let line = std::mem::take(&mut self.live);
        self.past.push_str(&line);
        self.past.push('\n');
        line
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentState {
    pub text: TextBuffer,
    /// Links found in promoted lines, in discovery order.
    pub links: Vec<Link>,
    pub reread_in_progress: bool,
}

impl ContentState {
    /// A fresh buffer that carries over a pending reread.
    pub fn reset(&self) -> Self {
        Self {
            reread_in_progress: self.reread_in_progress,
            ..Self::default()
        }
    }

    /// Mark a reread as pending. Returns false if one already was.
    pub fn begin_reread(&mut self) -> bool {
        if self.reread_in_progress {
            return false;
        }
        self.reread_in_progress = true;
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentEffect {
    Cue(AudioCue),
    /// Ask the Whisperer to resend the live text.
    RequestReread,
}

pub fn transition(
    mut state: ContentState,
    chunk: &ContentChunk,
) -> (ContentState, Vec<ContentEffect>) {
    let mut effects = Vec::new();
    match chunk.offset {
        ContentOffset::PlaySound => {
            effects.push(ContentEffect::Cue(AudioCue::Sound(chunk.text.clone())));
        }
        offset if offset.is_diff() => apply_diff(&mut state, offset, &chunk.text, &mut effects),
        offset if state.reread_in_progress => {
            apply_reread(&mut state, offset, &chunk.text, &mut effects)
        }
        offset => {
            warn!(offset = %offset, text = %chunk.text, "ignoring content request outside of a reread");
        }
    }
    (state, effects)
}

fn apply_diff(
    state: &mut ContentState,
    offset: ContentOffset,
    text: &str,
    effects: &mut Vec<ContentEffect>,
) {
    let mut cut = None;
    if let ContentOffset::Position(n) = offset {
        cut = state.text.live_byte_index(n);
        if cut.is_none() {
            let live_len = state.text.live_len();
            if state.begin_reread() {
                info!(offset = n, live_len, "offset does not fit live text, rereading");
                effects.push(ContentEffect::RequestReread);
            } else {
                debug!(offset = n, live_len, "offset does not fit live text, reread already pending");
            }
            return;
        }
    }

    if state.reread_in_progress {
        debug!("diff received during reread, treating reread as complete");
        state.reread_in_progress = false;
    }

    match offset {
        ContentOffset::Position(0) => {
            let was_empty = state.text.live.is_empty();
            if was_empty && !text.is_empty() {
                effects.push(ContentEffect::Cue(AudioCue::TypingStart));
            } else if !was_empty && text.is_empty() {
                effects.push(ContentEffect::Cue(AudioCue::TypingStop));
            }
            state.text.live = text.to_string();
        }
        ContentOffset::Position(_) => {
            if let Some(cut) = cut {
                state.text.replace_from(cut, text);
            }
        }
        ContentOffset::Newline => {
            effects.push(ContentEffect::Cue(AudioCue::TypingEnd));
            let links = extract_links(&state.text.live);
            let line = state.text.promote();
            debug!(line_len = line.len(), links = links.len(), "promoted live text to past");
            state.links.extend(links);
        }
        other => warn!(offset = %other, "unexpected diff offset"),
    }
}

fn apply_reread(
    state: &mut ContentState,
    offset: ContentOffset,
    text: &str,
    effects: &mut Vec<ContentEffect>,
) {
    match offset {
        ContentOffset::StartReread => {
            debug!("reread acknowledged, clearing live text");
            state.text.live.clear();
        }
        ContentOffset::PastText => {
            debug!("ignoring past text during reread");
        }
        ContentOffset::LiveText => {
            debug!("received live text, reread complete");
            state.reread_in_progress = false;
            if !text.is_empty() {
                effects.push(ContentEffect::Cue(AudioCue::TypingStart));
            }
            state.text.live = text.to_string();
        }
        other => debug!(offset = %other, "ignoring unexpected chunk during reread"),
    }
}
