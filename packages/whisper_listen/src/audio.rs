//! Audio cue playback.
//!
//! The session only says *which* cue; `CuePlayer` applies the typing-sound
//! preference and tracks whether the typing loop is running, and a
//! `CueSink` does the actual output.

use std::io::Write;

use tracing::debug;
use whisper_protocol::AudioCue;

pub trait CueSink: Send {
    fn typing(&mut self, on: bool);
    fn sound(&mut self, name: &str);
}

/// Rings the terminal bell for named sounds. Typing has no terminal sound.
pub struct TerminalBell;

impl CueSink for TerminalBell {
    fn typing(&mut self, on: bool) {
        debug!(on, "typing cue");
    }

    fn sound(&mut self, name: &str) {
        debug!(sound = name, "playing sound");
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(b"\x07");
        let _ = stderr.flush();
    }
}

pub struct CuePlayer {
    sink: Box<dyn CueSink>,
    play_typing: bool,
    typing: bool,
}

impl CuePlayer {
    pub fn new(sink: Box<dyn CueSink>, play_typing: bool) -> Self {
        Self {
            sink,
            play_typing,
            typing: false,
        }
    }

    #[cfg(test)]
    pub fn play_typing(&self) -> bool {
        self.play_typing
    }

    #[cfg(test)]
    pub fn is_typing(&self) -> bool {
        self.typing
    }

    pub fn apply(&mut self, cue: &AudioCue) {
        match cue {
            AudioCue::TypingStart => {
                if self.play_typing && !self.typing {
                    self.typing = true;
                    self.sink.typing(true);
                }
            }
            AudioCue::TypingEnd => {
                if self.play_typing {
                    self.stop();
                }
            }
            AudioCue::TypingStop => self.stop(),
            AudioCue::Sound(name) => self.sink.sound(name),
        }
    }

    /// Flip the typing-sound preference; turning it off stops the loop.
    pub fn toggle_typing(&mut self) -> bool {
        self.play_typing = !self.play_typing;
        if !self.play_typing {
            self.stop();
        }
        self.play_typing
    }

    pub fn stop(&mut self) {
        if self.typing {
            self.typing = false;
            self.sink.typing(false);
        }
    }
}
