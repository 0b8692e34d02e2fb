//! Terminal presentation: scrollback, the live line, and the exit screen.
//!
//! Past text is written once as it is promoted; the live line is redrawn
//! in place on every update.

use anyhow::{Result, bail};
use std::io::{self, BufRead, Write};
use whisper_protocol::{ExitReason, SessionSnapshot};

const CLEAR_LINE: &str = "\r\x1b[2K";

pub struct TerminalView<W: Write> {
    out: W,
    status: String,
    past_len: usize,
    links_shown: usize,
}

impl<W: Write> TerminalView<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            status: String::new(),
            past_len: 0,
            links_shown: 0,
        }
    }

    pub fn render(&mut self, snap: &SessionSnapshot) -> io::Result<()> {
        if snap.exit.is_some() {
            return Ok(());
        }
        if snap.status != self.status {
            self.status.clone_from(&snap.status);
            let line = match snap.status.as_str() {
                "waiting" => "waiting for the whisperer...".to_string(),
                "requesting" => "asking to listen...".to_string(),
                _ => "listening".to_string(),
            };
            writeln!(self.out, "{CLEAR_LINE}[{line}]")?;
        }

        let new_past = match snap.past.get(self.past_len..) {
            Some(new_past) => new_past,
            None => {
                // Buffer was replaced after a re-join.
                self.past_len = 0;
                self.links_shown = 0;
                &snap.past
            }
        };
        if !new_past.is_empty() {
            write!(self.out, "{CLEAR_LINE}{new_past}")?;
        }
        self.past_len = snap.past.len();

        if snap.links.len() < self.links_shown {
            self.links_shown = 0;
        }
        for link in &snap.links[self.links_shown..] {
            writeln!(self.out, "{CLEAR_LINE}  link: {} <{}>", link.host, link.url)?;
        }
        self.links_shown = snap.links.len();

        write!(self.out, "{CLEAR_LINE}{}", snap.live)?;
        self.out.flush()
    }

    pub fn transcript(&mut self, url: &str) -> io::Result<()> {
        writeln!(self.out, "{CLEAR_LINE}[transcript available: {url}]")?;
        self.out.flush()
    }

    pub fn notice(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{CLEAR_LINE}[{text}]")?;
        self.out.flush()
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Text shown after the session ends. `reason` is `None` when the
/// connection was lost rather than closed by either side.
pub fn exit_screen(
    conversation_name: &str,
    whisperer_name: &str,
    reason: Option<&ExitReason>,
    transcript_url: Option<&str>,
) -> String {
    let mut screen = format!("Disconnected from conversation \u{201c}{conversation_name}\u{201d}\n");
    match reason {
        Some(reason) if reason.is_user_initiated() => {}
        Some(reason) => {
            screen.push_str(&reason.message(whisperer_name));
            screen.push('\n');
        }
        None => screen.push_str("The connection to the server was lost.\n"),
    }
    if let Some(url) = transcript_url {
        screen.push_str(&format!("A transcript of this conversation is at {url}\n"));
    }
    screen.push_str("Run listen again to rejoin.\n");
    screen
}

/// Ask for a display name until a non-blank one is entered.
pub fn prompt_name<R: BufRead, W: Write>(
    mut input: R,
    mut output: W,
    conversation_name: Option<&str>,
    whisperer_name: Option<&str>,
) -> Result<String> {
    let whisperer = whisperer_name.unwrap_or("the whisperer");
    match conversation_name {
        Some(name) => writeln!(
            output,
            "You are about to listen to {whisperer} in the conversation \u{201c}{name}\u{201d}."
        )?,
        None => writeln!(output, "You are about to listen to {whisperer}.")?,
    }
    writeln!(
        output,
        "{whisperer} will see the name you enter here before letting you in."
    )?;
    loop {
        write!(output, "Your name: ")?;
        output.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            bail!("no name entered");
        }
        let name = line.trim();
        if !name.is_empty() {
            return Ok(name.to_string());
        }
    }
}
