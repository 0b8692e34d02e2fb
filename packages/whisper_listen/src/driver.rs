//! Async event loop for one listening session.
//!
//! The loop owns the transport and the [`Session`]. Inbound messages and
//! user commands go through the session; the effects it returns are executed
//! here, in order. An `Exit` effect runs teardown and ends the loop.

use anyhow::Result;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use whisper_protocol::address::control_channel;
use whisper_protocol::{Effect, ExitReason, Identity, PublishKind, Session, SessionSnapshot};

use crate::audio::CuePlayer;
use crate::config::save_setting;
use crate::metrics::SessionMetrics;
use crate::telemetry::PresenceLogger;
use crate::transport::Transport;
use crate::view::TerminalView;

/// Presence data while connected and during teardown.
const PRESENCE_CONNECT: &str = "connect";
const PRESENCE_DROPPING: &str = "dropping";

/// Actions the user can take while listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Reread,
    Leave,
    ToggleTyping,
}

impl Command {
    /// Map a line of keyboard input to a command.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "r" | "reread" => Some(Self::Reread),
            "q" | "quit" | "leave" => Some(Self::Leave),
            "t" | "typing" => Some(Self::ToggleTyping),
            _ => None,
        }
    }
}

/// How a session ended.
#[derive(Debug)]
pub struct RunOutcome {
    /// `None` when the connection was lost before either side left.
    pub reason: Option<ExitReason>,
    pub snapshot: SessionSnapshot,
}

pub struct Driver<T: Transport, W: Write> {
    session: Session,
    transport: T,
    cues: CuePlayer,
    view: TerminalView<W>,
    presence_log: PresenceLogger,
    metrics: SessionMetrics,
    drop_grace: Duration,
    /// Where to save the typing-sound preference; `None` keeps it in memory.
    settings_path: Option<PathBuf>,
}

impl<T: Transport, W: Write> Driver<T, W> {
    pub fn new(
        identity: Identity,
        transport: T,
        cues: CuePlayer,
        view: TerminalView<W>,
        presence_log: PresenceLogger,
        drop_grace: Duration,
    ) -> Self {
        Self {
            session: Session::new(identity),
            transport,
            cues,
            view,
            presence_log,
            metrics: SessionMetrics::new(),
            drop_grace,
            settings_path: None,
        }
    }

    pub fn with_settings_path(mut self, path: PathBuf) -> Self {
        self.settings_path = Some(path);
        self
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    pub async fn run(&mut self, mut commands: mpsc::Receiver<Command>) -> Result<RunOutcome> {
        let control = control_channel(&self.session.identity().conversation_id);
        let effects = self.session.start();
        if let Some(reason) = self.execute(effects).await? {
            return Ok(self.outcome(Some(reason)));
        }
        if let Err(e) = self
            .transport
            .enter_presence(&control, PRESENCE_CONNECT)
            .await
        {
            warn!(error = %e, "failed to enter presence");
        }
        self.render();

        loop {
            let effects = tokio::select! {
                biased;

                Some(command) = commands.recv() => self.on_command(command),

                message = self.transport.next_message() => {
                    let Some(message) = message else {
                        warn!("transport closed before the session ended");
                        self.cues.stop();
                        if let Err(e) = self.transport.close().await {
                            debug!(error = %e, "close after connection loss failed");
                        }
                        return Ok(self.outcome(None));
                    };
                    let (disposition, effects) = self.session.handle(&message);
                    self.metrics.record_inbound(&disposition);
                    effects
                }
            };

            if let Some(reason) = self.execute(effects).await? {
                return Ok(self.outcome(Some(reason)));
            }
            self.render();
        }
    }

    fn on_command(&mut self, command: Command) -> Vec<Effect> {
        debug!(?command, "user command");
        match command {
            Command::Reread => self.session.request_reread(),
            Command::Leave => self.session.leave(),
            Command::ToggleTyping => {
                let on = self.cues.toggle_typing();
                info!(play_typing = on, "typing sounds toggled");
                let notice = if on { "typing sounds on" } else { "typing sounds off" };
                if let Err(e) = self.view.notice(notice) {
                    debug!(error = %e, "notice failed");
                }
                if let Some(path) = &self.settings_path {
                    if let Err(e) = save_setting(path, "audio", "play_typing", toml::Value::Boolean(on)) {
                        warn!(error = %e, "failed to save typing preference");
                    }
                }
                Vec::new()
            }
        }
    }

    /// Execute effects in order. Returns the exit reason once teardown ran.
    async fn execute(&mut self, effects: Vec<Effect>) -> Result<Option<ExitReason>> {
        for effect in effects {
            match effect {
                Effect::Publish {
                    channel,
                    name,
                    data,
                    kind,
                } => match self.transport.publish(&channel, &name, &data).await {
                    Ok(()) => self.metrics.published(kind == PublishKind::RereadRequest),
                    Err(e) => {
                        warn!(channel = %channel, to = %name, error = %e, "publish failed");
                        self.metrics.publish_failed();
                    }
                },
                Effect::Subscribe { channel } => {
                    if let Err(e) = self.transport.attach(&channel).await {
                        warn!(channel = %channel, error = %e, "attach failed");
                    }
                }
                Effect::Unsubscribe { channel } => {
                    if let Err(e) = self.transport.detach(&channel).await {
                        warn!(channel = %channel, error = %e, "detach failed");
                    }
                }
                Effect::Cue(cue) => self.cues.apply(&cue),
                Effect::LogPresence { direction, chunk } => self.presence_log.log(direction, &chunk),
                Effect::TranscriptAvailable { url } => {
                    if let Err(e) = self.view.transcript(&url) {
                        debug!(error = %e, "transcript notice failed");
                    }
                }
                Effect::Exit(reason) => {
                    self.teardown(&reason).await;
                    return Ok(Some(reason));
                }
            }
        }
        Ok(None)
    }

    /// Stop cues, mark presence as dropping, give queued publishes time to
    /// flush, then release the connection.
    async fn teardown(&mut self, reason: &ExitReason) {
        info!(reason = reason.code(), "leaving conversation");
        self.cues.stop();
        let control = control_channel(&self.session.identity().conversation_id);
        if let Err(e) = self
            .transport
            .update_presence(&control, PRESENCE_DROPPING)
            .await
        {
            debug!(error = %e, "failed to update presence");
        }
        tokio::time::sleep(self.drop_grace).await;
        if let Err(e) = self.transport.close().await {
            warn!(error = %e, "failed to close transport");
        }
    }

    fn render(&mut self) {
        if let Err(e) = self.view.render(&self.session.snapshot()) {
            debug!(error = %e, "render failed");
        }
    }

    fn outcome(&self, reason: Option<ExitReason>) -> RunOutcome {
        RunOutcome {
            reason,
            snapshot: self.session.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::tests::RecordingSink;
    use crate::transport::memory::{Call, MemoryTransport};

    const CONTENT: &str = "6f1c2a0e-3b7d-4e59-9a1f-0c8d2e4b6a71";
    const CONTROL: &str = "conv:control";

    fn identity() -> Identity {
        Identity {
            conversation_id: "conv".into(),
            conversation_name: "Standup".into(),
            whisperer_name: "Dan".into(),
            client_id: "me".into(),
            client_name: "Alice".into(),
        }
    }

    fn driver(transport: MemoryTransport) -> (Driver<MemoryTransport, Vec<u8>>, RecordingSink) {
        let sink = RecordingSink::default();
        let driver = Driver::new(
            identity(),
            transport,
            CuePlayer::new(Box::new(sink.clone()), true),
            TerminalView::new(Vec::new()),
            PresenceLogger::disabled(),
            Duration::ZERO,
        );
        (driver, sink)
    }

    fn admitted(transport: &mut MemoryTransport) {
        transport.push(CONTROL, "me", "-20|conv|Standup|dan|dan|Dan|");
        transport.push(CONTROL, "me", &format!("-22|conv|Standup|dan|dan|Dan|{CONTENT}"));
    }

    /// Terminal output that always fails.
    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }
    }

    fn no_commands() -> mpsc::Receiver<Command> {
        mpsc::channel(1).1
    }

    #[test]
    fn command_parsing() {
        assert_eq!(Command::parse("r\n"), Some(Command::Reread));
        assert_eq!(Command::parse(" q "), Some(Command::Leave));
        assert_eq!(Command::parse("typing"), Some(Command::ToggleTyping));
        assert_eq!(Command::parse("hello"), None);
    }

    #[tokio::test]
    async fn full_session_until_whisperer_stops() {
        let content = format!("conv:{CONTENT}");
        let mut transport = MemoryTransport::new();
        admitted(&mut transport);
        transport.push(&content, "ALL", "-4|");
        transport.push(&content, "ALL", "-3|hello");
        transport.push(&content, "ALL", "5| world");
        transport.push(&content, "ALL", "-1|");
        transport.push(CONTROL, "ALL", "-28|t1");
        transport.push(CONTROL, "ALL", "-25|||dan|||");

        let (mut driver, sink) = driver(transport);
        let outcome = driver.run(no_commands()).await.unwrap();

        assert_eq!(outcome.reason, Some(ExitReason::WhispererStopped));
        assert_eq!(outcome.snapshot.past, "hello world\n");
        assert_eq!(outcome.snapshot.transcript_url.as_deref(), Some("/transcript/conv/t1"));

        let t = &driver.transport;
        assert_eq!(t.calls[0], Call::Attach(CONTROL.into()));
        assert!(t.calls.contains(&Call::EnterPresence("connect".into())));
        assert!(t.calls.contains(&Call::Attach(content.clone())));
        assert_eq!(
            t.published(),
            vec![
                ("whisperer", "-26|conv||me|me||"),
                ("dan", "-21|conv|Standup|me|me|Alice|"),
                ("dan", "-24|conv|Standup|me|me|Alice|"),
                ("whisperer", "-5|live"),
            ]
        );
        assert_eq!(
            &t.calls[t.calls.len() - 2..],
            &[Call::UpdatePresence("dropping".into()), Call::Close]
        );
        assert_eq!(sink.events(), vec!["typing:true", "typing:false"]);

        let metrics = driver.metrics().snapshot();
        assert_eq!(metrics.inbound.received, 8);
        assert_eq!(metrics.outbound.rereads_requested, 1);

        let screen = String::from_utf8(driver.view.into_inner()).unwrap();
        assert!(screen.contains("hello world\n"));
        assert!(screen.contains("/transcript/conv/t1"));
    }

    #[tokio::test]
    async fn leave_command_drops_once_and_closes() {
        let mut transport = MemoryTransport::new();
        admitted(&mut transport);
        let (tx, rx) = mpsc::channel(4);
        tx.send(Command::Leave).await.unwrap();
        tx.send(Command::Leave).await.unwrap();

        let (mut driver, _) = driver(transport);
        let outcome = driver.run(rx).await.unwrap();

        assert_eq!(outcome.reason, Some(ExitReason::UserInitiated));
        let t = &driver.transport;
        let drops = t
            .published()
            .into_iter()
            .filter(|(_, data)| *data == "-25|||me|||")
            .count();
        assert_eq!(drops, 1);
        assert_eq!(t.calls.last(), Some(&Call::Close));
        // the drop is published before the connection is released
        let drop_at = t
            .calls
            .iter()
            .position(|c| matches!(c, Call::Publish { data, .. } if data == "-25|||me|||"));
        let close_at = t.calls.iter().position(|c| *c == Call::Close);
        assert!(drop_at < close_at);
    }

    #[tokio::test]
    async fn messages_for_others_are_counted_not_answered() {
        let mut transport = MemoryTransport::new();
        transport.push(CONTROL, "someone-else", "-20|conv|Standup|dan|dan|Dan|");
        transport.push(CONTROL, "me", "garbage");

        let (mut driver, _) = driver(transport);
        let outcome = driver.run(no_commands()).await.unwrap();

        assert_eq!(outcome.reason, None);
        assert_eq!(outcome.snapshot.status, "waiting");
        assert_eq!(driver.transport.published().len(), 1);
        assert!(driver.transport.closed());
        let metrics = driver.metrics().snapshot();
        assert_eq!(metrics.inbound.not_addressed, 1);
        assert_eq!(metrics.inbound.malformed, 1);
    }

    #[tokio::test]
    async fn refused_listener_exits_with_drop() {
        let mut transport = MemoryTransport::new();
        transport.push(CONTROL, "me", "-23|conv|Standup|dan|dan|Dan|");
        transport.push(CONTROL, "me", "-20|conv|Standup|dan|dan|Dan|");

        let (mut driver, _) = driver(transport);
        let outcome = driver.run(no_commands()).await.unwrap();

        assert_eq!(outcome.reason, Some(ExitReason::Refused));
        assert_eq!(
            driver.transport.published().last(),
            Some(&("whisperer", "-25|||me|||"))
        );
    }

    #[tokio::test]
    async fn toggle_typing_saves_preference() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        let (tx, rx) = mpsc::channel(4);
        tx.send(Command::ToggleTyping).await.unwrap();
        drop(tx);

        let (driver, _) = driver(MemoryTransport::new());
        let mut driver = driver.with_settings_path(path.clone());
        driver.run(rx).await.unwrap();

        assert!(!driver.cues.play_typing());
        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains("play_typing = false"));
    }

    #[tokio::test]
    async fn output_errors_do_not_end_the_session() {
        let mut transport = MemoryTransport::new();
        transport.push(CONTROL, "ALL", "-28|t1");
        transport.push(CONTROL, "ALL", "-25|||dan|||");
        let (tx, rx) = mpsc::channel(4);
        tx.send(Command::ToggleTyping).await.unwrap();

        let mut driver = Driver::new(
            identity(),
            transport,
            CuePlayer::new(Box::new(RecordingSink::default()), true),
            TerminalView::new(BrokenPipe),
            PresenceLogger::disabled(),
            Duration::ZERO,
        );
        let outcome = driver.run(rx).await.unwrap();

        assert_eq!(outcome.reason, Some(ExitReason::WhispererStopped));
        assert_eq!(outcome.snapshot.transcript_url.as_deref(), Some("/transcript/conv/t1"));
        assert!(!driver.cues.play_typing());
    }

    #[tokio::test]
    async fn only_reread_publishes_count_as_rereads() {
        let mut transport = MemoryTransport::new();
        admitted(&mut transport);

        let (mut driver, _) = driver(transport);
        driver.run(no_commands()).await.unwrap();

        // offer, listenRequest, joining and the initial reread
        let metrics = driver.metrics().snapshot();
        assert_eq!(metrics.outbound.published, 4);
        assert_eq!(metrics.outbound.rereads_requested, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_waits_for_grace_period() {
        let mut transport = MemoryTransport::new();
        transport.push(CONTROL, "ALL", "-27||||||");

        let (driver, _) = driver(transport);
        let mut driver = driver;
        driver.drop_grace = Duration::from_millis(1000);

        let started = tokio::time::Instant::now();
        let outcome = driver.run(no_commands()).await.unwrap();
        assert_eq!(outcome.reason, Some(ExitReason::WhispererPaused));
        assert!(started.elapsed() >= Duration::from_millis(1000));
    }
}
