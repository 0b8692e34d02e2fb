use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::prelude::*;

mod audio;
mod config;
mod driver;
mod metrics;
mod telemetry;
mod transport;
mod view;

use crate::audio::{CuePlayer, TerminalBell};
use crate::config::{
    FileConfig, IdentityOverrides, ListenerConfig, ListenerDirs, load_config, save_setting,
};
use crate::driver::{Command, Driver};
use crate::telemetry::PresenceLogger;
use crate::transport::TransportError;
use crate::transport::websocket::WsTransport;
use crate::view::{TerminalView, exit_screen, prompt_name};

#[derive(Parser)]
#[command(name = "listen")]
#[command(about = "Listen to a live Whisper conversation")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Custom data directory (defaults to ~/.whisper-listen)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Join a conversation and follow it live (the default)
    Join(JoinArgs),

    /// Print the effective configuration
    Config,
}

#[derive(Parser, Default)]
struct JoinArgs {
    /// Conversation id to listen to
    #[arg(long)]
    conversation: Option<String>,

    /// Display name of the conversation
    #[arg(long)]
    conversation_name: Option<String>,

    /// Display name of the whisperer
    #[arg(long)]
    whisperer: Option<String>,

    /// Your display name, shown to the whisperer
    #[arg(long)]
    name: Option<String>,

    /// Pub/sub server URL
    #[arg(long)]
    url: Option<String>,
}

impl JoinArgs {
    fn overrides(&self) -> IdentityOverrides {
        IdentityOverrides {
            conversation_id: self.conversation.clone(),
            conversation_name: self.conversation_name.clone(),
            whisperer_name: self.whisperer.clone(),
            client_name: self.name.clone(),
            transport_url: self.url.clone(),
        }
    }
}

fn init_logging(debug: bool) {
    let default_directive = if debug {
        "listen=debug,whisper_protocol=debug,info"
    } else {
        "listen=info,whisper_protocol=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let dirs = ListenerDirs::new(cli.data_dir.clone())?;

    match cli.command {
        None => join_command(&dirs, JoinArgs::default()).await,
        Some(Commands::Join(args)) => join_command(&dirs, args).await,
        Some(Commands::Config) => config_command(&dirs),
    }
}

fn config_command(dirs: &ListenerDirs) -> Result<()> {
    let fc: FileConfig = load_config(&dirs.data_dir)
        .extract()
        .context("Failed to load configuration")?;
    println!("# {}", dirs.config_toml_path().display());
    print!("{}", toml::to_string_pretty(&fc)?);
    Ok(())
}

async fn join_command(dirs: &ListenerDirs, args: JoinArgs) -> Result<()> {
    let mut fc: FileConfig = load_config(&dirs.data_dir)
        .extract()
        .context("Failed to load configuration")?;
    args.overrides().apply(&mut fc);
    dirs.ensure_client_id(&mut fc)?;

    if fc.identity.client_name.as_deref().is_none_or(|n| n.trim().is_empty()) {
        let name = prompt_name(
            std::io::stdin().lock(),
            std::io::stdout(),
            fc.identity.conversation_name.as_deref(),
            fc.identity.whisperer_name.as_deref(),
        )?;
        save_setting(
            &dirs.config_toml_path(),
            "identity",
            "client_name",
            toml::Value::String(name.clone()),
        )?;
        fc.identity.client_name = Some(name);
    }

    let config = ListenerConfig::from_file(&fc)?;
    let identity = config.identity.clone();
    info!(
        conversation = %identity.conversation_id,
        client_id = %identity.client_id,
        "joining conversation"
    );

    let transport = match WsTransport::connect(&config.transport, &identity.client_id).await {
        Ok(transport) => transport,
        Err(TransportError::Unavailable) => {
            return Err(anyhow!(
                "Could not reach the pub/sub server at {}. Is it running?",
                config.transport.url
            ));
        }
        Err(e) => return Err(e).context("Failed to connect to the pub/sub server"),
    };

    let (tx, rx) = mpsc::channel::<Command>(16);
    spawn_keyboard_reader(tx.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(Command::Leave).await;
        }
    });

    let presence_log = PresenceLogger::new(&config.telemetry, &identity.client_id);
    if presence_log.is_enabled() {
        info!(url = %config.telemetry.log_url(), "logging presence chunks");
    }

    println!("Commands: r = reread, t = toggle typing sounds, q = leave");
    let mut driver = Driver::new(
        identity.clone(),
        transport,
        CuePlayer::new(Box::new(TerminalBell), config.play_typing),
        TerminalView::new(std::io::stdout()),
        presence_log,
        config.transport.drop_grace,
    )
    .with_settings_path(dirs.config_toml_path());

    let outcome = driver.run(rx).await?;

    println!();
    print!(
        "{}",
        exit_screen(
            &identity.conversation_name,
            &identity.whisperer_name,
            outcome.reason.as_ref(),
            outcome.snapshot.transcript_url.as_deref(),
        )
    );

    let metrics = driver.metrics().snapshot();
    info!(
        uptime_secs = metrics.uptime_secs,
        received = metrics.inbound.received,
        not_addressed = metrics.inbound.not_addressed,
        malformed = metrics.inbound.malformed,
        published = metrics.outbound.published,
        rereads = metrics.outbound.rereads_requested,
        "session ended"
    );
    Ok(())
}

/// Forward keyboard lines as commands. Runs on its own thread since stdin
/// reads block.
fn spawn_keyboard_reader(tx: mpsc::Sender<Command>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match Command::parse(&line) {
                Some(command) => {
                    if tx.blocking_send(command).is_err() {
                        break;
                    }
                }
                None => debug!(input = %line, "unrecognized command"),
            }
        }
    });
}
