use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use whisper_protocol::Identity;

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   config.toml:     [transport]
//                    url = "wss://whisper.example.com/pubsub"
//
//   env var:         WHISPER_TRANSPORT__URL=wss://...   (double underscore = nesting)
//
//   (single underscore stays within field names: WHISPER_TRANSPORT__DROP_GRACE_MS)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub identity: IdentityFileConfig,
    #[serde(default)]
    pub transport: TransportFileConfig,
    #[serde(default)]
    pub telemetry: TelemetryFileConfig,
    #[serde(default)]
    pub audio: AudioFileConfig,
}

/// Who is listening to what (lives under `[identity]` in config.toml).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IdentityFileConfig {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub conversation_name: Option<String>,
    #[serde(default)]
    pub whisperer_name: Option<String>,
    /// Generated and saved on first run.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Prompted for and saved on first run.
    #[serde(default)]
    pub client_name: Option<String>,
}

/// Pub/sub connection tunables (lives under `[transport]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransportFileConfig {
    #[serde(default = "default_transport_url")]
    pub url: String,
    /// Delay between publishing `dropping` and closing the connection.
    #[serde(default = "default_drop_grace_ms")]
    pub drop_grace_ms: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for TransportFileConfig {
    fn default() -> Self {
        Self {
            url: default_transport_url(),
            drop_grace_ms: default_drop_grace_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Presence-chunk logging (lives under `[telemetry]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TelemetryFileConfig {
    #[serde(default)]
    pub log_presence_chunks: bool,
    #[serde(default = "default_telemetry_endpoint")]
    pub endpoint: String,
}

impl Default for TelemetryFileConfig {
    fn default() -> Self {
        Self {
            log_presence_chunks: false,
            endpoint: default_telemetry_endpoint(),
        }
    }
}

/// Audio cue preferences (lives under `[audio]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AudioFileConfig {
    #[serde(default = "default_play_typing")]
    pub play_typing: bool,
}

impl Default for AudioFileConfig {
    fn default() -> Self {
        Self {
            play_typing: default_play_typing(),
        }
    }
}

fn default_transport_url() -> String {
    "ws://127.0.0.1:8080/pubsub".to_string()
}
fn default_drop_grace_ms() -> u64 {
    1000
}
fn default_channel_capacity() -> usize {
    256
}
fn default_telemetry_endpoint() -> String {
    "http://127.0.0.1:8080".to_string()
}
fn default_play_typing() -> bool {
    true
}

/// Build a figment that layers: defaults → config.toml → WHISPER_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `WHISPER_IDENTITY__CONVERSATION_ID=abc`  →  `identity.conversation_id = "abc"`
///   `WHISPER_AUDIO__PLAY_TYPING=false`  →  `audio.play_typing = false`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("WHISPER_").split("__"))
}

/// Identity values given on the command line. They win over every other layer.
#[derive(Clone, Debug, Default)]
pub struct IdentityOverrides {
    pub conversation_id: Option<String>,
    pub conversation_name: Option<String>,
    pub whisperer_name: Option<String>,
    pub client_name: Option<String>,
    pub transport_url: Option<String>,
}

impl IdentityOverrides {
    pub fn apply(&self, fc: &mut FileConfig) {
        let id = &mut fc.identity;
        overlay(&mut id.conversation_id, &self.conversation_id);
        overlay(&mut id.conversation_name, &self.conversation_name);
        overlay(&mut id.whisperer_name, &self.whisperer_name);
        overlay(&mut id.client_name, &self.client_name);
        if let Some(url) = &self.transport_url {
            fc.transport.url = url.clone();
        }
    }
}

fn overlay(field: &mut Option<String>, value: &Option<String>) {
    if value.is_some() {
        field.clone_from(value);
    }
}

// =============================================================================
// Runtime config structs (derived from FileConfig, used by the driver)
// =============================================================================

/// Resolved transport configuration (runtime view).
#[derive(Clone, Debug)]
pub struct TransportConfig {
    pub url: String,
    pub drop_grace: Duration,
    /// Capacity of the inbound and outbound frame queues.
    pub channel_capacity: usize,
}

impl TransportConfig {
    pub fn from_file(fc: &TransportFileConfig) -> Self {
        Self {
            url: fc.url.clone(),
            drop_grace: Duration::from_millis(fc.drop_grace_ms),
            channel_capacity: fc.channel_capacity.max(1),
        }
    }
}

/// Resolved telemetry configuration (runtime view).
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub endpoint: String,
}

impl TelemetryConfig {
    pub fn from_file(fc: &TelemetryFileConfig) -> Self {
        Self {
            enabled: fc.log_presence_chunks,
            endpoint: fc.endpoint.clone(),
        }
    }

    pub fn log_url(&self) -> String {
        format!(
            "{}/api/v2/logPresenceChunk",
            self.endpoint.trim_end_matches('/')
        )
    }
}

/// Everything the listener needs to run one session.
#[derive(Clone, Debug)]
pub struct ListenerConfig {
    pub identity: Identity,
    pub transport: TransportConfig,
    pub telemetry: TelemetryConfig,
    pub play_typing: bool,
}

impl ListenerConfig {
    /// Fails if any identity value is still missing.
    pub fn from_file(fc: &FileConfig) -> Result<Self> {
        let id = &fc.identity;
        let identity = Identity {
            conversation_id: required(&id.conversation_id, "conversation_id", "--conversation")?,
            conversation_name: required(
                &id.conversation_name,
                "conversation_name",
                "--conversation-name",
            )?,
            whisperer_name: required(&id.whisperer_name, "whisperer_name", "--whisperer")?,
            client_id: required(&id.client_id, "client_id", "(generated on first run)")?,
            client_name: required(&id.client_name, "client_name", "--name")?,
        };
        Ok(Self {
            identity,
            transport: TransportConfig::from_file(&fc.transport),
            telemetry: TelemetryConfig::from_file(&fc.telemetry),
            play_typing: fc.audio.play_typing,
        })
    }
}

fn required(value: &Option<String>, key: &str, flag: &str) -> Result<String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => bail!(
            "missing {key}: set [identity].{key} in config.toml, WHISPER_IDENTITY__{}, or {flag}",
            key.to_uppercase()
        ),
    }
}

// =============================================================================
// Directory layout config (not tunable via figment, derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct ListenerDirs {
    pub data_dir: PathBuf,
}

impl ListenerDirs {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".whisper-listen"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        info!("Data directory: {}", data_dir.display());

        Ok(Self { data_dir })
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    /// Fill in a missing client id with a fresh UUID and save it.
    pub fn ensure_client_id(&self, fc: &mut FileConfig) -> Result<String> {
        if let Some(id) = fc.identity.client_id.as_deref().filter(|id| !id.is_empty()) {
            return Ok(id.to_string());
        }
        let id = uuid::Uuid::new_v4().to_string();
        save_setting(
            &self.config_toml_path(),
            "identity",
            "client_id",
            toml::Value::String(id.clone()),
        )?;
        info!(client_id = %id, "generated client id");
        fc.identity.client_id = Some(id.clone());
        Ok(id)
    }
}

/// Read-modify-write config.toml to persist one `[section] key = value`.
pub fn save_setting(path: &Path, section: &str, key: &str, value: toml::Value) -> Result<()> {
    let mut doc = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        contents
            .parse::<toml::Table>()
            .with_context(|| format!("Failed to parse {}", path.display()))?
    } else {
        toml::Table::new()
    };

    let table = doc
        .entry(section)
        .or_insert_with(|| toml::Value::Table(toml::Table::new()))
        .as_table_mut()
        .with_context(|| format!("[{section}] is not a table"))?;
    table.insert(key.to_string(), value);

    let serialized = toml::to_string_pretty(&doc).context("Failed to serialize config.toml")?;
    std::fs::write(path, serialized)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}
