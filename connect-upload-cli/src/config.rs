//! Configuration for the `connect-upload` binary.
//!
//! Supports both command-line arguments and a TOML configuration file.
//! CLI arguments take precedence over config file values, which take
//! precedence over the defaults.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use connect_upload::{DEFAULT_MAX_MESSAGE_SIZE, MessageLimits};
use connect_upload_core::chunk::DEFAULT_FRAME_SIZE;
use serde::Deserialize;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_ENDPOINT: &str = "http://localhost:8080";
const DEFAULT_NAME: &str = "test";
const DEFAULT_PAYLOAD_SIZE: usize = 200 * 1024 * 1024;
const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "connect-upload")]
#[command(version)]
#[command(about = "Chunked client-streaming uploads over Connect", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides it
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept uploads and answer each with the total bytes received
    Serve(ServeArgs),
    /// Upload a payload in frames and print the server's response
    Send(SendArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Address to bind to (e.g., 0.0.0.0:8080)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Port to bind on all interfaces, used when no listen address is given
    #[arg(short, long, env = "PORT")]
    pub port: Option<u16>,

    /// Largest accepted frame in bytes (0 = unlimited)
    #[arg(long)]
    pub max_message_size: Option<usize>,

    /// Deadline for each upload in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// How long in-flight uploads may drain after Ctrl-C
    #[arg(long)]
    pub shutdown_grace_ms: Option<u64>,
}

#[derive(Args, Debug, Default)]
pub struct SendArgs {
    /// Base URL of the server
    #[arg(short, long)]
    pub endpoint: Option<String>,

    /// Name carried by every frame
    #[arg(short, long)]
    pub name: Option<String>,

    /// Size in bytes of the generated payload
    #[arg(short, long, conflicts_with = "file")]
    pub size: Option<usize>,

    /// Upload this file instead of a generated payload
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Largest payload slice per frame in bytes
    #[arg(long)]
    pub frame_size: Option<NonZeroUsize>,

    /// Use JSON instead of protobuf encoding
    #[arg(long)]
    pub json: bool,

    /// Compress frames with gzip
    #[arg(long)]
    pub gzip: bool,

    /// Use HTTP/2 without negotiation (h2c)
    #[arg(long)]
    pub http2_prior_knowledge: bool,

    /// Deadline for the upload in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// `[server]` section
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    pub listen: Option<String>,
    pub max_message_size: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub shutdown_grace_ms: Option<u64>,
}

/// `[client]` section
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ClientSection {
    pub endpoint: Option<String>,
    pub name: Option<String>,
    pub size: Option<usize>,
    pub file: Option<PathBuf>,
    pub frame_size: Option<NonZeroUsize>,
    #[serde(default)]
    pub json: bool,
    #[serde(default)]
    pub gzip: bool,
    #[serde(default)]
    pub http2_prior_knowledge: bool,
    pub timeout_ms: Option<u64>,
}

/// `[logging]` section
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    pub level: Option<String>,
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub mode: Mode,
}

#[derive(Debug, Clone)]
pub enum Mode {
    Serve(ServeConfig),
    Send(SendConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeConfig {
    pub listen: String,
    pub limits: MessageLimits,
    pub timeout: Option<Duration>,
    pub shutdown_grace: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendConfig {
    pub endpoint: String,
    pub name: String,
    pub payload: PayloadSource,
    pub frame_size: NonZeroUsize,
    pub json: bool,
    pub gzip: bool,
    pub http2_prior_knowledge: bool,
    pub timeout: Option<Duration>,
}

/// Where the bytes to upload come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadSource {
    /// Generated `0x42 0x69` pattern of the given length.
    Pattern(usize),
    File(PathBuf),
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();
        let file = match &cli.config {
            Some(path) => read_toml(path)?,
            None => TomlConfig::default(),
        };
        Ok(Self::merge(cli, file))
    }

    /// Merge CLI args with TOML config (CLI takes precedence).
    pub fn merge(cli: CliArgs, file: TomlConfig) -> Self {
        let log_level = cli
            .log_level
            .or(file.logging.level)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let mode = match cli.command {
            Command::Serve(args) => Mode::Serve(ServeConfig::merge(args, file.server)),
            Command::Send(args) => Mode::Send(SendConfig::merge(args, file.client)),
        };

        Config { log_level, mode }
    }
}

impl ServeConfig {
    fn merge(args: ServeArgs, file: ServerSection) -> Self {
        let listen = args
            .listen
            .or_else(|| args.port.map(|port| format!("0.0.0.0:{port}")))
            .or(file.listen)
            .unwrap_or_else(|| format!("0.0.0.0:{DEFAULT_PORT}"));

        let limits = match args
            .max_message_size
            .or(file.max_message_size)
            .unwrap_or(DEFAULT_MAX_MESSAGE_SIZE)
        {
            0 => MessageLimits::unlimited(),
            max => MessageLimits::new(max),
        };

        ServeConfig {
            listen,
            limits,
            timeout: millis(args.timeout_ms.or(file.timeout_ms)),
            shutdown_grace: Duration::from_millis(
                args.shutdown_grace_ms
                    .or(file.shutdown_grace_ms)
                    .unwrap_or(DEFAULT_SHUTDOWN_GRACE_MS),
            ),
        }
    }
}

impl SendConfig {
    fn merge(args: SendArgs, file: ClientSection) -> Self {
        // A size or file on the command line replaces either one from the file.
        let payload = match (args.file, args.size) {
            (Some(path), _) => PayloadSource::File(path),
            (None, Some(size)) => PayloadSource::Pattern(size),
            (None, None) => match (file.file, file.size) {
                (Some(path), _) => PayloadSource::File(path),
                (None, size) => PayloadSource::Pattern(size.unwrap_or(DEFAULT_PAYLOAD_SIZE)),
            },
        };

        SendConfig {
            endpoint: args
                .endpoint
                .or(file.endpoint)
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            name: args
                .name
                .or(file.name)
                .unwrap_or_else(|| DEFAULT_NAME.to_string()),
            payload,
            frame_size: args
                .frame_size
                .or(file.frame_size)
                .unwrap_or(DEFAULT_FRAME_SIZE),
            json: args.json || file.json,
            gzip: args.gzip || file.gzip,
            http2_prior_knowledge: args.http2_prior_knowledge || file.http2_prior_knowledge,
            timeout: millis(args.timeout_ms.or(file.timeout_ms)),
        }
    }
}

/// Zero means no deadline.
fn millis(ms: Option<u64>) -> Option<Duration> {
    ms.filter(|&ms| ms > 0).map(Duration::from_millis)
}

fn read_toml(path: &PathBuf) -> Result<TomlConfig, ConfigError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead(path.clone(), e))?;
    toml::from_str(&contents).map_err(|e| ConfigError::TomlParse(path.clone(), e))
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {1}", path = .0.display())]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("failed to parse config file '{path}': {1}", path = .0.display())]
    TomlParse(PathBuf, #[source] toml::de::Error),
}
