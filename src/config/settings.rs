//! Configuration settings for StreamRelay
//!
//! Defines the relay configuration, its defaults, and the CLI arguments of
//! the `streamrelay` binary.

use crate::error::{IoResultExt, RelayError, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default size of the relay's copy buffer in bytes
pub const DEFAULT_BUFFER_SIZE: usize = 128;

/// Default sleep between availability checks under the polling policy
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// StreamRelay - copy a stream to another on a background worker
#[derive(Parser, Debug, Clone)]
#[command(name = "streamrelay")]
#[command(author = "StreamRelay Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Relay bytes from a source to a sink on a background worker")]
#[command(long_about = r#"
StreamRelay copies everything from a source stream into a sink stream on a
dedicated worker thread.

Examples:
  streamrelay pipe input.log output.log            # File to file
  cat data | streamrelay pipe - copy.bin -b 64K    # Stdin to file
  streamrelay exec --non-blocking -- make test     # Relay a child's output
  streamrelay config --output relay.json           # Write default config
"#)]
pub struct CliArgs {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Relay a file or stdin into a file or stdout
    Pipe(PipeArgs),

    /// Run a command and relay its stdout and stderr
    Exec {
        /// Relay settings
        #[command(flatten)]
        relay: RelayArgs,

        /// Command and its arguments
        #[arg(trailing_var_arg = true, required = true, value_name = "COMMAND")]
        command: Vec<String>,
    },

    /// Print or write the default relay configuration
    Config {
        /// Write the configuration to this file instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

/// Arguments of the `pipe` subcommand
#[derive(Args, Debug, Clone)]
pub struct PipeArgs {
    /// Input file ("-" or omitted for stdin)
    #[arg(value_name = "INPUT")]
    pub input: Option<PathBuf>,

    /// Output file ("-" or omitted for stdout)
    #[arg(value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Relay settings
    #[command(flatten)]
    pub relay: RelayArgs,

    /// Show a byte counter while relaying
    #[arg(short = 'p', long)]
    pub progress: bool,
}

/// Relay tuning flags shared by subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct RelayArgs {
    /// Copy buffer size (e.g., 128, 64K, 1M)
    #[arg(short = 'b', long, value_name = "SIZE")]
    pub buffer_size: Option<String>,

    /// Flush the sink after every write
    #[arg(long)]
    pub autoflush: bool,

    /// Poll the source for available bytes instead of blocking on reads
    #[arg(long)]
    pub non_blocking: bool,

    /// Sleep between polls (e.g., 50ms, 1s)
    #[arg(long, value_name = "DURATION")]
    pub poll_interval: Option<String>,

    /// Close the sink once the relay finishes
    #[arg(long)]
    pub close: bool,

    /// Load settings from a JSON config file (flags override it)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Log output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Scheduling policy of the copy loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayMode {
    /// Blocking reads until end of stream
    #[default]
    Blocking,
    /// Check availability, read what is there, sleep, repeat
    Polling,
}

impl RelayMode {
    /// Mode for a `non_blocking` flag
    pub fn from_non_blocking(non_blocking: bool) -> Self {
        if non_blocking {
            Self::Polling
        } else {
            Self::Blocking
        }
    }

    /// Whether this is the polling policy
    pub fn is_polling(&self) -> bool {
        matches!(self, Self::Polling)
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Blocking => "blocking",
            Self::Polling => "polling",
        }
    }
}

/// Relay configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Size of the copy buffer in bytes
    pub buffer_size: usize,
    /// Flush after every non-empty write
    pub autoflush: bool,
    /// Scheduling policy
    pub mode: RelayMode,
    /// Polling sleep in microseconds
    pub poll_interval_us: u64,
    /// Close the sink during cleanup
    pub close_sink_on_exhaustion: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            autoflush: false,
            mode: RelayMode::Blocking,
            poll_interval_us: DEFAULT_POLL_INTERVAL.as_micros() as u64,
            close_sink_on_exhaustion: false,
        }
    }
}

impl RelayConfig {
    /// Polling sleep as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }

    /// Store a polling sleep. Rounds up to whole microseconds, so a non-zero
    /// duration never turns into zero.
    pub fn set_poll_interval(&mut self, interval: Duration) {
        let micros = interval.as_nanos().div_ceil(1_000);
        self.poll_interval_us = u64::try_from(micros).unwrap_or(u64::MAX);
    }

    /// Whether the polling policy is selected
    pub fn non_blocking(&self) -> bool {
        self.mode.is_polling()
    }

    /// Reject values a relay would refuse
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(RelayError::InvalidBufferSize(self.buffer_size));
        }
        if self.poll_interval_us == 0 {
            return Err(RelayError::InvalidPollInterval(self.poll_interval()));
        }
        Ok(())
    }

    /// Load a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| RelayError::config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_path(path)
    }

    /// Create config from CLI arguments
    pub fn from_cli(args: &RelayArgs) -> std::result::Result<Self, String> {
        let mut config = match &args.config {
            Some(path) => Self::load(path).map_err(|e| e.to_string())?,
            None => Self::default(),
        };

        if let Some(size) = &args.buffer_size {
            config.buffer_size =
                parse_size(size).map_err(|e| format!("Invalid buffer size: {}", e))? as usize;
        }
        if let Some(interval) = &args.poll_interval {
            let interval = humantime::parse_duration(interval)
                .map_err(|e| format!("Invalid poll interval: {}", e))?;
            config.set_poll_interval(interval);
        }
        if args.autoflush {
            config.autoflush = true;
        }
        if args.non_blocking {
            config.mode = RelayMode::Polling;
        }
        if args.close {
            config.close_sink_on_exhaustion = true;
        }

        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }
}

/// Parse human-readable size string to bytes
pub fn parse_size(size: &str) -> std::result::Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("GB") || size.ends_with('G') {
        let num = size.trim_end_matches(|c| c == 'G' || c == 'B');
        (num, 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        let num = size.trim_end_matches(|c| c == 'M' || c == 'B');
        (num, 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        let num = size.trim_end_matches(|c| c == 'K' || c == 'B');
        (num, 1024u64)
    } else if size.ends_with('B') {
        let num = size.trim_end_matches('B');
        (num, 1u64)
    } else {
        // Assume bytes if no suffix
        (size.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;

    if num < 0.0 {
        return Err(format!("Negative size: {}", num_str));
    }

    Ok((num * multiplier as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("128").unwrap(), 128);
        assert_eq!(parse_size("1K").unwrap(), 1024);
        assert_eq!(parse_size("64kb").unwrap(), 64 * 1024);
        assert_eq!(parse_size("1M").unwrap(), 1024 * 1024);
        assert_eq!(parse_size("1.5G").unwrap(), (1.5 * 1024.0 * 1024.0 * 1024.0) as u64);
        assert!(parse_size("").is_err());
        assert!(parse_size("lots").is_err());
        assert!(parse_size("-1K").is_err());
    }

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.buffer_size, 128);
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        assert!(!config.autoflush);
        assert!(!config.non_blocking());
        assert!(!config.close_sink_on_exhaustion);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = RelayConfig {
            buffer_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RelayError::InvalidBufferSize(0))));

        let config = RelayConfig {
            poll_interval_us: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RelayError::InvalidPollInterval(_))));
    }

    #[test]
    fn test_sub_millisecond_poll_interval() {
        let args = RelayArgs {
            poll_interval: Some("500us".to_string()),
            ..Default::default()
        };
        let config = RelayConfig::from_cli(&args).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_micros(500));
        assert!(config.validate().is_ok());

        let mut config = RelayConfig::default();
        config.set_poll_interval(Duration::from_nanos(300));
        assert_eq!(config.poll_interval(), Duration::from_micros(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_cli_overrides() {
        let args = RelayArgs {
            buffer_size: Some("4K".to_string()),
            autoflush: true,
            non_blocking: true,
            poll_interval: Some("10ms".to_string()),
            close: true,
            config: None,
        };
        let config = RelayConfig::from_cli(&args).unwrap();
        assert_eq!(config.buffer_size, 4096);
        assert!(config.autoflush);
        assert_eq!(config.mode, RelayMode::Polling);
        assert_eq!(config.poll_interval(), Duration::from_millis(10));
        assert!(config.close_sink_on_exhaustion);

        let bad = RelayArgs {
            buffer_size: Some("0".to_string()),
            ..Default::default()
        };
        assert!(RelayConfig::from_cli(&bad).is_err());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relay.json");

        let config = RelayConfig {
            buffer_size: 512,
            mode: RelayMode::Polling,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(RelayConfig::load(&path).unwrap(), config);

        // Flags layered over a file only touch what they set
        let args = RelayArgs {
            autoflush: true,
            config: Some(path),
            ..Default::default()
        };
        let layered = RelayConfig::from_cli(&args).unwrap();
        assert_eq!(layered.buffer_size, 512);
        assert!(layered.autoflush);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RelayConfig = serde_json::from_str(r#"{"autoflush": true}"#).unwrap();
        assert!(config.autoflush);
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn test_cli_parses_exec() {
        let args = CliArgs::parse_from(["streamrelay", "exec", "--non-blocking", "--", "echo", "hi"]);
        match args.command {
            Commands::Exec { relay, command } => {
                assert!(relay.non_blocking);
                assert_eq!(command, vec!["echo", "hi"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
