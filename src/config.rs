//! Configuration for the tcp-zero server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "tcp-zero")]
#[command(version)]
#[command(about = "A minimal framed TCP server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1:9573)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Outbound messages buffered per connection before `put` waits
    #[arg(short = 'q', long)]
    pub queue_capacity: Option<usize>,

    /// Delay before retrying a temporarily failed accept, in milliseconds
    #[arg(long)]
    pub accept_backoff_ms: Option<u64>,

    /// Listen backlog
    #[arg(long)]
    pub backlog: Option<i32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Listener and accept loop settings
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    #[serde(default = "default_accept_backoff_ms")]
    pub accept_backoff_ms: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            backlog: default_backlog(),
            accept_backoff_ms: default_accept_backoff_ms(),
        }
    }
}

/// Per-connection settings
#[derive(Debug, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:9573".to_string()
}

fn default_backlog() -> i32 {
    1024
}

fn default_accept_backoff_ms() -> u64 {
    10
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub backlog: i32,
    pub accept_backoff: Duration,
    pub queue_capacity: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default())
    }
}

impl Config {
    /// Server defaults with a different listen address.
    pub fn with_listen(listen: impl Into<String>) -> Self {
        Self {
            listen: listen.into(),
            ..Self::default()
        }
    }

    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let base = Self::from_toml(toml_config);

        let config = Config {
            listen: cli.listen.unwrap_or(base.listen),
            backlog: cli.backlog.unwrap_or(base.backlog),
            accept_backoff: cli
                .accept_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(base.accept_backoff),
            queue_capacity: cli.queue_capacity.unwrap_or(base.queue_capacity),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                base.log_level
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn from_toml(toml_config: TomlConfig) -> Self {
        Config {
            listen: toml_config.server.listen,
            backlog: toml_config.server.backlog,
            accept_backoff: Duration::from_millis(toml_config.server.accept_backoff_ms),
            queue_capacity: toml_config.session.queue_capacity,
            log_level: toml_config.logging.level,
        }
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.backlog <= 0 {
            return Err(ConfigError::Invalid("backlog must be positive".to_string()));
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.listen, "127.0.0.1:9573");
        assert_eq!(config.backlog, 1024);
        assert_eq!(config.accept_backoff, Duration::from_millis(10));
        assert_eq!(config.queue_capacity, 1024);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "0.0.0.0:7000"
            backlog = 128
            accept_backoff_ms = 25

            [session]
            queue_capacity = 64

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:7000");
        assert_eq!(config.server.backlog, 128);
        assert_eq!(config.server.accept_backoff_ms, 25);
        assert_eq!(config.session.queue_capacity, 64);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TomlConfig = toml::from_str("[session]\nqueue_capacity = 8\n").unwrap();
        let config = Config::from_toml(config);
        assert_eq!(config.listen, "127.0.0.1:9573");
        assert_eq!(config.queue_capacity, 8);
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = std::env::temp_dir();
        file.push(format!("tcp-zero-config-{}.toml", std::process::id()));
        {
            let mut f = std::fs::File::create(&file).unwrap();
            writeln!(
                f,
                "[server]\nlisten = \"127.0.0.1:1111\"\n[logging]\nlevel = \"warn\""
            )
            .unwrap();
        }

        let cli = CliArgs::parse_from([
            "tcp-zero",
            "--config",
            file.to_str().unwrap(),
            "--listen",
            "127.0.0.1:2222",
            "-q",
            "16",
        ]);
        let config = Config::from_cli(cli).unwrap();
        std::fs::remove_file(&file).unwrap();

        assert_eq!(config.listen, "127.0.0.1:2222");
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        let cli = CliArgs::parse_from(["tcp-zero", "--queue-capacity", "0"]);
        assert!(matches!(
            Config::from_cli(cli),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_missing_config_file() {
        let cli = CliArgs::parse_from(["tcp-zero", "-c", "/nonexistent/tcp-zero.toml"]);
        assert!(matches!(
            Config::from_cli(cli),
            Err(ConfigError::FileRead(_, _))
        ));
    }
}
