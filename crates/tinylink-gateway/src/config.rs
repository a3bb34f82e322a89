use clap::Parser;
use ipnet::IpNet;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tinylink_shortener::PipelineConfig;
use tinylink_telemetry::LogFormat;

pub const CONFIG_ENV: &str = "CONFIG";
pub const SERVER_ADDRESS_ENV: &str = "SERVER_ADDRESS";
pub const GRPC_ADDRESS_ENV: &str = "GRPC_ADDRESS";
pub const BASE_URL_ENV: &str = "BASE_URL";
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const FILE_STORAGE_PATH_ENV: &str = "FILE_STORAGE_PATH";
pub const DATABASE_DSN_ENV: &str = "DATABASE_DSN";
pub const TRUSTED_SUBNET_ENV: &str = "TRUSTED_SUBNET";
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";
pub const SHUTDOWN_GRACE_SECS_ENV: &str = "SHUTDOWN_GRACE_SECS";
pub const DELETION_WORKERS_ENV: &str = "DELETION_WORKERS";
pub const DELETION_BATCH_SIZE_ENV: &str = "DELETION_BATCH_SIZE";

pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:8080";
pub const DEFAULT_GRPC_ADDRESS: &str = "127.0.0.1:3200";
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid default {field}: {message}")]
    Default {
        field: &'static str,
        message: String,
    },
}

/// Command line, with every flag also readable from the environment.
///
/// Anything left unset falls back to the JSON config file, then to the
/// built-in default.
#[derive(Debug, Default, Parser)]
#[command(name = "tinylink", version, about = "URL shortener with HTTP and gRPC APIs")]
pub struct Cli {
    /// Path to a JSON config file.
    #[arg(short = 'c', long = "config", env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    #[arg(short = 'a', long, env = SERVER_ADDRESS_ENV)]
    pub server_address: Option<SocketAddr>,

    #[arg(short = 'g', long, env = GRPC_ADDRESS_ENV)]
    pub grpc_address: Option<SocketAddr>,

    /// Prefix of generated short links.
    #[arg(short = 'b', long, env = BASE_URL_ENV)]
    pub base_url: Option<String>,

    #[arg(short = 'l', long, env = LOG_LEVEL_ENV)]
    pub log_level: Option<String>,

    /// `text` or `json`.
    #[arg(long, env = LOG_FORMAT_ENV)]
    pub log_format: Option<LogFormat>,

    #[arg(short = 'f', long, env = FILE_STORAGE_PATH_ENV)]
    pub file_storage_path: Option<PathBuf>,

    #[arg(short = 'd', long, env = DATABASE_DSN_ENV, hide_env_values = true)]
    pub database_dsn: Option<String>,

    /// CIDR allowed to read internal statistics.
    #[arg(short = 't', long, env = TRUSTED_SUBNET_ENV)]
    pub trusted_subnet: Option<IpNet>,

    #[arg(long, env = JWT_SECRET_ENV, hide_env_values = true)]
    pub jwt_secret: Option<String>,

    #[arg(long, env = SHUTDOWN_GRACE_SECS_ENV)]
    pub shutdown_grace_secs: Option<u64>,

    #[arg(long, env = DELETION_WORKERS_ENV)]
    pub deletion_workers: Option<usize>,

    #[arg(long, env = DELETION_BATCH_SIZE_ENV)]
    pub deletion_batch_size: Option<usize>,
}

/// Contents of the JSON config file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server_address: Option<SocketAddr>,
    pub grpc_address: Option<SocketAddr>,
    pub base_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub file_storage_path: Option<PathBuf>,
    pub database_dsn: Option<String>,
    pub trusted_subnet: Option<IpNet>,
    pub jwt_secret: Option<String>,
    pub shutdown_grace_secs: Option<u64>,
    pub deletion_workers: Option<usize>,
    pub deletion_batch_size: Option<usize>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: SocketAddr,
    pub grpc_address: SocketAddr,
    pub base_url: String,
    pub log_level: String,
    pub log_format: LogFormat,
    pub file_storage_path: Option<PathBuf>,
    pub database_dsn: Option<String>,
    pub trusted_subnet: Option<IpNet>,
    pub jwt_secret: Option<String>,
    pub shutdown_grace: Duration,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Parses the process arguments and environment, then the config file
    /// they point at, if any.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::read(path)?,
            None => FileConfig::default(),
        };
        Self::merge(cli, file)
    }

    /// Merges sources: command line and environment first, then file, then
    /// defaults. Empty strings count as unset.
    pub fn merge(cli: Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let defaults = PipelineConfig::default();

        Ok(Self {
            server_address: match cli.server_address.or(file.server_address) {
                Some(addr) => addr,
                None => parse_default("server_address", DEFAULT_SERVER_ADDRESS)?,
            },
            grpc_address: match cli.grpc_address.or(file.grpc_address) {
                Some(addr) => addr,
                None => parse_default("grpc_address", DEFAULT_GRPC_ADDRESS)?,
            },
            base_url: non_empty(cli.base_url)
                .or(non_empty(file.base_url))
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            log_level: non_empty(cli.log_level)
                .or(non_empty(file.log_level))
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            log_format: cli.log_format.or(file.log_format).unwrap_or_default(),
            file_storage_path: cli
                .file_storage_path
                .or(file.file_storage_path)
                .filter(|path| !path.as_os_str().is_empty()),
            database_dsn: non_empty(cli.database_dsn).or(non_empty(file.database_dsn)),
            trusted_subnet: cli.trusted_subnet.or(file.trusted_subnet),
            jwt_secret: non_empty(cli.jwt_secret).or(non_empty(file.jwt_secret)),
            shutdown_grace: Duration::from_secs(
                cli.shutdown_grace_secs
                    .or(file.shutdown_grace_secs)
                    .unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECS),
            ),
            pipeline: PipelineConfig::builder()
                .workers(
                    cli.deletion_workers
                        .or(file.deletion_workers)
                        .unwrap_or(defaults.workers),
                )
                .batch_size(
                    cli.deletion_batch_size
                        .or(file.deletion_batch_size)
                        .unwrap_or(defaults.batch_size),
                )
                .build(),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_default(field: &'static str, value: &str) -> Result<SocketAddr, ConfigError> {
    value.parse().map_err(|e: std::net::AddrParseError| ConfigError::Default {
        field,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = Config::merge(Cli::default(), FileConfig::default()).unwrap();

        assert_eq!(config.server_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.grpc_address.to_string(), "127.0.0.1:3200");
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_dsn.is_none());
        assert!(config.file_storage_path.is_none());
        assert!(config.trusted_subnet.is_none());
        assert_eq!(config.shutdown_grace, Duration::from_secs(10));
        assert_eq!(config.pipeline.workers, 3);
        assert_eq!(config.pipeline.batch_size, 10);
    }

    #[test]
    fn flags_take_precedence_over_file() {
        let cli = Cli::try_parse_from([
            "tinylink",
            "-a",
            "0.0.0.0:9000",
            "-b",
            "https://short.example",
            "-t",
            "10.0.0.0/8",
        ])
        .unwrap();
        let file: FileConfig = serde_json::from_str(
            r#"{
                "server_address": "127.0.0.1:7000",
                "base_url": "https://file.example",
                "database_dsn": "mysql://u:p@db/tinylink",
                "log_format": "json"
            }"#,
        )
        .unwrap();

        let config = Config::merge(cli, file).unwrap();

        assert_eq!(config.server_address.to_string(), "0.0.0.0:9000");
        assert_eq!(config.base_url, "https://short.example");
        assert_eq!(
            config.database_dsn.as_deref(),
            Some("mysql://u:p@db/tinylink")
        );
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.trusted_subnet.unwrap().to_string(), "10.0.0.0/8");
    }

    #[test]
    fn empty_values_count_as_unset() {
        let cli = Cli {
            base_url: Some(String::new()),
            database_dsn: Some("  ".to_string()),
            file_storage_path: Some(PathBuf::new()),
            ..Cli::default()
        };

        let config = Config::merge(cli, FileConfig::default()).unwrap();

        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.database_dsn.is_none());
        assert!(config.file_storage_path.is_none());
    }

    #[test]
    fn reads_config_file_from_flag() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"grpc_address": "127.0.0.1:4000", "shutdown_grace_secs": 2}}"#
        )
        .unwrap();

        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            ..Cli::default()
        };
        let config = Config::from_cli(cli).unwrap();

        assert_eq!(config.grpc_address.to_string(), "127.0.0.1:4000");
        assert_eq!(config.shutdown_grace, Duration::from_secs(2));
    }

    #[test]
    fn malformed_config_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = FileConfig::read(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
