use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::process_manager::WorkerSpec;
use crate::HostArgs;

pub const DEFAULT_TRANSCODER_PORT: u16 = 6002;
pub const DEFAULT_TOOLS_DIR: &str = "tools";
pub const DEFAULT_EXECUTABLE: &str = "transcode";
pub const DEFAULT_TEMPLATE: &str = "config.yaml.template";
pub const DEFAULT_LOG_FILTER: &str = "info";
pub const WORKER_SUBCOMMAND: &str = "serve";

pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);
pub const SERVICE_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

pub const DRAIN_INTERVAL: Duration = Duration::from_millis(100);
pub const CAPTURE_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const BATCH_SIZE: usize = 10;
pub const BATCH_PAUSE: Duration = Duration::from_millis(10);

pub const MAX_LOG_LINES: usize = 2000;

/// Optional `crosshost.toml` contents. Every key may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    pub media_dir: Option<PathBuf>,
    pub tools_dir: Option<PathBuf>,
    pub executable: Option<PathBuf>,
    pub template: Option<PathBuf>,
    pub transcoder_port: Option<u16>,
    pub stop_timeout_secs: Option<f64>,
    pub settle_delay_ms: Option<u64>,
    pub drain_interval_ms: Option<u64>,
    pub batch_size: Option<usize>,
    pub batch_pause_ms: Option<u64>,
    pub log_filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostSettings {
    pub worker: WorkerSpec,
    pub drain_interval: Duration,
    pub batch_size: usize,
    pub batch_pause: Duration,
    pub log_filter: String,
    pub plain: bool,
}

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        error: std::io::Error,
    },
    Parse {
        path: PathBuf,
        error: toml::de::Error,
    },
    MissingMediaDir,
    InvalidStopTimeout(f64),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, error } => {
                write!(f, "failed reading config `{}`: {error}", path.display())
            }
            ConfigError::Parse { path, error } => {
                write!(f, "failed parsing config `{}`: {error}", path.display())
            }
            ConfigError::MissingMediaDir => {
                write!(f, "media directory is required (--media-dir or `media_dir`)")
            }
            ConfigError::InvalidStopTimeout(value) => {
                write!(f, "stop timeout must be a non-negative number of seconds, got {value}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

pub fn load_config(path: &Path) -> Result<HostConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|error| ConfigError::Read {
        path: path.to_path_buf(),
        error,
    })?;
    toml::from_str::<HostConfig>(&raw).map_err(|error| ConfigError::Parse {
        path: path.to_path_buf(),
        error,
    })
}

/// Merges CLI flags over file values over built-in defaults.
pub fn resolve_settings(args: &HostArgs, file: HostConfig) -> Result<HostSettings, ConfigError> {
    let media_dir = args
        .media_dir
        .clone()
        .or(file.media_dir)
        .ok_or(ConfigError::MissingMediaDir)?;
    let tools_dir = args
        .tools_dir
        .clone()
        .or(file.tools_dir)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TOOLS_DIR));
    let executable = args
        .executable
        .clone()
        .or(file.executable)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_EXECUTABLE));
    let port = args
        .transcoder_port
        .or(file.transcoder_port)
        .unwrap_or(DEFAULT_TRANSCODER_PORT);

    let stop_timeout = match args.stop_timeout_secs.or(file.stop_timeout_secs) {
        Some(secs) if secs.is_finite() && secs >= 0.0 => Duration::from_secs_f64(secs),
        Some(secs) => return Err(ConfigError::InvalidStopTimeout(secs)),
        None => STOP_TIMEOUT,
    };

    let mut worker = WorkerSpec::new(tools_dir, executable, media_dir, port)
        .with_stop_timeout(stop_timeout);
    if let Some(template) = args.template.clone().or(file.template) {
        worker.template = template;
    }
    if let Some(ms) = file.settle_delay_ms {
        worker.settle_delay = Duration::from_millis(ms);
    }

    Ok(HostSettings {
        worker,
        drain_interval: file
            .drain_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(DRAIN_INTERVAL),
        batch_size: file.batch_size.unwrap_or(BATCH_SIZE).max(1),
        batch_pause: file
            .batch_pause_ms
            .map(Duration::from_millis)
            .unwrap_or(BATCH_PAUSE),
        log_filter: args
            .log_filter
            .clone()
            .or(file.log_filter)
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_owned()),
        plain: args.plain,
    })
}
