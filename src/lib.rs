pub mod capture;
pub mod channel;
pub mod config;
pub mod config_template;
pub mod drain;
pub mod host;
pub mod process_manager;
pub mod telemetry;
pub mod terminal_text;
pub mod tui;
pub mod ui;

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run(HostArgs),
    Help,
}

/// Raw command-line flags. Unset values fall back to the config file, then defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostArgs {
    pub media_dir: Option<PathBuf>,
    pub tools_dir: Option<PathBuf>,
    pub executable: Option<PathBuf>,
    pub template: Option<PathBuf>,
    pub transcoder_port: Option<u16>,
    pub stop_timeout_secs: Option<f64>,
    pub config: Option<PathBuf>,
    pub log_filter: Option<String>,
    pub plain: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliParseError {
    MissingValue(&'static str),
    InvalidNumber { flag: &'static str, value: String },
    UnknownArgument(String),
}

impl std::fmt::Display for CliParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliParseError::MissingValue(flag) => write!(f, "{flag} requires a value"),
            CliParseError::InvalidNumber { flag, value } => {
                write!(f, "{flag} expects a number, got `{value}`")
            }
            CliParseError::UnknownArgument(arg) => write!(f, "unknown argument: {arg}"),
        }
    }
}

impl std::error::Error for CliParseError {}

pub fn parse_command<I>(args: I) -> Result<Command, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut parsed = HostArgs::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--media-dir" => {
                parsed.media_dir = Some(PathBuf::from(required_value(&mut args, "--media-dir")?));
            }
            "--tools-dir" => {
                parsed.tools_dir = Some(PathBuf::from(required_value(&mut args, "--tools-dir")?));
            }
            "--executable" => {
                parsed.executable =
                    Some(PathBuf::from(required_value(&mut args, "--executable")?));
            }
            "--template" => {
                parsed.template = Some(PathBuf::from(required_value(&mut args, "--template")?));
            }
            "--transcoder-port" => {
                let value = required_value(&mut args, "--transcoder-port")?;
                parsed.transcoder_port = Some(parse_number(&value, "--transcoder-port")?);
            }
            "--stop-timeout" => {
                let value = required_value(&mut args, "--stop-timeout")?;
                parsed.stop_timeout_secs = Some(parse_number(&value, "--stop-timeout")?);
            }
            "--config" => {
                parsed.config = Some(PathBuf::from(required_value(&mut args, "--config")?));
            }
            "--log-filter" => {
                parsed.log_filter = Some(required_value(&mut args, "--log-filter")?);
            }
            "--plain" => {
                parsed.plain = true;
            }
            "--help" | "-h" => return Ok(Command::Help),
            other => return Err(CliParseError::UnknownArgument(other.to_owned())),
        }
    }

    Ok(Command::Run(parsed))
}

fn required_value<I>(args: &mut I, flag: &'static str) -> Result<String, CliParseError>
where
    I: Iterator<Item = String>,
{
    args.next().ok_or(CliParseError::MissingValue(flag))
}

fn parse_number<T: std::str::FromStr>(value: &str, flag: &'static str) -> Result<T, CliParseError> {
    value.parse::<T>().map_err(|_| CliParseError::InvalidNumber {
        flag,
        value: value.to_owned(),
    })
}

pub fn print_usage() {
    eprintln!(
        "crosshost\n\nUSAGE:\n  crosshost --media-dir <PATH> [options]\n\nRuns the transcoding worker next to the host, streams its logs, and renders the\nlive segment map.\n\nOPTIONS:\n  --media-dir <PATH>         Media root substituted into the worker config (required\n                             here or as `media_dir` in --config)\n  --tools-dir <PATH>         Worker working directory (default: tools)\n  --executable <NAME>        Worker executable inside the tools dir (default: transcode)\n  --template <NAME>          Config template inside the tools dir\n                             (default: config.yaml.template)\n  --transcoder-port <PORT>   Port substituted into the worker config (default: 6002)\n  --stop-timeout <SECS>      Grace period before the worker is killed (default: 5)\n  --config <FILE>            TOML file with defaults for any option above\n  --log-filter <FILTER>      tracing filter for host logs (default: info)\n  --plain                    Line output instead of the dashboard\n\nGENERAL:\n  -h, --help                 Print help\n\nENVIRONMENT:\n  CROSSHOST_COLOR            always | never | auto (plain output)\n  NO_COLOR                   Disable color when CROSSHOST_COLOR is unset\n"
    );
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
