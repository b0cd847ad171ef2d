use super::{parse_command, CliParseError, Command, HostArgs};
use std::path::PathBuf;

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_owned()).collect()
}

#[test]
fn parse_without_flags_runs_with_defaults() {
    let cmd = parse_command(Vec::<String>::new()).expect("parse should succeed");
    assert_eq!(cmd, Command::Run(HostArgs::default()));
}

#[test]
fn parse_help_flag_wins_over_other_flags() {
    let cmd = parse_command(args(&["--media-dir", "/m", "-h"])).expect("parse should succeed");
    assert_eq!(cmd, Command::Help);
}

#[test]
fn parse_all_run_flags() {
    let cmd = parse_command(args(&[
        "--media-dir",
        "/media",
        "--tools-dir",
        "/opt/tools",
        "--executable",
        "go-transcode",
        "--template",
        "worker.yaml.template",
        "--transcoder-port",
        "8888",
        "--stop-timeout",
        "2.5",
        "--config",
        "crosshost.toml",
        "--log-filter",
        "debug",
        "--plain",
    ]))
    .expect("parse should succeed");
    assert_eq!(
        cmd,
        Command::Run(HostArgs {
            media_dir: Some(PathBuf::from("/media")),
            tools_dir: Some(PathBuf::from("/opt/tools")),
            executable: Some(PathBuf::from("go-transcode")),
            template: Some(PathBuf::from("worker.yaml.template")),
            transcoder_port: Some(8888),
            stop_timeout_secs: Some(2.5),
            config: Some(PathBuf::from("crosshost.toml")),
            log_filter: Some("debug".to_owned()),
            plain: true,
        })
    );
}

#[test]
fn parse_reports_missing_flag_value() {
    let err = parse_command(args(&["--media-dir"])).expect_err("value missing");
    assert_eq!(err, CliParseError::MissingValue("--media-dir"));
    assert_eq!(err.to_string(), "--media-dir requires a value");
}

#[test]
fn parse_rejects_non_numeric_port() {
    let err = parse_command(args(&["--transcoder-port", "http"])).expect_err("bad port");
    assert_eq!(
        err,
        CliParseError::InvalidNumber {
            flag: "--transcoder-port",
            value: "http".to_owned(),
        }
    );
}

#[test]
fn parse_rejects_out_of_range_port() {
    let err = parse_command(args(&["--transcoder-port", "70000"])).expect_err("port too large");
    assert!(matches!(err, CliParseError::InvalidNumber { .. }));
}

#[test]
fn parse_rejects_unknown_argument() {
    let err = parse_command(args(&["--media-dir", "/m", "--verbose"])).expect_err("unknown");
    assert_eq!(err, CliParseError::UnknownArgument("--verbose".to_owned()));
}
