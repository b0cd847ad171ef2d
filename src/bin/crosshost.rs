use std::io::IsTerminal;

use crosshost::capture::ServiceLogSink;
use crosshost::config::{load_config, resolve_settings, HostConfig, DEFAULT_LOG_FILTER};
use crosshost::host::{Host, SessionOutcome};
use crosshost::tui::run_dashboard;
use crosshost::ui::interrupt::install_interrupt_flag;
use crosshost::ui::{run_plain_session, NoticeLevel, OutputMode, PlainRenderer};
use crosshost::{parse_command, print_usage, Command};
use tracing_subscriber::EnvFilter;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let output_mode = OutputMode::from_env();
    let args = match parse_command(args) {
        Ok(Command::Run(args)) => args,
        Ok(Command::Help) => {
            print_usage();
            return;
        }
        Err(err) => fail_with_usage(output_mode, &format!("invalid arguments: {err}")),
    };

    let file = match args.config.as_deref() {
        Some(path) => match load_config(path) {
            Ok(file) => file,
            Err(err) => fail_with_usage(output_mode, &err.to_string()),
        },
        None => HostConfig::default(),
    };
    let settings = match resolve_settings(&args, file) {
        Ok(settings) => settings,
        Err(err) => fail_with_usage(output_mode, &err.to_string()),
    };

    let mut host = Host::new(&settings);
    init_tracing(&settings.log_filter, host.service_log_sink());

    let plain = settings.plain || !std::io::stdout().is_terminal();
    let result = if plain {
        if let Err(err) = install_interrupt_flag() {
            tracing::warn!(error = %err, "could not install Ctrl-C handler");
        }
        let mut renderer = PlainRenderer::stdout(output_mode);
        run_plain_session(&mut host, &mut renderer, settings.drain_interval)
            .map_err(|err| err.to_string())
    } else {
        run_dashboard(&mut host, settings.drain_interval).map_err(|err| err.to_string())
    };

    match result {
        Ok(outcome) if outcome.is_clean() => {}
        Ok(outcome) => exit_with_worker_failure(output_mode, &outcome),
        Err(err) => {
            let mut renderer = PlainRenderer::stderr(output_mode);
            let _ = renderer.notice(NoticeLevel::Error, &err);
            std::process::exit(1);
        }
    }
}

/// Host logs are formatted without color and routed into the service log pane.
fn init_tracing(level_filter: &str, sink: ServiceLogSink) {
    let filter =
        EnvFilter::try_new(level_filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .compact()
        .with_writer(sink)
        .try_init();
}

fn fail_with_usage(output_mode: OutputMode, message: &str) -> ! {
    let mut renderer = PlainRenderer::stderr(output_mode);
    let _ = renderer.notice(NoticeLevel::Error, message);
    print_usage();
    std::process::exit(2);
}

fn exit_with_worker_failure(output_mode: OutputMode, outcome: &SessionOutcome) -> ! {
    let mut renderer = PlainRenderer::stderr(output_mode);
    let diagnostic = outcome.worker_exit.as_deref().unwrap_or("unknown");
    let _ = renderer.notice(
        NoticeLevel::Error,
        &format!("worker exited unexpectedly ({diagnostic})"),
    );
    std::process::exit(1);
}
