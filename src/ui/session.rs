use std::io::Write;
use std::thread;
use std::time::Duration;

use crate::host::{Host, HostError, SessionOutcome};
use crate::ui::interrupt::interrupted;
use crate::ui::plain_renderer::PlainRenderer;
use crate::ui::renderer::UiError;
use crate::ui::widgets::{KeyValue, NoticeLevel};

#[derive(Debug)]
pub enum PlainSessionError {
    Host(HostError),
    Ui(UiError),
}

impl std::fmt::Display for PlainSessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlainSessionError::Host(err) => write!(f, "{err}"),
            PlainSessionError::Ui(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for PlainSessionError {}

impl From<HostError> for PlainSessionError {
    fn from(value: HostError) -> Self {
        Self::Host(value)
    }
}

impl From<UiError> for PlainSessionError {
    fn from(value: UiError) -> Self {
        Self::Ui(value)
    }
}

/// Starts the host and prints drained output until the worker exits or Ctrl-C arrives.
pub fn run_plain_session<W: Write>(
    host: &mut Host,
    renderer: &mut PlainRenderer<W>,
    drain_interval: Duration,
) -> Result<SessionOutcome, PlainSessionError> {
    let spinner = renderer.spinner("Starting worker")?;
    if let Err(err) = host.start() {
        spinner.finish_error("worker failed to start");
        host.drain(renderer);
        return Err(err.into());
    }
    let pid = host
        .worker_pid()
        .map(|pid| pid.to_string())
        .unwrap_or_else(|| "?".to_owned());
    spinner.finish_success(&format!("worker running (pid {pid})"));

    let mut write_error = None;
    loop {
        host.drain(renderer);
        if let Some(err) = renderer.take_error() {
            write_error = Some(err);
            break;
        }
        if renderer.worker_exit().is_some() || interrupted() {
            break;
        }
        thread::sleep(drain_interval);
    }
    let user_quit = renderer.worker_exit().is_none();

    let stop = host.stop_with_progress(|progress| {
        let _ = renderer.notice(NoticeLevel::Info, progress.label());
    });
    if let Some(err) = write_error {
        return Err(err.into());
    }
    host.drain(renderer);

    let worker_exit = renderer
        .worker_exit()
        .map(str::to_owned)
        .or_else(|| host.last_exit().map(str::to_owned));
    renderer.section("Worker")?;
    renderer.key_values(&[
        KeyValue::new("pid", pid),
        KeyValue::new("exit", worker_exit.clone().unwrap_or_else(|| "-".to_owned())),
        KeyValue::new("stop", stop.label()),
    ])?;

    Ok(SessionOutcome {
        worker_exit,
        stop,
        user_quit,
    })
}
