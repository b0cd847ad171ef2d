//! Full-screen dashboard: backend and transcoder logs on the left, the live segment
//! map and stats bar on the right.

use std::io;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyEventKind};

use crate::host::{Host, HostError, SessionOutcome};
use crate::ui::UiError;

mod lifecycle;
mod render;
mod state;

use lifecycle::{init_terminal, render_summary, shutdown, TuiTerminal};
use render::render_dashboard;
use state::{DashboardState, LoopControl};

const INPUT_POLL_WAIT: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub enum DashboardError {
    Io(io::Error),
    Ui(UiError),
    Host(HostError),
}

impl std::fmt::Display for DashboardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DashboardError::Io(err) => write!(f, "{err}"),
            DashboardError::Ui(err) => write!(f, "{err}"),
            DashboardError::Host(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for DashboardError {}

impl From<io::Error> for DashboardError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<UiError> for DashboardError {
    fn from(value: UiError) -> Self {
        Self::Ui(value)
    }
}

impl From<HostError> for DashboardError {
    fn from(value: HostError) -> Self {
        Self::Host(value)
    }
}

/// Starts the host, then runs the dashboard until the user quits. The worker is stopped
/// before this returns, whichever way the loop ended.
pub fn run_dashboard(host: &mut Host, drain_interval: Duration) -> Result<SessionOutcome, DashboardError> {
    host.start()?;
    let pid = host.worker_pid();

    let mut terminal = match init_terminal() {
        Ok(terminal) => terminal,
        Err(err) => {
            host.stop();
            return Err(err.into());
        }
    };
    let mut state = DashboardState::new();
    let result = event_loop(&mut terminal, host, &mut state, drain_interval);
    let stop = shutdown(&mut terminal, host)?;
    result?;

    let outcome = SessionOutcome {
        worker_exit: state
            .worker_exit
            .or_else(|| host.last_exit().map(str::to_owned)),
        stop,
        user_quit: true,
    };
    render_summary(&outcome, pid)?;
    Ok(outcome)
}

fn event_loop(
    terminal: &mut TuiTerminal,
    host: &Host,
    state: &mut DashboardState,
    drain_interval: Duration,
) -> Result<(), DashboardError> {
    let mut next_drain = Instant::now();
    loop {
        let now = Instant::now();
        if now >= next_drain {
            host.drain(state);
            next_drain = now + drain_interval;
        }

        terminal.draw(|frame| render_dashboard(frame, state))?;

        let page = terminal.size()?.height.saturating_sub(2) as usize / 2;
        if event::poll(INPUT_POLL_WAIT)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press
                    && state.handle_key(key, page) == LoopControl::Quit
                {
                    return Ok(());
                }
            }
        }
    }
}
