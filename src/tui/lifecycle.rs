use std::io;

use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnableLineWrap, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Style};
use ratatui::widgets::Paragraph;
use ratatui::Terminal;

use crate::host::{Host, SessionOutcome};
use crate::process_manager::StopOutcome;
use crate::ui::{KeyValue, OutputMode, PlainRenderer};

use super::DashboardError;

pub(super) type TuiTerminal = Terminal<CrosstermBackend<std::io::Stdout>>;

pub(super) fn init_terminal() -> Result<TuiTerminal, io::Error> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

pub(super) fn restore_terminal(terminal: &mut TuiTerminal) -> Result<(), io::Error> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, EnableLineWrap)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Stops the worker while drawing escalation progress, then leaves the alternate screen.
pub(super) fn shutdown(terminal: &mut TuiTerminal, host: &mut Host) -> Result<StopOutcome, io::Error> {
    let outcome = host.stop_with_progress(|progress| {
        let _ = draw_shutdown_status(terminal, progress.label());
    });
    restore_terminal(terminal)?;
    Ok(outcome)
}

pub(super) fn render_summary(outcome: &SessionOutcome, pid: Option<u32>) -> Result<(), DashboardError> {
    let mut renderer = PlainRenderer::stdout(OutputMode::from_env());
    renderer.section("Worker")?;
    renderer.key_values(&[
        KeyValue::new(
            "pid",
            pid.map(|pid| pid.to_string()).unwrap_or_else(|| "-".to_owned()),
        ),
        KeyValue::new(
            "exit",
            outcome.worker_exit.clone().unwrap_or_else(|| "-".to_owned()),
        ),
        KeyValue::new("stop", outcome.stop.label()),
    ])?;
    Ok(())
}

fn draw_shutdown_status(terminal: &mut TuiTerminal, status: &str) -> Result<(), io::Error> {
    terminal.draw(|frame| {
        let area = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(1)])
            .split(area);
        let footer = Paragraph::new(status.to_owned()).style(Style::default().fg(Color::Yellow));
        frame.render_widget(footer, chunks[1]);
    })?;
    Ok(())
}
