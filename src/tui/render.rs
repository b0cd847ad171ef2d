use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::symbols::border;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use crate::process_manager::is_expected_shutdown_diagnostic;
use crate::telemetry::{CellTag, SegmentCell};
use crate::ui::theme::{DARK_GREEN, ORANGE};

use super::state::{DashboardState, LogPane, PaneLineKind};

const KEY_HINT: &str = " q quit · ↑↓ PgUp PgDn scroll · End follow ";

pub(crate) fn render_dashboard(frame: &mut Frame<'_>, state: &DashboardState) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(2, 3), Constraint::Ratio(1, 3)])
        .split(frame.area());
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(columns[0]);
    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(columns[1]);

    render_log_pane(frame, left[0], " Backend Log ", &state.backend_log, None);
    render_log_pane(
        frame,
        left[1],
        " Transcoder Log ",
        &state.worker_log,
        Some(worker_status(state)),
    );
    render_segment_map(frame, right[0], &state.segment_cells);

    let stats = Paragraph::new(state.stats_line.clone())
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::White).bg(Color::Black));
    frame.render_widget(stats, right[1]);
}

fn render_log_pane(
    frame: &mut Frame<'_>,
    area: Rect,
    title: &str,
    pane: &LogPane,
    status: Option<Line<'static>>,
) {
    let height = area.height.saturating_sub(2) as usize;
    let lines = pane
        .visible(height)
        .map(|line| match line.kind {
            PaneLineKind::Line => Line::from(line.text.clone()),
            PaneLineKind::Stderr => Line::from(vec![
                Span::styled("[stderr] ", Style::default().fg(Color::Red)),
                Span::raw(line.text.clone()),
            ]),
            PaneLineKind::Exit => Line::from(vec![
                Span::styled("[exit] ", Style::default().fg(Color::Yellow)),
                Span::styled(line.text.clone(), Style::default().fg(Color::Gray)),
            ]),
        })
        .collect::<Vec<Line>>();

    let mut block = panel_block(title, Color::DarkGray);
    if let Some(status) = status {
        block = block.title_bottom(status.right_aligned());
    }
    if !pane.is_following() {
        block = block.title_top(
            Line::from(Span::styled(" paused ", Style::default().fg(Color::Yellow)))
                .right_aligned(),
        );
    }
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_segment_map(frame: &mut Frame<'_>, area: Rect, cells: &[SegmentCell]) {
    let line = Line::from(cells.iter().map(segment_span).collect::<Vec<Span>>());
    let map = Paragraph::new(line)
        .wrap(Wrap { trim: false })
        .block(panel_block(" Segment Map ", Color::DarkGray).title_bottom(
            Line::from(Span::styled(KEY_HINT, Style::default().fg(Color::DarkGray)))
                .right_aligned(),
        ));
    frame.render_widget(map, area);
}

fn worker_status(state: &DashboardState) -> Line<'static> {
    match state.worker_exit.as_deref() {
        None => Line::from(Span::styled(" running ", Style::default().fg(Color::Green))),
        Some(diagnostic) if is_expected_shutdown_diagnostic(diagnostic) => Line::from(
            Span::styled(format!(" {diagnostic} "), Style::default().fg(Color::Green)),
        ),
        Some(diagnostic) => Line::from(Span::styled(
            format!(" {diagnostic} "),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
    }
}

pub(crate) fn segment_span(cell: &SegmentCell) -> Span<'static> {
    let white = Color::White;
    let style = match cell.tag {
        CellTag::DoneFilled => Style::default().fg(rgb(DARK_GREEN)),
        CellTag::Done => Style::default().bg(rgb(DARK_GREEN)).fg(white),
        CellTag::InProgress => Style::default().bg(rgb(ORANGE)).fg(white),
        CellTag::Error => Style::default().bg(Color::Red).fg(white),
        CellTag::Plain => Style::default(),
    };
    Span::styled(cell.glyph.to_string(), style)
}

fn rgb((r, g, b): (u8, u8, u8)) -> Color {
    Color::Rgb(r, g, b)
}

pub(crate) fn panel_block<'a>(title: &'a str, border_color: Color) -> Block<'a> {
    Block::default()
        .borders(Borders::ALL)
        .border_set(border::ROUNDED)
        .border_style(Style::default().fg(border_color))
        .title_top(
            Line::from(Span::styled(
                title,
                Style::default()
                    .fg(Color::Magenta)
                    .add_modifier(Modifier::BOLD),
            ))
            .left_aligned(),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{LogOrigin, LogRecord};
    use crate::drain::{LogBatch, PresentationSink};
    use crate::telemetry::parse_status_update;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    #[test]
    fn segment_spans_follow_cell_tags() {
        let filled = segment_span(&SegmentCell {
            glyph: '█',
            tag: CellTag::DoneFilled,
        });
        assert_eq!(filled.style.fg, Some(Color::Rgb(0x20, 0x75, 0x20)));
        assert_eq!(filled.style.bg, None);

        let in_progress = segment_span(&SegmentCell {
            glyph: '░',
            tag: CellTag::InProgress,
        });
        assert_eq!(in_progress.style.bg, Some(Color::Rgb(0xd9, 0x7c, 0x13)));
        assert_eq!(in_progress.style.fg, Some(Color::White));

        let plain = segment_span(&SegmentCell {
            glyph: 'x',
            tag: CellTag::Plain,
        });
        assert_eq!(plain.style, Style::default());
    }

    #[test]
    fn dashboard_draws_all_panes() {
        let mut state = DashboardState::new();
        state.write_batch(LogBatch {
            origin: LogOrigin::WorkerStdout,
            records: vec![LogRecord::line(LogOrigin::WorkerStdout, "worker ready")],
        });
        state.update_telemetry(
            parse_status_update("status update queued=3 segments=\"██\" downloads=\"✓▶\"")
                .expect("telemetry")
                .render(),
        );

        let mut terminal = Terminal::new(TestBackend::new(120, 30)).expect("terminal");
        terminal
            .draw(|frame| render_dashboard(frame, &state))
            .expect("draw");
        let screen = terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect::<String>();

        for needle in [
            "Backend Log",
            "Transcoder Log",
            "Segment Map",
            "worker ready",
            "Seg:  3q",
        ] {
            assert!(screen.contains(needle), "missing {needle}");
        }
    }
}
