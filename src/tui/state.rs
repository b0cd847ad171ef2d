use std::collections::VecDeque;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::channel::{LogOrigin, LogRecordKind};
use crate::config::MAX_LOG_LINES;
use crate::drain::{LogBatch, PresentationSink};
use crate::telemetry::{RenderedTelemetry, SegmentCell};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PaneLineKind {
    Line,
    Stderr,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PaneLine {
    pub(crate) kind: PaneLineKind,
    pub(crate) text: String,
}

/// Bounded scrollback. `scroll_back` counts lines up from the newest; 0 follows the tail.
#[derive(Debug, Default)]
pub(crate) struct LogPane {
    lines: VecDeque<PaneLine>,
    scroll_back: usize,
}

impl LogPane {
    pub(crate) fn push(&mut self, kind: PaneLineKind, text: String) {
        self.lines.push_back(PaneLine { kind, text });
        while self.lines.len() > MAX_LOG_LINES {
            self.lines.pop_front();
        }
        if self.scroll_back > 0 {
            self.scroll_back = (self.scroll_back + 1).min(self.max_scroll_back());
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lines.len()
    }

    pub(crate) fn is_following(&self) -> bool {
        self.scroll_back == 0
    }

    pub(crate) fn scroll_up(&mut self, lines: usize) {
        self.scroll_back = self
            .scroll_back
            .saturating_add(lines)
            .min(self.max_scroll_back());
    }

    pub(crate) fn scroll_down(&mut self, lines: usize) {
        self.scroll_back = self.scroll_back.saturating_sub(lines);
    }

    pub(crate) fn follow(&mut self) {
        self.scroll_back = 0;
    }

    /// Lines that fit in `height` rows at the current scroll position.
    pub(crate) fn visible(&self, height: usize) -> impl Iterator<Item = &PaneLine> {
        let end = self.lines.len().saturating_sub(self.scroll_back);
        let start = end.saturating_sub(height);
        self.lines.range(start..end)
    }

    fn max_scroll_back(&self) -> usize {
        self.lines.len().saturating_sub(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopControl {
    Continue,
    Quit,
}

#[derive(Debug, Default)]
pub(crate) struct DashboardState {
    pub(crate) backend_log: LogPane,
    pub(crate) worker_log: LogPane,
    pub(crate) segment_cells: Vec<SegmentCell>,
    pub(crate) stats_line: String,
    pub(crate) worker_exit: Option<String>,
}

impl DashboardState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn handle_key(&mut self, key: KeyEvent, page: usize) -> LoopControl {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return LoopControl::Quit,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return LoopControl::Quit
            }
            KeyCode::Up => self.worker_log.scroll_up(1),
            KeyCode::Down => self.worker_log.scroll_down(1),
            KeyCode::PageUp => self.worker_log.scroll_up(page.max(1)),
            KeyCode::PageDown => self.worker_log.scroll_down(page.max(1)),
            KeyCode::End => self.worker_log.follow(),
            _ => {}
        }
        LoopControl::Continue
    }
}

impl PresentationSink for DashboardState {
    fn write_batch(&mut self, batch: LogBatch) {
        for record in batch.records {
            match (record.kind, batch.origin) {
                (LogRecordKind::Exit, _) => {
                    self.worker_log.push(PaneLineKind::Exit, record.text.clone());
                    self.worker_exit = Some(record.text);
                }
                (LogRecordKind::Line, LogOrigin::ServiceLog) => {
                    self.backend_log.push(PaneLineKind::Line, record.text)
                }
                (LogRecordKind::Line, LogOrigin::WorkerStdout) => {
                    self.worker_log.push(PaneLineKind::Line, record.text)
                }
                (LogRecordKind::Line, LogOrigin::WorkerStderr) => {
                    self.worker_log.push(PaneLineKind::Stderr, record.text)
                }
            }
        }
    }

    fn update_telemetry(&mut self, telemetry: RenderedTelemetry) {
        self.segment_cells = telemetry.cells;
        self.stats_line = telemetry.stats_line;
    }
}
