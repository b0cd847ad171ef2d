use std::io::{IsTerminal, Write};

use anstream::{AutoStream, ColorChoice};
use anstyle::Style;

use crate::channel::{LogOrigin, LogRecordKind};
use crate::drain::{LogBatch, PresentationSink};
use crate::process_manager::is_expected_shutdown_diagnostic;
use crate::telemetry::{RenderedTelemetry, SegmentCell};
use crate::ui::progress::{IndicatifSpinnerHandle, NoopSpinnerHandle};
use crate::ui::renderer::{SpinnerHandle, UiError, UiResult};
use crate::ui::theme::{is_ci_environment, resolve_color_enabled, segment_style, OutputMode, Theme};
use crate::ui::widgets::{KeyValue, NoticeLevel};

/// Line-oriented consumer for non-interactive terminals and pipes.
pub struct PlainRenderer<W: Write> {
    writer: W,
    color_enabled: bool,
    progress_enabled: bool,
    theme: Theme,
    last_telemetry: Option<RenderedTelemetry>,
    worker_exit: Option<String>,
    write_error: Option<std::io::Error>,
}

impl<W: Write> PlainRenderer<W> {
    pub fn new(writer: W, color_enabled: bool) -> Self {
        Self {
            writer,
            color_enabled,
            progress_enabled: false,
            theme: Theme::default(),
            last_telemetry: None,
            worker_exit: None,
            write_error: None,
        }
    }

    pub fn with_progress_enabled(mut self, enabled: bool) -> Self {
        self.progress_enabled = enabled;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Exit diagnostic once the worker's terminal marker has been printed.
    pub fn worker_exit(&self) -> Option<&str> {
        self.worker_exit.as_deref()
    }

    /// First write failure hit while acting as a [`PresentationSink`].
    pub fn take_error(&mut self) -> Option<UiError> {
        self.write_error.take().map(UiError::from)
    }

    fn style_text(&self, style: Style, text: &str) -> String {
        if !self.color_enabled {
            return text.to_owned();
        }
        format!("{}{}{}", style.render(), text, style.render_reset())
    }

    fn origin_prefix(&self, origin: LogOrigin) -> String {
        let style = match origin {
            LogOrigin::ServiceLog => self.theme.accent,
            LogOrigin::WorkerStdout => self.theme.muted,
            LogOrigin::WorkerStderr => self.theme.error,
        };
        self.style_text(style, &format!("[{}]", origin.label()))
    }

    fn segment_map(&self, cells: &[SegmentCell]) -> String {
        cells
            .iter()
            .map(|cell| match segment_style(cell.tag) {
                Some(style) if self.color_enabled => {
                    format!("{}{}{}", style.render(), cell.glyph, style.render_reset())
                }
                _ => cell.glyph.to_string(),
            })
            .collect::<String>()
    }

    fn write_records(&mut self, batch: &LogBatch) -> std::io::Result<()> {
        let prefix = self.origin_prefix(batch.origin);
        for record in &batch.records {
            match record.kind {
                LogRecordKind::Line => writeln!(self.writer, "{prefix} {}", record.text)?,
                LogRecordKind::Exit => {
                    let style = if is_expected_shutdown_diagnostic(&record.text) {
                        self.theme.success
                    } else {
                        self.theme.error
                    };
                    let marker = self.style_text(self.theme.warning, "[exit]");
                    let diagnostic = self.style_text(style, &record.text);
                    writeln!(self.writer, "{marker} {diagnostic}")?;
                    self.worker_exit = Some(record.text.clone());
                }
            }
        }
        self.writer.flush()
    }

    fn write_telemetry(&mut self, telemetry: &RenderedTelemetry) -> std::io::Result<()> {
        let label = self.style_text(self.theme.label, "[segments]");
        let map = self.segment_map(&telemetry.cells);
        let stats = self.style_text(self.theme.value, &telemetry.stats_line);
        writeln!(self.writer, "{label} {map}  {stats}")?;
        self.writer.flush()
    }

    fn remember_error(&mut self, result: std::io::Result<()>) {
        if let Err(err) = result {
            if self.write_error.is_none() {
                self.write_error = Some(err);
            }
        }
    }

    pub fn section(&mut self, title: &str) -> UiResult<()> {
        let rendered = self.style_text(self.theme.accent, title);
        let underline = self.style_text(self.theme.muted, &"─".repeat(title.chars().count()));
        writeln!(self.writer, "{rendered}")?;
        writeln!(self.writer, "{underline}")?;
        Ok(())
    }

    pub fn notice(&mut self, level: NoticeLevel, body: &str) -> UiResult<()> {
        let (label, style) = match level {
            NoticeLevel::Info => ("info", self.theme.accent),
            NoticeLevel::Success => ("ok", self.theme.success),
            NoticeLevel::Warning => ("warn", self.theme.warning),
            NoticeLevel::Error => ("error", self.theme.error),
        };
        let marker = self.style_text(style, "•");
        let label = self.style_text(self.theme.muted, label);
        writeln!(self.writer, "{marker} {label}: {body}")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn key_values(&mut self, items: &[KeyValue]) -> UiResult<()> {
        for item in items {
            let key = self.style_text(self.theme.label, &item.key);
            let value = self.style_text(self.theme.value, &item.value);
            writeln!(self.writer, "{key}: {value}")?;
        }
        Ok(())
    }

    pub fn spinner(&mut self, label: &str) -> UiResult<Box<dyn SpinnerHandle>> {
        if self.progress_enabled {
            return Ok(Box::new(IndicatifSpinnerHandle::start(label)));
        }
        let marker = self.style_text(self.theme.accent, "◌");
        writeln!(self.writer, "{marker} {label}")?;
        Ok(Box::new(NoopSpinnerHandle))
    }
}

impl PlainRenderer<AutoStream<std::io::Stdout>> {
    pub fn stdout(mode: OutputMode) -> Self {
        let choice = match mode {
            OutputMode::Auto => ColorChoice::Auto,
            OutputMode::Always => ColorChoice::AlwaysAnsi,
            OutputMode::Never => ColorChoice::Never,
        };
        let stream = AutoStream::new(std::io::stdout(), choice);
        let color_enabled = resolve_color_enabled(mode, std::io::stdout().is_terminal());
        let progress_enabled = std::io::stderr().is_terminal() && !is_ci_environment();
        Self::new(stream, color_enabled).with_progress_enabled(progress_enabled)
    }
}

impl PlainRenderer<AutoStream<std::io::Stderr>> {
    pub fn stderr(mode: OutputMode) -> Self {
        let choice = match mode {
            OutputMode::Auto => ColorChoice::Auto,
            OutputMode::Always => ColorChoice::AlwaysAnsi,
            OutputMode::Never => ColorChoice::Never,
        };
        let stream = AutoStream::new(std::io::stderr(), choice);
        let color_enabled = resolve_color_enabled(mode, std::io::stderr().is_terminal());
        Self::new(stream, color_enabled)
    }
}

impl<W: Write> PresentationSink for PlainRenderer<W> {
    fn write_batch(&mut self, batch: LogBatch) {
        let result = self.write_records(&batch);
        self.remember_error(result);
    }

    fn update_telemetry(&mut self, telemetry: RenderedTelemetry) {
        if self.last_telemetry.as_ref() == Some(&telemetry) {
            return;
        }
        let result = self.write_telemetry(&telemetry);
        self.remember_error(result);
        self.last_telemetry = Some(telemetry);
    }
}
