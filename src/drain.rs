use std::thread;
use std::time::Duration;

use crate::channel::{LogOrigin, LogRecord, LogRecordKind, OutputChannel};
use crate::telemetry::{parse_status_update, RenderedTelemetry};
use crate::terminal_text::strip_ansi;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogBatch {
    pub origin: LogOrigin,
    pub records: Vec<LogRecord>,
}

/// Receives drained output. Owns all layout; calls must not block for long.
pub trait PresentationSink {
    fn write_batch(&mut self, batch: LogBatch);
    /// Replaces whatever telemetry was shown before.
    fn update_telemetry(&mut self, telemetry: RenderedTelemetry);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub records: usize,
    pub batches: usize,
    pub status_updates: usize,
}

#[derive(Debug, Clone)]
pub struct Drainer {
    batch_size: usize,
    batch_pause: Duration,
}

impl Drainer {
    pub fn new(batch_size: usize, batch_pause: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            batch_pause,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// One tick: take what is queued, forward the newest status update, then flush the
    /// rest grouped by origin in bounded batches.
    pub fn tick(&self, channel: &OutputChannel, sink: &mut dyn PresentationSink) -> DrainReport {
        self.deliver(channel.drain(), sink)
    }

    pub fn deliver(&self, records: Vec<LogRecord>, sink: &mut dyn PresentationSink) -> DrainReport {
        let mut report = DrainReport {
            records: records.len(),
            ..DrainReport::default()
        };
        if records.is_empty() {
            return report;
        }

        let mut latest_telemetry: Option<RenderedTelemetry> = None;
        let mut grouped: [Vec<LogRecord>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        for mut record in records {
            record.text = strip_ansi(&record.text);
            if record.kind == LogRecordKind::Line {
                if record.text.trim().is_empty() {
                    continue;
                }
                if let Some(snapshot) = parse_status_update(&record.text) {
                    report.status_updates += 1;
                    latest_telemetry = Some(snapshot.render());
                    continue;
                }
            }
            grouped[origin_slot(record.origin)].push(record);
        }

        if let Some(telemetry) = latest_telemetry {
            sink.update_telemetry(telemetry);
        }

        for (origin, records) in LogOrigin::ALL.into_iter().zip(grouped) {
            let mut records = records.into_iter().peekable();
            while records.peek().is_some() {
                if report.batches > 0 && !self.batch_pause.is_zero() {
                    thread::sleep(self.batch_pause);
                }
                let chunk = records
                    .by_ref()
                    .take(self.batch_size)
                    .collect::<Vec<LogRecord>>();
                sink.write_batch(LogBatch {
                    origin,
                    records: chunk,
                });
                report.batches += 1;
            }
        }
        report
    }
}

fn origin_slot(origin: LogOrigin) -> usize {
    match origin {
        LogOrigin::ServiceLog => 0,
        LogOrigin::WorkerStdout => 1,
        LogOrigin::WorkerStderr => 2,
    }
}

#[cfg(test)]
#[path = "tests/drain_tests.rs"]
mod tests;
