use super::{Drainer, LogBatch, PresentationSink};
use crate::channel::{LogOrigin, LogRecord, LogRecordKind, OutputChannel};
use crate::telemetry::{CellTag, RenderedTelemetry};
use std::time::{Duration, Instant};

#[derive(Default)]
struct RecordingSink {
    batches: Vec<LogBatch>,
    telemetry: Vec<RenderedTelemetry>,
}

impl RecordingSink {
    fn calls(&self) -> usize {
        self.batches.len() + self.telemetry.len()
    }
}

impl PresentationSink for RecordingSink {
    fn write_batch(&mut self, batch: LogBatch) {
        self.batches.push(batch);
    }

    fn update_telemetry(&mut self, telemetry: RenderedTelemetry) {
        self.telemetry.push(telemetry);
    }
}

fn drainer() -> Drainer {
    Drainer::new(10, Duration::ZERO)
}

#[test]
fn empty_channel_makes_no_consumer_calls() {
    let channel = OutputChannel::new();
    let mut sink = RecordingSink::default();
    let started = Instant::now();
    let report = Drainer::new(10, Duration::from_millis(200)).tick(&channel, &mut sink);
    assert_eq!(sink.calls(), 0);
    assert_eq!(report.records, 0);
    assert!(started.elapsed() < Duration::from_millis(150));
}

#[test]
fn batches_never_exceed_configured_size() {
    let channel = OutputChannel::new();
    let sender = channel.sender();
    for i in 0..25 {
        sender.push_line(LogOrigin::WorkerStdout, format!("line {i}"));
    }
    let mut sink = RecordingSink::default();
    let report = drainer().tick(&channel, &mut sink);

    let sizes = sink
        .batches
        .iter()
        .map(|batch| batch.records.len())
        .collect::<Vec<usize>>();
    assert_eq!(sizes, vec![10, 10, 5]);
    assert_eq!(report.batches, 3);
    let flattened = sink
        .batches
        .iter()
        .flat_map(|batch| batch.records.iter().map(|record| record.text.clone()))
        .collect::<Vec<String>>();
    let expected = (0..25).map(|i| format!("line {i}")).collect::<Vec<String>>();
    assert_eq!(flattened, expected);
}

#[test]
fn records_are_grouped_by_origin() {
    let channel = OutputChannel::new();
    let sender = channel.sender();
    sender.push_line(LogOrigin::WorkerStdout, "out 1");
    sender.push_line(LogOrigin::ServiceLog, "svc 1");
    sender.push_line(LogOrigin::WorkerStderr, "err 1");
    sender.push_line(LogOrigin::WorkerStdout, "out 2");

    let mut sink = RecordingSink::default();
    drainer().tick(&channel, &mut sink);

    let summary = sink
        .batches
        .iter()
        .map(|batch| (batch.origin, batch.records.len()))
        .collect::<Vec<(LogOrigin, usize)>>();
    assert_eq!(
        summary,
        vec![
            (LogOrigin::ServiceLog, 1),
            (LogOrigin::WorkerStdout, 2),
            (LogOrigin::WorkerStderr, 1),
        ]
    );
    assert!(sink.batches.iter().all(|batch| batch
        .records
        .iter()
        .all(|record| record.origin == batch.origin)));
}

#[test]
fn only_latest_status_update_is_forwarded() {
    let channel = OutputChannel::new();
    let sender = channel.sender();
    sender.push_line(
        LogOrigin::WorkerStdout,
        "status update queued=1 segments=\"█\" downloads=\"▶\"",
    );
    sender.push_line(LogOrigin::WorkerStdout, "plain line");
    sender.push_line(
        LogOrigin::WorkerStdout,
        "status update queued=2 segments=\"█\" downloads=\"✓\"",
    );

    let mut sink = RecordingSink::default();
    let report = drainer().tick(&channel, &mut sink);

    assert_eq!(report.status_updates, 2);
    assert_eq!(sink.telemetry.len(), 1);
    assert!(sink.telemetry[0].stats_line.starts_with("Seg:  2q"));
    assert_eq!(sink.telemetry[0].cells[0].tag, CellTag::DoneFilled);
    assert_eq!(sink.batches.len(), 1);
    assert_eq!(sink.batches[0].records[0].text, "plain line");
}

#[test]
fn ansi_sequences_are_stripped_before_delivery_and_parsing() {
    let channel = OutputChannel::new();
    let sender = channel.sender();
    sender.push_line(LogOrigin::ServiceLog, "\u{1b}[32mINFO\u{1b}[0m ready");
    sender.push_line(
        LogOrigin::WorkerStdout,
        "\u{1b}[2mstatus\u{1b}[0m update done=5",
    );
    sender.push_line(LogOrigin::WorkerStdout, "\u{1b}[2K");

    let mut sink = RecordingSink::default();
    drainer().tick(&channel, &mut sink);

    assert_eq!(sink.batches.len(), 1);
    assert_eq!(sink.batches[0].records[0].text, "INFO ready");
    assert_eq!(sink.telemetry.len(), 1);
    assert!(sink.telemetry[0].stats_line.contains(" 5d"));
}

#[test]
fn exit_marker_is_delivered_as_a_record() {
    let channel = OutputChannel::new();
    channel
        .sender()
        .push(LogRecord::exit(LogOrigin::WorkerStdout, "exit=0"));

    let mut sink = RecordingSink::default();
    drainer().tick(&channel, &mut sink);

    assert_eq!(sink.batches.len(), 1);
    assert_eq!(sink.batches[0].records[0].kind, LogRecordKind::Exit);
    assert_eq!(sink.batches[0].records[0].text, "exit=0");
}

#[test]
fn pause_is_applied_between_batches_only() {
    let mut sink = RecordingSink::default();
    let records = (0..3)
        .map(|i| LogRecord::line(LogOrigin::WorkerStdout, format!("l{i}")))
        .collect::<Vec<LogRecord>>();
    let started = Instant::now();
    let report = Drainer::new(1, Duration::from_millis(20)).deliver(records, &mut sink);
    let elapsed = started.elapsed();
    assert_eq!(report.batches, 3);
    assert!(elapsed >= Duration::from_millis(40));
}

#[test]
fn zero_batch_size_is_clamped_to_one() {
    assert_eq!(Drainer::new(0, Duration::ZERO).batch_size(), 1);
}
