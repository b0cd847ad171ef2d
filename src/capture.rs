use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing_subscriber::fmt::MakeWriter;

use crate::channel::{CancelToken, LogOrigin, LogRecord, OutputSender};
use crate::process_manager::{WorkerHandle, WorkerStreams};

#[derive(Debug)]
enum PumpEvent {
    Line(LogOrigin, String),
    Closed,
}

/// Lossy-decodes one raw line and trims the line ending. Blank lines yield `None`.
pub fn decode_line(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim_end();
    if trimmed.trim_start().is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

/// Starts one blocking reader per worker pipe plus the thread that forwards their lines,
/// watches for exit, and pushes the terminal marker.
pub fn spawn_worker_capture(
    streams: WorkerStreams,
    sender: OutputSender,
    cancel: CancelToken,
    poll_interval: Duration,
) -> JoinHandle<()> {
    let (events_tx, events_rx) = mpsc::channel::<PumpEvent>();
    spawn_pump(streams.stdout, LogOrigin::WorkerStdout, events_tx.clone());
    spawn_pump(streams.stderr, LogOrigin::WorkerStderr, events_tx);

    let handle = streams.handle;
    thread::spawn(move || {
        forward_worker_output(events_rx, &handle, &sender, &cancel, poll_interval)
    })
}

fn spawn_pump<R>(reader: R, origin: LogOrigin, tx: Sender<PumpEvent>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let Some(line) = decode_line(&buf) else {
                        continue;
                    };
                    if tx.send(PumpEvent::Line(origin, line)).is_err() {
                        return;
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        let _ = tx.send(PumpEvent::Closed);
    });
}

fn forward_worker_output(
    events: Receiver<PumpEvent>,
    handle: &WorkerHandle,
    sender: &OutputSender,
    cancel: &CancelToken,
    poll_interval: Duration,
) {
    let mut open_streams = 2usize;
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let event = if open_streams > 0 {
            match events.recv_timeout(poll_interval) {
                Ok(event) => Some(event),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => {
                    open_streams = 0;
                    None
                }
            }
        } else {
            thread::sleep(poll_interval);
            None
        };

        match event {
            Some(PumpEvent::Line(origin, line)) => {
                if !sender.push_line(origin, line) {
                    return;
                }
            }
            Some(PumpEvent::Closed) => {
                open_streams = open_streams.saturating_sub(1);
            }
            None => {
                if let Some(diagnostic) = handle.exit_diagnostic() {
                    tracing::info!(pid = handle.pid(), diagnostic = %diagnostic, "worker exited");
                    sender.push(LogRecord::exit(LogOrigin::WorkerStdout, diagnostic));
                    return;
                }
            }
        }
    }
}

/// Producer side of the in-process service log. Doubles as a `tracing` writer.
#[derive(Debug, Clone)]
pub struct ServiceLogSink {
    tx: Arc<Mutex<Sender<String>>>,
}

#[derive(Debug)]
pub struct ServiceLogReceiver {
    rx: Receiver<String>,
}

pub fn service_log_pipe() -> (ServiceLogSink, ServiceLogReceiver) {
    let (tx, rx) = mpsc::channel::<String>();
    (
        ServiceLogSink {
            tx: Arc::new(Mutex::new(tx)),
        },
        ServiceLogReceiver { rx },
    )
}

impl ServiceLogSink {
    pub fn send_line(&self, text: &str) {
        if let Some(line) = decode_line(text.as_bytes()) {
            let _ = self
                .tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .send(line);
        }
    }

    fn send_bytes(&self, raw: &[u8]) {
        if let Some(line) = decode_line(raw) {
            let _ = self
                .tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .send(line);
        }
    }

    pub fn writer(&self) -> ServiceLogWriter {
        ServiceLogWriter {
            sink: self.clone(),
            pending: Vec::new(),
        }
    }
}

impl<'a> MakeWriter<'a> for ServiceLogSink {
    type Writer = ServiceLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer()
    }
}

/// Frames written bytes into lines; a trailing partial line is sent on flush or drop.
#[derive(Debug)]
pub struct ServiceLogWriter {
    sink: ServiceLogSink,
    pending: Vec<u8>,
}

impl Write for ServiceLogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(pos) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line = self.pending.drain(..=pos).collect::<Vec<u8>>();
            self.sink.send_bytes(&line);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.sink.send_bytes(&line);
        }
        Ok(())
    }
}

impl Drop for ServiceLogWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

pub fn spawn_service_capture(
    receiver: ServiceLogReceiver,
    sender: OutputSender,
    cancel: CancelToken,
    poll_interval: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        if cancel.is_cancelled() {
            while let Ok(line) = receiver.rx.try_recv() {
                sender.push_line(LogOrigin::ServiceLog, line);
            }
            return;
        }
        match receiver.rx.recv_timeout(poll_interval) {
            Ok(line) => {
                if !sender.push_line(LogOrigin::ServiceLog, line) {
                    return;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::OutputChannel;
    use std::time::Instant;

    #[test]
    fn decode_line_trims_line_endings_and_skips_blank_lines() {
        assert_eq!(decode_line(b"hello\r\n"), Some("hello".to_owned()));
        assert_eq!(decode_line(b"  indented\n"), Some("  indented".to_owned()));
        assert_eq!(decode_line(b"   \n"), None);
        assert_eq!(decode_line(b""), None);
    }

    #[test]
    fn decode_line_replaces_invalid_utf8() {
        assert_eq!(decode_line(b"a\xFFb\n"), Some("a\u{FFFD}b".to_owned()));
    }

    #[test]
    fn service_writer_frames_partial_writes_into_lines() {
        let (sink, receiver) = service_log_pipe();
        {
            let mut writer = sink.writer();
            writer.write_all(b"first ").expect("write");
            writer.write_all(b"line\nsecond\n\nthird").expect("write");
        }
        let lines = receiver.rx.try_iter().collect::<Vec<String>>();
        assert_eq!(lines, vec!["first line", "second", "third"]);
    }

    #[test]
    fn service_capture_tags_lines_and_stops_on_cancel() {
        let channel = OutputChannel::new();
        let cancel = CancelToken::new();
        let (sink, receiver) = service_log_pipe();
        let worker = spawn_service_capture(
            receiver,
            channel.sender(),
            cancel.clone(),
            Duration::from_millis(20),
        );
        sink.send_line("GET /config 200");

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut seen = Vec::new();
        while seen.is_empty() && Instant::now() < deadline {
            seen.extend(channel.drain());
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(
            seen,
            vec![LogRecord::line(LogOrigin::ServiceLog, "GET /config 200")]
        );

        cancel.cancel();
        worker.join().expect("service capture exits after cancel");
    }
}
