use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogOrigin {
    ServiceLog,
    WorkerStdout,
    WorkerStderr,
}

impl LogOrigin {
    /// Delivery order used when a drain tick flushes grouped batches.
    pub const ALL: [LogOrigin; 3] = [
        LogOrigin::ServiceLog,
        LogOrigin::WorkerStdout,
        LogOrigin::WorkerStderr,
    ];

    pub fn label(self) -> &'static str {
        match self {
            LogOrigin::ServiceLog => "service",
            LogOrigin::WorkerStdout => "stdout",
            LogOrigin::WorkerStderr => "stderr",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRecordKind {
    Line,
    /// Terminal marker pushed once the worker is gone; text is the exit diagnostic.
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub origin: LogOrigin,
    pub kind: LogRecordKind,
    pub text: String,
}

impl LogRecord {
    pub fn line(origin: LogOrigin, text: impl Into<String>) -> Self {
        Self {
            origin,
            kind: LogRecordKind::Line,
            text: text.into(),
        }
    }

    pub fn exit(origin: LogOrigin, diagnostic: impl Into<String>) -> Self {
        Self {
            origin,
            kind: LogRecordKind::Exit,
            text: diagnostic.into(),
        }
    }
}

/// Producer half of the output channel. Cheap to clone, one per capture thread.
#[derive(Debug, Clone)]
pub struct OutputSender {
    tx: Sender<LogRecord>,
}

impl OutputSender {
    /// Returns `false` once the consuming side is gone.
    pub fn push(&self, record: LogRecord) -> bool {
        self.tx.send(record).is_ok()
    }

    pub fn push_line(&self, origin: LogOrigin, text: impl Into<String>) -> bool {
        self.push(LogRecord::line(origin, text))
    }
}

/// Ordered, unbounded multi-producer queue drained by a single consumer.
pub struct OutputChannel {
    tx: Sender<LogRecord>,
    rx: Receiver<LogRecord>,
}

impl OutputChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel::<LogRecord>();
        Self { tx, rx }
    }

    pub fn sender(&self) -> OutputSender {
        OutputSender {
            tx: self.tx.clone(),
        }
    }

    /// Takes everything queued right now without waiting for more.
    pub fn drain(&self) -> Vec<LogRecord> {
        let mut records = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(record) => records.push(record),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        records
    }
}

impl Default for OutputChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared stop flag polled by capture threads on every iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn drain_on_empty_channel_returns_nothing() {
        let channel = OutputChannel::new();
        assert!(channel.drain().is_empty());
    }

    #[test]
    fn drain_preserves_order_within_an_origin() {
        let channel = OutputChannel::new();
        let stdout = channel.sender();
        let stderr = channel.sender();
        let a = thread::spawn(move || {
            for i in 0..50 {
                stdout.push_line(LogOrigin::WorkerStdout, format!("out-{i}"));
            }
        });
        let b = thread::spawn(move || {
            for i in 0..50 {
                stderr.push_line(LogOrigin::WorkerStderr, format!("err-{i}"));
            }
        });
        a.join().expect("stdout producer");
        b.join().expect("stderr producer");

        let records = channel.drain();
        assert_eq!(records.len(), 100);
        let outs = records
            .iter()
            .filter(|record| record.origin == LogOrigin::WorkerStdout)
            .map(|record| record.text.clone())
            .collect::<Vec<String>>();
        let expected = (0..50).map(|i| format!("out-{i}")).collect::<Vec<String>>();
        assert_eq!(outs, expected);
        assert!(channel.drain().is_empty());
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
