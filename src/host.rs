use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::capture::{
    service_log_pipe, spawn_service_capture, spawn_worker_capture, ServiceLogReceiver,
    ServiceLogSink,
};
use crate::channel::{CancelToken, OutputChannel};
use crate::config::{HostSettings, CAPTURE_POLL_INTERVAL, SERVICE_JOIN_TIMEOUT};
use crate::drain::{DrainReport, Drainer, PresentationSink};
use crate::process_manager::{
    is_expected_shutdown_diagnostic, ShutdownProgress, StopOutcome, SupervisorError,
    WorkerState, WorkerSupervisor,
};

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(20);
const CAPTURE_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// A co-located server run on its own thread next to the worker.
pub trait Service: Send {
    fn name(&self) -> &str;
    /// Runs until `cancel` is set. Everything written to `log` lands in the service log.
    fn serve(self: Box<Self>, cancel: CancelToken, log: ServiceLogSink) -> Result<(), ServiceError>;
}

#[derive(Debug)]
pub enum ServiceError {
    Io(std::io::Error),
    Failed(String),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Io(err) => write!(f, "{err}"),
            ServiceError::Failed(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<std::io::Error> for ServiceError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

#[derive(Debug)]
pub enum HostError {
    Supervisor(SupervisorError),
    Service(ServiceError),
    Io(std::io::Error),
    AlreadyStarted,
}

impl std::fmt::Display for HostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostError::Supervisor(err) => write!(f, "{err}"),
            HostError::Service(err) => write!(f, "service failed: {err}"),
            HostError::Io(err) => write!(f, "{err}"),
            HostError::AlreadyStarted => write!(f, "host has already been started"),
        }
    }
}

impl std::error::Error for HostError {}

impl From<SupervisorError> for HostError {
    fn from(value: SupervisorError) -> Self {
        Self::Supervisor(value)
    }
}

impl From<ServiceError> for HostError {
    fn from(value: ServiceError) -> Self {
        Self::Service(value)
    }
}

impl From<std::io::Error> for HostError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// How a foreground session ended, shared by the dashboard and plain output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub worker_exit: Option<String>,
    pub stop: StopOutcome,
    pub user_quit: bool,
}

impl SessionOutcome {
    /// `false` when the worker died with a diagnostic other than a normal shutdown.
    pub fn is_clean(&self) -> bool {
        self.worker_exit
            .as_deref()
            .map_or(true, is_expected_shutdown_diagnostic)
    }
}

/// Owns every moving part of one session: channel, supervisor, capture threads, service.
pub struct Host {
    channel: OutputChannel,
    supervisor: WorkerSupervisor,
    cancel: CancelToken,
    drainer: Drainer,
    log_sink: ServiceLogSink,
    log_receiver: Option<ServiceLogReceiver>,
    service: Option<Box<dyn Service>>,
    service_thread: Option<JoinHandle<Result<(), ServiceError>>>,
    capture_threads: Vec<JoinHandle<()>>,
    poll_interval: Duration,
    started: bool,
}

impl Host {
    pub fn new(settings: &HostSettings) -> Self {
        let (log_sink, log_receiver) = service_log_pipe();
        Self {
            channel: OutputChannel::new(),
            supervisor: WorkerSupervisor::new(settings.worker.clone()),
            cancel: CancelToken::new(),
            drainer: Drainer::new(settings.batch_size, settings.batch_pause),
            log_sink,
            log_receiver: Some(log_receiver),
            service: None,
            service_thread: None,
            capture_threads: Vec::new(),
            poll_interval: CAPTURE_POLL_INTERVAL,
            started: false,
        }
    }

    pub fn with_service(mut self, service: Box<dyn Service>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Writer handed to the tracing subscriber so host logs share the service pane.
    pub fn service_log_sink(&self) -> ServiceLogSink {
        self.log_sink.clone()
    }

    pub fn state(&self) -> WorkerState {
        self.supervisor.state()
    }

    pub fn worker_pid(&self) -> Option<u32> {
        self.supervisor.pid()
    }

    pub fn last_exit(&self) -> Option<&str> {
        self.supervisor.last_exit()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn start(&mut self) -> Result<(), HostError> {
        if self.started {
            return Err(HostError::AlreadyStarted);
        }
        self.started = true;

        if let Some(receiver) = self.log_receiver.take() {
            self.capture_threads.push(spawn_service_capture(
                receiver,
                self.channel.sender(),
                self.cancel.clone(),
                self.poll_interval,
            ));
        }

        if let Some(service) = self.service.take() {
            let name = service.name().to_owned();
            let cancel = self.cancel.clone();
            let log = self.log_sink.clone();
            info!(service = %name, "starting service");
            let handle = thread::Builder::new()
                .name(name)
                .spawn(move || service.serve(cancel, log))?;
            self.service_thread = Some(handle);
        }

        let streams = match self.supervisor.start() {
            Ok(streams) => streams,
            Err(err) => {
                self.cancel.cancel();
                self.join_service();
                self.join_capture_threads();
                return Err(err.into());
            }
        };
        self.capture_threads.push(spawn_worker_capture(
            streams,
            self.channel.sender(),
            self.cancel.clone(),
            self.poll_interval,
        ));
        Ok(())
    }

    /// One drain tick into `sink`.
    pub fn drain(&self, sink: &mut dyn PresentationSink) -> DrainReport {
        self.drainer.tick(&self.channel, sink)
    }

    pub fn stop(&mut self) -> StopOutcome {
        self.stop_with_progress(|_| {})
    }

    /// Cancels capture, stops the worker with escalation, then gives the service a bounded
    /// window to return.
    pub fn stop_with_progress<F>(&mut self, on_progress: F) -> StopOutcome
    where
        F: FnMut(ShutdownProgress),
    {
        self.cancel.cancel();
        let outcome = self.supervisor.stop_with_progress(on_progress);
        self.join_service();
        self.join_capture_threads();
        outcome
    }

    fn join_service(&mut self) {
        let Some(handle) = self.service_thread.take() else {
            return;
        };
        let deadline = Instant::now() + SERVICE_JOIN_TIMEOUT;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(JOIN_POLL_INTERVAL);
        }
        if !handle.is_finished() {
            warn!(
                timeout_ms = SERVICE_JOIN_TIMEOUT.as_millis() as u64,
                "service did not stop in time, detaching"
            );
            return;
        }
        match handle.join() {
            Ok(Ok(())) => info!("service stopped"),
            Ok(Err(err)) => warn!(error = %err, "service exited with error"),
            Err(_) => warn!("service thread panicked"),
        }
    }
}

impl Host {
    /// Waits briefly for capture threads to flush what they already hold onto the
    /// channel after cancellation. Threads still blocked past the timeout are detached.
    fn join_capture_threads(&mut self) {
        let deadline = Instant::now() + CAPTURE_JOIN_TIMEOUT;
        while self.capture_threads.iter().any(|handle| !handle.is_finished())
            && Instant::now() < deadline
        {
            thread::sleep(JOIN_POLL_INTERVAL);
        }
        for handle in std::mem::take(&mut self.capture_threads) {
            if handle.is_finished() {
                if handle.join().is_err() {
                    warn!("capture thread panicked");
                }
            } else {
                self.capture_threads.push(handle);
            }
        }
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LogOrigin;
    use crate::config::{BATCH_PAUSE, BATCH_SIZE, DRAIN_INTERVAL, DEFAULT_LOG_FILTER};
    use crate::drain::LogBatch;
    use crate::process_manager::WorkerSpec;
    use crate::telemetry::RenderedTelemetry;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct EchoService {
        stopped: Arc<AtomicBool>,
    }

    impl Service for EchoService {
        fn name(&self) -> &str {
            "echo"
        }

        fn serve(
            self: Box<Self>,
            cancel: CancelToken,
            log: ServiceLogSink,
        ) -> Result<(), ServiceError> {
            log.send_line("echo listening");
            while !cancel.is_cancelled() {
                thread::sleep(Duration::from_millis(5));
            }
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Lines(Vec<(LogOrigin, String)>);

    impl PresentationSink for Lines {
        fn write_batch(&mut self, batch: LogBatch) {
            self.0.extend(
                batch
                    .records
                    .into_iter()
                    .map(|record| (record.origin, record.text)),
            );
        }

        fn update_telemetry(&mut self, _telemetry: RenderedTelemetry) {}
    }

    fn settings_for_missing_worker() -> HostSettings {
        let root = std::env::temp_dir().join("crosshost-host-unit-missing");
        HostSettings {
            worker: WorkerSpec::new(&root, "no-such-worker", &root, 1)
                .with_settle_delay(Duration::ZERO),
            drain_interval: DRAIN_INTERVAL,
            batch_size: BATCH_SIZE,
            batch_pause: BATCH_PAUSE,
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            plain: true,
        }
    }

    #[test]
    fn failed_worker_start_cancels_service() {
        let stopped = Arc::new(AtomicBool::new(false));
        let mut host = Host::new(&settings_for_missing_worker())
            .with_poll_interval(Duration::from_millis(10))
            .with_service(Box::new(EchoService {
                stopped: stopped.clone(),
            }));

        let err = host.start().expect_err("template is missing");
        assert!(matches!(err, HostError::Supervisor(_)));
        assert!(host.is_cancelled());
        assert!(stopped.load(Ordering::SeqCst));
        assert_eq!(host.state(), WorkerState::Stopped);
    }

    #[test]
    fn service_log_lines_reach_the_drain() {
        let mut host =
            Host::new(&settings_for_missing_worker()).with_poll_interval(Duration::from_millis(10));
        host.service_log_sink().send_line("host ready");
        let _ = host.start();

        let mut sink = Lines::default();
        let deadline = Instant::now() + Duration::from_secs(2);
        while sink.0.is_empty() && Instant::now() < deadline {
            host.drain(&mut sink);
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(
            sink.0,
            vec![(LogOrigin::ServiceLog, "host ready".to_owned())]
        );
    }

    #[test]
    fn failed_start_flushes_pending_service_lines_before_returning() {
        let mut host =
            Host::new(&settings_for_missing_worker()).with_poll_interval(Duration::from_secs(1));
        let log = host.service_log_sink();
        log.send_line("first");
        log.send_line("second");
        log.send_line("third");

        assert!(host.start().is_err());
        let mut sink = Lines::default();
        host.drain(&mut sink);
        let texts = sink
            .0
            .iter()
            .map(|(_, text)| text.as_str())
            .collect::<Vec<&str>>();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn second_start_is_rejected() {
        let mut host = Host::new(&settings_for_missing_worker());
        let _ = host.start();
        assert!(matches!(host.start(), Err(HostError::AlreadyStarted)));
    }

    #[test]
    fn session_outcome_treats_shutdown_signals_as_clean() {
        let outcome = |exit: Option<&str>| SessionOutcome {
            worker_exit: exit.map(str::to_owned),
            stop: StopOutcome::Graceful,
            user_quit: true,
        };
        assert!(outcome(None).is_clean());
        assert!(outcome(Some("signal=15")).is_clean());
        assert!(outcome(Some("exit=0")).is_clean());
        assert!(!outcome(Some("exit=2")).is_clean());
    }

    #[test]
    fn stop_before_start_is_a_noop() {
        let mut host = Host::new(&settings_for_missing_worker());
        assert_eq!(host.stop(), StopOutcome::NotRunning);
        assert_eq!(host.stop(), StopOutcome::NotRunning);
    }
}
