#[cfg(unix)]
use std::io::ErrorKind;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;
#[cfg(windows)]
use std::os::windows::process::CommandExt;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command as ProcessCommand, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

#[cfg(unix)]
use nix::sys::signal::{kill, Signal};
#[cfg(unix)]
use nix::unistd::{setpgid, Pid};
use tracing::{info, warn};

use crate::capture::decode_line;
use crate::config::{DEFAULT_TEMPLATE, SETTLE_DELAY, STOP_TIMEOUT, WORKER_SUBCOMMAND};
use crate::config_template::{materialize_config, TemplateError};
use crate::terminal_text::strip_ansi;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(40);
/// Output kept from a worker that died during the settle delay.
pub const LAUNCH_OUTPUT_LINES: usize = 20;
const LAUNCH_OUTPUT_BYTES: u64 = 64 * 1024;
#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSpec {
    /// Working directory of the worker; `executable` and `template` resolve against it.
    pub tools_dir: PathBuf,
    pub executable: PathBuf,
    pub media_dir: PathBuf,
    pub port: u16,
    pub template: PathBuf,
    pub subcommand: String,
    pub stop_timeout: Duration,
    pub settle_delay: Duration,
}

impl WorkerSpec {
    pub fn new(
        tools_dir: impl Into<PathBuf>,
        executable: impl Into<PathBuf>,
        media_dir: impl Into<PathBuf>,
        port: u16,
    ) -> Self {
        Self {
            tools_dir: tools_dir.into(),
            executable: executable.into(),
            media_dir: media_dir.into(),
            port,
            template: PathBuf::from(DEFAULT_TEMPLATE),
            subcommand: WORKER_SUBCOMMAND.to_owned(),
            stop_timeout: STOP_TIMEOUT,
            settle_delay: SETTLE_DELAY,
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn executable_path(&self) -> PathBuf {
        self.tools_dir.join(&self.executable)
    }

    pub fn template_path(&self) -> PathBuf {
        self.tools_dir.join(&self.template)
    }

    pub fn config_path(&self) -> PathBuf {
        self.media_dir.join("transcode").join("config.yaml")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Stopped,
    Starting,
    Running,
    Stopping,
    /// Worker exited during the settle delay. Only a new `start()` leaves this state.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    Graceful,
    Forced,
}

impl StopOutcome {
    pub fn label(self) -> &'static str {
        match self {
            StopOutcome::NotRunning => "already stopped",
            StopOutcome::Graceful => "graceful",
            StopOutcome::Forced => "forced",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownProgress {
    SendingTerm,
    Waiting,
    ForceKilling,
    Complete { forced: bool },
}

impl ShutdownProgress {
    pub fn label(&self) -> &'static str {
        match self {
            ShutdownProgress::SendingTerm => "Shutdown: asking the worker to stop...",
            ShutdownProgress::Waiting => "Shutdown: waiting for the worker to exit...",
            ShutdownProgress::ForceKilling => "Shutdown: forcing the worker to stop...",
            ShutdownProgress::Complete { forced: false } => "Shutdown: complete.",
            ShutdownProgress::Complete { forced: true } => "Shutdown: complete (worker killed).",
        }
    }
}

#[derive(Debug)]
pub enum SupervisorError {
    AlreadyRunning {
        pid: u32,
    },
    Template(TemplateError),
    Spawn {
        command: String,
        error: std::io::Error,
    },
    MissingStdio {
        command: String,
    },
    LaunchFailed {
        command: String,
        diagnostic: String,
        /// Last lines the worker wrote to stdout, then stderr, before it exited.
        output: Vec<String>,
    },
}

impl std::fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupervisorError::AlreadyRunning { pid } => {
                write!(f, "worker is already running with pid {pid}")
            }
            SupervisorError::Template(err) => write!(f, "{err}"),
            SupervisorError::Spawn { command, error } => {
                write!(f, "failed to spawn worker with command `{command}`: {error}")
            }
            SupervisorError::MissingStdio { command } => {
                write!(f, "worker `{command}` missing stdout/stderr pipe")
            }
            SupervisorError::LaunchFailed {
                command,
                diagnostic,
                output,
            } => {
                write!(
                    f,
                    "worker `{command}` exited immediately after launch ({diagnostic})"
                )?;
                for line in output {
                    write!(f, "\n  {line}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for SupervisorError {}

impl From<TemplateError> for SupervisorError {
    fn from(value: TemplateError) -> Self {
        Self::Template(value)
    }
}

/// Shared handle to the running child, used for liveness checks off the supervisor thread.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    child: Arc<Mutex<Child>>,
    pid: u32,
}

impl WorkerHandle {
    fn new(child: Child) -> Self {
        let pid = child.id();
        Self {
            child: Arc::new(Mutex::new(child)),
            pid,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// `None` while the process is alive, otherwise its exit diagnostic.
    pub fn exit_diagnostic(&self) -> Option<String> {
        match self.lock().try_wait() {
            Ok(Some(status)) => Some(format_exit_diagnostic(status)),
            Ok(None) => None,
            Err(err) => Some(format!("wait-error={err}")),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.exit_diagnostic().is_none()
    }

    fn lock(&self) -> MutexGuard<'_, Child> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub struct WorkerStreams {
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
    pub handle: WorkerHandle,
}

pub struct WorkerSupervisor {
    spec: WorkerSpec,
    state: WorkerState,
    child: Option<WorkerHandle>,
    last_exit: Option<String>,
}

impl WorkerSupervisor {
    pub fn new(spec: WorkerSpec) -> Self {
        Self {
            spec,
            state: WorkerState::Stopped,
            child: None,
            last_exit: None,
        }
    }

    pub fn spec(&self) -> &WorkerSpec {
        &self.spec
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(WorkerHandle::pid)
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Exit diagnostic of the last worker that stopped or failed to launch.
    pub fn last_exit(&self) -> Option<&str> {
        self.last_exit.as_deref()
    }

    pub fn start(&mut self) -> Result<WorkerStreams, SupervisorError> {
        if let Some(handle) = &self.child {
            return Err(SupervisorError::AlreadyRunning { pid: handle.pid() });
        }
        self.state = WorkerState::Starting;
        match self.launch() {
            Ok(streams) => {
                self.state = WorkerState::Running;
                self.child = Some(streams.handle.clone());
                Ok(streams)
            }
            Err(err) => {
                self.state = match err {
                    SupervisorError::LaunchFailed { .. } => WorkerState::Failed,
                    _ => WorkerState::Stopped,
                };
                Err(err)
            }
        }
    }

    fn launch(&mut self) -> Result<WorkerStreams, SupervisorError> {
        let media_dir = resolve_path(&self.spec.media_dir);
        let config_path = materialize_config(
            &self.spec.template_path(),
            &self.spec.config_path(),
            &media_dir,
            self.spec.port,
        )?;
        let config_path = resolve_path(&config_path);

        let mut process = worker_command(&self.spec, &config_path);
        let command = render_command(&process);
        info!(command = %command, "starting worker");

        let mut child = process.spawn().map_err(|error| SupervisorError::Spawn {
            command: command.clone(),
            error,
        })?;
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SupervisorError::MissingStdio { command });
        };

        thread::sleep(self.spec.settle_delay);
        let early_exit = match child.try_wait() {
            Ok(Some(status)) => Some(format_exit_diagnostic(status)),
            Ok(None) => None,
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                Some(format!("wait-error={err}"))
            }
        };
        if let Some(diagnostic) = early_exit {
            #[cfg(unix)]
            {
                let _ = signal_process_group(child.id(), Signal::SIGKILL);
            }
            let output = collect_launch_output(stdout, stderr);
            warn!(
                command = %command,
                diagnostic = %diagnostic,
                output_lines = output.len(),
                "worker failed to start"
            );
            self.last_exit = Some(diagnostic.clone());
            return Err(SupervisorError::LaunchFailed {
                command,
                diagnostic,
                output,
            });
        }

        let handle = WorkerHandle::new(child);
        info!(pid = handle.pid(), "worker started");
        self.last_exit = None;
        Ok(WorkerStreams {
            stdout,
            stderr,
            handle,
        })
    }

    pub fn stop(&mut self) -> StopOutcome {
        self.stop_with_progress(|_| {})
    }

    /// Graceful request, bounded wait, then an unconditional kill. The handle is always
    /// cleared before returning.
    pub fn stop_with_progress<F>(&mut self, mut on_progress: F) -> StopOutcome
    where
        F: FnMut(ShutdownProgress),
    {
        let Some(handle) = self.child.take() else {
            return StopOutcome::NotRunning;
        };
        self.state = WorkerState::Stopping;
        info!(pid = handle.pid(), "stopping worker");

        on_progress(ShutdownProgress::SendingTerm);
        let graceful = if handle.is_alive() {
            request_graceful_exit(&handle).and_then(|()| {
                on_progress(ShutdownProgress::Waiting);
                wait_until(&handle, Instant::now() + self.spec.stop_timeout)
            })
        } else {
            Ok(true)
        };

        let outcome = match graceful {
            Ok(true) => {
                info!(pid = handle.pid(), "worker stopped");
                StopOutcome::Graceful
            }
            Ok(false) => {
                warn!(
                    pid = handle.pid(),
                    timeout_ms = self.spec.stop_timeout.as_millis() as u64,
                    "worker did not stop in time, forcing"
                );
                on_progress(ShutdownProgress::ForceKilling);
                force_kill(&handle);
                StopOutcome::Forced
            }
            Err(error) => {
                warn!(pid = handle.pid(), error = %error, "graceful stop failed, forcing");
                on_progress(ShutdownProgress::ForceKilling);
                force_kill(&handle);
                StopOutcome::Forced
            }
        };

        self.last_exit = handle.exit_diagnostic();
        self.state = WorkerState::Stopped;
        on_progress(ShutdownProgress::Complete {
            forced: outcome == StopOutcome::Forced,
        });
        outcome
    }
}

impl Drop for WorkerSupervisor {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.stop();
        }
    }
}

pub fn format_exit_diagnostic(status: std::process::ExitStatus) -> String {
    #[cfg(unix)]
    {
        if let Some(code) = status.code() {
            return format!("exit={code}");
        }
        if let Some(signal) = status.signal() {
            return format!("signal={signal}");
        }
        "exit=unknown".to_owned()
    }
    #[cfg(not(unix))]
    {
        format!("exit={}", status.code().unwrap_or(-1))
    }
}

pub fn is_expected_shutdown_diagnostic(diagnostic: &str) -> bool {
    matches!(diagnostic, "exit=0" | "signal=15" | "signal=9")
}

fn worker_command(spec: &WorkerSpec, config_path: &Path) -> ProcessCommand {
    let mut process = ProcessCommand::new(spec.executable_path());
    process
        .arg(&spec.subcommand)
        .arg("--config")
        .arg(config_path)
        .current_dir(&spec.tools_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    unsafe {
        process.pre_exec(|| {
            setpgid(Pid::from_raw(0), Pid::from_raw(0))
                .map_err(|error| std::io::Error::new(ErrorKind::Other, error.to_string()))
        });
    }
    #[cfg(windows)]
    process.creation_flags(CREATE_NEW_PROCESS_GROUP);
    process
}

/// Reads what an already-exited worker left in its pipes, keeping the last
/// [`LAUNCH_OUTPUT_LINES`] non-blank lines.
fn collect_launch_output(stdout: ChildStdout, stderr: ChildStderr) -> Vec<String> {
    let mut lines = read_pipe_lines(stdout);
    lines.extend(read_pipe_lines(stderr));
    let skip = lines.len().saturating_sub(LAUNCH_OUTPUT_LINES);
    lines.split_off(skip)
}

fn read_pipe_lines<R: Read>(pipe: R) -> Vec<String> {
    let mut reader = BufReader::new(pipe.take(LAUNCH_OUTPUT_BYTES));
    let mut lines = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                if let Some(line) = decode_line(&buf).map(|line| strip_ansi(&line)) {
                    if !line.trim().is_empty() {
                        lines.push(line);
                    }
                }
            }
        }
    }
    lines
}

fn render_command(process: &ProcessCommand) -> String {
    std::iter::once(process.get_program())
        .chain(process.get_args())
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<String>>()
        .join(" ")
}

fn resolve_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn request_graceful_exit(handle: &WorkerHandle) -> Result<(), std::io::Error> {
    #[cfg(unix)]
    {
        signal_process_group(handle.pid(), Signal::SIGTERM).map_err(std::io::Error::from)
    }
    #[cfg(not(unix))]
    {
        handle.lock().kill()
    }
}

/// Polls until the worker exits (`true`) or the deadline passes (`false`).
fn wait_until(handle: &WorkerHandle, deadline: Instant) -> Result<bool, std::io::Error> {
    loop {
        if handle.lock().try_wait()?.is_some() {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}

fn force_kill(handle: &WorkerHandle) {
    let mut child = handle.lock();
    #[cfg(unix)]
    {
        let _ = signal_process_group(handle.pid(), Signal::SIGKILL);
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn signal_process_group(pid: u32, signal: Signal) -> Result<(), nix::Error> {
    let pid = pid as i32;
    if pid > 0 {
        kill(Pid::from_raw(-pid), signal)
    } else {
        Ok(())
    }
}
