//! A single external command: how to run it, and what it left behind.

use std::process::{ExitStatus, Stdio};

use fct_common::Cancel;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const SLURP_BUF_LEN: usize = 4096;

/// Per-invocation options.
#[derive(Debug, Clone, Default)]
pub struct Spec {
    /// Deadline or cancellation. The process is killed when it fires.
    pub cancel: Option<Cancel>,
    /// Written to the process's stdin, which is then closed.
    pub stdin: Option<Vec<u8>>,
    /// Return as soon as the process has started.
    pub background: bool,
    /// Leave this background job out of [`Executor::wait`](crate::Executor::wait).
    pub no_wait: bool,
    /// A failure of this job is logged but not counted.
    pub ignore_errors: bool,
    /// Log stdout and stderr once the process has exited.
    pub log: bool,
    pub log_stdout: bool,
    pub log_stderr: bool,
    /// Echo stdout and stderr live to our stderr.
    pub emit: bool,
    pub emit_stdout: bool,
    pub emit_stderr: bool,
}

impl Spec {
    pub fn background() -> Self {
        Spec {
            background: true,
            ..Default::default()
        }
    }

    /// A background job that nobody waits for, e.g. a server.
    pub fn daemon() -> Self {
        Spec {
            background: true,
            no_wait: true,
            ..Default::default()
        }
    }

    pub fn emit() -> Self {
        Spec {
            emit: true,
            ..Default::default()
        }
    }

    pub fn with_cancel(mut self, cancel: Cancel) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_stdin(mut self, stdin: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }
}

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum JobError {
    #[error("empty command line")]
    EmptyCommand,
    #[error("failed to start: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("{0}")]
    Exit(ExitStatus),
    #[error("wait failed: {0}")]
    Wait(#[source] std::io::Error),
    #[error("supervisor task failed: {0}")]
    Supervisor(String),
}

/// A submitted command and, once it has finished, its output.
#[derive(Debug)]
pub struct Job {
    pub(crate) command: String,
    pub(crate) program: String,
    pub(crate) args: Vec<String>,
    pub(crate) spec: Spec,
    pub(crate) stdout: Vec<u8>,
    pub(crate) stderr: Vec<u8>,
    pub(crate) status: Option<ExitStatus>,
    pub(crate) err: Option<JobError>,
    pub(crate) pid: Option<u32>,
    pub(crate) running: Option<Running>,
}

impl Job {
    pub(crate) fn new(program: String, args: Vec<String>, spec: Spec) -> Self {
        let command = std::iter::once(program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        Job {
            command,
            program,
            args,
            spec,
            stdout: Vec::new(),
            stderr: Vec::new(),
            status: None,
            err: None,
            pid: None,
            running: None,
        }
    }

    /// The command line, space-joined.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    /// Captured stdout. Empty until the job has finished.
    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// The failure recorded for this job, unless its [`Spec`] ignores errors.
    pub fn err(&self) -> Option<&JobError> {
        self.err.as_ref()
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the process is still owned by its supervisor.
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.supervisor.is_finished())
    }

    /// Start the process and its supervisor.
    pub(crate) fn start(&self) -> Result<Running, JobError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(if self.spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        die_with_parent(&mut cmd);

        let mut child = cmd.spawn().map_err(JobError::Spawn)?;
        let pid = child.id();

        let stdin = match (child.stdin.take(), self.spec.stdin.clone()) {
            (Some(mut pipe), Some(input)) => Some(tokio::spawn(async move {
                if let Err(e) = pipe.write_all(&input).await {
                    tracing::warn!(error = %e, "error writing stdin");
                }
                // dropping the pipe closes it
            })),
            _ => None,
        };
        let spec = &self.spec;
        let stdout = child.stdout.take().map(|pipe| {
            tokio::spawn(slurp(
                pipe,
                Stream::Stdout,
                self.command.clone(),
                spec.emit || spec.emit_stdout,
                spec.log || spec.log_stdout,
            ))
        });
        let stderr = child.stderr.take().map(|pipe| {
            tokio::spawn(slurp(
                pipe,
                Stream::Stderr,
                self.command.clone(),
                spec.emit || spec.emit_stderr,
                spec.log || spec.log_stderr,
            ))
        });

        let (signals, signal_rx) = mpsc::unbounded_channel();
        let supervisor = tokio::spawn(supervise(
            child,
            signal_rx,
            self.spec.cancel.clone(),
            Pipes {
                stdin,
                stdout,
                stderr,
            },
        ));

        Ok(Running {
            pid,
            supervisor,
            signals,
        })
    }
}

/// Have the child receive SIGTERM if this process dies first.
#[cfg(target_os = "linux")]
fn die_with_parent(cmd: &mut Command) {
    // SAFETY: the closure runs in the forked child before exec and only
    // calls prctl, which is async-signal-safe.
    unsafe {
        cmd.pre_exec(|| {
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(target_os = "linux"))]
fn die_with_parent(_cmd: &mut Command) {}

/// Handle on a started process, held by the executor until joined.
#[derive(Debug)]
pub(crate) struct Running {
    pub(crate) pid: Option<u32>,
    supervisor: JoinHandle<Outcome>,
    signals: mpsc::UnboundedSender<Signal>,
}

impl Running {
    /// Ask the supervisor to deliver `signal`. A no-op once the process has
    /// been reaped.
    pub(crate) fn signal(&self, signal: Signal) {
        let _ = self.signals.send(signal);
    }

    pub(crate) async fn finish(self) -> Outcome {
        match self.supervisor.await {
            Ok(outcome) => outcome,
            Err(e) => Outcome {
                status: Err(JobError::Supervisor(e.to_string())),
                stdout: Vec::new(),
                stderr: Vec::new(),
            },
        }
    }

    /// Drop the supervisor, which kills the process if it is still alive.
    pub(crate) fn abort(&self) {
        self.supervisor.abort();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    Interrupt,
    Kill,
}

#[derive(Debug)]
pub(crate) struct Outcome {
    pub(crate) status: Result<ExitStatus, JobError>,
    pub(crate) stdout: Vec<u8>,
    pub(crate) stderr: Vec<u8>,
}

struct Pipes {
    stdin: Option<JoinHandle<()>>,
    stdout: Option<JoinHandle<Vec<u8>>>,
    stderr: Option<JoinHandle<Vec<u8>>>,
}

/// Own the child until it exits, delivering each kind of signal at most
/// once, then collect the drained output.
async fn supervise(
    mut child: Child,
    mut signals: mpsc::UnboundedReceiver<Signal>,
    cancel: Option<Cancel>,
    pipes: Pipes,
) -> Outcome {
    let pid = child.id();
    let mut interrupted = false;
    let mut killed = false;

    let status = loop {
        tokio::select! {
            status = child.wait() => break status.map_err(JobError::Wait),
            Some(signal) = signals.recv() => match signal {
                Signal::Interrupt if !interrupted && !killed => {
                    interrupted = true;
                    send_sigint(pid);
                }
                Signal::Kill if !killed => {
                    killed = true;
                    if let Err(e) = child.start_kill() {
                        tracing::debug!(?pid, error = %e, "kill failed");
                    }
                }
                _ => {}
            },
            _ = deadline(cancel.as_ref()), if !killed => {
                tracing::debug!(?pid, "job cancelled, killing");
                killed = true;
                if let Err(e) = child.start_kill() {
                    tracing::debug!(?pid, error = %e, "kill failed");
                }
            }
        }
    };

    if let Some(stdin) = pipes.stdin {
        let _ = stdin.await;
    }
    Outcome {
        status,
        stdout: join_output(pipes.stdout).await,
        stderr: join_output(pipes.stderr).await,
    }
}

async fn deadline(cancel: Option<&Cancel>) {
    match cancel {
        Some(cancel) => cancel.cancelled().await,
        None => std::future::pending().await,
    }
}

async fn join_output(task: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    match task {
        Some(task) => task.await.unwrap_or_default(),
        None => Vec::new(),
    }
}

fn send_sigint(pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };
    // SAFETY: `pid` is our child, and it has not been reaped yet because the
    // supervisor has not observed its exit.
    let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
    if ret != 0 {
        tracing::debug!(
            pid,
            error = %std::io::Error::last_os_error(),
            "SIGINT failed"
        );
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn name(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// Read `pipe` to EOF, optionally echoing each chunk to our stderr.
async fn slurp<R>(mut pipe: R, stream: Stream, command: String, emit: bool, log: bool) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; SLURP_BUF_LEN];
    let mut echo = tokio::io::stderr();
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if emit {
                    let _ = echo.write_all(&chunk[..n]).await;
                }
            }
            Err(e) => {
                tracing::warn!(stream = stream.name(), error = %e, "error reading output");
                break;
            }
        }
    }
    if log && !buf.is_empty() {
        tracing::info!(
            "{} for '{}'\n{}",
            stream.name(),
            command,
            String::from_utf8_lossy(&buf)
        );
    }
    buf
}
