//! Streaming subprocess execution.
//!
//! A child runs in its own process group with piped stdout and stderr. Two
//! reader tasks forward lines through a bounded channel, and the caller sees
//! them in arrival order while the child is still running. Raising the
//! [`Interrupt`] kills the whole group and resolves the run as interrupted.

use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use nixkernel_foundation::{Error, Interrupt, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default number of lines buffered between the readers and the caller.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Which pipe a line was read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl OutputStream {
    /// Returns the stream name used on the wire.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

type Line = (OutputStream, String);

/// Runs subprocesses on a private tokio runtime.
///
/// Callers stay synchronous: [`ProcessRunner::run`] blocks on the runtime
/// until the child has exited and every line has been delivered.
pub struct ProcessRunner {
    runtime: Runtime,
    capacity: usize,
}

impl ProcessRunner {
    /// Creates a runner whose line channel holds `capacity` entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be started.
    pub fn new(capacity: usize) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("nixkernel-io")
            .enable_all()
            .build()
            .map_err(|e| Error::io("cannot start the process runtime", &e))?;
        Ok(Self {
            runtime,
            capacity: capacity.max(1),
        })
    }

    /// Returns the runtime, for callers that need their own async work.
    #[must_use]
    pub const fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Runs `command` to completion and returns its exit code.
    ///
    /// Each line of output is passed to `on_line` without its newline. A
    /// child killed by a signal reports `128 + signal`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the process cannot be spawned or awaited, and
    /// an interruption error if `interrupt` is raised before it exits.
    pub fn run(
        &self,
        command: &mut Command,
        interrupt: &Interrupt,
        on_line: &mut dyn FnMut(OutputStream, &str),
    ) -> Result<i32> {
        interrupt.check()?;
        self.runtime
            .block_on(supervise(command, self.capacity, interrupt, on_line))
    }
}

async fn supervise(
    command: &mut Command,
    capacity: usize,
    interrupt: &Interrupt,
    on_line: &mut dyn FnMut(OutputStream, &str),
) -> Result<i32> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| Error::io(format!("cannot run {:?}", command.as_std().get_program()), &e))?;
    let group = child.id().and_then(|id| i32::try_from(id).ok()).map(Pid::from_raw);
    debug!(pid = ?group, "spawned process");

    let (tx, mut rx) = mpsc::channel::<Line>(capacity);
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward(stdout, OutputStream::Stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward(stderr, OutputStream::Stderr, tx.clone()));
    }
    drop(tx);

    loop {
        tokio::select! {
            () = interrupt.wait() => {
                kill_group(group);
                let _ = child.wait().await;
                return Err(Error::interrupted());
            }
            line = rx.recv() => match line {
                Some((stream, text)) => on_line(stream, &text),
                None => break,
            },
        }
    }

    let status = tokio::select! {
        () = interrupt.wait() => {
            kill_group(group);
            let _ = child.wait().await;
            return Err(Error::interrupted());
        }
        status = child.wait() => status.map_err(|e| Error::io("cannot wait for process", &e))?,
    };
    debug!(pid = ?group, %status, "process exited");
    Ok(exit_code(status))
}

async fn forward<R>(reader: R, stream: OutputStream, tx: mpsc::Sender<Line>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send((stream, line)).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(stream = stream.name(), error = %e, "reading process output failed");
                break;
            }
        }
    }
}

fn kill_group(group: Option<Pid>) {
    let Some(group) = group else {
        return;
    };
    debug!(pgid = %group, "killing process group");
    if let Err(e) = killpg(group, Signal::SIGKILL) {
        warn!(pgid = %group, error = %e, "killpg failed");
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}
