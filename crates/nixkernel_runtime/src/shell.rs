//! `!` shell escapes.

use std::path::Path;

use nixkernel_foundation::{Error, ErrorKind, Interrupt, Result};
use nixkernel_store::ProcessRunner;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::commands::SHELL_SIGIL;
use crate::output::Output;

/// Shell the script is handed to.
pub const SHELL: &str = "/bin/sh";

/// Removes the `!` and one following space from every line that has one.
#[must_use]
pub fn script(block: &str) -> String {
    let mut out = String::new();
    for line in block.lines() {
        let trimmed = line.trim_start();
        let line = match trimmed.strip_prefix(SHELL_SIGIL) {
            Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
            None => line,
        };
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Runs a shell escape block in `working_dir`, streaming stdout and
/// stderr lines as they are produced.
///
/// # Errors
///
/// Returns a shell command error for a non-zero exit status, an I/O error
/// if the shell cannot start, and an interruption error if `interrupt` is
/// raised; the process group is killed in that case.
#[instrument(skip_all)]
pub fn run(
    runner: &ProcessRunner,
    block: &str,
    working_dir: &Path,
    interrupt: &Interrupt,
    out: &mut dyn Output,
) -> Result<()> {
    let script = script(block);
    if script.trim().is_empty() {
        return Ok(());
    }
    debug!(script = script.trim_end(), "running shell escape");

    let mut command = Command::new(SHELL);
    command.arg("-c").arg(&script).current_dir(working_dir);
    let status = runner.run(&mut command, interrupt, &mut |stream, line| {
        out.stream(stream, &format!("{line}\n"));
    })?;
    if status == 0 {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::ShellCommand { status }))
    }
}
