//! `result` symlinks for local builds.

use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;

use nixkernel_foundation::{Error, Result};

/// Returns the link name for a derivation output, e.g. `result-out`.
#[must_use]
pub fn link_name(output: &str) -> String {
    format!("result-{output}")
}

/// Points `link` at `target`, replacing whatever link was there.
///
/// The new link is created under a temporary name next to `link` and
/// renamed over it, so `link` never dangles half-way through.
///
/// # Errors
///
/// Returns an I/O error if the link cannot be created or renamed, for
/// example when `link` names a directory.
pub fn replace_symlink(target: &Path, link: &Path) -> Result<()> {
    let file_name = link
        .file_name()
        .ok_or_else(|| Error::build(format!("invalid link path '{}'", link.display())))?;
    let temp = link.with_file_name(format!(
        ".{}.tmp-{}",
        file_name.to_string_lossy(),
        std::process::id()
    ));

    match fs::remove_file(&temp) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::io(format!("cannot remove '{}'", temp.display()), &e)),
    }
    symlink(target, &temp)
        .map_err(|e| Error::io(format!("cannot create symlink '{}'", temp.display()), &e))?;
    fs::rename(&temp, link).map_err(|e| {
        let _ = fs::remove_file(&temp);
        Error::io(format!("cannot create symlink '{}'", link.display()), &e)
    })
}
