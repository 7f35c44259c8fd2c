//! Building derivations into a store directory.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use nixkernel_foundation::{Error, ErrorKind, Interrupt, Result};
use nixkernel_language::Derivation;
use nixkernel_language::eval::current_system;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::process::ProcessRunner;

/// Looks up a derivation record by its `.drv` path.
pub type Resolver<'a> = &'a dyn Fn(&str) -> Option<Rc<Derivation>>;

/// The build capability the session relies on.
pub trait Store {
    /// Directory store paths live under.
    fn store_dir(&self) -> &Path;

    /// Builds `drv` and everything it depends on, passing each builder
    /// output line to `on_line` as it arrives. Returns the output paths.
    ///
    /// # Errors
    ///
    /// Returns a build error if a builder fails or leaves an output missing,
    /// and an interruption error if `interrupt` is raised.
    fn realize(
        &self,
        drv: &Derivation,
        resolve: Resolver<'_>,
        on_line: &mut dyn FnMut(&str),
        interrupt: &Interrupt,
    ) -> Result<BTreeMap<String, PathBuf>>;

    /// Returns the log of the last build of `drv_path`.
    fn build_log(&self, drv_path: &str) -> Option<String>;
}

/// A store directory on the local filesystem, built into by running
/// builders directly.
pub struct LocalStore {
    store_dir: PathBuf,
    log_dir: PathBuf,
    system: String,
    runner: Arc<ProcessRunner>,
}

impl LocalStore {
    /// Creates a store rooted at `store_dir`. Logs go to a `log` directory
    /// next to it.
    #[must_use]
    pub fn new(store_dir: impl Into<PathBuf>, runner: Arc<ProcessRunner>) -> Self {
        let store_dir = store_dir.into();
        let log_dir = store_dir.with_file_name("log");
        Self {
            store_dir,
            log_dir,
            system: current_system(),
            runner,
        }
    }

    /// Sets the system this store can build for.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    /// Sets the directory build logs are written to.
    #[must_use]
    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = log_dir.into();
        self
    }

    fn realize_one(
        &self,
        drv: &Derivation,
        resolve: Resolver<'_>,
        on_line: &mut dyn FnMut(&str),
        interrupt: &Interrupt,
        visited: &mut HashSet<String>,
    ) -> Result<()> {
        if !visited.insert(drv.drv_path.clone()) {
            return Ok(());
        }
        for input in &drv.input_derivations {
            let dep = resolve(input)
                .ok_or_else(|| Error::build(format!("unknown input derivation '{input}'")))?;
            self.realize_one(&dep, resolve, on_line, interrupt, visited)?;
        }
        if drv.outputs.values().all(|path| present(path)) {
            debug!(drv = %drv.drv_path, "outputs already valid");
            return Ok(());
        }
        self.build(drv, on_line, interrupt)
    }

    #[instrument(skip_all, fields(drv = %drv.drv_path))]
    fn build(&self, drv: &Derivation, on_line: &mut dyn FnMut(&str), interrupt: &Interrupt) -> Result<()> {
        if drv.system != self.system && drv.system != "builtin" {
            return Err(Error::build(format!(
                "a '{}' is required to build '{}', but I am a '{}'",
                drv.system, drv.drv_path, self.system
            )));
        }
        fs::create_dir_all(&self.store_dir)
            .map_err(|e| Error::io(format!("cannot create '{}'", self.store_dir.display()), &e))?;
        self.write_drv(drv)?;
        remove_outputs(drv);

        let build_dir = tempfile::Builder::new()
            .prefix(&format!("nix-build-{}-", drv.name))
            .tempdir()
            .map_err(|e| Error::io("cannot create build directory", &e))?;

        let mut command = Command::new(&drv.builder);
        command
            .args(&drv.args)
            .current_dir(build_dir.path())
            .env_clear()
            .envs(self.build_env(drv, build_dir.path()));

        on_line(&format!("building '{}'...", drv.drv_path));
        let mut log = String::new();
        let result = self.runner.run(&mut command, interrupt, &mut |_, line| {
            on_line(line);
            log.push_str(line);
            log.push('\n');
        });
        self.write_log(drv, &log);

        let code = match result {
            Ok(code) => code,
            Err(err) => {
                remove_outputs(drv);
                return Err(match err.kind {
                    ErrorKind::Interrupted => err,
                    _ => Error::build(format!("cannot run builder for '{}': {err}", drv.drv_path)),
                });
            }
        };
        if code != 0 {
            remove_outputs(drv);
            return Err(Error::build(format!(
                "builder for '{}' failed with exit code {code}",
                drv.drv_path
            )));
        }
        if let Some((output, path)) = drv.outputs.iter().find(|(_, path)| !present(path)) {
            remove_outputs(drv);
            return Err(Error::build(format!(
                "builder for '{}' failed to produce output path for output '{output}' at '{}'",
                drv.drv_path,
                path.display()
            )));
        }
        info!(outputs = drv.outputs.len(), "build succeeded");
        Ok(())
    }

    fn build_env(&self, drv: &Derivation, build_dir: &Path) -> BTreeMap<String, String> {
        let top = build_dir.display().to_string();
        let mut env = drv.env.clone();
        for (name, path) in &drv.outputs {
            env.insert(name.clone(), path.display().to_string());
        }
        for name in ["NIX_BUILD_TOP", "TMPDIR", "TEMPDIR", "TMP", "TEMP"] {
            env.insert(name.to_string(), top.clone());
        }
        env.insert("HOME".to_string(), "/homeless-shelter".to_string());
        env.insert("NIX_STORE".to_string(), self.store_dir.display().to_string());
        env.insert("NIX_BUILD_CORES".to_string(), "1".to_string());
        env.entry("PATH".to_string())
            .or_insert_with(|| "/path-not-set".to_string());
        env
    }

    fn write_drv(&self, drv: &Derivation) -> Result<()> {
        let path = Path::new(&drv.drv_path);
        if path.exists() {
            return Ok(());
        }
        let json = serde_json::to_vec_pretty(drv).map_err(|e| Error::new(ErrorKind::Json(e.to_string())))?;
        fs::write(path, json).map_err(|e| Error::io(format!("cannot write '{}'", path.display()), &e))
    }

    fn log_path(&self, drv_path: &str) -> Option<PathBuf> {
        Path::new(drv_path)
            .file_name()
            .map(|name| self.log_dir.join(name))
    }

    fn write_log(&self, drv: &Derivation, log: &str) {
        let Some(path) = self.log_path(&drv.drv_path) else {
            return;
        };
        let written = fs::create_dir_all(&self.log_dir).and_then(|()| fs::write(&path, log));
        if let Err(e) = written {
            warn!(path = %path.display(), error = %e, "cannot persist build log");
        }
    }
}

impl Store for LocalStore {
    fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    fn realize(
        &self,
        drv: &Derivation,
        resolve: Resolver<'_>,
        on_line: &mut dyn FnMut(&str),
        interrupt: &Interrupt,
    ) -> Result<BTreeMap<String, PathBuf>> {
        let mut visited = HashSet::new();
        self.realize_one(drv, resolve, on_line, interrupt, &mut visited)?;
        Ok(drv.outputs.clone())
    }

    fn build_log(&self, drv_path: &str) -> Option<String> {
        self.log_path(drv_path)
            .and_then(|path| fs::read_to_string(path).ok())
    }
}

fn present(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn remove_outputs(drv: &Derivation) {
    for path in drv.outputs.values() {
        let removed = match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
            Err(_) => continue,
        };
        if let Err(e) = removed {
            if e.kind() != IoErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "cannot remove output");
            }
        }
    }
}
