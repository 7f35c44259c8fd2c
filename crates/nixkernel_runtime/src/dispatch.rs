//! Running `:` commands against a session.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use nixkernel_foundation::{Error, ErrorKind, Result};
use nixkernel_language::eval::normalize_path;
use nixkernel_language::{AttrSet, Value, print_value};
use tracing::{debug, info, instrument, warn};

use crate::build::{self, BuildMode, NOT_A_DERIVATION};
use crate::commands::{self, Command};
use crate::display::DisplayBundle;
use crate::environment::Provenance;
use crate::flake;
use crate::inspect;
use crate::output::Output;
use crate::session::Session;

const ANSI_MAGENTA: &str = "\x1b[35;1m";
const ANSI_NORMAL: &str = "\x1b[0m";

impl Session {
    /// Runs one command line, such as `:build pkgs.hello`.
    #[instrument(skip(self, out))]
    pub(crate) fn dispatch(&mut self, line: &str, out: &mut dyn Output) -> Result<()> {
        let (word, arg) = commands::split(line);
        let Some(spec) = commands::lookup(word) else {
            return Err(Error::new(ErrorKind::UnknownCommand(word.to_string())));
        };
        debug!(command = spec.name, "dispatching");

        match spec.command {
            Command::Add => {
                let value = self.eval_arg(arg)?;
                self.add_attrs(value.as_attrs()?, &Provenance::Literal, out);
                Ok(())
            }
            Command::Build => self.build(arg, BuildMode::Store, out),
            Command::BuildLocal => {
                let dir = self.config.working_dir.clone();
                self.build(arg, BuildMode::Local(&dir), out)
            }
            Command::Doc => {
                let value = self.eval_arg(arg)?;
                match inspect::doc_for_value(&value) {
                    Some(entry) => out.display(DisplayBundle::markdown(entry.markdown())),
                    None => out.stderr("Value does not have documentation.\n"),
                }
                Ok(())
            }
            Command::Env => {
                out.stdout(&self.describe_env());
                Ok(())
            }
            Command::Help => {
                out.display(DisplayBundle::markdown(commands::help_markdown()));
                Ok(())
            }
            Command::Load => {
                if arg.is_empty() {
                    return Err(Error::eval(":load requires a path"));
                }
                let path = self.load(arg, out)?;
                self.loaded_files.push(path);
                Ok(())
            }
            Command::LoadFlake => {
                if arg.is_empty() {
                    out.stderr(":lf requires a flake reference.\n");
                    return Ok(());
                }
                let value = flake::load(&self.evaluator, arg, &self.config.working_dir)?;
                self.add_attrs(value.as_attrs()?, &Provenance::Flake(arg.to_string()), out);
                Ok(())
            }
            Command::Log => self.show_log(arg, out),
            Command::Print => {
                let value = self.eval_arg(arg)?;
                let text = match &value {
                    Value::String(s) => s.as_str().to_string(),
                    _ => print_value(&self.evaluator, &value, &self.print_options())?,
                };
                out.stdout(&format!("{text}\n"));
                Ok(())
            }
            Command::Reload => {
                self.reload(arg, out);
                Ok(())
            }
            Command::TraceEnable => {
                let enabled = match arg {
                    "" => !self.config.show_trace,
                    "true" => true,
                    "false" => false,
                    _ => {
                        out.stderr("Invalid argument to :te. Expected 'true', 'false', or nothing.\n");
                        return Ok(());
                    }
                };
                self.config.show_trace = enabled;
                let state = if enabled { "enabled" } else { "disabled" };
                out.stdout(&format!("Error traces are now {state}.\n"));
                Ok(())
            }
            Command::Type => {
                let value = self.eval_arg(arg)?;
                let kind = self.evaluator.kind_of(&value)?;
                out.stdout(&format!("{}\n", kind.describe()));
                Ok(())
            }
        }
    }

    /// Loads `arg` the way `:load` does, without remembering it for
    /// `:reload`. Returns the resolved path.
    fn load(&mut self, arg: &str, out: &mut dyn Output) -> Result<PathBuf> {
        let path = self.resolve_load_path(arg)?;
        info!(path = %path.display(), "loading file");
        let value = self.evaluator.import(&path)?;
        let value = self.evaluator.auto_call(value)?;
        self.add_attrs(value.as_attrs()?, &Provenance::File(path.clone()), out);
        Ok(path)
    }

    /// Loads a file and remembers it for `:reload`.
    ///
    /// # Errors
    ///
    /// Returns errors from reading, evaluating or auto-calling the file,
    /// or if it does not produce an attribute set.
    pub fn load_file(&mut self, path: &Path, out: &mut dyn Output) -> Result<()> {
        let path = self.load(&path.to_string_lossy(), out)?;
        self.loaded_files.push(path);
        Ok(())
    }

    fn resolve_load_path(&self, arg: &str) -> Result<PathBuf> {
        if let Some(name) = arg.strip_prefix('<').and_then(|rest| rest.strip_suffix('>')) {
            return self.evaluator.find_search_path(name);
        }
        let path = Path::new(arg);
        if path.is_absolute() {
            Ok(normalize_path(path))
        } else {
            Ok(normalize_path(&self.config.working_dir.join(path)))
        }
    }

    fn reload(&mut self, arg: &str, out: &mut dyn Output) {
        if !arg.is_empty() {
            out.stderr(":reload does not take any arguments.\n");
            return;
        }
        out.stdout("Reloading environment...\n");
        self.evaluator.clear_import_cache();

        let files = std::mem::take(&mut self.loaded_files);
        if files.is_empty() {
            out.stdout("No files to reload.\n");
            return;
        }
        for path in files {
            out.stdout(&format!("Reloading {}\n", path.display()));
            match self.load(&path.to_string_lossy(), out) {
                Ok(path) => self.loaded_files.push(path),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "reload failed");
                    out.stderr(&format!("Failed to reload {}: {err}\n", path.display()));
                }
            }
        }
    }

    fn build(&self, arg: &str, mode: BuildMode<'_>, out: &mut dyn Output) -> Result<()> {
        let value = self.eval_arg(arg)?;
        build::build(&self.evaluator, self.store.as_ref(), &value, mode, &self.interrupt, out)?;
        Ok(())
    }

    fn show_log(&self, arg: &str, out: &mut dyn Output) -> Result<()> {
        if arg.is_empty() {
            return Err(Error::eval(":log requires a derivation path or an expression"));
        }
        let drv_path = if arg.starts_with('/') && arg.ends_with(".drv") {
            arg.to_string()
        } else {
            let value = self.eval_arg(arg)?;
            self.evaluator
                .derivation_of(&value)?
                .ok_or_else(|| Error::build(NOT_A_DERIVATION))?
                .drv_path
                .clone()
        };
        match self.store.build_log(&drv_path) {
            Some(log) => out.stdout(&format!("Log for {drv_path} from local store:\n{log}")),
            None => out.stderr(&format!("No build log found for {drv_path}\n")),
        }
        Ok(())
    }

    fn eval_arg(&self, arg: &str) -> Result<Value> {
        if arg.is_empty() {
            return Ok(Value::Null);
        }
        self.evaluator.eval_str(arg, self.env.scope())
    }

    fn add_attrs(&mut self, attrs: &Rc<AttrSet>, provenance: &Provenance, out: &mut dyn Output) {
        let bindings = attrs.iter().map(|(name, value)| (name.clone(), value.clone()));
        let added = self.env.add(bindings, provenance);
        debug!(added, %provenance, "bindings added");
        out.stdout(&format!("Added {added} variables.\n"));
    }

    fn describe_env(&self) -> String {
        let (on, off) = if self.config.ansi_colors { (ANSI_MAGENTA, ANSI_NORMAL) } else { ("", "") };
        let mut out = String::from("Env level 0\nstatic: ");
        out.push_str(on);
        for name in self.env.names() {
            out.push_str(name);
            out.push(' ');
        }
        out.push_str(off);
        out.push_str("\n\nEnv level 1\n");
        out.push_str(on);
        let mut globals = self.evaluator.globals().names();
        globals.retain(|name| !name.starts_with("__"));
        globals.sort();
        globals.dedup();
        for name in globals {
            out.push_str(&name);
            out.push(' ');
        }
        out.push_str(off);
        out.push('\n');
        out
    }
}
