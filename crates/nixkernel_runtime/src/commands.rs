//! The `:command` table.
//!
//! Dispatch, completion and inspection all read [`COMMANDS`], so a command
//! and its aliases are spelled in exactly one place.

/// What a command expects after its name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Argument {
    /// Nothing.
    None,
    /// A Nix expression.
    Expr,
    /// A file path or `<name>` search path.
    Path,
    /// A flake reference.
    FlakeRef,
    /// An expression or a `.drv` path.
    ExprOrDrv,
    /// Optional `true` or `false`.
    Toggle,
}

impl Argument {
    /// Returns true if the argument is parsed as Nix, so completion and
    /// multi-line input apply to it.
    #[must_use]
    pub const fn is_expression(self) -> bool {
        matches!(self, Self::Expr | Self::ExprOrDrv)
    }
}

/// The commands understood by the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    /// `:add`
    Add,
    /// `:build`
    Build,
    /// `:build-local`
    BuildLocal,
    /// `:doc`
    Doc,
    /// `:env`
    Env,
    /// `:help`
    Help,
    /// `:load`
    Load,
    /// `:load-flake`
    LoadFlake,
    /// `:log`
    Log,
    /// `:print`
    Print,
    /// `:reload`
    Reload,
    /// `:trace-enable`
    TraceEnable,
    /// `:type`
    Type,
}

/// One row of the command table.
#[derive(Debug)]
pub struct CommandSpec {
    /// The command.
    pub command: Command,
    /// Canonical spelling, including the sigil.
    pub name: &'static str,
    /// Accepted abbreviations.
    pub aliases: &'static [&'static str],
    /// Expected argument.
    pub argument: Argument,
    /// Usage shown in help, e.g. `:load <path>`.
    pub usage: &'static str,
    /// One-line description.
    pub help: &'static str,
}

impl CommandSpec {
    /// Returns the canonical name followed by the aliases.
    pub fn spellings(&self) -> impl Iterator<Item = &'static str> {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }

    /// Returns true if `word` is the name or one of the aliases.
    #[must_use]
    pub fn matches(&self, word: &str) -> bool {
        self.spellings().any(|spelling| spelling == word)
    }

    /// Returns the usage in markdown, with aliases.
    #[must_use]
    pub fn synopsis(&self) -> String {
        let mut out = format!("`{}`", self.usage);
        if !self.aliases.is_empty() {
            let aliases: Vec<_> = self.aliases.iter().map(|a| format!("`{a}`")).collect();
            out.push_str(&format!(" (alias {})", aliases.join(", ")));
        }
        out
    }
}

/// Prefix marking a session command.
pub const COMMAND_SIGIL: char = ':';

/// Prefix marking a shell escape.
pub const SHELL_SIGIL: char = '!';

/// Every command, in help order.
pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: Command::Add,
        name: ":add",
        aliases: &[":a"],
        argument: Argument::Expr,
        usage: ":add <expr>",
        help: "Add attributes from resulting set to scope",
    },
    CommandSpec {
        command: Command::Build,
        name: ":build",
        aliases: &[":b"],
        argument: Argument::Expr,
        usage: ":build <expr>",
        help: "Build a derivation",
    },
    CommandSpec {
        command: Command::BuildLocal,
        name: ":build-local",
        aliases: &[":bl"],
        argument: Argument::Expr,
        usage: ":build-local <expr>",
        help: "Build a derivation, creating result links in the working directory",
    },
    CommandSpec {
        command: Command::Env,
        name: ":env",
        aliases: &[],
        argument: Argument::None,
        usage: ":env",
        help: "Show variables in the current scope",
    },
    CommandSpec {
        command: Command::Doc,
        name: ":doc",
        aliases: &[],
        argument: Argument::Expr,
        usage: ":doc <expr>",
        help: "Show documentation for the provided value",
    },
    CommandSpec {
        command: Command::Load,
        name: ":load",
        aliases: &[":l"],
        argument: Argument::Path,
        usage: ":load <path>",
        help: "Load Nix expression and add it to scope",
    },
    CommandSpec {
        command: Command::LoadFlake,
        name: ":load-flake",
        aliases: &[":lf"],
        argument: Argument::FlakeRef,
        usage: ":load-flake <ref>",
        help: "Load Nix flake and add it to scope",
    },
    CommandSpec {
        command: Command::Print,
        name: ":print",
        aliases: &[":p"],
        argument: Argument::Expr,
        usage: ":print <expr>",
        help: "Evaluate and print expression recursively. Strings are printed directly, without escaping.",
    },
    CommandSpec {
        command: Command::Reload,
        name: ":reload",
        aliases: &[":r"],
        argument: Argument::None,
        usage: ":reload",
        help: "Reload all files",
    },
    CommandSpec {
        command: Command::Type,
        name: ":type",
        aliases: &[":t"],
        argument: Argument::Expr,
        usage: ":type <expr>",
        help: "Describe result of evaluation",
    },
    CommandSpec {
        command: Command::Log,
        name: ":log",
        aliases: &[],
        argument: Argument::ExprOrDrv,
        usage: ":log <expr | .drv path>",
        help: "Show logs for a derivation",
    },
    CommandSpec {
        command: Command::TraceEnable,
        name: ":trace-enable",
        aliases: &[":te"],
        argument: Argument::Toggle,
        usage: ":trace-enable [bool]",
        help: "Enable, disable or toggle showing traces for errors",
    },
    CommandSpec {
        command: Command::Help,
        name: ":help",
        aliases: &[":?"],
        argument: Argument::None,
        usage: ":help",
        help: "Brings up this help menu",
    },
];

/// Finds the command spelled `word`.
#[must_use]
pub fn lookup(word: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.matches(word))
}

/// Returns every accepted spelling, canonical names and aliases.
pub fn spellings() -> impl Iterator<Item = &'static str> {
    COMMANDS.iter().flat_map(CommandSpec::spellings)
}

/// Splits a command line into the command word and its trimmed argument.
#[must_use]
pub fn split(line: &str) -> (&str, &str) {
    let line = line.trim();
    match line.find(char::is_whitespace) {
        Some(i) => (&line[..i], line[i..].trim()),
        None => (line, ""),
    }
}

/// Returns the `:help` text as markdown.
#[must_use]
pub fn help_markdown() -> String {
    let mut rows = vec![
        ("<expr>".to_string(), "Evaluate and print expression"),
        ("<x> = <expr>".to_string(), "Bind expression to variable"),
    ];
    for spec in COMMANDS {
        let mut names: Vec<_> = spec.aliases.to_vec();
        names.push(spec.usage);
        rows.push((names.join(", "), spec.help));
    }
    rows.push(("!<command>".to_string(), "Run a shell command"));

    let width = rows.iter().map(|(usage, _)| usage.len()).max().unwrap_or(0) + 2;
    let mut out = String::from("The following commands are available:\n\n```\n");
    for (usage, help) in rows {
        out.push_str(&format!("  {usage:<width$} {help}\n"));
    }
    out.push_str("```\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn aliases_resolve() {
        for (alias, command) in [
            (":b", Command::Build),
            (":bl", Command::BuildLocal),
            (":lf", Command::LoadFlake),
            (":p", Command::Print),
            (":t", Command::Type),
            (":l", Command::Load),
            (":a", Command::Add),
            (":?", Command::Help),
            (":te", Command::TraceEnable),
        ] {
            assert_eq!(lookup(alias).map(|spec| spec.command), Some(command), "{alias}");
        }
        assert!(lookup(":bogus").is_none());
        assert!(lookup("build").is_none());
    }

    #[test]
    fn spellings_are_unique() {
        let all: Vec<_> = spellings().collect();
        let unique: HashSet<_> = all.iter().collect();
        assert_eq!(all.len(), unique.len());
        assert!(all.iter().all(|s| s.starts_with(COMMAND_SIGIL)));
    }

    #[test]
    fn split_command_line() {
        assert_eq!(split(":b   pkgs.hello "), (":b", "pkgs.hello"));
        assert_eq!(split(":env"), (":env", ""));
        assert_eq!(split(":add {\n  a = 1;\n}"), (":add", "{\n  a = 1;\n}"));
    }

    #[test]
    fn help_lists_every_command() {
        let help = help_markdown();
        for spec in COMMANDS {
            assert!(help.contains(spec.usage), "{}", spec.name);
        }
    }

    #[test]
    fn synopsis_mentions_aliases() {
        assert_eq!(lookup(":bl").unwrap().synopsis(), "`:build-local <expr>` (alias `:bl`)");
        assert_eq!(lookup(":env").unwrap().synopsis(), "`:env`");
    }
}
