//! nixkernel CLI entry point.

use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use nixkernel_language::eval::parse_nix_path;
use nixkernel_runtime::{Collector, Kernel, KernelConfig, Repl, Session, on_session_thread};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// CLI configuration parsed from arguments.
#[derive(Default)]
struct CliConfig {
    files: Vec<PathBuf>,
    batch_mode: bool,
    jsonl: bool,
    show_help: bool,
    show_version: bool,
    store_dir: Option<PathBuf>,
    search_path: Vec<(String, PathBuf)>,
    no_color: bool,
    show_trace: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args: Vec<String> = env::args().collect();
    let outcome = on_session_thread(move || run(args).map_err(|e| e.to_string()));
    match outcome.map_err(|e| e.to_string()).and_then(|result| result) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("\x1b[31mError: {e}\x1b[0m");
            ExitCode::FAILURE
        }
    }
}

fn parse_args(args: Vec<String>) -> Result<CliConfig, Box<dyn std::error::Error>> {
    let mut config = CliConfig::default();
    let mut args = args.into_iter().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => config.show_help = true,
            "-V" | "--version" => config.show_version = true,
            "-b" | "--batch" => config.batch_mode = true,
            "--jsonl" => config.jsonl = true,
            "--no-color" => config.no_color = true,
            "--show-trace" => config.show_trace = true,
            "--store" => {
                let dir = args.next().ok_or("--store requires a directory")?;
                config.store_dir = Some(PathBuf::from(dir));
            }
            "-I" => {
                let entry = args.next().ok_or("-I requires name=path")?;
                if !entry.contains('=') {
                    return Err(format!("invalid -I value: {entry} (expected name=path)").into());
                }
                config.search_path.extend(parse_nix_path(&entry));
            }
            other if other.starts_with('-') => {
                return Err(format!("unknown option: {other}").into());
            }
            path => config.files.push(PathBuf::from(path)),
        }
    }

    Ok(config)
}

fn kernel_config(cli: &CliConfig) -> KernelConfig {
    let mut config = if cli.jsonl { KernelConfig::kernel() } else { KernelConfig::console() };
    if let Some(dir) = &cli.store_dir {
        config = config.with_store_dir(dir);
    }
    config.search_path.splice(0..0, cli.search_path.iter().cloned());
    config.with_ansi_colors(!cli.no_color).with_show_trace(cli.show_trace)
}

fn run(args: Vec<String>) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = parse_args(args)?;

    if cli.show_help {
        print_help();
        return Ok(ExitCode::SUCCESS);
    }

    if cli.show_version {
        println!("nixkernel {}", env!("CARGO_PKG_VERSION"));
        return Ok(ExitCode::SUCCESS);
    }

    let mut session = Session::new(kernel_config(&cli))?;
    route_interrupts(&session);

    if cli.jsonl {
        for file in &cli.files {
            session.load_file(file, &mut Collector::new())?;
        }
        let mut kernel = Kernel::new(session, io::stdout().lock());
        kernel.serve(io::stdin().lock())?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut repl = Repl::new(session)?;
    for file in &cli.files {
        repl.load_file(file)?;
    }

    if cli.batch_mode {
        return Ok(ExitCode::SUCCESS);
    }

    if !cli.files.is_empty() {
        repl = repl.without_banner();
    }

    repl.run()?;
    Ok(ExitCode::SUCCESS)
}

/// Turns SIGINT into a session interrupt instead of terminating.
fn route_interrupts(session: &Session) {
    let interrupt = session.interrupt().clone();
    session.runner().runtime().spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("interrupt requested");
            interrupt.trigger();
        }
    });
}

fn print_help() {
    println!(
        "\x1b[1mnixkernel\x1b[0m - Interactive kernel for the Nix expression language

\x1b[1mUSAGE:\x1b[0m
    nixkernel [OPTIONS] [FILES...]

\x1b[1mARGUMENTS:\x1b[0m
    [FILES...]    Files to :load before starting

\x1b[1mOPTIONS:\x1b[0m
    -h, --help          Print help information
    -V, --version       Print version information
    -b, --batch         Load files and exit (no console)
    --jsonl             Serve JSON-lines requests on stdin/stdout
    --store DIR         Directory derivations are built into
    -I NAME=PATH        Add a <NAME> search path entry (repeatable)
    --no-color          Print values without ANSI colors
    --show-trace        Show full error traces

\x1b[1mEXAMPLES:\x1b[0m
    nixkernel                          Start the interactive console
    nixkernel lib.nix                  Load lib.nix, then start the console
    nixkernel -b check.nix             Load check.nix and exit
    nixkernel -I nixpkgs=/src/nixpkgs  Make <nixpkgs> resolvable
    nixkernel --jsonl                  Run as a notebook kernel

\x1b[1mCONSOLE:\x1b[0m
    <expr>              Evaluate and print an expression
    x = <expr>          Bind a variable
    :?                  List the session commands
    !<command>          Run a shell command
    Ctrl+D              Exit
    Ctrl+C              Cancel the current input or evaluation

The RUST_LOG environment variable controls diagnostic logging on stderr."
    );
}
