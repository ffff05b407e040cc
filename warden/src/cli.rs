//! Command-line surface for `wardend`: a daemon launcher (`run-forever`,
//! `start-daemon`) and an HTTP client to a running daemon (`status`,
//! `scale-service`, `shutdown-daemon`), both behind one binary.
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "wardend", about = "A user-space process supervisor with an HTTP control plane.", author, version)]
pub struct CliArguments {
    #[command(subcommand)]
    pub command: Command,

    /// Verbosity, repeatable (`-v`, `-vv`, `-vvv`).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single program as a one-off service, in the foreground by default.
    RunForever {
        #[arg(long, default_value_t = 1)]
        workers: usize,
        #[arg(long, default_value = "127.0.0.1")]
        bind_host: String,
        #[arg(long, default_value_t = 9191)]
        port: u16,
        #[arg(long)]
        daemonize: bool,
        #[arg(long)]
        daemonize_stdout: Option<PathBuf>,
        #[arg(long)]
        daemonize_stderr: Option<PathBuf>,
        /// The program to run, and its arguments.
        #[arg(trailing_var_arg = true, required = true)]
        program: Vec<String>,
    },
    /// Start the daemon with no services pre-registered.
    StartDaemon {
        #[arg(long, default_value = "127.0.0.1")]
        bind_host: String,
        #[arg(long, default_value_t = 9191)]
        port: u16,
        #[arg(long)]
        foreground: bool,
        #[arg(long)]
        daemonize_stdout: Option<PathBuf>,
        #[arg(long)]
        daemonize_stderr: Option<PathBuf>,
        /// Overrides `$WARDEN_CONFIG_PATH`/`~/.config/warden/config.yml`.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Ask a running daemon to shut down.
    ShutdownDaemon {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 9191)]
        port: u16,
    },
    /// Print human-readable manager/service/slot state.
    Status {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 9191)]
        port: u16,
    },
    /// Set a service's replica count.
    ScaleService {
        name: String,
        workers: usize,
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 9191)]
        port: u16,
    },
}
