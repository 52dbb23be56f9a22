//! dnsmasq-surrogate - inject client list hostnames into dnsmasq
//!
//! Usage:
//!   dnsmasq-surrogate install       Bind-mount over dnsmasq and restart it
//!   dnsmasq-surrogate remove        Undo the bind mounts and restart dnsmasq
//!   dnsmasq-surrogate showconfig    Print the config a launch would write
//!   dnsmasq-surrogate version       Print the build identifier and install state
//!
//! `--nvram-file <PATH>` reads the client list from a `key=value` dump
//! instead of the `nvram` command, for use off the router.
//!
//! Invoked as `dnsmasq` (through the bind mount) it rebuilds
//! /etc/dnsmasq.conf and execs the real daemon with the same arguments.

use std::env;
use std::ffi::{OsStr, OsString};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, warn, Level};
use tracing_subscriber::FmtSubscriber;

use surrogate_core::{Layout, Result, SurrogateError};
use surrogate_daemon::{
    detect_mode, version_string, ClientListSource, Execvp, Mode, NvramCommand, NvramFile,
    Substitution, SubstitutionState, Trampoline,
};

#[derive(Parser)]
#[command(name = "dnsmasq-surrogate")]
#[command(about = "Rebuild dnsmasq config from the router client list on every launch", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Read the client list from an nvram dump file
    #[arg(long, global = true, value_name = "PATH")]
    nvram_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install surrogate and restart service
    Install,

    /// Remove surrogate and restart service
    Remove,

    /// Dump resulting config on screen
    Showconfig,

    /// Show software version and exit
    Version,
}

fn main() -> ExitCode {
    let layout = Layout::default();
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));

    match detect_mode(env::args_os().collect(), &cwd, &layout.reserved_name) {
        Mode::Launch { arg0, args } => {
            init_logging(false);
            launch(&layout, &arg0, &args)
        }
        Mode::Admin(argv) => {
            // exits with usage on a missing or unknown sub-command
            let cli = Cli::parse_from(argv);
            init_logging(cli.verbose);
            let source = client_list_source(cli.nvram_file);
            match run_admin(cli.command, layout, source.as_ref()) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!("{}", e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}

/// Logs go to stderr; stdout carries `showconfig` output and the daemon's own.
fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("could not install logger: {}", e);
    }
}

fn launch(layout: &Layout, arg0: &OsStr, args: &[OsString]) -> ExitCode {
    let nvram = NvramCommand::new();
    let err = Trampoline::new(layout, &nvram, &Execvp).launch(arg0, args);
    error!("Could not start dnsmasq: {}", err);
    ExitCode::FAILURE
}

fn client_list_source(nvram_file: Option<PathBuf>) -> Box<dyn ClientListSource> {
    match nvram_file {
        Some(path) => Box::new(NvramFile::new(path)),
        None => Box::new(NvramCommand::new()),
    }
}

fn run_admin(command: Commands, layout: Layout, source: &dyn ClientListSource) -> Result<()> {
    match command {
        Commands::Install => Substitution::system(layout)?.install(),
        Commands::Remove => Substitution::system(layout)?.remove(),
        Commands::Showconfig => Trampoline::new(&layout, source, &Execvp)
            .show_config(io::stdout().lock())
            .map_err(|e| SurrogateError::io("print config", e)),
        Commands::Version => {
            println!("{}", version_string());
            match Substitution::system(layout).and_then(|sub| sub.state()) {
                Ok(SubstitutionState::Installed) => println!("status: installed"),
                Ok(SubstitutionState::NotInstalled) => println!("status: not installed"),
                Err(e) => warn!("Could not read installation state: {}", e),
            }
            Ok(())
        }
    }
}
