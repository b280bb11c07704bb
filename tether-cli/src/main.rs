//! CLI for running commands through one persistent shell.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

mod session;
mod sync;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tether::{Launcher, SessionBuilder, SessionConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "tether",
    version,
    about = "Run commands through one persistent local or ssh shell"
)]
struct Cli {
    #[command(flatten)]
    connect: ConnectArgs,

    /// More log output (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

/// Where and how the interpreter runs.
#[derive(clap::Args)]
pub(crate) struct ConnectArgs {
    /// Run on HOST over ssh instead of a local shell.
    #[arg(long, value_name = "HOST", global = true)]
    ssh: Option<String>,

    /// Extra ssh option (repeatable), as in `ssh -o`.
    #[arg(short = 'o', value_name = "KEY=VALUE", value_parser = parse_option, global = true)]
    options: Vec<(String, String)>,

    /// Share one ssh master connection per host.
    #[arg(long, global = true)]
    multiplex: bool,

    /// Local shell program (default: bash).
    #[arg(long, value_name = "PROGRAM", global = true, conflicts_with = "ssh")]
    local_shell: Option<String>,

    /// Load session settings from a JSON file; flags override it.
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Seconds to wait for the shell to come up.
    #[arg(long, value_name = "SECS", global = true)]
    connect_timeout: Option<u64>,
}

impl ConnectArgs {
    /// Resolves config file and flags into a builder.
    pub(crate) fn builder(&self) -> Result<SessionBuilder> {
        let config = match &self.config {
            Some(path) => SessionConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => SessionConfig::default(),
        };
        let mut builder = SessionBuilder::from_config(config);
        let launcher = self.launcher(builder.to_config().launcher);
        builder = builder.launcher(launcher);
        if let Some(secs) = self.connect_timeout {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        Ok(builder)
    }

    /// Applies the launcher flags on top of `base`.
    fn launcher(&self, base: Launcher) -> Launcher {
        let launcher = match (&self.ssh, &self.local_shell) {
            (Some(host), _) if self.multiplex => Launcher::multiplexed(host),
            (Some(host), _) => Launcher::ssh(host),
            (None, Some(shell)) => Launcher::local_shell(shell),
            (None, None) => base,
        };
        self.options
            .iter()
            .fold(launcher, |l, (k, v)| l.option(k, v))
    }
}

fn parse_option(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))
}

#[derive(Subcommand)]
enum Command {
    /// Run one command and exit with its code.
    Exec(session::ExecArgs),

    /// Read command lines from stdin and run them in one shell.
    Shell(session::ShellArgs),

    /// Print the shell's environment, or one variable.
    Env(session::EnvArgs),

    /// Print the arguments quoted as one shell command line.
    Quote {
        /// Words to quote.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        words: Vec<String>,
    },

    /// Copy files with rsync, showing progress.
    ///
    /// With --ssh, a path starting with `:` refers to that host.
    Sync(sync::SyncArgs),

    /// Generate shell completion scripts.
    #[command(hide = true)]
    Completion {
        /// Target shell.
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.dispatch() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("tether: {e:#}");
            std::process::exit(1);
        }
    }
}

/// Installs a stderr subscriber; `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tether={level},tether_cli={level}")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose > 0)
        .try_init();
}

impl Cli {
    /// Runs the subcommand and returns the process exit code.
    fn dispatch(self) -> Result<i32> {
        match self.command {
            Command::Exec(args) => session::exec(&self.connect, args),
            Command::Shell(args) => session::shell(&self.connect, &args),
            Command::Env(args) => session::env(&self.connect, &args),
            Command::Quote { words } => {
                println!("{}", tether::join(&words));
                Ok(0)
            }
            Command::Sync(args) => sync::sync(&self.connect, args),
            Command::Completion { shell } => {
                clap_complete::generate(shell, &mut Self::command(), "tether", &mut std::io::stdout());
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn ssh_flags_build_a_launcher() {
        let cli = Cli::parse_from([
            "tether", "--ssh", "box", "--multiplex", "-o", "port=2222", "exec", "uname", "-a",
        ]);
        let cfg = cli.connect.builder().unwrap().to_config();
        let opts = cfg.launcher.ssh_options().unwrap();
        assert_eq!(cfg.launcher.host(), Some("box"));
        assert_eq!(opts["port"], "2222");
        assert_eq!(opts["controlmaster"], "auto");
    }

    #[test]
    fn bad_option_is_rejected() {
        assert!(Cli::try_parse_from(["tether", "-o", "novalue", "quote", "x"]).is_err());
    }
}
