//! Commands that talk to a session: exec, shell, env.

use std::io::{self, BufRead};

use anyhow::{Context, Result};
use tether::{Command, Error, Invocation, Mode, Session, Tee};
use tracing::debug;

use crate::ConnectArgs;

/// Arguments for `tether exec`.
///
/// Usage: `tether exec [OPTIONS] COMMAND [ARG...]`
#[derive(clap::Args)]
#[command(trailing_var_arg = true)]
pub struct ExecArgs {
    /// Hand the words to the shell as one unquoted line.
    #[arg(long)]
    pub raw: bool,

    /// Pass output through as raw bytes.
    #[arg(long)]
    pub binary: bool,

    /// Command and arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

/// Arguments for `tether shell`.
#[derive(clap::Args)]
pub struct ShellArgs {
    /// Stop at the first command that fails.
    #[arg(short = 'e', long)]
    pub errexit: bool,
}

/// Arguments for `tether env`.
#[derive(clap::Args)]
pub struct EnvArgs {
    /// Print only this variable.
    pub name: Option<String>,

    /// Print the whole environment as JSON.
    #[arg(long, conflicts_with = "name")]
    pub json: bool,
}

fn connect(args: &ConnectArgs) -> Result<Session> {
    let builder = args.builder()?;
    let launcher = builder.to_config().launcher;
    debug!(%launcher, "connecting");
    let sh = builder
        .connect()
        .with_context(|| format!("failed to start {launcher}"))?;
    debug!(shell = sh.shell(), version = sh.shell_version(), "session ready");
    Ok(sh)
}

pub fn exec(connect_args: &ConnectArgs, args: ExecArgs) -> Result<i32> {
    let mut sh = connect(connect_args)?;
    let command = if args.raw {
        Command::Raw(args.command.join(" "))
    } else {
        Command::Tokens(args.command)
    };
    let mut invocation = Invocation::new(command)
        .check(false)
        .capture(false)
        .tee(Tee::Stdout);
    if args.binary {
        invocation = invocation.mode(Mode::Binary);
    }
    let done = sh.invoke(invocation)?;
    sh.close()?;
    Ok(done.code)
}

pub fn shell(connect_args: &ConnectArgs, args: &ShellArgs) -> Result<i32> {
    let mut sh = connect(connect_args)?;
    let mut last = 0;
    for line in io::stdin().lock().lines() {
        let line = line.context("failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let invocation = Invocation::new(line)
            .check(false)
            .capture(false)
            .tee(Tee::Stdout);
        match sh.invoke(invocation) {
            Ok(done) => {
                last = done.code;
                if done.code != 0 {
                    eprintln!("[exit {}]", done.code);
                    if args.errexit {
                        break;
                    }
                }
            }
            Err(e @ Error::Nul) => eprintln!("tether: {e}"),
            Err(e) => return Err(e.into()),
        }
    }
    sh.close()?;
    Ok(last)
}

pub fn env(connect_args: &ConnectArgs, args: &EnvArgs) -> Result<i32> {
    let mut sh = connect(connect_args)?;
    if let Some(name) = &args.name {
        let Some(value) = sh.env_var(name)? else {
            return Ok(1);
        };
        println!("{value}");
    } else if args.json {
        println!("{}", serde_json::to_string_pretty(sh.env()?)?);
    } else {
        for (k, v) in sh.env()? {
            println!("{k}={v}");
        }
    }
    sh.close()?;
    Ok(0)
}
