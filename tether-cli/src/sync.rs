//! `tether sync`: rsync with a live progress line.

use std::io::{self, Write};

use anyhow::{Result, bail};
use tether::Launcher;
use tether::transfer::{ProgressEvent, Transfer, Update};

use crate::ConnectArgs;

/// Arguments for `tether sync`.
///
/// Usage: `tether sync [OPTIONS] SOURCE... DEST`
#[derive(clap::Args)]
pub struct SyncArgs {
    /// Replace the default rsync flags (`-ac`). Repeatable.
    #[arg(long = "flag", value_name = "FLAG", allow_hyphen_values = true)]
    pub flags: Vec<String>,

    /// Don't draw progress.
    #[arg(short, long)]
    pub quiet: bool,

    /// Show rsync's own stderr as it happens.
    #[arg(long)]
    pub show_stderr: bool,

    /// Sources followed by the destination.
    #[arg(required = true, num_args = 2..)]
    pub paths: Vec<String>,
}

pub fn sync(connect_args: &ConnectArgs, args: SyncArgs) -> Result<i32> {
    let launcher = connect_args.builder()?.to_config().launcher;
    let mut paths: Vec<String> = args
        .paths
        .into_iter()
        .map(|p| expand_host(&launcher, p))
        .collect::<Result<_>>()?;
    let Some(dest) = paths.pop() else {
        bail!("missing destination");
    };

    let mut transfer = Transfer::new(paths, dest).verbose(args.show_stderr);
    if !args.flags.is_empty() {
        transfer = transfer.flags(args.flags);
    }
    if let Some(options) = launcher.ssh_options() {
        transfer = transfer.ssh_options(options);
    }

    let quiet = args.quiet;
    transfer.run(|event| {
        if !quiet {
            draw(event);
        }
    })?;
    Ok(0)
}

/// Rewrites `:path` to `HOST:path` for an ssh launcher.
fn expand_host(launcher: &Launcher, path: String) -> Result<String> {
    match (path.strip_prefix(':'), launcher.host()) {
        (Some(rest), Some(host)) => Ok(format!("{host}:{rest}")),
        (Some(_), None) => bail!("{path:?} needs --ssh HOST"),
        (None, _) => Ok(path),
    }
}

fn draw(event: &ProgressEvent) {
    let mut err = io::stderr().lock();
    let _ = match event {
        ProgressEvent::File { name, .. } => writeln!(err, "{name}"),
        ProgressEvent::Update(u) => {
            let _ = write!(err, "\r  {}", progress_line(u));
            if u.transfer_number.is_some() {
                writeln!(err)
            } else {
                err.flush()
            }
        }
        _ => Ok(()),
    };
}

fn progress_line(u: &Update) -> String {
    let rate = u.rate.map_or_else(String::new, |r| format!("  {}/s", iec(r)));
    let pct = if u.percent_complete.is_finite() {
        format!("{:>3.0}%", u.percent_complete)
    } else {
        "  -%".to_owned()
    };
    #[allow(clippy::cast_precision_loss)]
    let sent = iec(u.bytes_sent as f64);
    format!("{sent:>10}  {pct}{rate}  {:?}", u.time)
}

/// Formats a byte count with binary prefixes, e.g. `3.05 MiB`.
fn iec(bytes: f64) -> String {
    const PREFIXES: [&str; 4] = ["Ki", "Mi", "Gi", "Ti"];
    if bytes < 1024.0 {
        return format!("{bytes:.0} B");
    }
    let mut value = bytes / 1024.0;
    let mut prefix = PREFIXES[0];
    for next in &PREFIXES[1..] {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        prefix = next;
    }
    format!("{value:.2} {prefix}B")
}
