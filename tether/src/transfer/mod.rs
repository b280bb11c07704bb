//! File transfers through `rsync`, with live progress.

mod events;

use std::collections::BTreeMap;
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;

use tether_proto::join;
use tracing::{debug, warn};

pub use events::{ProgressDecoder, ProgressEvent, ProgressEvents, Update, events};

use crate::error::{Error, Result};
use crate::launcher::ssh_option_args;

/// One `rsync` run.
///
/// The command line is
/// `rsync FLAGS [-e "ssh -o K=V..."] -vq --progress SOURCES... DEST`.
///
/// # Example
///
/// ```no_run
/// use tether::transfer::Transfer;
///
/// Transfer::download("box", ["logs/"], "./logs")
///     .flags(["-a", "--delete"])
///     .ssh_option("port", "2222")
///     .run(|e| eprintln!("{e:?}"))?;
/// # Ok::<(), tether::Error>(())
/// ```
#[derive(Debug, Clone)]
#[must_use = "a Transfer does nothing until .run() is called"]
pub struct Transfer {
    /// rsync executable.
    program: String,
    /// Flags placed first (default: `-ac`).
    flags: Vec<String>,
    /// Source paths, possibly `host:path`.
    sources: Vec<String>,
    /// Destination path, possibly `host:path`.
    dest: String,
    /// Options for the `ssh` transport; none means rsync's default.
    ssh_options: BTreeMap<String, String>,
    /// Let rsync write its stderr to ours instead of capturing it.
    verbose: bool,
}

impl Transfer {
    /// Copies `sources` to `dest`, both in rsync syntax.
    pub fn new<I>(sources: I, dest: impl Into<String>) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            program: "rsync".to_owned(),
            flags: vec!["-ac".to_owned()],
            sources: sources.into_iter().map(Into::into).collect(),
            dest: dest.into(),
            ssh_options: BTreeMap::new(),
            verbose: false,
        }
    }

    /// Copies local `sources` to `remote` on `host`.
    pub fn upload<I>(host: &str, sources: I, remote: &str) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self::new(sources, format!("{host}:{remote}"))
    }

    /// Copies `remote` paths on `host` to local `dest`.
    pub fn download<I>(host: &str, remote: I, dest: impl Into<String>) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let sources: Vec<String> = remote
            .into_iter()
            .map(|p| format!("{host}:{}", p.as_ref()))
            .collect();
        Self::new(sources, dest)
    }

    /// Replaces the leading flags.
    pub fn flags<I>(mut self, flags: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.flags = flags.into_iter().map(Into::into).collect();
        self
    }

    /// Appends one flag.
    pub fn arg(mut self, flag: impl Into<String>) -> Self {
        self.flags.push(flag.into());
        self
    }

    /// Adds an `ssh -o` option for the transport.
    pub fn ssh_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ssh_options.insert(key.into(), value.into());
        self
    }

    /// Adds every option in `options`; pass a launcher's options to reuse
    /// its connection settings.
    pub fn ssh_options(mut self, options: &BTreeMap<String, String>) -> Self {
        self.ssh_options
            .extend(options.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Uses another rsync executable.
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Passes rsync's stderr through instead of capturing it.
    pub const fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// The full argument vector, program first.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![self.program.clone()];
        argv.extend(self.flags.iter().cloned());
        if !self.ssh_options.is_empty() {
            let mut rsh = vec!["ssh".to_owned()];
            rsh.extend(ssh_option_args(&self.ssh_options));
            argv.push("-e".to_owned());
            argv.push(join(rsh));
        }
        argv.push("-vq".to_owned());
        argv.push("--progress".to_owned());
        argv.extend(self.sources.iter().cloned());
        argv.push(self.dest.clone());
        argv
    }

    /// Runs rsync to completion, calling `on_event` for each progress event
    /// as it is decoded.
    ///
    /// # Errors
    ///
    /// [`Error::TransferFailed`] with rsync's exit code and stderr if it
    /// exits unsuccessfully; [`Error::Io`] if it cannot be started.
    pub fn run(&self, mut on_event: impl FnMut(&ProgressEvent)) -> Result<()> {
        let argv = self.argv();
        debug!(?argv, "starting transfer");
        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(if self.verbose {
                Stdio::inherit()
            } else {
                Stdio::piped()
            })
            .spawn()?;

        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf);
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        let mut read_error = None;
        if let Some(stdout) = child.stdout.take() {
            for event in events(stdout) {
                match event {
                    Ok(event) => on_event(&event),
                    Err(e) => {
                        warn!(error = %e, "lost rsync output, killing it");
                        let _ = child.kill();
                        read_error = Some(e);
                        break;
                    }
                }
            }
        }

        let status = child.wait()?;
        let stderr = stderr
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        if let Some(e) = read_error {
            return Err(Error::Io(e));
        }
        if status.success() {
            debug!("transfer finished");
            Ok(())
        } else {
            Err(Error::TransferFailed {
                code: status.code(),
                stderr,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_command_line() {
        let t = Transfer::new(["a", "b"], "dst/");
        assert_eq!(t.argv(), ["rsync", "-ac", "-vq", "--progress", "a", "b", "dst/"]);
    }

    #[test]
    fn upload_and_download_prefix_the_host() {
        let up = Transfer::upload("box", ["./x"], "/srv/");
        assert_eq!(up.argv().last().map(String::as_str), Some("box:/srv/"));
        let down = Transfer::download("box", ["a", "b"], ".");
        assert!(down.argv().ends_with(&["box:a".to_owned(), "box:b".to_owned(), ".".to_owned()]));
    }

    #[test]
    fn ssh_options_become_one_rsh_argument() {
        let t = Transfer::new(["a"], "h:b")
            .flags(["-a"])
            .arg("--delete")
            .ssh_option("port", "2222")
            .ssh_option("controlpath", "~/.ssh/%h");
        assert_eq!(
            t.argv(),
            [
                "rsync",
                "-a",
                "--delete",
                "-e",
                "ssh -o 'controlpath=~/.ssh/%h' -o 'port=2222'",
                "-vq",
                "--progress",
                "a",
                "h:b",
            ]
        );
    }
}
