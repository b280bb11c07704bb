//! How the interpreter process is started.

use std::collections::BTreeMap;
use std::fmt;
use std::process;

use serde::{Deserialize, Serialize};

/// `ssh -o` options that share one master connection per host.
///
/// The first session opens a control socket under `~/.ssh/`; later
/// sessions to the same host reuse it and skip authentication.
pub const MULTIPLEX_OPTIONS: &[(&str, &str)] = &[
    ("loglevel", "error"),
    ("controlmaster", "auto"),
    ("controlpath", "~/.ssh/.%u@%h:%p.control"),
    ("controlpersist", "no"),
];

/// Program and arguments that start a shell which runs a given script.
///
/// The script is always passed as the last argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Launcher {
    /// A shell on this machine: `SHELL -c SCRIPT`.
    Local {
        /// Shell program (default: `bash`).
        #[serde(default = "default_shell")]
        shell: String,
    },
    /// A login shell on a remote host: `ssh [-o K=V]... HOST -- SCRIPT`.
    Ssh {
        /// Destination in any form `ssh` accepts.
        host: String,
        /// Client program (default: `ssh`).
        #[serde(default = "default_ssh")]
        program: String,
        /// `-o` options, passed in key order.
        #[serde(default)]
        options: BTreeMap<String, String>,
    },
    /// Anything else: `PROGRAM ARGS... SCRIPT`.
    Custom {
        /// Program to run.
        program: String,
        /// Arguments placed before the script.
        #[serde(default)]
        args: Vec<String>,
    },
}

/// Default local shell.
fn default_shell() -> String {
    "bash".to_owned()
}

/// Default SSH client.
fn default_ssh() -> String {
    "ssh".to_owned()
}

impl Default for Launcher {
    fn default() -> Self {
        Self::local()
    }
}

impl Launcher {
    /// Local `bash`.
    pub fn local() -> Self {
        Self::Local {
            shell: default_shell(),
        }
    }

    /// A local shell other than `bash`.
    pub fn local_shell(shell: impl Into<String>) -> Self {
        Self::Local {
            shell: shell.into(),
        }
    }

    /// Plain `ssh` to `host`, no extra options.
    pub fn ssh(host: impl Into<String>) -> Self {
        Self::Ssh {
            host: host.into(),
            program: default_ssh(),
            options: BTreeMap::new(),
        }
    }

    /// `ssh` to `host` with [`MULTIPLEX_OPTIONS`].
    pub fn multiplexed(host: impl Into<String>) -> Self {
        MULTIPLEX_OPTIONS
            .iter()
            .fold(Self::ssh(host), |l, (k, v)| l.option(*k, *v))
    }

    /// An arbitrary program; the script is appended to `args`.
    pub fn custom<I>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self::Custom {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Sets an `ssh -o` option. Ignored for non-SSH launchers.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let Self::Ssh { options, .. } = &mut self {
            options.insert(key.into(), value.into());
        }
        self
    }

    /// Remote host, for SSH launchers.
    pub fn host(&self) -> Option<&str> {
        match self {
            Self::Ssh { host, .. } => Some(host),
            _ => None,
        }
    }

    /// `ssh -o` options, for SSH launchers.
    pub fn ssh_options(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Ssh { options, .. } => Some(options),
            _ => None,
        }
    }

    /// Full argument vector, program first, that runs `script`.
    pub fn argv(&self, script: &str) -> Vec<String> {
        let mut argv = match self {
            Self::Local { shell } => vec![shell.clone(), "-c".to_owned()],
            Self::Ssh {
                host,
                program,
                options,
            } => {
                let mut v = vec![program.clone()];
                v.extend(ssh_option_args(options));
                v.push(host.clone());
                v.push("--".to_owned());
                v
            }
            Self::Custom { program, args } => {
                let mut v = vec![program.clone()];
                v.extend(args.iter().cloned());
                v
            }
        };
        argv.push(script.to_owned());
        argv
    }

    /// A [`process::Command`] that runs `script`, with no stdio configured.
    pub(crate) fn command(&self, script: &str) -> process::Command {
        let argv = self.argv(script);
        let mut cmd = process::Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        cmd
    }
}

impl fmt::Display for Launcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { shell } => write!(f, "local {shell}"),
            Self::Ssh { host, program, .. } => write!(f, "{program} {host}"),
            Self::Custom { program, .. } => f.write_str(program),
        }
    }
}

/// Expands options into `["-o", "k=v", ...]` for `ssh`.
pub fn ssh_option_args(options: &BTreeMap<String, String>) -> Vec<String> {
    options
        .iter()
        .flat_map(|(k, v)| ["-o".to_owned(), format!("{k}={v}")])
        .collect()
}
