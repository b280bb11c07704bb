//! A persistent interpreter that runs one command at a time.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Read, Write};
use std::process::Stdio;
use std::time::Duration;

use tether_proto::{Demux, SessionId, is_valid_name, join, quote, remote_loop};
use tracing::{debug, info, warn};

use crate::config::{SessionBuilder, SessionConfig};
use crate::error::{Error, Result};
use crate::invocation::{Chunk, Command, Completed, Errors, Invocation, Mode, Output, Tee};
use crate::process::{Deadline, Process};

/// Read size for the interpreter's stdout.
const READ_SIZE: usize = 8192;

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionState {
    /// Created, never connected.
    Disconnected,
    /// Process started, handshake in progress.
    Connecting,
    /// Accepting commands.
    Ready,
    /// Shutting the process down.
    Closing,
    /// Process gone. [`Session::connect`] starts a fresh one.
    Closed,
}

/// The live half of a session: process plus framing state.
#[derive(Debug)]
struct Link {
    /// The interpreter.
    process: Process,
    /// Output reassembly; bytes past the last frame stay buffered here.
    demux: Demux,
}

impl Link {
    /// Writes `line` and its NUL terminator.
    fn send(&mut self, line: &str) -> io::Result<()> {
        let stdin = self.process.stdin()?;
        stdin.write_all(line.as_bytes())?;
        stdin.write_all(b"\0")?;
        stdin.flush()
    }

    /// Reads until the next control frame, emitting output on the way.
    ///
    /// Returns `None` if the stream ended first; whatever was buffered has
    /// then been emitted too.
    fn receive(&mut self, mut emit: impl FnMut(&[u8])) -> io::Result<Option<u16>> {
        let stale = self.demux.pending().len();
        if stale > 0 {
            warn!(bytes = stale, "output left over from a previous command");
        }
        let mut buf = [0u8; READ_SIZE];
        let mut n = 0;
        loop {
            if let Some(code) = self.demux.feed(&buf[..n], &mut emit) {
                return Ok(Some(code));
            }
            n = match self.process.stdout()?.read(&mut buf) {
                Ok(0) => {
                    let rest = self.demux.take_pending();
                    if !rest.is_empty() {
                        emit(&rest);
                    }
                    return Ok(None);
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => 0,
                Err(e) => return Err(e),
            };
        }
    }
}

/// Routes live output to a [`Tee`], remembering the first failure.
struct Sink<'a> {
    /// Destination.
    tee: Tee<'a>,
    /// Text or binary.
    mode: Mode,
    /// First write or decode error; later output is not mirrored.
    error: Option<Error>,
}

impl Sink<'_> {
    /// Mirrors one chunk.
    fn write(&mut self, data: &[u8]) {
        if self.error.is_some() || matches!(self.tee, Tee::Discard) {
            return;
        }
        if let Err(e) = self.try_write(data) {
            self.error = Some(e);
        }
    }

    /// Fallible part of [`write`](Self::write).
    fn try_write(&mut self, data: &[u8]) -> Result<()> {
        let text = match self.mode {
            Mode::Binary => None,
            Mode::Text(Errors::Replace) => Some(String::from_utf8_lossy(data)),
            Mode::Text(Errors::Strict) => Some(std::str::from_utf8(data)?.into()),
        };
        let bytes = text.as_deref().map_or(data, str::as_bytes);
        match &mut self.tee {
            Tee::Discard => {}
            Tee::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(bytes)?;
                out.flush()?;
            }
            Tee::Writer(w) => w.write_all(bytes)?,
            Tee::Callback(f) => f(text.as_deref().map_or(Chunk::Bytes(data), Chunk::Text)),
        }
        Ok(())
    }
}

/// Turns captured bytes into an [`Output`] according to `mode`.
fn decode(bytes: Vec<u8>, mode: Mode) -> Result<Output> {
    match mode {
        Mode::Binary => Ok(Output::Bytes(bytes)),
        Mode::Text(Errors::Replace) => Ok(Output::Text(lossy(bytes))),
        Mode::Text(Errors::Strict) => String::from_utf8(bytes)
            .map(Output::Text)
            .map_err(|e| Error::Decode(e.utf8_error())),
    }
}

/// UTF-8 decode without copying valid input.
fn lossy(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Parses `shopt` / `set -o` listings: one `NAME on|off` pair per line.
fn parse_options(listing: &str) -> BTreeMap<String, bool> {
    listing
        .lines()
        .filter_map(|line| {
            let mut words = line.split_whitespace();
            let (name, value, None) = (words.next()?, words.next()?, words.next()) else {
                return None;
            };
            match value {
                "on" => Some((name.to_owned(), true)),
                "off" => Some((name.to_owned(), false)),
                _ => None,
            }
        })
        .collect()
}

/// Why a handshake must be treated as failed, if it must.
///
/// A watchdog that fired has killed the process, so it counts as a failure
/// even when the handshake reply arrived just before.
fn handshake_failure(detected: &Result<()>, timed_out: bool, timeout: Duration) -> Option<String> {
    match (detected, timed_out) {
        (_, true) => Some(format!("no answer within {timeout:?}")),
        (Err(e), false) => Some(format!("handshake failed: {e}")),
        (Ok(()), false) => None,
    }
}

/// Values remembered between helper calls; any [`Session::invoke`] clears
/// them.
#[derive(Debug, Default)]
struct Cache {
    /// Last known working directory.
    pwd: Option<String>,
    /// Last known environment.
    env: Option<BTreeMap<String, String>>,
    /// Last known `set -o` and `shopt` flags.
    options: Option<BTreeMap<String, bool>>,
}

/// One persistent interpreter.
///
/// Commands run strictly one at a time: every method that talks to the
/// interpreter takes `&mut self`. Shell state (working directory, variables,
/// functions) carries over from one command to the next.
///
/// Dropping a session closes it.
#[derive(Debug)]
pub struct Session {
    /// Settings and invocation defaults.
    config: SessionConfig,
    /// Lifecycle state.
    state: SessionState,
    /// Present while connecting or ready.
    link: Option<Link>,
    /// Detected shell name, e.g. `bash`.
    shell: String,
    /// Detected shell version; empty if unknown.
    shell_version: String,
    /// Helper-level cache.
    cache: Cache,
}

impl Session {
    /// Creates a new [`SessionBuilder`].
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Creates a disconnected session from `config`.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Disconnected,
            link: None,
            shell: String::new(),
            shell_version: String::new(),
            cache: Cache::default(),
        }
    }

    /// The settings this session was built with.
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns `true` if commands can be sent.
    pub const fn is_ready(&self) -> bool {
        matches!(self.state, SessionState::Ready)
    }

    /// Identifier of the current connection, if any.
    pub fn id(&self) -> Option<&SessionId> {
        self.link.as_ref().map(|l| l.demux.id())
    }

    /// Shell name detected at connect time, e.g. `bash` or `zsh`.
    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Version string from the shell's `<NAME>_VERSION` variable, or empty.
    pub fn shell_version(&self) -> &str {
        &self.shell_version
    }

    /// Starts the interpreter and waits for it to answer.
    ///
    /// The process start plus handshake must finish within the connect
    /// timeout or the process is killed. On any failure the session is left
    /// [`Closed`](SessionState::Closed) and the error is
    /// [`Error::Connection`].
    pub fn connect(&mut self) -> Result<()> {
        if self.link.is_some() {
            return Err(Error::AlreadyConnected);
        }
        self.state = SessionState::Connecting;
        self.cache = Cache::default();

        let id = SessionId::generate();
        let mut cmd = self.config.launcher.command(&remote_loop(&id));
        cmd.stderr(if self.config.inherit_stderr {
            Stdio::inherit()
        } else {
            Stdio::null()
        });
        let process = Process::spawn(&mut cmd).map_err(|e| {
            self.state = SessionState::Closed;
            Error::Connection(format!("cannot start {}: {e}", self.config.launcher))
        })?;
        let pid = process.pid();
        self.link = Some(Link {
            process,
            demux: Demux::new(id),
        });

        let timeout = self.config.connect_timeout();
        let deadline = Deadline::arm(pid, timeout);
        let detected = self.detect_shell();
        let timed_out = deadline.disarm();

        if let Some(reason) = handshake_failure(&detected, timed_out, timeout) {
            self.teardown(Duration::ZERO);
            return Err(Error::Connection(format!(
                "{reason} ({})",
                self.config.launcher
            )));
        }
        self.state = SessionState::Ready;
        info!(
            launcher = %self.config.launcher,
            shell = %self.shell,
            version = %self.shell_version,
            "session ready"
        );
        Ok(())
    }

    /// First exchange: learn the shell's name and version.
    fn detect_shell(&mut self) -> Result<()> {
        let argv0 = self.query(r#"\printf '%s' "$0""#)?;
        let name = argv0.rsplit('/').next().unwrap_or_default();
        self.shell = name.trim_start_matches('-').to_owned();
        self.shell_version = if is_valid_name(&self.shell) {
            let var = format!("{}_VERSION", self.shell.to_ascii_uppercase());
            self.query(format!(r#"\printf '%s' "${{{var}:-}}""#))?
        } else {
            String::new()
        };
        Ok(())
    }

    /// Runs one command.
    ///
    /// Clears the working directory and environment cache, since the
    /// command may change either.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the session isn't ready.
    /// - [`Error::Nul`] if the command line contains a NUL byte.
    /// - [`Error::CommandFailed`] for a nonzero exit with `check` set.
    /// - [`Error::PrematureExit`] if the interpreter died; the session is
    ///   then closed.
    /// - [`Error::Decode`] for invalid UTF-8 under [`Errors::Strict`]. The
    ///   command still ran to completion.
    /// - [`Error::Io`] if writing a tee failed, or the pipe itself failed.
    pub fn invoke(&mut self, invocation: Invocation<'_>) -> Result<Completed> {
        if self.state != SessionState::Ready {
            return Err(Error::NotConnected);
        }
        self.cache = Cache::default();
        self.exchange(invocation)
    }

    /// Runs `command` with the session defaults and `check` enabled.
    pub fn run(&mut self, command: impl Into<Command>) -> Result<Completed> {
        self.invoke(Invocation::new(command))
    }

    /// Sends one command and collects its result. Does not touch the cache.
    fn exchange(&mut self, invocation: Invocation<'_>) -> Result<Completed> {
        let Invocation {
            command,
            check,
            capture,
            tee,
            mode,
        } = invocation;
        let capture = capture.unwrap_or(self.config.capture);
        let mode = mode.unwrap_or_else(|| self.config.mode());
        let tee = tee.unwrap_or(if self.config.tee {
            Tee::Stdout
        } else {
            Tee::Discard
        });

        let line = command.render();
        if line.contains('\0') {
            return Err(Error::Nul);
        }
        let link = self.link.as_mut().ok_or(Error::NotConnected)?;
        debug!(id = %link.demux.id(), command = %line, "invoke");

        let mut sink = Sink {
            tee,
            mode,
            error: None,
        };
        let mut captured = Vec::new();
        let received = link.send(&line).and_then(|()| {
            link.receive(|data| {
                sink.write(data);
                if capture {
                    captured.extend_from_slice(data);
                }
            })
        });

        let code = match received {
            Ok(Some(code)) => i32::from(code),
            Ok(None) => return Err(self.premature(line, capture.then_some(captured), mode)),
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                return Err(self.premature(line, capture.then_some(captured), mode));
            }
            Err(e) => {
                warn!(error = %e, "interpreter pipe failed");
                self.teardown(self.config.close_timeout());
                return Err(Error::Io(e));
            }
        };
        debug!(code, "command finished");

        if let Some(e) = sink.error {
            return Err(e);
        }
        let output = capture.then(|| decode(captured, mode)).transpose()?;
        if check && code != 0 {
            return Err(Error::CommandFailed {
                code,
                command: line,
                output,
            });
        }
        Ok(Completed {
            command: line,
            code,
            output,
        })
    }

    /// Shuts down after the stream ended mid-command.
    ///
    /// Partial output follows `mode`, except that strict text falls back to
    /// lossy decoding rather than losing it.
    fn premature(&mut self, command: String, captured: Option<Vec<u8>>, mode: Mode) -> Error {
        warn!(%command, "interpreter exited before the command finished");
        self.teardown(self.config.close_timeout());
        let output = captured.map(|bytes| match mode {
            Mode::Binary => Output::Bytes(bytes),
            Mode::Text(_) => Output::Text(lossy(bytes)),
        });
        Error::PrematureExit { command, output }
    }

    /// Checked, captured, unmirrored text exchange, for helpers.
    fn query(&mut self, command: impl Into<Command>) -> Result<String> {
        let done = self.exchange(
            Invocation::new(command)
                .capture(true)
                .tee(Tee::Discard)
                .mode(Mode::Text(Errors::Replace)),
        )?;
        Ok(match done.output {
            Some(Output::Text(s)) => s,
            Some(Output::Bytes(b)) => lossy(b),
            None => String::new(),
        })
    }

    /// Like [`query`](Self::query) but requires a ready session.
    fn helper_query(&mut self, command: impl Into<Command>) -> Result<String> {
        if self.state != SessionState::Ready {
            return Err(Error::NotConnected);
        }
        self.query(command)
    }

    /// Current working directory of the remote shell. Cached.
    pub fn pwd(&mut self) -> Result<&str> {
        if self.cache.pwd.is_none() {
            let out = self.helper_query(r"\pwd")?;
            self.cache.pwd = Some(strip_line(out)?);
        }
        Ok(self.cache.pwd.as_deref().unwrap_or_default())
    }

    /// Changes the remote working directory; an empty path means `$HOME`.
    /// Returns the new directory.
    pub fn cd(&mut self, path: &str) -> Result<&str> {
        let cmd = if path.is_empty() {
            r"\cd && \pwd".to_owned()
        } else {
            format!(r"\cd {} && \pwd", quote(path))
        };
        let out = self.helper_query(cmd)?;
        self.cache.pwd = Some(strip_line(out)?);
        // PWD and OLDPWD moved with it.
        self.cache.env = None;
        Ok(self.cache.pwd.as_deref().unwrap_or_default())
    }

    /// Entries of a remote directory, sorted, without `.` and `..`.
    ///
    /// A path naming a non-directory lists just that path.
    pub fn ls(&mut self, path: &str) -> Result<Vec<String>> {
        let cmd = if path.is_empty() || path == "." {
            r"\find . -maxdepth 1 -print0".to_owned()
        } else {
            let q = quote(path);
            format!(
                r"if \[ -e {q} ] && \[ ! -d {q} ]; then \printf '%s\0' {q}; else (\cd {q} && \find . -maxdepth 1 -print0); fi"
            )
        };
        let out = self.helper_query(cmd)?;
        let names: BTreeSet<&str> = out
            .split('\0')
            .map(|n| n.strip_prefix("./").unwrap_or(n))
            .filter(|n| !matches!(*n, "" | "." | ".."))
            .collect();
        Ok(names.into_iter().map(str::to_owned).collect())
    }

    /// The remote environment. Cached.
    pub fn env(&mut self) -> Result<&BTreeMap<String, String>> {
        if self.cache.env.is_none() {
            let out = self.helper_query(r"\env -0")?;
            let vars = out
                .split('\0')
                .filter_map(|kv| kv.split_once('='))
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect();
            self.cache.env = Some(vars);
        }
        Ok(self.cache.env.get_or_insert_default())
    }

    /// One environment variable, or `None` if unset.
    pub fn env_var(&mut self, name: &str) -> Result<Option<&str>> {
        if !is_valid_name(name) {
            return Err(Error::InvalidName(name.to_owned()));
        }
        Ok(self.env()?.get(name).map(String::as_str))
    }

    /// Exports `name=value` in the remote shell.
    pub fn set_env(&mut self, name: &str, value: &str) -> Result<()> {
        if !is_valid_name(name) {
            return Err(Error::InvalidName(name.to_owned()));
        }
        self.helper_query(join(["export", &format!("{name}={value}")]))?;
        if let Some(env) = &mut self.cache.env {
            env.insert(name.to_owned(), value.to_owned());
        }
        Ok(())
    }

    /// Unsets `name` in the remote shell.
    pub fn unset_env(&mut self, name: &str) -> Result<()> {
        if !is_valid_name(name) {
            return Err(Error::InvalidName(name.to_owned()));
        }
        self.helper_query(join(["unset", name]))?;
        if let Some(env) = &mut self.cache.env {
            env.remove(name);
        }
        Ok(())
    }

    /// `$PATH`, split on `:`.
    pub fn search_path(&mut self) -> Result<Vec<String>> {
        Ok(self
            .env_var("PATH")?
            .filter(|p| !p.is_empty())
            .map(|p| p.split(':').map(str::to_owned).collect())
            .unwrap_or_default())
    }

    /// Replaces `$PATH`.
    pub fn set_search_path<I>(&mut self, dirs: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let joined = dirs
            .into_iter()
            .map(|d| d.as_ref().to_owned())
            .collect::<Vec<_>>()
            .join(":");
        self.set_env("PATH", &joined)
    }

    /// Every `set -o` and `shopt` flag the shell reports. Cached.
    pub fn shell_options(&mut self) -> Result<&BTreeMap<String, bool>> {
        if self.cache.options.is_none() {
            let out = self.helper_query(r"\shopt 2>/dev/null; \set -o 2>/dev/null")?;
            self.cache.options = Some(parse_options(&out));
        }
        Ok(self.cache.options.get_or_insert_default())
    }

    /// One shell option, or `None` if the shell doesn't know it.
    pub fn shell_option(&mut self, name: &str) -> Result<Option<bool>> {
        if !is_valid_name(name) {
            return Err(Error::InvalidName(name.to_owned()));
        }
        Ok(self.shell_options()?.get(name).copied())
    }

    /// Turns a shell option on or off, trying `set -o` before `shopt`.
    pub fn set_shell_option(&mut self, name: &str, on: bool) -> Result<()> {
        if !is_valid_name(name) {
            return Err(Error::InvalidName(name.to_owned()));
        }
        let (sign, flag) = if on { ('-', "-s") } else { ('+', "-u") };
        self.helper_query(format!(
            r"\set {sign}o {name} 2>/dev/null || \shopt {flag} {name}"
        ))?;
        if let Some(options) = &mut self.cache.options {
            options.insert(name.to_owned(), on);
        }
        Ok(())
    }

    /// Runs `. PATH ARGS...` in the session's shell, so whatever the script
    /// defines stays defined.
    pub fn source<I>(&mut self, path: &str, args: I) -> Result<Completed>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut tokens = vec![".".to_owned(), path.to_owned()];
        tokens.extend(args.into_iter().map(Into::into));
        self.run(tokens)
    }

    /// Closes the session using the configured close timeout.
    pub fn close(&mut self) -> Result<()> {
        self.close_within(self.config.close_timeout())
    }

    /// Closes the session: end of input, then `SIGTERM`, then `SIGKILL`
    /// after `timeout`. Closing a closed session does nothing.
    pub fn close_within(&mut self, timeout: Duration) -> Result<()> {
        if let Some(mut link) = self.link.take() {
            self.state = SessionState::Closing;
            let result = link.process.terminate(timeout);
            self.finish_close();
            result?;
            info!("session closed");
        }
        Ok(())
    }

    /// Tears down after an error, logging rather than returning failures.
    fn teardown(&mut self, timeout: Duration) {
        if let Some(mut link) = self.link.take() {
            self.state = SessionState::Closing;
            if let Err(e) = link.process.terminate(timeout) {
                warn!(error = %e, "failed to reap interpreter");
            }
        }
        self.finish_close();
    }

    /// Final state after the link is gone.
    fn finish_close(&mut self) {
        self.state = SessionState::Closed;
        self.cache = Cache::default();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "error closing session");
        }
    }
}

/// Strips exactly one trailing line feed, as printed by `pwd`.
fn strip_line(mut s: String) -> Result<String> {
    if s.pop() == Some('\n') {
        Ok(s)
    } else {
        Err(Error::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            "expected a newline-terminated path",
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::launcher::Launcher;

    #[test]
    fn new_session_is_disconnected() {
        let mut s = Session::new(SessionConfig::default());
        assert_eq!(s.state(), SessionState::Disconnected);
        assert!(s.id().is_none());
        assert!(matches!(s.run("true"), Err(Error::NotConnected)));
        assert!(matches!(s.pwd(), Err(Error::NotConnected)));
        s.close().unwrap();
        assert_eq!(s.state(), SessionState::Disconnected);
    }

    #[test]
    fn invalid_names_fail_before_any_io() {
        let mut s = Session::new(SessionConfig::default());
        for name in ["", "1X", "A-B", "A B"] {
            assert!(matches!(s.set_env(name, "v"), Err(Error::InvalidName(_))));
            assert!(matches!(s.unset_env(name), Err(Error::InvalidName(_))));
            assert!(matches!(s.env_var(name), Err(Error::InvalidName(_))));
            assert!(matches!(
                s.set_shell_option(name, true),
                Err(Error::InvalidName(_))
            ));
        }
    }

    #[test]
    fn missing_program_is_a_connection_error() {
        let mut s = Session::builder()
            .launcher(Launcher::custom("/nonexistent/tether-shell", Vec::<String>::new()))
            .build();
        assert!(matches!(s.connect(), Err(Error::Connection(_))));
        assert_eq!(s.state(), SessionState::Closed);
    }

    #[test]
    fn fired_watchdog_fails_the_handshake_even_after_a_reply() {
        let t = Duration::from_millis(300);
        assert_eq!(handshake_failure(&Ok(()), false, t), None);
        let late = handshake_failure(&Ok(()), true, t).unwrap();
        assert!(late.contains("no answer"), "{late}");
        let broken = handshake_failure(&Err(Error::NotConnected), false, t).unwrap();
        assert!(broken.starts_with("handshake failed"), "{broken}");
    }

    #[test]
    fn option_listings_parse() {
        let listing = "autocd         \toff\ncdspell        \ton\nnoglob          off\nbraceexpand     on\nnot a flag\n";
        let opts = parse_options(listing);
        assert_eq!(opts.len(), 4);
        assert!(opts["cdspell"]);
        assert!(!opts["noglob"]);
        assert!(!opts.contains_key("not"));
    }

    #[test]
    fn strip_line_requires_newline() {
        assert_eq!(strip_line("/tmp\n".into()).unwrap(), "/tmp");
        assert!(strip_line("/tmp".into()).is_err());
    }

    #[test]
    fn decode_modes() {
        let bad = vec![b'a', 0xff];
        assert_eq!(
            decode(bad.clone(), Mode::Text(Errors::Replace)).unwrap(),
            Output::Text("a\u{fffd}".into())
        );
        assert!(matches!(
            decode(bad.clone(), Mode::Text(Errors::Strict)),
            Err(Error::Decode(_))
        ));
        assert_eq!(decode(bad.clone(), Mode::Binary).unwrap(), Output::Bytes(bad));
    }

    #[test]
    fn sink_reports_strict_decode_failure_once() {
        let mut seen = Vec::new();
        let mut f = |c: Chunk<'_>| {
            if let Chunk::Text(t) = c {
                seen.push(t.to_owned());
            }
        };
        let mut sink = Sink {
            tee: Tee::Callback(&mut f),
            mode: Mode::Text(Errors::Strict),
            error: None,
        };
        sink.write(b"ok");
        sink.write(&[0xff]);
        sink.write(b"after");
        assert!(matches!(sink.error, Some(Error::Decode(_))));
        drop(sink);
        assert_eq!(seen, ["ok"]);
    }
}
