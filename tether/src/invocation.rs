//! Per-command options and results.

use std::borrow::Cow;
use std::fmt;
use std::io::Write;

use tether_proto::join;

/// What to send to the remote shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Argument vector; each element is quoted and the results joined.
    Tokens(Vec<String>),
    /// A command line passed to the shell as-is.
    Raw(String),
}

impl Command {
    /// Builds a [`Command::Tokens`] from any list of strings.
    pub fn tokens<I>(tokens: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self::Tokens(tokens.into_iter().map(Into::into).collect())
    }

    /// Builds a [`Command::Raw`].
    pub fn raw(line: impl Into<String>) -> Self {
        Self::Raw(line.into())
    }

    /// The line actually written to the shell, without the terminating NUL.
    pub fn render(&self) -> String {
        match self {
            Self::Tokens(tokens) => join(tokens),
            Self::Raw(line) => line.clone(),
        }
    }
}

impl From<&str> for Command {
    fn from(line: &str) -> Self {
        Self::raw(line)
    }
}

impl From<String> for Command {
    fn from(line: String) -> Self {
        Self::Raw(line)
    }
}

impl From<Vec<String>> for Command {
    fn from(tokens: Vec<String>) -> Self {
        Self::Tokens(tokens)
    }
}

impl From<Vec<&str>> for Command {
    fn from(tokens: Vec<&str>) -> Self {
        Self::tokens(tokens)
    }
}

impl From<&[&str]> for Command {
    fn from(tokens: &[&str]) -> Self {
        Self::tokens(tokens.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for Command {
    fn from(tokens: [&str; N]) -> Self {
        Self::tokens(tokens)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// How undecodable bytes are handled in text mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Errors {
    /// Substitute U+FFFD.
    #[default]
    Replace,
    /// Fail the invocation with [`Error::Decode`](crate::Error::Decode).
    Strict,
}

/// Whether output is handled as text or raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Decode output as UTF-8.
    Text(Errors),
    /// Pass bytes through untouched.
    Binary,
}

impl Default for Mode {
    fn default() -> Self {
        Self::Text(Errors::default())
    }
}

/// One piece of live output handed to a [`Tee::Callback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk<'a> {
    /// Decoded text; never splits a character.
    Text(&'a str),
    /// Raw bytes in binary mode.
    Bytes(&'a [u8]),
}

/// Where live output is mirrored while a command runs.
#[derive(Default)]
pub enum Tee<'a> {
    /// Not mirrored.
    #[default]
    Discard,
    /// Written to this process's stdout and flushed per chunk.
    Stdout,
    /// Written to a caller-supplied writer.
    Writer(&'a mut dyn Write),
    /// Handed to a closure, chunk by chunk.
    Callback(&'a mut dyn FnMut(Chunk<'_>)),
}

impl fmt::Debug for Tee<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Discard => "Discard",
            Self::Stdout => "Stdout",
            Self::Writer(_) => "Writer(..)",
            Self::Callback(_) => "Callback(..)",
        })
    }
}

/// A command plus its options.
///
/// Options left unset fall back to the session defaults
/// ([`SessionConfig`](crate::SessionConfig)).
///
/// # Example
///
/// ```no_run
/// # let mut sh = tether::Session::builder().connect()?;
/// use tether::{Chunk, Invocation, Mode};
///
/// let mut lines = 0;
/// let mut count = |c: Chunk<'_>| {
///     if let Chunk::Text(t) = c {
///         lines += t.matches('\n').count();
///     }
/// };
/// sh.invoke(
///     Invocation::new("seq 1 1000")
///         .capture(false)
///         .on_output(&mut count),
/// )?;
/// # Ok::<(), tether::Error>(())
/// ```
#[derive(Debug)]
#[must_use = "an Invocation does nothing until passed to Session::invoke"]
pub struct Invocation<'a> {
    /// What to run.
    pub(crate) command: Command,
    /// Fail on nonzero exit codes.
    pub(crate) check: bool,
    /// Keep the output in the result. `None` = session default.
    pub(crate) capture: Option<bool>,
    /// Live output sink. `None` = session default.
    pub(crate) tee: Option<Tee<'a>>,
    /// Text or binary. `None` = session default.
    pub(crate) mode: Option<Mode>,
}

impl<'a> Invocation<'a> {
    /// Starts an invocation of `command` with `check` enabled.
    pub fn new(command: impl Into<Command>) -> Self {
        Self {
            command: command.into(),
            check: true,
            capture: None,
            tee: None,
            mode: None,
        }
    }

    /// Whether a nonzero exit code is an error (default: `true`).
    pub const fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    /// Whether output is collected into [`Completed::output`].
    pub const fn capture(mut self, capture: bool) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Sets the live output sink.
    pub fn tee(mut self, tee: Tee<'a>) -> Self {
        self.tee = Some(tee);
        self
    }

    /// Shorthand for `.tee(Tee::Callback(f))`.
    pub fn on_output(self, f: &'a mut dyn FnMut(Chunk<'_>)) -> Self {
        self.tee(Tee::Callback(f))
    }

    /// Sets text or binary mode.
    pub const fn mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Shorthand for `.mode(Mode::Binary)`.
    pub const fn binary(self) -> Self {
        self.mode(Mode::Binary)
    }
}

/// Captured output of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Text mode output.
    Text(String),
    /// Binary mode output.
    Bytes(Vec<u8>),
}

impl Output {
    /// The output as bytes, whichever mode produced it.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(s) => s.as_bytes(),
            Self::Bytes(b) => b,
        }
    }

    /// The output as text, if it was captured in text mode.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Bytes(_) => None,
        }
    }

    /// The output as text, replacing invalid UTF-8 if needed.
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        match self {
            Self::Text(s) => Cow::Borrowed(s),
            Self::Bytes(b) => String::from_utf8_lossy(b),
        }
    }

    /// Consumes the output, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(s) => s.into_bytes(),
            Self::Bytes(b) => b,
        }
    }
}

/// Result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Completed {
    /// The command line that was sent.
    pub command: String,
    /// Exit code reported by the remote shell.
    pub code: i32,
    /// Captured output, or `None` if capture was disabled.
    pub output: Option<Output>,
}

impl Completed {
    /// Returns `true` if the command exited with code 0.
    pub const fn success(&self) -> bool {
        self.code == 0
    }

    /// Captured text output, if any.
    pub fn text(&self) -> Option<&str> {
        self.output.as_ref().and_then(Output::as_text)
    }

    /// Captured bytes, if any.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.output.as_ref().map(Output::as_bytes)
    }
}
