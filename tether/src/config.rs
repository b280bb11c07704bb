//! Session configuration and JSON persistence.

use std::path::Path;
use std::time::Duration;
use std::{fs, io};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::invocation::{Errors, Mode};
use crate::launcher::Launcher;
use crate::session::Session;

/// Serializable snapshot of a session's settings.
///
/// Unknown fields are rejected; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct SessionConfig {
    /// How the interpreter is started.
    pub launcher: Launcher,
    /// Limit on process start plus handshake, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Grace period between the termination request and `SIGKILL`, in
    /// milliseconds.
    pub close_timeout_ms: u64,
    /// Let the interpreter write its own stderr to ours. Off by default;
    /// the remote loop already merges command stderr into stdout.
    pub inherit_stderr: bool,
    /// Default mode: text (`true`) or binary.
    pub text: bool,
    /// Default live output: mirror to stdout (`true`) or discard.
    pub tee: bool,
    /// Default capture.
    pub capture: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            launcher: Launcher::default(),
            connect_timeout_ms: 10_000,
            close_timeout_ms: 10_000,
            inherit_stderr: false,
            text: true,
            tee: false,
            capture: true,
        }
    }
}

impl SessionConfig {
    /// Loads a config from a JSON file.
    pub fn load(path: &Path) -> io::Result<Self> {
        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Writes the config to a JSON file.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }

    /// Connect timeout as a [`Duration`].
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Close timeout as a [`Duration`].
    pub const fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    /// Default [`Mode`] for invocations that don't set one.
    pub(crate) const fn mode(&self) -> Mode {
        if self.text {
            Mode::Text(Errors::Replace)
        } else {
            Mode::Binary
        }
    }
}

/// Builder for a [`Session`].
///
/// Defaults: local `bash`, 10 s connect and close timeouts, text mode,
/// output captured and not mirrored.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use tether::{Launcher, Session};
///
/// let mut sh = Session::builder()
///     .launcher(Launcher::multiplexed("build-box"))
///     .connect_timeout(Duration::from_secs(30))
///     .tee(true)
///     .connect()?;
/// sh.run("make -j8")?;
/// # Ok::<(), tether::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
#[must_use = "a SessionBuilder does nothing until .build() or .connect() is called"]
pub struct SessionBuilder {
    /// Accumulated settings.
    config: SessionConfig,
}

impl SessionBuilder {
    /// Sets how the interpreter is started.
    pub fn launcher(mut self, launcher: Launcher) -> Self {
        self.config.launcher = launcher;
        self
    }

    /// Sets the connect timeout (default: 10 s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_ms = millis(timeout);
        self
    }

    /// Sets the close grace period (default: 10 s).
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_timeout_ms = millis(timeout);
        self
    }

    /// Passes the interpreter's stderr through (default: off).
    pub const fn inherit_stderr(mut self, inherit: bool) -> Self {
        self.config.inherit_stderr = inherit;
        self
    }

    /// Default to text (`true`) or binary mode (default: text).
    pub const fn text(mut self, text: bool) -> Self {
        self.config.text = text;
        self
    }

    /// Default to mirroring output on stdout (default: off).
    pub const fn tee(mut self, tee: bool) -> Self {
        self.config.tee = tee;
        self
    }

    /// Default to capturing output (default: on).
    pub const fn capture(mut self, capture: bool) -> Self {
        self.config.capture = capture;
        self
    }

    /// Snapshot of the current settings.
    pub fn to_config(&self) -> SessionConfig {
        self.config.clone()
    }

    /// Starts from a saved config.
    pub const fn from_config(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Creates a disconnected session.
    pub fn build(self) -> Session {
        Session::new(self.config)
    }

    /// Creates a session and connects it.
    pub fn connect(self) -> Result<Session> {
        let mut session = self.build();
        session.connect()?;
        Ok(session)
    }
}

/// Whole milliseconds in `d`, saturating.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn builder_roundtrips_through_config() {
        let b = SessionBuilder::default()
            .launcher(Launcher::ssh("h"))
            .connect_timeout(Duration::from_millis(1500))
            .tee(true)
            .text(false);
        let cfg = b.to_config();
        assert_eq!(cfg.connect_timeout(), Duration::from_millis(1500));
        assert_eq!(cfg.close_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.mode(), Mode::Binary);
        assert_eq!(SessionBuilder::from_config(cfg.clone()).to_config(), cfg);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let cfg = SessionBuilder::default()
            .launcher(Launcher::multiplexed("box"))
            .capture(false)
            .to_config();
        cfg.save(&path).unwrap();
        assert_eq!(SessionConfig::load(&path).unwrap(), cfg);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: SessionConfig = serde_json::from_str(r#"{"tee": true}"#).unwrap();
        assert!(cfg.tee && cfg.text && cfg.capture);
        assert_eq!(cfg.launcher, Launcher::local());
    }

    #[test]
    fn bad_json_is_invalid_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"launcher": 5}"#).unwrap();
        let err = SessionConfig::load(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
