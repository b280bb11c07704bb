//! Interpreter child process ownership and termination.

use std::io;
use std::process::{self, Child, ChildStdin, ChildStdout, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{debug, warn};

/// Interval between liveness checks while waiting for exit.
const POLL: Duration = Duration::from_millis(20);

/// A running interpreter with piped stdin and stdout.
///
/// Dropping an unreaped process kills it.
#[derive(Debug)]
pub(crate) struct Process {
    /// The child handle.
    child: Child,
    /// Host PID of the child.
    pid: Pid,
    /// Write end of the child's stdin; `None` once closed.
    stdin: Option<ChildStdin>,
    /// Read end of the child's stdout.
    stdout: Option<ChildStdout>,
    /// Set once the exit status has been collected.
    reaped: bool,
}

impl Process {
    /// Spawns `cmd` with stdin and stdout piped.
    ///
    /// stderr is left as configured on `cmd`.
    pub(crate) fn spawn(cmd: &mut process::Command) -> io::Result<Self> {
        let mut child = cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).spawn()?;
        let pid = i32::try_from(child.id())
            .map(Pid::from_raw)
            .map_err(io::Error::other)?;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        debug!(pid = pid.as_raw(), "spawned interpreter");
        Ok(Self {
            child,
            pid,
            stdin,
            stdout,
            reaped: false,
        })
    }

    /// Host PID of the child.
    pub(crate) const fn pid(&self) -> Pid {
        self.pid
    }

    /// The child's stdin, or `BrokenPipe` once it has been closed.
    pub(crate) fn stdin(&mut self) -> io::Result<&mut ChildStdin> {
        self.stdin
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::BrokenPipe))
    }

    /// The child's stdout, or `BrokenPipe` once it has been closed.
    pub(crate) fn stdout(&mut self) -> io::Result<&mut ChildStdout> {
        self.stdout
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::BrokenPipe))
    }

    /// Closes stdin, sends `SIGTERM`, and waits up to `grace` for the child
    /// to exit before sending `SIGKILL`.
    ///
    /// Returns the exit status. Calling this again returns immediately.
    pub(crate) fn terminate(&mut self, grace: Duration) -> io::Result<Option<ExitStatus>> {
        if self.reaped {
            return Ok(None);
        }
        drop(self.stdin.take());

        let status = match self.child.try_wait()? {
            Some(status) => status,
            None => {
                self.signal(Signal::SIGTERM)?;
                match self.wait_until(Instant::now() + grace)? {
                    Some(status) => status,
                    None => {
                        warn!(
                            pid = self.pid.as_raw(),
                            ?grace,
                            "interpreter ignored SIGTERM, killing"
                        );
                        self.signal(Signal::SIGKILL)?;
                        self.child.wait()?
                    }
                }
            }
        };
        self.reaped = true;
        drop(self.stdout.take());
        debug!(pid = self.pid.as_raw(), %status, "interpreter exited");
        Ok(Some(status))
    }

    /// Polls for exit until `deadline`.
    fn wait_until(&mut self, deadline: Instant) -> io::Result<Option<ExitStatus>> {
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL);
        }
    }

    /// Sends `sig` to the child. A child that already exited is not an error.
    fn signal(&self, sig: Signal) -> io::Result<()> {
        match signal::kill(self.pid, sig) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(io::Error::from(e)),
        }
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Kills a process with `SIGKILL` unless disarmed before a timeout.
///
/// The watcher thread is joined on [`disarm`](Self::disarm), so no signal
/// can be sent after it returns.
#[derive(Debug)]
pub(crate) struct Deadline {
    /// Dropping this wakes the watcher early.
    cancel: Option<mpsc::Sender<()>>,
    /// Set if the watcher fired.
    fired: Arc<AtomicBool>,
    /// Watcher thread.
    worker: Option<JoinHandle<()>>,
}

impl Deadline {
    /// Arms a watcher that kills `pid` after `timeout`.
    pub(crate) fn arm(pid: Pid, timeout: Duration) -> Self {
        let (cancel, rx) = mpsc::channel::<()>();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let worker = thread::spawn(move || {
            if rx.recv_timeout(timeout) == Err(mpsc::RecvTimeoutError::Timeout) {
                flag.store(true, Ordering::SeqCst);
                warn!(pid = pid.as_raw(), "deadline expired, killing interpreter");
                let _ = signal::kill(pid, Signal::SIGKILL);
            }
        });
        Self {
            cancel: Some(cancel),
            fired,
            worker: Some(worker),
        }
    }

    /// Stops the watcher and reports whether it fired.
    pub(crate) fn disarm(mut self) -> bool {
        self.stop();
        self.fired.load(Ordering::SeqCst)
    }

    /// Wakes and joins the watcher.
    fn stop(&mut self) {
        drop(self.cancel.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Read;

    use super::*;

    fn sh(script: &str) -> Option<Process> {
        let mut cmd = process::Command::new("sh");
        cmd.arg("-c").arg(script).stderr(Stdio::null());
        Process::spawn(&mut cmd).ok()
    }

    /// Blocks until the child prints `ready`.
    fn wait_ready(p: &mut Process) {
        let mut buf = [0u8; 6];
        p.stdout().unwrap().read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ready\n");
    }

    #[test]
    fn terminate_is_graceful_when_possible() {
        let Some(mut p) = sh("echo ready; read line") else {
            return;
        };
        wait_ready(&mut p);
        let start = Instant::now();
        let status = p.terminate(Duration::from_secs(5)).unwrap();
        assert!(status.is_some());
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(p.terminate(Duration::from_secs(5)).unwrap(), None);
    }

    #[test]
    fn terminate_escalates_when_sigterm_is_ignored() {
        let Some(mut p) = sh("trap '' TERM; echo ready; while :; do sleep 1; done") else {
            return;
        };
        wait_ready(&mut p);
        let grace = Duration::from_millis(300);
        let start = Instant::now();
        let status = p.terminate(grace).unwrap().unwrap();
        let elapsed = start.elapsed();
        assert!(!status.success());
        assert!(elapsed >= grace, "killed before the grace period: {elapsed:?}");
        assert!(elapsed < grace + Duration::from_secs(2), "took {elapsed:?}");
    }

    #[test]
    fn deadline_kills_and_reports() {
        let Some(mut p) = sh("echo ready; exec sleep 30") else {
            return;
        };
        wait_ready(&mut p);
        let d = Deadline::arm(p.pid(), Duration::from_millis(100));
        let mut rest = Vec::new();
        let _ = p.stdout().unwrap().read_to_end(&mut rest);
        assert!(d.disarm());
        let _ = p.terminate(Duration::ZERO);
    }

    #[test]
    fn disarmed_deadline_never_fires() {
        let Some(mut p) = sh("echo ready; read line") else {
            return;
        };
        wait_ready(&mut p);
        let d = Deadline::arm(p.pid(), Duration::from_secs(30));
        assert!(!d.disarm());
        assert!(p.terminate(Duration::from_secs(5)).unwrap().is_some());
    }
}
