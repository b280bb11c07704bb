//! Run many commands through one persistent remote shell.
//!
//! `tether` keeps a single interpreter process alive (a local `bash`, an
//! `ssh` connection, or any custom launcher) and sends it one command at a
//! time. Output and exit codes are recovered from the shared output stream
//! by the framing protocol in [`tether_proto`].
//!
//! # Quick start
//!
//! ```no_run
//! use tether::{Invocation, Launcher, Session};
//!
//! let mut sh = Session::builder()
//!     .launcher(Launcher::ssh("user@host"))
//!     .connect()?;
//!
//! let done = sh.run(["echo", "hello world"])?;
//! assert_eq!(done.text(), Some("hello world\n"));
//!
//! // Raw strings are interpreted by the remote shell.
//! let done = sh.invoke(Invocation::new("ls /nope").check(false))?;
//! assert_ne!(done.code, 0);
//!
//! sh.set_env("GREETING", "hi there")?;
//! println!("{}", sh.pwd()?);
//! sh.close()?;
//! # Ok::<(), tether::Error>(())
//! ```
//!
//! File transfers run through `rsync` with live progress events:
//!
//! ```no_run
//! use tether::transfer::{ProgressEvent, Transfer};
//!
//! Transfer::upload("user@host", ["./build"], "deploy/").run(|event| {
//!     if let ProgressEvent::Update(u) = event {
//!         eprintln!("{} bytes ({:.0}%)", u.bytes_sent, u.percent_complete);
//!     }
//! })?;
//! # Ok::<(), tether::Error>(())
//! ```

mod config;
mod error;
mod invocation;
mod launcher;
mod process;
mod session;
pub mod transfer;

pub use config::{SessionBuilder, SessionConfig};
pub use error::{Error, Result};
pub use invocation::{Chunk, Command, Completed, Errors, Invocation, Mode, Output, Tee};
pub use launcher::{Launcher, MULTIPLEX_OPTIONS, ssh_option_args};
pub use session::{Session, SessionState};
pub use tether_proto::{join, quote};
