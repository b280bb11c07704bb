//! Wire protocol for tether sessions.
//!
//! A session drives one long-lived POSIX shell through its standard
//! streams. Commands go in as NUL-terminated strings; results come back on
//! a single merged output stream in which every command's output is
//! followed by exactly one control frame:
//!
//! ```text
//! 0xFF  DDD  <22-byte session id>  0xFF
//! ```
//!
//! where `DDD` is the zero-padded exit code. This crate holds the pieces of
//! that contract that need no I/O: identifier generation, the frame
//! grammar and remote loop script, the streaming [`Demux`], and the
//! [`quote`]/[`join`] encoder that produces shell-safe command lines.

mod demux;
mod frame;
mod id;
mod quote;

pub use demux::Demux;
pub use frame::{FRAME_LEN, MARKER, encode_frame, remote_loop};
pub use id::{ID_ALPHABET, ID_LEN, SessionId};
pub use quote::{Style, classify, is_valid_name, join, quote};
