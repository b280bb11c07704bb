//! Streaming separation of plain output from control frames.

use crate::frame::{self, FRAME_LEN, MARKER, Probe};
use crate::id::SessionId;

/// Incremental demultiplexer for one session's output stream.
///
/// Feed it raw blocks exactly as they come off the pipe. Plain output is
/// handed to a callback as soon as it is known not to be part of a control
/// frame; the exit code is returned once a complete frame has been seen.
///
/// Between calls it keeps only a small carry-over: either the start of a
/// frame that has not fully arrived, or the first 1–3 bytes of a UTF-8
/// character split by the read boundary. A frame or character straddling
/// two reads is therefore never misread and never emitted half-decoded.
#[derive(Debug)]
pub struct Demux {
    /// Identifier whose frames terminate a command.
    id: SessionId,
    /// Carry-over followed by the block being scanned.
    buf: Vec<u8>,
}

impl Demux {
    /// Creates a demultiplexer for frames tagged with `id`.
    pub const fn new(id: SessionId) -> Self {
        Self {
            id,
            buf: Vec::new(),
        }
    }

    /// Returns the session identifier this demultiplexer matches.
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    /// Processes one raw block.
    ///
    /// Plain output is passed to `emit` in order, possibly in several
    /// pieces. Returns `Some(code)` when a control frame completes; bytes
    /// after that frame stay buffered for the next call. An empty `block`
    /// only rescans what is already buffered.
    pub fn feed(&mut self, block: &[u8], mut emit: impl FnMut(&[u8])) -> Option<u16> {
        self.buf.extend_from_slice(block);

        let mut code = None;
        let mut consumed = None;
        let mut from = 0;
        while let Some(i) = memchr(MARKER, &self.buf[from..]).map(|p| p + from) {
            match frame::probe(&self.buf[i..], &self.id) {
                Probe::Complete(c) => {
                    emit_nonempty(&mut emit, &self.buf[..i]);
                    code = Some(c);
                    consumed = Some(i + FRAME_LEN);
                    break;
                }
                Probe::Partial => {
                    emit_nonempty(&mut emit, &self.buf[..i]);
                    consumed = Some(i);
                    break;
                }
                Probe::Mismatch => from = i + 1,
            }
        }

        let consumed = consumed.unwrap_or_else(|| {
            let keep = incomplete_utf8_tail(&self.buf);
            let end = self.buf.len() - keep;
            emit_nonempty(&mut emit, &self.buf[..end]);
            end
        });
        self.buf.drain(..consumed);
        code
    }

    /// Bytes currently held back.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    /// Removes and returns the held-back bytes, e.g. to salvage them as
    /// output when the stream ends before a frame.
    pub fn take_pending(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

/// Calls `emit` unless `data` is empty.
fn emit_nonempty(emit: &mut impl FnMut(&[u8]), data: &[u8]) {
    if !data.is_empty() {
        emit(data);
    }
}

/// Position of the first `needle` in `haystack`.
fn memchr(needle: u8, haystack: &[u8]) -> Option<usize> {
    haystack.iter().position(|&b| b == needle)
}

/// Length of a trailing, truncated UTF-8 sequence in `data` (0–3).
///
/// Walks back over at most three continuation bytes to the lead byte and
/// compares the sequence length the lead announces with what is present.
fn incomplete_utf8_tail(data: &[u8]) -> usize {
    let n = data.len();
    for back in 1..=3.min(n) {
        let b = data[n - back];
        if b & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let want = match b {
            _ if b & 0b1110_0000 == 0b1100_0000 => 2,
            _ if b & 0b1111_0000 == 0b1110_0000 => 3,
            _ if b & 0b1111_1000 == 0b1111_0000 => 4,
            _ => return 0,
        };
        return if back < want { back } else { 0 };
    }
    0
}
