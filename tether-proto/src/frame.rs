//! Control-frame grammar and the remote command loop that emits it.
//!
//! Each frame is: `[0xFF][3 ASCII digits][session id][0xFF]`.

use crate::id::{ID_LEN, SessionId};

/// Out-of-band marker byte that opens and closes a control frame.
///
/// `0xFF` never occurs in well-formed UTF-8, so text output cannot
/// produce it by accident.
pub const MARKER: u8 = 0xFF;

/// Total length of a control frame in bytes.
pub const FRAME_LEN: usize = 1 + CODE_LEN + ID_LEN + 1;

/// Number of decimal digits carrying the exit code.
const CODE_LEN: usize = 3;

/// Result of testing the bytes at a marker position against the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Probe {
    /// A whole frame is present; carries the decoded exit code.
    Complete(u16),
    /// Every available byte fits the grammar but the frame is cut short.
    Partial,
    /// The bytes cannot be a frame for this session.
    Mismatch,
}

/// Tests whether `window` (which must start with [`MARKER`]) holds a
/// control frame for `id`.
pub(crate) fn probe(window: &[u8], id: &SessionId) -> Probe {
    debug_assert_eq!(window.first(), Some(&MARKER));
    let id = id.as_bytes();
    for (pos, &b) in window.iter().enumerate().take(FRAME_LEN).skip(1) {
        let fits = match pos {
            1..=CODE_LEN => b.is_ascii_digit(),
            p if p < FRAME_LEN - 1 => b == id[p - 1 - CODE_LEN],
            _ => b == MARKER,
        };
        if !fits {
            return Probe::Mismatch;
        }
    }
    if window.len() < FRAME_LEN {
        return Probe::Partial;
    }
    let code = window[1..=CODE_LEN]
        .iter()
        .fold(0u16, |acc, d| acc * 10 + u16::from(d - b'0'));
    Probe::Complete(code)
}

/// Encodes the control frame a remote loop emits after a command that
/// exited with `code`.
///
/// Codes above 999 do not fit the grammar and are clamped.
pub fn encode_frame(code: u16, id: &SessionId) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_LEN);
    frame.push(MARKER);
    frame.extend_from_slice(format!("{:03}", code.min(999)).as_bytes());
    frame.extend_from_slice(id.as_bytes());
    frame.push(MARKER);
    frame
}

/// Builds the shell program that runs on the far end of a session.
///
/// The loop reads one NUL-terminated command at a time, evaluates it and
/// prints a control frame carrying `$?`. Its stderr is merged into stdout
/// so that both arrive in order on one stream. An `EXIT` trap emits a final
/// frame when a command ends the shell itself (e.g. `exit 3`).
///
/// Builtins are written with a leading `\` so user aliases cannot shadow
/// them. `read -d ''` needs bash, zsh or ksh on the remote side.
pub fn remote_loop(id: &SessionId) -> String {
    format!(
        concat!(
            r#"trap 'printf "\377%03d{id}\377" "$?"' EXIT && "#,
            r#"while \read -r -d '' CMD; do"#,
            r#" \eval "$CMD";"#,
            r#" \printf '\377%03d{id}\377' "$?";"#,
            " done 2>&1",
        ),
        id = id
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn id() -> SessionId {
        SessionId::from_bytes(*b"0123456789ABCDEFGHIJ@_").unwrap()
    }

    #[test]
    fn probe_complete_frame() {
        let frame = encode_frame(42, &id());
        assert_eq!(frame.len(), FRAME_LEN);
        assert_eq!(probe(&frame, &id()), Probe::Complete(42));
    }

    #[test]
    fn probe_every_prefix_is_partial() {
        let frame = encode_frame(7, &id());
        for n in 1..FRAME_LEN {
            assert_eq!(probe(&frame[..n], &id()), Probe::Partial, "prefix {n}");
        }
    }

    #[test]
    fn probe_rejects_other_sessions() {
        let other = SessionId::from_bytes(*b"0123456789ABCDEFGHIJ@X").unwrap();
        assert_eq!(probe(&encode_frame(0, &other), &id()), Probe::Mismatch);
    }

    #[test]
    fn probe_rejects_non_digit_code() {
        let mut frame = encode_frame(100, &id());
        frame[2] = b'x';
        assert_eq!(probe(&frame, &id()), Probe::Mismatch);
    }

    #[test]
    fn probe_rejects_missing_closing_marker() {
        let mut frame = encode_frame(1, &id());
        frame[FRAME_LEN - 1] = b'!';
        assert_eq!(probe(&frame, &id()), Probe::Mismatch);
    }

    #[test]
    fn encode_frame_pads_code() {
        let frame = encode_frame(5, &id());
        assert_eq!(&frame[1..4], b"005");
    }

    #[test]
    fn remote_loop_embeds_id_twice() {
        let script = remote_loop(&id());
        assert_eq!(script.matches(id().as_str()).count(), 2);
        assert!(script.ends_with("done 2>&1"));
        assert!(script.contains(r"\377%03d"));
    }
}
