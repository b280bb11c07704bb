//! Decoder for `rsync --progress` output.
//!
//! rsync prints a line per file and redraws a progress line with `\r` while
//! the file transfers. The last redraw of a file is followed by a summary,
//! either on the same line or after a line break:
//!
//! ```text
//! file.txt
//!      32768  32%   1.00MB/s    0:00:01\r
//!     100000 100%   3.05MB/s    0:00:03 (xfr#1, to-chk=0/1)\n
//! ```
//!
//! Decoding is independent of how the stream is cut into reads.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::LazyLock;
use std::time::Duration;

use regex::bytes::{Captures, Regex};

/// One decoded piece of rsync output.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProgressEvent {
    /// A line naming the file about to be transferred.
    File {
        /// File name with rsync's `\#ooo` escapes decoded.
        name: String,
        /// Bytes of the line as received.
        raw: Vec<u8>,
    },
    /// A progress redraw.
    Update(Update),
    /// A line that is neither, e.g. an unterminated tail at end of stream.
    Unknown {
        /// The line, decoded like a file name.
        text: String,
        /// Bytes of the line as received.
        raw: Vec<u8>,
    },
}

impl ProgressEvent {
    /// Bytes the event was decoded from.
    pub fn raw(&self) -> &[u8] {
        match self {
            Self::File { raw, .. } | Self::Unknown { raw, .. } => raw,
            Self::Update(u) => &u.raw,
        }
    }
}

/// Progress of the current file.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct Update {
    /// Name from the most recent [`ProgressEvent::File`], if any.
    pub name: Option<String>,
    /// Bytes of the current file sent so far.
    pub bytes_sent: u64,
    /// Percent of the current file done. May be NaN or infinite for empty
    /// files on some rsync versions.
    pub percent_complete: f64,
    /// Transfer rate in bytes per second.
    pub rate: Option<f64>,
    /// Elapsed time, or estimated time remaining mid-file.
    pub time: Duration,
    /// Ordinal of this file among those transferred (summary only).
    pub transfer_number: Option<u64>,
    /// Files left to check (summary only).
    pub n_checked: Option<u64>,
    /// Total files to check (summary only).
    pub n_total: Option<u64>,
    /// Bytes of the line as received.
    pub raw: Vec<u8>,
}

/// One line of output: a progress redraw or a generic line.
#[allow(clippy::expect_used)]
static LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x-u)
        \A (?:
            [\ \t]* (\d[\d,]*)
            [\ \t]+ (\d+\.?\d*|\.\d+|-?(?i:nan|inf)) %
            (?: [\ \t]+ (\d+\.?\d*|\.\d+) [\ \t]? ([kKMGTPEZY]?) B?[/p]s )?
            [\ \t]+ (\d+) : (\d+) (?: : (\d+) )?
            [\ \t]* (?:
                (?: \r?\n [\ \t]* )?
                \( [\ \t]* xfe?r [\ \t]* \#? [\ \t]* (\d+) ,?
                [\ \t]+ to[\ -]ch(?:ec)?k [\ \t]* =? [\ \t]* (\d+) /? (\d*) [\ \t]* \)
                [\ \t]* \r?\n
              | \r
            )
          | ([^\r\n]*) ([\r\n])
        )",
    )
    .expect("progress line pattern")
});

/// A progress redraw without its summary, trailing whitespace trimmed.
#[allow(clippy::expect_used)]
static BODY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x-u)
        \A [\ \t]* \d[\d,]*
        [\ \t]+ (?:\d+\.?\d*|\.\d+|-?(?i:nan|inf)) %
        (?: [\ \t]+ (?:\d+\.?\d*|\.\d+) [\ \t]? [kKMGTPEZY]? B?[/p]s )?
        [\ \t]+ \d+ : \d+ (?: : \d+ )?
        \z",
    )
    .expect("progress body pattern")
});

/// Incremental decoder: feed bytes in, take events out.
#[derive(Debug, Default)]
pub struct ProgressDecoder {
    /// Bytes not yet decoded.
    buf: Vec<u8>,
    /// Name from the last file line.
    name: Option<String>,
}

impl ProgressDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `data` and returns every event it completes.
    pub fn feed(&mut self, data: &[u8]) -> Vec<ProgressEvent> {
        self.buf.extend_from_slice(data);
        self.drain(false)
    }

    /// Flushes everything at end of stream. Leftover bytes that form no
    /// complete line become one [`ProgressEvent::Unknown`].
    pub fn finish(&mut self) -> Vec<ProgressEvent> {
        let mut events = self.drain(true);
        if !self.buf.is_empty() {
            let raw = std::mem::take(&mut self.buf);
            events.push(ProgressEvent::Unknown {
                text: unescape(&raw),
                raw,
            });
        }
        events
    }

    /// Decodes complete lines from the front of the buffer.
    fn drain(&mut self, at_eof: bool) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        let mut cursor = 0;
        while let Some(caps) = LINE.captures(&self.buf[cursor..]) {
            let Some(whole) = caps.get(0) else { break };
            let end = cursor + whole.end();
            if !at_eof && may_grow(whole.as_bytes(), &self.buf[end..]) {
                break;
            }
            if let Some(event) = line_event(&caps, &mut self.name) {
                events.push(event);
            }
            cursor = end;
        }
        self.buf.drain(..cursor);
        events
    }
}

/// Builds the event for one matched line, tracking the current file
/// name. Blank lines yield nothing.
fn line_event(caps: &Captures<'_>, last_name: &mut Option<String>) -> Option<ProgressEvent> {
    let raw = caps.get(0).map(|m| m.as_bytes().to_vec()).unwrap_or_default();
    if let Some(line) = caps.get(11) {
        let newline = caps.get(12).is_some_and(|t| t.as_bytes() == b"\n");
        if line.as_bytes().is_empty() {
            return None;
        }
        let text = unescape(line.as_bytes());
        return Some(if newline {
            *last_name = Some(text.clone());
            ProgressEvent::File { name: text, raw }
        } else {
            ProgressEvent::Unknown { text, raw }
        });
    }

    let group = |i: usize| caps.get(i).map(|m| m.as_bytes());
    let int = |i: usize| group(i).filter(|g| !g.is_empty()).map(parse_int);

    let (h, m, s) = match group(7) {
        Some(s) => (int(5), int(6), parse_int(s)),
        None => (Some(0), int(5), int(6).unwrap_or(0)),
    };
    let secs = h
        .unwrap_or(0)
        .saturating_mul(3600)
        .saturating_add(m.unwrap_or(0).saturating_mul(60))
        .saturating_add(s);

    Some(ProgressEvent::Update(Update {
        name: last_name.clone(),
        bytes_sent: int(1).unwrap_or(0),
        percent_complete: group(2).map_or(f64::NAN, parse_float),
        rate: group(3).map(|r| parse_float(r) * unit_scale(group(4).unwrap_or_default())),
        time: Duration::from_secs(secs),
        transfer_number: int(8),
        n_checked: int(9),
        n_total: int(10),
        raw,
    }))
}

/// Returns `true` if more input could still change how `matched` decodes.
///
/// A progress redraw may be followed by its summary, split from it by a
/// line break: hold it while `rest` could still be the start of one. A
/// trailing `\r` may also be the first half of `\r\n`.
fn may_grow(matched: &[u8], rest: &[u8]) -> bool {
    if rest.is_empty() && matched.ends_with(b"\r") {
        return true;
    }
    if !BODY.is_match(matched.trim_ascii_end()) {
        return false;
    }
    let rest = rest.strip_prefix(b"\n").unwrap_or(rest);
    let rest = rest
        .iter()
        .position(|&b| b != b' ' && b != b'\t')
        .map_or(&[][..], |i| &rest[i..]);
    match rest.first() {
        None => true,
        Some(b'(') => !rest.contains(&b'\n'),
        Some(_) => false,
    }
}

/// Parses digits, skipping `,` group separators. Saturates on overflow.
fn parse_int(digits: &[u8]) -> u64 {
    digits
        .iter()
        .filter(|b| b.is_ascii_digit())
        .fold(0u64, |n, b| n.saturating_mul(10).saturating_add(u64::from(b - b'0')))
}

/// Parses a decimal number, `nan` or `inf`.
fn parse_float(text: &[u8]) -> f64 {
    let text = String::from_utf8_lossy(text).to_ascii_lowercase();
    if text.contains("nan") {
        f64::NAN
    } else if text.contains("inf") {
        if text.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        }
    } else {
        text.parse().unwrap_or(f64::NAN)
    }
}

/// Multiplier for a rate unit prefix; `k`, `K` and the rest are powers of
/// 1024.
fn unit_scale(unit: &[u8]) -> f64 {
    let power = match unit.first().map(u8::to_ascii_uppercase) {
        None => 0,
        Some(b'K') => 1,
        Some(b'M') => 2,
        Some(b'G') => 3,
        Some(b'T') => 4,
        Some(b'P') => 5,
        Some(b'E') => 6,
        Some(b'Z') => 7,
        Some(_) => 8,
    };
    1024f64.powi(power)
}

/// Decodes rsync's `\#ooo` octal escapes, then UTF-8 with replacement.
fn unescape(raw: &[u8]) -> String {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if let Some(b) = escape_at(&raw[i..]) {
            out.push(b);
            i += 5;
        } else {
            out.push(raw[i]);
            i += 1;
        }
    }
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// The byte encoded by a `\#ooo` escape at the start of `s`, if any.
fn escape_at(s: &[u8]) -> Option<u8> {
    let [b'\\', b'#', d @ ..] = s else { return None };
    let digits = d.get(..3)?;
    if !digits.iter().all(|c| (b'0'..=b'7').contains(c)) {
        return None;
    }
    let value = digits
        .iter()
        .fold(0u16, |n, c| n * 8 + u16::from(c - b'0'));
    u8::try_from(value).ok()
}

/// Iterator over the events in a stream; ends at end of stream or after
/// the first read error.
#[derive(Debug)]
pub struct ProgressEvents<R> {
    /// Source of rsync output.
    reader: R,
    /// Decoder state.
    decoder: ProgressDecoder,
    /// Decoded events not yet yielded.
    queue: VecDeque<ProgressEvent>,
    /// Set at end of stream or error.
    done: bool,
}

/// Decodes `reader` lazily, blocking only when no event is ready.
pub fn events<R: Read>(reader: R) -> ProgressEvents<R> {
    ProgressEvents {
        reader,
        decoder: ProgressDecoder::new(),
        queue: VecDeque::new(),
        done: false,
    }
}

impl<R: Read> Iterator for ProgressEvents<R> {
    type Item = io::Result<ProgressEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Some(Ok(event));
            }
            if self.done {
                return None;
            }
            match self.reader.read(&mut buf) {
                Ok(0) => {
                    self.done = true;
                    self.queue.extend(self.decoder.finish());
                }
                Ok(n) => self.queue.extend(self.decoder.feed(&buf[..n])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// A transcript in the rsync 2.x style: summary after `\r\n`.
    const CLASSIC: &[u8] = b"file.txt\n\
        \x20    32768  32%    1.00MB/s    0:00:01\r\
        \x20    65536  65%    2.00MB/s    0:00:00\r\
        \x20    98304  98%    3.00MB/s    0:00:00\r\
        \x20   100000 100%    3.05MB/s    0:00:03\r\n(xfer#1, to-check=0/1)\n";

    /// The rsync 3.x style: summary on the same line, grouped digits.
    const MODERN: &[u8] = b"big.bin\n\
        \x20     1,048,576  50%  100.00MB/s    0:00:00\r\
        \x20     2,097,152 100%   95.24MB/s    0:00:00 (xfr#1, to-chk=2/4)\n\
        sub/\xe2\x82\xac\\#040x\n";

    fn decode_all(stream: &[u8], step: usize) -> Vec<ProgressEvent> {
        let mut d = ProgressDecoder::new();
        let mut out = Vec::new();
        for chunk in stream.chunks(step.max(1)) {
            out.extend(d.feed(chunk));
        }
        out.extend(d.finish());
        out
    }

    fn updates(events: &[ProgressEvent]) -> Vec<&Update> {
        events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Update(u) => Some(u),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn classic_transcript() {
        let events = decode_all(CLASSIC, CLASSIC.len());
        assert_eq!(events.len(), 5);
        assert!(matches!(&events[0], ProgressEvent::File { name, .. } if name == "file.txt"));

        let ups = updates(&events);
        assert_eq!(ups.len(), 4);
        assert!(ups.windows(2).all(|w| w[0].bytes_sent <= w[1].bytes_sent));
        assert!(ups[..3].iter().all(|u| u.transfer_number.is_none()));

        let last = ups[3];
        assert_eq!(last.name.as_deref(), Some("file.txt"));
        assert_eq!(last.bytes_sent, 100_000);
        assert!((last.percent_complete - 100.0).abs() < f64::EPSILON);
        assert_eq!(last.time, Duration::from_secs(3));
        assert_eq!(last.transfer_number, Some(1));
        assert_eq!((last.n_checked, last.n_total), (Some(0), Some(1)));
        let rate = last.rate.unwrap();
        assert!((rate - 3.05 * 1024.0 * 1024.0).abs() < 1.0);
    }

    #[test]
    fn modern_transcript() {
        let events = decode_all(MODERN, MODERN.len());
        let ups = updates(&events);
        assert_eq!(ups.len(), 2);
        assert_eq!(ups[0].bytes_sent, 1_048_576);
        assert_eq!(ups[1].bytes_sent, 2_097_152);
        assert_eq!(ups[1].transfer_number, Some(1));
        assert_eq!((ups[1].n_checked, ups[1].n_total), (Some(2), Some(4)));
        assert!(
            matches!(events.last(), Some(ProgressEvent::File { name, .. }) if name == "sub/€ x")
        );
    }

    #[test]
    fn split_invariance() {
        for stream in [CLASSIC, MODERN] {
            let whole = decode_all(stream, stream.len());
            for step in 1..16 {
                assert_eq!(decode_all(stream, step), whole, "step {step}");
            }
        }
    }

    #[test]
    fn raw_bytes_cover_the_stream() {
        for stream in [CLASSIC, MODERN] {
            let events = decode_all(stream, 3);
            let raw: Vec<u8> = events.iter().flat_map(|e| e.raw().to_vec()).collect();
            assert_eq!(raw, stream);
        }
    }

    #[test]
    fn leftover_becomes_unknown() {
        let events = decode_all(b"a.txt\npartial", 4);
        assert_eq!(events.len(), 2);
        assert!(
            matches!(&events[1], ProgressEvent::Unknown { text, raw } if text == "partial" && raw == b"partial")
        );
    }

    #[test]
    fn lone_redraw_is_held_until_eof() {
        let mut d = ProgressDecoder::new();
        assert!(d.feed(b"  10  1%  1.00kB/s  0:00:09\r").is_empty());
        let events = d.finish();
        assert_eq!(updates(&events).len(), 1);
        assert_eq!(updates(&events)[0].rate, Some(1024.0));
    }

    #[test]
    fn nan_percent_and_no_rate() {
        let events = decode_all(b"   0 -nan%    0:00:00 (xfr#1, to-chk=0/1)\n", 100);
        let u = updates(&events)[0];
        assert!(u.percent_complete.is_nan());
        assert_eq!(u.rate, None);
        assert_eq!(u.name, None);
    }

    #[test]
    fn carriage_return_lines_are_unknown() {
        let events = decode_all(b"building file list ... \rdone\n", 1);
        assert!(matches!(&events[0], ProgressEvent::Unknown { text, .. } if text == "building file list ... "));
        assert!(matches!(&events[1], ProgressEvent::File { name, .. } if name == "done"));
    }

    #[test]
    fn escapes() {
        assert_eq!(unescape(b"a\\#012b"), "a\nb");
        assert_eq!(unescape(b"\\#303\\#251"), "é");
        assert_eq!(unescape(b"\\#8xx \\#777 \\#0"), "\\#8xx \\#777 \\#0");
    }

    #[test]
    fn iterator_over_reader() {
        let all: Vec<_> = events(CLASSIC).collect::<io::Result<_>>().unwrap();
        assert_eq!(all, decode_all(CLASSIC, 1));
    }
}
