//! Output reassembly must not depend on how the stream is cut into reads.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::print_stderr)]

use proptest::prelude::*;
use tether_proto::{Demux, FRAME_LEN, MARKER, SessionId, encode_frame};

fn id() -> SessionId {
    SessionId::from_bytes(*b"Zq9@_rT0pLmN3xYvB7kWs2").unwrap()
}

/// Output fragments: text (including multi-byte characters), lone markers,
/// stray high bytes, and marker-led prefixes that look like the start of a
/// frame.
///
/// Markers only open a fragment and frame prefixes are always cut short,
/// so adjacent fragments can never join up into a complete frame.
fn fragment() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        4 => "[a-z \n]{0,12}".prop_map(String::into_bytes),
        2 => prop::sample::select(vec!["é", "€", "😀", "中文"]).prop_map(|s| s.as_bytes().to_vec()),
        1 => Just(vec![MARKER]),
        1 => (0usize..FRAME_LEN - 1).prop_map(|n| encode_frame(42, &id())[..n].to_vec()),
        1 => prop::collection::vec(0x80u8..MARKER, 0..8),
    ]
}

/// The program output plus cut points into `output ++ frame`.
fn transcript() -> impl Strategy<Value = (Vec<u8>, u16, Vec<usize>)> {
    (prop::collection::vec(fragment(), 0..12), 0u16..256)
        .prop_flat_map(|(frags, code)| {
            let output: Vec<u8> = frags.concat();
            let total = output.len() + FRAME_LEN;
            let cuts = prop::collection::vec(0..=total, 0..10);
            (Just(output), Just(code), cuts)
        })
}

/// Feeds `stream` split at `cuts` and collects (output, code).
fn reassemble(stream: &[u8], cuts: &[usize]) -> (Vec<u8>, Option<u16>) {
    let mut cuts = cuts.to_vec();
    cuts.push(0);
    cuts.push(stream.len());
    cuts.sort_unstable();
    cuts.dedup();

    let mut demux = Demux::new(id());
    let mut out = Vec::new();
    for w in cuts.windows(2) {
        if let Some(code) = demux.feed(&stream[w[0]..w[1]], |d| out.extend_from_slice(d)) {
            return (out, Some(code));
        }
    }
    (out, None)
}

proptest! {
    #[test]
    fn split_invariance((output, code, cuts) in transcript()) {
        let mut stream = output.clone();
        stream.extend(encode_frame(code, &id()));
        let (got, got_code) = reassemble(&stream, &cuts);
        prop_assert_eq!(got_code, Some(code));
        prop_assert_eq!(got, output);
    }

    #[test]
    fn byte_at_a_time((output, code, _cuts) in transcript()) {
        let mut stream = output.clone();
        stream.extend(encode_frame(code, &id()));
        let cuts: Vec<usize> = (0..stream.len()).collect();
        let (got, got_code) = reassemble(&stream, &cuts);
        prop_assert_eq!(got_code, Some(code));
        prop_assert_eq!(got, output);
    }

    #[test]
    fn text_chunks_never_split_characters(
        text in "[a-zé€😀 ]{0,40}",
        cuts in prop::collection::vec(0usize..200, 0..10),
    ) {
        let mut stream = text.clone().into_bytes();
        stream.extend(encode_frame(0, &id()));
        let cuts: Vec<usize> = cuts.into_iter().filter(|&c| c <= stream.len()).collect();
        let mut cuts = cuts;
        cuts.push(0);
        cuts.push(stream.len());
        cuts.sort_unstable();
        cuts.dedup();

        let mut demux = Demux::new(id());
        let mut chunks = Vec::new();
        for w in cuts.windows(2) {
            if demux.feed(&stream[w[0]..w[1]], |d| chunks.push(d.to_vec())).is_some() {
                break;
            }
        }
        for chunk in &chunks {
            prop_assert!(std::str::from_utf8(chunk).is_ok());
        }
        prop_assert_eq!(chunks.concat(), text.into_bytes());
    }
}

#[test]
fn missing_frame_keeps_everything_recoverable() {
    let mut demux = Demux::new(id());
    let mut out = Vec::new();
    let mut stream = b"partial output ".to_vec();
    stream.extend_from_slice(&encode_frame(1, &id())[..10]);
    assert_eq!(demux.feed(&stream, |d| out.extend_from_slice(d)), None);
    out.extend(demux.take_pending());
    assert_eq!(out, stream);
}
