//! Property-based tests for the frame decoder.
//!
//! Run with: cargo test -p nadi-io --test proptest_decoder

use nadi_io::driver::Tolerances;
use nadi_io::protocol::{Decoded, FrameDecoder, frame};
use proptest::prelude::*;
use std::sync::Arc;

// =============================================================================
// Strategies for generating byte streams
// =============================================================================

/// One well-formed frame carrying a random mix of sub-payloads.
fn arb_valid_frame() -> impl Strategy<Value = Vec<u8>> {
    let sub_payload = prop_oneof![
        prop::collection::vec(any::<u8>(), 15).prop_map(|d| [vec![0x01, 15], d].concat()),
        prop::collection::vec(any::<u8>(), 3).prop_map(|d| [vec![0x03, 3], d].concat()),
        prop::collection::vec(any::<u8>(), 7).prop_map(|d| [vec![0x04, 7], d].concat()),
        prop::collection::vec(any::<u8>(), 6).prop_map(|d| [vec![0x05, 6], d].concat()),
        prop::collection::vec(any::<u8>(), 2).prop_map(|d| [vec![0x06, 2], d].concat()),
        (any::<u8>(), 0usize..=4, prop::collection::vec(any::<u8>(), 24)).prop_map(
            |(frame_id, n, d)| {
                let mut sub = vec![0x0D, (2 + n * 6) as u8, frame_id, (n * 3) as u8];
                sub.extend_from_slice(&d[..n * 6]);
                sub
            }
        ),
    ];
    prop::collection::vec(sub_payload, 1..4).prop_map(|subs| frame(&subs.concat()))
}

/// A valid frame with one payload byte flipped, so the checksum fails.
fn arb_corrupt_frame() -> impl Strategy<Value = Vec<u8>> {
    (arb_valid_frame(), any::<prop::sample::Index>(), 1u8..=255).prop_map(|(mut f, idx, mask)| {
        let payload_len = f.len() - 4;
        let pos = 3 + idx.index(payload_len);
        f[pos] ^= mask;
        f
    })
}

fn arb_segment() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        6 => arb_valid_frame(),
        2 => arb_corrupt_frame(),
        2 => prop::collection::vec(any::<u8>(), 0..20),
    ]
}

fn arb_stream() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(arb_segment(), 0..30).prop_map(|segments| segments.concat())
}

fn decode_whole(bytes: &[u8]) -> Vec<Decoded> {
    let mut decoder = FrameDecoder::new(Arc::new(Tolerances::new()));
    decoder.feed(bytes).collect()
}

fn decode_chunked(bytes: &[u8], chunk_sizes: &[usize]) -> Vec<Decoded> {
    let mut decoder = FrameDecoder::new(Arc::new(Tolerances::new()));
    let mut out = Vec::new();
    let mut rest = bytes;
    let mut sizes = chunk_sizes.iter().cycle();
    while !rest.is_empty() {
        let n = sizes.next().copied().unwrap_or(1).clamp(1, rest.len());
        out.extend(decoder.feed(&rest[..n]));
        rest = &rest[n..];
    }
    out
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Output does not depend on how the stream is split.
    #[test]
    fn chunking_does_not_change_output(
        stream in arb_stream(),
        chunk_sizes in prop::collection::vec(1usize..300, 1..16),
    ) {
        prop_assert_eq!(decode_whole(&stream), decode_chunked(&stream, &chunk_sizes));
    }

    /// Byte-at-a-time feeding is the worst case for partial frames.
    #[test]
    fn single_byte_feeding_matches(stream in arb_stream()) {
        prop_assert_eq!(decode_whole(&stream), decode_chunked(&stream, &[1]));
    }

    /// Valid frames only: every frame decodes and nothing is reported.
    #[test]
    fn clean_stream_has_no_errors(frames in prop::collection::vec(arb_valid_frame(), 1..20)) {
        let decoded = decode_whole(&frames.concat());
        prop_assert!(decoded.iter().all(|d| d.is_ok()));
        prop_assert!(!decoded.is_empty());
    }

    /// Garbage free of header bytes in front of a frame is dropped silently.
    #[test]
    fn leading_garbage_is_silent(
        garbage in prop::collection::vec(any::<u8>().prop_filter("no header byte", |b| *b != 0xAA), 0..64),
        valid in arb_valid_frame(),
    ) {
        let expected = decode_whole(&valid);
        let decoded = decode_whole(&[garbage, valid].concat());
        prop_assert_eq!(decoded, expected);
    }
}
