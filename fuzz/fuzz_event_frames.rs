//! Fuzz target for the event feed frame decoder.
//!
//! Run with: cargo +nightly fuzz run fuzz_event_frames
//!
//! Splits arbitrary bytes into chunks at fuzzer-chosen points and pushes
//! them through `FrameDecoder`. Every decoded frame must be a JSON object,
//! and nothing may be left buffered after `finish()`.

#![no_main]

use keel_core::events::FrameDecoder;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&split, body)) = data.split_first() else {
        return;
    };
    let chunk_len = usize::from(split).max(1);

    let mut decoder = FrameDecoder::default();
    let mut frames = Vec::new();
    for chunk in body.chunks(chunk_len) {
        frames.extend(decoder.push(chunk));
    }
    frames.extend(decoder.finish());

    for event in frames.into_iter().flatten() {
        assert!(event.as_json().is_object());
    }
    assert!(decoder.finish().is_empty());
});
