//! Frame extraction properties across buffer strategies
//!
//! Verifies the framing contract through the public API: complete frames
//! only, arrival order preserved, junk discarded, and identical output no
//! matter how the stream is chunked.

use displaypilot_core::framing::{
    BoundedBuffer, DelimiterBuffer, FrameRule, HeaderFrameBuffer, SentinelBuffer, SerialBuffer,
};
use pretty_assertions::assert_eq;

/// Feed `data` one byte at a time and collect everything emitted.
fn feed_bytewise(buffer: &mut dyn SerialBuffer, data: &[u8]) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    for byte in data {
        frames.extend(buffer.enqueue(std::slice::from_ref(byte)));
    }
    frames
}

#[test]
fn test_delimiter_ack_run() {
    // Three ACK bytes framed on 0x06: three frames of just the delimiter.
    let mut buffer = DelimiterBuffer::new(&[0x06], true);
    let frames = buffer.enqueue(&[0x06, 0x06, 0x06]);
    assert_eq!(frames, vec![vec![0x06], vec![0x06], vec![0x06]]);
}

#[test]
fn test_bounded_escaped_close() {
    // The escaped close byte must not split the frame.
    let mut buffer = BoundedBuffer::new(b'(', b')', Some(b'\\'));
    let frames = buffer.enqueue(br"(A\(B)");
    assert_eq!(frames, vec![br"(A\(B)".to_vec()]);
}

#[test]
fn test_junk_never_prefixes_a_frame() {
    let mut sentinel = SentinelBuffer::new(0x02, 0x03);
    let frames = sentinel.enqueue(&[0xDE, 0xAD, 0x02, b'X', 0x03]);
    assert_eq!(frames, vec![vec![0x02, b'X', 0x03]]);

    let mut header = HeaderFrameBuffer::new([(0xAA, FrameRule::FixedLen(3))]);
    let frames = header.enqueue(&[0x00, 0x99, 0xAA, 0x01, 0x02]);
    assert_eq!(frames, vec![vec![0xAA, 0x01, 0x02]]);
}

#[test]
fn test_chunking_is_irrelevant() {
    let wire = b"OK\rWAIT\r  31\r";
    let expected = vec![b"OK".to_vec(), b"WAIT".to_vec(), b"  31".to_vec()];

    let mut whole = DelimiterBuffer::new(&[b'\r'], false);
    assert_eq!(whole.enqueue(wire), expected);

    let mut bytewise = DelimiterBuffer::new(&[b'\r'], false);
    assert_eq!(feed_bytewise(&mut bytewise, wire), expected);
}

#[test]
fn test_header_length_field_chunking() {
    let frame = [0xAA, 0xFF, 0x00, 0x03, b'A', 0x11, 0x01, 0x55];
    let rule = (
        0xAA,
        FrameRule::LenAtOffset {
            offset: 3,
            width: 1,
            base: 5,
        },
    );

    let mut whole = HeaderFrameBuffer::new([rule]);
    assert_eq!(whole.enqueue(&frame), vec![frame.to_vec()]);

    let mut bytewise = HeaderFrameBuffer::new([rule]);
    assert_eq!(feed_bytewise(&mut bytewise, &frame), vec![frame.to_vec()]);
}

#[test]
fn test_clear_discards_buffered_bytes() {
    // After clear, bytes that would have completed the old frame do nothing.
    let mut buffer = DelimiterBuffer::new(&[b'\r'], false);
    assert!(buffer.enqueue(b"PARTIAL").is_empty());
    buffer.clear();
    assert!(buffer.enqueue(b"\r").is_empty());

    let mut bounded = BoundedBuffer::new(b'{', b'}', None);
    assert!(bounded.enqueue(b"{half").is_empty());
    bounded.clear();
    assert!(bounded.enqueue(b"}").is_empty());
    assert_eq!(bounded.enqueue(b"{x}"), vec![b"{x}".to_vec()]);
}

#[test]
fn test_interframe_noise_tolerated() {
    // A stray byte between frames must not corrupt the next parse.
    let mut buffer = SentinelBuffer::new(0x02, 0x03);
    let frames = buffer.enqueue(&[0x02, b'A', 0x03, 0x06, 0x02, b'B', 0x03]);
    assert_eq!(
        frames,
        vec![vec![0x02, b'A', 0x03], vec![0x02, b'B', 0x03]]
    );
}
