use std::sync::atomic::Ordering;

use crate::core::layout::FRAME_PREFIX;
use crate::core::Segment;
use crate::errors::{Result, ShmQueueError};

/// The frame at the read cursor, prefix already decoded.
struct PendingFrame {
    read: u32,
    payload_pos: usize,
    length: usize,
}

fn next_frame(segment: &Segment) -> Result<Option<PendingFrame>> {
    let read = segment.read_cursor().load(Ordering::Relaxed);
    // Acquire pairs with the producer's release: every byte below `write` is
    // in place.
    let write = segment.write_cursor().load(Ordering::Acquire);
    let occupied = segment.distance(read, write);
    if occupied == 0 {
        return Ok(None);
    }

    let ring = segment.ring();
    let mut prefix = [0u8; FRAME_PREFIX];
    let payload_pos = ring.read(ring.position(read), &mut prefix);
    let length = u32::from_ne_bytes(prefix) as usize;
    if length == 0 || FRAME_PREFIX + length > occupied {
        return Err(ShmQueueError::CorruptFrame { declared: length, occupied });
    }
    Ok(Some(PendingFrame { read, payload_pos, length }))
}

fn consume(segment: &Segment, frame: &PendingFrame, dst: &mut [u8]) {
    debug_assert_eq!(dst.len(), frame.length);
    segment.ring().read(frame.payload_pos, dst);
    // The payload is copied out before the producer may reuse its bytes.
    segment.read_cursor().store(
        segment.advance(frame.read, FRAME_PREFIX + frame.length),
        Ordering::Release,
    );
}

/// Length of the message at the head of the queue, if any.
pub(crate) fn peek_len(segment: &Segment) -> Result<Option<usize>> {
    Ok(next_frame(segment)?.map(|frame| frame.length))
}

/// Takes one message into `buf`. `Ok(0)` means the queue is empty.
pub(crate) fn get_into(segment: &Segment, buf: &mut [u8]) -> Result<usize> {
    let frame = match next_frame(segment)? {
        Some(frame) => frame,
        None => return Ok(0),
    };
    if frame.length > buf.len() {
        return Err(ShmQueueError::BufferTooSmall {
            required: frame.length,
            provided: buf.len(),
        });
    }
    consume(segment, &frame, &mut buf[..frame.length]);
    Ok(frame.length)
}

/// Takes one message of at most `max_len` bytes. An empty vector means the
/// queue is empty.
pub(crate) fn get(segment: &Segment, max_len: usize) -> Result<Vec<u8>> {
    let frame = match next_frame(segment)? {
        Some(frame) => frame,
        None => return Ok(Vec::new()),
    };
    if frame.length > max_len {
        return Err(ShmQueueError::BufferTooSmall {
            required: frame.length,
            provided: max_len,
        });
    }
    let mut payload = vec![0u8; frame.length];
    consume(segment, &frame, &mut payload);
    Ok(payload)
}
