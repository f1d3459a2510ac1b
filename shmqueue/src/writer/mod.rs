use std::sync::atomic::Ordering;

use crate::core::layout::FRAME_PREFIX;
use crate::core::Segment;
use crate::errors::{Result, ShmQueueError};

#[inline]
pub(crate) fn frame_size(payload_len: usize) -> usize {
    FRAME_PREFIX + payload_len
}

/// Appends one frame and publishes it. Never blocks; a frame that does not fit
/// right now is reported as `QueueFull` and nothing is written.
///
/// Only one producer may call this per segment at a time.
pub(crate) fn put(segment: &Segment, message: &[u8]) -> Result<usize> {
    if message.is_empty() {
        return Ok(0);
    }
    let capacity = segment.capacity() as usize;
    let frame_size = frame_size(message.len());
    if frame_size > capacity {
        return Err(ShmQueueError::FrameTooLarge { frame_size, capacity });
    }

    let write = segment.write_cursor().load(Ordering::Relaxed);
    // Acquire pairs with the consumer's release: bytes it freed are no longer
    // being read when we overwrite them.
    let read = segment.read_cursor().load(Ordering::Acquire);
    let available = capacity - segment.distance(read, write);
    if available < frame_size {
        return Err(ShmQueueError::QueueFull { frame_size, available });
    }

    let ring = segment.ring();
    let length = message.len() as u32;
    let pos = ring.write(ring.position(write), &length.to_ne_bytes());
    ring.write(pos, message);

    // The frame must be visible before the cursor that covers it.
    segment
        .write_cursor()
        .store(segment.advance(write, frame_size), Ordering::Release);
    Ok(message.len())
}
