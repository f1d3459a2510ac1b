//! Binary layout of a queue segment.
//!
//! Every offset is absolute from the start of the mapping and declared here
//! once. Participants never overlay a Rust struct on the mapping; they read and
//! write the header through these constants, so two builds interoperate as long
//! as `VERSION` matches.
//!
//! ```text
//! offset   0 : magic         [u8; 2]
//! offset   2 : version       i32, native endian, unaligned
//! offset   6 : capacity      u32, native endian, unaligned
//! offset  64 : write_cursor  AtomicU32 (own cache line)
//! offset 128 : read_cursor   AtomicU32 (own cache line)
//! offset 192 : ring store    `capacity` bytes
//! ```

use std::ptr;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};

pub const MAGIC: [u8; 2] = [0x12, 0x34];
pub const VERSION: i32 = 1;
pub const CACHE_LINE: usize = 64;

pub const MAGIC_OFFSET: usize = 0;
pub const VERSION_OFFSET: usize = 2;
pub const CAPACITY_OFFSET: usize = 6;
pub const WRITE_CURSOR_OFFSET: usize = CACHE_LINE;
pub const READ_CURSOR_OFFSET: usize = 2 * CACHE_LINE;
pub const HEADER_SIZE: usize = 3 * CACHE_LINE;

/// Width of the length field in front of every payload.
pub const FRAME_PREFIX: usize = 4;
/// The smallest frame a producer can publish (one payload byte).
pub const MIN_FRAME: usize = FRAME_PREFIX + 1;

pub const MIN_CAPACITY: u32 = 8;
pub const MAX_CAPACITY: u32 = 1 << 30;

const _: () = assert!(CAPACITY_OFFSET + 4 <= WRITE_CURSOR_OFFSET);
const _: () = assert!(WRITE_CURSOR_OFFSET % CACHE_LINE == 0);
const _: () = assert!(READ_CURSOR_OFFSET % CACHE_LINE == 0);
const _: () = assert!(HEADER_SIZE % CACHE_LINE == 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawHeader {
    pub magic: [u8; 2],
    pub version: i32,
    pub capacity: u32,
}

/// Size of the whole mapping for a ring of `capacity` bytes.
#[inline]
pub const fn segment_size(capacity: u32) -> usize {
    HEADER_SIZE + capacity as usize
}

/// Cursors wrap at the largest multiple of `capacity` that fits in 2^32, which
/// keeps `cursor % capacity` continuous across the wrap.
#[inline]
pub(crate) fn cursor_bound(capacity: u32) -> u64 {
    let capacity = u64::from(capacity);
    (1u64 << 32) / capacity * capacity
}

#[inline]
pub(crate) fn advance(cursor: u32, by: usize, bound: u64) -> u32 {
    ((u64::from(cursor) + by as u64) % bound) as u32
}

/// Bytes between `from` and `to`, walking forward modulo `bound`.
#[inline]
pub(crate) fn distance(from: u32, to: u32, bound: u64) -> usize {
    ((u64::from(to) + bound - u64::from(from)) % bound) as usize
}

#[inline]
pub(crate) fn check_capacity(capacity: u32) -> bool {
    (MIN_CAPACITY..=MAX_CAPACITY).contains(&capacity)
}

/// Initializes a freshly created header. The magic tag is stored last with
/// release ordering: an opener that sees it also sees the rest of the header.
///
/// # Safety
/// `base` must point to a writable mapping of at least `HEADER_SIZE` bytes,
/// aligned to `CACHE_LINE`, that no other party is validating yet.
pub(crate) unsafe fn stamp(base: *mut u8, capacity: u32) {
    ptr::write_unaligned(base.add(VERSION_OFFSET) as *mut i32, VERSION);
    ptr::write_unaligned(base.add(CAPACITY_OFFSET) as *mut u32, capacity);
    cursor_at(base, WRITE_CURSOR_OFFSET).store(0, Ordering::Relaxed);
    cursor_at(base, READ_CURSOR_OFFSET).store(0, Ordering::Relaxed);
    magic_at(base).store(u16::from_ne_bytes(MAGIC), Ordering::Release);
}

/// # Safety
/// `base` must point to a readable mapping of at least `HEADER_SIZE` bytes,
/// aligned to `CACHE_LINE`.
pub(crate) unsafe fn read_header(base: *const u8) -> RawHeader {
    let magic = magic_at(base).load(Ordering::Acquire).to_ne_bytes();
    RawHeader {
        magic,
        version: ptr::read_unaligned(base.add(VERSION_OFFSET) as *const i32),
        capacity: ptr::read_unaligned(base.add(CAPACITY_OFFSET) as *const u32),
    }
}

/// # Safety
/// Same contract as [`read_header`]; `offset` must be one of the cursor offsets.
#[inline]
pub(crate) unsafe fn cursor_at<'a>(base: *const u8, offset: usize) -> &'a AtomicU32 {
    &*(base.add(offset) as *const AtomicU32)
}

#[inline]
unsafe fn magic_at<'a>(base: *const u8) -> &'a AtomicU16 {
    &*(base.add(MAGIC_OFFSET) as *const AtomicU16)
}
