//! A single-producer/single-consumer message queue living in a shared memory
//! segment.
//!
//! The segment holds a small fixed header (format tag, version, capacity and
//! the two cursors, each on its own cache line) followed by a circular byte
//! region. Messages are stored as length-prefixed frames. The producer writes
//! a frame and then publishes the write cursor with release ordering; the
//! consumer acquires the write cursor, copies one frame out and publishes the
//! read cursor. There is no lock in the segment.
//!
//! ```no_run
//! use shmqueue::{Role, ShmQueue};
//!
//! # fn main() -> shmqueue::Result<()> {
//! let mut producer = ShmQueue::open_or_create("/tmp/orders.map", 1024, Role::Producer)?;
//! producer.put(b"[:]abc")?;
//!
//! let mut consumer = ShmQueue::open_or_create("/tmp/orders.map", 1024, Role::Consumer)?;
//! assert_eq!(consumer.get(200)?, b"[:]abc");
//! assert!(consumer.empty()?);
//!
//! consumer.destroy()?;
//! producer.destroy()?;
//! # Ok(())
//! # }
//! ```

mod core;
mod errors;
mod queue;
mod reader;
mod registry;
mod writer;

#[cfg(test)]
mod tests;

pub use crate::core::layout;
pub use crate::core::{QueueConfig, QueueConfigBuilder, DEFAULT_CAPACITY, SHMQUEUE_FILE_NAME};
pub use crate::errors::{Result, ShmQueueError};
pub use crate::queue::{QueueStats, Role, ShmQueue};
