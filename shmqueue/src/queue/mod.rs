use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_derive::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::layout::MIN_FRAME;
use crate::core::{QueueConfig, Segment};
use crate::errors::{Result, ShmQueueError};
use crate::reader;
use crate::registry::{self, OpenMode};
use crate::writer;

/// What a handle is allowed to do. Fixed when the handle is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Producer,
    Consumer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Producer => write!(f, "producer"),
            Role::Consumer => write!(f, "consumer"),
        }
    }
}

/// Point-in-time occupancy of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub capacity: usize,
    pub size: usize,
    pub left: usize,
    pub write_cursor: u32,
    pub read_cursor: u32,
}

impl fmt::Display for QueueStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "size={} left={} capacity={} (w={}, r={})",
            self.size, self.left, self.capacity, self.write_cursor, self.read_cursor
        )
    }
}

/// A process-local handle on a shared-memory queue.
///
/// A handle is either a producer or a consumer. At most one producer and one
/// consumer may be active on a segment at any time, across all processes.
/// Dropping a handle only unmaps it; the segment itself lives until its
/// creator calls [`ShmQueue::destroy`].
pub struct ShmQueue {
    segment: Option<Arc<Segment>>,
    identifier: PathBuf,
    capacity: u32,
    role: Role,
    owner: bool,
}

impl ShmQueue {
    /// Creates the segment at `identifier`, or attaches to it if it exists.
    pub fn open_or_create<P: AsRef<Path>>(identifier: P, capacity: u32, role: Role) -> Result<ShmQueue> {
        ShmQueue::open_with(identifier.as_ref(), capacity, role, OpenMode::CreateOrAttach)
    }

    /// Attaches to an existing segment; never creates one.
    pub fn attach<P: AsRef<Path>>(identifier: P, capacity: u32, role: Role) -> Result<ShmQueue> {
        ShmQueue::open_with(identifier.as_ref(), capacity, role, OpenMode::Attach)
    }

    pub fn from_config(cfg: &QueueConfig, role: Role) -> Result<ShmQueue> {
        ShmQueue::open_or_create(cfg.identifier(), cfg.capacity, role)
    }

    fn open_with(identifier: &Path, capacity: u32, role: Role, mode: OpenMode) -> Result<ShmQueue> {
        let (segment, owner) = registry::acquire(identifier, capacity, mode)?;
        debug!(identifier = %identifier.display(), %role, owner, "opened queue handle");
        Ok(ShmQueue {
            segment: Some(segment),
            identifier: identifier.to_path_buf(),
            capacity,
            role,
            owner,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn identifier(&self) -> &Path {
        &self.identifier
    }

    /// Whether this handle created the segment and may unlink it.
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    pub fn is_closed(&self) -> bool {
        self.segment.is_none()
    }

    pub(crate) fn segment(&self) -> Result<&Segment> {
        self.segment.as_deref().ok_or(ShmQueueError::HandleClosed)
    }

    fn gate(&self, required: Role, operation: &'static str) -> Result<&Segment> {
        let segment = self.segment()?;
        if self.role != required {
            return Err(ShmQueueError::RoleViolation { role: self.role, operation });
        }
        Ok(segment)
    }

    /// Enqueues one message and returns its payload length.
    ///
    /// Fails with `QueueFull` when the frame does not fit right now; the caller
    /// owns the retry policy. An empty message is a no-op returning `Ok(0)`.
    pub fn put(&mut self, message: &[u8]) -> Result<usize> {
        writer::put(self.gate(Role::Producer, "put")?, message)
    }

    /// Dequeues one message of at most `max_len` bytes.
    ///
    /// An empty vector means there was nothing to read. A longer message fails
    /// with `BufferTooSmall` and stays at the head of the queue.
    pub fn get(&mut self, max_len: usize) -> Result<Vec<u8>> {
        reader::get(self.gate(Role::Consumer, "get")?, max_len)
    }

    /// Dequeues one message into `buf` and returns its length, 0 when empty.
    pub fn get_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        reader::get_into(self.gate(Role::Consumer, "get")?, buf)
    }

    /// Dequeues one message of any length that fits the queue, or `None`.
    pub fn try_get(&mut self) -> Result<Option<Vec<u8>>> {
        let message = reader::get(self.gate(Role::Consumer, "get")?, self.capacity as usize)?;
        Ok(if message.is_empty() { None } else { Some(message) })
    }

    /// Polls `get` every `poll_interval` until a message shows up or `budget`
    /// runs out, in which case the result is empty.
    pub fn get_timeout(
        &mut self,
        max_len: usize,
        budget: Duration,
        poll_interval: Duration,
    ) -> Result<Vec<u8>> {
        let start = Instant::now();
        loop {
            let message = self.get(max_len)?;
            if !message.is_empty() || start.elapsed() >= budget {
                return Ok(message);
            }
            thread::sleep(poll_interval);
        }
    }

    /// Payload length of the next message without consuming it.
    pub fn peek_len(&self) -> Result<Option<usize>> {
        reader::peek_len(self.gate(Role::Consumer, "peek")?)
    }

    /// Bytes currently queued, frame prefixes included.
    pub fn size(&self) -> Result<usize> {
        Ok(self.stats()?.size)
    }

    pub fn left(&self) -> Result<usize> {
        Ok(self.stats()?.left)
    }

    pub fn capacity(&self) -> Result<usize> {
        Ok(self.segment()?.capacity() as usize)
    }

    pub fn empty(&self) -> Result<bool> {
        Ok(self.stats()?.size == 0)
    }

    /// True when not even a one-byte message fits.
    ///
    /// A `false` here does not promise that the next `put` succeeds: a frame
    /// longer than `left()` still fails with `QueueFull`.
    pub fn full(&self) -> Result<bool> {
        Ok(self.stats()?.left < MIN_FRAME)
    }

    pub fn stats(&self) -> Result<QueueStats> {
        let segment = self.segment()?;
        let (write, read) = segment.cursors();
        let capacity = segment.capacity() as usize;
        // The two loads are not atomic together. `cursors` loads the read
        // cursor first, so a racing consumer can only make the size look
        // larger, never wrap below zero; the clamp bounds that.
        let size = segment.distance(read, write).min(capacity);
        Ok(QueueStats {
            capacity,
            size,
            left: capacity - size,
            write_cursor: write,
            read_cursor: read,
        })
    }

    /// Unmaps this handle. The owner also unlinks the segment so the
    /// identifier can be created again; other handles keep their mappings
    /// until they are destroyed or dropped.
    ///
    /// If unlinking fails the handle stays open and `destroy` can be retried.
    pub fn destroy(&mut self) -> Result<()> {
        let segment = self.segment()?;
        if self.owner {
            segment.unlink()?;
            registry::forget(&self.identifier)?;
            info!(identifier = %segment.identifier().display(), "destroyed queue segment");
        } else {
            debug!(identifier = %self.identifier.display(), role = %self.role, "closed queue handle");
        }
        self.segment = None;
        Ok(())
    }
}

impl fmt::Debug for ShmQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShmQueue")
            .field("identifier", &self.identifier)
            .field("capacity", &self.capacity)
            .field("role", &self.role)
            .field("owner", &self.owner)
            .field("closed", &self.is_closed())
            .finish()
    }
}
