use std::{fmt, io};

use shared_memory::ShmemError;

use crate::queue::Role;

pub type Result<T> = std::result::Result<T, ShmQueueError>;

#[derive(Debug)]
pub enum ShmQueueError {
    /// The segment carries a foreign magic tag or an unsupported version.
    IncompatibleFormat { magic: [u8; 2], version: i32 },
    /// The mapping is too short to hold the header and the ring it declares.
    TruncatedSegment { len: usize, required: usize },
    /// An existing segment was created with a different capacity.
    CapacityMismatch { requested: u32, existing: u32 },
    InvalidCapacity(u32),
    /// The backing store could not be created or mapped.
    ResourceUnavailable(ShmemError),
    Io(io::Error),
    QueueFull { frame_size: usize, available: usize },
    /// The frame can never fit, even into an empty queue.
    FrameTooLarge { frame_size: usize, capacity: usize },
    /// The pending message is longer than the caller's buffer. It stays queued.
    BufferTooSmall { required: usize, provided: usize },
    /// The length prefix at the read cursor claims more bytes than are queued.
    CorruptFrame { declared: usize, occupied: usize },
    RoleViolation { role: Role, operation: &'static str },
    HandleClosed,
    PoisonedLock,
}

impl ShmQueueError {
    pub fn is_queue_full(&self) -> bool {
        matches!(self, ShmQueueError::QueueFull { .. })
    }

    /// Errors that may clear up on their own when the caller tries again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ShmQueueError::QueueFull { .. } | ShmQueueError::ResourceUnavailable(_)
        )
    }
}

impl fmt::Display for ShmQueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShmQueueError::IncompatibleFormat { magic, version } => write!(
                f,
                "Incompatible segment format: magic {:02x}{:02x}, version {}",
                magic[0], magic[1], version
            ),
            ShmQueueError::TruncatedSegment { len, required } => write!(
                f,
                "Segment mapping is {} bytes, {} required",
                len, required
            ),
            ShmQueueError::CapacityMismatch { requested, existing } => write!(
                f,
                "Capacity mismatch: requested {}, existing segment has {}",
                requested, existing
            ),
            ShmQueueError::InvalidCapacity(c) => write!(f, "Invalid queue capacity: {}", c),
            ShmQueueError::ResourceUnavailable(e) => write!(f, "Shared memory unavailable: {}", e),
            ShmQueueError::Io(e) => write!(f, "IO error: {}", e),
            ShmQueueError::QueueFull { frame_size, available } => write!(
                f,
                "Queue is full: frame of {} bytes, {} available",
                frame_size, available
            ),
            ShmQueueError::FrameTooLarge { frame_size, capacity } => write!(
                f,
                "Frame of {} bytes exceeds queue capacity {}",
                frame_size, capacity
            ),
            ShmQueueError::BufferTooSmall { required, provided } => write!(
                f,
                "Buffer too small: message is {} bytes, buffer holds {}",
                required, provided
            ),
            ShmQueueError::CorruptFrame { declared, occupied } => write!(
                f,
                "Corrupt frame: prefix declares {} bytes, {} bytes queued",
                declared, occupied
            ),
            ShmQueueError::RoleViolation { role, operation } => {
                write!(f, "A {} handle cannot {}", role, operation)
            }
            ShmQueueError::HandleClosed => write!(f, "Queue handle was destroyed"),
            ShmQueueError::PoisonedLock => write!(f, "Mutex was poisoned"),
        }
    }
}

impl std::error::Error for ShmQueueError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ShmQueueError::ResourceUnavailable(e) => Some(e),
            ShmQueueError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShmemError> for ShmQueueError {
    fn from(err: ShmemError) -> Self {
        ShmQueueError::ResourceUnavailable(err)
    }
}

impl From<io::Error> for ShmQueueError {
    fn from(err: io::Error) -> Self {
        ShmQueueError::Io(err)
    }
}

impl<T> From<std::sync::PoisonError<T>> for ShmQueueError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        ShmQueueError::PoisonedLock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(ShmQueueError::QueueFull { frame_size: 10, available: 3 }.is_retryable());
        assert!(ShmQueueError::QueueFull { frame_size: 10, available: 3 }.is_queue_full());
        assert!(!ShmQueueError::HandleClosed.is_retryable());
        assert!(!ShmQueueError::BufferTooSmall { required: 9, provided: 4 }.is_retryable());
    }

    #[test]
    fn display_names_the_role() {
        let err = ShmQueueError::RoleViolation { role: Role::Producer, operation: "get" };
        assert_eq!(err.to_string(), "A producer handle cannot get");
    }
}
