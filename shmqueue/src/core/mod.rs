use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use serde_derive::{Deserialize, Serialize};
use shared_memory::{Shmem, ShmemConf, ShmemError};
use tracing::{debug, info, warn};

use crate::errors::{Result, ShmQueueError};

pub mod layout;
pub(crate) mod ring;

use self::layout::{HEADER_SIZE, MAGIC, READ_CURSOR_OFFSET, VERSION, WRITE_CURSOR_OFFSET};
use self::ring::Ring;

pub static SHMQUEUE_FILE_NAME: &str = "shmqueue.map";
pub const DEFAULT_CAPACITY: u32 = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub data_dir: String,
    pub file_name: String,
    pub capacity: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            data_dir: env::temp_dir().to_string_lossy().into_owned(),
            file_name: SHMQUEUE_FILE_NAME.to_string(),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl QueueConfig {
    pub fn builder() -> QueueConfigBuilder {
        QueueConfigBuilder::default()
    }

    /// Path of the link file every participant resolves to the same segment.
    pub fn identifier(&self) -> PathBuf {
        Path::new(&self.data_dir).join(&self.file_name)
    }
}

#[derive(Default)]
pub struct QueueConfigBuilder {
    cfg: QueueConfig,
}

impl QueueConfigBuilder {
    pub fn data_dir(mut self, data_dir: impl Into<String>) -> Self {
        self.cfg.data_dir = data_dir.into();
        self
    }

    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.cfg.file_name = file_name.into();
        self
    }

    pub fn capacity(mut self, capacity: u32) -> Self {
        self.cfg.capacity = capacity;
        self
    }

    pub fn build(self) -> Result<QueueConfig> {
        if !layout::check_capacity(self.cfg.capacity) {
            return Err(ShmQueueError::InvalidCapacity(self.cfg.capacity));
        }
        Ok(self.cfg)
    }
}

/// A process-local mapping of one queue segment.
///
/// The mapping never unlinks the backing store on drop; only
/// [`Segment::unlink`] does, and only the creating handle calls it.
pub(crate) struct Segment {
    shmem: Shmem,
    identifier: PathBuf,
    capacity: u32,
    bound: u64,
    created: bool,
}

// SAFETY: the mapping stays valid for the life of `Segment`. Header fields are
// immutable after creation, cursors are only touched through atomics, and ring
// bytes are written by the producer only outside the published range and read
// by the consumer only inside it.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Creates the segment, or attaches to it when the link already exists.
    pub(crate) fn create_or_open(identifier: &Path, capacity: u32) -> Result<Segment> {
        if !layout::check_capacity(capacity) {
            return Err(ShmQueueError::InvalidCapacity(capacity));
        }
        let created = ShmemConf::new()
            .size(layout::segment_size(capacity))
            .flink(identifier)
            .create();
        match created {
            Ok(mut shmem) => {
                // Unlinking is explicit, see `unlink`.
                shmem.set_owner(false);
                unsafe { layout::stamp(shmem.as_ptr(), capacity) };
                info!(
                    identifier = %identifier.display(),
                    os_id = shmem.get_os_id(),
                    capacity,
                    "created queue segment"
                );
                Ok(Segment::new(shmem, identifier, capacity, true))
            }
            Err(ShmemError::LinkExists) => Segment::open(identifier, capacity),
            Err(e) => Err(e.into()),
        }
    }

    /// Attaches to an existing segment, validating its header.
    pub(crate) fn open(identifier: &Path, capacity: u32) -> Result<Segment> {
        if !layout::check_capacity(capacity) {
            return Err(ShmQueueError::InvalidCapacity(capacity));
        }
        let mut shmem = ShmemConf::new().flink(identifier).open()?;
        shmem.set_owner(false);
        if let Err(e) = validate(&shmem, capacity) {
            warn!(identifier = %identifier.display(), error = %e, "rejected queue segment");
            return Err(e);
        }
        debug!(identifier = %identifier.display(), capacity, "attached to queue segment");
        Ok(Segment::new(shmem, identifier, capacity, false))
    }

    fn new(shmem: Shmem, identifier: &Path, capacity: u32, created: bool) -> Segment {
        Segment {
            shmem,
            identifier: identifier.to_path_buf(),
            capacity,
            bound: layout::cursor_bound(capacity),
            created,
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> u32 {
        self.capacity
    }

    pub(crate) fn identifier(&self) -> &Path {
        &self.identifier
    }

    /// Whether this mapping created the segment.
    pub(crate) fn created(&self) -> bool {
        self.created
    }

    #[inline]
    pub(crate) fn write_cursor(&self) -> &AtomicU32 {
        unsafe { layout::cursor_at(self.shmem.as_ptr(), WRITE_CURSOR_OFFSET) }
    }

    #[inline]
    pub(crate) fn read_cursor(&self) -> &AtomicU32 {
        unsafe { layout::cursor_at(self.shmem.as_ptr(), READ_CURSOR_OFFSET) }
    }

    #[inline]
    pub(crate) fn ring(&self) -> Ring {
        unsafe { Ring::from_raw(self.shmem.as_ptr().add(HEADER_SIZE), self.capacity as usize) }
    }

    #[inline]
    pub(crate) fn advance(&self, cursor: u32, by: usize) -> u32 {
        layout::advance(cursor, by, self.bound)
    }

    #[inline]
    pub(crate) fn distance(&self, from: u32, to: u32) -> usize {
        layout::distance(from, to, self.bound)
    }

    /// Best-effort `(write_cursor, read_cursor)` snapshot.
    pub(crate) fn cursors(&self) -> (u32, u32) {
        // Read first: the write cursor loaded afterwards can only be ahead of
        // it, never behind.
        let read = self.read_cursor().load(Ordering::Acquire);
        let write = self.write_cursor().load(Ordering::Acquire);
        (write, read)
    }

    /// Whether the link file still names this mapping. It stops doing so once
    /// the owner unlinks the segment, even if the identifier is recreated.
    pub(crate) fn is_linked(&self) -> bool {
        match read_link(&self.identifier) {
            Ok(Some(os_id)) => os_id == self.shmem.get_os_id(),
            _ => false,
        }
    }

    /// Removes the OS name of the segment, then its link file, so the
    /// identifier can be created again. Live mappings stay usable until they
    /// are dropped. Calling it again after a failure finishes the job.
    pub(crate) fn unlink(&self) -> Result<()> {
        #[cfg(unix)]
        unlink_os_id(self.shmem.get_os_id())?;
        if let Ok(Some(os_id)) = read_link(&self.identifier) {
            if os_id != self.shmem.get_os_id() {
                // Someone else's segment now lives at this identifier.
                return Ok(());
            }
        }
        match fs::remove_file(&self.identifier) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// OS id recorded in a link file, `None` when there is no link.
fn read_link(identifier: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(identifier) {
        Ok(os_id) => Ok(Some(os_id.trim_end_matches('\0').to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn validate(shmem: &Shmem, capacity: u32) -> Result<()> {
    if shmem.len() < HEADER_SIZE {
        return Err(ShmQueueError::TruncatedSegment { len: shmem.len(), required: HEADER_SIZE });
    }
    let header = unsafe { layout::read_header(shmem.as_ptr()) };
    if header.magic != MAGIC || header.version != VERSION {
        return Err(ShmQueueError::IncompatibleFormat {
            magic: header.magic,
            version: header.version,
        });
    }
    if header.capacity != capacity {
        return Err(ShmQueueError::CapacityMismatch {
            requested: capacity,
            existing: header.capacity,
        });
    }
    let required = layout::segment_size(header.capacity);
    if shmem.len() < required {
        return Err(ShmQueueError::TruncatedSegment { len: shmem.len(), required });
    }
    Ok(())
}

#[cfg(unix)]
fn unlink_os_id(os_id: &str) -> Result<()> {
    use std::ffi::CString;

    let name = if os_id.starts_with('/') {
        os_id.to_string()
    } else {
        format!("/{}", os_id)
    };
    let name = CString::new(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    if unsafe { libc::shm_unlink(name.as_ptr()) } == -1 {
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::NotFound {
            return Err(err.into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() -> Result<()> {
        let cfg = QueueConfig::builder()
            .data_dir("/dev/shm")
            .file_name("orders.map")
            .capacity(4096)
            .build()?;
        assert_eq!(cfg.identifier(), PathBuf::from("/dev/shm/orders.map"));
        assert_eq!(cfg.capacity, 4096);
        Ok(())
    }

    #[test]
    fn config_builder_rejects_capacity() {
        let res = QueueConfig::builder().capacity(2).build();
        assert!(matches!(res, Err(ShmQueueError::InvalidCapacity(2))));
    }

    #[test]
    fn default_config() {
        let cfg = QueueConfig::default();
        assert_eq!(cfg.file_name, SHMQUEUE_FILE_NAME);
        assert_eq!(cfg.capacity, DEFAULT_CAPACITY);
        assert!(cfg.identifier().ends_with(SHMQUEUE_FILE_NAME));
    }
}
