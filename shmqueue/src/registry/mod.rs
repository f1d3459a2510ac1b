//! Process-wide table of live segment mappings, keyed by identifier.
//!
//! Opening the same identifier twice in one process hands out the mapping that
//! is already live instead of mapping the segment a second time, as long as
//! the identifier still links to that mapping.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use once_cell::sync::Lazy;
use tracing::debug;

use crate::core::Segment;
use crate::errors::{Result, ShmQueueError};

static SEGMENTS: Lazy<Mutex<HashMap<PathBuf, Weak<Segment>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenMode {
    CreateOrAttach,
    Attach,
}

/// Returns the mapping for `identifier` and whether this call created the
/// segment.
pub(crate) fn acquire(
    identifier: &Path,
    capacity: u32,
    mode: OpenMode,
) -> Result<(Arc<Segment>, bool)> {
    let mut segments = SEGMENTS.lock()?;
    if let Some(segment) = segments.get(identifier).and_then(Weak::upgrade) {
        if segment.is_linked() {
            if segment.capacity() != capacity {
                return Err(ShmQueueError::CapacityMismatch {
                    requested: capacity,
                    existing: segment.capacity(),
                });
            }
            return Ok((segment, false));
        }
        // Unlinked, possibly recreated by another process.
        debug!(identifier = %identifier.display(), "dropping stale queue mapping");
        segments.remove(identifier);
    }

    let segment = match mode {
        OpenMode::CreateOrAttach => Segment::create_or_open(identifier, capacity)?,
        OpenMode::Attach => Segment::open(identifier, capacity)?,
    };
    let created = segment.created();
    let segment = Arc::new(segment);
    segments.retain(|_, live| live.strong_count() > 0);
    segments.insert(identifier.to_path_buf(), Arc::downgrade(&segment));
    Ok((segment, created))
}

/// Drops the entry for `identifier`; the next `acquire` maps it afresh.
pub(crate) fn forget(identifier: &Path) -> Result<()> {
    SEGMENTS.lock()?.remove(identifier);
    Ok(())
}

#[cfg(test)]
pub(crate) fn is_tracked(identifier: &Path) -> bool {
    SEGMENTS
        .lock()
        .map(|segments| segments.get(identifier).map_or(false, |s| s.strong_count() > 0))
        .unwrap_or(false)
}
