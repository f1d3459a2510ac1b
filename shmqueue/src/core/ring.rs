use std::cmp;
use std::ptr;

/// View of the circular byte region that follows the header.
///
/// Positions handed to [`Ring::write`] and [`Ring::read`] are physical offsets
/// in `0..len`; a copy that runs past the end continues at offset 0, so every
/// copy is split into at most two sub-copies.
#[derive(Clone, Copy)]
pub(crate) struct Ring {
    base: *mut u8,
    len: usize,
}

impl Ring {
    /// # Safety
    /// `base..base + len` must stay mapped and writable for the lifetime of the
    /// returned value.
    pub(crate) unsafe fn from_raw(base: *mut u8, len: usize) -> Ring {
        debug_assert!(len > 0);
        Ring { base, len }
    }

    #[inline]
    pub(crate) fn position(&self, cursor: u32) -> usize {
        cursor as usize % self.len
    }

    /// Copies `src` into the ring starting at `pos`; returns the position right
    /// after the last byte written.
    pub(crate) fn write(&self, pos: usize, src: &[u8]) -> usize {
        debug_assert!(pos < self.len && src.len() <= self.len);
        let first = cmp::min(src.len(), self.len - pos);
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), self.base.add(pos), first);
            ptr::copy_nonoverlapping(src.as_ptr().add(first), self.base, src.len() - first);
        }
        (pos + src.len()) % self.len
    }

    /// Fills `dst` from the ring starting at `pos`; returns the position right
    /// after the last byte read.
    pub(crate) fn read(&self, pos: usize, dst: &mut [u8]) -> usize {
        debug_assert!(pos < self.len && dst.len() <= self.len);
        let first = cmp::min(dst.len(), self.len - pos);
        unsafe {
            ptr::copy_nonoverlapping(self.base.add(pos), dst.as_mut_ptr(), first);
            ptr::copy_nonoverlapping(self.base, dst.as_mut_ptr().add(first), dst.len() - first);
        }
        (pos + dst.len()) % self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_copy() {
        let mut backing = vec![0u8; 16];
        let ring = unsafe { Ring::from_raw(backing.as_mut_ptr(), backing.len()) };
        assert_eq!(ring.write(2, b"abcd"), 6);
        let mut out = [0u8; 4];
        assert_eq!(ring.read(2, &mut out), 6);
        assert_eq!(&out, b"abcd");
        assert_eq!(&backing[2..6], b"abcd");
    }

    #[test]
    fn copy_straddles_end() {
        let mut backing = vec![0u8; 10];
        let ring = unsafe { Ring::from_raw(backing.as_mut_ptr(), backing.len()) };
        assert_eq!(ring.write(7, b"123456"), 3);
        let mut out = [0u8; 6];
        assert_eq!(ring.read(7, &mut out), 3);
        assert_eq!(&out, b"123456");
        assert_eq!(&backing[7..10], b"123");
        assert_eq!(&backing[0..3], b"456");
    }

    #[test]
    fn copy_ends_exactly_at_boundary() {
        let mut backing = vec![0u8; 8];
        let ring = unsafe { Ring::from_raw(backing.as_mut_ptr(), backing.len()) };
        assert_eq!(ring.write(4, b"wxyz"), 0);
        assert_eq!(ring.position(8), 0);
        assert_eq!(ring.position(13), 5);
        assert_eq!(&backing[4..8], b"wxyz");
    }
}
