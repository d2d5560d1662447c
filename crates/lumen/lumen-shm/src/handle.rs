//! Read-only attachment to a frame ring file.
//!
//! A [`RegionHandle`] owns one shared mapping plus the file it was made from.
//! The bytes behind the mapping belong to another process and may change at
//! any instant, so they are never exposed as a Rust slice. All access goes
//! through [`RawRegion`], which checks every offset against the real mapped
//! length before loading or copying anything.

use crate::error::{Result, ShmError};
use crate::layout::HEADER_SIZE;
use lumen_mmap::MmapFile;
use std::fs::File;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::ptr;

/// Scoped read-only mapping of a ring file.
///
/// Released on [`RegionHandle::close`] or when dropped, whichever comes first.
pub struct RegionHandle {
    path: PathBuf,
    /// `None` once closed.
    region: Option<MmapFile>,
}

impl RegionHandle {
    /// Attaches to an existing ring file.
    ///
    /// # Errors
    /// - [`ShmError::Open`] if the file cannot be opened or stat'ed
    /// - [`ShmError::Size`] if it is smaller than the header
    /// - [`ShmError::Map`] if mapping fails
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = File::open(&path).map_err(|source| ShmError::Open {
            path: path.clone(),
            source,
        })?;
        let len = file
            .metadata()
            .map_err(|source| ShmError::Open {
                path: path.clone(),
                source,
            })?
            .len();

        if len < HEADER_SIZE as u64 {
            return Err(ShmError::Size {
                path,
                len,
                min: HEADER_SIZE,
            });
        }

        let region = MmapFile::from_file(file).map_err(|source| ShmError::Map {
            path: path.clone(),
            source,
        })?;

        tracing::info!(path = %path.display(), bytes = region.len(), "attached to frame ring");

        Ok(Self {
            path,
            region: Some(region),
        })
    }

    /// Unmaps the region and closes the file. Further calls do nothing.
    pub fn close(&mut self) {
        if let Some(region) = self.region.take() {
            let bytes = region.len();
            drop(region);
            tracing::debug!(path = %self.path.display(), bytes, "released frame ring");
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.region.is_none()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mapped length in bytes.
    pub fn mapped_len(&self) -> Result<usize> {
        self.region.as_ref().map(MmapFile::len).ok_or(ShmError::Closed)
    }

    /// Bounds-checked view of the mapped bytes, valid while the handle is borrowed.
    pub(crate) fn raw_bytes(&self) -> Result<RawRegion<'_>> {
        let region = self.region.as_ref().ok_or(ShmError::Closed)?;
        Ok(RawRegion {
            base: region.as_ptr(),
            len: region.len(),
            _region: PhantomData,
        })
    }
}

impl Drop for RegionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Borrowed access to a live mapping.
///
/// Holds the base pointer and length of the mapping owned by a
/// [`RegionHandle`]; the lifetime keeps the handle from being closed while a
/// `RawRegion` is in use.
pub(crate) struct RawRegion<'a> {
    base: *const u8,
    len: usize,
    _region: PhantomData<&'a MmapFile>,
}

impl RawRegion<'_> {
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// `true` if `[offset, offset + count)` lies inside the mapping.
    #[inline]
    pub(crate) fn contains(&self, offset: usize, count: usize) -> bool {
        offset
            .checked_add(count)
            .is_some_and(|end| end <= self.len)
    }

    /// Reads a little-endian `u32` at `offset`, or `None` if it would run past the mapping.
    ///
    /// Aligned fields are loaded with a single 4-byte volatile load so a
    /// concurrent producer store is never observed half-done.
    #[inline]
    pub(crate) fn read_u32(&self, offset: usize) -> Option<u32> {
        if !self.contains(offset, 4) {
            return None;
        }
        // SAFETY: offset + 4 <= len, checked above.
        Some(unsafe { load_u32_le(self.base.add(offset)) })
    }

    /// Snapshot of the header bytes.
    ///
    /// Always in range for a handle that passed the size check at open time.
    pub(crate) fn header(&self) -> Option<[u8; HEADER_SIZE]> {
        if !self.contains(0, HEADER_SIZE) {
            return None;
        }
        let mut buf = [0u8; HEADER_SIZE];
        for (i, word) in buf.chunks_exact_mut(4).enumerate() {
            // SAFETY: i * 4 + 4 <= HEADER_SIZE <= len, checked above.
            let value = unsafe { load_u32_le(self.base.add(i * 4)) };
            word.copy_from_slice(&value.to_le_bytes());
        }
        Some(buf)
    }

    /// Copies `count` bytes starting at `offset` into a new buffer.
    ///
    /// The copy is not atomic with respect to the producer; a concurrent write
    /// to the same range yields a torn result.
    pub(crate) fn copy_out(&self, offset: usize, count: usize) -> Option<Vec<u8>> {
        if !self.contains(offset, count) {
            return None;
        }
        let mut out = Vec::with_capacity(count);
        // SAFETY: the source range is inside the mapping (checked above) and the
        // destination has capacity for `count` bytes; the two never overlap.
        unsafe {
            ptr::copy_nonoverlapping(self.base.add(offset), out.as_mut_ptr(), count);
            out.set_len(count);
        }
        Some(out)
    }
}

/// # Safety
/// `p` must be valid for reads of 4 bytes.
#[inline]
unsafe fn load_u32_le(p: *const u8) -> u32 {
    let word = p.cast::<u32>();
    if word.is_aligned() {
        return u32::from_le(unsafe { ptr::read_volatile(word) });
    }
    let mut bytes = [0u8; 4];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = unsafe { ptr::read_volatile(p.add(i)) };
    }
    u32::from_le_bytes(bytes)
}
