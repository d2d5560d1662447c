//! Single producer for a frame ring.
//!
//! The writer creates and sizes the ring file, then publishes opaque payloads
//! into slot `write_index % ring_size`. Readers are never waited on.
//!
//! # Publish order
//!
//! 1. Write the length prefix and payload into the slot
//! 2. Release fence
//! 3. Rewrite the header with the bumped `write_index` and `frame_count`
//!
//! A reader that observes the new `write_index` therefore sees the complete
//! payload behind it, unless the writer has since lapped the ring.

use crate::error::{Result, ShmError};
use crate::layout::{HEADER_SIZE, LENGTH_PREFIX, RingGeometry, encode_header, slot_offset};
use crate::metadata::RingMetadata;
use lumen_mmap::MmapFileMut;
use std::fs;
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::{Ordering, fence};

/// The producer side of a frame ring.
///
/// Only one writer may exist per file. `write_frame` takes `&mut self`, which
/// rules out concurrent publishing within a process; across processes it is
/// up to the deployment.
pub struct FrameWriter {
    /// Owns the mmap lifetime; all access goes through `base`.
    _mm: MmapFileMut,
    base: *mut u8,
    len: usize,
    path: PathBuf,
    geometry: RingGeometry,
    write_index: u32,
    frame_count: u32,
}

impl FrameWriter {
    /// Creates (or truncates) the ring file at `path` and writes an empty header.
    ///
    /// Parent directories are created as needed.
    ///
    /// # Errors
    /// - [`ShmError::InvalidGeometry`] for an empty ring or slots with no payload room
    /// - [`ShmError::Create`] if the file cannot be created, sized or mapped
    pub fn create<P: AsRef<Path>>(path: P, geometry: RingGeometry) -> Result<Self> {
        geometry.validate()?;
        let path = path.as_ref().to_path_buf();
        let create_err = |source| ShmError::Create {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(create_err)?;
        }

        let total = geometry.total_bytes();
        let mut mm = MmapFileMut::create_rw(&path, total).map_err(create_err)?;
        let base = mm.as_mut_ptr();
        let len = mm.len();

        let mut writer = Self {
            _mm: mm,
            base,
            len,
            path,
            geometry,
            write_index: 0,
            frame_count: 0,
        };
        writer.store_header(0, 0);

        tracing::info!(
            path = %writer.path.display(),
            ring_size = geometry.ring_size,
            slot_size = geometry.slot_size,
            bytes = total,
            "created frame ring"
        );

        Ok(writer)
    }

    /// Publishes one frame and returns the index it was written at.
    ///
    /// # Errors
    /// [`ShmError::FrameTooLarge`] if the payload plus its length prefix does
    /// not fit in a slot. Nothing is written in that case.
    pub fn write_frame(&mut self, payload: &[u8], width: u32, height: u32) -> Result<u32> {
        let max = self.geometry.max_payload();
        if payload.len() > max {
            return Err(ShmError::FrameTooLarge {
                len: payload.len(),
                max,
            });
        }

        let index = self.write_index;
        let offset = slot_offset(index, self.geometry.ring_size, self.geometry.slot_size)
            .filter(|off| off + LENGTH_PREFIX + payload.len() <= self.len)
            .ok_or_else(|| ShmError::bounds(format!("slot for index {index} is not mapped")))?;

        // SAFETY: the slot range was checked against the mapped length above
        // and `payload` cannot alias the mapping we own exclusively.
        unsafe {
            let prefix = (payload.len() as u32).to_le_bytes();
            ptr::copy_nonoverlapping(prefix.as_ptr(), self.base.add(offset), LENGTH_PREFIX);
            ptr::copy_nonoverlapping(
                payload.as_ptr(),
                self.base.add(offset + LENGTH_PREFIX),
                payload.len(),
            );
        }

        fence(Ordering::Release);

        // u32 in the wire format; wraps after 2^32 frames.
        self.write_index = index.wrapping_add(1);
        self.frame_count = self.frame_count.wrapping_add(1);
        self.store_header(width, height);

        Ok(index)
    }

    fn store_header(&mut self, width: u32, height: u32) {
        let header = encode_header(&RingMetadata {
            write_index: self.write_index,
            frame_count: self.frame_count,
            slot_size: self.geometry.slot_size,
            ring_size: self.geometry.ring_size,
            width,
            height,
        });
        debug_assert!(self.len >= HEADER_SIZE);
        let words = header.chunks_exact(4).map(|w| u32::from_ne_bytes([w[0], w[1], w[2], w[3]]));
        // write_index (word 0) goes last so readers never see it ahead of the rest.
        for (i, word) in words.enumerate().rev() {
            // SAFETY: the mapping is page aligned and at least HEADER_SIZE bytes.
            unsafe { ptr::write_volatile(self.base.add(i * 4).cast::<u32>(), word) };
        }
    }

    /// Index of the next slot to be written, as stored in the header.
    pub fn write_index(&self) -> u32 {
        self.write_index
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub fn geometry(&self) -> RingGeometry {
        self.geometry
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
