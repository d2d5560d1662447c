//! Latest-frame lookup over a mapped frame ring.
//!
//! The reader never coordinates with the producer. Each call decodes the
//! header afresh, picks slot `(write_index - 1) % ring_size`, validates the
//! slot against the real mapped length and copies the payload out.
//!
//! # Absence vs. errors
//!
//! | Condition                                   | Result            |
//! |---------------------------------------------|-------------------|
//! | `write_index == 0`                          | `Ok(None)`        |
//! | `ring_size == 0`                            | `Err(Bounds)`     |
//! | length prefix past end of mapping           | `Err(Bounds)`     |
//! | `length == 0`                               | `Ok(None)`        |
//! | payload past end of mapping                 | `Ok(None)`        |
//! | handle closed                               | `Err(Closed)`     |
//!
//! The two bounds checks are deliberately asymmetric: an unreadable length
//! prefix means the header itself is inconsistent with the file, while an
//! oversized length is what a slot caught mid-write can look like.
//!
//! # Torn reads
//!
//! In [`ReadMode::BestEffort`] a copy racing the producer may mix bytes from
//! two frames. Downstream decoders reject such frames and the caller polls
//! again. [`ReadMode::Validated`] re-reads `write_index` after the copy and
//! drops the frame if the producer moved on in the meantime.

use crate::error::{Result, ShmError};
use crate::handle::{RawRegion, RegionHandle};
use crate::layout::{
    LENGTH_PREFIX, RING_SIZE_OFFSET, SLOT_SIZE_OFFSET, WRITE_INDEX_OFFSET, latest_slot,
    slot_offset,
};
use crate::metadata::{RingMetadata, get_metadata};
use std::path::Path;
use std::sync::atomic::{Ordering, fence};

/// Consistency policy for frame copies.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum ReadMode {
    /// Copy once and return whatever was read.
    #[default]
    BestEffort,
    /// Discard the copy if `write_index` changed while copying.
    Validated,
}

/// A frame together with the write index it was published under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestFrame {
    /// Header `write_index` observed before the copy; the frame sits in slot
    /// `(write_index - 1) % ring_size`.
    pub write_index: u32,
    pub payload: Vec<u8>,
}

/// Outcome of one poll, before it is collapsed into `Option`.
#[derive(Debug)]
enum Poll {
    Frame(LatestFrame),
    Empty,
    Torn,
}

#[inline]
fn header_u32(raw: &RawRegion<'_>, offset: usize) -> Result<u32> {
    raw.read_u32(offset)
        .ok_or_else(|| ShmError::bounds("mapped region smaller than header"))
}

fn poll_latest(handle: &RegionHandle, mode: ReadMode) -> Result<Poll> {
    let raw = handle.raw_bytes()?;

    let write_index = header_u32(&raw, WRITE_INDEX_OFFSET)?;
    // Pairs with the producer's release fence before it bumps write_index.
    fence(Ordering::Acquire);
    let ring_size = header_u32(&raw, RING_SIZE_OFFSET)?;
    let slot_size = header_u32(&raw, SLOT_SIZE_OFFSET)?;

    if write_index == 0 {
        return Ok(Poll::Empty);
    }

    let Some(slot) = latest_slot(write_index, ring_size) else {
        return Err(ShmError::bounds("ring_size is zero"));
    };

    let offset = slot_offset(slot, ring_size, slot_size).ok_or_else(|| {
        ShmError::bounds(format!(
            "slot {slot} offset overflows (slot_size={slot_size})"
        ))
    })?;

    let Some(length) = raw.read_u32(offset) else {
        return Err(ShmError::bounds(format!(
            "slot {slot} length prefix at offset {offset} is past mapped length {}",
            raw.len()
        )));
    };

    if length == 0 {
        return Ok(Poll::Empty);
    }

    // Checked inside copy_out; a payload running off the mapping is treated as absent.
    let Some(payload) = raw.copy_out(offset + LENGTH_PREFIX, length as usize) else {
        return Ok(Poll::Empty);
    };

    if mode == ReadMode::Validated {
        fence(Ordering::Acquire);
        let after = header_u32(&raw, WRITE_INDEX_OFFSET)?;
        if after != write_index {
            tracing::trace!(before = write_index, after, slot, "discarding torn frame copy");
            return Ok(Poll::Torn);
        }
    }

    Ok(Poll::Frame(LatestFrame {
        write_index,
        payload,
    }))
}

/// Copies out the most recently completed frame, if any.
///
/// Best-effort: no re-validation is done, so a frame being overwritten while
/// it is copied comes back torn.
///
/// # Errors
/// - [`ShmError::Closed`] if the handle was closed
/// - [`ShmError::Bounds`] if `ring_size` is zero or the chosen slot's length
///   prefix lies outside the mapping
pub fn read_latest_frame(handle: &RegionHandle) -> Result<Option<Vec<u8>>> {
    match poll_latest(handle, ReadMode::BestEffort)? {
        Poll::Frame(frame) => Ok(Some(frame.payload)),
        Poll::Empty | Poll::Torn => Ok(None),
    }
}

/// Current header `write_index`, or `-1` if the handle is closed. Never fails.
pub fn get_write_index(handle: &RegionHandle) -> i64 {
    handle
        .raw_bytes()
        .ok()
        .and_then(|raw| raw.read_u32(WRITE_INDEX_OFFSET))
        .map_or(-1, i64::from)
}

/// Counters kept by a [`FrameReader`] since it was opened.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ReaderStats {
    /// Polls that returned a frame.
    pub frames: u64,
    /// Polls that found nothing to return.
    pub empty_polls: u64,
    /// Copies dropped because the producer advanced mid-copy (validated mode only).
    pub torn_discards: u64,
}

/// Consumer side of a frame ring.
///
/// Owns its [`RegionHandle`]; consumers are fully independent of each other
/// and of the producer. Polling cadence is up to the caller.
pub struct FrameReader {
    handle: RegionHandle,
    mode: ReadMode,
    stats: ReaderStats,
}

impl FrameReader {
    /// Attaches to a ring file in [`ReadMode::BestEffort`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_mode(path, ReadMode::BestEffort)
    }

    pub fn open_with_mode<P: AsRef<Path>>(path: P, mode: ReadMode) -> Result<Self> {
        Ok(Self::from_handle(RegionHandle::open(path)?, mode))
    }

    pub fn from_handle(handle: RegionHandle, mode: ReadMode) -> Self {
        Self {
            handle,
            mode,
            stats: ReaderStats::default(),
        }
    }

    /// Latest frame payload, or `None` if there is nothing to show right now.
    pub fn read_latest_frame(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.read_latest()?.map(|frame| frame.payload))
    }

    /// Like [`FrameReader::read_latest_frame`] but keeps the write index.
    pub fn read_latest(&mut self) -> Result<Option<LatestFrame>> {
        match poll_latest(&self.handle, self.mode)? {
            Poll::Frame(frame) => {
                self.stats.frames += 1;
                Ok(Some(frame))
            }
            Poll::Empty => {
                self.stats.empty_polls += 1;
                Ok(None)
            }
            Poll::Torn => {
                self.stats.torn_discards += 1;
                Ok(None)
            }
        }
    }

    /// See [`get_write_index`].
    pub fn write_index(&self) -> i64 {
        get_write_index(&self.handle)
    }

    pub fn metadata(&self) -> Result<RingMetadata> {
        get_metadata(&self.handle)
    }

    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    pub fn handle(&self) -> &RegionHandle {
        &self.handle
    }

    /// Releases the mapping. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.handle.close();
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }
}
