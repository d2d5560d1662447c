//! Byte layout of the shared frame ring.
//!
//! Producer and consumers agree on this layout and nothing else; there is no
//! handshake. Every field is a little-endian `u32` at a fixed offset, decoded
//! explicitly rather than by casting a struct onto the mapping.
//!
//! # Memory Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Header (64 bytes)                           │
//! │  ┌────────────┬────────────┬───────────┬───────────┬──────────┐  │
//! │  │ write_index│ frame_count│ slot_size │ ring_size │ width    │  │
//! │  │ @0  (4B)   │ @4  (4B)   │ @8  (4B)  │ @12 (4B)  │ @16 (4B) │  │
//! │  ├────────────┼────────────┴───────────┴───────────┴──────────┤  │
//! │  │ height     │ reserved (40B)                                │  │
//! │  │ @20 (4B)   │ @24                                           │  │
//! │  └────────────┴───────────────────────────────────────────────┘  │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Slot[0]  (slot_size bytes)                                      │
//! │  ┌──────────────┬───────────────────────────────┬────────────┐   │
//! │  │ length (4B)  │ payload (length bytes)        │ unused     │   │
//! │  └──────────────┴───────────────────────────────┴────────────┘   │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Slot[1]                                                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ...                                                             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Slot[ring_size - 1]                                             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `write_index` is never wrapped in storage. The producer fills slot
//! `write_index % ring_size` and then bumps the index, so the newest complete
//! frame lives in slot `(write_index - 1) % ring_size`.

use crate::error::{Result, ShmError};
use crate::metadata::RingMetadata;

/// Size of the header region at offset 0.
pub const HEADER_SIZE: usize = 64;

/// Width of the length prefix at the start of every slot.
pub const LENGTH_PREFIX: usize = 4;

pub const WRITE_INDEX_OFFSET: usize = 0;
pub const FRAME_COUNT_OFFSET: usize = 4;
pub const SLOT_SIZE_OFFSET: usize = 8;
pub const RING_SIZE_OFFSET: usize = 12;
pub const WIDTH_OFFSET: usize = 16;
pub const HEIGHT_OFFSET: usize = 20;
pub const RESERVED_OFFSET: usize = 24;
pub const RESERVED_LEN: usize = HEADER_SIZE - RESERVED_OFFSET;

/// Slots in a ring created without explicit geometry.
pub const DEFAULT_RING_SIZE: u32 = 4;

/// Bytes per slot (length prefix included) for a ring created without explicit geometry.
pub const DEFAULT_SLOT_SIZE: u32 = 4 * 1024 * 1024;

/// Shape of the slot array following the header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RingGeometry {
    /// Number of slots.
    pub ring_size: u32,
    /// Bytes per slot, including the length prefix.
    pub slot_size: u32,
}

impl Default for RingGeometry {
    fn default() -> Self {
        Self {
            ring_size: DEFAULT_RING_SIZE,
            slot_size: DEFAULT_SLOT_SIZE,
        }
    }
}

impl RingGeometry {
    pub fn new(ring_size: u32, slot_size: u32) -> Self {
        Self {
            ring_size,
            slot_size,
        }
    }

    /// A usable ring has at least one slot and room for one payload byte per slot.
    pub fn validate(&self) -> Result<()> {
        if self.ring_size == 0 || (self.slot_size as usize) <= LENGTH_PREFIX {
            return Err(ShmError::InvalidGeometry {
                ring_size: self.ring_size,
                slot_size: self.slot_size,
            });
        }
        Ok(())
    }

    /// Largest payload a single slot can carry.
    #[inline]
    pub fn max_payload(&self) -> usize {
        (self.slot_size as usize).saturating_sub(LENGTH_PREFIX)
    }

    #[inline]
    pub fn total_bytes(&self) -> u64 {
        bytes_for_ring(self.ring_size, self.slot_size)
    }
}

/// Total file size for a ring: `HEADER_SIZE + ring_size * slot_size`.
///
/// Cannot overflow: the product of two `u32`s always fits in a `u64` with
/// room to spare for the header.
pub fn bytes_for_ring(ring_size: u32, slot_size: u32) -> u64 {
    HEADER_SIZE as u64 + ring_size as u64 * slot_size as u64
}

/// Slot holding the most recently completed frame.
///
/// `None` when nothing has been written yet or the ring has no slots.
#[inline]
pub fn latest_slot(write_index: u32, ring_size: u32) -> Option<u32> {
    if write_index == 0 || ring_size == 0 {
        return None;
    }
    Some((write_index - 1) % ring_size)
}

/// Byte offset of the slot addressed by `index`, wrapped modulo `ring_size`.
///
/// `None` if `ring_size` is zero or the offset does not fit in `usize`.
#[inline]
pub fn slot_offset(index: u32, ring_size: u32, slot_size: u32) -> Option<usize> {
    let slot = index.checked_rem(ring_size)?;
    let offset = (slot as u64)
        .checked_mul(slot_size as u64)?
        .checked_add(HEADER_SIZE as u64)?;
    usize::try_from(offset).ok()
}

#[inline]
fn put_u32(buf: &mut [u8; HEADER_SIZE], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

#[inline]
fn get_u32(buf: &[u8; HEADER_SIZE], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

/// Serialises a header image. Reserved bytes are zeroed.
pub fn encode_header(meta: &RingMetadata) -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    put_u32(&mut buf, WRITE_INDEX_OFFSET, meta.write_index);
    put_u32(&mut buf, FRAME_COUNT_OFFSET, meta.frame_count);
    put_u32(&mut buf, SLOT_SIZE_OFFSET, meta.slot_size);
    put_u32(&mut buf, RING_SIZE_OFFSET, meta.ring_size);
    put_u32(&mut buf, WIDTH_OFFSET, meta.width);
    put_u32(&mut buf, HEIGHT_OFFSET, meta.height);
    buf
}

pub fn decode_header(buf: &[u8; HEADER_SIZE]) -> RingMetadata {
    RingMetadata {
        write_index: get_u32(buf, WRITE_INDEX_OFFSET),
        frame_count: get_u32(buf, FRAME_COUNT_OFFSET),
        slot_size: get_u32(buf, SLOT_SIZE_OFFSET),
        ring_size: get_u32(buf, RING_SIZE_OFFSET),
        width: get_u32(buf, WIDTH_OFFSET),
        height: get_u32(buf, HEIGHT_OFFSET),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_offsets_fit_header() {
        assert_eq!(HEIGHT_OFFSET + 4, RESERVED_OFFSET);
        assert_eq!(RESERVED_LEN, 40);
    }

    #[test]
    fn latest_slot_undefined_before_first_write() {
        assert_eq!(latest_slot(0, 8), None);
        assert_eq!(latest_slot(3, 0), None);
    }

    #[test]
    fn latest_slot_wraps() {
        assert_eq!(latest_slot(1, 4), Some(0));
        assert_eq!(latest_slot(4, 4), Some(3));
        assert_eq!(latest_slot(5, 4), Some(0));
        assert_eq!(latest_slot(u32::MAX, 4), Some((u32::MAX - 1) % 4));
        for k in 1..100u32 {
            assert_eq!(latest_slot(k + 4, 4), latest_slot(k, 4));
        }
    }

    #[test]
    fn slot_offset_wraps_and_rejects_empty_ring() {
        assert_eq!(slot_offset(0, 4, 100), Some(HEADER_SIZE));
        assert_eq!(slot_offset(3, 4, 100), Some(HEADER_SIZE + 300));
        assert_eq!(slot_offset(7, 4, 100), Some(HEADER_SIZE + 300));
        assert_eq!(slot_offset(1, 0, 100), None);
    }

    #[test]
    fn slot_offset_handles_huge_geometry() {
        let off = slot_offset(u32::MAX - 1, u32::MAX, u32::MAX);
        if cfg!(target_pointer_width = "64") {
            let expected = HEADER_SIZE as u64 + (u32::MAX as u64 - 1) * u32::MAX as u64;
            assert_eq!(off, Some(expected as usize));
        }
    }

    #[test]
    fn bytes_for_ring_matches_default_geometry() {
        let geom = RingGeometry::default();
        assert_eq!(geom.total_bytes(), 64 + 4 * 4 * 1024 * 1024);
        assert_eq!(geom.max_payload(), 4 * 1024 * 1024 - 4);
    }

    #[test]
    fn geometry_validation() {
        assert!(RingGeometry::new(1, 5).validate().is_ok());
        assert!(matches!(
            RingGeometry::new(0, 1024).validate(),
            Err(ShmError::InvalidGeometry { ring_size: 0, .. })
        ));
        assert!(RingGeometry::new(4, 4).validate().is_err());
    }

    #[test]
    fn header_encoding_is_little_endian() {
        let meta = RingMetadata {
            write_index: 0x0102_0304,
            frame_count: 2,
            slot_size: 65536,
            ring_size: 8,
            width: 640,
            height: 480,
        };
        let buf = encode_header(&meta);
        assert_eq!(&buf[0..4], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&buf[16..20], &640u32.to_le_bytes());
        assert!(buf[RESERVED_OFFSET..].iter().all(|&b| b == 0));
        assert_eq!(decode_header(&buf), meta);
    }
}
