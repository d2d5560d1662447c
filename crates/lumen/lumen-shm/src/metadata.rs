use crate::error::{Result, ShmError};
use crate::handle::RegionHandle;
use crate::layout::decode_header;

/// Header fields of a frame ring, as last written by the producer.
///
/// Values are copied verbatim and not validated; `ring_size` and `slot_size`
/// in particular may be garbage if the producer misbehaved.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RingMetadata {
    pub write_index: u32,
    pub frame_count: u32,
    pub slot_size: u32,
    pub ring_size: u32,
    pub width: u32,
    pub height: u32,
}

/// Decodes every header field.
///
/// # Errors
/// [`ShmError::Closed`] once the handle has been closed.
pub fn get_metadata(handle: &RegionHandle) -> Result<RingMetadata> {
    let raw = handle.raw_bytes()?;
    // Open guarantees the header is mapped; a miss here means the mapping shrank.
    let header = raw
        .header()
        .ok_or_else(|| ShmError::bounds("mapped region smaller than header"))?;
    Ok(decode_header(&header))
}
