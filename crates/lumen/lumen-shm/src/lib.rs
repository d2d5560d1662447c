mod error;
mod handle;
pub mod layout;
mod metadata;
mod reader;
mod writer;

pub use error::{Result, ShmError};
pub use handle::RegionHandle;
pub use layout::{DEFAULT_RING_SIZE, DEFAULT_SLOT_SIZE, HEADER_SIZE, RingGeometry};
pub use metadata::{RingMetadata, get_metadata};
pub use reader::{
    FrameReader, LatestFrame, ReadMode, ReaderStats, get_write_index, read_latest_frame,
};
pub use writer::FrameWriter;
