use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, ShmError>;

#[derive(Debug, thiserror::Error)]
pub enum ShmError {
    #[error("failed to open shared memory file '{}'", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("shared memory file '{}' is {len} bytes, smaller than the {min} byte header", path.display())]
    Size { path: PathBuf, len: u64, min: usize },

    #[error("failed to map shared memory file '{}'", path.display())]
    Map {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("shared memory region is closed")]
    Closed,

    #[error("ring header is inconsistent with the mapped region: {reason}")]
    Bounds { reason: String },

    #[error("failed to create shared memory file '{}'", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid ring geometry: ring_size={ring_size}, slot_size={slot_size}")]
    InvalidGeometry { ring_size: u32, slot_size: u32 },

    #[error("frame of {len} bytes exceeds slot payload capacity of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },
}

impl ShmError {
    pub(crate) fn bounds(reason: impl Into<String>) -> Self {
        ShmError::Bounds {
            reason: reason.into(),
        }
    }
}
