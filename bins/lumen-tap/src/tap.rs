use anyhow::Context;
use lumen_config::TapConfig;
use lumen_shm::{FrameReader, LatestFrame, ReadMode, ShmError};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Polls a frame ring and reacts to every new frame it observes.
pub struct Tap {
    reader: FrameReader,
    poll_interval: Duration,
    dump_dir: Option<PathBuf>,
    max_frames: Option<u64>,
    last_index: Option<u32>,
    seen: u64,
}

impl Tap {
    /// Attaches to the configured ring, retrying until `attach_timeout_ms`
    /// while the producer has not created or sized the file yet.
    pub fn attach(config: &TapConfig) -> anyhow::Result<Self> {
        let mode = if config.validate_frames {
            ReadMode::Validated
        } else {
            ReadMode::BestEffort
        };

        let deadline = Instant::now() + Duration::from_millis(config.attach_timeout_ms);
        let reader = loop {
            match FrameReader::open_with_mode(&config.shm_file_path, mode) {
                Ok(reader) => break reader,
                Err(e @ (ShmError::Open { .. } | ShmError::Size { .. }))
                    if Instant::now() < deadline =>
                {
                    tracing::debug!(error = %e, "frame ring not ready");
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("attaching to '{}'", config.shm_file_path));
                }
            }
        };

        let dump_dir = config.dump_dir.as_ref().map(PathBuf::from);
        if let Some(dir) = &dump_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating dump dir '{}'", dir.display()))?;
        }

        let meta = reader.metadata()?;
        tracing::info!(
            path = %config.shm_file_path,
            ?mode,
            ring_size = meta.ring_size,
            slot_size = meta.slot_size,
            write_index = meta.write_index,
            "tap attached"
        );

        Ok(Self {
            reader,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            dump_dir,
            max_frames: config.max_frames,
            last_index: None,
            seen: 0,
        })
    }

    /// Polls once. Returns the write index of a frame not seen before, if any.
    pub fn poll_once(&mut self) -> anyhow::Result<Option<u32>> {
        let frame = match self.reader.read_latest() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(None),
            Err(ShmError::Bounds { reason }) => {
                tracing::warn!(%reason, "ring header inconsistent with file");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        if self.last_index == Some(frame.write_index) {
            return Ok(None);
        }
        self.last_index = Some(frame.write_index);
        self.seen += 1;

        let meta = self.reader.metadata()?;
        tracing::info!(
            write_index = frame.write_index,
            bytes = frame.payload.len(),
            width = meta.width,
            height = meta.height,
            "new frame"
        );

        if let Some(dir) = &self.dump_dir {
            dump_frame(dir, &frame)?;
        }

        Ok(Some(frame.write_index))
    }

    /// Polls until `max_frames` new frames were seen, or forever without a limit.
    pub fn run(&mut self) -> anyhow::Result<()> {
        while !self.done() {
            self.poll_once()?;
            std::thread::sleep(self.poll_interval);
        }
        Ok(())
    }

    fn done(&self) -> bool {
        self.max_frames.is_some_and(|max| self.seen >= max)
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// Logs reader counters and releases the mapping.
    pub fn close(mut self) {
        let stats = self.reader.stats();
        tracing::info!(
            seen = self.seen,
            frames = stats.frames,
            empty_polls = stats.empty_polls,
            torn_discards = stats.torn_discards,
            "tap detached"
        );
        self.reader.close();
    }
}

fn frame_file(dir: &Path, write_index: u32) -> PathBuf {
    dir.join(format!("frame_{write_index:010}.bin"))
}

fn dump_frame(dir: &Path, frame: &LatestFrame) -> anyhow::Result<()> {
    let path = frame_file(dir, frame.write_index);
    std::fs::write(&path, &frame.payload)
        .with_context(|| format!("writing frame to '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_shm::{FrameWriter, RingGeometry};

    fn config_for(path: &Path) -> TapConfig {
        TapConfig {
            shm_file_path: path.display().to_string(),
            poll_interval_ms: 0,
            attach_timeout_ms: 0,
            ..TapConfig::default()
        }
    }

    #[test]
    fn reports_each_frame_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ring = dir.path().join("frames");
        let mut writer = FrameWriter::create(&ring, RingGeometry::new(2, 64)).expect("create");
        let mut tap = Tap::attach(&config_for(&ring)).expect("attach");

        assert_eq!(tap.poll_once().expect("poll"), None);

        writer.write_frame(b"first", 2, 2).expect("write");
        assert_eq!(tap.poll_once().expect("poll"), Some(1));
        assert_eq!(tap.poll_once().expect("poll"), None);

        writer.write_frame(b"second", 2, 2).expect("write");
        writer.write_frame(b"third", 2, 2).expect("write");
        assert_eq!(tap.poll_once().expect("poll"), Some(3));
        assert_eq!(tap.seen(), 2);
        tap.close();
    }

    #[test]
    fn dumps_frames_and_stops_at_limit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ring = dir.path().join("frames");
        let dump = dir.path().join("dump");
        let mut writer = FrameWriter::create(&ring, RingGeometry::new(2, 64)).expect("create");
        writer.write_frame(b"payload", 2, 2).expect("write");

        let config = TapConfig {
            dump_dir: Some(dump.display().to_string()),
            max_frames: Some(1),
            validate_frames: true,
            ..config_for(&ring)
        };
        let mut tap = Tap::attach(&config).expect("attach");
        tap.run().expect("run");

        let written = std::fs::read(frame_file(&dump, 1)).expect("dumped frame");
        assert_eq!(written, b"payload");
        tap.close();
    }

    #[test]
    fn attach_gives_up_after_timeout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Tap::attach(&config_for(&dir.path().join("absent")))
            .err()
            .expect("must fail");
        assert!(err.downcast_ref::<ShmError>().is_some(), "{err:?}");
    }
}
