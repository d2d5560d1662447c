use serde::Deserialize;
use std::path::Path;

/// Settings for a frame ring consumer.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct TapConfig {
    #[serde(default = "defaults::shm_file_path")]
    pub shm_file_path: String,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    /// Delay between polls of the ring.
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long to keep retrying while the producer has not created the file yet.
    #[serde(default = "defaults::attach_timeout_ms")]
    pub attach_timeout_ms: u64,
    /// Re-check the write index after each copy and drop torn frames.
    #[serde(default)]
    pub validate_frames: bool,
    /// Directory to write each new frame into, if any.
    #[serde(default)]
    pub dump_dir: Option<String>,
    /// Stop after this many new frames.
    #[serde(default)]
    pub max_frames: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
}

/// Environment variable naming the ring file shared with the producer.
pub const SHM_PATH_ENV: &str = "LUMEN_SHM_PATH";

mod defaults {
    use super::SHM_PATH_ENV;

    pub fn shm_file_path() -> String {
        if let Ok(path) = std::env::var(SHM_PATH_ENV) {
            return path;
        }
        match std::env::var("HOME") {
            Ok(home) if !home.is_empty() => format!("{home}/.cache/lumen/frames"),
            _ => "/tmp/lumen_frames".into(),
        }
    }

    pub fn log_level() -> String {
        "info".into()
    }

    pub fn poll_interval_ms() -> u64 {
        16 // ~60 polls/s
    }

    pub fn attach_timeout_ms() -> u64 {
        5_000
    }
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            shm_file_path: defaults::shm_file_path(),
            log_level: defaults::log_level(),
            poll_interval_ms: defaults::poll_interval_ms(),
            attach_timeout_ms: defaults::attach_timeout_ms(),
            validate_frames: false,
            dump_dir: None,
            max_frames: None,
        }
    }
}

impl TapConfig {
    pub fn load(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        let toml_to_str = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::parse(&toml_to_str)
    }

    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        let tap_config: TapConfig = toml::from_str(toml_str)?;
        Ok(tap_config)
    }
}
