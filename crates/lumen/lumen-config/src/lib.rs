mod config;

pub use config::{ConfigError, SHM_PATH_ENV, TapConfig};
