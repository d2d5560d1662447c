mod tap;

use anyhow::Context;
use lumen_config::TapConfig;
use tap::Tap;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => TapConfig::load(path.clone()).with_context(|| format!("loading '{path}'"))?,
        None => TapConfig::default(),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut tap = Tap::attach(&config)?;
    let result = tap.run();
    tap.close();
    result
}
