use anyhow::anyhow;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

use crate::conf;

/// Logs go to stderr. `RUST_LOG` wins over the configured level when set.
pub fn init() -> anyhow::Result<()> {
    let level = conf::global().log_level;
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow!("Failed to init tracing: {error}"))?;
    Ok(())
}
