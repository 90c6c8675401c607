use anyhow::Result;
use serenata_funnel::config::LoggingConfig;
use twyg::{LogLevel, OptsBuilder};

/// Install twyg as the `log` backend.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let opts = OptsBuilder::new()
        .coloured(config.coloured)
        .level(level(&config.level))
        .build()
        .map_err(|e| anyhow::anyhow!("Invalid logging options: {e:?}"))?;

    twyg::setup(opts).map_err(|e| anyhow::anyhow!("Failed to set up logging: {e:?}"))?;
    Ok(())
}

fn level(name: &str) -> LogLevel {
    match name.trim().to_lowercase().as_str() {
        "trace" => LogLevel::Trace,
        "debug" => LogLevel::Debug,
        "warn" | "warning" => LogLevel::Warn,
        "error" => LogLevel::Error,
        _ => LogLevel::Info,
    }
}
