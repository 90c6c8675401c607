use anyhow::{Context, Result};
use confyg::{env, Confygery};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::policy::GenerationPolicy;

/// Which funnel variant is running.
///
/// - `fast`: move to comparison as soon as the first song is ready and let
///   the comparison page wait for the second.
/// - `full`: wait until both songs have finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunnelMode {
    Fast,
    #[default]
    Full,
}

impl fmt::Display for FunnelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fast => "fast",
            Self::Full => "full",
        })
    }
}

impl FromStr for FunnelMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "full" => Ok(Self::Full),
            other => anyhow::bail!("Unknown funnel variant: {other} (expected fast or full)"),
        }
    }
}

/// Logger settings handed to the binary's logger setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub coloured: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            coloured: true,
        }
    }
}

/// Configuration for serenata.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (SERENATA_* prefix)
/// 3. Config file (~/.config/serenata/config.toml)
/// 4. Built-in defaults (lowest priority)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the backend project (functions and REST live under it).
    ///
    /// Can be set via:
    /// - ENV: SERENATA_API_BASE_URL
    /// - Config: api_base_url = "https://xyz.supabase.co"
    pub api_base_url: String,

    /// Public API key sent with every request.
    pub api_key: Option<String>,

    /// Funnel variant; assigned outside this crate and injected here.
    pub funnel_variant: FunnelMode,

    pub poll_interval_secs: u64,
    pub second_request_delay_secs: u64,
    pub generation_timeout_secs: u64,
    pub handoff_delay_ms: u64,

    /// Where the session is kept between runs.
    ///
    /// Default: ~/.local/share/serenata/session.db
    pub storage_path: PathBuf,

    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        let policy = GenerationPolicy::default();
        Self {
            api_base_url: "http://localhost:54321".to_string(),
            api_key: None,
            funnel_variant: FunnelMode::default(),
            poll_interval_secs: policy.poll_interval.as_secs(),
            second_request_delay_secs: policy.second_request_delay.as_secs(),
            generation_timeout_secs: policy.timeout.as_secs(),
            handoff_delay_ms: u64::try_from(policy.handoff_delay.as_millis()).unwrap_or(1500),
            storage_path: default_storage_path(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default file and environment variables.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific file (if it exists) and
    /// environment variables.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let mut builder = Confygery::new().context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder
                .add_file(path_str)
                .context("Failed to load config file")?;
        }

        let env_opts = env::Options::with_top_level("serenata");
        builder
            .add_env(env_opts)
            .context("Failed to load environment variables")?;

        let config: Self = builder.build().context("Failed to build configuration")?;

        Ok(config)
    }

    /// The timing policy described by this configuration.
    #[must_use]
    pub fn policy(&self) -> GenerationPolicy {
        GenerationPolicy {
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            second_request_delay: Duration::from_secs(self.second_request_delay_secs),
            timeout: Duration::from_secs(self.generation_timeout_secs.max(1)),
            handoff_delay: Duration::from_millis(self.handoff_delay_ms),
        }
    }
}

fn default_storage_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("serenata")
        .join("session.db")
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/serenata/config.toml
/// - macOS: ~/Library/Application Support/serenata/config.toml
/// - Windows: %APPDATA%\serenata\config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("serenata")
        .join("config.toml")
}

/// Get the example config file content.
pub fn example_config() -> &'static str {
    r#"# Serenata Configuration File
#
# Priority: CLI arguments > environment (SERENATA_*) > this file > defaults

# Backend project URL. Generation, checkout, and coupon functions live under
# /functions/v1, the songs table under /rest/v1.
api_base_url = "http://localhost:54321"

# Public (anon) API key. Can also be set via SERENATA_API_KEY.
#api_key = "your-anon-key"

# Funnel variant: "full" waits for both songs, "fast" moves on after the first.
funnel_variant = "full"

# Seconds between status checks while a song is generating.
poll_interval_secs = 3

# Seconds to wait after the first song completes before requesting the second.
# This spaces requests for the provider's rate limit; confirm the real limit
# with the provider before lowering it.
second_request_delay_secs = 3

# Give up on generation after this many seconds.
generation_timeout_secs = 600

# Pause before showing the comparison page, in milliseconds.
handoff_delay_ms = 1500

# Where the session is kept between runs.
#storage_path = "/path/to/session.db"

[logging]
level = "info"
coloured = true
"#
}

/// Create default config file if it doesn't exist.
///
/// Returns true if a new file was created, false if it already existed.
pub fn ensure_config_file() -> Result<bool> {
    let config_path = config_file_path();

    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    std::fs::write(&config_path, example_config()).context("Failed to write config file")?;

    Ok(true)
}
