use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serenata_core::{SessionStore, SqliteStorage};
use serenata_funnel::api::SupabaseClient;
use serenata_funnel::config::config_file_path;
use serenata_funnel::{Config, Services};

/// Everything a command needs, resolved from flags and configuration.
#[derive(Debug)]
pub struct CliContext {
    pub config: Config,
    pub session: SessionStore,
    pub services: Services,
}

impl CliContext {
    pub fn load(config_path: Option<&Path>, storage: Option<PathBuf>) -> Result<Self> {
        let config_path = config_path.map_or_else(config_file_path, Path::to_path_buf);
        let mut config = Config::load_from(&config_path)?;
        if let Some(storage) = storage {
            config.storage_path = storage;
        }

        let storage = SqliteStorage::open(&config.storage_path).with_context(|| {
            format!(
                "Failed to open session store at {}",
                config.storage_path.display()
            )
        })?;
        let session = SessionStore::open(Arc::new(storage))?;

        let client = SupabaseClient::new(&config.api_base_url, config.api_key.clone())
            .context("Failed to create API client")?;

        Ok(Self {
            services: Services::from_client(client),
            config,
            session,
        })
    }
}
