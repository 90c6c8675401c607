use anyhow::Result;
use std::path::Path;

use serenata_funnel::config::{self, Config};

/// Show the current effective configuration.
pub fn show_config(path: Option<&Path>) -> Result<()> {
    let config_path = path.map_or_else(config::config_file_path, Path::to_path_buf);
    let config = Config::load_from(&config_path)?;

    println!("Current Configuration");
    println!("=====================\n");

    println!("Config file: {}", config_path.display());
    let exists = config_path.exists();
    println!("File exists: {}\n", if exists { "yes" } else { "no (using defaults)" });

    println!("Settings:");
    println!("  api_base_url: {}", config.api_base_url);
    println!(
        "  api_key: {}",
        if config.api_key.is_some() { "<set>" } else { "<not set>" }
    );
    println!("  funnel_variant: {}", config.funnel_variant);
    println!("  poll_interval_secs: {}", config.poll_interval_secs);
    println!("  second_request_delay_secs: {}", config.second_request_delay_secs);
    println!("  generation_timeout_secs: {}", config.generation_timeout_secs);
    println!("  handoff_delay_ms: {}", config.handoff_delay_ms);
    println!("  storage_path: {}", config.storage_path.display());
    println!("  logging.level: {}", config.logging.level);
    println!("  logging.coloured: {}", config.logging.coloured);

    println!("\nPriority: CLI args > ENV vars (SERENATA_*) > Config file > Defaults");

    Ok(())
}

/// Show the config file path.
pub fn show_path() -> Result<()> {
    println!("{}", config::config_file_path().display());
    Ok(())
}

/// Show example configuration.
pub fn show_example() -> Result<()> {
    print!("{}", config::example_config());
    Ok(())
}

/// Initialize config file with defaults.
pub fn init_config() -> Result<()> {
    let created = config::ensure_config_file()?;
    let config_path = config::config_file_path();

    if created {
        println!("✓ Created config file: {}", config_path.display());
        println!("\nEdit this file to configure serenata.");
    } else {
        println!("Config file already exists: {}", config_path.display());
    }

    Ok(())
}
