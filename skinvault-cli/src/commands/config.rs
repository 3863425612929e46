//! Config command - inspect and edit settings.json

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use skinvault_core::config::{Config, SETTABLE_KEYS};

use super::get_data_dir;
use crate::output::{self, create_table};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration, environment included
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change one value in settings.json
    Set {
        /// Settings key, e.g. cache.ttlSeconds
        key: String,
        /// New value; an empty string clears skinport.clientId
        value: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Rows of `(key, value)` in settings.json naming; the secret is only flagged
fn rows(config: &Config) -> Vec<(&'static str, String)> {
    vec![
        ("cache.ttlSeconds", config.cache_ttl.as_secs().to_string()),
        (
            "cache.cleanupIntervalSeconds",
            config.cache_cleanup_interval.as_secs().to_string(),
        ),
        ("skinport.addr", config.skinport_addr.clone()),
        (
            "skinport.clientId",
            config.skinport_client_id.clone().unwrap_or_default(),
        ),
        (
            "skinport.clientSecret",
            if config.skinport_client_secret.is_some() { "set" } else { "unset" }.to_string(),
        ),
        ("skinport.timeoutSeconds", config.upstream_timeout.as_secs().to_string()),
        ("skinport.rateLimit", config.rate_limit.to_string()),
        ("skinport.rateWindowSeconds", config.rate_window.as_secs().to_string()),
    ]
}

fn to_json(config: &Config) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = rows(config)
        .into_iter()
        .map(|(key, value)| (key.to_string(), serde_json::Value::String(value)))
        .collect();
    serde_json::Value::Object(map)
}

pub fn run(command: ConfigCommands) -> Result<()> {
    let data_dir = get_data_dir()?;

    match command {
        ConfigCommands::Show { json } => {
            let config = Config::load(&data_dir)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&to_json(&config))?);
                return Ok(());
            }

            let mut table = create_table();
            table.set_header(vec!["Key", "Value"]);
            for (key, value) in rows(&config) {
                table.add_row(vec![key.to_string(), value]);
            }
            println!("{}", table);
            println!("Settable keys: {}", SETTABLE_KEYS.join(", ").dimmed());
        }
        ConfigCommands::Set { key, value, json } => {
            std::fs::create_dir_all(&data_dir)?;
            // File values only, so environment overrides are not persisted
            let mut config = Config::load_with_env(&data_dir, |_| None)?;
            config.set(&key, &value)?;
            config.save(&data_dir)?;
            log::info!("Updated {} in {}", key, data_dir.display());

            if json {
                println!("{}", serde_json::to_string_pretty(&to_json(&config))?);
            } else {
                output::success(&format!("Set {} = {}", key, value.trim()));
            }
        }
    }

    Ok(())
}
