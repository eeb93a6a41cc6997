//! Config inspection command.

use crate::ui;
use anyhow::Result;
use std::path::Path;
use tablegate_core::Config;

/// Config command arguments.
#[derive(Debug, Clone)]
pub struct ConfigArgs {
    /// Subcommand.
    pub action: ConfigAction,
}

/// Config actions.
#[derive(Debug, Clone)]
pub enum ConfigAction {
    Show,
    Get(String),
    Validate,
    Path,
}

/// Run the config command.
pub fn run_config(args: ConfigArgs) -> Result<()> {
    let config_path = Config::default_path();

    match args.action {
        ConfigAction::Show => show_config(&config_path),
        ConfigAction::Get(key) => get_config_value(&key),
        ConfigAction::Validate => {
            validate_config(&config_path);
            Ok(())
        }
        ConfigAction::Path => {
            println!("{}", config_path.display());
            Ok(())
        }
    }
}

/// Show the effective configuration, defaults filled in.
fn show_config(config_path: &Path) -> Result<()> {
    if !config_path.exists() {
        ui::info(&format!(
            "No config file at {}, showing defaults",
            config_path.display()
        ));
    }

    let config = Config::load_default()?.with_env_overrides();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Get a specific config value by dotted path.
fn get_config_value(key: &str) -> Result<()> {
    let config = Config::load_default()?.with_env_overrides();
    let value = serde_json::to_value(&config)?;

    match lookup(&value, key) {
        Ok(serde_json::Value::String(s)) => println!("{s}"),
        Ok(serde_json::Value::Number(n)) => println!("{n}"),
        Ok(serde_json::Value::Bool(b)) => println!("{b}"),
        Ok(serde_json::Value::Null) => println!("null"),
        Ok(other) => println!("{}", serde_json::to_string_pretty(other)?),
        Err(e) => ui::error(&e),
    }

    Ok(())
}

/// Navigate a dotted path (e.g. `shield.tiers.booking.max`).
fn lookup<'a>(root: &'a serde_json::Value, key: &str) -> Result<&'a serde_json::Value, String> {
    let mut current = root;

    for part in key.split('.') {
        current = match current {
            serde_json::Value::Object(map) => map
                .get(part)
                .ok_or_else(|| format!("Key not found: {key}"))?,
            serde_json::Value::Array(arr) => {
                let idx = part
                    .parse::<usize>()
                    .map_err(|_| format!("Invalid array index: {part}"))?;
                arr.get(idx)
                    .ok_or_else(|| format!("Index out of bounds: {part}"))?
            }
            _ => return Err(format!("Cannot navigate into non-object: {part}")),
        };
    }

    Ok(current)
}

/// Validate the configuration file.
fn validate_config(config_path: &Path) {
    ui::header("Validating Configuration");

    if !config_path.exists() {
        ui::warning(&format!("Config file not found: {}", config_path.display()));
        ui::info("Defaults will be used");
        return;
    }

    let content = match std::fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            ui::error(&format!("Cannot read config: {e}"));
            return;
        }
    };

    match json5::from_str::<serde_json::Value>(&content) {
        Ok(value) => {
            ui::success("Syntax: Valid JSON5");
            if value.get("shield").is_none() {
                ui::warning("No 'shield' section, default tiers apply");
            }

            match Config::parse(&content) {
                Ok(config) => {
                    ui::success("Schema: Configuration is valid");
                    let tiers = &config.shield.tiers;
                    for category in tablegate_core::TierCategory::ALL {
                        let tier = tiers.get(category);
                        ui::kv(
                            category.as_str(),
                            &format!("{} per {}s", tier.max, tier.window_ms / 1000),
                        );
                    }
                }
                Err(e) => ui::error(&format!("Schema error: {e}")),
            }
        }
        Err(e) => ui::error(&format!("Syntax error: {e}")),
    }
}
