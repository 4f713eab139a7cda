//! Config command handlers
//!
//! Shows the active configuration and applies single-value updates that
//! are validated and written back to the config file.

use crate::cli::ConfigCommand;
use crate::config::Config;
use crate::error::{Result, TalariaError};
use colored::Colorize;

/// Handle config commands
pub fn handle_config(config_path: &str, mut config: Config, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let mut redacted = config.clone();
            if !redacted.api.key.is_empty() {
                redacted.api.key = "********".to_string();
            }
            let yaml = serde_yaml::to_string(&redacted)
                .map_err(|e| TalariaError::Config(format!("Failed to render config: {}", e)))?;
            println!("{}", yaml);
        }
        ConfigCommand::Set { key, value } => {
            set_value(&mut config, &key, &value)?;
            config.validate()?;
            config.save(config_path)?;
            println!("Set {} and saved to {}", key.green(), config_path);
        }
    }

    Ok(())
}

/// Applies a dotted-key update to the configuration
fn set_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "api.key" => config.api.key = value.to_string(),
        "api.base_url" => config.api.base_url = value.to_string(),
        "api.model" => config.api.model = value.to_string(),
        "api.temperature" => config.api.temperature = parse(key, value)?,
        "api.top_p" => config.api.top_p = parse(key, value)?,
        "api.max_output_tokens" => config.api.max_output_tokens = parse(key, value)?,
        "api.request_timeout_seconds" => config.api.request_timeout_seconds = parse(key, value)?,
        "context.window" => config.context.window = parse(key, value)?,
        "context.max_history" => config.context.max_history = parse(key, value)?,
        "cache.enabled" => config.cache.enabled = parse(key, value)?,
        "cache.ttl_days" => config.cache.ttl_days = parse(key, value)?,
        "web.port" => config.web.port = parse(key, value)?,
        "web.static_dir" => config.web.static_dir = value.to_string(),
        "prompt.path" => config.prompt.path = value.to_string(),
        other => {
            return Err(TalariaError::Config(format!("Unknown config key: {}", other)).into());
        }
    }
    Ok(())
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| TalariaError::Config(format!("Invalid value for {}: {}", key, value)).into())
}
