//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::PipeIqConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variables that override API credentials from the file.
pub const HELLOMOON_API_KEY_ENV: &str = "HELLOMOON_API_KEY";
pub const OPENROUTER_API_KEY_ENV: &str = "OPENROUTER_API_KEY";
pub const PRIME_INTELLECT_API_KEY_ENV: &str = "PRIME_INTELLECT_API_KEY";
pub const PERSONA_API_KEY_ENV: &str = "PERSONA_API_KEY";
pub const WORLDCOIN_APP_ID_ENV: &str = "WORLDCOIN_APP_ID";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
///
/// Credentials found in the environment take precedence over the file.
pub fn load_config(path: &Path) -> Result<PipeIqConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content, |name| std::env::var(name).ok())
}

/// Parse, apply overrides from `lookup` and validate.
pub fn parse_config<F>(content: &str, lookup: F) -> Result<PipeIqConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config: PipeIqConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    config.fill_default_base_urls();
    apply_env_overrides(&mut config, lookup);

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay credentials from the environment.
pub fn apply_env_overrides<F>(config: &mut PipeIqConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let keyed = [
        (HELLOMOON_API_KEY_ENV, &mut config.hellomoon.client.api_key),
        (OPENROUTER_API_KEY_ENV, &mut config.openrouter.client.api_key),
        (PRIME_INTELLECT_API_KEY_ENV, &mut config.prime_intellect.client.api_key),
        (PERSONA_API_KEY_ENV, &mut config.persona.client.api_key),
    ];
    for (name, slot) in keyed {
        if let Some(value) = lookup(name).filter(|v| !v.is_empty()) {
            tracing::debug!(env = name, "Using API key from environment");
            *slot = Some(value);
        }
    }

    if let Some(app_id) = lookup(WORLDCOIN_APP_ID_ENV).filter(|v| !v.is_empty()) {
        config.worldcoin.app_id = app_id;
    }
}
