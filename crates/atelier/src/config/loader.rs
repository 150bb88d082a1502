use std::path::Path;

use secrecy::SecretString;

use crate::config::schema::{AuthConfig, Config};
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Validation { message }
}

fn validate_url(field: &str, value: &Option<String>) -> Result<(), ConfigError> {
    if let Some(url) = value {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(invalid(format!("{} must be an http(s) URL: {}", field, url)));
        }
    }
    Ok(())
}

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(invalid(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    let board = &config.board;
    if board.sample_cap == 0 {
        return Err(invalid("board.sample_cap must be at least 1".to_string()));
    }
    if board.batch_size == 0 {
        return Err(invalid("board.batch_size must be at least 1".to_string()));
    }
    if board.max_fetch_items == 0 {
        return Err(invalid("board.max_fetch_items must be at least 1".to_string()));
    }
    if config.polling.interval_ms == 0 {
        return Err(invalid("polling.interval_ms must be at least 1".to_string()));
    }

    validate_url("analysis.endpoint", &config.analysis.endpoint)?;
    validate_url("auth.token_url", &config.auth.token_url)?;
    validate_url("board.pins_endpoint", &board.pins_endpoint)?;

    Ok(())
}

fn secret_from_env(name: &str) -> Option<SecretString> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(SecretString::from)
}

impl AuthConfig {
    /// ID token from the configured environment variable, if set.
    pub fn id_token(&self) -> Option<SecretString> {
        secret_from_env(&self.id_token_env)
    }

    /// Refresh token from the configured environment variable, if set.
    pub fn refresh_token(&self) -> Option<SecretString> {
        secret_from_env(&self.refresh_token_env)
    }

    pub fn board_token(&self) -> Option<SecretString> {
        secret_from_env(&self.board_token_env)
    }
}
