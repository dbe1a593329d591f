use std::path::Path;

use crate::config::schema::ClientConfig;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ClientConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<ClientConfig, ConfigError> {
    let config: ClientConfig = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

pub fn validate_config(config: &ClientConfig) -> Result<(), ConfigError> {
    if !(config.endpoint.starts_with("ws://") || config.endpoint.starts_with("wss://")) {
        return Err(ConfigError::Validation {
            message: format!(
                "Endpoint '{}' must use the ws:// or wss:// scheme",
                config.endpoint
            ),
        });
    }

    if config.connect_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "connectTimeoutSecs must be greater than zero".to_string(),
        });
    }

    if config.geolocation.timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "geolocation.timeoutSecs must be greater than zero".to_string(),
        });
    }

    let fallback = &config.geolocation.fallback;
    if !(-90.0..=90.0).contains(&fallback.lat) || !(-180.0..=180.0).contains(&fallback.lon) {
        return Err(ConfigError::Validation {
            message: format!(
                "Fallback coordinate ({}, {}) is out of range",
                fallback.lat, fallback.lon
            ),
        });
    }

    if config.broadcast_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "broadcastCapacity must be greater than zero".to_string(),
        });
    }

    Ok(())
}
