use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::GeoLocation;

/// Processing endpoint of the reference deployment.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000/api/v1/tasks/ws/process";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub debug_logging: bool,
    #[serde(default)]
    pub geolocation: GeolocationConfig,
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_broadcast_capacity() -> usize {
    64
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Returns a copy pointing at a different endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            connect_timeout_secs: default_connect_timeout_secs(),
            debug_logging: true,
            geolocation: GeolocationConfig::default(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeolocationConfig {
    #[serde(default = "default_geolocation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_fallback")]
    pub fallback: GeoLocation,
}

fn default_geolocation_timeout_secs() -> u64 {
    10
}

fn default_fallback() -> GeoLocation {
    GeoLocation {
        lat: 39.9042,
        lon: 116.4074,
    }
}

impl GeolocationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_geolocation_timeout_secs(),
            fallback: default_fallback(),
        }
    }
}
