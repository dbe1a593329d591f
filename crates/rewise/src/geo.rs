//! User location lookup with a bounded wait and a configurable fallback.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::GeolocationConfig;
use crate::protocol::GeoLocation;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    #[error("Location service unavailable: {0}")]
    Unavailable(String),

    #[error("Location permission denied")]
    Denied,
}

/// Source of the user's current position.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_location(&self) -> Result<GeoLocation, LocationError>;
}

/// Always reports the same coordinate.
pub struct FixedLocation(pub GeoLocation);

#[async_trait]
impl LocationProvider for FixedLocation {
    async fn current_location(&self) -> Result<GeoLocation, LocationError> {
        Ok(self.0)
    }
}

/// Reports that no location service exists.
pub struct NoLocation;

#[async_trait]
impl LocationProvider for NoLocation {
    async fn current_location(&self) -> Result<GeoLocation, LocationError> {
        Err(LocationError::Unavailable("no location service".to_string()))
    }
}

/// Asks `provider` for a position, falling back to the configured
/// coordinate on error, denial or timeout.
pub async fn resolve_location(
    provider: &dyn LocationProvider,
    config: &GeolocationConfig,
) -> GeoLocation {
    match tokio::time::timeout(config.timeout(), provider.current_location()).await {
        Ok(Ok(location)) => location,
        Ok(Err(e)) => {
            log::info!("Using fallback location: {}", e);
            config.fallback
        }
        Err(_) => {
            log::info!(
                "Using fallback location: no answer within {}s",
                config.timeout_secs
            );
            config.fallback
        }
    }
}
