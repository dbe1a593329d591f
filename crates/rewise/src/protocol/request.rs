use serde::{Deserialize, Serialize};

/// A geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub lat: f64,
    pub lon: f64,
}

/// The single outbound frame of a processing run.
///
/// At least one of `text_description` or `image_url` should be present;
/// that is left to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_description: Option<String>,
    /// URI or data-encoded image payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_location: Option<GeoLocation>,
}

impl TaskRequest {
    pub fn from_description(description: impl Into<String>) -> Self {
        Self {
            text_description: Some(description.into()),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    pub fn with_location(mut self, location: GeoLocation) -> Self {
        self.user_location = Some(location);
        self
    }

    /// Returns true if the request carries neither a description nor an image.
    pub fn is_empty(&self) -> bool {
        let blank = |s: &Option<String>| s.as_deref().map_or(true, |v| v.trim().is_empty());
        blank(&self.text_description) && blank(&self.image_url)
    }
}
