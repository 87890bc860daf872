//! Error types for route handling and session control

use thiserror::Error;

/// Errors raised synchronously by the navigation core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NavigationError {
    /// Route is missing endpoints or carries malformed geometry
    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    /// Position fix has non-finite or out-of-range coordinates
    #[error("Invalid position: latitude {latitude}, longitude {longitude}")]
    InvalidPosition { latitude: f64, longitude: f64 },

    /// A configuration value is out of its allowed range
    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: &'static str, value: f64 },
}

impl From<serde_json::Error> for NavigationError {
    fn from(e: serde_json::Error) -> Self {
        NavigationError::InvalidRoute(e.to_string())
    }
}
