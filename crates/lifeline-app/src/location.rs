//! Best-effort device location.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Stand-in address until someone types a better one.
    pub fn address(&self) -> String {
        format!("{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Geolocation is not supported by your browser")]
    Unsupported,

    #[error("Unable to get your location. Please enter it manually.")]
    Unavailable,
}

pub trait LocationProvider: Send + Sync {
    fn current_position(&self) -> impl Future<Output = Result<Coordinates, LocationError>> + Send;
}

/// A position the browser already resolved and sent along with the request.
/// `None` means the user denied the prompt or the lookup failed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportedPosition(pub Option<Coordinates>);

impl LocationProvider for ReportedPosition {
    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        self.0.ok_or(LocationError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_has_six_decimals() {
        let c = Coordinates { latitude: -33.4489, longitude: -70.669265 };
        assert_eq!(c.address(), "-33.448900, -70.669265");
    }
}
