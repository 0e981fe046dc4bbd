//! `comfortcast` - Weather comfort scoring for trip planning
//!
//! A formula labels historical weather with a 0–100 comfort index, a
//! boosted-tree model learns that index, and the service scores each
//! forecast day of a requested city with the model.

pub mod api;
pub mod comfort;
pub mod config;
pub mod error;
pub mod features;
pub mod inference;
pub mod model;
pub mod telemetry;
pub mod training;
pub mod weather;
pub mod web;

// Re-export core types for public API
pub use comfort::compute_comfort_index;
pub use config::ComfortConfig;
pub use error::ComfortError;
pub use features::{FEATURE_NAMES, FeatureRow, WeatherObservation};
pub use inference::{ComfortService, DailyScoreResult, ScoreRequest};
pub use model::{BoosterParams, ComfortModel};
pub use training::TrainingReport;
pub use weather::{ForecastProvider, Geocoder, OpenMeteoClient};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, ComfortError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
