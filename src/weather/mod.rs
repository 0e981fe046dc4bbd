//! Geocoding and forecast boundaries
//!
//! The inference pipeline talks to these traits only. [`open_meteo`] provides
//! the production implementation; tests substitute their own.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::Result;

pub mod open_meteo;

pub use open_meteo::OpenMeteoClient;

/// First directory match for a city name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub name: String,
    pub country: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

/// Forecast window for one location; both dates inclusive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Forecast payload. A section the service did not return stays `None`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ForecastResponse {
    pub daily: Option<DailySection>,
    pub hourly: Option<HourlySection>,
}

/// Parallel per-day arrays, aligned on `time`. Entries may be `null`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DailySection {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(rename = "temperature_2m_max", default)]
    pub temperature_max: Vec<Option<f64>>,
    #[serde(rename = "temperature_2m_min", default)]
    pub temperature_min: Vec<Option<f64>>,
    #[serde(rename = "precipitation_sum", default)]
    pub precipitation: Vec<Option<f64>>,
    #[serde(rename = "wind_speed_10m_max", alias = "windspeed_10m_max", default)]
    pub wind_speed_max: Vec<Option<f64>>,
    #[serde(rename = "cloudcover_mean", alias = "cloud_cover_mean", default)]
    pub cloud_cover_mean: Vec<Option<f64>>,
}

/// Parallel per-hour arrays, timestamps as `YYYY-MM-DDTHH:MM`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HourlySection {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(rename = "relativehumidity_2m", alias = "relative_humidity_2m", default)]
    pub relative_humidity: Vec<Option<f64>>,
}

/// Resolves free-text city names to coordinates
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` when the directory has no match
    async fn locate(&self, city: &str) -> Result<Option<GeoLocation>>;
}

/// Retrieves daily and hourly forecast fields for a location
#[async_trait]
pub trait ForecastProvider: Send + Sync {
    async fn forecast(&self, query: &ForecastQuery) -> Result<ForecastResponse>;
}
