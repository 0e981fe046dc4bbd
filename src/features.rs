//! Feature schema shared by training and serving
//!
//! [`FEATURE_NAMES`] and [`FeatureRow::to_vector`] are the only place the model
//! input order is defined. The boosted-tree engine takes `[f64; FEATURE_COUNT]`,
//! so adding or removing a feature changes both pipelines at compile time and
//! requires a retrain.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::error::ComfortError;

/// Number of model input features
pub const FEATURE_COUNT: usize = 9;

/// Ordered model input features
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "temp_min",
    "temp_max",
    "precipitation",
    "humidity_max",
    "wind_max",
    "lat",
    "lon",
    "cloudcover",
    "month",
];

/// Humidity used when the forecast carries no hourly readings for a day
pub const DEFAULT_HUMIDITY_MAX: f64 = 50.0;

/// One day of weather, as seen by the comfort formula and the model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub temp_min: f64,
    pub temp_max: f64,
    pub precipitation: f64,
    pub humidity_max: f64,
    pub wind_max: f64,
    pub cloudcover: f64,
    pub lat: f64,
    pub lon: f64,
    pub month: u32,
}

impl WeatherObservation {
    #[must_use]
    pub fn feature_row(&self) -> FeatureRow {
        FeatureRow {
            temp_min: self.temp_min,
            temp_max: self.temp_max,
            precipitation: self.precipitation,
            humidity_max: self.humidity_max,
            wind_max: self.wind_max,
            lat: self.lat,
            lon: self.lon,
            cloudcover: self.cloudcover,
            month: self.month,
        }
    }
}

/// Validated model input. Field order mirrors [`FEATURE_NAMES`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub temp_min: f64,
    pub temp_max: f64,
    pub precipitation: f64,
    pub humidity_max: f64,
    pub wind_max: f64,
    pub lat: f64,
    pub lon: f64,
    pub cloudcover: f64,
    pub month: u32,
}

impl FeatureRow {
    /// Values in [`FEATURE_NAMES`] order
    #[must_use]
    pub fn to_vector(&self) -> [f64; FEATURE_COUNT] {
        [
            self.temp_min,
            self.temp_max,
            self.precipitation,
            self.humidity_max,
            self.wind_max,
            self.lat,
            self.lon,
            self.cloudcover,
            f64::from(self.month),
        ]
    }
}

/// A feature row as assembled from forecast data, before validation.
///
/// Forecast arrays may contain `null`s or be shorter than the `time` axis, so
/// every field is optional here and checked once in [`RawFeatureRow::validate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFeatureRow {
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub precipitation: Option<f64>,
    pub humidity_max: Option<f64>,
    pub wind_max: Option<f64>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub cloudcover: Option<f64>,
    pub month: Option<u32>,
}

impl RawFeatureRow {
    /// Check every field is present and finite.
    ///
    /// `row` and `date` only identify the offending row in the error.
    pub fn validate(&self, row: usize, date: &str) -> Result<FeatureRow> {
        let values = [
            self.temp_min,
            self.temp_max,
            self.precipitation,
            self.humidity_max,
            self.wind_max,
            self.lat,
            self.lon,
            self.cloudcover,
            self.month.map(f64::from),
        ];

        let invalid: Vec<&str> = FEATURE_NAMES
            .iter()
            .zip(values)
            .filter(|(_, value)| !value.is_some_and(f64::is_finite))
            .map(|(name, _)| *name)
            .collect();

        if !invalid.is_empty() {
            return Err(ComfortError::feature_validation(
                row,
                date,
                format!("missing or non-numeric values for: {}", invalid.join(", ")),
            ));
        }

        // Every field was checked above.
        let v = values.map(|value| value.unwrap_or_default());
        Ok(FeatureRow {
            temp_min: v[0],
            temp_max: v[1],
            precipitation: v[2],
            humidity_max: v[3],
            wind_max: v[4],
            lat: v[5],
            lon: v[6],
            cloudcover: v[7],
            month: self.month.unwrap_or_default(),
        })
    }
}

/// Parse the leading `YYYY-MM-DD` of a date or datetime string
#[must_use]
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    let day = value.trim().get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Calendar month (1-12) of a date or datetime string
#[must_use]
pub fn month_of(value: &str) -> Option<u32> {
    parse_iso_date(value).map(|date| date.month())
}
