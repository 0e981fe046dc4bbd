//! Hand-tuned comfort formula
//!
//! Used only to label historical observations for training. Serving always
//! goes through the fitted model.

use crate::features::WeatherObservation;

/// Comfortable temperature band, in the units of the input data
pub const GOLDEN_ZONE: (f64, f64) = (65.0, 78.0);

const TEMP_DECAY_SPAN: f64 = 25.0;
const HUMIDITY_BAND: (f64, f64) = (30.0, 60.0);
const WIND_CALM_KMH: f64 = 24.0;
const WIND_MAX_KMH: f64 = 48.0;
const CLOUD_IDEAL_PCT: f64 = 50.0;

const TEMP_WEIGHT: f64 = 0.40;
const RAIN_WEIGHT: f64 = 0.30;
const HUMIDITY_WEIGHT: f64 = 0.10;
const WIND_WEIGHT: f64 = 0.10;
const CLOUD_WEIGHT: f64 = 0.10;

pub fn temperature_score(temp: f64) -> f64 {
    let (low, high) = GOLDEN_ZONE;
    if (low..=high).contains(&temp) {
        return 1.0;
    }
    let distance = (temp - low).abs().min((temp - high).abs());
    (1.0 - distance / TEMP_DECAY_SPAN).max(0.0)
}

pub fn precipitation_score(precip_mm: f64) -> f64 {
    if precip_mm == 0.0 {
        1.0
    } else if precip_mm < 2.0 {
        0.6
    } else if precip_mm < 10.0 {
        0.3
    } else {
        0.0
    }
}

/// Both the "too dry" and "too humid" branches floor at 0.
pub fn humidity_score(humidity: f64) -> f64 {
    let (low, high) = HUMIDITY_BAND;
    if (low..=high).contains(&humidity) {
        1.0
    } else if humidity < low {
        (1.0 - (low - humidity) / 30.0).max(0.0)
    } else {
        (1.0 - (humidity - high) / 40.0).max(0.0)
    }
}

pub fn wind_score(wind_kmh: f64) -> f64 {
    if wind_kmh <= WIND_CALM_KMH {
        1.0
    } else if wind_kmh <= WIND_MAX_KMH {
        (1.0 - (wind_kmh - WIND_CALM_KMH) / (WIND_MAX_KMH - WIND_CALM_KMH)).max(0.0)
    } else {
        0.0
    }
}

pub fn cloud_score(cloud_pct: f64) -> f64 {
    (1.0 - (cloud_pct - CLOUD_IDEAL_PCT).abs() / CLOUD_IDEAL_PCT).max(0.0)
}

/// Weighted comfort index in [0, 100].
///
/// Temperature is scored on the daily maximum.
pub fn compute_comfort_index(observation: &WeatherObservation) -> f64 {
    let comfort = TEMP_WEIGHT * temperature_score(observation.temp_max)
        + RAIN_WEIGHT * precipitation_score(observation.precipitation)
        + HUMIDITY_WEIGHT * humidity_score(observation.humidity_max)
        + WIND_WEIGHT * wind_score(observation.wind_max)
        + CLOUD_WEIGHT * cloud_score(observation.cloudcover);

    comfort * 100.0
}
