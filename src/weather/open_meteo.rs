//! Open-Meteo geocoding and forecast client
//!
//! Transient failures (connection errors, timeouts, 5xx, 429) are retried with
//! exponential backoff. Each adapter call is bounded by an overall deadline that
//! covers every retry. Whatever goes wrong surfaces as an upstream failure.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::RetryTransientMiddleware;
use reqwest_retry::policies::ExponentialBackoff;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use super::{ForecastProvider, ForecastQuery, ForecastResponse, GeoLocation, Geocoder};
use crate::Result;
use crate::config::WeatherConfig;
use crate::error::ComfortError;

const DAILY_FIELDS: &str =
    "temperature_2m_max,temperature_2m_min,precipitation_sum,wind_speed_10m_max,cloudcover_mean";
const HOURLY_FIELDS: &str = "relativehumidity_2m";
/// Units of the historical dataset the model is trained on
const UNITS: &str = "temperature_unit=fahrenheit&wind_speed_unit=kmh&precipitation_unit=mm";

const MIN_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Option<Vec<GeocodingResult>>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResult {
    name: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    country: Option<String>,
}

/// Error body Open-Meteo returns alongside 4xx statuses
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    reason: String,
}

/// HTTP client for the Open-Meteo geocoding and forecast APIs
#[derive(Clone)]
pub struct OpenMeteoClient {
    client: ClientWithMiddleware,
    geocoding_url: String,
    forecast_url: String,
    call_deadline: Duration,
}

impl OpenMeteoClient {
    pub fn new(config: &WeatherConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_seconds.into());

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("comfortcast/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ComfortError::config(format!("Failed to create HTTP client: {e}")))?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(MIN_BACKOFF, MAX_BACKOFF)
            .build_with_max_retries(config.max_retries);

        let client = ClientBuilder::new(http)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            geocoding_url: config.geocoding_url.trim_end_matches('/').to_string(),
            forecast_url: config.forecast_url.trim_end_matches('/').to_string(),
            call_deadline: Duration::from_secs(config.call_deadline_seconds.into()),
        })
    }

    fn geocoding_request_url(&self, city: &str) -> String {
        format!(
            "{}/search?name={}&count=1&language=en&format=json",
            self.geocoding_url,
            urlencoding::encode(city)
        )
    }

    fn forecast_request_url(&self, query: &ForecastQuery) -> String {
        format!(
            "{}/forecast?latitude={}&longitude={}&daily={DAILY_FIELDS}&hourly={HOURLY_FIELDS}\
             &start_date={}&end_date={}&timezone=auto&{UNITS}",
            self.forecast_url,
            query.latitude,
            query.longitude,
            query.start_date.format("%Y-%m-%d"),
            query.end_date.format("%Y-%m-%d"),
        )
    }

    /// GET a JSON document, bounded by the call deadline
    async fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        debug!("Open-Meteo request URL: {}", url);
        let start = Instant::now();

        let result = tokio::time::timeout(self.call_deadline, self.fetch(url, what)).await;
        let elapsed = start.elapsed().as_secs_f64();

        match result {
            Ok(Ok(value)) => {
                debug!("{} request completed in {:.3}s", what, elapsed);
                Ok(value)
            }
            Ok(Err(e)) => {
                warn!("{} request failed after {:.3}s: {}", what, elapsed, e);
                Err(e)
            }
            Err(_) => {
                warn!(
                    "{} request exceeded deadline of {:?}",
                    what, self.call_deadline
                );
                Err(ComfortError::upstream(format!(
                    "{what} service did not answer within {}s",
                    self.call_deadline.as_secs()
                )))
            }
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ComfortError::upstream(format!("{what} service unavailable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let reason = response
                .json::<ApiErrorBody>()
                .await
                .map(|body| body.reason)
                .unwrap_or_else(|_| status.to_string());
            let message = format!("{what} service returned HTTP {status}: {reason}");
            // 429 and 5xx were already retried by the middleware and may clear later
            let rejected = status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS;
            return Err(if rejected {
                ComfortError::upstream_rejected(message)
            } else {
                ComfortError::upstream(message)
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ComfortError::upstream(format!("Invalid {what} response: {e}")))
    }
}

#[async_trait]
impl Geocoder for OpenMeteoClient {
    #[instrument(skip(self))]
    async fn locate(&self, city: &str) -> Result<Option<GeoLocation>> {
        let url = self.geocoding_request_url(city);
        let response: GeocodingResponse = self.get_json(&url, "Geocoding").await?;

        let location = response
            .results
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(|r| GeoLocation {
                name: r.name,
                country: r.country,
                latitude: r.latitude,
                longitude: r.longitude,
            });

        match &location {
            Some(found) => info!(
                "Resolved '{}' to {} ({:.4}, {:.4})",
                city, found.name, found.latitude, found.longitude
            ),
            None => warn!("No geocoding results for '{}'", city),
        }
        Ok(location)
    }
}

#[async_trait]
impl ForecastProvider for OpenMeteoClient {
    #[instrument(skip(self), fields(lat = query.latitude, lon = query.longitude))]
    async fn forecast(&self, query: &ForecastQuery) -> Result<ForecastResponse> {
        let url = self.forecast_request_url(query);
        let response: ForecastResponse = self.get_json(&url, "Forecast").await?;
        debug!(
            days = response.daily.as_ref().map_or(0, |d| d.time.len()),
            hours = response.hourly.as_ref().map_or(0, |h| h.time.len()),
            "Forecast received"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn client() -> OpenMeteoClient {
        OpenMeteoClient::new(&WeatherConfig::default()).unwrap()
    }

    #[test]
    fn test_geocoding_url_encodes_city() {
        let url = client().geocoding_request_url("São Paulo");
        assert_eq!(
            url,
            "https://geocoding-api.open-meteo.com/v1/search\
             ?name=S%C3%A3o%20Paulo&count=1&language=en&format=json"
        );
    }

    #[test]
    fn test_forecast_url_carries_window_and_units() {
        let query = ForecastQuery {
            latitude: 25.77,
            longitude: -80.19,
            start_date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 4, 3).unwrap(),
        };
        let url = client().forecast_request_url(&query);
        let base = "https://api.open-meteo.com/v1/forecast?latitude=25.77&longitude=-80.19";
        assert!(url.starts_with(base));
        assert!(url.contains("start_date=2025-04-01&end_date=2025-04-03"));
        assert!(url.contains("daily=temperature_2m_max,"));
        assert!(url.contains("hourly=relativehumidity_2m"));
        assert!(url.contains("temperature_unit=fahrenheit"));
        assert!(url.contains("wind_speed_unit=kmh&precipitation_unit=mm"));
        assert!(url.contains("timezone=auto"));
    }

    #[test]
    fn test_base_url_trailing_slash_is_ignored() {
        let config = WeatherConfig {
            forecast_url: "http://localhost:9999/v1/".to_string(),
            ..WeatherConfig::default()
        };
        let client = OpenMeteoClient::new(&config).unwrap();
        assert_eq!(client.forecast_url, "http://localhost:9999/v1");
    }
}
