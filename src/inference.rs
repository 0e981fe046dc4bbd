//! Inference pipeline: city and date range in, one comfort score per day out
//!
//! Each request runs geocode → forecast → feature assembly → prediction in
//! order. Scores come from the fitted model only; the labeling formula is
//! never consulted here.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::Result;
use crate::error::ComfortError;
use crate::features::{
    DEFAULT_HUMIDITY_MAX, FeatureRow, RawFeatureRow, month_of, parse_iso_date,
};
use crate::model::ComfortModel;
use crate::weather::{
    DailySection, ForecastProvider, ForecastQuery, GeoLocation, Geocoder, HourlySection,
};

/// Wire form of a scoring request. Absent fields are rejected in [`ScoreRequest::validate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreRequest {
    pub city: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// A request that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRequest {
    pub city: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl ScoreRequest {
    pub fn new(
        city: impl Into<String>,
        start_date: impl Into<String>,
        end_date: impl Into<String>,
    ) -> Self {
        Self {
            city: Some(city.into()),
            start_date: Some(start_date.into()),
            end_date: Some(end_date.into()),
        }
    }

    pub fn validate(&self) -> Result<ValidRequest> {
        let present = |field: &Option<String>| {
            field
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let (Some(city), Some(start), Some(end)) = (
            present(&self.city),
            present(&self.start_date),
            present(&self.end_date),
        ) else {
            return Err(ComfortError::invalid_request(
                "city, start_date and end_date are required",
            ));
        };

        let parse = |name: &str, value: &str| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
                ComfortError::invalid_request(format!(
                    "{name} must be a YYYY-MM-DD date, got '{value}'"
                ))
            })
        };
        let start_date = parse("start_date", &start)?;
        let end_date = parse("end_date", &end)?;

        if start_date > end_date {
            return Err(ComfortError::invalid_request(format!(
                "start_date {start_date} is after end_date {end_date}"
            )));
        }

        Ok(ValidRequest {
            city,
            start_date,
            end_date,
        })
    }
}

/// Model score for one forecast day, echoing the features it was computed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyScoreResult {
    pub date: String,
    pub city: String,
    pub comfort_score: f64,
    #[serde(flatten)]
    pub features: FeatureRow,
}

/// Scores forecast days for a city with a shared, read-only model
#[derive(Clone)]
pub struct ComfortService {
    geocoder: Arc<dyn Geocoder>,
    forecaster: Arc<dyn ForecastProvider>,
    model: Arc<ComfortModel>,
}

impl ComfortService {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        forecaster: Arc<dyn ForecastProvider>,
        model: Arc<ComfortModel>,
    ) -> Self {
        Self {
            geocoder,
            forecaster,
            model,
        }
    }

    #[must_use]
    pub fn model(&self) -> &ComfortModel {
        &self.model
    }

    /// Score every forecast day between the two dates, in forecast order
    pub async fn score_city(
        &self,
        city: &str,
        start_date: &str,
        end_date: &str,
    ) -> Result<Vec<DailyScoreResult>> {
        self.score(&ScoreRequest::new(city, start_date, end_date)).await
    }

    #[instrument(skip(self, request), fields(city = request.city.as_deref().unwrap_or_default()))]
    pub async fn score(&self, request: &ScoreRequest) -> Result<Vec<DailyScoreResult>> {
        let request = request.validate()?;

        let location = self
            .geocoder
            .locate(&request.city)
            .await?
            .ok_or_else(|| ComfortError::upstream(format!("City '{}' not found", request.city)))?;

        let query = ForecastQuery {
            latitude: location.latitude,
            longitude: location.longitude,
            start_date: request.start_date,
            end_date: request.end_date,
        };
        let forecast = self.forecaster.forecast(&query).await?;

        let daily = forecast
            .daily
            .ok_or_else(|| ComfortError::upstream("Forecast response has no daily section"))?;
        let hourly = forecast
            .hourly
            .ok_or_else(|| ComfortError::upstream("Forecast response has no hourly section"))?;

        let rows = assemble_rows(&daily, &hourly, &location)?;
        debug!(days = rows.len(), "Assembled feature rows");

        let results: Vec<DailyScoreResult> = rows
            .into_iter()
            .map(|(date, features)| DailyScoreResult {
                comfort_score: self.model.predict(&features).clamp(0.0, 100.0),
                city: request.city.clone(),
                date,
                features,
            })
            .collect();

        info!(days = results.len(), "Scored forecast for {}", request.city);
        Ok(results)
    }
}

/// Maximum hourly humidity per calendar day. `null` readings are skipped.
///
/// The `time` and humidity arrays must be the same length.
fn daily_humidity_max(hourly: &HourlySection) -> Result<HashMap<NaiveDate, f64>> {
    if hourly.time.len() != hourly.relative_humidity.len() {
        return Err(ComfortError::upstream(format!(
            "Hourly arrays are misaligned: {} timestamps, {} humidity values",
            hourly.time.len(),
            hourly.relative_humidity.len()
        )));
    }

    let mut maxima: HashMap<NaiveDate, f64> = HashMap::new();
    for (timestamp, humidity) in hourly.time.iter().zip(&hourly.relative_humidity) {
        let date = parse_iso_date(timestamp).ok_or_else(|| {
            ComfortError::upstream(format!("Unparseable hourly timestamp '{timestamp}'"))
        })?;
        if let Some(value) = humidity.filter(|v| v.is_finite()) {
            maxima
                .entry(date)
                .and_modify(|max| *max = max.max(value))
                .or_insert(value);
        }
    }
    Ok(maxima)
}

/// One validated feature row per `daily.time` entry, in the same order
fn assemble_rows(
    daily: &DailySection,
    hourly: &HourlySection,
    location: &GeoLocation,
) -> Result<Vec<(String, FeatureRow)>> {
    let humidity = daily_humidity_max(hourly)?;
    let at = |values: &[Option<f64>], index: usize| values.get(index).copied().flatten();

    daily
        .time
        .iter()
        .enumerate()
        .map(|(index, date)| {
            let humidity_max = match parse_iso_date(date).and_then(|d| humidity.get(&d)) {
                Some(max) => *max,
                None => {
                    warn!(
                        "No hourly humidity for {}, falling back to {}",
                        date, DEFAULT_HUMIDITY_MAX
                    );
                    DEFAULT_HUMIDITY_MAX
                }
            };

            let raw = RawFeatureRow {
                temp_min: at(&daily.temperature_min, index),
                temp_max: at(&daily.temperature_max, index),
                precipitation: at(&daily.precipitation, index),
                humidity_max: Some(humidity_max),
                wind_max: at(&daily.wind_speed_max, index),
                lat: Some(location.latitude),
                lon: Some(location.longitude),
                cloudcover: at(&daily.cloud_cover_mean, index),
                month: month_of(date),
            };
            Ok((date.clone(), raw.validate(index, date)?))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Booster, Node, RegressionTree};
    use crate::weather::ForecastResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeGeocoder {
        location: Option<GeoLocation>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Geocoder for FakeGeocoder {
        async fn locate(&self, _city: &str) -> Result<Option<GeoLocation>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.location.clone())
        }
    }

    struct FakeForecast {
        response: ForecastResponse,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ForecastProvider for FakeForecast {
        async fn forecast(&self, _query: &ForecastQuery) -> Result<ForecastResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    fn miami() -> GeoLocation {
        GeoLocation {
            name: "Miami".to_string(),
            country: Some("United States".to_string()),
            latitude: 25.77,
            longitude: -80.19,
        }
    }

    fn two_days() -> ForecastResponse {
        ForecastResponse {
            daily: Some(DailySection {
                time: vec!["2025-04-01".to_string(), "2025-04-02".to_string()],
                temperature_max: vec![Some(82.0), Some(68.0)],
                temperature_min: vec![Some(71.0), Some(60.0)],
                precipitation: vec![Some(0.0), Some(1.0)],
                wind_speed_max: vec![Some(10.0), Some(12.0)],
                cloud_cover_mean: vec![Some(40.0), Some(60.0)],
            }),
            hourly: Some(HourlySection {
                time: vec![
                    "2025-04-01T00:00".to_string(),
                    "2025-04-01T12:00".to_string(),
                    "2025-04-02T00:00".to_string(),
                ],
                relative_humidity: vec![Some(65.0), Some(80.0), None],
            }),
        }
    }

    /// temp_max < 75 scores 80, everything else 30
    fn step_model() -> ComfortModel {
        let tree = RegressionTree::from_nodes(vec![
            Node::Split {
                feature: 1,
                threshold: 75.0,
                left: 1,
                right: 2,
            },
            Node::Leaf { value: 30.0 },
            Node::Leaf { value: -20.0 },
        ])
        .unwrap();
        ComfortModel::new(Booster::new(50.0, vec![tree]))
    }

    fn service_with(
        location: Option<GeoLocation>,
        response: ForecastResponse,
    ) -> (ComfortService, Arc<FakeGeocoder>, Arc<FakeForecast>) {
        let geocoder = Arc::new(FakeGeocoder {
            location,
            calls: AtomicUsize::new(0),
        });
        let forecaster = Arc::new(FakeForecast {
            response,
            calls: AtomicUsize::new(0),
        });
        let service = ComfortService::new(
            geocoder.clone(),
            forecaster.clone(),
            Arc::new(step_model()),
        );
        (service, geocoder, forecaster)
    }

    async fn score_two_days(service: &ComfortService) -> Result<Vec<DailyScoreResult>> {
        service.score_city("Miami", "2025-04-01", "2025-04-02").await
    }

    #[tokio::test]
    async fn test_scores_each_day_in_forecast_order() {
        let (service, _, _) = service_with(Some(miami()), two_days());
        let results = score_two_days(&service).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].date, "2025-04-01");
        assert_eq!(results[1].date, "2025-04-02");
        assert_eq!(results[0].city, "Miami");
        assert!((results[0].comfort_score - 30.0).abs() < 1e-9);
        assert!((results[1].comfort_score - 80.0).abs() < 1e-9);

        assert_eq!(results[0].features.humidity_max, 80.0);
        assert_eq!(results[0].features.month, 4);
        assert_eq!(results[0].features.lat, 25.77);
    }

    #[tokio::test]
    async fn test_missing_humidity_falls_back_to_default() {
        let (service, _, _) = service_with(Some(miami()), two_days());
        let results = score_two_days(&service).await.unwrap();
        assert_eq!(results[1].features.humidity_max, DEFAULT_HUMIDITY_MAX);
    }

    #[tokio::test]
    async fn test_invalid_requests_never_reach_adapters() {
        let (service, geocoder, forecaster) = service_with(Some(miami()), two_days());

        for request in [
            ScoreRequest {
                city: None,
                ..ScoreRequest::new("", "2025-04-01", "2025-04-02")
            },
            ScoreRequest::new("   ", "2025-04-01", "2025-04-02"),
            ScoreRequest {
                end_date: None,
                ..ScoreRequest::new("Miami", "2025-04-01", "")
            },
            ScoreRequest::new("Miami", "04/01/2025", "2025-04-02"),
            ScoreRequest::new("Miami", "2025-04-03", "2025-04-01"),
        ] {
            let err = service.score(&request).await.unwrap_err();
            let rejected = matches!(err, ComfortError::InvalidRequest { .. });
            assert!(rejected, "{request:?}");
        }

        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(forecaster.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_city_is_upstream_failure() {
        let (service, _, forecaster) = service_with(None, two_days());
        let err = score_two_days(&service).await.unwrap_err();
        assert!(matches!(err, ComfortError::UpstreamFailure { .. }));
        assert_eq!(forecaster.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_sections_are_upstream_failures() {
        let mut no_daily = two_days();
        no_daily.daily = None;
        let (no_daily_service, _, _) = service_with(Some(miami()), no_daily);
        let err = score_two_days(&no_daily_service).await.unwrap_err();
        assert!(matches!(err, ComfortError::UpstreamFailure { .. }));

        let mut no_hourly = two_days();
        no_hourly.hourly = None;
        let (no_hourly_service, _, _) = service_with(Some(miami()), no_hourly);
        let err = score_two_days(&no_hourly_service).await.unwrap_err();
        assert!(matches!(err, ComfortError::UpstreamFailure { .. }));
    }

    #[tokio::test]
    async fn test_null_daily_value_fails_validation() {
        let mut response = two_days();
        if let Some(daily) = response.daily.as_mut() {
            daily.temperature_max[1] = None;
            daily.cloud_cover_mean.truncate(1);
        }
        let (service, _, _) = service_with(Some(miami()), response);
        let err = score_two_days(&service).await.unwrap_err();

        match err {
            ComfortError::FeatureValidation { row, date, message } => {
                assert_eq!(row, 1);
                assert_eq!(date, "2025-04-02");
                assert!(message.contains("temp_max"));
                assert!(message.contains("cloudcover"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_bad_hourly_timestamp_is_upstream_failure() {
        let mut response = two_days();
        if let Some(hourly) = response.hourly.as_mut() {
            hourly.time[0] = "noon".to_string();
        }
        let (service, _, _) = service_with(Some(miami()), response);
        let err = score_two_days(&service).await.unwrap_err();
        assert!(matches!(err, ComfortError::UpstreamFailure { .. }));
    }

    #[test]
    fn test_misaligned_hourly_arrays_are_rejected() {
        let hourly = HourlySection {
            time: vec![
                "2025-04-01T00:00".to_string(),
                "2025-04-02T00:00".to_string(),
                "2025-04-02T12:00".to_string(),
            ],
            relative_humidity: vec![Some(90.0)],
        };
        let daily = two_days().daily.unwrap();

        let err = assemble_rows(&daily, &hourly, &miami()).unwrap_err();
        assert!(matches!(err, ComfortError::UpstreamFailure { .. }));
        assert!(err.to_string().contains("misaligned"));
    }

    #[tokio::test]
    async fn test_scores_are_clamped_to_index_range() {
        let geocoder = Arc::new(FakeGeocoder {
            location: Some(miami()),
            calls: AtomicUsize::new(0),
        });
        let forecaster = Arc::new(FakeForecast {
            response: two_days(),
            calls: AtomicUsize::new(0),
        });
        let model = ComfortModel::new(Booster::new(120.0, vec![RegressionTree::leaf(5.0)]));
        let service = ComfortService::new(geocoder, forecaster, Arc::new(model));

        let results = score_two_days(&service).await.unwrap();
        assert!(results.iter().all(|r| r.comfort_score == 100.0));
    }

    #[test]
    fn test_result_serializes_flat() {
        let result = DailyScoreResult {
            date: "2025-04-01".to_string(),
            city: "Miami".to_string(),
            comfort_score: 71.5,
            features: FeatureRow {
                temp_min: 71.0,
                temp_max: 82.0,
                precipitation: 0.0,
                humidity_max: 80.0,
                wind_max: 10.0,
                lat: 25.77,
                lon: -80.19,
                cloudcover: 40.0,
                month: 4,
            },
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["comfort_score"], 71.5);
        assert_eq!(json["temp_max"], 82.0);
        assert_eq!(json["month"], 4);
        assert!(json.get("features").is_none());
    }
}
