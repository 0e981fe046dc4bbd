//! CSV datasets consumed and produced by the training stages

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::error::ComfortError;
use crate::features::{WeatherObservation, month_of};

/// One row of the historical weather file. Extra columns are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub date: String,
    pub temp_min: f64,
    pub temp_max: f64,
    pub precipitation: f64,
    pub humidity_max: f64,
    pub wind_max: f64,
    pub cloudcover: f64,
    pub lat: f64,
    pub lon: f64,
}

impl HistoricalRecord {
    /// Typed observation with `month` derived from `date`.
    ///
    /// `line` is the 1-based file line, used in error messages.
    pub fn observation(&self, line: usize) -> Result<WeatherObservation> {
        let month = month_of(&self.date).ok_or_else(|| {
            ComfortError::training(format!("line {line}: unparseable date '{}'", self.date))
        })?;

        let observation = WeatherObservation {
            temp_min: self.temp_min,
            temp_max: self.temp_max,
            precipitation: self.precipitation,
            humidity_max: self.humidity_max,
            wind_max: self.wind_max,
            cloudcover: self.cloudcover,
            lat: self.lat,
            lon: self.lon,
            month,
        };
        if !observation.feature_row().to_vector().iter().all(|v| v.is_finite()) {
            return Err(ComfortError::training(format!(
                "line {line}: non-finite weather values"
            )));
        }
        Ok(observation)
    }
}

/// Historical row augmented by the labeling stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRecord {
    pub date: String,
    pub temp_min: f64,
    pub temp_max: f64,
    pub precipitation: f64,
    pub humidity_max: f64,
    pub wind_max: f64,
    pub cloudcover: f64,
    pub lat: f64,
    pub lon: f64,
    pub month: u32,
    pub comfort_index: f64,
}

impl LabeledRecord {
    #[must_use]
    pub fn historical(&self) -> HistoricalRecord {
        HistoricalRecord {
            date: self.date.clone(),
            temp_min: self.temp_min,
            temp_max: self.temp_max,
            precipitation: self.precipitation,
            humidity_max: self.humidity_max,
            wind_max: self.wind_max,
            cloudcover: self.cloudcover,
            lat: self.lat,
            lon: self.lon,
        }
    }
}

/// Line number of the `index`-th data row (header is line 1)
pub(crate) fn line_of(index: usize) -> usize {
    index + 2
}

/// Read every row of a headered CSV file. Any bad row aborts the read.
pub fn read_records<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| ComfortError::training(format!("cannot open {}: {e}", path.display())))?;

    let mut records = Vec::new();
    for (index, row) in reader.deserialize().enumerate() {
        let record = row.map_err(|e| {
            ComfortError::training(format!(
                "{} line {}: {e}",
                path.display(),
                line_of(index)
            ))
        })?;
        records.push(record);
    }

    if records.is_empty() {
        return Err(ComfortError::training(format!(
            "{} contains no data rows",
            path.display()
        )));
    }
    Ok(records)
}

pub fn write_records<T: Serialize>(path: impl AsRef<Path>, records: &[T]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let to_training_error =
        |e: csv::Error| ComfortError::training(format!("cannot write {}: {e}", path.display()));
    let mut writer = csv::Writer::from_path(path).map_err(to_training_error)?;
    for record in records {
        writer.serialize(record).map_err(to_training_error)?;
    }
    writer.flush()?;
    Ok(())
}
