//! Labeling stage: attach formula comfort scores and months to historical rows

use std::path::Path;

use tracing::{info, instrument};

use super::dataset::{HistoricalRecord, LabeledRecord, line_of, read_records, write_records};
use crate::Result;
use crate::comfort::compute_comfort_index;

/// Label rows in order. The first malformed row aborts the whole batch.
pub fn label_records(records: &[HistoricalRecord]) -> Result<Vec<LabeledRecord>> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let observation = record.observation(line_of(index))?;
            Ok(LabeledRecord {
                date: record.date.clone(),
                temp_min: record.temp_min,
                temp_max: record.temp_max,
                precipitation: record.precipitation,
                humidity_max: record.humidity_max,
                wind_max: record.wind_max,
                cloudcover: record.cloudcover,
                lat: record.lat,
                lon: record.lon,
                month: observation.month,
                comfort_index: compute_comfort_index(&observation),
            })
        })
        .collect()
}

/// Read the historical file, label it and write the labeled file.
///
/// Returns the number of labeled rows.
#[instrument(
    skip_all,
    fields(input = %input.as_ref().display(), output = %output.as_ref().display())
)]
pub fn run(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Result<usize> {
    info!("Loading historical dataset");
    let records: Vec<HistoricalRecord> = read_records(&input)?;

    let labeled = label_records(&records)?;
    write_records(&output, &labeled)?;

    let mean = labeled.iter().map(|r| r.comfort_index).sum::<f64>() / labeled.len() as f64;
    info!(
        rows = labeled.len(),
        mean_comfort = mean,
        "Saved comfort-scored dataset"
    );
    Ok(labeled.len())
}
