//! Fitting stage: learn the comfort index from the labeled dataset

use std::path::Path;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{info, instrument};

use super::dataset::{LabeledRecord, line_of, read_records};
use crate::Result;
use crate::error::ComfortError;
use crate::features::FEATURE_COUNT;
use crate::model::{BoosterParams, ComfortModel, fit, rmse};

/// Share of rows held out for validation and early stopping
pub const VALIDATION_FRACTION: f64 = 0.2;

/// Summary of a fitting run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub rows: usize,
    pub train_rows: usize,
    pub validation_rows: usize,
    pub rounds_trained: usize,
    pub best_tree_count: usize,
    pub train_rmse: f64,
    pub validation_rmse: f64,
}

/// Deterministic shuffle split into (train, validation) row indices.
///
/// The validation side gets `ceil(n * fraction)` rows.
pub fn split_indices(n: usize, fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));

    let validation_len = ((n as f64) * fraction).ceil() as usize;
    let validation = indices.split_off(n - validation_len.min(n));
    (indices, validation)
}

/// Fit a model on labeled records without touching the filesystem
pub fn train(
    records: &[LabeledRecord],
    params: &BoosterParams,
) -> Result<(ComfortModel, TrainingReport)> {
    let mut features: Vec<[f64; FEATURE_COUNT]> = Vec::with_capacity(records.len());
    let mut labels = Vec::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let line = line_of(index);
        // month is re-derived from the date through the shared observation path
        let observation = record.historical().observation(line)?;
        if !(0.0..=100.0).contains(&record.comfort_index) {
            return Err(ComfortError::training(format!(
                "line {line}: comfort_index {} is outside [0, 100]",
                record.comfort_index
            )));
        }
        features.push(observation.feature_row().to_vector());
        labels.push(record.comfort_index);
    }

    let (train_idx, valid_idx) = split_indices(records.len(), VALIDATION_FRACTION, params.seed);
    if train_idx.is_empty() || valid_idx.is_empty() {
        return Err(ComfortError::training(format!(
            "need at least 2 labeled rows to split, got {}",
            records.len()
        )));
    }

    let pick_x = |idx: &[usize]| idx.iter().map(|&i| features[i]).collect::<Vec<_>>();
    let pick_y = |idx: &[usize]| idx.iter().map(|&i| labels[i]).collect::<Vec<_>>();
    let (train_x, train_y) = (pick_x(&train_idx), pick_y(&train_idx));
    let (valid_x, valid_y) = (pick_x(&valid_idx), pick_y(&valid_idx));

    let (booster, fit_report) = fit(params, &train_x, &train_y, &valid_x, &valid_y)?;

    let predict_all = |xs: &[[f64; FEATURE_COUNT]]| {
        xs.iter().map(|x| booster.predict(x)).collect::<Vec<_>>()
    };
    let train_rmse = rmse(&predict_all(&train_x), &train_y);
    let validation_rmse = rmse(&predict_all(&valid_x), &valid_y);

    let report = TrainingReport {
        rows: records.len(),
        train_rows: train_x.len(),
        validation_rows: valid_x.len(),
        rounds_trained: fit_report.rounds_trained,
        best_tree_count: fit_report.best_tree_count,
        train_rmse,
        validation_rmse,
    };
    Ok((ComfortModel::new(booster), report))
}

/// Read the labeled file, fit, and persist the artifact over any previous one.
///
/// Nothing is written unless fitting succeeds.
#[instrument(
    skip_all,
    fields(input = %input.as_ref().display(), artifact = %artifact.as_ref().display())
)]
pub fn run(
    input: impl AsRef<Path>,
    artifact: impl AsRef<Path>,
    params: &BoosterParams,
) -> Result<TrainingReport> {
    let records: Vec<LabeledRecord> = read_records(&input)?;
    info!(rows = records.len(), "Loaded labeled dataset");

    let (model, report) = train(&records, params)?;
    info!(
        best_trees = report.best_tree_count,
        train_rmse = report.train_rmse,
        validation_rmse = report.validation_rmse,
        "Model fitted"
    );

    model.save(&artifact)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureRow;
    use crate::training::{HistoricalRecord, labeling, write_records};

    fn synthetic_history(n: usize) -> Vec<HistoricalRecord> {
        (0..n)
            .map(|i| {
                let k = (i * 37) % 101;
                HistoricalRecord {
                    date: format!("2022-{:02}-{:02}", k % 12 + 1, k % 28 + 1),
                    temp_min: 35.0 + (k % 30) as f64,
                    temp_max: 50.0 + (k % 45) as f64,
                    precipitation: [0.0, 0.0, 1.0, 4.0, 12.0][k % 5],
                    humidity_max: 20.0 + ((k * 7) % 75) as f64,
                    wind_max: ((k * 3) % 60) as f64,
                    cloudcover: ((k * 11) % 101) as f64,
                    lat: 40.0 + (k % 3) as f64,
                    lon: -3.0 - (k % 4) as f64,
                }
            })
            .collect()
    }

    fn quick_params() -> BoosterParams {
        BoosterParams {
            n_estimators: 400,
            learning_rate: 0.2,
            min_child_weight: 2.0,
            early_stopping_rounds: 30,
            ..BoosterParams::default()
        }
    }

    #[test]
    fn test_split_is_deterministic_and_disjoint() {
        let (train_a, valid_a) = split_indices(101, VALIDATION_FRACTION, 42);
        let (train_b, valid_b) = split_indices(101, VALIDATION_FRACTION, 42);
        assert_eq!((train_a.clone(), valid_a.clone()), (train_b, valid_b));
        assert_eq!(valid_a.len(), 21);
        assert_eq!(train_a.len(), 80);

        let mut all: Vec<usize> = train_a.into_iter().chain(valid_a).collect();
        all.sort_unstable();
        assert_eq!(all, (0..101).collect::<Vec<_>>());
    }

    #[test]
    fn test_train_needs_two_rows() {
        let labeled = labeling::label_records(&synthetic_history(1)).unwrap();
        assert!(train(&labeled, &quick_params()).is_err());
    }

    #[test]
    fn test_train_rejects_out_of_range_labels() {
        let mut labeled = labeling::label_records(&synthetic_history(10)).unwrap();
        labeled[4].comfort_index = 140.0;
        let err = train(&labeled, &quick_params()).unwrap_err();
        assert!(err.to_string().contains("line 6"));
    }

    #[test]
    fn test_end_to_end_training_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("historical_weather_master.csv");
        let scored = dir.path().join("historical_weather_scored.csv");
        let artifact = dir.path().join("models").join("comfort_model.bin");

        let history = synthetic_history(300);
        write_records(&raw, &history).unwrap();
        labeling::run(&raw, &scored).unwrap();

        let report = run(&scored, &artifact, &quick_params()).unwrap();
        assert_eq!(report.rows, 300);
        assert_eq!(report.validation_rows, 60);
        assert!(report.validation_rmse.is_finite());
        assert!(report.best_tree_count >= 1);

        let reloaded = ComfortModel::load(&artifact).unwrap();
        assert_eq!(reloaded.tree_count(), report.best_tree_count);
    }

    #[test]
    fn test_saved_model_predicts_like_fitted_model() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("comfort_model.bin");
        let labeled = labeling::label_records(&synthetic_history(200)).unwrap();

        let (fitted, report) = train(&labeled, &quick_params()).unwrap();
        fitted.save(&artifact).unwrap();
        let reloaded = ComfortModel::load(&artifact).unwrap();

        assert_eq!(reloaded, fitted);
        assert_eq!(reloaded.tree_count(), report.best_tree_count);
        for record in &labeled {
            let row: FeatureRow = record.historical().observation(0).unwrap().feature_row();
            let expected = fitted.predict(&row);
            assert_eq!(reloaded.predict(&row).to_bits(), expected.to_bits());
        }
    }

    #[test]
    fn test_failed_training_leaves_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let scored = dir.path().join("scored.csv");
        let artifact = dir.path().join("comfort_model.bin");
        let mut labeled = labeling::label_records(&synthetic_history(5)).unwrap();
        labeled[0].date = "not a date".to_string();
        write_records(&scored, &labeled).unwrap();

        assert!(run(&scored, &artifact, &quick_params()).is_err());
        assert!(!artifact.exists());
    }
}
