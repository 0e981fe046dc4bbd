//! Persisted comfort model
//!
//! The artifact is a postcard-encoded [`ModelArtifact`]. It records the feature
//! names it was trained on, and loading refuses an artifact whose names differ
//! from [`FEATURE_NAMES`].

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::booster::Booster;
use crate::Result;
use crate::error::ComfortError;
use crate::features::{FEATURE_NAMES, FeatureRow};

const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct ModelArtifact {
    format_version: u32,
    feature_names: Vec<String>,
    trained_at: DateTime<Utc>,
    booster: Booster,
}

/// Read-only comfort model shared by all requests of a serving process
#[derive(Debug, Clone, PartialEq)]
pub struct ComfortModel {
    booster: Booster,
    trained_at: DateTime<Utc>,
}

impl ComfortModel {
    #[must_use]
    pub fn new(booster: Booster) -> Self {
        Self {
            booster,
            trained_at: Utc::now(),
        }
    }

    /// Load and validate an artifact.
    ///
    /// Every failure is a [`ComfortError::ModelLoad`]; a server must not start
    /// without a model.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| {
            ComfortError::model_load(format!(
                "cannot read model artifact {}: {e}",
                path.display()
            ))
        })?;

        let artifact: ModelArtifact = postcard::from_bytes(&bytes).map_err(|e| {
            ComfortError::model_load(format!(
                "model artifact {} is corrupt: {e}",
                path.display()
            ))
        })?;

        if artifact.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(ComfortError::model_load(format!(
                "unsupported artifact format version {} (expected {ARTIFACT_FORMAT_VERSION})",
                artifact.format_version
            )));
        }
        if artifact.feature_names.iter().map(String::as_str).ne(FEATURE_NAMES) {
            return Err(ComfortError::model_load(format!(
                "artifact was trained on features [{}], this build expects [{}]; retrain the model",
                artifact.feature_names.join(", "),
                FEATURE_NAMES.join(", ")
            )));
        }
        artifact
            .booster
            .check()
            .map_err(|e| ComfortError::model_load(format!("invalid model structure: {e}")))?;

        info!(
            path = %path.display(),
            trees = artifact.booster.tree_count(),
            trained_at = %artifact.trained_at,
            "Loaded comfort model"
        );

        Ok(Self {
            booster: artifact.booster,
            trained_at: artifact.trained_at,
        })
    }

    /// Write the artifact, replacing any previous one.
    ///
    /// The bytes go to a sibling temp file first and are renamed into place.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let artifact = ModelArtifact {
            format_version: ARTIFACT_FORMAT_VERSION,
            feature_names: FEATURE_NAMES.iter().map(ToString::to_string).collect(),
            trained_at: self.trained_at,
            booster: self.booster.clone(),
        };
        let bytes = postcard::to_stdvec(&artifact)
            .map_err(|e| ComfortError::training(format!("cannot encode model: {e}")))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file_name = path.file_name().ok_or_else(|| {
            ComfortError::training(format!("{} is not a file path", path.display()))
        })?;
        let mut temp_name = file_name.to_os_string();
        temp_name.push(".tmp");
        let temp_path = path.with_file_name(temp_name);

        fs::write(&temp_path, bytes)?;
        fs::rename(&temp_path, path)?;

        info!(
            path = %path.display(),
            trees = self.booster.tree_count(),
            "Saved comfort model"
        );
        Ok(())
    }

    #[must_use]
    pub fn predict(&self, row: &FeatureRow) -> f64 {
        self.booster.predict(&row.to_vector())
    }

    #[must_use]
    pub fn tree_count(&self) -> usize {
        self.booster.tree_count()
    }

    #[must_use]
    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }
}
