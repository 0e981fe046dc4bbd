//! Offline training pipeline
//!
//! Two stages, each runnable on its own:
//! - [`labeling`]: historical CSV → labeled CSV (`month`, `comfort_index`)
//! - [`fitting`]: labeled CSV → boosted-tree artifact
//!
//! Both stages are fatal on malformed input and never write partial output.

pub mod dataset;
pub mod fitting;
pub mod labeling;

pub use dataset::{HistoricalRecord, LabeledRecord, read_records, write_records};
pub use fitting::{TrainingReport, split_indices, train};
