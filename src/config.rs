use crate::core::cluster::MIN_NEIGHBORS;
use crate::core::pipeline::default_concurrency;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Input directory does not exist: {path}")]
    MissingDirectory { path: PathBuf },

    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("Sensitivity must be between 0.0 and 1.0, got {value}")]
    SensitivityOutOfRange { value: f64 },

    #[error("Concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("min_neighbors must be at least 1")]
    ZeroMinNeighbors,
}

/// Settings for one clustering run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoclusterConfig {
    /// Directory scanned for images; groups are created inside it.
    pub input_dir: PathBuf,
    /// Maximum proportion of differing bits for two images to be neighbors.
    /// Lower is stricter.
    pub sensitivity: f64,
    pub concurrency: usize,
    pub min_neighbors: usize,
    pub dry_run: bool,
}

impl PhotoclusterConfig {
    pub fn new(input_dir: impl Into<PathBuf>, sensitivity: f64) -> Self {
        Self {
            input_dir: input_dir.into(),
            sensitivity,
            concurrency: default_concurrency().get(),
            min_neighbors: MIN_NEIGHBORS,
            dry_run: false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.input_dir.exists() {
            return Err(ConfigError::MissingDirectory {
                path: self.input_dir.clone(),
            });
        }
        if !self.input_dir.is_dir() {
            return Err(ConfigError::NotADirectory {
                path: self.input_dir.clone(),
            });
        }
        if !(0.0..=1.0).contains(&self.sensitivity) {
            return Err(ConfigError::SensitivityOutOfRange {
                value: self.sensitivity,
            });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.min_neighbors == 0 {
            return Err(ConfigError::ZeroMinNeighbors);
        }
        Ok(())
    }

    pub fn workers(&self) -> Result<NonZeroUsize, ConfigError> {
        NonZeroUsize::new(self.concurrency).ok_or(ConfigError::ZeroConcurrency)
    }
}
