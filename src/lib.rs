//! Group visually similar photos.
//!
//! Each image gets a 64-bit perceptual fingerprint; fingerprints are
//! clustered with DBSCAN over normalized Hamming distance and every cluster
//! is moved into its own `group_<id>` directory. Images that resemble nothing
//! else are left in place.

pub mod config;
pub mod core;
pub mod services;

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

pub use crate::config::{ConfigError, PhotoclusterConfig};
use crate::core::{ClusterAssignment, ClusterSummary, DensityClusterer, HasherRegistry};
use crate::services::GroupReport;

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub assignments: Vec<ClusterAssignment>,
    pub summary: ClusterSummary,
    pub groups: GroupReport,
}

/// Hooks for reporting progress of a run. Every method defaults to a no-op.
pub trait RunObserver: Sync {
    fn scan_started(&self, _dir: &Path) {}

    fn scan_finished(&self, _images: usize) {}

    /// Called from worker threads with the number of images fingerprinted so far.
    fn image_hashed(&self, _completed: usize) {}

    fn hashing_finished(&self) {}
}

impl RunObserver for () {}

/// Scan, fingerprint and cluster `config.input_dir` without touching any file.
pub fn cluster_directory(
    config: &PhotoclusterConfig,
    registry: &HasherRegistry,
) -> Result<Vec<ClusterAssignment>> {
    cluster_directory_with(config, registry, &())
}

/// Like [`cluster_directory`], reporting progress to `observer`.
pub fn cluster_directory_with(
    config: &PhotoclusterConfig,
    registry: &HasherRegistry,
    observer: &dyn RunObserver,
) -> Result<Vec<ClusterAssignment>> {
    config.validate()?;
    let clusterer = DensityClusterer::new(config.sensitivity, config.min_neighbors)?;

    log::info!("Scanning directory for images: {}", config.input_dir.display());
    observer.scan_started(&config.input_dir);
    let paths = services::find_image_files(&config.input_dir, registry);
    observer.scan_finished(paths.as_ref().map_or(0, Vec::len));
    let paths = paths?;
    if paths.is_empty() {
        log::warn!("No image files found in directory");
    }

    let records = crate::core::compute_with_progress(
        &paths,
        config.workers()?,
        |path| registry.hash(path),
        |completed| observer.image_hashed(completed),
    );
    observer.hashing_finished();
    let records = records.context("Failed to fingerprint images")?;

    Ok(clusterer.cluster(&records)?)
}

/// Cluster the images in `config.input_dir` and move each cluster into its
/// own `group_<id>` subdirectory.
pub fn photocluster(config: &PhotoclusterConfig) -> Result<RunReport> {
    photocluster_with(config, &())
}

/// Like [`photocluster`], reporting progress to `observer`.
pub fn photocluster_with(
    config: &PhotoclusterConfig,
    observer: &dyn RunObserver,
) -> Result<RunReport> {
    let registry = HasherRegistry::default();
    let assignments = cluster_directory_with(config, &registry, observer)?;
    let summary = ClusterSummary::from_assignments(&assignments);

    let groups = services::group_image_files(&assignments, &config.input_dir, config.dry_run)
        .with_context(|| format!("Failed to group images in {}", config.input_dir.display()))?;

    Ok(RunReport {
        assignments,
        summary,
        groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash::tests::create_test_image;
    use crate::core::{FingerprintError, Label, PipelineError};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[test]
    fn test_photocluster_groups_duplicates() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_image(&root.join("a.png"), 2);
        fs::copy(root.join("a.png"), root.join("b.png")).unwrap();
        create_test_image(&root.join("c.png"), 2);

        let mut config = PhotoclusterConfig::new(root, 0.0);
        config.concurrency = 2;
        let report = photocluster(&config).unwrap();

        assert_eq!(report.assignments.len(), 3);
        assert_eq!(report.summary.clusters, 1);
        assert_eq!(report.groups.moves.len(), 3);
        assert!(root.join("group_0/a.png").exists());
        assert!(root.join("group_0/b.png").exists());
        assert!(root.join("group_0/c.png").exists());
    }

    #[test]
    fn test_single_image_is_left_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_image(&root.join("only.jpg"), 1);

        let report = photocluster(&PhotoclusterConfig::new(root, 0.3)).unwrap();

        assert_eq!(report.assignments[0].label, Label::Noise);
        assert!(report.groups.moves.is_empty());
        assert!(root.join("only.jpg").exists());
    }

    #[test]
    fn test_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let report = photocluster(&PhotoclusterConfig::new(temp_dir.path(), 0.1)).unwrap();
        assert!(report.assignments.is_empty());
        assert_eq!(report.summary, ClusterSummary::default());
    }

    #[test]
    fn test_corrupt_image_aborts_before_moving() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_image(&root.join("a.png"), 3);
        fs::copy(root.join("a.png"), root.join("b.png")).unwrap();
        fs::write(root.join("broken.jpg"), b"garbage").unwrap();

        let err = photocluster(&PhotoclusterConfig::new(root, 0.1)).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Fingerprint(FingerprintError::Decode { .. }))
        ));
        assert!(root.join("a.png").exists());
        assert!(!root.join("group_0").exists());
    }

    #[test]
    fn test_invalid_sensitivity_is_a_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = photocluster(&PhotoclusterConfig::new(temp_dir.path(), 1.5)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::SensitivityOutOfRange { .. })
        ));
    }

    #[test]
    fn test_dry_run_reports_without_moving() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        create_test_image(&root.join("a.jpg"), 4);
        fs::copy(root.join("a.jpg"), root.join("b.jpg")).unwrap();

        let mut config = PhotoclusterConfig::new(root, 0.0);
        config.dry_run = true;
        let report = photocluster(&config).unwrap();

        assert_eq!(report.groups.moves.len(), 2);
        assert!(root.join("a.jpg").exists());
        assert!(!root.join("group_0").exists());
    }

    #[derive(Default)]
    struct CountingObserver {
        scanned: AtomicUsize,
        hashed: AtomicUsize,
        finished: AtomicUsize,
    }

    impl RunObserver for CountingObserver {
        fn scan_finished(&self, images: usize) {
            self.scanned.store(images, Ordering::SeqCst);
        }

        fn image_hashed(&self, _completed: usize) {
            self.hashed.fetch_add(1, Ordering::SeqCst);
        }

        fn hashing_finished(&self) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_observer_sees_scan_and_hash_progress() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for i in 0..3 {
            create_test_image(&root.join(format!("img{}.png", i)), i);
        }

        let observer = CountingObserver::default();
        let mut config = PhotoclusterConfig::new(root, 0.1);
        config.dry_run = true;
        let report = photocluster_with(&config, &observer).unwrap();

        assert_eq!(report.assignments.len(), 3);
        assert_eq!(observer.scanned.load(Ordering::SeqCst), 3);
        assert_eq!(observer.hashed.load(Ordering::SeqCst), 3);
        assert_eq!(observer.finished.load(Ordering::SeqCst), 1);
    }
}
