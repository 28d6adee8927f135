use crate::core::fingerprint::{Fingerprint, FingerprintRecord};
use crate::core::hash::{FingerprintError, HasherRegistry};
use rayon::prelude::*;
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

const MIN_WORKERS: usize = 1;
const MAX_WORKERS: usize = 8;
const CPU_USAGE_RATIO: f64 = 0.75;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),

    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Worker count used when the caller does not pick one: 75% of the logical
/// CPUs, clamped to `[1, 8]`.
pub fn default_concurrency() -> NonZeroUsize {
    let cpu_count = num_cpus::get();
    let workers = ((cpu_count as f64 * CPU_USAGE_RATIO) as usize).clamp(MIN_WORKERS, MAX_WORKERS);
    log::debug!("Detected {} CPU cores, using {} workers", cpu_count, workers);
    NonZeroUsize::new(workers).unwrap_or(NonZeroUsize::MIN)
}

/// Fingerprint every identifier on a pool of `concurrency` workers.
///
/// The output is in input order. The first failure aborts the batch and no
/// records are returned; items already running on other workers finish but
/// their results are dropped.
pub fn compute<I, F>(
    identifiers: &[I],
    concurrency: NonZeroUsize,
    fingerprint: F,
) -> Result<Vec<FingerprintRecord<I>>, PipelineError>
where
    I: Clone + Send + Sync + fmt::Debug,
    F: Fn(&I) -> Result<Fingerprint, FingerprintError> + Sync,
{
    compute_with_progress(identifiers, concurrency, fingerprint, |_| {})
}

/// Like [`compute`], calling `progress` with the number of completed items
/// after each one finishes.
pub fn compute_with_progress<I, F, P>(
    identifiers: &[I],
    concurrency: NonZeroUsize,
    fingerprint: F,
    progress: P,
) -> Result<Vec<FingerprintRecord<I>>, PipelineError>
where
    I: Clone + Send + Sync + fmt::Debug,
    F: Fn(&I) -> Result<Fingerprint, FingerprintError> + Sync,
    P: Fn(usize) + Sync,
{
    if identifiers.is_empty() {
        log::warn!("No images to fingerprint");
        return Ok(Vec::new());
    }

    log::info!(
        "Computing fingerprints for {} images using {} workers",
        identifiers.len(),
        concurrency
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(concurrency.get())
        .thread_name(|i| format!("photocluster-hash-{}", i))
        .build()?;

    let completed = AtomicUsize::new(0);

    let records = pool.install(|| {
        identifiers
            .par_iter()
            .map(|identifier| {
                let fingerprint = run_isolated(identifier, &fingerprint)?;
                progress(completed.fetch_add(1, Ordering::Relaxed) + 1);
                Ok(FingerprintRecord::new(identifier.clone(), fingerprint))
            })
            .collect::<Result<Vec<_>, FingerprintError>>()
    })?;

    log::info!("Successfully computed {} fingerprints", records.len());
    Ok(records)
}

/// Fingerprint image files with the registered hashers.
pub fn compute_hashes(
    paths: &[PathBuf],
    concurrency: NonZeroUsize,
    registry: &HasherRegistry,
) -> Result<Vec<FingerprintRecord>, PipelineError> {
    compute(paths, concurrency, |path| registry.hash(path))
}

// A panicking fingerprint function fails its item instead of tearing down the pool.
fn run_isolated<I, F>(identifier: &I, fingerprint: &F) -> Result<Fingerprint, FingerprintError>
where
    I: fmt::Debug,
    F: Fn(&I) -> Result<Fingerprint, FingerprintError>,
{
    panic::catch_unwind(AssertUnwindSafe(|| fingerprint(identifier))).unwrap_or_else(|_| {
        Err(FingerprintError::Panicked {
            identifier: format!("{:?}", identifier),
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash::tests::create_test_image;
    use crate::core::hash::FINGERPRINT_BITS;
    use std::fs;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    fn workers(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn bits_of(n: u8) -> Fingerprint {
        Fingerprint::from_bytes(&[n], 8)
    }

    #[test]
    fn test_empty_input_skips_workers() {
        let calls = AtomicUsize::new(0);
        let records = compute(&Vec::<u8>::new(), workers(4), |n| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(bits_of(*n))
        })
        .unwrap();

        assert!(records.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_output_preserves_input_order() {
        let ids: Vec<u8> = (0..32).collect();
        let records = compute(&ids, workers(4), |n| {
            // Early items finish last.
            thread::sleep(Duration::from_millis(u64::from(32 - *n)));
            Ok(bits_of(*n))
        })
        .unwrap();

        assert_eq!(records.len(), ids.len());
        for (record, id) in records.iter().zip(&ids) {
            assert_eq!(record.identifier, *id);
            assert_eq!(record.fingerprint, bits_of(*id));
        }
    }

    #[test]
    fn test_pool_uses_requested_concurrency() {
        let seen = Mutex::new(Vec::new());
        compute(&[1u8, 2, 3], workers(3), |n| {
            seen.lock().unwrap().push(rayon::current_num_threads());
            Ok(bits_of(*n))
        })
        .unwrap();

        assert!(seen.into_inner().unwrap().iter().all(|&n| n == 3));
    }

    #[test]
    fn test_single_failure_aborts_batch() {
        let ids: Vec<u8> = (0..20).collect();
        let result = compute(&ids, workers(2), |n| {
            if *n == 7 {
                Err(FingerprintError::Unsupported {
                    identifier: n.to_string(),
                })
            } else {
                Ok(bits_of(*n))
            }
        });

        match result {
            Err(PipelineError::Fingerprint(err)) => assert_eq!(err.identifier(), "7"),
            other => panic!("expected fingerprint error, got {:?}", other),
        }
    }

    #[test]
    fn test_panic_is_reported_as_fingerprint_error() {
        let result = compute(&[1u8, 2], workers(1), |n| {
            if *n == 2 {
                panic!("decoder blew up");
            }
            Ok(bits_of(*n))
        });

        assert!(matches!(
            result,
            Err(PipelineError::Fingerprint(FingerprintError::Panicked { .. }))
        ));
    }

    #[test]
    fn test_progress_reports_every_item() {
        let ids: Vec<u8> = (0..10).collect();
        let reports = Mutex::new(Vec::new());
        compute_with_progress(&ids, workers(3), |n| Ok(bits_of(*n)), |done| {
            reports.lock().unwrap().push(done)
        })
        .unwrap();

        let mut reports = reports.into_inner().unwrap();
        reports.sort_unstable();
        assert_eq!(reports, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_compute_hashes_over_image_files() {
        let temp_dir = TempDir::new().unwrap();
        let mut paths = Vec::new();
        for i in 0..5 {
            let path = temp_dir.path().join(format!("img{}.jpg", i));
            create_test_image(&path, i);
            paths.push(path);
        }

        let records = compute_hashes(&paths, workers(2), &HasherRegistry::default()).unwrap();

        assert_eq!(records.len(), 5);
        for (record, path) in records.iter().zip(&paths) {
            assert_eq!(&record.identifier, path);
            assert_eq!(record.fingerprint.len(), FINGERPRINT_BITS);
        }
    }

    #[test]
    fn test_corrupt_image_fails_whole_batch() {
        let temp_dir = TempDir::new().unwrap();
        let mut paths = Vec::new();
        for i in 0..4 {
            let path = temp_dir.path().join(format!("img{}.jpg", i));
            create_test_image(&path, i);
            paths.push(path);
        }
        let corrupt = temp_dir.path().join("corrupt.jpg");
        fs::write(&corrupt, b"not a jpeg at all").unwrap();
        paths.insert(2, corrupt);

        let result = compute_hashes(&paths, workers(2), &HasherRegistry::default());

        match result {
            Err(PipelineError::Fingerprint(err)) => {
                assert!(matches!(err, FingerprintError::Decode { .. }));
                assert!(err.identifier().ends_with("corrupt.jpg"));
            }
            other => panic!("expected decode failure, got {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn test_default_concurrency_is_bounded() {
        let n = default_concurrency().get();
        assert!((MIN_WORKERS..=MAX_WORKERS).contains(&n));
    }
}
