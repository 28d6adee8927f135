pub mod cluster;
pub mod fingerprint;
pub mod hash;
pub mod pipeline;

pub use cluster::{cluster, ClusterError, ClusterSummary, DensityClusterer, MIN_NEIGHBORS};
pub use fingerprint::{ClusterAssignment, Fingerprint, FingerprintRecord, Label};
pub use hash::{FingerprintError, HasherRegistry, ImageHasher, PerceptualHasher};
pub use pipeline::{compute, compute_hashes, compute_with_progress, default_concurrency, PipelineError};
