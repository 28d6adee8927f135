//! Density-based clustering of fingerprints (DBSCAN over normalized Hamming
//! distance).
//!
//! A point's neighborhood is every point within `eps` of it, itself included.
//! Points whose neighborhood holds at least `min_neighbors` members are core
//! points. Clusters grow breadth-first from core points taken in input order;
//! non-core members join but do not extend the cluster. A point keeps the
//! first cluster that reaches it. Anything never reached is noise.

use crate::core::fingerprint::{ClusterAssignment, FingerprintRecord, Label};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;

/// Default minimum neighborhood size (including the point itself).
pub const MIN_NEIGHBORS: usize = 2;

#[derive(Debug, Error, PartialEq)]
pub enum ClusterError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("fingerprint {index} has {actual} bits, expected {expected}")]
    LengthMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityClusterer {
    eps: f64,
    min_neighbors: usize,
}

impl DensityClusterer {
    pub fn new(eps: f64, min_neighbors: usize) -> Result<Self, ClusterError> {
        if !(0.0..=1.0).contains(&eps) {
            return Err(ClusterError::InvalidParameter {
                name: "eps",
                reason: format!("{} is outside [0, 1]", eps),
            });
        }
        if min_neighbors < 1 {
            return Err(ClusterError::InvalidParameter {
                name: "min_neighbors",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(Self { eps, min_neighbors })
    }

    pub fn eps(&self) -> f64 {
        self.eps
    }

    pub fn min_neighbors(&self) -> usize {
        self.min_neighbors
    }

    /// Label every record, in input order.
    pub fn cluster<I: Clone>(
        &self,
        records: &[FingerprintRecord<I>],
    ) -> Result<Vec<ClusterAssignment<I>>, ClusterError> {
        if records.is_empty() {
            log::warn!("No fingerprints provided for clustering");
            return Ok(Vec::new());
        }
        check_lengths(records)?;

        log::info!(
            "Clustering {} images with eps={} min_neighbors={}",
            records.len(),
            self.eps,
            self.min_neighbors
        );

        let neighborhoods = self.neighborhoods(records);
        let labels = self.expand(&neighborhoods);

        let assignments: Vec<_> = records
            .iter()
            .zip(labels)
            .map(|(record, label)| ClusterAssignment {
                identifier: record.identifier.clone(),
                label,
            })
            .collect();

        let summary = ClusterSummary::from_assignments(&assignments);
        log::info!(
            "Clustering complete: {} clusters, {} noise points",
            summary.clusters,
            summary.noise
        );

        Ok(assignments)
    }

    // All-pairs scan; each neighborhood lists indices in ascending order and
    // contains the point itself.
    fn neighborhoods<I>(&self, records: &[FingerprintRecord<I>]) -> Vec<Vec<usize>> {
        let n = records.len();
        let mut neighborhoods: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();

        for i in 0..n {
            for j in (i + 1)..n {
                let distance = records[i].fingerprint.distance(&records[j].fingerprint);
                if distance <= self.eps {
                    neighborhoods[i].push(j);
                    neighborhoods[j].push(i);
                }
            }
        }

        for neighborhood in &mut neighborhoods {
            neighborhood.sort_unstable();
        }
        neighborhoods
    }

    fn expand(&self, neighborhoods: &[Vec<usize>]) -> Vec<Label> {
        let is_core: Vec<bool> = neighborhoods
            .iter()
            .map(|neighborhood| neighborhood.len() >= self.min_neighbors)
            .collect();

        let mut labels: Vec<Option<u32>> = vec![None; neighborhoods.len()];
        let mut next_id = 0u32;
        let mut queue = VecDeque::new();

        for seed in 0..neighborhoods.len() {
            if labels[seed].is_some() || !is_core[seed] {
                continue;
            }

            let id = next_id;
            next_id += 1;
            labels[seed] = Some(id);
            queue.push_back(seed);

            while let Some(point) = queue.pop_front() {
                // Border points join but never propagate.
                if !is_core[point] {
                    continue;
                }
                for &neighbor in &neighborhoods[point] {
                    if labels[neighbor].is_none() {
                        labels[neighbor] = Some(id);
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        labels
            .into_iter()
            .map(|label| label.map_or(Label::Noise, Label::Cluster))
            .collect()
    }
}

/// Cluster `records` with a fresh [`DensityClusterer`].
pub fn cluster<I: Clone>(
    records: &[FingerprintRecord<I>],
    eps: f64,
    min_neighbors: usize,
) -> Result<Vec<ClusterAssignment<I>>, ClusterError> {
    DensityClusterer::new(eps, min_neighbors)?.cluster(records)
}

fn check_lengths<I>(records: &[FingerprintRecord<I>]) -> Result<(), ClusterError> {
    let expected = records[0].fingerprint.len();
    match records
        .iter()
        .position(|record| record.fingerprint.len() != expected)
    {
        Some(index) => Err(ClusterError::LengthMismatch {
            index,
            expected,
            actual: records[index].fingerprint.len(),
        }),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub clusters: usize,
    pub noise: usize,
}

impl ClusterSummary {
    pub fn from_assignments<I>(assignments: &[ClusterAssignment<I>]) -> Self {
        let groups = groups(assignments);
        Self {
            clusters: groups.len(),
            noise: assignments.iter().filter(|a| a.label.is_noise()).count(),
        }
    }
}

/// Members of each cluster keyed by cluster id, in input order. Noise is omitted.
pub fn groups<I>(assignments: &[ClusterAssignment<I>]) -> BTreeMap<u32, Vec<&I>> {
    let mut groups: BTreeMap<u32, Vec<&I>> = BTreeMap::new();
    for assignment in assignments {
        if let Some(id) = assignment.label.cluster_id() {
            groups.entry(id).or_default().push(&assignment.identifier);
        }
    }
    groups
}
