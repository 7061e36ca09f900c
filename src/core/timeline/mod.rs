//! # Timeline Module
//!
//! Groups scanned files into clusters by elapsed time between captures.
//! A cluster is a contiguous run of files whose inter-capture gaps all
//! stay below a threshold; a gap above the threshold starts a new one.
//!
//! This is a derived view: it is recomputed from scratch whenever the
//! scanned set changes and never persists anything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// One contiguous run of captures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineCluster {
    /// Capture time of the earliest file in the cluster
    pub start: DateTime<Utc>,
    /// Capture time of the latest file in the cluster
    pub end: DateTime<Utc>,
    /// Source paths in capture order
    pub files: Vec<PathBuf>,
}

impl TimelineCluster {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Elapsed time covered by the cluster
    pub fn span(&self) -> chrono::TimeDelta {
        self.end - self.start
    }
}

/// Cluster `files` by consecutive capture-time gaps below `threshold`.
///
/// Input order does not matter; files are sorted by timestamp first,
/// with source path as the tie-break so equal timestamps cluster
/// deterministically.
pub fn cluster(
    files: &[(DateTime<Utc>, PathBuf)],
    threshold: Duration,
) -> Vec<TimelineCluster> {
    if files.is_empty() {
        return Vec::new();
    }

    let mut ordered: Vec<(DateTime<Utc>, PathBuf)> = files.to_vec();
    ordered.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    let threshold = chrono::TimeDelta::from_std(threshold)
        .unwrap_or(chrono::TimeDelta::MAX);

    let mut clusters = Vec::new();
    let (first_time, first_path) = ordered[0].clone();
    let mut current = TimelineCluster {
        start: first_time,
        end: first_time,
        files: vec![first_path],
    };

    for (time, path) in ordered.into_iter().skip(1) {
        if time - current.end > threshold {
            clusters.push(std::mem::replace(
                &mut current,
                TimelineCluster {
                    start: time,
                    end: time,
                    files: Vec::new(),
                },
            ));
        }
        current.end = time;
        current.files.push(path);
    }
    clusters.push(current);
    clusters
}
