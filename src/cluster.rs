//! Connected clusters of supra-threshold statistics
//!
//! A location joins the threshold mask when its statistic is finite and
//! reaches `+threshold` (positive excursion) or `-threshold` (negative
//! excursion), depending on the tail. Clusters are connected components of
//! same-sign mask members over the spatiotemporal adjacency, found by flood
//! fill. Positive and negative excursions never share a cluster.
//!
//! Cluster scores are reduced over the members in ascending index order, so a
//! cluster scores identically whichever member the traversal started from.

use crate::adjacency::SpatioTemporalAdjacency;
use crate::statistic::Tail;
use serde::{Deserialize, Serialize};

/// Direction of the excursion that formed a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterSign {
    Positive,
    Negative,
}

impl ClusterSign {
    /// +1.0 or -1.0
    pub fn as_f64(self) -> f64 {
        match self {
            ClusterSign::Positive => 1.0,
            ClusterSign::Negative => -1.0,
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            ClusterSign::Positive => ClusterSign::Negative,
            ClusterSign::Negative => ClusterSign::Positive,
        }
    }
}

/// How a cluster is summarized into one number
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatistic {
    /// Sum of |statistic| over members
    #[default]
    Mass,
    /// Number of members
    Extent,
}

/// A maximal connected set of supra-threshold locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Flat voxel-timepoint indices, ascending
    pub members: Vec<usize>,
    /// Cluster mass or extent
    pub statistic: f64,
    pub sign: ClusterSign,
}

impl Cluster {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.members.binary_search(&index).is_ok()
    }
}

/// Threshold predicate shared by the observed run and every permutation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdRule {
    /// Non-negative critical |t|
    pub threshold: f64,
    pub tail: Tail,
}

impl ThresholdRule {
    pub fn new(threshold: f64, tail: Tail) -> Self {
        Self { threshold, tail }
    }

    /// Excursion direction of `value`, or `None` when it is outside the mask
    #[inline]
    pub fn excursion(&self, value: f64) -> Option<ClusterSign> {
        if !value.is_finite() {
            return None;
        }
        if self.tail.includes_positive() && value >= self.threshold {
            Some(ClusterSign::Positive)
        } else if self.tail.includes_negative() && value <= -self.threshold {
            Some(ClusterSign::Negative)
        } else {
            None
        }
    }
}

/// Reusable buffers for cluster extraction over one statistic map
#[derive(Debug, Clone, Default)]
pub struct ClusterScratch {
    visited: Vec<bool>,
    stack: Vec<usize>,
    members: Vec<usize>,
}

impl ClusterScratch {
    pub fn new(n_vertices: usize) -> Self {
        Self {
            visited: vec![false; n_vertices],
            stack: Vec::new(),
            members: Vec::new(),
        }
    }

    fn reset(&mut self, n_vertices: usize) {
        self.visited.clear();
        self.visited.resize(n_vertices, false);
        self.stack.clear();
        self.members.clear();
    }
}

/// Visit every cluster in order of its smallest member, handing the sorted
/// members to `on_cluster`
fn visit_clusters<F>(
    stat: &[f64],
    graph: &SpatioTemporalAdjacency,
    rule: ThresholdRule,
    scratch: &mut ClusterScratch,
    mut on_cluster: F,
) where
    F: FnMut(ClusterSign, &[usize]),
{
    debug_assert_eq!(stat.len(), graph.n_vertices());
    scratch.reset(stat.len());

    for seed in 0..stat.len() {
        if scratch.visited[seed] {
            continue;
        }
        let Some(sign) = rule.excursion(stat[seed]) else {
            continue;
        };

        scratch.members.clear();
        scratch.visited[seed] = true;
        scratch.stack.push(seed);

        while let Some(current) = scratch.stack.pop() {
            scratch.members.push(current);
            for neighbor in graph.neighbors(current) {
                if !scratch.visited[neighbor] && rule.excursion(stat[neighbor]) == Some(sign) {
                    scratch.visited[neighbor] = true;
                    scratch.stack.push(neighbor);
                }
            }
        }

        scratch.members.sort_unstable();
        on_cluster(sign, &scratch.members);
    }
}

/// Score sorted cluster members
fn score(stat: &[f64], members: &[usize], statistic: ClusterStatistic) -> f64 {
    match statistic {
        ClusterStatistic::Mass => members.iter().map(|&i| stat[i].abs()).sum(),
        ClusterStatistic::Extent => members.len() as f64,
    }
}

/// Find all clusters of a statistic map
///
/// Returns an empty vector when nothing passes the threshold.
pub fn extract_clusters(
    stat: &[f64],
    graph: &SpatioTemporalAdjacency,
    rule: ThresholdRule,
    statistic: ClusterStatistic,
    scratch: &mut ClusterScratch,
) -> Vec<Cluster> {
    let mut clusters = Vec::new();
    visit_clusters(stat, graph, rule, scratch, |sign, members| {
        clusters.push(Cluster {
            members: members.to_vec(),
            statistic: score(stat, members, statistic),
            sign,
        });
    });
    clusters
}

/// Largest cluster score of a statistic map, 0.0 when there are no clusters
///
/// Scores exactly as [`extract_clusters`] does without keeping member lists.
pub fn max_cluster_statistic(
    stat: &[f64],
    graph: &SpatioTemporalAdjacency,
    rule: ThresholdRule,
    statistic: ClusterStatistic,
    scratch: &mut ClusterScratch,
) -> f64 {
    let mut max = 0.0f64;
    visit_clusters(stat, graph, rule, scratch, |_, members| {
        max = max.max(score(stat, members, statistic));
    });
    max
}
