//! Result assembly: significant clusters back onto volume geometry
//!
//! Output volumes are (X, Y, Z, T) arrays sharing the input affine:
//! - observed t restricted to significant cluster members, NaN elsewhere
//! - cluster ids (1-based, in significance order) signed by excursion
//!   direction, NaN elsewhere
//! - mean contrast over subjects, unrestricted

use crate::cluster::ClusterSign;
use crate::config::ClusterTestConfig;
use crate::dataset::VolumeShape;
use crate::permutation::{NullSummary, PermutationOutcome, SIGNIFICANCE_CUTOFF};
use ndarray::Array4;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// The three result volumes, each shaped (X, Y, Z, T)
#[derive(Debug, Clone)]
pub struct ResultVolumes {
    pub tstat: Array4<f64>,
    pub clusters: Array4<f64>,
    pub contrast_mean: Array4<f64>,
}

/// Reorder a flat (T, X, Y, Z) map into an (X, Y, Z, T) array
pub fn to_xyzt(flat: &[f64], shape: VolumeShape) -> Array4<f64> {
    Array4::from_shape_fn((shape.nx, shape.ny, shape.nz, shape.n_times), |(x, y, z, t)| {
        flat[shape.flat_index(t, x, y, z)]
    })
}

/// Build the output volumes for a finished run
pub fn assemble_volumes(
    outcome: &PermutationOutcome,
    shape: VolumeShape,
    mean_contrast: &[f64],
) -> ResultVolumes {
    let n_locations = shape.n_locations();
    let mut tstat = vec![f64::NAN; n_locations];
    let mut ids = vec![f64::NAN; n_locations];

    for (id, result) in outcome.significant_clusters().enumerate() {
        let label = result.cluster.sign.as_f64() * (id + 1) as f64;
        for &i in &result.cluster.members {
            tstat[i] = outcome.observed_stat[i];
            ids[i] = label;
        }
    }

    ResultVolumes {
        tstat: to_xyzt(&tstat, shape),
        clusters: to_xyzt(&ids, shape),
        contrast_mean: to_xyzt(mean_contrast, shape),
    }
}

/// Output file locations for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputPaths {
    pub tstat: PathBuf,
    pub clusters: PathBuf,
    pub contrast_average: PathBuf,
    pub summary: PathBuf,
}

impl OutputPaths {
    /// Names encode both conditions, the permutation count and alpha
    pub fn new(save_dir: &Path, config: &ClusterTestConfig) -> Self {
        let prefix = config.output_prefix();
        let file = |suffix: &str| save_dir.join(format!("{}_{}", prefix, suffix));
        Self {
            tstat: file("tstat.nii.gz"),
            clusters: file("clusters.nii.gz"),
            contrast_average: file("contrast_average.nii.gz"),
            summary: file("summary.json"),
        }
    }
}

/// One observed cluster in the run summary
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    /// Label in the cluster volume, present only for significant clusters
    pub id: Option<i64>,
    pub sign: ClusterSign,
    pub size: usize,
    pub statistic: f64,
    pub p_value: f64,
    /// Largest |t| within the cluster
    pub peak_t: f64,
    /// (t, x, y, z) of the peak
    pub peak: (usize, usize, usize, usize),
}

/// Machine-readable record of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub config: ClusterTestConfig,
    pub n_subjects: usize,
    pub shape: VolumeShape,
    pub degrees_of_freedom: f64,
    pub threshold: f64,
    pub significance_cutoff: f64,
    pub degenerate_locations: usize,
    pub n_clusters: usize,
    pub n_significant: usize,
    pub clusters: Vec<ClusterSummary>,
    pub null: Option<NullSummary>,
}

impl RunSummary {
    pub fn new(config: &ClusterTestConfig, outcome: &PermutationOutcome, shape: VolumeShape) -> Self {
        let mut next_id = 0i64;
        let clusters = outcome
            .clusters
            .iter()
            .map(|result| {
                let cluster = &result.cluster;
                let id = result.is_significant().then(|| {
                    next_id += 1;
                    next_id * cluster.sign.as_f64() as i64
                });
                let (peak_index, peak_t) = cluster
                    .members
                    .iter()
                    .map(|&i| (i, outcome.observed_stat[i]))
                    .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
                    .unwrap_or((0, 0.0));

                ClusterSummary {
                    id,
                    sign: cluster.sign,
                    size: cluster.size(),
                    statistic: cluster.statistic,
                    p_value: result.p_value,
                    peak_t,
                    peak: shape.coordinates(peak_index),
                }
            })
            .collect();

        Self {
            config: config.clone(),
            n_subjects: outcome.n_subjects,
            shape,
            degrees_of_freedom: outcome.degrees_of_freedom,
            threshold: outcome.threshold,
            significance_cutoff: SIGNIFICANCE_CUTOFF,
            degenerate_locations: outcome.degenerate_locations,
            n_clusters: outcome.clusters.len(),
            n_significant: outcome.n_significant(),
            clusters,
            null: outcome.null.summary(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable report
    pub fn to_report_string(&self) -> String {
        let mut report = String::new();

        report.push_str(&format!(
            "Paired t-test: {} vs {} ({} subjects, df={})\n",
            self.config.cond1_name, self.config.cond2_name, self.n_subjects, self.degrees_of_freedom
        ));
        report.push_str(&format!(
            "Grid: T={} X={} Y={} Z={}\n",
            self.shape.n_times, self.shape.nx, self.shape.ny, self.shape.nz
        ));
        report.push_str(&format!(
            "t-threshold: {:.4} (alpha={}, tail={})\n",
            self.threshold,
            self.config.alpha,
            i64::from(self.config.tail)
        ));
        report.push_str(&format!(
            "Clusters: {} observed, {} significant at p <= {}\n",
            self.n_clusters, self.n_significant, self.significance_cutoff
        ));

        for cluster in self.clusters.iter().filter(|c| c.id.is_some()) {
            let (t, x, y, z) = cluster.peak;
            report.push_str(&format!(
                "  #{:<4} size={:<6} stat={:<12.2} p={:.4} peak t={:.2} at (t={}, x={}, y={}, z={})\n",
                cluster.id.unwrap_or_default(),
                cluster.size,
                cluster.statistic,
                cluster.p_value,
                cluster.peak_t,
                t,
                x,
                y,
                z
            ));
        }

        if let Some(null) = &self.null {
            report.push_str(&format!(
                "Null ({} permutations): min={:.2} median={:.2} max={:.2}\n",
                null.len, null.min, null.median, null.max
            ));
        }

        report
    }
}
