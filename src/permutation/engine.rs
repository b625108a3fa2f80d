// Cluster-based permutation engine
//
// 1. Observed statistic map (all signs +1), critical value, observed clusters
// 2. Sign vectors drawn sequentially from the injected RNG (or enumerated)
// 3. Each sign vector evaluated in parallel: statistic map -> max cluster score
// 4. Corrected p-value per observed cluster against the null maxima
//
// Shared state during step 3 is read-only (contrasts, adjacency); each rayon
// worker owns one statistic map and one cluster scratch.

use crate::adjacency::{SpatialAdjacency, SpatioTemporalAdjacency};
use crate::cluster::{
    extract_clusters, max_cluster_statistic, Cluster, ClusterScratch, ThresholdRule,
};
use crate::config::{ClusterTestConfig, SignFlipScheme};
use crate::dataset::{PairedDataset, VolumeShape};
use crate::error::{ClusterTestError, Result};
use crate::permutation::null::{NullDistribution, SIGNIFICANCE_CUTOFF};
use crate::statistic::{critical_value, PairedTTest, StatisticFn, Tail};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// An observed cluster with its corrected p-value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterResult {
    pub cluster: Cluster,
    pub p_value: f64,
}

impl ClusterResult {
    pub fn is_significant(&self) -> bool {
        self.p_value <= SIGNIFICANCE_CUTOFF
    }
}

/// Everything a run produces
#[derive(Debug, Clone)]
pub struct PermutationOutcome {
    /// Observed statistic, one value per voxel-timepoint
    pub observed_stat: Vec<f64>,
    /// Critical |t| used for every labeling
    pub threshold: f64,
    pub degrees_of_freedom: f64,
    pub tail: Tail,
    pub n_subjects: usize,
    /// Observed locations with zero variance (statistic set to 0)
    pub degenerate_locations: usize,
    /// All observed clusters, in order of their smallest member
    pub clusters: Vec<ClusterResult>,
    pub null: NullDistribution,
}

impl PermutationOutcome {
    /// Clusters with corrected p at or below the reporting cutoff
    pub fn significant_clusters(&self) -> impl Iterator<Item = &ClusterResult> {
        self.clusters.iter().filter(|c| c.is_significant())
    }

    pub fn n_significant(&self) -> usize {
        self.significant_clusters().count()
    }
}

/// Cluster permutation test bound to one grid geometry
///
/// The adjacency graph is built once in [`ClusterPermutationTest::new`] and
/// reused for the observed run and every permutation.
///
/// # Example
/// ```
/// use ndarray::Array5;
/// use rand::rngs::StdRng;
/// use rand::SeedableRng;
/// use stcluster::config::ClusterTestConfig;
/// use stcluster::dataset::PairedDataset;
/// use stcluster::nifti_io::IDENTITY_AFFINE;
/// use stcluster::permutation::ClusterPermutationTest;
///
/// let contrasts = Array5::from_shape_fn((4, 1, 2, 2, 2), |(k, _, _, _, _)| 3.0 + k as f64);
/// let data = PairedDataset::from_contrasts(contrasts, IDENTITY_AFFINE).unwrap();
///
/// let config = ClusterTestConfig { n_permutations: 50, ..ClusterTestConfig::default() };
/// let test = ClusterPermutationTest::new(&config, data.shape()).unwrap();
/// let outcome = test.run(&data, &mut StdRng::seed_from_u64(7)).unwrap();
/// assert_eq!(outcome.null.len(), 50);
/// ```
pub struct ClusterPermutationTest<'a, S: StatisticFn = PairedTTest> {
    config: &'a ClusterTestConfig,
    shape: VolumeShape,
    graph: SpatioTemporalAdjacency,
    statistic: S,
}

impl<'a> ClusterPermutationTest<'a, PairedTTest> {
    /// Paired t-test cluster permutation for volumes of `shape`
    pub fn new(config: &'a ClusterTestConfig, shape: VolumeShape) -> Result<Self> {
        Self::with_statistic(config, shape, PairedTTest)
    }
}

impl<'a, S: StatisticFn> ClusterPermutationTest<'a, S> {
    /// Cluster permutation with a custom per-location statistic
    pub fn with_statistic(
        config: &'a ClusterTestConfig,
        shape: VolumeShape,
        statistic: S,
    ) -> Result<Self> {
        config.validate()?;
        let spatial = SpatialAdjacency::new(shape.spatial_dims(), config.connectivity)?;
        let graph = SpatioTemporalAdjacency::new(spatial, shape.n_times, config.max_step)?;
        Ok(Self {
            config,
            shape,
            graph,
            statistic,
        })
    }

    pub fn adjacency(&self) -> &SpatioTemporalAdjacency {
        &self.graph
    }

    /// Run the observed test and the full permutation null
    ///
    /// Either every permutation completes or an error is returned.
    pub fn run<R: Rng + ?Sized>(
        &self,
        data: &PairedDataset,
        rng: &mut R,
    ) -> Result<PermutationOutcome> {
        let n_subjects = data.n_subjects();
        self.config.validate_for_subjects(n_subjects)?;

        if data.shape() != self.shape {
            let dims = |s: VolumeShape| vec![s.n_times, s.nx, s.ny, s.nz];
            return Err(ClusterTestError::ShapeMismatch {
                what: "paired dataset".to_string(),
                expected: dims(self.shape),
                found: dims(data.shape()),
            });
        }

        let contrasts = data.contrast_matrix();
        let n_locations = self.shape.n_locations();

        // Observed labeling
        let df = self.statistic.degrees_of_freedom(n_subjects);
        let threshold = critical_value(self.config.alpha, df, self.config.tail)?;
        let rule = ThresholdRule::new(threshold, self.config.tail);

        let mut observed_stat = vec![0.0; n_locations];
        let degenerate = self
            .statistic
            .compute(contrasts, &vec![1.0; n_subjects], &mut observed_stat);
        if degenerate > 0 {
            tracing::debug!(
                "{} of {} locations have zero variance (statistic set to 0)",
                degenerate,
                n_locations
            );
        }

        let mut scratch = ClusterScratch::new(n_locations);
        let observed = extract_clusters(
            &observed_stat,
            &self.graph,
            rule,
            self.config.statistic,
            &mut scratch,
        );

        tracing::info!(
            "Paired t-test for {} subjects: df={}, t-threshold={:.4}, {} observed clusters",
            n_subjects,
            df,
            threshold,
            observed.len()
        );

        // Permutation null
        let sign_vectors = self.sign_vectors(n_subjects, rng);
        let maxima = self.evaluate_null(data, rule, &sign_vectors)?;
        let null = NullDistribution::new(maxima);

        let clusters: Vec<ClusterResult> = observed
            .into_iter()
            .map(|cluster| {
                let p_value = null.corrected_p(cluster.statistic);
                ClusterResult { cluster, p_value }
            })
            .collect();

        let outcome = PermutationOutcome {
            observed_stat,
            threshold,
            degrees_of_freedom: df,
            tail: self.config.tail,
            n_subjects,
            degenerate_locations: degenerate,
            clusters,
            null,
        };

        tracing::info!(
            "{} of {} clusters significant at p <= {}",
            outcome.n_significant(),
            outcome.clusters.len(),
            SIGNIFICANCE_CUTOFF
        );

        Ok(outcome)
    }

    /// Sign vectors for the null, drawn before any parallel work so the result
    /// does not depend on scheduling
    fn sign_vectors<R: Rng + ?Sized>(&self, n_subjects: usize, rng: &mut R) -> Vec<Vec<f64>> {
        match self.config.sign_flip {
            SignFlipScheme::Random => (0..self.config.n_permutations)
                .map(|_| {
                    (0..n_subjects)
                        .map(|_| if rng.gen_bool(0.5) { 1.0 } else { -1.0 })
                        .collect()
                })
                .collect(),
            SignFlipScheme::Exhaustive => (1u64..(1u64 << n_subjects))
                .map(|flips| {
                    (0..n_subjects)
                        .map(|k| if (flips >> k) & 1 == 1 { -1.0 } else { 1.0 })
                        .collect()
                })
                .collect(),
        }
    }

    /// Maximum cluster statistic for every sign vector, in draw order
    fn evaluate_null(
        &self,
        data: &PairedDataset,
        rule: ThresholdRule,
        sign_vectors: &[Vec<f64>],
    ) -> Result<Vec<f64>> {
        let contrasts = data.contrast_matrix();
        let n_locations = self.shape.n_locations();
        let total = sign_vectors.len();
        let report_every = (total / 10).max(1);
        let done = AtomicUsize::new(0);

        tracing::info!("Running {} permutations", total);

        let evaluate = || {
            sign_vectors
                .par_iter()
                .map_init(
                    || (vec![0.0; n_locations], ClusterScratch::new(n_locations)),
                    |(stat, scratch), signs| {
                        self.statistic.compute(contrasts, signs, stat);
                        let max = max_cluster_statistic(
                            stat,
                            &self.graph,
                            rule,
                            self.config.statistic,
                            scratch,
                        );

                        let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                        if finished % report_every == 0 {
                            tracing::info!("Permutations: {}/{}", finished, total);
                        }
                        max
                    },
                )
                .collect::<Vec<f64>>()
        };

        let maxima = if self.config.threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.threads)
                .build()
                .map_err(|e| ClusterTestError::ThreadPool(e.to_string()))?;
            pool.install(evaluate)
        } else {
            evaluate()
        };

        Ok(maxima)
    }
}
