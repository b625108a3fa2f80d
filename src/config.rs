// Configuration for the spatiotemporal cluster permutation test
//
// Passed explicitly into the pipeline; no process-wide state. Values come from
// defaults, then an optional TOML file, then command-line overrides.

use crate::adjacency::Connectivity;
use crate::cluster::ClusterStatistic;
use crate::error::{ClusterTestError, Result};
use crate::statistic::Tail;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How sign vectors for the permutation null are produced
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SignFlipScheme {
    /// `n_permutations` independent fair coin flips per subject
    #[default]
    Random,
    /// Every non-identity sign vector exactly once (2^N - 1 draws)
    Exhaustive,
}

/// Largest subject count accepted by [`SignFlipScheme::Exhaustive`]
pub const MAX_EXHAUSTIVE_SUBJECTS: usize = 20;

/// Configuration for one cluster permutation run
///
/// # Example
/// ```
/// use stcluster::config::ClusterTestConfig;
///
/// let config = ClusterTestConfig::default();
/// assert_eq!(config.alpha, 0.05);
/// assert_eq!(config.n_permutations, 5000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterTestConfig {
    /// Name of condition 1, used only for output naming
    pub cond1_name: String,

    /// Name of condition 2, used only for output naming
    pub cond2_name: String,

    /// Cluster-forming p-value, converted to a critical t with df = N - 1
    ///
    /// Independent of the 0.05 cutoff applied to corrected cluster p-values.
    pub alpha: f64,

    /// Number of random sign-flip permutations
    pub n_permutations: usize,

    /// 0 = two-sided, 1 = positive excursions, -1 = negative excursions
    pub tail: Tail,

    /// Spatial neighborhood used for cluster formation
    pub connectivity: Connectivity,

    /// Maximum temporal distance between connected timepoints of one voxel
    pub max_step: usize,

    /// Cluster summary compared against the null
    pub statistic: ClusterStatistic,

    /// Random or exhaustive sign flipping
    pub sign_flip: SignFlipScheme,

    /// Seed for the sign-flip generator; drawn from entropy when absent
    pub seed: Option<u64>,

    /// Worker threads for permutations (0 = rayon default)
    pub threads: usize,
}

impl Default for ClusterTestConfig {
    fn default() -> Self {
        Self {
            cond1_name: "cond1".to_string(),
            cond2_name: "cond2".to_string(),
            alpha: 0.05,
            n_permutations: 5000,
            tail: Tail::Both,
            connectivity: Connectivity::Faces,
            max_step: 1,
            statistic: ClusterStatistic::Mass,
            sign_flip: SignFlipScheme::Random,
            seed: None,
            threads: 0,
        }
    }
}

impl ClusterTestConfig {
    /// Parse a configuration from TOML; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ClusterTestError::InvalidConfig(e.to_string()))
    }

    /// Load a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate the subject-independent settings
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(ClusterTestError::InvalidAlpha(self.alpha));
        }

        if self.n_permutations == 0 {
            return Err(ClusterTestError::InvalidPermutationCount(self.n_permutations));
        }

        if self.max_step == 0 {
            return Err(ClusterTestError::InvalidMaxStep(self.max_step));
        }

        Ok(())
    }

    /// Validate settings that depend on the number of subjects
    pub fn validate_for_subjects(&self, n_subjects: usize) -> Result<()> {
        self.validate()?;

        if n_subjects < 2 {
            return Err(ClusterTestError::TooFewSubjects(n_subjects));
        }

        if self.sign_flip == SignFlipScheme::Exhaustive && n_subjects > MAX_EXHAUSTIVE_SUBJECTS {
            return Err(ClusterTestError::TooManySubjectsForExhaustive {
                max: MAX_EXHAUSTIVE_SUBJECTS,
                actual: n_subjects,
            });
        }

        Ok(())
    }

    /// Common filename prefix encoding conditions, permutation count and alpha
    ///
    /// Exhaustive runs ignore `n_permutations` and are tagged `n_perm-exhaustive`.
    pub fn output_prefix(&self) -> String {
        let n_perm = match self.sign_flip {
            SignFlipScheme::Random => self.n_permutations.to_string(),
            SignFlipScheme::Exhaustive => "exhaustive".to_string(),
        };
        format!(
            "4d_spatiotemporal_cluster_results_pairedt_{}_vs_{}_n_perm-{}_pval-{}",
            self.cond1_name, self.cond2_name, n_perm, self.alpha
        )
    }
}
