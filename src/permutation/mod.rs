// Sign-flip permutation testing of spatiotemporal clusters
//
// For paired designs, multiplying each subject's contrast by an independent
// fair +/-1 preserves the null hypothesis of zero mean difference. The maximum
// cluster statistic over each relabeling forms a null distribution that
// controls the family-wise error rate across all voxel-timepoints.
//
// Scientific Foundation:
// [1] Maris, E., & Oostenveld, R. (2007). Nonparametric statistical testing of
//     EEG- and MEG-data. Journal of Neuroscience Methods, 164(1).
// [2] Nichols, T. E., & Holmes, A. P. (2002). Nonparametric permutation tests
//     for functional neuroimaging. Human Brain Mapping, 15(1).

mod engine;
mod null;

pub use engine::{ClusterPermutationTest, ClusterResult, PermutationOutcome};
pub use null::{NullDistribution, NullSummary, SIGNIFICANCE_CUTOFF};
