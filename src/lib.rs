//! stcluster - Spatiotemporal cluster-based permutation testing
//!
//! Paired comparison of two conditions recorded as 4D volumes (time × X × Y × Z)
//! per subject. Locations whose paired t-statistic exceeds a critical value are
//! grouped into clusters over space and time, and each cluster is assigned a
//! family-wise corrected p-value from a sign-flip permutation null of maximum
//! cluster statistics.

pub mod adjacency;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod dataset;
pub mod error;
pub mod nifti_io;
pub mod permutation;
pub mod pipeline;
pub mod results;
pub mod statistic;
