//! Property-based tests for the cluster permutation test
//!
//! Core properties covered:
//! 1. Adjacency symmetry and neighborhood bounds
//! 2. Cluster extraction: sizes, signs, threshold respect
//! 3. Null distribution length and p-value bounds
//! 4. Symmetry under swapping conditions
//! 5. Reproducibility from a seed

use ndarray::Array5;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use stcluster::adjacency::{Connectivity, SpatialAdjacency, SpatioTemporalAdjacency};
use stcluster::cluster::{extract_clusters, ClusterScratch, ClusterStatistic, ThresholdRule};
use stcluster::config::ClusterTestConfig;
use stcluster::dataset::PairedDataset;
use stcluster::nifti_io::IDENTITY_AFFINE;
use stcluster::permutation::{ClusterPermutationTest, PermutationOutcome};
use stcluster::statistic::Tail;

fn connectivity() -> impl Strategy<Value = Connectivity> {
    prop_oneof![
        Just(Connectivity::Faces),
        Just(Connectivity::Edges),
        Just(Connectivity::Vertices),
    ]
}

fn tail() -> impl Strategy<Value = Tail> {
    prop_oneof![Just(Tail::Both), Just(Tail::Upper), Just(Tail::Lower)]
}

/// (subjects, time, X, Y, Z) contrasts with small extents
fn contrasts() -> impl Strategy<Value = Array5<f64>> {
    (2usize..6, 1usize..3, 1usize..4, 1usize..4, 1usize..3).prop_flat_map(|shape| {
        let (n, t, x, y, z) = shape;
        prop::collection::vec(-3.0f64..3.0, n * t * x * y * z).prop_map(move |values| {
            Array5::from_shape_vec(shape, values).expect("length matches shape")
        })
    })
}

fn run(data: &PairedDataset, config: &ClusterTestConfig, seed: u64) -> PermutationOutcome {
    let test = ClusterPermutationTest::new(config, data.shape()).unwrap();
    test.run(data, &mut StdRng::seed_from_u64(seed)).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(60))]

    #[test]
    fn prop_spatial_adjacency_symmetric_and_bounded(
        nx in 1usize..6,
        ny in 1usize..6,
        nz in 1usize..6,
        connectivity in connectivity(),
    ) {
        let adjacency = SpatialAdjacency::new((nx, ny, nz), connectivity).unwrap();

        prop_assert!(adjacency.is_symmetric());
        for v in 0..adjacency.n_voxels() {
            let neighbors = adjacency.neighbors(v);
            prop_assert!(neighbors.len() <= connectivity.interior_degree());
            prop_assert!(!neighbors.contains(&(v as u32)));
            prop_assert!(neighbors.windows(2).all(|w| w[0] < w[1]));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(60))]

    #[test]
    fn prop_temporal_edges_respect_max_step(
        n_times in 1usize..6,
        max_step in 1usize..4,
    ) {
        let spatial = SpatialAdjacency::new((2, 2, 1), Connectivity::Faces).unwrap();
        let graph = SpatioTemporalAdjacency::new(spatial, n_times, max_step).unwrap();

        for i in 0..graph.n_vertices() {
            for j in graph.neighbors(i) {
                let (ti, vi) = (i / 4, i % 4);
                let (tj, vj) = (j / 4, j % 4);
                if ti == tj {
                    prop_assert_ne!(vi, vj);
                } else {
                    prop_assert_eq!(vi, vj);
                    prop_assert!(ti.abs_diff(tj) <= max_step);
                }
                prop_assert!(graph.neighbors(j).any(|k| k == i));
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(80))]

    #[test]
    fn prop_clusters_partition_supra_threshold_locations(
        values in prop::collection::vec(-4.0f64..4.0, 2 * 3 * 3 * 2),
        threshold in 0.5f64..3.0,
        tail in tail(),
        connectivity in connectivity(),
    ) {
        let spatial = SpatialAdjacency::new((3, 3, 2), connectivity).unwrap();
        let graph = SpatioTemporalAdjacency::new(spatial, 2, 1).unwrap();
        let rule = ThresholdRule::new(threshold, tail);
        let mut scratch = ClusterScratch::new(graph.n_vertices());

        let clusters = extract_clusters(&values, &graph, rule, ClusterStatistic::Mass, &mut scratch);

        let mut covered = vec![false; values.len()];
        for cluster in &clusters {
            prop_assert!(cluster.size() >= 1);
            prop_assert!(cluster.members.windows(2).all(|w| w[0] < w[1]));
            for &i in &cluster.members {
                prop_assert!(!covered[i]);
                covered[i] = true;
                prop_assert_eq!(rule.excursion(values[i]), Some(cluster.sign));
            }
            let mass: f64 = cluster.members.iter().map(|&i| values[i].abs()).sum();
            prop_assert!((cluster.statistic - mass).abs() < 1e-12);
        }
        for (i, &value) in values.iter().enumerate() {
            prop_assert_eq!(covered[i], rule.excursion(value).is_some());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    #[test]
    fn prop_single_supra_threshold_location_is_singleton_cluster(
        position in 0usize..27,
        value in 3.0f64..10.0,
    ) {
        let spatial = SpatialAdjacency::new((3, 3, 3), Connectivity::Vertices).unwrap();
        let graph = SpatioTemporalAdjacency::new(spatial, 1, 1).unwrap();
        let mut stat = vec![0.0; 27];
        stat[position] = value;

        let mut scratch = ClusterScratch::new(27);
        let clusters = extract_clusters(
            &stat,
            &graph,
            ThresholdRule::new(2.0, Tail::Both),
            ClusterStatistic::Mass,
            &mut scratch,
        );

        prop_assert_eq!(clusters.len(), 1);
        prop_assert_eq!(&clusters[0].members, &vec![position]);
        prop_assert_eq!(clusters[0].statistic, value);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_null_length_and_p_value_bounds(
        contrasts in contrasts(),
        n_permutations in 1usize..40,
        seed in any::<u64>(),
    ) {
        let data = PairedDataset::from_contrasts(contrasts, IDENTITY_AFFINE).unwrap();
        let config = ClusterTestConfig {
            n_permutations,
            ..ClusterTestConfig::default()
        };
        let outcome = run(&data, &config, seed);

        prop_assert_eq!(outcome.null.len(), n_permutations);
        prop_assert!(outcome.null.values().iter().all(|&m| m >= 0.0));

        let floor = 1.0 / (n_permutations as f64 + 1.0);
        for result in &outcome.clusters {
            prop_assert!(result.p_value >= floor);
            prop_assert!(result.p_value <= 1.0);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_swapping_conditions_mirrors_outcome(
        contrasts in contrasts(),
        seed in any::<u64>(),
    ) {
        let data = PairedDataset::from_contrasts(contrasts, IDENTITY_AFFINE).unwrap();
        let config = ClusterTestConfig {
            n_permutations: 16,
            ..ClusterTestConfig::default()
        };

        let forward = run(&data, &config, seed);
        let backward = run(&data.negated(), &config, seed);

        prop_assert_eq!(forward.clusters.len(), backward.clusters.len());
        for (a, b) in forward.clusters.iter().zip(&backward.clusters) {
            prop_assert_eq!(&a.cluster.members, &b.cluster.members);
            prop_assert_eq!(a.cluster.sign, b.cluster.sign.flipped());
            prop_assert_eq!(a.p_value, b.p_value);
        }
        prop_assert_eq!(forward.null, backward.null);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_same_seed_reproduces_run(
        contrasts in contrasts(),
        seed in any::<u64>(),
    ) {
        let data = PairedDataset::from_contrasts(contrasts, IDENTITY_AFFINE).unwrap();
        let config = ClusterTestConfig {
            n_permutations: 12,
            threads: 2,
            ..ClusterTestConfig::default()
        };

        let first = run(&data, &config, seed);
        let second = run(&data, &config, seed);
        prop_assert_eq!(first.observed_stat.len(), second.observed_stat.len());
        prop_assert_eq!(first.null, second.null);
    }
}
