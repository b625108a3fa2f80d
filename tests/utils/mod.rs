// Integration test utilities
//
// Synthetic paired datasets written as 5D NIfTI files in temporary directories.
#![allow(dead_code)]

use ndarray::Array5;
use stcluster::nifti_io::{self, IDENTITY_AFFINE};
use std::path::{Path, PathBuf};

/// Subjects, timepoints, X, Y, Z of the standard fixture
pub const FIXTURE_SHAPE: (usize, usize, usize, usize, usize) = (10, 3, 4, 3, 3);

/// Per-subject differences outside the effect; sums to zero
const NOISE: [f64; 10] = [0.9, -0.4, 0.3, -1.2, 0.7, -0.3, 0.6, -0.8, 0.5, -0.3];

/// Number of locations inside the effect block
pub const BLOCK_LOCATIONS: usize = 16;

/// Condition 1 exceeds condition 2 by ~4 inside a 2x2x2 block during
/// timepoints 1 and 2; elsewhere the difference is zero-mean across subjects.
pub fn block_effect_conditions() -> (Array5<f64>, Array5<f64>) {
    let cond2 = Array5::from_shape_fn(FIXTURE_SHAPE, |(k, t, x, y, z)| {
        50.0 + (k + t + x + y + z) as f64 * 0.1
    });
    let cond1 = Array5::from_shape_fn(FIXTURE_SHAPE, |(k, t, x, y, z)| {
        let base = cond2[[k, t, x, y, z]];
        if in_block(t, x, y, z) {
            base + 4.0 + 0.1 * (k % 3) as f64
        } else {
            base + NOISE[k]
        }
    });
    (cond1, cond2)
}

/// Whether (t, x, y, z) lies inside the effect block
pub fn in_block(t: usize, x: usize, y: usize, z: usize) -> bool {
    t >= 1 && x < 2 && y < 2 && z < 2
}

/// Write both conditions as `.nii.gz` files into `dir`
pub fn write_conditions(dir: &Path, cond1: &Array5<f64>, cond2: &Array5<f64>) -> (PathBuf, PathBuf) {
    let c1 = dir.join("cond1.nii.gz");
    let c2 = dir.join("cond2.nii.gz");
    nifti_io::save_array(&c1, cond1, &IDENTITY_AFFINE).expect("write condition 1");
    nifti_io::save_array(&c2, cond2, &IDENTITY_AFFINE).expect("write condition 2");
    (c1, c2)
}

/// Write the block-effect fixture into `dir`
pub fn write_block_effect(dir: &Path) -> (PathBuf, PathBuf) {
    let (cond1, cond2) = block_effect_conditions();
    write_conditions(dir, &cond1, &cond2)
}
