//! Paired contrast data for one run
//!
//! Both conditions arrive as 5D arrays of shape (subjects, time, X, Y, Z).
//! They are checked for identical shape and reduced once to the contrast
//! condition1 - condition2, stored as a (subjects, locations) matrix whose
//! columns follow the flat voxel-timepoint layout of
//! [`crate::adjacency::SpatioTemporalAdjacency`].

use crate::error::{ClusterTestError, Result};
use crate::nifti_io::Affine;
use ndarray::{Array1, Array2, Array5, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Extents of one subject's volume time series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeShape {
    pub n_times: usize,
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl VolumeShape {
    pub fn new(n_times: usize, nx: usize, ny: usize, nz: usize) -> Self {
        Self {
            n_times,
            nx,
            ny,
            nz,
        }
    }

    pub fn spatial_dims(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }

    pub fn n_voxels(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Number of voxel-timepoints
    pub fn n_locations(&self) -> usize {
        self.n_times * self.n_voxels()
    }

    #[inline]
    pub fn flat_index(&self, t: usize, x: usize, y: usize, z: usize) -> usize {
        t * self.n_voxels() + (x * self.ny + y) * self.nz + z
    }

    /// Inverse of [`VolumeShape::flat_index`]: `(t, x, y, z)`
    #[inline]
    pub fn coordinates(&self, index: usize) -> (usize, usize, usize, usize) {
        let n_voxels = self.n_voxels();
        let t = index / n_voxels;
        let v = index % n_voxels;
        let z = v % self.nz;
        let y = (v / self.nz) % self.ny;
        let x = v / (self.nz * self.ny);
        (t, x, y, z)
    }
}

/// Per-subject paired contrasts plus the shared geometry
#[derive(Debug, Clone)]
pub struct PairedDataset {
    contrasts: Array2<f64>,
    shape: VolumeShape,
    affine: Affine,
}

impl PairedDataset {
    /// Build the contrast `cond1 - cond2` from two (N, T, X, Y, Z) arrays
    pub fn from_conditions(cond1: Array5<f64>, cond2: &Array5<f64>, affine: Affine) -> Result<Self> {
        if cond1.shape() != cond2.shape() {
            return Err(ClusterTestError::ShapeMismatch {
                what: "condition 2".to_string(),
                expected: cond1.shape().to_vec(),
                found: cond2.shape().to_vec(),
            });
        }
        Self::from_contrasts(cond1 - cond2, affine)
    }

    /// Wrap an existing (N, T, X, Y, Z) contrast array
    pub fn from_contrasts(contrasts: Array5<f64>, affine: Affine) -> Result<Self> {
        let (n_subjects, n_times, nx, ny, nz) = contrasts.dim();
        if [n_subjects, n_times, nx, ny, nz].contains(&0) {
            return Err(ClusterTestError::InvalidDimensions(format!(
                "contrast array has an empty axis: {:?}",
                contrasts.shape()
            )));
        }

        let shape = VolumeShape::new(n_times, nx, ny, nz);
        let contrasts = if contrasts.is_standard_layout() {
            contrasts
        } else {
            contrasts.as_standard_layout().into_owned()
        };
        let contrasts = contrasts
            .into_shape((n_subjects, shape.n_locations()))
            .map_err(|e| ClusterTestError::InvalidDimensions(e.to_string()))?;

        Ok(Self {
            contrasts,
            shape,
            affine,
        })
    }

    pub fn n_subjects(&self) -> usize {
        self.contrasts.nrows()
    }

    pub fn shape(&self) -> VolumeShape {
        self.shape
    }

    pub fn affine(&self) -> &Affine {
        &self.affine
    }

    /// Contrasts as a (subjects, locations) view
    pub fn contrast_matrix(&self) -> ArrayView2<'_, f64> {
        self.contrasts.view()
    }

    /// Mean contrast over subjects, one value per location
    pub fn mean_contrast(&self) -> Array1<f64> {
        self.contrasts
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.shape.n_locations()))
    }

    /// Same data with condition 1 and condition 2 swapped
    pub fn negated(&self) -> Self {
        Self {
            contrasts: -&self.contrasts,
            shape: self.shape,
            affine: self.affine,
        }
    }
}
