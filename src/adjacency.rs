//! Voxel-grid adjacency for cluster formation
//!
//! The spatial neighbor relation over an (X, Y, Z) grid is built once as a
//! CSR graph. The time axis is layered on top without materializing extra
//! edges: vertex `(t, v)` touches its spatial neighbors at the same `t` and the
//! same voxel `v` at up to `max_step` timepoints before and after.
//!
//! # Layout
//!
//! ```text
//! spatial index  v = (x * Y + y) * Z + z
//! flat index     i = t * (X * Y * Z) + v
//! ```
//!
//! # Example
//!
//! ```
//! use stcluster::adjacency::{Connectivity, SpatialAdjacency, SpatioTemporalAdjacency};
//!
//! let spatial = SpatialAdjacency::new((3, 3, 3), Connectivity::Faces).unwrap();
//! assert_eq!(spatial.degree(13), 6); // centre voxel
//! assert_eq!(spatial.degree(0), 3); // corner voxel
//!
//! let graph = SpatioTemporalAdjacency::new(spatial, 2, 1).unwrap();
//! assert_eq!(graph.n_vertices(), 54);
//! ```

use crate::error::{ClusterTestError, Result};
use serde::{Deserialize, Serialize};

/// Which voxels of the 3x3x3 neighborhood count as spatial neighbors
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// Shared face only (6 neighbors)
    #[default]
    Faces,
    /// Shared face or edge (18 neighbors)
    Edges,
    /// Shared face, edge or corner (26 neighbors)
    Vertices,
}

impl Connectivity {
    /// Maximum number of non-zero offset components allowed
    fn max_axes_moved(self) -> usize {
        match self {
            Connectivity::Faces => 1,
            Connectivity::Edges => 2,
            Connectivity::Vertices => 3,
        }
    }

    /// Number of neighbors of an interior voxel
    pub fn interior_degree(self) -> usize {
        match self {
            Connectivity::Faces => 6,
            Connectivity::Edges => 18,
            Connectivity::Vertices => 26,
        }
    }

    /// Neighbor offsets (dx, dy, dz) in a fixed order
    fn offsets(self) -> Vec<(isize, isize, isize)> {
        let mut offsets = Vec::with_capacity(self.interior_degree());
        for dx in -1isize..=1 {
            for dy in -1isize..=1 {
                for dz in -1isize..=1 {
                    let moved = [dx, dy, dz].iter().filter(|&&d| d != 0).count();
                    if moved > 0 && moved <= self.max_axes_moved() {
                        offsets.push((dx, dy, dz));
                    }
                }
            }
        }
        offsets
    }
}

/// Static spatial neighbor graph in compressed sparse row form
#[derive(Debug, Clone)]
pub struct SpatialAdjacency {
    dims: (usize, usize, usize),
    connectivity: Connectivity,
    row_offsets: Vec<usize>,
    col_indices: Vec<u32>,
}

impl SpatialAdjacency {
    /// Build the neighbor graph for a grid of extents `(X, Y, Z)`
    ///
    /// Boundary voxels simply get fewer neighbors. Every extent must be
    /// non-zero and the voxel count must fit in `u32`.
    pub fn new(dims: (usize, usize, usize), connectivity: Connectivity) -> Result<Self> {
        let (nx, ny, nz) = dims;
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(ClusterTestError::InvalidDimensions(format!(
                "spatial extents must be non-zero, got {}x{}x{}",
                nx, ny, nz
            )));
        }
        let n_voxels = nx
            .checked_mul(ny)
            .and_then(|n| n.checked_mul(nz))
            .filter(|&n| n <= u32::MAX as usize)
            .ok_or_else(|| {
                ClusterTestError::InvalidDimensions(format!(
                    "grid {}x{}x{} has too many voxels",
                    nx, ny, nz
                ))
            })?;

        let offsets = connectivity.offsets();
        let mut row_offsets = Vec::with_capacity(n_voxels + 1);
        let mut col_indices = Vec::with_capacity(n_voxels * offsets.len());
        row_offsets.push(0);

        for x in 0..nx {
            for y in 0..ny {
                for z in 0..nz {
                    for &(dx, dy, dz) in &offsets {
                        let (Some(px), Some(py), Some(pz)) = (
                            step(x, dx, nx),
                            step(y, dy, ny),
                            step(z, dz, nz),
                        ) else {
                            continue;
                        };
                        col_indices.push(((px * ny + py) * nz + pz) as u32);
                    }
                    row_offsets.push(col_indices.len());
                }
            }
        }

        tracing::debug!(
            "Built {:?} adjacency for {}x{}x{} grid ({} directed edges)",
            connectivity,
            nx,
            ny,
            nz,
            col_indices.len()
        );

        Ok(Self {
            dims,
            connectivity,
            row_offsets,
            col_indices,
        })
    }

    /// Grid extents `(X, Y, Z)`
    pub fn dims(&self) -> (usize, usize, usize) {
        self.dims
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    /// Number of voxels in the grid
    pub fn n_voxels(&self) -> usize {
        self.row_offsets.len() - 1
    }

    /// Spatial neighbors of voxel `v`, in ascending index order
    pub fn neighbors(&self, v: usize) -> &[u32] {
        &self.col_indices[self.row_offsets[v]..self.row_offsets[v + 1]]
    }

    pub fn degree(&self, v: usize) -> usize {
        self.row_offsets[v + 1] - self.row_offsets[v]
    }

    /// Number of undirected edges
    pub fn n_edges(&self) -> usize {
        self.col_indices.len() / 2
    }

    /// Check that every edge appears in both directions
    pub fn is_symmetric(&self) -> bool {
        (0..self.n_voxels()).all(|v| {
            self.neighbors(v)
                .iter()
                .all(|&w| self.neighbors(w as usize).binary_search(&(v as u32)).is_ok())
        })
    }
}

/// Move `pos` by `delta` and keep it inside `0..extent`
#[inline(always)]
fn step(pos: usize, delta: isize, extent: usize) -> Option<usize> {
    let moved = pos.checked_add_signed(delta)?;
    (moved < extent).then_some(moved)
}

/// Spatial adjacency extended over a time axis with a maximum temporal step
#[derive(Debug, Clone)]
pub struct SpatioTemporalAdjacency {
    spatial: SpatialAdjacency,
    n_times: usize,
    max_step: usize,
}

impl SpatioTemporalAdjacency {
    /// Layer `n_times` copies of `spatial`, linking each voxel to itself up to
    /// `max_step` timepoints away
    pub fn new(spatial: SpatialAdjacency, n_times: usize, max_step: usize) -> Result<Self> {
        if n_times == 0 {
            return Err(ClusterTestError::InvalidDimensions(
                "time extent must be non-zero".to_string(),
            ));
        }
        if max_step == 0 {
            return Err(ClusterTestError::InvalidMaxStep(max_step));
        }
        Ok(Self {
            spatial,
            n_times,
            max_step,
        })
    }

    pub fn spatial(&self) -> &SpatialAdjacency {
        &self.spatial
    }

    pub fn n_times(&self) -> usize {
        self.n_times
    }

    pub fn max_step(&self) -> usize {
        self.max_step
    }

    /// Number of voxel-timepoints (`T * X * Y * Z`)
    pub fn n_vertices(&self) -> usize {
        self.n_times * self.spatial.n_voxels()
    }

    /// Neighbors of flat index `i`: spatial neighbors at the same timepoint,
    /// then the same voxel at earlier and later timepoints
    pub fn neighbors(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        let n_voxels = self.spatial.n_voxels();
        let t = i / n_voxels;
        let v = i % n_voxels;
        let base = t * n_voxels;
        let n_times = self.n_times;

        let spatial = self
            .spatial
            .neighbors(v)
            .iter()
            .map(move |&w| base + w as usize);
        let temporal = (1..=self.max_step).flat_map(move |dt| {
            let before = t.checked_sub(dt).map(|tb| tb * n_voxels + v);
            let after = (t + dt < n_times).then(|| (t + dt) * n_voxels + v);
            before.into_iter().chain(after)
        });

        spatial.chain(temporal)
    }

    /// Number of undirected edges, spatial plus temporal
    pub fn n_edges(&self) -> usize {
        let spatial = self.spatial.n_edges() * self.n_times;
        let temporal: usize = (1..=self.max_step)
            .map(|dt| self.n_times.saturating_sub(dt) * self.spatial.n_voxels())
            .sum();
        spatial + temporal
    }
}
