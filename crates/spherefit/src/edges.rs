//! Edge point collection from an externally computed edge mask.
//!
//! The edge mask is produced by a Canny-style detector in the imaging
//! library; this module turns its set voxels into physical edge points with
//! gradient-magnitude confidence weights.

use crate::volume::{GradientSampler, VoxelMapper};

/// Boolean voxel mask, stored x-fastest like [`crate::ScalarVolume`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeMask {
    dims: [usize; 3],
    data: Vec<bool>,
}

impl EdgeMask {
    /// Empty mask of the given dimensions.
    pub fn new(dims: [usize; 3]) -> Self {
        Self {
            dims,
            data: vec![false; dims[0] * dims[1] * dims[2]],
        }
    }

    /// Wrap raw mask data; `None` if the length does not match `dims`.
    pub fn from_data(dims: [usize; 3], data: Vec<bool>) -> Option<Self> {
        if data.len() != dims[0] * dims[1] * dims[2] {
            return None;
        }
        Some(Self { dims, data })
    }

    /// Mask with the listed voxels set. Out-of-range indices are ignored.
    pub fn from_indices(dims: [usize; 3], indices: &[[usize; 3]]) -> Self {
        let mut mask = Self::new(dims);
        for &idx in indices {
            mask.set(idx, true);
        }
        mask
    }

    /// Mask dimensions (nx, ny, nz).
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    fn offset(&self, index: [usize; 3]) -> Option<usize> {
        let [x, y, z] = index;
        let [nx, ny, nz] = self.dims;
        if x >= nx || y >= ny || z >= nz {
            return None;
        }
        Some(x + nx * (y + ny * z))
    }

    /// Whether a voxel is flagged. Out-of-range voxels are not.
    pub fn get(&self, index: [usize; 3]) -> bool {
        self.offset(index).map(|o| self.data[o]).unwrap_or(false)
    }

    /// Flag or clear a voxel. Returns `false` if the index is out of range.
    pub fn set(&mut self, index: [usize; 3], value: bool) -> bool {
        match self.offset(index) {
            Some(o) => {
                self.data[o] = value;
                true
            }
            None => false,
        }
    }

    /// Number of flagged voxels.
    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// Indices of flagged voxels in storage order.
    pub fn set_indices(&self) -> Vec<[usize; 3]> {
        let [nx, ny, _] = self.dims;
        self.data
            .iter()
            .enumerate()
            .filter(|(_, &v)| v)
            .map(|(o, _)| [o % nx, (o / nx) % ny, o / (nx * ny)])
            .collect()
    }
}

/// An edge voxel located in physical space.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EdgePoint {
    /// Voxel index in the source volume.
    pub index: [usize; 3],
    /// Physical position (mm).
    pub position: [f64; 3],
    /// Gradient magnitude at the voxel; 0 when it could not be sampled.
    pub grad_mag: f64,
}

/// Convert every flagged voxel of `mask` into an [`EdgePoint`].
///
/// Voxels where the gradient cannot be sampled (or is not finite) are kept
/// with zero weight, so they are ignored by the weighted fit but still count
/// for the unweighted one.
pub fn collect_edge_points<M, G>(mask: &EdgeMask, mapper: &M, sampler: &G) -> Vec<EdgePoint>
where
    M: VoxelMapper + ?Sized,
    G: GradientSampler + ?Sized,
{
    let mut n_missing = 0usize;
    let points: Vec<EdgePoint> = mask
        .set_indices()
        .into_iter()
        .map(|index| {
            let position =
                mapper.index_to_physical([index[0] as f64, index[1] as f64, index[2] as f64]);
            let grad_mag = match sampler.gradient_magnitude(index) {
                Some(g) if g.is_finite() && g >= 0.0 => g,
                _ => {
                    n_missing += 1;
                    0.0
                }
            };
            EdgePoint {
                index,
                position,
                grad_mag,
            }
        })
        .collect();

    if n_missing > 0 {
        tracing::debug!(
            "{} of {} edge voxels have no usable gradient; weighted as 0",
            n_missing,
            points.len()
        );
    }
    points
}

/// Physical positions of edge points, in order.
pub fn edge_positions(points: &[EdgePoint]) -> Vec<[f64; 3]> {
    points.iter().map(|p| p.position).collect()
}

/// Gradient-magnitude weights of edge points, in order.
pub fn edge_weights(points: &[EdgePoint]) -> Vec<f64> {
    points.iter().map(|p| p.grad_mag).collect()
}
