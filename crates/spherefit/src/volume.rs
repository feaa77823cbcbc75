//! Volume geometry and imaging capabilities consumed by the localizer.
//!
//! Segmentation, smoothing and edge extraction are performed by an external
//! imaging library. The fitter only needs two per-voxel capabilities, which
//! are modeled as traits so callers can plug in their own implementation:
//!
//! - [`VoxelMapper`]: voxel index ↔ physical coordinate transform.
//! - [`GradientSampler`]: gradient magnitude lookup at a voxel.
//!
//! Built-in implementations: [`ImageGeometry`] (affine origin/spacing/direction
//! transform) and [`ScalarVolume`] (dense volume with central-difference
//! gradients).

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

/// Mapping between continuous voxel indices and physical coordinates (mm).
///
/// Both methods must be approximate inverses of each other. Return `None`
/// from [`VoxelMapper::physical_to_index`] when the transform is not
/// invertible.
///
/// # Example
///
/// ```
/// use spherefit::VoxelMapper;
///
/// struct HalfMillimeter;
///
/// impl VoxelMapper for HalfMillimeter {
///     fn index_to_physical(&self, idx: [f64; 3]) -> [f64; 3] {
///         [idx[0] * 0.5, idx[1] * 0.5, idx[2] * 0.5]
///     }
///     fn physical_to_index(&self, p: [f64; 3]) -> Option<[f64; 3]> {
///         Some([p[0] * 2.0, p[1] * 2.0, p[2] * 2.0])
///     }
/// }
/// ```
pub trait VoxelMapper {
    /// Map a (possibly fractional) voxel index to a physical point.
    fn index_to_physical(&self, index: [f64; 3]) -> [f64; 3];
    /// Map a physical point back to a continuous voxel index.
    fn physical_to_index(&self, point: [f64; 3]) -> Option<[f64; 3]>;
}

/// Gradient magnitude lookup at a voxel.
///
/// Returns `None` when the voxel is outside the volume or the gradient cannot
/// be evaluated there.
pub trait GradientSampler {
    /// Gradient magnitude at `index`.
    fn gradient_magnitude(&self, index: [usize; 3]) -> Option<f64>;
}

impl<F> GradientSampler for F
where
    F: Fn([usize; 3]) -> Option<f64>,
{
    fn gradient_magnitude(&self, index: [usize; 3]) -> Option<f64> {
        self(index)
    }
}

/// Affine index ↔ physical transform: `p = origin + D · diag(spacing) · idx`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageGeometry {
    /// Physical position of voxel (0, 0, 0) in mm.
    pub origin: [f64; 3],
    /// Voxel spacing along each index axis in mm.
    pub spacing: [f64; 3],
    /// Direction cosines, row-major; column `j` is the physical direction of index axis `j`.
    pub direction: [[f64; 3]; 3],
}

impl Default for ImageGeometry {
    fn default() -> Self {
        Self {
            origin: [0.0; 3],
            spacing: [1.0; 3],
            direction: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }
}

impl ImageGeometry {
    /// Axis-aligned geometry with the given origin and spacing.
    pub fn axis_aligned(origin: [f64; 3], spacing: [f64; 3]) -> Self {
        Self {
            origin,
            spacing,
            ..Default::default()
        }
    }

    /// Check validity: finite values, positive spacing, invertible direction.
    pub fn is_valid(&self) -> bool {
        self.origin.iter().all(|v| v.is_finite())
            && self.spacing.iter().all(|&s| s.is_finite() && s > 0.0)
            && self.direction.iter().flatten().all(|v| v.is_finite())
            && self.direction_matrix().determinant().abs() > 1e-12
    }

    fn direction_matrix(&self) -> Matrix3<f64> {
        let d = &self.direction;
        Matrix3::new(
            d[0][0], d[0][1], d[0][2], d[1][0], d[1][1], d[1][2], d[2][0], d[2][1], d[2][2],
        )
    }

    /// Combined linear part `D · diag(spacing)`.
    fn index_to_physical_matrix(&self) -> Matrix3<f64> {
        self.direction_matrix()
            * Matrix3::from_diagonal(&Vector3::new(
                self.spacing[0],
                self.spacing[1],
                self.spacing[2],
            ))
    }
}

impl VoxelMapper for ImageGeometry {
    fn index_to_physical(&self, index: [f64; 3]) -> [f64; 3] {
        let p = self.index_to_physical_matrix() * Vector3::from(index)
            + Vector3::from(self.origin);
        [p[0], p[1], p[2]]
    }

    fn physical_to_index(&self, point: [f64; 3]) -> Option<[f64; 3]> {
        let inv = self.index_to_physical_matrix().try_inverse()?;
        let idx = inv * (Vector3::from(point) - Vector3::from(self.origin));
        if !idx.iter().all(|v| v.is_finite()) {
            return None;
        }
        Some([idx[0], idx[1], idx[2]])
    }
}

/// Errors building a [`ScalarVolume`].
#[derive(Debug, Clone, PartialEq)]
pub enum VolumeError {
    /// Data length does not match `dims`.
    SizeMismatch {
        /// Expected voxel count.
        expected: usize,
        /// Provided voxel count.
        got: usize,
    },
    /// Geometry has non-positive spacing or a singular direction matrix.
    InvalidGeometry,
}

impl std::fmt::Display for VolumeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SizeMismatch { expected, got } => {
                write!(f, "volume size mismatch: expected {} voxels, got {}", expected, got)
            }
            Self::InvalidGeometry => write!(f, "invalid volume geometry"),
        }
    }
}

impl std::error::Error for VolumeError {}

/// Dense scalar volume stored x-fastest (`index = x + nx·(y + ny·z)`).
#[derive(Debug, Clone)]
pub struct ScalarVolume {
    dims: [usize; 3],
    geometry: ImageGeometry,
    data: Vec<f32>,
}

impl ScalarVolume {
    /// Wrap voxel data with its geometry.
    pub fn new(
        dims: [usize; 3],
        geometry: ImageGeometry,
        data: Vec<f32>,
    ) -> Result<Self, VolumeError> {
        let expected = dims[0] * dims[1] * dims[2];
        if data.len() != expected {
            return Err(VolumeError::SizeMismatch {
                expected,
                got: data.len(),
            });
        }
        if !geometry.is_valid() {
            return Err(VolumeError::InvalidGeometry);
        }
        Ok(Self {
            dims,
            geometry,
            data,
        })
    }

    /// Build a volume by evaluating `f` at every voxel index.
    pub fn from_fn(
        dims: [usize; 3],
        geometry: ImageGeometry,
        mut f: impl FnMut([usize; 3]) -> f32,
    ) -> Result<Self, VolumeError> {
        let mut data = Vec::with_capacity(dims[0] * dims[1] * dims[2]);
        for z in 0..dims[2] {
            for y in 0..dims[1] {
                for x in 0..dims[0] {
                    data.push(f([x, y, z]));
                }
            }
        }
        Self::new(dims, geometry, data)
    }

    /// Volume dimensions (nx, ny, nz).
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Volume geometry.
    pub fn geometry(&self) -> &ImageGeometry {
        &self.geometry
    }

    /// Voxel value, or `None` outside the volume.
    pub fn get(&self, index: [usize; 3]) -> Option<f32> {
        let [x, y, z] = index;
        let [nx, ny, nz] = self.dims;
        if x >= nx || y >= ny || z >= nz {
            return None;
        }
        Some(self.data[x + nx * (y + ny * z)])
    }

    /// Finite-difference derivative along one index axis, in value per mm.
    ///
    /// Central differences in the interior, one-sided at the border.
    fn axis_derivative(&self, index: [usize; 3], axis: usize) -> Option<f64> {
        let n = self.dims[axis];
        if n < 2 {
            return Some(0.0);
        }
        let i = index[axis];
        let (lo, hi) = if i == 0 {
            (0, 1)
        } else if i + 1 >= n {
            (n - 2, n - 1)
        } else {
            (i - 1, i + 1)
        };
        let mut a = index;
        let mut b = index;
        a[axis] = lo;
        b[axis] = hi;
        let diff = self.get(b)? as f64 - self.get(a)? as f64;
        Some(diff / ((hi - lo) as f64 * self.geometry.spacing[axis]))
    }
}

impl VoxelMapper for ScalarVolume {
    fn index_to_physical(&self, index: [f64; 3]) -> [f64; 3] {
        self.geometry.index_to_physical(index)
    }

    fn physical_to_index(&self, point: [f64; 3]) -> Option<[f64; 3]> {
        self.geometry.physical_to_index(point)
    }
}

impl GradientSampler for ScalarVolume {
    /// Magnitude of the index-axis gradient scaled by spacing. Equals the
    /// physical gradient magnitude when the direction matrix is orthonormal.
    fn gradient_magnitude(&self, index: [usize; 3]) -> Option<f64> {
        self.get(index)?;
        let gx = self.axis_derivative(index, 0)?;
        let gy = self.axis_derivative(index, 1)?;
        let gz = self.axis_derivative(index, 2)?;
        Some((gx * gx + gy * gy + gz * gz).sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn oblique_geometry() -> ImageGeometry {
        let (s, c) = 0.3f64.sin_cos();
        ImageGeometry {
            origin: [-100.0, 25.0, 7.5],
            spacing: [0.5, 0.5, 1.25],
            direction: [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    #[test]
    fn identity_geometry_maps_index_to_itself() {
        let g = ImageGeometry::default();
        assert_eq!(g.index_to_physical([1.0, 2.0, 3.0]), [1.0, 2.0, 3.0]);
        assert_eq!(g.physical_to_index([1.0, 2.0, 3.0]), Some([1.0, 2.0, 3.0]));
    }

    #[test]
    fn axis_aligned_applies_origin_and_spacing() {
        let g = ImageGeometry::axis_aligned([10.0, -5.0, 2.0], [0.5, 0.25, 2.0]);
        let p = g.index_to_physical([4.0, 8.0, 1.0]);
        assert_relative_eq!(p[0], 12.0, epsilon = 1e-12);
        assert_relative_eq!(p[1], -3.0, epsilon = 1e-12);
        assert_relative_eq!(p[2], 4.0, epsilon = 1e-12);
    }

    #[test]
    fn oblique_transform_inverts() {
        let g = oblique_geometry();
        assert!(g.is_valid());
        let idx = [12.5, 3.0, 40.0];
        let p = g.index_to_physical(idx);
        let back = g.physical_to_index(p).expect("invertible");
        for k in 0..3 {
            assert_relative_eq!(back[k], idx[k], epsilon = 1e-9);
        }
    }

    #[test]
    fn invalid_geometry_is_detected() {
        let mut g = ImageGeometry::default();
        g.spacing[1] = 0.0;
        assert!(!g.is_valid());
        assert!(g.physical_to_index([1.0, 1.0, 1.0]).is_none());

        let mut g = ImageGeometry::default();
        g.direction = [[1.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        assert!(!g.is_valid());
    }

    #[test]
    fn volume_rejects_size_mismatch() {
        let err = ScalarVolume::new([2, 2, 2], ImageGeometry::default(), vec![0.0; 7])
            .expect_err("size mismatch");
        assert_eq!(err, VolumeError::SizeMismatch { expected: 8, got: 7 });
    }

    #[test]
    fn linear_ramp_has_constant_gradient() {
        // f = 2·x_mm along a 0.5 mm axis: derivative 2 per mm everywhere.
        let g = ImageGeometry::axis_aligned([0.0; 3], [0.5, 1.0, 1.0]);
        let vol = ScalarVolume::from_fn([6, 3, 3], g, |[x, _, _]| x as f32).expect("volume");
        for x in 0..6 {
            let m = vol.gradient_magnitude([x, 1, 1]).expect("inside");
            assert_relative_eq!(m, 2.0, epsilon = 1e-6);
        }
        assert!(vol.gradient_magnitude([6, 1, 1]).is_none());
    }

    #[test]
    fn closures_act_as_gradient_samplers() {
        let sampler = |idx: [usize; 3]| Some(idx[0] as f64 + 0.5);
        assert_eq!(sampler.gradient_magnitude([3, 0, 0]), Some(3.5));
    }
}
