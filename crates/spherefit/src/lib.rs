//! Localization of spherical fiducial markers in CT volumes.
//!
//! Markers are localized by fitting a sphere to their edge points. The
//! stages are:
//!
//! 1. **Edges** – an external imaging library produces an edge mask
//!    (Canny-like) for a region of interest around the marker.
//! 2. **Volume** – edge voxels are mapped to physical coordinates (mm) and
//!    weighted by local gradient magnitude through injected capabilities.
//! 3. **Sphere** – algebraic least-squares sphere fit, plain or weighted,
//!    solved by SVD with explicit rank and degeneracy checks.
//!
//! # Public API
//! - [`SphereLocalizer`] and [`LocalizeConfig`] as primary entry points
//! - [`fit_sphere`] / [`fit_sphere_weighted`] for direct point-set fitting
//! - [`VoxelMapper`] / [`GradientSampler`] capability traits and their
//!   built-in implementations

mod edges;
mod localizer;
mod sphere;
mod volume;

pub use edges::{collect_edge_points, edge_positions, edge_weights, EdgeMask, EdgePoint};
pub use localizer::{EdgeWeighting, LocalizeConfig, Localization, SphereLocalizer};
pub use sphere::{
    fit_sphere, fit_sphere_weighted, rms_geometric_distance, AlgebraicSphere, FitMetrics, Sphere,
    SphereEstimate, SphereFitConfig, SphereFitError, WeightIssue, MIN_SPHERE_POINTS,
};
pub use volume::{GradientSampler, ImageGeometry, ScalarVolume, VolumeError, VoxelMapper};

/// Point set with optional per-point weights, as exchanged with the CLI.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PointSet {
    /// Points in physical coordinates (mm).
    pub points: Vec<[f64; 3]>,
    /// Optional non-negative weights, one per point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
}

impl PointSet {
    /// Fit the point set with `localizer`, weighted when weights are present.
    pub fn fit(&self, localizer: &SphereLocalizer) -> Result<SphereEstimate, SphereFitError> {
        localizer.fit(&self.points, self.weights.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_set_json_without_weights() {
        let raw = r#"{"points":[[0,0,1],[0,1,0],[1,0,0],[0,0,-1],[0,-1,0],[-1,0,0]]}"#;
        let set: PointSet = serde_json::from_str(raw).expect("valid json");
        assert_eq!(set.points.len(), 6);
        assert!(set.weights.is_none());

        let est = set.fit(&SphereLocalizer::new()).expect("unit sphere");
        assert!((est.radius() - 1.0).abs() < 1e-12);
        assert!(!serde_json::to_string(&set).unwrap().contains("weights"));
    }

    #[test]
    fn point_set_with_weights_uses_weighted_fit() {
        let set = PointSet {
            points: Sphere {
                center: [3.0, 3.0, 3.0],
                radius: 1.5,
            }
            .sample_points(12),
            weights: Some(vec![1.0; 12]),
        };
        let est = set.fit(&SphereLocalizer::new()).expect("fit");
        assert!(est.metrics.weighted);
    }
}
