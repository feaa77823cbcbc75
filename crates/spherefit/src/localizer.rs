//! High-level localization API.
//!
//! [`SphereLocalizer`] is the primary entry point for localizing a spherical
//! fiducial from its edge voxels. It wraps a [`LocalizeConfig`] and provides
//! convenience methods for plain point sets and for edge masks.

use std::path::Path;

use crate::edges::{collect_edge_points, edge_positions, edge_weights, EdgeMask};
use crate::sphere::{
    fit_sphere, fit_sphere_weighted, SphereEstimate, SphereFitConfig, SphereFitError,
};
use crate::volume::{GradientSampler, VoxelMapper};

/// How edge points are weighted in the sphere fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeWeighting {
    /// Every edge point has the same influence.
    Uniform,
    /// Points are weighted by the gradient magnitude at their voxel.
    #[default]
    GradientMagnitude,
}

/// Localizer configuration.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LocalizeConfig {
    /// Linear sphere-fit parameters.
    pub fit: SphereFitConfig,
    /// Edge-point weighting strategy.
    pub weighting: EdgeWeighting,
}

impl LocalizeConfig {
    /// Load from a JSON file. Missing fields take their default values.
    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}

/// Localization of one fiducial from an edge mask.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Localization {
    /// Fitted sphere and quality metrics.
    pub estimate: SphereEstimate,
    /// Number of flagged voxels in the edge mask.
    pub n_edge_voxels: usize,
    /// Weighting used for the fit.
    pub weighting: EdgeWeighting,
}

/// Primary localization interface.
///
/// Stateless apart from its configuration: create once, fit many point sets,
/// from any number of threads.
///
/// # Examples
///
/// ```
/// use spherefit::{Sphere, SphereLocalizer};
///
/// let marker = Sphere { center: [10.0, 20.0, 5.0], radius: 3.0 };
/// let points = marker.sample_points(6);
///
/// let localizer = SphereLocalizer::new();
/// let est = localizer.fit_points(&points).expect("fit");
/// assert!((est.radius() - 3.0).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SphereLocalizer {
    config: LocalizeConfig,
}

impl SphereLocalizer {
    /// Create a localizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with full config control.
    pub fn with_config(config: LocalizeConfig) -> Self {
        Self { config }
    }

    /// Access the current configuration.
    pub fn config(&self) -> &LocalizeConfig {
        &self.config
    }

    /// Mutable access to configuration for post-construction tuning.
    pub fn config_mut(&mut self) -> &mut LocalizeConfig {
        &mut self.config
    }

    /// Unweighted fit of physical points.
    pub fn fit_points(&self, points: &[[f64; 3]]) -> Result<SphereEstimate, SphereFitError> {
        fit_sphere(points, &self.config.fit)
    }

    /// Weighted fit of physical points.
    pub fn fit_weighted_points(
        &self,
        points: &[[f64; 3]],
        weights: &[f64],
    ) -> Result<SphereEstimate, SphereFitError> {
        fit_sphere_weighted(points, weights, &self.config.fit)
    }

    /// Fit with optional weights: weighted when `weights` is `Some`.
    pub fn fit(
        &self,
        points: &[[f64; 3]],
        weights: Option<&[f64]>,
    ) -> Result<SphereEstimate, SphereFitError> {
        match weights {
            Some(w) => self.fit_weighted_points(points, w),
            None => self.fit_points(points),
        }
    }

    /// Localize a fiducial from the edge voxels of one region of interest.
    ///
    /// Edge voxels are mapped to physical space with `mapper`; with
    /// [`EdgeWeighting::GradientMagnitude`] each point is weighted by
    /// `sampler` at its voxel.
    pub fn localize_edges<M, G>(
        &self,
        mask: &EdgeMask,
        mapper: &M,
        sampler: &G,
    ) -> Result<Localization, SphereFitError>
    where
        M: VoxelMapper + ?Sized,
        G: GradientSampler + ?Sized,
    {
        let edge_points = collect_edge_points(mask, mapper, sampler);
        let n_edge_voxels = edge_points.len();
        tracing::info!("{} edge voxels in mask", n_edge_voxels);

        let positions = edge_positions(&edge_points);
        let weighting = self.config.weighting;
        let result = match weighting {
            EdgeWeighting::Uniform => self.fit_points(&positions),
            EdgeWeighting::GradientMagnitude => {
                self.fit_weighted_points(&positions, &edge_weights(&edge_points))
            }
        };

        let estimate = match result {
            Ok(est) => est,
            Err(e) => {
                tracing::warn!("sphere localization failed: {}", e);
                return Err(e);
            }
        };
        let c = estimate.center();
        tracing::info!(
            "sphere localized at ({:.3}, {:.3}, {:.3}) mm, radius {:.3} mm",
            c[0],
            c[1],
            c[2],
            estimate.radius()
        );

        Ok(Localization {
            estimate,
            n_edge_voxels,
            weighting,
        })
    }
}
