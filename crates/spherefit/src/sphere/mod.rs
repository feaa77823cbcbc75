//! Sphere fitting primitives.
//!
//! Implements:
//! - Algebraic (linear) least-squares sphere fit, solved by SVD.
//! - Weighted variant for gradient-magnitude confidence weighting.
//! - Rank-deficiency and degenerate-radius detection.

mod fit;
mod types;

pub use fit::{fit_sphere, fit_sphere_weighted, rms_geometric_distance};
pub use types::{
    AlgebraicSphere, FitMetrics, Sphere, SphereEstimate, SphereFitConfig, SphereFitError,
    WeightIssue, MIN_SPHERE_POINTS,
};
