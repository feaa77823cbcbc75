//! Core sphere types, fit configuration and errors.

use serde::{Deserialize, Serialize};

/// Minimum number of points for an over-determined 3D sphere fit (m > n + 1).
pub const MIN_SPHERE_POINTS: usize = 5;

// ── Error type ─────────────────────────────────────────────────────────────

/// Reason a weight set was rejected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeightIssue {
    /// Weight count differs from point count.
    LengthMismatch {
        /// Number of points supplied.
        points: usize,
        /// Number of weights supplied.
        weights: usize,
    },
    /// A weight is negative.
    Negative {
        /// Index of the offending weight.
        index: usize,
        /// Offending value.
        value: f64,
    },
    /// A weight is NaN or infinite.
    NonFinite {
        /// Index of the offending weight.
        index: usize,
    },
    /// Every weight is zero.
    AllZero,
}

impl std::fmt::Display for WeightIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LengthMismatch { points, weights } => {
                write!(f, "{} weights for {} points", weights, points)
            }
            Self::Negative { index, value } => {
                write!(f, "weight {} is negative ({})", index, value)
            }
            Self::NonFinite { index } => write!(f, "weight {} is not finite", index),
            Self::AllZero => write!(f, "all weights are zero"),
        }
    }
}

/// Errors that can occur during sphere fitting.
#[derive(Debug, Clone, PartialEq)]
pub enum SphereFitError {
    /// Too few points for an over-determined fit.
    InsufficientPoints {
        /// Required minimum number of points.
        needed: usize,
        /// Provided number of points.
        got: usize,
    },
    /// The weight set does not match the point set or is not usable.
    InvalidWeights(WeightIssue),
    /// A point has a NaN or infinite coordinate.
    InvalidPoint {
        /// Index of the offending point.
        index: usize,
    },
    /// The design matrix has rank < 4 (coplanar, collinear or repeated points).
    RankDeficientSystem {
        /// Numerical rank of the (weighted, normalized) design matrix.
        rank: usize,
        /// Ratio of the largest to the smallest singular value.
        condition_number: f64,
    },
    /// The solved system implies r² ≤ 0: no real sphere.
    DegenerateFit {
        /// Implied squared radius `cᵀc − k`.
        radius_squared: f64,
    },
    /// Numerical failure inside the linear solver.
    NumericalFailure(String),
}

impl std::fmt::Display for SphereFitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientPoints { needed, got } => {
                write!(f, "insufficient points: need {}, got {}", needed, got)
            }
            Self::InvalidWeights(issue) => write!(f, "invalid weights: {}", issue),
            Self::InvalidPoint { index } => {
                write!(f, "point {} has a non-finite coordinate", index)
            }
            Self::RankDeficientSystem {
                rank,
                condition_number,
            } => write!(
                f,
                "rank-deficient system: rank {} < 4 (condition number {:.3e})",
                rank, condition_number
            ),
            Self::DegenerateFit { radius_squared } => {
                write!(f, "degenerate fit: implied r² = {:.6e} ≤ 0", radius_squared)
            }
            Self::NumericalFailure(msg) => write!(f, "numerical failure: {}", msg),
        }
    }
}

impl std::error::Error for SphereFitError {}

// ── Types ──────────────────────────────────────────────────────────────────

/// Geometric sphere in physical coordinates (millimeters).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    /// Center (x, y, z).
    pub center: [f64; 3],
    /// Radius, strictly positive for a valid sphere.
    pub radius: f64,
}

/// Raw solution `[c; k]` of the linear system, with `k = cᵀc − r²`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlgebraicSphere {
    /// Center estimate `c`.
    pub center: [f64; 3],
    /// Offset term `k`.
    pub k: f64,
}

impl AlgebraicSphere {
    /// Implied squared radius `cᵀc − k`.
    pub fn radius_squared(&self) -> f64 {
        let [x, y, z] = self.center;
        x * x + y * y + z * z - self.k
    }

    /// Convert to a geometric sphere.
    ///
    /// Fails with [`SphereFitError::DegenerateFit`] when `r² ≤ 0` or the
    /// solution is not finite.
    pub fn to_sphere(self) -> Result<Sphere, SphereFitError> {
        let radius_squared = self.radius_squared();
        if !radius_squared.is_finite() || radius_squared <= 0.0 {
            return Err(SphereFitError::DegenerateFit { radius_squared });
        }
        let sphere = Sphere {
            center: self.center,
            radius: radius_squared.sqrt(),
        };
        if !sphere.is_valid() {
            return Err(SphereFitError::DegenerateFit { radius_squared });
        }
        Ok(sphere)
    }
}

impl Sphere {
    /// Check basic validity: positive radius, finite values.
    pub fn is_valid(&self) -> bool {
        self.radius > 0.0 && self.radius.is_finite() && self.center.iter().all(|v| v.is_finite())
    }

    /// Algebraic distance `|p − c|² − r²`.
    pub fn algebraic_distance(&self, p: [f64; 3]) -> f64 {
        let d2 = squared_norm(sub(p, self.center));
        d2 - self.radius * self.radius
    }

    /// Signed Euclidean distance to the surface (positive outside).
    pub fn signed_distance(&self, p: [f64; 3]) -> f64 {
        squared_norm(sub(p, self.center)).sqrt() - self.radius
    }

    /// Sample `n` points on the surface using a Fibonacci lattice.
    pub fn sample_points(&self, n: usize) -> Vec<[f64; 3]> {
        let golden_angle = std::f64::consts::PI * (3.0 - 5.0f64.sqrt());
        (0..n)
            .map(|i| {
                let z = 1.0 - 2.0 * (i as f64 + 0.5) / n as f64;
                let ring = (1.0 - z * z).max(0.0).sqrt();
                let phi = golden_angle * i as f64;
                [
                    self.center[0] + self.radius * ring * phi.cos(),
                    self.center[1] + self.radius * ring * phi.sin(),
                    self.center[2] + self.radius * z,
                ]
            })
            .collect()
    }
}

/// Fit quality metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitMetrics {
    /// Number of points supplied.
    pub n_points: usize,
    /// Number of points with positive weight (equals `n_points` when unweighted).
    pub n_effective: usize,
    /// Whether the weighted variant was used.
    pub weighted: bool,
    /// Largest over smallest singular value of the normalized design matrix.
    pub condition_number: f64,
    /// RMS algebraic distance over points with positive weight.
    pub rms_algebraic: f64,
    /// RMS geometric distance over points with positive weight (mm).
    pub rms_geometric: f64,
    /// Largest absolute geometric distance over points with positive weight (mm).
    pub max_abs_geometric: f64,
}

/// Result of a sphere fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SphereEstimate {
    /// Fitted sphere.
    pub sphere: Sphere,
    /// Fit quality metrics.
    pub metrics: FitMetrics,
}

impl SphereEstimate {
    /// Fitted center.
    pub fn center(&self) -> [f64; 3] {
        self.sphere.center
    }

    /// Fitted radius.
    pub fn radius(&self) -> f64 {
        self.sphere.radius
    }
}

/// Configuration for the linear sphere fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SphereFitConfig {
    /// Minimum number of points; values below 5 are raised to 5.
    pub min_points: usize,
    /// Relative singular-value threshold: σ_min ≤ tol · σ_max means rank < 4.
    pub rank_tolerance: f64,
    /// Condition number above which a warning is logged.
    pub warn_condition_number: f64,
}

impl Default for SphereFitConfig {
    fn default() -> Self {
        Self {
            min_points: MIN_SPHERE_POINTS,
            rank_tolerance: 1e-10,
            warn_condition_number: 1e8,
        }
    }
}

impl SphereFitConfig {
    /// Effective minimum point count (never below 5).
    pub fn required_points(&self) -> usize {
        self.min_points.max(MIN_SPHERE_POINTS)
    }
}

pub(crate) fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub(crate) fn squared_norm(v: [f64; 3]) -> f64 {
    v[0] * v[0] + v[1] * v[1] + v[2] * v[2]
}
