//! Algebraic least-squares sphere fitting.
//!
//! Each point contributes one row of the linear model
//! `[−2x, −2y, −2z, 1] · [c; k] = −(x² + y² + z²)` with `k = cᵀc − r²`.
//! The over-determined system is solved by SVD; the normal equations are
//! never formed.

use nalgebra::{DMatrix, DVector};

use super::types::{
    squared_norm, sub, AlgebraicSphere, FitMetrics, Sphere, SphereEstimate, SphereFitConfig,
    SphereFitError, WeightIssue,
};

/// Fit a sphere to 3D points by ordinary least squares on the algebraic
/// distance `δᵢ = |pᵢ − c|² − r²`.
///
/// Requires at least [`SphereFitConfig::required_points`] points.
pub fn fit_sphere(
    points: &[[f64; 3]],
    config: &SphereFitConfig,
) -> Result<SphereEstimate, SphereFitError> {
    validate_points(points, config)?;
    solve_sphere(points, None, config)
}

/// Weighted variant of [`fit_sphere`]: minimizes `Σ wᵢ δᵢ²`.
///
/// Only the relative magnitude of the weights matters. A zero weight removes
/// the point from the system.
pub fn fit_sphere_weighted(
    points: &[[f64; 3]],
    weights: &[f64],
    config: &SphereFitConfig,
) -> Result<SphereEstimate, SphereFitError> {
    validate_points(points, config)?;
    validate_weights(points.len(), weights)?;
    solve_sphere(points, Some(weights), config)
}

/// RMS geometric distance of points to a sphere surface.
pub fn rms_geometric_distance(sphere: &Sphere, points: &[[f64; 3]]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = points
        .iter()
        .map(|&p| {
            let d = sphere.signed_distance(p);
            d * d
        })
        .sum();
    (sum_sq / points.len() as f64).sqrt()
}

fn validate_points(points: &[[f64; 3]], config: &SphereFitConfig) -> Result<(), SphereFitError> {
    let needed = config.required_points();
    if points.len() < needed {
        return Err(SphereFitError::InsufficientPoints {
            needed,
            got: points.len(),
        });
    }
    if let Some(index) = points
        .iter()
        .position(|p| p.iter().any(|v| !v.is_finite()))
    {
        return Err(SphereFitError::InvalidPoint { index });
    }
    Ok(())
}

fn validate_weights(n_points: usize, weights: &[f64]) -> Result<(), SphereFitError> {
    if weights.len() != n_points {
        return Err(SphereFitError::InvalidWeights(WeightIssue::LengthMismatch {
            points: n_points,
            weights: weights.len(),
        }));
    }
    for (index, &w) in weights.iter().enumerate() {
        if !w.is_finite() {
            return Err(SphereFitError::InvalidWeights(WeightIssue::NonFinite {
                index,
            }));
        }
        if w < 0.0 {
            return Err(SphereFitError::InvalidWeights(WeightIssue::Negative {
                index,
                value: w,
            }));
        }
    }
    if weights.iter().all(|&w| w == 0.0) {
        return Err(SphereFitError::InvalidWeights(WeightIssue::AllZero));
    }
    Ok(())
}

/// Shared solver path for the weighted and unweighted fits. Inputs are
/// already validated.
fn solve_sphere(
    points: &[[f64; 3]],
    weights: Option<&[f64]>,
    config: &SphereFitConfig,
) -> Result<SphereEstimate, SphereFitError> {
    // Zero-weight rows carry no information; drop them before solving.
    let rows: Vec<([f64; 3], f64)> = match weights {
        Some(w) => points
            .iter()
            .zip(w)
            .filter(|(_, &wi)| wi > 0.0)
            .map(|(&p, &wi)| (p, wi.sqrt()))
            .collect(),
        None => points.iter().map(|&p| (p, 1.0)).collect(),
    };

    // The algebraic distance scales by s² under x' = s(x − m), so the
    // minimizer in normalized coordinates maps back exactly.
    let (mean, scale) = normalization_params(rows.iter().map(|(p, _)| *p));

    let m = rows.len();
    let mut a = DMatrix::<f64>::zeros(m, 4);
    let mut b = DVector::<f64>::zeros(m);
    for (i, &(p, sw)) in rows.iter().enumerate() {
        let q = normalize(p, mean, scale);
        a[(i, 0)] = -2.0 * q[0] * sw;
        a[(i, 1)] = -2.0 * q[1] * sw;
        a[(i, 2)] = -2.0 * q[2] * sw;
        a[(i, 3)] = sw;
        b[i] = -squared_norm(q) * sw;
    }

    let svd = a.svd(true, true);
    let sigma_max = svd.singular_values.iter().cloned().fold(0.0f64, f64::max);
    let sigma_min = if svd.singular_values.len() < 4 {
        0.0
    } else {
        svd.singular_values
            .iter()
            .cloned()
            .fold(f64::INFINITY, f64::min)
    };
    let condition_number = if sigma_min > 0.0 {
        sigma_max / sigma_min
    } else {
        f64::INFINITY
    };

    let eps = config.rank_tolerance * sigma_max;
    let rank = svd.singular_values.iter().filter(|&&s| s > eps).count();
    if rank < 4 || !sigma_max.is_finite() || sigma_max <= 0.0 {
        tracing::debug!(
            "sphere fit rejected: rank {} of 4 over {} rows (cond {:.3e})",
            rank,
            m,
            condition_number
        );
        return Err(SphereFitError::RankDeficientSystem {
            rank,
            condition_number,
        });
    }
    if condition_number > config.warn_condition_number {
        tracing::warn!(
            "sphere fit is ill-conditioned: condition number {:.3e} exceeds {:.3e}",
            condition_number,
            config.warn_condition_number
        );
    }

    let x = svd
        .solve(&b, eps)
        .map_err(|e| SphereFitError::NumericalFailure(e.to_string()))?;

    let normalized = AlgebraicSphere {
        center: [x[0], x[1], x[2]],
        k: x[3],
    };
    let unit_sphere = normalized
        .to_sphere()
        .map_err(|_| SphereFitError::DegenerateFit {
            radius_squared: normalized.radius_squared() / (scale * scale),
        })?;
    let sphere = denormalize_sphere(&unit_sphere, mean, scale);

    let metrics = fit_metrics(
        &sphere,
        rows.iter().map(|(p, _)| *p),
        points.len(),
        weights.is_some(),
        condition_number,
    );
    tracing::debug!(
        "sphere fit: center=({:.4}, {:.4}, {:.4}) r={:.4} rms={:.3e} n={}",
        sphere.center[0],
        sphere.center[1],
        sphere.center[2],
        sphere.radius,
        metrics.rms_geometric,
        metrics.n_effective
    );

    Ok(SphereEstimate { sphere, metrics })
}

/// Compute normalization parameters for a point set: the centroid and the
/// scale that brings the mean distance from the centroid to √3.
pub(crate) fn normalization_params(
    points: impl Iterator<Item = [f64; 3]> + Clone,
) -> ([f64; 3], f64) {
    let mut n = 0usize;
    let mut mean = [0.0f64; 3];
    for p in points.clone() {
        n += 1;
        for (m, v) in mean.iter_mut().zip(p) {
            *m += v;
        }
    }
    if n == 0 {
        return (mean, 1.0);
    }
    for m in &mut mean {
        *m /= n as f64;
    }

    let mean_dist = points.map(|p| squared_norm(sub(p, mean)).sqrt()).sum::<f64>() / n as f64;
    let scale = if mean_dist > 1e-15 {
        3.0f64.sqrt() / mean_dist
    } else {
        1.0
    };
    (mean, scale)
}

fn normalize(p: [f64; 3], mean: [f64; 3], scale: f64) -> [f64; 3] {
    let d = sub(p, mean);
    [d[0] * scale, d[1] * scale, d[2] * scale]
}

fn denormalize_sphere(s: &Sphere, mean: [f64; 3], scale: f64) -> Sphere {
    Sphere {
        center: [
            mean[0] + s.center[0] / scale,
            mean[1] + s.center[1] / scale,
            mean[2] + s.center[2] / scale,
        ],
        radius: s.radius / scale,
    }
}

fn fit_metrics(
    sphere: &Sphere,
    points: impl Iterator<Item = [f64; 3]>,
    n_points: usize,
    weighted: bool,
    condition_number: f64,
) -> FitMetrics {
    let mut n_effective = 0usize;
    let mut sum_alg = 0.0f64;
    let mut sum_geo = 0.0f64;
    let mut max_geo = 0.0f64;
    for p in points {
        n_effective += 1;
        let alg = sphere.algebraic_distance(p);
        let geo = sphere.signed_distance(p);
        sum_alg += alg * alg;
        sum_geo += geo * geo;
        max_geo = max_geo.max(geo.abs());
    }
    let denom = n_effective.max(1) as f64;
    FitMetrics {
        n_points,
        n_effective,
        weighted,
        condition_number,
        rms_algebraic: (sum_alg / denom).sqrt(),
        rms_geometric: (sum_geo / denom).sqrt(),
        max_abs_geometric: max_geo,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn normalization_centers_and_scales() {
        let pts = [
            [1.0, 0.0, 0.0],
            [-1.0, 0.0, 0.0],
            [0.0, 2.0, 0.0],
            [0.0, -2.0, 0.0],
        ];
        let (mean, scale) = normalization_params(pts.iter().copied());
        assert_relative_eq!(mean[0], 0.0, epsilon = 1e-15);
        assert_relative_eq!(mean[1], 0.0, epsilon = 1e-15);
        assert_relative_eq!(scale, 3.0f64.sqrt() / 1.5, epsilon = 1e-12);
    }

    #[test]
    fn normalization_of_single_location_keeps_unit_scale() {
        let pts = [[4.0, 4.0, 4.0]; 3];
        let (mean, scale) = normalization_params(pts.iter().copied());
        assert_eq!(mean, [4.0, 4.0, 4.0]);
        assert_eq!(scale, 1.0);
    }

    #[test]
    fn denormalize_inverts_normalize() {
        let mean = [3.0, -2.0, 7.5];
        let scale = 0.25;
        let s = Sphere {
            center: normalize([5.0, 1.0, 9.0], mean, scale),
            radius: 2.0 * scale,
        };
        let back = denormalize_sphere(&s, mean, scale);
        assert_relative_eq!(back.center[0], 5.0, epsilon = 1e-12);
        assert_relative_eq!(back.center[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(back.center[2], 9.0, epsilon = 1e-12);
        assert_relative_eq!(back.radius, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn weight_validation_reports_first_issue() {
        assert_eq!(
            validate_weights(3, &[1.0, 2.0]),
            Err(SphereFitError::InvalidWeights(WeightIssue::LengthMismatch {
                points: 3,
                weights: 2
            }))
        );
        assert_eq!(
            validate_weights(3, &[1.0, -0.5, 2.0]),
            Err(SphereFitError::InvalidWeights(WeightIssue::Negative {
                index: 1,
                value: -0.5
            }))
        );
        assert_eq!(
            validate_weights(2, &[f64::NAN, 1.0]),
            Err(SphereFitError::InvalidWeights(WeightIssue::NonFinite {
                index: 0
            }))
        );
        assert_eq!(
            validate_weights(2, &[0.0, 0.0]),
            Err(SphereFitError::InvalidWeights(WeightIssue::AllZero))
        );
        assert!(validate_weights(2, &[0.0, 3.0]).is_ok());
    }

    #[test]
    fn metrics_are_zero_for_exact_points() {
        let s = Sphere {
            center: [1.0, 2.0, 3.0],
            radius: 4.0,
        };
        let pts = s.sample_points(40);
        let m = fit_metrics(&s, pts.iter().copied(), pts.len(), false, 1.0);
        assert_eq!(m.n_effective, 40);
        assert!(m.rms_geometric < 1e-12);
        assert!(m.max_abs_geometric < 1e-12);
        assert_relative_eq!(rms_geometric_distance(&s, &pts), 0.0, epsilon = 1e-12);
    }
}
