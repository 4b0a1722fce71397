use faer::Mat;
use rand::prelude::*;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::FlowFitError;
use crate::linalg::{FlowSystem, SvdSolver};
use crate::types::{FitResult, FlowVector, PlaneModel};

/// Minimum number of flow vectors needed to fit a plane.
pub const MIN_SAMPLES_FIT: usize = 3;

/// Parameters for the RANSAC flow plane fit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacParams {
    /// Absolute flow residual (pixels) below which a vector counts as an inlier.
    pub error_threshold: f64,
    /// Number of RANSAC iterations.
    pub n_iterations: usize,
    /// Number of vectors drawn per iteration, clamped to at least 3.
    pub n_samples: usize,
    /// Optional RNG seed for deterministic runs.
    pub random_seed: Option<u64>,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            error_threshold: 10.0,
            n_iterations: 20,
            n_samples: 5,
            random_seed: None,
        }
    }
}

impl RansacParams {
    /// Check that the parameters describe a runnable fit.
    pub fn validate(&self) -> Result<(), FlowFitError> {
        if !(self.error_threshold.is_finite() && self.error_threshold > 0.0) {
            return Err(FlowFitError::InvalidErrorThreshold(self.error_threshold));
        }
        if self.n_iterations == 0 {
            return Err(FlowFitError::ZeroIterations);
        }
        Ok(())
    }

    pub(crate) fn make_rng(&self) -> StdRng {
        match self.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => {
                let mut tr = rand::rng();
                StdRng::from_rng(&mut tr)
            }
        }
    }
}

/// Score of one candidate plane against the full vector set.
#[derive(Clone, Copy, Debug)]
struct Candidate {
    plane: PlaneModel,
    score: f64,
    inliers: usize,
}

impl Candidate {
    fn evaluate(
        system: &FlowSystem,
        target: &Mat<f64>,
        plane: PlaneModel,
        threshold: f64,
    ) -> Self {
        let mut score = 0.0;
        let mut inliers = 0;
        for residual in system.abs_residuals(&plane, target) {
            if residual < threshold {
                score += residual;
                inliers += 1;
            } else {
                // outliers contribute a capped penalty
                score += threshold;
            }
        }
        Self {
            plane,
            score,
            inliers,
        }
    }

    /// Keep the lowest score, the earliest candidate wins ties.
    fn keep_best(best: &mut Option<Candidate>, candidate: Candidate) {
        match best {
            Some(current) if candidate.score >= current.score => {}
            _ => *best = Some(candidate),
        }
    }
}

/// Fit planes to the horizontal and vertical flow with RANSAC.
///
/// Returns `Ok(None)` when fewer than [`MIN_SAMPLES_FIT`] vectors are given.
///
/// # Arguments
///
/// * `vectors` - The flow vectors of one frame.
/// * `params` - The RANSAC parameters. A fresh generator is created from `random_seed`.
pub fn fit_linear_flow_field(
    vectors: &[FlowVector],
    params: &RansacParams,
) -> Result<Option<FitResult>, FlowFitError> {
    let mut rng = params.make_rng();
    fit_linear_flow_field_with_rng(vectors, params, &mut rng)
}

/// Fit planes to the horizontal and vertical flow with RANSAC using the given generator.
///
/// Each iteration draws `n_samples` distinct vectors, solves the minimal system for both
/// flow components from a single decomposition and scores the two planes on the full set.
/// Residuals at or above the threshold add the threshold itself to the score. The
/// horizontal and vertical planes are selected independently by lowest score.
pub fn fit_linear_flow_field_with_rng<R: Rng + ?Sized>(
    vectors: &[FlowVector],
    params: &RansacParams,
    rng: &mut R,
) -> Result<Option<FitResult>, FlowFitError> {
    params.validate()?;

    let count = vectors.len();
    if count < MIN_SAMPLES_FIT {
        log::debug!("Not enough flow vectors for a fit: {}", count);
        return Ok(None);
    }

    let n_samples = params.n_samples.max(MIN_SAMPLES_FIT).min(count);
    if n_samples != params.n_samples {
        log::debug!(
            "Clamped RANSAC sample size from {} to {}",
            params.n_samples,
            n_samples
        );
    }

    // the full set is only used to score candidates
    let full = FlowSystem::from_vectors(vectors);

    let mut best_u: Option<Candidate> = None;
    let mut best_v: Option<Candidate> = None;

    for _ in 0..params.n_iterations {
        let sample = rand::seq::index::sample(rng, count, n_samples).into_vec();
        let minimal = FlowSystem::from_indices(vectors, sample.iter().copied());

        let solver = SvdSolver::new(&minimal.design);
        let plane_u = solver.solve(&minimal.flow_u);
        let plane_v = solver.solve(&minimal.flow_v);

        Candidate::keep_best(
            &mut best_u,
            Candidate::evaluate(&full, &full.flow_u, plane_u, params.error_threshold),
        );
        Candidate::keep_best(
            &mut best_v,
            Candidate::evaluate(&full, &full.flow_v, plane_v, params.error_threshold),
        );
    }

    let (best_u, best_v) = match (best_u, best_v) {
        (Some(u), Some(v)) => (u, v),
        _ => return Ok(None),
    };

    log::debug!(
        "RANSAC selected scores u: {} ({} inliers), v: {} ({} inliers)",
        best_u.score,
        best_u.inliers,
        best_v.score,
        best_v.inliers
    );

    // the reported error is measured on the whole set without capping
    let min_error_u: f64 = full.abs_residuals(&best_u.plane, &full.flow_u).iter().sum();
    let min_error_v: f64 = full.abs_residuals(&best_v.plane, &full.flow_v).iter().sum();
    let fit_error = (min_error_u + min_error_v) / (2 * count) as f64;

    Ok(Some(FitResult {
        parameters_u: best_u.plane,
        parameters_v: best_v.plane,
        fit_error,
        min_error_u,
        min_error_v,
        n_inliers_u: best_u.inliers,
        n_inliers_v: best_v.inliers,
        n_samples,
    }))
}
