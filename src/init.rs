//! Chain initialization.
//!
//! Produces one starting [`TrialPoint`] per chain before the first scheduler
//! iteration. Two strategies live here:
//!
//! - [`randomize`]: Latin-hypercube candidates pushed through the prior inverse
//!   CDFs, with the vector of prior means as the last one; the best candidates
//!   seed the chains.
//! - [`laplace`]: a Gaussian centred at the posterior mode with three times the
//!   Laplace covariance, sampled with the same stratified quantiles.
//!
//! [`initialize`] selects between them and falls back to [`randomize`], with a
//! warning, whenever mode seeking fails. Resuming from a previous run is
//! handled by the sampler itself since it needs the previous chain states.

use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::config::{InitializationKind, RunConfiguration};
use crate::core::{LogLikelihood, TrialPoint};
use crate::distributions::{MultivariateNormal, PriorSet};
use crate::error::ModeError;
use crate::lhs::LatinHypercube;
use crate::optimize::ModeFinder;

/// Widening applied to the Laplace covariance.
pub const LAPLACE_INFLATION: f64 = 3.0;

/// Starting states for every chain plus every evaluated candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Initialization {
    /// One state per chain, in chain order.
    pub states: Vec<TrialPoint>,
    /// Every evaluated candidate, in evaluation order.
    pub candidates: Vec<TrialPoint>,
    /// The strategy that actually produced `states`.
    pub strategy: InitializationKind,
}

/// Runs the configured strategy.
///
/// `InitializationKind::UserDefined` has no previous states to work with at
/// this level and is treated like `Randomize`.
pub fn initialize(
    config: &RunConfiguration,
    priors: &PriorSet,
    log_likelihood: &LogLikelihood<'_>,
    mode_finder: &dyn ModeFinder,
) -> Initialization {
    match config.initialization {
        InitializationKind::Map => {
            match laplace(config, priors, log_likelihood, mode_finder) {
                Ok(init) => init,
                Err(err) => {
                    log::warn!("MAP initialization failed ({err}); falling back to randomized initialization");
                    randomize(config, priors, log_likelihood)
                }
            }
        }
        InitializationKind::Randomize | InitializationKind::UserDefined => {
            randomize(config, priors, log_likelihood)
        }
    }
}

/// Elitist stratified initialization.
///
/// Evaluates `initial_iterations` candidates: `initial_iterations - 1`
/// Latin-hypercube rows followed by the vector of prior means. The
/// `n_chains` fittest become the starting states (ties keep evaluation order).
/// With a single initial iteration only the prior means are evaluated.
pub fn randomize(
    config: &RunConfiguration,
    priors: &PriorSet,
    log_likelihood: &LogLikelihood<'_>,
) -> Initialization {
    let stratified = config.initial_iterations.saturating_sub(1);
    let quantiles = LatinHypercube::random().sample(stratified, priors.len(), config.seed);
    let mut rows: Vec<Vec<f64>> = quantiles
        .outer_iter()
        .map(|row| priors.from_quantiles(&row.to_vec()))
        .collect();
    rows.push(priors.means());

    let candidates = evaluate_all(rows, log_likelihood, config.parallel);
    let mut ranked = candidates.clone();
    // Stable sort, so equal fitness keeps evaluation order.
    ranked.sort_by(|a, b| b.rank().total_cmp(&a.rank()));
    ranked.truncate(config.n_chains);

    Initialization {
        states: ranked,
        candidates,
        strategy: InitializationKind::Randomize,
    }
}

/// Mode-seeking initialization without fallback.
pub fn laplace(
    config: &RunConfiguration,
    priors: &PriorSet,
    log_likelihood: &LogLikelihood<'_>,
    mode_finder: &dyn ModeFinder,
) -> Result<Initialization, ModeError> {
    let d = priors.len();
    let mode = mode_finder.maximize(
        log_likelihood,
        &priors.means(),
        &priors.lower_bounds(),
        &priors.upper_bounds(),
    )?;
    if mode.parameters.len() != d {
        return Err(ModeError::DimensionMismatch {
            expected: d,
            got: mode.parameters.len(),
        });
    }
    log::debug!("located mode for initialization: {mode}");

    let covariance = laplace_covariance(&mode.hessian)?;
    let proposal = MultivariateNormal::new(mode.parameters, covariance)?;

    let quantiles = LatinHypercube::random().sample(config.initial_iterations, d, config.seed);
    let rows: Vec<Vec<f64>> = quantiles
        .outer_iter()
        .map(|row| proposal.inverse_cdf(&row.to_vec()))
        .collect();
    let candidates = evaluate_all(rows, log_likelihood, config.parallel);
    let states = candidates[..config.n_chains.min(candidates.len())].to_vec();

    Ok(Initialization {
        states,
        candidates,
        strategy: InitializationKind::Map,
    })
}

/// `LAPLACE_INFLATION * (-H)^-1`, symmetrised.
pub fn laplace_covariance(hessian: &DMatrix<f64>) -> Result<DMatrix<f64>, ModeError> {
    if !hessian.is_square() {
        return Err(ModeError::DimensionMismatch {
            expected: hessian.nrows(),
            got: hessian.ncols(),
        });
    }
    let negated = -hessian.clone();
    let inverse = negated.try_inverse().ok_or(ModeError::SingularHessian)?;
    let covariance = inverse * LAPLACE_INFLATION;
    let transposed = covariance.transpose();
    Ok((covariance + transposed) * 0.5)
}

fn evaluate_all(
    rows: Vec<Vec<f64>>,
    log_likelihood: &LogLikelihood<'_>,
    parallel: bool,
) -> Vec<TrialPoint> {
    if parallel {
        rows.into_par_iter()
            .map(|values| TrialPoint::evaluate(values, log_likelihood))
            .collect()
    } else {
        rows.into_iter()
            .map(|values| TrialPoint::evaluate(values, log_likelihood))
            .collect()
    }
}
