//! Error types shared across the crate.

use thiserror::Error;

/// A [`RunConfiguration`](crate::config::RunConfiguration) field is out of range.
///
/// Validation runs before any chain advances, so one of these errors always
/// means that nothing was sampled.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("number of chains must be at least 1, got {0}")]
    TooFewChains(usize),
    #[error("number of iterations must be at least {min}, got {got}")]
    TooFewIterations { got: usize, min: usize },
    #[error("warmup iterations must lie in [1, {max}], got {got}")]
    WarmupOutOfRange { got: usize, max: usize },
    #[error("thinning interval must be at least 1, got {0}")]
    InvalidThinning(usize),
    #[error("initial iterations ({initial}) must be at least the number of chains ({chains})")]
    TooFewInitialIterations { initial: usize, chains: usize },
    #[error("output length must be at least {min}, got {got}")]
    OutputTooShort { got: usize, min: usize },
    #[error("progress interval must lie in (0, 1], got {0}")]
    InvalidProgressInterval(f64),
}

/// Failure while locating the posterior mode or building the Laplace proposal.
///
/// The sampler recovers from all of these by falling back to stratified
/// random initialization.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModeError {
    #[error("mode finder did not converge after {iterations} iterations")]
    NotConverged { iterations: usize },
    #[error("mode finder returned a non-finite objective value")]
    NonFiniteMode,
    #[error("the negated Hessian at the mode is singular")]
    SingularHessian,
    #[error("the Laplace covariance is not positive definite")]
    NotPositiveDefinite,
    #[error("expected {expected} dimensions, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Errors returned by [`Sampler`](crate::sampler::Sampler).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SamplerError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),
    #[error("at least one prior distribution is required")]
    NoPriors,
    #[error("cannot resume: there is no previous run to continue from")]
    NothingToResume,
    #[error("chain state has {got} parameters but the prior set has {expected}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("expected one starting state per chain ({expected}), got {got}")]
    ChainCountMismatch { expected: usize, got: usize },
}
