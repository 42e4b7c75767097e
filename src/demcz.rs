//! Differential-evolution MCMC with sampling from past states (DE-MCz).
//!
//! Proposals jump along the difference of two members of the population
//! matrix:
//!
//! ```text
//! x' = x + gamma * (z1 - z2) + e,   e ~ N(0, jitter^2)
//! ```
//!
//! with `gamma = 2.38 / sqrt(2 d)`, replaced by `1.0` with probability
//! [`DifferentialEvolution::full_jump_probability`] so that chains can hop
//! between modes. The population grows with every iteration, so the proposal
//! adapts to the posterior without chains ever reading each other's current
//! state.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::core::{StepContext, Transition, TrialPoint};
use crate::metropolis_hastings::metropolis_update;

/// DE-MCz transition.
#[derive(Debug, Clone, PartialEq)]
pub struct DifferentialEvolution {
    /// Standard deviation of the additive noise.
    pub jitter: f64,
    /// Probability of a full `gamma = 1` jump.
    pub full_jump_probability: f64,
}

impl Default for DifferentialEvolution {
    fn default() -> Self {
        Self {
            jitter: 1e-4,
            full_jump_probability: 0.1,
        }
    }
}

impl DifferentialEvolution {
    pub fn new(jitter: f64, full_jump_probability: f64) -> Self {
        Self {
            jitter,
            full_jump_probability,
        }
    }

    /// `full_jump_probability` clamped to `[0, 1]`; NaN disables full jumps.
    fn jump_probability(&self) -> f64 {
        if self.full_jump_probability.is_nan() {
            0.0
        } else {
            self.full_jump_probability.clamp(0.0, 1.0)
        }
    }

    /// `2.38 / sqrt(2 d)`.
    pub fn scaling_factor(dimension: usize) -> f64 {
        2.38 / (2.0 * dimension.max(1) as f64).sqrt()
    }
}

impl Transition for DifferentialEvolution {
    fn advance(&self, current: &TrialPoint, ctx: &mut StepContext<'_>) -> TrialPoint {
        let n = ctx.population().len();
        if n < 2 {
            ctx.record(false);
            return current.clone();
        }

        let rng = ctx.rng();
        let a = rng.gen_range(0..n);
        let mut b = rng.gen_range(0..n - 1);
        if b >= a {
            b += 1;
        }
        let gamma = if rng.gen_bool(self.jump_probability()) {
            1.0
        } else {
            Self::scaling_factor(current.dimension())
        };
        let noise = Normal::new(0.0, self.jitter.abs()).ok();

        let mut proposed = current.values().to_vec();
        for (i, x) in proposed.iter_mut().enumerate() {
            let z1 = ctx.population()[a].values()[i];
            let z2 = ctx.population()[b].values()[i];
            let e = match &noise {
                Some(normal) => normal.sample(ctx.rng()),
                None => 0.0,
            };
            *x += gamma * (z1 - z2) + e;
        }
        metropolis_update(current, proposed, ctx)
    }

    fn is_population_based(&self) -> bool {
        true
    }
}
