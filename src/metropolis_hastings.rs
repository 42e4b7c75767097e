/*!
# Random-walk Metropolis

A symmetric Gaussian random-walk [`Transition`]. Each step perturbs every
coordinate with independent normal noise and accepts the proposal with
probability `min(1, exp(fitness' - fitness))`. Proposals outside the prior
support are rejected without calling the log-likelihood.

## Example Usage

```rust
use multichain_mcmc::config::RunConfiguration;
use multichain_mcmc::distributions::{Prior, PriorSet};
use multichain_mcmc::metropolis_hastings::RandomWalkMetropolis;
use multichain_mcmc::sampler::Sampler;
use statrs::distribution::Uniform;

let priors = PriorSet::new(vec![
    Box::new(Uniform::new(-10.0, 10.0).unwrap()) as Box<dyn Prior>,
    Box::new(Uniform::new(-10.0, 10.0).unwrap()),
]);
let proposal = RandomWalkMetropolis::with_scales(vec![0.5, 2.0]);
assert_eq!(proposal.scale(1), 2.0);

let config = RunConfiguration::new(2)
    .iterations(100)
    .warmup_iterations(50)
    .thinning_interval(1)
    .output_length(100);
let mut sampler = Sampler::new(config, priors, |x: &[f64]| -x[0] * x[0] - x[1] * x[1], proposal).unwrap();
sampler.run().unwrap();
```
*/

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::core::{StepContext, Transition, TrialPoint};

/// Step size of the random walk.
#[derive(Debug, Clone, PartialEq)]
enum Scale {
    Shared(f64),
    PerParameter(Vec<f64>),
}

/// Gaussian random-walk Metropolis transition.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomWalkMetropolis {
    scale: Scale,
}

impl RandomWalkMetropolis {
    /// Same standard deviation for every parameter.
    pub fn new(scale: f64) -> Self {
        Self {
            scale: Scale::Shared(scale),
        }
    }

    /// One standard deviation per parameter. Parameters past the end of
    /// `scales` reuse its last entry.
    pub fn with_scales(scales: Vec<f64>) -> Self {
        Self {
            scale: Scale::PerParameter(scales),
        }
    }

    /// Standard deviation used for parameter `i`.
    pub fn scale(&self, i: usize) -> f64 {
        match &self.scale {
            Scale::Shared(s) => *s,
            Scale::PerParameter(scales) => scales
                .get(i)
                .or_else(|| scales.last())
                .copied()
                .unwrap_or(1.0),
        }
    }
}

impl Transition for RandomWalkMetropolis {
    fn advance(&self, current: &TrialPoint, ctx: &mut StepContext<'_>) -> TrialPoint {
        let proposed: Vec<f64> = current
            .values()
            .iter()
            .enumerate()
            .map(|(i, x)| {
                let z: f64 = StandardNormal.sample(ctx.rng());
                x + self.scale(i) * z
            })
            .collect();
        metropolis_update(current, proposed, ctx)
    }
}

/**
Accept/reject step shared by the Metropolis-type transitions.

Records exactly one proposal on `ctx`. A proposal outside the prior support
is rejected without being evaluated; otherwise it is accepted when
`ln(u) < fitness(proposed) - fitness(current)` for `u ~ U(0, 1)`. A NaN
difference never accepts.
*/
pub fn metropolis_update(
    current: &TrialPoint,
    proposed: Vec<f64>,
    ctx: &mut StepContext<'_>,
) -> TrialPoint {
    if !ctx.priors().contains(&proposed) {
        ctx.record(false);
        return current.clone();
    }
    let candidate = ctx.evaluate(proposed);
    let log_ratio = candidate.fitness() - current.fitness();
    let u: f64 = ctx.rng().gen();
    if u.ln() < log_ratio {
        ctx.record(true);
        candidate
    } else {
        ctx.record(false);
        current.clone()
    }
}
