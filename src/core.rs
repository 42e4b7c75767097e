/*!
Core building blocks shared by the scheduler and every transition rule.

- [`TrialPoint`]: a parameter vector together with its log-likelihood.
- [`Transition`]: the per-step rule that advances one chain.
- [`StepContext`]: everything a transition may touch while advancing a chain.
  It hands out the chain's own random stream and acceptance counters, a
  read-only view of the population matrix and the log-likelihood.

# Examples

```rust
use multichain_mcmc::core::{StepContext, Transition, TrialPoint};

/// Moves every coordinate one unit to the right and always accepts.
struct Shift;

impl Transition for Shift {
    fn advance(&self, current: &TrialPoint, ctx: &mut StepContext<'_>) -> TrialPoint {
        let moved: Vec<f64> = current.values().iter().map(|x| x + 1.0).collect();
        ctx.record(true);
        ctx.evaluate(moved)
    }
}
```
*/

use rand::rngs::SmallRng;

use crate::distributions::PriorSet;

/// The log-likelihood signature the engine works with.
///
/// It is called from inside the parallel fan-out, so it has to be `Sync` and
/// should return an extreme value rather than panic when it is handed values
/// outside its meaningful support.
pub type LogLikelihood<'a> = dyn Fn(&[f64]) -> f64 + Sync + 'a;

/// A parameter vector and its fitness (log-likelihood).
///
/// Trial points are treated as immutable once created: a transition that
/// wants a different point builds a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialPoint {
    values: Vec<f64>,
    fitness: f64,
}

impl TrialPoint {
    pub fn new(values: Vec<f64>, fitness: f64) -> Self {
        Self { values, fitness }
    }

    /// Evaluates `log_likelihood` at `values` and wraps the result.
    pub fn evaluate(values: Vec<f64>, log_likelihood: &LogLikelihood<'_>) -> Self {
        let fitness = log_likelihood(&values);
        Self { values, fitness }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn fitness(&self) -> f64 {
        self.fitness
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Fitness used for ranking; NaN ranks below everything else.
    pub(crate) fn rank(&self) -> f64 {
        if self.fitness.is_nan() {
            f64::NEG_INFINITY
        } else {
            self.fitness
        }
    }
}

/// Per-chain acceptance counters, written by the transition through
/// [`StepContext::record`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptanceStats {
    pub accepted: u64,
    pub sampled: u64,
}

impl AcceptanceStats {
    /// Fraction of proposals that were accepted, `0.0` before the first one.
    pub fn rate(&self) -> f64 {
        if self.sampled == 0 {
            0.0
        } else {
            self.accepted as f64 / self.sampled as f64
        }
    }
}

/// What a [`Transition`] sees while it advances one chain by one step.
///
/// A context is built fresh by the scheduler for every step and only lives
/// for the duration of that call. Everything mutable in it belongs to the
/// chain being advanced.
pub struct StepContext<'a> {
    chain: usize,
    rng: &'a mut SmallRng,
    stats: &'a mut AcceptanceStats,
    population: &'a [TrialPoint],
    priors: &'a PriorSet,
    log_likelihood: &'a LogLikelihood<'a>,
}

impl<'a> StepContext<'a> {
    pub fn new(
        chain: usize,
        rng: &'a mut SmallRng,
        stats: &'a mut AcceptanceStats,
        population: &'a [TrialPoint],
        priors: &'a PriorSet,
        log_likelihood: &'a LogLikelihood<'a>,
    ) -> Self {
        Self {
            chain,
            rng,
            stats,
            population,
            priors,
            log_likelihood,
        }
    }

    /// Index of the chain being advanced.
    pub fn chain(&self) -> usize {
        self.chain
    }

    /// The chain's own random stream.
    pub fn rng(&mut self) -> &mut SmallRng {
        &mut *self.rng
    }

    /// The population matrix as of the end of the previous iteration.
    ///
    /// Empty unless the active transition is population based.
    pub fn population(&self) -> &[TrialPoint] {
        self.population
    }

    pub fn priors(&self) -> &PriorSet {
        self.priors
    }

    /// Evaluates the log-likelihood at `values`.
    pub fn evaluate(&self, values: Vec<f64>) -> TrialPoint {
        TrialPoint::evaluate(values, self.log_likelihood)
    }

    /// Counts one proposal, and one acceptance if `accepted` is true.
    pub fn record(&mut self, accepted: bool) {
        self.stats.sampled += 1;
        if accepted {
            self.stats.accepted += 1;
        }
    }

    pub fn stats(&self) -> AcceptanceStats {
        *self.stats
    }
}

/// A rule that advances a single chain by one step.
///
/// Implementations must only depend on the current state, the chain's random
/// stream and the read-only data exposed by [`StepContext`]. They never see
/// other chains' current states, which is what allows the scheduler to run
/// every chain on its own thread. Every call is expected to [`record`] the
/// proposal it made.
///
/// [`record`]: StepContext::record
pub trait Transition: Sync {
    /// Returns the next state of the chain.
    fn advance(&self, current: &TrialPoint, ctx: &mut StepContext<'_>) -> TrialPoint;

    /// Whether this rule draws on the shared population matrix.
    ///
    /// When true the scheduler seeds the population with the initialization
    /// candidates and appends every chain's new state after each iteration.
    fn is_population_based(&self) -> bool {
        false
    }
}

impl<T: Transition + ?Sized> Transition for &T {
    fn advance(&self, current: &TrialPoint, ctx: &mut StepContext<'_>) -> TrialPoint {
        (**self).advance(current, ctx)
    }

    fn is_population_based(&self) -> bool {
        (**self).is_population_based()
    }
}
