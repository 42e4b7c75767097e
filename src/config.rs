/*!
Run configuration.

A [`RunConfiguration`] is a plain value: build it with the consuming setters,
hand it to a [`Sampler`](crate::sampler::Sampler), and use
[`Sampler::reconfigure`](crate::sampler::Sampler::reconfigure) to swap in a
new one (which clears all run state).

# Examples

```rust
use multichain_mcmc::config::{InitializationKind, RunConfiguration};

let config = RunConfiguration::new(4)
    .iterations(2_000)
    .warmup_iterations(500)
    .thinning_interval(10)
    .output_length(4_000)
    .initialization(InitializationKind::Map)
    .seed(42);
assert!(config.validate().is_ok());
assert_eq!(config.total_iterations(), 2_000 + 1_000);
```
*/

use crate::error::ConfigError;

/// Smallest accepted number of recorded iterations.
pub const MIN_ITERATIONS: usize = 100;
/// Smallest accepted output length.
pub const MIN_OUTPUT_LENGTH: usize = 100;

/// How each chain obtains its first state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitializationKind {
    /// Latin-hypercube candidates drawn from the priors, best ones kept.
    #[default]
    Randomize,
    /// Laplace approximation around the mode; falls back to `Randomize`.
    Map,
    /// Continue from the final states of the previous run.
    UserDefined,
}

/// Everything that shapes a sampling run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfiguration {
    pub n_chains: usize,
    pub iterations: usize,
    pub warmup_iterations: usize,
    pub thinning_interval: usize,
    pub initial_iterations: usize,
    pub output_length: usize,
    pub seed: u64,
    pub initialization: InitializationKind,
    /// Run the per-chain fan-out on the rayon thread pool.
    pub parallel: bool,
    /// Fraction of the total outer iterations between progress reports.
    pub progress_interval: f64,
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self {
            n_chains: 4,
            iterations: 3_500,
            warmup_iterations: 1_750,
            thinning_interval: 20,
            initial_iterations: 40,
            output_length: 10_000,
            seed: 12_345,
            initialization: InitializationKind::Randomize,
            parallel: true,
            progress_interval: 0.01,
        }
    }
}

impl RunConfiguration {
    /// Default configuration with `n_chains` chains and ten initialization
    /// candidates per chain.
    pub fn new(n_chains: usize) -> Self {
        Self {
            n_chains,
            initial_iterations: 10 * n_chains,
            ..Self::default()
        }
    }

    pub fn iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn warmup_iterations(mut self, warmup_iterations: usize) -> Self {
        self.warmup_iterations = warmup_iterations;
        self
    }

    pub fn thinning_interval(mut self, thinning_interval: usize) -> Self {
        self.thinning_interval = thinning_interval;
        self
    }

    pub fn initial_iterations(mut self, initial_iterations: usize) -> Self {
        self.initial_iterations = initial_iterations;
        self
    }

    pub fn output_length(mut self, output_length: usize) -> Self {
        self.output_length = output_length;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn initialization(mut self, initialization: InitializationKind) -> Self {
        self.initialization = initialization;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn progress_interval(mut self, progress_interval: f64) -> Self {
        self.progress_interval = progress_interval;
        self
    }

    /// Checks every field and returns the first violation found.
    ///
    /// Pure: calling it any number of times gives the same answer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_chains < 1 {
            return Err(ConfigError::TooFewChains(self.n_chains));
        }
        if self.iterations < MIN_ITERATIONS {
            return Err(ConfigError::TooFewIterations {
                got: self.iterations,
                min: MIN_ITERATIONS,
            });
        }
        let max_warmup = self.iterations / 2;
        if self.warmup_iterations < 1 || self.warmup_iterations > max_warmup {
            return Err(ConfigError::WarmupOutOfRange {
                got: self.warmup_iterations,
                max: max_warmup,
            });
        }
        if self.thinning_interval < 1 {
            return Err(ConfigError::InvalidThinning(self.thinning_interval));
        }
        if self.initial_iterations < self.n_chains {
            return Err(ConfigError::TooFewInitialIterations {
                initial: self.initial_iterations,
                chains: self.n_chains,
            });
        }
        if self.output_length < MIN_OUTPUT_LENGTH {
            return Err(ConfigError::OutputTooShort {
                got: self.output_length,
                min: MIN_OUTPUT_LENGTH,
            });
        }
        if !(self.progress_interval > 0.0 && self.progress_interval <= 1.0) {
            return Err(ConfigError::InvalidProgressInterval(self.progress_interval));
        }
        Ok(())
    }

    /// Outer iterations spent filling the output buffers.
    pub fn output_iterations(&self) -> usize {
        self.output_length.div_ceil(self.n_chains.max(1))
    }

    /// Recorded iterations plus output iterations.
    pub fn total_iterations(&self) -> usize {
        self.iterations + self.output_iterations()
    }

    /// Outer iterations between two progress reports (at least one).
    pub fn progress_step(&self) -> usize {
        let step = (self.total_iterations() as f64 * self.progress_interval).round() as usize;
        step.max(1)
    }
}
