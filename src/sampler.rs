/*!
The multi-chain scheduler.

Every outer iteration advances each chain `thinning_interval` times (on the
rayon pool or sequentially), waits for all chains, and then reduces their new
states into the [`RunState`] on the calling thread. The first `iterations`
outer iterations feed the chain traces; the following ones fill the output
buffers until `output_length` states have been collected.

# Examples

```rust
use multichain_mcmc::config::RunConfiguration;
use multichain_mcmc::distributions::{Prior, PriorSet};
use multichain_mcmc::metropolis_hastings::RandomWalkMetropolis;
use multichain_mcmc::sampler::Sampler;
use statrs::distribution::Uniform;

let priors = PriorSet::new(vec![Box::new(Uniform::new(-5.0, 5.0).unwrap()) as Box<dyn Prior>]);
let config = RunConfiguration::new(2)
    .iterations(200)
    .warmup_iterations(50)
    .thinning_interval(2)
    .output_length(100)
    .seed(7);
let log_likelihood = |x: &[f64]| -0.5 * x[0] * x[0];

let mut sampler = Sampler::new(config, priors, log_likelihood, RandomWalkMetropolis::new(1.0)).unwrap();
let outcome = sampler.run().unwrap();

assert!(!outcome.is_cancelled());
assert_eq!(sampler.state().chain_traces()[0].len(), 200);
assert_eq!(sampler.state().output_count(), 100);
```
*/

use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::config::{InitializationKind, RunConfiguration};
use crate::control::{RunContext, RunOutcome, Termination};
use crate::core::{AcceptanceStats, LogLikelihood, StepContext, Transition, TrialPoint};
use crate::distributions::PriorSet;
use crate::error::SamplerError;
use crate::init::initialize;
use crate::optimize::{ModeFinder, NelderMead};
use crate::progress::{Phase, Progress};
use crate::state::RunState;

/// One chain's exclusively owned state.
#[derive(Debug, Clone)]
struct ChainState {
    current: TrialPoint,
    rng: SmallRng,
    stats: AcceptanceStats,
}

impl ChainState {
    fn new(current: TrialPoint, seed: u64, chain: usize) -> Self {
        Self {
            current,
            rng: SmallRng::seed_from_u64(chain_seed(seed, chain)),
            stats: AcceptanceStats::default(),
        }
    }

    fn advance<T: Transition>(
        &mut self,
        chain: usize,
        steps: usize,
        transition: &T,
        population: &[TrialPoint],
        priors: &PriorSet,
        log_likelihood: &LogLikelihood<'_>,
    ) {
        let dimension = self.current.dimension();
        for _ in 0..steps {
            let mut ctx = StepContext::new(
                chain,
                &mut self.rng,
                &mut self.stats,
                population,
                priors,
                log_likelihood,
            );
            self.current = transition.advance(&self.current, &mut ctx);
            debug_assert_eq!(
                self.current.dimension(),
                dimension,
                "transition changed the parameter count of chain {chain}"
            );
        }
    }
}

/// Seed of chain `chain`'s random stream; the initialization stream uses the
/// run seed itself.
pub fn chain_seed(seed: u64, chain: usize) -> u64 {
    seed.wrapping_add(chain as u64 + 1)
}

/// Drives `n_chains` Markov chains with transition `T` over log-likelihood `F`.
pub struct Sampler<T, F> {
    config: RunConfiguration,
    priors: PriorSet,
    log_likelihood: F,
    transition: T,
    mode_finder: Box<dyn ModeFinder>,
    chains: Vec<ChainState>,
    state: RunState,
    initialization: Option<InitializationKind>,
}

impl<T, F> Sampler<T, F>
where
    T: Transition,
    F: Fn(&[f64]) -> f64 + Sync,
{
    /// Validates `config` and builds a sampler with an empty run state.
    ///
    /// MAP initialization uses [`NelderMead`] unless another finder is set
    /// with [`with_mode_finder`](Self::with_mode_finder).
    pub fn new(
        config: RunConfiguration,
        priors: PriorSet,
        log_likelihood: F,
        transition: T,
    ) -> Result<Self, SamplerError> {
        config.validate()?;
        if priors.is_empty() {
            return Err(SamplerError::NoPriors);
        }
        let state = RunState::new(config.n_chains);
        Ok(Self {
            config,
            priors,
            log_likelihood,
            transition,
            mode_finder: Box::new(NelderMead::default()),
            chains: Vec::new(),
            state,
            initialization: None,
        })
    }

    pub fn with_mode_finder<M: ModeFinder + 'static>(mut self, mode_finder: M) -> Self {
        self.mode_finder = Box::new(mode_finder);
        self
    }

    pub fn configuration(&self) -> &RunConfiguration {
        &self.config
    }

    pub fn priors(&self) -> &PriorSet {
        &self.priors
    }

    pub fn transition(&self) -> &T {
        &self.transition
    }

    /// Replaces the configuration and discards all run state.
    ///
    /// On error the sampler is left untouched.
    pub fn reconfigure(&mut self, config: RunConfiguration) -> Result<(), SamplerError> {
        config.validate()?;
        self.config = config;
        self.reset();
        Ok(())
    }

    /// Discards chains and run state; the next run initializes afresh.
    pub fn reset(&mut self) {
        self.chains.clear();
        self.state = RunState::new(self.config.n_chains);
        self.initialization = None;
    }

    /// Supplies the chains' starting points for a
    /// [`UserDefined`](InitializationKind::UserDefined) or resumed run.
    ///
    /// Clears the run state. Each chain gets a fresh random stream.
    pub fn set_initial_states(&mut self, states: Vec<Vec<f64>>) -> Result<(), SamplerError> {
        if states.len() != self.config.n_chains {
            return Err(SamplerError::ChainCountMismatch {
                expected: self.config.n_chains,
                got: states.len(),
            });
        }
        if let Some(bad) = states.iter().find(|s| s.len() != self.priors.len()) {
            return Err(SamplerError::DimensionMismatch {
                expected: self.priors.len(),
                got: bad.len(),
            });
        }
        let ll: &LogLikelihood<'_> = &self.log_likelihood;
        let seed = self.config.seed;
        self.chains = states
            .into_iter()
            .enumerate()
            .map(|(j, values)| ChainState::new(TrialPoint::evaluate(values, ll), seed, j))
            .collect();
        self.state = RunState::new(self.config.n_chains);
        self.initialization = Some(InitializationKind::UserDefined);
        Ok(())
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Current state of every chain; empty before the first run.
    pub fn chain_states(&self) -> impl Iterator<Item = &TrialPoint> + '_ {
        self.chains.iter().map(|c| &c.current)
    }

    pub fn acceptance_rates(&self) -> Vec<f64> {
        self.chains.iter().map(|c| c.stats.rate()).collect()
    }

    /// Strategy that produced the current chains' starting points.
    pub fn initialization_used(&self) -> Option<InitializationKind> {
        self.initialization
    }

    /// A fresh run with default options.
    pub fn run(&mut self) -> Result<RunOutcome, SamplerError> {
        self.sample(&mut RunContext::new())
    }

    /// Continues every chain from the last entry of its previous trace.
    pub fn resume(&mut self) -> Result<RunOutcome, SamplerError> {
        self.sample(&mut RunContext::new().resume(true))
    }

    /**
    Runs the scheduler to completion or until `ctx` is cancelled.

    Chains are initialized afresh unless `ctx` asks to resume or the
    configuration selects [`UserDefined`](InitializationKind::UserDefined).
    Both continue each chain from the last entry of its previous trace (or
    from the state given to [`set_initial_states`](Self::set_initial_states))
    with a new [`RunState`]; the population matrix is carried over.

    Cancellation is not an error: the returned outcome says how many outer
    iterations were reduced, and everything recorded up to then is kept.
    */
    pub fn sample(&mut self, ctx: &mut RunContext<'_>) -> Result<RunOutcome, SamplerError> {
        self.config.validate()?;
        if ctx.is_resume() || self.config.initialization == InitializationKind::UserDefined {
            self.prepare_resume()?;
        } else {
            self.initialize_chains();
        }

        let Self {
            config,
            priors,
            log_likelihood,
            transition,
            chains,
            state,
            ..
        } = self;
        let (config, priors, transition) = (&*config, &*priors, &*transition);
        let ll: &LogLikelihood<'_> = &*log_likelihood;
        let total = config.total_iterations();
        let report_every = config.progress_step();
        let steps = config.thinning_interval;
        let population_based = transition.is_population_based();

        log::debug!(
            "sampling {} chains for {} outer iterations (thinning {}, parallel {})",
            chains.len(),
            total,
            steps,
            config.parallel
        );

        let mut termination = Termination::Completed;
        let mut completed = 0;
        for i in 1..=total {
            {
                let population = state.population();
                let fan_out = |(j, chain): (usize, &mut ChainState)| {
                    chain.advance(j, steps, transition, population, priors, ll)
                };
                if config.parallel {
                    chains.par_iter_mut().enumerate().for_each(fan_out);
                } else {
                    chains.iter_mut().enumerate().for_each(fan_out);
                }
            }

            let states: Vec<TrialPoint> = chains.iter().map(|c| c.current.clone()).collect();
            if population_based {
                state.extend_population(states.iter().cloned());
            }
            let phase = if i <= config.iterations {
                state.record_trace(&states);
                Phase::Recording
            } else {
                state.record_output(&states, config.output_length);
                Phase::Output
            };
            state.set_acceptance(chains.iter().map(|c| c.stats));
            completed = i;

            if ctx.cancellation().is_cancelled() {
                log::info!("sampling cancelled after {i} of {total} outer iterations");
                termination = Termination::Cancelled;
                break;
            }
            if i % report_every == 0 || i == total {
                ctx.report(&Progress {
                    iteration: i,
                    total,
                    phase,
                    acceptance_rate: state.mean_acceptance_rate(),
                });
            }
        }
        ctx.finish();

        if termination == Termination::Completed {
            log::info!(
                "sampling finished: {} outer iterations, mean acceptance rate {:.3}",
                completed,
                state.mean_acceptance_rate()
            );
        }
        Ok(RunOutcome {
            termination,
            iterations: completed,
        })
    }

    fn initialize_chains(&mut self) {
        let init = initialize(
            &self.config,
            &self.priors,
            &self.log_likelihood,
            self.mode_finder.as_ref(),
        );
        log::debug!(
            "initialized {} chains with {:?} from {} candidates",
            init.states.len(),
            init.strategy,
            init.candidates.len()
        );

        let seed = self.config.seed;
        self.chains = init
            .states
            .into_iter()
            .enumerate()
            .map(|(j, current)| ChainState::new(current, seed, j))
            .collect();
        self.state = RunState::new(self.config.n_chains);
        if self.transition.is_population_based() {
            self.state.extend_population(init.candidates);
        }
        self.initialization = Some(init.strategy);
    }

    fn prepare_resume(&mut self) -> Result<(), SamplerError> {
        if self.chains.is_empty() {
            return Err(SamplerError::NothingToResume);
        }
        if self.chains.len() != self.config.n_chains {
            return Err(SamplerError::ChainCountMismatch {
                expected: self.config.n_chains,
                got: self.chains.len(),
            });
        }
        log::debug!("resuming {} chains", self.chains.len());

        let previous = std::mem::take(&mut self.state);
        // Chains pick up at the last traced entry; output-phase states are
        // left behind. Chains without a trace keep their current state.
        for (chain, trace) in self.chains.iter_mut().zip(previous.chain_traces()) {
            if let Some(last) = trace.last() {
                chain.current = last.clone();
            }
        }
        for chain in &mut self.chains {
            chain.stats = AcceptanceStats::default();
        }
        self.state = RunState::new(self.config.n_chains);
        self.state.extend_population(previous.into_population());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::CancellationToken;
    use crate::distributions::Prior;
    use crate::error::ConfigError;
    use crate::progress::ProgressObserver;
    use rand::Rng;
    use statrs::distribution::Uniform;

    /// Returns the current state and counts every call as accepted.
    struct Stay;

    impl Transition for Stay {
        fn advance(&self, current: &TrialPoint, ctx: &mut StepContext<'_>) -> TrialPoint {
            ctx.record(true);
            current.clone()
        }
    }

    /// Random jumps inside the unit box, accepted half of the time.
    struct Jitter;

    impl Transition for Jitter {
        fn advance(&self, current: &TrialPoint, ctx: &mut StepContext<'_>) -> TrialPoint {
            let accept = ctx.rng().gen_bool(0.5);
            ctx.record(accept);
            if accept {
                let values = current
                    .values()
                    .iter()
                    .map(|_| ctx.rng().gen::<f64>())
                    .collect();
                ctx.evaluate(values)
            } else {
                current.clone()
            }
        }
    }

    /// Counts the population it sees and never moves.
    struct Collector;

    impl Transition for Collector {
        fn advance(&self, current: &TrialPoint, ctx: &mut StepContext<'_>) -> TrialPoint {
            ctx.record(!ctx.population().is_empty());
            current.clone()
        }

        fn is_population_based(&self) -> bool {
            true
        }
    }

    fn unit_priors(d: usize) -> PriorSet {
        (0..d)
            .map(|_| Box::new(Uniform::new(0.0, 1.0).unwrap()) as Box<dyn Prior>)
            .collect()
    }

    fn small_config(chains: usize) -> RunConfiguration {
        RunConfiguration::new(chains)
            .iterations(100)
            .warmup_iterations(10)
            .thinning_interval(1)
            .output_length(100)
            .seed(3)
            .parallel(false)
    }

    fn ll(x: &[f64]) -> f64 {
        -x.iter().map(|v| (v - 0.5).powi(2)).sum::<f64>()
    }

    #[test]
    fn rejects_invalid_setup() {
        let err = Sampler::new(small_config(0), unit_priors(1), ll, Stay).err();
        assert_eq!(
            err,
            Some(SamplerError::InvalidConfiguration(ConfigError::TooFewChains(0)))
        );
        let err = Sampler::new(small_config(1), PriorSet::new(vec![]), ll, Stay).err();
        assert_eq!(err, Some(SamplerError::NoPriors));
    }

    #[test]
    fn completed_run_fills_traces_and_output() {
        let mut sampler = Sampler::new(small_config(3), unit_priors(2), ll, Jitter).unwrap();
        let outcome = sampler.run().unwrap();

        assert_eq!(outcome.termination, Termination::Completed);
        assert_eq!(outcome.iterations, 100 + 34);
        let state = sampler.state();
        for trace in state.chain_traces() {
            assert_eq!(trace.len(), 100);
        }
        assert_eq!(state.mean_log_likelihood().len(), 100);
        assert_eq!(state.output_count(), 100);
        let lengths: Vec<usize> = state.output().iter().map(Vec::len).collect();
        assert_eq!(lengths, vec![34, 33, 33]);
        assert!(state.population().is_empty());

        let map = state.map().unwrap();
        for sample in state.output_samples() {
            assert!(map.fitness() >= sample.fitness());
        }
        for rate in sampler.acceptance_rates() {
            assert!(rate > 0.3 && rate < 0.7);
        }
        assert_eq!(state.acceptance()[0].sampled, 134);
    }

    #[test]
    fn mean_log_likelihood_is_mean_of_chain_fitness() {
        let mut sampler = Sampler::new(small_config(4), unit_priors(1), ll, Jitter).unwrap();
        sampler.run().unwrap();
        let state = sampler.state();
        for (i, mean) in state.mean_log_likelihood().iter().enumerate() {
            let expected = state
                .chain_traces()
                .iter()
                .map(|t| t[i].fitness())
                .sum::<f64>()
                / 4.0;
            assert!((mean - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn chain_streams_are_seeded_per_chain() {
        assert_eq!(chain_seed(10, 0), 11);
        assert_eq!(chain_seed(10, 3), 14);
        assert_eq!(chain_seed(u64::MAX, 0), 0);
    }

    /// Appends a parameter on every step.
    struct Grow;

    impl Transition for Grow {
        fn advance(&self, current: &TrialPoint, ctx: &mut StepContext<'_>) -> TrialPoint {
            ctx.record(true);
            let mut values = current.values().to_vec();
            values.push(0.5);
            ctx.evaluate(values)
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "transition changed the parameter count")]
    fn transition_must_keep_the_dimension() {
        let mut sampler = Sampler::new(small_config(2), unit_priors(1), ll, Grow).unwrap();
        let _ = sampler.run();
    }

    #[test]
    fn resume_without_previous_run_fails() {
        let mut sampler = Sampler::new(small_config(2), unit_priors(1), ll, Stay).unwrap();
        assert_eq!(sampler.resume().err(), Some(SamplerError::NothingToResume));

        let mut user = Sampler::new(
            small_config(2).initialization(InitializationKind::UserDefined),
            unit_priors(1),
            ll,
            Stay,
        )
        .unwrap();
        assert_eq!(user.run().err(), Some(SamplerError::NothingToResume));
    }

    #[test]
    fn resume_continues_from_user_defined_states() {
        let mut sampler = Sampler::new(small_config(2), unit_priors(1), ll, Jitter).unwrap();
        sampler.run().unwrap();
        let last: Vec<TrialPoint> = sampler.chain_states().cloned().collect();

        let mut continued = sampler_clone_state(&sampler);
        sampler.resume().unwrap();
        assert_eq!(sampler.state().chain_traces()[0].len(), 100);
        assert_eq!(sampler.state().acceptance()[0].sampled, 100 + 50);

        // No trace yet: the states given by the user are the starting points.
        continued.resume().unwrap();
        for (j, trace) in continued.state().chain_traces().iter().enumerate() {
            assert_eq!(trace[0], last[j]);
        }
    }

    /// A `Stay` sampler whose chains sit where `sampler`'s chains ended.
    fn sampler_clone_state<T, F>(sampler: &Sampler<T, F>) -> Sampler<Stay, fn(&[f64]) -> f64>
    where
        T: Transition,
        F: Fn(&[f64]) -> f64 + Sync,
    {
        let mut other = Sampler::new(
            sampler.configuration().clone(),
            unit_priors(1),
            ll as fn(&[f64]) -> f64,
            Stay,
        )
        .unwrap();
        let states = sampler.chain_states().map(|p| p.values().to_vec()).collect();
        other.set_initial_states(states).unwrap();
        other
    }

    #[test]
    fn set_initial_states_checks_shape() {
        let mut sampler = Sampler::new(small_config(2), unit_priors(2), ll, Stay).unwrap();
        assert_eq!(
            sampler.set_initial_states(vec![vec![0.1, 0.2]]),
            Err(SamplerError::ChainCountMismatch {
                expected: 2,
                got: 1
            })
        );
        assert_eq!(
            sampler.set_initial_states(vec![vec![0.1, 0.2], vec![0.3]]),
            Err(SamplerError::DimensionMismatch {
                expected: 2,
                got: 1
            })
        );
        sampler
            .set_initial_states(vec![vec![0.1, 0.2], vec![0.3, 0.4]])
            .unwrap();
        assert_eq!(
            sampler.initialization_used(),
            Some(InitializationKind::UserDefined)
        );
        sampler.resume().unwrap();
        assert_eq!(sampler.state().chain_traces()[1][99].values(), &[0.3, 0.4]);
    }

    #[test]
    fn reconfigure_clears_run_state() {
        let mut sampler = Sampler::new(small_config(2), unit_priors(1), ll, Stay).unwrap();
        sampler.run().unwrap();
        assert!(sampler.state().map().is_some());

        let invalid = small_config(2).thinning_interval(0);
        assert!(sampler.reconfigure(invalid).is_err());
        assert!(sampler.state().map().is_some());

        sampler.reconfigure(small_config(3)).unwrap();
        assert_eq!(sampler.state().n_chains(), 3);
        assert!(sampler.state().map().is_none());
        assert_eq!(sampler.chain_states().count(), 0);
        assert_eq!(sampler.resume().err(), Some(SamplerError::NothingToResume));
    }

    #[test]
    fn population_is_seeded_and_grows() {
        let config = small_config(2).initial_iterations(6);
        let mut sampler = Sampler::new(config, unit_priors(1), ll, Collector).unwrap();
        sampler.run().unwrap();
        // 6 initial candidates, then 2 states per iteration.
        assert_eq!(sampler.state().population().len(), 6 + 2 * 150);
        assert_eq!(sampler.acceptance_rates(), vec![1.0, 1.0]);

        sampler.resume().unwrap();
        assert_eq!(sampler.state().population().len(), 6 + 2 * 150 * 2);
    }

    #[test]
    fn cancelled_before_start_keeps_one_iteration() {
        let mut sampler = Sampler::new(small_config(2), unit_priors(1), ll, Jitter).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let outcome = sampler
            .sample(&mut RunContext::new().with_cancellation(token))
            .unwrap();
        assert!(outcome.is_cancelled());
        assert_eq!(outcome.iterations, 1);
        for trace in sampler.state().chain_traces() {
            assert_eq!(trace.len(), 1);
        }
        assert_eq!(sampler.state().output_count(), 0);
    }

    #[test]
    fn progress_reports_reach_the_end() {
        let mut sampler = Sampler::new(
            small_config(1).progress_interval(0.1),
            unit_priors(1),
            ll,
            Stay,
        )
        .unwrap();
        let mut seen: Vec<Progress> = Vec::new();
        let mut observer = |p: &Progress| seen.push(p.clone());
        {
            let observer: &mut dyn ProgressObserver = &mut observer;
            sampler
                .sample(&mut RunContext::new().with_progress(observer))
                .unwrap();
        }
        // 200 outer iterations reported every 20.
        assert_eq!(seen.len(), 10);
        assert_eq!(seen[0].iteration, 20);
        assert_eq!(seen[0].phase, Phase::Recording);
        let last = seen.last().unwrap();
        assert_eq!(last.fraction(), 1.0);
        assert_eq!(last.phase, Phase::Output);
        assert_eq!(last.acceptance_rate, 1.0);
    }

    #[test]
    fn parallel_matches_sequential() {
        let mut sequential = Sampler::new(small_config(4), unit_priors(2), ll, Jitter).unwrap();
        let mut parallel =
            Sampler::new(small_config(4).parallel(true), unit_priors(2), ll, Jitter).unwrap();
        sequential.run().unwrap();
        parallel.run().unwrap();
        assert_eq!(sequential.state(), parallel.state());
    }
}
