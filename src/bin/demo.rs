//! A small demo: random-walk Metropolis on a correlated 2D Gaussian, with a
//! progress bar, followed by convergence and posterior summaries.

use std::error::Error;

use multichain_mcmc::config::{InitializationKind, RunConfiguration};
use multichain_mcmc::control::RunContext;
use multichain_mcmc::distributions::{Prior, PriorSet};
use multichain_mcmc::metropolis_hastings::RandomWalkMetropolis;
use multichain_mcmc::progress::ProgressBarObserver;
use multichain_mcmc::sampler::Sampler;
use multichain_mcmc::stats::{potential_scale_reduction, summarize};
use statrs::distribution::Uniform;

/// Log-density of N([0, 0], [[2, 1], [1, 2]]) up to a constant.
fn log_likelihood(x: &[f64]) -> f64 {
    // Inverse covariance is [[2, -1], [-1, 2]] / 3.
    -(2.0 * x[0] * x[0] - 2.0 * x[0] * x[1] + 2.0 * x[1] * x[1]) / 6.0
}

fn main() -> Result<(), Box<dyn Error>> {
    const N_CHAINS: usize = 8;
    const SEED: u64 = 42;

    let priors = PriorSet::new(vec![
        Box::new(Uniform::new(-15.0, 15.0)?) as Box<dyn Prior>,
        Box::new(Uniform::new(-15.0, 15.0)?),
    ]);
    let config = RunConfiguration::new(N_CHAINS)
        .iterations(4_000)
        .warmup_iterations(1_000)
        .thinning_interval(10)
        .output_length(20_000)
        .initialization(InitializationKind::Map)
        .seed(SEED);
    let warmup = config.warmup_iterations;

    let mut sampler = Sampler::new(
        config,
        priors,
        log_likelihood,
        RandomWalkMetropolis::new(1.2),
    )?;
    let mut bar = ProgressBarObserver::new();
    let outcome = sampler.sample(&mut RunContext::new().with_progress(&mut bar))?;
    println!(
        "Finished after {} outer iterations ({:?})",
        outcome.iterations, outcome.termination
    );

    let state = sampler.state();
    if let Some(map) = state.map() {
        println!("MAP: {:?} (log-likelihood {:.4})", map.values(), map.fitness());
    }
    for (chain, rate) in sampler.acceptance_rates().iter().enumerate() {
        println!("Chain {chain}: acceptance rate {rate:.3}");
    }

    let rhat = potential_scale_reduction(state.chain_traces(), warmup)?;
    println!("R-hat per parameter: {rhat}");

    let output = state.output_samples();
    println!("Collected {} output samples", output.len());
    for (i, summary) in summarize(&output)?.iter().enumerate() {
        println!("dim_{i}: {summary}");
    }
    Ok(())
}
