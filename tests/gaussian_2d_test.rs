//! Tests verifying that the bundled transitions sample a correlated 2D Gaussian.
//!
//! We compare the sample means and covariance matrices of the output buffers
//! with the target's, and check that the chains agree with each other.

use multichain_mcmc::config::{InitializationKind, RunConfiguration};
use multichain_mcmc::core::Transition;
use multichain_mcmc::demcz::DifferentialEvolution;
use multichain_mcmc::distributions::{Prior, PriorSet};
use multichain_mcmc::metropolis_hastings::RandomWalkMetropolis;
use multichain_mcmc::sampler::Sampler;
use multichain_mcmc::stats::{max_rhat, to_array};
use ndarray::{arr1, arr2, Axis};
use ndarray_stats::CorrelationExt;
use statrs::distribution::Uniform;

const MEAN: [f64; 2] = [1.0, -2.0];
// Covariance [[4, 2], [2, 3]]; its inverse is [[3, -2], [-2, 4]] / 8.
fn log_likelihood(x: &[f64]) -> f64 {
    let a = x[0] - MEAN[0];
    let b = x[1] - MEAN[1];
    -0.5 * (3.0 * a * a - 4.0 * a * b + 4.0 * b * b) / 8.0
}

fn priors() -> PriorSet {
    PriorSet::new(vec![
        Box::new(Uniform::new(-20.0, 20.0).unwrap()) as Box<dyn Prior>,
        Box::new(Uniform::new(-20.0, 20.0).unwrap()),
    ])
}

/// Runs `transition` and checks the output against the target moments.
fn run_gaussian_2d_test<T: Transition>(transition: T, config: RunConfiguration) {
    let warmup = config.warmup_iterations;
    let output_length = config.output_length;
    let mut sampler = Sampler::new(config, priors(), log_likelihood, transition).unwrap();
    sampler.run().unwrap();
    let state = sampler.state();

    let samples = to_array(&state.output_samples()).unwrap();
    assert_eq!(samples.nrows(), output_length);

    let mean = samples.mean_axis(Axis(0)).unwrap();
    let cov = samples.t().cov(1.0).unwrap();
    approx::assert_abs_diff_eq!(mean, arr1(&MEAN), epsilon = 0.3);
    approx::assert_abs_diff_eq!(cov, arr2(&[[4.0, 2.0], [2.0, 3.0]]), epsilon = 0.7);

    let rhat = max_rhat(state.chain_traces(), warmup).unwrap();
    assert!(rhat < 1.1, "chains disagree: R-hat = {rhat}");

    let map = state.map().unwrap();
    assert!(map.fitness() > -0.5, "MAP too far from the mode: {map:?}");
    for rate in sampler.acceptance_rates() {
        assert!(rate > 0.05 && rate < 0.95, "acceptance rate {rate}");
    }
}

fn config() -> RunConfiguration {
    RunConfiguration::new(4)
        .iterations(2_000)
        .warmup_iterations(1_000)
        .thinning_interval(5)
        .output_length(8_000)
        .seed(42)
}

#[test]
fn random_walk_metropolis_4_chains() {
    run_gaussian_2d_test(RandomWalkMetropolis::new(1.5), config());
}

#[test]
fn random_walk_metropolis_sequential() {
    run_gaussian_2d_test(
        RandomWalkMetropolis::with_scales(vec![2.0, 1.7]),
        config().parallel(false).seed(7),
    );
}

#[test]
fn differential_evolution_from_map() {
    run_gaussian_2d_test(
        DifferentialEvolution::default(),
        config().initialization(InitializationKind::Map),
    );
}
