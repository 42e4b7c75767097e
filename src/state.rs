//! The diagnostics store filled by the scheduler.
//!
//! A [`RunState`] is only ever written between two fan-outs, from the thread
//! that drives the run. Readers get it back through
//! [`Sampler::state`](crate::sampler::Sampler::state).

use crate::core::{AcceptanceStats, TrialPoint};

/// Traces, output buffers and running statistics of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunState {
    chain_traces: Vec<Vec<TrialPoint>>,
    output: Vec<Vec<TrialPoint>>,
    population: Vec<TrialPoint>,
    map: Option<TrialPoint>,
    mean_log_likelihood: Vec<f64>,
    output_count: usize,
    acceptance: Vec<AcceptanceStats>,
}

impl RunState {
    /// Empty state for `n_chains` chains.
    pub fn new(n_chains: usize) -> Self {
        Self {
            chain_traces: vec![Vec::new(); n_chains],
            output: vec![Vec::new(); n_chains],
            acceptance: vec![AcceptanceStats::default(); n_chains],
            ..Self::default()
        }
    }

    pub fn n_chains(&self) -> usize {
        self.chain_traces.len()
    }

    /// Appends one recording-phase iteration: every chain's state plus the
    /// mean of their fitness values.
    pub(crate) fn record_trace(&mut self, states: &[TrialPoint]) {
        let total: f64 = states.iter().map(TrialPoint::fitness).sum();
        self.mean_log_likelihood.push(total / states.len() as f64);
        for (trace, state) in self.chain_traces.iter_mut().zip(states) {
            trace.push(state.clone());
        }
    }

    /// Appends one output-phase iteration, chain by chain, until
    /// `output_length` states have been collected overall.
    ///
    /// The MAP estimate only moves on a strict improvement, so the first state
    /// reaching a given fitness keeps it.
    pub(crate) fn record_output(&mut self, states: &[TrialPoint], output_length: usize) {
        for (buffer, state) in self.output.iter_mut().zip(states) {
            if self.output_count >= output_length {
                break;
            }
            buffer.push(state.clone());
            self.output_count += 1;

            let improves = match &self.map {
                Some(best) => state.rank() > best.rank(),
                None => true,
            };
            if improves {
                self.map = Some(state.clone());
            }
        }
    }

    pub(crate) fn extend_population<I>(&mut self, states: I)
    where
        I: IntoIterator<Item = TrialPoint>,
    {
        self.population.extend(states);
    }

    pub(crate) fn set_acceptance<I>(&mut self, stats: I)
    where
        I: IntoIterator<Item = AcceptanceStats>,
    {
        self.acceptance = stats.into_iter().collect();
    }

    pub(crate) fn into_population(self) -> Vec<TrialPoint> {
        self.population
    }

    /// One trace per chain, one entry per recorded iteration.
    pub fn chain_traces(&self) -> &[Vec<TrialPoint>] {
        &self.chain_traces
    }

    pub fn chain_trace(&self, chain: usize) -> Option<&[TrialPoint]> {
        self.chain_traces.get(chain).map(Vec::as_slice)
    }

    /// A chain's trace without its first `warmup` entries.
    ///
    /// Empty when the chain does not exist or holds no more than `warmup`
    /// entries.
    pub fn post_warmup_trace(&self, chain: usize, warmup: usize) -> &[TrialPoint] {
        match self.chain_traces.get(chain) {
            Some(trace) if trace.len() > warmup => &trace[warmup..],
            _ => &[],
        }
    }

    /// One output buffer per chain.
    pub fn output(&self) -> &[Vec<TrialPoint>] {
        &self.output
    }

    /// All output buffers concatenated in chain order.
    pub fn output_samples(&self) -> Vec<TrialPoint> {
        self.output.iter().flatten().cloned().collect()
    }

    /// Number of states collected in the output phase across all chains.
    pub fn output_count(&self) -> usize {
        self.output_count
    }

    /// The population matrix; empty unless a population-based transition ran.
    pub fn population(&self) -> &[TrialPoint] {
        &self.population
    }

    /// Best state seen during the output phase.
    pub fn map(&self) -> Option<&TrialPoint> {
        self.map.as_ref()
    }

    /// Mean fitness across chains, one entry per recorded iteration.
    pub fn mean_log_likelihood(&self) -> &[f64] {
        &self.mean_log_likelihood
    }

    /// Number of recording-phase iterations completed so far.
    pub fn recorded_iterations(&self) -> usize {
        self.mean_log_likelihood.len()
    }

    pub fn acceptance(&self) -> &[AcceptanceStats] {
        &self.acceptance
    }

    pub fn acceptance_rate(&self, chain: usize) -> Option<f64> {
        self.acceptance.get(chain).map(AcceptanceStats::rate)
    }

    /// Acceptance rate averaged over chains.
    pub fn mean_acceptance_rate(&self) -> f64 {
        if self.acceptance.is_empty() {
            return 0.0;
        }
        self.acceptance.iter().map(AcceptanceStats::rate).sum::<f64>()
            / self.acceptance.len() as f64
    }
}
