//! Progress reporting.
//!
//! The scheduler hands a [`Progress`] snapshot to an optional
//! [`ProgressObserver`] every `progress_interval` of the run. Any
//! `FnMut(&Progress)` closure is an observer; [`ProgressBarObserver`] draws an
//! `indicatif` bar on the terminal.

use indicatif::{ProgressBar, ProgressStyle};

/// Which part of the run an iteration belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Iterations that feed the chain traces.
    Recording,
    /// Iterations that fill the output buffers.
    Output,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Recording => "Sampling",
            Phase::Output => "Output",
        }
    }
}

/// A snapshot taken after an outer iteration has been reduced.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Outer iterations completed, starting at 1.
    pub iteration: usize,
    /// Outer iterations in the whole run.
    pub total: usize,
    pub phase: Phase,
    /// Acceptance rate averaged over chains.
    pub acceptance_rate: f64,
}

impl Progress {
    /// Completed fraction in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (self.iteration as f64 / self.total as f64).min(1.0)
        }
    }

    /// Human-readable one-liner.
    pub fn text(&self) -> String {
        format!(
            "{} {:.0}% ({}/{}), AcceptRate={:.3}",
            self.phase.label(),
            100.0 * self.fraction(),
            self.iteration,
            self.total,
            self.acceptance_rate
        )
    }
}

/// Receives progress snapshots from the thread driving the run.
pub trait ProgressObserver {
    fn report(&mut self, progress: &Progress);

    /// Called once when the run stops, whether it completed or was cancelled.
    fn finish(&mut self) {}
}

impl<F: FnMut(&Progress)> ProgressObserver for F {
    fn report(&mut self, progress: &Progress) {
        self(progress)
    }
}

/// Renders progress as a terminal progress bar.
pub struct ProgressBarObserver {
    bar: ProgressBar,
}

impl ProgressBarObserver {
    pub fn new() -> Self {
        Self::with_bar(ProgressBar::new(0))
    }

    /// An observer whose bar never draws; useful in tests and batch jobs.
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(bar: ProgressBar) -> Self {
        let style = ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");
        bar.set_style(style);
        Self { bar }
    }

    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }
}

impl Default for ProgressBarObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for ProgressBarObserver {
    fn report(&mut self, progress: &Progress) {
        self.bar.set_length(progress.total as u64);
        self.bar.set_position(progress.iteration as u64);
        self.bar.set_prefix(progress.phase.label());
        self.bar
            .set_message(format!("AcceptRate={:.3}", progress.acceptance_rate));
    }

    fn finish(&mut self) {
        self.bar.finish_with_message("Done!");
    }
}
