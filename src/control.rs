//! Per-run control: resume flag, cooperative cancellation and progress.
//!
//! ```rust
//! use multichain_mcmc::control::{CancellationToken, RunContext};
//!
//! let token = CancellationToken::new();
//! let remote = token.clone();
//! std::thread::spawn(move || remote.cancel()).join().unwrap();
//! let ctx = RunContext::new().with_cancellation(token);
//! assert!(ctx.cancellation().is_cancelled());
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::progress::{Progress, ProgressObserver};

/// A flag shared between the run and whoever may want to stop it.
///
/// Clones observe the same flag. The scheduler looks at it once per outer
/// iteration, after the iteration has been fully reduced.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    requested: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.requested.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::Relaxed)
    }
}

/// Options for a single [`Sampler::sample`](crate::sampler::Sampler::sample) call.
#[derive(Default)]
pub struct RunContext<'a> {
    resume: bool,
    cancellation: CancellationToken,
    progress: Option<&'a mut dyn ProgressObserver>,
}

impl<'a> RunContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue every chain from where the previous run left it instead of
    /// initializing afresh.
    pub fn resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_progress(mut self, observer: &'a mut dyn ProgressObserver) -> Self {
        self.progress = Some(observer);
        self
    }

    pub fn is_resume(&self) -> bool {
        self.resume
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub(crate) fn report(&mut self, progress: &Progress) {
        if let Some(observer) = self.progress.as_mut() {
            observer.report(progress);
        }
    }

    pub(crate) fn finish(&mut self) {
        if let Some(observer) = self.progress.as_mut() {
            observer.finish();
        }
    }
}

impl fmt::Debug for RunContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("resume", &self.resume)
            .field("cancellation", &self.cancellation)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Completed,
    Cancelled,
}

/// Summary returned by a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub termination: Termination,
    /// Outer iterations that were fully reduced.
    pub iterations: usize,
}

impl RunOutcome {
    pub fn is_cancelled(&self) -> bool {
        self.termination == Termination::Cancelled
    }
}
