//! A multi-chain MCMC engine: stratified or mode-seeking initialization, a
//! thinned multi-chain scheduler with pluggable transitions, and the
//! bookkeeping around it (traces, output buffers, MAP, acceptance rates).

pub mod config;
pub mod control;
pub mod core;
pub mod demcz;
pub mod distributions;
pub mod error;
pub mod init;
pub mod io;
pub mod lhs;
pub mod metropolis_hastings;
pub mod optimize;
pub mod progress;
pub mod sampler;
pub mod state;
pub mod stats;
