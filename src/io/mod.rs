//! Export of run results.

#[cfg(feature = "csv")]
pub mod csv;
