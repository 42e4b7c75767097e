/*!
# Saving Traces to CSV

Writes per-chain sequences of [`TrialPoint`]s (chain traces or output buffers)
to a CSV file. Enable via the `csv` feature.
*/

use std::error::Error;
use std::fs::File;
use std::path::Path;

use csv::Writer;

use crate::core::TrialPoint;
use crate::state::RunState;

/**
Saves one sequence of trial points per chain as a CSV file.

The file has a header row `chain,sample,fitness,dim_0,dim_1,...` followed by
one row per trial point, chain by chain. The number of `dim_` columns is taken
from the first point found; a point with a different dimension is an error.

# Examples

```rust
use multichain_mcmc::core::TrialPoint;
use multichain_mcmc::io::csv::save_trace_csv;

let chains = vec![vec![TrialPoint::new(vec![1.0, 2.0], -0.5)]];
let path = std::env::temp_dir().join("multichain_mcmc_doc.csv");
save_trace_csv(&chains, &path)?;
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/
pub fn save_trace_csv<P: AsRef<Path>>(
    chains: &[Vec<TrialPoint>],
    filename: P,
) -> Result<(), Box<dyn Error>> {
    let n_dims = chains
        .iter()
        .flatten()
        .next()
        .map_or(0, TrialPoint::dimension);

    let mut wtr = Writer::from_writer(File::create(filename)?);
    let mut header: Vec<String> = vec!["chain".into(), "sample".into(), "fitness".into()];
    header.extend((0..n_dims).map(|i| format!("dim_{}", i)));
    wtr.write_record(&header)?;

    for (chain_idx, chain) in chains.iter().enumerate() {
        for (sample_idx, point) in chain.iter().enumerate() {
            if point.dimension() != n_dims {
                return Err(format!(
                    "chain {chain_idx} sample {sample_idx} has {} values, expected {n_dims}",
                    point.dimension()
                )
                .into());
            }
            let mut row = vec![
                chain_idx.to_string(),
                sample_idx.to_string(),
                point.fitness().to_string(),
            ];
            row.extend(point.values().iter().map(|v| v.to_string()));
            wtr.write_record(&row)?;
        }
    }

    wtr.flush()?;
    Ok(())
}

/// Saves the output buffers of a run.
pub fn save_output_csv<P: AsRef<Path>>(state: &RunState, filename: P) -> Result<(), Box<dyn Error>> {
    save_trace_csv(state.output(), filename)
}
