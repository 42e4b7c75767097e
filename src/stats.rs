//! Post-run summaries of chain traces and output samples.

use std::error::Error;
use std::fmt;

use ndarray::prelude::*;
use ndarray_stats::QuantileExt;

use crate::core::TrialPoint;

/// Stacks trial points into a `samples x parameters` matrix.
pub fn to_array(points: &[TrialPoint]) -> Result<Array2<f64>, Box<dyn Error>> {
    let d = points.first().map_or(0, TrialPoint::dimension);
    if let Some(bad) = points.iter().find(|p| p.dimension() != d) {
        return Err(format!("expected {d} parameters, found a point with {}", bad.dimension()).into());
    }
    let flat: Vec<f64> = points.iter().flat_map(|p| p.values().iter().copied()).collect();
    Ok(Array2::from_shape_vec((points.len(), d), flat)?)
}

/**
Potential scale reduction factor (Gelman-Rubin R-hat) for every parameter.

The first `warmup` entries of every trace are skipped, and all chains are cut
to the length of the shortest one. With `n` samples per chain, chain means
`m_j` and unbiased chain variances `s_j^2`:

```text
B = n / (chains - 1) * sum_j (m_j - mean(m))^2
W = mean_j s_j^2
R = sqrt(((n - 1) / n * W + B / n) / W)
```

Needs at least two chains with two post-warmup samples each.

# Examples

```rust
use multichain_mcmc::core::TrialPoint;
use multichain_mcmc::stats::potential_scale_reduction;

let chain = |xs: &[f64]| xs.iter().map(|&x| TrialPoint::new(vec![x], 0.0)).collect::<Vec<_>>();
let traces = vec![chain(&[0.0, 1.0, 0.0, 1.0]), chain(&[1.0, 0.0, 1.0, 0.0])];
let rhat = potential_scale_reduction(&traces, 0).unwrap();
assert!((rhat[0] - (0.75f64).sqrt()).abs() < 1e-12);
```
*/
pub fn potential_scale_reduction(
    traces: &[Vec<TrialPoint>],
    warmup: usize,
) -> Result<Array1<f64>, Box<dyn Error>> {
    let n_chains = traces.len();
    if n_chains < 2 {
        return Err("R-hat needs at least two chains".into());
    }
    let n = traces
        .iter()
        .map(|t| t.len().saturating_sub(warmup))
        .min()
        .unwrap_or(0);
    if n < 2 {
        return Err("R-hat needs at least two post-warmup samples per chain".into());
    }

    let d = traces[0][warmup].dimension();
    let mut means = Array2::<f64>::zeros((n_chains, d));
    let mut variances = Array2::<f64>::zeros((n_chains, d));
    for (j, trace) in traces.iter().enumerate() {
        let samples = to_array(&trace[warmup..warmup + n])?;
        if samples.ncols() != d {
            return Err(format!("chain {j} has {} parameters, expected {d}", samples.ncols()).into());
        }
        let mean = samples
            .mean_axis(Axis(0))
            .ok_or("Mean reduction across samples failed.")?;
        means.row_mut(j).assign(&mean);
        variances.row_mut(j).assign(&samples.var_axis(Axis(0), 1.0));
    }

    let grand_mean = means
        .mean_axis(Axis(0))
        .ok_or("Mean reduction across chains failed.")?;
    let n = n as f64;
    let between = (&means - &grand_mean.insert_axis(Axis(0)))
        .pow2()
        .sum_axis(Axis(0))
        * (n / (n_chains as f64 - 1.0));
    let within = variances
        .mean_axis(Axis(0))
        .ok_or("Mean reduction across chain variances failed.")?;
    let pooled = &within * ((n - 1.0) / n) + between / n;
    Ok((pooled / within).mapv(f64::sqrt))
}

/// Largest R-hat over all parameters.
pub fn max_rhat(traces: &[Vec<TrialPoint>], warmup: usize) -> Result<f64, Box<dyn Error>> {
    let all = potential_scale_reduction(traces, warmup)?;
    let max = *all.max()?;
    Ok(max)
}

/// Marginal posterior summary of one parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub lower_95: f64,
    pub median: f64,
    pub upper_95: f64,
}

impl fmt::Display for ParameterSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mean={:.4} sd={:.4} 2.5%={:.4} 50%={:.4} 97.5%={:.4}",
            self.mean, self.std_dev, self.lower_95, self.median, self.upper_95
        )
    }
}

/// Per-parameter mean, standard deviation and 2.5/50/97.5 percentiles.
pub fn summarize(samples: &[TrialPoint]) -> Result<Vec<ParameterSummary>, Box<dyn Error>> {
    if samples.len() < 2 {
        return Err("a summary needs at least two samples".into());
    }
    let matrix = to_array(samples)?;
    matrix
        .columns()
        .into_iter()
        .map(|column| -> Result<ParameterSummary, Box<dyn Error>> {
            let mean = column.mean().ok_or("empty column")?;
            let mut sorted = column.to_vec();
            sorted.sort_by(f64::total_cmp);
            Ok(ParameterSummary {
                mean,
                std_dev: column.std(1.0),
                lower_95: percentile(&sorted, 0.025),
                median: percentile(&sorted, 0.5),
                upper_95: percentile(&sorted, 0.975),
            })
        })
        .collect()
}

/// Linear interpolation between closest ranks of sorted `values`.
fn percentile(values: &[f64], quantile: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let position = quantile * (values.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    values[lower] + weight * (values[upper] - values[lower])
}
