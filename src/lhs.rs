//! Latin-hypercube sampling of the unit hypercube.
//!
//! Every column of the returned `sample_size x dimension` matrix places
//! exactly one value in each of the `sample_size` equal-width strata of
//! `[0, 1)`. Columns are permuted independently, so there is no shared
//! stratum ordering across dimensions.

use ndarray::Array2;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Where inside its stratum a sample is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StratumPlacement {
    /// Uniformly at random within the stratum.
    #[default]
    Random,
    /// At the stratum midpoint.
    Median,
}

/// A seeded Latin-hypercube sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LatinHypercube {
    placement: StratumPlacement,
}

impl LatinHypercube {
    pub fn random() -> Self {
        Self {
            placement: StratumPlacement::Random,
        }
    }

    pub fn median() -> Self {
        Self {
            placement: StratumPlacement::Median,
        }
    }

    pub fn placement(&self) -> StratumPlacement {
        self.placement
    }

    /**
    Draws `sample_size` points in `dimension` dimensions.

    The same `seed` always yields the same matrix.

    # Examples

    ```rust
    use multichain_mcmc::lhs::LatinHypercube;

    let u = LatinHypercube::random().sample(4, 2, 7);
    assert_eq!(u.shape(), &[4, 2]);
    let mut column: Vec<f64> = u.column(0).to_vec();
    column.sort_by(f64::total_cmp);
    for (k, x) in column.iter().enumerate() {
        assert!(*x >= k as f64 / 4.0 && *x < (k + 1) as f64 / 4.0);
    }
    ```
    */
    pub fn sample(&self, sample_size: usize, dimension: usize, seed: u64) -> Array2<f64> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut out = Array2::<f64>::zeros((sample_size, dimension));
        let mut strata: Vec<usize> = (0..sample_size).collect();

        for mut column in out.columns_mut() {
            strata.shuffle(&mut rng);
            for (cell, &stratum) in column.iter_mut().zip(strata.iter()) {
                let offset = match self.placement {
                    StratumPlacement::Random => rng.gen::<f64>(),
                    StratumPlacement::Median => 0.5,
                };
                *cell = stratum_value(stratum, offset, sample_size);
            }
        }
        out
    }
}

/// `(stratum + offset) / n`, kept strictly below the stratum's upper edge.
fn stratum_value(stratum: usize, offset: f64, n: usize) -> f64 {
    let n = n as f64;
    let upper = (stratum + 1) as f64 / n;
    let value = (stratum as f64 + offset) / n;
    if value < upper {
        value
    } else {
        // Rounding pushed us onto the edge; step down one ulp.
        f64::from_bits(upper.to_bits() - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn assert_stratified(u: &Array2<f64>) {
        let n = u.nrows();
        for column in u.columns() {
            let mut sorted = column.to_vec();
            sorted.sort_by(f64::total_cmp);
            for (k, &x) in sorted.iter().enumerate() {
                let lower = k as f64 / n as f64;
                let upper = (k + 1) as f64 / n as f64;
                assert!(
                    x >= lower && x < upper,
                    "value {x} not in stratum [{lower}, {upper})"
                );
            }
        }
    }

    #[test]
    fn same_seed_same_matrix() {
        let a = LatinHypercube::random().sample(20, 3, 99);
        let b = LatinHypercube::random().sample(20, 3, 99);
        assert_eq!(a, b);
        let c = LatinHypercube::random().sample(20, 3, 100);
        assert_ne!(a, c);
    }

    #[test]
    fn median_places_values_at_midpoints() {
        let u = LatinHypercube::median().sample(5, 2, 3);
        let mut column = u.column(1).to_vec();
        column.sort_by(f64::total_cmp);
        assert_eq!(column, vec![0.1, 0.3, 0.5, 0.7, 0.9]);
    }

    #[test]
    fn columns_are_permuted_independently() {
        let u = LatinHypercube::median().sample(50, 2, 11);
        let first: Vec<f64> = u.column(0).to_vec();
        let second: Vec<f64> = u.column(1).to_vec();
        assert_ne!(first, second);
    }

    #[test]
    fn edge_offset_stays_inside_stratum() {
        let x = stratum_value(2, 1.0 - f64::EPSILON / 4.0, 3);
        assert!(x < 1.0);
        assert!(x >= 2.0 / 3.0);
    }

    #[test]
    fn empty_shapes() {
        assert_eq!(LatinHypercube::random().sample(0, 3, 1).shape(), &[0, 3]);
        assert_eq!(LatinHypercube::random().sample(3, 0, 1).shape(), &[3, 0]);
    }

    proptest! {
        #[test]
        fn every_column_is_stratified(n in 1usize..200, d in 1usize..6, seed in any::<u64>()) {
            assert_stratified(&LatinHypercube::random().sample(n, d, seed));
        }
    }
}
