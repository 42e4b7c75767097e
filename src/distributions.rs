/*!
Prior distributions and the Gaussian proposal used for mode-seeking initialization.

The probability bodies themselves come from [`statrs`]; this module only adapts
them to the narrow [`Prior`] interface the engine needs (mean, support and
inverse CDF) and groups them into a [`PriorSet`].

# Examples

```rust
use multichain_mcmc::distributions::{Prior, PriorSet};
use statrs::distribution::{Normal, Uniform};

let priors = PriorSet::new(vec![
    Box::new(Uniform::new(0.0, 10.0).unwrap()) as Box<dyn Prior>,
    Box::new(Normal::new(1.0, 2.0).unwrap()),
]);
assert_eq!(priors.len(), 2);
assert_eq!(priors.means(), vec![5.0, 1.0]);
assert!(priors.contains(&[3.0, -100.0]));
assert!(!priors.contains(&[11.0, 0.0]));
```
*/

use std::fmt;

use nalgebra::{Cholesky, DMatrix, DVector};
use statrs::distribution::{
    Beta, ContinuousCDF, Exp, Gamma, LogNormal, Normal, Triangular, Uniform,
};
use statrs::statistics::{Distribution, Max, Min};

use crate::error::ModeError;

/// Quantiles handed to an inverse CDF are kept this far away from 0 and 1.
const PROBABILITY_CLIP: f64 = 1e-12;

/// The parts of a prior distribution the sampler relies on.
pub trait Prior: fmt::Debug + Send + Sync {
    fn mean(&self) -> f64;
    /// Lower edge of the support (may be `-inf`).
    fn minimum(&self) -> f64;
    /// Upper edge of the support (may be `+inf`).
    fn maximum(&self) -> f64;
    /// Maps a probability `u` in `[0, 1]` to a parameter value.
    fn inverse_cdf(&self, u: f64) -> f64;
}

macro_rules! impl_prior_for_statrs {
    ($($dist:ty),* $(,)?) => {
        $(
            impl Prior for $dist {
                fn mean(&self) -> f64 {
                    Distribution::<f64>::mean(self)
                        .unwrap_or_else(|| ContinuousCDF::<f64, f64>::inverse_cdf(self, 0.5))
                }

                fn minimum(&self) -> f64 {
                    Min::<f64>::min(self)
                }

                fn maximum(&self) -> f64 {
                    Max::<f64>::max(self)
                }

                fn inverse_cdf(&self, u: f64) -> f64 {
                    ContinuousCDF::<f64, f64>::inverse_cdf(self, u.clamp(0.0, 1.0))
                }
            }
        )*
    };
}

impl_prior_for_statrs!(Uniform, Normal, LogNormal, Triangular, Beta, Gamma, Exp);

/// One prior per model parameter, in parameter order.
#[derive(Debug)]
pub struct PriorSet {
    priors: Vec<Box<dyn Prior>>,
}

impl PriorSet {
    pub fn new(priors: Vec<Box<dyn Prior>>) -> Self {
        Self { priors }
    }

    /// Number of model parameters.
    pub fn len(&self) -> usize {
        self.priors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.priors.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&dyn Prior> {
        self.priors.get(index).map(|p| p.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Prior> {
        self.priors.iter().map(|p| p.as_ref())
    }

    pub fn means(&self) -> Vec<f64> {
        self.iter().map(|p| p.mean()).collect()
    }

    pub fn lower_bounds(&self) -> Vec<f64> {
        self.iter().map(|p| p.minimum()).collect()
    }

    pub fn upper_bounds(&self) -> Vec<f64> {
        self.iter().map(|p| p.maximum()).collect()
    }

    /// True when every value lies inside the support of its prior.
    ///
    /// A vector of the wrong length is never contained.
    pub fn contains(&self, values: &[f64]) -> bool {
        values.len() == self.len()
            && self
                .iter()
                .zip(values)
                .all(|(p, &x)| x >= p.minimum() && x <= p.maximum())
    }

    /// Maps one row of quantiles through the per-parameter inverse CDFs.
    pub fn from_quantiles(&self, quantiles: &[f64]) -> Vec<f64> {
        self.iter()
            .zip(quantiles)
            .map(|(p, &u)| p.inverse_cdf(u))
            .collect()
    }
}

impl FromIterator<Box<dyn Prior>> for PriorSet {
    fn from_iter<I: IntoIterator<Item = Box<dyn Prior>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// A multivariate normal distribution sampled through its inverse CDF.
///
/// Used as the Laplace approximation around the posterior mode: a vector of
/// independent uniform quantiles is turned into standard normal scores and
/// then correlated with the Cholesky factor of the covariance.
#[derive(Debug, Clone)]
pub struct MultivariateNormal {
    mean: DVector<f64>,
    cholesky_factor: DMatrix<f64>,
}

impl MultivariateNormal {
    pub fn new(mean: Vec<f64>, covariance: DMatrix<f64>) -> Result<Self, ModeError> {
        let n = mean.len();
        if covariance.nrows() != n || covariance.ncols() != n {
            return Err(ModeError::DimensionMismatch {
                expected: n,
                got: covariance.nrows(),
            });
        }
        if covariance.iter().any(|c| !c.is_finite()) {
            return Err(ModeError::NotPositiveDefinite);
        }
        let cholesky = Cholesky::new(covariance).ok_or(ModeError::NotPositiveDefinite)?;
        Ok(Self {
            mean: DVector::from_vec(mean),
            cholesky_factor: cholesky.l(),
        })
    }

    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        self.mean.as_slice()
    }

    /// Lower-triangular `L` with `L * L^T` equal to the covariance.
    pub fn cholesky_factor(&self) -> &DMatrix<f64> {
        &self.cholesky_factor
    }

    /// Maps independent uniform quantiles (one per dimension) to a point.
    pub fn inverse_cdf(&self, quantiles: &[f64]) -> Vec<f64> {
        let standard = Normal::standard();
        let z = DVector::from_iterator(
            self.dimension(),
            quantiles.iter().map(|&u| {
                ContinuousCDF::<f64, f64>::inverse_cdf(&standard, clip_probability(u))
            }),
        );
        let x = &self.mean + &self.cholesky_factor * z;
        x.iter().copied().collect()
    }
}

fn clip_probability(u: f64) -> f64 {
    u.clamp(PROBABILITY_CLIP, 1.0 - PROBABILITY_CLIP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn uniform(lo: f64, hi: f64) -> Box<dyn Prior> {
        Box::new(Uniform::new(lo, hi).unwrap())
    }

    #[test]
    fn uniform_prior_maps_quantiles_linearly() {
        let priors = PriorSet::new(vec![uniform(0.0, 10.0)]);
        assert_abs_diff_eq!(priors.from_quantiles(&[0.25])[0], 2.5, epsilon = 1e-9);
        assert_eq!(priors.lower_bounds(), vec![0.0]);
        assert_eq!(priors.upper_bounds(), vec![10.0]);
    }

    #[test]
    fn normal_prior_has_unbounded_support() {
        let prior: Box<dyn Prior> = Box::new(Normal::new(1.0, 2.0).unwrap());
        assert_eq!(prior.mean(), 1.0);
        assert_eq!(prior.minimum(), f64::NEG_INFINITY);
        assert_eq!(prior.maximum(), f64::INFINITY);
        assert_abs_diff_eq!(prior.inverse_cdf(0.5), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn contains_rejects_wrong_length_and_out_of_support() {
        let priors = PriorSet::new(vec![uniform(0.0, 1.0), uniform(-1.0, 1.0)]);
        assert!(priors.contains(&[0.5, 0.0]));
        assert!(priors.contains(&[0.0, 1.0]));
        assert!(!priors.contains(&[0.5]));
        assert!(!priors.contains(&[1.5, 0.0]));
        assert!(!priors.contains(&[0.5, f64::NAN]));
    }

    #[test]
    fn multivariate_normal_median_is_the_mean() {
        let cov = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 2.0]);
        let mvn = MultivariateNormal::new(vec![1.0, -1.0], cov).unwrap();
        let x = mvn.inverse_cdf(&[0.5, 0.5]);
        assert_abs_diff_eq!(x[0], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(x[1], -1.0, epsilon = 1e-9);
    }

    #[test]
    fn multivariate_normal_uses_cholesky_factor() {
        let cov = DMatrix::from_row_slice(2, 2, &[4.0, 0.0, 0.0, 9.0]);
        let mvn = MultivariateNormal::new(vec![0.0, 0.0], cov).unwrap();
        // Phi^-1(0.8413447460685429) is one standard deviation.
        let x = mvn.inverse_cdf(&[0.841_344_746_068_542_9, 0.5]);
        assert_abs_diff_eq!(x[0], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(x[1], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn multivariate_normal_rejects_indefinite_covariance() {
        let cov = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert_eq!(
            MultivariateNormal::new(vec![0.0, 0.0], cov).unwrap_err(),
            ModeError::NotPositiveDefinite
        );
        let cov = DMatrix::from_row_slice(1, 1, &[f64::NAN]);
        assert_eq!(
            MultivariateNormal::new(vec![0.0], cov).unwrap_err(),
            ModeError::NotPositiveDefinite
        );
    }
}
