//! Mode finding for MAP initialization.
//!
//! This module provides the [`ModeFinder`] seam together with a derivative-free
//! default: a bounded Nelder-Mead simplex followed by a finite-difference
//! Hessian at the optimum.

use std::fmt;

use nalgebra::DMatrix;

use crate::core::LogLikelihood;
use crate::error::ModeError;

/// A located maximum of the log-likelihood.
#[derive(Debug, Clone)]
pub struct ModeEstimate {
    /// Best parameter set found.
    pub parameters: Vec<f64>,
    /// Objective value at `parameters`.
    pub fitness: f64,
    /// Hessian of the objective at `parameters` (negative definite at a
    /// proper maximum).
    pub hessian: DMatrix<f64>,
    /// Number of iterations used.
    pub iterations: usize,
    /// Number of objective evaluations.
    pub evaluations: usize,
}

impl fmt::Display for ModeEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ModeEstimate(fitness={:.6}, iterations={}, evaluations={})",
            self.fitness, self.iterations, self.evaluations
        )
    }
}

/// Maximizes a log-likelihood inside a box.
pub trait ModeFinder: Send + Sync {
    fn maximize(
        &self,
        objective: &LogLikelihood<'_>,
        start: &[f64],
        lower: &[f64],
        upper: &[f64],
    ) -> Result<ModeEstimate, ModeError>;
}

/// Bounded Nelder-Mead simplex search.
///
/// Vertices are clamped to the box after every move. Convergence is declared
/// once the spread of objective values across the simplex falls below
/// `tolerance * (1 + |best|)`.
#[derive(Debug, Clone, PartialEq)]
pub struct NelderMead {
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Initial simplex edge as a fraction of the box width (or of
    /// `max(|x|, 1)` for unbounded parameters).
    pub initial_step: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            max_iterations: 5000,
            tolerance: 1e-8,
            initial_step: 0.1,
        }
    }
}

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

struct Vertex {
    x: Vec<f64>,
    /// Negated objective, so the search minimizes.
    cost: f64,
}

impl NelderMead {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
            ..Self::default()
        }
    }

    fn initial_simplex(
        &self,
        start: &[f64],
        lower: &[f64],
        upper: &[f64],
        cost: &mut impl FnMut(&[f64]) -> f64,
    ) -> Vec<Vertex> {
        let n = start.len();
        let x0 = clamp(start, lower, upper);
        let mut simplex = Vec::with_capacity(n + 1);
        simplex.push(Vertex {
            cost: cost(&x0),
            x: x0.clone(),
        });
        for i in 0..n {
            let width = upper[i] - lower[i];
            let step = if width.is_finite() {
                self.initial_step * width
            } else {
                self.initial_step * x0[i].abs().max(1.0)
            };
            let mut x = x0.clone();
            // Step away from whichever bound is closer.
            x[i] = if x0[i] + step <= upper[i] {
                x0[i] + step
            } else {
                x0[i] - step
            };
            let x = clamp(&x, lower, upper);
            simplex.push(Vertex { cost: cost(&x), x });
        }
        simplex
    }
}

impl ModeFinder for NelderMead {
    fn maximize(
        &self,
        objective: &LogLikelihood<'_>,
        start: &[f64],
        lower: &[f64],
        upper: &[f64],
    ) -> Result<ModeEstimate, ModeError> {
        let n = start.len();
        if lower.len() != n || upper.len() != n {
            return Err(ModeError::DimensionMismatch {
                expected: n,
                got: lower.len().min(upper.len()),
            });
        }

        let mut evaluations = 0_usize;
        let mut cost = |x: &[f64]| {
            evaluations += 1;
            let value = -objective(x);
            if value.is_nan() {
                f64::INFINITY
            } else {
                value
            }
        };

        let mut simplex = self.initial_simplex(start, lower, upper, &mut cost);
        let mut converged = false;
        let mut iterations = 0;

        while iterations < self.max_iterations {
            simplex.sort_by(|a, b| a.cost.total_cmp(&b.cost));
            let best = simplex[0].cost;
            let worst = simplex[n].cost;
            if best.is_finite() && (worst - best).abs() <= self.tolerance * (1.0 + best.abs()) {
                converged = true;
                break;
            }
            iterations += 1;

            let centroid: Vec<f64> = (0..n)
                .map(|j| simplex[..n].iter().map(|v| v.x[j]).sum::<f64>() / n as f64)
                .collect();
            let toward = |coef: f64, from: &[f64]| -> Vec<f64> {
                let x: Vec<f64> = centroid
                    .iter()
                    .zip(from)
                    .map(|(c, w)| c + coef * (c - w))
                    .collect();
                clamp(&x, lower, upper)
            };

            let reflected = toward(REFLECTION, &simplex[n].x);
            let reflected_cost = cost(&reflected);

            if reflected_cost < simplex[0].cost {
                let expanded = toward(EXPANSION, &simplex[n].x);
                let expanded_cost = cost(&expanded);
                simplex[n] = if expanded_cost < reflected_cost {
                    Vertex {
                        x: expanded,
                        cost: expanded_cost,
                    }
                } else {
                    Vertex {
                        x: reflected,
                        cost: reflected_cost,
                    }
                };
            } else if reflected_cost < simplex[n - 1].cost {
                simplex[n] = Vertex {
                    x: reflected,
                    cost: reflected_cost,
                };
            } else {
                let contracted = toward(-CONTRACTION, &simplex[n].x);
                let contracted_cost = cost(&contracted);
                if contracted_cost < simplex[n].cost {
                    simplex[n] = Vertex {
                        x: contracted,
                        cost: contracted_cost,
                    };
                } else {
                    let anchor = simplex[0].x.clone();
                    for vertex in simplex.iter_mut().skip(1) {
                        let x: Vec<f64> = anchor
                            .iter()
                            .zip(&vertex.x)
                            .map(|(a, v)| a + SHRINK * (v - a))
                            .collect();
                        vertex.cost = cost(&x);
                        vertex.x = x;
                    }
                }
            }
        }

        if !converged {
            return Err(ModeError::NotConverged { iterations });
        }
        let best = simplex.swap_remove(0);
        let fitness = -best.cost;
        if !fitness.is_finite() {
            return Err(ModeError::NonFiniteMode);
        }

        let (hessian, hessian_evaluations) =
            finite_difference_hessian(objective, &best.x, lower, upper);
        Ok(ModeEstimate {
            parameters: best.x,
            fitness,
            hessian,
            iterations,
            evaluations: evaluations + hessian_evaluations,
        })
    }
}

fn clamp(x: &[f64], lower: &[f64], upper: &[f64]) -> Vec<f64> {
    x.iter()
        .zip(lower.iter().zip(upper))
        .map(|(&v, (&lo, &hi))| v.max(lo).min(hi))
        .collect()
}

/// Central finite-difference Hessian of `objective` at `x`.
///
/// Steps are `1e-4 * max(|x_i|, 1)`, shrunk so that every shifted point stays
/// inside `[lower, upper]`. Mixed partials are written to both triangles, so the
/// result is symmetric. Also returns the number of objective evaluations used.
pub fn finite_difference_hessian(
    objective: &LogLikelihood<'_>,
    x: &[f64],
    lower: &[f64],
    upper: &[f64],
) -> (DMatrix<f64>, usize) {
    let n = x.len();
    let steps: Vec<f64> = (0..n)
        .map(|i| {
            let h = 1e-4 * x[i].abs().max(1.0);
            let room = (x[i] - lower[i]).min(upper[i] - x[i]);
            if room > 0.0 {
                h.min(room)
            } else {
                h
            }
        })
        .collect();

    let mut evaluations = 0_usize;
    let mut f = |point: &[f64]| {
        evaluations += 1;
        objective(point)
    };
    let center = f(x);
    let mut hessian = DMatrix::<f64>::zeros(n, n);
    let mut shifted = x.to_vec();

    for i in 0..n {
        let hi = steps[i];
        shifted[i] = x[i] + hi;
        let plus = f(&shifted);
        shifted[i] = x[i] - hi;
        let minus = f(&shifted);
        shifted[i] = x[i];
        hessian[(i, i)] = (plus - 2.0 * center + minus) / (hi * hi);

        for j in (i + 1)..n {
            let hj = steps[j];
            let mut corner = |si: f64, sj: f64| {
                shifted[i] = x[i] + si * hi;
                shifted[j] = x[j] + sj * hj;
                let value = f(&shifted);
                shifted[i] = x[i];
                shifted[j] = x[j];
                value
            };
            let pp = corner(1.0, 1.0);
            let pm = corner(1.0, -1.0);
            let mp = corner(-1.0, 1.0);
            let mm = corner(-1.0, -1.0);
            let mixed = (pp - pm - mp + mm) / (4.0 * hi * hj);
            hessian[(i, j)] = mixed;
            hessian[(j, i)] = mixed;
        }
    }
    (hessian, evaluations)
}
