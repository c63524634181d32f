//! Merit-function line search.
//!
//! The merit function is the exact penalty
//!
//! ```text
//!     phi(x) = f(x) + sum mu_e |c(x)| + sum mu_i max(0, -d(x))
//! ```
//!
//! and a step length is accepted by the Armijo test against the directional
//! derivative estimate `g'd - sum mu_e |c| - sum mu_i max(0, -d)`.

use crate::blas::{vector_dot_product, vector_step};
use crate::options::LineSearchOptions;
use crate::problem::{Evaluation, PointValues, Problem};

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum LineSearchError {
    #[error("no acceptable step after {0} trial points")]
    BudgetExhausted(usize),
    #[error("step length {alpha:e} fell below the minimum after {attempts} trial points")]
    StepTooSmall { alpha: f64, attempts: usize },
}

impl LineSearchError {
    /// Number of trial points evaluated before giving up.
    pub fn attempts(&self) -> usize {
        match *self {
            LineSearchError::BudgetExhausted(attempts) => attempts,
            LineSearchError::StepTooSmall { attempts, .. } => attempts,
        }
    }
}

/// Penalty weights of the merit function, one per constraint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Penalty {
    pub equality: Vec<f64>,
    pub inequality: Vec<f64>,
}

impl Penalty {
    /// First-iteration weights: the magnitudes of the multipliers.
    pub fn initial(lamda_equality: &[f64], lamda_inequality: &[f64]) -> Self {
        Self {
            equality: lamda_equality.iter().map(|l| l.abs()).collect(),
            inequality: lamda_inequality.iter().map(|l| l.abs()).collect(),
        }
    }

    /// `mu = max(|lamda|, (mu + |lamda|) / 2)`, so weights never fall below the
    /// current multipliers and decay slowly otherwise.
    pub fn update(&mut self, lamda_equality: &[f64], lamda_inequality: &[f64]) {
        fn blend(weights: &mut [f64], lamda: &[f64]) {
            for (mu, l) in weights.iter_mut().zip(lamda) {
                *mu = l.abs().max(0.5 * (*mu + l.abs()));
            }
        }
        blend(&mut self.equality, lamda_equality);
        blend(&mut self.inequality, lamda_inequality);
    }

    /// Weighted constraint violation.
    pub fn weighted_violation(&self, values: &PointValues) -> f64 {
        let equality: f64 = self
            .equality
            .iter()
            .zip(&values.equality)
            .map(|(mu, c)| mu * c.abs())
            .sum();
        let inequality: f64 = self
            .inequality
            .iter()
            .zip(&values.inequality)
            .map(|(mu, d)| mu * (-d).max(0.0))
            .sum();
        equality + inequality
    }

    pub fn merit(&self, values: &PointValues) -> f64 {
        values.objective + self.weighted_violation(values)
    }

    pub fn directional_derivative(&self, evaluation: &Evaluation, direction: &[f64]) -> f64 {
        vector_dot_product(&evaluation.objective_gradient, direction)
            - self.weighted_violation(&evaluation.values)
    }
}

/// The accepted step.
#[derive(Debug, Clone, PartialEq)]
pub struct LineSearchOutcome {
    pub alpha: f64,
    /// Values at `x + alpha * direction`, ready to be completed with gradients
    pub values: PointValues,
    /// Number of trial points evaluated
    pub attempts: usize,
}

/// Backtracks from `alpha = 1` along `direction` until the merit function
/// decreases sufficiently.
///
/// A rejected step is replaced by the minimizer of the quadratic through
/// `phi(0)`, the directional derivative and `phi(alpha)`, but never by less
/// than `min_contraction * alpha`.
pub fn line_search<P: Problem + ?Sized>(
    problem: &P,
    base: &Evaluation,
    direction: &[f64],
    penalty: &Penalty,
    options: &LineSearchOptions,
) -> Result<LineSearchOutcome, LineSearchError> {
    let merit_at_start = penalty.merit(&base.values);
    let derivative = penalty.directional_derivative(base, direction);
    let x = base.values.x.as_slice();

    let mut alpha = 1.0;
    for attempt in 1..=options.max_steps {
        if alpha < options.min_step {
            return Err(LineSearchError::StepTooSmall {
                alpha,
                attempts: attempt - 1,
            });
        }

        let values = PointValues::evaluate(problem, &vector_step(x, alpha, direction));
        // f64::max drops NaN, so a non-finite constraint value can hide in a finite merit
        let merit = if values.is_finite() {
            penalty.merit(&values)
        } else {
            f64::NAN
        };
        if merit <= merit_at_start + options.armijo * alpha * derivative {
            log::trace!("line search accepted alpha = {alpha:e} after {attempt} trial points");
            return Ok(LineSearchOutcome {
                alpha,
                values,
                attempts: attempt,
            });
        }

        let curvature = merit - merit_at_start - alpha * derivative;
        let contracted = options.min_contraction * alpha;
        alpha = if merit.is_finite() && curvature > 0.0 {
            contracted.max(-derivative * alpha * alpha / (2.0 * curvature))
        } else {
            contracted
        };
    }

    Err(LineSearchError::BudgetExhausted(options.max_steps))
}
