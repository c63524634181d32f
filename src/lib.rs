//! VMCON: a sequential quadratic programming solver for
//!
//! ```text
//!     minimize    f(x)
//!     subject to  c_i(x) == 0
//!                 d_j(x) >= 0
//! ```
//!
//! using first derivatives only. Each iteration solves a QP built from a quasi-Newton
//! approximation of the Lagrangian Hessian, searches along its solution with an
//! exact-penalty merit function and refreshes the approximation with Powell's damped
//! BFGS update (Crane, Hillstrom and Minkoff, ANL-80-64).
//!
//! ```
//! use vmcon::{solve, ClosureProblem};
//!
//! let problem = ClosureProblem::new(
//!     |x| (x[0] - 2.0).powi(2) + (x[1] - 1.0).powi(2),
//!     |x| vec![2.0 * (x[0] - 2.0), 2.0 * (x[1] - 1.0)],
//! )
//! .with_equality(|x| x[0] - 2.0 * x[1] + 1.0, |_| vec![1.0, -2.0])
//! .with_inequality(
//!     |x| -x[0] * x[0] / 4.0 - x[1] * x[1] + 1.0,
//!     |x| vec![-0.5 * x[0], -2.0 * x[1]],
//! );
//!
//! let solution = solve(&problem, &[2.0, 2.0], 10, 1e-8).unwrap();
//! assert!((solution.x[0] - 0.8228756555).abs() < 1e-6);
//! assert!((solution.x[1] - 0.9114378278).abs() < 1e-6);
//! ```

use serde::{Deserialize, Serialize};

pub mod blas;
pub mod convergence;
pub use convergence::{Criterion, ConvergenceReport};
pub mod error;
pub use error::{Callable, LastIterate, VmconError};
pub mod hessian;
pub use hessian::SkipReason;
pub mod householder;
pub mod ldl;
pub mod line_search;
pub mod matrix;
pub mod mode;
pub use mode::VmconMode;
pub mod options;
pub use options::{HessianOptions, LineSearchOptions, QpOptions, VmconOptions};
pub mod problem;
pub use problem::{ClosureProblem, Constraint, Evaluation, PointValues, Problem};
pub mod qp;
mod solver;
pub use matrix::Mat;
pub use solver::{IterationState, Vmcon};

/// Events that can be observed during the optimization process.
#[derive(Debug, Clone)]
pub enum VmconEvent<'a> {
    /// Emitted after every step taken
    Iteration {
        iteration: usize,
        x: &'a [f64],
        objective: f64,
        direction: &'a [f64],
        alpha: f64,
        criterion: f64,
        lamda_equality: &'a [f64],
        lamda_inequality: &'a [f64],
    },
    /// The Hessian approximation was left unchanged in this iteration
    HessianUpdateSkipped { iteration: usize, reason: SkipReason },
}

/// Trait for observing the optimization process.
pub trait VmconObserver {
    /// Returns true if the observer is active and should receive events.
    /// Inactive observers cost nothing: events are not even built.
    fn is_active(&self) -> bool;

    fn on_event(&mut self, event: VmconEvent);
}

/// The no-op observer.
impl VmconObserver for () {
    #[inline(always)]
    fn is_active(&self) -> bool {
        false
    }

    #[inline(always)]
    fn on_event(&mut self, _event: VmconEvent) {}
}

/// Owned copy of a [`VmconEvent::Iteration`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub x: Vec<f64>,
    pub objective: f64,
    pub direction: Vec<f64>,
    pub alpha: f64,
    pub criterion: f64,
    pub lamda_equality: Vec<f64>,
    pub lamda_inequality: Vec<f64>,
}

/// Observer that hands every iteration to a callback.
pub struct CallbackObserver<'a> {
    callback: Option<&'a mut dyn FnMut(&IterationRecord)>,
}

impl<'a> CallbackObserver<'a> {
    pub fn new(callback: &'a mut dyn FnMut(&IterationRecord)) -> Self {
        Self {
            callback: Some(callback),
        }
    }
}

impl VmconObserver for CallbackObserver<'_> {
    fn is_active(&self) -> bool {
        self.callback.is_some()
    }

    fn on_event(&mut self, event: VmconEvent) {
        if let Some(ref mut cb) = self.callback {
            if let VmconEvent::Iteration {
                iteration,
                x,
                objective,
                direction,
                alpha,
                criterion,
                lamda_equality,
                lamda_inequality,
            } = event
            {
                cb(&IterationRecord {
                    iteration,
                    x: x.to_vec(),
                    objective,
                    direction: direction.to_vec(),
                    alpha,
                    criterion,
                    lamda_equality: lamda_equality.to_vec(),
                    lamda_inequality: lamda_inequality.to_vec(),
                });
            }
        }
    }
}

/// Counters and final values of a solve.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Steps taken
    pub iterations: usize,
    /// Last convergence criterion, `None` if no QP was solved
    pub criterion: Option<f64>,
    /// Objective at the reported x
    pub objective: f64,
    /// Σ|c_i| + Σ max(0, -d_j) at the reported x
    pub constraint_violation: f64,
    /// Evaluations of the objective and constraint values
    pub evaluations: usize,
    /// Evaluations of the gradients
    pub gradient_evaluations: usize,
    /// Active-set iterations summed over all QP subproblems
    pub qp_iterations: usize,
    pub skipped_hessian_updates: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmconSolution {
    /// Optimized variable values
    pub x: Vec<f64>,
    /// Multipliers of the equality constraints, any sign
    pub lamda_equality: Vec<f64>,
    /// Multipliers of the inequality constraints, non-negative
    pub lamda_inequality: Vec<f64>,
    pub diagnostics: Diagnostics,
}

/// Solves `problem` from `initial_x` with default settings apart from the
/// iteration budget and tolerance.
///
/// # Parameters
/// - `problem`: objective, constraints and their gradients
/// - `initial_x`: starting point
/// - `max_iter`: maximum number of steps
/// - `epsilon`: convergence tolerance
pub fn solve<P: Problem + ?Sized>(
    problem: &P,
    initial_x: &[f64],
    max_iter: usize,
    epsilon: f64,
) -> Result<VmconSolution, VmconError> {
    let options = VmconOptions::default()
        .with_max_iter(max_iter)
        .with_epsilon(epsilon);
    solve_with_options(problem, initial_x, &options)
}

pub fn solve_with_options<P: Problem + ?Sized>(
    problem: &P,
    initial_x: &[f64],
    options: &VmconOptions,
) -> Result<VmconSolution, VmconError> {
    solve_observed(problem, initial_x, options, ())
}

/// Version of [`solve_with_options`] that reports progress to an observer.
pub fn solve_observed<P: Problem + ?Sized, O: VmconObserver>(
    problem: &P,
    initial_x: &[f64],
    options: &VmconOptions,
    observer: O,
) -> Result<VmconSolution, VmconError> {
    let solver = Vmcon::new_with_observer(problem, initial_x, options.clone(), observer)?;
    match solver.run() {
        Ok(solution) => {
            log::info!(
                "VMCON converged after {} iterations, f = {:e}",
                solution.diagnostics.iterations,
                solution.diagnostics.objective
            );
            Ok(solution)
        }
        Err(err) => {
            log::info!("VMCON failed: {err}");
            Err(err)
        }
    }
}
