use std::fmt;

use crate::blas::vector_step;
use crate::convergence::check_convergence;
use crate::error::LastIterate;
use crate::hessian::{damped_bfgs_update, HessianUpdate};
use crate::ldl::is_positive_definite;
use crate::line_search::{line_search, Penalty};
use crate::problem::{Evaluation, Problem};
use crate::qp::solve_qp;
use crate::{
    Diagnostics, Mat, VmconError, VmconEvent, VmconMode, VmconObserver, VmconOptions,
    VmconSolution,
};

/// Everything that carries over from one outer iteration to the next.
#[derive(Debug, Clone)]
pub struct IterationState {
    pub x: Vec<f64>,
    /// Symmetric positive definite approximation of the Lagrangian Hessian
    pub hessian: Mat,
    pub lamda_equality: Vec<f64>,
    pub lamda_inequality: Vec<f64>,
    /// Merit function weights, set after the first QP
    pub penalty: Option<Penalty>,
    /// Active inequalities of the last QP, used as its warm start
    pub active_set: Vec<bool>,
    /// Steps taken so far
    pub iteration: usize,
}

impl IterationState {
    fn new(x: Vec<f64>, num_equality: usize, num_inequality: usize) -> Self {
        let n = x.len();
        Self {
            x,
            hessian: Mat::identity(n),
            lamda_equality: vec![0.0; num_equality],
            lamda_inequality: vec![0.0; num_inequality],
            penalty: None,
            active_set: Vec::new(),
            iteration: 0,
        }
    }
}

/// Step-wise VMCON driver.
///
/// Each call to [`Vmcon::step`] performs one outer iteration: solve the QP at the
/// current point, check convergence, search along the QP direction and update
/// the Hessian approximation.
///
/// ```
/// use vmcon::{ClosureProblem, Vmcon, VmconMode, VmconOptions};
///
/// let problem = ClosureProblem::new(|x| x[0] * x[0], |x| vec![2.0 * x[0]])
///     .with_inequality(|x| x[0] - 1.0, |_| vec![1.0]);
/// let mut solver = Vmcon::new(&problem, &[3.0], VmconOptions::default()).unwrap();
/// while solver.step().unwrap() != VmconMode::Converged {}
/// assert!((solver.x()[0] - 1.0).abs() < 1e-8);
/// ```
pub struct Vmcon<'p, P: Problem + ?Sized, O: VmconObserver = ()> {
    problem: &'p P,
    options: VmconOptions,
    state: IterationState,
    /// Evaluation at `state.x`, `None` until the first step
    current: Option<Evaluation>,
    diagnostics: Diagnostics,
    mode: VmconMode,
    observer: O,
}

impl<P: Problem + ?Sized, O: VmconObserver> fmt::Debug for Vmcon<'_, P, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vmcon")
            .field("mode", &self.mode)
            .field("options", &self.options)
            .field("state", &self.state)
            .field("diagnostics", &self.diagnostics)
            .finish()
    }
}

impl<'p, P: Problem + ?Sized> Vmcon<'p, P, ()> {
    pub fn new(
        problem: &'p P,
        initial_x: &[f64],
        options: VmconOptions,
    ) -> Result<Self, VmconError> {
        Self::new_with_observer(problem, initial_x, options, ())
    }
}

impl<'p, P: Problem + ?Sized, O: VmconObserver> Vmcon<'p, P, O> {
    pub fn new_with_observer(
        problem: &'p P,
        initial_x: &[f64],
        options: VmconOptions,
        observer: O,
    ) -> Result<Self, VmconError> {
        options.validate().map_err(VmconError::InvalidInput)?;
        if initial_x.is_empty() {
            return Err(VmconError::InvalidInput(
                "initial_x must have at least one component".to_string(),
            ));
        }
        if let Some(i) = initial_x.iter().position(|v| !v.is_finite()) {
            return Err(VmconError::InvalidInput(format!(
                "initial_x[{i}] is not finite"
            )));
        }
        let num_equality = problem.num_equality();
        if num_equality > initial_x.len() {
            return Err(VmconError::InvalidInput(format!(
                "{num_equality} equality constraints for {} variables",
                initial_x.len()
            )));
        }

        let state = IterationState::new(initial_x.to_vec(), num_equality, problem.num_inequality());
        Ok(Self {
            problem,
            options,
            state,
            current: None,
            diagnostics: Diagnostics::default(),
            mode: VmconMode::Init,
            observer,
        })
    }

    /// Replaces the identity as the starting Hessian approximation.
    pub fn with_initial_hessian(mut self, hessian: Mat) -> Result<Self, VmconError> {
        let n = self.state.x.len();
        if hessian.rows() != n || hessian.cols() != n {
            return Err(VmconError::InvalidInput(format!(
                "initial Hessian is {}x{}, expected {n}x{n}",
                hessian.rows(),
                hessian.cols()
            )));
        }
        if !hessian.is_finite() || !is_positive_definite(&hessian) {
            return Err(VmconError::InvalidInput(
                "initial Hessian must be symmetric positive definite".to_string(),
            ));
        }
        self.state.hessian = hessian;
        Ok(self)
    }

    pub fn x(&self) -> &[f64] {
        &self.state.x
    }

    pub fn hessian(&self) -> &Mat {
        &self.state.hessian
    }

    pub fn lamda_equality(&self) -> &[f64] {
        &self.state.lamda_equality
    }

    pub fn lamda_inequality(&self) -> &[f64] {
        &self.state.lamda_inequality
    }

    pub fn iteration(&self) -> usize {
        self.state.iteration
    }

    pub fn mode(&self) -> VmconMode {
        self.mode
    }

    pub fn state(&self) -> &IterationState {
        &self.state
    }

    pub fn options(&self) -> &VmconOptions {
        &self.options
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            iterations: self.state.iteration,
            ..self.diagnostics.clone()
        }
    }

    fn last_iterate(&self) -> Box<LastIterate> {
        Box::new(LastIterate {
            x: self.state.x.clone(),
            lamda_equality: self.state.lamda_equality.clone(),
            lamda_inequality: self.state.lamda_inequality.clone(),
            diagnostics: self.diagnostics(),
        })
    }

    fn set_current(&mut self, evaluation: Evaluation) {
        self.diagnostics.objective = evaluation.values.objective;
        self.diagnostics.constraint_violation = evaluation.values.constraint_violation();
        self.current = Some(evaluation);
    }

    /// Performs one outer iteration.
    ///
    /// Returns [`VmconMode::Converged`] once the criterion falls below epsilon;
    /// further calls keep returning it without evaluating anything.
    pub fn step(&mut self) -> Result<VmconMode, VmconError> {
        if self.mode == VmconMode::Converged {
            return Ok(self.mode);
        }
        if self.state.iteration >= self.options.max_iter {
            return Err(VmconError::MaxIterationsReached {
                max_iter: self.options.max_iter,
                last: self.last_iterate(),
            });
        }

        let evaluation = match self.current.take() {
            Some(evaluation) => evaluation,
            None => {
                self.diagnostics.evaluations += 1;
                self.diagnostics.gradient_evaluations += 1;
                Evaluation::evaluate(self.problem, &self.state.x)?
            }
        };

        // QP SUBPROBLEM
        let warm_start = self
            .options
            .qp
            .warm_start
            .then_some(self.state.active_set.as_slice());
        let qp = match solve_qp(&evaluation, &self.state.hessian, warm_start, &self.options.qp) {
            Ok(qp) => qp,
            Err(reason) => {
                self.set_current(evaluation);
                return Err(VmconError::QpInfeasible {
                    reason,
                    last: self.last_iterate(),
                });
            }
        };
        self.diagnostics.qp_iterations += qp.iterations;
        self.state.lamda_equality.clone_from(&qp.lamda_equality);
        self.state.lamda_inequality.clone_from(&qp.lamda_inequality);
        self.state.active_set.clone_from(&qp.active_set);

        // CONVERGENCE CHECK
        let report = check_convergence(
            self.options.criterion,
            &evaluation,
            &self.state.hessian,
            &qp,
            self.options.epsilon,
        );
        self.diagnostics.criterion = Some(report.criterion);
        if report.converged {
            log::debug!(
                "converged after {} iterations, criterion = {:e}",
                self.state.iteration,
                report.criterion
            );
            self.set_current(evaluation);
            self.mode = VmconMode::Converged;
            return Ok(self.mode);
        }

        // LINE SEARCH
        let penalty = match self.state.penalty.take() {
            Some(mut penalty) => {
                penalty.update(&qp.lamda_equality, &qp.lamda_inequality);
                penalty
            }
            None => Penalty::initial(&qp.lamda_equality, &qp.lamda_inequality),
        };
        let searched = line_search(
            self.problem,
            &evaluation,
            &qp.direction,
            &penalty,
            &self.options.line_search,
        );
        self.state.penalty = Some(penalty);
        let outcome = match searched {
            Ok(outcome) => outcome,
            Err(reason) => {
                self.diagnostics.evaluations += reason.attempts();
                self.set_current(evaluation);
                return Err(VmconError::LineSearchFailed {
                    reason,
                    last: self.last_iterate(),
                });
            }
        };
        self.diagnostics.evaluations += outcome.attempts;
        self.diagnostics.gradient_evaluations += 1;
        let alpha = outcome.alpha;
        let next = Evaluation::from_values(self.problem, outcome.values).map_err(|err| match err {
            VmconError::NonFiniteEvaluation { callable, x, .. } => {
                VmconError::NonFiniteEvaluation {
                    callable,
                    x,
                    last: Some(self.last_iterate()),
                }
            }
            other => other,
        })?;

        // HESSIAN UPDATE
        let step = vector_step(&next.values.x, -1.0, &evaluation.values.x);
        let old_gradient = evaluation.lagrangian_gradient(&qp.lamda_equality, &qp.lamda_inequality);
        let gradient_change = vector_step(
            &next.lagrangian_gradient(&qp.lamda_equality, &qp.lamda_inequality),
            -1.0,
            &old_gradient,
        );
        match damped_bfgs_update(
            &mut self.state.hessian,
            &step,
            &gradient_change,
            &self.options.hessian,
        ) {
            HessianUpdate::Updated { theta } => {
                if theta < 1.0 {
                    log::trace!("damped Hessian update, theta = {theta}");
                }
            }
            HessianUpdate::Skipped(reason) => {
                log::warn!(
                    "iteration {}: Hessian update skipped, {reason}",
                    self.state.iteration
                );
                self.diagnostics.skipped_hessian_updates += 1;
                if self.observer.is_active() {
                    self.observer.on_event(VmconEvent::HessianUpdateSkipped {
                        iteration: self.state.iteration,
                        reason,
                    });
                }
            }
        }

        self.state.x.clone_from(&next.values.x);
        self.state.iteration += 1;
        self.set_current(next);
        self.mode = VmconMode::Iterating;

        log::debug!(
            "iteration {}: f = {:e}, criterion = {:e}, alpha = {alpha:e}",
            self.state.iteration,
            self.diagnostics.objective,
            report.criterion
        );
        if self.observer.is_active() {
            self.observer.on_event(VmconEvent::Iteration {
                iteration: self.state.iteration,
                x: &self.state.x,
                objective: self.diagnostics.objective,
                direction: &qp.direction,
                alpha,
                criterion: report.criterion,
                lamda_equality: &self.state.lamda_equality,
                lamda_inequality: &self.state.lamda_inequality,
            });
        }

        Ok(self.mode)
    }

    /// Runs [`Vmcon::step`] until convergence or failure.
    pub fn run(mut self) -> Result<VmconSolution, VmconError> {
        while self.step()? != VmconMode::Converged {}
        Ok(self.into_solution())
    }

    pub fn into_solution(self) -> VmconSolution {
        let diagnostics = self.diagnostics();
        VmconSolution {
            x: self.state.x,
            lamda_equality: self.state.lamda_equality,
            lamda_inequality: self.state.lamda_inequality,
            diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClosureProblem;

    fn bounded_quadratic() -> ClosureProblem<'static> {
        ClosureProblem::new(|x| x[0] * x[0], |x| vec![2.0 * x[0]])
            .with_inequality(|x| x[0] - 1.0, |_| vec![1.0])
    }

    #[test]
    fn test_step_advances_until_converged() {
        let problem = bounded_quadratic();
        let mut solver = Vmcon::new(&problem, &[3.0], VmconOptions::default()).unwrap();
        assert_eq!(solver.mode(), VmconMode::Init);

        let mut steps = 0;
        while solver.step().unwrap() != VmconMode::Converged {
            steps += 1;
            assert_eq!(solver.iteration(), steps);
        }
        assert_eq!(solver.mode(), VmconMode::Converged);
        assert!((solver.x()[0] - 1.0).abs() < 1e-8);
        // d/dx x^2 = 2 at the bound
        assert!((solver.lamda_inequality()[0] - 2.0).abs() < 1e-6);

        let evaluations = solver.diagnostics().evaluations;
        assert_eq!(solver.step().unwrap(), VmconMode::Converged);
        assert_eq!(solver.diagnostics().evaluations, evaluations);
    }

    #[test]
    fn test_invalid_construction() {
        let problem = bounded_quadratic();
        assert!(matches!(
            Vmcon::new(&problem, &[], VmconOptions::default()),
            Err(VmconError::InvalidInput(_))
        ));
        assert!(matches!(
            Vmcon::new(&problem, &[f64::INFINITY], VmconOptions::default()),
            Err(VmconError::InvalidInput(_))
        ));

        let overdetermined = ClosureProblem::new(|x| x[0], |_| vec![1.0])
            .with_equality(|x| x[0], |_| vec![1.0])
            .with_equality(|x| x[0] - 1.0, |_| vec![1.0]);
        assert!(matches!(
            Vmcon::new(&overdetermined, &[0.0], VmconOptions::default()),
            Err(VmconError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_initial_hessian_is_validated() {
        let problem = bounded_quadratic();
        let solver = Vmcon::new(&problem, &[3.0], VmconOptions::default()).unwrap();
        assert!(solver.with_initial_hessian(Mat::identity(2)).is_err());

        let solver = Vmcon::new(&problem, &[3.0], VmconOptions::default()).unwrap();
        assert!(solver
            .with_initial_hessian(Mat::from_rows(&[vec![-1.0]]))
            .is_err());

        let solver = Vmcon::new(&problem, &[3.0], VmconOptions::default())
            .unwrap()
            .with_initial_hessian(Mat::from_rows(&[vec![2.0]]))
            .unwrap();
        assert_eq!(solver.hessian()[(0, 0)], 2.0);
    }

    #[test]
    fn test_exact_initial_hessian_converges_in_one_step() {
        // the QP model is exact, so the first step lands on the bound
        let problem = bounded_quadratic();
        let solution = Vmcon::new(&problem, &[3.0], VmconOptions::default())
            .unwrap()
            .with_initial_hessian(Mat::from_rows(&[vec![2.0]]))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(solution.diagnostics.iterations, 1);
        assert!((solution.x[0] - 1.0).abs() < 1e-12);
    }
}
