//! The optimization problem as seen by the solver.
//!
//! ```text
//!     minimize    f(x)
//!     subject to  c_i(x) == 0,   i = 0..m_e
//!                 d_j(x) >= 0,   j = 0..m_i
//! ```
//!
//! Constraint indices are significant: the multiplier vectors returned by the
//! solver line up with them.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::blas::{vector_abs_sum, vector_add_scaled};
use crate::error::{Callable, VmconError};
use crate::Mat;

/// First-order description of a constrained problem.
///
/// Every method must be a pure function of `x`. Gradients must have exactly
/// `x.len()` components.
pub trait Problem: Sync {
    fn objective(&self, x: &[f64]) -> f64;
    fn objective_gradient(&self, x: &[f64]) -> Vec<f64>;

    fn num_equality(&self) -> usize;
    fn equality(&self, index: usize, x: &[f64]) -> f64;
    fn equality_gradient(&self, index: usize, x: &[f64]) -> Vec<f64>;

    fn num_inequality(&self) -> usize;
    fn inequality(&self, index: usize, x: &[f64]) -> f64;
    fn inequality_gradient(&self, index: usize, x: &[f64]) -> Vec<f64>;
}

type ScalarFn<'a> = Box<dyn Fn(&[f64]) -> f64 + Send + Sync + 'a>;
type VectorFn<'a> = Box<dyn Fn(&[f64]) -> Vec<f64> + Send + Sync + 'a>;

/// A constraint function together with its gradient.
pub struct Constraint<'a> {
    value: ScalarFn<'a>,
    gradient: VectorFn<'a>,
}

impl<'a> Constraint<'a> {
    pub fn new(
        value: impl Fn(&[f64]) -> f64 + Send + Sync + 'a,
        gradient: impl Fn(&[f64]) -> Vec<f64> + Send + Sync + 'a,
    ) -> Self {
        Self {
            value: Box::new(value),
            gradient: Box::new(gradient),
        }
    }
}

/// [`Problem`] assembled from closures.
///
/// ```
/// use vmcon::ClosureProblem;
///
/// // minimize (x0 - 2)^2 + (x1 - 1)^2  subject to  x0 - 2 x1 + 1 == 0
/// let problem = ClosureProblem::new(
///     |x| (x[0] - 2.0).powi(2) + (x[1] - 1.0).powi(2),
///     |x| vec![2.0 * (x[0] - 2.0), 2.0 * (x[1] - 1.0)],
/// )
/// .with_equality(|x| x[0] - 2.0 * x[1] + 1.0, |_| vec![1.0, -2.0]);
/// ```
pub struct ClosureProblem<'a> {
    objective: ScalarFn<'a>,
    gradient: VectorFn<'a>,
    equality: Vec<Constraint<'a>>,
    inequality: Vec<Constraint<'a>>,
}

impl<'a> ClosureProblem<'a> {
    pub fn new(
        objective: impl Fn(&[f64]) -> f64 + Send + Sync + 'a,
        gradient: impl Fn(&[f64]) -> Vec<f64> + Send + Sync + 'a,
    ) -> Self {
        Self {
            objective: Box::new(objective),
            gradient: Box::new(gradient),
            equality: Vec::new(),
            inequality: Vec::new(),
        }
    }

    /// Appends the equality constraint `value(x) == 0`.
    pub fn with_equality(
        self,
        value: impl Fn(&[f64]) -> f64 + Send + Sync + 'a,
        gradient: impl Fn(&[f64]) -> Vec<f64> + Send + Sync + 'a,
    ) -> Self {
        self.with_equality_constraint(Constraint::new(value, gradient))
    }

    /// Appends the inequality constraint `value(x) >= 0`.
    pub fn with_inequality(
        self,
        value: impl Fn(&[f64]) -> f64 + Send + Sync + 'a,
        gradient: impl Fn(&[f64]) -> Vec<f64> + Send + Sync + 'a,
    ) -> Self {
        self.with_inequality_constraint(Constraint::new(value, gradient))
    }

    pub fn with_equality_constraint(mut self, constraint: Constraint<'a>) -> Self {
        self.equality.push(constraint);
        self
    }

    pub fn with_inequality_constraint(mut self, constraint: Constraint<'a>) -> Self {
        self.inequality.push(constraint);
        self
    }
}

impl Problem for ClosureProblem<'_> {
    fn objective(&self, x: &[f64]) -> f64 {
        (self.objective)(x)
    }

    fn objective_gradient(&self, x: &[f64]) -> Vec<f64> {
        (self.gradient)(x)
    }

    fn num_equality(&self) -> usize {
        self.equality.len()
    }

    fn equality(&self, index: usize, x: &[f64]) -> f64 {
        (self.equality[index].value)(x)
    }

    fn equality_gradient(&self, index: usize, x: &[f64]) -> Vec<f64> {
        (self.equality[index].gradient)(x)
    }

    fn num_inequality(&self) -> usize {
        self.inequality.len()
    }

    fn inequality(&self, index: usize, x: &[f64]) -> f64 {
        (self.inequality[index].value)(x)
    }

    fn inequality_gradient(&self, index: usize, x: &[f64]) -> Vec<f64> {
        (self.inequality[index].gradient)(x)
    }
}

/// Evaluates `f(0..count)`, on the rayon pool when the `parallel` feature is on.
fn gather<T, F>(count: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Send + Sync,
{
    #[cfg(feature = "parallel")]
    let values: Vec<T> = (0..count).into_par_iter().map(f).collect();

    #[cfg(not(feature = "parallel"))]
    let values: Vec<T> = (0..count).map(f).collect();

    values
}

/// Function and constraint values at a point, without derivatives.
#[derive(Debug, Clone, PartialEq)]
pub struct PointValues {
    pub x: Vec<f64>,
    pub objective: f64,
    pub equality: Vec<f64>,
    pub inequality: Vec<f64>,
}

impl PointValues {
    pub fn evaluate<P: Problem + ?Sized>(problem: &P, x: &[f64]) -> Self {
        let equality = gather(problem.num_equality(), |i| problem.equality(i, x));
        let inequality = gather(problem.num_inequality(), |j| problem.inequality(j, x));
        Self {
            x: x.to_vec(),
            objective: problem.objective(x),
            equality,
            inequality,
        }
    }

    /// Σ|c_i| + Σ max(0, -d_j)
    pub fn constraint_violation(&self) -> f64 {
        let equality = vector_abs_sum(&self.equality);
        let inequality: f64 = self.inequality.iter().map(|d| (-d).max(0.0)).sum();
        equality + inequality
    }

    pub fn is_finite(&self) -> bool {
        self.objective.is_finite()
            && self.equality.iter().all(|v| v.is_finite())
            && self.inequality.iter().all(|v| v.is_finite())
    }

    fn check_finite(&self) -> Result<(), VmconError> {
        let non_finite = |callable| VmconError::NonFiniteEvaluation {
            callable,
            x: self.x.clone(),
            last: None,
        };
        if !self.objective.is_finite() {
            return Err(non_finite(Callable::Objective));
        }
        if let Some(i) = self.equality.iter().position(|v| !v.is_finite()) {
            return Err(non_finite(Callable::Equality(i)));
        }
        if let Some(j) = self.inequality.iter().position(|v| !v.is_finite()) {
            return Err(non_finite(Callable::Inequality(j)));
        }
        Ok(())
    }
}

/// Values and first derivatives at a point.
///
/// The Jacobians hold one constraint gradient per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub values: PointValues,
    pub objective_gradient: Vec<f64>,
    pub equality_jacobian: Mat,
    pub inequality_jacobian: Mat,
}

impl Evaluation {
    pub fn evaluate<P: Problem + ?Sized>(problem: &P, x: &[f64]) -> Result<Self, VmconError> {
        Self::from_values(problem, PointValues::evaluate(problem, x))
    }

    /// Completes already computed values with the gradients at the same point.
    pub fn from_values<P: Problem + ?Sized>(
        problem: &P,
        values: PointValues,
    ) -> Result<Self, VmconError> {
        values.check_finite()?;
        let x = values.x.as_slice();
        let n = x.len();

        let objective_gradient = problem.objective_gradient(x);
        check_gradient(&objective_gradient, n, Callable::ObjectiveGradient, x)?;

        let equality_gradients = gather(problem.num_equality(), |i| {
            problem.equality_gradient(i, x)
        });
        let inequality_gradients = gather(problem.num_inequality(), |j| {
            problem.inequality_gradient(j, x)
        });

        let mut equality_jacobian = Mat::new(equality_gradients.len(), n);
        for (i, gradient) in equality_gradients.iter().enumerate() {
            check_gradient(gradient, n, Callable::EqualityGradient(i), x)?;
            equality_jacobian.set_row(i, gradient);
        }
        let mut inequality_jacobian = Mat::new(inequality_gradients.len(), n);
        for (j, gradient) in inequality_gradients.iter().enumerate() {
            check_gradient(gradient, n, Callable::InequalityGradient(j), x)?;
            inequality_jacobian.set_row(j, gradient);
        }

        Ok(Self {
            values,
            objective_gradient,
            equality_jacobian,
            inequality_jacobian,
        })
    }

    pub fn num_variables(&self) -> usize {
        self.values.x.len()
    }

    pub fn num_equality(&self) -> usize {
        self.values.equality.len()
    }

    pub fn num_inequality(&self) -> usize {
        self.values.inequality.len()
    }

    /// ∇f - A_e' λ_e - A_i' λ_i, the gradient of L = f - λ_e' c - λ_i' d.
    pub fn lagrangian_gradient(
        &self,
        lamda_equality: &[f64],
        lamda_inequality: &[f64],
    ) -> Vec<f64> {
        let mut gradient = self.objective_gradient.clone();
        let equality = self.equality_jacobian.transpose_mul_vec(lamda_equality);
        let inequality = self.inequality_jacobian.transpose_mul_vec(lamda_inequality);
        vector_add_scaled(-1.0, &equality, &mut gradient);
        vector_add_scaled(-1.0, &inequality, &mut gradient);
        gradient
    }
}

fn check_gradient(
    gradient: &[f64],
    expected: usize,
    callable: Callable,
    x: &[f64],
) -> Result<(), VmconError> {
    if gradient.len() != expected {
        return Err(VmconError::DimensionMismatch {
            callable,
            expected,
            found: gradient.len(),
        });
    }
    if gradient.iter().any(|v| !v.is_finite()) {
        return Err(VmconError::NonFiniteEvaluation {
            callable,
            x: x.to_vec(),
            last: None,
        });
    }
    Ok(())
}
