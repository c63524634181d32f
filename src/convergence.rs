use serde::{Deserialize, Serialize};

use crate::blas::vector_dot_product;
use crate::problem::Evaluation;
use crate::qp::QpResult;
use crate::Mat;

/// Which quantity is compared against epsilon after each QP solve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Criterion {
    /// `|g'd + 0.5 d'Bd| + sum |c| + sum max(0, -d)`: predicted change of the
    /// QP model plus the total constraint violation
    #[default]
    ModelDecrease,
    /// `|g'd| + sum |lamda_e c| + sum |lamda_i d|` (ANL-80-64)
    Vmcon,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub criterion: f64,
    pub converged: bool,
}

/// g'd + 0.5 d'Bd
pub fn model_change(evaluation: &Evaluation, hessian: &Mat, direction: &[f64]) -> f64 {
    vector_dot_product(&evaluation.objective_gradient, direction)
        + 0.5 * hessian.quad_form(direction)
}

pub fn check_convergence(
    criterion: Criterion,
    evaluation: &Evaluation,
    hessian: &Mat,
    qp: &QpResult,
    epsilon: f64,
) -> ConvergenceReport {
    let values = &evaluation.values;
    let value = match criterion {
        Criterion::ModelDecrease => {
            model_change(evaluation, hessian, &qp.direction).abs() + values.constraint_violation()
        }
        Criterion::Vmcon => {
            let equality: f64 = qp
                .lamda_equality
                .iter()
                .zip(&values.equality)
                .map(|(l, c)| (l * c).abs())
                .sum();
            let inequality: f64 = qp
                .lamda_inequality
                .iter()
                .zip(&values.inequality)
                .map(|(l, d)| (l * d).abs())
                .sum();
            vector_dot_product(&evaluation.objective_gradient, &qp.direction).abs()
                + equality
                + inequality
        }
    };
    ConvergenceReport {
        criterion: value,
        converged: value < epsilon,
    }
}
