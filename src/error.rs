use serde::{Deserialize, Serialize};

use crate::line_search::LineSearchError;
use crate::qp::QpError;
use crate::Diagnostics;

/// Identifies which caller-supplied function produced a bad value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Callable {
    Objective,
    ObjectiveGradient,
    Equality(usize),
    EqualityGradient(usize),
    Inequality(usize),
    InequalityGradient(usize),
}

impl std::fmt::Display for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Objective => write!(f, "objective"),
            Self::ObjectiveGradient => write!(f, "objective gradient"),
            Self::Equality(i) => write!(f, "equality constraint {i}"),
            Self::EqualityGradient(i) => write!(f, "gradient of equality constraint {i}"),
            Self::Inequality(j) => write!(f, "inequality constraint {j}"),
            Self::InequalityGradient(j) => write!(f, "gradient of inequality constraint {j}"),
        }
    }
}

/// The point the solver had reached when it gave up.
///
/// The multipliers are the ones from the last QP subproblem that was solved. They
/// are reported for inspection only: at a failure they need not satisfy any
/// optimality condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastIterate {
    pub x: Vec<f64>,
    pub lamda_equality: Vec<f64>,
    pub lamda_inequality: Vec<f64>,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, thiserror::Error)]
pub enum VmconError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{callable} returned {found} components, expected {expected}")]
    DimensionMismatch {
        callable: Callable,
        expected: usize,
        found: usize,
    },

    /// `last` is set when the value came from the gradients at an accepted step, so
    /// the progress made up to the previous iterate is not lost.
    #[error("{callable} returned a non-finite value at x = {x:?}")]
    NonFiniteEvaluation {
        callable: Callable,
        x: Vec<f64>,
        last: Option<Box<LastIterate>>,
    },

    #[error("QP subproblem could not be solved: {reason}")]
    QpInfeasible {
        reason: QpError,
        last: Box<LastIterate>,
    },

    #[error("line search did not converge on an approximate minimum: {reason}")]
    LineSearchFailed {
        reason: LineSearchError,
        last: Box<LastIterate>,
    },

    #[error("could not converge on a feasible solution after {max_iter} iterations")]
    MaxIterationsReached {
        max_iter: usize,
        last: Box<LastIterate>,
    },
}

impl VmconError {
    /// The last iterate carried by a convergence failure.
    pub fn last_iterate(&self) -> Option<&LastIterate> {
        match self {
            Self::QpInfeasible { last, .. }
            | Self::LineSearchFailed { last, .. }
            | Self::MaxIterationsReached { last, .. } => Some(last),
            Self::NonFiniteEvaluation { last, .. } => last.as_deref(),
            Self::InvalidInput(_) | Self::DimensionMismatch { .. } => None,
        }
    }

    /// True for the failures that come from the iteration itself rather than
    /// from the caller's input or functions.
    pub fn is_convergence_failure(&self) -> bool {
        matches!(
            self,
            Self::QpInfeasible { .. }
                | Self::LineSearchFailed { .. }
                | Self::MaxIterationsReached { .. }
        )
    }
}
