use serde::{Deserialize, Serialize};

use crate::convergence::Criterion;

/// Solver configuration.
///
/// All fields have defaults, so a partial JSON document is enough:
///
/// ```
/// let options: vmcon::VmconOptions =
///     serde_json::from_str(r#"{ "max_iter": 50, "line_search": { "max_steps": 20 } }"#).unwrap();
/// assert_eq!(options.max_iter, 50);
/// assert_eq!(options.line_search.max_steps, 20);
/// assert_eq!(options.epsilon, 1e-8);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmconOptions {
    /// Maximum number of outer iterations (steps)
    pub max_iter: usize,
    /// Convergence tolerance for the criterion
    pub epsilon: f64,
    pub criterion: Criterion,
    pub qp: QpOptions,
    pub line_search: LineSearchOptions,
    pub hessian: HessianOptions,
}

impl Default for VmconOptions {
    fn default() -> Self {
        Self {
            max_iter: 10,
            epsilon: 1e-8,
            criterion: Criterion::default(),
            qp: QpOptions::default(),
            line_search: LineSearchOptions::default(),
            hessian: HessianOptions::default(),
        }
    }
}

impl VmconOptions {
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.max_iter == 0 {
            return Err("max_iter must be at least 1".to_string());
        }
        if !(self.epsilon > 0.0 && self.epsilon.is_finite()) {
            return Err(format!("epsilon must be positive and finite, got {}", self.epsilon));
        }
        let ls = &self.line_search;
        if ls.max_steps == 0 {
            return Err("line_search.max_steps must be at least 1".to_string());
        }
        if !(ls.armijo > 0.0 && ls.armijo < 1.0) {
            return Err(format!("line_search.armijo must lie in (0, 1), got {}", ls.armijo));
        }
        if !(ls.min_contraction > 0.0 && ls.min_contraction < 1.0) {
            return Err(format!(
                "line_search.min_contraction must lie in (0, 1), got {}",
                ls.min_contraction
            ));
        }
        let h = &self.hessian;
        if !(h.damping_threshold > 0.0 && h.damping_threshold < 1.0) {
            return Err(format!(
                "hessian.damping_threshold must lie in (0, 1), got {}",
                h.damping_threshold
            ));
        }
        Ok(())
    }
}

/// Active-set QP subproblem settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QpOptions {
    /// Bound on KKT solves; `None` means 3 (n + m_i) + 10
    pub max_iterations: Option<usize>,
    /// Relative violation above which an inactive linearized inequality is added
    pub feasibility_tolerance: f64,
    /// Relative threshold on R's diagonal when checking active gradients for rank
    pub rank_tolerance: f64,
    /// Start each QP from the previous iteration's active set
    pub warm_start: bool,
}

impl Default for QpOptions {
    fn default() -> Self {
        Self {
            max_iterations: None,
            feasibility_tolerance: 1e-10,
            rank_tolerance: 1e-10,
            warm_start: true,
        }
    }
}

/// Merit-function line search settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineSearchOptions {
    /// Maximum number of trial points
    pub max_steps: usize,
    /// Sufficient decrease factor of the Armijo test
    pub armijo: f64,
    /// Smallest allowed ratio between consecutive trial steps
    pub min_contraction: f64,
    /// Step lengths below this are a failure
    pub min_step: f64,
}

impl Default for LineSearchOptions {
    fn default() -> Self {
        Self {
            max_steps: 10,
            armijo: 0.1,
            min_contraction: 0.1,
            min_step: 1e-12,
        }
    }
}

/// Powell damped BFGS settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HessianOptions {
    /// Damping starts when s'y < damping_threshold * s'Bs
    pub damping_threshold: f64,
}

impl Default for HessianOptions {
    fn default() -> Self {
        Self {
            damping_threshold: 0.2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(VmconOptions::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        assert!(VmconOptions::default().with_max_iter(0).validate().is_err());
        assert!(VmconOptions::default().with_epsilon(0.0).validate().is_err());
        assert!(VmconOptions::default().with_epsilon(f64::NAN).validate().is_err());

        let mut options = VmconOptions::default();
        options.line_search.armijo = 1.0;
        assert!(options.validate().is_err());

        let mut options = VmconOptions::default();
        options.hessian.damping_threshold = 0.0;
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let options: VmconOptions = serde_json::from_str(
            r#"{ "epsilon": 2e-8, "criterion": "Vmcon", "qp": { "warm_start": false } }"#,
        )
        .unwrap();
        assert_eq!(options.epsilon, 2e-8);
        assert_eq!(options.criterion, Criterion::Vmcon);
        assert!(!options.qp.warm_start);
        assert_eq!(options.qp.rank_tolerance, 1e-10);
        assert_eq!(options.max_iter, 10);
        assert_eq!(options.line_search, LineSearchOptions::default());
    }
}
