use crate::blas::vector_dot_product;
use crate::ldl::ldl_factor;
use crate::options::HessianOptions;
use crate::Mat;

/// Why an update left the Hessian approximation unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// s'Bs or s'eta is not a positive finite number
    DegenerateCurvature,
    /// The updated matrix has non-finite entries
    NonFinite,
    /// The updated matrix failed the LDL' positive definiteness check
    NotPositiveDefinite,
}

impl SkipReason {
    pub fn message(&self) -> &str {
        match self {
            SkipReason::DegenerateCurvature => "step has degenerate curvature",
            SkipReason::NonFinite => "update produced non-finite entries",
            SkipReason::NotPositiveDefinite => "update lost positive definiteness",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HessianUpdate {
    /// `theta` is 1 for a plain BFGS update and less when damped
    Updated { theta: f64 },
    Skipped(SkipReason),
}

/// Powell's damped BFGS update.
///
/// `step` is s = x_new - x_old and `gradient_change` is y, the change of the
/// Lagrangian gradient with the multipliers held fixed. When s'y is small
/// compared with s'Bs, y is replaced by eta = theta y + (1 - theta) Bs with
/// theta chosen so that s'eta = (1 - damping_threshold) s'Bs, which keeps the
/// update positive definite.
///
/// `hessian` is only modified when the result is a finite positive definite matrix.
pub fn damped_bfgs_update(
    hessian: &mut Mat,
    step: &[f64],
    gradient_change: &[f64],
    options: &HessianOptions,
) -> HessianUpdate {
    let n = step.len();
    let bs = hessian.mul_vec(step);
    let s_bs = vector_dot_product(step, &bs);
    let s_y = vector_dot_product(step, gradient_change);
    if !(s_bs > 0.0 && s_bs.is_finite() && s_y.is_finite()) {
        return HessianUpdate::Skipped(SkipReason::DegenerateCurvature);
    }

    let theta = if s_y < options.damping_threshold * s_bs {
        (1.0 - options.damping_threshold) * s_bs / (s_bs - s_y)
    } else {
        1.0
    };
    let eta: Vec<f64> = gradient_change
        .iter()
        .zip(&bs)
        .map(|(y_i, bs_i)| theta * y_i + (1.0 - theta) * bs_i)
        .collect();
    let s_eta = vector_dot_product(step, &eta);
    if !(s_eta > 0.0 && s_eta.is_finite()) {
        return HessianUpdate::Skipped(SkipReason::DegenerateCurvature);
    }

    let mut updated = hessian.clone();
    for j in 0..n {
        for i in j..n {
            let value = hessian[(i, j)] - bs[i] * bs[j] / s_bs + eta[i] * eta[j] / s_eta;
            updated[(i, j)] = value;
            updated[(j, i)] = value;
        }
    }

    if !updated.is_finite() {
        return HessianUpdate::Skipped(SkipReason::NonFinite);
    }
    if ldl_factor(&updated).is_none() {
        return HessianUpdate::Skipped(SkipReason::NotPositiveDefinite);
    }
    *hessian = updated;
    HessianUpdate::Updated { theta }
}
