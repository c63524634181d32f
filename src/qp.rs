//! QP subproblem.
//!
//! ```text
//!     minimize    g'd + 0.5 d'Bd
//!     subject to  A_e d + c  = 0
//!                 A_i d + d0 >= 0
//! ```
//!
//! B is positive definite, so the problem is strictly convex. It is solved by the
//! dual active-set method of Goldfarb and Idnani: start from the minimizer over
//! the equalities (and the warm-start rows), then repeatedly pick the most
//! violated inequality and move along a primal-dual path until it becomes
//! active, dropping active rows whose multiplier reaches zero on the way. Every
//! intermediate point is optimal for the rows it keeps active, so the active
//! gradients stay independent and more inequalities than variables are fine.
//! A violated row that no dual step can reach proves the linearization
//! inconsistent.
//!
//! Each KKT system
//!
//! ```text
//!     [ B  -A' ] [ d      ]   [ -g   ]
//!     [ A   0  ] [ lambda ] = [ -c_A ]
//! ```
//!
//! is solved by the null-space method on a QR factorization of A'.

use crate::blas::{vector_add_scaled, vector_dot_product, vector_norm};
use crate::householder::HouseholderQr;
use crate::ldl::{ldl_factor, ldl_solve};
use crate::options::QpOptions;
use crate::problem::Evaluation;
use crate::Mat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QpError {
    #[error("linearized constraints are inconsistent")]
    Infeasible,
    #[error("active constraint gradients are linearly dependent")]
    DependentConstraints,
    #[error("KKT system is singular")]
    SingularSystem,
    #[error("no consistent active set within {0} active-set iterations")]
    IterationLimit(usize),
}

/// Solution of one QP subproblem.
#[derive(Debug, Clone, PartialEq)]
pub struct QpResult {
    pub direction: Vec<f64>,
    pub lamda_equality: Vec<f64>,
    pub lamda_inequality: Vec<f64>,
    pub active_set: Vec<bool>,
    /// Number of KKT solves performed
    pub iterations: usize,
}

/// Solves the QP subproblem built from `evaluation` and `hessian`.
///
/// `warm_start` is the active set of the previous iteration. When it leads to a
/// failure the solve is retried once from the empty active set.
pub fn solve_qp(
    evaluation: &Evaluation,
    hessian: &Mat,
    warm_start: Option<&[bool]>,
    options: &QpOptions,
) -> Result<QpResult, QpError> {
    let m_i = evaluation.num_inequality();
    let warm = warm_start.filter(|active| active.len() == m_i && active.iter().any(|&a| a));
    if let Some(active) = warm {
        let rows = (0..m_i).filter(|&j| active[j]).collect();
        match dual_active_set(evaluation, hessian, rows, options) {
            Ok(result) => return Ok(result),
            Err(err) => {
                log::warn!("warm-started QP failed ({err}), retrying from the empty active set");
            }
        }
    }
    dual_active_set(evaluation, hessian, Vec::new(), options)
}

/// Constraint rows of one subproblem, extracted from the Jacobians once.
struct Linearization<'a> {
    evaluation: &'a Evaluation,
    equality: Vec<Vec<f64>>,
    inequality: Vec<Vec<f64>>,
}

impl<'a> Linearization<'a> {
    fn new(evaluation: &'a Evaluation) -> Self {
        Self {
            evaluation,
            equality: (0..evaluation.num_equality())
                .map(|i| evaluation.equality_jacobian.row(i))
                .collect(),
            inequality: (0..evaluation.num_inequality())
                .map(|j| evaluation.inequality_jacobian.row(j))
                .collect(),
        }
    }

    /// Equality rows followed by the `active` inequality rows, with their values.
    fn system(&self, active: &[usize]) -> Vec<(&[f64], f64)> {
        let values = &self.evaluation.values;
        let equality = self.equality.iter().zip(&values.equality);
        let inequality = active
            .iter()
            .map(|&j| (&self.inequality[j], &values.inequality[j]));
        equality
            .chain(inequality)
            .map(|(row, &value)| (row.as_slice(), value))
            .collect()
    }

    /// Same rows as `system` with zero values.
    fn homogeneous(&self, active: &[usize]) -> Vec<(&[f64], f64)> {
        let mut rows = self.system(active);
        rows.iter_mut().for_each(|row| row.1 = 0.0);
        rows
    }

    /// `d0_j + a_j'd`, negative when inequality j is violated at `direction`.
    fn residual(&self, j: usize, direction: &[f64]) -> f64 {
        self.evaluation.values.inequality[j] + vector_dot_product(&self.inequality[j], direction)
    }

    /// Whether inequality `p` is a combination of the equality and `active` rows.
    fn is_dependent(&self, active: &[usize], p: usize, rank_tolerance: f64) -> bool {
        let n = self.evaluation.num_variables();
        let gradients: Vec<&[f64]> = self
            .equality
            .iter()
            .chain(active.iter().map(|&j| &self.inequality[j]))
            .chain(std::iter::once(&self.inequality[p]))
            .map(|row| row.as_slice())
            .collect();
        let m = gradients.len();
        if m > n {
            return true;
        }
        let mut normals = Mat::new(n, m);
        for (k, gradient) in gradients.iter().enumerate() {
            let norm = vector_norm(gradient);
            if norm == 0.0 {
                return true;
            }
            for (c, g_c) in gradient.iter().enumerate() {
                normals[(c, k)] = g_c / norm;
            }
        }
        HouseholderQr::new(&normals).rank(rank_tolerance) < m
    }
}

fn count_iteration(iterations: &mut usize, limit: usize) -> Result<(), QpError> {
    *iterations += 1;
    if *iterations > limit {
        return Err(QpError::IterationLimit(limit));
    }
    Ok(())
}

fn dual_active_set(
    evaluation: &Evaluation,
    hessian: &Mat,
    mut active: Vec<usize>,
    options: &QpOptions,
) -> Result<QpResult, QpError> {
    let n = evaluation.num_variables();
    let m_e = evaluation.num_equality();
    let m_i = evaluation.num_inequality();
    let limit = options.max_iterations.unwrap_or(3 * (n + m_i) + 10);
    let tolerance = options.rank_tolerance;
    let gradient = &evaluation.objective_gradient;
    let rows = Linearization::new(evaluation);
    let mut iterations = 0;

    // START: minimizer over the equalities and the initial rows, dropping the
    // most negative inequality multiplier until none is left
    let (mut direction, mut lamda) = loop {
        count_iteration(&mut iterations, limit)?;
        let (direction, lamda) = solve_kkt(&rows.system(&active), gradient, hessian, tolerance)?;
        let most_negative = (0..active.len())
            .filter(|&k| lamda[m_e + k] < 0.0)
            .min_by(|&a, &b| lamda[m_e + a].total_cmp(&lamda[m_e + b]));
        match most_negative {
            Some(k) => {
                log::trace!(
                    "qp iteration {iterations}: dropping inequality {} (lamda = {:e})",
                    active[k],
                    lamda[m_e + k]
                );
                active.remove(k);
            }
            None => break (direction, lamda),
        }
    };

    let mut moved = false;
    loop {
        // ADD the most violated inactive inequality
        let most_violated = (0..m_i)
            .filter(|j| !active.contains(j))
            .map(|j| (j, rows.residual(j, &direction)))
            .filter(|&(j, residual)| {
                let value = evaluation.values.inequality[j];
                residual < -options.feasibility_tolerance * value.abs().max(1.0)
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));
        let Some((p, residual)) = most_violated else {
            break;
        };
        log::trace!("qp iteration {iterations}: adding inequality {p} (residual = {residual:e})");
        moved = true;

        let normal = &rows.inequality[p];
        let minus_normal: Vec<f64> = normal.iter().map(|v| -v).collect();
        let mut lamda_p = 0.0;
        loop {
            count_iteration(&mut iterations, limit)?;
            let dependent = rows.is_dependent(&active, p, tolerance);
            // Primal and dual rates of change per unit of lamda_p
            let (mut step, lamda_step) =
                solve_kkt(&rows.homogeneous(&active), &minus_normal, hessian, tolerance)?;
            if dependent {
                step.fill(0.0);
            }

            // DUAL STEP: largest t keeping the active multipliers non-negative
            let mut dual_step = f64::INFINITY;
            let mut blocking = None;
            for k in 0..active.len() {
                let rate = lamda_step[m_e + k];
                if rate < 0.0 {
                    let t = lamda[m_e + k] / -rate;
                    if t < dual_step {
                        dual_step = t;
                        blocking = Some(k);
                    }
                }
            }

            // PRIMAL STEP: t that puts inequality p on its boundary
            let curvature = vector_dot_product(&step, normal);
            let primal_step = if !dependent && curvature > 0.0 {
                -rows.residual(p, &direction) / curvature
            } else {
                f64::INFINITY
            };

            if dual_step.is_infinite() && primal_step.is_infinite() {
                log::debug!("qp iteration {iterations}: inequality {p} cannot be satisfied");
                return Err(QpError::Infeasible);
            }
            let t = dual_step.min(primal_step);
            if primal_step.is_finite() {
                vector_add_scaled(t, &step, &mut direction);
            }
            vector_add_scaled(t, &lamda_step, &mut lamda);
            lamda_p += t;

            if primal_step <= dual_step {
                active.push(p);
                lamda.push(lamda_p);
                break;
            }
            if let Some(k) = blocking {
                log::trace!(
                    "qp iteration {iterations}: dropping inequality {} on the way",
                    active[k]
                );
                active.remove(k);
                lamda.remove(m_e + k);
            }
        }
    }

    // The path accumulates rounding; one solve on the final active set cleans it up
    if moved {
        (direction, lamda) = solve_kkt(&rows.system(&active), gradient, hessian, tolerance)?;
    }

    let lamda_equality = lamda[..m_e].to_vec();
    let mut lamda_inequality = vec![0.0; m_i];
    let mut active_set = vec![false; m_i];
    for (k, &j) in active.iter().enumerate() {
        lamda_inequality[j] = lamda[m_e + k].max(0.0);
        active_set[j] = true;
    }
    Ok(QpResult {
        direction,
        lamda_equality,
        lamda_inequality,
        active_set,
        iterations,
    })
}

/// Solves the KKT system `B d + gradient = N' mu`, `N d + v = 0` for the rows
/// `(N_k, v_k)`. Returns d and mu in row order.
///
/// Null-space method: with the unit-length row gradients factored as
/// `N' P = Q R`, the constraints fix the first m components of `Q'd` and the
/// remaining ones minimize the model over the null space. B only enters through
/// the reduced Hessian `Z'BZ` and the product `Bd`, so a badly scaled B does not
/// disturb the constraint rows.
fn solve_kkt(
    rows: &[(&[f64], f64)],
    gradient: &[f64],
    hessian: &Mat,
    rank_tolerance: f64,
) -> Result<(Vec<f64>, Vec<f64>), QpError> {
    let n = gradient.len();
    let m = rows.len();
    if m > n {
        return Err(QpError::DependentConstraints);
    }

    let mut normals = Mat::new(n, m);
    let mut scales = vec![0.0; m];
    let mut targets = vec![0.0; m];
    for (k, &(row, value)) in rows.iter().enumerate() {
        let norm = vector_norm(row);
        if norm == 0.0 || !norm.is_finite() {
            return Err(QpError::DependentConstraints);
        }
        for (c, g_c) in row.iter().enumerate() {
            normals[(c, k)] = g_c / norm;
        }
        scales[k] = norm;
        targets[k] = -value / norm;
    }

    let qr = HouseholderQr::new(&normals);
    if m > 0 && qr.rank(rank_tolerance) < m {
        return Err(QpError::DependentConstraints);
    }

    // RANGE SPACE: R' w_y = P' t
    let permuted: Vec<f64> = qr.pivots().iter().map(|&k| targets[k]).collect();
    let w_y = qr
        .solve_r_transposed(&permuted)
        .ok_or(QpError::SingularSystem)?;
    let mut w = vec![0.0; n];
    w[..m].copy_from_slice(&w_y);

    // NULL SPACE: (Z'BZ) w_z = -Z'(g + B Y w_y)
    if m < n {
        let mut range_step = w.clone();
        qr.apply_q(&mut range_step);
        let mut reduced_gradient = hessian.mul_vec(&range_step);
        vector_add_scaled(1.0, gradient, &mut reduced_gradient);
        qr.apply_qt(&mut reduced_gradient);
        let rhs: Vec<f64> = reduced_gradient[m..].iter().map(|v| -v).collect();

        let factors =
            ldl_factor(&reduced_hessian(&qr, hessian, m)).ok_or(QpError::SingularSystem)?;
        w[m..].copy_from_slice(&ldl_solve(&factors, &rhs));
    }
    let mut direction = w;
    qr.apply_q(&mut direction);

    // MULTIPLIERS: R mu = Y'(Bd + g), then undo the scaling
    let mut residual = hessian.mul_vec(&direction);
    vector_add_scaled(1.0, gradient, &mut residual);
    qr.apply_qt(&mut residual);
    let permuted_multipliers = qr.solve_r(&residual[..m]).ok_or(QpError::SingularSystem)?;
    let mut multipliers = vec![0.0; m];
    for (k, &original) in qr.pivots().iter().enumerate() {
        multipliers[original] = permuted_multipliers[k] / scales[original];
    }

    if !direction.iter().chain(&multipliers).all(|v| v.is_finite()) {
        return Err(QpError::SingularSystem);
    }
    Ok((direction, multipliers))
}

/// Z'BZ, where Z holds the last n - m columns of Q.
fn reduced_hessian(qr: &HouseholderQr, hessian: &Mat, m: usize) -> Mat {
    let n = hessian.rows();
    // Q'B column by column; Q'BQ is then Q' applied to its rows
    let mut left = hessian.clone();
    for j in 0..n {
        qr.apply_qt(left.col_mut(j));
    }
    let free = n - m;
    let mut reduced = Mat::new(free, free);
    for j in 0..free {
        let mut column = left.row(m + j);
        qr.apply_qt(&mut column);
        reduced.col_mut(j).copy_from_slice(&column[m..]);
    }
    reduced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::PointValues;

    fn evaluation(
        gradient: Vec<f64>,
        equality: Vec<(f64, Vec<f64>)>,
        inequality: Vec<(f64, Vec<f64>)>,
    ) -> Evaluation {
        let n = gradient.len();
        let mut equality_jacobian = Mat::new(equality.len(), n);
        for (i, (_, row)) in equality.iter().enumerate() {
            equality_jacobian.set_row(i, row);
        }
        let mut inequality_jacobian = Mat::new(inequality.len(), n);
        for (j, (_, row)) in inequality.iter().enumerate() {
            inequality_jacobian.set_row(j, row);
        }
        Evaluation {
            values: PointValues {
                x: vec![0.0; n],
                objective: 0.0,
                equality: equality.iter().map(|(v, _)| *v).collect(),
                inequality: inequality.iter().map(|(v, _)| *v).collect(),
            },
            objective_gradient: gradient,
            equality_jacobian,
            inequality_jacobian,
        }
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-10, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn test_unconstrained_newton_step() {
        let ev = evaluation(vec![2.0, -4.0], vec![], vec![]);
        let b = Mat::from_rows(&[vec![2.0, 0.0], vec![0.0, 4.0]]);
        let qp = solve_qp(&ev, &b, None, &QpOptions::default()).unwrap();
        assert_close(&qp.direction, &[-1.0, 1.0]);
        assert!(qp.lamda_equality.is_empty());
        assert!(qp.lamda_inequality.is_empty());
        assert_eq!(qp.iterations, 1);
    }

    #[test]
    fn test_paper_first_subproblem() {
        // ANL-80-64 test 1 at x = (2, 2) with B = I
        let ev = evaluation(
            vec![0.0, 2.0],
            vec![(-1.0, vec![1.0, -2.0])],
            vec![(-4.0, vec![-1.0, -4.0])],
        );
        let qp = solve_qp(&ev, &Mat::identity(2), None, &QpOptions::default()).unwrap();
        assert_close(&qp.direction, &[-2.0 / 3.0, -5.0 / 6.0]);
        assert_close(&qp.lamda_equality, &[-23.0 / 36.0]);
        assert_close(&qp.lamda_inequality, &[1.0 / 36.0]);
        assert_eq!(qp.active_set, vec![true]);
    }

    #[test]
    fn test_inactive_inequality_has_zero_multiplier() {
        // min 0.5|d|^2 + d0 with d0 + 10 >= 0: the bound is far away
        let ev = evaluation(vec![1.0, 0.0], vec![], vec![(10.0, vec![1.0, 0.0])]);
        let qp = solve_qp(&ev, &Mat::identity(2), None, &QpOptions::default()).unwrap();
        assert_close(&qp.direction, &[-1.0, 0.0]);
        assert_eq!(qp.lamda_inequality, vec![0.0]);
        assert_eq!(qp.active_set, vec![false]);
    }

    #[test]
    fn test_wrong_warm_start_is_corrected() {
        // warm start claims the constraint is active, its multiplier comes out negative
        let ev = evaluation(vec![1.0, 0.0], vec![], vec![(10.0, vec![1.0, 0.0])]);
        let qp = solve_qp(&ev, &Mat::identity(2), Some(&[true]), &QpOptions::default()).unwrap();
        assert_close(&qp.direction, &[-1.0, 0.0]);
        assert_eq!(qp.active_set, vec![false]);
        assert_eq!(qp.iterations, 2);
    }

    #[test]
    fn test_violated_inequality_becomes_active() {
        // min 0.5|d|^2 - d0 - d1 with -0.5 - d0 >= 0
        let ev = evaluation(vec![-1.0, -1.0], vec![], vec![(-0.5, vec![-1.0, 0.0])]);
        let qp = solve_qp(&ev, &Mat::identity(2), None, &QpOptions::default()).unwrap();
        // d0 = -0.5 on the boundary, d1 = 1; stationarity: d0 - 1 = -lamda
        assert_close(&qp.direction, &[-0.5, 1.0]);
        assert_close(&qp.lamda_inequality, &[1.5]);
        assert_eq!(qp.active_set, vec![true]);
    }

    #[test]
    fn test_inconsistent_linearization_fails() {
        // d0 >= 1 and d0 <= 0 in one variable
        let ev = evaluation(
            vec![1.0],
            vec![],
            vec![(-1.0, vec![1.0]), (0.0, vec![-1.0])],
        );
        assert_eq!(
            solve_qp(&ev, &Mat::identity(1), None, &QpOptions::default()),
            Err(QpError::Infeasible)
        );
    }

    #[test]
    fn test_dependent_equalities_fail() {
        let ev = evaluation(
            vec![1.0, 1.0],
            vec![(1.0, vec![1.0, 1.0]), (2.0, vec![2.0, 2.0])],
            vec![],
        );
        assert_eq!(
            solve_qp(&ev, &Mat::identity(2), None, &QpOptions::default()),
            Err(QpError::DependentConstraints)
        );
    }

    /// Box d <= 1 around a weakly scaled cut 0.1 (1.5 - d0 - d1) >= 0, plus d0 >= -1.
    /// The box corner is reached first and then has to be left again.
    fn box_with_cut() -> Evaluation {
        evaluation(
            vec![-3.0, -3.0],
            vec![],
            vec![
                (1.0, vec![-1.0, 0.0]),
                (1.0, vec![0.0, -1.0]),
                (0.15, vec![-0.1, -0.1]),
                (1.0, vec![1.0, 0.0]),
            ],
        )
    }

    #[test]
    fn test_more_inequalities_than_variables() {
        let qp = solve_qp(&box_with_cut(), &Mat::identity(2), None, &QpOptions::default()).unwrap();
        assert_close(&qp.direction, &[0.75, 0.75]);
        assert_close(&qp.lamda_inequality, &[0.0, 0.0, 22.5, 0.0]);
        assert_eq!(qp.active_set, vec![false, false, true, false]);
        // start, two box bounds, then three solves to trade the corner for the cut
        assert_eq!(qp.iterations, 6);
    }

    #[test]
    fn test_oversized_warm_start_falls_back() {
        // three active rows in two variables cannot be a starting point
        let warm = [true, true, true, false];
        let qp = solve_qp(&box_with_cut(), &Mat::identity(2), Some(&warm), &QpOptions::default())
            .unwrap();
        assert_close(&qp.direction, &[0.75, 0.75]);
        assert_eq!(qp.active_set, vec![false, false, true, false]);

        // the corner itself is a valid start and saves two solves
        let warm = [true, true, false, false];
        let qp = solve_qp(&box_with_cut(), &Mat::identity(2), Some(&warm), &QpOptions::default())
            .unwrap();
        assert_close(&qp.direction, &[0.75, 0.75]);
        assert_eq!(qp.iterations, 4);
    }

    #[test]
    fn test_many_inequalities_satisfy_kkt_conditions() {
        // min 0.5 d'Bd + g'd over a triangle cut by redundant and active half-planes
        let b = Mat::from_rows(&[vec![4.0, 1.0, 0.0], vec![1.0, 3.0, 0.5], vec![0.0, 0.5, 2.0]]);
        let gradient = vec![-8.0, -6.0, 4.0];
        let inequality = vec![
            (1.0, vec![-1.0, 0.0, 0.0]),
            (0.5, vec![0.0, -1.0, 0.0]),
            (2.0, vec![-1.0, -1.0, -1.0]),
            (1.0, vec![0.0, 0.0, 1.0]),
            (3.0, vec![1.0, 1.0, 0.0]),
            (0.8, vec![-0.5, 0.0, 0.5]),
            (4.0, vec![-2.0, -1.0, 0.0]),
        ];
        let ev = evaluation(gradient.clone(), vec![], inequality.clone());
        let qp = solve_qp(&ev, &b, None, &QpOptions::default()).unwrap();

        // Bd + g = sum lamda_j a_j, lamda >= 0, complementarity and feasibility
        let mut stationarity = b.mul_vec(&qp.direction);
        vector_add_scaled(1.0, &gradient, &mut stationarity);
        for (j, (value, row)) in inequality.iter().enumerate() {
            let residual = value + vector_dot_product(row, &qp.direction);
            assert!(residual > -1e-10, "inequality {j} violated: {residual}");
            assert!(qp.lamda_inequality[j] >= 0.0);
            assert!((qp.lamda_inequality[j] * residual).abs() < 1e-10);
            vector_add_scaled(-qp.lamda_inequality[j], row, &mut stationarity);
        }
        assert!(vector_norm(&stationarity) < 1e-10, "{stationarity:?}");
        assert_close(&qp.direction, &[1.0, 0.5, -0.6]);
        assert_eq!(
            qp.active_set,
            vec![true, true, false, false, false, true, false]
        );
    }

    #[test]
    fn test_iteration_limit() {
        let ev = evaluation(vec![-1.0, -1.0], vec![], vec![(-0.5, vec![-1.0, 0.0])]);
        let options = QpOptions {
            max_iterations: Some(1),
            ..QpOptions::default()
        };
        assert_eq!(
            solve_qp(&ev, &Mat::identity(2), None, &options),
            Err(QpError::IterationLimit(1))
        );
    }
}
