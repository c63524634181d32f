use crate::Mat;

/// Computes the LDL' factors of a symmetric matrix.
///
/// Only the lower triangle of `matrix` is read. The factors are returned in one
/// `Mat`: D(i,i) on the diagonal and L(j,i), j > i, below it (the unit diagonal of
/// L is implicit).
///
/// Returns `None` when a pivot is not positive (relative to the largest diagonal
/// entry) or not finite, i.e. when the matrix is not numerically positive definite.
pub fn ldl_factor(matrix: &Mat) -> Option<Mat> {
    if !matrix.is_square() {
        return None;
    }
    let order = matrix.rows();
    let largest_diagonal = (0..order).fold(0.0f64, |acc, i| acc.max(matrix[(i, i)].abs()));
    let pivot_floor = f64::EPSILON * largest_diagonal;

    let mut factors = Mat::new(order, order);
    for j in 0..order {
        let mut d_j = matrix[(j, j)];
        for k in 0..j {
            let l_jk = factors[(j, k)];
            d_j -= l_jk * l_jk * factors[(k, k)];
        }
        if !d_j.is_finite() || d_j <= pivot_floor {
            return None;
        }
        factors[(j, j)] = d_j;

        for i in j + 1..order {
            let mut sum = matrix[(i, j)];
            for k in 0..j {
                sum -= factors[(i, k)] * factors[(j, k)] * factors[(k, k)];
            }
            factors[(i, j)] = sum / d_j;
        }
    }
    Some(factors)
}

/// True when `matrix` is symmetric and its LDL' factorization has positive pivots.
pub fn is_positive_definite(matrix: &Mat) -> bool {
    matrix.is_symmetric(1e-12) && ldl_factor(matrix).is_some()
}

/// Solves `A x = b` given the LDL' factors of A.
pub fn ldl_solve(factors: &Mat, b: &[f64]) -> Vec<f64> {
    let order = factors.rows();
    debug_assert_eq!(b.len(), order);
    let mut x = b.to_vec();

    // FORWARD SUBSTITUTION with the unit lower triangle
    for i in 0..order {
        for k in 0..i {
            x[i] -= factors[(i, k)] * x[k];
        }
    }
    for (i, x_i) in x.iter_mut().enumerate() {
        *x_i /= factors[(i, i)];
    }
    // BACK SUBSTITUTION with its transpose
    for i in (0..order).rev() {
        for k in i + 1..order {
            x[i] -= factors[(k, i)] * x[k];
        }
    }
    x
}
