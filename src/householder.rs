//! Householder QR factorization with column pivoting.
//!
//! `A P = Q R`, where each Householder transformation is
//!
//! ```text
//!     H = I - 2 u u' / (u' u)
//! ```
//!
//! The pivoting follows HFTI (Lawson & Hanson, "Solving Least Squares Problems",
//! ch. 14): at step j the remaining column with the largest norm is moved to the
//! front, so the diagonal of R is non-increasing in magnitude and the numerical
//! rank can be read off it.

use crate::blas::vector_dot_product;
use crate::Mat;

#[derive(Debug, Clone)]
pub struct HouseholderQr {
    /// R in the upper triangle, the trailing parts of the Householder vectors below it
    factors: Mat,
    /// Leading element of each Householder vector
    leading: Vec<f64>,
    /// u' u of each Householder vector, zero when the step was skipped
    norms_squared: Vec<f64>,
    /// Column permutation, pivots[k] is the original index of column k
    pivots: Vec<usize>,
}

impl HouseholderQr {
    pub fn new(a: &Mat) -> Self {
        let m = a.rows();
        let n = a.cols();
        let steps = m.min(n);
        let mut factors = a.clone();
        let mut leading = vec![0.0; steps];
        let mut norms_squared = vec![0.0; steps];
        let mut pivots: Vec<usize> = (0..n).collect();

        for j in 0..steps {
            // PIVOT: bring the remaining column of largest norm to position j
            let mut pivot = j;
            let mut pivot_norm = -1.0;
            for l in j..n {
                let norm: f64 = factors.col(l)[j..].iter().map(|v| v * v).sum();
                if norm > pivot_norm {
                    pivot_norm = norm;
                    pivot = l;
                }
            }
            if pivot != j {
                for i in 0..m {
                    let tmp = factors[(i, j)];
                    factors[(i, j)] = factors[(i, pivot)];
                    factors[(i, pivot)] = tmp;
                }
                pivots.swap(j, pivot);
            }

            // CONSTRUCT the transformation that zeroes column j below the diagonal
            let column_norm = pivot_norm.sqrt();
            if column_norm == 0.0 {
                continue;
            }
            let x0 = factors[(j, j)];
            let alpha = if x0 >= 0.0 { -column_norm } else { column_norm };
            let u0 = x0 - alpha;
            let u_norm2 = u0 * u0 + factors.col(j)[j + 1..].iter().map(|v| v * v).sum::<f64>();
            leading[j] = u0;
            norms_squared[j] = u_norm2;
            factors[(j, j)] = alpha;

            // APPLY it to the remaining columns
            for l in j + 1..n {
                let mut s = u0 * factors[(j, l)];
                for i in j + 1..m {
                    s += factors[(i, j)] * factors[(i, l)];
                }
                let scale = 2.0 * s / u_norm2;
                factors[(j, l)] -= scale * u0;
                for i in j + 1..m {
                    let u_i = factors[(i, j)];
                    factors[(i, l)] -= scale * u_i;
                }
            }
        }

        Self {
            factors,
            leading,
            norms_squared,
            pivots,
        }
    }

    /// Column permutation: column k of `A P` is column `pivots()[k]` of A.
    pub fn pivots(&self) -> &[usize] {
        &self.pivots
    }

    /// Diagonal of R, non-increasing in magnitude.
    pub fn r_diagonal(&self) -> Vec<f64> {
        (0..self.leading.len())
            .map(|k| self.factors[(k, k)])
            .collect()
    }

    /// Numerical rank: number of diagonal entries of R larger than
    /// `tolerance * |R(0,0)|`.
    pub fn rank(&self, tolerance: f64) -> usize {
        let diagonal = self.r_diagonal();
        let Some(first) = diagonal.first() else {
            return 0;
        };
        if first.abs() == 0.0 {
            return 0;
        }
        let threshold = tolerance * first.abs();
        diagonal.iter().take_while(|r| r.abs() > threshold).count()
    }

    /// Applies the reflection of step j to `b` in place.
    fn reflect(&self, j: usize, b: &mut [f64]) {
        let u_norm2 = self.norms_squared[j];
        if u_norm2 == 0.0 {
            return;
        }
        let m = self.factors.rows();
        let u0 = self.leading[j];
        let tail = &self.factors.col(j)[j + 1..m];
        let s = u0 * b[j] + vector_dot_product(tail, &b[j + 1..m]);
        let scale = 2.0 * s / u_norm2;
        b[j] -= scale * u0;
        for (b_i, u_i) in b[j + 1..m].iter_mut().zip(tail.iter()) {
            *b_i -= scale * u_i;
        }
    }

    /// b <- Q' b
    pub fn apply_qt(&self, b: &mut [f64]) {
        debug_assert_eq!(b.len(), self.factors.rows());
        for j in 0..self.leading.len() {
            self.reflect(j, b);
        }
    }

    /// b <- Q b
    pub fn apply_q(&self, b: &mut [f64]) {
        debug_assert_eq!(b.len(), self.factors.rows());
        for j in (0..self.leading.len()).rev() {
            self.reflect(j, b);
        }
    }

    /// Solves R x = b with the leading `b.len()` by `b.len()` block of R.
    /// Returns `None` on a zero or non-finite diagonal entry.
    pub fn solve_r(&self, b: &[f64]) -> Option<Vec<f64>> {
        let k = b.len();
        debug_assert!(k <= self.leading.len());
        let mut x = vec![0.0; k];
        for i in (0..k).rev() {
            let r_ii = self.factors[(i, i)];
            if r_ii == 0.0 || !r_ii.is_finite() {
                return None;
            }
            let mut sum = b[i];
            for l in i + 1..k {
                sum -= self.factors[(i, l)] * x[l];
            }
            x[i] = sum / r_ii;
        }
        x.iter().all(|v| v.is_finite()).then_some(x)
    }

    /// Solves R' x = b with the leading `b.len()` by `b.len()` block of R.
    pub fn solve_r_transposed(&self, b: &[f64]) -> Option<Vec<f64>> {
        let k = b.len();
        debug_assert!(k <= self.leading.len());
        let mut x = vec![0.0; k];
        for i in 0..k {
            let r_ii = self.factors[(i, i)];
            if r_ii == 0.0 || !r_ii.is_finite() {
                return None;
            }
            let mut sum = b[i];
            for l in 0..i {
                sum -= self.factors[(l, i)] * x[l];
            }
            x[i] = sum / r_ii;
        }
        x.iter().all(|v| v.is_finite()).then_some(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Solves a square system through the factorization.
    fn solve_square(a: &Mat, b: &[f64]) -> Vec<f64> {
        let qr = HouseholderQr::new(a);
        let mut rhs = b.to_vec();
        qr.apply_qt(&mut rhs);
        let z = qr.solve_r(&rhs).unwrap();
        let mut x = vec![0.0; z.len()];
        for (k, &original) in qr.pivots().iter().enumerate() {
            x[original] = z[k];
        }
        x
    }

    #[test]
    fn test_solve_square_system() {
        // x = [1, -2, 3]
        let a = Mat::from_rows(&[
            vec![2.0, 1.0, -1.0],
            vec![-3.0, -1.0, 2.0],
            vec![-2.0, 1.0, 2.0],
        ]);
        let b = a.mul_vec(&[1.0, -2.0, 3.0]);
        let x = solve_square(&a, &b);
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] + 2.0).abs() < 1e-12);
        assert!((x[2] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_q_is_orthogonal() {
        let a = Mat::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 7.0]]);
        let qr = HouseholderQr::new(&a);
        let original = vec![0.3, -1.2, 2.5];
        let mut b = original.clone();
        qr.apply_qt(&mut b);
        let norm_before = vector_dot_product(&original, &original);
        assert!((vector_dot_product(&b, &b) - norm_before).abs() < 1e-12);
        qr.apply_q(&mut b);
        for (b_i, o_i) in b.iter().zip(&original) {
            assert!((b_i - o_i).abs() < 1e-12);
        }
    }

    #[test]
    fn test_transposed_triangular_solve() {
        // A' y = c for a tall A: with A P = Q R, y = Q [z; 0] and R' z = P' c
        let a = Mat::from_rows(&[vec![2.0, 0.0], vec![1.0, 1.0], vec![0.0, 3.0]]);
        let qr = HouseholderQr::new(&a);
        let c = [1.0, -1.0];
        let permuted: Vec<f64> = qr.pivots().iter().map(|&p| c[p]).collect();
        let z = qr.solve_r_transposed(&permuted).unwrap();

        let mut y = vec![z[0], z[1], 0.0];
        qr.apply_q(&mut y);
        let aty = a.transpose_mul_vec(&y);
        assert!((aty[0] - 1.0).abs() < 1e-12);
        assert!((aty[1] + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rank_detection() {
        let full = Mat::from_rows(&[vec![1.0, 0.0], vec![1.0, 1e-3]]);
        assert_eq!(HouseholderQr::new(&full).rank(1e-10), 2);

        let dependent = Mat::from_rows(&[
            vec![1.0, 2.0, 3.0],
            vec![2.0, 4.0, 6.0],
            vec![0.0, 1.0, 1.0],
        ]);
        assert_eq!(HouseholderQr::new(&dependent).rank(1e-10), 2);

        // more rows than columns, the transposed pair (1) and (-1)
        let tall = Mat::from_rows(&[vec![1.0], vec![-1.0]]);
        assert_eq!(HouseholderQr::new(&tall).rank(1e-10), 1);
        assert_eq!(HouseholderQr::new(&Mat::new(2, 2)).rank(1e-10), 0);
    }

    #[test]
    fn test_diagonal_is_non_increasing() {
        let a = Mat::from_rows(&[
            vec![0.1, 5.0, 0.0],
            vec![0.2, 1.0, 3.0],
            vec![0.0, 2.0, 1.0],
        ]);
        let d = HouseholderQr::new(&a).r_diagonal();
        assert!(d[0].abs() >= d[1].abs());
        assert!(d[1].abs() >= d[2].abs());
    }
}
