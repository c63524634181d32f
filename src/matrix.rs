/// Column-major dense matrix
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mat {
    pub data: Vec<f64>,
    pub m: usize,
    pub n: usize,
}

impl Mat {
    pub fn new(m: usize, n: usize) -> Self {
        Self {
            data: vec![0.0; m * n],
            m,
            n,
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut mat = Self::new(n, n);
        for i in 0..n {
            mat[(i, i)] = 1.0;
        }
        mat
    }

    /// Builds a matrix from row slices, all of the same length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Self {
        let m = rows.len();
        let n = rows.first().map_or(0, |r| r.len());
        let mut mat = Self::new(m, n);
        for (i, row) in rows.iter().enumerate() {
            assert_eq!(row.len(), n, "ragged row {i}");
            for (j, &v) in row.iter().enumerate() {
                mat[(i, j)] = v;
            }
        }
        mat
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[j * self.m + i]
    }

    pub fn set(&mut self, i: usize, j: usize, val: f64) {
        self.data[j * self.m + i] = val;
    }

    pub fn col(&self, j: usize) -> &[f64] {
        let start = j * self.m;
        &self.data[start..start + self.m]
    }

    pub fn col_mut(&mut self, j: usize) -> &mut [f64] {
        let start = j * self.m;
        &mut self.data[start..start + self.m]
    }

    pub fn row(&self, i: usize) -> Vec<f64> {
        (0..self.n).map(|j| self.get(i, j)).collect()
    }

    pub fn set_row(&mut self, i: usize, values: &[f64]) {
        for (j, &v) in values.iter().enumerate().take(self.n) {
            self.set(i, j, v);
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn rows(&self) -> usize {
        self.m
    }

    pub fn cols(&self) -> usize {
        self.n
    }

    pub fn is_square(&self) -> bool {
        self.m == self.n
    }

    /// y = A * x
    pub fn mul_vec(&self, x: &[f64]) -> Vec<f64> {
        debug_assert_eq!(x.len(), self.n);
        let mut y = vec![0.0; self.m];
        for (j, &x_j) in x.iter().enumerate() {
            if x_j == 0.0 {
                continue;
            }
            crate::blas::vector_add_scaled(x_j, self.col(j), &mut y);
        }
        y
    }

    /// y = A' * x
    pub fn transpose_mul_vec(&self, x: &[f64]) -> Vec<f64> {
        debug_assert_eq!(x.len(), self.m);
        (0..self.n)
            .map(|j| crate::blas::vector_dot_product(self.col(j), x))
            .collect()
    }

    /// x' * A * x for a square matrix
    pub fn quad_form(&self, x: &[f64]) -> f64 {
        crate::blas::vector_dot_product(x, &self.mul_vec(x))
    }

    pub fn is_symmetric(&self, tol: f64) -> bool {
        if !self.is_square() {
            return false;
        }
        for j in 0..self.n {
            for i in j + 1..self.m {
                let (a, b) = (self.get(i, j), self.get(j, i));
                if (a - b).abs() > tol * (1.0 + a.abs().max(b.abs())) {
                    return false;
                }
            }
        }
        true
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

impl std::ops::Index<(usize, usize)> for Mat {
    type Output = f64;
    fn index(&self, index: (usize, usize)) -> &f64 {
        &self.data[index.1 * self.m + index.0]
    }
}

impl std::ops::IndexMut<(usize, usize)> for Mat {
    fn index_mut(&mut self, index: (usize, usize)) -> &mut f64 {
        &mut self.data[index.1 * self.m + index.0]
    }
}

impl std::fmt::Display for Mat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for i in 0..self.m {
            for j in 0..self.n {
                write!(f, "{:12.6} ", self.get(i, j))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
