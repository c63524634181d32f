/// DAXPY: CONSTANT TIMES A VECTOR PLUS A VECTOR.
/// y = alpha * x + y
pub fn vector_add_scaled(alpha: f64, x: &[f64], y: &mut [f64]) {
    if alpha == 0.0 {
        return;
    }
    y.iter_mut().zip(x.iter()).for_each(|(y_i, x_i)| {
        *y_i += alpha * x_i;
    });
}

/// DDOT: FORMS THE DOT PRODUCT OF TWO VECTORS.
pub fn vector_dot_product(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len());
    x.iter().zip(y.iter()).map(|(x_i, y_i)| x_i * y_i).sum()
}

/// DNRM2: EUCLIDEAN NORM, scaled to avoid overflow and underflow.
pub fn vector_norm(x: &[f64]) -> f64 {
    let scale = x.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return scale;
    }
    let sum_squares: f64 = x.iter().map(|v| (v / scale).powi(2)).sum();
    scale * sum_squares.sqrt()
}

/// z = x + alpha * y, as a new vector
pub fn vector_step(x: &[f64], alpha: f64, y: &[f64]) -> Vec<f64> {
    x.iter().zip(y.iter()).map(|(x_i, y_i)| x_i + alpha * y_i).collect()
}

/// Sum of absolute values.
pub fn vector_abs_sum(x: &[f64]) -> f64 {
    x.iter().map(|v| v.abs()).sum()
}
