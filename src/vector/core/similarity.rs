//! SIMD similarity kernels using the `wide` crate.

use wide::f32x8;

/// SIMD-optimized dot product. Both slices must have the same length.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let mut sum = f32x8::splat(0.0);
    let a_chunks = a.chunks_exact(8);
    let b_chunks = b.chunks_exact(8);
    let a_tail = a_chunks.remainder();
    let b_tail = b_chunks.remainder();

    for (x, y) in a_chunks.zip(b_chunks) {
        let a_vec = f32x8::new([x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7]]);
        let b_vec = f32x8::new([y[0], y[1], y[2], y[3], y[4], y[5], y[6], y[7]]);
        sum += a_vec * b_vec;
    }

    // Sum the SIMD register
    let mut result = sum.to_array().iter().sum::<f32>();

    for (x, y) in a_tail.iter().zip(b_tail) {
        result += x * y;
    }

    result
}

/// L2 norm of a vector.
pub fn l2_norm(vector: &[f32]) -> f32 {
    dot_product(vector, vector).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_product() {
        let a = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let b = vec![9.0, 8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0];

        let expected: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        assert!((dot_product(&a, &b) - expected).abs() < 1e-4);
    }

    #[test]
    fn test_short_vectors_use_scalar_tail() {
        assert_eq!(dot_product(&[1.0, 2.0], &[3.0, 4.0]), 11.0);
        assert_eq!(dot_product(&[], &[]), 0.0);
    }

    #[test]
    fn test_l2_norm() {
        assert!((l2_norm(&[3.0, 4.0]) - 5.0).abs() < 1e-6);
        assert_eq!(l2_norm(&[0.0; 16]), 0.0);
    }
}
