//! Scalar helpers shared by the activation and decoding code.

use ndarray::{ArrayView1, ArrayViewMut1};

/// Logistic sigmoid.
pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Rectified linear unit.
pub(crate) fn relu(x: f64) -> f64 {
    x.max(0.0)
}

/// In-place softmax with max-subtraction for numerical stability.
pub(crate) fn softmax_in_place(mut values: ArrayViewMut1<'_, f64>) {
    let max = values.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
    values.mapv_inplace(|v| (v - max).exp());
    let sum = values.sum();
    if sum > 0.0 {
        values.mapv_inplace(|v| v / sum);
    }
}

/// Euclidean norm of a vector.
pub(crate) fn l2_norm(values: ArrayView1<'_, f64>) -> f64 {
    values.dot(&values).sqrt()
}

#[cfg(test)]
mod tests {
    use super::{l2_norm, relu, sigmoid, softmax_in_place};
    use ndarray::array;

    #[test]
    fn sigmoid_is_centered() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(40.0) > 0.999_999);
        assert!(sigmoid(-40.0) < 1e-6);
    }

    #[test]
    fn relu_clips_negatives() {
        assert_eq!(relu(-3.0), 0.0);
        assert_eq!(relu(2.5), 2.5);
    }

    #[test]
    fn softmax_sums_to_one_for_large_logits() {
        let mut logits = array![1000.0, 1001.0, 1002.0];
        softmax_in_place(logits.view_mut());
        assert!((logits.sum() - 1.0).abs() < 1e-12);
        assert!(logits[2] > logits[1] && logits[1] > logits[0]);
    }

    #[test]
    fn l2_norm_of_pythagorean_triple() {
        let v = array![3.0, 4.0];
        assert!((l2_norm(v.view()) - 5.0).abs() < 1e-12);
    }
}
