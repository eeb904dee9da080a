//! Numerical gradient checking.
//!
//! Gradients from backpropagation are compared against a two-sided finite
//! difference `(J(theta + eps) - J(theta - eps)) / (2 eps)` using the
//! relative difference `|grad - approx| / (|grad| + |approx|)`.

pub mod network;

use crate::init::Parameters;
use crate::trace::{trace_event, trace_span};
use crate::util::math::l2_norm;
use crate::util::{DlError, DlResult};
use ndarray::{Array1, ArrayView1, ArrayView2};

pub use network::{
    backward_propagation_n, forward_propagation_n, gradients_to_vector, params_to_vector,
    vector_to_params, ForwardCache, LayerGrads,
};

/// Default finite-difference step.
pub const DEFAULT_EPSILON: f64 = 1e-7;

/// Acceptance threshold for the one-dimensional check.
pub const SCALAR_THRESHOLD: f64 = 1e-7;

/// Acceptance threshold for the parameter-vector check.
pub const VECTOR_THRESHOLD: f64 = 2e-7;

/// Outcome of a gradient check.
#[derive(Clone, Debug, PartialEq)]
pub struct GradCheck {
    /// Analytic gradient.
    pub grad: Array1<f64>,
    /// Finite-difference approximation.
    pub approx: Array1<f64>,
    /// Relative difference between the two.
    pub difference: f64,
}

impl GradCheck {
    /// Returns true when the relative difference is below `threshold`.
    pub fn passed(&self, threshold: f64) -> bool {
        self.difference < threshold
    }
}

/// Cost of the one-dimensional linear model, `J = theta * x`.
pub fn forward_propagation(x: f64, theta: f64) -> f64 {
    theta * x
}

/// Derivative of [`forward_propagation`] with respect to `theta`.
pub fn backward_propagation(x: f64, _theta: f64) -> f64 {
    x
}

/// Checks [`backward_propagation`] at `(x, theta)`.
pub fn gradient_check(x: f64, theta: f64, epsilon: f64) -> DlResult<GradCheck> {
    check_epsilon(epsilon)?;

    let theta_plus = theta + epsilon;
    let theta_minus = theta - epsilon;
    let j_plus = forward_propagation(x, theta_plus);
    let j_minus = forward_propagation(x, theta_minus);
    let approx = (j_plus - j_minus) / (2.0 * epsilon);
    let grad = backward_propagation(x, theta);

    let grad = Array1::from_elem(1, grad);
    let approx = Array1::from_elem(1, approx);
    let difference = relative_difference(grad.view(), approx.view())?;
    trace_event!("gradient_check", difference = difference);
    Ok(GradCheck {
        grad,
        approx,
        difference,
    })
}

/// Two-sided finite-difference gradient of `cost` at `theta`.
pub fn numerical_gradient<F>(
    theta: ArrayView1<'_, f64>,
    epsilon: f64,
    mut cost: F,
) -> DlResult<Array1<f64>>
where
    F: FnMut(ArrayView1<'_, f64>) -> DlResult<f64>,
{
    check_epsilon(epsilon)?;

    let mut probe = theta.to_owned();
    let mut approx = Array1::zeros(theta.len());
    for i in 0..theta.len() {
        let original = probe[i];
        probe[i] = original + epsilon;
        let j_plus = cost(probe.view())?;
        probe[i] = original - epsilon;
        let j_minus = cost(probe.view())?;
        probe[i] = original;
        approx[i] = (j_plus - j_minus) / (2.0 * epsilon);
    }
    Ok(approx)
}

/// Relative difference `|a - b| / (|a| + |b|)`; zero when both vanish.
pub fn relative_difference(grad: ArrayView1<'_, f64>, approx: ArrayView1<'_, f64>) -> DlResult<f64> {
    if grad.len() != approx.len() {
        return Err(DlError::shape("approx", grad.shape(), approx.shape()));
    }
    let diff = &grad - &approx;
    let numerator = l2_norm(diff.view());
    let denominator = l2_norm(grad) + l2_norm(approx);
    if denominator == 0.0 {
        return Ok(0.0);
    }
    Ok(numerator / denominator)
}

/// Checks backpropagation of the dense network against finite differences.
///
/// `grads` are the layer gradients produced by [`backward_propagation_n`]
/// for the same `params`, `x`, and `y`.
pub fn gradient_check_n(
    params: &Parameters,
    grads: &[LayerGrads],
    x: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
    epsilon: f64,
) -> DlResult<GradCheck> {
    let _span = trace_span!("gradient_check_n", num_params = params.num_params()).entered();

    let theta = params_to_vector(params);
    let grad = gradients_to_vector(grads);
    if grad.len() != theta.len() {
        return Err(DlError::shape("gradients", theta.shape(), grad.shape()));
    }
    let dims = params.layer_dims();
    let approx = numerical_gradient(theta.view(), epsilon, |probe| {
        let candidate = vector_to_params(probe, &dims)?;
        let (cost, _) = forward_propagation_n(x, y, &candidate)?;
        Ok(cost)
    })?;

    let difference = relative_difference(grad.view(), approx.view())?;
    trace_event!("gradient_check_n", difference = difference);
    Ok(GradCheck {
        grad,
        approx,
        difference,
    })
}

fn check_epsilon(epsilon: f64) -> DlResult<()> {
    if !(epsilon.is_finite() && epsilon > 0.0) {
        return Err(DlError::InvalidThreshold {
            name: "epsilon",
            value: epsilon,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn scalar_check_passes_for_linear_model() {
        let check = gradient_check(2.0, 4.0, DEFAULT_EPSILON).unwrap();
        assert!(check.passed(SCALAR_THRESHOLD));
        assert!((check.difference - 2.919335883291695e-10).abs() < 1e-15);
        assert_eq!(check.grad[0], 2.0);
    }

    #[test]
    fn scalar_check_rejects_bad_epsilon() {
        assert!(gradient_check(2.0, 4.0, 0.0).is_err());
        assert!(gradient_check(2.0, 4.0, f64::INFINITY).is_err());
    }

    #[test]
    fn numerical_gradient_of_quadratic() {
        let theta = array![1.0, -2.0, 0.5];
        let approx = numerical_gradient(theta.view(), 1e-5, |t| Ok(t.dot(&t))).unwrap();
        for (a, t) in approx.iter().zip(theta.iter()) {
            assert!((a - 2.0 * t).abs() < 1e-6);
        }
    }

    #[test]
    fn relative_difference_handles_zero_vectors() {
        let zeros = array![0.0, 0.0];
        assert_eq!(relative_difference(zeros.view(), zeros.view()).unwrap(), 0.0);
        let short = array![0.0];
        assert!(relative_difference(zeros.view(), short.view()).is_err());
    }

    #[test]
    fn relative_difference_of_opposite_vectors_is_one() {
        let a = array![1.0, 2.0];
        let b = array![-1.0, -2.0];
        assert!((relative_difference(a.view(), b.view()).unwrap() - 1.0).abs() < 1e-12);
    }
}
