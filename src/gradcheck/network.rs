//! Dense LINEAR -> RELU -> ... -> LINEAR -> SIGMOID network used for gradient checks.

use crate::init::{LayerParams, Parameters};
use crate::util::math::{relu, sigmoid};
use crate::util::{DlError, DlResult};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Intermediate values kept by [`forward_propagation_n`] for backprop.
#[derive(Clone, Debug)]
pub struct ForwardCache {
    /// `A_0 = X` through `A_L`.
    activations: Vec<Array2<f64>>,
    weights: Vec<Array2<f64>>,
}

impl ForwardCache {
    /// Returns the network output `A_L`.
    pub fn output(&self) -> &Array2<f64> {
        // At least one layer is guaranteed by `Parameters`.
        &self.activations[self.activations.len() - 1]
    }
}

/// Gradients of the cost with respect to one layer.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerGrads {
    /// Gradient for `w`, same shape.
    pub dw: Array2<f64>,
    /// Gradient for `b`, same shape.
    pub db: Array2<f64>,
}

/// Runs the network on `x` (`(n_x, m)`) and returns the cross-entropy cost.
///
/// `y` must have shape `(n_L, m)` with entries in `{0, 1}`.
pub fn forward_propagation_n(
    x: ArrayView2<'_, f64>,
    y: ArrayView2<'_, f64>,
    params: &Parameters,
) -> DlResult<(f64, ForwardCache)> {
    let dims = params.layer_dims();
    let m = x.ncols();
    if m == 0 {
        return Err(DlError::InvalidInput("x has no examples"));
    }
    if x.nrows() != dims[0] {
        return Err(DlError::shape("x", &[dims[0], m], x.shape()));
    }
    let n_out = dims[dims.len() - 1];
    if y.dim() != (n_out, m) {
        return Err(DlError::shape("y", &[n_out, m], y.shape()));
    }

    let layers = params.layers();
    let mut activations = Vec::with_capacity(layers.len() + 1);
    activations.push(x.to_owned());
    for (l, layer) in layers.iter().enumerate() {
        let z = layer.w.dot(&activations[l]) + &layer.b;
        let a = if l + 1 == layers.len() {
            z.mapv(sigmoid)
        } else {
            z.mapv(relu)
        };
        activations.push(a);
    }

    let cache = ForwardCache {
        activations,
        weights: layers.iter().map(|l| l.w.clone()).collect(),
    };
    let a_out = cache.output();
    let logprobs = a_out.mapv(|a| -a.ln()) * &y + a_out.mapv(|a| -(1.0 - a).ln()) * &y.mapv(|v| 1.0 - v);
    let cost = logprobs.sum() / m as f64;
    Ok((cost, cache))
}

/// Backpropagates the cost through the cached forward pass.
pub fn backward_propagation_n(
    y: ArrayView2<'_, f64>,
    cache: &ForwardCache,
) -> DlResult<Vec<LayerGrads>> {
    let a_out = cache.output();
    if y.dim() != a_out.dim() {
        return Err(DlError::shape("y", a_out.shape(), y.shape()));
    }
    let m = y.ncols() as f64;
    let num_layers = cache.weights.len();

    let mut grads = Vec::with_capacity(num_layers);
    let mut dz = a_out - &y;
    for l in (0..num_layers).rev() {
        let a_prev = &cache.activations[l];
        let dw = dz.dot(&a_prev.t()) / m;
        let db = dz.sum_axis(Axis(1)).insert_axis(Axis(1)) / m;
        if l > 0 {
            let da_prev = cache.weights[l].t().dot(&dz);
            let relu_mask = a_prev.mapv(|a| if a > 0.0 { 1.0 } else { 0.0 });
            dz = da_prev * &relu_mask;
        }
        grads.push(LayerGrads { dw, db });
    }
    grads.reverse();
    Ok(grads)
}

/// Flattens parameters layer by layer, `w` then `b`, row-major.
pub fn params_to_vector(params: &Parameters) -> Array1<f64> {
    let mut out = Vec::with_capacity(params.num_params());
    for layer in params.layers() {
        out.extend(layer.w.iter().copied());
        out.extend(layer.b.iter().copied());
    }
    Array1::from(out)
}

/// Flattens gradients in the same order as [`params_to_vector`].
pub fn gradients_to_vector(grads: &[LayerGrads]) -> Array1<f64> {
    let mut out = Vec::new();
    for g in grads {
        out.extend(g.dw.iter().copied());
        out.extend(g.db.iter().copied());
    }
    Array1::from(out)
}

/// Rebuilds parameters for `layer_dims` from a flat vector.
pub fn vector_to_params(theta: ArrayView1<'_, f64>, layer_dims: &[usize]) -> DlResult<Parameters> {
    if layer_dims.len() < 2 {
        return Err(DlError::InvalidInput(
            "layer_dims needs an input size and at least one layer",
        ));
    }
    let expected: usize = layer_dims.windows(2).map(|d| d[1] * d[0] + d[1]).sum();
    if theta.len() != expected {
        return Err(DlError::shape("theta", &[expected], theta.shape()));
    }

    let values: Vec<f64> = theta.iter().copied().collect();
    let mut offset = 0usize;
    let mut layers = Vec::with_capacity(layer_dims.len() - 1);
    for d in layer_dims.windows(2) {
        let (fan_in, fan_out) = (d[0], d[1]);
        let w_len = fan_in * fan_out;
        let w = Array2::from_shape_vec((fan_out, fan_in), values[offset..offset + w_len].to_vec())
            .map_err(|_| DlError::InvalidInput("weight block does not fit layer shape"))?;
        offset += w_len;
        let b = Array2::from_shape_vec((fan_out, 1), values[offset..offset + fan_out].to_vec())
            .map_err(|_| DlError::InvalidInput("bias block does not fit layer shape"))?;
        offset += fan_out;
        layers.push(LayerParams::new(w, b)?);
    }
    Parameters::new(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::{initialize_parameters, InitMethod};
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn vector_round_trip_preserves_layout() {
        let mut rng = StdRng::seed_from_u64(11);
        let params = initialize_parameters(&[4, 5, 3, 1], InitMethod::He, &mut rng).unwrap();
        let theta = params_to_vector(&params);
        assert_eq!(theta.len(), 4 * 5 + 5 + 5 * 3 + 3 + 3 + 1);
        assert_eq!(theta[0], params.layers()[0].w[[0, 0]]);
        assert_eq!(theta[1], params.layers()[0].w[[0, 1]]);

        let rebuilt = vector_to_params(theta.view(), &params.layer_dims()).unwrap();
        assert_eq!(rebuilt, params);
    }

    #[test]
    fn vector_to_params_rejects_wrong_length() {
        let theta = Array1::<f64>::zeros(5);
        assert!(matches!(
            vector_to_params(theta.view(), &[2, 1]),
            Err(DlError::ShapeMismatch { context: "theta", .. })
        ));
    }

    #[test]
    fn zero_network_costs_ln_two() {
        let mut rng = StdRng::seed_from_u64(0);
        let params = initialize_parameters(&[2, 1], InitMethod::Zeros, &mut rng).unwrap();
        let x = array![[1.0, -1.0], [0.5, 2.0]];
        let y = array![[1.0, 0.0]];
        let (cost, cache) = forward_propagation_n(x.view(), y.view(), &params).unwrap();
        assert!((cost - std::f64::consts::LN_2).abs() < 1e-12);
        assert!(cache.output().iter().all(|&a| (a - 0.5).abs() < 1e-12));
    }

    #[test]
    fn single_layer_gradient_is_logistic_regression() {
        let w = array![[0.3, -0.2]];
        let b = array![[0.1]];
        let params = Parameters::new(vec![LayerParams::new(w, b).unwrap()]).unwrap();
        let x = array![[1.0, 2.0, -1.0], [0.0, 1.0, 3.0]];
        let y = array![[1.0, 0.0, 1.0]];
        let (_, cache) = forward_propagation_n(x.view(), y.view(), &params).unwrap();
        let grads = backward_propagation_n(y.view(), &cache).unwrap();

        let residual = cache.output() - &y;
        let expected_dw = residual.dot(&x.t()) / 3.0;
        assert_eq!(grads.len(), 1);
        for (g, e) in grads[0].dw.iter().zip(expected_dw.iter()) {
            assert!((g - e).abs() < 1e-12);
        }
        assert!((grads[0].db[[0, 0]] - residual.sum() / 3.0).abs() < 1e-12);
    }

    #[test]
    fn forward_rejects_label_shape() {
        let mut rng = StdRng::seed_from_u64(0);
        let params = initialize_parameters(&[2, 1], InitMethod::He, &mut rng).unwrap();
        let x = Array2::<f64>::zeros((2, 3));
        let y = Array2::<f64>::zeros((1, 2));
        assert!(forward_propagation_n(x.view(), y.view(), &params).is_err());
    }
}
