//! Parameter initialization for dense networks.
//!
//! Layer `l` holds `w` with shape `(n_l, n_{l-1})` and a column bias `b` with
//! shape `(n_l, 1)`. Biases always start at zero; weights follow the chosen
//! [`InitMethod`].

use crate::util::{DlError, DlResult};
use ndarray::Array2;
use rand::Rng;
use rand_distr::StandardNormal;

/// Scale applied to standard-normal weights by [`InitMethod::random`].
pub const RANDOM_INIT_SCALE: f64 = 10.0;

/// Weight initialization strategy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InitMethod {
    /// All-zero weights. Every unit in a layer computes the same function.
    Zeros,
    /// Standard-normal weights multiplied by `scale`.
    Random { scale: f64 },
    /// Standard-normal weights multiplied by `sqrt(2 / fan_in)`.
    He,
}

impl InitMethod {
    /// Random initialization with [`RANDOM_INIT_SCALE`].
    pub fn random() -> Self {
        InitMethod::Random {
            scale: RANDOM_INIT_SCALE,
        }
    }
}

/// Weights and bias of one dense layer.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerParams {
    /// Weight matrix `(n_out, n_in)`.
    pub w: Array2<f64>,
    /// Bias column `(n_out, 1)`.
    pub b: Array2<f64>,
}

impl LayerParams {
    /// Creates a layer after checking that `b` matches `w`.
    pub fn new(w: Array2<f64>, b: Array2<f64>) -> DlResult<Self> {
        let rows = w.nrows();
        if b.dim() != (rows, 1) {
            return Err(DlError::shape("bias", &[rows, 1], b.shape()));
        }
        Ok(Self { w, b })
    }

    /// Returns the number of input units.
    pub fn fan_in(&self) -> usize {
        self.w.ncols()
    }

    /// Returns the number of output units.
    pub fn fan_out(&self) -> usize {
        self.w.nrows()
    }
}

/// Ordered parameters of a dense network.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameters {
    layers: Vec<LayerParams>,
}

impl Parameters {
    /// Builds a network from layers whose sizes chain together.
    pub fn new(layers: Vec<LayerParams>) -> DlResult<Self> {
        if layers.is_empty() {
            return Err(DlError::InvalidInput("network needs at least one layer"));
        }
        for pair in layers.windows(2) {
            if pair[1].fan_in() != pair[0].fan_out() {
                return Err(DlError::shape(
                    "layer weights",
                    &[pair[1].fan_out(), pair[0].fan_out()],
                    pair[1].w.shape(),
                ));
            }
        }
        Ok(Self { layers })
    }

    /// Returns the layers in forward order.
    pub fn layers(&self) -> &[LayerParams] {
        &self.layers
    }

    /// Returns the number of layers.
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Returns `[n_0, n_1, ..., n_L]`.
    pub fn layer_dims(&self) -> Vec<usize> {
        let mut dims = Vec::with_capacity(self.layers.len() + 1);
        dims.push(self.layers[0].fan_in());
        dims.extend(self.layers.iter().map(LayerParams::fan_out));
        dims
    }

    /// Returns the total number of scalar parameters.
    pub fn num_params(&self) -> usize {
        self.layers.iter().map(|l| l.w.len() + l.b.len()).sum()
    }
}

/// Initializes parameters for the layer sizes in `layer_dims`.
///
/// `layer_dims[0]` is the input size; each following entry adds one layer.
pub fn initialize_parameters<R: Rng + ?Sized>(
    layer_dims: &[usize],
    method: InitMethod,
    rng: &mut R,
) -> DlResult<Parameters> {
    if layer_dims.len() < 2 {
        return Err(DlError::InvalidInput(
            "layer_dims needs an input size and at least one layer",
        ));
    }
    if layer_dims.contains(&0) {
        return Err(DlError::InvalidInput("layer sizes must be non-zero"));
    }

    let mut layers = Vec::with_capacity(layer_dims.len() - 1);
    for dims in layer_dims.windows(2) {
        let (fan_in, fan_out) = (dims[0], dims[1]);
        let w = match method {
            InitMethod::Zeros => Array2::zeros((fan_out, fan_in)),
            InitMethod::Random { scale } => standard_normal((fan_out, fan_in), scale, rng),
            InitMethod::He => {
                let scale = (2.0 / fan_in as f64).sqrt();
                standard_normal((fan_out, fan_in), scale, rng)
            }
        };
        let b = Array2::zeros((fan_out, 1));
        layers.push(LayerParams { w, b });
    }
    Parameters::new(layers)
}

fn standard_normal<R: Rng + ?Sized>(shape: (usize, usize), scale: f64, rng: &mut R) -> Array2<f64> {
    Array2::from_shape_simple_fn(shape, || {
        let z: f64 = rng.sample(StandardNormal);
        z * scale
    })
}
