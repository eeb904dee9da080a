//! Reference convolution and pooling layers.
//!
//! Activations use the `(m, n_H, n_W, n_C)` layout, filters
//! `(f, f, n_C_prev, n_C)`, and biases one value per output channel. These
//! are direct loop formulations meant for checking results, not speed.

pub mod pool;
#[cfg(feature = "rayon")]
pub mod rayon;

pub use pool::{
    create_mask_from_window, distribute_value, pool_backward, pool_forward, PoolCache, PoolMode,
    PoolParams,
};

use crate::trace::{trace_event, trace_span};
use crate::util::{DlError, DlResult};
use ndarray::{s, Array1, Array3, Array4, ArrayView1, ArrayView3, ArrayView4, Axis};

/// Stride and zero padding for [`conv_forward`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConvParams {
    /// Step between neighbouring windows.
    pub stride: usize,
    /// Zeros added on each side of both spatial axes.
    pub pad: usize,
}

impl Default for ConvParams {
    fn default() -> Self {
        Self { stride: 1, pad: 0 }
    }
}

/// Values saved by [`conv_forward`] for [`conv_backward`].
#[derive(Clone, Debug)]
pub struct ConvCache {
    /// Input activations.
    pub a_prev: Array4<f64>,
    /// Filters.
    pub w: Array4<f64>,
    /// Biases.
    pub b: Array1<f64>,
    /// Hyperparameters used in the forward pass.
    pub params: ConvParams,
}

/// Gradients returned by [`conv_backward`].
#[derive(Clone, Debug)]
pub struct ConvGrads {
    /// Gradient with respect to the input activations.
    pub da_prev: Array4<f64>,
    /// Gradient with respect to the filters.
    pub dw: Array4<f64>,
    /// Gradient with respect to the biases.
    pub db: Array1<f64>,
}

/// Pads the two spatial axes of a batch with zeros.
pub fn zero_pad(x: ArrayView4<'_, f64>, pad: usize) -> Array4<f64> {
    let (m, n_h, n_w, n_c) = x.dim();
    let mut out = Array4::zeros((m, n_h + 2 * pad, n_w + 2 * pad, n_c));
    out.slice_mut(s![.., pad..pad + n_h, pad..pad + n_w, ..])
        .assign(&x);
    out
}

/// Applies one filter to one window: `sum(a_slice * w) + b`.
pub fn conv_single_step(
    a_slice: ArrayView3<'_, f64>,
    w: ArrayView3<'_, f64>,
    b: f64,
) -> DlResult<f64> {
    if a_slice.shape() != w.shape() {
        return Err(DlError::shape("a_slice", w.shape(), a_slice.shape()));
    }
    Ok(window_dot(a_slice, w) + b)
}

fn window_dot(a: ArrayView3<'_, f64>, w: ArrayView3<'_, f64>) -> f64 {
    a.iter().zip(w.iter()).map(|(x, y)| x * y).sum()
}

/// Output spatial size of a sliding window.
fn window_count(n: usize, f: usize, stride: usize) -> usize {
    (n - f) / stride + 1
}

/// Checks shapes and returns `(n_H, n_W)` of the convolution output.
pub(crate) fn conv_output_dims(
    a_prev: ArrayView4<'_, f64>,
    w: ArrayView4<'_, f64>,
    b: ArrayView1<'_, f64>,
    params: ConvParams,
) -> DlResult<(usize, usize)> {
    let (m, n_h_prev, n_w_prev, n_c_prev) = a_prev.dim();
    let (f, f_w, w_c_prev, n_c) = w.dim();
    if m == 0 {
        return Err(DlError::InvalidInput("a_prev has no examples"));
    }
    if f == 0 || f != f_w {
        return Err(DlError::InvalidHyperParams {
            reason: "filters must be square and non-empty",
        });
    }
    if w_c_prev != n_c_prev {
        return Err(DlError::shape("w", &[f, f, n_c_prev, n_c], w.shape()));
    }
    if b.len() != n_c {
        return Err(DlError::shape("b", &[n_c], b.shape()));
    }
    if params.stride == 0 {
        return Err(DlError::InvalidHyperParams {
            reason: "stride must be at least 1",
        });
    }
    let padded_h = n_h_prev + 2 * params.pad;
    let padded_w = n_w_prev + 2 * params.pad;
    if padded_h < f || padded_w < f {
        return Err(DlError::InvalidHyperParams {
            reason: "filter larger than padded input",
        });
    }
    Ok((
        window_count(padded_h, f, params.stride),
        window_count(padded_w, f, params.stride),
    ))
}

/// Convolves one padded example with every filter.
pub(crate) fn conv_example(
    a_pad: ArrayView3<'_, f64>,
    w: ArrayView4<'_, f64>,
    b: ArrayView1<'_, f64>,
    stride: usize,
    n_h: usize,
    n_w: usize,
) -> Array3<f64> {
    let (f, _, _, n_c) = w.dim();
    let mut z = Array3::zeros((n_h, n_w, n_c));
    for h in 0..n_h {
        let vert_start = h * stride;
        for col in 0..n_w {
            let horiz_start = col * stride;
            let window = a_pad.slice(s![
                vert_start..vert_start + f,
                horiz_start..horiz_start + f,
                ..
            ]);
            for c in 0..n_c {
                z[[h, col, c]] = window_dot(window, w.slice(s![.., .., .., c])) + b[c];
            }
        }
    }
    z
}

/// Forward pass of a convolution layer.
pub fn conv_forward(
    a_prev: ArrayView4<'_, f64>,
    w: ArrayView4<'_, f64>,
    b: ArrayView1<'_, f64>,
    params: ConvParams,
) -> DlResult<(Array4<f64>, ConvCache)> {
    let (n_h, n_w) = conv_output_dims(a_prev, w, b, params)?;
    let m = a_prev.dim().0;
    let n_c = w.dim().3;
    let _span = trace_span!("conv_forward", m = m, n_h = n_h, n_w = n_w, n_c = n_c).entered();

    let a_prev_pad = zero_pad(a_prev, params.pad);
    let mut z = Array4::zeros((m, n_h, n_w, n_c));
    for (i, mut z_i) in z.axis_iter_mut(Axis(0)).enumerate() {
        let a_pad_i = a_prev_pad.index_axis(Axis(0), i);
        z_i.assign(&conv_example(a_pad_i, w, b, params.stride, n_h, n_w));
    }

    trace_event!("conv_output", len = z.len());
    let cache = ConvCache {
        a_prev: a_prev.to_owned(),
        w: w.to_owned(),
        b: b.to_owned(),
        params,
    };
    Ok((z, cache))
}

/// Backward pass of a convolution layer.
///
/// `dz` is the gradient of the cost with respect to the layer output.
pub fn conv_backward(dz: ArrayView4<'_, f64>, cache: &ConvCache) -> DlResult<ConvGrads> {
    let (n_h, n_w) = conv_output_dims(
        cache.a_prev.view(),
        cache.w.view(),
        cache.b.view(),
        cache.params,
    )?;
    let (m, n_h_prev, n_w_prev, _) = cache.a_prev.dim();
    let (f, _, _, n_c) = cache.w.dim();
    if dz.dim() != (m, n_h, n_w, n_c) {
        return Err(DlError::shape("dz", &[m, n_h, n_w, n_c], dz.shape()));
    }

    let ConvParams { stride, pad } = cache.params;
    let a_prev_pad = zero_pad(cache.a_prev.view(), pad);
    let mut da_prev_pad = Array4::<f64>::zeros(a_prev_pad.raw_dim());
    let mut dw = Array4::<f64>::zeros(cache.w.raw_dim());
    let mut db = Array1::<f64>::zeros(n_c);

    for i in 0..m {
        for h in 0..n_h {
            let vert = h * stride..h * stride + f;
            for col in 0..n_w {
                let horiz = col * stride..col * stride + f;
                for c in 0..n_c {
                    let g = dz[[i, h, col, c]];
                    da_prev_pad
                        .slice_mut(s![i, vert.clone(), horiz.clone(), ..])
                        .scaled_add(g, &cache.w.slice(s![.., .., .., c]));
                    dw.slice_mut(s![.., .., .., c]).scaled_add(
                        g,
                        &a_prev_pad.slice(s![i, vert.clone(), horiz.clone(), ..]),
                    );
                    db[c] += g;
                }
            }
        }
    }

    let da_prev = da_prev_pad
        .slice(s![.., pad..pad + n_h_prev, pad..pad + n_w_prev, ..])
        .to_owned();
    Ok(ConvGrads { da_prev, dw, db })
}
