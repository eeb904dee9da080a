//! Max and average pooling.

use crate::trace::{trace_event, trace_span};
use crate::util::{DlError, DlResult};
use ndarray::{s, Array2, Array3, Array4, ArrayView2, ArrayView3, ArrayView4, Axis};

/// Pooling reduction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolMode {
    /// Window maximum.
    Max,
    /// Window mean.
    Average,
}

/// Window size, stride, and reduction for pooling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolParams {
    /// Window side length.
    pub f: usize,
    /// Step between windows.
    pub stride: usize,
    /// Reduction applied to each window.
    pub mode: PoolMode,
}

impl Default for PoolParams {
    fn default() -> Self {
        Self {
            f: 2,
            stride: 2,
            mode: PoolMode::Max,
        }
    }
}

/// Values saved by [`pool_forward`] for [`pool_backward`].
#[derive(Clone, Debug)]
pub struct PoolCache {
    /// Input activations.
    pub a_prev: Array4<f64>,
    /// Hyperparameters used in the forward pass.
    pub params: PoolParams,
}

pub(crate) fn pool_output_dims(
    a_prev: ArrayView4<'_, f64>,
    params: PoolParams,
) -> DlResult<(usize, usize)> {
    let (m, n_h_prev, n_w_prev, _) = a_prev.dim();
    if m == 0 {
        return Err(DlError::InvalidInput("a_prev has no examples"));
    }
    if params.f == 0 || params.stride == 0 {
        return Err(DlError::InvalidHyperParams {
            reason: "window size and stride must be at least 1",
        });
    }
    if n_h_prev < params.f || n_w_prev < params.f {
        return Err(DlError::InvalidHyperParams {
            reason: "pooling window larger than input",
        });
    }
    Ok((
        (n_h_prev - params.f) / params.stride + 1,
        (n_w_prev - params.f) / params.stride + 1,
    ))
}

pub(crate) fn pool_example(
    a: ArrayView3<'_, f64>,
    params: PoolParams,
    n_h: usize,
    n_w: usize,
) -> Array3<f64> {
    let n_c = a.dim().2;
    let f = params.f;
    let mut out = Array3::zeros((n_h, n_w, n_c));
    for h in 0..n_h {
        let vert_start = h * params.stride;
        for col in 0..n_w {
            let horiz_start = col * params.stride;
            for c in 0..n_c {
                let window = a.slice(s![
                    vert_start..vert_start + f,
                    horiz_start..horiz_start + f,
                    c
                ]);
                out[[h, col, c]] = match params.mode {
                    PoolMode::Max => window.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v)),
                    PoolMode::Average => window.sum() / (f * f) as f64,
                };
            }
        }
    }
    out
}

/// Forward pass of a pooling layer.
pub fn pool_forward(
    a_prev: ArrayView4<'_, f64>,
    params: PoolParams,
) -> DlResult<(Array4<f64>, PoolCache)> {
    let (n_h, n_w) = pool_output_dims(a_prev, params)?;
    let (m, _, _, n_c) = a_prev.dim();
    let _span = trace_span!("pool_forward", m = m, n_h = n_h, n_w = n_w).entered();

    let mut a = Array4::zeros((m, n_h, n_w, n_c));
    for (i, mut a_i) in a.axis_iter_mut(Axis(0)).enumerate() {
        a_i.assign(&pool_example(a_prev.index_axis(Axis(0), i), params, n_h, n_w));
    }

    trace_event!("pool_output", len = a.len());
    let cache = PoolCache {
        a_prev: a_prev.to_owned(),
        params,
    };
    Ok((a, cache))
}

/// Marks every position of `x` equal to its maximum.
pub fn create_mask_from_window(x: ArrayView2<'_, f64>) -> Array2<bool> {
    let max = x.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
    x.mapv(|v| v == max)
}

/// Spreads `dz` evenly over a window of `shape`.
pub fn distribute_value(dz: f64, shape: (usize, usize)) -> Array2<f64> {
    let (n_h, n_w) = shape;
    let average = dz / (n_h * n_w) as f64;
    Array2::from_elem(shape, average)
}

/// Backward pass of a pooling layer.
///
/// Max pooling routes each gradient to the window maxima (all of them on
/// ties); average pooling spreads it uniformly.
pub fn pool_backward(da: ArrayView4<'_, f64>, cache: &PoolCache) -> DlResult<Array4<f64>> {
    let params = cache.params;
    let (n_h, n_w) = pool_output_dims(cache.a_prev.view(), params)?;
    let (m, _, _, n_c) = cache.a_prev.dim();
    if da.dim() != (m, n_h, n_w, n_c) {
        return Err(DlError::shape("da", &[m, n_h, n_w, n_c], da.shape()));
    }

    let f = params.f;
    let mut da_prev = Array4::<f64>::zeros(cache.a_prev.raw_dim());
    for i in 0..m {
        for h in 0..n_h {
            let vert = h * params.stride..h * params.stride + f;
            for col in 0..n_w {
                let horiz = col * params.stride..col * params.stride + f;
                for c in 0..n_c {
                    let g = da[[i, h, col, c]];
                    let mut target = da_prev.slice_mut(s![i, vert.clone(), horiz.clone(), c]);
                    match params.mode {
                        PoolMode::Max => {
                            let window =
                                cache.a_prev.slice(s![i, vert.clone(), horiz.clone(), c]);
                            let mask = create_mask_from_window(window);
                            target.zip_mut_with(&mask, |t, &hit| {
                                if hit {
                                    *t += g;
                                }
                            });
                        }
                        PoolMode::Average => {
                            target += &distribute_value(g, (f, f));
                        }
                    }
                }
            }
        }
    }
    Ok(da_prev)
}
