//! Batch-parallel convolution and pooling (feature-gated).
//!
//! Examples in a batch are independent, so each one is computed on its own
//! rayon task and the results are stacked back along axis 0. Outputs are
//! identical to the sequential versions.

use crate::conv::pool::{pool_example, pool_output_dims, PoolCache, PoolParams};
use crate::conv::{conv_example, conv_output_dims, zero_pad, ConvCache, ConvParams};
use crate::trace::trace_span;
use crate::util::{DlError, DlResult};
use ::rayon::prelude::*;
use ndarray::{stack, Array3, Array4, ArrayView1, ArrayView4, Axis};

fn stack_examples(examples: &[Array3<f64>]) -> DlResult<Array4<f64>> {
    let views: Vec<_> = examples.iter().map(|e| e.view()).collect();
    stack(Axis(0), &views).map_err(|_| DlError::InvalidInput("per-example outputs differ in shape"))
}

/// Parallel counterpart of [`crate::conv::conv_forward`].
pub fn conv_forward_par(
    a_prev: ArrayView4<'_, f64>,
    w: ArrayView4<'_, f64>,
    b: ArrayView1<'_, f64>,
    params: ConvParams,
) -> DlResult<(Array4<f64>, ConvCache)> {
    let (n_h, n_w) = conv_output_dims(a_prev, w, b, params)?;
    let m = a_prev.dim().0;
    let _span = trace_span!("conv_forward_par", m = m, n_h = n_h, n_w = n_w).entered();

    let a_prev_pad = zero_pad(a_prev, params.pad);
    let examples: Vec<Array3<f64>> = (0..m)
        .into_par_iter()
        .map(|i| conv_example(a_prev_pad.index_axis(Axis(0), i), w, b, params.stride, n_h, n_w))
        .collect();
    let z = stack_examples(&examples)?;

    let cache = ConvCache {
        a_prev: a_prev.to_owned(),
        w: w.to_owned(),
        b: b.to_owned(),
        params,
    };
    Ok((z, cache))
}

/// Parallel counterpart of [`crate::conv::pool_forward`].
pub fn pool_forward_par(
    a_prev: ArrayView4<'_, f64>,
    params: PoolParams,
) -> DlResult<(Array4<f64>, PoolCache)> {
    let (n_h, n_w) = pool_output_dims(a_prev, params)?;
    let m = a_prev.dim().0;
    let _span = trace_span!("pool_forward_par", m = m, n_h = n_h, n_w = n_w).entered();

    let examples: Vec<Array3<f64>> = (0..m)
        .into_par_iter()
        .map(|i| pool_example(a_prev.index_axis(Axis(0), i), params, n_h, n_w))
        .collect();
    let a = stack_examples(&examples)?;

    let cache = PoolCache {
        a_prev: a_prev.to_owned(),
        params,
    };
    Ok((a, cache))
}
