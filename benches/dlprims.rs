use criterion::{criterion_group, criterion_main, Criterion};
use dlprims::{conv_forward, evaluate, ConvParams, EvalConfig, YoloOutputs};
use ndarray::{Array1, Array4};
use std::hint::black_box;

fn make_tensor(shape: (usize, usize, usize, usize), salt: usize) -> Array4<f64> {
    Array4::from_shape_fn(shape, |(a, b, c, d)| {
        let v = ((a * 13) ^ (b * 7) ^ (c * 5) ^ (d * 3) ^ salt) & 0xFF;
        v as f64 / 255.0
    })
}

fn make_outputs(gh: usize, gw: usize, anchors: usize, classes: usize) -> YoloOutputs {
    let xy = make_tensor((gh, gw, anchors, 2), 1);
    let wh = make_tensor((gh, gw, anchors, 2), 2).mapv(|v| 0.05 + 0.3 * v);
    let conf = make_tensor((gh, gw, anchors, 1), 3);
    let mut probs = make_tensor((gh, gw, anchors, classes), 4).mapv(|v| v + 1e-3);
    for mut lane in probs.lanes_mut(ndarray::Axis(3)) {
        let sum = lane.sum();
        lane.mapv_inplace(|p| p / sum);
    }
    YoloOutputs::new(xy, wh, conf, probs).unwrap()
}

fn bench_detection(c: &mut Criterion) {
    let outputs = make_outputs(19, 19, 5, 80);
    let strict = EvalConfig::default();
    let loose = EvalConfig {
        score_threshold: 0.01,
        max_boxes: 100,
        ..EvalConfig::default()
    };

    c.bench_function("evaluate_19x19x5x80_default", |b| {
        b.iter(|| black_box(evaluate(&outputs, &strict).unwrap()));
    });
    c.bench_function("evaluate_19x19x5x80_loose", |b| {
        b.iter(|| black_box(evaluate(&outputs, &loose).unwrap()));
    });
}

fn bench_conv(c: &mut Criterion) {
    let a = make_tensor((8, 32, 32, 3), 5);
    let w = make_tensor((3, 3, 3, 8), 6);
    let bias = Array1::<f64>::zeros(8);
    let params = ConvParams { stride: 1, pad: 1 };

    c.bench_function("conv_forward_8x32x32x3_f3", |b| {
        b.iter(|| black_box(conv_forward(a.view(), w.view(), bias.view(), params).unwrap()));
    });

    #[cfg(feature = "rayon")]
    c.bench_function("conv_forward_par_8x32x32x3_f3", |b| {
        b.iter(|| {
            black_box(
                dlprims::conv::rayon::conv_forward_par(a.view(), w.view(), bias.view(), params)
                    .unwrap(),
            )
        });
    });
}

criterion_group!(benches, bench_detection, bench_conv);
criterion_main!(benches);
