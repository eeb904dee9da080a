//! dlprims is a CPU reference library of deep-learning primitives.
//!
//! It covers finite-difference gradient checking, dense parameter
//! initialization, convolution and pooling passes, triplet loss with
//! encoding-based verification, and YOLO-style detection post-processing
//! (score filtering, IoU, non-max suppression). Arrays are `ndarray` types
//! in `f64`; the optional `rayon` feature parallelizes batch convolution.

pub mod conv;
pub mod detect;
pub mod gradcheck;
pub mod init;
mod trace;
pub mod triplet;
pub mod util;

pub use conv::{conv_backward, conv_forward, conv_single_step, zero_pad, ConvParams};
pub use detect::{
    evaluate, filter_boxes, iou, iou_clamped, non_max_suppression, yolo_head, BoxCorners,
    Detection, Detections, EvalConfig, ImageShape, YoloOutputs,
};
pub use gradcheck::{gradient_check, gradient_check_n, GradCheck};
pub use init::{initialize_parameters, InitMethod, Parameters};
pub use triplet::{triplet_loss, verify, who_is_it, FaceDatabase};
pub use util::{DlError, DlResult};
