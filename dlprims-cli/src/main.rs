use clap::Parser;
use dlprims::{evaluate, yolo_head, Detection, EvalConfig, ImageShape};
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const SCHEMA_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.schema.json"));
const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "YOLO post-processing CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print the JSON schema and exit.
    #[arg(long)]
    print_schema: bool,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for the pipeline stages.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct EvalConfigJson {
    image_height: f64,
    image_width: f64,
    max_boxes: usize,
    score_threshold: f64,
    iou_threshold: f64,
}

impl Default for EvalConfigJson {
    fn default() -> Self {
        let cfg = EvalConfig::default();
        Self {
            image_height: cfg.image_shape.height,
            image_width: cfg.image_shape.width,
            max_boxes: cfg.max_boxes,
            score_threshold: cfg.score_threshold,
            iou_threshold: cfg.iou_threshold,
        }
    }
}

impl From<&EvalConfigJson> for EvalConfig {
    fn from(value: &EvalConfigJson) -> Self {
        EvalConfig {
            image_shape: ImageShape::new(value.image_height, value.image_width),
            max_boxes: value.max_boxes,
            score_threshold: value.score_threshold,
            iou_threshold: value.iou_threshold,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Config {
    features_path: String,
    anchors: Vec<[f64; 2]>,
    num_classes: usize,
    class_names: Vec<String>,
    output_path: Option<String>,
    eval: EvalConfigJson,
}

/// Raw head output stored as a row-major `(gh, gw, channels)` tensor.
#[derive(Debug, Deserialize)]
struct FeaturesFile {
    shape: [usize; 3],
    data: Vec<f64>,
}

#[derive(Debug, Serialize)]
struct DetectionRecord {
    score: f64,
    class: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    class_name: Option<String>,
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
}

impl DetectionRecord {
    fn new(det: Detection, class_names: &[String]) -> Self {
        Self {
            score: det.score,
            class: det.class,
            class_name: class_names.get(det.class).cloned(),
            x1: det.bbox.x1,
            y1: det.bbox.y1,
            x2: det.bbox.x2,
            y2: det.bbox.y2,
        }
    }
}

#[derive(Debug, Serialize)]
struct Output {
    count: usize,
    detections: Vec<DetectionRecord>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("dlprims=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_schema {
        println!("{SCHEMA_JSON}");
        return Ok(());
    }
    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    if config.features_path.is_empty() {
        return Err("features_path must be set in the config".into());
    }
    if config.anchors.is_empty() {
        return Err("anchors must list at least one (w, h) pair".into());
    }
    if config.num_classes == 0 {
        return Err("num_classes must be at least 1".into());
    }
    if !config.class_names.is_empty() && config.class_names.len() != config.num_classes {
        return Err("class_names must be empty or have num_classes entries".into());
    }

    let features_text = fs::read_to_string(&config.features_path)?;
    let features: FeaturesFile = serde_json::from_str(&features_text)?;
    let [gh, gw, channels] = features.shape;
    let feats = Array3::from_shape_vec((gh, gw, channels), features.data)?;

    let outputs = yolo_head(feats.view(), &config.anchors, config.num_classes)?;
    let eval_cfg = EvalConfig::from(&config.eval);
    let detections = evaluate(&outputs, &eval_cfg)?;
    tracing::info!(count = detections.len(), "detections selected");

    let records: Vec<DetectionRecord> = detections
        .iter()
        .map(|det| DetectionRecord::new(det, &config.class_names))
        .collect();
    let output = Output {
        count: records.len(),
        detections: records,
    };
    let json = serde_json::to_string_pretty(&output)?;

    match config.output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Config, EXAMPLE_JSON, SCHEMA_JSON};
    use serde_json::Value;

    #[test]
    fn example_config_parses_and_matches_schema_keys() {
        let config: Config = serde_json::from_str(EXAMPLE_JSON).unwrap();
        assert_eq!(config.anchors.len(), 5);
        assert_eq!(config.num_classes, 80);
        assert_eq!(config.eval.max_boxes, 10);

        let schema: Value = serde_json::from_str(SCHEMA_JSON).unwrap();
        let example: Value = serde_json::from_str(EXAMPLE_JSON).unwrap();
        let props = schema["properties"].as_object().unwrap();
        for key in example.as_object().unwrap().keys() {
            assert!(props.contains_key(key), "schema is missing {key}");
        }
        let eval_props = props["eval"]["properties"].as_object().unwrap();
        for key in example["eval"].as_object().unwrap().keys() {
            assert!(eval_props.contains_key(key), "schema is missing eval.{key}");
        }
    }
}
