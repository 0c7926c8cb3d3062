//! Fixtures shared by unit tests: models, scalers and images written to disk

use crate::models::transform::Transform;
use crate::models::tree_ensemble::{Aggregation, DecisionTree, Task, TreeEnsemble};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_pickle::SerOptions;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Three-class soil quality forest over
/// `[gas_level, humidity, nitrogen, phosphorus, potassium, temperature]`.
///
/// Class order is `[Good, Moderate, Poor]`.
pub fn soil_classifier() -> TreeEnsemble {
    // gas <= 300 → Good; otherwise nitrogen <= 40 → Poor, else mostly Moderate
    let gas_then_nitrogen = DecisionTree {
        children_left: vec![1, -1, 3, -1, -1],
        children_right: vec![2, -1, 4, -1, -1],
        feature: vec![0, -2, 2, -2, -2],
        threshold: vec![300.0, -2.0, 40.0, -2.0, -2.0],
        value: vec![
            vec![10.0, 9.0, 9.0],
            vec![10.0, 0.0, 0.0],
            vec![0.0, 9.0, 9.0],
            vec![0.0, 0.0, 8.0],
            vec![0.0, 9.0, 1.0],
        ],
    };
    // temperature <= 30 → mostly Moderate, else Poor
    let temperature = DecisionTree {
        children_left: vec![1, -1, -1],
        children_right: vec![2, -1, -1],
        feature: vec![5, -2, -2],
        threshold: vec![30.0, -2.0, -2.0],
        value: vec![vec![1.0, 3.0, 4.0], vec![1.0, 3.0, 0.0], vec![0.0, 0.0, 4.0]],
    };

    TreeEnsemble {
        task: Task::Classification,
        aggregation: Aggregation::Average,
        n_features: 6,
        trees: vec![gas_then_nitrogen, temperature],
    }
}

/// Single split on `feature`, sized to just cover it.
pub fn stump(feature: usize, threshold: f64, left: Vec<f64>, right: Vec<f64>, task: Task) -> TreeEnsemble {
    let root: Vec<f64> = left.iter().zip(&right).map(|(l, r)| l + r).collect();
    TreeEnsemble {
        task,
        aggregation: Aggregation::Average,
        n_features: feature + 1,
        trees: vec![DecisionTree {
            children_left: vec![1, -1, -1],
            children_right: vec![2, -1, -1],
            feature: vec![feature as i64, -2, -2],
            threshold: vec![threshold, -2.0, -2.0],
            value: vec![root, left, right],
        }],
    }
}

pub fn write_pickle<T: serde::Serialize>(dir: &Path, name: &str, value: &T) -> PathBuf {
    let path = dir.join(name);
    let bytes = serde_pickle::to_vec(value, SerOptions::new()).expect("pickle fixture");
    std::fs::write(&path, bytes).expect("write fixture");
    path
}

pub fn write_soil_model(dir: &Path) -> PathBuf {
    write_pickle(dir, "soil_quality_model.pkl", &soil_classifier())
}

pub fn write_scaler(dir: &Path, transform: &Transform) -> PathBuf {
    write_pickle(dir, "scaler.pkl", transform)
}

fn varint(mut value: u64, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn field_varint(field: u64, value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    varint(field << 3, &mut out);
    varint(value, &mut out);
    out
}

fn field_bytes(field: u64, bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    varint((field << 3) | 2, &mut out);
    varint(bytes.len() as u64, &mut out);
    out.extend_from_slice(bytes);
    out
}

/// `ValueInfoProto` for a float tensor of shape `[batch, width]`.
fn float_matrix_info(name: &str, width: usize) -> Vec<u8> {
    let batch = field_bytes(1, &field_bytes(2, b"batch"));
    let classes = field_bytes(1, &field_varint(1, width as u64));
    let shape = [batch, classes].concat();
    let tensor_type = [field_varint(1, 1), field_bytes(2, &shape)].concat();
    let type_proto = field_bytes(1, &tensor_type);
    [field_bytes(1, name.as_bytes()), field_bytes(2, &type_proto)].concat()
}

/// ONNX graph `probabilities = Softmax(logits)` over `[batch, classes]`,
/// encoded by hand (opset 13, IR version 8).
pub fn softmax_onnx(classes: usize) -> Vec<u8> {
    let node = [
        field_bytes(1, b"logits"),
        field_bytes(2, b"probabilities"),
        field_bytes(3, b"softmax"),
        field_bytes(4, b"Softmax"),
    ]
    .concat();
    let graph = [
        field_bytes(1, &node),
        field_bytes(2, b"rice_head"),
        field_bytes(11, &float_matrix_info("logits", classes)),
        field_bytes(12, &float_matrix_info("probabilities", classes)),
    ]
    .concat();
    let opset = field_varint(2, 13);

    [
        field_varint(1, 8),
        field_bytes(2, b"agri-inference-tests"),
        field_bytes(7, &graph),
        field_bytes(8, &opset),
    ]
    .concat()
}

pub fn write_softmax_model(dir: &Path, classes: usize) -> PathBuf {
    let path = dir.join("rice_classifier.onnx");
    std::fs::write(&path, softmax_onnx(classes)).expect("write onnx fixture");
    path
}

/// Solid-colour image
pub fn solid_image(width: u32, height: u32, rgb: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)))
}

pub fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .expect("encode png");
    buffer
}

pub fn write_png(dir: &Path, name: &str, image: &DynamicImage) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, png_bytes(image)).expect("write png");
    path
}
