//! Input decoding: JSON features, raw values and images into canonical tensors

use crate::error::{InferenceError, Result};
use crate::types::{CanonicalTensor, InputPayload};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Default square resolution images are resized to
pub const DEFAULT_IMAGE_SIZE: u32 = 224;

const DATA_URL_MARKER: &str = "base64,";

#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOptions {
    pub image_width: u32,
    pub image_height: u32,
    /// Ordered feature names used to lay out a JSON object payload
    pub feature_schema: Option<Vec<String>>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            image_width: DEFAULT_IMAGE_SIZE,
            image_height: DEFAULT_IMAGE_SIZE,
            feature_schema: None,
        }
    }
}

/// Converts request payloads into tensors a backend can consume.
#[derive(Debug, Clone, Default)]
pub struct InputCodec {
    options: DecodeOptions,
}

impl InputCodec {
    pub fn new(options: DecodeOptions) -> Self {
        Self { options }
    }

    /// Decode a payload. Same payload in, bit-identical tensor out.
    pub fn decode(&self, payload: &InputPayload) -> Result<CanonicalTensor> {
        let tensor = match payload {
            InputPayload::Features(json) => self.decode_features(json),
            InputPayload::Values(values) => CanonicalTensor::from_rows(vec![values.clone()]),
            InputPayload::ImageBase64(data) => self.decode_base64_image(data),
            InputPayload::ImagePath(path) => self.decode_image_file(path),
        }?;

        debug!(payload = %payload, shape = ?tensor.shape(), "Payload decoded");
        Ok(tensor)
    }

    /// JSON array (1-D → `[1, N]`, 2-D unchanged) or object of named features.
    fn decode_features(&self, json: &str) -> Result<CanonicalTensor> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| InferenceError::payload(format!("input data is not valid JSON: {}", e)))?;

        match &value {
            Value::Array(items) if items.iter().all(Value::is_array) && !items.is_empty() => {
                let rows = items
                    .iter()
                    .enumerate()
                    .map(|(idx, row)| numeric_row(row, &format!("row {}", idx)))
                    .collect::<Result<Vec<_>>>()?;
                CanonicalTensor::from_rows(rows)
            }
            Value::Array(_) => CanonicalTensor::from_rows(vec![numeric_row(&value, "input")?]),
            Value::Object(map) => {
                let schema = self.options.feature_schema.as_ref().ok_or_else(|| {
                    InferenceError::payload(
                        "named features need a feature schema; pass a JSON array or select a model type with features",
                    )
                })?;
                let row = schema
                    .iter()
                    .map(|name| {
                        map.get(name)
                            .and_then(Value::as_f64)
                            .map(|v| v as f32)
                            .ok_or_else(|| {
                                InferenceError::payload(format!("missing or non-numeric feature '{}'", name))
                            })
                    })
                    .collect::<Result<Vec<_>>>()?;
                CanonicalTensor::from_rows(vec![row])
            }
            other => Err(InferenceError::payload(format!(
                "expected a JSON array or object, got {}",
                json_type(other)
            ))),
        }
    }

    fn decode_base64_image(&self, data: &str) -> Result<CanonicalTensor> {
        let bytes = decode_base64(data)?;
        let image = image::load_from_memory(&bytes)
            .map_err(|e| InferenceError::payload(format!("cannot identify image data: {}", e)))?;
        self.image_tensor(&image)
    }

    fn decode_image_file(&self, path: &Path) -> Result<CanonicalTensor> {
        if !path.is_file() {
            return Err(InferenceError::payload(format!(
                "image file not found: {}",
                path.display()
            )));
        }
        let image = image::open(path).map_err(|e| {
            InferenceError::payload(format!("cannot decode image {}: {}", path.display(), e))
        })?;
        self.image_tensor(&image)
    }

    /// Resize, force RGB, scale to [0, 1] and add the batch axis:
    /// `[1, height, width, 3]`.
    fn image_tensor(&self, image: &DynamicImage) -> Result<CanonicalTensor> {
        let (width, height) = (self.options.image_width, self.options.image_height);
        let rgb = image.resize_exact(width, height, FilterType::CatmullRom).to_rgb8();

        let mut tensor = Array4::<f32>::zeros((1, height as usize, width as usize, 3));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            for channel in 0..3 {
                tensor[[0, y as usize, x as usize, channel]] = f32::from(pixel[channel]) / 255.0;
            }
        }

        CanonicalTensor::new(tensor.into_dyn())
    }
}

/// Drop an optional `data:<mime>;base64,` prefix.
pub fn strip_data_url(data: &str) -> &str {
    match data.find(DATA_URL_MARKER) {
        Some(idx) => &data[idx + DATA_URL_MARKER.len()..],
        None => data,
    }
}

fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let cleaned: String = strip_data_url(data)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if cleaned.is_empty() {
        return Err(InferenceError::payload("image data is empty"));
    }
    BASE64
        .decode(cleaned.as_bytes())
        .map_err(|e| InferenceError::payload(format!("image data is not valid base64: {}", e)))
}

fn numeric_row(value: &Value, context: &str) -> Result<Vec<f32>> {
    let items = value
        .as_array()
        .ok_or_else(|| InferenceError::payload(format!("{} is not an array", context)))?;
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            item.as_f64().map(|v| v as f32).ok_or_else(|| {
                InferenceError::payload(format!(
                    "{} element {} is {}, expected a number",
                    context,
                    idx,
                    json_type(item)
                ))
            })
        })
        .collect()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
