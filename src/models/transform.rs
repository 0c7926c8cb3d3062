//! Fitted feature scalers applied before prediction

use crate::error::{InferenceError, Result};
use crate::types::CanonicalTensor;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_pickle::DeOptions;
use std::path::Path;
use tracing::info;

/// Scaler parameters, pickled as a dict tagged by `kind`.
///
/// `standard` mirrors scikit-learn's `StandardScaler` (`mean_`, `scale_`),
/// `min_max` mirrors `MinMaxScaler` (`min_`, `scale_`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transform {
    /// `(x - mean) / scale`
    Standard { mean: Vec<f64>, scale: Vec<f64> },
    /// `x * scale + min`
    MinMax { min: Vec<f64>, scale: Vec<f64> },
}

impl Transform {
    /// Load a pickled scaler from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(InferenceError::scaler_not_found(path));
        }

        let bytes = std::fs::read(path).map_err(|e| InferenceError::deserialization(path, e))?;
        let transform: Transform = serde_pickle::from_slice(&bytes, DeOptions::new())
            .map_err(|e| InferenceError::deserialization(path, e))?;
        transform
            .validate()
            .map_err(|reason| InferenceError::deserialization(path, reason))?;

        info!(scaler = %path.display(), width = transform.width(), "Scaler loaded");
        Ok(transform)
    }

    /// Number of features the scaler was fitted on
    pub fn width(&self) -> usize {
        match self {
            Transform::Standard { mean, .. } => mean.len(),
            Transform::MinMax { min, .. } => min.len(),
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let (offset, scale) = match self {
            Transform::Standard { mean, scale } => (mean, scale),
            Transform::MinMax { min, scale } => (min, scale),
        };
        if offset.is_empty() {
            return Err("scaler has no parameters".to_string());
        }
        if offset.len() != scale.len() {
            return Err(format!(
                "scaler parameter lengths differ ({} vs {})",
                offset.len(),
                scale.len()
            ));
        }
        Ok(())
    }

    /// Scale a `[batch, features]` tensor. The shape is preserved.
    pub fn apply(&self, tensor: &CanonicalTensor) -> Result<CanonicalTensor> {
        let matrix = tensor.as_matrix().ok_or_else(|| {
            InferenceError::Transform(format!(
                "scaler expects a 2-D [batch, features] input, got shape {:?}",
                tensor.shape()
            ))
        })?;
        if matrix.ncols() != self.width() {
            return Err(InferenceError::Transform(format!(
                "X has {} features, but scaler is expecting {} features as input",
                matrix.ncols(),
                self.width()
            )));
        }

        let scaled = match self {
            Transform::Standard { mean, scale } => Array2::from_shape_fn(matrix.dim(), |(r, c)| {
                // zero-variance features keep their centred value
                let divisor = if scale[c] == 0.0 { 1.0 } else { scale[c] };
                ((f64::from(matrix[[r, c]]) - mean[c]) / divisor) as f32
            }),
            Transform::MinMax { min, scale } => Array2::from_shape_fn(matrix.dim(), |(r, c)| {
                (f64::from(matrix[[r, c]]) * scale[c] + min[c]) as f32
            }),
        };

        CanonicalTensor::new(scaled.into_dyn())
    }
}
