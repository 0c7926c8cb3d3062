//! Canonical tensor and raw backend output

use crate::error::{InferenceError, Result};
use crate::models::backend::ModelKind;
use ndarray::{Array2, ArrayD, ArrayView2, Ix2};

/// Numeric input fed to every backend.
///
/// Feature payloads are `[batch, features]`, image payloads are
/// `[1, height, width, 3]`. Construction guarantees at least two axes and no
/// zero-length axis.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTensor {
    data: ArrayD<f32>,
}

impl CanonicalTensor {
    pub fn new(data: ArrayD<f32>) -> Result<Self> {
        if data.ndim() < 2 {
            return Err(InferenceError::payload(format!(
                "expected at least 2 dimensions, got shape {:?}",
                data.shape()
            )));
        }
        if data.shape().iter().any(|&d| d == 0) {
            return Err(InferenceError::payload(format!(
                "tensor has an empty axis: shape {:?}",
                data.shape()
            )));
        }
        Ok(Self { data })
    }

    /// Build a `[rows, width]` tensor, rejecting empty or ragged input.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let batch = rows.len();
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if batch == 0 || width == 0 {
            return Err(InferenceError::payload("input contains no values"));
        }
        if let Some(bad) = rows.iter().position(|r| r.len() != width) {
            return Err(InferenceError::payload(format!(
                "row {} has {} values, expected {}",
                bad,
                rows[bad].len(),
                width
            )));
        }

        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        let matrix = Array2::from_shape_vec((batch, width), flat)
            .map_err(|e| InferenceError::payload(e.to_string()))?;
        Self::new(matrix.into_dyn())
    }

    pub fn batch(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// 2-D view when the tensor is a feature matrix.
    pub fn as_matrix(&self) -> Option<ArrayView2<'_, f32>> {
        self.data.view().into_dimensionality::<Ix2>().ok()
    }

    /// Row-major copy of the values.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }
}

/// Untouched backend output, always `[batch, outputs]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutput {
    pub kind: ModelKind,
    pub values: Array2<f64>,
}

impl RawOutput {
    pub fn new(kind: ModelKind, values: Array2<f64>) -> Result<Self> {
        if values.is_empty() {
            return Err(InferenceError::Prediction(format!(
                "{} backend returned an empty output",
                kind
            )));
        }
        Ok(Self { kind, values })
    }
}
