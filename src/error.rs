//! Error taxonomy for every inference stage

use std::path::PathBuf;

/// Errors raised by the load → decode → transform → predict chain.
///
/// Each variant maps to one stage. The binary turns any of them into a single
/// `{"error": ...}` line, so the display strings are user-facing.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("{what} file not found: {}", path.display())]
    FileNotFound { what: &'static str, path: PathBuf },

    #[error("Unsupported model format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to deserialize {}: {reason}", path.display())]
    Deserialization { path: PathBuf, reason: String },

    #[error("invalid input payload: {0}")]
    InvalidPayload(String),

    #[error("transform failed: {0}")]
    Transform(String),

    #[error("prediction failed: {0}")]
    Prediction(String),
}

impl InferenceError {
    pub(crate) fn model_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound {
            what: "Model",
            path: path.into(),
        }
    }

    pub(crate) fn scaler_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound {
            what: "Scaler",
            path: path.into(),
        }
    }

    pub(crate) fn deserialization(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Deserialization {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn payload(reason: impl Into<String>) -> Self {
        Self::InvalidPayload(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, InferenceError>;
