//! Backend abstraction and the extension → backend lookup table

use crate::error::{InferenceError, Result};
use crate::models::neural_net::NeuralNetBackend;
use crate::models::tree_ensemble::TreeEnsembleBackend;
use crate::types::CanonicalTensor;
use ndarray::Array2;
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// Which backend owns a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    TreeEnsemble,
    NeuralNet,
    Unknown,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelKind::TreeEnsemble => "tree_ensemble",
            ModelKind::NeuralNet => "neural_net",
            ModelKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Supported file extensions, lowercase, without the dot.
pub const FORMATS: &[(&str, ModelKind)] = &[
    ("pkl", ModelKind::TreeEnsemble),
    ("h5", ModelKind::NeuralNet),
    ("keras", ModelKind::NeuralNet),
    ("onnx", ModelKind::NeuralNet),
];

/// Settings passed through to backend constructors
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Intra-op threads for ONNX Runtime sessions
    pub onnx_threads: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { onnx_threads: 1 }
    }
}

/// A deserialized model that can run predictions.
///
/// `predict` takes `&mut self`: backends are not reentrant, so callers that
/// share a backend must serialize access to it.
pub trait ModelBackend: Send {
    /// Deserialize a model from the raw file contents.
    fn load(path: &Path, bytes: &[u8], options: &LoadOptions) -> Result<Self>
    where
        Self: Sized;

    fn kind(&self) -> ModelKind;

    /// Short human-readable model description
    fn describe(&self) -> String;

    /// Run the model, producing `[batch, outputs]`.
    fn predict(&mut self, input: &CanonicalTensor) -> Result<Array2<f64>>;
}

impl ModelKind {
    /// Look up the backend for an extension (case-insensitive).
    pub fn from_extension(extension: &str) -> Self {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        FORMATS
            .iter()
            .find(|(ext, _)| *ext == extension)
            .map(|(_, kind)| *kind)
            .unwrap_or(ModelKind::Unknown)
    }

    pub fn for_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(ModelKind::Unknown)
    }

    /// Construct this kind's backend from file contents.
    pub(crate) fn open(
        self,
        path: &Path,
        bytes: &[u8],
        options: &LoadOptions,
    ) -> Result<Box<dyn ModelBackend>> {
        match self {
            ModelKind::TreeEnsemble => Ok(Box::new(TreeEnsembleBackend::load(path, bytes, options)?)),
            ModelKind::NeuralNet => Ok(Box::new(NeuralNetBackend::load(path, bytes, options)?)),
            ModelKind::Unknown => Err(InferenceError::UnsupportedFormat(extension_label(path))),
        }
    }
}

/// `.ext` as written in the path, for error messages.
pub(crate) fn extension_label(path: &Path) -> String {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) => format!(".{}", ext.to_ascii_lowercase()),
        None => "<none>".to_string(),
    }
}
