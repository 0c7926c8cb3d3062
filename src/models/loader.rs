//! Model loader: extension lookup, existence checks and backend construction

use crate::error::{InferenceError, Result};
use crate::models::backend::{extension_label, LoadOptions, ModelBackend, ModelKind};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A loaded model tagged with its backend kind
pub struct ModelHandle {
    kind: ModelKind,
    path: PathBuf,
    file_size: u64,
    backend: Box<dyn ModelBackend>,
}

impl ModelHandle {
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    pub(crate) fn backend_mut(&mut self) -> &mut dyn ModelBackend {
        self.backend.as_mut()
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("file_size", &self.file_size)
            .field("backend", &self.backend.describe())
            .finish()
    }
}

/// Outcome of `verify`, printed as JSON by the `verify` command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifyReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Loader for models of every supported format
#[derive(Debug, Clone, Default)]
pub struct ModelLoader {
    options: LoadOptions,
}

impl ModelLoader {
    /// Create a loader with default settings (1 ONNX thread)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a loader with the given number of ONNX Runtime threads
    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            options: LoadOptions {
                onnx_threads: onnx_threads.max(1),
            },
        }
    }

    /// Load a single model from file.
    ///
    /// Existence is checked first, then the extension; the file is only read
    /// once a backend has been selected.
    pub fn load_model<P: AsRef<Path>>(&self, path: P) -> Result<ModelHandle> {
        let path = path.as_ref();

        let metadata = std::fs::metadata(path)
            .ok()
            .filter(|m| m.is_file())
            .ok_or_else(|| InferenceError::model_not_found(path))?;

        let kind = ModelKind::for_path(path);
        if kind == ModelKind::Unknown {
            warn!(model = %path.display(), "Unsupported model format");
            return Err(InferenceError::UnsupportedFormat(extension_label(path)));
        }

        info!(model = %path.display(), kind = %kind, bytes = metadata.len(), "Loading model");

        let bytes = std::fs::read(path).map_err(|e| InferenceError::deserialization(path, e))?;
        let backend = kind.open(path, &bytes, &self.options)?;

        info!(model = %path.display(), backend = %backend.describe(), "Model loaded successfully");

        Ok(ModelHandle {
            kind,
            path: path.to_path_buf(),
            file_size: metadata.len(),
            backend,
        })
    }

    /// Load a model only to report whether it is usable.
    pub fn verify<P: AsRef<Path>>(&self, path: P) -> VerifyReport {
        match self.load_model(path) {
            Ok(handle) => VerifyReport {
                success: true,
                model_type: Some(handle.describe()),
                file_size: Some(handle.file_size()),
                message: Some("Model verified successfully".to_string()),
                error: None,
            },
            Err(e) => VerifyReport {
                success: false,
                model_type: None,
                file_size: None,
                message: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{write_pickle, write_soil_model};

    #[test]
    fn test_missing_model_is_file_not_found() {
        let err = ModelLoader::new().load_model("/nonexistent.pkl").unwrap_err();
        assert!(matches!(err, InferenceError::FileNotFound { what: "Model", .. }));
        assert_eq!(err.to_string(), "Model file not found: /nonexistent.pkl");
    }

    #[test]
    fn test_directory_is_not_a_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folder.pkl");
        std::fs::create_dir(&path).unwrap();

        let err = ModelLoader::new().load_model(&path).unwrap_err();
        assert!(matches!(err, InferenceError::FileNotFound { .. }));
    }

    #[test]
    fn test_unsupported_extension_is_not_deserialized() {
        let dir = tempfile::tempdir().unwrap();
        // valid tree ensemble bytes under the wrong extension
        let path = write_pickle(dir.path(), "model.joblib", &crate::testing::soil_classifier());

        let err = ModelLoader::new().load_model(&path).unwrap_err();
        match err {
            InferenceError::UnsupportedFormat(ext) => assert_eq!(ext, ".joblib"),
            other => panic!("expected UnsupportedFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_loads_tree_ensemble() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_soil_model(dir.path());

        let handle = ModelLoader::new().load_model(&path).unwrap();
        assert_eq!(handle.kind(), ModelKind::TreeEnsemble);
        assert_eq!(handle.path(), path.as_path());
        assert!(handle.file_size() > 0);
    }

    #[test]
    fn test_corrupt_pickle_is_deserialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pkl");
        std::fs::write(&path, b"\x80\x04garbage").unwrap();

        let err = ModelLoader::new().load_model(&path).unwrap_err();
        assert!(matches!(err, InferenceError::Deserialization { .. }));
    }

    #[test]
    fn test_keras_hdf5_is_deserialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soil_model.h5");
        std::fs::write(&path, b"\x89HDF\r\n\x1a\n\0\0\0\0").unwrap();

        let err = ModelLoader::new().load_model(&path).unwrap_err();
        assert!(matches!(err, InferenceError::Deserialization { .. }));
    }

    #[test]
    fn test_verify_reports_success_and_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_soil_model(dir.path());
        let loader = ModelLoader::new();

        let ok = serde_json::to_value(loader.verify(&path)).unwrap();
        assert_eq!(ok["success"], true);
        assert_eq!(ok["message"], "Model verified successfully");
        assert!(ok["model_type"].as_str().unwrap().starts_with("TreeEnsemble"));
        assert!(ok["file_size"].as_u64().unwrap() > 0);

        let missing = serde_json::to_value(loader.verify(dir.path().join("gone.pkl"))).unwrap();
        assert_eq!(missing["success"], false);
        assert!(missing["error"].as_str().unwrap().contains("not found"));
        assert_eq!(missing.get("model_type"), None);
    }
}
