//! Prediction dispatch and the per-process model handle cache

use crate::error::{InferenceError, Result};
use crate::models::loader::{ModelHandle, ModelLoader};
use crate::models::transform::Transform;
use crate::types::{CanonicalTensor, RawOutput};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error};

/// Run one prediction: optional scaling, then the handle's backend.
///
/// Failures are reported once; nothing is retried here.
pub fn predict(
    handle: &mut ModelHandle,
    transform: Option<&Transform>,
    tensor: CanonicalTensor,
) -> Result<RawOutput> {
    let input = match transform {
        Some(transform) => transform.apply(&tensor)?,
        None => tensor,
    };

    let kind = handle.kind();
    let start = Instant::now();
    let values = handle.backend_mut().predict(&input).map_err(|e| {
        error!(model = %handle.path().display(), kind = %kind, error = %e, "Model inference failed");
        match e {
            InferenceError::Prediction(_) => e,
            other => InferenceError::Prediction(other.to_string()),
        }
    })?;

    debug!(
        kind = %kind,
        input_shape = ?input.shape(),
        output_shape = ?values.dim(),
        elapsed_us = start.elapsed().as_micros() as u64,
        "Inference complete"
    );

    RawOutput::new(kind, values)
}

/// Loaded models keyed by path.
///
/// Each handle sits behind its own mutex so predictions on one model are
/// serialized while different models can run side by side.
#[derive(Debug, Default)]
pub struct ModelCache {
    loader: ModelLoader,
    handles: Mutex<HashMap<PathBuf, Arc<Mutex<ModelHandle>>>>,
}

impl ModelCache {
    pub fn new(loader: ModelLoader) -> Self {
        Self {
            loader,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached handle for `path`, loading it on first use.
    pub fn get_or_load(&self, path: &Path) -> Result<Arc<Mutex<ModelHandle>>> {
        let mut handles = self
            .handles
            .lock()
            .map_err(|e| InferenceError::Prediction(format!("Lock error: {}", e)))?;

        if let Some(handle) = handles.get(path) {
            debug!(model = %path.display(), "Model cache hit");
            return Ok(Arc::clone(handle));
        }

        let handle = Arc::new(Mutex::new(self.loader.load_model(path)?));
        handles.insert(path.to_path_buf(), Arc::clone(&handle));
        Ok(handle)
    }

    pub fn len(&self) -> usize {
        self.handles.lock().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
