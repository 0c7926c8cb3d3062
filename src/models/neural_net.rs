//! Neural-network backend running ONNX graphs through ONNX Runtime

use crate::error::{InferenceError, Result};
use crate::models::backend::{LoadOptions, ModelBackend, ModelKind};
use crate::types::CanonicalTensor;
use ndarray::Array2;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::fmt;
use std::path::Path;
use std::sync::Once;
use tracing::{debug, info, warn};

const HDF5_MAGIC: &[u8] = b"\x89HDF\r\n\x1a\n";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

static RUNTIME_INIT: Once = Once::new();

/// Set up the process-wide ONNX Runtime environment.
///
/// Only the first call does anything; later loads reuse the environment.
pub fn init_runtime() {
    RUNTIME_INIT.call_once(|| {
        match ort::init().with_name("agri-inference").commit() {
            Ok(_) => info!("ONNX Runtime initialized"),
            Err(e) => warn!(error = %e, "ONNX Runtime environment setup failed"),
        }
    });
}

/// Loaded ONNX session plus the tensor names it is driven through
pub struct NeuralNetBackend {
    session: Session,
    input_name: String,
    output_name: String,
}

impl fmt::Debug for NeuralNetBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NeuralNetBackend")
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .finish_non_exhaustive()
    }
}

fn runtime_error<E: fmt::Display>(path: &Path) -> impl Fn(E) -> InferenceError + '_ {
    move |e| InferenceError::deserialization(path, e)
}

/// Refuse containers ONNX Runtime cannot read, with a useful message.
fn check_container(path: &Path, bytes: &[u8]) -> Result<()> {
    if bytes.starts_with(HDF5_MAGIC) {
        return Err(InferenceError::deserialization(
            path,
            "file is a native Keras HDF5 model; export it to ONNX (for example with tf2onnx) to run it",
        ));
    }
    if bytes.starts_with(ZIP_MAGIC) {
        return Err(InferenceError::deserialization(
            path,
            "file is a zipped Keras v3 archive; export it to ONNX (for example with tf2onnx) to run it",
        ));
    }
    Ok(())
}

/// Reshape a flat output tensor into `[batch, outputs]`.
///
/// Leading dimension is the batch; trailing dimensions are flattened. A 1-D
/// output is a single sample.
pub(crate) fn output_matrix(dims: &[i64], data: &[f32]) -> Result<Array2<f64>> {
    if data.is_empty() {
        return Err(InferenceError::Prediction(
            "model produced an empty output tensor".to_string(),
        ));
    }
    let rows = match dims {
        [batch, _, ..] if *batch > 0 => *batch as usize,
        _ => 1,
    };
    if data.len() % rows != 0 {
        return Err(InferenceError::Prediction(format!(
            "output of {} values does not split into {} rows (shape {:?})",
            data.len(),
            rows,
            dims
        )));
    }

    let values: Vec<f64> = data.iter().map(|&v| f64::from(v)).collect();
    Array2::from_shape_vec((rows, data.len() / rows), values)
        .map_err(|e| InferenceError::Prediction(e.to_string()))
}

impl ModelBackend for NeuralNetBackend {
    fn load(path: &Path, bytes: &[u8], options: &LoadOptions) -> Result<Self> {
        check_container(path, bytes)?;
        init_runtime();

        let session = Session::builder()
            .map_err(runtime_error(path))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(runtime_error(path))?
            .with_intra_threads(options.onnx_threads)
            .map_err(runtime_error(path))?
            .commit_from_memory(bytes)
            .map_err(runtime_error(path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| InferenceError::deserialization(path, "graph declares no inputs"))?;

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob") || o.name.contains("output"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .ok_or_else(|| InferenceError::deserialization(path, "graph declares no outputs"))?;

        info!(
            model = %path.display(),
            input = %input_name,
            output = %output_name,
            threads = options.onnx_threads,
            "ONNX session created"
        );

        Ok(Self {
            session,
            input_name,
            output_name,
        })
    }

    fn kind(&self) -> ModelKind {
        ModelKind::NeuralNet
    }

    fn describe(&self) -> String {
        format!(
            "NeuralNet(onnx, input '{}', output '{}')",
            self.input_name, self.output_name
        )
    }

    fn predict(&mut self, input: &CanonicalTensor) -> Result<Array2<f64>> {
        let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let tensor = Tensor::from_array((shape, input.to_vec()))
            .map_err(|e| InferenceError::Prediction(format!("failed to create input tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| InferenceError::Prediction(e.to_string()))?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            InferenceError::Prediction(format!("model produced no '{}' output", self.output_name))
        })?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::Prediction(format!("output is not an f32 tensor: {}", e)))?;
        let dims: Vec<i64> = shape.iter().copied().collect();

        debug!(output = %self.output_name, shape = ?dims, "ONNX inference complete");
        output_matrix(&dims, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::inference;
    use crate::models::loader::ModelLoader;
    use crate::models::normalizer::argmax;
    use crate::testing::{softmax_onnx, write_softmax_model};

    #[test]
    fn test_output_matrix_batches_on_leading_dim() {
        let matrix = output_matrix(&[2, 3], &[0.1, 0.2, 0.7, 0.3, 0.3, 0.4]).unwrap();
        assert_eq!(matrix.dim(), (2, 3));
        assert!((matrix[[1, 2]] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_output_matrix_single_sample_vector() {
        let matrix = output_matrix(&[5], &[0.85, 0.05, 0.04, 0.03, 0.03]).unwrap();
        assert_eq!(matrix.dim(), (1, 5));
    }

    #[test]
    fn test_output_matrix_flattens_trailing_dims() {
        let matrix = output_matrix(&[1, 2, 2], &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(matrix.dim(), (1, 4));
    }

    #[test]
    fn test_output_matrix_rejects_empty() {
        assert!(output_matrix(&[1, 0], &[]).is_err());
    }

    #[test]
    fn test_native_keras_files_rejected_before_runtime() {
        let mut hdf5 = HDF5_MAGIC.to_vec();
        hdf5.extend_from_slice(&[0; 32]);
        let err = NeuralNetBackend::load(Path::new("soil.h5"), &hdf5, &LoadOptions::default())
            .unwrap_err();
        match err {
            InferenceError::Deserialization { reason, .. } => assert!(reason.contains("HDF5")),
            other => panic!("unexpected error {:?}", other),
        }

        let zip = b"PK\x03\x04rest-of-archive".to_vec();
        let err = NeuralNetBackend::load(Path::new("rice.keras"), &zip, &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, InferenceError::Deserialization { .. }));
    }

    #[test]
    fn test_runtime_init_is_idempotent() {
        init_runtime();
        init_runtime();
        assert!(RUNTIME_INIT.is_completed());
    }

    #[test]
    fn test_onnx_model_loads_repeatedly_and_predicts() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_softmax_model(dir.path(), 5);
        let loader = ModelLoader::new();

        let mut first = loader.load_model(&path).unwrap();
        let second = loader.load_model(&path).unwrap();
        assert_eq!(first.kind(), ModelKind::NeuralNet);
        assert_eq!(second.kind(), ModelKind::NeuralNet);
        assert!(first.describe().contains("'probabilities'"));

        let logits = CanonicalTensor::from_rows(vec![vec![1.0, 2.0, 3.0, 0.5, 0.0]]).unwrap();
        let raw = inference::predict(&mut first, None, logits).unwrap();
        assert_eq!(raw.kind, ModelKind::NeuralNet);
        assert_eq!(raw.values.dim(), (1, 5));
        assert!((raw.values.sum() - 1.0).abs() < 1e-5);
        assert_eq!(argmax(raw.values.row(0).iter().copied()), Some(2));
    }

    #[test]
    fn test_onnx_batch_output_keeps_rows() {
        let mut backend =
            NeuralNetBackend::load(Path::new("rice.onnx"), &softmax_onnx(3), &LoadOptions::default())
                .unwrap();
        let batch =
            CanonicalTensor::from_rows(vec![vec![0.0, 0.0, 0.0], vec![5.0, 0.0, 0.0]]).unwrap();

        let output = backend.predict(&batch).unwrap();
        assert_eq!(output.dim(), (2, 3));
        assert!((output[[0, 0]] - 1.0 / 3.0).abs() < 1e-5);
        assert!(output[[1, 0]] > 0.9);
    }

    #[test]
    fn test_onnx_width_mismatch_is_runtime_error() {
        let mut backend =
            NeuralNetBackend::load(Path::new("rice.onnx"), &softmax_onnx(3), &LoadOptions::default())
                .unwrap();
        let narrow = CanonicalTensor::from_rows(vec![vec![1.0, 2.0]]).unwrap();

        assert!(matches!(backend.predict(&narrow), Err(InferenceError::Prediction(_))));
    }
}
