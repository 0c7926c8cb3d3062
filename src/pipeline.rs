//! End-to-end request execution: load, decode, transform, predict, normalize

use crate::codec::{DecodeOptions, InputCodec};
use crate::config::AppConfig;
use crate::error::{InferenceError, Result};
use crate::models::inference::{self, ModelCache};
use crate::models::loader::ModelLoader;
use crate::models::normalizer;
use crate::models::transform::Transform;
use crate::types::{InputPayload, PredictionResult};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

/// Everything needed to answer one prediction request
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRequest {
    pub model_path: PathBuf,
    pub scaler_path: Option<PathBuf>,
    pub payload: InputPayload,
    /// Class names by output index
    pub labels: Option<Vec<String>>,
    /// Feature order for JSON object payloads
    pub feature_schema: Option<Vec<String>>,
}

impl PredictionRequest {
    pub fn new(model_path: impl Into<PathBuf>, payload: InputPayload) -> Self {
        Self {
            model_path: model_path.into(),
            scaler_path: None,
            payload,
            labels: None,
            feature_schema: None,
        }
    }

    pub fn with_scaler(mut self, scaler_path: impl Into<PathBuf>) -> Self {
        self.scaler_path = Some(scaler_path.into());
        self
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn with_feature_schema(mut self, features: Vec<String>) -> Self {
        self.feature_schema = Some(features);
        self
    }
}

/// Inference pipeline with a per-process model cache
#[derive(Debug)]
pub struct Pipeline {
    config: AppConfig,
    cache: ModelCache,
}

impl Pipeline {
    pub fn new(config: &AppConfig) -> Self {
        let loader = ModelLoader::with_threads(config.models.onnx_threads);
        Self {
            config: config.clone(),
            cache: ModelCache::new(loader),
        }
    }

    /// Number of models currently held by the cache
    pub fn model_count(&self) -> usize {
        self.cache.len()
    }

    /// Run one request. The first failing stage ends the request.
    pub fn run(&self, request: &PredictionRequest) -> Result<PredictionResult> {
        let start = Instant::now();

        let model_path = self.config.resolve_model_path(&request.model_path);
        let handle = self.cache.get_or_load(&model_path)?;

        let transform = request.scaler_path.as_ref().map(Transform::load).transpose()?;

        let codec = InputCodec::new(DecodeOptions {
            image_width: self.config.input.image_width,
            image_height: self.config.input.image_height,
            feature_schema: request.feature_schema.clone(),
        });
        let tensor = codec.decode(&request.payload)?;

        let raw = {
            let mut handle = handle
                .lock()
                .map_err(|e| InferenceError::Prediction(format!("Lock error: {}", e)))?;
            inference::predict(&mut handle, transform.as_ref(), tensor)?
        };

        let result = normalizer::normalize(&raw, request.labels.as_deref());

        info!(
            model = %model_path.display(),
            kind = %result.kind,
            class = ?result.class_name(),
            image = request.payload.is_image(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Prediction complete"
        );

        Ok(result)
    }
}
