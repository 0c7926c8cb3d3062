//! Agri Inference Library
//!
//! Format-agnostic model inference: load a serialized tree ensemble or neural
//! network, decode feature or image input into a tensor, predict, and
//! normalize the output into one JSON-ready result.

pub mod cli;
pub mod codec;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod types;

#[cfg(test)]
mod testing;

pub use codec::InputCodec;
pub use config::AppConfig;
pub use error::{InferenceError, Result};
pub use models::loader::{ModelHandle, ModelLoader};
pub use pipeline::{Pipeline, PredictionRequest};
pub use types::{InputPayload, Output, OutputFormat, PredictionResult};
