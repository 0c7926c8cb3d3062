//! Type definitions shared across the inference pipeline

pub mod payload;
pub mod prediction;
pub mod tensor;

pub use payload::InputPayload;
pub use prediction::{ClassScore, Output, OutputFormat, PredictionResult, RawValue};
pub use tensor::{CanonicalTensor, RawOutput};
