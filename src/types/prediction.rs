//! Normalized prediction results and the JSON shapes they are emitted as

use crate::models::backend::ModelKind;
use serde::{Deserialize, Serialize};

/// Backend output flattened to the smallest natural JSON shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawValue {
    Scalar(f64),
    Vector(Vec<f64>),
    Matrix(Vec<Vec<f64>>),
}

/// One entry of a class distribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassScore {
    pub name: String,
    pub score: f64,
}

/// Result of a single inference call. Built once by the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub kind: ModelKind,
    pub raw: RawValue,
    /// Argmax of the (first) class distribution, if the output had one
    pub class_index: Option<usize>,
    pub label: Option<String>,
    pub confidence: Option<f64>,
    /// Class scores in descending order
    pub all_predictions: Option<Vec<ClassScore>>,
}

/// JSON shape written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `{"variety", "confidence", "all_predictions"}`
    Classification,
    /// `{"prediction", "class"}`
    #[default]
    Generic,
    /// `{"prediction": "<label>"}`
    Label,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarietyScore {
    pub variety: String,
    pub confidence: f64,
}

/// Everything the binary can print, one JSON object per run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Output {
    Classification {
        variety: String,
        confidence: f64,
        all_predictions: Vec<VarietyScore>,
    },
    Generic {
        prediction: RawValue,
        #[serde(skip_serializing_if = "Option::is_none")]
        class: Option<String>,
    },
    Label {
        prediction: String,
    },
    /// Opt-in default label reported together with the real failure
    Fallback {
        prediction: String,
        error: String,
    },
    Error {
        error: String,
    },
}

impl PredictionResult {
    /// Name of the predicted class: the label, else the class index.
    pub fn class_name(&self) -> Option<String> {
        self.label
            .clone()
            .or_else(|| self.class_index.map(|idx| idx.to_string()))
    }

    /// Render in the requested shape.
    ///
    /// Outputs without a class distribution cannot be shown as a
    /// classification or a bare label and fall back to the generic shape.
    pub fn to_output(&self, format: OutputFormat) -> Output {
        match format {
            OutputFormat::Classification => {
                if let (Some(variety), Some(confidence), Some(all)) =
                    (self.class_name(), self.confidence, &self.all_predictions)
                {
                    return Output::Classification {
                        variety,
                        confidence,
                        all_predictions: all
                            .iter()
                            .map(|c| VarietyScore {
                                variety: c.name.clone(),
                                confidence: c.score,
                            })
                            .collect(),
                    };
                }
            }
            OutputFormat::Label => {
                if let Some(prediction) = self.label.clone() {
                    return Output::Label { prediction };
                }
            }
            OutputFormat::Generic => {}
        }

        Output::Generic {
            prediction: self.raw.clone(),
            class: self.label.clone(),
        }
    }
}

impl Output {
    pub fn error(message: impl Into<String>) -> Self {
        Output::Error {
            error: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        // No map keys and no custom serializers; non-finite floats become null.
        serde_json::to_string(self).unwrap_or_else(|e| format!(r#"{{"error":"{}"}}"#, e))
    }
}
