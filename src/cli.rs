//! Command-line arguments for the `agri-infer` binary

use crate::config::AppConfig;
use crate::error::{InferenceError, Result};
use crate::pipeline::{Pipeline, PredictionRequest};
use crate::types::{InputPayload, Output, OutputFormat};
use clap::error::ErrorKind;
use clap::{ArgGroup, Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, warn};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file (default: config/inference.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run one prediction and print the result as JSON
    Predict(PredictArgs),
    /// Check that a model file loads
    Verify {
        /// Model file (.pkl, .onnx, .h5, .keras)
        model_path: PathBuf,
    },
}

#[derive(ClapArgs, Debug, Clone)]
#[command(group(
    ArgGroup::new("input")
        .required(true)
        .multiple(false)
        .args(["image_path", "image_base64", "input_data", "data_file", "values"])
))]
pub struct PredictArgs {
    /// Model file
    #[arg(long)]
    pub model_path: PathBuf,

    /// Pickled scaler applied to features before prediction
    #[arg(long)]
    pub scaler_path: Option<PathBuf>,

    /// Profile name, e.g. soilQuality, soilModel, riceVariety
    #[arg(long)]
    pub model_type: Option<String>,

    /// Image file to classify
    #[arg(long)]
    pub image_path: Option<PathBuf>,

    /// Base64 image, optionally as a data URL
    #[arg(long)]
    pub image_base64: Option<String>,

    /// JSON array or object of features
    #[arg(long)]
    pub input_data: Option<String>,

    /// File holding the JSON features
    #[arg(long)]
    pub data_file: Option<PathBuf>,

    /// Feature values in model order
    #[arg(allow_negative_numbers = true)]
    pub values: Vec<f32>,

    /// Output shape (default: the profile's, else generic)
    #[arg(long, value_enum)]
    pub output: Option<OutputFormat>,

    /// Label printed, along with the error, when the prediction fails
    #[arg(long)]
    pub default_on_failure: Option<String>,
}

impl PredictArgs {
    /// The selected input, tagged by the flag that supplied it.
    pub fn payload(&self) -> Result<InputPayload> {
        if let Some(path) = &self.image_path {
            return Ok(InputPayload::ImagePath(path.clone()));
        }
        if let Some(data) = &self.image_base64 {
            return Ok(InputPayload::ImageBase64(data.clone()));
        }
        if let Some(json) = &self.input_data {
            return Ok(InputPayload::Features(json.clone()));
        }
        if let Some(path) = &self.data_file {
            let json = std::fs::read_to_string(path).map_err(|e| {
                InferenceError::payload(format!("cannot read data file {}: {}", path.display(), e))
            })?;
            return Ok(InputPayload::Features(json));
        }
        if !self.values.is_empty() {
            return Ok(InputPayload::Values(self.values.clone()));
        }
        Err(InferenceError::payload("no input given"))
    }

    /// Apply the selected profile and the flags that override it.
    ///
    /// Output shape: `--output`, then the profile's, then generic. Fallback
    /// label: `--default-on-failure`, then the profile's. An unknown model
    /// type contributes nothing.
    pub fn resolve(&self, config: &AppConfig) -> PredictPlan {
        let profile = self.model_type.as_deref().and_then(|name| {
            let profile = config.profile(name);
            if profile.is_none() {
                warn!(model_type = %name, "Unknown model type, using generic output");
            }
            profile
        });

        let format = self
            .output
            .or_else(|| profile.map(|p| p.output))
            .unwrap_or(OutputFormat::Generic);
        let fallback = self
            .default_on_failure
            .clone()
            .or_else(|| profile.and_then(|p| p.fallback_label.clone()));

        let request = self.payload().map(|payload| {
            let mut request = PredictionRequest::new(&self.model_path, payload);
            request.scaler_path = self.scaler_path.clone();
            if let Some(profile) = profile {
                if !profile.labels.is_empty() {
                    request.labels = Some(profile.labels.clone());
                }
                if !profile.features.is_empty() {
                    request.feature_schema = Some(profile.features.clone());
                }
            }
            request
        });

        PredictPlan {
            format,
            fallback,
            request,
        }
    }
}

/// A `predict` invocation with its profile applied
#[derive(Debug)]
pub struct PredictPlan {
    pub format: OutputFormat,
    pub fallback: Option<String>,
    /// Fails when the input flag could not be turned into a payload
    pub request: Result<PredictionRequest>,
}

impl PredictPlan {
    /// Run the request and pick the line to print.
    ///
    /// The flag is `true` when the process should exit 0: on success, or on
    /// failure when a fallback label is configured.
    pub fn execute(self, pipeline: &Pipeline) -> (Output, bool) {
        let err = match self.request.and_then(|request| pipeline.run(&request)) {
            Ok(result) => return (result.to_output(self.format), true),
            Err(e) => e,
        };

        error!(error = %err, "Prediction failed");
        match self.fallback {
            Some(prediction) => {
                warn!(prediction = %prediction, "Reporting default prediction");
                let output = Output::Fallback {
                    prediction,
                    error: err.to_string(),
                };
                (output, true)
            }
            None => (Output::error(err.to_string()), false),
        }
    }
}

/// Message for a failed parse: clap's error text without the usage block.
pub fn parse_error_message(err: &clap::Error) -> String {
    if err.kind() == ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand {
        return "a subcommand is required; run with --help for usage".to_string();
    }

    let rendered = err.to_string();
    let message = rendered
        .lines()
        .take_while(|line| !line.starts_with("Usage:"))
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    match message.trim_start_matches("error: ") {
        "" => "invalid arguments".to_string(),
        message => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::write_soil_model;
    use serde_json::json;

    const SOIL_READING: &str = "[500, 65, 45, 15, 150, 28]";

    fn predict(args: &[&str]) -> PredictArgs {
        let mut argv = vec!["agri-infer", "predict", "--model-path", "model.pkl"];
        argv.extend_from_slice(args);
        match Args::try_parse_from(argv).unwrap().command {
            Command::Predict(args) => args,
            other => panic!("expected predict, got {:?}", other),
        }
    }

    #[test]
    fn test_positional_values() {
        let args = predict(&["500", "65", "-4.5"]);
        assert_eq!(
            args.payload().unwrap(),
            InputPayload::Values(vec![500.0, 65.0, -4.5])
        );
        assert_eq!(args.output, None);
    }

    #[test]
    fn test_input_flags_select_variant() {
        let args = predict(&["--input-data", "[1, 2]", "--output", "label"]);
        assert_eq!(args.payload().unwrap(), InputPayload::Features("[1, 2]".to_string()));
        assert_eq!(args.output, Some(OutputFormat::Label));

        let args = predict(&["--image-base64", "AAAA", "--model-type", "riceVariety"]);
        assert_eq!(args.payload().unwrap(), InputPayload::ImageBase64("AAAA".to_string()));
        assert_eq!(args.model_type.as_deref(), Some("riceVariety"));

        let args = predict(&["--image-path", "rice.jpg"]);
        assert_eq!(args.payload().unwrap(), InputPayload::ImagePath("rice.jpg".into()));
    }

    #[test]
    fn test_data_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reading.json");
        std::fs::write(&path, "[500, 65, 45, 15, 150, 28]").unwrap();

        let args = predict(&["--data-file", path.to_str().unwrap()]);
        assert_eq!(
            args.payload().unwrap(),
            InputPayload::Features("[500, 65, 45, 15, 150, 28]".to_string())
        );

        let missing = predict(&["--data-file", "/nonexistent/reading.json"]);
        assert!(matches!(missing.payload(), Err(InferenceError::InvalidPayload(_))));
    }

    #[test]
    fn test_exactly_one_input_required() {
        let base = ["agri-infer", "predict", "--model-path", "model.pkl"];
        assert!(Args::try_parse_from(base).is_err());

        let mut both = base.to_vec();
        both.extend(["--input-data", "[1]", "--image-path", "x.png"]);
        assert!(Args::try_parse_from(both).is_err());
    }

    #[test]
    fn test_verify_and_global_config() {
        let args =
            Args::try_parse_from(["agri-infer", "verify", "model.onnx", "--config", "c.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("c.toml")));
        assert!(matches!(args.command, Command::Verify { ref model_path } if model_path == &PathBuf::from("model.onnx")));
    }

    #[test]
    fn test_explicit_output_beats_profile() {
        let config = AppConfig::default();

        let plan = predict(&["--model-type", "soilModel", "--input-data", SOIL_READING]).resolve(&config);
        assert_eq!(plan.format, OutputFormat::Label);

        let plan = predict(&[
            "--model-type", "soilModel", "--output", "generic", "--input-data", SOIL_READING,
        ])
        .resolve(&config);
        assert_eq!(plan.format, OutputFormat::Generic);
        let request = plan.request.unwrap();
        assert_eq!(request.labels.unwrap(), vec!["Good", "Moderate", "Poor"]);
        assert_eq!(request.feature_schema.unwrap().len(), 6);
    }

    #[test]
    fn test_unknown_model_type_is_generic_without_labels() {
        let plan = predict(&["--model-type", "cropYield", "--input-data", SOIL_READING])
            .resolve(&AppConfig::default());

        assert_eq!(plan.format, OutputFormat::Generic);
        assert_eq!(plan.fallback, None);
        let request = plan.request.unwrap();
        assert_eq!(request.labels, None);
        assert_eq!(request.feature_schema, None);
    }

    #[test]
    fn test_soil_model_prints_label() {
        let dir = tempfile::tempdir().unwrap();
        let model = write_soil_model(dir.path());
        let config = AppConfig::default();
        let argv = [
            "agri-infer", "predict", "--model-path", model.to_str().unwrap(),
            "--model-type", "soilModel", "--input-data", SOIL_READING,
        ];
        let Command::Predict(args) = Args::try_parse_from(argv).unwrap().command else {
            panic!("expected predict");
        };

        let (output, ok) = args.resolve(&config).execute(&Pipeline::new(&config));
        assert!(ok);
        assert_eq!(serde_json::to_value(output).unwrap(), json!({"prediction": "Moderate"}));
    }

    #[test]
    fn test_failure_uses_fallback_only_when_configured() {
        let mut config = AppConfig::default();
        let pipeline = Pipeline::new(&config);

        let (output, ok) = predict(&["--input-data", SOIL_READING]).resolve(&config).execute(&pipeline);
        assert!(!ok);
        assert_eq!(
            serde_json::to_value(output).unwrap(),
            json!({"error": "Model file not found: model.pkl"})
        );

        let (output, ok) = predict(&["--input-data", SOIL_READING, "--default-on-failure", "Moderate"])
            .resolve(&config)
            .execute(&pipeline);
        assert!(ok);
        assert_eq!(
            serde_json::to_value(output).unwrap(),
            json!({"prediction": "Moderate", "error": "Model file not found: model.pkl"})
        );

        config
            .profiles
            .get_mut("soilmodel")
            .unwrap()
            .fallback_label = Some("Good".to_string());
        let (output, ok) = predict(&["--model-type", "soilModel", "--input-data", SOIL_READING])
            .resolve(&config)
            .execute(&pipeline);
        assert!(ok);
        assert!(matches!(output, Output::Fallback { ref prediction, .. } if prediction == "Good"));
    }

    #[test]
    fn test_unreadable_data_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::default();
        let missing = dir.path().join("reading.json");

        let plan = predict(&["--data-file", missing.to_str().unwrap()]).resolve(&config);
        assert!(matches!(plan.request, Err(InferenceError::InvalidPayload(_))));
        let (output, ok) = plan.execute(&Pipeline::new(&config));
        assert!(!ok);
        assert!(matches!(output, Output::Error { .. }));
    }

    #[test]
    fn test_parse_error_names_missing_argument() {
        let err = Args::try_parse_from(["agri-infer", "predict", "--input-data", "[1]"]).unwrap_err();
        let message = parse_error_message(&err);
        assert!(message.contains("--model-path"), "{}", message);
        assert!(!message.contains("Usage:"));
        assert!(!message.starts_with("error:"));
    }

    #[test]
    fn test_no_arguments_is_an_error_message() {
        let err = Args::try_parse_from(["agri-infer"]).unwrap_err();
        assert!(parse_error_message(&err).contains("subcommand"));
    }
}
