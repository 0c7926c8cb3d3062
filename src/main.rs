//! Agri Inference - Main Entry Point
//!
//! Loads a serialized model, decodes one input, runs the prediction and prints
//! exactly one JSON object on stdout. Logs go to stderr.

use agri_inference::{
    cli::{parse_error_message, Args, Command, PredictArgs},
    config::{AppConfig, LoggingConfig},
    models::loader::ModelLoader,
    pipeline::Pipeline,
    types::Output,
};
use anyhow::{anyhow, Result};
use clap::{error::ErrorKind, Parser};
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
            _ => {
                println!("{}", Output::error(parse_error_message(&e)).to_json());
                return ExitCode::FAILURE;
            }
        },
    };

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            println!("{}", Output::error(format!("{:#}", e)).to_json());
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let config = AppConfig::load(args.config.as_deref())?;
    init_logging(&config.logging)?;
    debug!(profiles = config.profiles.len(), "Configuration loaded");

    match args.command {
        Command::Predict(predict) => Ok(run_predict(&config, &predict)),
        Command::Verify { model_path } => run_verify(&config, &model_path),
    }
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level))
        .add_directive("ort=warn".parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format.as_str() {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    }
    .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

fn run_predict(config: &AppConfig, args: &PredictArgs) -> ExitCode {
    let pipeline = Pipeline::new(config);
    let (output, ok) = args.resolve(config).execute(&pipeline);
    println!("{}", output.to_json());

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run_verify(config: &AppConfig, model_path: &Path) -> Result<ExitCode> {
    let path = config.resolve_model_path(model_path);
    let report = ModelLoader::with_threads(config.models.onnx_threads).verify(&path);
    println!("{}", serde_json::to_string(&report)?);

    if report.success {
        info!(model = %path.display(), "Model verified");
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
