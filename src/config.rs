//! Configuration management for the inference adapter

use crate::codec::DEFAULT_IMAGE_SIZE;
use crate::types::OutputFormat;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Model-type profiles keyed by lowercase name
    #[serde(default)]
    pub profiles: HashMap<String, ModelProfile>,
}

/// Model lookup configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Directories searched for a relative model path that does not exist as given
    #[serde(default = "default_search_dirs")]
    pub search_dirs: Vec<String>,
    /// Number of threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

/// Image decoding configuration
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_image_size")]
    pub image_width: u32,
    #[serde(default = "default_image_size")]
    pub image_height: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// What a `--model-type` means: class names, output shape and feature layout
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ModelProfile {
    /// Class names by output index
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub output: OutputFormat,
    /// Feature names, in model input order, for JSON object payloads
    #[serde(default)]
    pub features: Vec<String>,
    /// Label reported instead of an error when inference fails
    #[serde(default)]
    pub fallback_label: Option<String>,
}

fn default_search_dirs() -> Vec<String> {
    vec!["models".to_string(), "scripts".to_string(), ".".to_string()]
}

fn default_onnx_threads() -> usize {
    1
}

fn default_image_size() -> u32 {
    DEFAULT_IMAGE_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn labels(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Profiles available without any configuration file
fn builtin_profiles() -> HashMap<String, ModelProfile> {
    let mut profiles = HashMap::new();
    profiles.insert(
        "soilquality".to_string(),
        ModelProfile {
            labels: labels(&["Poor", "Moderate", "Good"]),
            output: OutputFormat::Generic,
            ..ModelProfile::default()
        },
    );
    profiles.insert(
        "soilprediction".to_string(),
        ModelProfile {
            labels: labels(&["Poor", "Moderate", "Good"]),
            output: OutputFormat::Label,
            ..ModelProfile::default()
        },
    );
    profiles.insert(
        "soilmodel".to_string(),
        ModelProfile {
            labels: labels(&["Good", "Moderate", "Poor"]),
            output: OutputFormat::Label,
            features: labels(&[
                "gas_level",
                "humidity",
                "nitrogen",
                "phosphorus",
                "potassium",
                "temperature",
            ]),
            fallback_label: None,
        },
    );
    profiles.insert(
        "ricevariety".to_string(),
        ModelProfile {
            labels: labels(&["Basmati", "IRRI-6", "Super Kernel", "PK-386", "KS-282"]),
            output: OutputFormat::Classification,
            ..ModelProfile::default()
        },
    );
    profiles
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            search_dirs: default_search_dirs(),
            onnx_threads: default_onnx_threads(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            image_width: DEFAULT_IMAGE_SIZE,
            image_height: DEFAULT_IMAGE_SIZE,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            models: ModelsConfig::default(),
            input: InputConfig::default(),
            logging: LoggingConfig::default(),
            profiles: builtin_profiles(),
        }
    }
}

impl AppConfig {
    /// Configuration file read when none is given explicitly
    pub const DEFAULT_PATH: &'static str = "config/inference.toml";

    /// Environment prefix, e.g. `AGRI_INFERENCE__LOGGING__LEVEL=debug`
    pub const ENV_PREFIX: &'static str = "AGRI_INFERENCE";

    /// Load configuration from `path`, or from the default file if it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::build(File::from(Path::new(Self::DEFAULT_PATH)).required(false)),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        Self::build(File::from(path))
            .with_context(|| format!("Failed to load configuration from {}", path.display()))
    }

    fn build(file: File<config::FileSourceFile, config::FileFormat>) -> Result<Self> {
        let config = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(Self::ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let mut app: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app.merge_builtin_profiles();
        Ok(app)
    }

    /// Lowercase profile names and add built-ins that the file did not override.
    fn merge_builtin_profiles(&mut self) {
        let mut merged: HashMap<String, ModelProfile> = self
            .profiles
            .drain()
            .map(|(name, profile)| (name.to_ascii_lowercase(), profile))
            .collect();
        for (name, profile) in builtin_profiles() {
            merged.entry(name).or_insert(profile);
        }
        self.profiles = merged;
    }

    /// Profile for a `--model-type` name (case-insensitive).
    pub fn profile(&self, model_type: &str) -> Option<&ModelProfile> {
        self.profiles.get(&model_type.to_ascii_lowercase())
    }

    /// Resolve a model path, trying the search directories for relative paths
    /// that do not exist as given.
    pub fn resolve_model_path(&self, path: &Path) -> PathBuf {
        if path.exists() || path.is_absolute() {
            return path.to_path_buf();
        }

        for dir in &self.models.search_dirs {
            let candidate = Path::new(dir).join(path);
            if candidate.is_file() {
                info!(model = %candidate.display(), "Found model in search directory");
                return candidate;
            }
        }
        path.to_path_buf()
    }
}
