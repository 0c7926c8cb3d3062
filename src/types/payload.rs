//! Input payloads accepted by the codec

use std::fmt;
use std::path::PathBuf;

/// One request input, tagged by how the caller supplied it.
///
/// The variant is chosen by the caller (one CLI flag per variant), so a string
/// that happens to be both a readable path and valid base64 is never guessed.
#[derive(Debug, Clone, PartialEq)]
pub enum InputPayload {
    /// JSON text: a numeric array, a 2-D numeric array, or an object of named
    /// features.
    Features(String),
    /// Already-parsed numbers, e.g. positional CLI arguments.
    Values(Vec<f32>),
    /// Base64 image bytes, optionally behind a `data:...;base64,` prefix.
    ImageBase64(String),
    /// Image file on disk.
    ImagePath(PathBuf),
}

impl InputPayload {
    pub fn is_image(&self) -> bool {
        matches!(self, Self::ImageBase64(_) | Self::ImagePath(_))
    }
}

impl fmt::Display for InputPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Features(json) => write!(f, "features({} bytes)", json.len()),
            Self::Values(values) => write!(f, "values({})", values.len()),
            Self::ImageBase64(data) => write!(f, "image-base64({} chars)", data.len()),
            Self::ImagePath(path) => write!(f, "image-path({})", path.display()),
        }
    }
}
