use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO Error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Config Parse Error: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Replay file line {line}: {reason}")]
    ReplayParse { line: usize, reason: String },

    #[error("Image Error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Bad image: {0}")]
    BadImage(String),

    #[error("Model expects {expected} features, got {got}")]
    ModelShape { expected: usize, got: usize },

    #[error("Unknown camera: {0}")]
    UnknownCamera(String),

    #[error("Export worker is gone")]
    ExportClosed,

    #[cfg(feature = "opencv")]
    #[error("OpenCV Error: {0}")]
    OpenCvError(#[from] opencv::Error),
}
