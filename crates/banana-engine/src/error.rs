//! Failure taxonomy for one generation attempt.
//!
//! Every variant is terminal for its task and nothing here is retried. The
//! `Display` text is what the user sees.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    /// Profile lacks an API key or base URL. Raised before any network I/O.
    #[error("Missing API Key or Base URL.")]
    Configuration,

    #[error("Provider not found.")]
    ProviderNotFound { name: String },

    #[error("Failed to process input image: {}", path.display())]
    InputImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("HTTP Error: {status} - {reason}")]
    HttpStatus { status: u16, reason: String },

    #[error("Invalid JSON response: {0}")]
    InvalidResponse(#[source] serde_json::Error),

    #[error("No image found in response.")]
    Extraction,

    #[error("Failed to save base64 image: {0}")]
    InvalidImageData(#[source] base64::DecodeError),

    #[error("Failed to download image from URL: {message}")]
    Download { url: String, message: String },

    #[error("Failed to write {}: {}", path.display(), source)]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Provider returned an empty image.")]
    EmptyImage,
}

impl GenerationError {
    /// Stable machine-readable tag for ledgers and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration_error",
            Self::ProviderNotFound { .. } => "configuration_error",
            Self::InputImage { .. } => "input_image_error",
            Self::Network(_) => "network_error",
            Self::HttpStatus { .. } => "http_status_error",
            Self::InvalidResponse(_) => "network_error",
            Self::Extraction => "extraction_error",
            Self::InvalidImageData(_) => "extraction_error",
            Self::EmptyImage => "extraction_error",
            Self::Download { .. } => "download_error",
            Self::FileSystem { .. } => "file_system_error",
        }
    }

    pub(crate) fn file_system(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn download(url: &str, message: impl Into<String>) -> Self {
        Self::Download {
            url: url.to_string(),
            message: message.into(),
        }
    }
}
