use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Output tier requested from the provider. Square aspect is implied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[default]
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneK => "1K",
            Self::TwoK => "2K",
            Self::FourK => "4K",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "1K" => Ok(Self::OneK),
            "2K" => Ok(Self::TwoK),
            "4K" => Ok(Self::FourK),
            other => Err(format!("unsupported resolution '{other}' (expected 1K, 2K or 4K)")),
        }
    }
}

/// One user-initiated generation attempt. Built fresh per action and never
/// mutated once handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub provider_name: String,
    pub resolution: Resolution,
    pub search_web: bool,
    pub debug_mode: bool,
    pub input_image_path: Option<PathBuf>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, provider_name: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            provider_name: provider_name.into(),
            resolution: Resolution::default(),
            search_web: false,
            debug_mode: false,
            input_image_path: None,
        }
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_search_web(mut self, enabled: bool) -> Self {
        self.search_web = enabled;
        self
    }

    pub fn with_debug_mode(mut self, enabled: bool) -> Self {
        self.debug_mode = enabled;
        self
    }

    pub fn with_input_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_image_path = Some(path.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{GenerationRequest, Resolution};

    #[test]
    fn resolution_parses_case_insensitively() {
        assert_eq!("2k".parse::<Resolution>(), Ok(Resolution::TwoK));
        assert_eq!(" 4K ".parse::<Resolution>(), Ok(Resolution::FourK));
        assert!("8K".parse::<Resolution>().is_err());
    }

    #[test]
    fn resolution_serializes_as_tier_label() -> anyhow::Result<()> {
        assert_eq!(serde_json::to_string(&Resolution::TwoK)?, "\"2K\"");
        let parsed: Resolution = serde_json::from_str("\"4K\"")?;
        assert_eq!(parsed, Resolution::FourK);
        Ok(())
    }

    #[test]
    fn request_defaults_to_1k_without_extras() {
        let request = GenerationRequest::new("bricks", "Yunwu Gemini");
        assert_eq!(request.resolution, Resolution::OneK);
        assert!(!request.search_web);
        assert!(!request.debug_mode);
        assert!(request.input_image_path.is_none());
    }
}
