//! Data model and on-disk stores shared by the SD Banana engine and CLI.

pub mod events;
pub mod presets;
pub mod providers;
pub mod request;
pub mod settings;
mod store;

pub use providers::{ConnectionProfile, ProviderDialect, ProviderRegistry};
pub use request::{GenerationRequest, Resolution};

use std::path::PathBuf;

/// Environment override for the directory holding `providers.json`,
/// `settings.json` and `presets.json`.
pub const CONFIG_DIR_ENV: &str = "SD_BANANA_CONFIG_DIR";

/// Environment override for the generated-image output directory.
pub const OUTPUT_DIR_ENV: &str = "SD_BANANA_OUTPUT_DIR";

pub fn default_config_dir() -> PathBuf {
    non_empty_env(CONFIG_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("sd-banana")
        })
}

pub fn default_output_dir() -> PathBuf {
    non_empty_env(OUTPUT_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("SD_Banana")
        })
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
