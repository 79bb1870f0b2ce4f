use std::path::{Path, PathBuf};

use anyhow::bail;

use super::ConnectionProfile;
use crate::store::{read_json, write_json_pretty};

pub const PROVIDERS_FILE: &str = "providers.json";

/// Named connection profiles, optionally backed by `providers.json`.
///
/// Profiles keep insertion order; lookups are by exact name.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    path: Option<PathBuf>,
    profiles: Vec<ConnectionProfile>,
}

impl ProviderRegistry {
    /// Registry that never touches disk.
    pub fn new(profiles: Vec<ConnectionProfile>) -> Self {
        Self {
            path: None,
            profiles,
        }
    }

    /// Loads `path`, seeding and saving the default profiles when it does not exist yet.
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        match read_json::<Vec<ConnectionProfile>>(&path)? {
            Some(profiles) => Ok(Self {
                path: Some(path),
                profiles,
            }),
            None => {
                let registry = Self {
                    path: Some(path),
                    profiles: default_profiles(),
                };
                registry.save()?;
                Ok(registry)
            }
        }
    }

    pub fn load_from_dir(config_dir: &Path) -> anyhow::Result<Self> {
        Self::load(config_dir.join(PROVIDERS_FILE))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn resolve(&self, name: &str) -> Option<&ConnectionProfile> {
        self.profiles.iter().find(|profile| profile.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.profiles
            .iter()
            .map(|profile| profile.name.clone())
            .collect()
    }

    pub fn profiles(&self) -> &[ConnectionProfile] {
        self.profiles.as_slice()
    }

    pub fn add(&mut self, profile: ConnectionProfile) -> anyhow::Result<()> {
        if self.resolve(&profile.name).is_some() {
            bail!("Provider name already exists.");
        }
        self.profiles.push(profile);
        self.save()
    }

    pub fn update(
        &mut self,
        name: &str,
        api_key: &str,
        base_url: &str,
        model: &str,
    ) -> anyhow::Result<()> {
        let Some(profile) = self.profiles.iter_mut().find(|profile| profile.name == name) else {
            bail!("Provider not found.");
        };
        profile.api_key = api_key.to_string();
        profile.base_url = base_url.to_string();
        profile.model = model.to_string();
        self.save()
    }

    pub fn delete(&mut self, name: &str) -> anyhow::Result<()> {
        let Some(idx) = self.profiles.iter().position(|profile| profile.name == name) else {
            bail!("Provider not found.");
        };
        self.profiles.remove(idx);
        self.save()
    }

    pub fn save(&self) -> anyhow::Result<()> {
        match &self.path {
            Some(path) => write_json_pretty(path, &self.profiles),
            None => Ok(()),
        }
    }
}

fn default_profiles() -> Vec<ConnectionProfile> {
    vec![
        ConnectionProfile::new(
            "Yunwu Gemini",
            "",
            "https://yunwu.zeabur.app/v1beta",
            "gemini-3-pro-image-preview",
        ),
        ConnectionProfile::new(
            "GPTGod NanoBanana Pro",
            "",
            "https://api.gptgod.online/v1/chat/completions",
            "gemini-3-pro-image-preview",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::{ProviderRegistry, PROVIDERS_FILE};
    use crate::providers::{ConnectionProfile, ProviderDialect};

    #[test]
    fn load_seeds_defaults_and_writes_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let registry = ProviderRegistry::load_from_dir(temp.path())?;
        assert_eq!(
            registry.names(),
            vec!["Yunwu Gemini", "GPTGod NanoBanana Pro"]
        );

        let raw = std::fs::read_to_string(temp.path().join(PROVIDERS_FILE))?;
        let parsed: Value = serde_json::from_str(&raw)?;
        assert_eq!(parsed[0]["baseUrl"], "https://yunwu.zeabur.app/v1beta");
        assert_eq!(parsed[1]["model"], "gemini-3-pro-image-preview");
        Ok(())
    }

    #[test]
    fn seeded_defaults_cover_both_dialect_families() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let registry = ProviderRegistry::load_from_dir(temp.path())?;
        let dialects: Vec<ProviderDialect> = registry
            .profiles()
            .iter()
            .map(|profile| ProviderDialect::classify(&profile.name, &profile.base_url))
            .collect();
        assert_eq!(
            dialects,
            vec![ProviderDialect::Gemini, ProviderDialect::GptGod]
        );
        Ok(())
    }

    #[test]
    fn add_update_delete_round_trip_through_disk() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut registry = ProviderRegistry::load_from_dir(temp.path())?;
        registry.add(ConnectionProfile::new(
            "OpenRouter",
            "sk-or",
            "https://openrouter.ai/api/v1/chat/completions",
            "google/gemini-3-pro-image-preview",
        ))?;
        registry.update("Yunwu Gemini", "yk", "https://yunwu.zeabur.app/v1beta", "m2")?;
        registry.delete("GPTGod NanoBanana Pro")?;

        let reloaded = ProviderRegistry::load_from_dir(temp.path())?;
        assert_eq!(reloaded.names(), vec!["Yunwu Gemini", "OpenRouter"]);
        let yunwu = reloaded.resolve("Yunwu Gemini").cloned().unwrap_or_default();
        assert_eq!(yunwu.api_key, "yk");
        assert_eq!(yunwu.model, "m2");
        Ok(())
    }

    #[test]
    fn duplicate_and_missing_names_are_rejected() {
        let mut registry = ProviderRegistry::new(vec![ConnectionProfile::new("a", "", "", "")]);
        let dup = registry
            .add(ConnectionProfile::new("a", "", "", ""))
            .err()
            .map(|err| err.to_string());
        assert_eq!(dup.as_deref(), Some("Provider name already exists."));

        let missing = registry.delete("b").err().map(|err| err.to_string());
        assert_eq!(missing.as_deref(), Some("Provider not found."));
        let missing = registry
            .update("b", "", "", "")
            .err()
            .map(|err| err.to_string());
        assert_eq!(missing.as_deref(), Some("Provider not found."));
    }

    #[test]
    fn resolve_is_exact_match() {
        let registry = ProviderRegistry::new(vec![ConnectionProfile::new("Yunwu Gemini", "", "", "")]);
        assert!(registry.resolve("Yunwu Gemini").is_some());
        assert!(registry.resolve("yunwu gemini").is_none());
    }

    #[test]
    fn corrupt_file_is_reported_not_overwritten() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join(PROVIDERS_FILE);
        std::fs::write(&path, "[{")?;
        assert!(ProviderRegistry::load(&path).is_err());
        assert_eq!(std::fs::read_to_string(&path)?, "[{");
        Ok(())
    }
}
