use std::path::{Path, PathBuf};

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::store::{read_json, write_json_pretty};

pub const PRESETS_FILE: &str = "presets.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub prompt: String,
}

/// Named prompt snippets kept in `presets.json`, in user order.
#[derive(Debug, Clone)]
pub struct PresetStore {
    path: PathBuf,
    presets: Vec<Preset>,
}

impl PresetStore {
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        match read_json::<Vec<Preset>>(&path)? {
            Some(presets) => Ok(Self { path, presets }),
            None => {
                let store = Self {
                    path,
                    presets: default_presets(),
                };
                store.save()?;
                Ok(store)
            }
        }
    }

    pub fn load_from_dir(config_dir: &Path) -> anyhow::Result<Self> {
        Self::load(config_dir.join(PRESETS_FILE))
    }

    pub fn names(&self) -> Vec<String> {
        self.presets.iter().map(|preset| preset.name.clone()).collect()
    }

    /// Prompt for `name`, or an empty string when no such preset exists.
    pub fn prompt(&self, name: &str) -> &str {
        self.find(name)
            .map(|preset| preset.prompt.as_str())
            .unwrap_or("")
    }

    pub fn add(&mut self, name: &str, prompt: &str) -> anyhow::Result<()> {
        if self.find(name).is_some() {
            bail!("Preset name already exists.");
        }
        self.presets.push(Preset {
            name: name.to_string(),
            prompt: prompt.to_string(),
        });
        self.save()
    }

    pub fn update(&mut self, name: &str, prompt: &str) -> anyhow::Result<()> {
        let Some(preset) = self.presets.iter_mut().find(|preset| preset.name == name) else {
            bail!("Preset not found.");
        };
        preset.prompt = prompt.to_string();
        self.save()
    }

    pub fn rename(&mut self, old_name: &str, new_name: &str) -> anyhow::Result<()> {
        if old_name == new_name {
            return Ok(());
        }
        if self.find(new_name).is_some() {
            bail!("New name already exists.");
        }
        let Some(preset) = self
            .presets
            .iter_mut()
            .find(|preset| preset.name == old_name)
        else {
            bail!("Preset not found.");
        };
        preset.name = new_name.to_string();
        self.save()
    }

    pub fn delete(&mut self, name: &str) -> anyhow::Result<()> {
        let Some(idx) = self.presets.iter().position(|preset| preset.name == name) else {
            bail!("Preset not found.");
        };
        self.presets.remove(idx);
        self.save()
    }

    pub fn save(&self) -> anyhow::Result<()> {
        write_json_pretty(&self.path, &self.presets)
    }

    fn find(&self, name: &str) -> Option<&Preset> {
        self.presets.iter().find(|preset| preset.name == name)
    }
}

fn default_presets() -> Vec<Preset> {
    vec![
        Preset {
            name: "Upscale".to_string(),
            prompt: "Upscale to 4K".to_string(),
        },
        Preset {
            name: "Make Grunge".to_string(),
            prompt: "Generate a grunge noise alpha map, keep it seamlessly tileable".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::PresetStore;

    #[test]
    fn defaults_are_seeded() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = PresetStore::load_from_dir(temp.path())?;
        assert_eq!(store.names(), vec!["Upscale", "Make Grunge"]);
        assert_eq!(store.prompt("Upscale"), "Upscale to 4K");
        assert_eq!(store.prompt("missing"), "");
        Ok(())
    }

    #[test]
    fn rename_rejects_collisions_and_allows_noop() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut store = PresetStore::load_from_dir(temp.path())?;
        store.rename("Upscale", "Upscale")?;
        let err = store
            .rename("Upscale", "Make Grunge")
            .err()
            .map(|err| err.to_string());
        assert_eq!(err.as_deref(), Some("New name already exists."));

        store.rename("Upscale", "Enlarge")?;
        let reloaded = PresetStore::load_from_dir(temp.path())?;
        assert_eq!(reloaded.names(), vec!["Enlarge", "Make Grunge"]);
        Ok(())
    }

    #[test]
    fn add_update_delete() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut store = PresetStore::load_from_dir(temp.path())?;
        store.add("Rust", "rusted steel plate")?;
        assert!(store.add("Rust", "dup").is_err());
        store.update("Rust", "heavily rusted steel plate")?;
        assert_eq!(store.prompt("Rust"), "heavily rusted steel plate");
        store.delete("Rust")?;
        assert!(store.delete("Rust").is_err());
        assert_eq!(store.names().len(), 2);
        Ok(())
    }
}
