use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::store::{read_json, write_json_pretty};

pub const SETTINGS_FILE: &str = "settings.json";

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = r#"
# CRITICAL REQUIREMENT: SEAMLESS TILING

All generated textures must be strictly **Seamless Tiling** (continuous 4-way across both U and V axes).
**Seamless Tiling Rules (Non-negotiable):**
- **Eliminate Hotspots:** Avoid distinct "hotspots" or unique, high-contrast details that create visible repetition patterns (gridding effects) when the texture is tiled at large scales (e.g., a 10x10 array).
- **Perfect Edge Matching:** Details flowing off the right edge must match perfectly with the left edge; the same applies to the top and bottom edges.
- **Consistent Structure:** For brick, tile, or pave patterns, grout lines and structural elements must remain mathematically consistent across borders.
---
## Quality Assurance Guidelines (AAA Standard)
**1. Albedo/Base Color De-lighting**
- The Albedo map must contain purely chromatic/diffuse color data.
- It must be completely **delighted**, free of any baked-in shadows, ambient occlusion (AO), or directional lighting information.
**2. Height/Depth Map Logic**
- If an input reference image is provided, generate physically accurate height/depth displacement based on its content.
- The height map must be pure displacement data and **must not** contain any baked Ambient Occlusion (AO) or lighting information.
**3. Visual Hierarchy** The texture must possess distinct levels of detail to ensure it reads well at various distances:
- **Macro:** Large primary shapes and forms.
- **Meso:** Secondary forms, medium details, and edge definition.
- **Micro:** Fine surface texture, pores, and grain.
**4. Visual Storytelling & Wear**
- The material must exhibit realistic wear and tear appropriate to its physical properties, implying a history of use.
- Examples include weathering, scratches, oxidation/rust, structural damage, or sun-fading.
- **Do not** generate "pristine" or brand-new textures unless explicitly requested.
**5. PBR Definition**
- **Metallic Definition:** The metallic map must clearly and binarily distinguish between dielectrics (non-metals, usually black/0.0) and conductors (metals, usually white/1.0).
- **Albedo/basecolor Value Validation (Critical PBR Compliance):** The brightness range of the Albedo map must correspond to the material type defined in the Metallic map:
    - **For Dielectrics (Non-metals):** Albedo brightness must fall within physically accurate darker-to-mid ranges (typically sRGB 30-220). Absolutely avoid pure black (0) or pure white (255).
    - **For Conductors (Metals):** The Albedo represents reflective F0 color and must be bright (typically sRGB 180-255).
- **Roughness:** Nuanced and varied roughness maps are critical for achieving photorealism. Avoid uniform roughness values; incorporate surface imperfections that affect light reflections.
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub debug_mode: bool,
    pub save_generated_images: bool,
    pub selected_provider: Option<String>,
    pub system_instruction: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug_mode: false,
            save_generated_images: false,
            selected_provider: None,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
        }
    }
}

impl Settings {
    /// Instruction to append to prompts, or `None` when the user cleared it.
    pub fn system_instruction(&self) -> Option<&str> {
        let trimmed = self.system_instruction.trim();
        (!trimmed.is_empty()).then_some(self.system_instruction.as_str())
    }
}

/// `settings.json` wrapper. Keys absent on disk keep their defaults.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
}

impl SettingsStore {
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        match read_json::<Settings>(&path)? {
            Some(settings) => Ok(Self { path, settings }),
            None => {
                let store = Self {
                    path,
                    settings: Settings::default(),
                };
                store.save()?;
                Ok(store)
            }
        }
    }

    pub fn load_from_dir(config_dir: &Path) -> anyhow::Result<Self> {
        Self::load(config_dir.join(SETTINGS_FILE))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Applies `change` and persists the result.
    pub fn update(&mut self, change: impl FnOnce(&mut Settings)) -> anyhow::Result<()> {
        change(&mut self.settings);
        self.save()
    }

    pub fn save(&self) -> anyhow::Result<()> {
        write_json_pretty(&self.path, &self.settings)
    }
}
