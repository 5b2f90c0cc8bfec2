use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PresetOption {
    pub id: String,
    pub label: String,
    pub prompt: String,
}

impl PresetOption {
    fn new(id: &str, label: &str, prompt: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            prompt: prompt.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AspectRatio {
    #[default]
    Square,
    Portrait,
    Landscape,
    Classic,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 4] = [
        AspectRatio::Square,
        AspectRatio::Portrait,
        AspectRatio::Landscape,
        AspectRatio::Classic,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Landscape => "16:9",
            AspectRatio::Classic => "4:3",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            AspectRatio::Square => "Square",
            AspectRatio::Portrait => "Portrait",
            AspectRatio::Landscape => "Landscape",
            AspectRatio::Classic => "Classic",
        }
    }

    /// Accepts the ratio token (`9:16`) or the label (`portrait`).
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL.into_iter().find(|ratio| {
            ratio.as_str() == value || ratio.label().eq_ignore_ascii_case(value)
        })
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog list '{0}' must not be empty")]
    EmptyList(&'static str),
    #[error("catalog list '{list}' contains duplicate id '{id}'")]
    DuplicateId { list: &'static str, id: String },
    #[error("catalog list '{0}' contains an entry with an empty id or prompt")]
    BlankEntry(&'static str),
    #[error("catalog list '{list}' id '{id}' is longer than {} bytes", MAX_PRESET_ID_BYTES)]
    IdTooLong { list: &'static str, id: String },
}

/// Preset ids travel in `studio:lighting:<id>` callback data, which Telegram
/// caps at 64 bytes.
pub const MAX_PRESET_ID_BYTES: usize = 48;

/// Immutable preset tables shared by every studio session.
#[derive(Debug, Clone)]
pub struct Catalog {
    poses: Vec<PresetOption>,
    lighting: Vec<PresetOption>,
    skin_textures: Vec<PresetOption>,
    variation_modifiers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    poses: Option<Vec<PresetOption>>,
    #[serde(default)]
    lighting: Option<Vec<PresetOption>>,
    #[serde(default)]
    skin_textures: Option<Vec<PresetOption>>,
    #[serde(default)]
    variation_modifiers: Option<Vec<String>>,
}

fn trim_ids(entries: Vec<PresetOption>) -> Vec<PresetOption> {
    entries
        .into_iter()
        .map(|mut entry| {
            entry.id = entry.id.trim().to_string();
            entry
        })
        .collect()
}

fn validate_list(list: &'static str, entries: &[PresetOption]) -> Result<(), CatalogError> {
    let mut seen = HashSet::new();
    for entry in entries {
        if entry.id.is_empty() || entry.prompt.trim().is_empty() {
            return Err(CatalogError::BlankEntry(list));
        }
        if entry.id.len() > MAX_PRESET_ID_BYTES {
            return Err(CatalogError::IdTooLong {
                list,
                id: entry.id.clone(),
            });
        }
        // Lookups ignore case, so ids must be unique ignoring case too.
        if !seen.insert(entry.id.to_ascii_lowercase()) {
            return Err(CatalogError::DuplicateId {
                list,
                id: entry.id.clone(),
            });
        }
    }
    Ok(())
}

impl Catalog {
    pub fn new(
        poses: Vec<PresetOption>,
        lighting: Vec<PresetOption>,
        skin_textures: Vec<PresetOption>,
        variation_modifiers: Vec<String>,
    ) -> Result<Self, CatalogError> {
        if lighting.is_empty() {
            return Err(CatalogError::EmptyList("lighting"));
        }
        if skin_textures.is_empty() {
            return Err(CatalogError::EmptyList("skin_textures"));
        }
        let poses = trim_ids(poses);
        let lighting = trim_ids(lighting);
        let skin_textures = trim_ids(skin_textures);
        validate_list("poses", &poses)?;
        validate_list("lighting", &lighting)?;
        validate_list("skin_textures", &skin_textures)?;

        let variation_modifiers = variation_modifiers
            .into_iter()
            .map(|modifier| modifier.trim().to_string())
            .filter(|modifier| !modifier.is_empty())
            .collect::<Vec<_>>();
        if variation_modifiers.is_empty() {
            return Err(CatalogError::EmptyList("variation_modifiers"));
        }

        Ok(Self {
            poses,
            lighting,
            skin_textures,
            variation_modifiers,
        })
    }

    pub fn builtin() -> Self {
        Self {
            poses: builtin_poses(),
            lighting: builtin_lighting(),
            skin_textures: builtin_skin_textures(),
            variation_modifiers: BUILTIN_VARIATION_MODIFIERS
                .iter()
                .map(|modifier| modifier.to_string())
                .collect(),
        }
    }

    /// Loads an override file; any list it omits keeps the builtin entries.
    /// A missing or unusable file falls back to [`Catalog::builtin`].
    pub fn load_or_builtin(path: &Path) -> Self {
        if !path.exists() {
            info!("Studio catalog not found at {}, using builtin presets", path.display());
            return Self::builtin();
        }

        let raw = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                info!(
                    "Failed to read studio catalog at {}: {}",
                    path.display(),
                    err
                );
                return Self::builtin();
            }
        };

        match Self::from_json(&raw) {
            Ok(catalog) => {
                info!(
                    "Loaded studio catalog from {} (poses={}, lighting={}, textures={}, modifiers={})",
                    path.display(),
                    catalog.poses.len(),
                    catalog.lighting.len(),
                    catalog.skin_textures.len(),
                    catalog.variation_modifiers.len()
                );
                catalog
            }
            Err(err) => {
                info!(
                    "Ignoring studio catalog at {}: {}",
                    path.display(),
                    err
                );
                Self::builtin()
            }
        }
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let parsed: CatalogFile = serde_json::from_str(raw)?;
        let builtin = Self::builtin();
        let catalog = Self::new(
            parsed.poses.unwrap_or(builtin.poses),
            parsed.lighting.unwrap_or(builtin.lighting),
            parsed.skin_textures.unwrap_or(builtin.skin_textures),
            parsed
                .variation_modifiers
                .unwrap_or(builtin.variation_modifiers),
        )?;
        Ok(catalog)
    }

    pub fn poses(&self) -> &[PresetOption] {
        &self.poses
    }

    pub fn lighting(&self) -> &[PresetOption] {
        &self.lighting
    }

    pub fn skin_textures(&self) -> &[PresetOption] {
        &self.skin_textures
    }

    pub fn variation_modifiers(&self) -> &[String] {
        &self.variation_modifiers
    }

    pub fn aspect_ratios(&self) -> &'static [AspectRatio] {
        &AspectRatio::ALL
    }

    pub fn pose(&self, id: &str) -> Option<&PresetOption> {
        find_preset(&self.poses, id)
    }

    pub fn lighting_preset(&self, id: &str) -> Option<&PresetOption> {
        find_preset(&self.lighting, id)
    }

    pub fn skin_texture(&self, id: &str) -> Option<&PresetOption> {
        find_preset(&self.skin_textures, id)
    }

    pub fn default_lighting(&self) -> &PresetOption {
        &self.lighting[0]
    }

    pub fn default_skin_texture(&self) -> &PresetOption {
        &self.skin_textures[0]
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn find_preset<'a>(entries: &'a [PresetOption], id: &str) -> Option<&'a PresetOption> {
    let id = id.trim();
    entries
        .iter()
        .find(|entry| entry.id.eq_ignore_ascii_case(id))
}

const BUILTIN_VARIATION_MODIFIERS: [&str; 8] = [
    "Slightly different camera angle",
    "Minor change in depth of field bokeh",
    "Subtle shift in color grading tone",
    "Alternate subtle facial micro-expression",
    "Slightly different hair arrangement",
    "Minor variation in ambient atmosphere",
    "Soft lens bloom effect",
    "High-end grain texture variation",
];

fn builtin_poses() -> Vec<PresetOption> {
    vec![
        PresetOption::new(
            "editorial",
            "Studio Editorial",
            "High-end luxury fashion editorial. Professional studio lighting, sharp focus, 85mm lens aesthetic. The character wears the OUTFIT from reference and maintains 100% FACE identity.",
        ),
        PresetOption::new(
            "lifestyle",
            "Global Lifestyle",
            "Candid high-society lifestyle photography. Natural daylight, soft bokeh, sophisticated environment. Perfect garment matching.",
        ),
        PresetOption::new(
            "campaign",
            "Brand Campaign",
            "Commercial advertising campaign style. Clean, high-contrast, premium aesthetic. Influencer showcases the PRODUCT naturally.",
        ),
        PresetOption::new(
            "runway",
            "Runway Look",
            "Fashion week runway photography. Dynamic lighting, motion blur in background, full-body shot.",
        ),
    ]
}

fn builtin_lighting() -> Vec<PresetOption> {
    vec![
        PresetOption::new(
            "studio",
            "Pro Studio",
            "high-end commercial studio lighting, soft box, rim light, sharp details",
        ),
        PresetOption::new(
            "golden",
            "Golden Hour",
            "warm natural sunset lighting, cinematic lens flare, soft highlights",
        ),
        PresetOption::new(
            "neon",
            "Cyber Neon",
            "vibrant cinematic neon lighting, dual tone colors, dramatic shadows",
        ),
        PresetOption::new(
            "natural",
            "Soft Daylight",
            "diffused natural outdoor lighting, overcast day, realistic colors",
        ),
        PresetOption::new(
            "cinematic",
            "Noir/Dramatic",
            "low-key dramatic lighting, high contrast, moody atmosphere",
        ),
    ]
}

fn builtin_skin_textures() -> Vec<PresetOption> {
    vec![
        PresetOption::new(
            "natural",
            "Natural",
            "Hyper-realistic skin with visible pores, fine lines, and natural textures. Maximum authenticity.",
        ),
        PresetOption::new(
            "smooth",
            "Smooth",
            "Clean, even skin with subtle professional smoothing while retaining realistic micro-textures.",
        ),
        PresetOption::new(
            "airbrushed",
            "Airbrushed",
            "Flawless, perfectly even skin with a high-end magazine airbrushed finish. Minimized pores.",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_defaults_are_first_entries() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.default_lighting().id, "studio");
        assert_eq!(catalog.default_skin_texture().id, "natural");
        assert_eq!(catalog.poses().len(), 4);
        assert_eq!(catalog.variation_modifiers().len(), 8);
        assert_eq!(AspectRatio::default().as_str(), "1:1");
    }

    #[test]
    fn lookups_ignore_case_and_whitespace() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.pose(" Runway ").map(|p| p.label.as_str()), Some("Runway Look"));
        assert!(catalog.lighting_preset("golden").is_some());
        assert!(catalog.skin_texture("matte").is_none());
    }

    #[test]
    fn aspect_ratio_parses_token_or_label() {
        assert_eq!(AspectRatio::parse("9:16"), Some(AspectRatio::Portrait));
        assert_eq!(AspectRatio::parse("landscape"), Some(AspectRatio::Landscape));
        assert_eq!(AspectRatio::parse("21:9"), None);
    }

    #[test]
    fn override_file_keeps_omitted_lists() {
        let raw = r#"{
            "lighting": [
                { "id": "flash", "label": "Hard Flash", "prompt": "on-camera flash, hard shadows" }
            ]
        }"#;
        let catalog = Catalog::from_json(raw).unwrap();
        assert_eq!(catalog.default_lighting().id, "flash");
        assert_eq!(catalog.skin_textures().len(), 3);
        assert_eq!(catalog.poses().len(), 4);
    }

    #[test]
    fn rejects_duplicate_ids_and_empty_required_lists() {
        let duplicate = vec![
            PresetOption::new("a", "A", "one"),
            PresetOption::new("a", "A again", "two"),
        ];
        let err = Catalog::new(
            Vec::new(),
            duplicate,
            builtin_skin_textures(),
            vec!["x".into()],
        )
        .unwrap_err();
        assert_eq!(
            err,
            CatalogError::DuplicateId {
                list: "lighting",
                id: "a".into()
            }
        );

        let err = Catalog::new(
            Vec::new(),
            builtin_lighting(),
            Vec::new(),
            vec!["x".into()],
        )
        .unwrap_err();
        assert_eq!(err, CatalogError::EmptyList("skin_textures"));

        let err = Catalog::new(
            Vec::new(),
            builtin_lighting(),
            builtin_skin_textures(),
            vec!["  ".into()],
        )
        .unwrap_err();
        assert_eq!(err, CatalogError::EmptyList("variation_modifiers"));
    }

    #[test]
    fn override_ids_must_be_unique_ignoring_case() {
        let raw = r#"{
            "lighting": [
                { "id": "flash", "label": "Hard Flash", "prompt": "on-camera flash" },
                { "id": " FLASH ", "label": "Flash Again", "prompt": "ring flash" }
            ]
        }"#;
        let err = Catalog::from_json(raw).unwrap_err();
        assert_eq!(
            err.downcast_ref::<CatalogError>(),
            Some(&CatalogError::DuplicateId {
                list: "lighting",
                id: "FLASH".into()
            })
        );
    }

    #[test]
    fn rejects_ids_too_long_for_callback_data() {
        let long_id = "p".repeat(60);
        let err = Catalog::new(
            vec![PresetOption::new(&long_id, "Long", "a pose")],
            builtin_lighting(),
            builtin_skin_textures(),
            vec!["x".into()],
        )
        .unwrap_err();
        assert_eq!(
            err,
            CatalogError::IdTooLong {
                list: "poses",
                id: long_id
            }
        );

        let fits = "p".repeat(MAX_PRESET_ID_BYTES);
        let catalog = Catalog::new(
            vec![PresetOption::new(&fits, "Long", "a pose")],
            builtin_lighting(),
            builtin_skin_textures(),
            vec!["x".into()],
        )
        .unwrap();
        assert!(catalog.pose(&fits.to_uppercase()).is_some());
    }

    #[test]
    fn missing_file_falls_back_to_builtin() {
        let catalog = Catalog::load_or_builtin(Path::new("definitely/not/here.json"));
        assert_eq!(catalog.lighting().len(), 5);
    }
}
