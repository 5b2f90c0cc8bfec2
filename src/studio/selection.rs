use base64::{engine::general_purpose, Engine as _};

use crate::studio::catalog::{AspectRatio, Catalog, PresetOption};
use crate::studio::error::StudioError;

/// Every uploaded reference is forwarded under this MIME type.
pub const ASSET_MIME_TYPE: &str = "image/jpeg";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReadError {
    #[error("the selected file is empty")]
    Empty,
    #[error("failed to read the selected file: {0}")]
    Io(String),
}

#[derive(Clone, PartialEq, Eq)]
pub struct ImageAsset {
    bytes: Vec<u8>,
}

impl ImageAsset {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ReadError> {
        if bytes.is_empty() {
            return Err(ReadError::Empty);
        }
        Ok(Self { bytes })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &'static str {
        ASSET_MIME_TYPE
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }
}

impl std::fmt::Debug for ImageAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageAsset")
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageSlot {
    Identity,
    Outfit,
    Product,
}

impl ImageSlot {
    pub fn parse(value: &str) -> Option<Self> {
        let word = value
            .split_whitespace()
            .next()?
            .trim_start_matches('/')
            .to_ascii_lowercase();
        match word.as_str() {
            "identity" | "face" => Some(ImageSlot::Identity),
            "outfit" | "garment" => Some(ImageSlot::Outfit),
            "product" | "item" => Some(ImageSlot::Product),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            ImageSlot::Identity => "Identity",
            ImageSlot::Outfit => "Outfit",
            ImageSlot::Product => "Product",
        }
    }
}

/// The user's current choices for the next generation.
#[derive(Debug, Clone)]
pub struct Selection {
    identity: Option<ImageAsset>,
    outfit: Option<ImageAsset>,
    product: Option<ImageAsset>,
    pose: Option<PresetOption>,
    lighting: PresetOption,
    skin_texture: PresetOption,
    aspect_ratio: AspectRatio,
    directive: String,
}

impl Selection {
    pub fn new(catalog: &Catalog) -> Self {
        Self {
            identity: None,
            outfit: None,
            product: None,
            pose: None,
            lighting: catalog.default_lighting().clone(),
            skin_texture: catalog.default_skin_texture().clone(),
            aspect_ratio: AspectRatio::default(),
            directive: String::new(),
        }
    }

    pub fn set_image(&mut self, slot: ImageSlot, asset: ImageAsset) {
        let target = match slot {
            ImageSlot::Identity => &mut self.identity,
            ImageSlot::Outfit => &mut self.outfit,
            ImageSlot::Product => &mut self.product,
        };
        *target = Some(asset);
    }

    pub fn image(&self, slot: ImageSlot) -> Option<&ImageAsset> {
        match slot {
            ImageSlot::Identity => self.identity.as_ref(),
            ImageSlot::Outfit => self.outfit.as_ref(),
            ImageSlot::Product => self.product.as_ref(),
        }
    }

    /// Selecting the active pose again clears it.
    pub fn toggle_pose(&mut self, pose: &PresetOption) {
        let is_active = self
            .pose
            .as_ref()
            .is_some_and(|current| current.id == pose.id);
        self.pose = if is_active { None } else { Some(pose.clone()) };
    }

    pub fn select_lighting(&mut self, lighting: &PresetOption) {
        self.lighting = lighting.clone();
    }

    pub fn select_skin_texture(&mut self, texture: &PresetOption) {
        self.skin_texture = texture.clone();
    }

    pub fn select_aspect_ratio(&mut self, ratio: AspectRatio) {
        self.aspect_ratio = ratio;
    }

    pub fn set_directive(&mut self, text: impl Into<String>) {
        self.directive = text.into();
    }

    pub fn pose(&self) -> Option<&PresetOption> {
        self.pose.as_ref()
    }

    pub fn lighting(&self) -> &PresetOption {
        &self.lighting
    }

    pub fn skin_texture(&self) -> &PresetOption {
        &self.skin_texture
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }

    pub fn directive(&self) -> &str {
        &self.directive
    }

    /// Identity is checked before outfit, so a selection missing both reports identity.
    pub fn validate(&self) -> Result<(&ImageAsset, &ImageAsset), StudioError> {
        let identity = self.identity.as_ref().ok_or(StudioError::MissingIdentity)?;
        let outfit = self.outfit.as_ref().ok_or(StudioError::MissingOutfit)?;
        Ok((identity, outfit))
    }
}
