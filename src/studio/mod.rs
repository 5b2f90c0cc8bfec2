pub mod catalog;
pub mod error;
pub mod prompt;
pub mod selection;
pub mod session;

pub use catalog::{AspectRatio, Catalog, PresetOption};
pub use selection::{ImageAsset, ImageSlot};
pub use session::{GenerationResult, StudioSession};
